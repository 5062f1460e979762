//! SVG layout engine: lays out a score into units and materializes each
//! unit as a standalone `<svg>` chunk on request.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use super::layout::{compute_layout, LayoutUnit, UnitKind};
use super::staff::{self, Palette, SystemContext};
use super::svg_builder::SvgBuilder;
use super::{Generation, LayoutEngine, LayoutResult, RenderChunk, RenderEvent, RenderRequest};
use crate::error::{Result, ViewerError};

/// Inputs of the pass currently being laid out.
struct PassInput {
    request: RenderRequest,
    page_width: f64,
    palette: Palette,
}

#[derive(Default)]
struct PassState {
    generation: Generation,
    input: Option<Arc<PassInput>>,
    units: HashMap<u32, Arc<LayoutUnit>>,
    rendered: HashSet<u32>,
}

#[derive(Default)]
pub struct SvgLayoutEngine {
    events: Option<Sender<RenderEvent>>,
    state: Arc<Mutex<PassState>>,
    /// Layout thread of the latest pass, if it ran on one
    worker: Option<JoinHandle<()>>,
}

impl SvgLayoutEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LayoutEngine for SvgLayoutEngine {
    fn attach(&mut self, events: Sender<RenderEvent>) {
        self.events = Some(events);
    }

    fn render_tracks(&mut self, request: RenderRequest) -> Result<()> {
        let events = self
            .events
            .clone()
            .ok_or_else(|| ViewerError::Engine("layout engine is not attached".into()))?;

        let settings = &request.settings;
        let scale = if settings.scale > 0.0 { settings.scale } else { 1.0 };
        let input = Arc::new(PassInput {
            page_width: settings.width / scale,
            palette: Palette::from(&settings.resources),
            request,
        });

        {
            let mut state = self.state.lock();
            state.generation = input.request.generation;
            state.input = Some(Arc::clone(&input));
            state.units.clear();
            state.rendered.clear();
        }

        // A superseded worker is detached; it stops at its next unit
        self.worker = None;
        if input.request.settings.use_workers {
            let state = Arc::clone(&self.state);
            let handle = thread::Builder::new()
                .name(format!("layout-{}", input.request.generation))
                .spawn(move || run_layout(&state, &events, &input))?;
            self.worker = Some(handle);
        } else {
            run_layout(&self.state, &events, &input);
        }
        Ok(())
    }

    fn render_result(&mut self, generation: Generation, result_id: u32) -> Result<()> {
        let events = self
            .events
            .clone()
            .ok_or_else(|| ViewerError::Engine("layout engine is not attached".into()))?;

        let (input, unit) = {
            let mut state = self.state.lock();
            if state.generation != generation {
                log::debug!("ignoring render request for superseded pass {generation}");
                return Ok(());
            }
            let unit = state
                .units
                .get(&result_id)
                .cloned()
                .ok_or_else(|| ViewerError::Engine(format!("unknown layout result {result_id}")))?;
            if !state.rendered.insert(result_id) {
                // Eager passes already delivered this unit
                return Ok(());
            }
            let input = state
                .input
                .clone()
                .ok_or_else(|| ViewerError::Engine("no pass in progress".into()))?;
            (input, unit)
        };

        let chunk = draw_unit(&input, &unit);
        send(&events, RenderEvent::PartialRenderFinished { generation, chunk });
        Ok(())
    }

    fn check_worker(&mut self) -> Result<()> {
        if !self.worker.as_ref().is_some_and(JoinHandle::is_finished) {
            return Ok(());
        }
        match self.worker.take().map(JoinHandle::join) {
            Some(Err(payload)) => {
                let reason = panic_reason(payload.as_ref());
                log::error!("layout worker panicked: {reason}");
                Err(ViewerError::Engine(format!("layout worker panicked: {reason}")))
            }
            _ => Ok(()),
        }
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn send(events: &Sender<RenderEvent>, event: RenderEvent) -> bool {
    if events.send(event).is_err() {
        log::debug!("render event dropped: receiver is gone");
        return false;
    }
    true
}

fn run_layout(state: &Mutex<PassState>, events: &Sender<RenderEvent>, input: &PassInput) {
    let request = &input.request;
    let generation = request.generation;
    let layout = compute_layout(&request.score, &request.tracks, input.page_width);
    // Layout units are unscaled; results are reported in display pixels
    let display = request.settings.width / input.page_width.max(1.0);

    if !send(events, RenderEvent::PreRender { generation, is_resize: request.is_resize }) {
        return;
    }

    let count = layout.units.len();
    for unit in layout.units {
        let unit = Arc::new(unit);
        let eager = !request.settings.lazy_loading;
        {
            let mut state = state.lock();
            if state.generation != generation {
                log::debug!("layout pass {generation} superseded by {}", state.generation);
                return;
            }
            state.units.insert(unit.id, Arc::clone(&unit));
            if eager {
                state.rendered.insert(unit.id);
            }
        }

        let result = LayoutResult {
            id: unit.id,
            x: 0.0,
            y: unit.y * display,
            width: request.settings.width,
            height: unit.height * display,
        };
        if !send(events, RenderEvent::PartialLayoutFinished { generation, result }) {
            return;
        }
        if eager {
            let chunk = draw_unit(input, &unit);
            send(events, RenderEvent::PartialRenderFinished { generation, chunk });
        }
    }

    log::debug!("layout pass {generation} produced {count} unit(s)");
    send(events, RenderEvent::RenderFinished { generation, result_count: count });
}

fn draw_unit(input: &PassInput, unit: &LayoutUnit) -> RenderChunk {
    let settings = &input.request.settings;
    let scale = if settings.scale > 0.0 { settings.scale } else { 1.0 };
    let mut svg = SvgBuilder::new(input.page_width, unit.height, scale);

    match &unit.kind {
        UnitKind::Header(lines) => {
            staff::render_header(&mut svg, lines, &input.palette, input.page_width);
        }
        UnitKind::System(system) => {
            let ctx = SystemContext {
                score: &input.request.score,
                palette: &input.palette,
                interactive: settings.player.enable_user_interaction,
                multi_track: system.staves.len() > 1,
            };
            staff::render_system(&mut svg, system, &ctx);
        }
    }

    let (width, height) = (svg.pixel_width(), svg.pixel_height());
    RenderChunk {
        id: unit.id,
        svg: svg.build(),
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Measure, Note, Score, Track};
    use crate::settings::RenderSettings;
    use std::sync::mpsc;

    fn score() -> Arc<Score> {
        let measure = Measure {
            number: 1,
            divisions: 1,
            notes: vec![Note { start: 0, duration: 4, string: Some(2), fret: Some(5), ..Default::default() }],
            ..Default::default()
        };
        Arc::new(Score {
            title: Some("Engine".into()),
            tracks: vec![Track {
                index: 0,
                name: "Lead".into(),
                short_name: "Ld".into(),
                measures: vec![measure; 3],
                ..Default::default()
            }],
            ..Default::default()
        })
    }

    fn request(generation: Generation, lazy: bool) -> RenderRequest {
        let mut settings = RenderSettings::build(false, 800.0);
        settings.lazy_loading = lazy;
        settings.use_workers = false;
        RenderRequest { generation, settings, score: score(), tracks: vec![0], is_resize: false }
    }

    #[test]
    fn lazy_pass_waits_for_render_requests() {
        let (tx, rx) = mpsc::channel();
        let mut engine = SvgLayoutEngine::new();
        engine.attach(tx);
        engine.render_tracks(request(1, true)).unwrap();

        let events: Vec<RenderEvent> = rx.try_iter().collect();
        assert!(matches!(events[0], RenderEvent::PreRender { generation: 1, .. }));
        assert!(events.iter().all(|e| !matches!(e, RenderEvent::PartialRenderFinished { .. })));
        assert!(matches!(events.last(), Some(RenderEvent::RenderFinished { result_count: 2, .. })));

        engine.render_result(1, 1).unwrap();
        match rx.try_recv().unwrap() {
            RenderEvent::PartialRenderFinished { chunk, .. } => {
                assert_eq!(chunk.id, 1);
                assert!(chunk.svg.contains(">5</text>"));
                assert_eq!(chunk.width, 800.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn eager_pass_ignores_duplicate_requests() {
        let (tx, rx) = mpsc::channel();
        let mut engine = SvgLayoutEngine::new();
        engine.attach(tx);
        engine.render_tracks(request(1, false)).unwrap();
        let rendered = rx
            .try_iter()
            .filter(|e| matches!(e, RenderEvent::PartialRenderFinished { .. }))
            .count();
        assert_eq!(rendered, 2);

        engine.render_result(1, 0).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stale_render_request_is_ignored() {
        let (tx, rx) = mpsc::channel();
        let mut engine = SvgLayoutEngine::new();
        engine.attach(tx);
        engine.render_tracks(request(1, true)).unwrap();
        engine.render_tracks(request(2, true)).unwrap();
        let _ = rx.try_iter().count();

        engine.render_result(1, 0).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unknown_result_is_an_error() {
        let (tx, _rx) = mpsc::channel();
        let mut engine = SvgLayoutEngine::new();
        engine.attach(tx);
        engine.render_tracks(request(1, true)).unwrap();
        assert!(matches!(engine.render_result(1, 99), Err(ViewerError::Engine(_))));
    }

    #[test]
    fn unattached_engine_fails() {
        let mut engine = SvgLayoutEngine::new();
        assert!(matches!(engine.render_tracks(request(1, true)), Err(ViewerError::Engine(_))));
    }

    #[test]
    fn panicked_worker_is_reported_once() {
        let mut engine = SvgLayoutEngine::new();
        engine.worker = Some(thread::spawn(|| panic!("layout blew up")));

        let mut outcome = Ok(());
        for _ in 0..200 {
            outcome = engine.check_worker();
            if outcome.is_err() {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(5));
        }
        match outcome {
            Err(ViewerError::Engine(msg)) => assert!(msg.contains("layout blew up"), "{msg}"),
            other => panic!("expected a worker error, got {other:?}"),
        }
        assert!(engine.check_worker().is_ok(), "handle is consumed");
    }

    #[test]
    fn finished_worker_is_healthy() {
        let (tx, rx) = mpsc::channel();
        let mut engine = SvgLayoutEngine::new();
        engine.attach(tx);
        let mut req = request(1, true);
        req.settings.use_workers = true;
        engine.render_tracks(req).unwrap();
        // RenderFinished is the worker's last event
        while !matches!(rx.recv().unwrap(), RenderEvent::RenderFinished { .. }) {}
        for _ in 0..100 {
            assert!(engine.check_worker().is_ok());
            if engine.worker.is_none() {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(5));
        }
    }
}

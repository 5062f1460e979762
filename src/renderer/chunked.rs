//! Chunked render driver: the three-phase protocol as an explicit state machine.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use super::{Generation, LayoutEngine, RenderChunk, RenderEvent, RenderRequest};
use crate::error::{Result, ViewerError};
use crate::model::Score;
use crate::settings::RenderSettings;

/// How long `wait` blocks before checking on the engine's worker.
const WORKER_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Where the current pass stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    /// No pass has been started
    Idle,
    /// The engine was asked to render; waiting for `PreRender`
    Requested,
    /// Accepting chunks
    Rendering,
    /// All announced chunks arrived
    Settled,
}

/// The assembled result of a settled pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub generation: Generation,
    /// Chunks in emission order
    pub chunks: Vec<RenderChunk>,
    /// Chunk markup joined with the separator
    pub markup: String,
}

impl RenderOutput {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total height of all chunks stacked vertically.
    pub fn height(&self) -> f64 {
        self.chunks.iter().map(|c| c.height).sum()
    }
}

pub struct ChunkedRenderer<E: LayoutEngine> {
    engine: E,
    events: Receiver<RenderEvent>,
    generation: Generation,
    phase: RenderPhase,
    chunks: Vec<RenderChunk>,
    /// Unit count announced by `RenderFinished`
    expected: Option<usize>,
    separator: String,
}

impl<E: LayoutEngine> ChunkedRenderer<E> {
    pub fn new(mut engine: E) -> Self {
        let (tx, rx) = mpsc::channel();
        engine.attach(tx);
        Self {
            engine,
            events: rx,
            generation: 0,
            phase: RenderPhase::Idle,
            chunks: Vec::new(),
            expected: None,
            separator: "\n".to_string(),
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn phase(&self) -> RenderPhase {
        self.phase
    }

    /// Chunks received so far in the current pass, in arrival order.
    pub fn chunks(&self) -> &[RenderChunk] {
        &self.chunks
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Start a new pass, superseding any pass still in flight.
    pub fn begin(
        &mut self,
        settings: &RenderSettings,
        score: Arc<Score>,
        tracks: &[usize],
        is_resize: bool,
    ) -> Result<Generation> {
        self.generation += 1;
        self.phase = RenderPhase::Requested;
        self.expected = None;
        self.chunks.clear();
        log::debug!(
            "render pass {} requested for tracks {:?} at width {}",
            self.generation,
            tracks,
            settings.width
        );

        let request = RenderRequest {
            generation: self.generation,
            settings: settings.clone(),
            score,
            tracks: tracks.to_vec(),
            is_resize,
        };
        if let Err(e) = self.engine.render_tracks(request) {
            // Nothing will arrive for this pass
            self.phase = RenderPhase::Idle;
            return Err(e);
        }
        Ok(self.generation)
    }

    /// Feed one event into the state machine. Returns the output when the
    /// event settles the current pass.
    pub fn handle_event(&mut self, event: RenderEvent) -> Result<Option<RenderOutput>> {
        if event.generation() != self.generation {
            log::debug!(
                "dropping event from pass {} (current pass {})",
                event.generation(),
                self.generation
            );
            return Ok(None);
        }

        match event {
            RenderEvent::PreRender { is_resize, .. } => {
                if self.phase != RenderPhase::Requested {
                    log::warn!("duplicate pre-render for pass {}", self.generation);
                    return Ok(None);
                }
                self.chunks.clear();
                self.phase = RenderPhase::Rendering;
                log::debug!("pass {} started (resize: {is_resize})", self.generation);
            }
            RenderEvent::PartialLayoutFinished { generation, result } => {
                if self.phase != RenderPhase::Rendering {
                    log::warn!("layout result {} outside of an open pass", result.id);
                    return Ok(None);
                }
                self.engine.render_result(generation, result.id)?;
            }
            RenderEvent::PartialRenderFinished { chunk, .. } => {
                if self.phase != RenderPhase::Rendering {
                    log::warn!("chunk {} outside of an open pass", chunk.id);
                    return Ok(None);
                }
                self.chunks.push(chunk);
            }
            RenderEvent::RenderFinished { result_count, .. } => {
                if self.phase != RenderPhase::Rendering {
                    log::warn!("render-finished outside of an open pass");
                    return Ok(None);
                }
                self.expected = Some(result_count);
            }
        }

        Ok(self.try_settle())
    }

    fn try_settle(&mut self) -> Option<RenderOutput> {
        if self.phase == RenderPhase::Rendering && self.expected == Some(self.chunks.len()) {
            self.phase = RenderPhase::Settled;
            let output = self.output();
            log::info!(
                "pass {} settled with {} chunk(s)",
                self.generation,
                output.chunks.len()
            );
            Some(output)
        } else {
            None
        }
    }

    /// Process whatever events are queued without blocking.
    pub fn poll(&mut self) -> Result<Option<RenderOutput>> {
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    if let Some(output) = self.handle_event(event)? {
                        return Ok(Some(output));
                    }
                }
                Err(TryRecvError::Empty) => {
                    if matches!(self.phase, RenderPhase::Requested | RenderPhase::Rendering) {
                        self.check_worker()?;
                    }
                    return Ok(None);
                }
                Err(TryRecvError::Disconnected) => {
                    return Err(ViewerError::Engine("event channel closed".into()))
                }
            }
        }
    }

    /// Block until the current pass settles.
    pub fn wait(&mut self) -> Result<RenderOutput> {
        match self.phase {
            RenderPhase::Idle => return Err(ViewerError::Engine("no render pass in progress".into())),
            RenderPhase::Settled => return Ok(self.output()),
            RenderPhase::Requested | RenderPhase::Rendering => {}
        }
        loop {
            let event = match self.events.recv_timeout(WORKER_CHECK_INTERVAL) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => {
                    self.check_worker()?;
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ViewerError::Engine("event channel closed".into()))
                }
            };
            if let Some(output) = self.handle_event(event)? {
                return Ok(output);
            }
        }
    }

    fn check_worker(&mut self) -> Result<()> {
        if let Err(e) = self.engine.check_worker() {
            log::warn!("abandoning pass {}: {e}", self.generation);
            self.phase = RenderPhase::Idle;
            return Err(e);
        }
        Ok(())
    }

    /// Run a whole pass and return its output.
    pub fn render(
        &mut self,
        settings: &RenderSettings,
        score: Arc<Score>,
        tracks: &[usize],
        is_resize: bool,
    ) -> Result<RenderOutput> {
        self.begin(settings, score, tracks, is_resize)?;
        self.wait()
    }

    /// Current buffer in emission order, joined with the separator.
    pub fn output(&self) -> RenderOutput {
        let mut chunks = self.chunks.clone();
        chunks.sort_by_key(|c| c.id);
        let markup = chunks
            .iter()
            .map(|c| c.svg.as_str())
            .collect::<Vec<_>>()
            .join(&self.separator);
        RenderOutput {
            generation: self.generation,
            chunks,
            markup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::LayoutResult;
    use super::*;
    use std::sync::mpsc::Sender;

    /// Engine that announces a fixed number of units and records requests.
    #[derive(Default)]
    struct ScriptedEngine {
        events: Option<Sender<RenderEvent>>,
        units: u32,
        requested: Vec<(Generation, u32)>,
        /// When false, the engine leaves event emission to the test
        auto: bool,
        /// Refuse to start passes
        refuse: bool,
        /// Pretend the background worker died
        worker_died: bool,
    }

    impl ScriptedEngine {
        fn send(&self, event: RenderEvent) {
            if let Some(ref tx) = self.events {
                tx.send(event).unwrap();
            }
        }
    }

    impl LayoutEngine for ScriptedEngine {
        fn attach(&mut self, events: Sender<RenderEvent>) {
            self.events = Some(events);
        }

        fn render_tracks(&mut self, request: RenderRequest) -> Result<()> {
            if self.refuse {
                return Err(ViewerError::Engine("refused".into()));
            }
            if !self.auto {
                return Ok(());
            }
            let generation = request.generation;
            self.send(RenderEvent::PreRender { generation, is_resize: request.is_resize });
            for id in 0..self.units {
                self.send(RenderEvent::PartialLayoutFinished {
                    generation,
                    result: LayoutResult { id, x: 0.0, y: 0.0, width: 10.0, height: 5.0 },
                });
            }
            self.send(RenderEvent::RenderFinished {
                generation,
                result_count: self.units as usize,
            });
            Ok(())
        }

        fn render_result(&mut self, generation: Generation, result_id: u32) -> Result<()> {
            self.requested.push((generation, result_id));
            self.send(RenderEvent::PartialRenderFinished {
                generation,
                chunk: chunk(result_id, &format!("<svg id=\"g{generation}-{result_id}\"/>")),
            });
            Ok(())
        }

        fn check_worker(&mut self) -> Result<()> {
            if self.worker_died {
                return Err(ViewerError::Engine("worker died".into()));
            }
            Ok(())
        }
    }

    fn chunk(id: u32, svg: &str) -> RenderChunk {
        RenderChunk { id, svg: svg.to_string(), width: 10.0, height: 5.0 }
    }

    fn settings() -> RenderSettings {
        RenderSettings::build(false, 600.0)
    }

    fn scripted(units: u32) -> ChunkedRenderer<ScriptedEngine> {
        ChunkedRenderer::new(ScriptedEngine { units, auto: true, ..Default::default() })
    }

    #[test]
    fn every_layout_result_is_requested() {
        let mut r = scripted(3);
        let out = r.render(&settings(), Arc::new(Score::new()), &[0], false).unwrap();
        assert_eq!(r.engine().requested, vec![(1, 0), (1, 1), (1, 2)]);
        assert_eq!(out.chunks.len(), 3);
        assert_eq!(r.phase(), RenderPhase::Settled);
    }

    #[test]
    fn output_joins_chunks_with_newlines() {
        let mut r = scripted(3);
        let out = r.render(&settings(), Arc::new(Score::new()), &[0], false).unwrap();
        assert_eq!(
            out.markup,
            "<svg id=\"g1-0\"/>\n<svg id=\"g1-1\"/>\n<svg id=\"g1-2\"/>"
        );
    }

    #[test]
    fn buffer_is_empty_after_pre_render_on_every_pass() {
        let mut r = ChunkedRenderer::new(ScriptedEngine::default());
        let score = Arc::new(Score::new());
        for pass in 1..=3u64 {
            let generation = r.begin(&settings(), Arc::clone(&score), &[0], pass > 1).unwrap();
            assert_eq!(generation, pass);
            r.handle_event(RenderEvent::PreRender { generation, is_resize: pass > 1 }).unwrap();
            assert!(r.chunks().is_empty(), "buffer leaked into pass {pass}");
            r.handle_event(RenderEvent::PartialRenderFinished {
                generation,
                chunk: chunk(0, "<svg/>"),
            })
            .unwrap();
            let out = r
                .handle_event(RenderEvent::RenderFinished { generation, result_count: 1 })
                .unwrap()
                .expect("pass should settle");
            assert_eq!(out.chunks.len(), 1);
        }
    }

    #[test]
    fn chunks_before_pre_render_are_ignored() {
        let mut r = ChunkedRenderer::new(ScriptedEngine::default());
        let generation = r.begin(&settings(), Arc::new(Score::new()), &[0], false).unwrap();
        r.handle_event(RenderEvent::PartialRenderFinished { generation, chunk: chunk(0, "early") })
            .unwrap();
        assert!(r.chunks().is_empty());
        assert_eq!(r.phase(), RenderPhase::Requested);
    }

    #[test]
    fn stale_generation_events_are_discarded() {
        let mut r = ChunkedRenderer::new(ScriptedEngine::default());
        let score = Arc::new(Score::new());
        let first = r.begin(&settings(), Arc::clone(&score), &[0], false).unwrap();
        r.handle_event(RenderEvent::PreRender { generation: first, is_resize: false }).unwrap();
        let second = r.begin(&settings(), score, &[0], true).unwrap();
        r.handle_event(RenderEvent::PreRender { generation: second, is_resize: true }).unwrap();

        // Late arrivals from the first pass, interleaved with the second
        r.handle_event(RenderEvent::PartialRenderFinished { generation: first, chunk: chunk(0, "old") })
            .unwrap();
        r.handle_event(RenderEvent::PartialLayoutFinished {
            generation: first,
            result: LayoutResult { id: 4, x: 0.0, y: 0.0, width: 1.0, height: 1.0 },
        })
        .unwrap();
        r.handle_event(RenderEvent::PartialRenderFinished { generation: second, chunk: chunk(0, "new") })
            .unwrap();
        let settled = r
            .handle_event(RenderEvent::RenderFinished { generation: first, result_count: 1 })
            .unwrap();
        assert!(settled.is_none(), "stale finish must not settle the new pass");

        let out = r
            .handle_event(RenderEvent::RenderFinished { generation: second, result_count: 1 })
            .unwrap()
            .unwrap();
        assert_eq!(out.markup, "new");
        assert_eq!(out.generation, second);
        assert!(r.engine().requested.is_empty(), "stale layout must not be materialized");
    }

    #[test]
    fn output_follows_emission_order_not_arrival_order() {
        let mut r = ChunkedRenderer::new(ScriptedEngine::default());
        let generation = r.begin(&settings(), Arc::new(Score::new()), &[0], false).unwrap();
        r.handle_event(RenderEvent::PreRender { generation, is_resize: false }).unwrap();
        for id in [2, 0, 1] {
            r.handle_event(RenderEvent::PartialRenderFinished {
                generation,
                chunk: chunk(id, &id.to_string()),
            })
            .unwrap();
        }
        let arrival: Vec<u32> = r.chunks().iter().map(|c| c.id).collect();
        assert_eq!(arrival, vec![2, 0, 1]);
        let out = r
            .handle_event(RenderEvent::RenderFinished { generation, result_count: 3 })
            .unwrap()
            .unwrap();
        assert_eq!(out.markup, "0\n1\n2");
    }

    #[test]
    fn zero_units_settle_with_empty_output() {
        let mut r = scripted(0);
        let out = r.render(&settings(), Arc::new(Score::new()), &[], false).unwrap();
        assert!(out.is_empty());
        assert_eq!(out.markup, "");
    }

    #[test]
    fn custom_separator() {
        let mut r = scripted(2).with_separator("<hr/>");
        let out = r.render(&settings(), Arc::new(Score::new()), &[0], false).unwrap();
        assert_eq!(out.markup, "<svg id=\"g1-0\"/><hr/><svg id=\"g1-1\"/>");
    }

    #[test]
    fn wait_without_pass_is_an_error() {
        let mut r = scripted(1);
        assert!(matches!(r.wait(), Err(ViewerError::Engine(_))));
    }

    #[test]
    fn poll_returns_none_until_settled() {
        let mut r = ChunkedRenderer::new(ScriptedEngine::default());
        r.begin(&settings(), Arc::new(Score::new()), &[0], false).unwrap();
        assert_eq!(r.poll().unwrap(), None);
    }

    #[test]
    fn failed_start_discards_previous_buffer() {
        let mut r = scripted(2);
        r.render(&settings(), Arc::new(Score::new()), &[0], false).unwrap();
        assert_eq!(r.chunks().len(), 2);

        r.engine_mut().refuse = true;
        let err = r.begin(&settings(), Arc::new(Score::new()), &[0], false);
        assert!(matches!(err, Err(ViewerError::Engine(_))));
        assert!(r.chunks().is_empty(), "superseded chunks must not survive");
        assert_eq!(r.generation(), 2);
        assert_eq!(r.phase(), RenderPhase::Idle);
        assert!(matches!(r.wait(), Err(ViewerError::Engine(_))));
    }

    #[test]
    fn dead_worker_ends_wait_with_error() {
        let mut r = ChunkedRenderer::new(ScriptedEngine::default());
        r.begin(&settings(), Arc::new(Score::new()), &[0], false).unwrap();
        r.engine_mut().worker_died = true;
        assert!(matches!(r.wait(), Err(ViewerError::Engine(_))));
        assert_eq!(r.phase(), RenderPhase::Idle);
    }

    #[test]
    fn dead_worker_is_reported_by_poll() {
        let mut r = ChunkedRenderer::new(ScriptedEngine::default());
        r.begin(&settings(), Arc::new(Score::new()), &[0], false).unwrap();
        assert_eq!(r.poll().unwrap(), None);
        r.engine_mut().worker_died = true;
        assert!(matches!(r.poll(), Err(ViewerError::Engine(_))));
    }
}

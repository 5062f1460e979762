//! Score renderer: turns the selected tracks of a Score into SVG chunks.
//!
//! Rendering is incremental. A [`LayoutEngine`] reports its progress as a
//! stream of [`RenderEvent`]s on a channel:
//!
//! 1. `PreRender` opens a pass,
//! 2. `PartialLayoutFinished` announces a laid-out unit, which must then be
//!    requested with [`LayoutEngine::render_result`],
//! 3. `PartialRenderFinished` delivers the materialized chunk,
//! 4. `RenderFinished` closes the layout with the total unit count.
//!
//! [`ChunkedRenderer`] drives that protocol and assembles the final markup.
//! Every pass carries a generation number so that events from a superseded
//! pass can never leak into the current one.

mod chunked;
mod constants;
mod engine;
mod layout;
mod notes;
mod staff;
mod svg_builder;

use std::sync::mpsc::Sender;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::Score;
use crate::settings::RenderSettings;

pub use chunked::{ChunkedRenderer, RenderOutput, RenderPhase};
pub use engine::SvgLayoutEngine;

/// Render pass counter. Starts at 1 for the first pass.
pub type Generation = u64;

/// One materialized unit of output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderChunk {
    /// Emission order within the pass
    pub id: u32,
    pub svg: String,
    pub width: f64,
    pub height: f64,
}

/// Placement of a laid-out unit, announced before it is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutResult {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Notifications emitted by a layout engine.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    PreRender {
        generation: Generation,
        is_resize: bool,
    },
    PartialLayoutFinished {
        generation: Generation,
        result: LayoutResult,
    },
    PartialRenderFinished {
        generation: Generation,
        chunk: RenderChunk,
    },
    RenderFinished {
        generation: Generation,
        result_count: usize,
    },
}

impl RenderEvent {
    pub fn generation(&self) -> Generation {
        match self {
            Self::PreRender { generation, .. }
            | Self::PartialLayoutFinished { generation, .. }
            | Self::PartialRenderFinished { generation, .. }
            | Self::RenderFinished { generation, .. } => *generation,
        }
    }
}

/// Everything a layout engine needs for one pass.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub generation: Generation,
    pub settings: RenderSettings,
    pub score: Arc<Score>,
    /// Track indices to render, ascending
    pub tracks: Vec<usize>,
    pub is_resize: bool,
}

/// A layout/render engine that reports progress through [`RenderEvent`]s.
pub trait LayoutEngine {
    /// Hand the engine the channel it reports on.
    fn attach(&mut self, events: Sender<RenderEvent>);

    /// Start a pass. Any previous pass is superseded.
    fn render_tracks(&mut self, request: RenderRequest) -> Result<()>;

    /// Materialize a unit announced by `PartialLayoutFinished`.
    fn render_result(&mut self, generation: Generation, result_id: u32) -> Result<()>;

    /// Report a background worker that died without finishing its pass.
    /// Called while the renderer waits for events.
    fn check_worker(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Render the given tracks synchronously and return the joined markup.
pub fn render_tracks_to_svg(score: &Score, tracks: &[usize], settings: &RenderSettings) -> Result<String> {
    let settings = RenderSettings {
        use_workers: false,
        ..settings.clone()
    };
    let mut renderer = ChunkedRenderer::new(SvgLayoutEngine::new());
    let output = renderer.render(&settings, Arc::new(score.clone()), tracks, false)?;
    Ok(output.markup)
}

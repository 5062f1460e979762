//! Score view: the file lifecycle of one open tab file.
//!
//! A view is either unloaded or holds exactly one decoded [`Score`]. Loading
//! shows a placeholder, decodes through the [`ScoreLoader`], seeds the track
//! selection and renders. Selection changes arrive through the selection's
//! subscriber and trigger exactly one re-render each.

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use serde::Serialize;

use crate::config::ViewerConfig;
use crate::error::{Result, ViewerError};
use crate::host::{DisplaySurface, FileSaver, HostEnvironment, Vault};
use crate::midi::{MidiEncoder, SmfEncoder, MIDI_MIME};
use crate::model::Score;
use crate::renderer::{ChunkedRenderer, LayoutEngine, RenderOutput, SvgLayoutEngine};
use crate::selection::{SelectionPolicy, ToggleOutcome, TrackSelection};
use crate::settings::RenderSettings;
use crate::source::ScoreLoader;

/// Class of the element holding rendered chunks.
pub const CONTENT_CLASS: &str = "at-container-svgs";

/// Class of the loading placeholder.
pub const LOADING_CLASS: &str = "at at-container-loading";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Unloaded,
    Loaded,
}

/// Toolbar actions a view offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActionKind {
    SetInstrument,
    DownloadMidi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViewAction {
    pub icon: &'static str,
    pub title: &'static str,
    pub kind: ActionKind,
}

pub const VIEW_ACTIONS: [ViewAction; 2] = [
    ViewAction {
        icon: "music",
        title: "Set Instrument",
        kind: ActionKind::SetInstrument,
    },
    ViewAction {
        icon: "download",
        title: "Download Midi File",
        kind: ActionKind::DownloadMidi,
    },
];

/// What running an action produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ActionOutcome {
    /// Data for the track selection dialog
    ShowTracks(Vec<TrackToggle>),
    /// Name of the saved MIDI file
    Saved(String),
}

/// One row of the track selection dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackToggle {
    pub index: usize,
    pub name: String,
    pub description: String,
    pub enabled: bool,
}

/// Services the host lends to a view.
pub struct HostServices {
    pub surface: Box<dyn DisplaySurface>,
    pub vault: Box<dyn Vault>,
    pub saver: Box<dyn FileSaver>,
    pub environment: Box<dyn HostEnvironment>,
}

pub struct ScoreView<E: LayoutEngine = SvgLayoutEngine> {
    config: ViewerConfig,
    loader: ScoreLoader,
    renderer: ChunkedRenderer<E>,
    selection: TrackSelection,
    midi: Box<dyn MidiEncoder>,
    host: HostServices,
    path: Option<PathBuf>,
    score: Option<Arc<Score>>,
    /// Effective width of the last render pass
    render_width: Option<f64>,
    /// Set by the selection subscriber, consumed by the next re-render
    selection_dirty: Rc<Cell<bool>>,
    /// Block until each pass settles instead of waiting for `poll`
    blocking: bool,
}

impl ScoreView<SvgLayoutEngine> {
    pub fn new(config: ViewerConfig, host: HostServices) -> Self {
        Self::with_engine(config, host, SvgLayoutEngine::new())
    }
}

impl<E: LayoutEngine> ScoreView<E> {
    pub fn with_engine(config: ViewerConfig, host: HostServices, engine: E) -> Self {
        let policy = if config.allow_empty_selection {
            SelectionPolicy::AllowEmpty
        } else {
            SelectionPolicy::KeepOne
        };
        let mut selection = TrackSelection::new(policy);
        let selection_dirty = Rc::new(Cell::new(false));
        let dirty = Rc::clone(&selection_dirty);
        selection.subscribe(move |_| dirty.set(true));

        Self {
            renderer: ChunkedRenderer::new(engine).with_separator(config.chunk_separator.clone()),
            config,
            loader: ScoreLoader::default(),
            selection,
            midi: Box::new(SmfEncoder),
            host,
            path: None,
            score: None,
            render_width: None,
            selection_dirty,
            blocking: true,
        }
    }

    pub fn with_loader(mut self, loader: ScoreLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_midi_encoder(mut self, encoder: Box<dyn MidiEncoder>) -> Self {
        self.midi = encoder;
        self
    }

    /// In non-blocking mode passes settle through [`poll`](Self::poll).
    pub fn set_blocking(&mut self, blocking: bool) {
        self.blocking = blocking;
    }

    // ─── Accessors ───────────────────────────────────────────────────

    pub fn state(&self) -> ViewState {
        if self.score.is_some() {
            ViewState::Loaded
        } else {
            ViewState::Unloaded
        }
    }

    pub fn score(&self) -> Option<&Score> {
        self.score.as_deref()
    }

    pub fn selection(&self) -> &TrackSelection {
        &self.selection
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// Effective width of the last render pass, if any.
    pub fn render_width(&self) -> Option<f64> {
        self.render_width
    }

    pub fn renderer(&self) -> &ChunkedRenderer<E> {
        &self.renderer
    }

    /// Tab title: "{title} - {artist}" once loaded, else the file name.
    pub fn display_text(&self) -> String {
        if let Some(ref score) = self.score {
            return format!(
                "{} - {}",
                score.title.as_deref().unwrap_or_default(),
                score.artist.as_deref().unwrap_or_default()
            );
        }
        self.path
            .as_deref()
            .and_then(Path::file_stem)
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "No file".to_string())
    }

    // ─── File lifecycle ──────────────────────────────────────────────

    pub fn on_load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if self.score.is_some() {
            self.on_unload_file();
        }

        self.path = Some(path.to_path_buf());
        self.host.surface.append_html(&format!(
            r#"<div class="{LOADING_CLASS}">{}</div>"#,
            self.config.loading_text
        ));

        let bytes = self.host.vault.read_binary(path)?;
        let settings = self.current_settings();
        let extension = path.extension().and_then(|e| e.to_str());
        let score = self.loader.load_score_from_bytes(&bytes, extension, &settings)?;
        self.selection.initialize(&score.tracks)?;
        // Seeding the selection is not a user change
        self.selection_dirty.set(false);

        log::info!(
            "loaded {}: {} track(s), {} measure(s), {} note(s)",
            path.display(),
            score.tracks.len(),
            score.measure_count(),
            score.note_count()
        );
        self.score = Some(Arc::new(score));
        self.render(false)
    }

    pub fn on_unload_file(&mut self) {
        self.host.surface.empty();
        self.score = None;
        self.path = None;
        self.render_width = None;
        self.selection.clear();
        log::debug!("view unloaded");
    }

    /// Re-render when the effective width changed. Returns whether a pass ran.
    pub fn on_resize(&mut self) -> Result<bool> {
        if self.score.is_none() {
            return Ok(false);
        }
        let available = self.host.environment.available_width();
        if available <= 0.0 {
            log::debug!("ignoring resize to zero width");
            return Ok(false);
        }
        if self.render_width == Some(self.config.effective_width(available)) {
            return Ok(false);
        }
        self.render(true)?;
        Ok(true)
    }

    // ─── Track selection ─────────────────────────────────────────────

    pub fn toggle_track(&mut self, index: usize) -> Result<ToggleOutcome> {
        self.require_loaded()?;
        let outcome = self.selection.toggle(index)?;
        self.rerender_if_dirty()?;
        Ok(outcome)
    }

    pub fn set_track_selected(&mut self, index: usize, selected: bool) -> Result<ToggleOutcome> {
        self.require_loaded()?;
        let outcome = self.selection.set_selected(index, selected)?;
        self.rerender_if_dirty()?;
        Ok(outcome)
    }

    pub fn track_toggles(&self) -> Vec<TrackToggle> {
        self.selection
            .tracks()
            .iter()
            .map(|t| TrackToggle {
                index: t.index,
                name: t.name.clone(),
                description: t.short_name.clone(),
                enabled: self.selection.is_selected(t.index),
            })
            .collect()
    }

    fn rerender_if_dirty(&mut self) -> Result<()> {
        if self.selection_dirty.replace(false) {
            self.render(false)?;
        }
        Ok(())
    }

    // ─── Actions ─────────────────────────────────────────────────────

    pub fn actions(&self) -> &'static [ViewAction] {
        &VIEW_ACTIONS
    }

    pub fn run_action(&mut self, kind: ActionKind) -> Result<ActionOutcome> {
        match kind {
            ActionKind::SetInstrument => {
                self.require_loaded()?;
                Ok(ActionOutcome::ShowTracks(self.track_toggles()))
            }
            ActionKind::DownloadMidi => self.download_midi().map(ActionOutcome::Saved),
        }
    }

    /// Encode the score and hand it to the saver. Returns the file name.
    pub fn download_midi(&mut self) -> Result<String> {
        let score = self.require_loaded()?;
        let settings = self.current_settings();
        let bytes = self.midi.encode(&score, &settings)?;
        let filename = format!("{}.mid", sanitize_filename(&self.display_text()));
        self.host.saver.save(&filename, MIDI_MIME, &bytes)?;
        Ok(filename)
    }

    // ─── Rendering ───────────────────────────────────────────────────

    /// Process pending render events. Returns whether a pass was displayed.
    pub fn poll(&mut self) -> Result<bool> {
        match self.renderer.poll()? {
            Some(output) => Ok(self.display(&output)),
            None => Ok(false),
        }
    }

    fn current_settings(&self) -> RenderSettings {
        RenderSettings::build_with(
            &self.config,
            self.host.environment.is_dark_mode(),
            self.host.environment.available_width(),
        )
    }

    fn render(&mut self, is_resize: bool) -> Result<()> {
        let Some(score) = self.score.clone() else {
            return Ok(());
        };
        let settings = self.current_settings();
        let tracks = self.selection.ordered_indices();
        self.renderer.begin(&settings, score, &tracks, is_resize)?;
        // Only a started pass counts for the resize guard
        self.render_width = Some(settings.width);

        if self.blocking {
            let output = self.renderer.wait()?;
            self.display(&output);
        }
        Ok(())
    }

    fn display(&mut self, output: &RenderOutput) -> bool {
        if self.score.is_none() {
            log::debug!("discarding pass {} for an unloaded view", output.generation);
            return false;
        }
        self.host.surface.empty();
        self.host
            .surface
            .append_html(&format!(r#"<div class="{CONTENT_CLASS}">{}</div>"#, output.markup));
        log::info!(
            "displayed pass {} with {} chunk(s)",
            output.generation,
            output.chunks.len()
        );
        true
    }

    fn require_loaded(&self) -> Result<Arc<Score>> {
        self.score.clone().ok_or(ViewerError::NotLoaded)
    }
}

/// Replace characters that are not allowed in file names.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "score".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(sanitize_filename("AC/DC - Back: In Black"), "AC_DC - Back_ In Black");
        assert_eq!(sanitize_filename("Song - Band"), "Song - Band");
        assert_eq!(sanitize_filename("   "), "score");
    }

    #[test]
    fn action_table() {
        let titles: Vec<(&str, &str)> = VIEW_ACTIONS.iter().map(|a| (a.icon, a.title)).collect();
        assert_eq!(titles, vec![("music", "Set Instrument"), ("download", "Download Midi File")]);
    }
}

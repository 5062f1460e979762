//! tabview is a tablature viewer core: score loading, chunked SVG rendering,
//! track selection and MIDI export for a host-embedded score view.
//!
//! MusicXML (.musicxml) and compressed MusicXML (.mxl) decode out of the box;
//! Guitar Pro decoders plug in through [`ScoreSource`].
//!
//! # Example
//! ```no_run
//! use tabview::{load_score_file, render_score_to_svg};
//!
//! let score = load_score_file("path/to/song.musicxml").unwrap();
//! println!("Title: {:?}", score.title);
//! println!("Tracks: {}", score.tracks.len());
//! let svg = render_score_to_svg(&score, &[0], 800.0, false).unwrap();
//! println!("{} bytes of SVG", svg.len());
//! ```

pub mod config;
pub mod error;
pub mod host;
pub mod midi;
pub mod model;
pub mod mxl;
pub mod parser;
pub mod renderer;
pub mod selection;
pub mod settings;
pub mod source;
pub mod timemap;
pub mod view;

use std::path::Path;

pub use config::ViewerConfig;
pub use error::{Result, ViewerError};
pub use host::{register_plugin, DisplaySurface, FileSaver, HostEnvironment, Vault, ViewRegistry, VIEW_TYPE};
pub use midi::{MidiEncoder, SmfEncoder};
pub use model::*;
pub use mxl::parse_mxl;
pub use parser::parse_musicxml;
pub use renderer::{ChunkedRenderer, LayoutEngine, RenderChunk, RenderEvent, RenderOutput, SvgLayoutEngine};
pub use selection::{SelectionPolicy, ToggleOutcome, TrackSelection};
pub use settings::{RenderSettings, RenderingResources};
pub use source::{ScoreFormat, ScoreLoader, ScoreSource, VIEW_EXTENSIONS};
pub use view::{HostServices, ScoreView, ViewState};

/// Decode a score file. The extension is used as a format hint.
pub fn load_score_file<P: AsRef<Path>>(path: P) -> Result<Score> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    load_score_bytes(&data, path.extension().and_then(|e| e.to_str()))
}

/// Decode score bytes with the built-in sources.
pub fn load_score_bytes(data: &[u8], extension: Option<&str>) -> Result<Score> {
    let settings = RenderSettings::build(false, 0.0);
    ScoreLoader::default().load_score_from_bytes(data, extension, &settings)
}

/// Convert a parsed score to a JSON string.
/// Useful for passing data across FFI boundaries.
pub fn score_to_json(score: &Score) -> Result<String> {
    Ok(serde_json::to_string_pretty(score)?)
}

/// Render the given tracks of a score to joined SVG chunks.
pub fn render_score_to_svg(score: &Score, tracks: &[usize], width: f64, dark_mode: bool) -> Result<String> {
    let settings = RenderSettings::build(dark_mode, width);
    renderer::render_tracks_to_svg(score, tracks, &settings)
}

/// Decode score bytes and render the first track, as a freshly opened view would.
pub fn render_bytes_to_svg(data: &[u8], extension: Option<&str>, width: f64, dark_mode: bool) -> Result<String> {
    let score = load_score_bytes(data, extension)?;
    let first = score.tracks.first().map(|t| t.index).ok_or(ViewerError::NoTracks)?;
    render_score_to_svg(&score, &[first], width, dark_mode)
}

// ═══════════════════════════════════════════════════════════════════════
// C FFI: for native hosts (static library / cdylib)
// ═══════════════════════════════════════════════════════════════════════

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

/// Decode score bytes and return the rendered SVG as a C string.
/// The caller must free the returned string with `tabview_free_string`.
///
/// `width` is the available width; pass 0.0 for the default.
///
/// # Safety
/// `data` must point to `len` valid bytes. `extension` may be null.
#[no_mangle]
pub unsafe extern "C" fn tabview_render_bytes(
    data: *const u8,
    len: usize,
    extension: *const c_char,
    width: f64,
    dark_mode: bool,
) -> *mut c_char {
    if data.is_null() || len == 0 {
        return std::ptr::null_mut();
    }
    let bytes = unsafe { std::slice::from_raw_parts(data, len) };
    let ext = if extension.is_null() {
        None
    } else {
        unsafe { CStr::from_ptr(extension) }.to_str().ok()
    };

    match render_bytes_to_svg(bytes, ext, width, dark_mode) {
        Ok(svg) => CString::new(svg).unwrap_or_default().into_raw(),
        Err(e) => {
            log::warn!("tabview_render_bytes failed: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Free a string previously returned by tabview functions.
///
/// # Safety
/// `ptr` must be a string previously returned by a tabview function, or null.
#[no_mangle]
pub unsafe extern "C" fn tabview_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            let _ = CString::from_raw(ptr);
        }
    }
}

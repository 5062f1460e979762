//! Error type shared by every stage of the viewer pipeline.

use thiserror::Error;

/// Errors raised while acquiring, rendering or exporting a score.
#[derive(Debug, Error)]
pub enum ViewerError {
    /// Reading the source file (or writing an export) failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The score document is not well-formed XML
    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),

    /// The compressed container could not be opened or read
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// The bytes were readable but do not describe a score
    #[error("Decode error: {0}")]
    Decode(String),

    /// No score source is registered for this format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A score without tracks cannot seed the track selection
    #[error("Score has no tracks")]
    NoTracks,

    /// A track index that is not part of the loaded score
    #[error("Unknown track index {0}")]
    UnknownTrack(usize),

    /// An operation that needs a loaded score was called without one
    #[error("No score loaded")]
    NotLoaded,

    /// Viewer configuration could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// The layout engine stopped talking to the renderer
    #[error("Render engine error: {0}")]
    Engine(String),
}

pub type Result<T> = std::result::Result<T, ViewerError>;

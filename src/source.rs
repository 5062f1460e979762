//! Score sources: turning raw file bytes into a [`Score`].
//!
//! [`ScoreLoader`] dispatches between the registered [`ScoreSource`]s,
//! first by extension hint and then by sniffing the content. MusicXML
//! (plain and compressed) is built in; Guitar Pro decoders are supplied
//! by the embedding application.

use std::collections::HashMap;

use crate::error::{Result, ViewerError};
use crate::model::Score;
use crate::settings::RenderSettings;
use crate::{mxl, parser};

/// File extensions the viewer registers with the host.
pub const VIEW_EXTENSIONS: &[&str] = &["gtp", "gp", "gp3", "gp4", "gp5", "gpx", "musicxml", "mxl"];

/// Formats a score can arrive in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreFormat {
    /// Guitar Pro 3-5 (`.gp3`, `.gp4`, `.gp5`, `.gtp`)
    GuitarPro,
    /// Guitar Pro 6 (`.gpx`)
    GuitarPro6,
    /// Guitar Pro 7+ (`.gp`)
    GuitarPro7,
    /// Uncompressed MusicXML
    MusicXml,
    /// Compressed MusicXML
    Mxl,
}

impl ScoreFormat {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "gtp" | "gp3" | "gp4" | "gp5" => Some(Self::GuitarPro),
            "gpx" => Some(Self::GuitarPro6),
            "gp" => Some(Self::GuitarPro7),
            "musicxml" | "xml" => Some(Self::MusicXml),
            "mxl" => Some(Self::Mxl),
            _ => None,
        }
    }

    /// Guess the format from the leading bytes.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        // GP3-5 start with a length-prefixed "FICHIER GUITAR PRO v3.00" banner
        if data.len() > 19 && &data[1..19] == b"FICHIER GUITAR PRO" {
            return Some(Self::GuitarPro);
        }
        if data.starts_with(b"BCFZ") || data.starts_with(b"BCFS") {
            return Some(Self::GuitarPro6);
        }
        if data.starts_with(b"PK\x03\x04") {
            // Both .gp and .mxl are ZIP containers
            return if contains(data, b"Content/score.gpif") {
                Some(Self::GuitarPro7)
            } else {
                Some(Self::Mxl)
            };
        }
        let text = String::from_utf8_lossy(&data[..data.len().min(512)]);
        text.trim_start_matches('\u{feff}')
            .trim_start()
            .starts_with('<')
            .then_some(Self::MusicXml)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::GuitarPro => "Guitar Pro 3-5",
            Self::GuitarPro6 => "Guitar Pro 6",
            Self::GuitarPro7 => "Guitar Pro 7",
            Self::MusicXml => "MusicXML",
            Self::Mxl => "compressed MusicXML",
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Decodes one family of score files.
pub trait ScoreSource: Send + Sync {
    /// Decode a score. Fails on malformed input.
    fn load_score_from_bytes(&self, data: &[u8], settings: &RenderSettings) -> Result<Score>;
}

/// Built-in source for plain and compressed MusicXML.
#[derive(Debug, Default, Clone, Copy)]
pub struct MusicXmlSource;

impl ScoreSource for MusicXmlSource {
    fn load_score_from_bytes(&self, data: &[u8], _settings: &RenderSettings) -> Result<Score> {
        if data.starts_with(b"PK") {
            return mxl::parse_mxl(data);
        }
        let xml = std::str::from_utf8(data)
            .map_err(|e| ViewerError::Decode(format!("invalid UTF-8 in MusicXML file: {e}")))?;
        parser::parse_musicxml(xml.trim_start_matches('\u{feff}'))
    }
}

/// Registry of score sources keyed by format.
pub struct ScoreLoader {
    sources: HashMap<ScoreFormat, Box<dyn ScoreSource>>,
}

impl Default for ScoreLoader {
    fn default() -> Self {
        let mut loader = Self::empty();
        loader.register(ScoreFormat::MusicXml, Box::new(MusicXmlSource));
        loader.register(ScoreFormat::Mxl, Box::new(MusicXmlSource));
        loader
    }
}

impl ScoreLoader {
    /// A loader with no sources at all.
    pub fn empty() -> Self {
        Self {
            sources: HashMap::new(),
        }
    }

    /// Register (or replace) the source for a format.
    pub fn register(&mut self, format: ScoreFormat, source: Box<dyn ScoreSource>) {
        self.sources.insert(format, source);
    }

    pub fn supports(&self, format: ScoreFormat) -> bool {
        self.sources.contains_key(&format)
    }

    /// Decode `data`. The content is sniffed first; the extension hint is
    /// used when sniffing is inconclusive.
    pub fn load_score_from_bytes(
        &self,
        data: &[u8],
        extension: Option<&str>,
        settings: &RenderSettings,
    ) -> Result<Score> {
        let format = ScoreFormat::sniff(data)
            .or_else(|| extension.and_then(ScoreFormat::from_extension))
            .ok_or_else(|| ViewerError::UnsupportedFormat("unrecognized score data".into()))?;

        let source = self.sources.get(&format).ok_or_else(|| {
            ViewerError::UnsupportedFormat(format!("no decoder registered for {}", format.name()))
        })?;

        log::info!("decoding {} bytes as {}", data.len(), format.name());
        source.load_score_from_bytes(data, settings)
    }
}

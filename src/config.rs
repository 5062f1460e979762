//! Viewer configuration.
//!
//! Every field has a default, so a host only has to supply the keys it
//! wants to change:
//!
//! ```
//! let config = tabview::ViewerConfig::from_json(r#"{ "max_width": 640 }"#).unwrap();
//! assert_eq!(config.max_width, 640.0);
//! assert_eq!(config.scale, 0.8);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Visual scale factor applied to the engraving
    pub scale: f64,
    /// Upper bound for the render width, in SVG user units
    pub max_width: f64,
    /// Width used when the host reports no usable width
    pub fallback_width: f64,
    /// Materialize layout units only when the renderer asks for them
    pub lazy_loading: bool,
    /// Run layout on a background thread
    pub use_workers: bool,
    /// Inserted between rendered chunks in the final markup
    pub chunk_separator: String,
    /// Placeholder shown while a file is being decoded and rendered
    pub loading_text: String,
    /// Allow the user to deselect every track
    pub allow_empty_selection: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            scale: 0.8,
            max_width: 800.0,
            fallback_width: 800.0,
            lazy_loading: true,
            use_workers: true,
            chunk_separator: "\n".to_string(),
            loading_text: "Loading GTP...".to_string(),
            allow_empty_selection: false,
        }
    }
}

impl ViewerConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Render width for a host-reported available width.
    pub fn effective_width(&self, available: f64) -> f64 {
        let width = if available > 0.0 { available } else { self.fallback_width };
        width.min(self.max_width)
    }
}

//! Render settings handed to the layout engine.
//!
//! Settings are rebuilt before every render pass so that theme and width
//! changes in the host take effect immediately. The theme is an explicit
//! input; nothing here inspects host presentation state.

use serde::{Deserialize, Serialize};

use crate::config::ViewerConfig;

/// An RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// CSS hex notation, e.g. `#646cff`.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// The named colors used while engraving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderingResources {
    pub staff_line_color: Color,
    pub bar_separator_color: Color,
    pub bar_number_color: Color,
    pub main_glyph_color: Color,
    pub secondary_glyph_color: Color,
    pub score_info_color: Color,
}

impl RenderingResources {
    pub const DARK: Self = Self {
        staff_line_color: Color::new(221, 221, 221),
        bar_separator_color: Color::new(221, 221, 221),
        bar_number_color: Color::new(100, 108, 255),
        main_glyph_color: Color::new(238, 238, 238),
        secondary_glyph_color: Color::new(232, 232, 232),
        score_info_color: Color::new(248, 248, 248),
    };

    pub const LIGHT: Self = Self {
        staff_line_color: Color::new(34, 34, 34),
        bar_separator_color: Color::new(34, 34, 34),
        bar_number_color: Color::new(100, 108, 255),
        main_glyph_color: Color::new(17, 17, 17),
        secondary_glyph_color: Color::new(24, 24, 24),
        score_info_color: Color::new(8, 8, 8),
    };

    pub fn for_theme(dark_mode: bool) -> Self {
        if dark_mode {
            Self::DARK
        } else {
            Self::LIGHT
        }
    }

    /// The six palette entries in declaration order.
    pub fn colors(&self) -> [Color; 6] {
        [
            self.staff_line_color,
            self.bar_separator_color,
            self.bar_number_color,
            self.main_glyph_color,
            self.secondary_glyph_color,
            self.score_info_color,
        ]
    }
}

/// Output mode of the layout engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderEngine {
    Svg,
}

/// Player-related switches. Playback itself belongs to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSettings {
    pub enable_player: bool,
    pub enable_cursor: bool,
    pub enable_user_interaction: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    pub scale: f64,
    pub engine: RenderEngine,
    pub lazy_loading: bool,
    pub use_workers: bool,
    pub player: PlayerSettings,
    /// Render width in SVG user units, already clamped
    pub width: f64,
    pub resources: RenderingResources,
}

impl RenderSettings {
    /// Build settings with the default configuration.
    pub fn build(dark_mode: bool, width: f64) -> Self {
        Self::build_with(&ViewerConfig::default(), dark_mode, width)
    }

    pub fn build_with(config: &ViewerConfig, dark_mode: bool, width: f64) -> Self {
        Self {
            scale: config.scale,
            engine: RenderEngine::Svg,
            lazy_loading: config.lazy_loading,
            use_workers: config.use_workers,
            player: PlayerSettings {
                enable_player: true,
                enable_cursor: true,
                enable_user_interaction: true,
            },
            width: config.effective_width(width),
            resources: RenderingResources::for_theme(dark_mode),
        }
    }
}

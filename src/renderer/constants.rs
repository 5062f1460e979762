//! Shared constants for the tablature renderer (unscaled SVG user units).

// ── Page & margins ──────────────────────────────────────────────────
pub(super) const PAGE_MARGIN_LEFT: f64 = 20.0;
pub(super) const PAGE_MARGIN_RIGHT: f64 = 20.0;
pub(super) const TRACK_LABEL_WIDTH: f64 = 60.0; // column for track names left of the staves

// ── Header ──────────────────────────────────────────────────────────
pub(super) const HEADER_TOP: f64 = 20.0;
pub(super) const TITLE_SIZE: f64 = 24.0;
pub(super) const SUBTITLE_SIZE: f64 = 15.0;
pub(super) const INFO_SIZE: f64 = 11.0;
pub(super) const HEADER_BOTTOM: f64 = 16.0;

// ── Staff dimensions ────────────────────────────────────────────────
pub(super) const STAFF_LINE_SPACING: f64 = 8.0; // 5-line staff
pub(super) const STAFF_HEIGHT: f64 = 4.0 * STAFF_LINE_SPACING;
pub(super) const TAB_LINE_SPACING: f64 = 11.0; // tablature strings
pub(super) const STAFF_LINE_WIDTH: f64 = 0.8;
pub(super) const BARLINE_WIDTH: f64 = 1.0;
pub(super) const STAFF_GAP: f64 = 30.0; // between stacked tracks in one system
pub(super) const SYSTEM_TOP_PADDING: f64 = 22.0; // room for bar numbers
pub(super) const SYSTEM_BOTTOM_PADDING: f64 = 26.0;

// ── Measure packing ─────────────────────────────────────────────────
pub(super) const MIN_MEASURE_WIDTH: f64 = 60.0;
pub(super) const PER_ONSET_WIDTH: f64 = 22.0;
pub(super) const MEASURE_PADDING: f64 = 12.0; // left and right inner padding
pub(super) const TIME_SIG_SPACE: f64 = 22.0;

// ── Notes ───────────────────────────────────────────────────────────
pub(super) const FRET_FONT_SIZE: f64 = 10.0;
pub(super) const NOTEHEAD_RX: f64 = 4.6;
pub(super) const NOTEHEAD_RY: f64 = 3.4;
pub(super) const STEM_LENGTH: f64 = 26.0;
pub(super) const STEM_WIDTH: f64 = 1.1;
pub(super) const LEDGER_LINE_EXTEND: f64 = 4.0;
pub(super) const GRACE_OFFSET: f64 = 9.0; // grace notes sit left of their main note
pub(super) const BAR_NUMBER_SIZE: f64 = 9.0;
pub(super) const LABEL_SIZE: f64 = 10.0;

//! Header, staff, barline, bar number, time signature, and track label rendering.

use super::constants::*;
use super::layout::{HeaderLine, MeasureLayout, StaffKind, StaffLayout, SystemLayout};
use super::notes;
use super::svg_builder::SvgBuilder;
use crate::model::{Score, TimeSignature};
use crate::settings::RenderingResources;

/// Palette colors as SVG paint strings.
pub(super) struct Palette {
    pub(super) staff_line: String,
    pub(super) bar_separator: String,
    pub(super) bar_number: String,
    pub(super) main_glyph: String,
    pub(super) secondary_glyph: String,
    pub(super) score_info: String,
}

impl From<&RenderingResources> for Palette {
    fn from(res: &RenderingResources) -> Self {
        Self {
            staff_line: res.staff_line_color.to_hex(),
            bar_separator: res.bar_separator_color.to_hex(),
            bar_number: res.bar_number_color.to_hex(),
            main_glyph: res.main_glyph_color.to_hex(),
            secondary_glyph: res.secondary_glyph_color.to_hex(),
            score_info: res.score_info_color.to_hex(),
        }
    }
}

/// What a system needs to know besides its layout.
pub(super) struct SystemContext<'a> {
    pub(super) score: &'a Score,
    pub(super) palette: &'a Palette,
    pub(super) interactive: bool,
    /// More than one track is shown
    pub(super) multi_track: bool,
}

// ═══════════════════════════════════════════════════════════════════════
// Header rendering
// ═══════════════════════════════════════════════════════════════════════

pub(super) fn render_header(svg: &mut SvgBuilder, lines: &[HeaderLine], palette: &Palette, page_width: f64) {
    let center_x = page_width / 2.0;
    for line in lines {
        let weight = if line.bold { "bold" } else { "normal" };
        svg.text(center_x, line.y, &line.text, line.size, weight, &palette.score_info, "middle");
    }
}

// ═══════════════════════════════════════════════════════════════════════
// System rendering
// ═══════════════════════════════════════════════════════════════════════

pub(super) fn render_system(svg: &mut SvgBuilder, system: &SystemLayout, ctx: &SystemContext) {
    for staff in &system.staves {
        let Some(track) = ctx.score.track(staff.track) else {
            continue;
        };

        render_staff_lines(svg, system.left, system.right, staff, &ctx.palette.staff_line);
        render_track_label(svg, system, staff, ctx, &track.name, &track.short_name);

        for slot in &system.measures {
            let Some(measure) = track.measures.get(slot.index) else {
                continue;
            };
            if ctx.interactive {
                svg.open_group(&[
                    ("class", "at-bar".to_string()),
                    ("data-track", track.index.to_string()),
                    ("data-bar", slot.index.to_string()),
                ]);
            }
            if slot.show_time {
                render_time_signature(svg, slot, staff, &measure.time, &ctx.palette.secondary_glyph);
            }
            match staff.kind {
                StaffKind::Tab { strings } => {
                    notes::render_tab_measure(svg, track, measure, slot, staff.y, strings, ctx.palette)
                }
                StaffKind::Standard => {
                    notes::render_standard_measure(svg, track, measure, slot, staff.y, ctx.palette)
                }
            }
            if ctx.interactive {
                svg.close_group();
            }
        }

        render_barlines(svg, system, staff, &ctx.palette.bar_separator);
    }

    if let Some(top) = system.staves.first() {
        for slot in &system.measures {
            let number = system
                .staves
                .iter()
                .filter_map(|s| ctx.score.track(s.track))
                .find_map(|t| t.measures.get(slot.index))
                .map_or(slot.index as i32 + 1, |m| m.number);
            svg.text(
                slot.x + 2.0,
                top.y - 6.0,
                &number.to_string(),
                BAR_NUMBER_SIZE,
                "normal",
                &ctx.palette.bar_number,
                "start",
            );
        }
    }
}

fn line_count(kind: StaffKind) -> usize {
    match kind {
        StaffKind::Tab { strings } => strings.max(1),
        StaffKind::Standard => 5,
    }
}

fn line_spacing(kind: StaffKind) -> f64 {
    match kind {
        StaffKind::Tab { .. } => TAB_LINE_SPACING,
        StaffKind::Standard => STAFF_LINE_SPACING,
    }
}

pub(super) fn render_staff_lines(svg: &mut SvgBuilder, x1: f64, x2: f64, staff: &StaffLayout, color: &str) {
    let spacing = line_spacing(staff.kind);
    for i in 0..line_count(staff.kind) {
        let y = staff.y + i as f64 * spacing;
        svg.line(x1, y, x2, y, color, STAFF_LINE_WIDTH);
    }
}

fn render_track_label(
    svg: &mut SvgBuilder,
    system: &SystemLayout,
    staff: &StaffLayout,
    ctx: &SystemContext,
    name: &str,
    short_name: &str,
) {
    // Full names open the score; later systems only need them to tell tracks apart
    let label = if system.number == 0 {
        name
    } else if ctx.multi_track {
        short_name
    } else {
        return;
    };
    if label.is_empty() {
        return;
    }
    let mid = staff.y + staff.kind.height() / 2.0 + LABEL_SIZE * 0.35;
    svg.text(
        system.left - 6.0,
        mid,
        label,
        LABEL_SIZE,
        "normal",
        &ctx.palette.score_info,
        "end",
    );
}

// ═══════════════════════════════════════════════════════════════════════
// Barlines and time signatures
// ═══════════════════════════════════════════════════════════════════════

fn render_barlines(svg: &mut SvgBuilder, system: &SystemLayout, staff: &StaffLayout, color: &str) {
    let top = staff.y;
    let bottom = staff.y + staff.kind.height();
    svg.line(system.left, top, system.left, bottom, color, BARLINE_WIDTH);
    for slot in &system.measures {
        let x = slot.x + slot.width;
        svg.line(x, top, x, bottom, color, BARLINE_WIDTH);
    }
}

fn render_time_signature(
    svg: &mut SvgBuilder,
    slot: &MeasureLayout,
    staff: &StaffLayout,
    time: &TimeSignature,
    color: &str,
) {
    let height = staff.kind.height();
    let size = (height / 2.0).clamp(12.0, 24.0);
    let x = slot.x + MEASURE_PADDING / 2.0 + TIME_SIG_SPACE / 2.0;
    let mid = staff.y + height / 2.0;
    svg.text(x, mid - 1.0, &time.beats.to_string(), size, "bold", color, "middle");
    svg.text(x, mid + size * 0.8, &time.beat_type.to_string(), size, "bold", color, "middle");
}

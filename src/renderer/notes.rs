//! Fret number, notehead, stem, ledger line, and rest rendering.

use super::constants::*;
use super::layout::MeasureLayout;
use super::staff::Palette;
use super::svg_builder::SvgBuilder;
use crate::model::{Measure, Note, Pitch, Track};

fn note_x(slot: &MeasureLayout, measure: &Measure, note: &Note) -> f64 {
    let x = slot.onset_x(measure, note.start);
    if note.grace {
        x - GRACE_OFFSET
    } else {
        x
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Tablature
// ═══════════════════════════════════════════════════════════════════════

pub(super) fn render_tab_measure(
    svg: &mut SvgBuilder,
    track: &Track,
    measure: &Measure,
    slot: &MeasureLayout,
    staff_y: f64,
    strings: usize,
    palette: &Palette,
) {
    let middle = staff_y + (strings.saturating_sub(1)) as f64 * TAB_LINE_SPACING / 2.0;

    for note in &measure.notes {
        let x = note_x(slot, measure, note);

        if note.rest {
            render_rest(svg, x, middle, note.note_type.as_deref(), &palette.secondary_glyph);
            continue;
        }

        let Some((string, fret)) = track.tab_position(note) else {
            log::debug!("no tab position for note in bar {} of {}", measure.number, track.name);
            continue;
        };
        let string = (string.max(1) as usize).min(strings.max(1));
        let y = staff_y + (string - 1) as f64 * TAB_LINE_SPACING;

        // Tied continuations are shown in parentheses
        let label = if note.tie_stop {
            format!("({fret})")
        } else {
            fret.to_string()
        };
        let size = if note.grace { FRET_FONT_SIZE * 0.75 } else { FRET_FONT_SIZE };
        svg.text(x, y + size * 0.35, &label, size, "normal", &palette.main_glyph, "middle");

        if note.dot && !note.chord {
            svg.circle(x + size * 0.8, y + TAB_LINE_SPACING / 2.0, 1.4, &palette.main_glyph);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Standard notation
// ═══════════════════════════════════════════════════════════════════════

/// Diatonic step count from C0.
fn diatonic(pitch: &Pitch) -> i32 {
    let step = match pitch.step.as_str() {
        "C" => 0,
        "D" => 1,
        "E" => 2,
        "F" => 3,
        "G" => 4,
        "A" => 5,
        "B" => 6,
        _ => 0,
    };
    pitch.octave * 7 + step
}

/// Whether the track sits low enough for a bass clef.
fn uses_bass_clef(track: &Track) -> bool {
    let pitches: Vec<i32> = track
        .measures
        .iter()
        .flat_map(|m| &m.notes)
        .filter_map(|n| n.pitch.as_ref())
        .map(Pitch::to_midi)
        .collect();
    if pitches.is_empty() {
        return false;
    }
    let average = pitches.iter().sum::<i32>() as f64 / pitches.len() as f64;
    average < 55.0
}

/// Vertical position of a pitch on a 5-line staff.
pub(super) fn pitch_y(pitch: &Pitch, staff_y: f64, bass: bool) -> f64 {
    // Bottom line: E4 in treble, G2 in bass
    let bottom = if bass { 2 * 7 + 4 } else { 4 * 7 + 2 };
    staff_y + STAFF_HEIGHT - (diatonic(pitch) - bottom) as f64 * STAFF_LINE_SPACING / 2.0
}

fn is_filled(note_type: Option<&str>) -> bool {
    !matches!(note_type, Some("whole") | Some("half") | Some("breve"))
}

fn flag_count(note_type: Option<&str>) -> usize {
    match note_type {
        Some("eighth") => 1,
        Some("16th") => 2,
        Some("32nd") => 3,
        Some("64th") => 4,
        _ => 0,
    }
}

pub(super) fn render_standard_measure(
    svg: &mut SvgBuilder,
    track: &Track,
    measure: &Measure,
    slot: &MeasureLayout,
    staff_y: f64,
    palette: &Palette,
) {
    let bass = uses_bass_clef(track);

    for note in &measure.notes {
        let x = note_x(slot, measure, note);

        if note.rest {
            render_rest(svg, x, staff_y + STAFF_HEIGHT / 2.0, note.note_type.as_deref(), &palette.secondary_glyph);
            continue;
        }
        let Some(ref pitch) = note.pitch else {
            continue;
        };

        let y = pitch_y(pitch, staff_y, bass);
        let scale = if note.grace { 0.66 } else { 1.0 };
        let rx = NOTEHEAD_RX * scale;

        render_ledger_lines(svg, x, y, staff_y, rx, &palette.staff_line);

        let filled = is_filled(note.note_type.as_deref());
        let fill = if filled { palette.main_glyph.as_str() } else { "none" };
        svg.ellipse(x, y, rx, NOTEHEAD_RY * scale, fill, &palette.main_glyph);

        match pitch.alter.map(|a| a.round() as i32) {
            Some(a) if a > 0 => svg.text(x - rx - 5.0, y + 4.0, "♯", 11.0, "normal", &palette.main_glyph, "middle"),
            Some(a) if a < 0 => svg.text(x - rx - 5.0, y + 4.0, "♭", 11.0, "normal", &palette.main_glyph, "middle"),
            _ => {}
        }

        if note.dot {
            svg.circle(x + rx + 3.5, y - 1.5, 1.5, &palette.main_glyph);
        }

        if note.note_type.as_deref() != Some("whole") && !note.chord {
            let stem_up = y >= staff_y + STAFF_HEIGHT / 2.0;
            let length = STEM_LENGTH * scale;
            let (stem_x, end_y) = if stem_up {
                (x + rx - 0.5, y - length)
            } else {
                (x - rx + 0.5, y + length)
            };
            svg.line(stem_x, y, stem_x, end_y, &palette.main_glyph, STEM_WIDTH);

            let direction = if stem_up { 1.0 } else { -1.0 };
            for i in 0..flag_count(note.note_type.as_deref()) {
                let fy = end_y + direction * i as f64 * 5.0;
                svg.line(stem_x, fy, stem_x + 6.0 * scale, fy + direction * 8.0, &palette.main_glyph, STEM_WIDTH);
            }
        }
    }
}

fn render_ledger_lines(svg: &mut SvgBuilder, x: f64, note_y: f64, staff_y: f64, rx: f64, color: &str) {
    let top = staff_y;
    let bottom = staff_y + STAFF_HEIGHT;
    let (x1, x2) = (x - rx - LEDGER_LINE_EXTEND, x + rx + LEDGER_LINE_EXTEND);

    let mut y = top - STAFF_LINE_SPACING;
    while y >= note_y - 1.0 {
        svg.line(x1, y, x2, y, color, STAFF_LINE_WIDTH);
        y -= STAFF_LINE_SPACING;
    }

    let mut y = bottom + STAFF_LINE_SPACING;
    while y <= note_y + 1.0 {
        svg.line(x1, y, x2, y, color, STAFF_LINE_WIDTH);
        y += STAFF_LINE_SPACING;
    }
}

// ── Rest rendering ──────────────────────────────────────────────────

fn render_rest(svg: &mut SvgBuilder, x: f64, middle_y: f64, note_type: Option<&str>, color: &str) {
    match note_type {
        Some("whole") | None => svg.rect(x - 5.0, middle_y - 4.0, 10.0, 4.0, color),
        Some("half") => svg.rect(x - 5.0, middle_y, 10.0, 4.0, color),
        Some(other) => {
            let path = format!(
                "M{:.1},{:.1} L{:.1},{:.1} L{:.1},{:.1} L{:.1},{:.1}",
                x - 2.0,
                middle_y - 9.0,
                x + 3.0,
                middle_y - 3.0,
                x - 2.0,
                middle_y + 2.0,
                x + 3.0,
                middle_y + 8.0,
            );
            svg.path(&path, "none", color, 1.8);
            for i in 0..flag_count(Some(other)) {
                svg.circle(x - 2.0, middle_y - 6.0 + i as f64 * 5.0, 1.6, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pitch(step: &str, octave: i32) -> Pitch {
        Pitch { step: step.into(), octave, alter: None }
    }

    #[test]
    fn treble_staff_positions() {
        let staff_y = 100.0;
        assert_eq!(pitch_y(&pitch("E", 4), staff_y, false), staff_y + STAFF_HEIGHT);
        assert_eq!(pitch_y(&pitch("F", 5), staff_y, false), staff_y);
        assert_eq!(pitch_y(&pitch("B", 4), staff_y, false), staff_y + STAFF_HEIGHT / 2.0);
    }

    #[test]
    fn bass_staff_positions() {
        let staff_y = 0.0;
        assert_eq!(pitch_y(&pitch("G", 2), staff_y, true), STAFF_HEIGHT);
        assert_eq!(pitch_y(&pitch("A", 3), staff_y, true), 0.0);
    }

    #[test]
    fn note_values() {
        assert!(is_filled(Some("quarter")));
        assert!(is_filled(None));
        assert!(!is_filled(Some("half")));
        assert_eq!(flag_count(Some("16th")), 2);
        assert_eq!(flag_count(Some("quarter")), 0);
    }
}

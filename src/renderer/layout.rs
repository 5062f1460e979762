//! Layout computation: splits the score into render units: an optional
//! header followed by systems, each holding as many measures as fit in the
//! page width with every selected track stacked.

use super::constants::*;
use crate::model::{Measure, Score, Track};

// ═══════════════════════════════════════════════════════════════════════
// Layout structures
// ═══════════════════════════════════════════════════════════════════════

pub(super) struct ScoreLayout {
    pub(super) page_width: f64,
    pub(super) units: Vec<LayoutUnit>,
}

pub(super) struct LayoutUnit {
    pub(super) id: u32,
    pub(super) y: f64,
    pub(super) height: f64,
    pub(super) kind: UnitKind,
}

pub(super) enum UnitKind {
    Header(Vec<HeaderLine>),
    System(SystemLayout),
}

pub(super) struct HeaderLine {
    pub(super) text: String,
    pub(super) size: f64,
    pub(super) bold: bool,
    /// Baseline relative to the top of the header
    pub(super) y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum StaffKind {
    Tab { strings: usize },
    Standard,
}

impl StaffKind {
    pub(super) fn of(track: &Track) -> Self {
        if track.is_tablature() {
            Self::Tab {
                strings: track.string_count(),
            }
        } else {
            Self::Standard
        }
    }

    pub(super) fn height(self) -> f64 {
        match self {
            Self::Tab { strings } => strings.saturating_sub(1).max(1) as f64 * TAB_LINE_SPACING,
            Self::Standard => STAFF_HEIGHT,
        }
    }
}

pub(super) struct StaffLayout {
    pub(super) track: usize,
    pub(super) kind: StaffKind,
    /// Top line, relative to the top of the system
    pub(super) y: f64,
}

pub(super) struct MeasureLayout {
    pub(super) index: usize,
    pub(super) x: f64,
    pub(super) width: f64,
    pub(super) show_time: bool,
}

impl MeasureLayout {
    /// Horizontal position of an onset, proportional to its time offset.
    pub(super) fn onset_x(&self, measure: &Measure, start: i32) -> f64 {
        let left = self.x + MEASURE_PADDING + if self.show_time { TIME_SIG_SPACE } else { 0.0 };
        let usable = (self.x + self.width - MEASURE_PADDING - left).max(0.0);
        let length = measure.effective_length().max(1) as f64;
        left + usable * (start.max(0) as f64 / length).min(1.0)
    }
}

pub(super) struct SystemLayout {
    /// Zero-based system number
    pub(super) number: usize,
    pub(super) measures: Vec<MeasureLayout>,
    pub(super) staves: Vec<StaffLayout>,
    pub(super) left: f64,
    pub(super) right: f64,
}

// ═══════════════════════════════════════════════════════════════════════
// Header
// ═══════════════════════════════════════════════════════════════════════

fn header_lines(score: &Score) -> Vec<HeaderLine> {
    let mut raw: Vec<(String, f64, bool)> = Vec::new();
    let non_empty = |s: &Option<String>| s.as_deref().filter(|s| !s.trim().is_empty()).map(str::to_string);

    if let Some(title) = non_empty(&score.title) {
        raw.push((title, TITLE_SIZE, true));
    }
    if let Some(subtitle) = non_empty(&score.subtitle) {
        raw.push((subtitle, SUBTITLE_SIZE, false));
    }
    if let Some(artist) = non_empty(&score.artist) {
        raw.push((artist, SUBTITLE_SIZE, false));
    }
    if let Some(album) = non_empty(&score.album) {
        raw.push((album, INFO_SIZE, false));
    }
    match (non_empty(&score.words), non_empty(&score.music)) {
        (Some(w), Some(m)) if w == m => raw.push((format!("Words & Music by {w}"), INFO_SIZE, false)),
        (words, music) => {
            if let Some(w) = words {
                raw.push((format!("Words by {w}"), INFO_SIZE, false));
            }
            if let Some(m) = music {
                raw.push((format!("Music by {m}"), INFO_SIZE, false));
            }
        }
    }
    if let Some(copyright) = non_empty(&score.copyright) {
        raw.push((copyright, INFO_SIZE, false));
    }

    let mut y = HEADER_TOP;
    raw.into_iter()
        .map(|(text, size, bold)| {
            y += size * 1.3;
            HeaderLine { text, size, bold, y }
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════
// Measure sizing
// ═══════════════════════════════════════════════════════════════════════

/// Distinct onsets of a measure (grace notes excluded), ascending.
pub(super) fn onsets(measure: &Measure) -> Vec<i32> {
    let mut starts: Vec<i32> = measure.notes.iter().filter(|n| !n.grace).map(|n| n.start).collect();
    starts.sort_unstable();
    starts.dedup();
    starts
}

fn show_time_signature(tracks: &[&Track], index: usize) -> bool {
    index == 0
        || tracks
            .iter()
            .filter_map(|t| t.measures.get(index))
            .any(|m| m.time_changed)
}

fn natural_width(tracks: &[&Track], index: usize, show_time: bool) -> f64 {
    let busiest = tracks
        .iter()
        .filter_map(|t| t.measures.get(index))
        .map(|m| onsets(m).len())
        .max()
        .unwrap_or(0);
    let width = (busiest as f64 * PER_ONSET_WIDTH + 2.0 * MEASURE_PADDING).max(MIN_MEASURE_WIDTH);
    if show_time {
        width + TIME_SIG_SPACE
    } else {
        width
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Main layout computation
// ═══════════════════════════════════════════════════════════════════════

pub(super) fn compute_layout(score: &Score, selected: &[usize], page_width: f64) -> ScoreLayout {
    let mut units = Vec::new();
    let mut y = 0.0;

    // Nothing selected renders nothing, not even the header
    let tracks: Vec<&Track> = selected.iter().filter_map(|&i| score.track(i)).collect();
    if tracks.is_empty() {
        return ScoreLayout { page_width, units };
    }

    if score.has_header() {
        let lines = header_lines(score);
        let height = lines.last().map_or(HEADER_TOP, |l| l.y) + HEADER_BOTTOM;
        units.push(LayoutUnit {
            id: 0,
            y,
            height,
            kind: UnitKind::Header(lines),
        });
        y += height;
    }

    let measure_count = tracks.iter().map(|t| t.measures.len()).max().unwrap_or(0);
    if measure_count == 0 {
        return ScoreLayout { page_width, units };
    }

    // Stack the staves once; every system shares the same vertical layout
    let mut staves = Vec::with_capacity(tracks.len());
    let mut staff_y = SYSTEM_TOP_PADDING;
    for track in &tracks {
        let kind = StaffKind::of(track);
        staves.push((track.index, kind, staff_y));
        staff_y += kind.height() + STAFF_GAP;
    }
    let system_height = staff_y - STAFF_GAP + SYSTEM_BOTTOM_PADDING;

    let left = PAGE_MARGIN_LEFT + TRACK_LABEL_WIDTH;
    let right = page_width - PAGE_MARGIN_RIGHT;
    let available = (right - left).max(MIN_MEASURE_WIDTH);

    // Greedy packing of natural widths
    let mut groups: Vec<Vec<(usize, f64, bool)>> = Vec::new();
    let mut current: Vec<(usize, f64, bool)> = Vec::new();
    let mut used = 0.0;
    for index in 0..measure_count {
        let show_time = show_time_signature(&tracks, index);
        let width = natural_width(&tracks, index, show_time).min(available);
        if !current.is_empty() && used + width > available {
            groups.push(std::mem::take(&mut current));
            used = 0.0;
        }
        used += width;
        current.push((index, width, show_time));
    }
    if !current.is_empty() {
        groups.push(current);
    }

    let last = groups.len().saturating_sub(1);
    for (number, group) in groups.into_iter().enumerate() {
        let natural: f64 = group.iter().map(|(_, w, _)| w).sum();
        // Every system but the last is stretched to the full width
        let stretch = if number < last && natural > 0.0 {
            available / natural
        } else {
            1.0
        };

        let mut x = left;
        let measures = group
            .into_iter()
            .map(|(index, width, show_time)| {
                let width = width * stretch;
                let m = MeasureLayout { index, x, width, show_time };
                x += width;
                m
            })
            .collect();

        units.push(LayoutUnit {
            id: units.len() as u32,
            y,
            height: system_height,
            kind: UnitKind::System(SystemLayout {
                number,
                measures,
                staves: staves
                    .iter()
                    .map(|&(track, kind, y)| StaffLayout { track, kind, y })
                    .collect(),
                left,
                right: x,
            }),
        });
        y += system_height;
    }

    ScoreLayout { page_width, units }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Note, TimeSignature};

    fn measure(onsets: &[i32]) -> Measure {
        Measure {
            number: 1,
            divisions: 1,
            time: TimeSignature::default(),
            notes: onsets
                .iter()
                .map(|&start| Note {
                    start,
                    duration: 1,
                    fret: Some(0),
                    string: Some(1),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn score(measures: usize, tracks: usize) -> Score {
        Score {
            title: Some("Song".into()),
            tracks: (0..tracks)
                .map(|index| Track {
                    index,
                    name: format!("Guitar {index}"),
                    measures: (0..measures).map(|_| measure(&[0, 1, 2, 3])).collect(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn systems(layout: &ScoreLayout) -> Vec<&SystemLayout> {
        layout
            .units
            .iter()
            .filter_map(|u| match &u.kind {
                UnitKind::System(s) => Some(s),
                UnitKind::Header(_) => None,
            })
            .collect()
    }

    #[test]
    fn header_is_first_unit() {
        let layout = compute_layout(&score(2, 1), &[0], 1000.0);
        assert!(matches!(layout.units[0].kind, UnitKind::Header(_)));
        assert_eq!(layout.units[0].id, 0);
        assert!(matches!(layout.units[1].kind, UnitKind::System(_)));
    }

    #[test]
    fn no_header_without_metadata() {
        let mut s = score(2, 1);
        s.title = None;
        let layout = compute_layout(&s, &[0], 1000.0);
        assert!(matches!(layout.units[0].kind, UnitKind::System(_)));
    }

    #[test]
    fn every_measure_lands_in_exactly_one_system() {
        let layout = compute_layout(&score(37, 2), &[0, 1], 600.0);
        let indices: Vec<usize> = systems(&layout)
            .iter()
            .flat_map(|s| s.measures.iter().map(|m| m.index))
            .collect();
        assert_eq!(indices, (0..37).collect::<Vec<_>>());
        assert!(systems(&layout).len() > 1);
    }

    #[test]
    fn systems_stay_within_page_and_all_but_last_are_justified() {
        let page = 700.0;
        let layout = compute_layout(&score(25, 1), &[0], page);
        let all = systems(&layout);
        for (i, system) in all.iter().enumerate() {
            assert!(system.right <= page - PAGE_MARGIN_RIGHT + 0.01);
            if i + 1 < all.len() {
                assert!((system.right - (page - PAGE_MARGIN_RIGHT)).abs() < 0.01);
            }
        }
    }

    #[test]
    fn units_are_stacked_vertically() {
        let layout = compute_layout(&score(20, 1), &[0], 500.0);
        for pair in layout.units.windows(2) {
            assert!((pair[0].y + pair[0].height - pair[1].y).abs() < 1e-9);
        }
        let ids: Vec<u32> = layout.units.iter().map(|u| u.id).collect();
        assert_eq!(ids, (0..layout.units.len() as u32).collect::<Vec<_>>());
    }

    #[test]
    fn one_staff_per_selected_track() {
        let layout = compute_layout(&score(3, 3), &[0, 2], 800.0);
        let staves: Vec<usize> = systems(&layout)[0].staves.iter().map(|s| s.track).collect();
        assert_eq!(staves, vec![0, 2]);
    }

    #[test]
    fn empty_selection_has_no_units() {
        let layout = compute_layout(&score(3, 1), &[], 800.0);
        assert!(layout.units.is_empty());
        // Unknown indices resolve to no tracks as well
        assert!(compute_layout(&score(3, 1), &[9], 800.0).units.is_empty());
    }

    #[test]
    fn onsets_map_into_measure_bounds() {
        let m = measure(&[0, 2]);
        let slot = MeasureLayout { index: 0, x: 100.0, width: 80.0, show_time: false };
        let first = slot.onset_x(&m, 0);
        let second = slot.onset_x(&m, 2);
        assert_eq!(first, 100.0 + MEASURE_PADDING);
        assert!(second > first && second < 180.0);
    }
}

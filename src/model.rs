//! Data model for a decoded score.
//!
//! A [`Score`] is produced once by a score source and never mutated
//! afterwards; the viewer shares it behind an `Arc` for the lifetime of
//! the open file.

use serde::{Deserialize, Serialize};

/// Open-string pitches of a standard six-string guitar, highest string first.
pub const STANDARD_GUITAR_TUNING: [i32; 6] = [64, 59, 55, 50, 45, 40];

/// Highest fret considered when a fret has to be derived from a pitch.
pub const MAX_FRET: i32 = 24;

/// A complete decoded score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Score {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// Lyricist
    pub words: Option<String>,
    /// Composer
    pub music: Option<String>,
    pub copyright: Option<String>,
    /// Instrument tracks, ordered by `Track::index`
    pub tracks: Vec<Track>,
}

/// One instrument track.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Track {
    /// Stable ordering key; equal to the track's position in `Score::tracks`
    pub index: usize,
    /// Display name (e.g., "Electric Guitar")
    pub name: String,
    /// Abbreviated name (e.g., "E-Gt")
    pub short_name: String,
    /// General MIDI program, 0-based
    pub midi_program: Option<u8>,
    /// MIDI channel, 0-based
    pub midi_channel: Option<u8>,
    /// Open-string pitches (MIDI numbers) for tablature tracks, highest string first
    pub tuning: Option<Vec<i32>>,
    pub measures: Vec<Measure>,
}

/// A single measure (bar).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Measure {
    /// Printed bar number
    pub number: i32,
    /// Pickup measure whose length is given by its content, not its meter
    pub implicit: bool,
    /// Divisions per quarter note in effect for this measure
    pub divisions: i32,
    /// Time signature in effect for this measure
    pub time: TimeSignature,
    /// Whether the time signature changes at this measure
    pub time_changed: bool,
    /// Tempo marking that starts at this measure
    pub tempo: Option<f64>,
    pub notes: Vec<Note>,
}

/// Time signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub beats: i32,
    pub beat_type: i32,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self { beats: 4, beat_type: 4 }
    }
}

/// A single note or rest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Note {
    /// Pitch (None for rests and unpitched notes)
    pub pitch: Option<Pitch>,
    /// Start position from the beginning of the measure, in divisions
    pub start: i32,
    /// Duration in divisions
    pub duration: i32,
    pub voice: i32,
    /// Note type: "whole", "half", "quarter", "eighth", "16th", ...
    pub note_type: Option<String>,
    pub rest: bool,
    /// Sounds together with the previous note
    pub chord: bool,
    pub grace: bool,
    pub dot: bool,
    pub tie_start: bool,
    pub tie_stop: bool,
    /// Tablature string, 1 = highest string
    pub string: Option<i32>,
    pub fret: Option<i32>,
}

/// Pitch of a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pitch {
    /// Note name: A, B, C, D, E, F, G
    pub step: String,
    /// Octave number (middle C = C4)
    pub octave: i32,
    /// Chromatic alteration: -1.0 = flat, 1.0 = sharp
    pub alter: Option<f64>,
}

impl Score {
    /// Create a new empty score.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of measures in the longest track.
    pub fn measure_count(&self) -> usize {
        self.tracks.iter().map(|t| t.measures.len()).max().unwrap_or(0)
    }

    /// Total number of sounding notes across all tracks.
    pub fn note_count(&self) -> usize {
        self.tracks
            .iter()
            .flat_map(|t| &t.measures)
            .flat_map(|m| &m.notes)
            .filter(|n| !n.rest && !n.grace)
            .count()
    }

    /// Whether the score carries any header information.
    pub fn has_header(&self) -> bool {
        [
            &self.title,
            &self.subtitle,
            &self.artist,
            &self.album,
            &self.words,
            &self.music,
            &self.copyright,
        ]
        .iter()
        .any(|f| f.as_deref().is_some_and(|s| !s.is_empty()))
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.iter().find(|t| t.index == index)
    }
}

impl Track {
    /// Whether this track is engraved as tablature.
    pub fn is_tablature(&self) -> bool {
        self.tuning.is_some()
            || self
                .measures
                .iter()
                .flat_map(|m| &m.notes)
                .any(|n| n.fret.is_some())
    }

    /// Number of strings drawn for a tablature track.
    pub fn string_count(&self) -> usize {
        if let Some(ref tuning) = self.tuning {
            return tuning.len().max(1);
        }
        let max_string = self
            .measures
            .iter()
            .flat_map(|m| &m.notes)
            .filter_map(|n| n.string)
            .max()
            .unwrap_or(0)
            .max(0) as usize;
        max_string.max(STANDARD_GUITAR_TUNING.len())
    }

    /// Open-string pitches used for this track.
    pub fn open_strings(&self) -> Vec<i32> {
        match self.tuning {
            Some(ref t) if !t.is_empty() => t.clone(),
            _ => STANDARD_GUITAR_TUNING.to_vec(),
        }
    }

    /// Tablature position (string, fret) of a note. Explicit positions win;
    /// otherwise the fret is derived from the pitch on the highest string
    /// that can play it.
    pub fn tab_position(&self, note: &Note) -> Option<(i32, i32)> {
        if let (Some(s), Some(f)) = (note.string, note.fret) {
            return Some((s, f));
        }
        let midi = note.pitch.as_ref()?.to_midi();
        self.open_strings()
            .iter()
            .enumerate()
            .find_map(|(i, &open)| {
                let fret = midi - open;
                (0..=MAX_FRET).contains(&fret).then_some((i as i32 + 1, fret))
            })
    }
}

impl Measure {
    /// Nominal length in divisions according to the time signature.
    pub fn nominal_length(&self) -> i32 {
        let beat_type = self.time.beat_type.max(1);
        self.time.beats * 4 * self.divisions.max(1) / beat_type
    }

    /// Length in divisions actually covered by the notes.
    pub fn content_length(&self) -> i32 {
        self.notes
            .iter()
            .map(|n| n.start + n.duration)
            .max()
            .unwrap_or(0)
    }

    /// Length used for timing: pickups use their content, others their meter.
    pub fn effective_length(&self) -> i32 {
        let content = self.content_length();
        if self.implicit && content > 0 {
            content
        } else {
            self.nominal_length().max(content)
        }
    }
}

impl Pitch {
    /// Convert pitch to MIDI note number.
    /// Middle C (C4) = 60.
    pub fn to_midi(&self) -> i32 {
        let step_semitone = match self.step.as_str() {
            "C" => 0,
            "D" => 2,
            "E" => 4,
            "F" => 5,
            "G" => 7,
            "A" => 9,
            "B" => 11,
            _ => 0,
        };
        let alter = self.alter.unwrap_or(0.0).round() as i32;
        (self.octave + 1) * 12 + step_semitone + alter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pitch(step: &str, octave: i32) -> Pitch {
        Pitch { step: step.into(), octave, alter: None }
    }

    #[test]
    fn pitch_to_midi() {
        assert_eq!(pitch("C", 4).to_midi(), 60);
        assert_eq!(pitch("E", 2).to_midi(), 40);
        let f_sharp = Pitch { step: "F".into(), octave: 4, alter: Some(1.0) };
        assert_eq!(f_sharp.to_midi(), 66);
    }

    #[test]
    fn fret_is_derived_on_highest_playable_string() {
        let track = Track::default();
        let note = Note { pitch: Some(pitch("A", 4)), ..Default::default() };
        // A4 = 69 → 5th fret on the high E string
        assert_eq!(track.tab_position(&note), Some((1, 5)));

        let low = Note { pitch: Some(pitch("E", 2)), ..Default::default() };
        assert_eq!(track.tab_position(&low), Some((6, 0)));

        let too_low = Note { pitch: Some(pitch("C", 1)), ..Default::default() };
        assert_eq!(track.tab_position(&too_low), None);
    }

    #[test]
    fn explicit_tab_position_wins() {
        let track = Track::default();
        let note = Note {
            pitch: Some(pitch("A", 4)),
            string: Some(2),
            fret: Some(10),
            ..Default::default()
        };
        assert_eq!(track.tab_position(&note), Some((2, 10)));
    }

    #[test]
    fn pickup_measure_uses_content_length() {
        let measure = Measure {
            implicit: true,
            divisions: 2,
            notes: vec![Note { start: 0, duration: 2, ..Default::default() }],
            ..Default::default()
        };
        assert_eq!(measure.nominal_length(), 8);
        assert_eq!(measure.effective_length(), 2);
    }

    #[test]
    fn empty_score_has_no_header() {
        let mut score = Score::new();
        assert!(!score.has_header());
        score.title = Some(String::new());
        assert!(!score.has_header());
        score.artist = Some("Someone".into());
        assert!(score.has_header());
    }
}

//! Measure time map: answers "at which tick does each measure start?",
//! "how long is it?" and "what tempo is in effect?" for MIDI export.

use crate::model::{Measure, Score, TimeSignature};

/// Ticks per quarter note in exported MIDI.
pub const TICKS_PER_QUARTER: u32 = 480;

/// Default tempo if none is specified in the score.
pub const DEFAULT_TEMPO: f64 = 120.0;

/// Timing information for one measure.
#[derive(Debug, Clone, PartialEq)]
pub struct TimemapEntry {
    pub index: usize,
    pub start_tick: u32,
    pub length_ticks: u32,
    pub tempo_bpm: f64,
    pub time: TimeSignature,
    /// Tempo differs from the previous measure (always true for the first)
    pub tempo_changed: bool,
    /// Time signature differs from the previous measure (always true for the first)
    pub time_changed: bool,
}

/// Convert a position in divisions to ticks.
pub fn divisions_to_ticks(value: i32, divisions: i32) -> u32 {
    let divisions = divisions.max(1) as u64;
    (value.max(0) as u64 * TICKS_PER_QUARTER as u64 / divisions) as u32
}

/// The measure that defines timing at `index`: the first track that has one.
fn reference_measure(score: &Score, index: usize) -> Option<&Measure> {
    score.tracks.iter().find_map(|t| t.measures.get(index))
}

/// Build the time map over the longest track.
pub fn generate_timemap(score: &Score) -> Vec<TimemapEntry> {
    let count = score.measure_count();
    let mut entries: Vec<TimemapEntry> = Vec::with_capacity(count);
    let mut tick: u32 = 0;
    let mut tempo = DEFAULT_TEMPO;

    for index in 0..count {
        let Some(measure) = reference_measure(score, index) else {
            break;
        };

        // Tempo marks usually sit in one track only; any track may carry them
        if let Some(t) = score
            .tracks
            .iter()
            .filter_map(|t| t.measures.get(index))
            .find_map(|m| m.tempo)
            .filter(|t| *t > 0.0)
        {
            tempo = t;
        }

        let length_ticks = divisions_to_ticks(measure.effective_length(), measure.divisions);
        let (tempo_changed, time_changed) = match entries.last() {
            Some(prev) => ((prev.tempo_bpm - tempo).abs() > 0.01, prev.time != measure.time),
            None => (true, true),
        };

        entries.push(TimemapEntry {
            index,
            start_tick: tick,
            length_ticks,
            tempo_bpm: tempo,
            time: measure.time,
            tempo_changed,
            time_changed,
        });
        tick = tick.saturating_add(length_ticks);
    }

    entries
}

/// Total length of the time map in ticks.
pub fn total_ticks(timemap: &[TimemapEntry]) -> u32 {
    timemap.last().map_or(0, |e| e.start_tick + e.length_ticks)
}

/// Wall-clock length of the time map in milliseconds.
pub fn total_duration_ms(timemap: &[TimemapEntry]) -> f64 {
    timemap
        .iter()
        .map(|e| e.length_ticks as f64 / TICKS_PER_QUARTER as f64 * 60_000.0 / e.tempo_bpm)
        .sum()
}

//! MIDI export of a loaded score.
//!
//! Produces a Standard MIDI File (SMF) Type 1 as raw bytes. Track 0 is the
//! conductor track (tempo and time signature changes); every score track
//! follows on its own channel.

use crate::error::Result;
use crate::model::{Score, Track};
use crate::settings::RenderSettings;
use crate::timemap::{self, TimemapEntry, TICKS_PER_QUARTER};

/// MIME type of exported files.
pub const MIDI_MIME: &str = "audio/midi";

/// General MIDI program used when a track does not name one (Steel Guitar).
pub const DEFAULT_PROGRAM: u8 = 25;

/// General MIDI percussion channel.
const PERCUSSION_CHANNEL: u8 = 9;

const NOTE_VELOCITY: u8 = 80;

/// Turns a score into MIDI file bytes.
pub trait MidiEncoder {
    fn encode(&self, score: &Score, settings: &RenderSettings) -> Result<Vec<u8>>;
}

/// Built-in SMF Type 1 writer.
#[derive(Debug, Default, Clone, Copy)]
pub struct SmfEncoder;

impl MidiEncoder for SmfEncoder {
    fn encode(&self, score: &Score, _settings: &RenderSettings) -> Result<Vec<u8>> {
        Ok(generate_midi(score))
    }
}

/// A single MIDI event (note on/off, program change, meta event).
#[derive(Debug, Clone)]
pub struct MidiEvent {
    /// Absolute time in ticks from the start of the track
    pub tick: u32,
    /// Raw message bytes (status + data)
    pub bytes: Vec<u8>,
}

impl MidiEvent {
    fn is_note_off(&self) -> bool {
        self.bytes.first().is_some_and(|s| s & 0xF0 == 0x80)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Public API
// ═══════════════════════════════════════════════════════════════════════

/// Generate a complete Standard MIDI File (SMF Type 1).
pub fn generate_midi(score: &Score) -> Vec<u8> {
    let timemap = timemap::generate_timemap(score);
    let channels = assign_channels(&score.tracks);

    let mut tracks: Vec<Vec<u8>> = Vec::with_capacity(score.tracks.len() + 1);
    tracks.push(build_conductor_track(&timemap, score.title.as_deref().unwrap_or("Tempo")));

    for (track, &channel) in score.tracks.iter().zip(&channels) {
        let program = track.midi_program.unwrap_or(DEFAULT_PROGRAM).min(127);
        let mut events = vec![MidiEvent {
            tick: 0,
            bytes: vec![0xC0 | channel, program],
        }];
        events.extend(extract_notes(track, &timemap, channel));
        tracks.push(encode_track(&events, &track.name));
    }

    log::info!(
        "exported {} track(s), {:.1}s of music",
        score.tracks.len(),
        timemap::total_duration_ms(&timemap) / 1000.0
    );
    build_smf(&tracks)
}

/// Pick a channel per track. Explicit channels win; the rest are handed
/// out in order, skipping the percussion channel.
fn assign_channels(tracks: &[Track]) -> Vec<u8> {
    let mut next: u8 = 0;
    tracks
        .iter()
        .map(|track| match track.midi_channel {
            Some(ch) => ch.min(15),
            None => {
                if next == PERCUSSION_CHANNEL {
                    next += 1;
                }
                let ch = next % 16;
                next = (next + 1) % 16;
                ch
            }
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════
// Note extraction
// ═══════════════════════════════════════════════════════════════════════

/// Sounding MIDI key of a note: its pitch, or its tab position on the tuning.
fn note_key(track: &Track, note: &crate::model::Note) -> Option<u8> {
    let key = match note.pitch {
        Some(ref pitch) => pitch.to_midi(),
        None => {
            let (string, fret) = (note.string?, note.fret?);
            let open = *track.open_strings().get(usize::try_from(string - 1).ok()?)?;
            open + fret
        }
    };
    Some(key.clamp(0, 127) as u8)
}

fn extract_notes(track: &Track, timemap: &[TimemapEntry], channel: u8) -> Vec<MidiEvent> {
    let mut events = Vec::new();

    for (measure, entry) in track.measures.iter().zip(timemap) {
        for note in &measure.notes {
            if note.rest || note.grace {
                continue;
            }
            let Some(key) = note_key(track, note) else {
                continue;
            };

            let on_tick = entry.start_tick + timemap::divisions_to_ticks(note.start, measure.divisions);
            let off_tick = on_tick + timemap::divisions_to_ticks(note.duration, measure.divisions);

            // Tie chains sound once: note-on on the first note, note-off on the last
            if !note.tie_stop {
                events.push(MidiEvent {
                    tick: on_tick,
                    bytes: vec![0x90 | channel, key, NOTE_VELOCITY],
                });
            }
            if !note.tie_start {
                events.push(MidiEvent {
                    tick: off_tick,
                    bytes: vec![0x80 | channel, key, 0],
                });
            }
        }
    }

    events
}

// ═══════════════════════════════════════════════════════════════════════
// SMF byte encoding
// ═══════════════════════════════════════════════════════════════════════

/// Build the complete Standard MIDI File bytes.
fn build_smf(tracks: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();

    // MThd header
    out.extend_from_slice(b"MThd");
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes()); // format 1
    out.extend_from_slice(&(tracks.len().min(u16::MAX as usize) as u16).to_be_bytes());
    out.extend_from_slice(&(TICKS_PER_QUARTER as u16).to_be_bytes());

    for track_data in tracks {
        out.extend_from_slice(b"MTrk");
        out.extend_from_slice(&(track_data.len() as u32).to_be_bytes());
        out.extend_from_slice(track_data);
    }

    out
}

/// Track 0: tempo and time signature meta events.
fn build_conductor_track(timemap: &[TimemapEntry], name: &str) -> Vec<u8> {
    let mut events: Vec<MidiEvent> = Vec::new();

    for entry in timemap {
        if entry.time_changed {
            let denominator = (entry.time.beat_type.max(1) as u32).trailing_zeros() as u8;
            events.push(MidiEvent {
                tick: entry.start_tick,
                bytes: vec![0xFF, 0x58, 0x04, entry.time.beats.clamp(1, 255) as u8, denominator, 24, 8],
            });
        }
        if entry.tempo_changed {
            let uspq = (60_000_000.0 / entry.tempo_bpm) as u32; // microseconds per quarter
            events.push(MidiEvent {
                tick: entry.start_tick,
                bytes: vec![
                    0xFF,
                    0x51,
                    0x03,
                    ((uspq >> 16) & 0xFF) as u8,
                    ((uspq >> 8) & 0xFF) as u8,
                    (uspq & 0xFF) as u8,
                ],
            });
        }
    }

    encode_track(&events, name)
}

/// Encode a track's events into raw MTrk bytes (delta-time encoded).
fn encode_track(events: &[MidiEvent], name: &str) -> Vec<u8> {
    let mut data = Vec::new();

    // Track name meta event
    let name_bytes = name.as_bytes();
    data.push(0x00);
    data.extend_from_slice(&[0xFF, 0x03]);
    write_vlq(&mut data, name_bytes.len() as u32);
    data.extend_from_slice(name_bytes);

    // Note-offs go first on a shared tick so repeated keys retrigger cleanly
    let mut sorted: Vec<&MidiEvent> = events.iter().collect();
    sorted.sort_by_key(|e| (e.tick, !e.is_note_off()));

    let mut last_tick: u32 = 0;
    for event in &sorted {
        write_vlq(&mut data, event.tick.saturating_sub(last_tick));
        data.extend_from_slice(&event.bytes);
        last_tick = event.tick;
    }

    // End of track
    data.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);
    data
}

/// Write a variable-length quantity (VLQ) to a byte vector.
fn write_vlq(out: &mut Vec<u8>, mut value: u32) {
    let mut buf = [0u8; 5];
    let mut i = 0;
    loop {
        buf[i] = (value & 0x7F) as u8;
        if i > 0 {
            buf[i] |= 0x80;
        }
        value >>= 7;
        i += 1;
        if value == 0 {
            break;
        }
    }
    out.extend(buf[..i].iter().rev());
}

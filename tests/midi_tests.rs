//! MIDI export: parse the generated SMF back with midly and check it.

use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use tabview::midi::{generate_midi, MIDI_MIME};
use tabview::{load_score_file, MidiEncoder, RenderSettings, Score, SmfEncoder};

fn three_tracks() -> Score {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/three_tracks.musicxml");
    load_score_file(path).unwrap()
}

/// (channel, program) of every program change, in track order.
fn program_changes(smf: &Smf) -> Vec<(u8, u8)> {
    smf.tracks
        .iter()
        .flatten()
        .filter_map(|e| match e.kind {
            TrackEventKind::Midi {
                channel,
                message: MidiMessage::ProgramChange { program },
            } => Some((channel.as_int(), program.as_int())),
            _ => None,
        })
        .collect()
}

/// Absolute tick and key of every sounding note-on in one track.
fn note_ons(track: &[midly::TrackEvent]) -> Vec<(u32, u8)> {
    let mut tick = 0;
    let mut out = Vec::new();
    for event in track {
        tick += event.delta.as_int();
        if let TrackEventKind::Midi {
            message: MidiMessage::NoteOn { key, vel },
            ..
        } = event.kind
        {
            if vel.as_int() > 0 {
                out.push((tick, key.as_int()));
            }
        }
    }
    out
}

#[test]
fn header_is_type_one_with_conductor_track() {
    let bytes = generate_midi(&three_tracks());
    let smf = Smf::parse(&bytes).expect("exported file must parse");
    assert_eq!(smf.header.format, Format::Parallel);
    assert_eq!(smf.tracks.len(), 4);
    match smf.header.timing {
        Timing::Metrical(ticks) => assert_eq!(ticks.as_int(), 480),
        other => panic!("unexpected timing {other:?}"),
    }
}

#[test]
fn conductor_track_carries_tempo_and_meter() {
    let bytes = generate_midi(&three_tracks());
    let smf = Smf::parse(&bytes).unwrap();
    let conductor = &smf.tracks[0];

    let tempos: Vec<u32> = conductor
        .iter()
        .filter_map(|e| match e.kind {
            TrackEventKind::Meta(MetaMessage::Tempo(t)) => Some(t.as_int()),
            _ => None,
        })
        .collect();
    assert_eq!(tempos, vec![600_000]);

    let meters: Vec<(u8, u8)> = conductor
        .iter()
        .filter_map(|e| match e.kind {
            TrackEventKind::Meta(MetaMessage::TimeSignature(n, d, _, _)) => Some((n, d)),
            _ => None,
        })
        .collect();
    assert_eq!(meters, vec![(4, 2)]);

    let name = conductor.iter().find_map(|e| match e.kind {
        TrackEventKind::Meta(MetaMessage::TrackName(name)) => Some(name),
        _ => None,
    });
    assert_eq!(name, Some(&b"Fixture Song"[..]));
}

#[test]
fn tracks_use_their_programs_and_channels() {
    let smf_bytes = generate_midi(&three_tracks());
    let smf = Smf::parse(&smf_bytes).unwrap();
    assert_eq!(program_changes(&smf), vec![(0, 26), (1, 25), (2, 33)]);
}

#[test]
fn every_sounding_note_is_exported_once() {
    let bytes = generate_midi(&three_tracks());
    let smf = Smf::parse(&bytes).unwrap();
    let counts: Vec<usize> = smf.tracks[1..].iter().map(|t| note_ons(t).len()).collect();
    // Tied halves in bar 2 of the lead sound once
    assert_eq!(counts, vec![8, 12, 8]);
}

#[test]
fn notes_land_on_measure_ticks() {
    let bytes = generate_midi(&three_tracks());
    let smf = Smf::parse(&bytes).unwrap();

    let lead = note_ons(&smf.tracks[1]);
    assert_eq!(&lead[..4], &[(0, 76), (480, 74), (960, 72), (1440, 71)]);
    assert_eq!(lead[4], (1920, 69));

    let bass: Vec<u32> = note_ons(&smf.tracks[3]).iter().map(|(t, _)| *t).collect();
    assert_eq!(bass, vec![0, 960, 1920, 2880, 3840, 4800, 5760, 6720]);
}

#[test]
fn note_ons_and_offs_balance() {
    let bytes = generate_midi(&three_tracks());
    let smf = Smf::parse(&bytes).unwrap();
    for track in &smf.tracks[1..] {
        let mut open = 0i32;
        for event in track {
            match event.kind {
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { vel, .. },
                    ..
                } if vel.as_int() > 0 => open += 1,
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOff { .. },
                    ..
                }
                | TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { .. },
                    ..
                } => open -= 1,
                _ => {}
            }
            assert!(open >= 0);
        }
        assert_eq!(open, 0);
    }
}

#[test]
fn empty_score_still_has_conductor_track() {
    let bytes = generate_midi(&Score::default());
    let smf = Smf::parse(&bytes).unwrap();
    assert_eq!(smf.tracks.len(), 1);
}

#[test]
fn encoder_trait_matches_generate() {
    let score = three_tracks();
    let settings = RenderSettings::build(false, 800.0);
    let bytes = SmfEncoder.encode(&score, &settings).unwrap();
    assert_eq!(bytes, generate_midi(&score));
    assert_eq!(MIDI_MIME, "audio/midi");
}

//! MusicXML parser: converts a `score-partwise` document into the Score model.
//!
//! Each `<score-part>` becomes one [`Track`]. Tablature information is read
//! from `<staff-details>` (string count and tuning) and from the
//! `<technical>` string/fret notations of each note.

use roxmltree::{Document, Node};

use crate::error::{Result, ViewerError};
use crate::model::*;

const DEFAULT_TEMPO_UNIT: &str = "quarter";

/// Parse a MusicXML string into a Score.
pub fn parse_musicxml(xml: &str) -> Result<Score> {
    // MusicXML files include a DOCTYPE declaration, so we must allow DTDs
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let doc = Document::parse_with_options(xml, options)?;
    let root = doc.root_element();

    if root.tag_name().name() != "score-partwise" {
        return Err(ViewerError::Decode(format!(
            "unsupported root element '{}', only 'score-partwise' is supported",
            root.tag_name().name()
        )));
    }

    let mut score = Score::new();
    // Part ids in track order, so <part> elements can find their track
    let mut part_ids: Vec<String> = Vec::new();
    let mut movement_title = None;

    for child in elements(&root) {
        match child.tag_name().name() {
            "work" => {
                if let Some(t) = elements(&child).find(|n| n.has_tag_name("work-title")) {
                    // <credit type="title"> takes priority
                    if score.title.is_none() {
                        score.title = trimmed_text(&t);
                    }
                }
            }
            "movement-title" => movement_title = trimmed_text(&child),
            "identification" => parse_identification(&child, &mut score),
            "credit" => parse_credit(&child, &mut score),
            "part-list" => parse_part_list(&child, &mut score, &mut part_ids),
            "part" => {
                let id = child.attribute("id").unwrap_or("");
                match part_ids.iter().position(|p| p == id) {
                    Some(i) => {
                        let track = &mut score.tracks[i];
                        track.measures = parse_part(&child, track);
                    }
                    None => log::warn!("skipping part '{id}' missing from part-list"),
                }
            }
            _ => {}
        }
    }

    if score.title.is_none() {
        score.title = movement_title;
    }

    log::debug!(
        "parsed MusicXML: {} track(s), {} measure(s)",
        score.tracks.len(),
        score.measure_count()
    );
    Ok(score)
}

// ─── Header ──────────────────────────────────────────────────────────

fn parse_identification(node: &Node, score: &mut Score) {
    for child in elements(node) {
        match child.tag_name().name() {
            "creator" => {
                let text = trimmed_text(&child);
                match child.attribute("type").unwrap_or("") {
                    "composer" => {
                        if score.artist.is_none() {
                            score.artist = text.clone();
                        }
                        if score.music.is_none() {
                            score.music = text;
                        }
                    }
                    "lyricist" => {
                        if score.words.is_none() {
                            score.words = text;
                        }
                    }
                    _ => {}
                }
            }
            "rights" => score.copyright = trimmed_text(&child),
            _ => {}
        }
    }
}

fn parse_credit(node: &Node, score: &mut Score) {
    let mut credit_type = String::new();
    let mut words: Vec<String> = Vec::new();

    for child in elements(node) {
        match child.tag_name().name() {
            "credit-type" => credit_type = trimmed_text(&child).unwrap_or_default(),
            "credit-words" => {
                if let Some(text) = trimmed_text(&child) {
                    words.push(text);
                }
            }
            _ => {}
        }
    }

    if words.is_empty() {
        return;
    }
    let text = words.join("\n");
    match credit_type.as_str() {
        "title" => score.title = Some(text),
        "subtitle" => score.subtitle = Some(text),
        "composer" => {
            score.music = Some(text.clone());
            score.artist = Some(text);
        }
        "lyricist" => score.words = Some(text),
        "rights" => score.copyright = Some(text),
        _ => {}
    }
}

// ─── Part List ───────────────────────────────────────────────────────

fn parse_part_list(node: &Node, score: &mut Score, part_ids: &mut Vec<String>) {
    for child in elements(node).filter(|n| n.has_tag_name("score-part")) {
        let mut track = Track {
            index: score.tracks.len(),
            ..Default::default()
        };

        for sp in elements(&child) {
            match sp.tag_name().name() {
                "part-name" => track.name = trimmed_text(&sp).unwrap_or_default(),
                "part-abbreviation" => track.short_name = trimmed_text(&sp).unwrap_or_default(),
                "midi-instrument" => {
                    for midi in elements(&sp) {
                        // MusicXML numbers channels and programs from 1
                        match midi.tag_name().name() {
                            "midi-channel" => {
                                track.midi_channel =
                                    parse_i32(&midi).map(|c| (c - 1).clamp(0, 15) as u8);
                            }
                            "midi-program" => {
                                track.midi_program =
                                    parse_i32(&midi).map(|p| (p - 1).clamp(0, 127) as u8);
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }

        if track.short_name.is_empty() {
            track.short_name = track.name.chars().take(5).collect();
        }
        part_ids.push(child.attribute("id").unwrap_or("").to_string());
        score.tracks.push(track);
    }
}

// ─── Part (measures) ─────────────────────────────────────────────────

/// Attributes that stay in effect until the next change.
struct RunningState {
    divisions: i32,
    time: TimeSignature,
}

fn parse_part(node: &Node, track: &mut Track) -> Vec<Measure> {
    let mut state = RunningState {
        divisions: 1,
        time: TimeSignature::default(),
    };
    elements(node)
        .filter(|n| n.has_tag_name("measure"))
        .enumerate()
        .map(|(i, m)| parse_measure(&m, i, &mut state, track))
        .collect()
}

// ─── Measure ─────────────────────────────────────────────────────────

fn parse_measure(node: &Node, position: usize, state: &mut RunningState, track: &mut Track) -> Measure {
    let number = node
        .attribute("number")
        .and_then(|n| n.parse::<i32>().ok())
        .unwrap_or(position as i32 + 1);

    let mut measure = Measure {
        number,
        implicit: node.attribute("implicit") == Some("yes"),
        divisions: state.divisions,
        time: state.time,
        ..Default::default()
    };

    // Cursor in divisions; <backup> and <forward> move it for other voices
    let mut cursor: i32 = 0;
    let mut last_start: i32 = 0;

    for child in elements(node) {
        match child.tag_name().name() {
            "attributes" => {
                parse_attributes(&child, state, track);
                measure.divisions = state.divisions;
                if measure.time != state.time {
                    measure.time_changed = position > 0;
                    measure.time = state.time;
                }
            }
            "note" => {
                let mut note = parse_note(&child);
                if note.chord {
                    note.start = last_start;
                } else {
                    note.start = cursor;
                    last_start = cursor;
                    if !note.grace {
                        cursor += note.duration;
                    }
                }
                measure.notes.push(note);
            }
            "backup" => {
                let d = child_i32(&child, "duration").unwrap_or(0);
                cursor = (cursor - d).max(0);
            }
            "forward" => cursor += child_i32(&child, "duration").unwrap_or(0),
            "direction" => {
                if let Some(tempo) = parse_direction_tempo(&child) {
                    measure.tempo.get_or_insert(tempo);
                }
            }
            "sound" => {
                // <sound> can appear directly in <measure>
                if let Some(tempo) = attr_f64(&child, "tempo") {
                    measure.tempo.get_or_insert(tempo);
                }
            }
            _ => {}
        }
    }

    measure
}

// ─── Attributes ──────────────────────────────────────────────────────

fn parse_attributes(node: &Node, state: &mut RunningState, track: &mut Track) {
    for child in elements(node) {
        match child.tag_name().name() {
            "divisions" => {
                if let Some(d) = parse_i32(&child).filter(|d| *d > 0) {
                    state.divisions = d;
                }
            }
            "time" => {
                let beats = child_i32(&child, "beats").unwrap_or(4);
                let beat_type = child_i32(&child, "beat-type").unwrap_or(4);
                if beats > 0 && beat_type > 0 {
                    state.time = TimeSignature { beats, beat_type };
                }
            }
            "clef" => {
                let sign = elements(&child)
                    .find(|n| n.has_tag_name("sign"))
                    .and_then(|n| trimmed_text(&n));
                if sign.as_deref() == Some("TAB") && track.tuning.is_none() {
                    track.tuning = Some(STANDARD_GUITAR_TUNING.to_vec());
                }
            }
            "staff-details" => {
                if let Some(tuning) = parse_staff_details(&child) {
                    track.tuning = Some(tuning);
                }
            }
            _ => {}
        }
    }
}

/// Read the string tuning of a tablature staff, highest string first.
fn parse_staff_details(node: &Node) -> Option<Vec<i32>> {
    let lines = child_i32(node, "staff-lines");
    // MusicXML numbers tuning lines from the lowest string
    let mut tuned: Vec<(i32, i32)> = elements(node)
        .filter(|n| n.has_tag_name("staff-tuning"))
        .filter_map(|n| {
            let line = n.attribute("line")?.parse::<i32>().ok()?;
            let pitch = Pitch {
                step: elements(&n)
                    .find(|c| c.has_tag_name("tuning-step"))
                    .and_then(|c| trimmed_text(&c))?,
                octave: child_i32(&n, "tuning-octave")?,
                alter: elements(&n)
                    .find(|c| c.has_tag_name("tuning-alter"))
                    .and_then(|c| parse_f64(&c)),
            };
            Some((line, pitch.to_midi()))
        })
        .collect();

    if tuned.is_empty() {
        // A staff with a non-standard line count but no tuning: assume guitar strings
        return lines
            .filter(|l| *l != 5 && *l > 0)
            .map(|l| STANDARD_GUITAR_TUNING.iter().copied().take(l as usize).collect());
    }
    tuned.sort_by_key(|(line, _)| std::cmp::Reverse(*line));
    Some(tuned.into_iter().map(|(_, midi)| midi).collect())
}

// ─── Note ────────────────────────────────────────────────────────────

fn parse_note(node: &Node) -> Note {
    let mut note = Note {
        voice: 1,
        ..Default::default()
    };

    for child in elements(node) {
        match child.tag_name().name() {
            "pitch" => note.pitch = Some(parse_pitch(&child)),
            "duration" => note.duration = parse_i32(&child).unwrap_or(0).max(0),
            "voice" => note.voice = parse_i32(&child).unwrap_or(1),
            "type" => note.note_type = trimmed_text(&child),
            "rest" => note.rest = true,
            "grace" => note.grace = true,
            "chord" => note.chord = true,
            "dot" => note.dot = true,
            "tie" => match child.attribute("type") {
                Some("start") => note.tie_start = true,
                Some("stop") => note.tie_stop = true,
                _ => {}
            },
            "notations" => {
                for technical in elements(&child).filter(|n| n.has_tag_name("technical")) {
                    for t in elements(&technical) {
                        match t.tag_name().name() {
                            "string" => note.string = parse_i32(&t),
                            "fret" => note.fret = parse_i32(&t),
                            _ => {}
                        }
                    }
                }
            }
            _ => {}
        }
    }

    note
}

fn parse_pitch(node: &Node) -> Pitch {
    let mut pitch = Pitch {
        step: "C".to_string(),
        octave: 4,
        alter: None,
    };
    for child in elements(node) {
        match child.tag_name().name() {
            "step" => pitch.step = trimmed_text(&child).unwrap_or_else(|| "C".to_string()),
            "octave" => pitch.octave = parse_i32(&child).unwrap_or(4),
            "alter" => pitch.alter = parse_f64(&child),
            _ => {}
        }
    }
    pitch
}

// ─── Direction ───────────────────────────────────────────────────────

/// Tempo in quarter notes per minute, from `<sound tempo>` or a metronome mark.
fn parse_direction_tempo(node: &Node) -> Option<f64> {
    if let Some(tempo) = elements(node)
        .find(|n| n.has_tag_name("sound"))
        .and_then(|n| attr_f64(&n, "tempo"))
    {
        return Some(tempo);
    }

    let metronome = node
        .descendants()
        .find(|n| n.is_element() && n.has_tag_name("metronome"))?;
    let per_minute = elements(&metronome)
        .find(|n| n.has_tag_name("per-minute"))
        .and_then(|n| parse_f64(&n))?;
    let unit = elements(&metronome)
        .find(|n| n.has_tag_name("beat-unit"))
        .and_then(|n| trimmed_text(&n))
        .unwrap_or_else(|| DEFAULT_TEMPO_UNIT.to_string());
    let dotted = elements(&metronome).any(|n| n.has_tag_name("beat-unit-dot"));

    let mut quarters = match unit.as_str() {
        "whole" => 4.0,
        "half" => 2.0,
        "eighth" => 0.5,
        "16th" => 0.25,
        _ => 1.0,
    };
    if dotted {
        quarters *= 1.5;
    }
    Some(per_minute * quarters)
}

// ─── Helpers ─────────────────────────────────────────────────────────

fn elements<'a, 'input>(node: &Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn trimmed_text(node: &Node) -> Option<String> {
    node.text()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn parse_i32(node: &Node) -> Option<i32> {
    node.text()?.trim().parse().ok()
}

fn parse_f64(node: &Node) -> Option<f64> {
    node.text()?.trim().parse().ok()
}

fn child_i32(node: &Node, name: &str) -> Option<i32> {
    elements(node).find(|n| n.has_tag_name(name)).and_then(|n| parse_i32(&n))
}

fn attr_f64(node: &Node, name: &str) -> Option<f64> {
    node.attribute(name)?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_VOICES: &str = r#"<?xml version="1.0"?>
<score-partwise version="4.0">
  <part-list>
    <score-part id="P1"><part-name>Guitar</part-name></score-part>
  </part-list>
  <part id="P1">
    <measure number="1">
      <attributes><divisions>2</divisions><time><beats>3</beats><beat-type>4</beat-type></time></attributes>
      <note><pitch><step>E</step><octave>4</octave></pitch><duration>4</duration><voice>1</voice></note>
      <note><chord/><pitch><step>G</step><octave>4</octave></pitch><duration>4</duration><voice>1</voice></note>
      <note><pitch><step>A</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice></note>
      <backup><duration>6</duration></backup>
      <note><pitch><step>E</step><octave>2</octave></pitch><duration>6</duration><voice>2</voice></note>
    </measure>
  </part>
</score-partwise>"#;

    #[test]
    fn note_starts_follow_chords_and_backup() {
        let score = parse_musicxml(TWO_VOICES).unwrap();
        let measure = &score.tracks[0].measures[0];
        let starts: Vec<i32> = measure.notes.iter().map(|n| n.start).collect();
        assert_eq!(starts, vec![0, 0, 4, 0]);
        assert_eq!(measure.time, TimeSignature { beats: 3, beat_type: 4 });
        assert_eq!(measure.divisions, 2);
        assert_eq!(measure.effective_length(), 6);
    }

    #[test]
    fn short_name_falls_back_to_name_prefix() {
        let score = parse_musicxml(TWO_VOICES).unwrap();
        assert_eq!(score.tracks[0].short_name, "Guita");
    }

    #[test]
    fn timewise_documents_are_rejected() {
        let err = parse_musicxml("<score-timewise/>").unwrap_err();
        assert!(matches!(err, ViewerError::Decode(_)));
    }

    #[test]
    fn malformed_xml_is_an_xml_error() {
        let err = parse_musicxml("<score-partwise>").unwrap_err();
        assert!(matches!(err, ViewerError::Xml(_)));
    }

    #[test]
    fn metronome_mark_is_normalized_to_quarters() {
        let xml = r#"<direction><direction-type><metronome>
            <beat-unit>half</beat-unit><per-minute>60</per-minute>
        </metronome></direction-type></direction>"#;
        let doc = Document::parse(xml).unwrap();
        assert_eq!(parse_direction_tempo(&doc.root_element()), Some(120.0));
    }
}

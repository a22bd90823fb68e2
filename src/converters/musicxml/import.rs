//! MusicXML subset reader
//!
//! Reads `<score-partwise>` documents with roxmltree. Each part becomes one
//! track, or two hand tracks when it has two staves. Only the first voice of
//! each staff is kept. Elements outside the subset are skipped with one
//! warning per element name.

use std::collections::BTreeSet;

use num_rational::Ratio;
use roxmltree::{Document, Node, ParsingOptions};

use crate::models::pitch::from_spelling;
use crate::models::{
    Beat, Clef, Hand, KeyMode, KeySignature, Measure, Note, NoteValue, Score, ScoreMetadata,
    TimeSignature, Track,
};

/// Largest `<divisions>` accepted; real files stay far below this
const MAX_DIVISIONS: u32 = 1 << 16;

/// Untyped durations longer than this many whole notes are dropped
const MAX_SPAN_WHOLES: u32 = 64;

/// Measure-level elements that carry nothing for the document model
const IGNORED_QUIETLY: [&str; 3] = ["barline", "print", "backup"];

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    child(node, name).and_then(|n| n.text()).map(str::trim)
}

fn has_child(node: Node<'_, '_>, name: &str) -> bool {
    node.children().any(|n| n.has_tag_name(name))
}

/// Notes of one staff within the current measure
#[derive(Debug, Default)]
struct Staff {
    clef: Option<Clef>,
    measures: Vec<Measure>,
    voice: Option<String>,
    pending: Vec<Beat>,
}

#[derive(Debug, Default)]
struct Reader {
    metadata: ScoreMetadata,
    key_seen: bool,
    time_seen: bool,
    tempo_seen: bool,
    warnings: Vec<String>,
    reported: BTreeSet<String>,
}

impl Reader {
    fn warn_once(&mut self, key: &str, message: impl Into<String>) {
        if self.reported.insert(key.to_string()) {
            self.warnings.push(message.into());
        }
    }

    fn read_attributes(&mut self, node: Node<'_, '_>, divisions: &mut u32, staves: &mut Vec<Staff>) {
        for attr in node.children().filter(Node::is_element) {
            match attr.tag_name().name() {
                "divisions" => match attr.text().and_then(|t| t.trim().parse::<u32>().ok()) {
                    Some(d) if d > 0 && d <= MAX_DIVISIONS => *divisions = d,
                    _ => self.warn_once("divisions", "invalid <divisions> ignored"),
                },
                "staves" => {
                    if let Some(n) = attr.text().and_then(|t| t.trim().parse::<usize>().ok()) {
                        while staves.len() < n.clamp(1, 8) {
                            staves.push(Staff::default());
                        }
                    }
                }
                "key" if !self.key_seen => {
                    if let Some(fifths) = child_text(attr, "fifths").and_then(|t| t.parse::<i8>().ok()) {
                        let mode = match child_text(attr, "mode") {
                            Some("minor") => KeyMode::Minor,
                            _ => KeyMode::Major,
                        };
                        self.metadata.key_signature = KeySignature::new(fifths, mode);
                        self.key_seen = true;
                    }
                }
                "time" if !self.time_seen => {
                    let beats = child_text(attr, "beats").and_then(|t| t.parse::<u8>().ok());
                    let unit = child_text(attr, "beat-type").and_then(|t| t.parse::<u8>().ok());
                    match (beats, unit) {
                        (Some(b), Some(u)) if b > 0 && u > 0 => {
                            self.metadata.time_signature = TimeSignature::new(b, u);
                            self.time_seen = true;
                        }
                        _ => self.warn_once("time", "unsupported <time> ignored"),
                    }
                }
                "clef" => {
                    let index = attr
                        .attribute("number")
                        .and_then(|n| n.parse::<usize>().ok())
                        .unwrap_or(1)
                        .saturating_sub(1);
                    let clef = match child_text(attr, "sign") {
                        Some("G") => Clef::Treble,
                        Some("F") => Clef::Bass,
                        other => {
                            self.warn_once(
                                &format!("clef-{:?}", other),
                                format!("clef {:?} shown as treble", other.unwrap_or("none")),
                            );
                            Clef::Treble
                        }
                    };
                    if let Some(staff) = staves.get_mut(index) {
                        staff.clef = Some(clef);
                    }
                }
                _ => {}
            }
        }
    }

    fn read_tempo(&mut self, node: Node<'_, '_>) {
        if self.tempo_seen {
            return;
        }
        let from_sound = node
            .descendants()
            .find(|n| n.has_tag_name("sound"))
            .and_then(|n| n.attribute("tempo"));
        let from_metronome = node
            .descendants()
            .find(|n| n.has_tag_name("per-minute"))
            .and_then(|n| n.text());
        let bpm = from_sound
            .or(from_metronome)
            .and_then(|t| t.trim().parse::<f64>().ok())
            .map(|t| t.round())
            .filter(|t| *t >= 1.0 && *t <= u16::MAX as f64);
        if let Some(bpm) = bpm {
            self.metadata.tempo = bpm as u16;
            self.tempo_seen = true;
        }
    }

    /// Written value of a note: `<type>` and `<dot>`, or its duration split
    /// into tied pieces when the type is absent.
    fn note_values(&mut self, note: Node<'_, '_>, divisions: u32) -> Vec<(NoteValue, u8)> {
        if let Some(value) = child_text(note, "type").and_then(NoteValue::from_musicxml_type) {
            if has_child(note, "time-modification") {
                self.warn_once("tuplet", "tuplets imported at their written value");
            }
            let dots = note.children().filter(|n| n.has_tag_name("dot")).count() as u8;
            return vec![(value, dots.min(2))];
        }
        match child_text(note, "duration").and_then(|t| t.parse::<u32>().ok()) {
            Some(d) if d > 0 => self.span(d, divisions),
            _ => Vec::new(),
        }
    }

    /// Note values for `duration` divisions, tied pieces when needed
    fn span(&mut self, duration: u32, divisions: u32) -> Vec<(NoteValue, u8)> {
        let Some(whole) = divisions.checked_mul(4) else {
            self.warn_once("divisions", "invalid <divisions> ignored");
            return Vec::new();
        };
        if duration / whole > MAX_SPAN_WHOLES {
            self.warn_once("long-duration", "overlong <duration> ignored");
            return Vec::new();
        }
        NoteValue::decompose(Ratio::new(duration, whole))
    }

    fn read_note(&mut self, note: Node<'_, '_>, divisions: u32, staves: &mut [Staff]) {
        if has_child(note, "grace") {
            self.warn_once("grace", "grace notes ignored");
            return;
        }
        if has_child(note, "cue") {
            return;
        }

        let index = child_text(note, "staff")
            .and_then(|t| t.parse::<usize>().ok())
            .unwrap_or(1)
            .saturating_sub(1)
            .min(staves.len() - 1);
        let staff = &mut staves[index];

        let voice = child_text(note, "voice").unwrap_or("1").to_string();
        match &staff.voice {
            None => staff.voice = Some(voice),
            Some(primary) if *primary != voice => {
                self.warn_once("voices", "only the first voice of each staff is imported");
                return;
            }
            Some(_) => {}
        }

        let sounding = self.read_pitch(note);
        let is_rest = has_child(note, "rest");

        if has_child(note, "chord") {
            if let (Some(n), Some(prev)) = (sounding.clone(), staff.pending.last_mut()) {
                prev.notes.push(n);
                prev.notes.sort_by_key(|n| n.pitch);
                return;
            }
        }

        if is_rest
            && child(note, "rest").and_then(|r| r.attribute("measure")) == Some("yes")
        {
            return;
        }

        let values = self.note_values(note, divisions);
        if values.is_empty() {
            self.warn_once("duration", "note without type or duration skipped");
            return;
        }

        let last = values.len() - 1;
        for (i, (value, dots)) in values.into_iter().enumerate() {
            let notes = match &sounding {
                Some(n) if !is_rest => {
                    let mut n = n.clone();
                    if i < last {
                        n.tie = true;
                    }
                    vec![n]
                }
                _ => Vec::new(),
            };
            staff.pending.push(Beat::new(value, notes).dotted(dots));
        }
    }

    fn read_pitch(&mut self, note: Node<'_, '_>) -> Option<Note> {
        if has_child(note, "unpitched") {
            self.warn_once("unpitched", "unpitched notes imported as rests");
            return None;
        }
        let pitch = child(note, "pitch")?;
        let step = child_text(pitch, "step")?.chars().next()?;
        let alter = child_text(pitch, "alter")
            .and_then(|t| t.parse::<f64>().ok())
            .map(|a| a.round() as i8)
            .unwrap_or(0);
        let octave = child_text(pitch, "octave")?.parse::<i8>().ok()?;
        let Some(midi) = from_spelling(step, alter, octave) else {
            self.warn_once("range", "pitch outside the MIDI range skipped");
            return None;
        };

        let mut n = Note::new(midi);
        if let Some(v) = note
            .attribute("dynamics")
            .and_then(|d| d.parse::<f64>().ok())
        {
            n.velocity = (v * 0.9).round().clamp(1.0, 127.0) as u8;
        }
        n.tie = note
            .children()
            .filter(|c| c.has_tag_name("tie"))
            .any(|c| c.attribute("type") == Some("start"));

        if let Some(notations) = child(note, "notations") {
            n.tie |= notations
                .children()
                .filter(|c| c.has_tag_name("tied"))
                .any(|c| c.attribute("type") == Some("start"));
            if let Some(arts) = child(notations, "articulations") {
                n.articulations.staccato =
                    has_child(arts, "staccato") || has_child(arts, "staccatissimo");
                n.articulations.accent = has_child(arts, "accent") || has_child(arts, "strong-accent");
                n.articulations.tenuto = has_child(arts, "tenuto");
            }
            n.articulations.fermata = has_child(notations, "fermata");
        }
        Some(n)
    }
}

/// Parse a MusicXML document into a score plus warnings
pub fn parse_musicxml(text: &str) -> Result<(Score, Vec<String>), String> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(text, options).map_err(|e| format!("XML error: {}", e))?;
    let root = doc.root_element();
    match root.tag_name().name() {
        "score-partwise" => {}
        "score-timewise" => return Err("score-timewise documents are not supported".to_string()),
        other => return Err(format!("unexpected root element <{}>", other)),
    }

    let mut reader = Reader::default();

    let title = child(root, "work")
        .and_then(|w| child_text(w, "work-title"))
        .or_else(|| child_text(root, "movement-title"))
        .unwrap_or("")
        .to_string();
    let composer = child(root, "identification")
        .and_then(|id| {
            id.children()
                .filter(|c| c.has_tag_name("creator"))
                .find(|c| c.attribute("type") == Some("composer"))
        })
        .and_then(|c| c.text())
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    let part_names: Vec<(String, String)> = child(root, "part-list")
        .map(|list| {
            list.children()
                .filter(|n| n.has_tag_name("score-part"))
                .filter_map(|p| {
                    let id = p.attribute("id")?.to_string();
                    let name = child_text(p, "part-name").unwrap_or("").to_string();
                    Some((id, name))
                })
                .collect()
        })
        .unwrap_or_default();

    let parts: Vec<Node> = root.children().filter(|n| n.has_tag_name("part")).collect();
    if parts.is_empty() {
        return Err("document has no <part>".to_string());
    }
    let single_part = parts.len() == 1;

    let mut tracks = Vec::new();
    for (part_idx, part) in parts.into_iter().enumerate() {
        let id = part.attribute("id").unwrap_or("");
        let name = part_names
            .iter()
            .find(|(pid, _)| pid == id)
            .map(|(_, name)| name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Part {}", part_idx + 1));

        let mut divisions = 1u32;
        let mut staves = vec![Staff::default()];
        let mut measure_count = 0usize;

        for measure in part.children().filter(|n| n.has_tag_name("measure")) {
            for el in measure.children().filter(Node::is_element) {
                match el.tag_name().name() {
                    "attributes" => reader.read_attributes(el, &mut divisions, &mut staves),
                    "note" => reader.read_note(el, divisions, &mut staves),
                    "direction" | "sound" => reader.read_tempo(el),
                    "forward" => {
                        // a forward in the primary voice is silent time
                        let ours = staves[0].voice.as_deref() == child_text(el, "voice").or(Some("1"));
                        if let (true, Some(d)) =
                            (ours, child_text(el, "duration").and_then(|t| t.parse::<u32>().ok()))
                        {
                            for (value, dots) in reader.span(d, divisions) {
                                staves[0].pending.push(Beat::rest(value).dotted(dots));
                            }
                        }
                    }
                    name if IGNORED_QUIETLY.contains(&name) => {}
                    name => reader.warn_once(name, format!("unsupported element <{}> ignored", name)),
                }
            }
            for staff in staves.iter_mut() {
                while staff.measures.len() < measure_count {
                    staff.measures.push(Measure::default());
                }
                staff.measures.push(Measure::new(std::mem::take(&mut staff.pending)));
            }
            measure_count += 1;
        }

        let grand = staves.len() == 2;
        for (idx, staff) in staves.into_iter().enumerate() {
            let track = if grand {
                let (hand, label) = if idx == 0 {
                    (Hand::Right, "Right Hand")
                } else {
                    (Hand::Left, "Left Hand")
                };
                let name = if single_part {
                    label.to_string()
                } else {
                    format!("{} ({})", name, label)
                };
                Track::new(name, staff.clef.unwrap_or(hand.clef()))
                    .with_hand(hand)
                    .with_instrument("piano")
            } else if idx == 0 {
                Track::new(name.clone(), staff.clef.unwrap_or(Clef::Treble))
                    .with_instrument(name.to_lowercase())
            } else {
                Track::new(format!("{} (staff {})", name, idx + 1), staff.clef.unwrap_or(Clef::Treble))
                    .with_instrument(name.to_lowercase())
            };
            tracks.push(track.with_measures(staff.measures));
        }
    }

    if tracks.iter().all(|t| t.measures.is_empty()) {
        return Err("document has no measures".to_string());
    }

    let padded = Score::equalize_measures(&mut tracks);
    if padded > 0 {
        reader.warnings.push(format!(
            "parts had different lengths; {} empty measure(s) added",
            padded
        ));
    }

    let mut score = Score::new(title, reader.metadata, tracks);
    score.composer = composer;
    Ok((score, reader.warnings))
}

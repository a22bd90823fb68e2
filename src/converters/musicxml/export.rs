//! MusicXML writer
//!
//! Emits `<score-partwise>` with quick-xml. A right-hand track directly
//! followed by a left-hand track is written as one two-staff part; every
//! other track is its own part.

use num_rational::Ratio;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use thiserror::Error;

use crate::models::pitch::spell;
use crate::models::{
    Beat, Hand, KeyMode, Measure, Note, NoteValue, Score, Track, DEFAULT_VELOCITY,
};

/// Divisions per quarter note; a double-dotted thirty-second is 7
pub const DIVISIONS: u32 = 32;

const DOCTYPE: &str = r#"score-partwise PUBLIC "-//Recordare//DTD MusicXML 4.0 Partwise//EN" "http://www.musicxml.org/dtds/partwise.dtd""#;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("XML write failed: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

type Result<T> = std::result::Result<T, ExportError>;

struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let mut el = BytesStart::new(name);
        for attr in attrs {
            el.push_attribute(*attr);
        }
        self.writer.write_event(Event::Start(el))?;
        Ok(())
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let mut el = BytesStart::new(name);
        for attr in attrs {
            el.push_attribute(*attr);
        }
        self.writer.write_event(Event::Empty(el))?;
        Ok(())
    }

    fn text(&mut self, name: &str, text: &str) -> Result<()> {
        self.start(name, &[])?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }
}

fn divs(duration: Ratio<u32>) -> u32 {
    (duration * Ratio::from_integer(DIVISIONS * 4)).to_integer()
}

/// One exported part: a single track or a right/left hand pair
enum Part<'a> {
    Single(&'a Track),
    Grand(&'a Track, &'a Track),
}

impl<'a> Part<'a> {
    fn name(&self) -> &str {
        match self {
            Part::Single(t) => &t.name,
            Part::Grand(..) => "Piano",
        }
    }

    fn staves(&self) -> Vec<&'a Track> {
        match self {
            Part::Single(t) => vec![*t],
            Part::Grand(r, l) => vec![*r, *l],
        }
    }
}

fn group_parts(score: &Score) -> Vec<Part<'_>> {
    let mut parts = Vec::new();
    let mut i = 0;
    while i < score.tracks.len() {
        let track = &score.tracks[i];
        match score.tracks.get(i + 1) {
            Some(next) if track.hand == Some(Hand::Right) && next.hand == Some(Hand::Left) => {
                parts.push(Part::Grand(track, next));
                i += 2;
            }
            _ => {
                parts.push(Part::Single(track));
                i += 1;
            }
        }
    }
    parts
}

/// Serialize a score as a MusicXML 4.0 partwise document
pub fn to_musicxml(score: &Score) -> Result<String> {
    let mut out = XmlOut {
        writer: Writer::new_with_indent(Vec::new(), b' ', 2),
    };
    out.writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    out.writer
        .write_event(Event::DocType(BytesText::from_escaped(DOCTYPE)))?;

    out.start("score-partwise", &[("version", "4.0")])?;
    if !score.title.is_empty() {
        out.start("work", &[])?;
        out.text("work-title", &score.title)?;
        out.end("work")?;
    }
    if !score.composer.is_empty() {
        out.start("identification", &[])?;
        out.start("creator", &[("type", "composer")])?;
        out.writer
            .write_event(Event::Text(BytesText::new(&score.composer)))?;
        out.end("creator")?;
        out.end("identification")?;
    }

    let parts = group_parts(score);
    out.start("part-list", &[])?;
    for (idx, part) in parts.iter().enumerate() {
        let id = format!("P{}", idx + 1);
        out.start("score-part", &[("id", id.as_str())])?;
        out.text("part-name", part.name())?;
        out.end("score-part")?;
    }
    out.end("part-list")?;

    for (idx, part) in parts.iter().enumerate() {
        let id = format!("P{}", idx + 1);
        out.start("part", &[("id", id.as_str())])?;
        write_part(&mut out, score, part, idx == 0)?;
        out.end("part")?;
    }
    out.end("score-partwise")?;

    Ok(String::from_utf8(out.writer.into_inner())?)
}

fn write_part(out: &mut XmlOut, score: &Score, part: &Part<'_>, first_part: bool) -> Result<()> {
    let staves = part.staves();
    let meta = &score.metadata;
    let prefer_flats = meta.key_signature.prefers_flats();
    let measure_divs = divs(meta.time_signature.measure_duration());
    let count = staves.iter().map(|t| t.measures.len()).max().unwrap_or(0);

    // pitches tied into the next beat, per staff
    let mut open_ties: Vec<Vec<u8>> = vec![Vec::new(); staves.len()];

    for m in 0..count {
        let number = (m + 1).to_string();
        out.start("measure", &[("number", number.as_str())])?;

        if m == 0 {
            out.start("attributes", &[])?;
            out.text("divisions", &DIVISIONS.to_string())?;
            out.start("key", &[])?;
            out.text("fifths", &meta.key_signature.fifths.to_string())?;
            out.text(
                "mode",
                match meta.key_signature.mode {
                    KeyMode::Major => "major",
                    KeyMode::Minor => "minor",
                },
            )?;
            out.end("key")?;
            out.start("time", &[])?;
            out.text("beats", &meta.time_signature.beats.to_string())?;
            out.text("beat-type", &meta.time_signature.beat_unit.to_string())?;
            out.end("time")?;
            if staves.len() > 1 {
                out.text("staves", &staves.len().to_string())?;
            }
            for (s, track) in staves.iter().enumerate() {
                let number = (s + 1).to_string();
                let mut attrs = Vec::new();
                if staves.len() > 1 {
                    attrs.push(("number", number.as_str()));
                }
                out.start("clef", &attrs)?;
                out.text("sign", track.clef.sign())?;
                out.text("line", &track.clef.line().to_string())?;
                out.end("clef")?;
            }
            out.end("attributes")?;

            if first_part {
                let tempo = meta.tempo.to_string();
                out.start("direction", &[("placement", "above")])?;
                out.start("direction-type", &[])?;
                out.start("metronome", &[])?;
                out.text("beat-unit", "quarter")?;
                out.text("per-minute", &tempo)?;
                out.end("metronome")?;
                out.end("direction-type")?;
                out.empty("sound", &[("tempo", tempo.as_str())])?;
                out.end("direction")?;
            }
        }

        for (s, track) in staves.iter().enumerate() {
            let staff = (staves.len() > 1).then(|| (s + 1).to_string());
            let empty = Measure::default();
            let measure = track.measures.get(m).unwrap_or(&empty);
            if s > 0 {
                let previous = staves[s - 1].measures.get(m).unwrap_or(&empty);
                let back = if previous.is_empty() {
                    measure_divs
                } else {
                    divs(previous.duration())
                };
                out.start("backup", &[])?;
                out.text("duration", &back.to_string())?;
                out.end("backup")?;
            }
            if measure.is_empty() {
                out.start("note", &[])?;
                out.empty("rest", &[("measure", "yes")])?;
                out.text("duration", &measure_divs.to_string())?;
                if let Some(staff) = &staff {
                    out.text("staff", staff)?;
                }
                out.end("note")?;
                open_ties[s].clear();
                continue;
            }
            for beat in &measure.beats {
                let ties_in = std::mem::take(&mut open_ties[s]);
                write_beat(out, beat, staff.as_deref(), prefer_flats, &ties_in)?;
                open_ties[s] = beat.sounding().filter(|n| n.tie).map(|n| n.pitch).collect();
            }
        }

        out.end("measure")?;
    }
    Ok(())
}

fn write_beat(
    out: &mut XmlOut,
    beat: &Beat,
    staff: Option<&str>,
    prefer_flats: bool,
    ties_in: &[u8],
) -> Result<()> {
    let duration = divs(beat.duration()).to_string();
    if beat.is_rest() {
        out.start("note", &[])?;
        out.empty("rest", &[])?;
        out.text("duration", &duration)?;
        out.text("voice", "1")?;
        out.text("type", beat.value.musicxml_type())?;
        for _ in 0..beat.dots.min(NoteValue::MAX_DOTS) {
            out.empty("dot", &[])?;
        }
        if let Some(staff) = staff {
            out.text("staff", staff)?;
        }
        return out.end("note");
    }

    for (i, note) in beat.sounding().enumerate() {
        write_note(out, beat, note, i > 0, &duration, staff, prefer_flats, ties_in)?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn write_note(
    out: &mut XmlOut,
    beat: &Beat,
    note: &Note,
    chord: bool,
    duration: &str,
    staff: Option<&str>,
    prefer_flats: bool,
    ties_in: &[u8],
) -> Result<()> {
    let dynamics = format!("{:.2}", note.velocity as f64 / 0.9);
    let mut attrs = Vec::new();
    if note.velocity != DEFAULT_VELOCITY {
        attrs.push(("dynamics", dynamics.as_str()));
    }
    let tie_stop = ties_in.contains(&note.pitch);
    let spelling = spell(note.pitch, prefer_flats);

    out.start("note", &attrs)?;
    if chord {
        out.empty("chord", &[])?;
    }
    out.start("pitch", &[])?;
    out.text("step", &spelling.step.to_string())?;
    if spelling.alter != 0 {
        out.text("alter", &spelling.alter.to_string())?;
    }
    out.text("octave", &spelling.octave.to_string())?;
    out.end("pitch")?;
    out.text("duration", duration)?;
    if tie_stop {
        out.empty("tie", &[("type", "stop")])?;
    }
    if note.tie {
        out.empty("tie", &[("type", "start")])?;
    }
    out.text("voice", "1")?;
    out.text("type", beat.value.musicxml_type())?;
    for _ in 0..beat.dots.min(NoteValue::MAX_DOTS) {
        out.empty("dot", &[])?;
    }
    if let Some(staff) = staff {
        out.text("staff", staff)?;
    }

    let arts = &note.articulations;
    if tie_stop || note.tie || !arts.is_empty() {
        out.start("notations", &[])?;
        if tie_stop {
            out.empty("tied", &[("type", "stop")])?;
        }
        if note.tie {
            out.empty("tied", &[("type", "start")])?;
        }
        if arts.staccato || arts.accent || arts.tenuto {
            out.start("articulations", &[])?;
            if arts.accent {
                out.empty("accent", &[])?;
            }
            if arts.staccato {
                out.empty("staccato", &[])?;
            }
            if arts.tenuto {
                out.empty("tenuto", &[])?;
            }
            out.end("articulations")?;
        }
        if arts.fermata {
            out.empty("fermata", &[])?;
        }
        out.end("notations")?;
    }
    out.end("note")
}

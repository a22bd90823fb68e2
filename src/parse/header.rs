//! Jianpu header lines
//!
//! Two styles are accepted:
//!
//! ```text
//! title: Jasmine Flower        field lines, one per line
//! 1=F 3/4 ♩=96                 compact key / time / tempo line
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{KeySignature, TimeSignature};

static FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(title|composer|tempo|key|time|meter|instrument)\s*[:：]\s*(.*?)\s*$")
        .expect("field regex")
});

static KEY_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*1\s*=\s*([A-Ga-g][#b]?m?)(?:\s|$)").expect("key regex"));

static TIME: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{1,2})\s*/\s*(\d{1,2})\b").expect("time regex"));

static TEMPO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:♩|[qQ])\s*=\s*(\d{1,3})").expect("tempo regex"));

/// A recognized header field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderField {
    Title(String),
    Composer(String),
    Tempo(u16),
    Key(KeySignature),
    Time(TimeSignature),
    Instrument(String),
}

/// Fields of one header line plus values that could not be read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderLine {
    pub fields: Vec<HeaderField>,
    pub warnings: Vec<String>,
}

/// Parse a header line. Returns `None` when the line is not a header.
pub fn parse_header_line(line: &str) -> Option<HeaderLine> {
    if let Some(caps) = FIELD.captures(line) {
        let name = caps[1].to_ascii_lowercase();
        let value = caps[2].to_string();
        let mut header = HeaderLine::default();
        match name.as_str() {
            "title" => header.fields.push(HeaderField::Title(value)),
            "composer" => header.fields.push(HeaderField::Composer(value)),
            "instrument" => header.fields.push(HeaderField::Instrument(value)),
            "tempo" => match value.parse::<u16>() {
                Ok(bpm) if bpm > 0 => header.fields.push(HeaderField::Tempo(bpm)),
                _ => header.warnings.push(format!("invalid tempo '{}' ignored", value)),
            },
            "key" => {
                let name = value.trim_start_matches("1=").trim();
                match KeySignature::from_name(name) {
                    Some(key) => header.fields.push(HeaderField::Key(key)),
                    None => header.warnings.push(format!("unknown key '{}' ignored", value)),
                }
            }
            _ => match TimeSignature::parse(&value) {
                Some(time) => header.fields.push(HeaderField::Time(time)),
                None => header
                    .warnings
                    .push(format!("invalid time signature '{}' ignored", value)),
            },
        }
        return Some(header);
    }

    let caps = KEY_LINE.captures(line)?;
    let mut header = HeaderLine::default();
    match KeySignature::from_name(&caps[1]) {
        Some(key) => header.fields.push(HeaderField::Key(key)),
        None => header
            .warnings
            .push(format!("unknown key '{}' ignored", &caps[1])),
    }
    if let Some(t) = TIME.captures(line) {
        match TimeSignature::parse(&format!("{}/{}", &t[1], &t[2])) {
            Some(time) => header.fields.push(HeaderField::Time(time)),
            None => header
                .warnings
                .push(format!("invalid time signature '{}' ignored", &t[0])),
        }
    }
    if let Some(bpm) = TEMPO
        .captures(line)
        .and_then(|t| t[1].parse::<u16>().ok())
        .filter(|bpm| *bpm > 0)
    {
        header.fields.push(HeaderField::Tempo(bpm));
    }
    Some(header)
}

//! Element-level enums and small value types for the score model
//!
//! Clefs, hands, note values, key and time signatures. Everything here is
//! `Copy`, integer-backed and hashable so whole scores compare structurally.

use num_rational::Ratio;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Staff clef
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Clef {
    #[default]
    Treble,
    Bass,
}

impl Clef {
    /// Diatonic index (octave * 7 + step) of the middle staff line
    pub fn middle_line_index(self) -> i32 {
        match self {
            // B4
            Clef::Treble => 4 * 7 + 6,
            // D3
            Clef::Bass => 3 * 7 + 1,
        }
    }

    pub fn sign(self) -> &'static str {
        match self {
            Clef::Treble => "G",
            Clef::Bass => "F",
        }
    }

    pub fn line(self) -> u8 {
        match self {
            Clef::Treble => 2,
            Clef::Bass => 4,
        }
    }
}

/// Hand assignment for grand-staff keyboard layouts
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    /// Conventional clef for this hand
    pub fn clef(self) -> Clef {
        match self {
            Hand::Left => Clef::Bass,
            Hand::Right => Clef::Treble,
        }
    }
}

/// Written rhythmic value of a beat
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum NoteValue {
    Whole,
    Half,
    #[default]
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
}

impl NoteValue {
    /// All values from longest to shortest
    pub const MAX_DOTS: u8 = 2;

    pub const ALL: [NoteValue; 6] = [
        NoteValue::Whole,
        NoteValue::Half,
        NoteValue::Quarter,
        NoteValue::Eighth,
        NoteValue::Sixteenth,
        NoteValue::ThirtySecond,
    ];

    /// Denominator of the value as a fraction of a whole note
    pub fn denominator(self) -> u32 {
        match self {
            NoteValue::Whole => 1,
            NoteValue::Half => 2,
            NoteValue::Quarter => 4,
            NoteValue::Eighth => 8,
            NoteValue::Sixteenth => 16,
            NoteValue::ThirtySecond => 32,
        }
    }

    pub fn from_denominator(denominator: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.denominator() == denominator)
    }

    /// Undotted length as a fraction of a whole note
    pub fn fraction(self) -> Ratio<u32> {
        Ratio::new(1, self.denominator())
    }

    /// Length with `dots` augmentation dots applied; dots past
    /// [`NoteValue::MAX_DOTS`] are ignored
    pub fn dotted_fraction(self, dots: u8) -> Ratio<u32> {
        let base = self.fraction();
        let mut total = base;
        let mut add = base;
        for _ in 0..dots.min(Self::MAX_DOTS) {
            add /= 2;
            total += add;
        }
        total
    }

    /// Eighth notes and shorter carry beams
    pub fn is_beamable(self) -> bool {
        self >= NoteValue::Eighth
    }

    /// Halve the value, if a shorter one exists
    pub fn halved(self) -> Option<Self> {
        Self::from_denominator(self.denominator() * 2)
    }

    /// MusicXML `<type>` name
    pub fn musicxml_type(self) -> &'static str {
        match self {
            NoteValue::Whole => "whole",
            NoteValue::Half => "half",
            NoteValue::Quarter => "quarter",
            NoteValue::Eighth => "eighth",
            NoteValue::Sixteenth => "16th",
            NoteValue::ThirtySecond => "32nd",
        }
    }

    pub fn from_musicxml_type(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.musicxml_type() == name)
    }

    /// Decompose a duration into the fewest (value, dots) pieces, longest first.
    ///
    /// Remainders shorter than a thirty-second note are dropped.
    pub fn decompose(duration: Ratio<u32>) -> Vec<(NoteValue, u8)> {
        let mut pieces = Vec::new();
        let mut remaining = duration;
        let zero = Ratio::from_integer(0);
        while remaining > zero {
            let piece = Self::ALL.into_iter().find_map(|value| {
                (0..=2u8)
                    .rev()
                    .map(|dots| (value, dots))
                    .find(|(v, d)| v.dotted_fraction(*d) <= remaining)
            });
            match piece {
                Some((value, dots)) => {
                    remaining -= value.dotted_fraction(dots);
                    pieces.push((value, dots));
                }
                None => break,
            }
        }
        pieces
    }
}

/// Mode of a key signature
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum KeyMode {
    #[default]
    Major,
    Minor,
}

/// Key signature as a position on the circle of fifths
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct KeySignature {
    /// -7 (seven flats) to +7 (seven sharps)
    pub fifths: i8,
    pub mode: KeyMode,
}

const MAJOR_TONICS: [&str; 15] = [
    "Cb", "Gb", "Db", "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#",
];
const MINOR_TONICS: [&str; 15] = [
    "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#", "G#", "D#", "A#",
];

impl KeySignature {
    pub fn new(fifths: i8, mode: KeyMode) -> Self {
        Self {
            fifths: fifths.clamp(-7, 7),
            mode,
        }
    }

    pub fn major(fifths: i8) -> Self {
        Self::new(fifths, KeyMode::Major)
    }

    /// Tonic name, e.g. "Bb" or "F#"
    pub fn tonic_name(&self) -> &'static str {
        let idx = (self.fifths.clamp(-7, 7) + 7) as usize;
        match self.mode {
            KeyMode::Major => MAJOR_TONICS[idx],
            KeyMode::Minor => MINOR_TONICS[idx],
        }
    }

    /// Pitch class (0 = C) of the tonic
    pub fn tonic_pitch_class(&self) -> u8 {
        let base = match self.mode {
            KeyMode::Major => 0i32,
            KeyMode::Minor => 9,
        };
        (base + 7 * self.fifths as i32).rem_euclid(12) as u8
    }

    /// Parse a tonic name such as "C", "Bb", "F#", "Am" or "Ebm"
    pub fn from_name(name: &str) -> Option<Self> {
        let trimmed = name.trim();
        let (tonic, mode) = match trimmed.strip_suffix('m') {
            Some(t) if !t.is_empty() => (t, KeyMode::Minor),
            _ => (trimmed, KeyMode::Major),
        };
        let table = match mode {
            KeyMode::Major => &MAJOR_TONICS,
            KeyMode::Minor => &MINOR_TONICS,
        };
        table
            .iter()
            .position(|t| t.eq_ignore_ascii_case(tonic))
            .map(|idx| Self::new(idx as i8 - 7, mode))
    }

    /// Prefer flats when spelling accidentals in this key
    pub fn prefers_flats(&self) -> bool {
        self.fifths < 0
    }
}

impl fmt::Display for KeySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            KeyMode::Major => write!(f, "{} major", self.tonic_name()),
            KeyMode::Minor => write!(f, "{} minor", self.tonic_name()),
        }
    }
}

/// Time signature as beats-per-measure over beat unit
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimeSignature {
    pub beats: u8,
    pub beat_unit: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            beats: 4,
            beat_unit: 4,
        }
    }
}

impl TimeSignature {
    pub fn new(beats: u8, beat_unit: u8) -> Self {
        Self { beats, beat_unit }
    }

    /// Capacity of one measure as a fraction of a whole note
    pub fn measure_duration(&self) -> Ratio<u32> {
        Ratio::new(self.beats as u32, self.beat_unit.max(1) as u32)
    }

    /// Length of one beat unit as a fraction of a whole note
    pub fn beat_duration(&self) -> Ratio<u32> {
        Ratio::new(1, self.beat_unit.max(1) as u32)
    }

    /// Parse "3/4" style strings
    pub fn parse(text: &str) -> Option<Self> {
        let (beats, unit) = text.trim().split_once('/')?;
        let beats: u8 = beats.trim().parse().ok()?;
        let unit: u8 = unit.trim().parse().ok()?;
        if beats == 0 || unit == 0 || !unit.is_power_of_two() {
            return None;
        }
        Some(Self::new(beats, unit))
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.beats, self.beat_unit)
    }
}

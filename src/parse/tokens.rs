//! Token types for the Jianpu text grammar
//!
//! A music line is a sequence of notes, chords, extension dashes and
//! barlines. Tokens carry the column they started at for diagnostics.

use serde::{Deserialize, Serialize};

/// A scale degree with its modifiers
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PitchToken {
    /// 1-7 for scale degrees, 0 for a rest
    pub degree: u8,
    /// +1 per `#`, -1 per `b`
    pub accidental: i8,
    /// +1 per `'`, -1 per `,`
    pub octave: i8,
}

impl PitchToken {
    pub fn is_rest(&self) -> bool {
        self.degree == 0
    }
}

/// Rhythm marks written after a note or chord
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DurationMarks {
    /// Each `_` halves the value
    pub underlines: u8,
    /// Augmentation dots `.`
    pub dots: u8,
    /// `~` ties into the next note
    pub tie: bool,
}

/// Token kinds of a music line
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Note {
        pitch: PitchToken,
        marks: DurationMarks,
    },
    Chord {
        pitches: Vec<PitchToken>,
        marks: DurationMarks,
    },
    /// `-` extends the previous note by one beat unit
    Extend,
    /// `|`, or `||` / `|]` for a final bar
    Barline { final_bar: bool },
}

/// Token with its starting column (0-based, in characters)
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, column: usize) -> Self {
        Self { kind, column }
    }

    /// True for notes and chords (not rests, dashes or barlines)
    pub fn is_pitched(&self) -> bool {
        match &self.kind {
            TokenKind::Note { pitch, .. } => !pitch.is_rest(),
            TokenKind::Chord { pitches, .. } => pitches.iter().any(|p| !p.is_rest()),
            _ => false,
        }
    }
}

/// Voice a music line belongs to, chosen by its prefix
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Voice {
    /// `R:` or `RH:`
    Right,
    /// `L:` or `LH:`
    Left,
    /// No prefix
    Main,
    /// `V1:`, `V2:`, ...
    Numbered(u8),
}

impl Voice {
    pub fn label(&self) -> String {
        match self {
            Voice::Right => "Right Hand".to_string(),
            Voice::Left => "Left Hand".to_string(),
            Voice::Main => "Melody".to_string(),
            Voice::Numbered(n) => format!("Voice {}", n),
        }
    }
}

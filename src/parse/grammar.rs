//! Recursive descent tokenizer for Jianpu music lines
//!
//! ```text
//! line    := [voice ':'] item*
//! item    := note | chord | '-' | barline
//! note    := accidental* degree octave* marks
//! chord   := '[' (accidental* degree octave*)+ ']' marks
//! marks   := ('_' | '.' | '~')*
//! barline := '|' | '||' | '|]'
//! accidental := '#' | 'b'     degree := '0'..'7'     octave := '\'' | ','
//! ```
//!
//! Unknown characters are skipped with a warning; an unterminated chord is
//! an error because everything after it would be misread.

use thiserror::Error;

use super::tokens::{DurationMarks, PitchToken, Token, TokenKind, Voice};

/// Fatal tokenizer error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("column {column}: {message}")]
pub struct LexError {
    pub column: usize,
    pub message: String,
}

/// Tokens of one line plus non-fatal complaints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineTokens {
    pub tokens: Vec<Token>,
    pub warnings: Vec<String>,
}

/// Split an optional voice prefix (`R:`, `LH:`, `V2:`) from a music line
pub fn split_voice(line: &str) -> (Voice, &str) {
    let trimmed = line.trim_start();
    if let Some((prefix, rest)) = trimmed.split_once(':') {
        let voice = match prefix.trim().to_ascii_uppercase().as_str() {
            "R" | "RH" => Some(Voice::Right),
            "L" | "LH" => Some(Voice::Left),
            p => p
                .strip_prefix('V')
                .and_then(|n| n.parse::<u8>().ok())
                .map(Voice::Numbered),
        };
        if let Some(voice) = voice {
            return (voice, rest);
        }
    }
    (Voice::Main, trimmed)
}

/// Characters that may appear in a music line body
pub fn is_music_char(c: char) -> bool {
    c.is_whitespace() || matches!(c, '0'..='7' | '#' | 'b' | '\'' | ',' | '_' | '.' | '~' | '-' | '|' | '[' | ']')
}

struct Cursor {
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl Cursor {
    fn new(line: &str) -> Self {
        Self {
            chars: line.chars().enumerate().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|&(_, c)| c)
    }

    fn column(&self) -> usize {
        self.chars.get(self.pos).map(|&(i, _)| i).unwrap_or(self.chars.len())
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }
}

/// Tokenize the body of one music line (voice prefix already removed)
pub fn tokenize_line(body: &str) -> Result<LineTokens, LexError> {
    let mut cursor = Cursor::new(body);
    let mut out = LineTokens::default();

    loop {
        cursor.skip_whitespace();
        let column = cursor.column();
        let Some(c) = cursor.peek() else { break };

        match c {
            '|' => {
                cursor.bump();
                let final_bar = matches!(cursor.peek(), Some('|') | Some(']'));
                if final_bar {
                    cursor.bump();
                }
                out.tokens.push(Token::new(TokenKind::Barline { final_bar }, column));
            }
            '-' => {
                cursor.bump();
                out.tokens.push(Token::new(TokenKind::Extend, column));
            }
            '[' => {
                cursor.bump();
                let pitches = parse_chord_body(&mut cursor, column, &mut out.warnings)?;
                let marks = parse_marks(&mut cursor);
                if pitches.is_empty() {
                    out.warnings.push(format!("column {}: empty chord ignored", column));
                } else {
                    out.tokens.push(Token::new(TokenKind::Chord { pitches, marks }, column));
                }
            }
            '#' | 'b' | '0'..='9' => match parse_pitch(&mut cursor) {
                Ok(pitch) => {
                    let marks = parse_marks(&mut cursor);
                    out.tokens.push(Token::new(TokenKind::Note { pitch, marks }, column));
                }
                Err(message) => {
                    out.warnings.push(format!("column {}: {}", column, message));
                }
            },
            other => {
                cursor.bump();
                out.warnings.push(format!(
                    "column {}: unexpected character '{}' skipped",
                    column, other
                ));
            }
        }
    }

    Ok(out)
}

/// accidental* degree octave*
fn parse_pitch(cursor: &mut Cursor) -> Result<PitchToken, String> {
    let mut pitch = PitchToken::default();
    while let Some(c) = cursor.peek() {
        match c {
            '#' => pitch.accidental = pitch.accidental.saturating_add(1),
            'b' => pitch.accidental = pitch.accidental.saturating_sub(1),
            _ => break,
        }
        cursor.bump();
    }

    match cursor.bump() {
        Some(d @ '0'..='7') => pitch.degree = d as u8 - b'0',
        Some(d @ ('8' | '9')) => return Err(format!("'{}' is not a scale degree", d)),
        Some(other) => return Err(format!("accidental without a degree before '{}'", other)),
        None => return Err("accidental without a degree at end of line".to_string()),
    }

    while let Some(c) = cursor.peek() {
        match c {
            '\'' => pitch.octave = pitch.octave.saturating_add(1),
            ',' => pitch.octave = pitch.octave.saturating_sub(1),
            _ => break,
        }
        cursor.bump();
    }
    Ok(pitch)
}

fn parse_chord_body(
    cursor: &mut Cursor,
    open_column: usize,
    warnings: &mut Vec<String>,
) -> Result<Vec<PitchToken>, LexError> {
    let mut pitches = Vec::new();
    loop {
        cursor.skip_whitespace();
        match cursor.peek() {
            Some(']') => {
                cursor.bump();
                return Ok(pitches);
            }
            Some('#' | 'b' | '0'..='9') => {
                let column = cursor.column();
                match parse_pitch(cursor) {
                    Ok(p) if p.is_rest() => {
                        warnings.push(format!("column {}: rest inside chord ignored", column))
                    }
                    Ok(p) => pitches.push(p),
                    Err(message) => warnings.push(format!("column {}: {}", column, message)),
                }
            }
            Some(other) => {
                let column = cursor.column();
                cursor.bump();
                warnings.push(format!(
                    "column {}: unexpected character '{}' in chord skipped",
                    column, other
                ));
            }
            None => {
                return Err(LexError {
                    column: open_column,
                    message: "unterminated chord, expected ']'".to_string(),
                })
            }
        }
    }
}

fn parse_marks(cursor: &mut Cursor) -> DurationMarks {
    let mut marks = DurationMarks::default();
    while let Some(c) = cursor.peek() {
        match c {
            '_' => marks.underlines = marks.underlines.saturating_add(1),
            '.' => marks.dots = marks.dots.saturating_add(1),
            '~' => marks.tie = true,
            _ => break,
        }
        cursor.bump();
    }
    marks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(body: &str) -> Vec<TokenKind> {
        tokenize_line(body)
            .unwrap()
            .tokens
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_split_voice() {
        assert_eq!(split_voice("R: 1 2 3").0, Voice::Right);
        assert_eq!(split_voice("lh: 1,").0, Voice::Left);
        assert_eq!(split_voice("V2: 5").0, Voice::Numbered(2));
        let (voice, body) = split_voice("1 2 3 |");
        assert_eq!(voice, Voice::Main);
        assert_eq!(body, "1 2 3 |");
    }

    #[test]
    fn test_note_with_modifiers() {
        let tokens = kinds("#4'_.~");
        assert_eq!(
            tokens,
            vec![TokenKind::Note {
                pitch: PitchToken {
                    degree: 4,
                    accidental: 1,
                    octave: 1
                },
                marks: DurationMarks {
                    underlines: 1,
                    dots: 1,
                    tie: true
                },
            }]
        );
    }

    #[test]
    fn test_barlines_and_extension() {
        let tokens = kinds("5 - | 1 ||");
        assert_eq!(tokens.len(), 5);
        assert_eq!(tokens[1], TokenKind::Extend);
        assert_eq!(tokens[2], TokenKind::Barline { final_bar: false });
        assert_eq!(tokens[4], TokenKind::Barline { final_bar: true });
    }

    #[test]
    fn test_chord() {
        let tokens = kinds("[1 3 5']_");
        match &tokens[0] {
            TokenKind::Chord { pitches, marks } => {
                assert_eq!(pitches.len(), 3);
                assert_eq!(pitches[2].octave, 1);
                assert_eq!(marks.underlines, 1);
            }
            other => panic!("expected chord, got {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_chord_is_error() {
        let err = tokenize_line("1 [3 5").unwrap_err();
        assert_eq!(err.column, 2);
    }

    #[test]
    fn test_unknown_characters_warn() {
        let out = tokenize_line("1 x 2 9").unwrap();
        assert_eq!(out.tokens.len(), 2);
        assert_eq!(out.warnings.len(), 2);
    }

    #[test]
    fn test_long_modifier_runs_saturate() {
        let line = format!("{}1{} {}2", "#".repeat(130), "'".repeat(130), "b".repeat(200));
        let tokens = kinds(&line);
        match (&tokens[0], &tokens[1]) {
            (TokenKind::Note { pitch: high, .. }, TokenKind::Note { pitch: low, .. }) => {
                assert_eq!(high.accidental, i8::MAX);
                assert_eq!(high.octave, i8::MAX);
                assert_eq!(low.accidental, i8::MIN);
            }
            other => panic!("expected two notes, got {:?}", other),
        }
    }
}

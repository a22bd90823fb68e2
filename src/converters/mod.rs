//! Format converters
//!
//! One converter per external representation. Every importer implements
//! [`SheetParser`]: a cheap `validate` pre-check and a `parse` that always
//! terminates in an [`ImportResult`], never a panic or a bare `Err`.
//!
//! ```text
//! bytes/text ──validate──▶ parse ──▶ ImportResult::Success { score, warnings }
//!                 │                 └▶ ImportResult::Failure(ImportError::Fatal)
//!                 └───────────────────▶ ImportResult::Failure(ImportError::Validation)
//! ```

pub mod jianpu;
pub mod json;
pub mod midi;
pub mod musicxml;

use crate::models::Score;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// External representations the import pipeline understands
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ImportFormat {
    Midi,
    Json,
    MusicXml,
    Jianpu,
}

impl ImportFormat {
    /// Text formats in auto-detection fallback priority order
    pub const TEXT_PRIORITY: [ImportFormat; 3] =
        [ImportFormat::Json, ImportFormat::MusicXml, ImportFormat::Jianpu];

    /// Guess a format from a file extension (without the dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mid" | "midi" | "smf" => Some(ImportFormat::Midi),
            "json" => Some(ImportFormat::Json),
            "xml" | "musicxml" | "mxl" => Some(ImportFormat::MusicXml),
            "jp" | "jianpu" | "txt" => Some(ImportFormat::Jianpu),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ImportFormat::Midi => "MIDI",
            ImportFormat::Json => "JSON",
            ImportFormat::MusicXml => "MusicXML",
            ImportFormat::Jianpu => "Jianpu",
        }
    }
}

impl fmt::Display for ImportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why an import failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    /// Content failed the cheap structural pre-check; try another parser
    #[error("content is not {format}: {reason}")]
    Validation { format: ImportFormat, reason: String },

    /// Content looked right but could not be turned into a score
    #[error("{format} import failed: {message}")]
    Fatal { format: ImportFormat, message: String },

    /// No registered parser accepted the content
    #[error("unrecognized content: {0}")]
    Unrecognized(String),
}

impl ImportError {
    pub fn is_validation(&self) -> bool {
        matches!(self, ImportError::Validation { .. })
    }
}

/// Outcome of one import: a score with warnings, or an error. Never both.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportResult {
    Success { score: Score, warnings: Vec<String> },
    Failure(ImportError),
}

impl ImportResult {
    pub fn success(score: Score, warnings: Vec<String>) -> Self {
        ImportResult::Success { score, warnings }
    }

    pub fn validation(format: ImportFormat, reason: impl Into<String>) -> Self {
        ImportResult::Failure(ImportError::Validation {
            format,
            reason: reason.into(),
        })
    }

    pub fn fatal(format: ImportFormat, message: impl Into<String>) -> Self {
        ImportResult::Failure(ImportError::Fatal {
            format,
            message: message.into(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ImportResult::Success { .. })
    }

    pub fn score(&self) -> Option<&Score> {
        match self {
            ImportResult::Success { score, .. } => Some(score),
            ImportResult::Failure(_) => None,
        }
    }

    pub fn warnings(&self) -> &[String] {
        match self {
            ImportResult::Success { warnings, .. } => warnings,
            ImportResult::Failure(_) => &[],
        }
    }

    pub fn error(&self) -> Option<&ImportError> {
        match self {
            ImportResult::Success { .. } => None,
            ImportResult::Failure(e) => Some(e),
        }
    }

    /// Prepend warnings collected outside the parser (e.g. fallback notes)
    pub fn with_leading_warnings(self, mut leading: Vec<String>) -> Self {
        match self {
            ImportResult::Success { score, warnings } => {
                leading.extend(warnings);
                ImportResult::Success {
                    score,
                    warnings: leading,
                }
            }
            failure => failure,
        }
    }

    pub fn into_result(self) -> Result<(Score, Vec<String>), ImportError> {
        match self {
            ImportResult::Success { score, warnings } => Ok((score, warnings)),
            ImportResult::Failure(e) => Err(e),
        }
    }
}

/// Common contract for all importers
pub trait SheetParser: Send + Sync {
    /// Format this parser reads
    fn format(&self) -> ImportFormat;

    /// Cheap structural check, run before committing to a full parse
    fn validate(&self, content: &[u8]) -> bool;

    /// Full parse. Must not panic on malformed input.
    fn parse(&self, content: &[u8]) -> ImportResult;

    /// Validate, then parse. Validation failures are reported distinctly
    /// so callers can move on to the next candidate cheaply.
    fn import(&self, content: &[u8]) -> ImportResult {
        if !self.validate(content) {
            return ImportResult::validation(self.format(), "structural pre-check failed");
        }
        self.parse(content)
    }
}

/// Decode UTF-8 text, dropping a leading byte-order mark
pub(crate) fn decode_text(content: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(content).ok()?;
    Some(text.strip_prefix('\u{feff}').unwrap_or(text))
}

/// First non-whitespace character of the content, if it is text
pub(crate) fn leading_char(content: &[u8]) -> Option<char> {
    decode_text(content)?.trim_start().chars().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ImportFormat::from_extension("MID"), Some(ImportFormat::Midi));
        assert_eq!(ImportFormat::from_extension("musicxml"), Some(ImportFormat::MusicXml));
        assert_eq!(ImportFormat::from_extension("pdf"), None);
    }

    #[test]
    fn test_result_accessors() {
        let ok = ImportResult::success(Score::blank("A", 1, 1), vec!["w".into()])
            .with_leading_warnings(vec!["first".into()]);
        assert!(ok.is_success());
        assert_eq!(ok.warnings(), ["first".to_string(), "w".to_string()]);

        let fail = ImportResult::validation(ImportFormat::Json, "nope");
        assert!(fail.score().is_none());
        assert!(fail.warnings().is_empty());
        assert!(fail.error().unwrap().is_validation());
    }

    #[test]
    fn test_decode_text_strips_bom() {
        assert_eq!(decode_text("\u{feff}{}".as_bytes()), Some("{}"));
        assert_eq!(leading_char(b"  \n<score"), Some('<'));
        assert_eq!(decode_text(&[0xff, 0xfe]), None);
    }
}

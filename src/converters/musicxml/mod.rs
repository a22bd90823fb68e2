//! MusicXML subset support
//!
//! - [`import`]: `<score-partwise>` → [`Score`] (roxmltree)
//! - [`export`]: [`Score`] → `<score-partwise>` (quick-xml)

pub mod export;
pub mod import;

pub use export::{to_musicxml, ExportError, DIVISIONS};
pub use import::parse_musicxml;

use super::{decode_text, ImportFormat, ImportResult, SheetParser};

/// Importer for MusicXML documents
#[derive(Debug, Default, Clone, Copy)]
pub struct MusicXmlParser;

impl SheetParser for MusicXmlParser {
    fn format(&self) -> ImportFormat {
        ImportFormat::MusicXml
    }

    fn validate(&self, content: &[u8]) -> bool {
        let Some(text) = decode_text(content) else {
            return false;
        };
        text.trim_start().starts_with('<')
            && (text.contains("<score-partwise") || text.contains("<score-timewise"))
    }

    fn parse(&self, content: &[u8]) -> ImportResult {
        let Some(text) = decode_text(content) else {
            return ImportResult::fatal(ImportFormat::MusicXml, "content is not valid UTF-8");
        };
        match parse_musicxml(text) {
            Ok((score, warnings)) => {
                log::info!(
                    "MusicXML import: {} track(s), {} measure(s), {} warning(s)",
                    score.tracks.len(),
                    score.measure_count(),
                    warnings.len()
                );
                ImportResult::success(score, warnings)
            }
            Err(message) => ImportResult::fatal(ImportFormat::MusicXml, message),
        }
    }
}

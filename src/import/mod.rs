//! Import pipeline
//!
//! A [`ParserRegistry`] maps each [`ImportFormat`] to one parser instance and
//! is built once, then handed to the [`ImportPipeline`]. Detection looks at
//! the leading bytes:
//!
//! | leading content | first candidate |
//! |-----------------|-----------------|
//! | `MThd`          | MIDI            |
//! | `{`             | JSON            |
//! | `<`             | MusicXML        |
//! | anything else   | Jianpu          |
//!
//! Text content then falls back through JSON → MusicXML → Jianpu; the first
//! success wins.

pub mod cache;
pub mod options;

pub use cache::{CacheStats, ImportCache};
pub use options::{ImportOptions, QUANTIZE_CHOICES};

use std::collections::HashMap;
use std::path::Path;

use crate::converters::jianpu::JianpuParser;
use crate::converters::json::JsonParser;
use crate::converters::midi::{is_smf, MidiParser};
use crate::converters::musicxml::MusicXmlParser;
use crate::converters::{leading_char, ImportError, ImportFormat, ImportResult, SheetParser};

/// Parser instances keyed by format
#[derive(Default)]
pub struct ParserRegistry {
    parsers: HashMap<ImportFormat, Box<dyn SheetParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in parser
    pub fn with_defaults(options: ImportOptions) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(MidiParser::new(options)));
        registry.register(Box::new(JsonParser));
        registry.register(Box::new(MusicXmlParser));
        registry.register(Box::new(JianpuParser));
        registry
    }

    /// Add or replace the parser for its format
    pub fn register(&mut self, parser: Box<dyn SheetParser>) {
        self.parsers.insert(parser.format(), parser);
    }

    pub fn get(&self, format: ImportFormat) -> Option<&dyn SheetParser> {
        self.parsers.get(&format).map(|p| p.as_ref())
    }

    pub fn formats(&self) -> Vec<ImportFormat> {
        let mut formats: Vec<_> = self.parsers.keys().copied().collect();
        formats.sort();
        formats
    }
}

/// First-choice format for the content
pub fn detect_format(content: &[u8]) -> ImportFormat {
    if is_smf(content) {
        return ImportFormat::Midi;
    }
    match leading_char(content) {
        Some('{') => ImportFormat::Json,
        Some('<') => ImportFormat::MusicXml,
        _ => ImportFormat::Jianpu,
    }
}

/// Candidate order: the detected format first, then the text fallbacks
pub fn candidate_order(content: &[u8]) -> Vec<ImportFormat> {
    let first = detect_format(content);
    if first == ImportFormat::Midi {
        return vec![ImportFormat::Midi];
    }
    let mut order = vec![first];
    order.extend(ImportFormat::TEXT_PRIORITY.iter().copied().filter(|f| *f != first));
    order
}

/// Human title from a file name: extension dropped, `_`/`-` read as spaces
pub fn title_from_filename(name: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);
    stem.replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct ImportPipeline {
    registry: ParserRegistry,
}

impl ImportPipeline {
    pub fn new(registry: ParserRegistry) -> Self {
        Self { registry }
    }

    pub fn with_options(options: ImportOptions) -> Self {
        Self::new(ParserRegistry::with_defaults(options))
    }

    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    /// Auto-detect and import. Earlier candidates' failures are kept as
    /// leading warnings on success.
    pub fn import(&self, content: &[u8]) -> ImportResult {
        let mut notes = Vec::new();
        let mut last_fatal: Option<ImportError> = None;

        for format in candidate_order(content) {
            let Some(parser) = self.registry.get(format) else {
                continue;
            };
            log::debug!("import: trying {}", format);
            match parser.import(content) {
                ImportResult::Success { score, warnings } => {
                    log::info!("import: parsed as {}", format);
                    return ImportResult::success(score, warnings).with_leading_warnings(notes);
                }
                ImportResult::Failure(e) => {
                    log::debug!("import: {} rejected: {}", format, e);
                    if !e.is_validation() {
                        notes.push(e.to_string());
                        last_fatal = Some(e);
                    }
                }
            }
        }

        log::warn!("import: no parser accepted the content");
        ImportResult::Failure(last_fatal.unwrap_or_else(|| {
            ImportError::Unrecognized("no parser accepted the content".into())
        }))
    }

    /// Import with a known format, no fallback
    pub fn import_as(&self, format: ImportFormat, content: &[u8]) -> ImportResult {
        match self.registry.get(format) {
            Some(parser) => parser.import(content),
            None => ImportResult::Failure(ImportError::Unrecognized(format!(
                "no parser registered for {}",
                format
            ))),
        }
    }

    /// Import a named file; an empty title is filled in from the name
    pub fn import_file(&self, name: &str, content: &[u8]) -> ImportResult {
        with_file_title(name, self.import(content))
    }
}

/// Fill an empty title on a successful result from the file name
pub fn with_file_title(name: &str, result: ImportResult) -> ImportResult {
    match result {
        ImportResult::Success { mut score, warnings } => {
            if score.title.trim().is_empty() {
                score.title = title_from_filename(name);
            }
            ImportResult::success(score, warnings)
        }
        failure => failure,
    }
}

impl Default for ImportPipeline {
    fn default() -> Self {
        Self::with_options(ImportOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converters::json::to_json;
    use crate::models::Score;

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(b"MThd\x00\x00\x00\x06"), ImportFormat::Midi);
        assert_eq!(detect_format(b"  {\"title\":1}"), ImportFormat::Json);
        assert_eq!(detect_format(b"<?xml version=\"1.0\"?>"), ImportFormat::MusicXml);
        assert_eq!(detect_format(b"1 2 3 4 |"), ImportFormat::Jianpu);
        assert_eq!(detect_format(&[0xff, 0x00]), ImportFormat::Jianpu);
    }

    #[test]
    fn test_candidate_order() {
        assert_eq!(
            candidate_order(b"<score-partwise/>"),
            vec![ImportFormat::MusicXml, ImportFormat::Json, ImportFormat::Jianpu]
        );
        assert_eq!(
            candidate_order(b"5 5 6 5"),
            vec![ImportFormat::Jianpu, ImportFormat::Json, ImportFormat::MusicXml]
        );
        assert_eq!(candidate_order(b"MThd"), vec![ImportFormat::Midi]);
    }

    #[test]
    fn test_title_from_filename() {
        assert_eq!(title_from_filename("moon_river-theme.mid"), "moon river theme");
        assert_eq!(title_from_filename("dir/Ode.xml"), "Ode");
        assert_eq!(title_from_filename("plain"), "plain");
    }

    #[test]
    fn test_registry() {
        let registry = ParserRegistry::with_defaults(ImportOptions::default());
        assert_eq!(registry.formats().len(), 4);
        assert_eq!(registry.get(ImportFormat::Json).unwrap().format(), ImportFormat::Json);
        assert!(ParserRegistry::new().get(ImportFormat::Json).is_none());
    }

    #[test]
    fn test_json_routes_to_json() {
        let score = Score::blank("Routed", 1, 1);
        let json = to_json(&score).unwrap();
        let (back, _) = ImportPipeline::default().import(json.as_bytes()).into_result().unwrap();
        assert_eq!(back, score);
    }

    #[test]
    fn test_unrecognized_content() {
        let result = ImportPipeline::default().import(b"%%%%");
        assert!(!result.is_success());
    }

    #[test]
    fn test_import_file_infers_title() {
        let (score, _) = ImportPipeline::default()
            .import_file("little_star.jp", b"1 1 5 5 | 6 6 5 - |")
            .into_result()
            .unwrap();
        assert_eq!(score.title, "little star");
    }

    #[test]
    fn test_missing_parser_is_unrecognized() {
        let pipeline = ImportPipeline::new(ParserRegistry::new());
        let result = pipeline.import(b"{}");
        assert!(matches!(result.error(), Some(ImportError::Unrecognized(_))));
        let result = pipeline.import_as(ImportFormat::Json, b"{}");
        assert!(matches!(result.error(), Some(ImportError::Unrecognized(_))));
    }
}

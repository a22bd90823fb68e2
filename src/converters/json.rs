//! JSON score format
//!
//! A direct object mapping of the document model: `Score` → `tracks` →
//! `measures` → `beats` → `notes`. Serializing then parsing yields a value
//! equal to the original.

use crate::diagnostics::validate_score;
use crate::models::Score;

use super::{decode_text, ImportFormat, ImportResult, SheetParser};

/// Serialize a score as pretty-printed JSON
pub fn to_json(score: &Score) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(score)
}

/// Deserialize a score without structural validation
pub fn from_json(text: &str) -> Result<Score, serde_json::Error> {
    serde_json::from_str(text)
}

/// Importer for the JSON score format
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonParser;

impl SheetParser for JsonParser {
    fn format(&self) -> ImportFormat {
        ImportFormat::Json
    }

    fn validate(&self, content: &[u8]) -> bool {
        decode_text(content)
            .map(str::trim)
            .map(|t| t.starts_with('{') && t.ends_with('}'))
            .unwrap_or(false)
    }

    fn parse(&self, content: &[u8]) -> ImportResult {
        let Some(text) = decode_text(content) else {
            return ImportResult::fatal(ImportFormat::Json, "content is not valid UTF-8");
        };

        let score = match from_json(text) {
            Ok(score) => score,
            Err(e) => {
                log::debug!("JSON score rejected: {}", e);
                return ImportResult::fatal(ImportFormat::Json, e.to_string());
            }
        };

        let diags = validate_score(&score);
        if let Some(err) = diags.first_error() {
            return ImportResult::fatal(ImportFormat::Json, err.message.clone());
        }

        ImportResult::success(score, diags.warning_messages())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converters::ImportError;
    use crate::models::{Beat, Hand, KeySignature, Measure, Note, NoteValue, TimeSignature};

    fn sample_score() -> Score {
        let mut score = Score::grand_staff("Minuet", 2);
        score.composer = "Anon.".into();
        score.metadata.key_signature = KeySignature::major(1);
        score.metadata.time_signature = TimeSignature::new(3, 4);
        score.metadata.tempo = 100;
        let mut accented = Note::new(74).with_velocity(96).tied(true);
        accented.articulations.accent = true;
        score.tracks[0].measures[0] = Measure::new(vec![
            Beat::new(NoteValue::Quarter, vec![accented]),
            Beat::note(NoteValue::Eighth, 67).dotted(1),
            Beat::rest(NoteValue::Sixteenth),
            Beat::chord(NoteValue::Quarter, &[71, 74]),
        ]);
        score.tracks[1].measures[1] = Measure::new(vec![Beat::note(NoteValue::Half, 43).dotted(1)]);
        score
    }

    #[test]
    fn test_round_trip_is_value_equal() {
        let score = sample_score();
        let json = to_json(&score).unwrap();
        let parsed = JsonParser.import(json.as_bytes());
        assert_eq!(parsed.score(), Some(&score));
        assert!(parsed.warnings().is_empty());
    }

    #[test]
    fn test_excess_dots_are_fatal() {
        let mut score = sample_score();
        score.tracks[1].measures[0] =
            Measure::new(vec![Beat::note(NoteValue::Quarter, 48).dotted(40)]);
        let json = to_json(&score).unwrap();
        let result = JsonParser.import(json.as_bytes());
        match result.error() {
            Some(ImportError::Fatal { message, .. }) => assert!(message.contains("dots")),
            other => panic!("expected a fatal error, got {:?}", other),
        }
    }

    #[test]
    fn test_hand_serializes_lowercase() {
        let json = to_json(&sample_score()).unwrap();
        assert!(json.contains("\"right\""));
        assert!(json.contains("\"bass\""));
        assert_eq!(sample_score().tracks[1].hand, Some(Hand::Left));
    }

    #[test]
    fn test_validate_rejects_non_objects() {
        assert!(!JsonParser.validate(b"<score-partwise/>"));
        assert!(!JsonParser.validate(b"1 2 3 |"));
        assert!(JsonParser.validate(b"  {\"title\": \"x\"}  "));

        let result = JsonParser.import(b"[1, 2]");
        assert!(result.error().unwrap().is_validation());
    }

    #[test]
    fn test_malformed_json_is_fatal() {
        let result = JsonParser.import(b"{\"title\": }");
        assert!(!result.is_success());
        assert!(!result.error().unwrap().is_validation());
    }

    #[test]
    fn test_structural_violation_is_fatal() {
        let mut score = sample_score();
        score.tracks[1].measures.pop();
        let json = to_json(&score).unwrap();
        let result = JsonParser.import(json.as_bytes());
        assert!(result.error().is_some());
    }
}

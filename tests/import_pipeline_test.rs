// Auto-detection and fallback through the import pipeline

use score_engine::converters::json::to_json;
use score_engine::converters::midi::{to_smf, MidiParser, Recognition};
use score_engine::converters::musicxml::to_musicxml;
use score_engine::import::ParserRegistry;
use score_engine::{
    Beat, ImportError, ImportFormat, ImportOptions, ImportPipeline, ImportResult, Measure,
    NoteValue, Score, SheetParser,
};

fn melody() -> Score {
    let mut score = Score::blank("Melody", 1, 1);
    score.tracks[0].measures[0] = Measure::new(vec![
        Beat::note(NoteValue::Quarter, 60),
        Beat::note(NoteValue::Quarter, 62),
        Beat::note(NoteValue::Half, 64),
    ]);
    score
}

fn pitches(score: &Score, track: usize) -> Vec<u8> {
    score.tracks[track]
        .measures
        .iter()
        .flat_map(|m| m.beats.iter())
        .flat_map(|b| b.sounding().map(|n| n.pitch))
        .collect()
}

#[test]
fn test_json_is_detected_and_restored() {
    let json = to_json(&melody()).expect("JSON export should succeed");
    let result = ImportPipeline::default().import(json.as_bytes());
    let (score, _) = result.into_result().expect("JSON import should succeed");
    assert_eq!(score, melody());
}

#[test]
fn test_musicxml_is_detected() {
    let xml = to_musicxml(&melody()).expect("MusicXML export should succeed");
    let (score, _) = ImportPipeline::default()
        .import(xml.as_bytes())
        .into_result()
        .expect("MusicXML import should succeed");
    assert_eq!(score.title, "Melody");
    assert_eq!(pitches(&score, 0), vec![60, 62, 64]);
}

#[test]
fn test_jianpu_is_detected() {
    let (score, _) = ImportPipeline::default()
        .import(b"1 2 3 - |")
        .into_result()
        .expect("Jianpu import should succeed");
    assert_eq!(score.measure_count(), 1);
    assert_eq!(pitches(&score, 0), vec![60, 62, 64]);
}

#[test]
fn test_midi_is_detected() {
    let bytes = to_smf(&melody()).expect("MIDI export should succeed");
    let result = ImportPipeline::with_options(ImportOptions::default()).import(&bytes);
    let (score, warnings) = result.into_result().expect("MIDI import should succeed");
    assert_eq!(pitches(&score, 0), vec![60, 62, 64]);
    assert!(warnings.is_empty(), "{:?}", warnings);

    let recognition = MidiParser::default()
        .recognize(&bytes)
        .expect("exported file is readable");
    assert_eq!(recognition, Recognition::SingleVoice);
}

#[test]
fn test_import_file_fills_title_from_name() {
    let result = ImportPipeline::default().import_file("ode_to_joy.jp", b"3 3 4 5 |");
    assert_eq!(result.score().map(|s| s.title.as_str()), Some("ode to joy"));
}

#[test]
fn test_broken_midi_does_not_fall_back() {
    let result = ImportPipeline::default().import(b"MThd\x00\x00");
    match result {
        ImportResult::Failure(ImportError::Fatal { format, .. }) => {
            assert_eq!(format, ImportFormat::Midi)
        }
        other => panic!("expected a fatal MIDI error, got {:?}", other),
    }
}

#[test]
fn test_unrecognized_content() {
    let result = ImportPipeline::default().import(b"   ");
    assert!(matches!(
        result,
        ImportResult::Failure(ImportError::Unrecognized(_))
    ));
}

/// Accepts anything and returns a one-note score
struct CatchAll;

impl SheetParser for CatchAll {
    fn format(&self) -> ImportFormat {
        ImportFormat::Jianpu
    }

    fn validate(&self, _content: &[u8]) -> bool {
        true
    }

    fn parse(&self, _content: &[u8]) -> ImportResult {
        let mut score = Score::blank("Fallback", 1, 1);
        score.tracks[0].measures[0] = Measure::new(vec![Beat::note(NoteValue::Whole, 67)]);
        ImportResult::success(score, vec!["caught".to_string()])
    }
}

#[test]
fn test_fallback_keeps_earlier_fatal_as_warning() {
    let mut registry = ParserRegistry::with_defaults(ImportOptions::default());
    registry.register(Box::new(CatchAll));
    let pipeline = ImportPipeline::new(registry);

    // JSON is tried first and fails, MusicXML rejects it, the catch-all wins
    let (score, warnings) = pipeline
        .import(b"{ \"title\": }")
        .into_result()
        .expect("fallback parser should succeed");
    assert_eq!(score.title, "Fallback");
    assert_eq!(warnings.len(), 2);
    assert!(warnings[0].contains("JSON"));
    assert_eq!(warnings[1], "caught");
}

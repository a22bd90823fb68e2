//! Standard MIDI File support
//!
//! Import runs in four stages, each testable on its own:
//!
//! ```text
//! bytes ─reader─▶ RawTracks ─classify─▶ ClassifiedTracks ─build─▶ Measures ─▶ Score
//!                  (+ meta)                                 (key estimated if absent)
//! ```
//!
//! Export goes through `midly` (see [`export`]).

pub mod build;
pub mod classify;
pub mod export;
pub mod key;
pub mod reader;

pub use build::{build_measures, Grid};
pub use classify::{
    classify, ClassifiedTrack, Classification, ClassifierThresholds, ClassifyOptions,
    ImportMode, Recognition, TrackCharacteristics,
};
pub use export::{to_smf, MidiExportError};
pub use key::{estimate_key, KeyEstimate};
pub use reader::{is_smf, read_smf, read_vlq, MidiError, RawNote, RawTrack, SmfData};

use super::{ImportFormat, ImportResult, SheetParser};
use crate::import::ImportOptions;
use crate::models::{
    Hand, KeyMode, KeySignature, Score, ScoreMetadata, TimeSignature, Track, DEFAULT_TEMPO,
};

/// Importer for Standard MIDI Files
#[derive(Debug, Default, Clone, Copy)]
pub struct MidiParser {
    pub options: ImportOptions,
}

impl MidiParser {
    pub fn new(options: ImportOptions) -> Self {
        Self { options }
    }

    /// How the classifier would group this file's tracks, without building a score
    pub fn recognize(&self, content: &[u8]) -> Result<Recognition, MidiError> {
        let data = read_smf(content)?;
        Ok(classify(&data.tracks, &self.options.classify_options()).recognition)
    }

    fn metadata(&self, data: &SmfData, warnings: &mut Vec<String>) -> ScoreMetadata {
        let meta = &data.meta;
        let tempo = meta
            .tempo
            .filter(|&us| us > 0)
            .map(|us| (60_000_000.0 / us as f64).round().clamp(1.0, u16::MAX as f64) as u16)
            .unwrap_or(DEFAULT_TEMPO);

        let time_signature = match meta.time_signature {
            Some((n, d)) if n > 0 && d.is_power_of_two() && d <= build::FINEST_GRID as u8 => {
                TimeSignature::new(n, d)
            }
            Some((n, d)) => {
                warnings.push(format!("unsupported time signature {}/{}; using 4/4", n, d));
                TimeSignature::default()
            }
            None => TimeSignature::default(),
        };

        let key_signature = match meta.key_signature {
            Some((fifths, minor)) => KeySignature::new(
                fifths,
                if minor { KeyMode::Minor } else { KeyMode::Major },
            ),
            None if self.options.analyze_key => {
                let pitched = data
                    .tracks
                    .iter()
                    .flat_map(|t| t.notes.iter())
                    .filter(|n| n.channel != classify::DRUM_CHANNEL);
                estimate_key(pitched)
                    .map(|k| k.signature())
                    .unwrap_or_default()
            }
            None => KeySignature::default(),
        };

        ScoreMetadata {
            key_signature,
            time_signature,
            tempo,
            ppq: data.header.division,
        }
    }
}

fn instrument_for(track: &ClassifiedTrack) -> String {
    match (track.program, track.hand) {
        (Some(program), _) => format!("gm:{}", program),
        (None, Some(_)) => "piano".to_string(),
        (None, None) => String::new(),
    }
}

impl SheetParser for MidiParser {
    fn format(&self) -> ImportFormat {
        ImportFormat::Midi
    }

    fn validate(&self, content: &[u8]) -> bool {
        is_smf(content)
    }

    fn parse(&self, content: &[u8]) -> ImportResult {
        let data = match read_smf(content) {
            Ok(data) => data,
            Err(e) => return ImportResult::fatal(ImportFormat::Midi, e.to_string()),
        };
        let mut warnings = data.warnings.clone();
        let metadata = self.metadata(&data, &mut warnings);

        let classification = classify(&data.tracks, &self.options.classify_options());
        warnings.extend(classification.warnings.iter().cloned());
        if classification.tracks.iter().all(|t| t.notes.is_empty()) {
            return ImportResult::fatal(ImportFormat::Midi, "no notes found");
        }
        log::info!(
            "MIDI import: {} raw track(s) recognized as {} → {} track(s)",
            data.tracks.len(),
            classification.recognition,
            classification.tracks.len()
        );

        let grid = Grid::new(metadata.ppq, &metadata.time_signature, self.options.quantize);
        let end_slot = classification
            .tracks
            .iter()
            .flat_map(|t| t.notes.iter())
            .map(|n| {
                let start = grid.slot(n.start);
                grid.slot(n.end).max(start + 1)
            })
            .max()
            .unwrap_or(0);
        let measure_count = grid.measures_for(end_slot).max(1);

        let tracks = classification
            .tracks
            .iter()
            .map(|t| {
                let mut track = Track::new(t.name.clone(), t.clef)
                    .with_instrument(instrument_for(t))
                    .with_measures(build_measures(&t.notes, &grid, measure_count));
                if let Some(hand) = t.hand {
                    track = track.with_hand(hand);
                }
                track
            })
            .collect();

        ImportResult::success(Score::new("", metadata, tracks), warnings)
    }
}

/// True when the track pair reads as a piano grand staff
pub fn is_grand_staff(score: &Score) -> bool {
    score.tracks.len() == 2
        && score.tracks[0].hand == Some(Hand::Right)
        && score.tracks[1].hand == Some(Hand::Left)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Clef;
    use midly::{
        Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
    };

    fn note_events<'a>(channel: u8, notes: &[(u8, u32, u32)]) -> Vec<TrackEvent<'a>> {
        let mut timed = Vec::new();
        for &(pitch, start, end) in notes {
            timed.push((start, 1, MidiMessage::NoteOn { key: pitch.into(), vel: 100u8.into() }));
            timed.push((end, 0, MidiMessage::NoteOff { key: pitch.into(), vel: 0.into() }));
        }
        timed.sort_by_key(|(t, o, _)| (*t, *o));
        let mut prev = 0;
        let mut events: Vec<TrackEvent> = timed
            .into_iter()
            .map(|(t, _, message)| {
                let delta = t - prev;
                prev = t;
                TrackEvent {
                    delta: delta.into(),
                    kind: TrackEventKind::Midi { channel: channel.into(), message },
                }
            })
            .collect();
        events.push(TrackEvent {
            delta: 0.into(),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        events
    }

    fn smf_bytes(tracks: Vec<Vec<TrackEvent>>) -> Vec<u8> {
        let smf = Smf {
            header: Header {
                format: Format::Parallel,
                timing: Timing::Metrical(480u16.into()),
            },
            tracks,
        };
        let mut out = Vec::new();
        smf.write(&mut out).unwrap();
        out
    }

    fn piano_file() -> Vec<u8> {
        let conductor = vec![
            TrackEvent {
                delta: 0.into(),
                kind: TrackEventKind::Meta(MetaMessage::Tempo(500_000u32.into())),
            },
            TrackEvent {
                delta: 0.into(),
                kind: TrackEventKind::Meta(MetaMessage::TimeSignature(3, 2, 24, 8)),
            },
            TrackEvent {
                delta: 0.into(),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            },
        ];
        let right = note_events(0, &[(72, 0, 480), (74, 480, 960), (76, 960, 1440)]);
        let left = note_events(1, &[(48, 0, 960), (43, 960, 1440)]);
        smf_bytes(vec![conductor, right, left])
    }

    #[test]
    fn test_import_grand_staff() {
        let parser = MidiParser::default();
        let (score, warnings) = parser.import(&piano_file()).into_result().unwrap();
        assert_eq!(score.metadata.tempo, 120);
        assert_eq!(score.metadata.time_signature, TimeSignature::new(3, 4));
        assert!(is_grand_staff(&score));
        assert_eq!(score.tracks[1].clef, Clef::Bass);
        assert_eq!(score.tracks[0].instrument, "piano");
        assert_eq!(score.measure_count(), 1);
        assert_eq!(score.tracks[0].measures[0].beats.len(), 3);
        assert_eq!(score.tracks[1].measures[0].beats.len(), 2);
        assert!(warnings.is_empty(), "{:?}", warnings);
        assert_eq!(parser.recognize(&piano_file()).unwrap(), Recognition::GrandStaff);
    }

    #[test]
    fn test_repeated_pitch_track_imports() {
        let bytes = smf_bytes(vec![note_events(0, &[(60, 0, 480), (60, 480, 960)])]);
        let (score, _) = MidiParser::default().import(&bytes).into_result().unwrap();
        assert_eq!(score.tracks.len(), 1);
        let pitches: Vec<u8> = score.tracks[0].measures[0]
            .beats
            .iter()
            .flat_map(|b| b.sounding().map(|n| n.pitch))
            .collect();
        assert_eq!(pitches, vec![60, 60]);
    }

    #[test]
    fn test_key_is_estimated_when_absent() {
        let melody = note_events(
            0,
            &[(65, 0, 480), (69, 480, 960), (72, 960, 1440), (70, 1440, 1920), (65, 1920, 3840)],
        );
        let bytes = smf_bytes(vec![melody]);
        let (score, _) = MidiParser::default().import(&bytes).into_result().unwrap();
        assert_eq!(score.metadata.key_signature, KeySignature::major(-1));

        let options = ImportOptions {
            analyze_key: false,
            ..ImportOptions::default()
        };
        let (plain, _) = MidiParser::new(options).import(&bytes).into_result().unwrap();
        assert_eq!(plain.metadata.key_signature, KeySignature::default());
    }

    #[test]
    fn test_force_piano_mode() {
        let melody = note_events(0, &[(60, 0, 480), (40, 480, 960), (80, 960, 1920)]);
        let options = ImportOptions::default().with_mode(ImportMode::ForcePiano);
        let (score, _) = MidiParser::new(options)
            .import(&smf_bytes(vec![melody]))
            .into_result()
            .unwrap();
        assert!(is_grand_staff(&score));
        assert!(score.has_uniform_measures());
    }

    #[test]
    fn test_fatal_paths() {
        let parser = MidiParser::default();
        assert!(!parser.validate(b"{}"));
        assert!(parser.import(b"MThd\x00\x00").error().is_some());

        let silent = smf_bytes(vec![vec![TrackEvent {
            delta: 0.into(),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        }]]);
        let result = parser.import(&silent);
        assert!(!result.is_success());
        assert!(result.error().unwrap().to_string().contains("no notes"));
    }

    #[test]
    fn test_export_then_import() {
        let bytes = to_smf(&Score::grand_staff("Blank", 1)).unwrap();
        let result = MidiParser::default().import(&bytes);
        // blank score has nothing to sound
        assert!(!result.is_success());
    }
}

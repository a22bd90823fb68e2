//! Jianpu text import
//!
//! Header lines set title, key, time and tempo; music lines are tokenized by
//! [`crate::parse`] and grouped by voice prefix into tracks. Durations start
//! at one beat unit, `_` halves, `.` dots and `-` adds a beat unit. Sums that
//! are not a single written value are split into tied pieces.

use std::collections::BTreeMap;

use num_rational::Ratio;

use crate::models::pitch::degree_to_pitch;
use crate::models::{
    Beat, Clef, Hand, KeySignature, Measure, Note, NoteValue, Score, ScoreMetadata, Track,
};
use crate::parse::{
    is_music_char, parse_header_line, split_voice, tokenize_line, DurationMarks, HeaderField,
    PitchToken, TokenKind, Voice,
};

use super::{decode_text, ImportFormat, ImportResult, SheetParser};

/// Importer for Jianpu numbered notation
#[derive(Debug, Default, Clone, Copy)]
pub struct JianpuParser;

/// One written note or chord before it is split into note values
#[derive(Debug, Clone)]
struct PendingBeat {
    /// Empty for a rest
    pitches: Vec<u8>,
    duration: Ratio<u32>,
    tie: bool,
}

#[derive(Debug, Default)]
struct VoiceBuilder {
    measures: Vec<Vec<PendingBeat>>,
    current: Vec<PendingBeat>,
}

impl VoiceBuilder {
    fn close_measure(&mut self) {
        if !self.current.is_empty() {
            self.measures.push(std::mem::take(&mut self.current));
        }
    }

    /// `-`: lengthen the last beat, or continue it across a barline as a tie
    fn extend(&mut self, unit: Ratio<u32>) -> bool {
        if let Some(last) = self.current.last_mut() {
            last.duration += unit;
            return true;
        }
        let Some(prev) = self.measures.last_mut().and_then(|m| m.last_mut()) else {
            return false;
        };
        let held = PendingBeat {
            pitches: prev.pitches.clone(),
            duration: unit,
            tie: prev.tie,
        };
        prev.tie = !prev.pitches.is_empty();
        self.current.push(held);
        true
    }

    fn has_pitches(&self) -> bool {
        self.measures
            .iter()
            .chain(std::iter::once(&self.current))
            .flatten()
            .any(|b| !b.pitches.is_empty())
    }
}

struct Context {
    metadata: ScoreMetadata,
    title: String,
    composer: String,
    instrument: String,
    /// Tonic used for degree lookup; follows mid-piece `1=` changes
    tonic: KeySignature,
    saw_key: bool,
    saw_music: bool,
    warnings: Vec<String>,
}

impl Context {
    fn new() -> Self {
        Self {
            metadata: ScoreMetadata::default(),
            title: String::new(),
            composer: String::new(),
            instrument: String::new(),
            tonic: KeySignature::default(),
            saw_key: false,
            saw_music: false,
            warnings: Vec::new(),
        }
    }

    fn apply(&mut self, field: HeaderField, line_no: usize) {
        match field {
            HeaderField::Title(t) => self.title = t,
            HeaderField::Composer(c) => self.composer = c,
            HeaderField::Instrument(i) => self.instrument = i,
            HeaderField::Key(key) => {
                if self.saw_key && self.saw_music {
                    self.warnings.push(format!(
                        "line {}: key change to {} applies to following degrees only",
                        line_no, key
                    ));
                } else {
                    self.metadata.key_signature = key;
                    self.saw_key = true;
                }
                self.tonic = key;
            }
            HeaderField::Time(time) => {
                if self.saw_music {
                    self.warnings
                        .push(format!("line {}: time change to {} ignored", line_no, time));
                } else {
                    self.metadata.time_signature = time;
                }
            }
            HeaderField::Tempo(bpm) => {
                if self.saw_music {
                    self.warnings
                        .push(format!("line {}: tempo change to {} ignored", line_no, bpm));
                } else {
                    self.metadata.tempo = bpm;
                }
            }
        }
    }

    fn resolve(&mut self, pitch: &PitchToken, line_no: usize) -> Option<u8> {
        let midi = degree_to_pitch(
            self.tonic.tonic_pitch_class(),
            pitch.degree,
            pitch.accidental,
            pitch.octave,
        );
        if midi.is_none() {
            self.warnings.push(format!(
                "line {}: degree {} with octave shift {} is out of range, dropped",
                line_no, pitch.degree, pitch.octave
            ));
        }
        midi
    }

    fn duration(&self, marks: &DurationMarks) -> Ratio<u32> {
        let unit = self.metadata.time_signature.beat_duration();
        let mut d = unit / Ratio::from_integer(1u32 << marks.underlines.min(5));
        let mut add = d;
        for _ in 0..marks.dots.min(NoteValue::MAX_DOTS) {
            add /= Ratio::from_integer(2);
            d += add;
        }
        d
    }
}

fn is_comment(line: &str) -> bool {
    line.starts_with("//") || line.starts_with('%')
}

fn strip_trailing_comment(line: &str) -> &str {
    line.split_once("//").map(|(body, _)| body).unwrap_or(line)
}

/// A line that reads as music: has a scale degree and is mostly notation
fn looks_like_music(line: &str) -> bool {
    let (_, body) = split_voice(line);
    let visible: Vec<char> = body.chars().filter(|c| !c.is_whitespace()).collect();
    if !visible.iter().any(|c| ('0'..='7').contains(c)) {
        return false;
    }
    let music = visible.iter().filter(|c| is_music_char(**c)).count();
    music * 5 >= visible.len() * 4
}

impl SheetParser for JianpuParser {
    fn format(&self) -> ImportFormat {
        ImportFormat::Jianpu
    }

    fn validate(&self, content: &[u8]) -> bool {
        let Some(text) = decode_text(content) else {
            return false;
        };
        let trimmed = text.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('{') || trimmed.starts_with('<') {
            return false;
        }
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !is_comment(l))
            .filter(|l| parse_header_line(l).is_none())
            .any(|l| looks_like_music(strip_trailing_comment(l)))
    }

    fn parse(&self, content: &[u8]) -> ImportResult {
        let Some(text) = decode_text(content) else {
            return ImportResult::fatal(ImportFormat::Jianpu, "content is not valid UTF-8");
        };

        let mut ctx = Context::new();
        let mut voices: BTreeMap<Voice, VoiceBuilder> = BTreeMap::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || is_comment(line) {
                continue;
            }

            if let Some(header) = parse_header_line(line) {
                for w in header.warnings {
                    ctx.warnings.push(format!("line {}: {}", line_no, w));
                }
                for field in header.fields {
                    ctx.apply(field, line_no);
                }
                continue;
            }

            let (voice, body) = split_voice(strip_trailing_comment(line));
            let tokens = match tokenize_line(body) {
                Ok(t) => t,
                Err(e) => {
                    return ImportResult::fatal(
                        ImportFormat::Jianpu,
                        format!("line {}, {}", line_no, e),
                    )
                }
            };
            for w in tokens.warnings {
                ctx.warnings.push(format!("line {}, {}", line_no, w));
            }
            ctx.saw_music = true;

            let unit = ctx.metadata.time_signature.beat_duration();
            let builder = voices.entry(voice).or_default();
            for token in tokens.tokens {
                match token.kind {
                    TokenKind::Note { pitch, marks } => {
                        let pitches = if pitch.is_rest() {
                            Vec::new()
                        } else {
                            ctx.resolve(&pitch, line_no).into_iter().collect()
                        };
                        builder.current.push(PendingBeat {
                            pitches,
                            duration: ctx.duration(&marks),
                            tie: marks.tie,
                        });
                    }
                    TokenKind::Chord { pitches, marks } => {
                        let mut resolved: Vec<u8> = pitches
                            .iter()
                            .filter_map(|p| ctx.resolve(p, line_no))
                            .collect();
                        resolved.sort_unstable();
                        resolved.dedup();
                        builder.current.push(PendingBeat {
                            pitches: resolved,
                            duration: ctx.duration(&marks),
                            tie: marks.tie,
                        });
                    }
                    TokenKind::Extend => {
                        if !builder.extend(unit) {
                            ctx.warnings.push(format!(
                                "line {}, column {}: '-' with no note to extend",
                                line_no, token.column
                            ));
                        }
                    }
                    TokenKind::Barline { .. } => builder.close_measure(),
                }
            }
        }

        for builder in voices.values_mut() {
            builder.close_measure();
        }
        voices.retain(|_, b| !b.measures.is_empty());

        if !voices.values().any(VoiceBuilder::has_pitches) {
            return ImportResult::fatal(ImportFormat::Jianpu, "no notes found");
        }

        let has_hands = voices.contains_key(&Voice::Right) || voices.contains_key(&Voice::Left);
        let instrument = if ctx.instrument.is_empty() && has_hands {
            "piano".to_string()
        } else {
            ctx.instrument.clone()
        };

        let mut tracks: Vec<Track> = voices
            .into_iter()
            .map(|(voice, builder)| build_track(voice, builder, &instrument, &mut ctx))
            .collect();

        let padded = Score::equalize_measures(&mut tracks);
        if padded > 0 {
            ctx.warnings.push(format!(
                "voices had different lengths; {} empty measure(s) added",
                padded
            ));
        }

        log::info!(
            "Jianpu import: {} track(s), {} measure(s), {} warning(s)",
            tracks.len(),
            tracks.first().map(Track::measure_count).unwrap_or(0),
            ctx.warnings.len()
        );

        let mut score = Score::new(ctx.title.clone(), ctx.metadata, tracks);
        score.composer = ctx.composer.clone();
        ImportResult::success(score, ctx.warnings)
    }
}

fn build_track(voice: Voice, builder: VoiceBuilder, instrument: &str, ctx: &mut Context) -> Track {
    let capacity = ctx.metadata.time_signature.measure_duration();
    let label = voice.label();

    let mut measures = Vec::with_capacity(builder.measures.len());
    for (idx, pending) in builder.measures.into_iter().enumerate() {
        let total: Ratio<u32> = pending.iter().map(|p| p.duration).sum();
        if total != capacity {
            ctx.warnings.push(format!(
                "{} measure {}: holds {} but the time signature expects {}",
                label,
                idx + 1,
                total,
                capacity
            ));
        }
        let beats = pending.into_iter().flat_map(split_pending).collect();
        measures.push(Measure::new(beats));
    }

    let clef = match voice {
        Voice::Right => Clef::Treble,
        Voice::Left => Clef::Bass,
        _ => clef_for(&measures),
    };
    let mut track = Track::new(label, clef)
        .with_instrument(instrument)
        .with_measures(measures);
    match voice {
        Voice::Right => track = track.with_hand(Hand::Right),
        Voice::Left => track = track.with_hand(Hand::Left),
        _ => {}
    }
    track
}

/// Split a written duration into note values, tying the pieces together
fn split_pending(pending: PendingBeat) -> Vec<Beat> {
    let pieces = NoteValue::decompose(pending.duration);
    let last = pieces.len().saturating_sub(1);
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, (value, dots))| {
            let tie = if i == last { pending.tie } else { true };
            let notes = pending
                .pitches
                .iter()
                .map(|&p| Note::new(p).tied(tie))
                .collect();
            Beat::new(value, notes).dotted(dots)
        })
        .collect()
}

/// Bass clef when the average pitch sits below middle C
fn clef_for(measures: &[Measure]) -> Clef {
    let (sum, count) = measures
        .iter()
        .flat_map(|m| m.beats.iter())
        .flat_map(|b| b.sounding())
        .fold((0u32, 0u32), |(s, c), n| (s + n.pitch as u32, c + 1));
    if count > 0 && sum / count < 60 {
        Clef::Bass
    } else {
        Clef::Treble
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeSignature;

    fn import(text: &str) -> (Score, Vec<String>) {
        JianpuParser.import(text.as_bytes()).into_result().unwrap()
    }

    #[test]
    fn test_simple_melody() {
        let (score, warnings) = import("title: Scale\n1=C 4/4\n1 2 3 4 | 5 6 7 1' |\n");
        assert!(warnings.is_empty(), "{:?}", warnings);
        assert_eq!(score.title, "Scale");
        assert_eq!(score.tracks.len(), 1);
        assert_eq!(score.tracks[0].name, "Melody");
        assert_eq!(score.measure_count(), 2);
        let pitches: Vec<u8> = score.tracks[0].measures[1]
            .beats
            .iter()
            .map(|b| b.notes[0].pitch)
            .collect();
        assert_eq!(pitches, vec![67, 69, 71, 72]);
        assert_eq!(score.completion_ratio(), 1.0);
    }

    #[test]
    fn test_key_and_accidentals() {
        let (score, _) = import("1=D\n1 #4 b7 1, |");
        let pitches: Vec<u8> = score.tracks[0].measures[0]
            .beats
            .iter()
            .map(|b| b.notes[0].pitch)
            .collect();
        assert_eq!(pitches, vec![62, 68, 72, 50]);
        assert_eq!(score.metadata.key_signature, KeySignature::major(2));
    }

    #[test]
    fn test_durations() {
        let (score, warnings) = import("1_ 2_ 3. 4_ 5 | 6 - 7 - |");
        assert!(warnings.is_empty(), "{:?}", warnings);
        let beats = &score.tracks[0].measures[0].beats;
        assert_eq!(beats[0].value, NoteValue::Eighth);
        assert_eq!(beats[2].value, NoteValue::Quarter);
        assert_eq!(beats[2].dots, 1);
        assert_eq!(beats[4].value, NoteValue::Quarter);
        assert_eq!(score.tracks[0].measures[1].beats[0].value, NoteValue::Half);
    }

    #[test]
    fn test_extension_splits_into_tied_values() {
        // a quarter plus four beat units cannot be one written value
        let (score, _) = import("time: 3/4\n5 - - - - |");
        let beats = &score.tracks[0].measures[0].beats;
        assert_eq!(beats.len(), 2);
        assert!(beats[0].notes[0].tie);
        assert!(!beats[1].notes[0].tie);
        assert_eq!(score.metadata.time_signature, TimeSignature::new(3, 4));
    }

    #[test]
    fn test_extension_across_barline_ties() {
        let (score, _) = import("1 2 3 4 | - 5 6 7 |");
        let m0 = &score.tracks[0].measures[0];
        let m1 = &score.tracks[0].measures[1];
        assert!(m0.beats[3].notes[0].tie);
        assert_eq!(m1.beats[0].notes[0].pitch, 65);
    }

    #[test]
    fn test_hands_become_grand_staff() {
        let (score, _) = import("R: 3 4 5 5 | 1' - - - |\nL: 1, 5, 1, 5, |\n");
        assert_eq!(score.tracks.len(), 2);
        assert_eq!(score.tracks[0].hand, Some(Hand::Right));
        assert_eq!(score.tracks[1].hand, Some(Hand::Left));
        assert_eq!(score.tracks[1].clef, Clef::Bass);
        assert_eq!(score.tracks[0].instrument, "piano");
        assert!(score.has_uniform_measures());
        assert_eq!(score.tracks[1].measures[1].beats.len(), 0);
    }

    #[test]
    fn test_chord_and_rest() {
        let (score, _) = import("[1 3 5] 0 [5, 7, 2] 0 |");
        let beats = &score.tracks[0].measures[0].beats;
        assert!(beats[0].is_chord());
        assert!(beats[1].is_rest());
        assert_eq!(beats[2].notes.len(), 3);
    }

    #[test]
    fn test_short_measure_warns() {
        let (_, warnings) = import("1 2 3 |");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("expects 1"));
    }

    #[test]
    fn test_validate() {
        assert!(JianpuParser.validate(b"1 2 3 |"));
        assert!(JianpuParser.validate(b"title: x\n// comment\nR: 1 2 |"));
        assert!(!JianpuParser.validate(b"{\"tracks\": []}"));
        assert!(!JianpuParser.validate(b"hello world"));
        assert!(!JianpuParser.validate(b"title: only a header"));
        assert!(!JianpuParser.validate(&[0xff, 0x00]));
    }

    #[test]
    fn test_unterminated_chord_is_fatal() {
        let result = JianpuParser.import(b"1 2 [3 5");
        assert!(!result.is_success());
        assert!(!result.error().unwrap().is_validation());
    }

    #[test]
    fn test_only_rests_is_fatal() {
        assert!(!JianpuParser.import(b"0 0 0 0 |").is_success());
    }

    #[test]
    fn test_absurd_accidental_run_drops_note() {
        let text = format!("{}1 2 3 4 |", "#".repeat(130));
        let (score, warnings) = import(&text);
        let beats = &score.tracks[0].measures[0].beats;
        assert!(beats[0].is_rest());
        assert_eq!(beats[1].notes[0].pitch, 62);
        assert!(warnings.iter().any(|w| w.contains("out of range")), "{:?}", warnings);
    }
}

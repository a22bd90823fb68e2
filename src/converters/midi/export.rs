//! Score → Standard MIDI File (format 1)
//!
//! Track 0 carries tempo, time and key; each score track follows on its own
//! channel (skipping the drum channel). Tied notes are merged into a single
//! note-on/note-off pair.

use std::collections::BTreeMap;

use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use num_rational::Ratio;
use thiserror::Error;

use super::classify::DRUM_CHANNEL;
use crate::models::{KeyMode, Score, Track as ScoreTrack};

#[derive(Debug, Error)]
pub enum MidiExportError {
    #[error("failed to write MIDI: {0}")]
    Write(String),
}

/// Program number from an instrument tag (`gm:N`, or `piano`)
pub fn program_for(instrument: &str) -> Option<u8> {
    if let Some(n) = instrument.strip_prefix("gm:") {
        return n.trim().parse::<u8>().ok().filter(|p| *p < 128);
    }
    match instrument {
        "piano" => Some(0),
        _ => None,
    }
}

fn channel_for(index: usize) -> u8 {
    let ch = if index >= DRUM_CHANNEL as usize { index + 1 } else { index };
    ch.min(15) as u8
}

/// A merged note in absolute ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: u32,
    end: u32,
    pitch: u8,
    velocity: u8,
}

fn track_spans(track: &ScoreTrack, score: &Score) -> Vec<Span> {
    let whole = Ratio::from_integer(score.metadata.ppq as u32 * 4);
    let ticks = |d: Ratio<u32>| (d * whole).to_integer();
    let measure_ticks = ticks(score.metadata.time_signature.measure_duration());

    let mut spans = Vec::new();
    // pitch → (start, velocity) of notes tied into the next beat
    let mut open: BTreeMap<u8, (u32, u8)> = BTreeMap::new();
    let mut cursor = 0u32;

    let close = |open: &mut BTreeMap<u8, (u32, u8)>, spans: &mut Vec<Span>, at: u32| {
        for (pitch, (start, velocity)) in std::mem::take(open) {
            spans.push(Span { start, end: at, pitch, velocity });
        }
    };

    for measure in &track.measures {
        if measure.is_empty() {
            close(&mut open, &mut spans, cursor);
            cursor += measure_ticks;
            continue;
        }
        for beat in &measure.beats {
            let len = ticks(beat.duration());
            let mut carried = BTreeMap::new();
            for note in beat.sounding() {
                let (start, velocity) = open
                    .remove(&note.pitch)
                    .unwrap_or((cursor, note.velocity));
                if note.tie {
                    carried.insert(note.pitch, (start, velocity));
                } else {
                    spans.push(Span {
                        start,
                        end: cursor + len,
                        pitch: note.pitch,
                        velocity,
                    });
                }
            }
            // ties that found no continuation end here
            close(&mut open, &mut spans, cursor);
            open = carried;
            cursor += len;
        }
    }
    close(&mut open, &mut spans, cursor);
    spans.sort_by_key(|s| (s.start, s.pitch));
    spans
}

fn conductor_track<'a>(score: &Score) -> Track<'a> {
    let meta = &score.metadata;
    let usec = 60_000_000 / meta.tempo.max(1) as u32;
    let denominator_power = (meta.time_signature.beat_unit.max(1) as f32).log2() as u8;
    let kinds = [
        MetaMessage::Tempo(usec.into()),
        MetaMessage::TimeSignature(meta.time_signature.beats, denominator_power, 24, 8),
        MetaMessage::KeySignature(
            meta.key_signature.fifths,
            meta.key_signature.mode == KeyMode::Minor,
        ),
        MetaMessage::EndOfTrack,
    ];
    kinds
        .into_iter()
        .map(|m| TrackEvent {
            delta: 0.into(),
            kind: TrackEventKind::Meta(m),
        })
        .collect()
}

fn part_track<'a>(score: &Score, track: &'a ScoreTrack, index: usize) -> Track<'a> {
    let channel = channel_for(index);
    let mut events = vec![TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(track.name.as_bytes())),
    }];
    if let Some(program) = program_for(&track.instrument) {
        events.push(TrackEvent {
            delta: 0.into(),
            kind: TrackEventKind::Midi {
                channel: channel.into(),
                message: MidiMessage::ProgramChange {
                    program: program.into(),
                },
            },
        });
    }

    // (tick, note-off before note-on, message)
    let mut timed: Vec<(u32, u8, MidiMessage)> = Vec::new();
    for span in track_spans(track, score) {
        timed.push((
            span.start,
            1,
            MidiMessage::NoteOn {
                key: span.pitch.into(),
                vel: span.velocity.clamp(1, 127).into(),
            },
        ));
        timed.push((
            span.end,
            0,
            MidiMessage::NoteOff {
                key: span.pitch.into(),
                vel: 0.into(),
            },
        ));
    }
    timed.sort_by_key(|(tick, order, _)| (*tick, *order));

    let mut previous = 0u32;
    for (tick, _, message) in timed {
        events.push(TrackEvent {
            delta: (tick - previous).into(),
            kind: TrackEventKind::Midi {
                channel: channel.into(),
                message,
            },
        });
        previous = tick;
    }
    events.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    events
}

/// Serialize a score as SMF format 1 bytes
pub fn to_smf(score: &Score) -> Result<Vec<u8>, MidiExportError> {
    let mut tracks = vec![conductor_track(score)];
    for (i, track) in score.tracks.iter().enumerate() {
        tracks.push(part_track(score, track, i));
    }
    let smf = Smf {
        header: Header {
            format: Format::Parallel,
            timing: Timing::Metrical(score.metadata.ppq.max(1).into()),
        },
        tracks,
    };
    let mut out = Vec::new();
    smf.write(&mut out)
        .map_err(|e| MidiExportError::Write(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Beat, Measure, Note, NoteValue};

    #[test]
    fn test_program_for() {
        assert_eq!(program_for("gm:40"), Some(40));
        assert_eq!(program_for("piano"), Some(0));
        assert_eq!(program_for("gm:200"), None);
        assert_eq!(program_for("kazoo"), None);
    }

    #[test]
    fn test_channels_skip_drums() {
        assert_eq!(channel_for(0), 0);
        assert_eq!(channel_for(8), 8);
        assert_eq!(channel_for(9), 10);
        assert_eq!(channel_for(40), 15);
    }

    #[test]
    fn test_ties_merge_across_barline() {
        let mut score = Score::blank("Tied", 1, 2);
        score.tracks[0].measures[0] = Measure::new(vec![
            Beat::rest(NoteValue::Half),
            Beat::new(NoteValue::Half, vec![Note::new(67).tied(true)]),
        ]);
        score.tracks[0].measures[1] = Measure::new(vec![
            Beat::new(NoteValue::Quarter, vec![Note::new(67)]),
            Beat::rest(NoteValue::Quarter),
            Beat::rest(NoteValue::Half),
        ]);
        let spans = track_spans(&score.tracks[0], &score);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start, 960);
        assert_eq!(spans[0].end, 2400);
    }

    #[test]
    fn test_dangling_tie_ends_at_next_beat() {
        let mut score = Score::blank("Dangling", 1, 1);
        score.tracks[0].measures[0] = Measure::new(vec![
            Beat::new(NoteValue::Half, vec![Note::new(60).tied(true)]),
            Beat::note(NoteValue::Half, 62),
        ]);
        let spans = track_spans(&score.tracks[0], &score);
        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].pitch, spans[0].end), (60, 960));
    }

    #[test]
    fn test_smf_parses_with_midly() {
        let mut score = Score::blank("Out", 1, 1);
        score.tracks[0].measures[0] = Measure::new(vec![Beat::chord(NoteValue::Whole, &[60, 64])]);
        let bytes = to_smf(&score).unwrap();
        assert_eq!(&bytes[0..4], b"MThd");

        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.tracks.len(), 2);
        let ons = smf.tracks[1]
            .iter()
            .filter(|e| matches!(e.kind, TrackEventKind::Midi { message: MidiMessage::NoteOn { .. }, .. }))
            .count();
        assert_eq!(ons, 2);
    }
}

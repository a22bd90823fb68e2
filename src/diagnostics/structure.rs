//! Structural diagnostics - checks the invariants every score must hold
//!
//! Errors:
//! - tracks with differing measure counts
//! - tempo of zero
//! - zero beats per measure, or a beat unit that is not a power of two
//! - note pitches above 127
//! - beats with more than two augmentation dots
//!
//! Warnings:
//! - overfull measures (beats exceed the time signature)
//! - velocities outside 1..=127 on sounding notes

use crate::models::{NoteValue, Position, Score};

use super::{Diagnostics, IssueKind};

/// Validate a score against the document-model invariants
pub fn validate_score(score: &Score) -> Diagnostics {
    let mut diags = Diagnostics::new();
    let meta = &score.metadata;

    if meta.tempo == 0 {
        diags.report(IssueKind::ZeroTempo, "Tempo must be greater than zero");
    }

    let time = meta.time_signature;
    if time.beats == 0 {
        diags.report(
            IssueKind::ZeroBeats,
            "Time signature must have at least one beat per measure",
        );
    }
    if time.beat_unit == 0 || !time.beat_unit.is_power_of_two() {
        diags.report(
            IssueKind::BadBeatUnit,
            format!("Beat unit {} is not a power of two", time.beat_unit),
        );
    }

    if !score.has_uniform_measures() {
        let counts: Vec<String> = score
            .tracks
            .iter()
            .map(|t| format!("'{}'={}", t.name, t.measure_count()))
            .collect();
        diags.report(
            IssueKind::UnevenMeasures,
            format!("Tracks have different measure counts: {}", counts.join(", ")),
        );
    }

    let capacity = time.measure_duration();
    for (t_idx, track) in score.tracks.iter().enumerate() {
        for (m_idx, measure) in track.measures.iter().enumerate() {
            if time.beats > 0 && measure.duration() > capacity {
                diags.report_at(
                    IssueKind::OverfullMeasure,
                    Position::new(t_idx, m_idx, 0),
                    format!("Measure {} of '{}' exceeds {} time", m_idx + 1, track.name, time),
                );
            }
            for (b_idx, beat) in measure.beats.iter().enumerate() {
                if beat.dots > NoteValue::MAX_DOTS {
                    diags.report_at(
                        IssueKind::TooManyDots,
                        Position::new(t_idx, m_idx, b_idx),
                        format!(
                            "Beat has {} dots; at most {} are allowed",
                            beat.dots,
                            NoteValue::MAX_DOTS
                        ),
                    );
                }
                for (n_idx, note) in beat.notes.iter().enumerate() {
                    let at = Position::new(t_idx, m_idx, b_idx).with_note(n_idx);
                    if note.pitch > 127 {
                        diags.report_at(
                            IssueKind::PitchOutOfRange,
                            at,
                            format!("Pitch {} is outside the MIDI range", note.pitch),
                        );
                    } else if !note.is_rest_marker() && !(1..=127).contains(&note.velocity) {
                        diags.report_at(
                            IssueKind::VelocityOutOfRange,
                            at,
                            format!("Velocity {} is outside 1..=127", note.velocity),
                        );
                    }
                }
            }
        }
    }

    diags
}

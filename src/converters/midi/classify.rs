//! Track classifier
//!
//! Decides how decoded MIDI tracks map onto score tracks. A pure function of
//! the raw tracks and the options; no I/O.
//!
//! - `Smart`: a small set of tracks with separable registers becomes a right
//!   hand / left hand pair; a single wide keyboard track is split at the
//!   split point; anything else stays as independent voices.
//! - `ForcePiano`: always two tracks, right and left hand.
//! - `PreserveOriginal`: one track per non-empty input track.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::reader::{RawNote, RawTrack};
use crate::models::{Clef, Hand};

/// General MIDI percussion channel (channel 10, zero-based 9)
pub const DRUM_CHANNEL: u8 = 9;

/// How raw tracks are grouped into score tracks
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ImportMode {
    #[default]
    Smart,
    ForcePiano,
    PreserveOriginal,
}

/// Tuning constants for smart grouping
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ClassifierThresholds {
    /// Notes at or above this pitch go to the right hand when splitting
    pub split_point: u8,
    /// Most raw tracks that may still be read as one keyboard part
    pub max_piano_tracks: usize,
    /// Semitones two hands' ranges may overlap and still count as separate
    pub overlap_tolerance: u8,
    /// Range (semitones) above which a single track is considered two-handed
    pub wide_range: u8,
    /// Share of notes sounding as part of a chord for a single track to split
    pub keyboard_chord_density: f64,
    /// Cap on independent voices
    pub max_voices: usize,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            split_point: 60,
            max_piano_tracks: 4,
            overlap_tolerance: 7,
            wide_range: 24,
            keyboard_chord_density: 0.15,
            max_voices: 16,
        }
    }
}

/// Pre-pass switches and grouping policy
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClassifyOptions {
    pub mode: ImportMode,
    pub skip_empty: bool,
    pub remove_drums: bool,
    pub thresholds: ClassifierThresholds,
}

/// Statistics of one raw track
#[derive(Debug, Clone, PartialEq)]
pub struct TrackCharacteristics {
    pub index: usize,
    pub note_count: usize,
    pub min_pitch: u8,
    pub max_pitch: u8,
    pub average_pitch: f64,
    /// Share of notes whose onset is shared with another note
    pub chord_density: f64,
    pub is_drum: bool,
}

impl TrackCharacteristics {
    pub fn analyze(track: &RawTrack) -> Self {
        let notes = &track.notes;
        let note_count = notes.len();
        let min_pitch = notes.iter().map(|n| n.pitch).min().unwrap_or(0);
        let max_pitch = notes.iter().map(|n| n.pitch).max().unwrap_or(0);
        let average_pitch = if note_count == 0 {
            0.0
        } else {
            notes.iter().map(|n| n.pitch as f64).sum::<f64>() / note_count as f64
        };

        let mut starts: Vec<u64> = notes.iter().map(|n| n.start).collect();
        starts.sort_unstable();
        let in_chords = starts
            .iter()
            .enumerate()
            .filter(|&(i, s)| {
                (i > 0 && starts[i - 1] == *s) || starts.get(i + 1) == Some(s)
            })
            .count();
        let chord_density = if note_count == 0 {
            0.0
        } else {
            in_chords as f64 / note_count as f64
        };

        let drum_notes = notes.iter().filter(|n| n.channel == DRUM_CHANNEL).count();

        Self {
            index: track.index,
            note_count,
            min_pitch,
            max_pitch,
            average_pitch,
            chord_density,
            is_drum: note_count > 0 && drum_notes * 2 > note_count,
        }
    }

    pub fn pitch_range(&self) -> u8 {
        self.max_pitch - self.min_pitch
    }

    pub fn is_empty(&self) -> bool {
        self.note_count == 0
    }
}

/// Which grouping the classifier settled on
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Recognition {
    NoNotes,
    SingleVoice,
    SplitKeyboard,
    GrandStaff,
    IndependentVoices,
    ForcedPiano,
    Preserved,
}

impl Recognition {
    pub fn label(self) -> &'static str {
        match self {
            Recognition::NoNotes => "no notes",
            Recognition::SingleVoice => "single voice",
            Recognition::SplitKeyboard => "keyboard track split into two hands",
            Recognition::GrandStaff => "piano grand staff",
            Recognition::IndependentVoices => "independent voices",
            Recognition::ForcedPiano => "forced piano (two hands)",
            Recognition::Preserved => "original tracks preserved",
        }
    }
}

impl fmt::Display for Recognition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One output track before conversion to measures
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedTrack {
    pub name: String,
    pub clef: Clef,
    pub hand: Option<Hand>,
    pub program: Option<u8>,
    pub notes: Vec<RawNote>,
}

impl ClassifiedTrack {
    fn hand(hand: Hand, notes: Vec<RawNote>, program: Option<u8>) -> Self {
        let name = match hand {
            Hand::Right => "Right Hand",
            Hand::Left => "Left Hand",
        };
        let mut notes = notes;
        notes.sort_by_key(|n| (n.start, n.pitch));
        Self {
            name: name.to_string(),
            clef: hand.clef(),
            hand: Some(hand),
            program,
            notes,
        }
    }

    fn voice(track: &RawTrack, stats: &TrackCharacteristics, split_point: u8) -> Self {
        Self {
            name: track
                .name
                .clone()
                .unwrap_or_else(|| format!("Track {}", track.index + 1)),
            clef: if stats.average_pitch < split_point as f64 {
                Clef::Bass
            } else {
                Clef::Treble
            },
            hand: None,
            program: track.program,
            notes: track.notes.clone(),
        }
    }
}

/// Classifier output
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub tracks: Vec<ClassifiedTrack>,
    pub recognition: Recognition,
    pub warnings: Vec<String>,
}

/// Group raw tracks into output tracks
pub fn classify(raw: &[RawTrack], options: &ClassifyOptions) -> Classification {
    let mut warnings = Vec::new();
    let th = &options.thresholds;

    let mut kept: Vec<(&RawTrack, TrackCharacteristics)> = Vec::new();
    for track in raw {
        let stats = TrackCharacteristics::analyze(track);
        if options.remove_drums && stats.is_drum {
            log::debug!("dropping drum track {}", track.index);
            warnings.push(format!("drum track {} removed", track.index + 1));
            continue;
        }
        let drop_empty = options.skip_empty || options.mode == ImportMode::PreserveOriginal;
        if stats.is_empty() && drop_empty {
            log::debug!("skipping empty track {}", track.index);
            continue;
        }
        kept.push((track, stats));
    }

    let program = kept.iter().find_map(|(t, _)| t.program);

    let (tracks, recognition) = match options.mode {
        ImportMode::ForcePiano => {
            let (right, left) = split_hands(&kept, th);
            (
                vec![
                    ClassifiedTrack::hand(Hand::Right, right, program),
                    ClassifiedTrack::hand(Hand::Left, left, program),
                ],
                Recognition::ForcedPiano,
            )
        }
        ImportMode::PreserveOriginal => (
            kept.iter()
                .map(|(t, s)| ClassifiedTrack::voice(t, s, th.split_point))
                .collect(),
            Recognition::Preserved,
        ),
        ImportMode::Smart => smart(&kept, th, program, &mut warnings),
    };

    let recognition = if tracks.iter().all(|t| t.notes.is_empty()) {
        Recognition::NoNotes
    } else {
        recognition
    };
    log::info!(
        "classified {} raw track(s) into {} track(s): {}",
        raw.len(),
        tracks.len(),
        recognition
    );

    Classification {
        tracks,
        recognition,
        warnings,
    }
}

fn smart(
    kept: &[(&RawTrack, TrackCharacteristics)],
    th: &ClassifierThresholds,
    program: Option<u8>,
    warnings: &mut Vec<String>,
) -> (Vec<ClassifiedTrack>, Recognition) {
    let sounding: Vec<&(&RawTrack, TrackCharacteristics)> =
        kept.iter().filter(|(_, s)| !s.is_empty()).collect();

    match sounding.len() {
        0 => return (Vec::new(), Recognition::NoNotes),
        1 => {
            let (track, stats) = sounding[0];
            let keyboard = stats.pitch_range() > th.wide_range
                && stats.chord_density >= th.keyboard_chord_density
                && stats.min_pitch < th.split_point
                && stats.max_pitch >= th.split_point;
            if keyboard {
                let (right, left) = partition_notes(&track.notes, th.split_point);
                return (
                    vec![
                        ClassifiedTrack::hand(Hand::Right, right, track.program),
                        ClassifiedTrack::hand(Hand::Left, left, track.program),
                    ],
                    Recognition::SplitKeyboard,
                );
            }
            return (
                vec![ClassifiedTrack::voice(track, stats, th.split_point)],
                Recognition::SingleVoice,
            );
        }
        n if n <= th.max_piano_tracks => {
            if let Some((upper, lower)) = register_split(&sounding, th) {
                let collect = |group: &[usize]| -> Vec<RawNote> {
                    group
                        .iter()
                        .flat_map(|&i| sounding[i].0.notes.iter().copied())
                        .collect()
                };
                return (
                    vec![
                        ClassifiedTrack::hand(Hand::Right, collect(&upper), program),
                        ClassifiedTrack::hand(Hand::Left, collect(&lower), program),
                    ],
                    Recognition::GrandStaff,
                );
            }
        }
        _ => {}
    }

    let mut voices: Vec<&(&RawTrack, TrackCharacteristics)> = sounding;
    if voices.len() > th.max_voices {
        warnings.push(format!(
            "{} voices exceed the limit of {}; the busiest {} were kept",
            voices.len(),
            th.max_voices,
            th.max_voices
        ));
        let mut by_size: Vec<usize> = (0..voices.len()).collect();
        by_size.sort_by_key(|&i| std::cmp::Reverse(voices[i].1.note_count));
        by_size.truncate(th.max_voices);
        by_size.sort_unstable();
        voices = by_size.into_iter().map(|i| voices[i]).collect();
    }
    (
        voices
            .into_iter()
            .map(|(t, s)| ClassifiedTrack::voice(t, s, th.split_point))
            .collect(),
        Recognition::IndependentVoices,
    )
}

/// Find an upper/lower grouping (by average pitch) whose ranges overlap no
/// more than the tolerance. Returns indices into `tracks`.
fn register_split(
    tracks: &[&(&RawTrack, TrackCharacteristics)],
    th: &ClassifierThresholds,
) -> Option<(Vec<usize>, Vec<usize>)> {
    let mut order: Vec<usize> = (0..tracks.len()).collect();
    order.sort_by(|&a, &b| {
        tracks[b]
            .1
            .average_pitch
            .total_cmp(&tracks[a].1.average_pitch)
    });

    let mut best: Option<(i32, usize)> = None;
    for cut in 1..order.len() {
        let (upper, lower) = order.split_at(cut);
        let upper_min = upper.iter().map(|&i| tracks[i].1.min_pitch).min()?;
        let lower_max = lower.iter().map(|&i| tracks[i].1.max_pitch).max()?;
        let overlap = lower_max as i32 - upper_min as i32;
        if best.map_or(true, |(o, _)| overlap < o) {
            best = Some((overlap, cut));
        }
    }

    let (overlap, cut) = best?;
    if overlap > th.overlap_tolerance as i32 {
        return None;
    }
    let (upper, lower) = order.split_at(cut);
    let upper_avg = mean(upper.iter().map(|&i| tracks[i].1.average_pitch));
    let lower_avg = mean(lower.iter().map(|&i| tracks[i].1.average_pitch));
    // both hands on the same side of the split point is two melodies, not a piano
    if upper_avg < th.split_point as f64 || lower_avg >= th.split_point as f64 + 12.0 {
        return None;
    }
    let mut upper = upper.to_vec();
    let mut lower = lower.to_vec();
    upper.sort_unstable();
    lower.sort_unstable();
    Some((upper, lower))
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Right and left hand notes for forced piano mode
fn split_hands(
    kept: &[(&RawTrack, TrackCharacteristics)],
    th: &ClassifierThresholds,
) -> (Vec<RawNote>, Vec<RawNote>) {
    let sounding: Vec<&(&RawTrack, TrackCharacteristics)> =
        kept.iter().filter(|(_, s)| !s.is_empty()).collect();
    if sounding.len() >= 2 {
        if let Some((upper, lower)) = register_split(&sounding, th) {
            let gather = |group: Vec<usize>| {
                group
                    .into_iter()
                    .flat_map(|i| sounding[i].0.notes.iter().copied())
                    .collect()
            };
            return (gather(upper), gather(lower));
        }
    }
    let all: Vec<RawNote> = sounding
        .iter()
        .flat_map(|(t, _)| t.notes.iter().copied())
        .collect();
    partition_notes(&all, th.split_point)
}

fn partition_notes(notes: &[RawNote], split_point: u8) -> (Vec<RawNote>, Vec<RawNote>) {
    notes.iter().partition(|n| n.pitch >= split_point)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(index: usize, pitches: &[u8]) -> RawTrack {
        let notes = pitches
            .iter()
            .enumerate()
            .map(|(i, &pitch)| RawNote {
                channel: index as u8,
                pitch,
                velocity: 80,
                start: i as u64 * 480,
                end: i as u64 * 480 + 480,
            })
            .collect();
        RawTrack::new(index).with_notes(notes)
    }

    fn options(mode: ImportMode) -> ClassifyOptions {
        ClassifyOptions {
            mode,
            ..ClassifyOptions::default()
        }
    }

    #[test]
    fn test_smart_two_registers_become_hands() {
        let raw = vec![track(0, &[70, 72, 74]), track(1, &[46, 48, 50])];
        let out = classify(&raw, &options(ImportMode::Smart));
        assert_eq!(out.tracks.len(), 2);
        assert_eq!(out.recognition, Recognition::GrandStaff);
        assert_eq!(out.tracks[0].hand, Some(Hand::Right));
        assert_eq!(out.tracks[0].clef, Clef::Treble);
        assert_eq!(out.tracks[1].hand, Some(Hand::Left));
        assert_eq!(out.tracks[1].clef, Clef::Bass);
        assert!(out.tracks[0].notes.iter().all(|n| n.pitch >= 70));
    }

    #[test]
    fn test_smart_order_does_not_matter() {
        let raw = vec![track(0, &[46, 48, 50]), track(1, &[70, 72, 74])];
        let out = classify(&raw, &options(ImportMode::Smart));
        assert_eq!(out.tracks[0].hand, Some(Hand::Right));
        assert_eq!(out.tracks[0].notes[0].pitch, 70);
    }

    #[test]
    fn test_smart_overlapping_stay_independent() {
        let raw = vec![track(0, &[60, 67, 76]), track(1, &[62, 65, 74])];
        let out = classify(&raw, &options(ImportMode::Smart));
        assert_eq!(out.recognition, Recognition::IndependentVoices);
        assert_eq!(out.tracks.len(), 2);
        assert!(out.tracks.iter().all(|t| t.hand.is_none()));
    }

    #[test]
    fn test_smart_many_tracks_capped() {
        let raw: Vec<RawTrack> = (0..6).map(|i| track(i, &[60 + i as u8])).collect();
        let mut opts = options(ImportMode::Smart);
        opts.thresholds.max_voices = 3;
        let out = classify(&raw, &opts);
        assert_eq!(out.recognition, Recognition::IndependentVoices);
        assert_eq!(out.tracks.len(), 3);
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn test_smart_splits_wide_keyboard_track() {
        let mut raw = track(0, &[]);
        for (i, chord) in [[40u8, 64, 67], [43, 71, 74], [36, 72, 76]].iter().enumerate() {
            for &pitch in chord {
                raw.notes.push(RawNote {
                    channel: 0,
                    pitch,
                    velocity: 80,
                    start: i as u64 * 480,
                    end: i as u64 * 480 + 480,
                });
            }
        }
        let out = classify(&[raw], &options(ImportMode::Smart));
        assert_eq!(out.recognition, Recognition::SplitKeyboard);
        assert_eq!(out.tracks[1].notes.len(), 3);
    }

    #[test]
    fn test_force_piano_always_two() {
        let raw = vec![
            track(0, &[60, 64, 67]),
            track(1, &[55, 72, 40]),
            track(2, &[62, 50, 81]),
        ];
        let out = classify(&raw, &options(ImportMode::ForcePiano));
        assert_eq!(out.tracks.len(), 2);
        assert_eq!(out.recognition, Recognition::ForcedPiano);
        let total: usize = out.tracks.iter().map(|t| t.notes.len()).sum();
        assert_eq!(total, 9);

        let single = classify(&[track(0, &[72])], &options(ImportMode::ForcePiano));
        assert_eq!(single.tracks.len(), 2);
    }

    #[test]
    fn test_preserve_original() {
        let raw: Vec<RawTrack> = (0..4).map(|i| track(i, &[60, 62 + i as u8])).collect();
        let out = classify(&raw, &options(ImportMode::PreserveOriginal));
        assert_eq!(out.tracks.len(), 4);
        assert_eq!(out.tracks[2].name, "Track 3");

        let mut with_empty = raw.clone();
        with_empty.push(RawTrack::new(4));
        let out = classify(&with_empty, &options(ImportMode::PreserveOriginal));
        assert_eq!(out.tracks.len(), 4);
    }

    #[test]
    fn test_skip_empty_filters_tracks() {
        let raw = vec![
            track(0, &[60, 72]),
            RawTrack::new(1),
            track(2, &[48, 36]),
        ];
        let mut opts = options(ImportMode::Smart);
        opts.skip_empty = true;
        let out = classify(&raw, &opts);
        assert_eq!(out.tracks.len(), 2);
        assert_eq!(out.recognition, Recognition::GrandStaff);
    }

    #[test]
    fn test_single_pitch_track_is_kept() {
        let raw = vec![RawTrack::new(0), track(1, &[60, 60, 60])];
        let mut opts = options(ImportMode::Smart);
        opts.skip_empty = true;
        let out = classify(&raw, &opts);
        assert_eq!(out.recognition, Recognition::SingleVoice);
        assert_eq!(out.tracks.len(), 1);
        assert_eq!(out.tracks[0].notes.len(), 3);
    }

    #[test]
    fn test_remove_drums() {
        let raw = vec![track(0, &[60, 64]), track(9, &[36, 38, 42])];
        let mut opts = options(ImportMode::PreserveOriginal);
        opts.remove_drums = true;
        let out = classify(&raw, &opts);
        assert_eq!(out.tracks.len(), 1);
        assert!(out.warnings[0].contains("drum"));
    }

    #[test]
    fn test_characteristics() {
        let stats = TrackCharacteristics::analyze(&track(0, &[60, 64, 68]));
        assert_eq!(stats.pitch_range(), 8);
        assert_eq!(stats.average_pitch, 64.0);
        assert_eq!(stats.chord_density, 0.0);
        assert!(!stats.is_drum);
    }
}

//! Core document structures for the score engine
//!
//! A [`Score`] owns its [`Track`]s, each track owns its [`Measure`]s, and each
//! measure is an ordered list of [`Beat`]s holding zero or more [`Note`]s.
//! The model is plain data: there are no mutation methods here. Edits go
//! through [`crate::undo::Command`], which produces a new `Score` value.

use num_rational::Ratio;
use serde::{Deserialize, Serialize};

pub use super::elements::{Clef, Hand, KeyMode, KeySignature, NoteValue, TimeSignature};

/// Default MIDI velocity for notes created without dynamics
pub const DEFAULT_VELOCITY: u8 = 80;

/// Default pulses-per-quarter-note resolution
pub const DEFAULT_PPQ: u16 = 480;

/// Default tempo in beats per minute
pub const DEFAULT_TEMPO: u16 = 120;

/// Articulation flags carried by a note
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(default)]
pub struct Articulations {
    pub staccato: bool,
    pub accent: bool,
    pub tenuto: bool,
    pub fermata: bool,
}

impl Articulations {
    pub fn is_empty(&self) -> bool {
        !(self.staccato || self.accent || self.tenuto || self.fermata)
    }
}

/// A single pitched (or placeholder) note inside a beat
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Note {
    /// MIDI pitch number; 0 marks "no pitch" (rest marker inside a beat)
    pub pitch: u8,

    /// MIDI-style velocity (1-127)
    pub velocity: u8,

    /// Tied to the same pitch in the following beat
    #[serde(default)]
    pub tie: bool,

    #[serde(default)]
    pub articulations: Articulations,
}

impl Note {
    pub fn new(pitch: u8) -> Self {
        Self {
            pitch,
            velocity: DEFAULT_VELOCITY,
            tie: false,
            articulations: Articulations::default(),
        }
    }

    pub fn with_velocity(mut self, velocity: u8) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn tied(mut self, tie: bool) -> Self {
        self.tie = tie;
        self
    }

    /// True for the pitch-0 rest marker
    pub fn is_rest_marker(&self) -> bool {
        self.pitch == 0
    }
}

/// A rhythmic slot: a rest (no sounding notes), a single note or a chord
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Beat {
    pub notes: Vec<Note>,

    /// Written value of the slot
    pub value: NoteValue,

    /// Augmentation dots (0-2)
    #[serde(default)]
    pub dots: u8,
}

impl Beat {
    pub fn new(value: NoteValue, notes: Vec<Note>) -> Self {
        Self {
            notes,
            value,
            dots: 0,
        }
    }

    pub fn rest(value: NoteValue) -> Self {
        Self::new(value, Vec::new())
    }

    pub fn note(value: NoteValue, pitch: u8) -> Self {
        Self::new(value, vec![Note::new(pitch)])
    }

    pub fn chord(value: NoteValue, pitches: &[u8]) -> Self {
        Self::new(value, pitches.iter().map(|&p| Note::new(p)).collect())
    }

    pub fn dotted(mut self, dots: u8) -> Self {
        self.dots = dots;
        self
    }

    /// Length as a fraction of a whole note
    pub fn duration(&self) -> Ratio<u32> {
        self.value.dotted_fraction(self.dots)
    }

    /// Notes that actually sound (rest markers excluded)
    pub fn sounding(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter().filter(|n| !n.is_rest_marker())
    }

    pub fn is_rest(&self) -> bool {
        self.sounding().next().is_none()
    }

    /// More than one note occupies the slot
    pub fn is_chord(&self) -> bool {
        self.notes.len() > 1
    }
}

/// Ordered beats of one bar
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Measure {
    pub beats: Vec<Beat>,
}

impl Measure {
    pub fn new(beats: Vec<Beat>) -> Self {
        Self { beats }
    }

    /// A measure without beats is valid but flagged empty
    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    /// Sum of beat durations
    pub fn duration(&self) -> Ratio<u32> {
        self.beats
            .iter()
            .fold(Ratio::from_integer(0), |acc, b| acc + b.duration())
    }

    /// Beat durations add up exactly to the time signature
    pub fn is_filled(&self, time: &TimeSignature) -> bool {
        self.duration() == time.measure_duration()
    }

    pub fn note_count(&self) -> usize {
        self.beats.iter().map(|b| b.sounding().count()).sum()
    }

    /// Onset of each beat from the start of the measure
    pub fn onsets(&self) -> Vec<Ratio<u32>> {
        let mut at = Ratio::from_integer(0);
        self.beats
            .iter()
            .map(|b| {
                let onset = at;
                at += b.duration();
                onset
            })
            .collect()
    }
}

/// One staff's worth of music
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Track {
    pub name: String,
    pub clef: Clef,

    /// Grand-staff hand, if the track is part of a keyboard pair
    #[serde(default)]
    pub hand: Option<Hand>,

    /// Free-form instrument tag ("piano", "violin", "gm:40", ...)
    #[serde(default)]
    pub instrument: String,

    pub measures: Vec<Measure>,
}

impl Track {
    pub fn new(name: impl Into<String>, clef: Clef) -> Self {
        Self {
            name: name.into(),
            clef,
            hand: None,
            instrument: String::new(),
            measures: Vec::new(),
        }
    }

    pub fn with_hand(mut self, hand: Hand) -> Self {
        self.hand = Some(hand);
        self.clef = hand.clef();
        self
    }

    pub fn with_instrument(mut self, instrument: impl Into<String>) -> Self {
        self.instrument = instrument.into();
        self
    }

    pub fn with_measures(mut self, measures: Vec<Measure>) -> Self {
        self.measures = measures;
        self
    }

    pub fn note_count(&self) -> usize {
        self.measures.iter().map(Measure::note_count).sum()
    }

    pub fn measure_count(&self) -> usize {
        self.measures.len()
    }
}

/// Score-wide metadata
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScoreMetadata {
    pub key_signature: KeySignature,
    pub time_signature: TimeSignature,

    /// Beats per minute, always > 0
    pub tempo: u16,

    /// Pulses per quarter note
    pub ppq: u16,
}

impl Default for ScoreMetadata {
    fn default() -> Self {
        Self {
            key_signature: KeySignature::default(),
            time_signature: TimeSignature::default(),
            tempo: DEFAULT_TEMPO,
            ppq: DEFAULT_PPQ,
        }
    }
}

/// A complete piece of music
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Score {
    pub title: String,

    #[serde(default)]
    pub composer: String,

    pub metadata: ScoreMetadata,
    pub tracks: Vec<Track>,
}

impl Score {
    pub fn new(title: impl Into<String>, metadata: ScoreMetadata, tracks: Vec<Track>) -> Self {
        Self {
            title: title.into(),
            composer: String::new(),
            metadata,
            tracks,
        }
    }

    /// Blank document with `track_count` treble tracks of `measures` empty measures
    pub fn blank(title: impl Into<String>, track_count: usize, measures: usize) -> Self {
        let tracks = (0..track_count.max(1))
            .map(|i| {
                Track::new(format!("Track {}", i + 1), Clef::Treble)
                    .with_measures(vec![Measure::default(); measures])
            })
            .collect();
        Self::new(title, ScoreMetadata::default(), tracks)
    }

    /// Blank two-staff piano document
    pub fn grand_staff(title: impl Into<String>, measures: usize) -> Self {
        let tracks = vec![
            Track::new("Right Hand", Clef::Treble)
                .with_hand(Hand::Right)
                .with_instrument("piano")
                .with_measures(vec![Measure::default(); measures]),
            Track::new("Left Hand", Clef::Bass)
                .with_hand(Hand::Left)
                .with_instrument("piano")
                .with_measures(vec![Measure::default(); measures]),
        ];
        Self::new(title, ScoreMetadata::default(), tracks)
    }

    /// Measure count shared by all tracks (that of the first track)
    pub fn measure_count(&self) -> usize {
        self.tracks.first().map(Track::measure_count).unwrap_or(0)
    }

    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(Track::note_count).sum()
    }

    /// All tracks have the same measure count
    pub fn has_uniform_measures(&self) -> bool {
        let count = self.measure_count();
        self.tracks.iter().all(|t| t.measure_count() == count)
    }

    /// Share of measures (over all tracks) whose beats exactly fill the time signature
    pub fn completion_ratio(&self) -> f64 {
        let time = self.metadata.time_signature;
        let (filled, total) = self
            .tracks
            .iter()
            .flat_map(|t| t.measures.iter())
            .fold((0usize, 0usize), |(filled, total), m| {
                (filled + m.is_filled(&time) as usize, total + 1)
            });
        if total == 0 {
            0.0
        } else {
            filled as f64 / total as f64
        }
    }

    /// Pad every track with empty measures up to the longest one.
    ///
    /// Returns the number of measures added.
    pub fn equalize_measures(tracks: &mut [Track]) -> usize {
        let longest = tracks.iter().map(Track::measure_count).max().unwrap_or(0);
        let mut added = 0;
        for track in tracks.iter_mut() {
            while track.measures.len() < longest {
                track.measures.push(Measure::default());
                added += 1;
            }
        }
        added
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn beat(&self, track: usize, measure: usize, beat: usize) -> Option<&Beat> {
        self.tracks
            .get(track)?
            .measures
            .get(measure)?
            .beats
            .get(beat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(score: &Score) -> u64 {
        let mut hasher = DefaultHasher::new();
        score.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_beat_classification() {
        assert!(Beat::rest(NoteValue::Quarter).is_rest());
        assert!(!Beat::note(NoteValue::Quarter, 60).is_chord());
        assert!(Beat::chord(NoteValue::Half, &[60, 64, 67]).is_chord());
        // A lone pitch-0 marker is still a rest
        assert!(Beat::note(NoteValue::Quarter, 0).is_rest());
    }

    #[test]
    fn test_measure_fill() {
        let time = TimeSignature::new(3, 4);
        let measure = Measure::new(vec![
            Beat::note(NoteValue::Half, 60),
            Beat::note(NoteValue::Quarter, 62),
        ]);
        assert!(measure.is_filled(&time));
        assert_eq!(
            measure.onsets(),
            vec![Ratio::from_integer(0), Ratio::new(1, 2)]
        );
        assert!(!Measure::default().is_filled(&time));
        assert!(Measure::default().is_empty());
    }

    #[test]
    fn test_completion_ratio() {
        let mut score = Score::blank("Test", 1, 2);
        assert_eq!(score.completion_ratio(), 0.0);
        score.tracks[0].measures[0] = Measure::new(vec![Beat::note(NoteValue::Whole, 60)]);
        assert_eq!(score.completion_ratio(), 0.5);
    }

    #[test]
    fn test_structural_equality_and_hash() {
        let a = Score::grand_staff("Piece", 4);
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let mut c = a.clone();
        c.metadata.tempo = 90;
        assert_ne!(a, c);
    }

    #[test]
    fn test_equalize_measures() {
        let mut tracks = vec![
            Track::new("A", Clef::Treble).with_measures(vec![Measure::default(); 3]),
            Track::new("B", Clef::Bass).with_measures(vec![Measure::default(); 1]),
        ];
        assert_eq!(Score::equalize_measures(&mut tracks), 2);
        assert_eq!(tracks[1].measure_count(), 3);
    }
}

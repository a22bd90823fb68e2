//! Addressable coordinates into a score
//!
//! A [`Position`] names a beat (and optionally a note inside it) by index.
//! Positions never own data; they are resolved against a [`Score`] on use.

use serde::{Deserialize, Serialize};

use super::core::{Beat, Note, Score};

/// Coordinates of a beat or note inside a score
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub track: usize,
    pub measure: usize,
    pub beat: usize,

    #[serde(default)]
    pub note: Option<usize>,
}

impl Position {
    pub fn new(track: usize, measure: usize, beat: usize) -> Self {
        Self {
            track,
            measure,
            beat,
            note: None,
        }
    }

    pub fn with_note(mut self, note: usize) -> Self {
        self.note = Some(note);
        self
    }

    /// The same position with the note index dropped
    pub fn beat_position(&self) -> Self {
        Self {
            note: None,
            ..*self
        }
    }

    pub fn resolve_beat<'a>(&self, score: &'a Score) -> Option<&'a Beat> {
        score.beat(self.track, self.measure, self.beat)
    }

    pub fn resolve_note<'a>(&self, score: &'a Score) -> Option<&'a Note> {
        self.resolve_beat(score)?.notes.get(self.note?)
    }

    /// Next beat in the same track, crossing into following measures and
    /// skipping empty ones
    pub fn next_beat(&self, score: &Score) -> Option<Position> {
        let track = score.tracks.get(self.track)?;
        let current = track.measures.get(self.measure)?;
        if self.beat + 1 < current.beats.len() {
            return Some(Position::new(self.track, self.measure, self.beat + 1));
        }
        track
            .measures
            .iter()
            .enumerate()
            .skip(self.measure + 1)
            .find(|(_, m)| !m.is_empty())
            .map(|(idx, _)| Position::new(self.track, idx, 0))
    }

    /// Previous beat in the same track, crossing into earlier measures
    pub fn prev_beat(&self, score: &Score) -> Option<Position> {
        let track = score.tracks.get(self.track)?;
        if self.beat > 0 {
            return Some(Position::new(self.track, self.measure, self.beat - 1));
        }
        track
            .measures
            .iter()
            .enumerate()
            .take(self.measure)
            .rev()
            .find(|(_, m)| !m.is_empty())
            .map(|(idx, m)| Position::new(self.track, idx, m.beats.len() - 1))
    }
}

/// A range of beats between an anchor and a focus position
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Selection {
    pub anchor: Position,
    pub focus: Position,
}

impl Selection {
    pub fn new(anchor: Position, focus: Position) -> Self {
        Self { anchor, focus }
    }

    pub fn caret(at: Position) -> Self {
        Self::new(at, at)
    }

    pub fn is_caret(&self) -> bool {
        self.anchor == self.focus
    }

    /// Earlier of anchor and focus
    pub fn start(&self) -> Position {
        self.anchor.beat_position().min(self.focus.beat_position())
    }

    /// Later of anchor and focus
    pub fn end(&self) -> Position {
        self.anchor.beat_position().max(self.focus.beat_position())
    }

    /// Tracks spanned by the selection, inclusive
    pub fn tracks(&self) -> std::ops::RangeInclusive<usize> {
        let (a, b) = (self.anchor.track, self.focus.track);
        a.min(b)..=a.max(b)
    }

    /// True if `pos` lies within the selected track span and between the
    /// start and end (measure, beat) coordinates
    pub fn contains(&self, pos: &Position) -> bool {
        if !self.tracks().contains(&pos.track) {
            return false;
        }
        let key = |p: &Position| (p.measure, p.beat);
        let (a, b) = (key(&self.anchor), key(&self.focus));
        let (lo, hi) = (a.min(b), a.max(b));
        (lo..=hi).contains(&key(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::core::{Beat, Measure, NoteValue};

    fn sample_score() -> Score {
        let mut score = Score::blank("Nav", 1, 3);
        score.tracks[0].measures[0] = Measure::new(vec![
            Beat::note(NoteValue::Half, 60),
            Beat::note(NoteValue::Half, 62),
        ]);
        score.tracks[0].measures[2] = Measure::new(vec![Beat::note(NoteValue::Whole, 64)]);
        score
    }

    #[test]
    fn test_next_beat_skips_empty_measures() {
        let score = sample_score();
        let pos = Position::new(0, 0, 1);
        assert_eq!(pos.next_beat(&score), Some(Position::new(0, 2, 0)));
        assert_eq!(Position::new(0, 2, 0).next_beat(&score), None);
    }

    #[test]
    fn test_prev_beat_crosses_measures() {
        let score = sample_score();
        assert_eq!(
            Position::new(0, 2, 0).prev_beat(&score),
            Some(Position::new(0, 0, 1))
        );
        assert_eq!(Position::new(0, 0, 0).prev_beat(&score), None);
    }

    #[test]
    fn test_resolve_note() {
        let score = sample_score();
        let pos = Position::new(0, 0, 1).with_note(0);
        assert_eq!(pos.resolve_note(&score).map(|n| n.pitch), Some(62));
        assert!(Position::new(0, 1, 0).resolve_beat(&score).is_none());
    }

    #[test]
    fn test_selection_contains() {
        let sel = Selection::new(Position::new(1, 3, 2), Position::new(0, 1, 0));
        assert_eq!(sel.start(), Position::new(0, 1, 0));
        assert!(sel.contains(&Position::new(0, 2, 5)));
        assert!(sel.contains(&Position::new(1, 3, 2)));
        assert!(!sel.contains(&Position::new(1, 3, 3)));
        assert!(!sel.contains(&Position::new(2, 2, 0)));
        assert!(Selection::caret(Position::new(0, 0, 0)).is_caret());
    }
}

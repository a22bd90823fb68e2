//! Reversible edit commands and bounded undo/redo history
//!
//! Every structural change to a [`Score`] is a [`Command`]. Applying or
//! reverting a command never touches its input: it returns a new `Score`
//! value, so callers may keep earlier snapshots around without aliasing.

use crate::models::{Beat, Measure, Note, Position, Score, ScoreMetadata};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

/// Maximum number of commands kept in the undo history
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Errors raised when a command does not fit the score it is applied to
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("track {0} not found")]
    TrackNotFound(usize),

    #[error("measure {measure} not found in track {track}")]
    MeasureNotFound { track: usize, measure: usize },

    #[error("beat {beat} not found at track {track}, measure {measure}")]
    BeatNotFound {
        track: usize,
        measure: usize,
        beat: usize,
    },

    #[error("note index missing or out of range at {0:?}")]
    NoteNotFound(Position),

    #[error("score content at {0:?} does not match the recorded command state")]
    Mismatch(Position),

    #[error("expected {expected} measures (one per track), got {actual}")]
    TrackCountMismatch { expected: usize, actual: usize },

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
}

/// Represents a reversible edit command
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Insert a note into an existing beat at `at.note`, which must be set
    InsertNote { at: Position, note: Note },

    /// Remove the note at `at.note` (kept for restoration)
    DeleteNote { at: Position, note: Note },

    /// Swap one note for another in place
    ReplaceNote {
        at: Position,
        before: Note,
        after: Note,
    },

    /// Insert a beat before `at.beat`
    InsertBeat { at: Position, beat: Beat },

    /// Remove the beat at `at.beat` (kept for restoration)
    DeleteBeat { at: Position, beat: Beat },

    /// Swap one beat for another (duration or content change)
    ReplaceBeat {
        at: Position,
        before: Beat,
        after: Beat,
    },

    /// Insert one measure per track at `index`
    InsertMeasure { index: usize, measures: Vec<Measure> },

    /// Remove measure `index` from every track (kept for restoration)
    DeleteMeasure { index: usize, measures: Vec<Measure> },

    /// Replace key, time, tempo and resolution
    SetMetadata {
        before: ScoreMetadata,
        after: ScoreMetadata,
    },

    /// Replace title and composer
    SetHeader {
        before: (String, String),
        after: (String, String),
    },

    /// A group of commands applied and reverted as one step
    Batch { commands: Vec<Command> },
}

impl Command {
    // ------------------------------------------------------------------
    // Capturing constructors
    // ------------------------------------------------------------------

    /// Insert `note` at `at.note`, or append it to the beat when no note
    /// index is given. The stored command always carries a concrete index.
    pub fn insert_note(score: &Score, at: Position, note: Note) -> Result<Self, EditError> {
        let at = match at.note {
            Some(_) => at,
            None => {
                let beat = at.resolve_beat(score).ok_or_else(|| beat_not_found(&at))?;
                at.with_note(beat.notes.len())
            }
        };
        Ok(Command::InsertNote { at, note })
    }

    pub fn delete_note(score: &Score, at: Position) -> Result<Self, EditError> {
        let note = *at.resolve_note(score).ok_or(EditError::NoteNotFound(at))?;
        Ok(Command::DeleteNote { at, note })
    }

    pub fn replace_note(score: &Score, at: Position, after: Note) -> Result<Self, EditError> {
        let before = *at.resolve_note(score).ok_or(EditError::NoteNotFound(at))?;
        Ok(Command::ReplaceNote { at, before, after })
    }

    pub fn insert_beat(at: Position, beat: Beat) -> Self {
        Command::InsertBeat {
            at: at.beat_position(),
            beat,
        }
    }

    pub fn delete_beat(score: &Score, at: Position) -> Result<Self, EditError> {
        let beat = at
            .resolve_beat(score)
            .cloned()
            .ok_or_else(|| beat_not_found(&at))?;
        Ok(Command::DeleteBeat {
            at: at.beat_position(),
            beat,
        })
    }

    pub fn replace_beat(score: &Score, at: Position, after: Beat) -> Result<Self, EditError> {
        let before = at
            .resolve_beat(score)
            .cloned()
            .ok_or_else(|| beat_not_found(&at))?;
        Ok(Command::ReplaceBeat {
            at: at.beat_position(),
            before,
            after,
        })
    }

    /// Insert an empty measure at `index` in every track
    pub fn insert_measure(score: &Score, index: usize) -> Self {
        Command::InsertMeasure {
            index,
            measures: vec![Measure::default(); score.tracks.len()],
        }
    }

    pub fn delete_measure(score: &Score, index: usize) -> Result<Self, EditError> {
        let measures = score
            .tracks
            .iter()
            .enumerate()
            .map(|(t, track)| {
                track
                    .measures
                    .get(index)
                    .cloned()
                    .ok_or(EditError::MeasureNotFound {
                        track: t,
                        measure: index,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Command::DeleteMeasure { index, measures })
    }

    pub fn set_metadata(score: &Score, after: ScoreMetadata) -> Self {
        Command::SetMetadata {
            before: score.metadata,
            after,
        }
    }

    pub fn set_header(score: &Score, title: impl Into<String>, composer: impl Into<String>) -> Self {
        Command::SetHeader {
            before: (score.title.clone(), score.composer.clone()),
            after: (title.into(), composer.into()),
        }
    }

    pub fn batch(commands: Vec<Command>) -> Self {
        Command::Batch { commands }
    }

    // ------------------------------------------------------------------
    // Application
    // ------------------------------------------------------------------

    /// Apply this command, producing a new score
    pub fn apply(&self, score: &Score) -> Result<Score, EditError> {
        let mut next = score.clone();
        self.apply_in_place(&mut next)?;
        Ok(next)
    }

    /// Revert this command, producing a new score
    pub fn revert(&self, score: &Score) -> Result<Score, EditError> {
        let mut next = score.clone();
        self.revert_in_place(&mut next)?;
        Ok(next)
    }

    fn apply_in_place(&self, score: &mut Score) -> Result<(), EditError> {
        match self {
            Command::InsertNote { at, note } => insert_note(score, at, *note),
            Command::DeleteNote { at, note } => remove_note(score, at, note),
            Command::ReplaceNote { at, before, after } => swap_note(score, at, before, *after),
            Command::InsertBeat { at, beat } => insert_beat(score, at, beat.clone()),
            Command::DeleteBeat { at, beat } => remove_beat(score, at, beat),
            Command::ReplaceBeat { at, before, after } => {
                swap_beat(score, at, before, after.clone())
            }
            Command::InsertMeasure { index, measures } => {
                insert_measures(score, *index, measures)
            }
            Command::DeleteMeasure { index, measures } => {
                remove_measures(score, *index, measures.len())
            }
            Command::SetMetadata { after, .. } => set_metadata(score, *after),
            Command::SetHeader { after, .. } => {
                score.title = after.0.clone();
                score.composer = after.1.clone();
                Ok(())
            }
            Command::Batch { commands } => {
                for cmd in commands {
                    cmd.apply_in_place(score)?;
                }
                Ok(())
            }
        }
    }

    fn revert_in_place(&self, score: &mut Score) -> Result<(), EditError> {
        match self {
            Command::InsertNote { at, note } => remove_note(score, at, note),
            Command::DeleteNote { at, note } => insert_note(score, at, *note),
            Command::ReplaceNote { at, before, after } => swap_note(score, at, after, *before),
            Command::InsertBeat { at, beat } => remove_beat(score, at, beat),
            Command::DeleteBeat { at, beat } => insert_beat(score, at, beat.clone()),
            Command::ReplaceBeat { at, before, after } => {
                swap_beat(score, at, after, before.clone())
            }
            Command::InsertMeasure { index, measures } => {
                remove_measures(score, *index, measures.len())
            }
            Command::DeleteMeasure { index, measures } => {
                insert_measures(score, *index, measures)
            }
            Command::SetMetadata { before, .. } => set_metadata(score, *before),
            Command::SetHeader { before, .. } => {
                score.title = before.0.clone();
                score.composer = before.1.clone();
                Ok(())
            }
            Command::Batch { commands } => {
                // Undo batch in reverse order
                for cmd in commands.iter().rev() {
                    cmd.revert_in_place(score)?;
                }
                Ok(())
            }
        }
    }

    /// Track touched by this command, if it is local to one track
    pub fn affected_track(&self) -> Option<usize> {
        match self {
            Command::InsertNote { at, .. }
            | Command::DeleteNote { at, .. }
            | Command::ReplaceNote { at, .. }
            | Command::InsertBeat { at, .. }
            | Command::DeleteBeat { at, .. }
            | Command::ReplaceBeat { at, .. } => Some(at.track),
            Command::Batch { commands } => {
                let first = commands.first()?.affected_track()?;
                commands
                    .iter()
                    .all(|c| c.affected_track() == Some(first))
                    .then_some(first)
            }
            _ => None,
        }
    }
}

fn beat_not_found(at: &Position) -> EditError {
    EditError::BeatNotFound {
        track: at.track,
        measure: at.measure,
        beat: at.beat,
    }
}

fn measure_mut<'a>(score: &'a mut Score, at: &Position) -> Result<&'a mut Measure, EditError> {
    score
        .tracks
        .get_mut(at.track)
        .ok_or(EditError::TrackNotFound(at.track))?
        .measures
        .get_mut(at.measure)
        .ok_or(EditError::MeasureNotFound {
            track: at.track,
            measure: at.measure,
        })
}

fn beat_mut<'a>(score: &'a mut Score, at: &Position) -> Result<&'a mut Beat, EditError> {
    measure_mut(score, at)?
        .beats
        .get_mut(at.beat)
        .ok_or_else(|| beat_not_found(at))
}

fn insert_note(score: &mut Score, at: &Position, note: Note) -> Result<(), EditError> {
    let idx = at.note.ok_or(EditError::NoteNotFound(*at))?;
    let beat = beat_mut(score, at)?;
    if idx > beat.notes.len() {
        return Err(EditError::NoteNotFound(*at));
    }
    beat.notes.insert(idx, note);
    Ok(())
}

fn remove_note(score: &mut Score, at: &Position, expected: &Note) -> Result<(), EditError> {
    let beat = beat_mut(score, at)?;
    let idx = at.note.ok_or(EditError::NoteNotFound(*at))?;
    match beat.notes.get(idx) {
        Some(found) if found == expected => {
            beat.notes.remove(idx);
            Ok(())
        }
        Some(_) => Err(EditError::Mismatch(*at)),
        None => Err(EditError::NoteNotFound(*at)),
    }
}

fn swap_note(score: &mut Score, at: &Position, expected: &Note, replacement: Note) -> Result<(), EditError> {
    let beat = beat_mut(score, at)?;
    let idx = at.note.ok_or(EditError::NoteNotFound(*at))?;
    let slot = beat.notes.get_mut(idx).ok_or(EditError::NoteNotFound(*at))?;
    if slot != expected {
        return Err(EditError::Mismatch(*at));
    }
    *slot = replacement;
    Ok(())
}

fn insert_beat(score: &mut Score, at: &Position, beat: Beat) -> Result<(), EditError> {
    let measure = measure_mut(score, at)?;
    if at.beat > measure.beats.len() {
        return Err(beat_not_found(at));
    }
    measure.beats.insert(at.beat, beat);
    Ok(())
}

fn remove_beat(score: &mut Score, at: &Position, expected: &Beat) -> Result<(), EditError> {
    let measure = measure_mut(score, at)?;
    match measure.beats.get(at.beat) {
        Some(found) if found == expected => {
            measure.beats.remove(at.beat);
            Ok(())
        }
        Some(_) => Err(EditError::Mismatch(*at)),
        None => Err(beat_not_found(at)),
    }
}

fn swap_beat(score: &mut Score, at: &Position, expected: &Beat, replacement: Beat) -> Result<(), EditError> {
    let slot = beat_mut(score, at)?;
    if slot != expected {
        return Err(EditError::Mismatch(*at));
    }
    *slot = replacement;
    Ok(())
}

fn insert_measures(score: &mut Score, index: usize, measures: &[Measure]) -> Result<(), EditError> {
    if measures.len() != score.tracks.len() {
        return Err(EditError::TrackCountMismatch {
            expected: score.tracks.len(),
            actual: measures.len(),
        });
    }
    for (t, track) in score.tracks.iter().enumerate() {
        if index > track.measures.len() {
            return Err(EditError::MeasureNotFound {
                track: t,
                measure: index,
            });
        }
    }
    for (track, measure) in score.tracks.iter_mut().zip(measures) {
        track.measures.insert(index, measure.clone());
    }
    Ok(())
}

fn remove_measures(score: &mut Score, index: usize, expected_tracks: usize) -> Result<(), EditError> {
    if expected_tracks != score.tracks.len() {
        return Err(EditError::TrackCountMismatch {
            expected: score.tracks.len(),
            actual: expected_tracks,
        });
    }
    for (t, track) in score.tracks.iter().enumerate() {
        if index >= track.measures.len() {
            return Err(EditError::MeasureNotFound {
                track: t,
                measure: index,
            });
        }
    }
    for track in score.tracks.iter_mut() {
        track.measures.remove(index);
    }
    Ok(())
}

fn set_metadata(score: &mut Score, metadata: ScoreMetadata) -> Result<(), EditError> {
    if metadata.tempo == 0 {
        return Err(EditError::InvalidMetadata("tempo must be greater than zero".into()));
    }
    if metadata.time_signature.beats == 0 {
        return Err(EditError::InvalidMetadata(
            "at least one beat per measure is required".into(),
        ));
    }
    score.metadata = metadata;
    Ok(())
}

/// Bounded undo/redo history with branching-history semantics
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UndoStack {
    /// Applied commands, oldest first
    history: VecDeque<Command>,
    /// Undone commands available for redo, most recently undone last
    future: Vec<Command>,
    /// Maximum number of commands kept in `history`
    max_size: usize,
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl UndoStack {
    /// Create a new undo stack with specified maximum size
    pub fn new(max_size: usize) -> Self {
        Self {
            history: VecDeque::new(),
            future: Vec::new(),
            max_size: max_size.max(1),
        }
    }

    /// Apply `command` to `current`, record it and drop any redo path.
    ///
    /// On error nothing is recorded and the history is unchanged.
    pub fn execute(&mut self, command: Command, current: &Score) -> Result<Score, EditError> {
        let next = command.apply(current)?;
        self.history.push_back(command);
        if self.history.len() > self.max_size {
            self.history.pop_front();
            log::debug!("undo history full, evicted oldest command");
        }
        self.future.clear();
        Ok(next)
    }

    /// Revert the most recent command. `Ok(None)` when there is nothing to undo.
    pub fn undo(&mut self, current: &Score) -> Result<Option<Score>, EditError> {
        let Some(command) = self.history.pop_back() else {
            return Ok(None);
        };
        match command.revert(current) {
            Ok(previous) => {
                self.future.push(command);
                Ok(Some(previous))
            }
            Err(e) => {
                self.history.push_back(command);
                Err(e)
            }
        }
    }

    /// Re-apply the most recently undone command. `Ok(None)` when there is nothing to redo.
    pub fn redo(&mut self, current: &Score) -> Result<Option<Score>, EditError> {
        let Some(command) = self.future.pop() else {
            return Ok(None);
        };
        match command.apply(current) {
            Ok(next) => {
                self.history.push_back(command);
                if self.history.len() > self.max_size {
                    self.history.pop_front();
                }
                Ok(Some(next))
            }
            Err(e) => {
                self.future.push(command);
                Err(e)
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.history.len()
    }

    pub fn redo_count(&self) -> usize {
        self.future.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Clear all undo and redo history
    pub fn clear(&mut self) {
        self.history.clear();
        self.future.clear();
    }
}

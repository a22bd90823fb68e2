// Undo/redo laws over a sequence of edits

use score_engine::undo::DEFAULT_HISTORY_LIMIT;
use score_engine::{Beat, Command, Measure, Note, NoteValue, Position, Score, UndoStack};

fn start() -> Score {
    let mut score = Score::blank("Edits", 1, 2);
    score.tracks[0].measures[0] = Measure::new(vec![
        Beat::note(NoteValue::Half, 60),
        Beat::note(NoteValue::Half, 64),
    ]);
    score
}

/// Edits that each depend on the score they are applied to
fn edit(step: usize, score: &Score) -> Command {
    match step % 4 {
        0 => Command::replace_note(
            score,
            Position::new(0, 0, 0).with_note(0),
            Note::new(60 + (step % 12) as u8),
        )
        .expect("note exists"),
        1 => Command::insert_beat(Position::new(0, 1, 0), Beat::note(NoteValue::Quarter, 67)),
        2 => Command::set_header(score, format!("Edit {}", step), "Someone"),
        // appends to the second beat
        _ => Command::insert_note(score, Position::new(0, 0, 1), Note::new(72))
            .expect("beat exists"),
    }
}

#[test]
fn test_undo_all_restores_original_and_redo_all_replays() {
    let mut stack = UndoStack::default();
    let original = start();
    let mut history = vec![original.clone()];
    let mut current = original.clone();

    for step in 0..12 {
        let command = edit(step, &current);
        current = stack.execute(command, &current).expect("edit applies");
        history.push(current.clone());
    }
    let edited = current.clone();

    for expected in history.iter().rev().skip(1) {
        current = stack.undo(&current).expect("undo applies").expect("entry present");
        assert_eq!(&current, expected);
    }
    assert_eq!(current, original);
    assert!(!stack.can_undo());

    while let Some(next) = stack.redo(&current).expect("redo applies") {
        current = next;
    }
    assert_eq!(current, edited);
}

#[test]
fn test_history_is_bounded() {
    let mut stack = UndoStack::default();
    let mut current = start();
    for step in 0..(DEFAULT_HISTORY_LIMIT + 15) {
        let command = edit(step, &current);
        current = stack.execute(command, &current).expect("edit applies");
    }
    assert_eq!(stack.undo_count(), DEFAULT_HISTORY_LIMIT);

    let mut undone = 0;
    while let Some(previous) = stack.undo(&current).expect("undo applies") {
        current = previous;
        undone += 1;
    }
    assert_eq!(undone, DEFAULT_HISTORY_LIMIT);
    assert_ne!(current, start());
}

#[test]
fn test_new_edit_clears_redo() {
    let mut stack = UndoStack::default();
    let mut current = start();
    current = stack.execute(edit(0, &current), &current).unwrap();
    current = stack.execute(edit(1, &current), &current).unwrap();
    current = stack.undo(&current).unwrap().unwrap();
    assert!(stack.can_redo());

    current = stack.execute(edit(2, &current), &current).unwrap();
    assert!(!stack.can_redo());
    assert_eq!(stack.redo(&current).unwrap(), None);
    assert_eq!(current.title, "Edit 2");
}

#[test]
fn test_failed_edit_leaves_history_untouched() {
    let mut stack = UndoStack::default();
    let current = start();
    let bad = Command::insert_beat(Position::new(3, 0, 0), Beat::rest(NoteValue::Quarter));
    assert!(stack.execute(bad, &current).is_err());
    assert_eq!(stack.undo_count(), 0);
}

//! Tick timeline → measures and beats
//!
//! Note onsets are snapped to a grid (`quantize` subdivisions of a whole
//! note, thirty-seconds when unset). Notes sharing an onset form one beat;
//! a beat lasts until the next onset or until its longest note ends, and the
//! gap to the next onset becomes a rest. Spans crossing a barline are split
//! and tied.

use num_rational::Ratio;

use super::reader::RawNote;
use crate::models::{Beat, Measure, Note, NoteValue, TimeSignature};

/// Finest grid the note values can express
pub const FINEST_GRID: u32 = 32;

/// Grid geometry shared by every track of one import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    /// Ticks per quarter note
    pub ppq: u32,
    /// Slots per whole note
    pub slots: u32,
    /// Slots per measure
    pub measure_slots: u64,
}

impl Grid {
    pub fn new(ppq: u16, time: &TimeSignature, quantize: Option<u32>) -> Self {
        let slots = quantize
            .filter(|q| q.is_power_of_two())
            .unwrap_or(FINEST_GRID)
            .clamp(4, FINEST_GRID)
            .max(time.beat_unit.max(1) as u32);
        let measure = time.measure_duration() * Ratio::from_integer(slots);
        Self {
            ppq: ppq.max(1) as u32,
            slots,
            measure_slots: (measure.to_integer() as u64).max(1),
        }
    }

    /// Nearest grid slot for a tick
    pub fn slot(&self, tick: u64) -> u64 {
        let whole = self.ppq as u64 * 4;
        (tick * self.slots as u64 + whole / 2) / whole
    }

    pub fn measures_for(&self, end_slot: u64) -> usize {
        end_slot.div_ceil(self.measure_slots) as usize
    }
}

/// A stretch of the timeline: sounding pitches (empty for a rest)
#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    start: u64,
    end: u64,
    notes: Vec<(u8, u8)>,
}

fn segments(notes: &[RawNote], grid: &Grid) -> Vec<Segment> {
    let mut slotted: Vec<(u64, u64, u8, u8)> = notes
        .iter()
        .map(|n| {
            let start = grid.slot(n.start);
            let end = grid.slot(n.end).max(start + 1);
            (start, end, n.pitch, n.velocity)
        })
        .collect();
    slotted.sort_unstable();

    let mut out: Vec<Segment> = Vec::new();
    let mut i = 0;
    while i < slotted.len() {
        let onset = slotted[i].0;
        let mut j = i;
        let mut end = onset + 1;
        let mut group = Vec::new();
        while j < slotted.len() && slotted[j].0 == onset {
            let (_, e, pitch, velocity) = slotted[j];
            end = end.max(e);
            if !group.iter().any(|&(p, _)| p == pitch) {
                group.push((pitch, velocity));
            }
            j += 1;
        }
        if let Some(&(next, ..)) = slotted.get(j) {
            end = end.min(next);
        }
        out.push(Segment {
            start: onset,
            end,
            notes: group,
        });
        i = j;
    }
    out
}

/// Beats for a span inside one measure; `tie_out` ties the last piece on
fn span_beats(len: u64, grid: &Grid, notes: &[(u8, u8)], tie_out: bool) -> Vec<Beat> {
    let pieces = NoteValue::decompose(Ratio::new(len as u32, grid.slots));
    let last = pieces.len().saturating_sub(1);
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, (value, dots))| {
            let tie = !notes.is_empty() && (i < last || tie_out);
            let notes = notes
                .iter()
                .map(|&(pitch, velocity)| Note::new(pitch).with_velocity(velocity).tied(tie))
                .collect();
            Beat::new(value, notes).dotted(dots)
        })
        .collect()
}

/// Lay one track's notes onto `measure_count` full measures
pub fn build_measures(notes: &[RawNote], grid: &Grid, measure_count: usize) -> Vec<Measure> {
    let total = measure_count as u64 * grid.measure_slots;
    let mut timeline = Vec::new();
    let mut cursor = 0u64;
    for seg in segments(notes, grid) {
        if seg.start >= total {
            break;
        }
        if seg.start > cursor {
            timeline.push(Segment {
                start: cursor,
                end: seg.start,
                notes: Vec::new(),
            });
        }
        cursor = seg.end.min(total);
        timeline.push(Segment {
            end: cursor,
            ..seg
        });
    }
    if cursor < total {
        timeline.push(Segment {
            start: cursor,
            end: total,
            notes: Vec::new(),
        });
    }

    let mut measures: Vec<Vec<Beat>> = vec![Vec::new(); measure_count];
    for seg in timeline {
        let mut start = seg.start;
        while start < seg.end {
            let index = (start / grid.measure_slots) as usize;
            let barline = (index as u64 + 1) * grid.measure_slots;
            let stop = seg.end.min(barline);
            let crosses = stop < seg.end;
            if let Some(measure) = measures.get_mut(index) {
                measure.extend(span_beats(stop - start, grid, &seg.notes, crosses));
            }
            start = stop;
        }
    }
    measures.into_iter().map(Measure::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(pitch: u8, start: u64, end: u64) -> RawNote {
        RawNote {
            channel: 0,
            pitch,
            velocity: 90,
            start,
            end,
        }
    }

    fn grid() -> Grid {
        Grid::new(480, &TimeSignature::default(), None)
    }

    #[test]
    fn test_grid_geometry() {
        let g = grid();
        assert_eq!(g.slots, 32);
        assert_eq!(g.measure_slots, 32);
        assert_eq!(g.slot(480), 8);
        assert_eq!(g.slot(29), 0);
        assert_eq!(g.slot(31), 1);

        let g8 = Grid::new(96, &TimeSignature::new(3, 8), Some(4));
        assert_eq!(g8.slots, 8);
        assert_eq!(g8.measure_slots, 3);
    }

    #[test]
    fn test_quarters_fill_measure() {
        let notes: Vec<RawNote> = (0..4).map(|i| note(60 + i as u8, i * 480, i * 480 + 480)).collect();
        let measures = build_measures(&notes, &grid(), 1);
        let beats = &measures[0].beats;
        assert_eq!(beats.len(), 4);
        assert!(beats.iter().all(|b| b.value == NoteValue::Quarter));
        assert_eq!(beats[3].notes[0].pitch, 63);
        assert_eq!(beats[0].notes[0].velocity, 90);
        assert!(measures[0].is_filled(&TimeSignature::default()));
    }

    #[test]
    fn test_gaps_become_rests() {
        let notes = vec![note(60, 480, 960)];
        let measures = build_measures(&notes, &grid(), 2);
        let beats = &measures[0].beats;
        assert!(beats[0].is_rest());
        assert_eq!(beats[1].notes[0].pitch, 60);
        assert!(beats[2].is_rest());
        assert!(measures[1].beats.iter().all(Beat::is_rest));
        assert!(measures[1].is_filled(&TimeSignature::default()));
    }

    #[test]
    fn test_barline_crossing_is_tied() {
        // dotted half starting on beat 3 crosses into measure 2
        let notes = vec![note(67, 960, 2400)];
        let measures = build_measures(&notes, &grid(), 2);
        let last = measures[0].beats.last().unwrap();
        assert_eq!(last.value, NoteValue::Half);
        assert!(last.notes[0].tie);
        let first = &measures[1].beats[0];
        assert_eq!(first.value, NoteValue::Quarter);
        assert!(!first.notes[0].tie);
    }

    #[test]
    fn test_simultaneous_onsets_form_chord() {
        let notes = vec![note(60, 0, 960), note(64, 0, 960), note(67, 0, 480)];
        let measures = build_measures(&notes, &grid(), 1);
        let beat = &measures[0].beats[0];
        assert!(beat.is_chord());
        assert_eq!(beat.notes.len(), 3);
        assert_eq!(beat.value, NoteValue::Half);
    }

    #[test]
    fn test_quantize_snaps_onsets() {
        let g = Grid::new(480, &TimeSignature::default(), Some(8));
        let notes = vec![note(60, 10, 470), note(62, 500, 950)];
        let measures = build_measures(&notes, &g, 1);
        assert_eq!(measures[0].beats[0].value, NoteValue::Quarter);
        assert_eq!(measures[0].beats[1].notes[0].pitch, 62);
    }
}

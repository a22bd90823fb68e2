//! Layout result
//!
//! Output of [`LayoutEngine::compute_layout`](super::LayoutEngine). Every
//! coordinate is absolute on the page; a renderer draws from this plus the
//! score and never measures anything itself.

use serde::{Deserialize, Serialize};

use crate::models::Position;

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LayoutResult {
    pub width: f32,
    pub height: f32,
    pub systems: Vec<SystemLayout>,
    /// One entry per measure index, in order
    pub measures: Vec<MeasureLayout>,
}

/// One line of music: every track's staff for a run of measures
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SystemLayout {
    pub index: usize,
    /// First measure index and one past the last
    pub first_measure: usize,
    pub end_measure: usize,
    pub y: f32,
    pub height: f32,
    /// Top line of each track's staff
    pub staff_tops: Vec<f32>,
    /// Stretch applied to natural widths
    pub justification: f32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeasureLayout {
    pub index: usize,
    pub system: usize,
    pub x: f32,
    pub width: f32,
    /// Column start positions shared by all tracks
    pub columns: Vec<f32>,
    pub beats: Vec<BeatLayout>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BeatLayout {
    pub track: usize,
    pub beat: usize,
    pub x: f32,
    pub width: f32,
    pub font_size: f32,
    /// Drawn with the dense-beat reduction
    pub dense: bool,
    /// Beamed to the next beat of the same track
    pub beamed: bool,
    pub notes: Vec<NoteLayout>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NoteLayout {
    pub pitch: u8,
    pub x: f32,
    pub y: f32,
    /// Half-spaces above the middle staff line
    pub staff_step: i32,
}

impl LayoutResult {
    pub fn measure(&self, index: usize) -> Option<&MeasureLayout> {
        self.measures.get(index)
    }

    pub fn system_for_measure(&self, index: usize) -> Option<&SystemLayout> {
        let system = self.measures.get(index)?.system;
        self.systems.get(system)
    }

    /// Beat layout for a position; its note layout when the position names a note
    pub fn locate(&self, pos: &Position) -> Option<(&BeatLayout, Option<&NoteLayout>)> {
        let beat = self
            .measures
            .get(pos.measure)?
            .beats
            .iter()
            .find(|b| b.track == pos.track && b.beat == pos.beat)?;
        let note = match pos.note {
            Some(n) => Some(beat.notes.get(n)?),
            None => None,
        };
        Some((beat, note))
    }

    pub fn line_count(&self) -> usize {
        self.systems.len()
    }
}

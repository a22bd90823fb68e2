//! Layout Engine - computes positions for every measure, beat and note
//!
//! Pure function of (score, config): no caching, no measurement callbacks.
//! Every call recomputes the whole document, so two calls with equal inputs
//! return equal results.
//!
//! Per measure, the onsets of all tracks are merged into shared columns so
//! simultaneous beats line up vertically. A column is as wide as the widest
//! beat starting in it. Measures are then packed greedily into systems and,
//! optionally, stretched to the line width.

use std::collections::BTreeSet;

use num_rational::Ratio;

use super::config::{DensityPreset, RenderConfig};
use super::layout::*;
use crate::models::pitch::spell;
use crate::models::*;

/// Main layout engine
#[derive(Debug, Default, Clone, Copy)]
pub struct LayoutEngine;

/// Natural (unjustified) geometry of one measure
#[derive(Debug, Clone, PartialEq)]
struct MeasurePlan {
    onsets: Vec<Ratio<u32>>,
    column_widths: Vec<f32>,
    width: f32,
}

/// Relative width of a beat by its written value
fn value_factor(value: NoteValue, dots: u8) -> f32 {
    let base = match value {
        NoteValue::Whole => 2.4,
        NoteValue::Half => 1.8,
        NoteValue::Quarter => 1.35,
        NoteValue::Eighth => 1.0,
        NoteValue::Sixteenth => 0.85,
        NoteValue::ThirtySecond => 0.75,
    };
    base * (1.0 + 0.2 * dots.min(NoteValue::MAX_DOTS) as f32)
}

fn is_dense(beat: &Beat, preset: &DensityPreset) -> bool {
    beat.sounding().count() > preset.dense_beat_threshold
}

/// Eighths and shorter that sit next to another beamable note share a beam
fn is_beamed(beat: &Beat, next: Option<&Beat>) -> bool {
    match next {
        Some(next) => {
            beat.value.is_beamable()
                && next.value.is_beamable()
                && !beat.is_rest()
                && !next.is_rest()
        }
        None => false,
    }
}

fn beat_width(beat: &Beat, next: Option<&Beat>, preset: &DensityPreset) -> f32 {
    let mut body = preset.note_spacing * value_factor(beat.value, beat.dots);
    if is_dense(beat, preset) {
        body *= preset.dense_spacing_scale;
    }
    let gap = if is_beamed(beat, next) {
        preset.beamed_gap
    } else {
        preset.group_gap
    };
    body + gap
}

impl LayoutEngine {
    pub fn new() -> Self {
        Self
    }

    /// Compute complete layout for a score
    pub fn compute_layout(&self, score: &Score, config: &RenderConfig) -> LayoutResult {
        let preset = config.preset();
        let measure_count = score
            .tracks
            .iter()
            .map(Track::measure_count)
            .max()
            .unwrap_or(0);

        let plans: Vec<MeasurePlan> = (0..measure_count)
            .map(|m| self.plan_measure(score, m, &preset))
            .collect();
        let breaks = self.break_lines(&plans, config, &preset);

        let staff_height = 4.0 * preset.line_spacing;
        let track_count = score.tracks.len().max(1);
        let system_height =
            track_count as f32 * staff_height + (track_count - 1) as f32 * config.staff_gap;
        let available = config.content_width();
        let prefer_flats = score.metadata.key_signature.prefers_flats();

        let mut systems = Vec::with_capacity(breaks.len());
        let mut measures = Vec::with_capacity(measure_count);
        let mut y = config.top_margin;

        for (index, &(first, end)) in breaks.iter().enumerate() {
            let natural: f32 = plans[first..end].iter().map(|p| p.width).sum();
            let last = index + 1 == breaks.len();
            let justification = if config.justify && !last && natural > 0.0 && natural < available
            {
                available / natural
            } else {
                1.0
            };
            let staff_tops: Vec<f32> = (0..track_count)
                .map(|t| y + t as f32 * (staff_height + config.staff_gap))
                .collect();

            let mut x = config.left_margin;
            for (m, plan) in plans.iter().enumerate().take(end).skip(first) {
                let layout = self.place_measure(
                    score,
                    m,
                    plan,
                    index,
                    x,
                    justification,
                    &staff_tops,
                    &preset,
                    prefer_flats,
                );
                x += layout.width;
                measures.push(layout);
            }

            systems.push(SystemLayout {
                index,
                first_measure: first,
                end_measure: end,
                y,
                height: system_height,
                staff_tops,
                justification,
            });
            y += system_height + config.system_gap;
        }

        let height = if systems.is_empty() {
            config.top_margin * 2.0
        } else {
            y - config.system_gap + config.top_margin
        };
        log::debug!(
            "layout: {} measure(s) in {} system(s), {:?} density",
            measures.len(),
            systems.len(),
            config.density
        );

        LayoutResult {
            width: config.page_width,
            height,
            systems,
            measures,
        }
    }

    /// Shared columns and natural width of measure `m`
    fn plan_measure(&self, score: &Score, m: usize, preset: &DensityPreset) -> MeasurePlan {
        let mut onset_set = BTreeSet::new();
        for track in &score.tracks {
            if let Some(measure) = track.measures.get(m) {
                onset_set.extend(measure.onsets());
            }
        }
        let onsets: Vec<Ratio<u32>> = onset_set.into_iter().collect();
        if onsets.is_empty() {
            return MeasurePlan {
                onsets,
                column_widths: Vec::new(),
                width: preset.empty_measure_width,
            };
        }

        let mut column_widths = vec![0.0f32; onsets.len()];
        for track in &score.tracks {
            let Some(measure) = track.measures.get(m) else {
                continue;
            };
            for (i, onset) in measure.onsets().iter().enumerate() {
                let beat = &measure.beats[i];
                let w = beat_width(beat, measure.beats.get(i + 1), preset);
                if let Ok(col) = onsets.binary_search(onset) {
                    column_widths[col] = column_widths[col].max(w);
                }
            }
        }
        let width = 2.0 * preset.measure_padding + column_widths.iter().sum::<f32>();
        MeasurePlan {
            onsets,
            column_widths,
            width,
        }
    }

    /// Greedy line breaking: `(first, end)` measure ranges per system
    fn break_lines(
        &self,
        plans: &[MeasurePlan],
        config: &RenderConfig,
        preset: &DensityPreset,
    ) -> Vec<(usize, usize)> {
        let available = config.content_width();
        let max_per_line = preset.max_measures_per_line.max(1);
        let mut breaks = Vec::new();
        let mut first = 0;
        let mut used = 0.0f32;

        for (m, plan) in plans.iter().enumerate() {
            let count = m - first;
            if count > 0 && (count >= max_per_line || used + plan.width > available) {
                breaks.push((first, m));
                first = m;
                used = 0.0;
            }
            used += plan.width;
        }
        if first < plans.len() {
            breaks.push((first, plans.len()));
        }
        breaks
    }

    #[allow(clippy::too_many_arguments)]
    fn place_measure(
        &self,
        score: &Score,
        m: usize,
        plan: &MeasurePlan,
        system: usize,
        x: f32,
        scale: f32,
        staff_tops: &[f32],
        preset: &DensityPreset,
        prefer_flats: bool,
    ) -> MeasureLayout {
        let mut columns = Vec::with_capacity(plan.column_widths.len());
        let mut cx = x + preset.measure_padding * scale;
        for w in &plan.column_widths {
            columns.push(cx);
            cx += w * scale;
        }

        let mut beats = Vec::new();
        for (t, track) in score.tracks.iter().enumerate() {
            let Some(measure) = track.measures.get(m) else {
                continue;
            };
            let staff_top = staff_tops.get(t).copied().unwrap_or(0.0);
            for (i, onset) in measure.onsets().iter().enumerate() {
                let beat = &measure.beats[i];
                let next = measure.beats.get(i + 1);
                let Ok(col) = plan.onsets.binary_search(onset) else {
                    continue;
                };
                let bx = columns[col];
                let dense = is_dense(beat, preset);
                let notes = beat
                    .notes
                    .iter()
                    .map(|note| {
                        let staff_step = if note.is_rest_marker() {
                            0
                        } else {
                            spell(note.pitch, prefer_flats).diatonic_index()
                                - track.clef.middle_line_index()
                        };
                        NoteLayout {
                            pitch: note.pitch,
                            x: bx,
                            y: staff_top + 2.0 * preset.line_spacing
                                - staff_step as f32 * preset.line_spacing / 2.0,
                            staff_step,
                        }
                    })
                    .collect();
                beats.push(BeatLayout {
                    track: t,
                    beat: i,
                    x: bx,
                    width: beat_width(beat, next, preset) * scale,
                    font_size: if dense {
                        preset.font_size * preset.dense_font_scale
                    } else {
                        preset.font_size
                    },
                    dense,
                    beamed: is_beamed(beat, next),
                    notes,
                });
            }
        }

        MeasureLayout {
            index: m,
            system,
            x,
            width: plan.width * scale,
            columns,
            beats,
        }
    }
}

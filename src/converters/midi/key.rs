//! Krumhansl-Schmuckler key estimation
//!
//! Builds a duration-weighted pitch-class histogram and correlates it against
//! the 24 rotated Krumhansl-Kessler profiles; the best match wins.

use super::reader::RawNote;
use crate::models::{KeyMode, KeySignature};

const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// Correlation result for the winning key
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyEstimate {
    pub tonic: u8,
    pub mode: KeyMode,
    pub correlation: f64,
}

impl KeyEstimate {
    /// Nearest conventional signature (sharps up to F#, flats from Db)
    pub fn signature(&self) -> KeySignature {
        let major_pc = match self.mode {
            KeyMode::Major => self.tonic,
            KeyMode::Minor => (self.tonic + 3) % 12,
        };
        let mut fifths = ((major_pc as i32 * 7) % 12) as i8;
        if fifths > 6 {
            fifths -= 12;
        }
        KeySignature::new(fifths, self.mode)
    }
}

fn pearson(x: &[f64; 12], y: &[f64; 12]) -> f64 {
    let mean_x = x.iter().sum::<f64>() / 12.0;
    let mean_y = y.iter().sum::<f64>() / 12.0;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return 0.0;
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

/// Pitch-class weights, each note counted by its length in ticks
pub fn pitch_class_histogram<'a>(notes: impl IntoIterator<Item = &'a RawNote>) -> [f64; 12] {
    let mut hist = [0.0; 12];
    for note in notes {
        hist[(note.pitch % 12) as usize] += note.duration().max(1) as f64;
    }
    hist
}

/// Best-matching key, or `None` when there are no notes to judge by
pub fn estimate_key<'a>(notes: impl IntoIterator<Item = &'a RawNote>) -> Option<KeyEstimate> {
    let hist = pitch_class_histogram(notes);
    if hist.iter().all(|&w| w == 0.0) {
        return None;
    }

    let mut best: Option<KeyEstimate> = None;
    for tonic in 0..12u8 {
        for (mode, profile) in [(KeyMode::Major, &MAJOR_PROFILE), (KeyMode::Minor, &MINOR_PROFILE)] {
            let mut rotated = [0.0; 12];
            for (pc, slot) in rotated.iter_mut().enumerate() {
                *slot = profile[(pc + 12 - tonic as usize) % 12];
            }
            let correlation = pearson(&hist, &rotated);
            if best.map_or(true, |b| correlation > b.correlation) {
                best = Some(KeyEstimate {
                    tonic,
                    mode,
                    correlation,
                });
            }
        }
    }
    log::debug!("key estimate: {:?}", best);
    best
}

//! MIDI pitch helpers
//!
//! Conversions between MIDI note numbers, letter spellings (step/alter/octave)
//! and scale degrees relative to a key.

/// Semitone offsets of the natural steps C D E F G A B
const STEP_SEMITONES: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];
const STEP_NAMES: [char; 7] = ['C', 'D', 'E', 'F', 'G', 'A', 'B'];

/// Semitone offsets of major-scale degrees 1-7
pub const MAJOR_SCALE: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];

/// Middle C
pub const MIDDLE_C: u8 = 60;

/// A pitch spelled as letter, alteration and octave (C4 = middle C)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spelling {
    pub step: char,
    pub alter: i8,
    pub octave: i8,
}

impl Spelling {
    /// Diatonic index (octave * 7 + step index), used for staff placement
    pub fn diatonic_index(&self) -> i32 {
        let step = STEP_NAMES.iter().position(|&s| s == self.step).unwrap_or(0) as i32;
        self.octave as i32 * 7 + step
    }
}

/// MIDI number from a letter spelling. Returns `None` outside 1..=127.
pub fn from_spelling(step: char, alter: i8, octave: i8) -> Option<u8> {
    let idx = STEP_NAMES
        .iter()
        .position(|&s| s == step.to_ascii_uppercase())?;
    let midi = (octave as i32 + 1) * 12 + STEP_SEMITONES[idx] + alter as i32;
    (1..=127).contains(&midi).then_some(midi as u8)
}

/// Spell a MIDI number, preferring sharps or flats for black keys
pub fn spell(pitch: u8, prefer_flats: bool) -> Spelling {
    let pc = (pitch % 12) as i32;
    let octave = (pitch / 12) as i8 - 1;
    if let Some(idx) = STEP_SEMITONES.iter().position(|&s| s == pc) {
        return Spelling {
            step: STEP_NAMES[idx],
            alter: 0,
            octave,
        };
    }
    if prefer_flats {
        // pc + 1 is always a natural step for a black key
        let idx = STEP_SEMITONES.iter().position(|&s| s == pc + 1).unwrap_or(0);
        Spelling {
            step: STEP_NAMES[idx],
            alter: -1,
            octave,
        }
    } else {
        let idx = STEP_SEMITONES.iter().position(|&s| s == pc - 1).unwrap_or(0);
        Spelling {
            step: STEP_NAMES[idx],
            alter: 1,
            octave,
        }
    }
}

/// Human-readable name such as "C#4" or "Bb3"
pub fn pitch_name(pitch: u8, prefer_flats: bool) -> String {
    let s = spell(pitch, prefer_flats);
    let accidental = match s.alter {
        1 => "#",
        -1 => "b",
        _ => "",
    };
    format!("{}{}{}", s.step, accidental, s.octave)
}

/// MIDI number for a major-scale degree (1-7) relative to a tonic pitch class.
///
/// `octave_shift` counts octaves above (positive) or below the octave that
/// starts at the tonic nearest middle C.
pub fn degree_to_pitch(tonic_pc: u8, degree: u8, accidental: i8, octave_shift: i8) -> Option<u8> {
    if !(1..=7).contains(&degree) {
        return None;
    }
    let tonic = MIDDLE_C as i32 + tonic_pc as i32 - if tonic_pc > 6 { 12 } else { 0 };
    let midi = tonic
        + MAJOR_SCALE[(degree - 1) as usize]
        + accidental as i32
        + 12 * octave_shift as i32;
    (1..=127).contains(&midi).then_some(midi as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_spelling() {
        assert_eq!(from_spelling('C', 0, 4), Some(60));
        assert_eq!(from_spelling('a', 0, 4), Some(69));
        assert_eq!(from_spelling('B', -1, 3), Some(58));
        assert_eq!(from_spelling('H', 0, 4), None);
        assert_eq!(from_spelling('C', 0, 12), None);
    }

    #[test]
    fn test_spell_prefers_requested_accidental() {
        assert_eq!(pitch_name(61, false), "C#4");
        assert_eq!(pitch_name(61, true), "Db4");
        assert_eq!(pitch_name(48, true), "C3");
        assert_eq!(spell(70, true).diatonic_index(), 4 * 7 + 6);
    }

    #[test]
    fn test_degree_to_pitch() {
        // 1=C
        assert_eq!(degree_to_pitch(0, 1, 0, 0), Some(60));
        assert_eq!(degree_to_pitch(0, 5, 0, 1), Some(79));
        // 1=G sits below middle C
        assert_eq!(degree_to_pitch(7, 1, 0, 0), Some(55));
        assert_eq!(degree_to_pitch(0, 4, 1, 0), Some(66));
        assert_eq!(degree_to_pitch(0, 8, 0, 0), None);
    }
}

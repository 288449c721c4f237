//! Fingering maps, standard tuning and the chord shape catalog
//!
//! A fingering map holds one fret per string (low E to high E). A negative
//! value means the string is not played.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::gesture::STRING_COUNT;

/// Sentinel fret value for a muted string
pub const MUTED: i8 = -1;

/// Highest fret the synthesizer will sound
pub const MAX_FRET: i8 = 24;

/// Open-string MIDI notes in standard tuning (E2 A2 D3 G3 B3 E4)
pub const STANDARD_TUNING: [u8; STRING_COUNT] = [40, 45, 50, 55, 59, 64];

/// Equal-tempered frequency of a MIDI note (A4 = 440 Hz)
pub fn midi_to_frequency(midi: f32) -> f32 {
    440.0 * 2.0_f32.powf((midi - 69.0) / 12.0)
}

/// Open-string pitch in Hz, `None` for an out-of-range string
pub fn open_string_frequency(string: usize) -> Option<f32> {
    STANDARD_TUNING
        .get(string)
        .map(|&midi| midi_to_frequency(midi as f32))
}

/// Sounding pitch of `string` stopped at `fret`
pub fn fretted_frequency(string: usize, fret: u8) -> Option<f32> {
    open_string_frequency(string).map(|open| open * 2.0_f32.powf(fret as f32 / 12.0))
}

/// Per-string fret assignment, low string first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FingeringMap([i8; STRING_COUNT]);

impl FingeringMap {
    pub const fn new(frets: [i8; STRING_COUNT]) -> Self {
        Self(frets)
    }

    /// All six strings played open
    pub const fn open() -> Self {
        Self([0; STRING_COUNT])
    }

    pub fn frets(&self) -> &[i8; STRING_COUNT] {
        &self.0
    }

    /// Fret for `string`, `None` when muted or out of range
    pub fn fret(&self, string: usize) -> Option<u8> {
        match self.0.get(string) {
            Some(&fret) if fret >= 0 => Some(fret as u8),
            _ => None,
        }
    }

    pub fn is_muted(&self, string: usize) -> bool {
        self.fret(string).is_none()
    }

    /// Build from an untrusted list of frets.
    ///
    /// Exactly six values are required. Negative values become the mute
    /// sentinel; frets above the playable range are clamped.
    pub fn from_frets(values: &[i32]) -> Option<Self> {
        if values.len() != STRING_COUNT {
            return None;
        }
        let mut frets = [MUTED; STRING_COUNT];
        for (slot, &value) in frets.iter_mut().zip(values) {
            *slot = if value < 0 {
                MUTED
            } else {
                value.min(MAX_FRET as i32) as i8
            };
        }
        Some(Self(frets))
    }

    /// Translate absolute MIDI notes into frets relative to standard tuning.
    ///
    /// Only a full six-note voicing is accepted. A note below its open string
    /// is clamped to the open string.
    pub fn from_midi_notes(notes: &[u8]) -> Option<Self> {
        if notes.len() != STRING_COUNT {
            return None;
        }
        let mut frets = [0_i8; STRING_COUNT];
        for (string, (&note, &open)) in notes.iter().zip(STANDARD_TUNING.iter()).enumerate() {
            let offset = note as i32 - open as i32;
            frets[string] = offset.clamp(0, MAX_FRET as i32) as i8;
        }
        Some(Self(frets))
    }

    /// Strings that will sound, in low-to-high order
    pub fn sounding_strings(&self) -> impl Iterator<Item = usize> + '_ {
        (0..STRING_COUNT).filter(move |&s| !self.is_muted(s))
    }
}

impl Default for FingeringMap {
    fn default() -> Self {
        Self::open()
    }
}

impl fmt::Display for FingeringMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, &fret) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            if fret < 0 {
                write!(f, "x")?;
            } else {
                write!(f, "{}", fret)?;
            }
        }
        Ok(())
    }
}

/// Chord quality, used to shape catalog embeddings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordQuality {
    Major,
    Minor,
}

/// A known chord voicing
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChordShape {
    pub id: &'static str,
    pub quality: ChordQuality,
    pub fingering: FingeringMap,
    pub midi_notes: [u8; STRING_COUNT],
}

const fn shape(
    id: &'static str,
    quality: ChordQuality,
    frets: [i8; STRING_COUNT],
    midi_notes: [u8; STRING_COUNT],
) -> ChordShape {
    ChordShape {
        id,
        quality,
        fingering: FingeringMap::new(frets),
        midi_notes,
    }
}

use ChordQuality::{Major, Minor};

/// Chord shapes known to the recognizer
pub static CHORD_CATALOG: [ChordShape; 13] = [
    shape("C_Major", Major, [0, 3, 2, 0, 1, 0], [48, 52, 55, 60, 64, 67]),
    shape("C_Minor", Minor, [3, 3, 5, 5, 4, 3], [48, 51, 55, 60, 63, 67]),
    shape("D_Major", Major, [-1, -1, 0, 2, 3, 2], [50, 54, 57, 62, 66, 69]),
    shape("D_Minor", Minor, [-1, -1, 0, 2, 3, 1], [50, 53, 57, 62, 65, 69]),
    shape("E_Major", Major, [0, 2, 2, 1, 0, 0], [40, 47, 52, 56, 59, 64]),
    shape("E_Minor", Minor, [0, 2, 2, 0, 0, 0], [40, 47, 52, 55, 59, 64]),
    shape("F_Major", Major, [1, 3, 3, 2, 1, 1], [41, 48, 53, 57, 60, 65]),
    shape("G_Major", Major, [3, 2, 0, 0, 0, 3], [43, 47, 50, 55, 59, 67]),
    shape("G_Minor", Minor, [3, 5, 5, 3, 3, 3], [43, 46, 50, 55, 58, 67]),
    shape("A_Major", Major, [0, 0, 2, 2, 2, 0], [45, 52, 57, 61, 64, 69]),
    shape("A_Minor", Minor, [0, 0, 2, 2, 1, 0], [45, 52, 57, 60, 64, 69]),
    shape("B_Major", Major, [-1, 2, 4, 4, 4, 2], [47, 54, 59, 63, 66, 71]),
    shape("B_Minor", Minor, [-1, 2, 4, 4, 3, 2], [47, 54, 59, 62, 66, 71]),
];

/// Look up a chord shape by identifier (e.g. `"G_Major"`)
pub fn chord_shape(id: &str) -> Option<&'static ChordShape> {
    CHORD_CATALOG.iter().find(|shape| shape.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_string_pitches() {
        let low_e = open_string_frequency(0).unwrap();
        assert!((low_e - 82.41).abs() < 0.01);
        let a = open_string_frequency(1).unwrap();
        assert!((a - 110.0).abs() < 0.01);
        assert!(open_string_frequency(6).is_none());
    }

    #[test]
    fn test_twelfth_fret_is_octave() {
        let open = open_string_frequency(3).unwrap();
        let octave = fretted_frequency(3, 12).unwrap();
        assert!((octave - 2.0 * open).abs() < 1e-3);
    }

    #[test]
    fn test_muted_strings() {
        let map = chord_shape("D_Major").unwrap().fingering;
        assert!(map.is_muted(0));
        assert!(map.is_muted(1));
        assert_eq!(map.fret(4), Some(3));
        assert_eq!(map.sounding_strings().collect::<Vec<_>>(), vec![2, 3, 4, 5]);
        assert_eq!(map.to_string(), "x x 0 2 3 2");
    }

    #[test]
    fn test_midi_translation_matches_tuning() {
        let map = FingeringMap::from_midi_notes(&STANDARD_TUNING).unwrap();
        assert_eq!(map, FingeringMap::open());

        let g = chord_shape("G_Major").unwrap();
        let map = FingeringMap::from_midi_notes(&g.midi_notes).unwrap();
        assert_eq!(map.frets(), &[3, 2, 0, 0, 0, 3]);
    }

    #[test]
    fn test_midi_below_open_string_clamps_to_open() {
        let map = FingeringMap::from_midi_notes(&[30, 45, 50, 55, 59, 64]).unwrap();
        assert_eq!(map.fret(0), Some(0));
    }

    #[test]
    fn test_midi_translation_requires_six_notes() {
        assert!(FingeringMap::from_midi_notes(&[40, 45, 50]).is_none());
        assert!(FingeringMap::from_midi_notes(&[]).is_none());
    }

    #[test]
    fn test_from_frets_sanitizes() {
        let map = FingeringMap::from_frets(&[-3, 0, 30, 2, 2, 0]).unwrap();
        assert_eq!(map.frets(), &[MUTED, 0, MAX_FRET, 2, 2, 0]);
        assert!(FingeringMap::from_frets(&[0, 0, 0]).is_none());
    }

    #[test]
    fn test_catalog_lookup() {
        assert_eq!(CHORD_CATALOG.len(), 13);
        assert!(chord_shape("F_Major").is_some());
        assert!(chord_shape("F_Minor").is_none());
    }

    #[test]
    fn test_serde_is_plain_array() {
        let json = serde_json::to_string(&FingeringMap::new([-1, 0, 2, 2, 1, 0])).unwrap();
        assert_eq!(json, "[-1,0,2,2,1,0]");
    }
}

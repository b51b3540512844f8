//! Chord-symbol parsing and pitch-class arithmetic.
//!
//! Symbols are a root letter with optional accidental plus a quality suffix.
//! Unrecognized symbols fail with an explicit parse error — never a silent
//! default to a major triad.

pub mod voicing;

pub use voicing::{generate_satb, VoiceLines};

use crate::error::{Error, Result};

/// A parsed chord: root pitch class plus interval offsets in semitones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chord {
    /// Root pitch class, 0–11 (C = 0).
    pub root: u8,
    /// Semitone offsets from the root, always starting with 0.
    pub intervals: Vec<u8>,
}

impl Chord {
    /// Absolute pitch classes of every chord tone.
    pub fn pitch_classes(&self) -> Vec<u8> {
        self.intervals
            .iter()
            .map(|i| (self.root + i) % 12)
            .collect()
    }

    /// Whether a MIDI pitch is a chord tone.
    pub fn contains_pitch(&self, pitch: u8) -> bool {
        self.pitch_classes().contains(&(pitch % 12))
    }

    /// The chord tone interval at `index`, wrapping (0 = root, 1 = third, ...).
    pub fn tone(&self, index: usize) -> u8 {
        self.intervals[index % self.intervals.len()]
    }
}

/// Parse a note name ("C", "F#", "Bb") into a pitch class.
pub fn parse_note_name(name: &str) -> Result<u8> {
    let mut chars = name.chars();
    let letter = chars
        .next()
        .ok_or_else(|| Error::ChordParse(name.to_string()))?;
    let base: i32 = match letter.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return Err(Error::ChordParse(name.to_string())),
    };
    let mut pc = base;
    for c in chars {
        match c {
            '#' => pc += 1,
            'b' => pc -= 1,
            _ => return Err(Error::ChordParse(name.to_string())),
        }
    }
    Ok(pc.rem_euclid(12) as u8)
}

/// Parse a chord symbol into its root pitch class and interval offsets.
pub fn parse_chord_symbol(sym: &str) -> Result<Chord> {
    let sym = sym.trim();
    if sym.is_empty() || !sym.is_ascii() {
        return Err(Error::ChordParse(sym.to_string()));
    }

    let bytes = sym.as_bytes();
    let mut idx = 1;
    while idx < bytes.len() && (bytes[idx] == b'#' || bytes[idx] == b'b') {
        idx += 1;
    }
    let root = parse_note_name(&sym[..idx])?;
    let quality = &sym[idx..];

    let intervals: Vec<u8> = match quality {
        "" | "maj" => vec![0, 4, 7],
        "m" | "min" => vec![0, 3, 7],
        "dim" => vec![0, 3, 6],
        "aug" => vec![0, 4, 8],
        "sus2" => vec![0, 2, 7],
        "sus4" => vec![0, 5, 7],
        "5" => vec![0, 7],
        "6" => vec![0, 4, 7, 9],
        "m6" => vec![0, 3, 7, 9],
        "7" => vec![0, 4, 7, 10],
        "maj7" => vec![0, 4, 7, 11],
        "m7" | "min7" => vec![0, 3, 7, 10],
        "dim7" => vec![0, 3, 6, 9],
        "m7b5" => vec![0, 3, 6, 10],
        "9" => vec![0, 4, 7, 10, 14],
        "maj9" => vec![0, 4, 7, 11, 14],
        "m9" => vec![0, 3, 7, 10, 14],
        "add9" => vec![0, 4, 7, 14],
        _ => return Err(Error::ChordParse(sym.to_string())),
    };

    Ok(Chord { root, intervals })
}

/// Parse one chord per bar, propagating the first parse failure.
pub fn parse_progression(symbols: &[&str]) -> Result<Vec<Chord>> {
    symbols.iter().map(|s| parse_chord_symbol(s)).collect()
}

/// Third and seventh (or the closest available color tones) of a chord —
/// the guide tones used for keys stabs.
pub fn guide_tones(chord: &Chord) -> Vec<u8> {
    let mut out = Vec::with_capacity(2);
    // Third: the interval in (2..=5).
    if let Some(&t) = chord.intervals.iter().find(|i| (2..=5).contains(*i)) {
        out.push(t);
    }
    // Seventh: the interval in (9..=11); fall back to the fifth.
    if let Some(&s) = chord.intervals.iter().find(|i| (9..=11).contains(*i)) {
        out.push(s);
    } else if chord.intervals.contains(&7) {
        out.push(7);
    }
    out
}

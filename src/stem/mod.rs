//! Note-event data model — the unit of musical information in Cadenza.
//!
//! Generation works in two time domains: beat-relative [`Event`]s produced by
//! the pattern synthesizer per (section, instrument), and absolute-time
//! [`Note`]s ("stems") produced by the stem builder and consumed by the
//! arranger, dynamics, and renderer. Each pipeline stage takes owned stems
//! and returns owned stems; nothing is shared mutably across stages.

pub mod build;

pub use build::build_stems_for_song;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The four built-in instrument roles.
///
/// `Ord` follows declaration order so stem maps iterate deterministically.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    Drums,
    Bass,
    Keys,
    Pads,
}

impl Instrument {
    /// All instruments in deterministic order.
    pub const ALL: [Instrument; 4] = [
        Instrument::Drums,
        Instrument::Bass,
        Instrument::Keys,
        Instrument::Pads,
    ];

    /// Fixed MIDI channel per role. Drums use the GM percussion channel.
    pub fn channel(self) -> u8 {
        match self {
            Instrument::Drums => 9,
            Instrument::Bass => 0,
            Instrument::Keys => 1,
            Instrument::Pads => 2,
        }
    }

    /// Lowercase name used in configs, RNG stream labels, and errors.
    pub fn name(self) -> &'static str {
        match self {
            Instrument::Drums => "drums",
            Instrument::Bass => "bass",
            Instrument::Keys => "keys",
            Instrument::Pads => "pads",
        }
    }

    /// Reverse of [`Instrument::channel`].
    pub fn from_channel(channel: u8) -> Option<Self> {
        match channel {
            9 => Some(Instrument::Drums),
            0 => Some(Instrument::Bass),
            1 => Some(Instrument::Keys),
            2 => Some(Instrument::Pads),
            _ => None,
        }
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A generation-time event, beat-relative to its section start.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Onset in beats from the start of the owning section.
    pub start: f64,
    /// Duration in beats.
    pub dur: f64,
    /// MIDI pitch 0–127.
    pub pitch: u8,
    /// MIDI velocity 1–127.
    pub velocity: u8,
    /// MIDI channel.
    pub channel: u8,
}

/// An absolute-time note in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    /// Onset in seconds from the start of the song.
    pub start: f64,
    /// Duration in seconds.
    pub dur: f64,
    /// MIDI pitch 0–127.
    pub pitch: u8,
    /// MIDI velocity 1–127.
    pub vel: u8,
    /// MIDI channel.
    pub channel: u8,
}

impl Note {
    /// End time in seconds.
    pub fn end(&self) -> f64 {
        self.start + self.dur
    }
}

/// Per-instrument note lists, keyed deterministically.
pub type Stems = BTreeMap<Instrument, Vec<Note>>;

/// Sort a note list by start time (then pitch for stability).
pub fn sort_notes(notes: &mut [Note]) {
    notes.sort_by(|a, b| {
        a.start
            .partial_cmp(&b.start)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.pitch.cmp(&b.pitch))
    });
}

/// Shift a pitch by octaves until it lies within `[low, high]`, clamping as
/// a last resort when the range spans less than an octave.
pub fn fold_into_register(pitch: u8, low: u8, high: u8) -> u8 {
    let mut p = pitch as i32;
    let (lo, hi) = (low as i32, high as i32);
    while p < lo && p + 12 <= 127 {
        p += 12;
        if p > hi {
            break;
        }
    }
    while p > hi && p - 12 >= 0 {
        p -= 12;
        if p < lo {
            break;
        }
    }
    p.clamp(lo, hi) as u8
}

/// Drop notes whose onsets land within `tolerance` seconds of an earlier
/// note of the same pitch. Input must be sorted by start time.
pub fn dedupe_collisions(notes: Vec<Note>, tolerance: f64) -> Vec<Note> {
    let mut out: Vec<Note> = Vec::with_capacity(notes.len());
    for note in notes {
        let dup = out
            .iter()
            .rev()
            .take_while(|p| note.start - p.start <= tolerance)
            .any(|p| p.pitch == note.pitch);
        if !dup {
            out.push(note);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instrument_order_is_declaration_order() {
        let mut v = vec![Instrument::Pads, Instrument::Drums, Instrument::Keys];
        v.sort();
        assert_eq!(
            v,
            vec![Instrument::Drums, Instrument::Keys, Instrument::Pads]
        );
    }

    #[test]
    fn channel_round_trip() {
        for inst in Instrument::ALL {
            assert_eq!(Instrument::from_channel(inst.channel()), Some(inst));
        }
        assert_eq!(Instrument::from_channel(5), None);
    }

    #[test]
    fn instrument_serde_lowercase() {
        let json = serde_json::to_string(&Instrument::Bass).unwrap();
        assert_eq!(json, "\"bass\"");
        let back: Instrument = serde_json::from_str("\"pads\"").unwrap();
        assert_eq!(back, Instrument::Pads);
    }

    #[test]
    fn fold_shifts_up_into_range() {
        assert_eq!(fold_into_register(30, 40, 60), 42);
    }

    #[test]
    fn fold_shifts_down_into_range() {
        assert_eq!(fold_into_register(75, 40, 60), 51);
    }

    #[test]
    fn fold_leaves_in_range_alone() {
        assert_eq!(fold_into_register(50, 40, 60), 50);
    }

    #[test]
    fn fold_clamps_when_no_octave_fits() {
        // Range narrower than an octave and pitch class outside it.
        let p = fold_into_register(47, 48, 52);
        assert!((48..=52).contains(&p));
    }

    #[test]
    fn sort_orders_by_start_then_pitch() {
        let mut notes = vec![
            Note { start: 1.0, dur: 0.5, pitch: 64, vel: 80, channel: 1 },
            Note { start: 0.0, dur: 0.5, pitch: 60, vel: 80, channel: 1 },
            Note { start: 1.0, dur: 0.5, pitch: 60, vel: 80, channel: 1 },
        ];
        sort_notes(&mut notes);
        assert_eq!(notes[0].start, 0.0);
        assert_eq!(notes[1].pitch, 60);
        assert_eq!(notes[2].pitch, 64);
    }

    #[test]
    fn dedupe_drops_overlapping_same_pitch() {
        let notes = vec![
            Note { start: 0.0, dur: 0.5, pitch: 60, vel: 80, channel: 1 },
            Note { start: 0.01, dur: 0.5, pitch: 60, vel: 70, channel: 1 },
            Note { start: 0.01, dur: 0.5, pitch: 64, vel: 70, channel: 1 },
        ];
        let out = dedupe_collisions(notes, 0.02);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].pitch, 60);
        assert_eq!(out[1].pitch, 64);
    }

    #[test]
    fn dedupe_keeps_separated_same_pitch() {
        let notes = vec![
            Note { start: 0.0, dur: 0.1, pitch: 60, vel: 80, channel: 1 },
            Note { start: 1.0, dur: 0.1, pitch: 60, vel: 80, channel: 1 },
        ];
        assert_eq!(dedupe_collisions(notes, 0.02).len(), 2);
    }
}

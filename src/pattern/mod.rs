//! Deterministic per-section, per-instrument event generation.
//!
//! Each (seed, section name, instrument) tuple owns an independent RNG
//! stream (see [`crate::rng`]), so regenerating one instrument never
//! perturbs another's randomness. Rhythms come from the Euclidean bucket
//! generator; the density curve maps to pulse counts per bar.

pub mod bass;
pub mod drums;
pub mod keys;
pub mod pads;

use crate::song::{Meter, Section, SongSpec};
use crate::stem::{Event, Instrument};
use crate::theory::{Chord, VoiceLines};

/// Euclidean rhythm via the bucket method: accumulate `pulses` per step and
/// emit an onset whenever the bucket reaches `steps`. Produces exactly
/// `pulses` onsets for `0 < pulses <= steps`; all rests otherwise.
pub fn euclidean(pulses: i64, steps: usize) -> Vec<bool> {
    let steps_i = steps as i64;
    if pulses <= 0 || pulses > steps_i {
        return vec![false; steps];
    }
    let mut pattern = Vec::with_capacity(steps);
    let mut bucket = 0i64;
    for _ in 0..steps {
        bucket += pulses;
        if bucket >= steps_i {
            bucket -= steps_i;
            pattern.push(true);
        } else {
            pattern.push(false);
        }
    }
    pattern
}

/// Map a density in [0, 1] to a pulse count: `round(1 + density * k)`,
/// clamped to the step count.
pub fn density_pulses(density: f64, k: f64, steps: usize) -> i64 {
    let pulses = (1.0 + density * k).round() as i64;
    pulses.clamp(1, steps as i64)
}

/// Everything a generator needs to know about one section.
pub struct SectionContext<'a> {
    pub spec: &'a SongSpec,
    pub section: &'a Section,
    /// Global bar index where this section starts.
    pub start_bar: u32,
    /// One chord per bar of this section.
    pub chords: &'a [Chord],
    /// SATB lines for the whole song, indexed by global bar.
    pub satb: &'a VoiceLines,
    pub density: f64,
    pub meter: Meter,
}

impl SectionContext<'_> {
    /// Bar length in quarter-note beats.
    pub fn beats_per_bar(&self) -> f64 {
        self.meter.beats_per_bar()
    }

    /// Sixteenth steps per bar.
    pub fn steps_per_bar(&self) -> usize {
        self.meter.steps_per_bar()
    }

    /// Beat length of one sixteenth step.
    pub fn step_beats(&self) -> f64 {
        self.beats_per_bar() / self.steps_per_bar() as f64
    }
}

/// Generate beat-relative events for one instrument over one section.
pub fn generate_section(ctx: &SectionContext<'_>, instrument: Instrument) -> Vec<Event> {
    match instrument {
        Instrument::Drums => drums::generate(ctx),
        Instrument::Bass => bass::generate(ctx),
        Instrument::Keys => keys::generate(ctx),
        Instrument::Pads => pads::generate(ctx),
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::song::tests::two_bar_spec;
    use crate::theory::{generate_satb, parse_progression};

    /// Run one generator over the standard two-bar C→F test section.
    pub(crate) fn generate_two_bar(instrument: Instrument, density: f64) -> Vec<Event> {
        let mut spec = two_bar_spec();
        spec.density.insert("A".into(), density);
        let chords = parse_progression(&["C", "F"]).unwrap();
        let satb = generate_satb(&chords);
        let ctx = SectionContext {
            spec: &spec,
            section: &spec.sections[0],
            start_bar: 0,
            chords: &chords,
            satb: &satb,
            density,
            meter: spec.parsed_meter().unwrap(),
        };
        generate_section(&ctx, instrument)
    }
}

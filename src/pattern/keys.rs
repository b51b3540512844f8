//! Keys generator — block chords with light probabilistic embellishment.
//!
//! Block chords land on bar starts using the bar's upper SATB voices.
//! Embellishments are short off-beat events; the stem builder later turns
//! bar-start events into stabs or arpeggios and refines embellishment
//! pitches against the tension policy.

use rand::Rng;

use super::SectionContext;
use crate::rng;
use crate::stem::{Event, Instrument};

const CHANNEL: u8 = 1;

pub fn generate(ctx: &SectionContext<'_>) -> Vec<Event> {
    let mut rng = rng::stream(
        ctx.spec.seed,
        &[ctx.section.name.as_str(), Instrument::Keys.name()],
    );
    let beats_per_bar = ctx.beats_per_bar();
    let step_beats = ctx.step_beats();
    let steps = ctx.steps_per_bar();
    let mut events = Vec::new();

    for bar in 0..ctx.section.length_bars {
        let bar_start = bar as f64 * beats_per_bar;
        let global_bar = (ctx.start_bar + bar) as usize;
        let [soprano, alto, tenor, _bass] = ctx.satb.top_down(global_bar);

        // Block chord: upper three voices, half-bar sustain.
        for pitch in [tenor, alto, soprano] {
            events.push(Event {
                start: bar_start,
                dur: beats_per_bar / 2.0,
                pitch,
                velocity: 84,
                channel: CHANNEL,
            });
        }

        // Light embellishment: an off-beat eighth, more likely when dense.
        if rng.gen_bool((ctx.density * 0.5).clamp(0.0, 1.0)) {
            let step = (2 * rng.gen_range(steps / 4..steps / 2) + 1).min(steps - 1);
            events.push(Event {
                start: bar_start + step as f64 * step_beats,
                dur: step_beats,
                pitch: soprano,
                velocity: 72,
                channel: CHANNEL,
            });
        }
    }
    events
}

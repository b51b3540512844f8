//! Pads generator — one sustained chord per bar, probabilistically thinned
//! at low density. Merging of identical consecutive voicings and inner-voice
//! dropping happen in the stem builder.

use rand::Rng;

use super::SectionContext;
use crate::rng;
use crate::stem::{Event, Instrument};

const CHANNEL: u8 = 2;

pub fn generate(ctx: &SectionContext<'_>) -> Vec<Event> {
    let mut rng = rng::stream(
        ctx.spec.seed,
        &[ctx.section.name.as_str(), Instrument::Pads.name()],
    );
    let beats_per_bar = ctx.beats_per_bar();
    let mut events = Vec::new();

    for bar in 0..ctx.section.length_bars {
        // Thin sparse sections: the quieter the density, the more bars rest.
        if ctx.density < 0.3 {
            let skip_prob = (0.3 - ctx.density) / 0.3 * 0.5;
            if rng.gen_bool(skip_prob) {
                continue;
            }
        }

        let bar_start = bar as f64 * beats_per_bar;
        let global_bar = (ctx.start_bar + bar) as usize;
        for pitch in ctx.satb.voicing_at(global_bar) {
            events.push(Event {
                start: bar_start,
                dur: beats_per_bar,
                pitch,
                velocity: 70,
                channel: CHANNEL,
            });
        }
    }
    events
}

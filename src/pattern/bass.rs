//! Bass generator — Euclidean root-note onsets.
//!
//! Pitches here are provisional chord roots; the stem builder refines them
//! into nearest-chord-tone and chromatic-approach lines.

use super::{density_pulses, euclidean, SectionContext};
use crate::stem::Event;

const CHANNEL: u8 = 0;

pub fn generate(ctx: &SectionContext<'_>) -> Vec<Event> {
    let steps = ctx.steps_per_bar();
    let step_beats = ctx.step_beats();
    let pattern = euclidean(density_pulses(ctx.density, 5.0, steps), steps);
    let onsets: Vec<usize> = pattern
        .iter()
        .enumerate()
        .filter_map(|(i, &hit)| hit.then_some(i))
        .collect();

    let mut events = Vec::new();
    for (bar, chord) in ctx.chords.iter().enumerate() {
        let bar_start = bar as f64 * ctx.beats_per_bar();
        // Provisional placement: root in the octave around E1-E2.
        let pitch = 28 + chord.root;
        for (k, &step) in onsets.iter().enumerate() {
            // Sustain to the next onset, capped at a half bar.
            let next = onsets
                .get(k + 1)
                .copied()
                .unwrap_or(steps);
            let dur = ((next - step) as f64 * step_beats).min(ctx.beats_per_bar() / 2.0);
            events.push(Event {
                start: bar_start + step as f64 * step_beats,
                dur,
                pitch,
                velocity: 92,
                channel: CHANNEL,
            });
        }
    }
    events
}

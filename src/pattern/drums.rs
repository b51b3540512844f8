//! Drum grid generator — kick/snare/hat patterns with probabilistic ghost
//! fills, all drawn from the section's drum stream.

use rand::Rng;

use super::{density_pulses, euclidean, SectionContext};
use crate::rng;
use crate::stem::{Event, Instrument};

/// GM-style percussion pitches used throughout the engine.
pub const KICK: u8 = 36;
pub const SNARE: u8 = 38;
pub const CLOSED_HAT: u8 = 42;
pub const OPEN_HAT: u8 = 46;
pub const TOM_LOW: u8 = 45;
pub const TOM_MID: u8 = 47;
pub const TOM_HIGH: u8 = 50;
pub const CRASH: u8 = 49;
/// Reverse-sweep riser used by cadence FX.
pub const SWEEP: u8 = 54;

const CHANNEL: u8 = 9;

pub fn generate(ctx: &SectionContext<'_>) -> Vec<Event> {
    let mut rng = rng::stream(
        ctx.spec.seed,
        &[ctx.section.name.as_str(), Instrument::Drums.name()],
    );
    let steps = ctx.steps_per_bar();
    let step_beats = ctx.step_beats();
    let mut events = Vec::new();

    let kick_pattern = euclidean(density_pulses(ctx.density, 3.0, steps), steps);
    let hat_stride = if ctx.density >= 0.7 {
        1
    } else if ctx.density >= 0.35 {
        2
    } else {
        4
    };
    // Backbeat: snare on every second quarter-note beat.
    let snare_steps: Vec<usize> = (0..steps).filter(|s| s % 8 == 4).collect();

    for bar in 0..ctx.section.length_bars {
        let bar_start = bar as f64 * ctx.beats_per_bar();

        for (step, &hit) in kick_pattern.iter().enumerate() {
            if hit {
                events.push(Event {
                    start: bar_start + step as f64 * step_beats,
                    dur: step_beats,
                    pitch: KICK,
                    velocity: 104,
                    channel: CHANNEL,
                });
            }
        }

        for &step in &snare_steps {
            events.push(Event {
                start: bar_start + step as f64 * step_beats,
                dur: step_beats,
                pitch: SNARE,
                velocity: 96,
                channel: CHANNEL,
            });
        }

        for step in (0..steps).step_by(hat_stride) {
            // Accent hats that land on quarter-note beats.
            let velocity = if step % 4 == 0 { 78 } else { 60 };
            events.push(Event {
                start: bar_start + step as f64 * step_beats,
                dur: step_beats * 0.5,
                pitch: CLOSED_HAT,
                velocity,
                channel: CHANNEL,
            });
        }

        // Probabilistic ghost fill: a few quiet snare hits late in the bar.
        if rng.gen_bool((ctx.density * 0.3).clamp(0.0, 1.0)) {
            let count = rng.gen_range(1..=3);
            for _ in 0..count {
                let step = rng.gen_range(steps / 2..steps);
                events.push(Event {
                    start: bar_start + step as f64 * step_beats,
                    dur: step_beats * 0.5,
                    pitch: SNARE,
                    velocity: rng.gen_range(30..=48),
                    channel: CHANNEL,
                });
            }
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::testutil::generate_two_bar;

    fn ctx_events(density: f64) -> Vec<Event> {
        generate_two_bar(Instrument::Drums, density)
    }

    #[test]
    fn emits_kick_snare_and_hats() {
        let events = ctx_events(0.6);
        assert!(events.iter().any(|e| e.pitch == KICK));
        assert!(events.iter().any(|e| e.pitch == SNARE));
        assert!(events.iter().any(|e| e.pitch == CLOSED_HAT));
    }

    #[test]
    fn backbeat_on_beats_two_and_four() {
        let events = ctx_events(0.5);
        let strong_snares: Vec<f64> = events
            .iter()
            .filter(|e| e.pitch == SNARE && e.velocity >= 90)
            .map(|e| e.start)
            .collect();
        // Bars are 4 beats; backbeats at beats 1 and 3 of each bar.
        assert!(strong_snares.contains(&1.0));
        assert!(strong_snares.contains(&3.0));
        assert!(strong_snares.contains(&5.0));
        assert!(strong_snares.contains(&7.0));
    }

    #[test]
    fn higher_density_means_more_hats() {
        let sparse = ctx_events(0.1)
            .iter()
            .filter(|e| e.pitch == CLOSED_HAT)
            .count();
        let busy = ctx_events(0.9)
            .iter()
            .filter(|e| e.pitch == CLOSED_HAT)
            .count();
        assert!(busy > sparse, "busy {busy} <= sparse {sparse}");
    }

    #[test]
    fn deterministic_per_seed() {
        assert_eq!(ctx_events(0.6), ctx_events(0.6));
    }

    #[test]
    fn all_events_within_section() {
        let events = ctx_events(0.8);
        for e in &events {
            assert!(e.start >= 0.0 && e.start < 8.0, "event at {}", e.start);
        }
    }

    #[test]
    fn all_on_drum_channel() {
        assert!(ctx_events(0.5).iter().all(|e| e.channel == 9));
    }
}

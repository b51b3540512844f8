//! Dynamics — section velocity curves, per-instrument velocity jitter, and
//! drum articulation (halved durations, ghost snares).

use rand::Rng;

use crate::error::Result;
use crate::pattern::drums::SNARE;
use crate::rng;
use crate::song::SongSpec;
use crate::stem::{sort_notes, Instrument, Note, Stems};

/// Seconds a ghost snare precedes the hit it shadows.
const GHOST_LEAD_SECS: f64 = 0.05;
const GHOST_PROBABILITY: f64 = 0.35;

/// Velocity offset in dB for the section containing a bar, keyed by name.
fn section_offset_db(spec: &SongSpec, bar: u32) -> f64 {
    let Some((section, _)) = spec.section_at_bar(bar) else {
        return 0.0;
    };
    let name = section.name.to_lowercase();
    if name.contains("chorus") {
        3.0
    } else if name.contains("verse") {
        -6.0
    } else if name.contains("bridge") {
        -3.0
    } else if name.contains("intro") || name.contains("outro") {
        -4.0
    } else {
        0.0
    }
}

/// Apply the section velocity curve and per-instrument jitter; shorten drum
/// hits and probabilistically shadow snares with ghost notes.
pub fn apply_dynamics(spec: &SongSpec, stems: Stems, seed: u64) -> Result<Stems> {
    let bar_secs = spec.seconds_per_bar()?;
    let last_bar = spec.total_bars().saturating_sub(1);

    let mut out = Stems::new();
    for (instrument, notes) in stems {
        let mut jitter = rng::stream(seed, &["dynamics", instrument.name()]);
        let mut shaped = Vec::with_capacity(notes.len());
        let mut ghosts = Vec::new();

        for mut note in notes {
            let bar = ((note.start / bar_secs) as u32).min(last_bar);
            let mult = 10f64.powf(section_offset_db(spec, bar) / 20.0);
            let wobble = jitter.gen_range(-4i32..=4);
            note.vel =
                ((note.vel as f64 * mult).round() as i32 + wobble).clamp(1, 127) as u8;

            if instrument == Instrument::Drums {
                note.dur *= 0.5;
                if note.pitch == SNARE && jitter.gen_bool(GHOST_PROBABILITY) {
                    ghosts.push(Note {
                        start: (note.start - GHOST_LEAD_SECS).max(0.0),
                        dur: note.dur,
                        pitch: SNARE,
                        vel: (note.vel / 3).max(1),
                        channel: note.channel,
                    });
                }
            }
            shaped.push(note);
        }

        shaped.extend(ghosts);
        sort_notes(&mut shaped);
        out.insert(instrument, shaped);
    }
    Ok(out)
}

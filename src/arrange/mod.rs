//! Arranger — cadence fills and FX, section looping to a target duration,
//! and outro handling.
//!
//! Operates on absolute-time stems. Every stage consumes and returns owned
//! note lists and re-sorts each instrument by onset before handing off.

use log::{debug, warn};
use rand::Rng;

use crate::error::Result;
use crate::pattern::drums::{SNARE, SWEEP, TOM_HIGH, TOM_LOW, TOM_MID};
use crate::rng;
use crate::song::{CadenceKind, Section, SongSpec, StyleConfig};
use crate::stem::{sort_notes, Instrument, Note, Stems};
use crate::theory::parse_chord_symbol;

/// Accepted relative error when looping toward a target duration.
const DURATION_TOLERANCE: f64 = 0.02;

/// Arrange generated stems: cadence fills, style FX, looping to the spec's
/// target duration, and the configured outro. Extends `spec.sections` when
/// looping appends sections.
pub fn arrange(
    spec: &mut SongSpec,
    mut stems: Stems,
    style: &StyleConfig,
    seed: u64,
) -> Result<Stems> {
    let bar_secs = spec.seconds_per_bar()?;
    let steps_per_bar = spec.parsed_meter()?.steps_per_bar();
    let mut fill_rng = rng::stream(seed, &["arrange"]);

    if style.fills {
        apply_cadence_fills(spec, &mut stems, style, bar_secs, steps_per_bar, &mut fill_rng)?;
    }
    apply_section_fx(spec, &mut stems, style, bar_secs)?;
    resort(&mut stems);

    loop_to_target(spec, &mut stems, bar_secs);
    resort(&mut stems);

    if let Some(outro) = spec.outro {
        apply_outro(spec, &mut stems, outro, bar_secs);
        resort(&mut stems);
    }

    Ok(stems)
}

fn resort(stems: &mut Stems) {
    for notes in stems.values_mut() {
        sort_notes(notes);
    }
}

/// Per declared cadence bar: a snare on the last subdivision, a style-gated
/// tom roll and noise sweep on full cadences, and a chromatic bass approach
/// into the next bar's first chord tone.
fn apply_cadence_fills(
    spec: &SongSpec,
    stems: &mut Stems,
    style: &StyleConfig,
    bar_secs: f64,
    steps_per_bar: usize,
    fill_rng: &mut rand_chacha::ChaCha8Rng,
) -> Result<()> {
    let step_secs = bar_secs / steps_per_bar as f64;

    for cadence in &spec.cadences {
        let bar_start = cadence.bar as f64 * bar_secs;
        let last_step = bar_start + (steps_per_bar - 1) as f64 * step_secs;

        if let Some(drums) = stems.get_mut(&Instrument::Drums) {
            drums.push(Note {
                start: last_step,
                dur: step_secs,
                pitch: SNARE,
                vel: (92 + fill_rng.gen_range(-5i32..=5)).clamp(1, 127) as u8,
                channel: Instrument::Drums.channel(),
            });

            if cadence.kind == CadenceKind::Full {
                if style.tom_rolls && steps_per_bar >= 4 {
                    for (k, pitch) in [TOM_HIGH, TOM_MID, TOM_LOW].into_iter().enumerate() {
                        let step = steps_per_bar - 4 + k;
                        drums.push(Note {
                            start: bar_start + step as f64 * step_secs,
                            dur: step_secs,
                            pitch,
                            vel: (80 + fill_rng.gen_range(-6i32..=6)).clamp(1, 127) as u8,
                            channel: Instrument::Drums.channel(),
                        });
                    }
                }
                if style.sweeps {
                    drums.push(Note {
                        start: bar_start,
                        dur: bar_secs,
                        pitch: SWEEP,
                        vel: 70,
                        channel: Instrument::Drums.channel(),
                    });
                }
            }
        }

        // Chromatic approach into the next bar's first chord tone.
        if let Some(symbol) = spec.chord_symbol_at_bar(cadence.bar + 1) {
            let chord = parse_chord_symbol(symbol)?;
            let register = spec.register_for(Instrument::Bass);
            let target =
                crate::stem::fold_into_register(chord.root + 36, register.low, register.high);
            let approach = target.saturating_sub(1).clamp(register.low, register.high);
            if let Some(bass) = stems.get_mut(&Instrument::Bass) {
                bass.push(Note {
                    start: last_step,
                    dur: step_secs,
                    pitch: approach,
                    vel: 88,
                    channel: Instrument::Bass.channel(),
                });
            }
        }
    }
    Ok(())
}

/// Style-gated section FX: a reverse-pad swell in the bar before
/// chorus-named sections, and a drum drop in the first bar of bridge-named
/// sections.
fn apply_section_fx(
    spec: &SongSpec,
    stems: &mut Stems,
    style: &StyleConfig,
    bar_secs: f64,
) -> Result<()> {
    let mut start_bar = 0u32;
    for section in &spec.sections {
        let lower = section.name.to_lowercase();

        if style.swell_before_chorus && lower.contains("chorus") && start_bar > 0 {
            let swell_bar = start_bar - 1;
            let symbol = spec
                .chord_symbol_at_bar(swell_bar)
                .expect("bar inside song");
            let chord = parse_chord_symbol(symbol)?;
            let register = spec.register_for(Instrument::Pads);
            let root =
                crate::stem::fold_into_register(chord.root + 60, register.low, register.high);
            if let Some(pads) = stems.get_mut(&Instrument::Pads) {
                pads.push(Note {
                    start: swell_bar as f64 * bar_secs,
                    dur: bar_secs,
                    pitch: root,
                    vel: 45,
                    channel: Instrument::Pads.channel(),
                });
            }
        }

        if style.drop_first_bridge_bar && lower.contains("bridge") {
            let from = start_bar as f64 * bar_secs;
            let to = from + bar_secs;
            if let Some(drums) = stems.get_mut(&Instrument::Drums) {
                let before = drums.len();
                drums.retain(|n| n.start < from || n.start >= to);
                debug!(
                    "dropped {} drum notes in first bar of {:?}",
                    before - drums.len(),
                    section.name
                );
            }
        }

        start_bar += section.length_bars;
    }
    Ok(())
}

/// Append whole template sections (cycling) with time-shifted note copies
/// until the projected duration is within tolerance of the target. Never
/// overruns: when even the smallest section would overshoot, stop short and
/// leave the residual to the outro.
fn loop_to_target(spec: &mut SongSpec, stems: &mut Stems, bar_secs: f64) {
    let Some(minutes) = spec.target_minutes else {
        return;
    };
    let target = minutes * 60.0;

    // Template layout: first occurrence time range per original section.
    let template: Vec<Section> = spec.sections.clone();
    let mut starts = Vec::with_capacity(template.len());
    let mut acc = 0u32;
    for section in &template {
        starts.push(acc as f64 * bar_secs);
        acc += section.length_bars;
    }
    let ranges: Vec<(f64, f64)> = template
        .iter()
        .zip(&starts)
        .map(|(s, &t0)| (t0, t0 + s.length_bars as f64 * bar_secs))
        .collect();

    let smallest = template
        .iter()
        .enumerate()
        .min_by_key(|(_, s)| s.length_bars)
        .map(|(i, _)| i)
        .expect("validated specs have sections");

    let mut total = spec.total_bars() as f64 * bar_secs;
    if total > target * (1.0 + DURATION_TOLERANCE) {
        warn!(
            "song is already {total:.1}s, longer than the {target:.1}s target; not trimming"
        );
        return;
    }

    let mut cycle = 0usize;
    let mut appended = 0usize;
    while total < target * (1.0 - DURATION_TOLERANCE) {
        let mut idx = cycle % template.len();
        let mut len = template[idx].length_bars as f64 * bar_secs;
        if total + len > target * (1.0 + DURATION_TOLERANCE) {
            // Fall back to the smallest section, clamped to never overrun.
            idx = smallest;
            len = template[idx].length_bars as f64 * bar_secs;
            if total + len > target * (1.0 + DURATION_TOLERANCE) {
                break;
            }
        }

        let (src_start, src_end) = ranges[idx];
        let shift = total - src_start;
        for notes in stems.values_mut() {
            let copies: Vec<Note> = notes
                .iter()
                .filter(|n| n.start >= src_start && n.start < src_end)
                .map(|n| Note {
                    start: n.start + shift,
                    ..n.clone()
                })
                .collect();
            notes.extend(copies);
        }
        spec.sections.push(template[idx].clone());
        total += len;
        cycle += 1;
        appended += 1;
    }
    if appended > 0 {
        debug!("looped {appended} sections to reach {total:.1}s of {target:.1}s");
    }
}

/// Apply the configured outro at the (possibly extended) end of the song.
fn apply_outro(
    spec: &SongSpec,
    stems: &mut Stems,
    outro: crate::song::OutroConfig,
    bar_secs: f64,
) {
    use crate::song::OutroConfig;

    let total = spec.total_bars() as f64 * bar_secs;

    match outro {
        OutroConfig::Ritard { factor } => {
            let final_bar = total - bar_secs;
            // Absorb any residual target duration by slowing further.
            let residual = spec
                .target_minutes
                .map(|m| (m * 60.0 - total).max(0.0))
                .unwrap_or(0.0);
            let factor = factor.max(1.0).max(1.0 + residual / bar_secs);

            for notes in stems.values_mut() {
                for note in notes.iter_mut() {
                    if note.start >= final_bar {
                        note.start = final_bar + (note.start - final_bar) * factor;
                        note.dur *= factor;
                    } else if note.end() > final_bar {
                        // Proportionally extend notes overlapping the boundary.
                        note.dur += (note.end() - final_bar) * (factor - 1.0);
                    }
                }
            }
            debug!("ritard outro with factor {factor:.2}");
        }
        OutroConfig::HitAndHold { hold_secs } => {
            for (instrument, notes) in stems.iter_mut() {
                if *instrument == Instrument::Drums {
                    notes.push(Note {
                        start: total,
                        dur: hold_secs,
                        pitch: crate::pattern::drums::CRASH,
                        vel: 110,
                        channel: Instrument::Drums.channel(),
                    });
                    notes.push(Note {
                        start: total,
                        dur: hold_secs,
                        pitch: crate::pattern::drums::KICK,
                        vel: 112,
                        channel: Instrument::Drums.channel(),
                    });
                } else if let Some(last) = notes
                    .iter_mut()
                    .max_by(|a, b| a.start.partial_cmp(&b.start).unwrap())
                {
                    last.dur = (total + hold_secs - last.start).max(last.dur);
                }
            }
            debug!("hit-and-hold outro, {hold_secs:.1}s");
        }
    }
}

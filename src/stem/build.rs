//! Stem builder — turns beat-relative pattern events into absolute-time
//! notes.
//!
//! Per instrument this applies melodic refinement (bass lines, keys stabs
//! and arpeggios, pad merging), swing, micro-timing and velocity
//! humanization, register folding, and collision handling. Humanization
//! draws from one (seed, instrument) stream per instrument so instruments
//! never perturb each other.

use std::time::Duration;

use log::debug;
use rand::Rng;

use crate::error::Result;
use crate::pattern::{self, SectionContext};
use crate::phrase::{PhraseGenerator, PhraseRequest};
use crate::rng;
use crate::song::{Register, SongSpec};
use crate::stem::{
    dedupe_collisions, fold_into_register, sort_notes, Event, Instrument, Note, Stems,
};
use crate::theory::{generate_satb, guide_tones, parse_note_name, parse_progression, Chord};

/// Onsets closer than this many seconds count as colliding.
const COLLISION_TOLERANCE: f64 = 0.02;

/// Time budget handed to an injected phrase generator, per request.
const PHRASE_BUDGET: Duration = Duration::from_millis(250);

/// Arpeggiate keys bars at or above this density.
const ARP_DENSITY: f64 = 0.65;

/// Drop pad inner voices below this density.
const THIN_PADS_DENSITY: f64 = 0.4;

/// Build all instrument stems for a song. Deterministic for a given
/// (spec, seed); every note lies within its instrument's register.
pub fn build_stems_for_song(spec: &SongSpec, seed: u64) -> Result<Stems> {
    build_stems_with_strategy(spec, seed, None)
}

/// Like [`build_stems_for_song`], but lets an injected phrase generator
/// produce section events; any strategy error falls back to the
/// algorithmic generator for that (instrument, section).
pub fn build_stems_with_strategy(
    spec: &SongSpec,
    seed: u64,
    strategy: Option<&dyn PhraseGenerator>,
) -> Result<Stems> {
    spec.validate()?;
    let meter = spec.parsed_meter()?;
    let symbols = spec.harmony_timeline();
    let chords = parse_progression(&symbols)?;
    let satb = generate_satb(&chords);
    let key_pc = parse_note_name(&spec.key)?;
    let spb = spec.seconds_per_beat();
    let bar_beats = meter.beats_per_bar();
    let step_beats = bar_beats / meter.steps_per_bar() as f64;

    let mut stems = Stems::new();
    for instrument in Instrument::ALL {
        let mut human = rng::stream(seed, &["humanize", instrument.name()]);
        let register = spec.register_for(instrument);
        let mut notes: Vec<Note> = Vec::new();
        let mut prev_bass: Option<u8> = None;
        let mut start_bar = 0u32;

        for section in &spec.sections {
            let bar_range = start_bar as usize..(start_bar + section.length_bars) as usize;
            let ctx = SectionContext {
                spec,
                section,
                start_bar,
                chords: &chords[bar_range],
                satb: &satb,
                density: spec.density_for(&section.name),
                meter,
            };

            let events = events_for(&ctx, instrument, strategy);
            let events = match instrument {
                Instrument::Bass => refine_bass(&ctx, events, &mut prev_bass, register),
                Instrument::Keys => refine_keys(&ctx, events, key_pc),
                Instrument::Pads => refine_pads(&ctx, events),
                Instrument::Drums => events,
            };

            let section_offset_beats = start_bar as f64 * bar_beats;
            for event in &events {
                let mut start_beats = event.start;
                // Swing: delay odd-indexed sixteenth steps.
                if spec.swing > 0.0 {
                    let step_idx = (event.start / step_beats).round();
                    let on_grid = (event.start - step_idx * step_beats).abs() < 1e-6;
                    if on_grid && (step_idx as i64) % 2 == 1 {
                        start_beats += spec.swing * step_beats;
                    }
                }

                let time_jitter = human.gen_range(-1.0..1.0) * timing_jitter_secs(instrument);
                let vel_jitter = human.gen_range(-6i32..=6);

                let start = ((section_offset_beats + start_beats) * spb + time_jitter).max(0.0);
                let vel = (event.velocity as i32 + vel_jitter).clamp(1, 127) as u8;
                let pitch = fold_into_register(event.pitch, register.low, register.high);
                notes.push(Note {
                    start,
                    dur: (event.dur * spb).max(0.01),
                    pitch,
                    vel,
                    channel: instrument.channel(),
                });
            }
            start_bar += section.length_bars;
        }

        sort_notes(&mut notes);
        let notes = dedupe_collisions(notes, COLLISION_TOLERANCE);
        debug!("{instrument}: {} notes after build", notes.len());
        stems.insert(instrument, notes);
    }

    resolve_bass_key_unisons(&mut stems, seed);
    Ok(stems)
}

fn events_for(
    ctx: &SectionContext<'_>,
    instrument: Instrument,
    strategy: Option<&dyn PhraseGenerator>,
) -> Vec<Event> {
    if let Some(strategy) = strategy {
        let request = PhraseRequest {
            instrument,
            section: ctx.section,
            chords: ctx.chords,
            density: ctx.density,
            meter: ctx.meter,
            time_budget: PHRASE_BUDGET,
        };
        match strategy.generate(&request) {
            Ok(events) => return events,
            Err(err) => debug!(
                "phrase strategy fell back for {instrument} in {:?}: {err}",
                ctx.section.name
            ),
        }
    }
    pattern::generate_section(ctx, instrument)
}

/// Micro-timing spread per instrument, seconds. Drums stay tight; pads may
/// drift the most.
fn timing_jitter_secs(instrument: Instrument) -> f64 {
    match instrument {
        Instrument::Drums => 0.004,
        Instrument::Bass => 0.008,
        Instrument::Keys => 0.010,
        Instrument::Pads => 0.015,
    }
}

/// The chord tone inside `[low, high]` nearest to `target`; ties prefer the
/// lower pitch.
fn nearest_chord_tone(chord: &Chord, target: u8, low: u8, high: u8) -> u8 {
    let pcs = chord.pitch_classes();
    let mut best = None::<(u32, u8)>;
    for pitch in low..=high {
        if pcs.contains(&(pitch % 12)) {
            let dist = (pitch as i32 - target as i32).unsigned_abs();
            if best.map_or(true, |(d, _)| dist < d) {
                best = Some((dist, pitch));
            }
        }
    }
    // A register always contains at least one octave placement after
    // folding; fall back to the folded root if the window is degenerate.
    best.map(|(_, p)| p)
        .unwrap_or_else(|| fold_into_register(chord.root + 36, low, high))
}

/// Bass line refinement: nearest chord tone or chromatic approach relative
/// to the previous note, with >7-semitone leaps octave-corrected toward the
/// previous pitch. The first note starts nearest the register center.
fn refine_bass(
    ctx: &SectionContext<'_>,
    mut events: Vec<Event>,
    prev: &mut Option<u8>,
    register: Register,
) -> Vec<Event> {
    let bar_beats = ctx.beats_per_bar();
    let center = (register.low + register.high) / 2;

    for event in events.iter_mut() {
        let bar = ((event.start / bar_beats) as usize).min(ctx.chords.len().saturating_sub(1));
        let chord = &ctx.chords[bar];

        let pitch = match *prev {
            None => nearest_chord_tone(chord, center, register.low, register.high),
            Some(p) => {
                let mut t = nearest_chord_tone(chord, p, register.low, register.high);
                // Octave-correct wide leaps toward the previous pitch.
                while (t as i32 - p as i32).abs() > 7 {
                    if t > p && t >= 12 {
                        t -= 12;
                    } else if t < p && t as i32 + 12 <= 127 {
                        t += 12;
                    } else {
                        break;
                    }
                }
                // Chromatic approach on off-beat onsets still a step away.
                let off_beat = event.start.fract() > 1e-6;
                if off_beat && (t as i32 - p as i32).abs() >= 2 {
                    if t > p {
                        t -= 1;
                    } else {
                        t += 1;
                    }
                }
                t
            }
        };

        event.pitch = pitch;
        *prev = Some(pitch);
    }
    events
}

/// Keys refinement: bar-start block chords become arpeggios at high
/// density; off-beat embellishments become 3rd/7th + tension stabs; strong
/// beats suppress duplicated leading-tone emphasis.
fn refine_keys(ctx: &SectionContext<'_>, events: Vec<Event>, key_pc: u8) -> Vec<Event> {
    let bar_beats = ctx.beats_per_bar();
    let leading_tone = (key_pc + 11) % 12;
    let arpeggiate = ctx.density >= ARP_DENSITY;
    let mut out: Vec<Event> = Vec::with_capacity(events.len());
    let mut arp_done = vec![false; ctx.section.length_bars as usize];

    for event in events {
        let bar = ((event.start / bar_beats) as usize).min(ctx.chords.len().saturating_sub(1));
        let on_bar_start = (event.start - bar as f64 * bar_beats).abs() < 1e-6;

        if on_bar_start && arpeggiate {
            // Replace the whole block chord with one arpeggio per bar,
            // cycling SATB voices top-down in eighth notes.
            if !arp_done[bar] {
                arp_done[bar] = true;
                let voices = ctx.satb.top_down(ctx.start_bar as usize + bar);
                let count = (bar_beats * 2.0) as usize;
                for k in 0..count {
                    out.push(Event {
                        start: bar as f64 * bar_beats + k as f64 * 0.5,
                        dur: 0.5,
                        pitch: voices[k % voices.len()],
                        velocity: 80,
                        channel: event.channel,
                    });
                }
            }
            continue;
        }

        if on_bar_start {
            out.push(event);
            continue;
        }

        // Embellishment → stab cluster: 3rd/7th plus tension intervals.
        let chord = &ctx.chords[bar];
        let root_ref = 60 + ((chord.root as i32 + 6) % 12 - 6);
        let mut pitches: Vec<u8> = guide_tones(chord)
            .into_iter()
            .map(|t| (root_ref + t as i32).clamp(0, 127) as u8)
            .collect();
        for &tension in &ctx.spec.tension.intervals {
            pitches.push((root_ref + tension as i32).clamp(0, 127) as u8);
        }
        pitches.dedup();
        for pitch in pitches {
            out.push(Event {
                pitch,
                ..event.clone()
            });
        }
    }

    suppress_leading_tone_duplicates(ctx, out, leading_tone)
}

/// On strong beats, keep only the first note of any duplicated leading-tone
/// pitch class sounding at the same onset.
fn suppress_leading_tone_duplicates(
    ctx: &SectionContext<'_>,
    events: Vec<Event>,
    leading_tone: u8,
) -> Vec<Event> {
    let mut out: Vec<Event> = Vec::with_capacity(events.len());
    for event in events {
        let beat = event.start % ctx.beats_per_bar();
        let strong = beat.fract() < 1e-6 && (beat as i64) % 2 == 0;
        if strong && event.pitch % 12 == leading_tone {
            let already = out.iter().any(|e| {
                (e.start - event.start).abs() < 1e-6 && e.pitch % 12 == leading_tone
            });
            if already {
                continue;
            }
        }
        out.push(event);
    }
    out
}

/// Pads refinement: below the thinning density keep only the outer voices;
/// merge consecutive bars that share an identical voicing into single
/// sustained notes.
fn refine_pads(ctx: &SectionContext<'_>, events: Vec<Event>) -> Vec<Event> {
    let bar_beats = ctx.beats_per_bar();

    // Bucket the section's events per bar.
    let mut bars: Vec<(f64, Vec<Event>)> = Vec::new();
    for event in events {
        let same_bar = bars
            .last()
            .is_some_and(|(start, _)| (event.start - *start).abs() < 1e-6);
        if same_bar {
            bars.last_mut().expect("checked non-empty").1.push(event);
        } else {
            bars.push((event.start, vec![event]));
        }
    }

    // Thin inner voices at low density.
    if ctx.density < THIN_PADS_DENSITY {
        for (_, bucket) in bars.iter_mut() {
            if bucket.len() > 2 {
                bucket.sort_by_key(|e| e.pitch);
                let hi = bucket.pop();
                bucket.drain(1..);
                bucket.extend(hi);
            }
        }
    }

    // Merge runs of identical consecutive voicings.
    let mut out: Vec<Event> = Vec::new();
    let mut run: Option<(Vec<Event>, f64)> = None; // (notes, end beat)
    for (start, mut bucket) in bars {
        bucket.sort_by_key(|e| e.pitch);
        let continues = run.as_ref().is_some_and(|(notes, end)| {
            (*end - start).abs() < 1e-6
                && notes
                    .iter()
                    .map(|e| e.pitch)
                    .eq(bucket.iter().map(|e| e.pitch))
        });
        if continues {
            let (notes, end) = run.as_mut().expect("run exists when continuing");
            for note in notes.iter_mut() {
                note.dur += bar_beats;
            }
            *end = start + bar_beats;
        } else {
            if let Some((notes, _)) = run.take() {
                out.extend(notes);
            }
            run = Some((bucket, start + bar_beats));
        }
    }
    if let Some((notes, _)) = run.take() {
        out.extend(notes);
    }
    out
}

/// Nudge keys onsets that land in unison with a sounding bass note, rather
/// than deleting either note.
fn resolve_bass_key_unisons(stems: &mut Stems, seed: u64) {
    let bass: Vec<Note> = stems
        .get(&Instrument::Bass)
        .cloned()
        .unwrap_or_default();
    let Some(keys) = stems.get_mut(&Instrument::Keys) else {
        return;
    };

    let mut nudge = rng::stream(seed, &["unison"]);
    let mut moved = 0usize;
    for note in keys.iter_mut() {
        let unison = bass.iter().any(|b| {
            b.pitch == note.pitch
                && note.start >= b.start - COLLISION_TOLERANCE
                && note.start <= b.end() + COLLISION_TOLERANCE
        });
        if unison {
            note.start += nudge.gen_range(0.01..0.03);
            moved += 1;
        }
    }
    if moved > 0 {
        debug!("nudged {moved} keys onsets off bass unisons");
        sort_notes(keys);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phrase::PhraseError;
    use crate::song::tests::two_bar_spec;
    use crate::song::Section;

    #[test]
    fn deterministic_across_runs() {
        let spec = two_bar_spec();
        let a = build_stems_for_song(&spec, 42).unwrap();
        let b = build_stems_for_song(&spec, 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_seed_changes_something() {
        let spec = two_bar_spec();
        let a = build_stems_for_song(&spec, 1).unwrap();
        let b = build_stems_for_song(&spec, 2).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn every_note_is_register_bounded() {
        let spec = two_bar_spec();
        let stems = build_stems_for_song(&spec, 42).unwrap();
        for (instrument, notes) in &stems {
            let reg = spec.register_for(*instrument);
            assert!(!notes.is_empty(), "{instrument} produced nothing");
            for note in notes {
                assert!(
                    (reg.low..=reg.high).contains(&note.pitch),
                    "{instrument} pitch {} outside [{}, {}]",
                    note.pitch,
                    reg.low,
                    reg.high
                );
            }
        }
    }

    #[test]
    fn notes_are_sorted_by_start() {
        let stems = build_stems_for_song(&two_bar_spec(), 7).unwrap();
        for notes in stems.values() {
            assert!(notes.windows(2).all(|w| w[0].start <= w[1].start));
        }
    }

    #[test]
    fn all_notes_inside_song_duration() {
        let spec = two_bar_spec();
        let stems = build_stems_for_song(&spec, 42).unwrap();
        let song_secs = 2.0 * spec.seconds_per_bar().unwrap();
        for notes in stems.values() {
            for note in notes {
                assert!(note.start < song_secs + 0.1, "note at {}", note.start);
            }
        }
    }

    #[test]
    fn invalid_spec_fails() {
        let mut spec = two_bar_spec();
        spec.meter = "0/4".into();
        assert!(build_stems_for_song(&spec, 42).is_err());
    }

    #[test]
    fn swing_delays_offbeat_hats() {
        let mut straight = two_bar_spec();
        straight.swing = 0.0;
        let mut swung = straight.clone();
        swung.swing = 0.5;

        let straight_stems = build_stems_for_song(&straight, 42).unwrap();
        let swung_stems = build_stems_for_song(&swung, 42).unwrap();
        let d_straight = &straight_stems[&Instrument::Drums];
        let d_swung = &swung_stems[&Instrument::Drums];
        // Same event count, but some onsets move later.
        assert_eq!(d_straight.len(), d_swung.len());
        let sum_straight: f64 = d_straight.iter().map(|n| n.start).sum();
        let sum_swung: f64 = d_swung.iter().map(|n| n.start).sum();
        assert!(sum_swung > sum_straight);
    }

    #[test]
    fn bass_moves_by_small_intervals() {
        let spec = two_bar_spec();
        let stems = build_stems_for_song(&spec, 42).unwrap();
        let bass = &stems[&Instrument::Bass];
        for pair in bass.windows(2) {
            let leap = (pair[1].pitch as i32 - pair[0].pitch as i32).abs();
            assert!(leap <= 12, "bass leap of {leap} semitones");
        }
    }

    struct FixedPhrase;

    impl PhraseGenerator for FixedPhrase {
        fn generate(
            &self,
            request: &PhraseRequest<'_>,
        ) -> std::result::Result<Vec<Event>, PhraseError> {
            if request.instrument != Instrument::Keys {
                return Err(PhraseError::Failed("keys only".into()));
            }
            Ok(vec![Event {
                start: 0.0,
                dur: 1.0,
                pitch: 72,
                velocity: 64,
                channel: request.instrument.channel(),
            }])
        }
    }

    #[test]
    fn strategy_overrides_one_instrument_and_falls_back_elsewhere() {
        let spec = two_bar_spec();
        let stems = build_stems_with_strategy(&spec, 42, Some(&FixedPhrase)).unwrap();
        // Keys got exactly the strategy's single event.
        assert_eq!(stems[&Instrument::Keys].len(), 1);
        // Drums fell back to the algorithmic generator.
        assert!(!stems[&Instrument::Drums].is_empty());
    }

    #[test]
    fn strategyless_build_matches_failing_strategy() {
        struct NeverWorks;
        impl PhraseGenerator for NeverWorks {
            fn generate(
                &self,
                _request: &PhraseRequest<'_>,
            ) -> std::result::Result<Vec<Event>, PhraseError> {
                Err(PhraseError::Timeout)
            }
        }
        let spec = two_bar_spec();
        let plain = build_stems_for_song(&spec, 42).unwrap();
        let fallback = build_stems_with_strategy(&spec, 42, Some(&NeverWorks)).unwrap();
        assert_eq!(plain, fallback);
    }

    #[test]
    fn pads_merge_repeated_voicings() {
        let mut spec = two_bar_spec();
        // Same chord both bars → identical voicing → one merged note per voice.
        spec.harmony
            .insert("A".into(), vec!["C".into(), "C".into()]);
        spec.density.insert("A".into(), 0.9);
        let stems = build_stems_for_song(&spec, 42).unwrap();
        let pads = &stems[&Instrument::Pads];
        // One merged note per distinct voice (unison voices dedupe).
        assert!((3..=4).contains(&pads.len()), "got {} notes", pads.len());
        let bar = spec.seconds_per_bar().unwrap();
        for note in pads {
            assert!(note.dur > bar * 1.5, "note not merged: dur {}", note.dur);
        }
    }

    #[test]
    fn low_density_pads_keep_outer_voices_only() {
        let mut spec = two_bar_spec();
        spec.density.insert("A".into(), 0.35);
        let stems = build_stems_for_song(&spec, 42).unwrap();
        let pads = &stems[&Instrument::Pads];
        // Outer voices only: at most 2 simultaneous pitches per onset.
        let mut by_start: std::collections::BTreeMap<i64, usize> = Default::default();
        for note in pads {
            *by_start.entry((note.start * 1000.0) as i64).or_default() += 1;
        }
        assert!(by_start.values().all(|&c| c <= 2), "{by_start:?}");
    }

    #[test]
    fn multi_section_spec_builds() {
        let mut spec = two_bar_spec();
        spec.sections.push(Section {
            name: "chorus".into(),
            length_bars: 2,
        });
        spec.harmony
            .insert("chorus".into(), vec!["F".into(), "G".into()]);
        spec.density.insert("chorus".into(), 0.9);
        let stems = build_stems_for_song(&spec, 5).unwrap();
        let bar = spec.seconds_per_bar().unwrap();
        // Some notes land in the second section.
        for notes in stems.values() {
            assert!(notes.iter().any(|n| n.start >= 2.0 * bar - 0.05));
        }
    }
}

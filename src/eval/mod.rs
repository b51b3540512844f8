//! Evaluation metrics — musical and signal-level measurements of a
//! finished render.

pub mod loudness;

pub use loudness::{measure, LoudnessStats};

use std::collections::BTreeMap;

use crate::error::Result;
use crate::song::SongSpec;
use crate::stem::{Instrument, Stems};
use crate::theory::{generate_satb, parse_progression};

/// The full evaluation report.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalReport {
    /// Fraction of bass/keys/pads notes whose pitch class belongs to the
    /// chord sounding at their bar.
    pub chord_tone_coverage: f64,
    /// Mean absolute semitone movement across the SATB lines.
    pub voice_leading_smoothness: f64,
    /// Inter-onset-interval variance per instrument, seconds².
    pub rhythmic_stability: BTreeMap<Instrument, f64>,
    /// Fraction of cadence bars busier than the non-cadence average.
    pub cadence_fill_rate: f64,
    /// Per-section agreement between actual and requested density, [0, 1].
    pub density_alignment: BTreeMap<String, f64>,
    /// Peak/RMS/LUFS of the mixed master.
    pub loudness: LoudnessStats,
}

/// Evaluate a song against its stems and mixed master.
pub fn evaluate(
    spec: &SongSpec,
    stems: &Stems,
    master: &[f32],
    sample_rate: u32,
) -> Result<EvalReport> {
    let bar_secs = spec.seconds_per_bar()?;
    let chords = parse_progression(&spec.harmony_timeline())?;
    let satb = generate_satb(&chords);

    // Chord-tone coverage over the pitched instruments.
    let mut hits = 0usize;
    let mut total = 0usize;
    for instrument in [Instrument::Bass, Instrument::Keys, Instrument::Pads] {
        let Some(notes) = stems.get(&instrument) else {
            continue;
        };
        for note in notes {
            let bar = ((note.start / bar_secs) as usize).min(chords.len().saturating_sub(1));
            total += 1;
            if chords[bar].contains_pitch(note.pitch) {
                hits += 1;
            }
        }
    }
    let chord_tone_coverage = if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    };

    // IOI variance per instrument.
    let mut rhythmic_stability = BTreeMap::new();
    for (&instrument, notes) in stems {
        let onsets: Vec<f64> = notes.iter().map(|n| n.start).collect();
        let iois: Vec<f64> = onsets.windows(2).map(|w| w[1] - w[0]).collect();
        let variance = if iois.len() < 2 {
            0.0
        } else {
            let mean = iois.iter().sum::<f64>() / iois.len() as f64;
            iois.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / iois.len() as f64
        };
        rhythmic_stability.insert(instrument, variance);
    }

    // Cadence fill rate: cadence bars busier than the non-cadence average.
    let total_bars = spec.total_bars();
    let mut bar_counts = vec![0usize; total_bars as usize];
    for notes in stems.values() {
        for note in notes {
            let bar = ((note.start / bar_secs) as usize).min(bar_counts.len() - 1);
            bar_counts[bar] += 1;
        }
    }
    let cadence_bars: Vec<usize> = spec.cadences.iter().map(|c| c.bar as usize).collect();
    let plain: Vec<usize> = (0..bar_counts.len())
        .filter(|b| !cadence_bars.contains(b))
        .map(|b| bar_counts[b])
        .collect();
    let cadence_fill_rate = if cadence_bars.is_empty() || plain.is_empty() {
        0.0
    } else {
        let avg = plain.iter().sum::<usize>() as f64 / plain.len() as f64;
        let busy = cadence_bars
            .iter()
            .filter(|&&b| b < bar_counts.len() && bar_counts[b] as f64 > avg)
            .count();
        busy as f64 / cadence_bars.len() as f64
    };

    // Density alignment: normalized actual onsets per bar vs the requested
    // curve, per section.
    let mut actual: BTreeMap<String, f64> = BTreeMap::new();
    let mut start_bar = 0u32;
    for section in &spec.sections {
        let from = start_bar as usize;
        let to = (start_bar + section.length_bars) as usize;
        let count: usize = bar_counts[from..to].iter().sum();
        let per_bar = count as f64 / section.length_bars as f64;
        // Later occurrences of a looped section accumulate into one entry.
        let entry = actual.entry(section.name.clone()).or_insert(0.0);
        *entry = entry.max(per_bar);
        start_bar += section.length_bars;
    }
    let max_actual = actual.values().fold(0.0f64, |m, &v| m.max(v)).max(1e-9);
    let max_expected = spec
        .sections
        .iter()
        .map(|s| spec.density_for(&s.name))
        .fold(0.0f64, f64::max)
        .max(1e-9);
    let density_alignment: BTreeMap<String, f64> = actual
        .into_iter()
        .map(|(name, per_bar)| {
            let expected = spec.density_for(&name) / max_expected;
            let normalized = per_bar / max_actual;
            (name, 1.0 - (normalized - expected).abs())
        })
        .collect();

    Ok(EvalReport {
        chord_tone_coverage,
        voice_leading_smoothness: satb.smoothness(),
        rhythmic_stability,
        cadence_fill_rate,
        density_alignment,
        loudness: measure(master, sample_rate),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::tests::two_bar_spec;
    use crate::song::{Cadence, CadenceKind, StyleConfig};
    use crate::stem::build_stems_for_song;

    fn report_for(spec: &SongSpec, stems: &Stems) -> EvalReport {
        evaluate(spec, stems, &[], 44100).unwrap()
    }

    #[test]
    fn coverage_is_high_for_generated_material() {
        let spec = two_bar_spec();
        let stems = build_stems_for_song(&spec, 42).unwrap();
        let report = report_for(&spec, &stems);
        // Bass/pads are chord tones by construction; keys stabs may add
        // tensions, so coverage is high but not necessarily 1.0.
        assert!(
            report.chord_tone_coverage > 0.7,
            "coverage {}",
            report.chord_tone_coverage
        );
    }

    #[test]
    fn smoothness_matches_voicing_layer() {
        let spec = two_bar_spec();
        let stems = build_stems_for_song(&spec, 42).unwrap();
        let report = report_for(&spec, &stems);
        assert!(report.voice_leading_smoothness < 4.0);
    }

    #[test]
    fn stability_reported_per_instrument() {
        let spec = two_bar_spec();
        let stems = build_stems_for_song(&spec, 42).unwrap();
        let report = report_for(&spec, &stems);
        assert_eq!(report.rhythmic_stability.len(), stems.len());
        for (&instrument, &variance) in &report.rhythmic_stability {
            assert!(variance >= 0.0, "{instrument}: {variance}");
        }
    }

    #[test]
    fn cadence_fill_rate_sees_arranged_fills() {
        let mut spec = two_bar_spec();
        spec.cadences.push(Cadence {
            bar: 0,
            kind: CadenceKind::Full,
        });
        let stems = build_stems_for_song(&spec, 42).unwrap();
        let stems =
            crate::arrange::arrange(&mut spec, stems, &StyleConfig::default(), 42).unwrap();
        let report = report_for(&spec, &stems);
        assert!(report.cadence_fill_rate > 0.0);
    }

    #[test]
    fn density_alignment_in_unit_range() {
        let mut spec = two_bar_spec();
        spec.density.insert("A".into(), 0.8);
        let stems = build_stems_for_song(&spec, 42).unwrap();
        let report = report_for(&spec, &stems);
        for (name, alignment) in &report.density_alignment {
            assert!(
                (0.0..=1.0).contains(alignment),
                "{name}: {alignment}"
            );
        }
    }

    #[test]
    fn empty_master_reports_silent_loudness() {
        let spec = two_bar_spec();
        let stems = build_stems_for_song(&spec, 42).unwrap();
        let report = report_for(&spec, &stems);
        assert_eq!(report.loudness.lufs, None);
    }
}

//! Audio renderer — turns absolute-time stems into per-instrument mono
//! buffers via sample playback or the synth fallback.
//!
//! Every instrument with notes must have an asset source; a missing or
//! invalid source fails the render for that instrument rather than
//! silently producing an empty stem.

pub mod envelope;
pub mod oscillator;
pub mod sampler;
pub mod synth;

pub use sampler::{default_drum_mapping, DrumKitSampler, Region, SampleBuffer, SfzInstrument};
pub use synth::{SynthDrumKit, SynthPatch};

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::stem::{Instrument, Note, Stems};

/// How one instrument's notes become audio.
pub enum AssetSource {
    /// SFZ-like pitched sample regions.
    Sfz(SfzInstrument),
    /// Drum sample directory with round-robin pools.
    DrumSamples(DrumKitSampler),
    /// Subtractive synth voice.
    SynthVoice(SynthPatch),
    /// Synthesized percussion.
    SynthDrums(SynthDrumKit),
}

impl AssetSource {
    fn render_note(&self, note: &Note, rr: usize, sample_rate: u32) -> Result<Vec<f32>> {
        match self {
            AssetSource::Sfz(sfz) => sfz.render_note(note.pitch, note.vel, note.dur, sample_rate),
            AssetSource::DrumSamples(kit) => {
                kit.render_hit(note.pitch, note.vel, rr, sample_rate)
            }
            AssetSource::SynthVoice(patch) => {
                Ok(patch.render_note(note.pitch, note.vel, note.dur, sample_rate))
            }
            AssetSource::SynthDrums(kit) => kit
                .render_hit(note.pitch, note.vel, sample_rate)
                .ok_or(Error::NoRegionForPitch {
                    instrument: Instrument::Drums,
                    pitch: note.pitch,
                }),
        }
    }
}

/// Asset sources per instrument, plus the path labels that feed the render
/// hash.
pub struct RenderAssets {
    sources: BTreeMap<Instrument, AssetSource>,
    paths: BTreeMap<Instrument, String>,
}

impl RenderAssets {
    pub fn new() -> Self {
        Self {
            sources: BTreeMap::new(),
            paths: BTreeMap::new(),
        }
    }

    /// All four instruments on the built-in synth engine.
    pub fn synth_default() -> Self {
        Self::new()
            .with_source(Instrument::Drums, AssetSource::SynthDrums(SynthDrumKit::default()))
            .with_source(Instrument::Bass, AssetSource::SynthVoice(SynthPatch::bass()))
            .with_source(Instrument::Keys, AssetSource::SynthVoice(SynthPatch::keys()))
            .with_source(Instrument::Pads, AssetSource::SynthVoice(SynthPatch::pads()))
    }

    /// Attach a source built in memory; the hash label records its kind.
    pub fn with_source(mut self, instrument: Instrument, source: AssetSource) -> Self {
        let label = match &source {
            AssetSource::Sfz(_) => "sfz:inline",
            AssetSource::DrumSamples(_) => "drums:inline",
            AssetSource::SynthVoice(_) => "synth:voice",
            AssetSource::SynthDrums(_) => "synth:drums",
        };
        self.paths.insert(instrument, label.to_string());
        self.sources.insert(instrument, source);
        self
    }

    /// Load an SFZ-like region list for a pitched instrument.
    pub fn load_sfz(mut self, instrument: Instrument, list_path: &Path) -> Result<Self> {
        let sfz = SfzInstrument::load(instrument, list_path)?;
        self.paths
            .insert(instrument, list_path.display().to_string());
        self.sources.insert(instrument, AssetSource::Sfz(sfz));
        Ok(self)
    }

    /// Load a drum sample directory with the given filename→pitch mapping.
    pub fn load_drum_dir(
        mut self,
        dir: &Path,
        mapping: &BTreeMap<String, u8>,
    ) -> Result<Self> {
        let kit = DrumKitSampler::load_dir(dir, mapping)?;
        self.paths
            .insert(Instrument::Drums, dir.display().to_string());
        self.sources
            .insert(Instrument::Drums, AssetSource::DrumSamples(kit));
        Ok(self)
    }

    pub fn source_for(&self, instrument: Instrument) -> Option<&AssetSource> {
        self.sources.get(&instrument)
    }

    /// Asset path labels in deterministic order, for the render hash.
    pub fn path_labels(&self) -> Vec<(String, String)> {
        self.paths
            .iter()
            .map(|(inst, path)| (inst.name().to_string(), path.clone()))
            .collect()
    }
}

impl Default for RenderAssets {
    fn default() -> Self {
        Self::new()
    }
}

/// Render every stem to a mono buffer. All buffers share one length: the
/// latest note end across all instruments.
pub fn render(
    stems: &Stems,
    sample_rate: u32,
    assets: &RenderAssets,
) -> Result<BTreeMap<Instrument, Vec<f32>>> {
    let duration = stems
        .values()
        .flatten()
        .map(Note::end)
        .fold(0.0f64, f64::max);
    let frames = (duration * sample_rate as f64).ceil() as usize;

    let mut out = BTreeMap::new();
    for (&instrument, notes) in stems {
        let source = assets
            .source_for(instrument)
            .ok_or(Error::MissingAssets {
                instrument,
                detail: "no asset source configured".into(),
            })?;

        let mut buffer = vec![0.0f32; frames];
        let mut round_robin: HashMap<u8, usize> = HashMap::new();
        for note in notes {
            let rr = {
                let slot = round_robin.entry(note.pitch).or_insert(0);
                let current = *slot;
                *slot += 1;
                current
            };
            let rendered = source.render_note(note, rr, sample_rate)?;
            let offset = (note.start * sample_rate as f64).round() as usize;
            for (i, s) in rendered.iter().enumerate() {
                if let Some(slot) = buffer.get_mut(offset + i) {
                    *slot += s;
                }
            }
        }

        // Defensive: a non-finite buffer would poison the whole mix.
        if buffer.iter().any(|s| !s.is_finite()) {
            warn!("{instrument}: non-finite samples; substituting silence");
            buffer = vec![0.0; frames];
        }

        // Soft-normalize when overlapping notes push past full scale.
        let peak = buffer.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        if peak > 1.0 {
            let scale = 0.99 / peak;
            for s in buffer.iter_mut() {
                *s *= scale;
            }
            debug!("{instrument}: normalized peak {peak:.2}");
        }

        out.insert(instrument, buffer);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::drums;
    use crate::song::tests::two_bar_spec;
    use crate::stem::build_stems_for_song;

    fn rendered_default() -> BTreeMap<Instrument, Vec<f32>> {
        let spec = two_bar_spec();
        let stems = build_stems_for_song(&spec, 42).unwrap();
        render(&stems, 44100, &RenderAssets::synth_default()).unwrap()
    }

    #[test]
    fn all_instruments_render_equal_length() {
        let buffers = rendered_default();
        assert_eq!(buffers.len(), 4);
        let len = buffers.values().next().unwrap().len();
        assert!(len > 0);
        assert!(buffers.values().all(|b| b.len() == len));
    }

    #[test]
    fn buffers_are_finite_and_soft_normalized() {
        for (instrument, buffer) in rendered_default() {
            let peak = buffer.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            assert!(peak > 0.0, "{instrument} rendered silence");
            assert!(peak <= 1.0, "{instrument} peak {peak}");
            assert!(buffer.iter().all(|s| s.is_finite()));
        }
    }

    #[test]
    fn missing_assets_fail_the_render() {
        let spec = two_bar_spec();
        let stems = build_stems_for_song(&spec, 42).unwrap();
        let only_drums = RenderAssets::new().with_source(
            Instrument::Drums,
            AssetSource::SynthDrums(SynthDrumKit::default()),
        );
        let err = render(&stems, 44100, &only_drums).unwrap_err();
        assert!(matches!(err, Error::MissingAssets { .. }));
    }

    #[test]
    fn render_is_deterministic() {
        let spec = two_bar_spec();
        let stems = build_stems_for_song(&spec, 42).unwrap();
        let assets = RenderAssets::synth_default();
        let a = render(&stems, 44100, &assets).unwrap();
        let b = render(&stems, 44100, &assets).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn buffer_length_tracks_latest_note_end() {
        let spec = two_bar_spec();
        let stems = build_stems_for_song(&spec, 42).unwrap();
        let duration = stems
            .values()
            .flatten()
            .map(Note::end)
            .fold(0.0f64, f64::max);
        let buffers = render(&stems, 44100, &RenderAssets::synth_default()).unwrap();
        let expected = (duration * 44100.0).ceil() as usize;
        assert_eq!(buffers[&Instrument::Drums].len(), expected);
    }

    #[test]
    fn drum_round_robin_alternates_pool_samples() {
        use crate::stem::Note;
        use std::collections::BTreeMap as Map;

        let pools = Map::from([(
            drums::KICK,
            vec![
                SampleBuffer::from_mono(vec![0.5], 44100),
                SampleBuffer::from_mono(vec![-0.5], 44100),
            ],
        )]);
        let kit = DrumKitSampler::from_pools(pools).unwrap();
        let assets = RenderAssets::new()
            .with_source(Instrument::Drums, AssetSource::DrumSamples(kit));

        let mut stems = Stems::new();
        stems.insert(
            Instrument::Drums,
            vec![
                Note { start: 0.0, dur: 0.1, pitch: drums::KICK, vel: 127, channel: 9 },
                Note { start: 0.5, dur: 0.1, pitch: drums::KICK, vel: 127, channel: 9 },
                Note { start: 1.0, dur: 0.1, pitch: drums::KICK, vel: 127, channel: 9 },
            ],
        );
        let buffers = render(&stems, 44100, &assets).unwrap();
        let buf = &buffers[&Instrument::Drums];
        assert!((buf[0] - 0.5).abs() < 1e-6);
        assert!((buf[22050] + 0.5).abs() < 1e-6);
        assert!((buf[44100] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn unsupported_drum_pitch_fails_with_synth_kit() {
        let mut stems = Stems::new();
        stems.insert(
            Instrument::Drums,
            vec![Note { start: 0.0, dur: 0.1, pitch: 60, vel: 100, channel: 9 }],
        );
        let err = render(&stems, 44100, &RenderAssets::synth_default()).unwrap_err();
        assert!(matches!(err, Error::NoRegionForPitch { pitch: 60, .. }));
    }

    #[test]
    fn path_labels_follow_sources() {
        let labels = RenderAssets::synth_default().path_labels();
        assert_eq!(labels.len(), 4);
        assert!(labels.iter().any(|(i, p)| i == "drums" && p == "synth:drums"));
        assert!(labels.iter().any(|(i, p)| i == "bass" && p == "synth:voice"));
    }
}

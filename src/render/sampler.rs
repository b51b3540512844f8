//! Sample playback — SFZ-like region lists with pitch-shifted resampling,
//! and drum-sample directories with per-pitch round-robin pools.
//!
//! Region lists are JSON: `{"regions": [{"lokey": 40, "hikey": 52,
//! "pitch_keycenter": 45, "sample": "bass_a1.wav"}, ...]}` with sample paths
//! relative to the list file. Drum directories map filename prefixes to
//! percussion pitches; every file matching `<prefix>*.wav` joins that
//! pitch's round-robin pool.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::pattern::drums;
use crate::stem::Instrument;

/// A mono sample buffer at its native rate.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Wrap raw mono samples.
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Load a WAV file, mixing multi-channel sources down to mono. The
    /// native sample rate is preserved; resampling happens at playback.
    pub fn from_wav_file(path: &Path) -> Result<Self> {
        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let channels = spec.channels as usize;

        let raw: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Int => {
                let max_val = (1u32 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max_val))
                    .collect::<std::result::Result<_, _>>()?
            }
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<_, _>>()?,
        };
        if raw.is_empty() {
            return Err(Error::InstrumentDef(format!(
                "{}: WAV file contains no samples",
                path.display()
            )));
        }

        let mono: Vec<f32> = raw
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();
        Ok(Self {
            samples: mono,
            sample_rate: spec.sample_rate,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Play this buffer at `ratio` source samples per output sample, with
    /// linear interpolation. A ratio above 1 pitches up and shortens.
    pub fn resampled(&self, ratio: f64) -> Vec<f32> {
        if self.samples.is_empty() || ratio <= 0.0 {
            return Vec::new();
        }
        let out_len = (self.samples.len() as f64 / ratio).ceil() as usize;
        let mut out = Vec::with_capacity(out_len);
        for i in 0..out_len {
            let pos = i as f64 * ratio;
            let idx = pos as usize;
            if idx >= self.samples.len() {
                break;
            }
            let frac = (pos - idx as f64) as f32;
            let a = self.samples[idx];
            let b = self.samples.get(idx + 1).copied().unwrap_or(a);
            out.push(a * (1.0 - frac) + b * frac);
        }
        out
    }
}

#[derive(Debug, Deserialize)]
struct RegionDef {
    lokey: u8,
    hikey: u8,
    pitch_keycenter: u8,
    sample: String,
}

#[derive(Debug, Deserialize)]
struct RegionListDef {
    regions: Vec<RegionDef>,
}

/// One key-mapped sample region.
#[derive(Debug, Clone)]
pub struct Region {
    pub lokey: u8,
    pub hikey: u8,
    pub pitch_keycenter: u8,
    pub buffer: SampleBuffer,
}

/// A pitched sample instrument: an ordered region list covering key ranges.
#[derive(Debug, Clone)]
pub struct SfzInstrument {
    instrument: Instrument,
    regions: Vec<Region>,
}

impl SfzInstrument {
    /// Build from already-loaded regions (used by tests and embedders).
    pub fn from_regions(instrument: Instrument, regions: Vec<Region>) -> Result<Self> {
        if regions.is_empty() {
            return Err(Error::MissingAssets {
                instrument,
                detail: "region list is empty".into(),
            });
        }
        for region in &regions {
            if region.lokey > region.hikey {
                return Err(Error::InstrumentDef(format!(
                    "region lokey {} exceeds hikey {}",
                    region.lokey, region.hikey
                )));
            }
        }
        Ok(Self {
            instrument,
            regions,
        })
    }

    /// Load a JSON region list; sample paths resolve relative to the list.
    pub fn load(instrument: Instrument, list_path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(list_path).map_err(|e| Error::MissingAssets {
            instrument,
            detail: format!("{}: {e}", list_path.display()),
        })?;
        let def: RegionListDef = serde_json::from_str(&json)?;
        let base = list_path.parent().unwrap_or(Path::new("."));

        let mut regions = Vec::with_capacity(def.regions.len());
        for region in def.regions {
            let sample_path = base.join(&region.sample);
            let buffer =
                SampleBuffer::from_wav_file(&sample_path).map_err(|e| Error::MissingAssets {
                    instrument,
                    detail: format!("{}: {e}", sample_path.display()),
                })?;
            regions.push(Region {
                lokey: region.lokey,
                hikey: region.hikey,
                pitch_keycenter: region.pitch_keycenter,
                buffer,
            });
        }
        Self::from_regions(instrument, regions)
    }

    /// The region covering a pitch; an uncovered pitch is an error, never
    /// silence.
    pub fn region_for(&self, pitch: u8) -> Result<&Region> {
        self.regions
            .iter()
            .find(|r| (r.lokey..=r.hikey).contains(&pitch))
            .ok_or(Error::NoRegionForPitch {
                instrument: self.instrument,
                pitch,
            })
    }

    /// Render one note: pitch-shifted playback of the containing region,
    /// capped just past the note duration, velocity-scaled.
    pub fn render_note(
        &self,
        pitch: u8,
        velocity: u8,
        dur: f64,
        sample_rate: u32,
    ) -> Result<Vec<f32>> {
        let region = self.region_for(pitch)?;
        let ratio = region.buffer.sample_rate() as f64 / sample_rate as f64
            * 2.0f64.powf((pitch as f64 - region.pitch_keycenter as f64) / 12.0);
        let mut out = region.buffer.resampled(ratio);
        let max_len = ((dur + 0.05) * sample_rate as f64).ceil() as usize;
        out.truncate(max_len);
        let gain = velocity as f32 / 127.0;
        for s in out.iter_mut() {
            *s *= gain;
        }
        Ok(out)
    }
}

/// Default filename-prefix → percussion-pitch mapping for drum directories.
pub fn default_drum_mapping() -> BTreeMap<String, u8> {
    BTreeMap::from([
        ("kick".into(), drums::KICK),
        ("snare".into(), drums::SNARE),
        ("hat_closed".into(), drums::CLOSED_HAT),
        ("hat_open".into(), drums::OPEN_HAT),
        ("tom_low".into(), drums::TOM_LOW),
        ("tom_mid".into(), drums::TOM_MID),
        ("tom_high".into(), drums::TOM_HIGH),
        ("crash".into(), drums::CRASH),
        ("sweep".into(), drums::SWEEP),
    ])
}

/// A drum sample library with a round-robin pool per pitch.
#[derive(Debug, Clone)]
pub struct DrumKitSampler {
    pools: BTreeMap<u8, Vec<SampleBuffer>>,
}

impl DrumKitSampler {
    /// Build from explicit pools (used by tests and embedders).
    pub fn from_pools(pools: BTreeMap<u8, Vec<SampleBuffer>>) -> Result<Self> {
        if pools.values().all(|p| p.is_empty()) {
            return Err(Error::MissingAssets {
                instrument: Instrument::Drums,
                detail: "no drum samples in any pool".into(),
            });
        }
        Ok(Self { pools })
    }

    /// Scan a directory: every `<prefix>*.wav` file joins the mapped pitch's
    /// pool. Files sort by name so pool order is stable across platforms.
    pub fn load_dir(dir: &Path, mapping: &BTreeMap<String, u8>) -> Result<Self> {
        let mut names: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| Error::MissingAssets {
                instrument: Instrument::Drums,
                detail: format!("{}: {e}", dir.display()),
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("wav"))
                    .unwrap_or(false)
            })
            .collect();
        names.sort();

        let mut pools: BTreeMap<u8, Vec<SampleBuffer>> = BTreeMap::new();
        for path in names {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_lowercase();
            // Longest matching prefix wins, so "hat_open" beats "hat".
            let matched = mapping
                .iter()
                .filter(|(prefix, _)| stem.starts_with(prefix.as_str()))
                .max_by_key(|(prefix, _)| prefix.len());
            if let Some((_, &pitch)) = matched {
                pools
                    .entry(pitch)
                    .or_default()
                    .push(SampleBuffer::from_wav_file(&path)?);
            }
        }
        Self::from_pools(pools)
    }

    /// Number of round-robin alternatives for a pitch.
    pub fn pool_len(&self, pitch: u8) -> usize {
        self.pools.get(&pitch).map(Vec::len).unwrap_or(0)
    }

    /// Render a hit using round-robin slot `rr`, resampled to the target
    /// rate and velocity-scaled. A pitch with no pool is an error.
    pub fn render_hit(
        &self,
        pitch: u8,
        velocity: u8,
        rr: usize,
        sample_rate: u32,
    ) -> Result<Vec<f32>> {
        let pool = self
            .pools
            .get(&pitch)
            .filter(|p| !p.is_empty())
            .ok_or(Error::NoRegionForPitch {
                instrument: Instrument::Drums,
                pitch,
            })?;
        let buffer = &pool[rr % pool.len()];
        let ratio = buffer.sample_rate() as f64 / sample_rate as f64;
        let mut out = buffer.resampled(ratio);
        let gain = velocity as f32 / 127.0;
        for s in out.iter_mut() {
            *s *= gain;
        }
        Ok(out)
    }
}

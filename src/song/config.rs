//! Mix and style configuration.
//!
//! Every recognized option is an explicit field with a documented effect and
//! range; unknown JSON keys are rejected, out-of-range values fail
//! [`MixConfig::validate`] rather than being clamped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::stem::Instrument;

/// EQ curve shapes, RBJ-cookbook coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EqKind {
    Peaking,
    LowShelf,
    HighShelf,
}

/// A single parametric EQ band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EqConfig {
    pub kind: EqKind,
    pub freq_hz: f32,
    pub gain_db: f32,
    #[serde(default = "default_q")]
    pub q: f32,
}

fn default_q() -> f32 {
    0.707
}

/// Two-voice modulated-delay chorus, voices 180° out of phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChorusConfig {
    /// Modulation depth in milliseconds.
    #[serde(default = "default_chorus_depth")]
    pub depth_ms: f32,
    /// LFO rate in Hz.
    #[serde(default = "default_chorus_rate")]
    pub rate_hz: f32,
    /// Wet fraction in [0, 1].
    #[serde(default = "default_chorus_mix")]
    pub mix: f32,
}

fn default_chorus_depth() -> f32 {
    2.5
}

fn default_chorus_rate() -> f32 {
    0.8
}

fn default_chorus_mix() -> f32 {
    0.35
}

/// Per-track channel strip settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TrackConfig {
    pub gain_db: f32,
    /// Stereo position in [-1, 1]; 0 is center. Constant-power law.
    pub pan: f32,
    /// Send level into the shared reverb bus, [0, 1].
    pub reverb_send: f32,
    pub eq: Option<EqConfig>,
    pub chorus: Option<ChorusConfig>,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            gain_db: 0.0,
            pan: 0.0,
            reverb_send: 0.15,
            eq: None,
            chorus: None,
        }
    }
}

/// Shared plate reverb bus.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ReverbConfig {
    /// Comb feedback scale, [0, 1].
    pub room_size: f32,
    /// One-pole damping in the comb feedback path, [0, 1].
    pub damping: f32,
    /// Input predelay in milliseconds.
    pub predelay_ms: f32,
    /// Bus return level, [0, 1].
    pub wet: f32,
}

impl Default for ReverbConfig {
    fn default() -> Self {
        Self {
            room_size: 0.72,
            damping: 0.4,
            predelay_ms: 12.0,
            wet: 0.25,
        }
    }
}

/// Normalized tanh soft clip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SaturationConfig {
    /// Drive >= 0; near-unity gain is preserved at low drive.
    pub drive: f32,
}

/// RMS-envelope compressor on the master bus.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CompressorConfig {
    pub threshold_db: f32,
    pub ratio: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    /// Soft-knee width in dB; 0 is a hard knee.
    pub knee_db: f32,
    /// When > 0, the dry signal is delayed so gain reduction is computed
    /// ahead of the aligned sample.
    pub lookahead_ms: f32,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            threshold_db: -14.0,
            ratio: 3.0,
            attack_ms: 12.0,
            release_ms: 180.0,
            knee_db: 6.0,
            lookahead_ms: 0.0,
        }
    }
}

/// Final oversampled true-peak limiter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LimiterConfig {
    pub ceiling_db: f32,
    /// Linear-interpolation oversampling factor for inter-sample peaks.
    pub oversample: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            ceiling_db: -0.3,
            oversample: 4,
        }
    }
}

/// Master bus chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MasterConfig {
    /// Optional trim toward this much headroom, from a pre-sum peak estimate.
    pub headroom_db: Option<f32>,
    pub saturation: Option<SaturationConfig>,
    pub compressor: Option<CompressorConfig>,
    pub limiter: LimiterConfig,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            headroom_db: Some(3.0),
            saturation: None,
            compressor: Some(CompressorConfig::default()),
            limiter: LimiterConfig::default(),
        }
    }
}

/// Full mix configuration: per-track strips plus the shared buses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MixConfig {
    pub tracks: BTreeMap<Instrument, TrackConfig>,
    pub reverb: ReverbConfig,
    pub master: MasterConfig,
}

impl MixConfig {
    /// Parse from JSON and validate.
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: MixConfig = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Range-check every option.
    pub fn validate(&self) -> Result<()> {
        for (inst, track) in &self.tracks {
            if !(-1.0..=1.0).contains(&track.pan) {
                return Err(Error::MixConfig(format!(
                    "{inst}: pan must be in [-1, 1], got {}",
                    track.pan
                )));
            }
            if !(0.0..=1.0).contains(&track.reverb_send) {
                return Err(Error::MixConfig(format!(
                    "{inst}: reverb_send must be in [0, 1], got {}",
                    track.reverb_send
                )));
            }
            if let Some(eq) = &track.eq {
                if !(eq.freq_hz > 0.0) {
                    return Err(Error::MixConfig(format!(
                        "{inst}: eq freq_hz must be positive, got {}",
                        eq.freq_hz
                    )));
                }
                if !(eq.q > 0.0) {
                    return Err(Error::MixConfig(format!(
                        "{inst}: eq q must be positive, got {}",
                        eq.q
                    )));
                }
            }
            if let Some(chorus) = &track.chorus {
                if !(0.0..=1.0).contains(&chorus.mix) {
                    return Err(Error::MixConfig(format!(
                        "{inst}: chorus mix must be in [0, 1], got {}",
                        chorus.mix
                    )));
                }
                if !(chorus.rate_hz > 0.0) || !(chorus.depth_ms > 0.0) {
                    return Err(Error::MixConfig(format!(
                        "{inst}: chorus rate and depth must be positive"
                    )));
                }
            }
        }
        let r = &self.reverb;
        if !(0.0..=1.0).contains(&r.room_size)
            || !(0.0..=1.0).contains(&r.damping)
            || !(0.0..=1.0).contains(&r.wet)
            || r.predelay_ms < 0.0
        {
            return Err(Error::MixConfig(
                "reverb room_size/damping/wet must be in [0, 1] and predelay_ms >= 0".into(),
            ));
        }
        if let Some(c) = &self.master.compressor {
            if c.ratio < 1.0 {
                return Err(Error::MixConfig(format!(
                    "compressor ratio must be >= 1, got {}",
                    c.ratio
                )));
            }
            if c.attack_ms <= 0.0 || c.release_ms <= 0.0 {
                return Err(Error::MixConfig(
                    "compressor attack_ms and release_ms must be positive".into(),
                ));
            }
            if c.knee_db < 0.0 || c.lookahead_ms < 0.0 {
                return Err(Error::MixConfig(
                    "compressor knee_db and lookahead_ms must be >= 0".into(),
                ));
            }
        }
        if let Some(s) = &self.master.saturation {
            if s.drive < 0.0 {
                return Err(Error::MixConfig(format!(
                    "saturation drive must be >= 0, got {}",
                    s.drive
                )));
            }
        }
        if self.master.limiter.oversample == 0 {
            return Err(Error::MixConfig("limiter oversample must be >= 1".into()));
        }
        if self.master.limiter.ceiling_db > 0.0 {
            return Err(Error::MixConfig(format!(
                "limiter ceiling_db must be <= 0, got {}",
                self.master.limiter.ceiling_db
            )));
        }
        Ok(())
    }

    /// The strip for an instrument, or the default strip when unspecified.
    pub fn track_for(&self, instrument: Instrument) -> TrackConfig {
        self.tracks
            .get(&instrument)
            .cloned()
            .unwrap_or_default()
    }
}

/// Arrangement style gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StyleConfig {
    /// Cadence drum fills.
    pub fills: bool,
    /// Tom rolls on full cadences.
    pub tom_rolls: bool,
    /// Noise sweeps on full cadences.
    pub sweeps: bool,
    /// Pad swell in the bar before chorus-named sections.
    pub swell_before_chorus: bool,
    /// Drop all drum events in the first bar of bridge-named sections.
    pub drop_first_bridge_bar: bool,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            fills: true,
            tom_rolls: true,
            sweeps: true,
            swell_before_chorus: true,
            drop_first_bridge_bar: true,
        }
    }
}

impl StyleConfig {
    /// Parse from JSON. All fields default to enabled.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

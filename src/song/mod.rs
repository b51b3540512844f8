//! Song specification — structure, harmony, tempo, and per-instrument
//! constraints, validated once at construction.
//!
//! A [`SongSpec`] is created from user input (JSON) and treated as read-only
//! by the pipeline; only the arranger's duration-extension and outro setup
//! mutate it, before any audio is rendered.

pub mod config;

pub use config::{MixConfig, StyleConfig};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::stem::Instrument;

/// A named span of the song, measured in bars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub length_bars: u32,
}

/// How strongly a cadence bar is marked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CadenceKind {
    /// Snare fill only.
    Light,
    /// Snare fill plus style-gated tom roll and noise sweep.
    Full,
}

/// A declared harmonic resolution point, eligible for fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cadence {
    /// Global bar index (0-based).
    pub bar: u32,
    pub kind: CadenceKind,
}

/// Extra color intervals the keys may add to stabs, in semitones above the
/// chord root (e.g. 14 for an added ninth).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensionPolicy {
    #[serde(default)]
    pub intervals: Vec<u8>,
}

/// How the song ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OutroConfig {
    /// Stretch the final bar by a tempo-reduction factor.
    Ritard {
        /// Base stretch factor, >= 1. Raised further when a residual target
        /// duration must be absorbed.
        #[serde(default = "default_ritard_factor")]
        factor: f64,
    },
    /// A sustained final drum hit while other instruments hold their last note.
    HitAndHold {
        #[serde(default = "default_hold_secs")]
        hold_secs: f64,
    },
}

fn default_ritard_factor() -> f64 {
    1.5
}

fn default_hold_secs() -> f64 {
    2.0
}

/// Inclusive MIDI pitch range for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Register {
    pub low: u8,
    pub high: u8,
}

/// Parsed meter. The beat unit for tempo is always the quarter note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meter {
    pub numerator: u32,
    pub denominator: u32,
}

impl Meter {
    /// Parse an "N/D" meter string. Fails on anything that is not two
    /// positive integers — never defaults, never divides by zero later.
    pub fn parse(s: &str) -> Result<Self> {
        let (n, d) = s
            .split_once('/')
            .ok_or_else(|| Error::Meter(s.to_string()))?;
        let numerator: u32 = n.trim().parse().map_err(|_| Error::Meter(s.to_string()))?;
        let denominator: u32 = d.trim().parse().map_err(|_| Error::Meter(s.to_string()))?;
        if numerator == 0 || denominator == 0 {
            return Err(Error::Meter(s.to_string()));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// Bar length in quarter-note beats.
    pub fn beats_per_bar(self) -> f64 {
        self.numerator as f64 * 4.0 / self.denominator as f64
    }

    /// Sixteenth-note steps per bar, the pattern grid resolution.
    pub fn steps_per_bar(self) -> usize {
        (self.numerator as usize * 16) / self.denominator as usize
    }
}

/// Declarative description of a song. See the crate root for the pipeline
/// that consumes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongSpec {
    pub title: String,
    pub seed: u64,
    /// Tonic note name, e.g. "C", "F#", "Bb".
    pub key: String,
    #[serde(default)]
    pub mode: Mode,
    pub tempo_bpm: f64,
    /// Meter string, e.g. "4/4". Parsed and checked by [`SongSpec::validate`].
    pub meter: String,
    pub sections: Vec<Section>,
    /// Chord symbol per bar, one row per section name.
    pub harmony: BTreeMap<String, Vec<String>>,
    /// Target note density per section, each in [0, 1].
    #[serde(default)]
    pub density: BTreeMap<String, f64>,
    /// Allowed MIDI range per instrument.
    #[serde(default = "default_registers")]
    pub registers: BTreeMap<Instrument, Register>,
    #[serde(default)]
    pub cadences: Vec<Cadence>,
    #[serde(default)]
    pub tension: TensionPolicy,
    /// Swing amount in [0, 1): fraction of a step by which odd subdivision
    /// steps are delayed.
    #[serde(default)]
    pub swing: f64,
    #[serde(default)]
    pub outro: Option<OutroConfig>,
    /// When set, the arranger loops sections until the song is within ±2%
    /// of this many minutes.
    #[serde(default)]
    pub target_minutes: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Major,
    Minor,
}

fn default_registers() -> BTreeMap<Instrument, Register> {
    let mut m = BTreeMap::new();
    m.insert(Instrument::Drums, Register { low: 35, high: 59 });
    m.insert(Instrument::Bass, Register { low: 28, high: 52 });
    m.insert(Instrument::Keys, Register { low: 48, high: 84 });
    m.insert(Instrument::Pads, Register { low: 48, high: 79 });
    m
}

impl SongSpec {
    /// Parse a spec from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let spec: SongSpec = serde_json::from_str(json)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Check every structural invariant. Errors are descriptive and nothing
    /// is silently corrected.
    pub fn validate(&self) -> Result<()> {
        if self.sections.is_empty() {
            return Err(Error::SpecValidation("no sections declared".into()));
        }
        if !(self.tempo_bpm.is_finite() && self.tempo_bpm > 0.0) {
            return Err(Error::SpecValidation(format!(
                "tempo_bpm must be positive, got {}",
                self.tempo_bpm
            )));
        }
        let meter = Meter::parse(&self.meter)?;
        if meter.steps_per_bar() == 0 {
            return Err(Error::SpecValidation(format!(
                "meter {:?} is too short for the sixteenth-step grid",
                self.meter
            )));
        }
        crate::theory::parse_note_name(&self.key)?;
        if !(0.0..1.0).contains(&self.swing) {
            return Err(Error::SpecValidation(format!(
                "swing must be in [0, 1), got {}",
                self.swing
            )));
        }
        for section in &self.sections {
            if section.length_bars == 0 {
                return Err(Error::SpecValidation(format!(
                    "section {:?} has zero length",
                    section.name
                )));
            }
            let row = self
                .harmony
                .get(&section.name)
                .ok_or_else(|| Error::MissingHarmony(section.name.clone()))?;
            if row.len() != section.length_bars as usize {
                return Err(Error::SpecValidation(format!(
                    "section {:?}: harmony row has {} chords but the section spans {} bars",
                    section.name,
                    row.len(),
                    section.length_bars
                )));
            }
        }
        for (name, d) in &self.density {
            if !(0.0..=1.0).contains(d) {
                return Err(Error::SpecValidation(format!(
                    "density for section {:?} must be in [0, 1], got {}",
                    name, d
                )));
            }
        }
        for (inst, reg) in &self.registers {
            if reg.low > reg.high {
                return Err(Error::SpecValidation(format!(
                    "{} register low {} exceeds high {}",
                    inst, reg.low, reg.high
                )));
            }
        }
        let total = self.total_bars();
        for cadence in &self.cadences {
            if cadence.bar >= total {
                return Err(Error::SpecValidation(format!(
                    "cadence at bar {} is outside the song ({} bars)",
                    cadence.bar, total
                )));
            }
        }
        if let Some(minutes) = self.target_minutes {
            if !(minutes.is_finite() && minutes > 0.0) {
                return Err(Error::SpecValidation(format!(
                    "target_minutes must be positive, got {minutes}"
                )));
            }
        }
        Ok(())
    }

    /// Parsed meter. Valid after [`SongSpec::validate`].
    pub fn parsed_meter(&self) -> Result<Meter> {
        Meter::parse(&self.meter)
    }

    /// Total bars across all sections.
    pub fn total_bars(&self) -> u32 {
        self.sections.iter().map(|s| s.length_bars).sum()
    }

    /// Seconds per quarter-note beat.
    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.tempo_bpm
    }

    /// Seconds per bar under the spec's meter.
    pub fn seconds_per_bar(&self) -> Result<f64> {
        Ok(self.parsed_meter()?.beats_per_bar() * self.seconds_per_beat())
    }

    /// Density for a section, defaulting to 0.5 when the curve omits it.
    pub fn density_for(&self, section: &str) -> f64 {
        self.density.get(section).copied().unwrap_or(0.5)
    }

    /// Register for an instrument, falling back to the built-in defaults.
    pub fn register_for(&self, instrument: Instrument) -> Register {
        self.registers
            .get(&instrument)
            .copied()
            .unwrap_or_else(|| default_registers()[&instrument])
    }

    /// The section containing a global bar index, with its starting bar.
    pub fn section_at_bar(&self, bar: u32) -> Option<(&Section, u32)> {
        let mut start = 0u32;
        for section in &self.sections {
            if bar < start + section.length_bars {
                return Some((section, start));
            }
            start += section.length_bars;
        }
        None
    }

    /// Chord symbol sounding at a global bar index.
    pub fn chord_symbol_at_bar(&self, bar: u32) -> Option<&str> {
        let (section, start) = self.section_at_bar(bar)?;
        self.harmony
            .get(&section.name)
            .and_then(|row| row.get((bar - start) as usize))
            .map(String::as_str)
    }

    /// Chord symbols for every bar of the song, in order.
    pub fn harmony_timeline(&self) -> Vec<&str> {
        let mut out = Vec::with_capacity(self.total_bars() as usize);
        for section in &self.sections {
            if let Some(row) = self.harmony.get(&section.name) {
                out.extend(row.iter().map(String::as_str));
            }
        }
        out
    }

    /// Whether a global bar is a declared cadence, and of which kind.
    pub fn cadence_at_bar(&self, bar: u32) -> Option<CadenceKind> {
        self.cadences
            .iter()
            .find(|c| c.bar == bar)
            .map(|c| c.kind)
    }
}

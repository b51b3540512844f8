//! Cadenza — a deterministic, offline procedural music composition and
//! audio rendering engine.
//!
//! Given a declarative [`SongSpec`] and a seed, the pipeline generates
//! multi-instrument note stems, arranges them (cadence fills, looping to a
//! target duration, outros), applies humanized dynamics, renders notes to
//! audio via sample playback or synthesis, and mixes the result through a
//! per-track and master DSP chain into a reproducible stereo master.
//!
//! Every stage is a pure function of its inputs plus the seed: all
//! randomness derives from (seed, section, instrument) keyed streams, so
//! two runs with identical inputs produce bit-identical output.
//!
//! ```no_run
//! use cadenza::{SongSpec, MixConfig, StyleConfig, RenderAssets};
//!
//! # fn main() -> cadenza::Result<()> {
//! let mut spec = SongSpec::from_json(include_str!("../demos/song.json"))?;
//! let seed = spec.seed;
//! let stems = cadenza::generate(&spec, seed)?;
//! let stems = cadenza::arrange(&mut spec, stems, &StyleConfig::default(), seed)?;
//! let stems = cadenza::apply_dynamics(&spec, stems, seed)?;
//! let audio = cadenza::render(&stems, 44_100, &RenderAssets::synth_default())?;
//! let master = cadenza::mix(audio, 44_100, &MixConfig::default())?;
//! # Ok(())
//! # }
//! ```

pub mod arrange;
pub mod dynamics;
pub mod error;
pub mod eval;
pub mod hash;
pub mod io;
pub mod mix;
pub mod pattern;
pub mod phrase;
pub mod render;
pub mod rng;
pub mod song;
pub mod stem;
pub mod theory;

pub use arrange::arrange;
pub use dynamics::apply_dynamics;
pub use error::{Error, Result};
pub use hash::{render_hash, RenderHashInput};
pub use mix::mix;
pub use phrase::{PhraseError, PhraseGenerator, PhraseRequest};
pub use render::{render, RenderAssets};
pub use song::{MixConfig, SongSpec, StyleConfig};
pub use stem::{build_stems_for_song, Instrument, Note, Stems};

/// Generate per-instrument stems from a spec and seed.
pub fn generate(spec: &SongSpec, seed: u64) -> Result<Stems> {
    stem::build_stems_for_song(spec, seed)
}

/// Like [`generate`], with an injected phrase strategy that may replace the
/// algorithmic generator per (instrument, section) and falls back on error.
pub fn generate_with_strategy(
    spec: &SongSpec,
    seed: u64,
    strategy: Option<&dyn PhraseGenerator>,
) -> Result<Stems> {
    stem::build::build_stems_with_strategy(spec, seed, strategy)
}

//! Crate-wide error type.

use crate::stem::Instrument;

/// All failure modes of the composition and rendering pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A song spec failed validation. Never auto-corrected.
    #[error("invalid song spec: {0}")]
    SpecValidation(String),

    /// A meter string could not be parsed as "N/D" with positive integers.
    #[error("malformed meter string {0:?}: expected \"N/D\" with positive integers")]
    Meter(String),

    /// A chord symbol was not recognized.
    #[error("unrecognized chord symbol {0:?}")]
    ChordParse(String),

    /// No harmony row exists for the named section.
    #[error("section {0:?} has no harmony row")]
    MissingHarmony(String),

    /// A pitch had no matching sample region.
    #[error("{instrument}: no sample region covers pitch {pitch}")]
    NoRegionForPitch { instrument: Instrument, pitch: u8 },

    /// Instrument assets were missing or failed to load.
    #[error("{instrument}: missing or invalid assets: {detail}")]
    MissingAssets { instrument: Instrument, detail: String },

    /// An instrument definition file was malformed.
    #[error("instrument definition error: {0}")]
    InstrumentDef(String),

    /// A mix configuration value was out of its documented range.
    #[error("invalid mix config: {0}")]
    MixConfig(String),

    /// MIDI file import found no usable data or unsupported timing.
    #[error("MIDI import error: {0}")]
    MidiImport(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("MIDI file error: {0}")]
    Midi(#[from] midly::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

//! File interchange: WAV masters/stems and Standard MIDI Files.

pub mod midi;
pub mod wav;

pub use midi::{export_smf, import_smf, ImportedSong};
pub use wav::{write_master, write_stem};

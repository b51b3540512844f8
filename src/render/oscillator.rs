//! Oscillator primitives for the synth fallback renderer.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Selectable waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Saw,
    Pulse,
}

/// One sample of the given waveform at `phase` in [0, 1).
///
/// `pulse_width` only affects [`Waveform::Pulse`]; 0.5 is a square wave.
/// Returns a value in [-1, 1].
pub fn sample(waveform: Waveform, phase: f64, pulse_width: f64) -> f64 {
    match waveform {
        Waveform::Sine => (phase * 2.0 * PI).sin(),
        Waveform::Saw => 2.0 * phase - 1.0,
        Waveform::Pulse => {
            if phase < pulse_width.clamp(0.01, 0.99) {
                1.0
            } else {
                -1.0
            }
        }
    }
}

/// MIDI note number to frequency, A4 (69) = 440 Hz.
pub fn midi_to_freq(note: u8) -> f64 {
    440.0 * 2.0f64.powf((note as f64 - 69.0) / 12.0)
}

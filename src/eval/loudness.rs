//! Loudness measurement: sample peak, RMS, and a simplified K-weighted
//! gated LUFS (two-stage pre-filter, 400 ms windows at a 100 ms hop, −70
//! LUFS absolute gate).

use crate::mix::Biquad;

/// Loudness statistics over an interleaved stereo buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct LoudnessStats {
    /// Sample peak in dBFS.
    pub peak_dbfs: f64,
    /// Full-buffer RMS in dBFS.
    pub rms_dbfs: f64,
    /// Gated integrated loudness; `None` when every block gates out.
    pub lufs: Option<f64>,
}

const ABSOLUTE_GATE_LUFS: f64 = -70.0;
const BLOCK_SECS: f64 = 0.4;
const HOP_SECS: f64 = 0.1;

/// K-weighting: a +4 dB high shelf near 1.68 kHz followed by a high-pass
/// near 38 Hz, per channel.
fn k_weight(channel: &[f32], sample_rate: u32) -> Vec<f32> {
    let mut shelf = Biquad::high_shelf(sample_rate, 1681.97, 4.0, 0.707);
    let mut highpass = Biquad::high_pass(sample_rate, 38.13, 0.5);
    channel
        .iter()
        .map(|&s| highpass.process(shelf.process(s)))
        .collect()
}

/// Measure an interleaved stereo buffer.
pub fn measure(stereo: &[f32], sample_rate: u32) -> LoudnessStats {
    let frames = stereo.len() / 2;
    if frames == 0 {
        return LoudnessStats {
            peak_dbfs: f64::NEG_INFINITY,
            rms_dbfs: f64::NEG_INFINITY,
            lufs: None,
        };
    }

    let peak = stereo.iter().fold(0.0f64, |m, &s| m.max(s.abs() as f64));
    let sum_sq: f64 = stereo.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let rms = (sum_sq / stereo.len() as f64).sqrt();

    let left: Vec<f32> = stereo.iter().step_by(2).copied().collect();
    let right: Vec<f32> = stereo.iter().skip(1).step_by(2).copied().collect();
    let wl = k_weight(&left, sample_rate);
    let wr = k_weight(&right, sample_rate);

    let block = (BLOCK_SECS * sample_rate as f64) as usize;
    let hop = (HOP_SECS * sample_rate as f64) as usize;
    let mut gated_power = Vec::new();
    let mut start = 0usize;
    while start + block <= frames {
        let mut acc = 0.0f64;
        for i in start..start + block {
            acc += (wl[i] as f64).powi(2) + (wr[i] as f64).powi(2);
        }
        let mean_square = acc / block as f64;
        let block_lufs = -0.691 + 10.0 * mean_square.max(1e-12).log10();
        if block_lufs > ABSOLUTE_GATE_LUFS {
            gated_power.push(mean_square);
        }
        start += hop;
    }

    let lufs = if gated_power.is_empty() {
        None
    } else {
        let mean: f64 = gated_power.iter().sum::<f64>() / gated_power.len() as f64;
        Some(-0.691 + 10.0 * mean.log10())
    };

    LoudnessStats {
        peak_dbfs: 20.0 * peak.max(1e-10).log10(),
        rms_dbfs: 20.0 * rms.max(1e-10).log10(),
        lufs,
    }
}

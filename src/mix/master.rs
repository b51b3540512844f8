//! Master bus dynamics: normalized tanh saturation, an RMS-envelope
//! compressor with soft knee and optional lookahead, and an oversampled
//! true-peak limiter.
//!
//! All stages process interleaved stereo with a linked (max-of-channels)
//! detector.

use log::debug;

use crate::song::config::{CompressorConfig, LimiterConfig, SaturationConfig};

/// dB to linear amplitude.
pub fn db_to_lin(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Linear amplitude to dB, floored for silence.
pub fn lin_to_db(lin: f32) -> f32 {
    20.0 * lin.max(1e-10).log10()
}

/// Soft-clip the buffer with `tanh(drive·x)/tanh(drive)`. The normalization
/// keeps gain near unity at low drive.
pub fn saturate(buffer: &mut [f32], config: &SaturationConfig) {
    let drive = config.drive.max(1e-3);
    let norm = drive.tanh();
    for s in buffer.iter_mut() {
        *s = (*s * drive).tanh() / norm;
    }
}

/// RMS compressor over interleaved stereo.
///
/// The RMS envelope uses independent attack and release one-pole time
/// constants; gain reduction follows the standard dB-domain ratio with a
/// quadratic soft knee. With lookahead the dry signal is delayed so the
/// gain curve leads the audio it controls.
pub fn compress(buffer: &mut [f32], sample_rate: u32, config: &CompressorConfig) {
    if buffer.is_empty() {
        return;
    }
    let attack = coef(config.attack_ms, sample_rate);
    let release = coef(config.release_ms, sample_rate);
    let lookahead_frames = (config.lookahead_ms / 1000.0 * sample_rate as f32) as usize;

    let frames = buffer.len() / 2;
    let mut env_sq = 0.0f32;
    let mut gains = Vec::with_capacity(frames);
    let mut max_reduction = 0.0f32;

    for frame in 0..frames {
        let l = buffer[frame * 2];
        let r = buffer[frame * 2 + 1];
        let input_sq = (l * l).max(r * r);
        let c = if input_sq > env_sq { attack } else { release };
        env_sq = input_sq + c * (env_sq - input_sq);

        let level_db = lin_to_db(env_sq.sqrt());
        let over = level_db - config.threshold_db;
        let slope = 1.0 - 1.0 / config.ratio;
        let reduction_db = if config.knee_db > 0.0 && over.abs() < config.knee_db / 2.0 {
            let x = over + config.knee_db / 2.0;
            slope * x * x / (2.0 * config.knee_db)
        } else if over > 0.0 {
            slope * over
        } else {
            0.0
        };
        max_reduction = max_reduction.max(reduction_db);
        gains.push(db_to_lin(-reduction_db));
    }

    // Apply the gain curve to the (optionally delayed) dry signal.
    if lookahead_frames == 0 {
        for frame in 0..frames {
            buffer[frame * 2] *= gains[frame];
            buffer[frame * 2 + 1] *= gains[frame];
        }
    } else {
        let dry = buffer.to_vec();
        for frame in 0..frames {
            let src = frame.checked_sub(lookahead_frames);
            let (l, r) = match src {
                Some(s) => (dry[s * 2], dry[s * 2 + 1]),
                None => (0.0, 0.0),
            };
            buffer[frame * 2] = l * gains[frame];
            buffer[frame * 2 + 1] = r * gains[frame];
        }
    }
    debug!("compressor max reduction {max_reduction:.1} dB");
}

fn coef(ms: f32, sample_rate: u32) -> f32 {
    (-1.0 / (ms / 1000.0 * sample_rate as f32)).exp()
}

/// True-peak limit: upsample by linear interpolation, find the peak, and
/// scale the whole buffer down when it exceeds the linear ceiling. The
/// post-limit peak can never exceed the ceiling.
pub fn limit(buffer: &mut [f32], config: &LimiterConfig) {
    if buffer.is_empty() {
        return;
    }
    let ceiling = db_to_lin(config.ceiling_db);
    let oversample = config.oversample.max(1) as usize;

    let mut peak = 0.0f32;
    let frames = buffer.len() / 2;
    for ch in 0..2 {
        for frame in 0..frames {
            let a = buffer[frame * 2 + ch];
            let b = if frame + 1 < frames {
                buffer[(frame + 1) * 2 + ch]
            } else {
                a
            };
            for k in 0..oversample {
                let frac = k as f32 / oversample as f32;
                let v = a + (b - a) * frac;
                peak = peak.max(v.abs());
            }
        }
    }

    if peak > ceiling {
        let scale = ceiling / peak;
        for s in buffer.iter_mut() {
            *s *= scale;
        }
        debug!("limiter scaled by {scale:.3} (true peak {peak:.3})");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_sine(freq: f32, amp: f32, secs: f32, rate: u32) -> Vec<f32> {
        let frames = (secs * rate as f32) as usize;
        let mut out = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let s = amp * (i as f32 / rate as f32 * freq * std::f32::consts::TAU).sin();
            out.push(s);
            out.push(s);
        }
        out
    }

    #[test]
    fn db_conversions_round_trip() {
        for db in [-30.0f32, -6.0, 0.0, 3.0] {
            assert!((lin_to_db(db_to_lin(db)) - db).abs() < 1e-4);
        }
        assert!((db_to_lin(-6.0) - 0.5012).abs() < 1e-3);
    }

    #[test]
    fn saturation_preserves_low_levels_and_clips_high() {
        let cfg = SaturationConfig { drive: 0.2 };
        let mut quiet = vec![0.1f32; 4];
        saturate(&mut quiet, &cfg);
        assert!((quiet[0] - 0.1).abs() < 0.01, "low drive not near-unity");

        let hot_cfg = SaturationConfig { drive: 4.0 };
        let mut hot = vec![2.0f32; 4];
        saturate(&mut hot, &hot_cfg);
        assert!(hot[0].abs() <= 1.01, "tanh should bound output");
    }

    #[test]
    fn compressor_reduces_loud_material() {
        let cfg = CompressorConfig {
            threshold_db: -20.0,
            ratio: 4.0,
            attack_ms: 1.0,
            release_ms: 50.0,
            knee_db: 0.0,
            lookahead_ms: 0.0,
        };
        let mut loud = stereo_sine(440.0, 0.9, 0.5, 44100);
        let before: f32 = loud.iter().map(|s| s * s).sum();
        compress(&mut loud, 44100, &cfg);
        let after: f32 = loud.iter().map(|s| s * s).sum();
        assert!(after < before * 0.5, "no gain reduction applied");
    }

    #[test]
    fn compressor_leaves_quiet_material_alone() {
        let cfg = CompressorConfig {
            threshold_db: -6.0,
            ratio: 4.0,
            attack_ms: 5.0,
            release_ms: 50.0,
            knee_db: 0.0,
            lookahead_ms: 0.0,
        };
        let mut quiet = stereo_sine(440.0, 0.05, 0.2, 44100);
        let reference = quiet.clone();
        compress(&mut quiet, 44100, &cfg);
        for (a, b) in quiet.iter().zip(&reference) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn lookahead_delays_the_dry_signal() {
        let cfg = CompressorConfig {
            threshold_db: 0.0,
            ratio: 1.0,
            attack_ms: 1.0,
            release_ms: 50.0,
            knee_db: 0.0,
            lookahead_ms: 10.0,
        };
        // Ratio 1 means no gain change; only the delay remains.
        let mut buf = vec![0.0f32; 4410 * 2];
        buf[0] = 1.0;
        buf[1] = 1.0;
        compress(&mut buf, 44100, &cfg);
        let delay_frames = 441;
        assert_eq!(buf[0], 0.0);
        assert!((buf[delay_frames * 2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn soft_knee_is_gentler_than_hard_at_threshold() {
        let hard = CompressorConfig {
            threshold_db: -12.0,
            ratio: 4.0,
            attack_ms: 1.0,
            release_ms: 100.0,
            knee_db: 0.0,
            lookahead_ms: 0.0,
        };
        let soft = CompressorConfig {
            knee_db: 12.0,
            ..hard
        };
        // Signal sitting a hair above threshold.
        let mut a = stereo_sine(440.0, db_to_lin(-11.0), 0.5, 44100);
        let mut b = a.clone();
        compress(&mut a, 44100, &hard);
        compress(&mut b, 44100, &soft);
        let rms = |x: &[f32]| (x.iter().map(|s| s * s).sum::<f32>() / x.len() as f32).sqrt();
        // Hard knee bites harder right above threshold... the soft knee
        // splits the difference across the knee width.
        assert!(rms(&b) < rms(&a) * 1.02 && rms(&b) > rms(&a) * 0.7);
    }

    #[test]
    fn limiter_enforces_ceiling() {
        let cfg = LimiterConfig {
            ceiling_db: -1.0,
            oversample: 4,
        };
        let mut hot = stereo_sine(1000.0, 3.0, 0.2, 44100);
        limit(&mut hot, &cfg);
        let ceiling = db_to_lin(-1.0);
        let peak = hot.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak <= ceiling + 1e-6, "peak {peak} over {ceiling}");
    }

    #[test]
    fn limiter_passes_quiet_signals_untouched() {
        let cfg = LimiterConfig {
            ceiling_db: -0.3,
            oversample: 4,
        };
        let mut quiet = stereo_sine(1000.0, 0.25, 0.1, 44100);
        let reference = quiet.clone();
        limit(&mut quiet, &cfg);
        assert_eq!(quiet, reference);
    }

    #[test]
    fn limiter_catches_intersample_peaks() {
        // Alternating near-full-scale samples have inter-sample peaks above
        // the sampled peak; oversampling must still catch the sampled ones.
        let cfg = LimiterConfig {
            ceiling_db: -3.0,
            oversample: 8,
        };
        let mut buf: Vec<f32> = (0..2000)
            .map(|i| if i % 2 == 0 { 0.99 } else { -0.99 })
            .collect();
        limit(&mut buf, &cfg);
        let peak = buf.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak <= db_to_lin(-3.0) + 1e-6);
    }
}

//! Mixer — per-track strips (gain, EQ, chorus, constant-power pan, reverb
//! send), the shared reverb bus, and the master chain (headroom trim,
//! saturation, compressor, true-peak limiter).
//!
//! Consumes owned per-instrument mono buffers and produces one interleaved
//! stereo master of the same frame count.

pub mod chorus;
pub mod eq;
pub mod master;
pub mod reverb;

pub use chorus::Chorus;
pub use eq::Biquad;
pub use master::{compress, db_to_lin, limit, lin_to_db, saturate};
pub use reverb::Reverb;

use std::collections::BTreeMap;

use log::warn;

use crate::error::Result;
use crate::song::MixConfig;
use crate::stem::Instrument;

/// Mix per-instrument buffers down to an interleaved stereo master.
pub fn mix(
    tracks: BTreeMap<Instrument, Vec<f32>>,
    sample_rate: u32,
    config: &MixConfig,
) -> Result<Vec<f32>> {
    config.validate()?;
    let frames = tracks.values().map(Vec::len).max().unwrap_or(0);
    if frames == 0 {
        return Ok(Vec::new());
    }

    let mut bus = vec![0.0f32; frames * 2];
    let mut reverb_in = vec![0.0f32; frames];
    let mut pre_sum_peak = 0.0f32;

    for (instrument, mut buffer) in tracks {
        let strip = config.track_for(instrument);

        let gain = db_to_lin(strip.gain_db);
        for s in buffer.iter_mut() {
            *s *= gain;
        }
        if let Some(eq_config) = &strip.eq {
            Biquad::from_config(sample_rate, eq_config).process_buffer(&mut buffer);
        }
        if let Some(chorus_config) = &strip.chorus {
            Chorus::new(sample_rate, chorus_config).process_buffer(&mut buffer);
        }

        pre_sum_peak += buffer.iter().fold(0.0f32, |m, s| m.max(s.abs()));

        // Constant-power pan: equal loudness across the stereo field.
        let angle = (strip.pan + 1.0) * std::f32::consts::FRAC_PI_4;
        let (left, right) = (angle.cos(), angle.sin());
        for (i, s) in buffer.iter().enumerate() {
            bus[i * 2] += s * left;
            bus[i * 2 + 1] += s * right;
            reverb_in[i] += s * strip.reverb_send;
        }
    }

    if config.reverb.wet > 0.0 && reverb_in.iter().any(|&s| s != 0.0) {
        let mut reverb = Reverb::new(sample_rate, &config.reverb);
        let wet = reverb.process_buffer(&reverb_in);
        for (i, w) in wet.iter().enumerate() {
            bus[i * 2] += w * config.reverb.wet;
            bus[i * 2 + 1] += w * config.reverb.wet;
        }
    }

    // Headroom trim from the pre-sum peak estimate: the sum of track peaks
    // bounds the bus peak from above.
    if let Some(headroom_db) = config.master.headroom_db {
        let target = db_to_lin(-headroom_db);
        if pre_sum_peak > target {
            let trim = target / pre_sum_peak;
            for s in bus.iter_mut() {
                *s *= trim;
            }
        }
    }

    if let Some(saturation) = &config.master.saturation {
        saturate(&mut bus, saturation);
    }
    if let Some(compressor) = &config.master.compressor {
        compress(&mut bus, sample_rate, compressor);
    }
    limit(&mut bus, &config.master.limiter);

    if bus.iter().any(|s| !s.is_finite()) {
        warn!("master bus went non-finite; substituting silence");
        bus = vec![0.0; frames * 2];
    }
    Ok(bus)
}

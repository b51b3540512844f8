//! Two-voice chorus — modulated delay lines with LFOs 180° out of phase.

use std::f64::consts::TAU;

use crate::song::config::ChorusConfig;

/// Center delay around which the LFO modulates.
const BASE_DELAY_MS: f64 = 15.0;

/// Stereo-less (mono in, mono out) chorus; the mixer pans afterwards.
pub struct Chorus {
    buffer: Vec<f32>,
    write: usize,
    phase: f64,
    phase_inc: f64,
    base_samples: f64,
    depth_samples: f64,
    mix: f32,
}

impl Chorus {
    pub fn new(sample_rate: u32, config: &ChorusConfig) -> Self {
        let base_samples = BASE_DELAY_MS / 1000.0 * sample_rate as f64;
        let depth_samples = config.depth_ms as f64 / 1000.0 * sample_rate as f64;
        // Room for base + depth + interpolation slack.
        let capacity = (base_samples + depth_samples).ceil() as usize + 4;
        Self {
            buffer: vec![0.0; capacity],
            write: 0,
            phase: 0.0,
            phase_inc: config.rate_hz as f64 / sample_rate as f64,
            base_samples,
            depth_samples,
            mix: config.mix,
        }
    }

    /// Read the delay line `delay` samples behind the write head.
    fn tap(&self, delay: f64) -> f32 {
        let len = self.buffer.len() as f64;
        let pos = (self.write as f64 - delay + len) % len;
        let idx = pos as usize;
        let frac = (pos - idx as f64) as f32;
        let a = self.buffer[idx];
        let b = self.buffer[(idx + 1) % self.buffer.len()];
        a * (1.0 - frac) + b * frac
    }

    pub fn process(&mut self, input: f32) -> f32 {
        self.buffer[self.write] = input;

        let lfo = (self.phase * TAU).sin();
        // Second voice runs half a cycle behind the first.
        let delay_a = self.base_samples + self.depth_samples * lfo;
        let delay_b = self.base_samples - self.depth_samples * lfo;
        let wet = 0.5 * (self.tap(delay_a) + self.tap(delay_b));

        self.write = (self.write + 1) % self.buffer.len();
        self.phase += self.phase_inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        input * (1.0 - self.mix) + wet * self.mix
    }

    pub fn process_buffer(&mut self, buffer: &mut [f32]) {
        for s in buffer.iter_mut() {
            *s = self.process(*s);
        }
    }
}

//! Synth fallback renderer — oscillator + ADSR + cascaded one-pole low-pass
//! stages, plus a seeded synthetic drum kit so drum stems render without
//! sample assets.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::envelope::Adsr;
use super::oscillator::{midi_to_freq, sample as osc_sample, Waveform};
use crate::pattern::drums;

/// A subtractive synth voice definition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynthPatch {
    pub waveform: Waveform,
    #[serde(default = "default_pulse_width")]
    pub pulse_width: f64,
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
    /// Cascaded one-pole low-pass stages: 2 ≈ 12 dB/oct, 4 ≈ 24 dB/oct.
    pub filter_stages: u32,
    /// Cutoff floor in Hz.
    pub cutoff_hz: f64,
    /// Extra cutoff in Hz at full velocity.
    pub cutoff_vel_hz: f64,
    /// Fraction of the note's fundamental added to the cutoff.
    #[serde(default)]
    pub key_track: f64,
}

fn default_pulse_width() -> f64 {
    0.5
}

impl SynthPatch {
    /// Round saw bass with a closed filter at low velocity.
    pub fn bass() -> Self {
        Self {
            waveform: Waveform::Saw,
            pulse_width: 0.5,
            attack: 0.004,
            decay: 0.08,
            sustain: 0.75,
            release: 0.1,
            filter_stages: 4,
            cutoff_hz: 180.0,
            cutoff_vel_hz: 1400.0,
            key_track: 0.5,
        }
    }

    /// Hollow pulse for comping keys.
    pub fn keys() -> Self {
        Self {
            waveform: Waveform::Pulse,
            pulse_width: 0.35,
            attack: 0.002,
            decay: 0.12,
            sustain: 0.55,
            release: 0.15,
            filter_stages: 2,
            cutoff_hz: 500.0,
            cutoff_vel_hz: 3500.0,
            key_track: 1.0,
        }
    }

    /// Slow sine-ish pad.
    pub fn pads() -> Self {
        Self {
            waveform: Waveform::Saw,
            pulse_width: 0.5,
            attack: 0.25,
            decay: 0.3,
            sustain: 0.8,
            release: 0.4,
            filter_stages: 2,
            cutoff_hz: 300.0,
            cutoff_vel_hz: 900.0,
            key_track: 0.25,
        }
    }

    fn adsr(&self) -> Adsr {
        Adsr {
            attack: self.attack,
            decay: self.decay,
            sustain: self.sustain,
            release: self.release,
        }
    }

    /// Render one note to a mono buffer including the release tail.
    pub fn render_note(&self, pitch: u8, velocity: u8, dur: f64, sample_rate: u32) -> Vec<f32> {
        let env = self.adsr().fitted(dur);
        let total = env.total_duration(dur);
        let num_samples = (total * sample_rate as f64).ceil() as usize;
        let freq = midi_to_freq(pitch);
        let vel_norm = velocity as f64 / 127.0;

        let cutoff =
            (self.cutoff_hz + self.cutoff_vel_hz * vel_norm + self.key_track * freq)
                .min(sample_rate as f64 * 0.45);
        let pole = (-2.0 * std::f64::consts::PI * cutoff / sample_rate as f64).exp();
        let stages = self.filter_stages.clamp(1, 4) as usize;
        let mut state = [0.0f64; 4];

        let mut out = Vec::with_capacity(num_samples);
        let mut phase = 0.0f64;
        for i in 0..num_samples {
            let t = i as f64 / sample_rate as f64;
            let mut s = osc_sample(self.waveform, phase, self.pulse_width);
            phase += freq / sample_rate as f64;
            if phase >= 1.0 {
                phase -= 1.0;
            }
            for stage in state.iter_mut().take(stages) {
                s = (1.0 - pole) * s + pole * *stage;
                *stage = s;
            }
            out.push((s * env.amplitude(t, dur) * vel_norm) as f32);
        }
        out
    }
}

/// Seeded synthetic drum kit: one generator per supported percussion pitch.
#[derive(Debug, Clone, Copy)]
pub struct SynthDrumKit {
    seed: u64,
}

impl SynthDrumKit {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Whether this kit can voice the given percussion pitch.
    pub fn supports(&self, pitch: u8) -> bool {
        matches!(
            pitch,
            drums::KICK
                | drums::SNARE
                | drums::CLOSED_HAT
                | drums::OPEN_HAT
                | drums::TOM_LOW
                | drums::TOM_MID
                | drums::TOM_HIGH
                | drums::CRASH
                | drums::SWEEP
        )
    }

    /// Render a one-shot hit for a percussion pitch, velocity-scaled.
    pub fn render_hit(&self, pitch: u8, velocity: u8, sample_rate: u32) -> Option<Vec<f32>> {
        let rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(pitch as u64));
        let vel = velocity as f32 / 127.0;
        let mut buf = match pitch {
            drums::KICK => kick(sample_rate),
            drums::SNARE => snare(sample_rate, rng),
            drums::CLOSED_HAT => hat(sample_rate, rng, 0.06),
            drums::OPEN_HAT => hat(sample_rate, rng, 0.25),
            drums::TOM_LOW => tom(sample_rate, 95.0),
            drums::TOM_MID => tom(sample_rate, 130.0),
            drums::TOM_HIGH => tom(sample_rate, 170.0),
            drums::CRASH => crash(sample_rate, rng),
            drums::SWEEP => sweep(sample_rate, rng),
            _ => return None,
        };
        for s in buf.iter_mut() {
            *s *= vel;
        }
        Some(buf)
    }
}

impl Default for SynthDrumKit {
    fn default() -> Self {
        Self::new(0x5EED_D2C3)
    }
}

/// Sine kick: exponential pitch sweep 160→45 Hz with fast amplitude decay.
fn kick(sample_rate: u32) -> Vec<f32> {
    let dur = 0.28;
    let n = (sample_rate as f64 * dur) as usize;
    let mut out = Vec::with_capacity(n);
    let mut phase = 0.0f64;
    for i in 0..n {
        let norm = i as f64 / n as f64;
        let freq = 45.0 + 115.0 * (-norm * 9.0).exp();
        let amp = (-norm * 8.0).exp();
        phase += freq / sample_rate as f64;
        out.push(((phase * std::f64::consts::TAU).sin() * amp) as f32);
    }
    out
}

/// Snare: 190 Hz sine body plus faster-decaying seeded noise.
fn snare(sample_rate: u32, mut rng: ChaCha8Rng) -> Vec<f32> {
    let dur = 0.18;
    let n = (sample_rate as f64 * dur) as usize;
    let mut out = Vec::with_capacity(n);
    let mut phase = 0.0f64;
    for i in 0..n {
        let norm = i as f64 / n as f64;
        phase += 190.0 / sample_rate as f64;
        let body = (phase * std::f64::consts::TAU).sin() * (-norm * 14.0).exp();
        let noise: f64 = rng.gen_range(-1.0..1.0) * (-norm * 10.0).exp();
        out.push((body * 0.45 + noise * 0.55) as f32);
    }
    out
}

/// Hi-hat: high-passed seeded noise with a fast decay.
fn hat(sample_rate: u32, mut rng: ChaCha8Rng, dur: f64) -> Vec<f32> {
    let n = (sample_rate as f64 * dur) as usize;
    let mut out = Vec::with_capacity(n);
    let mut prev_in = 0.0f64;
    let mut prev_out = 0.0f64;
    for i in 0..n {
        let norm = i as f64 / n as f64;
        let noise: f64 = rng.gen_range(-1.0..1.0);
        // One-pole high-pass keeps only the sizzle.
        let hp = 0.86 * (prev_out + noise - prev_in);
        prev_in = noise;
        prev_out = hp;
        out.push((hp * (-norm * 12.0).exp()) as f32);
    }
    out
}

/// Tom: pitched sine body with a medium decay.
fn tom(sample_rate: u32, freq: f64) -> Vec<f32> {
    let dur = 0.3;
    let n = (sample_rate as f64 * dur) as usize;
    let mut out = Vec::with_capacity(n);
    let mut phase = 0.0f64;
    for i in 0..n {
        let norm = i as f64 / n as f64;
        let f = freq * (1.0 - 0.15 * norm);
        phase += f / sample_rate as f64;
        out.push(((phase * std::f64::consts::TAU).sin() * (-norm * 7.0).exp()) as f32);
    }
    out
}

/// Crash: long bright noise decay.
fn crash(sample_rate: u32, mut rng: ChaCha8Rng) -> Vec<f32> {
    let dur = 1.4;
    let n = (sample_rate as f64 * dur) as usize;
    let mut out = Vec::with_capacity(n);
    let mut prev_in = 0.0f64;
    let mut prev_out = 0.0f64;
    for i in 0..n {
        let norm = i as f64 / n as f64;
        let noise: f64 = rng.gen_range(-1.0..1.0);
        let hp = 0.7 * (prev_out + noise - prev_in);
        prev_in = noise;
        prev_out = hp;
        out.push((hp * (-norm * 4.0).exp()) as f32);
    }
    out
}

/// Reverse sweep: noise riser with a rising amplitude and opening filter.
fn sweep(sample_rate: u32, mut rng: ChaCha8Rng) -> Vec<f32> {
    let dur = 1.6;
    let n = (sample_rate as f64 * dur) as usize;
    let mut out = Vec::with_capacity(n);
    let mut state = 0.0f64;
    for i in 0..n {
        let norm = i as f64 / n as f64;
        let noise: f64 = rng.gen_range(-1.0..1.0);
        // Low-pass that opens as the sweep builds.
        let pole = 0.99 - 0.6 * norm;
        state = pole * state + (1.0 - pole) * noise;
        out.push((state * norm * norm) as f32);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_length_includes_release() {
        let patch = SynthPatch::bass();
        let buf = patch.render_note(40, 100, 0.5, 44100);
        let expected = ((0.5 + patch.release) * 44100.0).ceil() as usize;
        assert_eq!(buf.len(), expected);
    }

    #[test]
    fn short_note_compresses_envelope_not_zero_length() {
        let patch = SynthPatch::pads(); // a+d+r = 0.95 s
        let buf = patch.render_note(60, 90, 0.1, 44100);
        assert!(!buf.is_empty());
        // Total length scales with the fitted release, under a+d+r.
        assert!(buf.len() < (0.95 * 44100.0) as usize);
    }

    #[test]
    fn output_is_finite_and_bounded() {
        for patch in [SynthPatch::bass(), SynthPatch::keys(), SynthPatch::pads()] {
            let buf = patch.render_note(52, 127, 0.5, 44100);
            for s in &buf {
                assert!(s.is_finite());
                assert!(s.abs() <= 1.0 + 1e-3);
            }
        }
    }

    #[test]
    fn velocity_scales_amplitude() {
        let patch = SynthPatch::keys();
        let loud = SynthPatch::render_note(&patch, 60, 127, 0.3, 44100);
        let soft = SynthPatch::render_note(&patch, 60, 40, 0.3, 44100);
        let peak = |b: &[f32]| b.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak(&loud) > peak(&soft) * 1.5);
    }

    #[test]
    fn higher_velocity_opens_the_filter() {
        // More high-frequency energy at high velocity: compare the energy of
        // the first-difference signal (a crude high-pass).
        let patch = SynthPatch::bass();
        let hf_energy = |buf: &[f32]| -> f32 {
            let peak = buf.iter().fold(0.0f32, |m, s| m.max(s.abs())).max(1e-12);
            buf.windows(2)
                .map(|w| ((w[1] - w[0]) / peak).powi(2))
                .sum()
        };
        let bright = patch.render_note(40, 127, 0.5, 44100);
        let dark = patch.render_note(40, 20, 0.5, 44100);
        assert!(hf_energy(&bright) > hf_energy(&dark));
    }

    #[test]
    fn drum_kit_supports_all_engine_pitches() {
        let kit = SynthDrumKit::default();
        for pitch in [
            drums::KICK,
            drums::SNARE,
            drums::CLOSED_HAT,
            drums::OPEN_HAT,
            drums::TOM_LOW,
            drums::TOM_MID,
            drums::TOM_HIGH,
            drums::CRASH,
            drums::SWEEP,
        ] {
            assert!(kit.supports(pitch));
            let hit = kit.render_hit(pitch, 100, 44100).unwrap();
            assert!(!hit.is_empty());
            assert!(hit.iter().all(|s| s.is_finite()));
        }
        assert!(!kit.supports(60));
        assert!(kit.render_hit(60, 100, 44100).is_none());
    }

    #[test]
    fn drum_hits_are_deterministic() {
        let kit = SynthDrumKit::default();
        assert_eq!(
            kit.render_hit(drums::SNARE, 100, 44100),
            kit.render_hit(drums::SNARE, 100, 44100)
        );
    }

    #[test]
    fn open_hat_rings_longer_than_closed() {
        let kit = SynthDrumKit::default();
        let closed = kit.render_hit(drums::CLOSED_HAT, 100, 44100).unwrap();
        let open = kit.render_hit(drums::OPEN_HAT, 100, 44100).unwrap();
        assert!(open.len() > closed.len() * 2);
    }
}

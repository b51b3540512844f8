//! Shared plate reverb bus — parallel damped comb filters into series
//! all-pass diffusers, with optional input predelay.

use crate::song::config::ReverbConfig;

/// Comb delay lengths in samples at the 44.1 kHz reference rate. Chosen
/// co-prime-ish so resonances do not stack.
const COMB_TUNINGS: [usize; 4] = [1116, 1188, 1277, 1356];
const ALLPASS_TUNINGS: [usize; 2] = [556, 441];
const ALLPASS_GAIN: f32 = 0.5;

struct Comb {
    buffer: Vec<f32>,
    pos: usize,
    feedback: f32,
    damping: f32,
    filter_state: f32,
}

impl Comb {
    fn new(len: usize, feedback: f32, damping: f32) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            pos: 0,
            feedback,
            damping,
            filter_state: 0.0,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let out = self.buffer[self.pos];
        // One-pole damping inside the feedback path.
        self.filter_state = out * (1.0 - self.damping) + self.filter_state * self.damping;
        self.buffer[self.pos] = input + self.filter_state * self.feedback;
        self.pos = (self.pos + 1) % self.buffer.len();
        out
    }
}

struct AllPass {
    buffer: Vec<f32>,
    pos: usize,
}

impl AllPass {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            pos: 0,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.pos];
        let out = delayed - input;
        self.buffer[self.pos] = input + delayed * ALLPASS_GAIN;
        self.pos = (self.pos + 1) % self.buffer.len();
        out
    }
}

/// The reverb bus: feed it the summed sends, read back the wet signal.
pub struct Reverb {
    predelay: Vec<f32>,
    predelay_pos: usize,
    combs: Vec<Comb>,
    allpasses: Vec<AllPass>,
}

impl Reverb {
    pub fn new(sample_rate: u32, config: &ReverbConfig) -> Self {
        let scale = sample_rate as f64 / 44100.0;
        // Map room size onto comb feedback, capped below self-oscillation.
        let feedback = (0.7 + 0.28 * config.room_size).min(0.98);

        let combs = COMB_TUNINGS
            .iter()
            .map(|&len| {
                Comb::new(
                    (len as f64 * scale).round() as usize,
                    feedback,
                    config.damping,
                )
            })
            .collect();
        let allpasses = ALLPASS_TUNINGS
            .iter()
            .map(|&len| AllPass::new((len as f64 * scale).round() as usize))
            .collect();

        let predelay_len = (config.predelay_ms as f64 / 1000.0 * sample_rate as f64) as usize;
        Self {
            predelay: vec![0.0; predelay_len.max(1)],
            predelay_pos: 0,
            combs,
            allpasses,
        }
    }

    /// One wet output sample for one input sample. The caller applies the
    /// wet return level.
    pub fn process(&mut self, input: f32) -> f32 {
        let delayed = self.predelay[self.predelay_pos];
        self.predelay[self.predelay_pos] = input;
        self.predelay_pos = (self.predelay_pos + 1) % self.predelay.len();

        let mut acc = 0.0f32;
        for comb in self.combs.iter_mut() {
            acc += comb.process(delayed);
        }
        acc /= self.combs.len() as f32;

        for allpass in self.allpasses.iter_mut() {
            acc = allpass.process(acc);
        }
        acc
    }

    /// Render a whole send buffer to a wet buffer of the same length.
    pub fn process_buffer(&mut self, input: &[f32]) -> Vec<f32> {
        input.iter().map(|&s| self.process(s)).collect()
    }
}

//! ADSR amplitude envelope.

/// Attack-Decay-Sustain-Release envelope. Times in seconds, sustain a level
/// in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adsr {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl Adsr {
    /// Scale segment lengths down proportionally when attack + decay +
    /// release exceed the note length, so the shape survives short notes.
    pub fn fitted(&self, note_dur: f64) -> Adsr {
        let fixed = self.attack + self.decay + self.release;
        if fixed <= note_dur || fixed <= 0.0 {
            return *self;
        }
        let scale = note_dur / fixed;
        Adsr {
            attack: self.attack * scale,
            decay: self.decay * scale,
            sustain: self.sustain,
            release: self.release * scale,
        }
    }

    /// Amplitude at `t` seconds into a note that is held for `note_dur`.
    /// The release tail runs in `[note_dur, note_dur + release)`.
    pub fn amplitude(&self, t: f64, note_dur: f64) -> f64 {
        if t < 0.0 {
            return 0.0;
        }
        if t < self.attack {
            if self.attack <= 0.0 {
                1.0
            } else {
                t / self.attack
            }
        } else if t < self.attack + self.decay {
            if self.decay <= 0.0 {
                self.sustain
            } else {
                let x = (t - self.attack) / self.decay;
                1.0 - x * (1.0 - self.sustain)
            }
        } else if t < note_dur {
            self.sustain
        } else if t < note_dur + self.release {
            if self.release <= 0.0 {
                0.0
            } else {
                let x = (t - note_dur) / self.release;
                self.sustain * (1.0 - x)
            }
        } else {
            0.0
        }
    }

    /// Sounding length of a note including the release tail.
    pub fn total_duration(&self, note_dur: f64) -> f64 {
        note_dur + self.release
    }
}

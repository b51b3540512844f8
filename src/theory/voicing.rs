//! SATB voice leading.
//!
//! For each chord step, every octave placement of each chord tone inside a
//! voice's range is a candidate. The chosen arrangement minimizes total
//! absolute semitone movement from the previous step; ties prefer the most
//! compact voicing (smallest soprano−bass span). Voices never cross, and
//! the upper three voices stay strictly ascending so a voicing can never
//! collapse into unisons. The bass always sings the chord root.

use super::Chord;

/// Inclusive pitch ranges per voice, low to high.
pub const BASS_RANGE: (u8, u8) = (40, 60);
pub const TENOR_RANGE: (u8, u8) = (48, 69);
pub const ALTO_RANGE: (u8, u8) = (55, 77);
pub const SOPRANO_RANGE: (u8, u8) = (60, 81);

/// Four parallel voice lines, one pitch per chord step.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VoiceLines {
    pub bass: Vec<u8>,
    pub tenor: Vec<u8>,
    pub alto: Vec<u8>,
    pub soprano: Vec<u8>,
}

impl VoiceLines {
    /// Number of chord steps.
    pub fn len(&self) -> usize {
        self.bass.len()
    }

    /// Whether there are no steps.
    pub fn is_empty(&self) -> bool {
        self.bass.is_empty()
    }

    /// The [bass, tenor, alto, soprano] voicing at a step.
    pub fn voicing_at(&self, step: usize) -> [u8; 4] {
        [
            self.bass[step],
            self.tenor[step],
            self.alto[step],
            self.soprano[step],
        ]
    }

    /// Voices ordered top-down: soprano, alto, tenor, bass.
    pub fn top_down(&self, step: usize) -> [u8; 4] {
        let [b, t, a, s] = self.voicing_at(step);
        [s, a, t, b]
    }

    /// Mean absolute semitone movement across all voices and steps.
    pub fn smoothness(&self) -> f64 {
        if self.len() < 2 {
            return 0.0;
        }
        let mut total = 0u64;
        let mut count = 0u64;
        for line in [&self.bass, &self.tenor, &self.alto, &self.soprano] {
            for pair in line.windows(2) {
                total += (pair[1] as i64 - pair[0] as i64).unsigned_abs();
                count += 1;
            }
        }
        total as f64 / count as f64
    }
}

/// Octave placements of the given pitch classes within an inclusive range.
fn candidates(pitch_classes: &[u8], range: (u8, u8)) -> Vec<u8> {
    (range.0..=range.1)
        .filter(|p| pitch_classes.contains(&(p % 12)))
        .collect()
}

/// Voice-lead a chord progression into four SATB lines.
pub fn generate_satb(chords: &[Chord]) -> VoiceLines {
    let mut lines = VoiceLines::default();
    let mut prev: Option<[u8; 4]> = None;

    for chord in chords {
        let pcs = chord.pitch_classes();
        let root_pc = [chord.root % 12];
        let bass_cands = candidates(&root_pc, BASS_RANGE);
        let tenor_cands = candidates(&pcs, TENOR_RANGE);
        let alto_cands = candidates(&pcs, ALTO_RANGE);
        let soprano_cands = candidates(&pcs, SOPRANO_RANGE);

        let mut best: Option<([u8; 4], u32, u8)> = None;
        for &b in &bass_cands {
            for &t in tenor_cands.iter().filter(|&&t| t >= b) {
                for &a in alto_cands.iter().filter(|&&a| a > t) {
                    for &s in soprano_cands.iter().filter(|&&s| s > a) {
                        let voicing = [b, t, a, s];
                        let movement = match prev {
                            Some(p) => voicing
                                .iter()
                                .zip(p.iter())
                                .map(|(&x, &y)| (x as i32 - y as i32).unsigned_abs())
                                .sum(),
                            None => 0,
                        };
                        let span = s - b;
                        let better = match &best {
                            None => true,
                            Some((_, m, sp)) => {
                                movement < *m || (movement == *m && span < *sp)
                            }
                        };
                        if better {
                            best = Some((voicing, movement, span));
                        }
                    }
                }
            }
        }

        // Every chord has a root placement in the bass range and tones in the
        // upper ranges, so a voicing always exists.
        let (voicing, _, _) = best.expect("chord has no candidates in voice ranges");
        lines.bass.push(voicing[0]);
        lines.tenor.push(voicing[1]);
        lines.alto.push(voicing[2]);
        lines.soprano.push(voicing[3]);
        prev = Some(voicing);
    }

    lines
}

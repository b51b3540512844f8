//! RBJ-cookbook biquad filters: peaking and shelving EQ plus the high-pass
//! used by the loudness meter.

use crate::song::config::{EqConfig, EqKind};

/// Two-pole/two-zero filter with transposed direct-form-I state.
/// Coefficients are normalized by `a0`; state runs in f64 to keep low-
/// frequency shelves stable.
#[derive(Debug, Clone)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    fn from_raw(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Peaking EQ centered at `freq_hz`.
    pub fn peaking(sample_rate: u32, freq_hz: f32, gain_db: f32, q: f32) -> Self {
        let a = 10f64.powf(gain_db as f64 / 40.0);
        let w0 = 2.0 * std::f64::consts::PI * freq_hz as f64 / sample_rate as f64;
        let alpha = w0.sin() / (2.0 * q as f64);
        let cos = w0.cos();
        Self::from_raw(
            1.0 + alpha * a,
            -2.0 * cos,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos,
            1.0 - alpha / a,
        )
    }

    /// Low shelf with corner at `freq_hz`.
    pub fn low_shelf(sample_rate: u32, freq_hz: f32, gain_db: f32, q: f32) -> Self {
        let a = 10f64.powf(gain_db as f64 / 40.0);
        let w0 = 2.0 * std::f64::consts::PI * freq_hz as f64 / sample_rate as f64;
        let alpha = w0.sin() / (2.0 * q as f64);
        let cos = w0.cos();
        let sq = 2.0 * a.sqrt() * alpha;
        Self::from_raw(
            a * ((a + 1.0) - (a - 1.0) * cos + sq),
            2.0 * a * ((a - 1.0) - (a + 1.0) * cos),
            a * ((a + 1.0) - (a - 1.0) * cos - sq),
            (a + 1.0) + (a - 1.0) * cos + sq,
            -2.0 * ((a - 1.0) + (a + 1.0) * cos),
            (a + 1.0) + (a - 1.0) * cos - sq,
        )
    }

    /// High shelf with corner at `freq_hz`.
    pub fn high_shelf(sample_rate: u32, freq_hz: f32, gain_db: f32, q: f32) -> Self {
        let a = 10f64.powf(gain_db as f64 / 40.0);
        let w0 = 2.0 * std::f64::consts::PI * freq_hz as f64 / sample_rate as f64;
        let alpha = w0.sin() / (2.0 * q as f64);
        let cos = w0.cos();
        let sq = 2.0 * a.sqrt() * alpha;
        Self::from_raw(
            a * ((a + 1.0) + (a - 1.0) * cos + sq),
            -2.0 * a * ((a - 1.0) + (a + 1.0) * cos),
            a * ((a + 1.0) + (a - 1.0) * cos - sq),
            (a + 1.0) - (a - 1.0) * cos + sq,
            2.0 * ((a - 1.0) - (a + 1.0) * cos),
            (a + 1.0) - (a - 1.0) * cos - sq,
        )
    }

    /// Butterworth-style high-pass.
    pub fn high_pass(sample_rate: u32, freq_hz: f32, q: f32) -> Self {
        let w0 = 2.0 * std::f64::consts::PI * freq_hz as f64 / sample_rate as f64;
        let alpha = w0.sin() / (2.0 * q as f64);
        let cos = w0.cos();
        Self::from_raw(
            (1.0 + cos) / 2.0,
            -(1.0 + cos),
            (1.0 + cos) / 2.0,
            1.0 + alpha,
            -2.0 * cos,
            1.0 - alpha,
        )
    }

    /// Build the band a track config asks for.
    pub fn from_config(sample_rate: u32, config: &EqConfig) -> Self {
        match config.kind {
            EqKind::Peaking => Self::peaking(sample_rate, config.freq_hz, config.gain_db, config.q),
            EqKind::LowShelf => {
                Self::low_shelf(sample_rate, config.freq_hz, config.gain_db, config.q)
            }
            EqKind::HighShelf => {
                Self::high_shelf(sample_rate, config.freq_hz, config.gain_db, config.q)
            }
        }
    }

    /// Filter one sample.
    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let x = x as f64;
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y as f32
    }

    /// Filter a buffer in place.
    pub fn process_buffer(&mut self, buffer: &mut [f32]) {
        for s in buffer.iter_mut() {
            *s = self.process(*s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Steady-state magnitude of a filtered sine at `freq`.
    fn response_at(filter: &mut Biquad, freq: f64, sample_rate: u32) -> f64 {
        let n = sample_rate as usize; // one second
        let mut peak = 0.0f64;
        for i in 0..n {
            let t = i as f64 / sample_rate as f64;
            let x = (2.0 * std::f64::consts::PI * freq * t).sin() as f32;
            let y = filter.process(x) as f64;
            // Skip the settling transient.
            if i > n / 4 {
                peak = peak.max(y.abs());
            }
        }
        peak
    }

    #[test]
    fn peaking_boosts_center_frequency() {
        let mut eq = Biquad::peaking(44100, 1000.0, 6.0, 1.0);
        let at_center = response_at(&mut eq, 1000.0, 44100);
        // +6 dB ≈ 2.0×
        assert!(at_center > 1.9 && at_center < 2.1, "gain {at_center}");
    }

    #[test]
    fn peaking_leaves_distant_frequencies_alone() {
        let mut eq = Biquad::peaking(44100, 1000.0, 6.0, 1.0);
        let far = response_at(&mut eq, 60.0, 44100);
        assert!((far - 1.0).abs() < 0.1, "gain {far}");
    }

    #[test]
    fn peaking_cut_attenuates() {
        let mut eq = Biquad::peaking(44100, 500.0, -12.0, 1.0);
        let at_center = response_at(&mut eq, 500.0, 44100);
        assert!(at_center < 0.3, "gain {at_center}");
    }

    #[test]
    fn low_shelf_boosts_lows_not_highs() {
        let mut eq = Biquad::low_shelf(44100, 200.0, 6.0, 0.707);
        let low = response_at(&mut eq, 50.0, 44100);
        let mut eq2 = Biquad::low_shelf(44100, 200.0, 6.0, 0.707);
        let high = response_at(&mut eq2, 5000.0, 44100);
        assert!(low > 1.8, "low gain {low}");
        assert!((high - 1.0).abs() < 0.1, "high gain {high}");
    }

    #[test]
    fn high_shelf_boosts_highs_not_lows() {
        let mut eq = Biquad::high_shelf(44100, 3000.0, 6.0, 0.707);
        let high = response_at(&mut eq, 10000.0, 44100);
        let mut eq2 = Biquad::high_shelf(44100, 3000.0, 6.0, 0.707);
        let low = response_at(&mut eq2, 100.0, 44100);
        assert!(high > 1.8, "high gain {high}");
        assert!((low - 1.0).abs() < 0.1, "low gain {low}");
    }

    #[test]
    fn high_pass_rejects_sub_corner_content() {
        let mut hp = Biquad::high_pass(44100, 1000.0, 0.707);
        let below = response_at(&mut hp, 50.0, 44100);
        let mut hp2 = Biquad::high_pass(44100, 1000.0, 0.707);
        let above = response_at(&mut hp2, 8000.0, 44100);
        assert!(below < 0.05, "below {below}");
        assert!((above - 1.0).abs() < 0.1, "above {above}");
    }

    #[test]
    fn zero_input_stays_zero() {
        let mut eq = Biquad::peaking(44100, 1000.0, 12.0, 2.0);
        for _ in 0..1000 {
            assert_eq!(eq.process(0.0), 0.0);
        }
    }

    #[test]
    fn from_config_dispatches_kind() {
        for kind in [EqKind::Peaking, EqKind::LowShelf, EqKind::HighShelf] {
            let cfg = EqConfig {
                kind,
                freq_hz: 800.0,
                gain_db: 3.0,
                q: 1.0,
            };
            let mut eq = Biquad::from_config(44100, &cfg);
            // Filters pass a DC-free signal without blowing up.
            let out = response_at(&mut eq, 800.0, 44100);
            assert!(out.is_finite() && out > 0.5);
        }
    }
}

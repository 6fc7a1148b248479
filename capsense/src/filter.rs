//! Long-term average (baseline) tracking
//!
//! The baseline is a single-pole IIR low-pass over idle samples:
//!
//! ```text
//! baseline += (rate * (sample - baseline)) >> 8
//! ```
//!
//! The arithmetic is signed so samples below the baseline pull it down. The
//! shift floors, so an upward step smaller than `256 / rate` counts leaves
//! the baseline unchanged.

/// Returns `(numerator * base) >> 8`, the fraction of `base` used for every
/// threshold level.
pub const fn fraction(numerator: u8, base: u32) -> u32 {
    ((numerator as u64 * base as u64) >> 8) as u32
}

/// Baseline estimate with a pending-reseed flag
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MovingAverage {
    value: u32,
    reseed_pending: bool,
}

impl MovingAverage {
    /// A new average has no value yet; the first sample seeds it.
    pub const fn new() -> Self {
        Self {
            value: 0,
            reseed_pending: true,
        }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn reseed_pending(&self) -> bool {
        self.reseed_pending
    }

    /// Discard the current estimate at the next sample
    pub fn request_reseed(&mut self) {
        self.reseed_pending = true;
    }

    /// If a reseed is pending, take `sample` as the baseline and return true
    pub fn take_reseed(&mut self, sample: u32) -> bool {
        if self.reseed_pending {
            self.seed(sample);
            true
        } else {
            false
        }
    }

    /// Set the baseline to `sample` without blending
    pub fn seed(&mut self, sample: u32) {
        #[cfg(feature = "defmt")]
        defmt::debug!("baseline reseed {=u32} -> {=u32}", self.value, sample);
        self.value = sample;
        self.reseed_pending = false;
    }

    /// Blend `sample` into the baseline with coefficient `rate / 256`
    pub fn update(&mut self, sample: u32, rate: u8) -> u32 {
        let delta = sample as i64 - self.value as i64;
        let step = (rate as i64 * delta) >> 8;
        self.value = (self.value as i64 + step) as u32;
        self.value
    }
}

impl Default for MovingAverage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use proptest::prelude::*;

    fn seeded(value: u32) -> MovingAverage {
        let mut avg = MovingAverage::new();
        avg.seed(value);
        avg
    }

    #[test]
    fn test_fraction_truncates() {
        assert_eq!(fraction(5, 1000), 19);
        assert_eq!(fraction(15, 1019), 59);
        assert_eq!(fraction(0, 123_456), 0);
        assert_eq!(fraction(255, 255), 254);
        // No intermediate overflow on large baselines
        assert_eq!(fraction(255, u32::MAX), ((255u64 * u32::MAX as u64) >> 8) as u32);
    }

    #[test]
    fn test_first_sample_seeds() {
        let mut avg = MovingAverage::new();
        assert!(avg.reseed_pending());
        assert!(avg.take_reseed(5000));
        assert_eq!(avg.value(), 5000);
        assert!(!avg.reseed_pending());

        // Only the first sample seeds
        assert!(!avg.take_reseed(9000));
        assert_eq!(avg.value(), 5000);
    }

    #[test]
    fn test_request_reseed() {
        let mut avg = seeded(1000);
        avg.request_reseed();
        assert!(avg.take_reseed(42));
        assert_eq!(avg.value(), 42);
    }

    #[test]
    fn test_update_blends() {
        let mut avg = seeded(1000);
        // 4 * 1000 >> 8 = 15
        assert_eq!(avg.update(2000, 4), 1015);
        // 4 * -1015 >> 8 = -16 (floor)
        assert_eq!(avg.update(0, 4), 999);
    }

    #[test]
    fn test_small_rise_stalls() {
        let mut avg = seeded(1000);
        assert_eq!(avg.update(1010, 4), 1000);
        // Falls always move by at least one count
        assert_eq!(avg.update(999, 4), 999);
    }

    proptest! {
        #[test]
        fn blend_moves_toward_sample(
            baseline in 0u32..(1 << 24),
            sample in 0u32..(1 << 24),
            rate in 1u8..=255,
        ) {
            let mut avg = seeded(baseline);
            let next = avg.update(sample, rate);
            if sample > baseline {
                prop_assert!(next >= baseline && next <= sample);
                if rate as u32 * (sample - baseline) >= 256 {
                    prop_assert!(next > baseline);
                }
            } else if sample < baseline {
                prop_assert!(next >= sample && next < baseline);
            } else {
                prop_assert_eq!(next, baseline);
            }
        }

        #[test]
        fn first_sample_always_seeds(samples in proptest::collection::vec(any::<u32>(), 1..16)) {
            let mut avg = MovingAverage::new();
            prop_assert!(avg.take_reseed(samples[0]));
            prop_assert_eq!(avg.value(), samples[0]);
            for s in &samples[1..] {
                prop_assert!(!avg.take_reseed(*s));
            }
        }
    }
}

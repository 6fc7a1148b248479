//! Charge-transfer acquisition
//!
//! One sample is the average of `2^resolution` repetitions of:
//!
//! 1. Ground the multiplexer and wait for the sample-and-hold cap to drain.
//! 2. Select the reference input, drive the reference pin high and the
//!    sense pin low.
//! 3. Wait a random 16-24 µs.
//! 4. Float the sense pin, select it and convert: `discharged`.
//! 5. Select the reference input, drive the reference pin low and the sense
//!    pin high, wait again, float the sense pin, select it and convert:
//!    `charged`.
//! 6. Accumulate `charged - discharged`.
//!
//! Steps 1-6 run inside a critical section, since interrupt jitter in the
//! delays shows up directly in the differential. Interrupts are serviced
//! between repetitions, where the caller's per-repetition hook also runs.

use embedded_hal::delay::DelayNs;

use crate::hal::{Adc, AdcInput, Pin};
use crate::{MAX_RESOLUTION, SAMPLE_SHIFT};

/// Drain time for the converter's sample-and-hold capacitor
pub const SETTLE_US: u32 = 30;
/// Shortest randomized charge time
pub const JITTER_MIN_US: u32 = 16;
/// Number of distinct randomized charge times, starting at `JITTER_MIN_US`
pub const JITTER_STEPS: u32 = 9;

const DEFAULT_SEED: u32 = 0x2545_f491;

/// Repetition count for a resolution setting
pub const fn repetitions(resolution: u8) -> u32 {
    let resolution = if resolution > MAX_RESOLUTION {
        MAX_RESOLUTION
    } else {
        resolution
    };
    1 << resolution
}

/// Sampler for one reference/sense pair
pub struct Sampler<P> {
    pub reference: AdcInput<P>,
    pub sense: AdcInput<P>,
    rng: u32,
}

impl<P: Pin> Sampler<P> {
    pub fn new(reference: AdcInput<P>, sense: AdcInput<P>) -> Self {
        Self {
            reference,
            sense,
            rng: DEFAULT_SEED,
        }
    }

    /// Reseed the delay randomizer, e.g. from a floating ADC input.
    /// A zero seed is replaced, since xorshift never leaves zero.
    pub fn set_jitter_seed(&mut self, seed: u32) {
        self.rng = if seed == 0 { DEFAULT_SEED } else { seed };
    }

    /// Acquire one sample, in fixed point with `SAMPLE_SHIFT` fractional bits
    pub fn acquire<H>(&mut self, hw: &mut H, resolution: u8) -> u32
    where
        H: Adc + DelayNs,
    {
        self.acquire_with(hw, resolution, || {})
    }

    /// Same as [`Sampler::acquire`], calling `on_sample` after every
    /// repetition with interrupts enabled.
    pub fn acquire_with<H, F>(&mut self, hw: &mut H, resolution: u8, mut on_sample: F) -> u32
    where
        H: Adc + DelayNs,
        F: FnMut(),
    {
        let count = repetitions(resolution);
        let mut total: i32 = 0;

        for _ in 0..count {
            let (discharged, charged) = critical_section::with(|_| self.transfer(hw));
            total += charged as i32 - discharged as i32;
            on_sample();
        }

        // Net negative coupling only happens with a miswired pair
        let average = if total > 0 { total as u32 / count } else { 0 };
        average << SAMPLE_SHIFT
    }

    /// One charge-transfer repetition. Must run with interrupts masked.
    fn transfer<H>(&mut self, hw: &mut H) -> (u16, u16)
    where
        H: Adc + DelayNs,
    {
        hw.ground();
        hw.delay_us(SETTLE_US);

        // Charge the S&H cap, discharge the electrode
        self.reference.select(hw);
        self.reference.pin.start_charge();
        self.sense.pin.start_discharge();
        let wait = self.jitter_us();
        hw.delay_us(wait);
        self.sense.pin.stop_discharge();
        self.sense.select(hw);
        let discharged = hw.read_raw();

        // Discharge the S&H cap, charge the electrode
        self.reference.select(hw);
        self.reference.pin.start_discharge();
        self.sense.pin.start_charge();
        let wait = self.jitter_us();
        hw.delay_us(wait);
        self.sense.pin.stop_charge();
        self.sense.select(hw);
        let charged = hw.read_raw();

        (discharged, charged)
    }

    fn jitter_us(&mut self) -> u32 {
        // xorshift32
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng = x;
        JITTER_MIN_US + x % JITTER_STEPS
    }
}

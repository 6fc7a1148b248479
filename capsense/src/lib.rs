//! Capacitive proximity and touch sensing with a shared ADC.
//!
//! Each sensor is a pair of ADC inputs: a reference pin and a sense pin.
//! Samples are produced by charge-transfer between the two pins, then run
//! through a long-term average filter and a three-state detector.
//!
//! The crate does not own any hardware. The ADC, its multiplexer, the GPIO
//! drive and the millisecond timebase are reached through the traits in
//! [`hal`], so the same core runs against real registers (see the `stm32f0x1`
//! feature) or against test doubles on the host.

#![cfg_attr(not(test), no_std)]

pub mod filter;
pub mod hal;
pub mod machine;
pub mod sampler;
pub mod sensor;

#[cfg(feature = "stm32f0x1")]
pub mod stm32;

pub use filter::MovingAverage;
pub use hal::{Adc, AdcInput, Clock, Pin};
pub use machine::{Detector, Levels};
pub use sampler::Sampler;
pub use sensor::ProximitySensor;

/// Number of fractional bits carried by every sample and by the baseline
pub const SAMPLE_SHIFT: u32 = 8;

/// Upper bound for [`SensorConfig::resolution`]: 2^10 = 1024 sub-samples
pub const MAX_RESOLUTION: u8 = 10;

/// Enumeration of sensor activity states
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Nothing near the electrode; the baseline tracks the ambient reading
    #[default]
    Idle,
    /// Signal above the proximity level for at least the debounce delay
    Proximity,
    /// Signal above the touch level
    Touch,
}

/// Tunable parameters for one sensor
///
/// All thresholds are numerators of a fraction with a fixed denominator of
/// 256, applied to the current baseline (or to the level they stack on).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorConfig {
    /// Sub-sample averaging exponent. Each sample averages `2^resolution`
    /// charge-transfer readings. Clamped to [`MAX_RESOLUTION`].
    pub resolution: u8,
    /// IIR coefficient of the baseline filter, over 256. Smaller is slower.
    /// Raised to at least 1.
    pub adaptation_rate: u8,
    /// A sample this far below the baseline snaps the baseline to it.
    pub reseed_threshold: u8,
    /// Offset of the proximity level above the baseline
    pub proximity_threshold: u8,
    /// Offset of the touch level above the proximity level
    pub touch_threshold: u8,
    /// Hysteresis below the touch level before a touch is released
    pub release_threshold: u8,
    /// Time the signal must stay above the proximity level before entering
    /// the proximity state
    pub delay_ms: u32,
    /// Forced return to idle after this long in proximity. Zero disables.
    pub proximity_timeout_ms: u32,
    /// Forced return to idle after this long in touch. Zero disables.
    pub touch_timeout_ms: u32,
}

impl SensorConfig {
    pub const fn default() -> Self {
        Self {
            resolution: 7,
            adaptation_rate: 4,
            reseed_threshold: 32,
            proximity_threshold: 32,
            touch_threshold: 32,
            release_threshold: 8,
            delay_ms: 20,
            proximity_timeout_ms: 10_000,
            touch_timeout_ms: 10_000,
        }
    }

    /// Returns a copy with out-of-range fields clamped
    pub const fn clamped(mut self) -> Self {
        if self.resolution > MAX_RESOLUTION {
            self.resolution = MAX_RESOLUTION;
        }
        if self.adaptation_rate == 0 {
            self.adaptation_rate = 1;
        }
        self
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        DEFAULT_SENSOR_CONFIG
    }
}

pub const DEFAULT_SENSOR_CONFIG: SensorConfig = SensorConfig::default();

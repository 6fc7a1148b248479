use embedded_hal::delay::DelayNs;

use crate::filter::MovingAverage;
use crate::hal::{Adc, AdcInput, Clock, Pin};
use crate::machine::Detector;
use crate::sampler::Sampler;
use crate::{SensorConfig, State, DEFAULT_SENSOR_CONFIG, MAX_RESOLUTION};

/// A capacitive proximity/touch sensor on one reference/sense pin pair
pub struct ProximitySensor<P> {
    sampler: Sampler<P>,
    config: SensorConfig,
    baseline: MovingAverage,
    detector: Detector,
}

impl<P: Pin> ProximitySensor<P> {
    /// Create a sensor. `now_ms` starts the idle timer. The first sample
    /// after construction only seeds the baseline.
    pub fn new(
        reference: AdcInput<P>,
        sense: AdcInput<P>,
        config: Option<&SensorConfig>,
        now_ms: u32,
    ) -> Self {
        let config = config.unwrap_or(&DEFAULT_SENSOR_CONFIG).clamped();
        Self {
            sampler: Sampler::new(reference, sense),
            config,
            baseline: MovingAverage::new(),
            detector: Detector::new(now_ms),
        }
    }

    /// Acquire and process one sample
    ///
    /// Returns the sample, in fixed point with `SAMPLE_SHIFT` fractional bits.
    pub fn update<H, C>(&mut self, hw: &mut H, clock: &C) -> u32
    where
        H: Adc + DelayNs,
        C: Clock + ?Sized,
    {
        self.update_with(hw, clock, || {})
    }

    /// Same as [`ProximitySensor::update`], calling `on_sample` after every
    /// charge-transfer repetition so the caller can interleave other work.
    pub fn update_with<H, C, F>(&mut self, hw: &mut H, clock: &C, on_sample: F) -> u32
    where
        H: Adc + DelayNs,
        C: Clock + ?Sized,
        F: FnMut(),
    {
        let sample = self
            .sampler
            .acquire_with(hw, self.config.resolution, on_sample);
        self.process(sample, clock.millis())
    }

    /// Feed one already-acquired sample through the baseline filter and the
    /// detector. Returns `sample`.
    pub fn process(&mut self, sample: u32, now_ms: u32) -> u32 {
        if !self.baseline.take_reseed(sample) {
            self.detector
                .classify(sample, now_ms, &self.config, &mut self.baseline);
        }
        sample
    }

    /// Take the next sample as the baseline
    pub fn reseed(&mut self) {
        self.baseline.request_reseed();
    }

    pub fn sampler_mut(&mut self) -> &mut Sampler<P> {
        &mut self.sampler
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    /// Replace every parameter at once. Forces a reseed if the resolution
    /// changed, since samples change scale with it.
    pub fn set_config(&mut self, config: &SensorConfig) {
        let config = config.clamped();
        if config.resolution != self.config.resolution {
            self.baseline.request_reseed();
        }
        self.config = config;
    }

    pub fn state(&self) -> State {
        self.detector.state()
    }

    pub fn in_proximity(&self) -> bool {
        matches!(self.state(), State::Proximity | State::Touch)
    }

    pub fn in_touch(&self) -> bool {
        self.state() == State::Touch
    }

    /// Current long-term average
    pub fn baseline(&self) -> u32 {
        self.baseline.value()
    }

    pub fn reseed_pending(&self) -> bool {
        self.baseline.reseed_pending()
    }

    pub fn debounce_start_ms(&self) -> Option<u32> {
        self.detector.debounce_start_ms()
    }

    pub fn idle_duration_ms(&self, now_ms: u32) -> u32 {
        self.detector.idle_duration_ms(now_ms)
    }

    pub fn proximity_duration_ms(&self, now_ms: u32) -> u32 {
        self.detector.proximity_duration_ms(now_ms)
    }

    pub fn touch_duration_ms(&self, now_ms: u32) -> u32 {
        self.detector.touch_duration_ms(now_ms)
    }

    /// Set the averaging exponent, clamped to `MAX_RESOLUTION`. Requests a
    /// reseed. Returns the stored value.
    pub fn set_resolution(&mut self, resolution: u8) -> u8 {
        self.baseline.request_reseed();
        self.config.resolution = resolution.min(MAX_RESOLUTION);
        self.config.resolution
    }

    pub fn resolution(&self) -> u8 {
        self.config.resolution
    }

    /// Set the filter coefficient, over 256. Raised to at least 1.
    pub fn set_adaptation_rate(&mut self, rate: u8) -> u8 {
        self.config.adaptation_rate = rate.max(1);
        self.config.adaptation_rate
    }

    pub fn adaptation_rate(&self) -> u8 {
        self.config.adaptation_rate
    }

    pub fn set_reseed_threshold(&mut self, threshold: u8) -> u8 {
        self.config.reseed_threshold = threshold;
        threshold
    }

    pub fn reseed_threshold(&self) -> u8 {
        self.config.reseed_threshold
    }

    pub fn set_proximity_threshold(&mut self, threshold: u8) -> u8 {
        self.config.proximity_threshold = threshold;
        threshold
    }

    pub fn proximity_threshold(&self) -> u8 {
        self.config.proximity_threshold
    }

    pub fn set_touch_threshold(&mut self, threshold: u8) -> u8 {
        self.config.touch_threshold = threshold;
        threshold
    }

    pub fn touch_threshold(&self) -> u8 {
        self.config.touch_threshold
    }

    pub fn set_release_threshold(&mut self, threshold: u8) -> u8 {
        self.config.release_threshold = threshold;
        threshold
    }

    pub fn release_threshold(&self) -> u8 {
        self.config.release_threshold
    }

    pub fn set_delay_ms(&mut self, ms: u32) -> u32 {
        self.config.delay_ms = ms;
        ms
    }

    pub fn delay_ms(&self) -> u32 {
        self.config.delay_ms
    }

    pub fn set_proximity_timeout_ms(&mut self, ms: u32) -> u32 {
        self.config.proximity_timeout_ms = ms;
        ms
    }

    pub fn proximity_timeout_ms(&self) -> u32 {
        self.config.proximity_timeout_ms
    }

    pub fn set_touch_timeout_ms(&mut self, ms: u32) -> u32 {
        self.config.touch_timeout_ms = ms;
        ms
    }

    pub fn touch_timeout_ms(&self) -> u32 {
        self.config.touch_timeout_ms
    }
}

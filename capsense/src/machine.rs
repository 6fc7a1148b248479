//! Idle / proximity / touch classification
//!
//! Every sample is compared against four levels derived from the current
//! baseline `B`:
//!
//! ```text
//! reseed    = B - (reseed_threshold    * B) >> 8
//! proximity = B + (proximity_threshold * B) >> 8
//! touch     = proximity + (touch_threshold * proximity) >> 8
//! release   = touch - (release_threshold * touch) >> 8
//! ```
//!
//! The levels are recomputed on each call, never cached. A call only applies
//! the rules of the state held when it was entered, so one sample causes at
//! most one transition.

use crate::filter::{fraction, MovingAverage};
use crate::{SensorConfig, State};

/// Threshold levels for one baseline value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Levels {
    /// Idle samples below this snap the baseline down
    pub reseed: u32,
    /// Samples above this count towards proximity
    pub proximity: u32,
    /// Samples at or above this are a touch
    pub touch: u32,
    /// A touch ends below this
    pub release: u32,
}

impl Levels {
    pub fn new(baseline: u32, config: &SensorConfig) -> Self {
        let reseed = baseline - fraction(config.reseed_threshold, baseline);
        let proximity = baseline.saturating_add(fraction(config.proximity_threshold, baseline));
        let touch = proximity.saturating_add(fraction(config.touch_threshold, proximity));
        let release = touch - fraction(config.release_threshold, touch);
        Self {
            reseed,
            proximity,
            touch,
            release,
        }
    }
}

/// Detection state and the timestamps of its last transitions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Detector {
    state: State,
    idle_start_ms: u32,
    proximity_start_ms: u32,
    touch_start_ms: u32,
    debounce_start_ms: Option<u32>,
}

impl Detector {
    pub const fn new(now_ms: u32) -> Self {
        Self {
            state: State::Idle,
            idle_start_ms: now_ms,
            proximity_start_ms: 0,
            touch_start_ms: 0,
            debounce_start_ms: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Start of the debounce window, if the signal is currently above the
    /// proximity level but not yet committed
    pub fn debounce_start_ms(&self) -> Option<u32> {
        self.debounce_start_ms
    }

    pub fn idle_duration_ms(&self, now_ms: u32) -> u32 {
        match self.state {
            State::Idle => now_ms.wrapping_sub(self.idle_start_ms),
            _ => 0,
        }
    }

    /// Time since proximity was entered. Includes time spent in touch.
    pub fn proximity_duration_ms(&self, now_ms: u32) -> u32 {
        match self.state {
            State::Idle => 0,
            _ => now_ms.wrapping_sub(self.proximity_start_ms),
        }
    }

    pub fn touch_duration_ms(&self, now_ms: u32) -> u32 {
        match self.state {
            State::Touch => now_ms.wrapping_sub(self.touch_start_ms),
            _ => 0,
        }
    }

    /// Classify one sample, updating `baseline` where the rules call for it
    pub fn classify(
        &mut self,
        sample: u32,
        now_ms: u32,
        config: &SensorConfig,
        baseline: &mut MovingAverage,
    ) -> State {
        let levels = Levels::new(baseline.value(), config);

        match self.state {
            State::Idle => {
                if sample > levels.proximity {
                    let start = *self.debounce_start_ms.get_or_insert(now_ms);
                    if now_ms.wrapping_sub(start) >= config.delay_ms {
                        self.debounce_start_ms = None;
                        self.enter_proximity(now_ms);
                    }
                } else if sample < levels.reseed {
                    self.debounce_start_ms = None;
                    baseline.seed(sample);
                } else {
                    self.debounce_start_ms = None;
                    baseline.update(sample, config.adaptation_rate);
                }
            }
            State::Proximity => {
                if sample >= levels.touch {
                    self.enter_touch(now_ms);
                } else if sample < levels.proximity {
                    self.enter_idle(now_ms);
                    baseline.update(sample, config.adaptation_rate);
                } else if expired(self.proximity_start_ms, config.proximity_timeout_ms, now_ms) {
                    self.enter_idle(now_ms);
                    baseline.seed(sample);
                }
            }
            State::Touch => {
                if sample < levels.release {
                    if sample >= levels.proximity {
                        self.enter_proximity(now_ms);
                    } else {
                        self.enter_idle(now_ms);
                        baseline.update(sample, config.adaptation_rate);
                    }
                } else if expired(self.touch_start_ms, config.touch_timeout_ms, now_ms) {
                    self.enter_idle(now_ms);
                    baseline.seed(sample);
                }
            }
        }

        self.state
    }

    fn enter_idle(&mut self, now_ms: u32) {
        self.transition(State::Idle, now_ms);
        self.idle_start_ms = now_ms;
    }

    fn enter_proximity(&mut self, now_ms: u32) {
        self.transition(State::Proximity, now_ms);
        self.proximity_start_ms = now_ms;
    }

    fn enter_touch(&mut self, now_ms: u32) {
        self.transition(State::Touch, now_ms);
        self.touch_start_ms = now_ms;
    }

    fn transition(&mut self, next: State, now_ms: u32) {
        #[cfg(feature = "defmt")]
        defmt::debug!("{} -> {} at {=u32} ms", self.state, next, now_ms);
        #[cfg(not(feature = "defmt"))]
        let _ = now_ms;
        self.state = next;
    }
}

/// Zero disables the timeout
fn expired(start_ms: u32, timeout_ms: u32, now_ms: u32) -> bool {
    timeout_ms > 0 && now_ms.wrapping_sub(start_ms) > timeout_ms
}

#[cfg(test)]
pub mod test {
    use super::*;
    use crate::DEFAULT_SENSOR_CONFIG;

    const BASE: u32 = 1000;

    fn config() -> SensorConfig {
        SensorConfig {
            proximity_threshold: 5,
            touch_threshold: 15,
            release_threshold: 8,
            reseed_threshold: 32,
            delay_ms: 0,
            proximity_timeout_ms: 0,
            touch_timeout_ms: 0,
            ..DEFAULT_SENSOR_CONFIG
        }
    }

    fn baseline(value: u32) -> MovingAverage {
        let mut avg = MovingAverage::new();
        avg.seed(value);
        avg
    }

    #[test]
    fn test_levels() {
        let levels = Levels::new(BASE, &config());
        assert_eq!(
            levels,
            Levels {
                reseed: 875,
                proximity: 1019,
                touch: 1078,
                release: 1045,
            }
        );
    }

    #[test]
    fn test_levels_zero_baseline() {
        let levels = Levels::new(0, &config());
        assert_eq!(levels.reseed, 0);
        assert_eq!(levels.proximity, 0);
        assert_eq!(levels.touch, 0);
        assert_eq!(levels.release, 0);
    }

    #[test]
    fn test_one_transition_per_sample() {
        let config = config();
        let mut avg = baseline(BASE);
        let mut d = Detector::new(0);

        // Far above touch, but idle only promotes to proximity
        assert_eq!(d.classify(1200, 0, &config, &mut avg), State::Proximity);
        assert_eq!(d.classify(1200, 0, &config, &mut avg), State::Touch);
        // Baseline never chased the touch
        assert_eq!(avg.value(), BASE);
    }

    #[test]
    fn test_debounce() {
        let config = SensorConfig {
            delay_ms: 50,
            ..config()
        };
        let mut avg = baseline(BASE);
        let mut d = Detector::new(0);

        assert_eq!(d.classify(1030, 100, &config, &mut avg), State::Idle);
        assert_eq!(d.debounce_start_ms(), Some(100));
        assert_eq!(d.classify(1030, 149, &config, &mut avg), State::Idle);

        // Spike ends before the delay, timer resets
        assert_eq!(d.classify(1000, 150, &config, &mut avg), State::Idle);
        assert_eq!(d.debounce_start_ms(), None);

        assert_eq!(d.classify(1030, 160, &config, &mut avg), State::Idle);
        assert_eq!(d.debounce_start_ms(), Some(160));
        assert_eq!(d.classify(1030, 209, &config, &mut avg), State::Idle);
        assert_eq!(d.classify(1030, 210, &config, &mut avg), State::Proximity);
        assert_eq!(d.debounce_start_ms(), None);
        assert_eq!(d.proximity_duration_ms(260), 50);
        assert_eq!(avg.value(), BASE);
    }

    #[test]
    fn test_idle_blends_and_reseeds() {
        let config = config();
        let mut avg = baseline(BASE);
        let mut d = Detector::new(0);

        // Within the band: blended, 4 * 10 >> 8 = 0, 4 * -100 >> 8 = -2
        d.classify(1010, 1, &config, &mut avg);
        assert_eq!(avg.value(), 1000);
        d.classify(900, 2, &config, &mut avg);
        assert_eq!(avg.value(), 998);

        // Below the reseed floor: snapped
        d.classify(500, 3, &config, &mut avg);
        assert_eq!(avg.value(), 500);
        assert_eq!(d.state(), State::Idle);
    }

    #[test]
    fn test_proximity_back_to_idle_blends() {
        let config = config();
        let mut avg = baseline(BASE);
        let mut d = Detector::new(0);

        d.classify(1030, 10, &config, &mut avg);
        assert_eq!(d.classify(900, 20, &config, &mut avg), State::Idle);
        assert_eq!(avg.value(), 998);
        assert_eq!(d.idle_duration_ms(25), 5);
        assert_eq!(d.proximity_duration_ms(25), 0);
    }

    #[test]
    fn test_proximity_timeout_snaps_baseline() {
        let config = SensorConfig {
            proximity_timeout_ms: 100,
            ..config()
        };
        let mut avg = baseline(BASE);
        let mut d = Detector::new(0);

        assert_eq!(d.classify(1030, 0, &config, &mut avg), State::Proximity);
        assert_eq!(d.classify(1030, 100, &config, &mut avg), State::Proximity);
        assert_eq!(d.classify(1030, 101, &config, &mut avg), State::Idle);
        assert_eq!(avg.value(), 1030);
        assert_eq!(d.idle_duration_ms(101), 0);
    }

    #[test]
    fn test_touch_release_hysteresis() {
        let config = config();
        let mut avg = baseline(BASE);
        let mut d = Detector::new(0);

        d.classify(1100, 0, &config, &mut avg);
        assert_eq!(d.classify(1100, 5, &config, &mut avg), State::Touch);
        assert_eq!(d.touch_duration_ms(15), 10);
        assert_eq!(d.proximity_duration_ms(15), 15);

        // Between release and touch: stays
        assert_eq!(d.classify(1050, 20, &config, &mut avg), State::Touch);
        // Below release but above proximity: demoted
        assert_eq!(d.classify(1040, 30, &config, &mut avg), State::Proximity);
        assert_eq!(d.proximity_duration_ms(40), 10);
        assert_eq!(d.touch_duration_ms(40), 0);
    }

    #[test]
    fn test_touch_release_to_idle() {
        let config = config();
        let mut avg = baseline(BASE);
        let mut d = Detector::new(0);

        d.classify(1100, 0, &config, &mut avg);
        d.classify(1100, 0, &config, &mut avg);
        assert_eq!(d.classify(1000, 10, &config, &mut avg), State::Idle);
        assert_eq!(avg.value(), BASE);
    }

    #[test]
    fn test_touch_timeout_snaps_baseline() {
        let config = SensorConfig {
            touch_timeout_ms: 1000,
            ..config()
        };
        let mut avg = baseline(BASE);
        let mut d = Detector::new(0);

        d.classify(1200, 0, &config, &mut avg);
        d.classify(1200, 10, &config, &mut avg);
        assert_eq!(d.classify(1200, 1010, &config, &mut avg), State::Touch);
        assert_eq!(d.classify(1200, 1011, &config, &mut avg), State::Idle);
        assert_eq!(avg.value(), 1200);
    }

    #[test]
    fn test_timeouts_across_clock_wrap() {
        let config = SensorConfig {
            proximity_timeout_ms: 100,
            ..config()
        };
        let mut avg = baseline(BASE);
        let start = u32::MAX - 10;
        let mut d = Detector::new(start);

        d.classify(1030, start, &config, &mut avg);
        assert_eq!(d.classify(1030, 89, &config, &mut avg), State::Proximity);
        assert_eq!(d.classify(1030, 90, &config, &mut avg), State::Idle);
    }
}

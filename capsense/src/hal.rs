//! Hardware capabilities used by the sensing core
//!
//! The core never touches registers. A board provides:
//!
//! - a [`Pin`] handle per sensing electrode, able to drive high, drive low
//!   or float,
//! - one [`Adc`] context shared by every sensor, which owns the converter
//!   and its input multiplexer (and usually also implements
//!   [`embedded_hal::delay::DelayNs`] for the microsecond waits),
//! - a [`Clock`] returning monotonic milliseconds.
//!
//! Only one sensor may be mid-acquisition at a time. Callers holding several
//! sensors serialize their `update` calls on the shared `Adc`.

use core::sync::atomic::{AtomicU32, Ordering};

/// GPIO drive control for one electrode
pub trait Pin {
    /// Drive the pin high
    fn start_charge(&mut self);
    /// Release a high-driven pin to high impedance
    fn stop_charge(&mut self);
    /// Drive the pin low
    fn start_discharge(&mut self);
    /// Release a low-driven pin to high impedance
    fn stop_discharge(&mut self);
}

/// The shared analog-to-digital converter and its input multiplexer
///
/// The converter is expected to be configured and enabled once at startup
/// before the first call to any of these methods.
pub trait Adc {
    /// Route the multiplexer to a neutral input so the sample-and-hold
    /// capacitor drains
    fn ground(&mut self);
    /// Route the multiplexer to `channel`
    fn select(&mut self, channel: u8);
    /// Run one conversion on the selected input and block for its result
    fn read_raw(&mut self) -> u16;
}

/// Monotonic millisecond timebase, wrapping at 2^32
pub trait Clock {
    fn millis(&self) -> u32;
}

/// A millisecond counter bumped from a timer interrupt is a clock.
impl Clock for AtomicU32 {
    fn millis(&self) -> u32 {
        self.load(Ordering::Relaxed)
    }
}

/// One multiplexer input together with the GPIO behind it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdcInput<P> {
    /// Multiplexer channel number
    pub channel: u8,
    /// Drive handle for the pin wired to `channel`
    pub pin: P,
}

impl<P: Pin> AdcInput<P> {
    pub const fn new(channel: u8, pin: P) -> Self {
        Self { channel, pin }
    }

    /// Connect this input to the converter
    pub fn select<A: Adc + ?Sized>(&self, adc: &mut A) {
        adc.select(self.channel);
    }
}

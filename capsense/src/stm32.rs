//! Register-level backend for the STM32F0 ADC and GPIO ports.
//!
//! Like the rest of this crate's hardware support, this accesses the PAC
//! register blocks directly instead of taking HAL pin types. A sensor pin is
//! only a port/index pair resolved at runtime from its ADC channel number, so
//! any ADC-capable pin can serve as reference or sense input without a type
//! per pin.
//!
//! The sample-and-hold capacitor of this ADC is only connected to the input
//! during the sampling window of a conversion, where AVR-style converters
//! track the multiplexer output whenever idle. To get the same behaviour,
//! [`Stm32Adc::select`](crate::Adc::select) switches the channel and starts a
//! conversion whose result is thrown away; its long sampling window lets the
//! capacitor follow the newly selected pin while the electrodes are driven.

use embedded_hal::delay::DelayNs;
use stm32f0::stm32f0x1 as pac;

use crate::hal::{Adc, AdcInput, Pin};

const MODE_OUTPUT: u32 = 0b01;
const MODE_ANALOG: u32 = 0b11;

const ADC_CR_ADEN: u32 = 1 << 0;
const ADC_CR_ADSTART: u32 = 1 << 2;
const ADC_CR_ADCAL: u32 = 1 << 31;
const ADC_ISR_ADRDY: u32 = 1 << 0;
const ADC_ISR_EOC: u32 = 1 << 2;
/// 10-bit conversions, single mode, software trigger
const ADC_CFGR1_RES_10BIT: u32 = 0b01 << 3;
/// ADC clock from PCLK / 4
const ADC_CFGR2_CKMODE_PCLK_DIV4: u32 = 0b10 << 30;
/// 71.5 ADC cycles per sampling window
const ADC_SMPR_71_5: u32 = 0b110;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Port {
    A,
    B,
    C,
}

macro_rules! with_port {
    ($port:expr, |$regs:ident| $body:expr) => {
        match $port {
            Port::A => {
                let $regs = unsafe { &*pac::GPIOA::ptr() };
                $body
            }
            Port::B => {
                let $regs = unsafe { &*pac::GPIOB::ptr() };
                $body
            }
            Port::C => {
                let $regs = unsafe { &*pac::GPIOC::ptr() };
                $body
            }
        }
    };
}

/// Drive handle for one ADC-capable GPIO
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AnalogPin {
    port: Port,
    index: u8,
}

impl AnalogPin {
    /// Look up the GPIO wired to ADC channel `channel`
    pub const fn from_channel(channel: u8) -> Option<Self> {
        let (port, index) = match channel {
            0..=7 => (Port::A, channel),
            8..=9 => (Port::B, channel - 8),
            10..=15 => (Port::C, channel - 10),
            _ => return None,
        };
        Some(Self { port, index })
    }

    /// Build the multiplexer input for ADC channel `channel`
    pub const fn input(channel: u8) -> Option<AdcInput<Self>> {
        match Self::from_channel(channel) {
            Some(pin) => Some(AdcInput { channel, pin }),
            None => None,
        }
    }

    pub fn port(&self) -> Port {
        self.port
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    fn set_mode(&self, mode: u32) {
        let shift = 2 * self.index as u32;
        with_port!(self.port, |regs| regs.moder.modify(|r, w| unsafe {
            w.bits((r.bits() & !(0b11 << shift)) | (mode << shift))
        }));
    }

    fn set_level(&self, high: bool) {
        let bit = if high {
            1 << self.index
        } else {
            1 << (self.index + 16)
        };
        with_port!(self.port, |regs| regs.bsrr.write(|w| unsafe { w.bits(bit) }));
    }
}

impl Pin for AnalogPin {
    fn start_charge(&mut self) {
        self.set_level(true);
        self.set_mode(MODE_OUTPUT);
    }

    fn stop_charge(&mut self) {
        self.set_mode(MODE_ANALOG);
        self.set_level(false);
    }

    fn start_discharge(&mut self) {
        self.set_level(false);
        self.set_mode(MODE_OUTPUT);
    }

    fn stop_discharge(&mut self) {
        self.set_mode(MODE_ANALOG);
    }
}

/// The ADC peripheral as the shared sensing context
pub struct Stm32Adc {
    adc: &'static pac::adc::RegisterBlock,
    neutral: AdcInput<AnalogPin>,
    cycles_per_us: u32,
}

impl Stm32Adc {
    /// Enable, calibrate and start the ADC. Call once at startup.
    ///
    /// sysclk_hz: Core clock, used for busy-wait delays
    ///
    /// neutral: An ADC input wired to ground. It is driven low and
    /// converted between repetitions to drain the sample-and-hold cap.
    pub fn new(sysclk_hz: u32, neutral: AdcInput<AnalogPin>) -> Self {
        let rcc = unsafe { &*pac::RCC::ptr() };
        rcc.apb2enr.modify(|_, w| w.adcen().set_bit());
        rcc.ahbenr.modify(|_, w| {
            w.iopaen().set_bit()
            .iopben().set_bit()
            .iopcen().set_bit()
        });

        let adc = unsafe { &*pac::ADC::ptr() };

        // Configuration registers are only writable while disabled
        if adc.cr.read().bits() & ADC_CR_ADEN != 0 {
            adc.cr.write(|w| unsafe { w.bits(1 << 1) }); // ADDIS
            while adc.cr.read().bits() & ADC_CR_ADEN != 0 {}
        }
        adc.cfgr2.write(|w| unsafe { w.bits(ADC_CFGR2_CKMODE_PCLK_DIV4) });
        adc.cfgr1.write(|w| unsafe { w.bits(ADC_CFGR1_RES_10BIT) });
        adc.smpr.write(|w| unsafe { w.bits(ADC_SMPR_71_5) });

        adc.cr.write(|w| unsafe { w.bits(ADC_CR_ADCAL) });
        while adc.cr.read().bits() & ADC_CR_ADCAL != 0 {}

        adc.isr.write(|w| unsafe { w.bits(ADC_ISR_ADRDY) });
        adc.cr.write(|w| unsafe { w.bits(ADC_CR_ADEN) });
        while adc.isr.read().bits() & ADC_ISR_ADRDY == 0 {}

        let mut neutral = neutral;
        neutral.pin.start_discharge();

        Self {
            adc,
            neutral,
            cycles_per_us: (sysclk_hz / 1_000_000).max(1),
        }
    }

    /// Wait out a conversion in flight and drop its result
    fn finish(&self) {
        while self.adc.cr.read().bits() & ADC_CR_ADSTART != 0 {}
        if self.adc.isr.read().bits() & ADC_ISR_EOC != 0 {
            let _ = self.adc.dr.read().bits();
        }
    }

    fn start(&self) {
        self.adc
            .cr
            .modify(|r, w| unsafe { w.bits(r.bits() | ADC_CR_ADSTART) });
    }
}

impl Adc for Stm32Adc {
    fn ground(&mut self) {
        self.neutral.pin.start_discharge();
        let channel = self.neutral.channel;
        self.select(channel);
    }

    fn select(&mut self, channel: u8) {
        self.finish();
        self.adc.chselr.write(|w| unsafe { w.bits(1 << channel) });
        self.start();
    }

    fn read_raw(&mut self) -> u16 {
        self.finish();
        self.start();
        while self.adc.isr.read().bits() & ADC_ISR_EOC == 0 {}
        (self.adc.dr.read().bits() & 0xffff) as u16
    }
}

impl DelayNs for Stm32Adc {
    fn delay_ns(&mut self, ns: u32) {
        let cycles = (ns as u64 * self.cycles_per_us as u64 / 1_000) as u32;
        cortex_m::asm::delay(cycles.max(1));
    }

    fn delay_us(&mut self, us: u32) {
        cortex_m::asm::delay(us.saturating_mul(self.cycles_per_us));
    }
}

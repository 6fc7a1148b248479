#![no_main]
#![no_std]

use core::sync::atomic::{AtomicU32, Ordering};
use cortex_m_rt::{entry, exception};
use panic_halt as _;

use stm32f0xx_hal as hal;

use capsense::stm32::{AnalogPin, Stm32Adc};
use capsense::{AdcInput, ProximitySensor, SensorConfig, DEFAULT_SENSOR_CONFIG};

use crate::hal::pac;
use crate::hal::pac::interrupt;
use crate::hal::prelude::*;

mod trace;

const SYSCLK_HZ: u32 = 48_000_000;

const fn input(channel: u8) -> AdcInput<AnalogPin> {
    match AnalogPin::input(channel) {
        Some(input) => input,
        None => panic!("not an ADC channel"),
    }
}

// PA0 is the reference electrode, PA1 the sense electrode. PA2 is tied to
// ground and drains the ADC between repetitions.
const REFERENCE: AdcInput<AnalogPin> = input(0);
const SENSE: AdcInput<AnalogPin> = input(1);
const NEUTRAL: AdcInput<AnalogPin> = input(2);

static SENSOR_CONFIG: SensorConfig = SensorConfig {
    // 2/256: very slow baseline response
    adaptation_rate: 2,
    resolution: 8,
    delay_ms: 100,
    proximity_timeout_ms: 5000,
    touch_timeout_ms: 5000,
    proximity_threshold: 5,
    touch_threshold: 15,
    ..DEFAULT_SENSOR_CONFIG
};

/// Milliseconds since boot, bumped by SysTick
static TIME: AtomicU32 = AtomicU32::new(0);

#[entry]
fn main() -> ! {
    let dp = pac::Peripherals::take().unwrap();
    let cp = cortex_m::Peripherals::take().unwrap();

    let mut flash = dp.FLASH;
    let mut rcc = dp.RCC.configure().sysclk(SYSCLK_HZ.hz()).freeze(&mut flash);
    let gpiob = dp.GPIOB.split(&mut rcc);

    // A library requiring a critical section to set a gpio AF register is bad and I just won't.
    let fake_cs = unsafe { cortex_m::interrupt::CriticalSection::new() };

    let mut syst = hal::timers::Timer::syst(cp.SYST, 1000.hz(), &mut rcc);
    syst.listen(&hal::timers::Event::TimeOut);

    let tx_pin = gpiob.pb6.into_alternate_af0(&fake_cs);
    let rx_pin = gpiob.pb7.into_alternate_af0(&fake_cs);
    let uart = hal::serial::Serial::usart1(dp.USART1, (tx_pin, rx_pin), 115200.bps(), &mut rcc);
    trace::init(uart, 4);

    let mut adc = Stm32Adc::new(SYSCLK_HZ, NEUTRAL);
    let mut sensor = ProximitySensor::new(
        REFERENCE,
        SENSE,
        Some(&SENSOR_CONFIG),
        TIME.load(Ordering::Relaxed),
    );

    loop {
        let sample = sensor.update(&mut adc, &TIME);
        trace::report(&sensor, sample, TIME.load(Ordering::Relaxed));
    }
}

#[exception]
fn SysTick() {
    let time = TIME.load(Ordering::Relaxed);
    TIME.store(time.wrapping_add(1), Ordering::Relaxed);
}

//! Sensor trace output over an IRQ driven USART1 transmitter
//!
//! One line per sample: `sample baseline difference state duration_ms`.
//! Bytes are dropped when the queue is full, so a slow host never stalls
//! the sensing loop.

use capsense::{Pin, ProximitySensor, State};

use crate::interrupt;
use crate::hal::{
    pac,
    prelude::*,
    serial::{Event, Serial},
};
use heapless::spsc::{Consumer, Producer, Queue};
use stm32f0xx_hal::gpio::{gpiob, Alternate, AF0};

const TX_Q_SIZE: usize = 256;

static mut TX_Q_CONSUMER: Option<Consumer<u8, TX_Q_SIZE>> = None;
static mut TX_Q_PRODUCER: Option<Producer<u8, TX_Q_SIZE>> = None;

pub type TxPin = gpiob::PB6<Alternate<AF0>>;
pub type RxPin = gpiob::PB7<Alternate<AF0>>;
static mut SERIAL: Option<Serial<pac::USART1, TxPin, RxPin>> = None;

pub struct TraceWriter {}

impl core::fmt::Write for TraceWriter {
    fn write_str(&mut self, s: &str) -> Result<(), core::fmt::Error> {
        for b in s.bytes() {
            write_byte(b);
        }
        Ok(())
    }
}

/// Must be called once during application initialization
pub fn init(serial: Serial<pac::USART1, TxPin, RxPin>, irq_prio: u8) {
    let core = unsafe { pac::CorePeripherals::steal() };
    let mut nvic = core.NVIC;

    static mut TX_Q: Queue<u8, TX_Q_SIZE> = Queue::new();
    let (tx_q_producer, tx_q_consumer) = unsafe { TX_Q.split() };

    unsafe {
        TX_Q_PRODUCER = Some(tx_q_producer);
        TX_Q_CONSUMER = Some(tx_q_consumer);
        SERIAL = Some(serial);

        nvic.set_priority(pac::Interrupt::USART1, irq_prio);
        pac::NVIC::unmask(pac::Interrupt::USART1);
    }
}

fn write_byte(b: u8) {
    let tx_q_producer = unsafe { TX_Q_PRODUCER.as_mut().unwrap_unchecked() };
    // Drop the byte if the queue is full
    let _ = tx_q_producer.enqueue(b);
    let serial = unsafe { SERIAL.as_mut().unwrap_unchecked() };
    serial.listen(Event::Txe);
}

pub fn writer() -> TraceWriter {
    TraceWriter {}
}

/// Queue the trace line for the latest sample
pub fn report<P: Pin>(sensor: &ProximitySensor<P>, sample: u32, now_ms: u32) {
    let baseline = sensor.baseline();
    let difference = sample.saturating_sub(baseline);
    let (tag, duration) = match sensor.state() {
        State::Idle => ('I', sensor.idle_duration_ms(now_ms)),
        State::Proximity => ('P', sensor.proximity_duration_ms(now_ms)),
        State::Touch => ('T', sensor.touch_duration_ms(now_ms)),
    };

    let mut writer = writer();
    core::fmt::write(
        &mut writer,
        format_args!("{} {} {} {} {}\r\n", sample, baseline, difference, tag, duration),
    )
    .ok();
}

#[interrupt]
fn USART1() {
    let serial = unsafe { SERIAL.as_mut().unwrap_unchecked() };
    let tx_q_consumer = unsafe { TX_Q_CONSUMER.as_mut().unwrap_unchecked() };
    let usart1 = unsafe { pac::Peripherals::steal().USART1 };

    let isr = usart1.isr.read();
    if isr.txe().bit_is_set() {
        match tx_q_consumer.dequeue() {
            Some(b) => {
                serial.write(b).ok();
            }
            None => {
                // Nothing left to send. Re-enabled by the next write_byte().
                serial.unlisten(Event::Txe);
            }
        }
    }
}

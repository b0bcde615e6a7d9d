//! Raspberry Pi outputs: direct GPIO pins and a PCF8574 I2C expander.

use std::cell::RefCell;
use std::rc::Rc;

use microdoser_traits::Actuator;
use rppal::gpio::{Gpio, OutputPin};
use rppal::i2c::I2c;

use crate::error::{HwError, Result};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One pump relay on a BCM GPIO pin.
pub struct GpioActuator {
    pin: OutputPin,
    active_low: bool,
}

impl GpioActuator {
    /// Claim `bcm_pin` as an output, initially off.
    pub fn new(bcm_pin: u8, active_low: bool) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let pin = gpio
            .get(bcm_pin)
            .map_err(|e| HwError::Gpio(format!("pin {bcm_pin}: {e}")))?
            .into_output();
        let mut out = Self { pin, active_low };
        out.drive(false);
        Ok(out)
    }

    fn drive(&mut self, on: bool) {
        if on != self.active_low {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
    }
}

impl Actuator for GpioActuator {
    fn turn_on(&mut self) -> std::result::Result<(), BoxError> {
        self.drive(true);
        Ok(())
    }

    fn turn_off(&mut self) -> std::result::Result<(), BoxError> {
        self.drive(false);
        Ok(())
    }
}

/// PCF8574 8-bit I/O expander. Pins are shared between pumps through
/// [`Pcf8574::pin`].
pub struct Pcf8574 {
    bus: I2c,
    state: u8,
    active_low: bool,
}

impl Pcf8574 {
    /// Open the expander and switch every pin off.
    pub fn open(bus: u8, address: u16, active_low: bool) -> Result<Rc<RefCell<Self>>> {
        let mut i2c = I2c::with_bus(bus).map_err(|e| HwError::I2c(e.to_string()))?;
        i2c.set_slave_address(address)
            .map_err(|e| HwError::I2c(format!("address {address:#04x}: {e}")))?;
        let state = if active_low { 0xFF } else { 0x00 };
        let mut dev = Self {
            bus: i2c,
            state,
            active_low,
        };
        dev.flush()?;
        tracing::info!(bus, address, "pcf8574 ready");
        Ok(Rc::new(RefCell::new(dev)))
    }

    /// Actuator for expander pin `pin` (0..=7).
    pub fn pin(dev: &Rc<RefCell<Self>>, pin: u8) -> Result<Pcf8574Pin> {
        if pin > 7 {
            return Err(HwError::I2c(format!("pcf8574 pin {pin} out of range")));
        }
        Ok(Pcf8574Pin {
            dev: Rc::clone(dev),
            pin,
        })
    }

    fn set(&mut self, pin: u8, on: bool) -> Result<()> {
        let mask = 1u8 << pin;
        if on != self.active_low {
            self.state |= mask;
        } else {
            self.state &= !mask;
        }
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        self.bus
            .write(&[self.state])
            .map_err(|e| HwError::I2c(e.to_string()))?;
        Ok(())
    }
}

/// One pin of a shared [`Pcf8574`].
pub struct Pcf8574Pin {
    dev: Rc<RefCell<Pcf8574>>,
    pin: u8,
}

impl Actuator for Pcf8574Pin {
    fn turn_on(&mut self) -> std::result::Result<(), BoxError> {
        self.dev.borrow_mut().set(self.pin, true)?;
        Ok(())
    }

    fn turn_off(&mut self) -> std::result::Result<(), BoxError> {
        self.dev.borrow_mut().set(self.pin, false)?;
        Ok(())
    }
}

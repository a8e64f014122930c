//! Raspberry Pi backend: SPI and GPIO through rppal.

use rppal::gpio::{Gpio, InputPin, OutputPin};
use rppal::spi::{Bus, Mode, SimpleHalSpiDevice, SlaveSelect, Spi};
use tracing::info;

use crate::config::DriverConfig;
use crate::device::{Ad5370, Pins};
use crate::error::{DriverError, Result};

pub type RaspberryDriver = Ad5370<SimpleHalSpiDevice<Spi>, InputPin, OutputPin>;

fn backend_error(what: &str, err: impl std::fmt::Display) -> DriverError {
    DriverError::Backend(format!("{what}: {err}"))
}

pub fn open(config: &DriverConfig) -> Result<RaspberryDriver> {
    let bus = match config.spi.bus {
        0 => Bus::Spi0,
        1 => Bus::Spi1,
        2 => Bus::Spi2,
        other => return Err(DriverError::Config(format!("unsupported spi bus {other}"))),
    };
    let slave_select = match config.spi.slave_select {
        0 => SlaveSelect::Ss0,
        1 => SlaveSelect::Ss1,
        2 => SlaveSelect::Ss2,
        other => {
            return Err(DriverError::Config(format!(
                "unsupported slave select {other}"
            )))
        }
    };
    let mode = match config.spi.mode {
        0 => Mode::Mode0,
        1 => Mode::Mode1,
        2 => Mode::Mode2,
        3 => Mode::Mode3,
        other => return Err(DriverError::Config(format!("unsupported spi mode {other}"))),
    };

    let spi = Spi::new(bus, slave_select, config.spi.clock_hz, mode)
        .map_err(|e| backend_error("spi", e))?;
    let gpio = Gpio::new().map_err(|e| backend_error("gpio", e))?;
    let output = |pin: u8| {
        gpio.get(pin)
            .map(|p| p.into_output_high())
            .map_err(|e| backend_error("gpio", e))
    };

    let pins = Pins {
        busy: gpio
            .get(config.pins.busy)
            .map_err(|e| backend_error("gpio", e))?
            .into_input_pullup(),
        ldac: output(config.pins.ldac)?,
        reset: output(config.pins.reset)?,
        clr: output(config.pins.clr)?,
    };

    info!(
        bus = config.spi.bus,
        slave_select = config.spi.slave_select,
        clock_hz = config.spi.clock_hz,
        "opened raspberry pi backend"
    );
    Ok(Ad5370::new(SimpleHalSpiDevice::new(spi), pins, config.vref)
        .with_busy_poll_limit(config.busy_poll_limit))
}

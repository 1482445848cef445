use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail};
use log::{debug, info};
use mfrc522::comm::Interface;
use mfrc522::comm::blocking::spi::SpiInterface;
use mfrc522::{Initialized, Mfrc522};
use rppal::gpio::{Gpio, OutputPin};
use rppal::spi::{Bus, Mode, SimpleHalSpiDevice, SlaveSelect, Spi};

use crate::config::ReaderConfig;
use crate::messages::TagId;
use crate::reader::Reader;

/// ISO 14443A commands the presence checks are built from.
pub trait Picc {
    /// REQA followed by anticollision/select. Returns the UID on success.
    fn request_and_select(&mut self) -> Option<Vec<u8>>;

    /// WUPA. Answered by a card in the field even when halted.
    fn wake_up(&mut self) -> bool;

    /// HLTA plus leaving any authenticated session.
    fn halt(&mut self);
}

impl<C: Interface> Picc for Mfrc522<C, Initialized> {
    fn request_and_select(&mut self) -> Option<Vec<u8>> {
        let atqa = self.reqa().ok()?;
        let uid = self.select(&atqa).ok()?;
        Some(uid.as_bytes().to_vec())
    }

    fn wake_up(&mut self) -> bool {
        self.wupa().is_ok()
    }

    fn halt(&mut self) {
        // A halted card does not answer HLTA, so the result carries no news
        let _ = self.hlta();
        let _ = self.stop_crypto1();
    }
}

/// Live reader on an MFRC522 front end.
pub struct Mfrc522Reader<P> {
    chip: P,
    // Held so the chip stays out of reset
    _reset_pin: Option<OutputPin>,
}

impl<P: Picc> Mfrc522Reader<P> {
    pub fn new(chip: P, reset_pin: Option<OutputPin>) -> Self {
        Mfrc522Reader {
            chip,
            _reset_pin: reset_pin,
        }
    }
}

impl<P: Picc> Reader for Mfrc522Reader<P> {
    fn detect(&mut self) -> Option<TagId> {
        self.chip.request_and_select().map(TagId::new)
    }

    fn probe_continued_presence(&mut self) -> bool {
        self.chip.wake_up()
    }

    fn reset_session(&mut self) {
        self.chip.halt();
    }
}

fn spi_bus(bus: u8) -> anyhow::Result<Bus> {
    Ok(match bus {
        0 => Bus::Spi0,
        1 => Bus::Spi1,
        2 => Bus::Spi2,
        3 => Bus::Spi3,
        4 => Bus::Spi4,
        5 => Bus::Spi5,
        6 => Bus::Spi6,
        _ => bail!("no SPI bus {bus}"),
    })
}

fn slave_select(ss: u8) -> anyhow::Result<SlaveSelect> {
    Ok(match ss {
        0 => SlaveSelect::Ss0,
        1 => SlaveSelect::Ss1,
        2 => SlaveSelect::Ss2,
        _ => bail!("no slave select line {ss}"),
    })
}

fn pulse_reset(pin: u8) -> anyhow::Result<OutputPin> {
    let mut reset_pin = Gpio::new()?.get(pin)?.into_output();
    reset_pin.set_reset_on_drop(false);

    reset_pin.set_low();
    thread::sleep(Duration::from_millis(50));
    reset_pin.set_high();
    thread::sleep(Duration::from_millis(50));

    Ok(reset_pin)
}

/// Resets and initialises the chip described by `[reader]`.
pub fn open(config: &ReaderConfig) -> anyhow::Result<Mfrc522Reader<impl Picc + use<>>> {
    let bus = spi_bus(config.spi_bus.unwrap_or(0))?;
    let ss = slave_select(config.slave_select.unwrap_or(0))?;
    let clock_hz = config.clock_hz.unwrap_or(1_000_000);

    let reset_pin = config.reset_pin.map(pulse_reset).transpose()?;

    debug!("Opening MFRC522 on {:?}/{:?} at {} Hz", bus, ss, clock_hz);
    let spi = Spi::new(bus, ss, clock_hz, Mode::Mode0)?;
    let interface = SpiInterface::new(SimpleHalSpiDevice::new(spi));
    let mut chip = Mfrc522::new(interface)
        .init()
        .map_err(|err| anyhow!("initialising MFRC522: {err:?}"))?;

    match chip.version() {
        Ok(version) => info!("MFRC522 version {:#04x}", version),
        Err(err) => bail!("MFRC522 not responding: {err:?}"),
    }

    Ok(Mfrc522Reader::new(chip, reset_pin))
}

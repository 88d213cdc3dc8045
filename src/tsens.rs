//! Temperature sensor command layer for the 0x10 and 0x28 device families.

use byteorder::{ByteOrder, LittleEndian};
use embedded_hal::delay::DelayUs;
use heapless::Vec;

use crate::{Address, Driver, Error, IoWire, OpCode};

/// Worst-case conversion latency at full resolution
pub const CONVERSION_TIME_MS: u32 = 750;

/// Device-level commands issued after ROM addressing.
///
/// Only `Convert` and `ReadScratchpad` are driven by this crate; the rest
/// are listed for callers talking to the bus directly.
#[derive(Clone, Copy, Debug)]
#[repr(u8)]
pub enum Command {
    Convert = 0x44,
    WriteScratchpad = 0x4E,
    ReadScratchpad = 0xBE,
    CopyScratchpad = 0x48,
    RecallE2 = 0xB8,
    ReadPowerSupply = 0xB4,
}

impl OpCode for Command {
    fn op_code(&self) -> u8 {
        *self as _
    }
}

/// Recognized temperature sensor families and their raw-value scaling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Family {
    /// DS1820 / DS18S20, half-degree steps
    Ds18s20 = 0x10,
    /// DS18B20 / DS1822, sixteenth-degree steps
    Ds18b20 = 0x28,
}

impl Family {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x10 => Some(Family::Ds18s20),
            0x28 => Some(Family::Ds18b20),
            _ => None,
        }
    }

    /// Scales a raw conversion result to hundredths of a degree Celsius.
    pub fn centi_celsius(self, raw: i16) -> i16 {
        match self {
            Family::Ds18s20 => ((raw as i32 * 100) / 2) as i16,
            Family::Ds18b20 => ((raw as i32 * 100) / 16) as i16,
        }
    }
}

/// One scratchpad transfer.
///
/// Produced and checked inside a single read, never retained.
#[derive(Clone, Copy, Debug)]
pub struct Scratchpad {
    raw: [u8; Self::BYTES],
}

impl Scratchpad {
    pub const BYTES: usize = 9;

    pub fn from_raw(raw: [u8; Self::BYTES]) -> Self {
        Scratchpad { raw }
    }

    /// Whether the trailing CRC matches the first eight bytes
    pub fn crc_ok(&self) -> bool {
        crate::compute_crc8(&self.raw[..8]) == self.raw[8]
    }

    /// Conversion result as the device delivers it, before family scaling
    pub fn raw_temperature(&self) -> i16 {
        LittleEndian::read_i16(&self.raw[0..2])
    }

    pub fn alarm_high(&self) -> u8 {
        self.raw[2]
    }

    pub fn alarm_low(&self) -> u8 {
        self.raw[3]
    }

    pub fn configuration(&self) -> u8 {
        self.raw[4]
    }
}

/// Bounded registry of discovered sensors plus the convert/read commands.
///
/// Indices hand out positions in the registry of the most recent search;
/// they are invalidated by the next search. Soft faults (no presence, CRC
/// mismatch, unknown family, stale index) read as `Ok(None)`; retrying is
/// the caller's choice, none happens here.
pub struct TempSensors<const N: usize> {
    roms: Vec<Address, N>,
}

impl<const N: usize> TempSensors<N> {
    pub fn new() -> Self {
        TempSensors { roms: Vec::new() }
    }

    /// Addresses found by the most recent search, in registry order
    pub fn addresses(&self) -> &[Address] {
        &self.roms
    }

    pub fn count(&self) -> usize {
        self.roms.len()
    }

    /// Discovers every device on the bus, replacing the registry.
    pub fn search<W: IoWire>(
        &mut self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayUs,
    ) -> Result<usize, Error<W::Error>> {
        driver.search_all(delay, &mut self.roms, false)?;
        Ok(self.roms.len())
    }

    /// Discovers devices and keeps only recognized temperature families,
    /// replacing the registry.
    pub fn search_filtered<W: IoWire>(
        &mut self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayUs,
    ) -> Result<usize, Error<W::Error>> {
        let mut all: Vec<Address, N> = Vec::new();
        driver.search_all(delay, &mut all, false)?;
        self.roms.clear();
        for addr in &all {
            if Family::from_code(addr.family_code()).is_some() {
                // cannot overflow, the filter only removes entries
                let _ = self.roms.push(*addr);
            }
        }
        Ok(self.roms.len())
    }

    /// Starts a conversion on the sensor at `idx`. Stale indices are ignored.
    pub fn convert<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayUs,
        idx: usize,
    ) -> Result<(), Error<W::Error>> {
        match self.roms.get(idx).copied() {
            Some(addr) => self.convert_rom(driver, delay, &addr),
            None => Ok(()),
        }
    }

    /// Starts a conversion on one addressed sensor without waiting for it.
    ///
    /// A reset without presence is a silent no-op: the device is unreachable
    /// right now and the next cycle will try again.
    pub fn convert_rom<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayUs,
        addr: &Address,
    ) -> Result<(), Error<W::Error>> {
        if !driver.reset(delay)? {
            return Ok(());
        }
        driver.select(delay, addr)?;
        driver.write_command(delay, Command::Convert)?;
        Ok(())
    }

    /// Starts a conversion on every device at once (Skip-ROM broadcast).
    pub fn convert_all<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayUs,
    ) -> Result<(), Error<W::Error>> {
        if !driver.reset(delay)? {
            return Ok(());
        }
        driver.skip(delay)?;
        driver.write_command(delay, Command::Convert)?;
        Ok(())
    }

    /// Reads the sensor at `idx`, in hundredths of a degree Celsius.
    pub fn read<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayUs,
        idx: usize,
    ) -> Result<Option<i16>, Error<W::Error>> {
        match self.roms.get(idx).copied() {
            Some(addr) => self.read_rom(driver, delay, &addr),
            None => Ok(None),
        }
    }

    /// Reads one addressed sensor, in hundredths of a degree Celsius.
    pub fn read_rom<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayUs,
        addr: &Address,
    ) -> Result<Option<i16>, Error<W::Error>> {
        if !driver.reset(delay)? {
            return Ok(None);
        }
        driver.select(delay, addr)?;
        driver.write_command(delay, Command::ReadScratchpad)?;

        let mut raw = [0u8; Scratchpad::BYTES];
        driver.read_bytes(delay, &mut raw)?;
        let scratchpad = Scratchpad::from_raw(raw);
        if !scratchpad.crc_ok() {
            return Ok(None);
        }
        Ok(Family::from_code(addr.family_code())
            .map(|family| family.centi_celsius(scratchpad.raw_temperature())))
    }

    /// Blocking convenience: convert, spin through the full conversion
    /// latency, read. Everything else in this crate avoids blocking; this
    /// is for callers that accept a 750ms busy wait.
    pub fn convert_and_read_blocking<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayUs,
        addr: &Address,
    ) -> Result<Option<i16>, Error<W::Error>> {
        self.convert_rom(driver, delay, addr)?;
        delay.delay_us(CONVERSION_TIME_MS * 1_000);
        self.read_rom(driver, delay, addr)
    }
}

impl<const N: usize> Default for TempSensors<N> {
    fn default() -> Self {
        Self::new()
    }
}

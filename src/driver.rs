use crate::{Address, Command, Error, IoWire, OpCode};
use core::fmt::Debug;
use embedded_hal::delay::DelayUs;

/// Bit-banged bus master over one open-drain line.
///
/// All methods are blocking at the slot level (tens of microseconds); the
/// long conversion waits live in [`poller`](crate::poller) instead.
pub struct Driver<W: IoWire> {
    io_wire: W,
}

impl<E: Debug, W: IoWire<Error = E>> Driver<W> {
    pub fn new(io_wire: W) -> Self {
        Driver { io_wire }
    }

    pub fn release(self) -> W {
        self.io_wire
    }

    /// Resets the bus and listens for a presence pulse.
    ///
    /// `Ok(true)` iff at least one device pulled the line low in the sample
    /// window. `Ok(false)` means nobody answered, which is an ordinary
    /// outcome on an empty line, not an error. `Err(WireFault)` means the
    /// line itself never came up.
    pub fn reset(&mut self, delay: &mut impl DelayUs) -> Result<bool, Error<E>> {
        self.set_high()?;
        self.ensure_wire_high(delay)?;

        self.set_low()?;
        delay.delay_us(480);

        self.set_high()?;
        delay.delay_us(70);

        let presence = self.is_low()?;
        delay.delay_us(410);
        Ok(presence)
    }

    fn ensure_wire_high(&mut self, delay: &mut impl DelayUs) -> Result<(), Error<E>> {
        for _ in 0..125 {
            if self.is_high()? {
                return Ok(());
            }
            delay.delay_us(2);
        }
        Err(Error::WireFault)
    }

    /// Frames the next command for one specific device (Match-ROM).
    pub fn select(&mut self, delay: &mut impl DelayUs, addr: &Address) -> Result<(), E> {
        self.write_byte(delay, Command::MatchRom.op_code())?;
        self.write_bytes(delay, addr.as_ref())
    }

    /// Frames the next command for every device at once (Skip-ROM).
    pub fn skip(&mut self, delay: &mut impl DelayUs) -> Result<(), E> {
        self.write_byte(delay, Command::SkipRom.op_code())
    }

    pub fn write_command(&mut self, delay: &mut impl DelayUs, cmd: impl OpCode) -> Result<(), E> {
        self.write_byte(delay, cmd.op_code())
    }

    pub fn write_bytes(&mut self, delay: &mut impl DelayUs, bytes: &[u8]) -> Result<(), E> {
        for b in bytes {
            self.write_byte(delay, *b)?;
        }
        Ok(())
    }

    pub(crate) fn write_byte(&mut self, delay: &mut impl DelayUs, byte: u8) -> Result<(), E> {
        let mut byte = byte;
        for _ in 0..8 {
            self.write_bit(delay, (byte & 0x01) == 0x01)?;
            byte >>= 1;
        }
        Ok(())
    }

    pub(crate) fn write_bit(&mut self, delay: &mut impl DelayUs, bit: bool) -> Result<(), E> {
        self.set_low()?;
        delay.delay_us(if bit { 6 } else { 60 });
        self.set_high()?;
        delay.delay_us(if bit { 64 } else { 10 });
        Ok(())
    }

    pub fn read_bytes(&mut self, delay: &mut impl DelayUs, dst: &mut [u8]) -> Result<(), E> {
        for d in dst {
            *d = self.read_byte(delay)?;
        }
        Ok(())
    }

    pub(crate) fn read_byte(&mut self, delay: &mut impl DelayUs) -> Result<u8, E> {
        let mut byte = 0_u8;
        for _ in 0..8 {
            byte >>= 1;
            if self.read_bit(delay)? {
                byte |= 0x80;
            }
        }
        Ok(byte)
    }

    /// One read slot.
    ///
    /// The 9us between release and sample must not stretch or the sampled
    /// level belongs to the wrong part of the slot, so that stretch runs
    /// with interrupts masked.
    pub(crate) fn read_bit(&mut self, delay: &mut impl DelayUs) -> Result<bool, E> {
        let bit = critical_section::with(|_| {
            self.set_low()?;
            delay.delay_us(6);
            self.set_high()?;
            delay.delay_us(9);
            self.is_high()
        })?;
        delay.delay_us(55);
        Ok(bit)
    }

    #[inline(always)]
    pub(crate) fn set_high(&mut self) -> Result<(), E> {
        self.io_wire.set_high()
    }

    #[inline(always)]
    pub(crate) fn set_low(&mut self) -> Result<(), E> {
        self.io_wire.set_low()
    }

    #[inline(always)]
    pub(crate) fn is_high(&mut self) -> Result<bool, E> {
        self.io_wire.is_high()
    }

    #[inline(always)]
    pub(crate) fn is_low(&mut self) -> Result<bool, E> {
        self.io_wire.is_low()
    }
}

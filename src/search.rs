use crate::{Address, Command, Driver, Error, IoWire};
use core::fmt::Debug;
use embedded_hal::delay::DelayUs;
use heapless::Vec;

/// Cross-pass bookkeeping for the binary-tree ROM search.
///
/// One pass walks all 64 bit positions and yields at most one address. The
/// discrepancy marker records the deepest position where the pass took the
/// zero branch of a collision; the next pass replays the committed address
/// bits up to that position and turns its zero into a one. A marker of zero
/// after a full pass means the whole tree has been walked.
#[derive(Clone, Default)]
pub struct RomSearch {
    address: Address,
    last_discrepancy: u8,
    complete: bool,
}

impl RomSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

impl<E: Debug, W: IoWire<Error = E>> Driver<W> {
    /// Advances the search by one pass.
    ///
    /// `Ok(None)` ends the search: the tree is exhausted, no device answered
    /// the reset, or both read slots of a position came back high (nobody
    /// left driving the line; the partial address is discarded).
    /// `Err(CrcMismatch)` drops this pass's address but leaves the search
    /// state usable, so the caller may keep walking.
    pub fn search_next(
        &mut self,
        search: &mut RomSearch,
        delay: &mut impl DelayUs,
    ) -> Result<Option<Address>, Error<E>> {
        self.search_step(search, delay, Command::SearchRom)
    }

    /// Like [`search_next`](Self::search_next), but only devices in an alarm
    /// condition take part.
    pub fn search_next_alarmed(
        &mut self,
        search: &mut RomSearch,
        delay: &mut impl DelayUs,
    ) -> Result<Option<Address>, Error<E>> {
        self.search_step(search, delay, Command::AlarmSearch)
    }

    /// Runs search passes until the tree is exhausted or `found` is full,
    /// replacing the contents of `found`.
    ///
    /// Addresses whose CRC fails are dropped and the walk continues behind
    /// them. When capacity runs out the pass in flight still finishes its
    /// 64 bits so the bus ends up idle, the extra address is discarded.
    pub fn search_all<const N: usize>(
        &mut self,
        delay: &mut impl DelayUs,
        found: &mut Vec<Address, N>,
        alarm_only: bool,
    ) -> Result<(), Error<E>> {
        found.clear();
        let cmd = if alarm_only {
            Command::AlarmSearch
        } else {
            Command::SearchRom
        };
        let mut search = RomSearch::new();
        loop {
            match self.search_step(&mut search, delay, cmd) {
                Ok(Some(address)) => {
                    if found.push(address).is_err() {
                        return Ok(());
                    }
                }
                Ok(None) => return Ok(()),
                Err(Error::CrcMismatch(..)) => continue,
                Err(error) => return Err(error),
            }
        }
    }

    fn search_step(
        &mut self,
        search: &mut RomSearch,
        delay: &mut impl DelayUs,
        cmd: Command,
    ) -> Result<Option<Address>, Error<E>> {
        if search.complete {
            return Ok(None);
        }
        if !self.reset(delay)? {
            search.complete = true;
            return Ok(None);
        }
        self.write_byte(delay, cmd as u8)?;

        let mut marker = 0u8;
        for i in 0..Address::BITS {
            let bit = self.read_bit(delay)?;
            let complement = self.read_bit(delay)?;

            if bit && complement {
                // nobody is driving the slots anymore, drop the partial address
                search.complete = true;
                return Ok(None);
            }

            let direction = if !bit && !complement {
                // devices disagree here, pick a branch
                if i + 1 == search.last_discrepancy {
                    // the zero branch under this position is done
                    true
                } else if i + 1 > search.last_discrepancy {
                    false
                } else {
                    // replay the path committed by the previous pass
                    search.address.bit(i)
                }
            } else {
                bit
            };

            if !bit && !complement && !direction {
                marker = i + 1;
            }

            search.address.set_bit(i, direction);
            // devices that disagree with the chosen bit drop out of the pass
            self.write_bit(delay, direction)?;
        }

        search.last_discrepancy = marker;
        if marker == 0 {
            search.complete = true;
        }

        let computed = crate::compute_crc8(&search.address[..7]);
        if computed != search.address.crc() {
            return Err(Error::CrcMismatch(computed, search.address.crc()));
        }
        Ok(Some(search.address))
    }
}

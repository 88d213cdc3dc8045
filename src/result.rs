use core::fmt::Debug;

/// Bus-level errors.
///
/// A missing device is not an error: [`Driver::reset`](crate::Driver::reset)
/// reports absence as `Ok(false)` and the command layers degrade to `None`,
/// so a poller can keep cycling through transient faults.
#[derive(Debug)]
pub enum Error<E: Sized + Debug> {
    /// The line never returned high, wiring or pull-up problem
    WireFault,
    /// Computed and received CRC-8 of the unit that failed verification
    CrcMismatch(u8, u8),
    PortError(E),
}

impl<E: Sized + Debug> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::PortError(e)
    }
}

use embedded_hal::digital::{Error, ErrorType, InputPin, OutputPin};

/// Open-drain access to the shared line.
///
/// `set_high` must release the line rather than drive it: devices and the
/// pull-up resistor decide the actual level, which is why the driver samples
/// through `is_high` even right after writing.
pub trait IoWire {
    type Error: Error;

    /// Current line level
    fn is_high(&mut self) -> Result<bool, Self::Error>;

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }

    /// Drive the line low
    fn set_low(&mut self) -> Result<(), Self::Error>;

    /// Release the line and let the pull-up raise it
    fn set_high(&mut self) -> Result<(), Self::Error>;
}

/// Single open-drain pin doing both directions
impl<IO> IoWire for (IO,)
where
    IO: ErrorType + OutputPin + InputPin,
{
    type Error = IO::Error;

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_low()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }
}

/// Split configuration: one pin senses the line, another drives it
impl<E, I, O> IoWire for (I, O)
where
    E: Error,
    I: ErrorType<Error = E> + InputPin,
    O: ErrorType<Error = E> + OutputPin,
{
    type Error = E;

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.1.set_low()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.1.set_high()
    }
}

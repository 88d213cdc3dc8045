use core::{
    fmt::{Display, Formatter, Result as FmtResult},
    ops::{Deref, DerefMut},
};

/// 64-bit ROM code of a bus device.
///
/// Layout on the wire: family code, six serial-number bytes, then a CRC-8
/// over the first seven bytes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct Address {
    raw: [u8; Self::BYTES as usize],
}

impl Address {
    /// The length of a device address in bytes
    pub const BYTES: u8 = 8;

    /// The length of a device address in bits
    pub const BITS: u8 = Self::BYTES * 8;

    /// Leading byte identifying the device type
    pub fn family_code(&self) -> u8 {
        self.raw[0]
    }

    /// The six serial-number bytes between family code and CRC
    pub fn serial(&self) -> &[u8] {
        &self.raw[1..7]
    }

    pub fn crc(&self) -> u8 {
        self.raw[7]
    }

    /// Whether the trailing CRC matches the first seven bytes
    pub fn is_valid(&self) -> bool {
        crate::compute_crc8(&self.raw[..7]) == self.raw[7]
    }

    pub(crate) fn bit(&self, index: u8) -> bool {
        self.raw[(index / 8) as usize] & (0x01 << (index % 8)) != 0x00
    }

    pub(crate) fn set_bit(&mut self, index: u8, value: bool) {
        let mask = 0x01 << (index % 8);
        if value {
            self.raw[(index / 8) as usize] |= mask;
        } else {
            self.raw[(index / 8) as usize] &= !mask;
        }
    }
}

impl From<[u8; Self::BYTES as usize]> for Address {
    fn from(raw: [u8; Self::BYTES as usize]) -> Self {
        Address { raw }
    }
}

impl From<Address> for [u8; Address::BYTES as usize] {
    fn from(addr: Address) -> [u8; Address::BYTES as usize] {
        addr.raw
    }
}

impl Deref for Address {
    type Target = [u8; Self::BYTES as usize];

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

impl DerefMut for Address {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.raw
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        self.deref() as _
    }
}

impl AsMut<[u8]> for Address {
    fn as_mut(&mut self) -> &mut [u8] {
        self.deref_mut() as _
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self[0], self[1], self[2], self[3], self[4], self[5], self[6], self[7],
        )
    }
}

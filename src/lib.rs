#![no_std]
#![doc = include_str!("../README.md")]

#[cfg(test)]
extern crate std;

mod address;
mod command;
mod driver;
mod iowire;
mod result;
mod search;

pub mod poller;
pub mod tsens;

#[cfg(test)]
mod sim;

pub use address::Address;
pub use command::{Command, OpCode};
pub use driver::Driver;
pub use iowire::IoWire;
pub use result::Error;
pub use search::RomSearch;

/// Continues a Dallas/Maxim CRC-8 over `data`, starting from `crc`.
///
/// Polynomial 0x8C (reflected), each byte processed LSB first.
pub fn compute_partial_crc8(crc: u8, data: &[u8]) -> u8 {
    let mut crc = crc;
    for byte in data.iter() {
        let mut byte = *byte;
        for _ in 0..8 {
            let mix = (crc ^ byte) & 0x01;
            crc >>= 1;
            if mix != 0x00 {
                crc ^= 0x8C;
            }
            byte >>= 1;
        }
    }
    crc
}

/// CRC-8 of `data` with the all-zero seed.
pub fn compute_crc8(data: &[u8]) -> u8 {
    compute_partial_crc8(0, data)
}

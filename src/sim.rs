//! Bit-level bus simulation backing the host tests.
//!
//! A pin handle and a delay handle share one [`Sim`]. Slots are classified
//! from the master's own drive/release timing: a long low is a reset pulse,
//! a ~60us low is a written zero, and a short low is either a written one or
//! a read slot, told apart by whether the master samples shortly after
//! releasing. Devices answer with open-drain wired-AND semantics, so the
//! search sees exactly the bit/complement pairs real hardware would produce.

use core::cell::RefCell;
use core::convert::Infallible;
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal::delay::DelayUs;

use crate::{Driver, IoWire};

pub(crate) struct SimDevice {
    rom: [u8; 8],
    scratchpad: [u8; 9],
    pub(crate) alarmed: bool,
    selected: bool,
    searching: bool,
}

impl SimDevice {
    pub(crate) fn new(family: u8, serial: [u8; 6], raw_temp: i16) -> Self {
        let mut rom = [0u8; 8];
        rom[0] = family;
        rom[1..7].copy_from_slice(&serial);
        rom[7] = crate::compute_crc8(&rom[..7]);
        Self::with_rom(rom, raw_temp)
    }

    /// Takes the ROM exactly as given, CRC byte included, so a test can put
    /// a device with a corrupted address on the line.
    pub(crate) fn with_rom(rom: [u8; 8], raw_temp: i16) -> Self {
        let mut scratchpad = [0u8; 9];
        scratchpad[..2].copy_from_slice(&raw_temp.to_le_bytes());
        scratchpad[2] = 0x4b;
        scratchpad[3] = 0x46;
        scratchpad[4] = 0x7f;
        scratchpad[8] = crate::compute_crc8(&scratchpad[..8]);
        SimDevice {
            rom,
            scratchpad,
            alarmed: false,
            selected: false,
            searching: false,
        }
    }

    pub(crate) fn rom(&self) -> [u8; 8] {
        self.rom
    }

    fn rom_bit(&self, index: u8) -> bool {
        self.rom[(index / 8) as usize] & (1 << (index % 8)) != 0
    }
}

enum SearchStep {
    Bit,
    Complement,
    Direction,
}

enum Phase {
    /// No transaction decoded; extra reads float high
    Idle,
    /// Collecting a command byte, LSB first
    Command { bits: u8, count: u8 },
    /// 64 rounds of bit, complement, then the master's direction write
    Search { bit_idx: u8, step: SearchStep },
    /// Collecting the 64 address bits following Match-ROM
    MatchRom { bits: u64, count: u8 },
    /// Streaming the selected device's scratchpad
    ReadScratchpad { byte_idx: usize, bit_idx: u8 },
}

pub(crate) struct Sim {
    devices: Vec<SimDevice>,
    phase: Phase,
    line_low: bool,
    low_us: u32,
    high_us: u32,
    pending_short: bool,
    presence_pending: bool,
}

impl Sim {
    fn new(devices: Vec<SimDevice>) -> Self {
        Sim {
            devices,
            phase: Phase::Idle,
            line_low: false,
            low_us: 0,
            high_us: 0,
            pending_short: false,
            presence_pending: false,
        }
    }

    fn advance(&mut self, us: u32) {
        if self.line_low {
            self.low_us += us;
        } else {
            self.high_us += us;
        }
    }

    fn set_low(&mut self) {
        if self.pending_short {
            // the previous short low was never sampled: a written one
            self.pending_short = false;
            self.master_bit(true);
        }
        self.line_low = true;
        self.low_us = 0;
    }

    fn set_high(&mut self) {
        if !self.line_low {
            return;
        }
        self.line_low = false;
        self.high_us = 0;
        if self.low_us >= 400 {
            self.reset_pulse();
        } else if self.low_us >= 20 {
            self.master_bit(false);
        } else {
            self.pending_short = true;
        }
    }

    fn sample_high(&mut self) -> bool {
        if self.pending_short {
            self.pending_short = false;
            if self.high_us <= 15 {
                // sampled inside the slot: a read slot, devices answer
                return self.slot_output();
            }
            // sampled long after release: the short low was a written one
            self.master_bit(true);
        }
        if self.presence_pending {
            self.presence_pending = false;
            return self.devices.is_empty();
        }
        true
    }

    fn reset_pulse(&mut self) {
        self.presence_pending = true;
        self.phase = Phase::Command { bits: 0, count: 0 };
        for device in &mut self.devices {
            device.selected = false;
            device.searching = false;
        }
    }

    fn master_bit(&mut self, value: bool) {
        let mut completed_op = None;
        let mut next_phase = None;
        match &mut self.phase {
            Phase::Command { bits, count } => {
                *bits |= (value as u8) << *count;
                *count += 1;
                if *count == 8 {
                    completed_op = Some(*bits);
                }
            }
            Phase::MatchRom { bits, count } => {
                *bits |= (value as u64) << *count;
                *count += 1;
                if *count == 64 {
                    let target = *bits;
                    for device in &mut self.devices {
                        device.selected = u64::from_le_bytes(device.rom) == target;
                    }
                    next_phase = Some(Phase::Command { bits: 0, count: 0 });
                }
            }
            Phase::Search { bit_idx, step } => {
                if matches!(step, SearchStep::Direction) {
                    let idx = *bit_idx;
                    for device in &mut self.devices {
                        if device.searching && device.rom_bit(idx) != value {
                            device.searching = false;
                        }
                    }
                    *bit_idx += 1;
                    if *bit_idx == 64 {
                        next_phase = Some(Phase::Idle);
                    } else {
                        *step = SearchStep::Bit;
                    }
                }
            }
            _ => {}
        }
        if let Some(phase) = next_phase {
            self.phase = phase;
        }
        if let Some(op) = completed_op {
            self.dispatch(op);
        }
    }

    fn dispatch(&mut self, op: u8) {
        match op {
            0xf0 | 0xec => {
                let alarm_only = op == 0xec;
                for device in &mut self.devices {
                    device.searching = !alarm_only || device.alarmed;
                }
                self.phase = Phase::Search {
                    bit_idx: 0,
                    step: SearchStep::Bit,
                };
            }
            0x55 => self.phase = Phase::MatchRom { bits: 0, count: 0 },
            0xcc => {
                for device in &mut self.devices {
                    device.selected = true;
                }
                self.phase = Phase::Command { bits: 0, count: 0 };
            }
            0xbe => {
                self.phase = Phase::ReadScratchpad {
                    byte_idx: 0,
                    bit_idx: 0,
                };
            }
            // convert and the remaining device commands produce no bus
            // traffic the master would sample
            _ => self.phase = Phase::Idle,
        }
    }

    fn slot_output(&mut self) -> bool {
        let mut next_phase = None;
        let out = match &mut self.phase {
            Phase::Search { bit_idx, step } => {
                let idx = *bit_idx;
                match step {
                    SearchStep::Bit => {
                        *step = SearchStep::Complement;
                        // wired-AND: high only if no participant sends a zero
                        self.devices
                            .iter()
                            .filter(|d| d.searching)
                            .all(|d| d.rom_bit(idx))
                    }
                    SearchStep::Complement => {
                        *step = SearchStep::Direction;
                        self.devices
                            .iter()
                            .filter(|d| d.searching)
                            .all(|d| !d.rom_bit(idx))
                    }
                    SearchStep::Direction => true,
                }
            }
            Phase::ReadScratchpad { byte_idx, bit_idx } => {
                let (byte, bit) = (*byte_idx, *bit_idx);
                *bit_idx += 1;
                if *bit_idx == 8 {
                    *bit_idx = 0;
                    *byte_idx += 1;
                }
                if *byte_idx >= 9 {
                    next_phase = Some(Phase::Idle);
                }
                self.devices
                    .iter()
                    .find(|d| d.selected)
                    .map(|d| (d.scratchpad[byte] >> bit) & 1 != 0)
                    .unwrap_or(true)
            }
            _ => true,
        };
        if let Some(phase) = next_phase {
            self.phase = phase;
        }
        out
    }
}

#[derive(Clone)]
pub(crate) struct SimHandle {
    sim: Rc<RefCell<Sim>>,
}

impl SimHandle {
    pub(crate) fn new(devices: Vec<SimDevice>) -> Self {
        SimHandle {
            sim: Rc::new(RefCell::new(Sim::new(devices))),
        }
    }

    pub(crate) fn bus(&self) -> SimBus {
        SimBus {
            sim: Rc::clone(&self.sim),
        }
    }

    pub(crate) fn delay(&self) -> SimDelay {
        SimDelay {
            sim: Rc::clone(&self.sim),
        }
    }
}

pub(crate) struct SimBus {
    sim: Rc<RefCell<Sim>>,
}

impl IoWire for SimBus {
    type Error = Infallible;

    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.sim.borrow_mut().sample_high())
    }

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.sim.borrow_mut().set_low();
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.sim.borrow_mut().set_high();
        Ok(())
    }
}

pub(crate) struct SimDelay {
    sim: Rc<RefCell<Sim>>,
}

impl DelayUs for SimDelay {
    fn delay_us(&mut self, us: u32) {
        self.sim.borrow_mut().advance(us);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay_us(ms.saturating_mul(1_000));
    }
}

pub(crate) fn sim_driver(devices: Vec<SimDevice>) -> (Driver<SimBus>, SimDelay) {
    let handle = SimHandle::new(devices);
    (Driver::new(handle.bus()), handle.delay())
}

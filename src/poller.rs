//! Non-blocking polling of every discovered sensor.
//!
//! The poller is driven by calling [`Poller::poll`] from the application
//! loop with a monotonic millisecond timestamp. Each effective tick performs
//! at most one bus operation, so a single call never blocks longer than one
//! command frame; the long conversion latency is spent counting ticks.

use embedded_hal::delay::DelayUs;
use heapless::Vec;

use crate::tsens::TempSensors;
use crate::{Address, Driver, Error, IoWire};

/// Minimum interval between effective ticks, in milliseconds
pub const TICK_MS: u32 = 30;

const CONVERT_WAIT_MS: u32 = 800;
const CYCLE_WAIT_MS: u32 = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Discovery pending
    Init,
    /// Broadcast conversion pending
    Convert,
    /// Counting down the conversion latency
    ConvertWait,
    /// Reading one sensor per tick
    Read,
    /// Counting down the pause between cycles
    ReadWait,
    /// Discovery found nothing; terminal until [`Poller::restart`]
    NoSensor,
}

/// Per-sensor outcome of the latest read cycle.
///
/// Holds its own copy of the address, so it stays meaningful even after a
/// later rediscovery replaces the registry.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorRecord {
    address: Address,
    active: bool,
    valid: bool,
    temp: i16,
}

impl SensorRecord {
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Whether the sensor was present at discovery
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Last temperature in hundredths of a degree Celsius, if the last
    /// read succeeded
    pub fn temperature(&self) -> Option<i16> {
        self.valid.then_some(self.temp)
    }
}

/// Cooperative discovery/convert/read state machine over up to `N` sensors.
///
/// `F` is the "cycle ready" callback; it fires exactly once per completed
/// read cycle, synchronously from [`poll`](Self::poll), with the full
/// record slice.
pub struct Poller<const N: usize, F = fn(&[SensorRecord])> {
    sensors: TempSensors<N>,
    records: Vec<SensorRecord, N>,
    on_ready: Option<F>,
    state: State,
    last_tick: u32,
    countdown: u16,
    cursor: usize,
}

impl<const N: usize, F: FnMut(&[SensorRecord])> Poller<N, F> {
    pub fn new() -> Self {
        Poller {
            sensors: TempSensors::new(),
            records: Vec::new(),
            on_ready: None,
            state: State::Init,
            last_tick: 0,
            countdown: 0,
            cursor: 0,
        }
    }

    /// Registers the callback invoked after every completed read cycle.
    pub fn set_ready_callback(&mut self, on_ready: F) {
        self.on_ready = Some(on_ready);
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Records of the current cycle, in registry order
    pub fn records(&self) -> &[SensorRecord] {
        &self.records
    }

    pub fn sensors(&self) -> &TempSensors<N> {
        &self.sensors
    }

    /// Drops all progress and forces a fresh discovery on the next tick.
    ///
    /// This is the only way out of [`State::NoSensor`] and the only way to
    /// abort a cycle in flight.
    pub fn restart(&mut self) {
        self.records.clear();
        self.state = State::Init;
        self.countdown = 0;
        self.cursor = 0;
    }

    /// Advances the state machine, at most one step per [`TICK_MS`].
    ///
    /// Call it as often as convenient with a monotonic millisecond
    /// timestamp; calls inside the minimum interval return immediately.
    pub fn poll<W: IoWire>(
        &mut self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayUs,
        now_ms: u32,
    ) -> Result<(), Error<W::Error>> {
        if now_ms.wrapping_sub(self.last_tick) < TICK_MS {
            return Ok(());
        }
        self.last_tick = now_ms;

        match self.state {
            State::Init => {
                let found = self.sensors.search_filtered(driver, delay)?;
                self.records.clear();
                for addr in self.sensors.addresses() {
                    // same capacity as the registry, cannot overflow
                    let _ = self.records.push(SensorRecord {
                        address: *addr,
                        active: true,
                        valid: false,
                        temp: 0,
                    });
                }
                self.state = if found > 0 {
                    State::Convert
                } else {
                    State::NoSensor
                };
            }
            State::Convert => {
                self.sensors.convert_all(driver, delay)?;
                self.countdown = ticks_for(CONVERT_WAIT_MS);
                self.state = State::ConvertWait;
            }
            State::ConvertWait => {
                self.countdown -= 1;
                if self.countdown == 0 {
                    self.cursor = 0;
                    self.state = State::Read;
                }
            }
            State::Read => {
                let temp = self.sensors.read(driver, delay, self.cursor)?;
                if let Some(record) = self.records.get_mut(self.cursor) {
                    record.valid = temp.is_some();
                    record.temp = temp.unwrap_or(0);
                }
                self.cursor += 1;
                if self.cursor >= self.records.len() {
                    if let Some(on_ready) = self.on_ready.as_mut() {
                        on_ready(&self.records);
                    }
                    self.countdown = ticks_for(CYCLE_WAIT_MS);
                    self.state = State::ReadWait;
                }
            }
            State::ReadWait => {
                self.countdown -= 1;
                if self.countdown == 0 {
                    self.state = State::Convert;
                }
            }
            State::NoSensor => {}
        }
        Ok(())
    }

    /// Lowest temperature among valid records
    pub fn min_temperature(&self) -> Option<i16> {
        self.valid_temperatures().min()
    }

    /// Highest temperature among valid records
    pub fn max_temperature(&self) -> Option<i16> {
        self.valid_temperatures().max()
    }

    /// Arithmetic mean of the valid records
    pub fn mid_temperature(&self) -> Option<i16> {
        let mut sum = 0i32;
        let mut count = 0i32;
        for temp in self.valid_temperatures() {
            sum += i32::from(temp);
            count += 1;
        }
        (count > 0).then(|| (sum / count) as i16)
    }

    fn valid_temperatures(&self) -> impl Iterator<Item = i16> + '_ {
        self.records.iter().filter(|r| r.valid).map(|r| r.temp)
    }
}

impl<const N: usize, F: FnMut(&[SensorRecord])> Default for Poller<N, F> {
    fn default() -> Self {
        Self::new()
    }
}

fn ticks_for(ms: u32) -> u16 {
    ((ms + TICK_MS / 2) / TICK_MS) as u16
}

/// Anything that can be written to the bus as a command byte.
pub trait OpCode {
    fn op_code(&self) -> u8;
}

/// ROM-level commands understood by every device family.
#[derive(Clone, Copy, Debug)]
#[repr(u8)]
pub enum Command {
    SearchRom = 0xF0,
    ReadRom = 0x33,
    MatchRom = 0x55,
    SkipRom = 0xCC,
    AlarmSearch = 0xEC,
}

impl OpCode for Command {
    fn op_code(&self) -> u8 {
        *self as _
    }
}

//! Crate-wide error type. Fatal conditions the original C++ resolved with
//! `exit(1)` surface here instead, leaving the caller free to reset the
//! machine, abort, or keep running in whatever way fits the host.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum CoreError {
    /// Opcode byte has no defined behavior (outside the release-tolerated set).
    IllegalOpcode { pc: u16, opcode: u8 },
    /// `(data_hi, data_lo)` does not match any banking rule in the mapping table.
    UnmappedBank { data_hi: u8, data_lo: u8 },
    /// SFR address fell outside the whitelisted ranges for its `wsr`.
    IoOutOfRange { addr: u16, wsr: u8 },
    /// A `wsr`/`wsr1` value other than 0, 1, or 15 was used on a window-sensitive register.
    BadWindow { wsr: u8 },
    /// ROM name in a save state could not be resolved against any loaded ROM.
    StateMismatch { rom_name: String },
    /// The adapter reported an I/O failure.
    Adapter(String),
    /// A ROM/EEPROM/state file could not be loaded or saved.
    Io(io::Error),
    /// Input container format is not one this build can unpack.
    UnsupportedContainer,
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::IllegalOpcode { pc, opcode } => {
                write!(f, "illegal opcode {opcode:#04x} at pc {pc:#06x}")
            }
            CoreError::UnmappedBank { data_hi, data_lo } => write!(
                f,
                "unimplemented memory mapping (data_hi={data_hi:#04x}, data_lo={data_lo:#04x})"
            ),
            CoreError::IoOutOfRange { addr, wsr } => {
                write!(f, "I/O access out of range: addr={addr:#06x} wsr={wsr}")
            }
            CoreError::BadWindow { wsr } => write!(f, "invalid window select register value {wsr}"),
            CoreError::StateMismatch { rom_name } => {
                write!(f, "saved state references unresolvable ROM '{rom_name}'")
            }
            CoreError::Adapter(msg) => write!(f, "adapter error: {msg}"),
            CoreError::Io(e) => write!(f, "I/O error: {e}"),
            CoreError::UnsupportedContainer => {
                write!(f, "input container format requires unpacking support not built in")
            }
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CoreError {
    fn from(e: io::Error) -> Self {
        CoreError::Io(e)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

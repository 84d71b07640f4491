//! Off-chip serial EEPROM: a 3-wire bit-banged protocol state machine
//! driven by I/O-port bit toggles, backing 128 16-bit words that persist
//! to a `<rom>.eep` sidecar file.

use crate::error::CoreResult;
use crate::event::{EventKind, EventLog};
use crate::state::{StateIo, StateReader, StateWriter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const WORD_COUNT: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Cmd,
    AddrWrite,
    DataWrite,
    AddrRead,
    DataRead,
    Unknown,
}

pub struct Eeprom {
    enable: bool,
    clock: bool,
    bit_count: i32,
    cmd: u8,
    data: u32,
    addr: u16,
    mode: Mode,
    mem: [u16; WORD_COUNT],
    filename: Option<PathBuf>,
}

impl Eeprom {
    pub fn new() -> Self {
        Eeprom {
            enable: false,
            clock: true,
            bit_count: 0,
            cmd: 0,
            data: 0,
            addr: 0,
            mode: Mode::Cmd,
            mem: [0u16; WORD_COUNT],
            filename: None,
        }
    }

    /// Load existing contents from the sidecar path if it exists; remember
    /// the path so `persist` writes back to the same file.
    pub fn set_filename(&mut self, path: &Path) {
        if let Ok(bytes) = fs::read(path) {
            if bytes.len() >= WORD_COUNT * 2 {
                for (i, word) in self.mem.iter_mut().enumerate() {
                    *word = u16::from_le_bytes([bytes[i * 2], bytes[i * 2 + 1]]);
                }
                log::warn!("loaded EEPROM contents from {}", path.display());
            }
        } else {
            log::warn!("failed to load EEPROM contents from {}", path.display());
        }
        self.filename = Some(path.to_path_buf());
    }

    /// Write current contents back to the sidecar file. The caller is
    /// responsible for skipping this while replaying, per the original's
    /// `!cpu->isReplaying()` guard.
    pub fn persist(&self) -> CoreResult<()> {
        let Some(path) = &self.filename else {
            return Ok(());
        };
        let mut bytes = Vec::with_capacity(WORD_COUNT * 2);
        for word in &self.mem {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        fs::write(path, bytes)?;
        log::warn!("wrote EEPROM contents to {}", path.display());
        Ok(())
    }

    pub fn erase(&mut self) {
        self.mem = [0u16; WORD_COUNT];
    }

    /// Drive the bit-bang state machine on an I/O-port write. `ena`/`clk`
    /// are the bitbang-enable and clock line levels; `bit` is the data
    /// line sampled on the clock's falling edge.
    pub fn toggle_inputs(&mut self, ena: bool, clk: bool, bit: bool) {
        if !self.enable && ena {
            self.mode = Mode::Cmd;
            self.cmd = 0;
            self.bit_count = 3;
        } else if self.enable && !ena {
            // bitbang off, nothing else to do
        } else if self.enable && self.clock && !clk {
            self.clock_falling_edge(bit);
        }
        self.enable = ena;
        self.clock = clk;
    }

    fn clock_falling_edge(&mut self, bit: bool) {
        match self.mode {
            Mode::Cmd => {
                self.bit_count -= 1;
                if bit {
                    self.cmd |= 1 << self.bit_count;
                }
                if self.bit_count == 0 {
                    match self.cmd {
                        6 => {
                            self.mode = Mode::AddrRead;
                            self.bit_count = 8;
                            self.addr = 0;
                        }
                        5 => {
                            self.mode = Mode::AddrWrite;
                            self.bit_count = 8;
                            self.addr = 0;
                        }
                        4 => {
                            self.mode = Mode::Unknown;
                            self.bit_count = 8;
                            self.addr = 0;
                        }
                        other => {
                            log::error!("unknown EEPROM command {other:#x}");
                        }
                    }
                }
            }
            Mode::AddrRead | Mode::AddrWrite => {
                self.bit_count -= 1;
                if bit {
                    self.addr |= 1 << self.bit_count;
                }
                if self.bit_count == 0 {
                    if self.mode == Mode::AddrRead {
                        self.mode = Mode::DataRead;
                        self.bit_count = 16;
                        self.data = self.mem[(self.addr as usize) % WORD_COUNT] as u32;
                    } else {
                        self.mode = Mode::DataWrite;
                        self.bit_count = 16;
                        self.data = 0;
                    }
                }
            }
            Mode::DataRead => {
                if self.bit_count > 0 {
                    self.bit_count -= 1;
                }
            }
            Mode::DataWrite => {
                if self.bit_count > 0 {
                    self.bit_count -= 1;
                    if bit {
                        self.data |= 1 << self.bit_count;
                    }
                }
                if self.bit_count == 0 {
                    self.mem[(self.addr as usize) % WORD_COUNT] = self.data as u16;
                }
            }
            Mode::Unknown => {
                if self.bit_count > 0 {
                    self.bit_count -= 1;
                }
            }
        }
    }

    /// Return the current output bit. During replay, the value is pulled
    /// from the recorded event log instead of the live state.
    pub fn read_data(&self, cycles: u64, events: &mut EventLog) -> bool {
        if events.is_replaying() {
            return events
                .retrieve_required(cycles, EventKind::EepromRead)
                .map(|v| v != 0)
                .unwrap_or(false);
        }
        let ret = self.data & (1 << self.bit_count.max(0)) != 0;
        events.record(cycles, EventKind::EepromRead, ret as i32);
        ret
    }
}

impl Default for Eeprom {
    fn default() -> Self {
        Self::new()
    }
}

impl StateIo for Eeprom {
    fn save(&self, w: &mut StateWriter) -> io::Result<()> {
        w.bool(self.enable)?;
        w.bool(self.clock)?;
        w.i32(self.bit_count)?;
        w.u8(self.cmd)?;
        w.u32(self.data)?;
        w.u16(self.addr)?;
        w.u8(self.mode as u8)?;
        for word in &self.mem {
            w.u16(*word)?;
        }
        w.opt_string(&self.filename.as_ref().map(|p| p.to_string_lossy().into_owned()))
    }

    fn load(&mut self, r: &mut StateReader) -> io::Result<()> {
        self.enable = r.bool()?;
        self.clock = r.bool()?;
        self.bit_count = r.i32()?;
        self.cmd = r.u8()?;
        self.data = r.u32()?;
        self.addr = r.u16()?;
        self.mode = match r.u8()? {
            0 => Mode::Cmd,
            1 => Mode::AddrWrite,
            2 => Mode::DataWrite,
            3 => Mode::AddrRead,
            4 => Mode::DataRead,
            _ => Mode::Unknown,
        };
        for word in self.mem.iter_mut() {
            *word = r.u16()?;
        }
        self.filename = r.opt_string()?.map(PathBuf::from);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_word(ee: &mut Eeprom, addr: u8, value: u16) {
        ee.toggle_inputs(true, true, false);
        // command 5 = write, MSB first over 3 bits
        for i in (0..3).rev() {
            let bit = (5 >> i) & 1 != 0;
            ee.toggle_inputs(true, false, bit);
            ee.toggle_inputs(true, true, bit);
        }
        for i in (0..8).rev() {
            let bit = (addr >> i) & 1 != 0;
            ee.toggle_inputs(true, false, bit);
            ee.toggle_inputs(true, true, bit);
        }
        for i in (0..16).rev() {
            let bit = (value >> i) & 1 != 0;
            ee.toggle_inputs(true, false, bit);
            ee.toggle_inputs(true, true, bit);
        }
        ee.toggle_inputs(false, true, false);
    }

    #[test]
    fn bitbang_write_then_internal_read() {
        let mut ee = Eeprom::new();
        write_word(&mut ee, 0x05, 0xBEEF);
        assert_eq!(ee.mem[5], 0xBEEF);
    }

    #[test]
    fn erase_clears_all_words() {
        let mut ee = Eeprom::new();
        write_word(&mut ee, 0, 0xFFFF);
        ee.erase();
        assert_eq!(ee.mem[0], 0);
    }
}

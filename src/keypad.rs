//! Scan-key matrix: a host-event -> 4-row key register. Row 0 holds the
//! function keys shared by every model; rows 1-3 hold the numeric pad,
//! cursor keys, and modifier/action keys respectively. Key lines are
//! active-low, matching the original's `SET_KEY`/`CLEAR_KEY` macros.

use crate::cpu::command::CpuCommand;
use crate::event::{EventKind, EventLog};
use crate::state::{StateIo, StateReader, StateWriter};
use std::io;

/// A single named key, encoded as `(row << 8) | bitmask` to mirror the
/// original's `HI_*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyCode(pub u16);

impl KeyCode {
    fn row(self) -> usize {
        (self.0 >> 8) as usize
    }
    fn mask(self) -> u8 {
        (self.0 & 0xff) as u8
    }
}

pub const F1: KeyCode = KeyCode(0x301);
pub const F2: KeyCode = KeyCode(0x302);
pub const F3: KeyCode = KeyCode(0x304);
pub const F4: KeyCode = KeyCode(0x308);
pub const F5: KeyCode = KeyCode(0x310);
pub const F6: KeyCode = KeyCode(0x320);
pub const ESCAPE: KeyCode = KeyCode(0x340);

pub const K1: KeyCode = KeyCode(0x201);
pub const K2: KeyCode = KeyCode(0x202);
pub const K3: KeyCode = KeyCode(0x204);
pub const K4: KeyCode = KeyCode(0x208);
pub const K5: KeyCode = KeyCode(0x210);
pub const K6: KeyCode = KeyCode(0x220);
pub const K7: KeyCode = KeyCode(0x240);

pub const K8: KeyCode = KeyCode(0x101);
pub const K9: KeyCode = KeyCode(0x102);
pub const K0: KeyCode = KeyCode(0x104);
pub const UP: KeyCode = KeyCode(0x108);
pub const DOWN: KeyCode = KeyCode(0x110);
pub const LEFT: KeyCode = KeyCode(0x120);
pub const RIGHT: KeyCode = KeyCode(0x140);

pub const HELP: KeyCode = KeyCode(0x001);
pub const SHIFT: KeyCode = KeyCode(0x002);
pub const UNDO: KeyCode = KeyCode(0x004);
pub const NO: KeyCode = KeyCode(0x008);
pub const YES: KeyCode = KeyCode(0x010);
pub const BACKLIGHT: KeyCode = KeyCode(0x020);
pub const RETURN: KeyCode = KeyCode(0x040);

pub struct Keypad {
    key: [u8; 4],
    selected_row: usize,
}

impl Keypad {
    pub fn new() -> Self {
        Keypad {
            key: [0xFF; 4],
            selected_row: 0,
        }
    }

    pub fn select_row(&mut self, row: u8) {
        self.selected_row = (row as usize) & 0x3;
    }

    pub fn read_selected(&self) -> u8 {
        self.key[self.selected_row]
    }

    pub fn get_line(&self, line: usize) -> u8 {
        self.key[line & 0x3]
    }

    fn set_key(&mut self, k: KeyCode) {
        self.key[k.row()] &= !k.mask();
    }

    fn clear_key(&mut self, k: KeyCode) {
        self.key[k.row()] |= k.mask();
    }

    /// Apply a host key-down/up event, logging it for replay determinism
    /// and returning a `CpuCommand` if the key maps to one (e.g. F10/EXIT)
    /// rather than a matrix bit.
    pub fn key_down(&mut self, cycles: u64, events: &mut EventLog, code: u16) -> Option<CpuCommand> {
        events.record(cycles, EventKind::KeyDown, code as i32);
        self.apply(code, true)
    }

    pub fn key_up(&mut self, cycles: u64, events: &mut EventLog, code: u16) -> Option<CpuCommand> {
        events.record(cycles, EventKind::KeyUp, code as i32);
        self.apply(code, false)
    }

    /// During replay, host input is ignored and the matrix is driven
    /// entirely from the recorded log instead.
    pub fn pump_replay(&mut self, cycles: u64, events: &mut EventLog) {
        if let Some(code) = events.retrieve(cycles, EventKind::KeyDown) {
            self.apply(code as u16, true);
        }
        if let Some(code) = events.retrieve(cycles, EventKind::KeyUp) {
            self.apply(code as u16, false);
        }
    }

    fn apply(&mut self, code: u16, down: bool) -> Option<CpuCommand> {
        let k = KeyCode(code);
        if down {
            self.set_key(k);
        } else {
            self.clear_key(k);
        }
        None
    }
}

impl Default for Keypad {
    fn default() -> Self {
        Self::new()
    }
}

impl StateIo for Keypad {
    fn save(&self, w: &mut StateWriter) -> io::Result<()> {
        w.buf(&self.key)
    }

    fn load(&mut self, r: &mut StateReader) -> io::Result<()> {
        r.buf(&mut self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_key_clears_bit_active_low() {
        let mut kp = Keypad::new();
        kp.key_down(0, &mut EventLog::new(), YES.0);
        assert_eq!(kp.get_line(0) & YES.mask(), 0);
    }

    #[test]
    fn clear_key_restores_bit() {
        let mut kp = Keypad::new();
        let mut log = EventLog::new();
        kp.key_down(0, &mut log, YES.0);
        kp.key_up(1, &mut log, YES.0);
        assert_eq!(kp.get_line(0) & YES.mask(), YES.mask());
    }

    #[test]
    fn row_select_changes_what_read_selected_returns() {
        let mut kp = Keypad::new();
        kp.key_down(0, &mut EventLog::new(), K1.0);
        kp.select_row(2);
        assert_eq!(kp.read_selected() & K1.mask(), 0);
    }
}

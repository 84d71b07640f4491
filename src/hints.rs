//! Host-facing indicator bits set by peripherals — beeper/backlight LED,
//! EEPROM-active LED — with no rendering behavior of its own. A host UI
//! reads these to drive its own widgets; this struct is purely the
//! hand-off point, and participates in state save/load like any other
//! peripheral.

use crate::state::{StateIo, StateReader, StateWriter};
use std::io;

#[derive(Debug, Default, Clone, Copy)]
pub struct Hints {
    pub beeper: bool,
    pub backlight: bool,
    pub eeprom_active: bool,
}

impl Hints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_beeper(&mut self, on: bool) {
        self.beeper = on;
    }

    pub fn set_backlight(&mut self, on: bool) {
        self.backlight = on;
    }

    pub fn set_eeprom_active(&mut self, on: bool) {
        self.eeprom_active = on;
    }
}

impl StateIo for Hints {
    fn save(&self, w: &mut StateWriter) -> io::Result<()> {
        w.bool(self.beeper)?;
        w.bool(self.backlight)?;
        w.bool(self.eeprom_active)
    }

    fn load(&mut self, r: &mut StateReader) -> io::Result<()> {
        self.beeper = r.bool()?;
        self.backlight = r.bool()?;
        self.eeprom_active = r.bool()?;
        Ok(())
    }
}

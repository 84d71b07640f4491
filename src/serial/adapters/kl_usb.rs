//! KL-USB-chip adapter: a smart USB dongle with its own firmware, commanded
//! over a simple binary protocol rather than raw `termios` framing. Baud
//! divisor, slow init, and L-line control are all firmware commands rather
//! than host-side bit-banging.

use crate::error::{CoreError, CoreResult};
use crate::serial::adapter::Adapter;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

const CMD_SET_DIVISOR: u8 = 0xAA;
const CMD_SLOW_INIT: u8 = 0xAB;
const CMD_SET_L: u8 = 0xAC;

pub struct KlUsbChip {
    port: File,
}

impl KlUsbChip {
    pub fn open(path: &Path) -> CoreResult<Self> {
        let port = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(CoreError::Io)?;
        Ok(KlUsbChip { port })
    }

    fn send_command(&mut self, bytes: &[u8]) -> CoreResult<()> {
        self.port.write_all(bytes).map_err(CoreError::Io)
    }
}

impl Adapter for KlUsbChip {
    fn set_baud_divisor(&mut self, divisor: u16) -> CoreResult<()> {
        let [lo, hi] = divisor.to_le_bytes();
        self.send_command(&[CMD_SET_DIVISOR, lo, hi])
    }

    fn check_input(&mut self) -> CoreResult<Option<u8>> {
        let mut b = [0u8; 1];
        match self.port.read(&mut b) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(b[0])),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(CoreError::Io(e)),
        }
    }

    fn send_byte(&mut self, byte: u8) -> CoreResult<()> {
        self.port.write_all(&[byte]).map_err(CoreError::Io)
    }

    fn slow_init_imminent(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn send_slow_init(&mut self, address: u8) -> CoreResult<()> {
        self.send_command(&[CMD_SLOW_INIT, address])
    }

    fn set_l(&mut self, level: bool) -> CoreResult<()> {
        self.send_command(&[CMD_SET_L, level as u8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divisor_command_framing() {
        assert_eq!(CMD_SET_DIVISOR, 0xAA);
    }
}

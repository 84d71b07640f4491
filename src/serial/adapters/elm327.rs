//! ELM327-style adapter: a widely deployed command-line chip that frames
//! OBD traffic behind `AT` configuration commands and echoes a `>` prompt
//! between exchanges. This core only needs enough of that protocol to set
//! the initiation baud rate and pass bytes through once the ELM chip has
//! switched to transparent pass-through mode (`ATSP`), which the scanner
//! ROMs always select before talking to the bus directly.

use crate::error::{CoreError, CoreResult};
use crate::serial::adapter::Adapter;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

pub struct Elm327 {
    port: File,
    pending: VecDeque<u8>,
}

impl Elm327 {
    pub fn open(path: &Path) -> CoreResult<Self> {
        let port = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(CoreError::Io)?;
        let mut adapter = Elm327 {
            port,
            pending: VecDeque::new(),
        };
        adapter.at_command("ATZ")?;
        adapter.at_command("ATE0")?;
        adapter.at_command("ATSP0")?;
        Ok(adapter)
    }

    fn at_command(&mut self, cmd: &str) -> CoreResult<()> {
        self.port
            .write_all(format!("{cmd}\r").as_bytes())
            .map_err(CoreError::Io)?;
        // drain until the '>' prompt so the next command isn't interleaved
        // with this one's echo/response.
        let mut buf = [0u8; 1];
        loop {
            match self.port.read(&mut buf) {
                Ok(0) => break,
                Ok(_) if buf[0] == b'>' => break,
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(CoreError::Io(e)),
            }
        }
        Ok(())
    }
}

impl Adapter for Elm327 {
    fn set_baud_divisor(&mut self, divisor: u16) -> CoreResult<()> {
        let baud = if divisor == 0 { 10_400 } else { 16_000_000 / divisor as u32 };
        self.at_command(&format!("ATBRD{baud:04X}"))
    }

    fn check_input(&mut self) -> CoreResult<Option<u8>> {
        if let Some(b) = self.pending.pop_front() {
            return Ok(Some(b));
        }
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(CoreError::Io(e)),
        }
    }

    fn send_byte(&mut self, byte: u8) -> CoreResult<()> {
        self.port.write_all(&[byte]).map_err(CoreError::Io)
    }

    fn slow_init_imminent(&mut self) -> CoreResult<()> {
        self.at_command("ATSI")
    }

    fn send_slow_init(&mut self, address: u8) -> CoreResult<()> {
        self.at_command(&format!("ATSI{address:02X}"))
    }
}

//! Deterministic, scripted adapter used by tests and by `--fake` on the
//! command line: plays back a fixed sequence of response bytes rather than
//! touching any real transport, so record/replay tests never depend on
//! external hardware.

use crate::error::CoreResult;
use crate::serial::adapter::Adapter;
use std::collections::VecDeque;

pub struct FakeAdapter {
    pub rx: VecDeque<u8>,
    pub tx_log: Vec<u8>,
    pub baud_divisor: u16,
    pub l_level: bool,
    pub can_enabled: bool,
}

impl FakeAdapter {
    pub fn new() -> Self {
        FakeAdapter {
            rx: VecDeque::new(),
            tx_log: Vec::new(),
            baud_divisor: 0,
            l_level: true,
            can_enabled: false,
        }
    }

    /// Queue bytes a test expects the "ECU" to send back.
    pub fn script(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }
}

impl Default for FakeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for FakeAdapter {
    fn set_baud_divisor(&mut self, divisor: u16) -> CoreResult<()> {
        self.baud_divisor = divisor;
        Ok(())
    }

    fn check_input(&mut self) -> CoreResult<Option<u8>> {
        Ok(self.rx.pop_front())
    }

    fn send_byte(&mut self, byte: u8) -> CoreResult<()> {
        self.tx_log.push(byte);
        Ok(())
    }

    fn slow_init_imminent(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn set_l(&mut self, level: bool) -> CoreResult<()> {
        self.l_level = level;
        Ok(())
    }

    fn set_can(&mut self, enabled: bool) -> CoreResult<()> {
        self.can_enabled = enabled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_bytes_play_back_in_order() {
        let mut fake = FakeAdapter::new();
        fake.script(&[0x41, 0x42]);
        assert_eq!(fake.check_input().unwrap(), Some(0x41));
        assert_eq!(fake.check_input().unwrap(), Some(0x42));
        assert_eq!(fake.check_input().unwrap(), None);
    }

    #[test]
    fn sent_bytes_are_logged_for_assertions() {
        let mut fake = FakeAdapter::new();
        fake.send_byte(0x55).unwrap();
        assert_eq!(fake.tx_log, vec![0x55]);
    }
}

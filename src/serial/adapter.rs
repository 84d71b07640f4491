//! Transport-agnostic bridge to a physical (or fake) OBD adapter. Mirrors
//! the shape of the original's abstract interface: a handful of required
//! hooks plus defaulted ones most adapters don't need to override.

use crate::error::CoreResult;

pub trait Adapter: Send {
    /// Program the adapter's baud divisor ahead of a byte exchange.
    fn set_baud_divisor(&mut self, divisor: u16) -> CoreResult<()>;

    /// Non-blocking poll: `Some(byte)` if one is available without stalling.
    fn check_input(&mut self) -> CoreResult<Option<u8>>;

    /// Send one byte on the wire.
    fn send_byte(&mut self, byte: u8) -> CoreResult<()>;

    /// Whether a slow-init sequence is about to be bit-banged, so the
    /// adapter can park any automatic initialization it would otherwise do.
    fn slow_init_imminent(&mut self) -> CoreResult<()>;

    /// ISO 9141-2 5-baud slow init with an explicit target address.
    /// Adapters that do this in firmware override it; bit-banging ones fall
    /// through to `send_slow_init_bitwise`.
    fn send_slow_init(&mut self, address: u8) -> CoreResult<()> {
        self.send_slow_init_bitwise(address)
    }

    /// Serial line parameters changed (baud rate or format); most adapters
    /// that own their own UART need to hear about this explicitly.
    fn set_serial(&mut self, _baud: u32) -> CoreResult<()> {
        Ok(())
    }

    /// Bit-bang a 5-baud slow init, one bit at a time, when the adapter has
    /// no firmware support for it.
    fn send_slow_init_bitwise(&mut self, _address: u8) -> CoreResult<()> {
        Ok(())
    }

    /// Drive the K-line/L-line directly (Mitsubishi diag-pin fast init).
    fn set_l(&mut self, _level: bool) -> CoreResult<()> {
        Ok(())
    }

    /// Select CAN personality on composite adapters; a no-op elsewhere.
    fn set_can(&mut self, _enabled: bool) -> CoreResult<()> {
        Ok(())
    }

    /// Sampled RX pin level, for adapters that expose bit-level readback.
    fn get_rx_state(&mut self) -> CoreResult<bool> {
        Ok(true)
    }

    /// Put the RX pin into bit-bang sampling mode rather than byte framing.
    fn set_rx_bitbang(&mut self, _enabled: bool) -> CoreResult<()> {
        Ok(())
    }
}

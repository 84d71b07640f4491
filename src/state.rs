//! Uniform state serialization.
//!
//! Every mutable component implements `StateIo::save`/`StateIo::load` against
//! a single `StateWriter`/`StateReader` pair, mirroring the original's
//! `STATE_RW`/`STATE_RWBUF`/`STATE_RWSTRING` macros: one call site per field,
//! same order on save and load, no format negotiation.

use std::io::{self, Read, Write};

/// Sink for a save operation. Implemented for any `Write`.
pub struct StateWriter<'a> {
    out: &'a mut dyn Write,
}

impl<'a> StateWriter<'a> {
    pub fn new(out: &'a mut dyn Write) -> Self {
        StateWriter { out }
    }

    pub fn u8(&mut self, v: u8) -> io::Result<()> {
        self.out.write_all(&[v])
    }

    pub fn bool(&mut self, v: bool) -> io::Result<()> {
        self.u8(v as u8)
    }

    pub fn u16(&mut self, v: u16) -> io::Result<()> {
        self.out.write_all(&v.to_le_bytes())
    }

    pub fn i32(&mut self, v: i32) -> io::Result<()> {
        self.out.write_all(&v.to_le_bytes())
    }

    pub fn u32(&mut self, v: u32) -> io::Result<()> {
        self.out.write_all(&v.to_le_bytes())
    }

    pub fn u64(&mut self, v: u64) -> io::Result<()> {
        self.out.write_all(&v.to_le_bytes())
    }

    pub fn buf(&mut self, v: &[u8]) -> io::Result<()> {
        self.out.write_all(v)
    }

    /// Nul-terminated-line string: the bytes followed by `\n`, matching the
    /// original's line-oriented string fields in the state file.
    pub fn string(&mut self, v: &str) -> io::Result<()> {
        self.out.write_all(v.as_bytes())?;
        self.out.write_all(b"\n")
    }

    /// `Some` strings are written as their text; `None` is written as an
    /// empty line, matching the optional extended-ROM name field.
    pub fn opt_string(&mut self, v: &Option<String>) -> io::Result<()> {
        self.string(v.as_deref().unwrap_or(""))
    }
}

/// Source for a load operation. Implemented for any `Read`.
pub struct StateReader<'a> {
    inp: &'a mut dyn Read,
}

impl<'a> StateReader<'a> {
    pub fn new(inp: &'a mut dyn Read) -> Self {
        StateReader { inp }
    }

    pub fn u8(&mut self) -> io::Result<u8> {
        let mut b = [0u8; 1];
        self.inp.read_exact(&mut b)?;
        Ok(b[0])
    }

    pub fn bool(&mut self) -> io::Result<bool> {
        Ok(self.u8()? != 0)
    }

    pub fn u16(&mut self) -> io::Result<u16> {
        let mut b = [0u8; 2];
        self.inp.read_exact(&mut b)?;
        Ok(u16::from_le_bytes(b))
    }

    pub fn i32(&mut self) -> io::Result<i32> {
        let mut b = [0u8; 4];
        self.inp.read_exact(&mut b)?;
        Ok(i32::from_le_bytes(b))
    }

    pub fn u32(&mut self) -> io::Result<u32> {
        let mut b = [0u8; 4];
        self.inp.read_exact(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    pub fn u64(&mut self) -> io::Result<u64> {
        let mut b = [0u8; 8];
        self.inp.read_exact(&mut b)?;
        Ok(u64::from_le_bytes(b))
    }

    pub fn buf(&mut self, out: &mut [u8]) -> io::Result<()> {
        self.inp.read_exact(out)
    }

    pub fn string(&mut self) -> io::Result<String> {
        let mut s = Vec::new();
        let mut one = [0u8; 1];
        loop {
            self.inp.read_exact(&mut one)?;
            if one[0] == b'\n' {
                break;
            }
            s.push(one[0]);
        }
        Ok(String::from_utf8_lossy(&s).into_owned())
    }

    pub fn opt_string(&mut self) -> io::Result<Option<String>> {
        let s = self.string()?;
        Ok(if s.is_empty() { None } else { Some(s) })
    }
}

/// A component that participates in the fixed-order state blob.
pub trait StateIo {
    fn save(&self, w: &mut StateWriter) -> io::Result<()>;
    fn load(&mut self, r: &mut StateReader) -> io::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_scalars_and_strings() {
        let mut buf = Vec::new();
        {
            let mut w = StateWriter::new(&mut buf);
            w.u64(0xDEAD_BEEF_0000_1234).unwrap();
            w.u16(0xABCD).unwrap();
            w.bool(true).unwrap();
            w.string("rom.bin").unwrap();
            w.opt_string(&None).unwrap();
        }
        let mut cursor = buf.as_slice();
        let mut r = StateReader::new(&mut cursor);
        assert_eq!(r.u64().unwrap(), 0xDEAD_BEEF_0000_1234);
        assert_eq!(r.u16().unwrap(), 0xABCD);
        assert!(r.bool().unwrap());
        assert_eq!(r.string().unwrap(), "rom.bin");
        assert_eq!(r.opt_string().unwrap(), None);
    }

    #[test]
    fn round_trips_buffers() {
        let data = [1u8, 2, 3, 4, 5];
        let mut buf = Vec::new();
        StateWriter::new(&mut buf).buf(&data).unwrap();
        let mut out = [0u8; 5];
        let mut cursor = buf.as_slice();
        StateReader::new(&mut cursor).buf(&mut out).unwrap();
        assert_eq!(out, data);
    }
}

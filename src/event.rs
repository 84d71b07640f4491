//! Deterministic event record/replay layer.
//!
//! Every non-deterministic input the interpreter observes — keypresses,
//! serial RX bytes, sampled RX bits, status snapshots, EEPROM bit reads —
//! passes through here. While recording, observations are appended with the
//! current cycle count. While replaying, an observation only returns a
//! value if the next logged record matches both the requested kind and the
//! current cycle exactly; otherwise callers get "no event" and fall back to
//! their own default (e.g. host input is simply ignored during replay).

use crate::error::{CoreError, CoreResult};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Whether `path`'s extension names it as a zlib-compressed event log
/// container, per the optional `.gz` variant this build's event logs accept.
fn is_gz_path(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("gz")
}

/// A recording sink, plain or gzip-compressed depending on the log path's
/// extension.
enum EventWriter {
    Plain(BufWriter<File>),
    Gz(GzEncoder<File>),
}

impl EventWriter {
    fn open(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(if is_gz_path(path) {
            EventWriter::Gz(GzEncoder::new(file, Compression::default()))
        } else {
            EventWriter::Plain(BufWriter::new(file))
        })
    }

    fn finish(self) {
        match self {
            EventWriter::Plain(mut w) => {
                let _ = w.flush();
            }
            EventWriter::Gz(w) => {
                if let Err(e) = w.finish() {
                    log::warn!("failed to close compressed event log: {e}");
                }
            }
        }
    }
}

impl Write for EventWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            EventWriter::Plain(w) => w.write(buf),
            EventWriter::Gz(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            EventWriter::Plain(w) => w.flush(),
            EventWriter::Gz(w) => w.flush(),
        }
    }
}

/// A replay source, plain or gzip-compressed to match `EventWriter`.
enum EventReader {
    Plain(BufReader<File>),
    Gz(BufReader<GzDecoder<File>>),
}

impl EventReader {
    fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(if is_gz_path(path) {
            EventReader::Gz(BufReader::new(GzDecoder::new(file)))
        } else {
            EventReader::Plain(BufReader::new(file))
        })
    }
}

impl Read for EventReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            EventReader::Plain(r) => r.read(buf),
            EventReader::Gz(r) => r.read(buf),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Invalid,
    KeyDown,
    KeyUp,
    SerialRx,
    SerialRxBit,
    SerialStat,
    EepromRead,
}

impl EventKind {
    fn to_u32(self) -> u32 {
        match self {
            EventKind::Invalid => 0,
            EventKind::KeyDown => 1,
            EventKind::KeyUp => 2,
            EventKind::SerialRx => 3,
            EventKind::SerialRxBit => 4,
            EventKind::SerialStat => 5,
            EventKind::EepromRead => 6,
        }
    }

    fn from_u32(v: u32) -> EventKind {
        match v {
            1 => EventKind::KeyDown,
            2 => EventKind::KeyUp,
            3 => EventKind::SerialRx,
            4 => EventKind::SerialRxBit,
            5 => EventKind::SerialStat,
            6 => EventKind::EepromRead,
            _ => EventKind::Invalid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub cycles: u64,
    pub kind: EventKind,
    pub value: i32,
}

impl Event {
    pub const NONE: Event = Event {
        cycles: 0,
        kind: EventKind::Invalid,
        value: 0,
    };

    fn write(&self, w: &mut dyn Write) -> io::Result<()> {
        w.write_all(&self.cycles.to_le_bytes())?;
        w.write_all(&self.kind.to_u32().to_le_bytes())?;
        w.write_all(&self.value.to_le_bytes())
    }

    fn read(r: &mut dyn Read) -> io::Result<Option<Event>> {
        let mut cbuf = [0u8; 8];
        match r.read_exact(&mut cbuf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        let mut kbuf = [0u8; 4];
        r.read_exact(&mut kbuf)?;
        let mut vbuf = [0u8; 4];
        r.read_exact(&mut vbuf)?;
        Ok(Some(Event {
            cycles: u64::from_le_bytes(cbuf),
            kind: EventKind::from_u32(u32::from_le_bytes(kbuf)),
            value: i32::from_le_bytes(vbuf),
        }))
    }
}

enum Mode {
    Idle,
    Recording(EventWriter),
    Replaying {
        reader: EventReader,
        current: Event,
        exhausted: bool,
    },
}

/// Owns either an append sink or a replay cursor, never both, per the
/// module's lifecycle invariant.
pub struct EventLog {
    mode: Mode,
}

impl Default for EventLog {
    fn default() -> Self {
        EventLog { mode: Mode::Idle }
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.mode, Mode::Recording(_))
    }

    pub fn is_replaying(&self) -> bool {
        matches!(self.mode, Mode::Replaying { .. })
    }

    pub fn enable_recording(&mut self, path: &Path) -> CoreResult<()> {
        self.mode = Mode::Recording(EventWriter::open(path)?);
        log::info!("recording events to {}", path.display());
        Ok(())
    }

    pub fn disable_recording(&mut self) {
        if let Mode::Idle = self.mode {
            return;
        }
        if let Mode::Recording(w) = std::mem::replace(&mut self.mode, Mode::Idle) {
            w.finish();
        }
    }

    pub fn enable_replaying(&mut self, path: &Path) -> CoreResult<()> {
        self.mode = Mode::Replaying {
            reader: EventReader::open(path)?,
            current: Event::NONE,
            exhausted: false,
        };
        log::info!("replaying events from {}", path.display());
        Ok(())
    }

    pub fn stop_replaying(&mut self) {
        self.mode = Mode::Idle;
    }

    /// Append an observation to the log. No-op unless currently recording.
    pub fn record(&mut self, cycles: u64, kind: EventKind, value: i32) {
        if let Mode::Recording(w) = &mut self.mode {
            let ev = Event { cycles, kind, value };
            if let Err(e) = ev.write(w) {
                log::warn!("failed to append event record: {e}");
            }
        }
    }

    /// Consult the replay cursor. Returns `Some(value)` only if the next
    /// logged record matches `kind` exactly at `cycles`; otherwise refills
    /// the cursor as needed and returns `None`.
    pub fn retrieve(&mut self, cycles: u64, kind: EventKind) -> Option<i32> {
        let (reader, current, exhausted) = match &mut self.mode {
            Mode::Replaying {
                reader,
                current,
                exhausted,
            } => (reader, current, exhausted),
            _ => return None,
        };

        if current.kind == EventKind::Invalid && !*exhausted {
            match Event::read(reader) {
                Ok(Some(ev)) => *current = ev,
                Ok(None) => *exhausted = true,
                Err(e) => {
                    log::warn!("event log read failed: {e}");
                    *exhausted = true;
                }
            }
        }

        if current.kind == kind && current.cycles == cycles {
            let value = current.value;
            *current = Event::NONE;
            Some(value)
        } else {
            None
        }
    }

    /// Like `retrieve`, but a missing expected event is treated as fatal —
    /// used where the interpreter cannot proceed without a value (e.g. an
    /// EEPROM bit read during replay).
    pub fn retrieve_required(&mut self, cycles: u64, kind: EventKind) -> CoreResult<i32> {
        self.retrieve(cycles, kind).ok_or_else(|| {
            self.stop_replaying();
            CoreError::StateMismatch {
                rom_name: format!("expected {kind:?} event at cycle {cycles}, log exhausted"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn record_then_replay_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.log");

        let mut log = EventLog::new();
        log.enable_recording(&path).unwrap();
        log.record(10, EventKind::KeyDown, 0x41);
        log.record(25, EventKind::SerialRx, 0xFF);
        log.disable_recording();

        let mut replay = EventLog::new();
        replay.enable_replaying(&path).unwrap();
        assert_eq!(replay.retrieve(10, EventKind::KeyDown), Some(0x41));
        assert_eq!(replay.retrieve(20, EventKind::SerialRx), None);
        assert_eq!(replay.retrieve(25, EventKind::SerialRx), Some(0xFF));
    }

    #[test]
    fn mismatched_kind_returns_none_without_consuming() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.log");

        let mut log = EventLog::new();
        log.enable_recording(&path).unwrap();
        log.record(5, EventKind::KeyUp, 1);
        log.disable_recording();

        let mut replay = EventLog::new();
        replay.enable_replaying(&path).unwrap();
        assert_eq!(replay.retrieve(5, EventKind::KeyDown), None);
        assert_eq!(replay.retrieve(5, EventKind::KeyUp), Some(1));
    }

    #[test]
    fn gz_extension_round_trips_through_compression() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.log.gz");

        let mut log = EventLog::new();
        log.enable_recording(&path).unwrap();
        log.record(10, EventKind::KeyDown, 0x41);
        log.record(25, EventKind::SerialRx, 0xFF);
        log.disable_recording();

        let mut replay = EventLog::new();
        replay.enable_replaying(&path).unwrap();
        assert_eq!(replay.retrieve(10, EventKind::KeyDown), Some(0x41));
        assert_eq!(replay.retrieve(25, EventKind::SerialRx), Some(0xFF));
    }
}

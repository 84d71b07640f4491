//! Interpreter thread: owns the `Cpu` and the live adapter, drains a
//! command queue from the host frontend, and publishes status snapshots
//! back — the same `spawn_*`/crossbeam idiom the host stack already uses
//! to connect its player thread to its UI thread.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Receiver, Sender};

use crate::cpu::Cpu;
use crate::state::{StateIo, StateReader, StateWriter};

/// Host -> interpreter commands. A superset of `CpuCommand`: this carries
/// the payloads (paths, key codes) the bare enum leaves to the caller.
#[derive(Debug, Clone)]
pub enum EmuCmd {
    Exit,
    Reset,
    FactoryReset,
    SetRate(f64),
    SaveState(PathBuf),
    LoadState(PathBuf),
    StartRecording(PathBuf),
    StartReplay(PathBuf),
    StopRecPlay,
    KeyDown(u16),
    KeyUp(u16),
}

/// Interpreter -> host status, polled once per idle tick.
#[derive(Debug, Clone, Default)]
pub struct EmuStatus {
    pub pc: u16,
    pub cycles: u64,
    pub halted: bool,
    pub beeper: bool,
    pub backlight: bool,
    pub eeprom_active: bool,
    pub lcd_dirty: bool,
    pub error: Option<String>,
}

/// State-times run per scheduling slice, between one command/sync check
/// and the next.
const RUN_SLICE: u64 = 16_384;
const IDLE_TICK: Duration = Duration::from_millis(15);

pub fn spawn_emulator(cpu: Cpu) -> (Sender<EmuCmd>, Receiver<EmuStatus>) {
    let (cmd_tx, cmd_rx) = bounded::<EmuCmd>(64);
    let (status_tx, status_rx) = bounded::<EmuStatus>(16);

    thread::Builder::new()
        .name("scanmu-interp".into())
        .spawn(move || emulator_loop(cpu, cmd_rx, status_tx))
        .expect("failed to spawn interpreter thread");

    (cmd_tx, status_rx)
}

fn emulator_loop(mut cpu: Cpu, cmd_rx: Receiver<EmuCmd>, status_tx: Sender<EmuStatus>) {
    let ticker = tick(IDLE_TICK);
    let mut last_error: Option<String> = None;

    'outer: loop {
        select! {
            recv(cmd_rx) -> msg => match msg {
                Ok(EmuCmd::Exit) | Err(_) => break 'outer,
                Ok(cmd) => handle_cmd(cmd, &mut cpu, &mut last_error),
            },
            recv(ticker) -> _ => {
                if !cpu.halted {
                    if let Err(e) = cpu.run_for(RUN_SLICE) {
                        log::error!("interpreter fault: {e}");
                        last_error = Some(e.to_string());
                        cpu.reset();
                    }
                }
                let lcd_dirty = cpu.lcd.is_dirty();
                let status = EmuStatus {
                    pc: cpu.pc,
                    cycles: cpu.cycles,
                    halted: cpu.halted,
                    beeper: cpu.hints.beeper,
                    backlight: cpu.hints.backlight,
                    eeprom_active: cpu.hints.eeprom_active,
                    lcd_dirty,
                    error: last_error.take(),
                };
                let _ = status_tx.try_send(status);
            }
        }
        // Drain any further commands queued up while this tick ran, so the
        // frontend never waits a full idle tick behind a burst of input.
        while let Ok(cmd) = cmd_rx.try_recv() {
            match cmd {
                EmuCmd::Exit => break 'outer,
                cmd => handle_cmd(cmd, &mut cpu, &mut last_error),
            }
        }
    }
}

fn handle_cmd(cmd: EmuCmd, cpu: &mut Cpu, last_error: &mut Option<String>) {
    match cmd {
        EmuCmd::Exit => {}
        EmuCmd::Reset => cpu.reset(),
        EmuCmd::FactoryReset => cpu.factory_reset(),
        EmuCmd::SetRate(factor) => cpu.slowdown = factor,
        EmuCmd::SaveState(path) => {
            if let Err(e) = save_state(cpu, &path) {
                log::warn!("save state failed: {e}");
                *last_error = Some(e.to_string());
            } else {
                log::info!("state saved to {}", path.display());
            }
        }
        EmuCmd::LoadState(path) => {
            if let Err(e) = load_state(cpu, &path) {
                log::warn!("load state failed: {e}");
                *last_error = Some(e.to_string());
            } else {
                log::info!("state loaded from {}", path.display());
            }
        }
        EmuCmd::StartRecording(path) => {
            if let Err(e) = cpu.events.enable_recording(&path) {
                *last_error = Some(e.to_string());
            }
        }
        EmuCmd::StartReplay(path) => {
            if let Err(e) = cpu.events.enable_replaying(&path) {
                *last_error = Some(e.to_string());
            }
        }
        EmuCmd::StopRecPlay => {
            cpu.events.disable_recording();
            cpu.events.stop_replaying();
        }
        EmuCmd::KeyDown(code) => {
            let _ = cpu.keypad.key_down(cpu.cycles, &mut cpu.events, code);
        }
        EmuCmd::KeyUp(code) => {
            let _ = cpu.keypad.key_up(cpu.cycles, &mut cpu.events, code);
        }
    }
}

fn save_state(cpu: &Cpu, path: &std::path::Path) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    let mut w = StateWriter::new(&mut file);
    cpu.save(&mut w)
}

fn load_state(cpu: &mut Cpu, path: &std::path::Path) -> std::io::Result<()> {
    let mut file = std::fs::File::open(path)?;
    let mut r = StateReader::new(&mut file);
    cpu.load(&mut r)
}

//! Commands the host side can post to the interpreter's drain queue. Only
//! acted on at the 131072-state-time event-pump epoch (see `Cpu::pump_events`).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuCommand {
    Exit,
    ToggleEcho,
    Rate(i32),
    Save,
    Load,
    Reset,
    FactoryReset,
    Record,
    Play,
    StopRecPlay,
    LoadRom,
}

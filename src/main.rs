use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use scanmu::config::Config;
use scanmu::cpu::Cpu;
use scanmu::emulator::{spawn_emulator, EmuCmd};
use scanmu::serial::adapters::{Elm327, FakeAdapter, KPlusCan, KlTty, KlUsbChip};
use scanmu::serial::Adapter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

struct Options {
    rom_path: Option<PathBuf>,
    ext_rom_path: Option<PathBuf>,
    adapter_device: Option<PathBuf>,
    adapter_kind: String,
    record_path: Option<PathBuf>,
    replay_path: Option<PathBuf>,
    cycle_limit: Option<u64>,
    slowdown: f64,
    expect_echo: bool,
    rx_sampling: bool,
    debug_flags: Vec<String>,
    debug_trigger: Option<u16>,
    watchpoint: Option<(u16, u16)>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            rom_path: None,
            ext_rom_path: None,
            adapter_device: None,
            adapter_kind: "fake".to_string(),
            record_path: None,
            replay_path: None,
            cycle_limit: None,
            slowdown: 1.0,
            expect_echo: false,
            rx_sampling: false,
            debug_flags: Vec::new(),
            debug_trigger: None,
            watchpoint: None,
        }
    }
}

fn print_usage() {
    println!("scanmu {VERSION} — 8xC196 handheld scanner emulator core");
    println!();
    println!("USAGE:");
    println!("    scanmu [OPTIONS] <ROM>");
    println!();
    println!("OPTIONS:");
    println!("    -d <flag[,flag]>   debug toggles");
    println!("    -t <pc>            debug trigger address (hex, e.g. c012)");
    println!("    -w <lo,hi>         watchpoint range (hex addresses)");
    println!("    -s <tty>           adapter device path");
    println!("    -m <cycles>        cycle limit before automatic exit");
    println!("    -r <path>          start recording events to <path>");
    println!("    -p <path>          start replaying events from <path>");
    println!("    -i <kind>          adapter: elm, kl, ftdi, kcan, fake (default: fake)");
    println!("    -e                 expect the bus to echo transmitted bytes");
    println!("    -x <path>          extended ROM image");
    println!("    -v <factor>        slowdown factor (1.0 = real time)");
    println!("    -S                 enable RX-pin bit sampling");
    println!("    -h, --help         print this message");
    println!("    --version          print the version");
}

fn parse_hex_u16(s: &str) -> Option<u16> {
    u16::from_str_radix(s.trim_start_matches("0x"), 16).ok()
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut opts = Options::default();
    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        macro_rules! next_val {
            () => {{
                i += 1;
                args.get(i).ok_or_else(|| format!("{arg} requires a value"))?
            }};
        }
        match arg {
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" => {
                println!("scanmu {VERSION}");
                std::process::exit(0);
            }
            "-d" => {
                opts.debug_flags = next_val!().split(',').map(|s| s.to_string()).collect();
            }
            "-t" => {
                let v = next_val!();
                opts.debug_trigger = Some(parse_hex_u16(v).ok_or_else(|| format!("bad -t value '{v}'"))?);
            }
            "-w" => {
                let v = next_val!();
                let (lo, hi) = v
                    .split_once(',')
                    .ok_or_else(|| "-w expects lo,hi".to_string())?;
                let lo = parse_hex_u16(lo).ok_or_else(|| format!("bad -w lo '{lo}'"))?;
                let hi = parse_hex_u16(hi).ok_or_else(|| format!("bad -w hi '{hi}'"))?;
                opts.watchpoint = Some((lo, hi));
            }
            "-s" => opts.adapter_device = Some(PathBuf::from(next_val!())),
            "-m" => {
                let v = next_val!();
                opts.cycle_limit = Some(v.parse().map_err(|_| format!("bad -m value '{v}'"))?);
            }
            "-r" => opts.record_path = Some(PathBuf::from(next_val!())),
            "-p" => opts.replay_path = Some(PathBuf::from(next_val!())),
            "-i" => opts.adapter_kind = next_val!().to_string(),
            "-e" => opts.expect_echo = true,
            "-x" => opts.ext_rom_path = Some(PathBuf::from(next_val!())),
            "-v" => {
                let v = next_val!();
                opts.slowdown = v.parse().map_err(|_| format!("bad -v value '{v}'"))?;
            }
            "-S" => opts.rx_sampling = true,
            other if !other.starts_with('-') => {
                if opts.rom_path.is_some() {
                    return Err(format!("unexpected extra argument '{other}'"));
                }
                opts.rom_path = Some(PathBuf::from(other));
            }
            other => return Err(format!("unrecognized option '{other}'")),
        }
        i += 1;
    }
    Ok(opts)
}

/// Load a ROM image, classifying it as HiScan or CarmanScan by scanning
/// for the ASCII tag the original build distinguishes ROM families with.
fn load_rom(path: &Path) -> std::io::Result<(Vec<u8>, &'static str)> {
    let bytes = std::fs::read(path)?;
    let variant = if bytes.windows(6).any(|w| w == b"CARMAN") {
        "CarmanScan"
    } else {
        "HiScan"
    };
    Ok((bytes, variant))
}

fn build_adapter(opts: &Options) -> Result<Box<dyn Adapter>, String> {
    match opts.adapter_kind.as_str() {
        "fake" => Ok(Box::new(FakeAdapter::new())),
        "kl" => {
            let dev = opts
                .adapter_device
                .as_ref()
                .ok_or("-i kl requires -s <tty>")?;
            KlTty::open(dev)
                .map(|a| Box::new(a) as Box<dyn Adapter>)
                .map_err(|e| e.to_string())
        }
        "ftdi" => {
            let dev = opts
                .adapter_device
                .as_ref()
                .ok_or("-i ftdi requires -s <tty>")?;
            KlUsbChip::open(dev)
                .map(|a| Box::new(a) as Box<dyn Adapter>)
                .map_err(|e| e.to_string())
        }
        "elm" => {
            let dev = opts
                .adapter_device
                .as_ref()
                .ok_or("-i elm requires -s <tty>")?;
            Elm327::open(dev)
                .map(|a| Box::new(a) as Box<dyn Adapter>)
                .map_err(|e| e.to_string())
        }
        "kcan" => {
            let dev = opts
                .adapter_device
                .as_ref()
                .ok_or("-i kcan requires -s <tty>")?;
            let kl = KlTty::open(dev).map_err(|e| e.to_string())?;
            let can = KlTty::open(dev).map_err(|e| e.to_string())?;
            Ok(Box::new(KPlusCan::new(kl, can)))
        }
        other => Err(format!("unknown adapter kind '{other}'")),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| writeln!(buf, "[scanmu] {}: {}", record.level(), record.args()))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let opts = match parse_args(&args) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("[scanmu] {e}");
            print_usage();
            std::process::exit(2);
        }
    };

    let Some(rom_path) = opts.rom_path.clone() else {
        eprintln!("[scanmu] no ROM image given");
        print_usage();
        std::process::exit(2);
    };

    let mut config = Config::load();
    config.remember_rom_dir(&rom_path);

    let (rom_bytes, variant) = match load_rom(&rom_path) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("[scanmu] cannot read ROM '{}': {e}", rom_path.display());
            std::process::exit(1);
        }
    };
    log::info!(
        "loaded {} ({} bytes, {variant})",
        rom_path.display(),
        rom_bytes.len()
    );

    let mut cpu = Cpu::new();
    let rom_name = rom_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| rom_path.to_string_lossy().into_owned());
    cpu.load_rom(&rom_name, rom_bytes);

    if let Some(ext_path) = &opts.ext_rom_path {
        match std::fs::read(ext_path) {
            Ok(bytes) => cpu.memory.load_ext_rom(bytes),
            Err(e) => eprintln!(
                "[scanmu] cannot read extended ROM '{}': {e}",
                ext_path.display()
            ),
        }
    }

    let eep_path = rom_path.with_extension("eep");
    cpu.eeprom.set_filename(&eep_path);

    cpu.serial.set_expect_echo(opts.expect_echo);
    cpu.slowdown = opts.slowdown;
    match build_adapter(&opts) {
        Ok(adapter) => cpu.serial.attach(adapter),
        Err(e) => eprintln!("[scanmu] adapter setup failed ({e}), running without one"),
    }

    if let Some(path) = &opts.record_path {
        if let Err(e) = cpu.events.enable_recording(path) {
            eprintln!("[scanmu] cannot start recording: {e}");
        }
    } else if let Some(path) = &opts.replay_path {
        if let Err(e) = cpu.events.enable_replaying(path) {
            eprintln!("[scanmu] cannot start replaying: {e}");
        }
    }

    if !opts.debug_flags.is_empty() {
        log::debug!("debug flags: {:?}", opts.debug_flags);
    }
    if let Some(pc) = opts.debug_trigger {
        log::debug!("debug trigger armed at pc={pc:#06x}");
    }
    if let Some((lo, hi)) = opts.watchpoint {
        log::debug!("watchpoint armed for [{lo:#06x}, {hi:#06x}]");
    }
    if opts.rx_sampling {
        log::debug!("RX-pin bit sampling enabled");
    }

    let (cmd_tx, status_rx) = spawn_emulator(cpu);

    let signal_rx = install_sigint_handler();
    let mut halted = false;
    loop {
        if signal_rx
            .as_ref()
            .map(|rx| rx.try_recv().is_ok())
            .unwrap_or(false)
        {
            let _ = cmd_tx.send(EmuCmd::Exit);
            break;
        }
        match status_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(status) => {
                if let Some(limit) = opts.cycle_limit {
                    if status.cycles >= limit {
                        log::info!("cycle limit {limit} reached, exiting");
                        let _ = cmd_tx.send(EmuCmd::Exit);
                        break;
                    }
                }
                if let Some(err) = status.error {
                    log::error!("{err}");
                }
                if status.halted && !halted {
                    halted = true;
                    log::info!("machine halted at pc={:#06x}", status.pc);
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    config.save();
}

/// A minimal SIGINT -> channel bridge so Ctrl-C stops the interpreter
/// thread cleanly (flushing any in-progress recording) instead of killing
/// the process mid-write.
#[cfg(unix)]
fn install_sigint_handler() -> Option<crossbeam_channel::Receiver<()>> {
    use std::sync::atomic::{AtomicBool, Ordering};

    static FLAG: AtomicBool = AtomicBool::new(false);
    extern "C" fn handler(_: libc::c_int) {
        FLAG.store(true, Ordering::SeqCst);
    }
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }
    let (tx, rx) = crossbeam_channel::bounded(1);
    std::thread::Builder::new()
        .name("scanmu-sigint-poll".into())
        .spawn(move || loop {
            if FLAG.load(Ordering::SeqCst) {
                let _ = tx.send(());
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        })
        .ok();
    Some(rx)
}

#[cfg(not(unix))]
fn install_sigint_handler() -> Option<crossbeam_channel::Receiver<()>> {
    None
}

// Persistent configuration: last ROM directory, default adapter choice,
// baud policy, debug flags, last watchpoint.
// Stored as JSON in <config_dir>/scanmu/config.json

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Config {
    /// Last directory a ROM image was loaded from.
    pub last_rom_dir: Option<String>,
    /// Default adapter kind for `-i` when not given on the command line.
    pub default_adapter: String,
    /// Baud divisor arbitration policy: "auto", "autoplus", or "force".
    pub baud_policy: String,
    /// Last debug flags passed via `-d`, comma-joined.
    pub debug_flags: String,
    /// Last watchpoint range set via `-w`, as "lo,hi" hex or empty.
    pub last_watchpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            last_rom_dir: None,
            default_adapter: "fake".to_string(),
            baud_policy: "auto".to_string(),
            debug_flags: String::new(),
            last_watchpoint: None,
        }
    }
}

impl Config {
    /// Path to the config file.
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|d| d.join("config.json"))
    }

    /// Load config from disk, or return defaults if not found / invalid.
    pub fn load() -> Self {
        let path = match Self::config_path() {
            Some(p) => p,
            None => return Self::default(),
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse_json(&content),
            Err(e) => {
                eprintln!("[scanmu] cannot read config: {e}");
                Self::default()
            }
        }
    }

    /// Save config to disk.
    pub fn save(&self) {
        let path = match Self::config_path() {
            Some(p) => p,
            None => return,
        };

        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let json = self.to_json();
        if let Err(e) = std::fs::write(&path, json) {
            eprintln!("[scanmu] cannot save config: {e}");
        }
    }

    /// Parse config from a JSON string. Unknown fields are ignored,
    /// missing fields get defaults.
    fn parse_json(s: &str) -> Self {
        let mut config = Self::default();

        // Simple manual JSON parsing; no serde dependency for a config
        // this small.
        for line in s.lines() {
            let line = line.trim().trim_end_matches(',');
            if let Some(rest) = line.strip_prefix("\"last_rom_dir\"") {
                let val = rest.trim().trim_start_matches(':').trim();
                if val != "null" {
                    config.last_rom_dir = strip_json_string(val);
                }
            } else if let Some(rest) = line.strip_prefix("\"default_adapter\"") {
                let val = rest.trim().trim_start_matches(':').trim();
                if let Some(s) = strip_json_string(val) {
                    config.default_adapter = s;
                }
            } else if let Some(rest) = line.strip_prefix("\"baud_policy\"") {
                let val = rest.trim().trim_start_matches(':').trim();
                if let Some(s) = strip_json_string(val) {
                    config.baud_policy = s;
                }
            } else if let Some(rest) = line.strip_prefix("\"debug_flags\"") {
                let val = rest.trim().trim_start_matches(':').trim();
                if let Some(s) = strip_json_string(val) {
                    config.debug_flags = s;
                }
            } else if let Some(rest) = line.strip_prefix("\"last_watchpoint\"") {
                let val = rest.trim().trim_start_matches(':').trim();
                if val != "null" {
                    config.last_watchpoint = strip_json_string(val);
                }
            }
        }

        config
    }

    /// Serialize config to a JSON string.
    fn to_json(&self) -> String {
        let fmt_opt = |v: &Option<String>| -> String {
            match v {
                Some(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
                None => "null".to_string(),
            }
        };
        format!(
            concat!(
                "{{\n",
                "  \"last_rom_dir\": {},\n",
                "  \"default_adapter\": \"{}\",\n",
                "  \"baud_policy\": \"{}\",\n",
                "  \"debug_flags\": \"{}\",\n",
                "  \"last_watchpoint\": {}\n",
                "}}\n",
            ),
            fmt_opt(&self.last_rom_dir),
            self.default_adapter,
            self.baud_policy,
            self.debug_flags,
            fmt_opt(&self.last_watchpoint),
        )
    }

    /// Remember the directory a ROM was loaded from.
    pub fn remember_rom_dir(&mut self, path: &Path) {
        if let Some(parent) = path.parent() {
            self.last_rom_dir = Some(parent.to_string_lossy().into_owned());
            self.save();
        }
    }
}

/// Strip surrounding quotes from a JSON string value and unescape.
fn strip_json_string(val: &str) -> Option<String> {
    if val.starts_with('"') && val.ends_with('"') && val.len() >= 2 {
        Some(
            val[1..val.len() - 1]
                .replace("\\\\", "\x00")
                .replace("\\\"", "\"")
                .replace('\x00', "\\"),
        )
    } else {
        None
    }
}

/// Get the application config directory.
fn config_dir() -> Option<PathBuf> {
    // macOS:   ~/Library/Application Support/scanmu/
    // Linux:   ~/.config/scanmu/
    // Windows: %APPDATA%/scanmu/

    #[cfg(target_os = "macos")]
    {
        let home = std::env::var("HOME").ok()?;
        Some(
            PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("scanmu"),
        )
    }

    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA").ok()?;
        Some(PathBuf::from(appdata).join("scanmu"))
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        let home = std::env::var("HOME").ok()?;
        Some(PathBuf::from(home).join(".config").join("scanmu"))
    }
}

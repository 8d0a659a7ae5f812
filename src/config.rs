use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use cross_xdg::BaseDirs;

use crate::error::ConfigError;
use crate::machine::{DEFAULT_MAX_STEPS, EofPolicy, ExecConfig};
use crate::scheduler::Speed;
use crate::tape::DEFAULT_TAPE_SIZE;
use crate::{debug, warn};

/// Default pacing delay between ticks.
pub const DEFAULT_SPEED_MS: u64 = 50;

/// Everything a run can be configured with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub max_steps: usize,
    pub eof: EofPolicy,
    /// Delay between paced ticks; 0 means instant.
    pub speed_ms: u64,
    pub instant: bool,
    pub tape_size: usize,
    pub coalesce: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            eof: EofPolicy::Zero,
            speed_ms: DEFAULT_SPEED_MS,
            instant: false,
            tape_size: DEFAULT_TAPE_SIZE,
            coalesce: true,
        }
    }
}

impl Settings {
    /// Defaults, then the config file (if any), then the environment.
    pub fn load() -> Result<Settings, ConfigError> {
        let mut settings = Settings::default();
        if let Some(path) = config_path() {
            match fs::read_to_string(&path) {
                Ok(content) => {
                    debug!("loading config from {}", path.display());
                    settings.apply_toml(&content, &path.display().to_string())?;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(ConfigError::Io {
                        path: path.display().to_string(),
                        source,
                    });
                }
            }
        }
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn exec_config(&self) -> ExecConfig {
        ExecConfig {
            max_steps: self.max_steps.max(1),
            eof: self.eof,
            coalesce: self.coalesce,
        }
    }

    pub fn speed(&self) -> Speed {
        Speed::from_millis(self.speed_ms, self.instant)
    }

    /// Apply the `[vm]` table of a `bfvm.toml` file.
    ///
    /// Only a flat `key = value` subset of TOML is understood; other tables
    /// are skipped.
    pub fn apply_toml(&mut self, content: &str, origin: &str) -> Result<(), ConfigError> {
        let mut in_vm = false;
        let mut map: HashMap<String, String> = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                in_vm = line[1..line.len() - 1].trim() == "vm";
                continue;
            }
            if !in_vm {
                continue;
            }
            if let Some(eq) = line.find('=') {
                let key = line[..eq].trim().to_string();
                map.insert(key, unquote(&line[eq + 1..]));
            }
        }

        for (key, value) in &map {
            self.apply(key, value, origin)?;
        }
        Ok(())
    }

    /// Apply `BFVM_*` overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        const VARS: [(&str, &str); 5] = [
            ("BFVM_MAX_STEPS", "max_steps"),
            ("BFVM_EOF", "eof"),
            ("BFVM_SPEED_MS", "speed_ms"),
            ("BFVM_TAPE_SIZE", "tape_size"),
            ("BFVM_INSTANT", "instant"),
        ];
        for (var, key) in VARS {
            if let Some(value) = lookup(var) {
                self.apply(key, &value, var)?;
            }
        }
        Ok(())
    }

    fn apply(&mut self, key: &str, value: &str, origin: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            origin: origin.to_string(),
            reason: reason.to_string(),
        };

        match key {
            "max_steps" => {
                let n: usize = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid("expected a positive integer"))?;
                self.max_steps = n.max(1);
            }
            "eof" => {
                self.eof = EofPolicy::parse_lenient(value);
                if self.eof == EofPolicy::Unchanged && !value.trim().eq_ignore_ascii_case("unchanged") {
                    warn!("{origin}: unknown eof policy '{value}', leaving cells unchanged on EOF");
                }
            }
            "speed_ms" => {
                self.speed_ms = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid("expected a delay in milliseconds"))?;
            }
            "instant" => {
                self.instant = parse_bool(value).ok_or_else(|| invalid("expected true or false"))?;
            }
            "tape_size" => {
                let n: usize = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid("expected a cell count"))?;
                if n == 0 {
                    return Err(invalid("tape needs at least one cell"));
                }
                self.tape_size = n;
            }
            "coalesce" => {
                self.coalesce = parse_bool(value).ok_or_else(|| invalid("expected true or false"))?;
            }
            other => {
                warn!("{origin}: ignoring unknown setting '{other}'");
            }
        }
        Ok(())
    }
}

/// `BFVM_CONFIG` if set, otherwise `bfvm.toml` in the XDG config home.
pub fn config_path() -> Option<PathBuf> {
    if let Some(explicit) = std::env::var_os("BFVM_CONFIG") {
        return Some(PathBuf::from(explicit));
    }

    // On Linux: resolves to /home/<user>/.config
    // On Windows: resolves to C:\Users\<user>\.config
    // On macOS: resolves to /Users/<user>/.config
    let base_dirs = BaseDirs::new().ok()?;
    let mut path = PathBuf::from(base_dirs.config_home());
    path.push("bfvm.toml");
    Some(path)
}

fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    // Accept quoted or unquoted
    if raw.len() >= 2 && raw.starts_with('"') {
        if let Some(end) = raw[1..].find('"') {
            return raw[1..end + 1].to_string();
        }
    }
    // Drop a trailing comment on unquoted values
    match raw.find('#') {
        Some(i) => raw[..i].trim().to_string(),
        None => raw.to_string(),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

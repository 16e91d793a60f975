//! Configuration Vault – reads/writes `~/.chassisd/config.toml`.

use chassis_runtime::{ChassisConfig, TelemetryConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Shape of the simulated chassis the daemon drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub slots: u8,
    /// Slot this board reports as its own.
    pub local_slot: u8,
    pub psus: u8,
    pub fans: u8,
    pub temperature_sensors: u8,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            slots: 2,
            local_slot: 0,
            psus: 2,
            fans: 4,
            temperature_sensors: 3,
        }
    }
}

/// Persisted daemon configuration stored in `~/.chassisd/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chassis: ChassisConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub sim: SimConfig,
}

/// Return the path to `~/.chassisd/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".chassisd").join("config.toml")
}

/// Load the config at `path`.  Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    cfg.chassis
        .validate()
        .map_err(|e| format!("Invalid config at {}: {}", path.display(), e))?;
    Ok(Some(cfg))
}

/// Apply `CHASSISD_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `CHASSISD_TICK_PERIOD_SECS` | `chassis.tick_period_secs` |
/// | `CHASSISD_COMMAND_TIMEOUT_SECS` | `chassis.command_timeout_secs` |
/// | `CHASSISD_SLOTS` | `sim.slots` |
/// | `CHASSISD_LOCAL_SLOT` | `sim.local_slot` |
/// | `CHASSISD_OTLP_ENDPOINT` | `telemetry.otlp_endpoint` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Some(v) = env_number("CHASSISD_TICK_PERIOD_SECS") {
        cfg.chassis.tick_period_secs = v;
    }
    if let Some(v) = env_number("CHASSISD_COMMAND_TIMEOUT_SECS") {
        cfg.chassis.command_timeout_secs = v;
    }
    if let Some(v) = env_number("CHASSISD_SLOTS") {
        cfg.sim.slots = v;
    }
    if let Some(v) = env_number("CHASSISD_LOCAL_SLOT") {
        cfg.sim.local_slot = v;
    }
    if let Ok(v) = std::env::var("CHASSISD_OTLP_ENDPOINT") {
        cfg.telemetry.otlp_endpoint = Some(v);
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

/// Save the config to `path`, creating the parent directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

//! Native accessors the channel handlers call out to.
//!
//! Each collaborator sits behind a narrow trait so handlers never touch the
//! OS directly and tests can substitute fixed values.

use crate::error::BridgeError;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub trait BatteryInfo: Send + Sync {
    /// Charge percentage, or `None` when the level cannot be determined.
    fn battery_level(&self) -> Result<Option<u8>, BridgeError>;
}

pub trait PlatformInfo: Send + Sync {
    fn device_description(&self) -> Result<String, BridgeError>;
}

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

pub trait RandomSource: Send + Sync {
    /// Uniform integer in `0..bound`.
    fn next_below(&self, bound: u32) -> u32;
}

/// Bundle of collaborators shared by the channel handlers.
#[derive(Clone)]
pub struct Collaborators {
    pub battery: Arc<dyn BatteryInfo>,
    pub platform: Arc<dyn PlatformInfo>,
    pub clock: Arc<dyn Clock>,
    pub random: Arc<dyn RandomSource>,
}

impl Collaborators {
    pub fn system(power_supply_path: impl Into<PathBuf>) -> Self {
        Self {
            battery: Arc::new(SysfsBattery::new(power_supply_path)),
            platform: Arc::new(HostPlatformInfo::new()),
            clock: Arc::new(SystemClock),
            random: Arc::new(ThreadRandom),
        }
    }
}

// ============ Battery ============

/// Reads the Linux power-supply class, e.g. `/sys/class/power_supply/BAT0/capacity`.
pub struct SysfsBattery {
    root: PathBuf,
}

impl SysfsBattery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn find_battery(&self) -> Result<Option<PathBuf>, BridgeError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut supplies: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_battery(path))
            .collect();
        supplies.sort();
        Ok(supplies.into_iter().next())
    }
}

fn is_battery(path: &Path) -> bool {
    fs::read_to_string(path.join("type"))
        .map(|kind| kind.trim() == "Battery")
        .unwrap_or(false)
}

impl BatteryInfo for SysfsBattery {
    fn battery_level(&self) -> Result<Option<u8>, BridgeError> {
        let Some(battery) = self.find_battery()? else {
            tracing::debug!("No battery found under {}", self.root.display());
            return Ok(None);
        };

        let raw = match fs::read_to_string(battery.join("capacity")) {
            Ok(raw) => raw,
            // Some drivers expose the supply before the capacity is known
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let level: u8 = raw.trim().parse().map_err(|e| {
            BridgeError::Platform(format!("Unreadable battery capacity {:?}: {}", raw.trim(), e))
        })?;
        Ok(Some(level.min(100)))
    }
}

// ============ Platform info ============

pub struct HostPlatformInfo {
    os_release: PathBuf,
    hostname: PathBuf,
}

impl HostPlatformInfo {
    pub fn new() -> Self {
        Self {
            os_release: PathBuf::from("/etc/os-release"),
            hostname: PathBuf::from("/etc/hostname"),
        }
    }

    fn host_name(&self) -> String {
        fs::read_to_string(&self.hostname)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

impl Default for HostPlatformInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformInfo for HostPlatformInfo {
    fn device_description(&self) -> Result<String, BridgeError> {
        let (name, version) = match fs::read_to_string(&self.os_release) {
            Ok(contents) => parse_os_release(&contents),
            Err(_) => (crate::config::default_platform_name(), None),
        };

        Ok(describe_device(
            &name,
            version.as_deref(),
            std::env::consts::ARCH,
            &self.host_name(),
        ))
    }
}

/// Extract `NAME` and `VERSION_ID` from an os-release file.
fn parse_os_release(contents: &str) -> (String, Option<String>) {
    let mut name = None;
    let mut version = None;

    for line in contents.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').to_string();
        match key.trim() {
            "NAME" => name = Some(value),
            "VERSION_ID" => version = Some(value),
            _ => {}
        }
    }

    (
        name.unwrap_or_else(crate::config::default_platform_name),
        version,
    )
}

fn describe_device(os: &str, version: Option<&str>, arch: &str, host: &str) -> String {
    match version {
        Some(version) => format!("{} {} ({}), Device: {}", os, version, arch, host),
        None => format!("{} ({}), Device: {}", os, arch, host),
    }
}

// ============ Clock and randomness ============

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_below(&self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..bound)
    }
}

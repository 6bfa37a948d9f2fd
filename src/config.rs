use crate::error::BridgeError;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_NAMESPACE: &str = "com.example.native_bridge";
pub const DEFAULT_EVENT_INTERVAL_MS: u64 = 3000;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub port: u16,
    /// Label the native side reports itself as, e.g. in echo replies.
    pub platform_name: String,
    pub channel_namespace: String,
    pub event_interval: Duration,
    /// Consecutive failed deliveries before a subscription is dropped. 0 disables.
    pub max_sink_failures: u32,
    pub event_buffer: usize,
    pub power_supply_path: PathBuf,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            platform_name: default_platform_name(),
            channel_namespace: DEFAULT_NAMESPACE.to_string(),
            event_interval: Duration::from_millis(DEFAULT_EVENT_INTERVAL_MS),
            max_sink_failures: 3,
            event_buffer: 16,
            power_supply_path: PathBuf::from("/sys/class/power_supply"),
        }
    }
}

impl BridgeConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self, BridgeError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, BridgeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = parse_or(&lookup, "PORT", defaults.port)?;
        let interval_ms = parse_or(&lookup, "EVENT_INTERVAL_MS", DEFAULT_EVENT_INTERVAL_MS)?;
        if interval_ms == 0 {
            return Err(BridgeError::Config(
                "EVENT_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }
        let max_sink_failures = parse_or(&lookup, "MAX_SINK_FAILURES", defaults.max_sink_failures)?;
        let event_buffer = parse_or(&lookup, "EVENT_BUFFER", defaults.event_buffer)?;
        if event_buffer == 0 {
            return Err(BridgeError::Config(
                "EVENT_BUFFER must be greater than zero".to_string(),
            ));
        }

        let channel_namespace = lookup("CHANNEL_NAMESPACE")
            .map(|ns| ns.trim().trim_end_matches('/').to_string())
            .filter(|ns| !ns.is_empty())
            .unwrap_or(defaults.channel_namespace);

        Ok(Self {
            port,
            platform_name: lookup("PLATFORM_NAME")
                .filter(|name| !name.trim().is_empty())
                .unwrap_or(defaults.platform_name),
            channel_namespace,
            event_interval: Duration::from_millis(interval_ms),
            max_sink_failures,
            event_buffer,
            power_supply_path: lookup("POWER_SUPPLY_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.power_supply_path),
        })
    }

    pub fn method_channel(&self) -> String {
        format!("{}/methods", self.channel_namespace)
    }

    pub fn event_channel(&self) -> String {
        format!("{}/events", self.channel_namespace)
    }

    pub fn message_channel(&self) -> String {
        format!("{}/basic_messages", self.channel_namespace)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, BridgeError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| BridgeError::Config(format!("{}={:?}: {}", key, raw, e))),
    }
}

pub fn default_platform_name() -> String {
    match std::env::consts::OS {
        "linux" => "Linux".to_string(),
        "macos" => "macOS".to_string(),
        "windows" => "Windows".to_string(),
        "android" => "Android".to_string(),
        "ios" => "iOS".to_string(),
        other => other.to_string(),
    }
}

//! Process configuration read from the environment at startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Default location of the mounted SKU capability listing
pub const DEFAULT_CAPABILITY_TABLE_PATH: &str = "/etc/admission/skus.json";
/// Default per-request admission deadline
pub const DEFAULT_ADMISSION_TIMEOUT_SECS: u64 = 8;
/// Default webhook server port
pub const DEFAULT_WEBHOOK_PORT: u16 = 9443;
/// Default health server port
pub const DEFAULT_HEALTH_PORT: u16 = 8080;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionConfig {
    pub capability_table_path: PathBuf,
    pub admission_timeout: Duration,
    pub webhook_port: u16,
    pub health_port: u16,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            capability_table_path: PathBuf::from(DEFAULT_CAPABILITY_TABLE_PATH),
            admission_timeout: Duration::from_secs(DEFAULT_ADMISSION_TIMEOUT_SECS),
            webhook_port: DEFAULT_WEBHOOK_PORT,
            health_port: DEFAULT_HEALTH_PORT,
        }
    }
}

impl AdmissionConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`; unset or unparsable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let capability_table_path = lookup("CAPABILITY_TABLE_PATH")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.capability_table_path);

        let timeout_secs = parse_or(
            &lookup,
            "ADMISSION_TIMEOUT_SECS",
            DEFAULT_ADMISSION_TIMEOUT_SECS,
        );
        let admission_timeout = if timeout_secs == 0 {
            warn!("ADMISSION_TIMEOUT_SECS must be positive, using default");
            defaults.admission_timeout
        } else {
            Duration::from_secs(timeout_secs)
        };

        Self {
            capability_table_path,
            admission_timeout,
            webhook_port: parse_or(&lookup, "WEBHOOK_PORT", DEFAULT_WEBHOOK_PORT),
            health_port: parse_or(&lookup, "HEALTH_PORT", DEFAULT_HEALTH_PORT),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key = key, value = %raw, default = %default, "Invalid value, using default");
            default
        }),
    }
}

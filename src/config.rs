// Configuration - environment driven
//
// Values come from the process environment, optionally seeded from a
// `.env` file. Every setting has a default except the API key.

use std::env;
use std::path::PathBuf;
use tracing::warn;

pub const DEFAULT_DB_PATH: &str = "atm_reports.db";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-pro-latest";
pub const DEFAULT_DISCOVERY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_STATIC_DIR: &str = "frontend/dist";

/// Generation service settings
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            api_key: None,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            timeout_secs: DEFAULT_DISCOVERY_TIMEOUT_SECS,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub port: u16,
    pub static_dir: PathBuf,
    pub discovery: DiscoveryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            port: DEFAULT_PORT,
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl Config {
    /// Load `.env` (if present) and read the environment
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Config::default();

        Config {
            db_path: get("ATM_DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
            port: parse_or("PORT", get("PORT"), defaults.port),
            static_dir: get("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
            discovery: DiscoveryConfig {
                api_key: get("GEMINI_API_KEY"),
                base_url: get("GEMINI_BASE_URL").unwrap_or(defaults.discovery.base_url),
                model: get("GEMINI_MODEL").unwrap_or(defaults.discovery.model),
                timeout_secs: parse_or(
                    "DISCOVERY_TIMEOUT_SECS",
                    get("DISCOVERY_TIMEOUT_SECS"),
                    defaults.discovery.timeout_secs,
                ),
            },
        }
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    match raw {
        None => default,
        Some(value) => value.parse().unwrap_or_else(|_| {
            warn!(key, value = %value, fallback = %default, "invalid setting, using default");
            default
        }),
    }
}

//! Pipeline configuration

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Pipeline configuration loaded from environment variables
///
/// Resolved once at startup; CLI flags override individual fields.
#[derive(Debug, Clone)]
pub struct Config {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub csv_delimiter: u8,
    pub remote_base_url: String,
    pub remote_api_token: Option<String>,
    pub remote_timeout: Duration,
    pub remote_max_attempts: u32,
    pub rate_limit_rps: u32,
    pub rng_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("data/template"),
            output_dir: PathBuf::from("data/generated"),
            csv_delimiter: b',',
            remote_base_url: "http://localhost:8055".into(),
            remote_api_token: None,
            remote_timeout: Duration::from_secs(10),
            remote_max_attempts: 3,
            rate_limit_rps: 20,
            rng_seed: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    ///
    /// Unset or unparseable values fall back to the defaults.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            source_dir: var("SOURCE_DIR").map_or(defaults.source_dir, PathBuf::from),
            output_dir: var("OUTPUT_DIR").map_or(defaults.output_dir, PathBuf::from),
            csv_delimiter: var("CSV_DELIMITER")
                .and_then(|v| parse_delimiter(&v))
                .unwrap_or(defaults.csv_delimiter),
            remote_base_url: var("REMOTE_BASE_URL").unwrap_or(defaults.remote_base_url),
            remote_api_token: var("REMOTE_API_TOKEN").filter(|t| !t.trim().is_empty()),
            remote_timeout: parse_var(&var, "REMOTE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.remote_timeout),
            remote_max_attempts: parse_var(&var, "REMOTE_MAX_ATTEMPTS")
                .unwrap_or(defaults.remote_max_attempts),
            rate_limit_rps: parse_var(&var, "REMOTE_RATE_LIMIT_RPS")
                .unwrap_or(defaults.rate_limit_rps),
            rng_seed: parse_var(&var, "RNG_SEED"),
        }
    }
}

fn parse_var<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    var(key).and_then(|v| v.trim().parse().ok())
}

/// Accept a single-byte delimiter, spelling out tab as `\t` or `tab`
pub fn parse_delimiter(value: &str) -> Option<u8> {
    match value {
        "\\t" | "tab" | "\t" => Some(b'\t'),
        v if v.len() == 1 && v.is_ascii() => v.bytes().next(),
        _ => None,
    }
}

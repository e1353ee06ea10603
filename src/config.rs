//! Env-driven configuration for the pipeline and the `relayctl` binary.
//!
//! Values are read from the process environment; `dotenv` is loaded on demand
//! by the binary. Defaults are provided for convenience during development.
use std::env;
use std::time::Duration;

use dotenv;

use crate::credentials::mask_token;

pub const DEFAULT_SECRET_HEADER: &str = "mj-api-secret";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-image";

#[derive(Clone)]
pub struct Config {
    pub relay_base_url: Option<String>,
    pub relay_token: Option<String>,
    pub relay_mode: String,
    pub relay_secret_header: String,
    pub relay_enabled: bool,
    pub gemini_base_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_enabled: bool,
    pub data_dir: String,
    pub timeouts: Timeouts,
}

/// Per-operation bounds on outbound HTTP calls.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub submit: Duration,
    pub poll: Duration,
    pub download: Duration,
    pub generate: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            submit: Duration::from_secs(30),
            poll: Duration::from_secs(10),
            download: Duration::from_secs(30),
            generate: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn dotenv_load() {
        dotenv::dotenv().ok();
    }

    pub fn new() -> Result<Self, env::VarError> {
        let defaults = Timeouts::default();
        Ok(Config {
            relay_base_url: non_empty_var("RELAY_BASE_URL"),
            relay_token: non_empty_var("RELAY_TOKEN"),
            relay_mode: env::var("RELAY_MODE").unwrap_or_else(|_| "photo".to_string()),
            relay_secret_header: env::var("RELAY_SECRET_HEADER")
                .unwrap_or_else(|_| DEFAULT_SECRET_HEADER.to_string()),
            relay_enabled: flag_var("RELAY_ENABLED", true),
            gemini_base_url: env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.to_string()),
            gemini_api_key: non_empty_var("GEMINI_API_KEY"),
            gemini_model: env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_enabled: flag_var("GEMINI_ENABLED", true),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            timeouts: Timeouts {
                submit: secs_var("SUBMIT_TIMEOUT_SECS", defaults.submit),
                poll: secs_var("POLL_TIMEOUT_SECS", defaults.poll),
                download: secs_var("DOWNLOAD_TIMEOUT_SECS", defaults.download),
                generate: secs_var("GENERATE_TIMEOUT_SECS", defaults.generate),
            },
        })
    }

    /// Log the effective configuration. Tokens only ever appear masked.
    pub fn log_summary(&self) {
        tracing::info!(
            relay_base_url = self.relay_base_url.as_deref().unwrap_or("<unset>"),
            relay_token = %self.relay_token.as_deref().map(mask_token).unwrap_or_else(|| "<unset>".into()),
            relay_mode = %self.relay_mode,
            relay_enabled = self.relay_enabled,
            gemini_base_url = %self.gemini_base_url,
            gemini_api_key = %self.gemini_api_key.as_deref().map(mask_token).unwrap_or_else(|| "<unset>".into()),
            gemini_model = %self.gemini_model,
            gemini_enabled = self.gemini_enabled,
            data_dir = %self.data_dir,
            "configuration loaded"
        );
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn flag_var(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => parse_flag(&v).unwrap_or_else(|| {
            tracing::warn!("Invalid {} '{}', falling back to {}", key, v, default);
            default
        }),
        Err(_) => default,
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn secs_var(key: &str, default: Duration) -> Duration {
    match env::var(key) {
        Ok(v) => match v.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                tracing::warn!("Invalid {} '{}', falling back to {}s", key, v, default.as_secs());
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_common_spellings() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn default_timeouts_stay_bounded() {
        let t = Timeouts::default();
        for d in [t.submit, t.poll, t.download, t.generate] {
            assert!(d >= Duration::from_secs(5) && d <= Duration::from_secs(30));
        }
    }
}

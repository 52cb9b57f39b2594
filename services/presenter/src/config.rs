//! Application Configuration Module
//!
//! Loads the presenter's settings from environment variables (and a `.env`
//! file when present) into one struct that is passed to the runtime.

use pitch_core::api::DEFAULT_BASE_URL;
use pitch_core::navigation::LockPolicy;
use secrecy::SecretString;
use std::collections::BTreeSet;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_VOICE_ID: &str = "b49kxxWbYzfNv7AZOp3g";
pub const DEFAULT_STORE_PATH: &str = ".pitch-store.json";

/// Holds all configuration loaded from the environment.
#[derive(Debug)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub lock_policy: LockPolicy,
    pub auto_unlock: bool,
    pub capture_on_lock: bool,
    pub elevenlabs_api_key: Option<SecretString>,
    pub elevenlabs_voice_id: String,
    pub store_path: PathBuf,
    pub input_device: Option<String>,
    pub log_level: Level,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("{var} must be true or false, got {value:?}")]
    InvalidBool { var: &'static str, value: String },
    #[error("Invalid LOCK_POLICY {0:?}: use final, even, none or a comma separated slide list")]
    InvalidLockPolicy(String),
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `API_BASE_URL`: Backend base URL. Defaults to `http://localhost:5001/api`.
    // *   `REQUEST_TIMEOUT_SECS`: Timeout for every backend and speech request. Defaults to 30.
    // *   `LOCK_POLICY`: `final`, `even`, `none` or a list like `2,4,6`. Defaults to `final`.
    // *   `AUTO_UNLOCK`: Lift the lock once both questions are answered. Defaults to false.
    // *   `CAPTURE_ON_LOCK`: Stop the recording at the lock and send the audio along. Defaults to false.
    // *   `ELEVENLABS_API_KEY`: (Optional) Enables spoken questions.
    // *   `ELEVENLABS_VOICE_ID`: (Optional) Voice for spoken questions.
    // *   `STORE_PATH`: Where session ids and feedback are kept. Defaults to `.pitch-store.json`.
    // *   `INPUT_DEVICE`: (Optional) Microphone name. Defaults to the system default.
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. This is useful for local development and is ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_base_url = lookup("API_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let request_timeout = match lookup("REQUEST_TIMEOUT_SECS") {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidNumber {
                        var: "REQUEST_TIMEOUT_SECS",
                        value,
                    });
                }
            },
            None => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        };

        let lock_policy = match lookup("LOCK_POLICY") {
            Some(value) => parse_lock_policy(&value)?,
            None => LockPolicy::default(),
        };

        let auto_unlock = parse_bool("AUTO_UNLOCK", lookup("AUTO_UNLOCK"))?;
        let capture_on_lock = parse_bool("CAPTURE_ON_LOCK", lookup("CAPTURE_ON_LOCK"))?;

        let elevenlabs_api_key = lookup("ELEVENLABS_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from);
        let elevenlabs_voice_id =
            lookup("ELEVENLABS_VOICE_ID").unwrap_or_else(|| DEFAULT_VOICE_ID.to_string());

        let store_path = lookup("STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH));
        let input_device = lookup("INPUT_DEVICE").filter(|name| !name.trim().is_empty());

        // Configure logging level from RUST_LOG, with a sensible default.
        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            api_base_url,
            request_timeout,
            lock_policy,
            auto_unlock,
            capture_on_lock,
            elevenlabs_api_key,
            elevenlabs_voice_id,
            store_path,
            input_device,
            log_level,
        })
    }
}

fn parse_bool(var: &'static str, value: Option<String>) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(false);
    };
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidBool { var, value }),
    }
}

pub fn parse_lock_policy(value: &str) -> Result<LockPolicy, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "final" | "last" => Ok(LockPolicy::FinalSlide),
        "even" | "every-second" => Ok(LockPolicy::EverySecondSlide),
        "none" | "off" => Ok(LockPolicy::None),
        list => {
            let slides = list
                .split(',')
                .map(|s| s.trim().parse::<u32>())
                .collect::<Result<BTreeSet<u32>, _>>()
                .map_err(|_| ConfigError::InvalidLockPolicy(value.to_string()))?;
            if slides.is_empty() || slides.contains(&0) {
                return Err(ConfigError::InvalidLockPolicy(value.to_string()));
            }
            Ok(LockPolicy::Slides(slides))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.api_base_url, "http://localhost:5001/api");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.lock_policy, LockPolicy::FinalSlide);
        assert!(!config.auto_unlock);
        assert!(!config.capture_on_lock);
        assert!(config.elevenlabs_api_key.is_none());
        assert_eq!(config.elevenlabs_voice_id, DEFAULT_VOICE_ID);
        assert_eq!(config.store_path, PathBuf::from(DEFAULT_STORE_PATH));
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("API_BASE_URL", "https://pitch.example.com/api"),
            ("REQUEST_TIMEOUT_SECS", "5"),
            ("LOCK_POLICY", "even"),
            ("AUTO_UNLOCK", "true"),
            ("CAPTURE_ON_LOCK", "1"),
            ("ELEVENLABS_API_KEY", "xi-secret"),
            ("INPUT_DEVICE", "USB Mic"),
            ("RUST_LOG", "debug"),
        ])
        .unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.lock_policy, LockPolicy::EverySecondSlide);
        assert!(config.auto_unlock);
        assert!(config.capture_on_lock);
        assert_eq!(
            config.elevenlabs_api_key.unwrap().expose_secret(),
            "xi-secret"
        );
        assert_eq!(config.input_device.as_deref(), Some("USB Mic"));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn test_slide_list_policy() {
        assert_eq!(
            parse_lock_policy("2, 4,6").unwrap(),
            LockPolicy::Slides(BTreeSet::from([2, 4, 6]))
        );
        assert!(parse_lock_policy("2,x").is_err());
        assert!(parse_lock_policy("0").is_err());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            config_from(&[("REQUEST_TIMEOUT_SECS", "0")]),
            Err(ConfigError::InvalidNumber { .. })
        ));
        assert!(matches!(
            config_from(&[("AUTO_UNLOCK", "maybe")]),
            Err(ConfigError::InvalidBool { .. })
        ));
        assert!(matches!(
            config_from(&[("RUST_LOG", "loud")]),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_blank_api_key_means_no_voice() {
        let config = config_from(&[("ELEVENLABS_API_KEY", "  ")]).unwrap();
        assert!(config.elevenlabs_api_key.is_none());
    }
}

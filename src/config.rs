use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use crate::directory::ClientChannelDirectory;
use crate::error::ConfigError;

const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const DEFAULT_TICKET_PREFIX: &str = "ticket-";
const DEFAULT_TICKETS_CHANNEL: &str = "#🎟️tickets";
const DEFAULT_STORE_FILE: &str = "known_polls.json";
const DEFAULT_CLASSIFIER_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub groq_api_key: String,
    pub groq_model: String,
    pub groq_api_url: String,
    pub bot_name: String,
    /// Channel names starting with this prefix are ticket channels.
    pub ticket_prefix: String,
    /// Reference shown when pointing users at the ticket channel.
    pub tickets_channel: String,
    pub store_path: PathBuf,
    pub classifier_timeout: Duration,
    pub directory: ClientChannelDirectory,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Ok(Self::from_lookup(|key| env::var(key).ok())?)
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::MissingEnvVar(key))
        };
        let optional = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let discord_token = required("DISCORD_TOKEN")?;
        let groq_api_key = required("GROQ_API_KEY")?;

        let timeout_raw = optional(
            "CLASSIFIER_TIMEOUT_SECS",
            &DEFAULT_CLASSIFIER_TIMEOUT_SECS.to_string(),
        );
        let timeout_secs: u64 = timeout_raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                key: "CLASSIFIER_TIMEOUT_SECS",
                message: format!("'{timeout_raw}': {e}"),
            })?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CLASSIFIER_TIMEOUT_SECS",
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Config {
            discord_token,
            groq_api_key,
            groq_model: optional("GROQ_MODEL", DEFAULT_MODEL),
            groq_api_url: optional("GROQ_API_URL", DEFAULT_API_URL),
            bot_name: optional("BOT_NAME", "smh").to_lowercase(),
            ticket_prefix: optional("TICKET_CHANNEL_PREFIX", DEFAULT_TICKET_PREFIX),
            tickets_channel: optional("TICKETS_CHANNEL", DEFAULT_TICKETS_CHANNEL),
            store_path: PathBuf::from(optional("KNOWN_POLLS_FILE", DEFAULT_STORE_FILE)),
            classifier_timeout: Duration::from_secs(timeout_secs),
            directory: ClientChannelDirectory::smh_defaults(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn requires_discord_token() {
        let err = Config::from_lookup(lookup_from(&[("GROQ_API_KEY", "k")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar("DISCORD_TOKEN")));
        assert_eq!(err.to_string(), "DISCORD_TOKEN environment variable not set");
    }

    #[test]
    fn empty_api_key_counts_as_missing() {
        let err = Config::from_lookup(lookup_from(&[
            ("DISCORD_TOKEN", "t"),
            ("GROQ_API_KEY", "  "),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar("GROQ_API_KEY")));
    }

    #[test]
    fn applies_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("DISCORD_TOKEN", "t"),
            ("GROQ_API_KEY", "k"),
        ]))
        .unwrap();
        assert_eq!(config.ticket_prefix, "ticket-");
        assert_eq!(config.store_path, PathBuf::from("known_polls.json"));
        assert_eq!(config.classifier_timeout, Duration::from_secs(10));
        assert_eq!(config.groq_model, DEFAULT_MODEL);
        assert_eq!(config.bot_name, "smh");
    }

    #[test]
    fn rejects_bad_timeout() {
        let err = Config::from_lookup(lookup_from(&[
            ("DISCORD_TOKEN", "t"),
            ("GROQ_API_KEY", "k"),
            ("CLASSIFIER_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "CLASSIFIER_TIMEOUT_SECS",
                ..
            }
        ));
    }
}

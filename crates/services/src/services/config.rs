//! Runtime configuration, read from the process environment.

use std::{net::SocketAddr, time::Duration};

use secrecy::SecretString;
use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://backoffice.db";
pub const DEFAULT_LLM_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_LLM_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_EMAIL_API_URL: &str = "https://api.brevo.com/v3/smtp/email";
pub const DEFAULT_WHATSAPP_API_URL: &str = "https://graph.facebook.com/v21.0";
const DEFAULT_DEDUP_INTERVAL_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
    #[error("{name} is set but {missing} is missing")]
    Incomplete {
        name: &'static str,
        missing: &'static str,
    },
}

/// Identity printed on generated documents and used in chat prompts
#[derive(Debug, Clone)]
pub struct SchoolProfile {
    pub name: String,
    pub address: Option<String>,
    pub siret: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Default for SchoolProfile {
    fn default() -> Self {
        Self {
            name: "Centre de formation".to_string(),
            address: None,
            siret: None,
            email: None,
            phone: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_url: String,
    pub api_key: SecretString,
    pub sender_email: String,
    pub sender_name: String,
}

#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub api_url: String,
    pub phone_number_id: String,
    pub access_token: SecretString,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub environment: String,
    pub sentry_dsn: Option<String>,
    pub school: SchoolProfile,
    pub llm: Option<LlmConfig>,
    pub email: Option<EmailConfig>,
    pub whatsapp: Option<WhatsAppConfig>,
    /// `None` disables the background deduplication job
    pub planning_dedup_interval: Option<Duration>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any key/value source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bind_raw = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse().map_err(|_| ConfigError::Invalid {
            name: "BIND_ADDR",
            value: bind_raw.clone(),
        })?;

        let school = SchoolProfile {
            name: get("SCHOOL_NAME").unwrap_or_else(|| SchoolProfile::default().name),
            address: get("SCHOOL_ADDRESS"),
            siret: get("SCHOOL_SIRET"),
            email: get("SCHOOL_EMAIL"),
            phone: get("SCHOOL_PHONE"),
        };

        let llm = match get("ANTHROPIC_API_KEY") {
            Some(key) => {
                let max_tokens = match get("LLM_MAX_TOKENS") {
                    Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                        name: "LLM_MAX_TOKENS",
                        value: raw,
                    })?,
                    None => 2048,
                };
                Some(LlmConfig {
                    api_key: SecretString::from(key),
                    endpoint: get("LLM_ENDPOINT").unwrap_or_else(|| DEFAULT_LLM_ENDPOINT.to_string()),
                    model: get("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
                    max_tokens,
                })
            }
            None => None,
        };

        let email = match get("EMAIL_API_KEY") {
            Some(key) => {
                let sender_email = get("EMAIL_SENDER").ok_or(ConfigError::Incomplete {
                    name: "EMAIL_API_KEY",
                    missing: "EMAIL_SENDER",
                })?;
                Some(EmailConfig {
                    api_url: get("EMAIL_API_URL").unwrap_or_else(|| DEFAULT_EMAIL_API_URL.to_string()),
                    api_key: SecretString::from(key),
                    sender_name: get("EMAIL_SENDER_NAME").unwrap_or_else(|| school.name.clone()),
                    sender_email,
                })
            }
            None => None,
        };

        let whatsapp = match get("WHATSAPP_ACCESS_TOKEN") {
            Some(token) => {
                let phone_number_id =
                    get("WHATSAPP_PHONE_NUMBER_ID").ok_or(ConfigError::Incomplete {
                        name: "WHATSAPP_ACCESS_TOKEN",
                        missing: "WHATSAPP_PHONE_NUMBER_ID",
                    })?;
                Some(WhatsAppConfig {
                    api_url: get("WHATSAPP_API_URL")
                        .unwrap_or_else(|| DEFAULT_WHATSAPP_API_URL.to_string()),
                    phone_number_id,
                    access_token: SecretString::from(token),
                })
            }
            None => None,
        };

        let dedup_secs = match get("PLANNING_DEDUP_INTERVAL_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|_| ConfigError::Invalid {
                name: "PLANNING_DEDUP_INTERVAL_SECS",
                value: raw,
            })?,
            None => DEFAULT_DEDUP_INTERVAL_SECS,
        };

        Ok(Self {
            bind_addr,
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            environment: get("APP_ENV").unwrap_or_else(|| "development".to_string()),
            sentry_dsn: get("SENTRY_DSN"),
            school,
            llm,
            email,
            whatsapp,
            planning_dedup_interval: (dedup_secs > 0).then(|| Duration::from_secs(dedup_secs)),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert!(config.llm.is_none());
        assert!(config.email.is_none());
        assert!(config.whatsapp.is_none());
        assert_eq!(
            config.planning_dedup_interval,
            Some(Duration::from_secs(DEFAULT_DEDUP_INTERVAL_SECS))
        );
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = config_from(&[("ANTHROPIC_API_KEY", "   "), ("SCHOOL_NAME", "")]).unwrap();
        assert!(config.llm.is_none());
        assert_eq!(config.school.name, SchoolProfile::default().name);
    }

    #[test]
    fn llm_and_channels_are_enabled_by_their_keys() {
        let config = config_from(&[
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("EMAIL_API_KEY", "mail-key"),
            ("EMAIL_SENDER", "contact@school.fr"),
            ("SCHOOL_NAME", "Académie Beauté"),
            ("PLANNING_DEDUP_INTERVAL_SECS", "0"),
        ])
        .unwrap();

        let llm = config.llm.unwrap();
        assert_eq!(llm.api_key.expose_secret(), "sk-test");
        assert_eq!(llm.model, DEFAULT_LLM_MODEL);
        let email = config.email.unwrap();
        assert_eq!(email.sender_name, "Académie Beauté");
        assert!(config.planning_dedup_interval.is_none());
    }

    #[test]
    fn incomplete_whatsapp_config_is_rejected() {
        let err = config_from(&[("WHATSAPP_ACCESS_TOKEN", "token")]).unwrap_err();
        assert!(matches!(err, ConfigError::Incomplete { .. }));
    }

    #[test]
    fn invalid_bind_addr_is_rejected() {
        let err = config_from(&[("BIND_ADDR", "not-an-addr")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "BIND_ADDR", .. }));
    }
}

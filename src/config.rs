//! Configuration, built from environment variables.
//!
//! Each subsystem has its own config struct with a `from_env()`
//! constructor. Required variables produce `ConfigError::MissingEnvVar`;
//! unparseable values produce `ConfigError::InvalidValue` instead of
//! being silently defaulted.

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub crm: CrmConfig,
    pub mail: MailConfig,
    pub assistant: AssistantConfig,
    pub http: HttpConfig,
    pub schedule: ScheduleConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            crm: CrmConfig::from_env()?,
            mail: MailConfig::from_env()?,
            assistant: AssistantConfig::from_env()?,
            http: HttpConfig::from_env()?,
            schedule: ScheduleConfig::from_env()?,
        })
    }
}

// ── CRM ─────────────────────────────────────────────────────────────

/// CRM API access configuration.
#[derive(Debug, Clone)]
pub struct CrmConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub refresh_token: SecretString,
    /// OAuth accounts host, e.g. `https://accounts.zoho.eu`.
    pub accounts_url: String,
    /// REST API base, e.g. `https://www.zohoapis.eu/crm/v2`.
    pub api_base: String,
    /// CRM module holding the lead records.
    pub module: String,
    /// Search criteria selecting the outreach segment.
    pub lead_criteria: String,
}

impl CrmConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            client_id: required("ZOHO_CLIENT_ID")?,
            client_secret: SecretString::from(required("ZOHO_CLIENT_SECRET")?),
            refresh_token: SecretString::from(required("ZOHO_REFRESH_TOKEN")?),
            accounts_url: with_default("CRM_ACCOUNTS_URL", "https://accounts.zoho.eu"),
            api_base: with_default("CRM_API_BASE", "https://www.zohoapis.eu/crm/v2"),
            module: with_default("CRM_MODULE", "Probenehmer"),
            lead_criteria: with_default("CRM_LEAD_CRITERIA", "(make_com_Status:starts_with:i)"),
        })
    }

    /// URL of the module search endpoint.
    pub fn search_url(&self) -> String {
        format!("{}/{}/search", self.api_base, self.module)
    }

    /// URL of a single record.
    pub fn record_url(&self, id: &str) -> String {
        format!("{}/{}/{}", self.api_base, self.module, id)
    }

    /// URL of the OAuth token endpoint.
    pub fn token_url(&self) -> String {
        format!("{}/oauth/v2/token", self.accounts_url)
    }
}

// ── Mail ────────────────────────────────────────────────────────────

/// IMAP/SMTP configuration.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    /// Address outbound mail is sent from.
    pub sender: String,
    /// Display name used in the From header.
    pub sender_name: String,
    /// Mailbox selected for inbound processing.
    pub mailbox: String,
    /// Subject filter applied to the unseen search.
    pub subject_filter: String,
}

impl MailConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            imap_host: required("IMAP_SERVER")?,
            imap_port: parsed_with_default("IMAP_PORT", 993)?,
            smtp_host: required("SMTP_SERVER")?,
            smtp_port: parsed_with_default("SMTP_PORT", 465)?,
            username: required("EMAIL_USERNAME")?,
            password: SecretString::from(required("EMAIL_PASSWORD")?),
            sender: required("SENDER_EMAIL")?,
            sender_name: with_default("SENDER_NAME", "Einkauf Erdbaron"),
            mailbox: with_default("IMAP_MAILBOX", "INBOX"),
            subject_filter: with_default("SUBJECT_FILTER", "Anfrage: Baugrundgutachten"),
        })
    }

    /// From header value: `Display Name <address>`.
    pub fn from_header(&self) -> String {
        format!("{} <{}>", self.sender_name, self.sender)
    }
}

// ── Assistant ───────────────────────────────────────────────────────

/// Conversational assistant configuration.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub api_key: SecretString,
    pub assistant_id: String,
    pub api_base: String,
    /// Interval between run status polls.
    pub poll_interval: Duration,
    /// Cap on total polling time for one run.
    pub poll_timeout: Duration,
}

impl AssistantConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: SecretString::from(required("OPENAI_API_KEY")?),
            assistant_id: required("ASSISTANT_ID")?,
            api_base: with_default("ASSISTANT_API_BASE", "https://api.openai.com/v1"),
            poll_interval: Duration::from_secs(parsed_with_default(
                "ASSISTANT_POLL_INTERVAL_SECS",
                2,
            )?),
            poll_timeout: Duration::from_secs(parsed_with_default(
                "ASSISTANT_POLL_TIMEOUT_SECS",
                120,
            )?),
        })
    }
}

// ── HTTP ────────────────────────────────────────────────────────────

/// Control-surface HTTP server configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub port: u16,
}

impl HttpConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            port: parsed_with_default("PORT", 5000)?,
        })
    }
}

// ── Schedule ────────────────────────────────────────────────────────

/// Background job scheduling knobs.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Cron expression (sec min hour dom mon dow) for the daily follow-up job.
    pub followup_cron: String,
    /// Inbound processing runs drawn per weekday.
    pub inbound_runs_per_day: u32,
    /// Earliest hour an inbound run may be scheduled at.
    pub inbound_base_hour: u32,
}

impl ScheduleConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            followup_cron: with_default("FOLLOWUP_CRON", "0 0 9 * * *"),
            inbound_runs_per_day: parsed_with_default("INBOUND_RUNS_PER_DAY", 3)?,
            inbound_base_hour: parsed_with_default("INBOUND_BASE_HOUR", 9)?,
        })
    }
}

// ── Env helpers ─────────────────────────────────────────────────────

fn required(key: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn with_default(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parsed_with_default<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.is_empty() => raw.parse().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{e}"),
        }),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crm_urls_are_composed_from_parts() {
        let config = CrmConfig {
            client_id: "id".into(),
            client_secret: SecretString::from("secret".to_string()),
            refresh_token: SecretString::from("refresh".to_string()),
            accounts_url: "https://accounts.zoho.eu".into(),
            api_base: "https://www.zohoapis.eu/crm/v2".into(),
            module: "Probenehmer".into(),
            lead_criteria: "(make_com_Status:starts_with:i)".into(),
        };
        assert_eq!(
            config.search_url(),
            "https://www.zohoapis.eu/crm/v2/Probenehmer/search"
        );
        assert_eq!(
            config.record_url("123"),
            "https://www.zohoapis.eu/crm/v2/Probenehmer/123"
        );
        assert_eq!(config.token_url(), "https://accounts.zoho.eu/oauth/v2/token");
    }

    #[test]
    fn from_header_includes_display_name() {
        let config = MailConfig {
            imap_host: "imap.test".into(),
            imap_port: 993,
            smtp_host: "smtp.test".into(),
            smtp_port: 465,
            username: "user".into(),
            password: SecretString::from("pw".to_string()),
            sender: "einkauf@example.com".into(),
            sender_name: "Einkauf Erdbaron".into(),
            mailbox: "INBOX".into(),
            subject_filter: "Anfrage: Baugrundgutachten".into(),
        };
        assert_eq!(
            config.from_header(),
            "Einkauf Erdbaron <einkauf@example.com>"
        );
    }
}

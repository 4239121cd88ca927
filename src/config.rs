//! Configuration types.
//!
//! All configuration is read from the environment exactly once, in
//! [`AppConfig::from_env`] at the process boundary. Inner stages receive
//! their settings as explicit values and never touch ambient state.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;

/// How the reconciler treats items the matcher could not price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicy {
    /// Keep unmatched items; pricing substitutes the documented 1.00 default.
    #[default]
    Lenient,
    /// Fail the message on the first unmatched item.
    Strict,
}

/// Mailbox configuration (IMAP inbound, SMTP outbound).
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

/// Text-understanding service configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI-compatible API base, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub api_key: SecretString,
    pub model: String,
}

/// Catalog source: a CSV file with at least the two named columns.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub path: PathBuf,
    pub name_column: String,
    pub price_column: String,
}

/// Full agent configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub email: EmailConfig,
    pub llm: LlmConfig,
    pub catalog: CatalogConfig,
    /// IMAP SUBJECT filter that marks a message as a purchase order.
    pub order_subject: String,
    /// Seconds between polling cycles.
    pub poll_interval_secs: u64,
    /// Where the rendered invoice is written before dispatch.
    pub invoice_output: PathBuf,
    pub match_policy: MatchPolicy,
}

impl AppConfig {
    /// Build configuration from environment variables.
    ///
    /// Required: `EMAIL_IMAP_HOST`, `EMAIL_USERNAME`, `EMAIL_PASSWORD`,
    /// `OPENAI_API_KEY`. Everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let imap_host = require_env("EMAIL_IMAP_HOST")?;
        let username = require_env("EMAIL_USERNAME")?;
        let password = SecretString::from(require_env("EMAIL_PASSWORD")?);
        let api_key = SecretString::from(require_env("OPENAI_API_KEY")?);

        let imap_port = parse_env("EMAIL_IMAP_PORT", 993)?;
        let smtp_host =
            std::env::var("EMAIL_SMTP_HOST").unwrap_or_else(|_| imap_host.replace("imap", "smtp"));
        let smtp_port = parse_env("EMAIL_SMTP_PORT", 587)?;
        let from_address = std::env::var("EMAIL_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        let base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());

        let catalog = CatalogConfig {
            path: std::env::var("CATALOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("products.csv")),
            name_column: std::env::var("CATALOG_NAME_COLUMN")
                .unwrap_or_else(|_| "Nombre".to_string()),
            price_column: std::env::var("CATALOG_PRICE_COLUMN")
                .unwrap_or_else(|_| "Costo".to_string()),
        };

        let order_subject =
            std::env::var("ORDER_SUBJECT").unwrap_or_else(|_| "orden de pedido".to_string());
        let poll_interval_secs = parse_env("POLL_INTERVAL_SECS", 180)?;
        let invoice_output = std::env::var("INVOICE_OUTPUT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("invoice.pdf"));

        let match_policy = match std::env::var("MATCH_POLICY").as_deref() {
            Ok("strict") => MatchPolicy::Strict,
            Ok("lenient") | Err(_) => MatchPolicy::Lenient,
            Ok(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "MATCH_POLICY".into(),
                    message: format!("expected \"lenient\" or \"strict\", got {other:?}"),
                });
            }
        };

        Ok(Self {
            email: EmailConfig {
                imap_host,
                imap_port,
                smtp_host,
                smtp_port,
                username,
                password,
                from_address,
            },
            llm: LlmConfig {
                base_url,
                api_key,
                model,
            },
            catalog,
            order_subject,
            poll_interval_secs,
            invoice_output,
            match_policy,
        })
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("cannot parse {raw:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_policy_defaults_to_lenient() {
        assert_eq!(MatchPolicy::default(), MatchPolicy::Lenient);
    }
}

// SPDX-License-Identifier: MIT

//! Application configuration loaded from environment variables.
//!
//! All amoCRM credentials live in an explicit struct that is injected into
//! the services that need them; nothing reads the environment after startup.

use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// amoCRM account subdomain (`{subdomain}.amocrm.ru`)
    pub amo_subdomain: String,
    /// OAuth integration client ID
    pub amo_client_id: String,
    /// OAuth integration client secret
    pub amo_client_secret: String,
    /// OAuth redirect URI registered with the integration
    pub amo_redirect_uri: String,
    /// Base domain of the provider (overridable for self-hosted installs)
    pub amo_base_domain: String,
    /// Server port
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Missing credentials are fatal: no requests can proceed without them.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            amo_subdomain: env::var("AMO_CRM_ACCOUNT_SUBDOMAIN")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("AMO_CRM_ACCOUNT_SUBDOMAIN"))?,
            amo_client_id: env::var("AMO_CRM_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("AMO_CRM_CLIENT_ID"))?,
            amo_client_secret: env::var("AMO_CRM_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("AMO_CRM_CLIENT_SECRET"))?,
            amo_redirect_uri: env::var("AMO_CRM_REDIRECT_URI")
                .map_err(|_| ConfigError::Missing("AMO_CRM_REDIRECT_URI"))?,
            amo_base_domain: env::var("AMO_CRM_BASE_DOMAIN")
                .unwrap_or_else(|_| "amocrm.ru".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
        })
    }

    /// Base URL of the account's API host.
    pub fn account_base_url(&self) -> String {
        format!("https://{}.{}", self.amo_subdomain, self.amo_base_domain)
    }

    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            amo_subdomain: "example".to_string(),
            amo_client_id: "test_client_id".to_string(),
            amo_client_secret: "test_secret".to_string(),
            amo_redirect_uri: "http://localhost:8080/amocrm/callback".to_string(),
            amo_base_domain: "amocrm.ru".to_string(),
            port: 8080,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_base_url() {
        let config = Config::test_default();
        assert_eq!(config.account_base_url(), "https://example.amocrm.ru");
    }

    #[test]
    fn test_config_from_env() {
        env::set_var("AMO_CRM_ACCOUNT_SUBDOMAIN", "acme");
        env::set_var("AMO_CRM_CLIENT_ID", "id");
        env::set_var("AMO_CRM_CLIENT_SECRET", "secret");
        env::set_var("AMO_CRM_REDIRECT_URI", "http://localhost/cb");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.amo_subdomain, "acme");
        assert_eq!(config.amo_client_id, "id");
        assert_eq!(config.port, 8080);
    }
}

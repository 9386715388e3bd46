// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::ConfigError;
use crate::site::IntakeUrls;
use std::env;
use std::path::PathBuf;

const DEFAULT_SITE: &str = "datadoghq.com";
const DEFAULT_AGENT_HOST: &str = "127.0.0.1";
const DEFAULT_DOGSTATSD_PORT: u16 = 8125;
const DEFAULT_MAX_REQUESTS_PER_SECOND: u32 = 10;
const DEFAULT_MAX_PAYLOAD_SIZE_MB: usize = 5;
const DEFAULT_MAX_HISTORY_ITEMS: usize = 100;
const DEFAULT_LOG_PATH: &str = "/var/log/forwardog/forwardog.log";
const DEFAULT_LISTEN_PORT: u16 = 8000;
const DEFAULT_TAGS: [&str; 1] = ["source:forwardog"];

/// Read-only settings shared by every component of the gateway
#[derive(Debug, Clone)]
pub struct Config {
    /// Datadog API key; empty when not configured
    pub api_key: String,
    /// Datadog site (e.g., datadoghq.com, datadoghq.eu)
    pub site: String,
    /// Base URLs of the HTTPS intake endpoints
    pub intake_urls: IntakeUrls,
    /// Host of the DogStatsD collector
    pub agent_host: String,
    /// UDP port of the DogStatsD collector
    pub dogstatsd_port: u16,
    pub max_requests_per_second: u32,
    /// Largest inbound request body accepted by the HTTP surface
    pub max_payload_size_mb: usize,
    /// Capacity of the history ledger
    pub max_history_items: usize,
    /// File tailed by the Datadog agent for file-based log collection
    pub log_path: PathBuf,
    /// Port the HTTP surface listens on
    pub listen_port: u16,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
    /// Tags added to every submission
    pub default_tags: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            site: DEFAULT_SITE.to_string(),
            intake_urls: IntakeUrls::for_site(DEFAULT_SITE),
            agent_host: DEFAULT_AGENT_HOST.to_string(),
            dogstatsd_port: DEFAULT_DOGSTATSD_PORT,
            max_requests_per_second: DEFAULT_MAX_REQUESTS_PER_SECOND,
            max_payload_size_mb: DEFAULT_MAX_PAYLOAD_SIZE_MB,
            max_history_items: DEFAULT_MAX_HISTORY_ITEMS,
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            listen_port: DEFAULT_LISTEN_PORT,
            log_level: "info".to_string(),
            https_proxy: None,
            default_tags: DEFAULT_TAGS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup, `from_env` being the process one
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_key = lookup("DD_API_KEY")
            .map(|key| key.trim().to_string())
            .unwrap_or_default();
        let site = lookup("DD_SITE").unwrap_or(defaults.site);
        let intake_urls = IntakeUrls::for_site(&site).with_overrides(
            lookup("DD_URL"),
            lookup("DD_LOGS_URL"),
            lookup("DD_EVENTS_URL"),
        );
        let agent_host = lookup("DD_AGENT_HOST").unwrap_or(defaults.agent_host);
        let dogstatsd_port = lookup("DD_DOGSTATSD_PORT")
            .or_else(|| lookup("DOGSTATSD_PORT"))
            .and_then(|port| port.trim().parse::<u16>().ok())
            .unwrap_or(DEFAULT_DOGSTATSD_PORT);
        let max_requests_per_second = lookup("MAX_REQUESTS_PER_SECOND")
            .and_then(|val| val.trim().parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_REQUESTS_PER_SECOND);
        let max_payload_size_mb = lookup("MAX_PAYLOAD_SIZE_MB")
            .and_then(|val| val.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_PAYLOAD_SIZE_MB);
        let max_history_items = lookup("MAX_HISTORY_ITEMS")
            .and_then(|val| val.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_HISTORY_ITEMS);
        let log_path = lookup("FORWARDOG_LOG_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.log_path);
        let listen_port = lookup("FORWARDOG_PORT")
            .and_then(|port| port.trim().parse::<u16>().ok())
            .unwrap_or(DEFAULT_LISTEN_PORT);
        let log_level = lookup("DD_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or(defaults.log_level);
        let https_proxy = lookup("DD_PROXY_HTTPS").or_else(|| lookup("HTTPS_PROXY"));

        let config = Self {
            api_key,
            site,
            intake_urls,
            agent_host,
            dogstatsd_port,
            max_requests_per_second,
            max_payload_size_mb,
            max_history_items,
            log_path,
            listen_port,
            log_level,
            https_proxy,
            default_tags: defaults.default_tags,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dogstatsd_port == 0 {
            return Err(ConfigError::InvalidConfig(
                "DogStatsD port must be greater than 0".to_string(),
            ));
        }

        if self.site.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "DD_SITE cannot be empty".to_string(),
            ));
        }

        if self.agent_host.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "DD_AGENT_HOST cannot be empty".to_string(),
            ));
        }

        if self.max_history_items == 0 {
            return Err(ConfigError::InvalidConfig(
                "MAX_HISTORY_ITEMS must be greater than 0".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_size_mb.saturating_mul(1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(!config.is_configured());
        assert_eq!(config.default_tags, vec!["source:forwardog".to_string()]);
    }

    #[test]
    fn test_parse_env() {
        let config = Config::from_lookup(lookup_from(&[
            ("DD_API_KEY", "abc123"),
            ("DD_SITE", "datadoghq.eu"),
            ("DD_AGENT_HOST", "datadog-agent"),
            ("DOGSTATSD_PORT", "9125"),
            ("MAX_HISTORY_ITEMS", "7"),
            ("DD_LOG_LEVEL", "DEBUG"),
        ]))
        .unwrap();
        assert!(config.is_configured());
        assert_eq!(config.site, "datadoghq.eu");
        assert_eq!(config.intake_urls.api, "https://api.datadoghq.eu");
        assert_eq!(config.agent_host, "datadog-agent");
        assert_eq!(config.dogstatsd_port, 9125);
        assert_eq!(config.max_history_items, 7);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_dd_dogstatsd_port_takes_precedence() {
        let config = Config::from_lookup(lookup_from(&[
            ("DD_DOGSTATSD_PORT", "18125"),
            ("DOGSTATSD_PORT", "9125"),
        ]))
        .unwrap();
        assert_eq!(config.dogstatsd_port, 18125);
    }

    #[test]
    fn test_unparsable_numbers_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("DD_DOGSTATSD_PORT", "not-a-port"),
            ("MAX_PAYLOAD_SIZE_MB", "lots"),
        ]))
        .unwrap();
        assert_eq!(config.dogstatsd_port, 8125);
        assert_eq!(config.max_payload_size_mb, 5);
        assert_eq!(config.max_payload_bytes(), 5 * 1024 * 1024);
    }

    #[test]
    fn test_url_overrides() {
        let config = Config::from_lookup(lookup_from(&[(
            "DD_LOGS_URL",
            "http://127.0.0.1:4000",
        )]))
        .unwrap();
        assert_eq!(config.intake_urls.logs, "http://127.0.0.1:4000");
        assert_eq!(config.intake_urls.api, "https://api.datadoghq.com");
    }

    #[test]
    fn test_validate_invalid_port() {
        let config = Config {
            dogstatsd_port: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_history() {
        let config = Config {
            max_history_items: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_site() {
        let config = Config {
            site: "   ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let result = Config::from_lookup(lookup_from(&[("DD_LOG_LEVEL", "verbose")]));
        assert!(result.is_err());
    }
}

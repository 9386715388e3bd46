// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while loading or validating the configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Requests the gateway refuses before any transport is involved
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("DD_API_KEY not configured")]
    MissingApiKey,
}

impl GatewayError {
    #[must_use]
    pub fn hint(&self) -> &'static str {
        match self {
            Self::MissingApiKey => {
                "Set the DD_API_KEY environment variable to submit through the Datadog API."
            }
        }
    }
}

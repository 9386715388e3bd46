// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Debug;

/// Source of the `DD-API-KEY` header value.
///
/// An empty key means "not configured": [`ApiKeyFactory::get_api_key`] returns `None` and the
/// gateway refuses to dispatch anything to the HTTPS intake.
#[derive(Clone)]
pub struct ApiKeyFactory {
    api_key: String,
}

impl ApiKeyFactory {
    #[must_use]
    pub fn new_from_static_key(api_key: &str) -> Self {
        Self {
            api_key: api_key.trim().to_string(),
        }
    }

    #[must_use]
    pub fn get_api_key(&self) -> Option<&str> {
        if self.api_key.is_empty() {
            None
        } else {
            Some(&self.api_key)
        }
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.get_api_key().is_some()
    }

    /// Key rendering safe for display: everything but the last four characters is starred.
    #[must_use]
    pub fn masked(&self) -> String {
        match self.get_api_key() {
            None => "(not configured)".to_string(),
            Some(key) => mask(key),
        }
    }
}

fn mask(key: &str) -> String {
    let len = key.chars().count();
    if len <= 4 {
        return "*".repeat(len);
    }
    let tail: String = key.chars().skip(len - 4).collect();
    format!("{}{tail}", "*".repeat(len - 4))
}

impl Debug for ApiKeyFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiKeyFactory")
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Resolution of a Datadog site into the base URLs of its intake endpoints.

/// Sites with a dedicated intake deployment. Anything else goes through the same naming
/// pattern, which is the documented fallback for new regions.
pub const KNOWN_SITES: [&str; 6] = [
    "datadoghq.com",
    "datadoghq.eu",
    "us3.datadoghq.com",
    "us5.datadoghq.com",
    "ap1.datadoghq.com",
    "ddog-gov.com",
];

/// Base URLs for the three intake families of a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeUrls {
    /// Metrics series and events v1 (`https://api.<site>`).
    pub api: String,
    /// Logs intake (`https://http-intake.logs.<site>`).
    pub logs: String,
    /// Events v2 intake (`https://event-management-intake.<site>`).
    pub events: String,
}

impl IntakeUrls {
    #[must_use]
    pub fn for_site(site: &str) -> Self {
        let site = site.trim().trim_end_matches('/');
        if !KNOWN_SITES.contains(&site) {
            tracing::debug!("Site {site} has no dedicated mapping, using generic intake hosts");
        }
        Self {
            api: format!("https://api.{site}"),
            logs: build_fqdn_logs(site),
            events: format!("https://event-management-intake.{site}"),
        }
    }

    /// Replaces individual base URLs, e.g. to point the client at a proxy or a test server.
    #[must_use]
    pub fn with_overrides(
        mut self,
        api: Option<String>,
        logs: Option<String>,
        events: Option<String>,
    ) -> Self {
        if let Some(api) = api {
            self.api = normalize_url(&api);
        }
        if let Some(logs) = logs {
            self.logs = normalize_url(&logs);
        }
        if let Some(events) = events {
            self.events = normalize_url(&events);
        }
        self
    }

    /// Every family served from a single base URL.
    #[must_use]
    pub fn single(base: &str) -> Self {
        let base = normalize_url(base);
        Self {
            api: base.clone(),
            logs: base.clone(),
            events: base,
        }
    }
}

fn build_fqdn_logs(site: &str) -> String {
    format!("https://http-intake.logs.{site}")
}

fn normalize_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Uniform result of a submission attempt.
//!
//! Every transport (HTTPS intake, DogStatsD over UDP, the agent log file) reports back with an
//! [`Outcome`]. Failures are data: a failed outcome carries an optional remediation hint that is
//! derived from the wire status code or from the class of error that stopped the attempt, never
//! from the free-text error message.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

/// Hint attached to HTTPS submissions that exceeded the request timeout.
pub const TIMEOUT_HINT: &str = "Request timed out. Check network connectivity to Datadog.";

/// Result record of a single submission attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
    pub request_id: Option<String>,
    pub status_code: Option<u16>,
    pub latency_ms: Option<f64>,
    pub response_body: Option<Value>,
    pub error_hint: Option<String>,
}

impl Outcome {
    /// Successful attempt. Never carries an error hint.
    #[must_use]
    pub fn succeeded(request_id: &str, message: impl Into<String>, started: Instant) -> Self {
        Self {
            success: true,
            message: message.into(),
            request_id: Some(request_id.to_string()),
            status_code: None,
            latency_ms: Some(elapsed_ms(started)),
            response_body: None,
            error_hint: None,
        }
    }

    #[must_use]
    pub fn failed(
        request_id: &str,
        message: impl Into<String>,
        started: Instant,
        error_hint: Option<String>,
    ) -> Self {
        Self {
            success: false,
            message: message.into(),
            request_id: Some(request_id.to_string()),
            status_code: None,
            latency_ms: Some(elapsed_ms(started)),
            response_body: None,
            error_hint,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.response_body = Some(body);
        self
    }
}

/// Remediation hint for a failed HTTP status code, `None` for codes outside the table.
#[must_use]
pub fn status_hint(status_code: u16) -> Option<&'static str> {
    match status_code {
        400 => Some("Invalid payload format. Check metric/log structure and required fields."),
        401 => Some("Invalid API key. Verify DD_API_KEY environment variable."),
        403 => Some("API key doesn't have permission for this operation."),
        408 => Some("Request timeout. Check network connectivity."),
        413 => Some("Payload too large. Max 5MB per request, 1MB per log entry."),
        429 => Some("Rate limited. Too many requests. Wait before retrying."),
        500 => Some("Datadog server error. Try again later."),
        502 => Some("Bad gateway. Datadog service temporarily unavailable."),
        503 => Some("Service unavailable. Datadog is under maintenance."),
        _ => None,
    }
}

/// Generic hint for failures that fall outside the targeted taxonomy of a transport.
#[must_use]
pub fn unexpected_hint(category: &str) -> String {
    format!("Unexpected error: {category}")
}

/// Local correlation id of the form `<kind>-<YYYYmmddHHMMSSffffff>`.
///
/// Only meant for matching an outcome with its ledger entry; nothing parses it.
#[must_use]
pub fn request_id(kind: &str) -> String {
    format!("{kind}-{}", chrono::Local::now().format("%Y%m%d%H%M%S%6f"))
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapped_status_hints() {
        let expected = [
            (
                400,
                "Invalid payload format. Check metric/log structure and required fields.",
            ),
            (401, "Invalid API key. Verify DD_API_KEY environment variable."),
            (403, "API key doesn't have permission for this operation."),
            (408, "Request timeout. Check network connectivity."),
            (413, "Payload too large. Max 5MB per request, 1MB per log entry."),
            (429, "Rate limited. Too many requests. Wait before retrying."),
            (500, "Datadog server error. Try again later."),
            (502, "Bad gateway. Datadog service temporarily unavailable."),
            (503, "Service unavailable. Datadog is under maintenance."),
        ];
        for (code, hint) in expected {
            assert_eq!(status_hint(code), Some(hint), "hint for {code}");
        }
    }

    #[test]
    fn test_unmapped_status_hints() {
        for code in [200, 202, 404, 418, 504] {
            assert_eq!(status_hint(code), None);
        }
    }

    #[test]
    fn test_request_id_format() {
        let id = request_id("dogstatsd-batch");
        let suffix = id.strip_prefix("dogstatsd-batch-").unwrap();
        assert_eq!(suffix.len(), 20);
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_succeeded_has_no_hint() {
        let outcome = Outcome::succeeded("metrics-1", "ok", Instant::now()).with_status(202);
        assert!(outcome.success);
        assert!(outcome.error_hint.is_none());
        assert_eq!(outcome.status_code, Some(202));
        assert!(outcome.latency_ms.unwrap() >= 0.0);
    }

    #[test]
    fn test_outcome_serializes_all_fields() {
        let outcome = Outcome::failed(
            "logs-1",
            "boom",
            Instant::now(),
            Some(unexpected_hint("ConnectError")),
        );
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error_hint"], "Unexpected error: ConnectError");
        assert!(value["status_code"].is_null());
        assert!(value["response_body"].is_null());
    }
}

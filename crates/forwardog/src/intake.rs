// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTPS client for the Datadog intake API.
//!
//! Serializes an already-shaped JSON payload, optionally gzips it, and POSTs it to one of the
//! intake endpoints of the configured site:
//!
//! ```text
//!   POST {api}/api/v2/series
//!   POST {logs}/api/v2/logs[?ddtags=...]
//!   POST {api}/api/v1/events
//!   POST {events}/api/v2/events
//! ```
//!
//! Every call ends in an [`Outcome`]; nothing here returns an error to the caller and nothing
//! here touches the history ledger.

use crate::outcome::{request_id, status_hint, unexpected_hint, Outcome, TIMEOUT_HINT};
use crate::site::IntakeUrls;
use flate2::{write::GzEncoder, Compression};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE};
use serde_json::Value;
use std::io::Write;
use std::time::{Duration, Instant};
use thiserror::Error as ThisError;
use tracing::{debug, error};
use url::Url;

pub const DEFAULT_INTAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Intake endpoint families, each with its own path and wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeKind {
    Metrics,
    Logs,
    EventV1,
    EventV2,
}

impl IntakeKind {
    fn request_id_prefix(self) -> &'static str {
        match self {
            Self::Metrics => "metrics",
            Self::Logs => "logs",
            Self::EventV1 => "event-v1",
            Self::EventV2 => "event",
        }
    }

    fn path(self) -> &'static str {
        match self {
            Self::Metrics => "/api/v2/series",
            Self::Logs => "/api/v2/logs",
            Self::EventV1 => "/api/v1/events",
            Self::EventV2 => "/api/v2/events",
        }
    }

    fn noun(self) -> &'static str {
        match self {
            Self::Metrics => "metrics",
            Self::Logs => "logs",
            Self::EventV1 | Self::EventV2 => "event",
        }
    }

    fn success_message(self, payload: &Value) -> String {
        match self {
            Self::Metrics => "Metrics submitted successfully".to_string(),
            Self::Logs => {
                let entries = payload.as_array().map_or(1, Vec::len);
                format!("Logs submitted successfully ({entries} entries)")
            }
            Self::EventV1 => "Event submitted successfully (v1 API)".to_string(),
            Self::EventV2 => "Event submitted successfully (v2 API)".to_string(),
        }
    }
}

/// Reasons an HTTPS submission never produced a response.
#[derive(ThisError, Debug)]
pub enum IntakeError {
    #[error("Request timeout")]
    Timeout,
    #[error("Invalid intake URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Failed to compress payload: {0}")]
    Compress(#[from] std::io::Error),
    #[error("Invalid header value for DD-API-KEY")]
    Header,
    #[error("{0}")]
    Transport(reqwest::Error),
}

impl From<reqwest::Error> for IntakeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err)
        }
    }
}

impl IntakeError {
    /// Short name of the error class, used in the generic remediation hint.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Timeout => "TimeoutError",
            Self::Url(_) => "InvalidURL",
            Self::Encode(_) => "EncodeError",
            Self::Compress(_) => "CompressionError",
            Self::Header => "InvalidHeader",
            Self::Transport(err) if err.is_connect() => "ConnectError",
            Self::Transport(err) if err.is_builder() => "BuilderError",
            Self::Transport(err) if err.is_redirect() => "RedirectError",
            Self::Transport(err) if err.is_body() => "BodyError",
            Self::Transport(err) if err.is_decode() => "DecodeError",
            Self::Transport(_) => "RequestError",
        }
    }

    fn hint(&self) -> String {
        match self {
            Self::Timeout => TIMEOUT_HINT.to_string(),
            other => unexpected_hint(other.category()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntakeClient {
    client: reqwest::Client,
    urls: IntakeUrls,
    timeout: Duration,
    use_compression: bool,
}

impl IntakeClient {
    #[must_use]
    pub fn new(urls: IntakeUrls, https_proxy: Option<&str>, timeout: Duration) -> Self {
        Self {
            client: get_client(https_proxy, timeout),
            urls,
            timeout,
            use_compression: false,
        }
    }

    /// Gzip request bodies and announce it with `Content-Encoding: gzip`.
    #[must_use]
    pub fn with_compression(mut self, use_compression: bool) -> Self {
        self.use_compression = use_compression;
        self
    }

    #[must_use]
    pub fn urls(&self) -> &IntakeUrls {
        &self.urls
    }

    pub async fn submit_metrics(&self, api_key: &str, payload: &Value) -> Outcome {
        self.submit(IntakeKind::Metrics, api_key, payload, None).await
    }

    pub async fn submit_logs(&self, api_key: &str, payload: &Value, ddtags: Option<&str>) -> Outcome {
        self.submit(IntakeKind::Logs, api_key, payload, ddtags).await
    }

    pub async fn submit_event_v1(&self, api_key: &str, payload: &Value) -> Outcome {
        self.submit(IntakeKind::EventV1, api_key, payload, None).await
    }

    pub async fn submit_event_v2(&self, api_key: &str, payload: &Value) -> Outcome {
        self.submit(IntakeKind::EventV2, api_key, payload, None).await
    }

    async fn submit(
        &self,
        kind: IntakeKind,
        api_key: &str,
        payload: &Value,
        ddtags: Option<&str>,
    ) -> Outcome {
        let started = Instant::now();
        let request_id = request_id(kind.request_id_prefix());

        let response = match self.send(kind, api_key, payload, ddtags).await {
            Ok(response) => response,
            Err(err) => {
                error!("{request_id}: Failed to submit {}: {err}", kind.noun());
                let message = match err {
                    IntakeError::Timeout => err.to_string(),
                    ref other => format!("Error: {other}"),
                };
                return Outcome::failed(&request_id, message, started, Some(err.hint()));
            }
        };

        let status = response.status().as_u16();
        let body = decode_body(response).await;

        if matches!(status, 200 | 201 | 202) {
            debug!("{request_id}: {} accepted with HTTP {status}", kind.noun());
            let outcome = Outcome::succeeded(&request_id, kind.success_message(payload), started)
                .with_status(status);
            return match body {
                Some(body) => outcome.with_body(body),
                None => outcome,
            };
        }

        error!(
            "{request_id}: Failed to submit {}: HTTP {status}: {:?}",
            kind.noun(),
            body
        );
        let outcome = Outcome::failed(
            &request_id,
            format!("Failed to submit {}: HTTP {status}", kind.noun()),
            started,
            status_hint(status).map(ToString::to_string),
        )
        .with_status(status);
        match body {
            Some(body) => outcome.with_body(body),
            None => outcome,
        }
    }

    async fn send(
        &self,
        kind: IntakeKind,
        api_key: &str,
        payload: &Value,
        ddtags: Option<&str>,
    ) -> Result<reqwest::Response, IntakeError> {
        let url = self.url_for(kind, ddtags)?;
        let headers = self.get_headers(api_key)?;
        let body = self.encode(payload)?;

        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .headers(headers)
            .body(body)
            .send()
            .await?;
        Ok(response)
    }

    fn url_for(&self, kind: IntakeKind, ddtags: Option<&str>) -> Result<Url, IntakeError> {
        let base = match kind {
            IntakeKind::Metrics | IntakeKind::EventV1 => &self.urls.api,
            IntakeKind::Logs => &self.urls.logs,
            IntakeKind::EventV2 => &self.urls.events,
        };
        let mut url = Url::parse(&format!("{base}{}", kind.path()))?;
        if let Some(ddtags) = ddtags.filter(|tags| !tags.is_empty()) {
            url.query_pairs_mut().append_pair("ddtags", ddtags);
        }
        Ok(url)
    }

    fn get_headers(&self, api_key: &str) -> Result<HeaderMap, IntakeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "DD-API-KEY",
            HeaderValue::from_str(api_key).map_err(|_| IntakeError::Header)?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if self.use_compression {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        }
        Ok(headers)
    }

    fn encode(&self, payload: &Value) -> Result<Vec<u8>, IntakeError> {
        let body = serde_json::to_vec(payload)?;
        if !self.use_compression {
            return Ok(body);
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&body)?;
        Ok(encoder.finish()?)
    }
}

/// JSON when the backend sent JSON, raw text otherwise.
async fn decode_body(response: reqwest::Response) -> Option<Value> {
    match response.bytes().await {
        Ok(bytes) => Some(
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned())),
        ),
        Err(e) => {
            debug!("Failed to read intake response body: {e}");
            None
        }
    }
}

/// Builds a reqwest client with optional proxy configuration and timeout, falling back to a
/// direct connection when the proxy URL cannot be used.
#[must_use]
pub fn get_client(https_proxy: Option<&str>, timeout: Duration) -> reqwest::Client {
    let builder = reqwest::Client::builder().timeout(timeout);
    let with_proxy = match https_proxy {
        Some(proxy) => match reqwest::Proxy::https(proxy) {
            Ok(proxy) => builder.proxy(proxy),
            Err(e) => {
                error!("Unable to parse proxy configuration: {e}, falling back to direct connection");
                reqwest::Client::builder().timeout(timeout)
            }
        },
        None => builder,
    };
    match with_proxy.build() {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build HTTP client: {e}, using reqwest defaults");
            reqwest::Client::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn client() -> IntakeClient {
        IntakeClient::new(
            IntakeUrls::for_site("datadoghq.com"),
            None,
            DEFAULT_INTAKE_TIMEOUT,
        )
    }

    #[test]
    fn test_endpoint_urls() {
        let client = client();
        assert_eq!(
            client.url_for(IntakeKind::Metrics, None).unwrap().as_str(),
            "https://api.datadoghq.com/api/v2/series"
        );
        assert_eq!(
            client.url_for(IntakeKind::EventV1, None).unwrap().as_str(),
            "https://api.datadoghq.com/api/v1/events"
        );
        assert_eq!(
            client.url_for(IntakeKind::EventV2, None).unwrap().as_str(),
            "https://event-management-intake.datadoghq.com/api/v2/events"
        );
        assert_eq!(
            client.url_for(IntakeKind::Logs, Some("")).unwrap().as_str(),
            "https://http-intake.logs.datadoghq.com/api/v2/logs"
        );
    }

    #[test]
    fn test_logs_url_carries_ddtags() {
        let url = client()
            .url_for(IntakeKind::Logs, Some("env:test,source:forwardog"))
            .unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![(
                "ddtags".to_string(),
                "env:test,source:forwardog".to_string()
            )]
        );
    }

    #[test]
    fn test_headers() {
        let headers = client().get_headers("abc").unwrap();
        assert_eq!(headers["DD-API-KEY"], "abc");
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert!(headers.get(CONTENT_ENCODING).is_none());

        let gzip_headers = client().with_compression(true).get_headers("abc").unwrap();
        assert_eq!(gzip_headers[CONTENT_ENCODING], "gzip");
    }

    #[test]
    fn test_invalid_api_key_header() {
        assert!(matches!(
            client().get_headers("bad\nkey"),
            Err(IntakeError::Header)
        ));
    }

    #[test]
    fn test_gzip_encoding_round_trips() {
        let payload = serde_json::json!({"series": [{"metric": "a.b"}]});
        let compressed = client().with_compression(true).encode(&payload).unwrap();
        let mut decoded = String::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, payload.to_string());
    }

    #[test]
    fn test_error_hints() {
        assert_eq!(IntakeError::Timeout.hint(), TIMEOUT_HINT);
        assert_eq!(IntakeError::Header.hint(), "Unexpected error: InvalidHeader");
    }

    #[test]
    fn test_log_success_message_counts_entries() {
        let payload = serde_json::json!([{"message": "a"}, {"message": "b"}]);
        assert_eq!(
            IntakeKind::Logs.success_message(&payload),
            "Logs submitted successfully (2 entries)"
        );
    }
}

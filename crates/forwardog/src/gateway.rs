// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Dispatch seam between callers, transports and the history ledger.
//!
//! The gateway owns one instance of each transport and of the ledger. For every request it
//! shapes the payload, picks the transport, and records the resulting [`Outcome`] next to the
//! original request before handing the outcome back. A request that reaches a transport always
//! yields exactly one ledger entry, whatever the transport reports.
//!
//! Submissions to the HTTPS intake need an API key. Without one the request is rejected with
//! [`GatewayError::MissingApiKey`] before any transport runs, and nothing is recorded.

use crate::api_key::ApiKeyFactory;
use crate::config::Config;
use crate::dogstatsd::{DogStatsDClient, DogStatsDConfig};
use crate::error::GatewayError;
use crate::file_logger::{FileLogger, JsonLineFields};
use crate::history::{History, HistoryEntryType};
use crate::intake::{IntakeClient, DEFAULT_INTAKE_TIMEOUT};
use crate::models::{
    AgentFileLogRequest, DogStatsDBatchRequest, DogStatsDRawRequest, DogStatsDRequest,
    FileLogFormat, LogEntry, LogsApiRequest, LogsRawRequest, MetricsSubmitRequest, SeriesType,
};
use crate::outcome::{request_id, unexpected_hint, Outcome};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

impl From<GatewayError> for Outcome {
    fn from(err: GatewayError) -> Self {
        Outcome {
            success: false,
            message: err.to_string(),
            request_id: None,
            status_code: None,
            latency_ms: None,
            response_body: None,
            error_hint: Some(err.hint().to_string()),
        }
    }
}

pub struct Gateway {
    config: Arc<Config>,
    api_key_factory: Arc<ApiKeyFactory>,
    intake: Arc<IntakeClient>,
    dogstatsd: Arc<DogStatsDClient>,
    file_logger: Arc<FileLogger>,
    history: Arc<History>,
}

impl Gateway {
    /// Builds every transport and the ledger from the configuration.
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        let api_key_factory = Arc::new(ApiKeyFactory::new_from_static_key(&config.api_key));
        let intake = Arc::new(IntakeClient::new(
            config.intake_urls.clone(),
            config.https_proxy.as_deref(),
            DEFAULT_INTAKE_TIMEOUT,
        ));
        let dogstatsd = Arc::new(DogStatsDClient::new(DogStatsDConfig {
            host: config.agent_host.clone(),
            port: config.dogstatsd_port,
            default_tags: config.default_tags.clone(),
        }));
        let file_logger = Arc::new(FileLogger::new(config.log_path.clone()));
        let history = Arc::new(History::new(config.max_history_items));
        Self::with_components(
            config,
            api_key_factory,
            intake,
            dogstatsd,
            file_logger,
            history,
        )
    }

    #[must_use]
    pub fn with_components(
        config: Arc<Config>,
        api_key_factory: Arc<ApiKeyFactory>,
        intake: Arc<IntakeClient>,
        dogstatsd: Arc<DogStatsDClient>,
        file_logger: Arc<FileLogger>,
        history: Arc<History>,
    ) -> Self {
        Self {
            config,
            api_key_factory,
            intake,
            dogstatsd,
            file_logger,
            history,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn api_key_factory(&self) -> &ApiKeyFactory {
        &self.api_key_factory
    }

    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    #[must_use]
    pub fn file_logger(&self) -> &Arc<FileLogger> {
        &self.file_logger
    }

    #[must_use]
    pub fn dogstatsd(&self) -> &DogStatsDClient {
        &self.dogstatsd
    }

    /// Releases resources held by the transports.
    pub fn shutdown(&self) {
        self.dogstatsd.close();
    }

    pub async fn submit_metrics(
        &self,
        request: MetricsSubmitRequest,
    ) -> Result<Outcome, GatewayError> {
        let api_key = self.require_api_key()?;
        let payload = build_series_payload(
            &request,
            &self.config.default_tags,
            chrono::Utc::now().timestamp(),
        );
        let intake = Arc::clone(&self.intake);
        Ok(self
            .dispatch(
                HistoryEntryType::MetricsApi,
                "metrics",
                json!({ "series": request.series }),
                async move { intake.submit_metrics(&api_key, &payload).await },
            )
            .await)
    }

    pub async fn submit_metrics_json(&self, payload: Value) -> Result<Outcome, GatewayError> {
        let api_key = self.require_api_key()?;
        let intake = Arc::clone(&self.intake);
        let request = json!({ "payload": payload });
        Ok(self
            .dispatch(
                HistoryEntryType::MetricsApi,
                "metrics",
                request,
                async move { intake.submit_metrics(&api_key, &payload).await },
            )
            .await)
    }

    pub async fn submit_dogstatsd(&self, request: DogStatsDRequest) -> Outcome {
        let dogstatsd = Arc::clone(&self.dogstatsd);
        let recorded = to_request_value(&request);
        self.dispatch(
            HistoryEntryType::MetricsDogstatsd,
            "dogstatsd",
            recorded,
            async move {
                dogstatsd
                    .send(
                        &request.metric,
                        request.value,
                        request.metric_type,
                        &request.tags,
                        request.sample_rate,
                        request.namespace.as_deref(),
                    )
                    .await
            },
        )
        .await
    }

    pub async fn submit_dogstatsd_raw(&self, request: DogStatsDRawRequest) -> Outcome {
        let dogstatsd = Arc::clone(&self.dogstatsd);
        let recorded = to_request_value(&request);
        self.dispatch(
            HistoryEntryType::MetricsDogstatsd,
            "dogstatsd-raw",
            recorded,
            async move { dogstatsd.send_raw(&request.line).await },
        )
        .await
    }

    pub async fn submit_dogstatsd_batch(&self, request: DogStatsDBatchRequest) -> Outcome {
        let dogstatsd = Arc::clone(&self.dogstatsd);
        let recorded = to_request_value(&request);
        self.dispatch(
            HistoryEntryType::MetricsDogstatsd,
            "dogstatsd-batch",
            recorded,
            async move { dogstatsd.send_batch(&request.lines).await },
        )
        .await
    }

    pub async fn submit_logs(&self, request: LogsApiRequest) -> Result<Outcome, GatewayError> {
        let api_key = self.require_api_key()?;
        let payload = build_log_entries(&request.logs);
        let ddtags = merge_ddtags(request.ddtags.as_deref(), &self.config.default_tags);
        let intake = Arc::clone(&self.intake);
        Ok(self
            .dispatch(
                HistoryEntryType::LogsApi,
                "logs",
                json!({ "logs": request.logs, "ddtags": request.ddtags }),
                async move {
                    intake
                        .submit_logs(&api_key, &payload, ddtags.as_deref())
                        .await
                },
            )
            .await)
    }

    pub async fn submit_logs_json(&self, payload: Value) -> Result<Outcome, GatewayError> {
        let api_key = self.require_api_key()?;
        let intake = Arc::clone(&self.intake);
        let request = json!({ "payload": payload });
        Ok(self
            .dispatch(
                HistoryEntryType::LogsApi,
                "logs",
                request,
                async move { intake.submit_logs(&api_key, &payload, None).await },
            )
            .await)
    }

    pub async fn submit_logs_raw(&self, request: LogsRawRequest) -> Result<Outcome, GatewayError> {
        let api_key = self.require_api_key()?;
        let payload = build_raw_log_entries(&request);
        let intake = Arc::clone(&self.intake);
        Ok(self
            .dispatch(
                HistoryEntryType::LogsApi,
                "logs",
                to_request_value(&request),
                async move { intake.submit_logs(&api_key, &payload, None).await },
            )
            .await)
    }

    pub async fn submit_event_v1(&self, payload: Value) -> Result<Outcome, GatewayError> {
        let api_key = self.require_api_key()?;
        let intake = Arc::clone(&self.intake);
        let request = json!({ "payload": payload, "api_version": "v1" });
        Ok(self
            .dispatch(
                HistoryEntryType::EventsApi,
                "event-v1",
                request,
                async move { intake.submit_event_v1(&api_key, &payload).await },
            )
            .await)
    }

    pub async fn submit_event_v2(&self, payload: Value) -> Result<Outcome, GatewayError> {
        let api_key = self.require_api_key()?;
        let intake = Arc::clone(&self.intake);
        let request = json!({ "payload": payload, "api_version": "v2" });
        Ok(self
            .dispatch(
                HistoryEntryType::EventsApi,
                "event",
                request,
                async move { intake.submit_event_v2(&api_key, &payload).await },
            )
            .await)
    }

    /// Appends to the agent log file; file I/O runs on the blocking pool.
    pub async fn write_agent_file(&self, request: AgentFileLogRequest) -> Outcome {
        let file_logger = Arc::clone(&self.file_logger);
        let recorded = to_request_value(&request);
        self.dispatch(
            HistoryEntryType::LogsAgentFile,
            "agent-file",
            recorded,
            async move {
                let started = Instant::now();
                let result = tokio::task::spawn_blocking(move || match request.format {
                    FileLogFormat::Json => file_logger.write_json(
                        &request.messages,
                        &JsonLineFields {
                            service: request.service.as_deref(),
                            source: request.source.as_deref(),
                            tags: &request.tags,
                            status: request.status,
                        },
                    ),
                    FileLogFormat::Raw => file_logger.write_raw(&request.messages),
                })
                .await;
                result.unwrap_or_else(|e| {
                    error!("Agent file write task failed: {e}");
                    Outcome::failed(
                        &request_id("agent-file"),
                        format!("Error: {e}"),
                        started,
                        Some(unexpected_hint("JoinError")),
                    )
                })
            },
        )
        .await
    }

    fn require_api_key(&self) -> Result<String, GatewayError> {
        match self.api_key_factory.get_api_key() {
            Some(api_key) => Ok(api_key.to_string()),
            None => {
                error!("DD_API_KEY not set, refusing to submit to the Datadog API");
                Err(GatewayError::MissingApiKey)
            }
        }
    }

    /// Runs `transport` and records its outcome on a detached task.
    ///
    /// The caller only awaits the task handle, so dropping the caller (a disconnected HTTP
    /// client, for instance) leaves the dispatched attempt running until it completes or times
    /// out, and its ledger entry is still written.
    async fn dispatch<F>(
        &self,
        entry_type: HistoryEntryType,
        request_id_prefix: &'static str,
        request: Value,
        transport: F,
    ) -> Outcome
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        let started = Instant::now();
        let history = Arc::clone(&self.history);
        let task_request = request.clone();
        let task = tokio::spawn(async move {
            let outcome = transport.await;
            record(&history, entry_type, task_request, outcome)
        });
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("{} dispatch task failed: {e}", entry_type.as_str());
                let outcome = Outcome::failed(
                    &request_id(request_id_prefix),
                    format!("Error: {e}"),
                    started,
                    Some(unexpected_hint("JoinError")),
                );
                record(&self.history, entry_type, request, outcome)
            }
        }
    }
}

fn record(
    history: &History,
    entry_type: HistoryEntryType,
    request: Value,
    outcome: Outcome,
) -> Outcome {
    let entry = history.record(entry_type, request, outcome);
    debug!(
        "Recorded {} attempt {} (success: {})",
        entry_type.as_str(),
        entry.id,
        entry.response.success
    );
    entry.response.clone()
}

fn to_request_value<T: Serialize>(request: &T) -> Value {
    serde_json::to_value(request).unwrap_or(Value::Null)
}

/// Shapes a typed series request into the v2 series intake payload.
///
/// Unspecified types become gauges, default tags are appended, missing resources default to the
/// forwardog host, and points without a timestamp (or with a zero one) use `now`. A series without points gets a
/// single zero point at `now`.
#[must_use]
pub fn build_series_payload(
    request: &MetricsSubmitRequest,
    default_tags: &[String],
    now: i64,
) -> Value {
    let series: Vec<Value> = request
        .series
        .iter()
        .map(|series| {
            let series_type = match series.series_type {
                SeriesType::Unspecified => SeriesType::Gauge,
                other => other,
            };
            let tags: Vec<&String> = series.tags.iter().chain(default_tags.iter()).collect();
            let resources: Vec<Value> = if series.resources.is_empty() {
                vec![json!({ "name": "forwardog", "type": "host" })]
            } else {
                series
                    .resources
                    .iter()
                    .map(|r| json!({ "name": r.name, "type": r.resource_type }))
                    .collect()
            };
            let mut points: Vec<Value> = series
                .points
                .iter()
                .map(|p| {
                    let timestamp = p.timestamp.filter(|ts| *ts != 0).unwrap_or(now);
                    json!({ "timestamp": timestamp, "value": p.value })
                })
                .collect();
            if points.is_empty() {
                points.push(json!({ "timestamp": now, "value": 0 }));
            }

            let mut entry = Map::new();
            entry.insert("metric".to_string(), Value::from(series.metric.as_str()));
            entry.insert("type".to_string(), Value::from(u8::from(series_type)));
            entry.insert("points".to_string(), Value::Array(points));
            entry.insert("tags".to_string(), json!(tags));
            entry.insert("resources".to_string(), Value::Array(resources));
            if let Some(unit) = series.unit.as_deref().filter(|u| !u.is_empty()) {
                entry.insert("unit".to_string(), Value::from(unit));
            }
            if let Some(interval) = series.interval.filter(|i| *i != 0) {
                entry.insert("interval".to_string(), Value::from(interval));
            }
            Value::Object(entry)
        })
        .collect();
    json!({ "series": series })
}

/// Shapes typed log entries into the logs intake array; `extra` fields are merged last.
#[must_use]
pub fn build_log_entries(logs: &[LogEntry]) -> Value {
    let entries: Vec<Value> = logs
        .iter()
        .map(|log| {
            let mut entry = Map::new();
            entry.insert("message".to_string(), Value::from(log.message.as_str()));
            entry.insert(
                "ddsource".to_string(),
                Value::from(or_forwardog(log.ddsource.as_deref())),
            );
            entry.insert(
                "service".to_string(),
                Value::from(or_forwardog(log.service.as_deref())),
            );
            if let Some(ddtags) = log.ddtags.as_deref().filter(|t| !t.is_empty()) {
                entry.insert("ddtags".to_string(), Value::from(ddtags));
            }
            if let Some(hostname) = log.hostname.as_deref().filter(|h| !h.is_empty()) {
                entry.insert("hostname".to_string(), Value::from(hostname));
            }
            if let Some(status) = log.status {
                entry.insert("status".to_string(), Value::from(status.as_str()));
            }
            if let Some(extra) = &log.extra {
                for (key, value) in extra {
                    entry.insert(key.clone(), value.clone());
                }
            }
            Value::Object(entry)
        })
        .collect();
    Value::Array(entries)
}

fn build_raw_log_entries(request: &LogsRawRequest) -> Value {
    let entries: Vec<Value> = request
        .messages
        .iter()
        .map(|message| {
            let mut entry = Map::new();
            entry.insert("message".to_string(), Value::from(message.as_str()));
            entry.insert(
                "ddsource".to_string(),
                Value::from(or_forwardog(request.ddsource.as_deref())),
            );
            entry.insert(
                "service".to_string(),
                Value::from(or_forwardog(request.service.as_deref())),
            );
            if let Some(ddtags) = request.ddtags.as_deref().filter(|t| !t.is_empty()) {
                entry.insert("ddtags".to_string(), Value::from(ddtags));
            }
            Value::Object(entry)
        })
        .collect();
    Value::Array(entries)
}

/// Request-level `ddtags` followed by the comma-joined default tags.
#[must_use]
pub fn merge_ddtags(ddtags: Option<&str>, default_tags: &[String]) -> Option<String> {
    let ddtags = ddtags.filter(|t| !t.is_empty());
    if default_tags.is_empty() {
        return ddtags.map(ToString::to_string);
    }
    let defaults = default_tags.join(",");
    Some(match ddtags {
        Some(ddtags) => format!("{ddtags},{defaults}"),
        None => defaults,
    })
}

fn or_forwardog(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("forwardog")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricPoint, MetricResource, MetricSeries};
    use crate::site::IntakeUrls;
    use tracing_test::traced_test;

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_series_payload_defaults() {
        let request = MetricsSubmitRequest {
            series: vec![MetricSeries {
                metric: "x.y".to_string(),
                series_type: SeriesType::Unspecified,
                points: vec![],
                resources: vec![],
                tags: tags(&["env:test"]),
                unit: None,
                interval: None,
            }],
        };
        let payload = build_series_payload(&request, &tags(&["source:forwardog"]), 1_700_000_000);
        assert_eq!(
            payload,
            json!({
                "series": [{
                    "metric": "x.y",
                    "type": 3,
                    "points": [{"timestamp": 1_700_000_000, "value": 0}],
                    "tags": ["env:test", "source:forwardog"],
                    "resources": [{"name": "forwardog", "type": "host"}],
                }]
            })
        );
    }

    #[test]
    fn test_series_payload_keeps_explicit_fields() {
        let request = MetricsSubmitRequest {
            series: vec![MetricSeries {
                metric: "req.count".to_string(),
                series_type: SeriesType::Count,
                points: vec![
                    MetricPoint {
                        timestamp: Some(10),
                        value: 2.5,
                    },
                    MetricPoint {
                        timestamp: None,
                        value: 1.0,
                    },
                ],
                resources: vec![MetricResource {
                    name: "web-1".to_string(),
                    resource_type: "host".to_string(),
                }],
                tags: vec![],
                unit: Some("request".to_string()),
                interval: Some(10),
            }],
        };
        let payload = build_series_payload(&request, &[], 99);
        let series = &payload["series"][0];
        assert_eq!(series["type"], 1);
        assert_eq!(series["points"][0], json!({"timestamp": 10, "value": 2.5}));
        assert_eq!(series["points"][1], json!({"timestamp": 99, "value": 1.0}));
        assert_eq!(series["resources"], json!([{"name": "web-1", "type": "host"}]));
        assert_eq!(series["unit"], "request");
        assert_eq!(series["interval"], 10);
        assert_eq!(series["tags"], json!([]));
    }

    #[test]
    fn test_series_payload_zero_timestamp_means_now() {
        let request: MetricsSubmitRequest = serde_json::from_value(json!({
            "series": [{"metric": "x.y", "points": [{"timestamp": 0, "value": 4}]}]
        }))
        .unwrap();
        let payload = build_series_payload(&request, &[], 1_700_000_000);
        assert_eq!(
            payload["series"][0]["points"],
            json!([{"timestamp": 1_700_000_000, "value": 4.0}])
        );
    }

    #[test]
    fn test_log_entries_merge_extra() {
        let log: LogEntry = serde_json::from_value(json!({
            "message": "login",
            "hostname": "web-1",
            "status": "warning",
            "extra": {"usr.id": "user123"}
        }))
        .unwrap();
        assert_eq!(
            build_log_entries(&[log]),
            json!([{
                "message": "login",
                "ddsource": "forwardog",
                "service": "forwardog",
                "hostname": "web-1",
                "status": "warning",
                "usr.id": "user123"
            }])
        );
    }

    #[test]
    fn test_raw_log_entries() {
        let request = LogsRawRequest {
            messages: tags(&["a", "b"]),
            ddsource: Some("nginx".to_string()),
            ddtags: Some("env:x".to_string()),
            service: None,
        };
        let entries = build_raw_log_entries(&request);
        assert_eq!(entries.as_array().unwrap().len(), 2);
        assert_eq!(
            entries[1],
            json!({"message": "b", "ddsource": "nginx", "service": "forwardog", "ddtags": "env:x"})
        );
    }

    #[test]
    fn test_merge_ddtags() {
        let defaults = tags(&["source:forwardog"]);
        assert_eq!(
            merge_ddtags(Some("env:x"), &defaults).as_deref(),
            Some("env:x,source:forwardog")
        );
        assert_eq!(
            merge_ddtags(None, &defaults).as_deref(),
            Some("source:forwardog")
        );
        assert_eq!(merge_ddtags(Some(""), &[]), None);
        assert_eq!(merge_ddtags(Some("env:x"), &[]).as_deref(), Some("env:x"));
    }

    #[test]
    fn test_gateway_error_into_outcome() {
        let outcome = Outcome::from(GatewayError::MissingApiKey);
        assert!(!outcome.success);
        assert_eq!(outcome.message, "DD_API_KEY not configured");
        assert!(outcome.error_hint.is_some());
        assert!(outcome.status_code.is_none());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_missing_api_key_rejected_before_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            intake_urls: IntakeUrls::single("http://127.0.0.1:1"),
            log_path: dir.path().join("forwardog.log"),
            ..Config::default()
        };
        let gateway = Gateway::new(Arc::new(config));
        let request: MetricsSubmitRequest = serde_json::from_value(json!({
            "series": [{"metric": "x.y", "type": 3, "points": [{"value": 3}]}]
        }))
        .unwrap();

        let err = gateway.submit_metrics(request).await.unwrap_err();
        assert_eq!(err, GatewayError::MissingApiKey);
        assert!(gateway.submit_event_v2(json!({})).await.is_err());
        assert!(gateway.history().is_empty());
        assert!(logs_contain("DD_API_KEY not set"));
    }

    #[tokio::test]
    async fn test_agent_file_write_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            log_path: dir.path().join("forwardog.log"),
            ..Config::default()
        };
        let gateway = Gateway::new(Arc::new(config));
        let request: AgentFileLogRequest =
            serde_json::from_value(json!({"messages": ["hello"], "format": "json"})).unwrap();

        let outcome = gateway.write_agent_file(request).await;
        assert!(outcome.success);
        let entries = gateway.history().list(None, None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_type, HistoryEntryType::LogsAgentFile);
        assert_eq!(entries[0].request["format"], "json");
        assert_eq!(entries[0].response, outcome);
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Caller-facing request shapes accepted by the gateway.

use crate::dogstatsd::MetricType;
use crate::file_logger::LogStatus;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn default_forwardog() -> Option<String> {
    Some("forwardog".to_string())
}

fn default_status() -> Option<LogStatus> {
    Some(LogStatus::Info)
}

fn default_sample_rate() -> f64 {
    1.0
}

/// Metric types of the v2 series intake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SeriesType {
    Unspecified,
    Count,
    Rate,
    #[default]
    Gauge,
}

impl TryFrom<u8> for SeriesType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unspecified),
            1 => Ok(Self::Count),
            2 => Ok(Self::Rate),
            3 => Ok(Self::Gauge),
            other => Err(format!("invalid series type {other}")),
        }
    }
}

impl From<SeriesType> for u8 {
    fn from(value: SeriesType) -> Self {
        match value {
            SeriesType::Unspecified => 0,
            SeriesType::Count => 1,
            SeriesType::Rate => 2,
            SeriesType::Gauge => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    #[serde(default)]
    pub timestamp: Option<i64>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResource {
    #[serde(default = "default_resource")]
    pub name: String,
    #[serde(default = "default_resource", rename = "type")]
    pub resource_type: String,
}

fn default_resource() -> String {
    "host".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub metric: String,
    #[serde(default, rename = "type")]
    pub series_type: SeriesType,
    #[serde(default)]
    pub points: Vec<MetricPoint>,
    #[serde(default)]
    pub resources: Vec<MetricResource>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub interval: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSubmitRequest {
    pub series: Vec<MetricSeries>,
}

/// Any JSON payload forwarded as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonPayloadRequest {
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DogStatsDRequest {
    pub metric: String,
    pub value: f64,
    #[serde(default)]
    pub metric_type: MetricType,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
    #[serde(default)]
    pub namespace: Option<String>,
}

impl DogStatsDRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.metric.trim().is_empty() {
            return Err("metric name cannot be empty".to_string());
        }
        if !self.value.is_finite() {
            return Err("value must be a finite number".to_string());
        }
        if !(0.0..=1.0).contains(&self.sample_rate) {
            return Err(format!(
                "sample_rate must be between 0.0 and 1.0, got {}",
                self.sample_rate
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DogStatsDRawRequest {
    pub line: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DogStatsDBatchRequest {
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub message: String,
    #[serde(default = "default_forwardog")]
    pub ddsource: Option<String>,
    #[serde(default)]
    pub ddtags: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default = "default_forwardog")]
    pub service: Option<String>,
    #[serde(default = "default_status")]
    pub status: Option<LogStatus>,
    #[serde(default)]
    pub extra: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsApiRequest {
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub ddtags: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsRawRequest {
    pub messages: Vec<String>,
    #[serde(default = "default_forwardog")]
    pub ddsource: Option<String>,
    #[serde(default)]
    pub ddtags: Option<String>,
    #[serde(default = "default_forwardog")]
    pub service: Option<String>,
}

/// Layout of lines written to the agent log file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileLogFormat {
    #[default]
    Raw,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFileLogRequest {
    pub messages: Vec<String>,
    #[serde(default)]
    pub format: FileLogFormat,
    #[serde(default = "default_forwardog")]
    pub service: Option<String>,
    #[serde(default = "default_forwardog")]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_status")]
    pub status: Option<LogStatus>,
}

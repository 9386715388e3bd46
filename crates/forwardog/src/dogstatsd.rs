// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! DogStatsD client for sending hand-built metrics to a local collector.
//!
//! Lines follow the DogStatsD wire format:
//!
//! ```text
//! <name>:<value>|<type>[|@<sample_rate>][|#<tag1>,<tag2>,...]
//! ```
//!
//! Each send is a single UDP datagram. UDP gives no acknowledgment, so a successful [`Outcome`]
//! only certifies that the datagram was handed to the local network stack, not that the
//! collector received or accepted it.

use crate::outcome::{request_id, unexpected_hint, Outcome};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::{SocketAddr, UdpSocket as StdUdpSocket};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use thiserror::Error as ThisError;
use tokio::net::UdpSocket;
use tracing::{debug, error};

/// Configuration for the DogStatsD client
#[derive(Debug, Clone)]
pub struct DogStatsDConfig {
    /// Host of the collector (e.g., "127.0.0.1")
    pub host: String,
    /// UDP port of the collector (e.g., 8125)
    pub port: u16,
    /// Tags prepended to the tags of every formatted metric
    pub default_tags: Vec<String>,
}

/// Metric type codes of the DogStatsD protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MetricType {
    #[serde(rename = "c")]
    Counter,
    #[default]
    #[serde(rename = "g")]
    Gauge,
    #[serde(rename = "h")]
    Histogram,
    #[serde(rename = "d")]
    Distribution,
    #[serde(rename = "s")]
    Set,
    #[serde(rename = "ms")]
    Timer,
}

impl MetricType {
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Counter => "c",
            Self::Gauge => "g",
            Self::Histogram => "h",
            Self::Distribution => "d",
            Self::Set => "s",
            Self::Timer => "ms",
        }
    }

    pub const ALL: [MetricType; 6] = [
        Self::Counter,
        Self::Gauge,
        Self::Histogram,
        Self::Distribution,
        Self::Set,
        Self::Timer,
    ];
}

#[derive(ThisError, Debug)]
pub enum SendError {
    #[error("Socket error: {0}")]
    Socket(#[from] std::io::Error),
    #[error("No address found for {0}")]
    Resolve(String),
    #[error("Datagram truncated: sent {sent} of {len} bytes")]
    Truncated { sent: usize, len: usize },
}

/// Formats one metric as a DogStatsD line.
///
/// The sample rate segment appears only below 1.0 and the tag segment only when the combined
/// default and call tags are non-empty.
#[must_use]
pub fn format_metric(
    metric: &str,
    value: f64,
    metric_type: MetricType,
    default_tags: &[String],
    tags: &[String],
    sample_rate: f64,
    namespace: Option<&str>,
) -> String {
    let mut line = match namespace.map(str::trim).filter(|ns| !ns.is_empty()) {
        Some(namespace) => format!("{namespace}.{metric}:{value}|{}", metric_type.code()),
        None => format!("{metric}:{value}|{}", metric_type.code()),
    };

    if sample_rate < 1.0 {
        line.push_str(&format!("|@{sample_rate}"));
    }

    let all_tags: Vec<&str> = default_tags
        .iter()
        .chain(tags.iter())
        .map(String::as_str)
        .collect();
    if !all_tags.is_empty() {
        line.push_str("|#");
        line.push_str(&all_tags.join(","));
    }

    line
}

/// UDP sender owning one lazily created socket.
///
/// The socket is bound on first use and shared by concurrent sends; the mutex only guards its
/// creation and release, `send_to` itself runs without the lock.
#[derive(Debug)]
pub struct DogStatsDClient {
    config: DogStatsDConfig,
    socket: Mutex<Option<Arc<UdpSocket>>>,
}

impl DogStatsDClient {
    #[must_use]
    pub fn new(config: DogStatsDConfig) -> Self {
        Self {
            config,
            socket: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> &DogStatsDConfig {
        &self.config
    }

    /// Formats and sends a single metric.
    pub async fn send(
        &self,
        metric: &str,
        value: f64,
        metric_type: MetricType,
        tags: &[String],
        sample_rate: f64,
        namespace: Option<&str>,
    ) -> Outcome {
        let started = Instant::now();
        let request_id = request_id("dogstatsd");
        let line = format_metric(
            metric,
            value,
            metric_type,
            &self.config.default_tags,
            tags,
            sample_rate,
            namespace,
        );

        match self.send_datagram(line.as_bytes()).await {
            Ok(()) => Outcome::succeeded(&request_id, "Metric sent via DogStatsD", started)
                .with_body(json!({
                    "line": line,
                    "host": self.config.host,
                    "port": self.config.port,
                })),
            Err(err) => self.failure(&request_id, started, &err),
        }
    }

    /// Sends an already formatted line verbatim.
    pub async fn send_raw(&self, line: &str) -> Outcome {
        let started = Instant::now();
        let request_id = request_id("dogstatsd-raw");

        match self.send_datagram(line.as_bytes()).await {
            Ok(()) => Outcome::succeeded(&request_id, "Raw line sent via DogStatsD", started)
                .with_body(json!({
                    "line": line,
                    "host": self.config.host,
                    "port": self.config.port,
                })),
            Err(err) => self.failure(&request_id, started, &err),
        }
    }

    /// Sends several lines newline-joined in one datagram; they succeed or fail together.
    pub async fn send_batch(&self, lines: &[String]) -> Outcome {
        let started = Instant::now();
        let request_id = request_id("dogstatsd-batch");
        let payload = lines.join("\n");

        match self.send_datagram(payload.as_bytes()).await {
            Ok(()) => Outcome::succeeded(
                &request_id,
                format!("Batch sent via DogStatsD ({} metrics)", lines.len()),
                started,
            )
            .with_body(json!({
                "lines": lines,
                "count": lines.len(),
                "host": self.config.host,
                "port": self.config.port,
            })),
            Err(err) => self.failure(&request_id, started, &err),
        }
    }

    /// Releases the socket. A later send binds a fresh one.
    pub fn close(&self) {
        let released = self
            .socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() {
            debug!("DogStatsD client socket released");
        }
    }

    fn get_socket(&self) -> std::io::Result<Arc<UdpSocket>> {
        let mut guard = self.socket.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(socket) = guard.as_ref() {
            return Ok(Arc::clone(socket));
        }
        let std_socket = StdUdpSocket::bind("0.0.0.0:0")?;
        std_socket.set_nonblocking(true)?;
        let socket = Arc::new(UdpSocket::from_std(std_socket)?);
        debug!("DogStatsD client socket bound to {:?}", socket.local_addr());
        *guard = Some(Arc::clone(&socket));
        Ok(socket)
    }

    async fn resolve(&self) -> Result<SocketAddr, SendError> {
        let target = format!("{}:{}", self.config.host, self.config.port);
        let found = tokio::net::lookup_host(target.as_str())
            .await?
            .find(SocketAddr::is_ipv4);
        found.ok_or(SendError::Resolve(target))
    }

    async fn send_datagram(&self, payload: &[u8]) -> Result<(), SendError> {
        let addr = self.resolve().await?;
        let socket = self.get_socket()?;
        let sent = socket.send_to(payload, addr).await?;
        if sent != payload.len() {
            return Err(SendError::Truncated {
                sent,
                len: payload.len(),
            });
        }
        Ok(())
    }

    fn failure(&self, request_id: &str, started: Instant, err: &SendError) -> Outcome {
        error!("{request_id}: Failed to send DogStatsD datagram: {err}");
        let hint = match err {
            SendError::Socket(_) | SendError::Resolve(_) => format!(
                "Failed to send UDP packet to {}:{}. Check DD_AGENT_HOST and DOGSTATSD_PORT.",
                self.config.host, self.config.port
            ),
            SendError::Truncated { .. } => unexpected_hint("TruncatedDatagram"),
        };
        let message = match err {
            SendError::Socket(_) => err.to_string(),
            other => format!("Error: {other}"),
        };
        Outcome::failed(request_id, message, started, Some(hint))
    }
}

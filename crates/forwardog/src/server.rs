// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! JSON-over-HTTP surface of the gateway.
//!
//! Submission routes answer 200 with the [`Outcome`] of the attempt, whether or not the
//! backend accepted it. A request rejected before dispatch (missing API key) answers 400 with
//! the rejected outcome; malformed bodies answer 400 and oversized ones 413.

use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::history::HistoryEntryType;
use crate::http_utils::{
    json_response, log_and_create_http_response, read_json_body, HttpResponse,
};
use crate::models::{
    AgentFileLogRequest, DogStatsDBatchRequest, DogStatsDRawRequest, DogStatsDRequest,
    JsonPayloadRequest, LogsApiRequest, LogsRawRequest, MetricsSubmitRequest,
};
use crate::outcome::Outcome;
use hyper::body::{Body, Incoming};
use hyper::service::service_fn;
use hyper::{http, Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

const HEALTH_PATH: &str = "/health";
const CONFIG_PATH: &str = "/api/config";
const METRICS_SUBMIT_PATH: &str = "/api/metrics/api/submit";
const METRICS_SUBMIT_JSON_PATH: &str = "/api/metrics/api/submit-json";
const DOGSTATSD_SUBMIT_PATH: &str = "/api/metrics/dogstatsd/submit";
const DOGSTATSD_SUBMIT_RAW_PATH: &str = "/api/metrics/dogstatsd/submit-raw";
const DOGSTATSD_SUBMIT_BATCH_PATH: &str = "/api/metrics/dogstatsd/submit-batch";
const LOGS_SUBMIT_PATH: &str = "/api/logs/api/submit";
const LOGS_SUBMIT_JSON_PATH: &str = "/api/logs/api/submit-json";
const LOGS_SUBMIT_RAW_PATH: &str = "/api/logs/api/submit-raw";
const AGENT_FILE_SUBMIT_PATH: &str = "/api/logs/agent-file/submit";
const AGENT_FILE_RECENT_PATH: &str = "/api/logs/agent-file/recent";
const AGENT_FILE_CLEAR_PATH: &str = "/api/logs/agent-file/clear";
const EVENTS_V1_SUBMIT_PATH: &str = "/api/events/v1/submit-json";
const EVENTS_V2_SUBMIT_PATH: &str = "/api/events/v2/submit-json";
const HISTORY_PATH: &str = "/api/history";
const HISTORY_EXPORT_PATH: &str = "/api/history/export/json";

const DEFAULT_RECENT_LINES: usize = 20;

/// Accepts connections on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    gateway: Arc<Gateway>,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let server = hyper::server::conn::http1::Builder::new();
    let mut joinset = tokio::task::JoinSet::new();

    loop {
        let conn = tokio::select! {
            () = shutdown.cancelled() => {
                debug!("HTTP server shutting down");
                break;
            },
            con_res = listener.accept() => match con_res {
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionAborted
                            | io::ErrorKind::ConnectionReset
                            | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    error!("Server error: {e}");
                    return Err(e.into());
                }
                Ok((conn, _)) => conn,
            },
            finished = async {
                match joinset.join_next().await {
                    Some(finished) => finished,
                    None => std::future::pending().await,
                }
            } => match finished {
                Err(e) if e.is_panic() => {
                    error!("Connection handler panicked: {:?}", e);
                    continue;
                },
                Ok(()) | Err(_) => continue,
            },
        };

        let conn = hyper_util::rt::TokioIo::new(conn);
        let server = server.clone();
        let gateway = Arc::clone(&gateway);
        let service = service_fn(move |req: Request<Incoming>| {
            handle_request(Arc::clone(&gateway), req)
        });
        joinset.spawn(async move {
            if let Err(e) = server.serve_connection(conn, service).await {
                error!("Connection error: {e}");
            }
        });
    }

    joinset.shutdown().await;
    Ok(())
}

/// Routes a single request.
pub async fn handle_request<B>(
    gateway: Arc<Gateway>,
    req: Request<B>,
) -> http::Result<HttpResponse>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().trim_end_matches('/').to_string();
    let query = parse_query(req.uri().query());

    match (&method, path.as_str()) {
        (&Method::GET, HEALTH_PATH) => health_handler(&gateway),
        (&Method::GET, CONFIG_PATH) => config_handler(&gateway),

        (&Method::POST, METRICS_SUBMIT_PATH) => {
            let request: MetricsSubmitRequest = match read_body(&gateway, req, "metrics").await {
                Ok(request) => request,
                Err(response) => return response,
            };
            gated_response(gateway.submit_metrics(request).await)
        }
        (&Method::POST, METRICS_SUBMIT_JSON_PATH) => {
            let request: JsonPayloadRequest = match read_body(&gateway, req, "metrics").await {
                Ok(request) => request,
                Err(response) => return response,
            };
            gated_response(gateway.submit_metrics_json(request.payload).await)
        }
        (&Method::POST, DOGSTATSD_SUBMIT_PATH) => {
            let request: DogStatsDRequest = match read_body(&gateway, req, "dogstatsd").await {
                Ok(request) => request,
                Err(response) => return response,
            };
            if let Err(message) = request.validate() {
                return log_and_create_http_response(
                    &format!("Invalid dogstatsd request: {message}"),
                    StatusCode::BAD_REQUEST,
                );
            }
            outcome_response(&gateway.submit_dogstatsd(request).await)
        }
        (&Method::POST, DOGSTATSD_SUBMIT_RAW_PATH) => {
            let request: DogStatsDRawRequest = match read_body(&gateway, req, "dogstatsd").await
            {
                Ok(request) => request,
                Err(response) => return response,
            };
            outcome_response(&gateway.submit_dogstatsd_raw(request).await)
        }
        (&Method::POST, DOGSTATSD_SUBMIT_BATCH_PATH) => {
            let request: DogStatsDBatchRequest =
                match read_body(&gateway, req, "dogstatsd").await {
                    Ok(request) => request,
                    Err(response) => return response,
                };
            outcome_response(&gateway.submit_dogstatsd_batch(request).await)
        }

        (&Method::POST, LOGS_SUBMIT_PATH) => {
            let request: LogsApiRequest = match read_body(&gateway, req, "logs").await {
                Ok(request) => request,
                Err(response) => return response,
            };
            gated_response(gateway.submit_logs(request).await)
        }
        (&Method::POST, LOGS_SUBMIT_JSON_PATH) => {
            let request: JsonPayloadRequest = match read_body(&gateway, req, "logs").await {
                Ok(request) => request,
                Err(response) => return response,
            };
            gated_response(gateway.submit_logs_json(request.payload).await)
        }
        (&Method::POST, LOGS_SUBMIT_RAW_PATH) => {
            let request: LogsRawRequest = match read_body(&gateway, req, "logs").await {
                Ok(request) => request,
                Err(response) => return response,
            };
            gated_response(gateway.submit_logs_raw(request).await)
        }
        (&Method::POST, AGENT_FILE_SUBMIT_PATH) => {
            let request: AgentFileLogRequest =
                match read_body(&gateway, req, "agent file").await {
                    Ok(request) => request,
                    Err(response) => return response,
                };
            outcome_response(&gateway.write_agent_file(request).await)
        }
        (&Method::GET, AGENT_FILE_RECENT_PATH) => recent_lines_handler(&gateway, &query).await,
        (&Method::POST, AGENT_FILE_CLEAR_PATH) => {
            let file_logger = Arc::clone(gateway.file_logger());
            match tokio::task::spawn_blocking(move || file_logger.clear()).await {
                Ok(outcome) => outcome_response(&outcome),
                Err(e) => log_and_create_http_response(
                    &format!("Error clearing agent log file: {e}"),
                    StatusCode::INTERNAL_SERVER_ERROR,
                ),
            }
        }

        (&Method::POST, EVENTS_V1_SUBMIT_PATH) => {
            let request: JsonPayloadRequest = match read_body(&gateway, req, "event").await {
                Ok(request) => request,
                Err(response) => return response,
            };
            gated_response(gateway.submit_event_v1(request.payload).await)
        }
        (&Method::POST, EVENTS_V2_SUBMIT_PATH) => {
            let request: JsonPayloadRequest = match read_body(&gateway, req, "event").await {
                Ok(request) => request,
                Err(response) => return response,
            };
            gated_response(gateway.submit_event_v2(request.payload).await)
        }

        (&Method::GET, HISTORY_PATH) => history_list_handler(&gateway, &query),
        (&Method::DELETE, HISTORY_PATH) => {
            gateway.history().clear();
            json_response(StatusCode::OK, &json!({ "message": "History cleared" }))
        }
        (&Method::GET, HISTORY_EXPORT_PATH) => match gateway.history().export_json() {
            Ok(exported) => Response::builder()
                .status(StatusCode::OK)
                .header(hyper::header::CONTENT_TYPE, "application/json")
                .body(http_body_util::Full::new(bytes::Bytes::from(exported))),
            Err(e) => log_and_create_http_response(
                &format!("Error exporting history: {e}"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        },
        (&Method::GET, p) if p.starts_with("/api/history/") => {
            let id = &p["/api/history/".len()..];
            match gateway.history().get(id) {
                Some(entry) => json_response(StatusCode::OK, entry.as_ref()),
                None => json_response(
                    StatusCode::NOT_FOUND,
                    &json!({ "message": "Entry not found" }),
                ),
            }
        }

        _ => {
            debug!("No route for {method} {path}");
            json_response(StatusCode::NOT_FOUND, &json!({ "message": "Not found" }))
        }
    }
}

async fn read_body<T, B>(
    gateway: &Gateway,
    req: Request<B>,
    kind: &str,
) -> Result<T, http::Result<HttpResponse>>
where
    T: DeserializeOwned,
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    read_json_body(
        req,
        gateway.config().max_payload_bytes(),
        &format!("Error processing {kind} request"),
    )
    .await
}

fn outcome_response(outcome: &Outcome) -> http::Result<HttpResponse> {
    json_response(StatusCode::OK, outcome)
}

fn gated_response(result: Result<Outcome, GatewayError>) -> http::Result<HttpResponse> {
    match result {
        Ok(outcome) => outcome_response(&outcome),
        Err(err) => {
            warn!("Request rejected before dispatch: {err}");
            json_response(StatusCode::BAD_REQUEST, &Outcome::from(err))
        }
    }
}

fn health_handler(gateway: &Gateway) -> http::Result<HttpResponse> {
    json_response(
        StatusCode::OK,
        &json!({
            "status": "healthy",
            "configured": gateway.api_key_factory().is_configured(),
            "dd_site": gateway.config().site,
        }),
    )
}

fn config_handler(gateway: &Gateway) -> http::Result<HttpResponse> {
    let config = gateway.config();
    let api_key_factory = gateway.api_key_factory();
    json_response(
        StatusCode::OK,
        &json!({
            "is_configured": api_key_factory.is_configured(),
            "masked_api_key": api_key_factory.masked(),
            "dd_site": config.site,
            "dd_agent_host": config.agent_host,
            "dogstatsd_port": config.dogstatsd_port,
            "log_path": config.log_path.display().to_string(),
            "default_tags": config.default_tags,
            "max_requests_per_second": config.max_requests_per_second,
            "max_payload_size_mb": config.max_payload_size_mb,
            "max_history_items": gateway.history().capacity(),
        }),
    )
}

async fn recent_lines_handler(
    gateway: &Gateway,
    query: &HashMap<String, String>,
) -> http::Result<HttpResponse> {
    let n = match query.get("n").map(|n| n.parse::<usize>()) {
        None => DEFAULT_RECENT_LINES,
        Some(Ok(n)) => n,
        Some(Err(e)) => {
            return log_and_create_http_response(
                &format!("Invalid value for n: {e}"),
                StatusCode::BAD_REQUEST,
            )
        }
    };
    let file_logger = Arc::clone(gateway.file_logger());
    let path = file_logger.log_path().display().to_string();
    let lines = match tokio::task::spawn_blocking(move || file_logger.recent_lines(n)).await {
        Ok(lines) => lines,
        Err(e) => {
            error!("Reading agent log file failed: {e}");
            Vec::new()
        }
    };
    json_response(
        StatusCode::OK,
        &json!({ "path": path, "count": lines.len(), "lines": lines }),
    )
}

fn history_list_handler(
    gateway: &Gateway,
    query: &HashMap<String, String>,
) -> http::Result<HttpResponse> {
    let limit = match query.get("limit").map(|l| l.parse::<usize>()) {
        None => None,
        Some(Ok(0)) => None,
        Some(Ok(limit)) => Some(limit),
        Some(Err(e)) => {
            return log_and_create_http_response(
                &format!("Invalid value for limit: {e}"),
                StatusCode::BAD_REQUEST,
            )
        }
    };
    let entry_type = match query.get("entry_type").filter(|t| !t.is_empty()) {
        None => None,
        Some(t) => match t.parse::<HistoryEntryType>() {
            Ok(t) => Some(t),
            Err(message) => {
                return log_and_create_http_response(&message, StatusCode::BAD_REQUEST)
            }
        },
    };
    let entries = gateway.history().list(limit, entry_type);
    let entries: Vec<_> = entries.iter().map(AsRef::as_ref).collect();
    json_response(StatusCode::OK, &entries)
}

fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

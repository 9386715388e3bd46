// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::{
    body::Body,
    header,
    http::{self, HeaderMap, HeaderValue},
    Request, Response, StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tracing::{debug, error};

pub type HttpResponse = Response<Full<Bytes>>;

/// Does two things:
/// 1. Logs the given message. A success status code (within 200-299) will cause a debug log to
///    be written, otherwise error will be written.
/// 2. Returns the given message in the body of JSON response with the given status code.
///
/// Response body format:
/// {
///     "message": message
/// }
pub fn log_and_create_http_response(
    message: &str,
    status: StatusCode,
) -> http::Result<HttpResponse> {
    if status.is_success() {
        debug!("{message}");
    } else {
        error!("{message}");
    }
    json_response(status, &json!({ "message": message }))
}

/// Serializes `body` as the JSON response with the given status code.
pub fn json_response<T: Serialize + ?Sized>(
    status: StatusCode,
    body: &T,
) -> http::Result<HttpResponse> {
    match serde_json::to_vec(body) {
        Ok(body) => Response::builder()
            .status(status)
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )
            .body(Full::new(Bytes::from(body))),
        Err(e) => {
            error!("Unable to serialize response body: {e}");
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::new()))
        }
    }
}

/// Takes a request's header map and verifies that a "content-length" header, when present, is
/// valid and not larger than the given max_content_length. Bodies without the header are bounded
/// while they are read.
///
/// Will return None if no issues are found. Otherwise logs an error (with the given prefix) and
/// returns an HTTP Response with the appropriate error status code.
pub fn verify_request_content_length(
    header_map: &HeaderMap,
    max_content_length: usize,
    error_message_prefix: &str,
) -> Option<http::Result<HttpResponse>> {
    let content_length_header = header_map.get(header::CONTENT_LENGTH)?;
    let Some(content_length) = content_length_header
        .to_str()
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
    else {
        return Some(log_and_create_http_response(
            &format!("{error_message_prefix}: Invalid Content-Length header"),
            StatusCode::BAD_REQUEST,
        ));
    };
    if content_length > max_content_length {
        return Some(log_and_create_http_response(
            &format!("{error_message_prefix}: Payload too large"),
            StatusCode::PAYLOAD_TOO_LARGE,
        ));
    }
    None
}

/// Reads at most `max_content_length` bytes of the request body and decodes them as JSON.
///
/// On failure the error holds the response to send back: 413 for oversized bodies, 400 for
/// unreadable or malformed ones.
pub async fn read_json_body<T, B>(
    request: Request<B>,
    max_content_length: usize,
    error_message_prefix: &str,
) -> Result<T, http::Result<HttpResponse>>
where
    T: DeserializeOwned,
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = request.into_parts();
    if let Some(response) =
        verify_request_content_length(&parts.headers, max_content_length, error_message_prefix)
    {
        return Err(response);
    }

    let bytes = match Limited::new(body, max_content_length).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return Err(log_and_create_http_response(
                &format!("{error_message_prefix}: Payload too large"),
                StatusCode::PAYLOAD_TOO_LARGE,
            ));
        }
        Err(e) => {
            return Err(log_and_create_http_response(
                &format!("{error_message_prefix}: Error reading request body: {e}"),
                StatusCode::BAD_REQUEST,
            ));
        }
    };

    serde_json::from_slice(&bytes).map_err(|e| {
        log_and_create_http_response(
            &format!("{error_message_prefix}: Invalid JSON body: {e}"),
            StatusCode::BAD_REQUEST,
        )
    })
}

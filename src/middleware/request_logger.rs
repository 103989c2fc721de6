use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use uuid::Uuid;

use crate::utils::sanitize::sanitize_json;

const MAX_BODY_LOG_SIZE: usize = 64 * 1024;
/// Matches axum's default body limit, so buffering never rejects a body the
/// handler would have accepted.
const MAX_BUFFERED_BODY: usize = 2 * 1024 * 1024;
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Logs every request and response with a generated request id.
/// When `log_body` is set, the body is buffered and logged with sensitive
/// fields masked; form bodies are decoded into a JSON object first.
pub async fn request_logger_middleware(
    State(log_body): State<bool>,
    mut req: Request,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let header_value = HeaderValue::from_str(&request_id).ok();
    let method = req.method().clone();
    let uri = req.uri().path().to_string();
    let start = Instant::now();

    if let Some(value) = header_value.clone() {
        req.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    if log_body {
        let oversize = req
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|len| *len > MAX_BUFFERED_BODY as u64);

        if let Some(declared_len) = oversize {
            tracing::info!(
                request_id = %request_id,
                method = %method,
                uri = %uri,
                body_size = declared_len,
                body = "[not logged: too large]",
                "Incoming request"
            );
        } else {
            let (parts, body) = req.into_parts();
            let body = match axum::body::to_bytes(body, MAX_BUFFERED_BODY).await {
                Ok(bytes) => {
                    tracing::info!(
                        request_id = %request_id,
                        method = %method,
                        uri = %uri,
                        body_size = bytes.len(),
                        body = %loggable_body(&bytes),
                        "Incoming request"
                    );
                    Body::from(bytes)
                }
                Err(e) => {
                    // The stream is spent; downstream sees an empty body.
                    tracing::warn!(
                        request_id = %request_id,
                        method = %method,
                        uri = %uri,
                        error = %e,
                        "Request body could not be buffered for logging"
                    );
                    Body::empty()
                }
            };
            req = Request::from_parts(parts, body);
        }
    } else {
        tracing::info!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            "Incoming request"
        );
    }

    let response = next.run(req).await;

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "Outgoing response"
    );

    let (mut parts, body) = response.into_parts();
    if let Some(value) = header_value {
        parts.headers.insert(REQUEST_ID_HEADER, value);
    }
    Response::from_parts(parts, body)
}

fn loggable_body(bytes: &[u8]) -> String {
    if bytes.len() > MAX_BODY_LOG_SIZE {
        return format!("[not logged: {} bytes]", bytes.len());
    }
    sanitized_body(bytes)
}

fn sanitized_body(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(bytes) {
        return sanitize_json(&json).to_string();
    }
    let fields: serde_json::Map<String, serde_json::Value> = url::form_urlencoded::parse(bytes)
        .map(|(k, v)| (k.into_owned(), serde_json::Value::String(v.into_owned())))
        .collect();
    if fields.is_empty() {
        format!("[unparsed, {} bytes]", bytes.len())
    } else {
        sanitize_json(&serde_json::Value::Object(fields)).to_string()
    }
}

//! The 3-D Secure callback endpoint.
//!
//! Accepts browser redirects (GET query or form POST) and gateway
//! notifications (JSON POST). Always answers 200 with the result relay page;
//! failures are carried inside the page, never as an HTTP error status.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
};

use crate::callback::{InboundCallback, InboundPayload};
use crate::error::CallbackError;
use crate::relay::{OutcomeDescriptor, RelayPlan};
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

pub async fn callback(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let content_type = header_text(&headers, header::CONTENT_TYPE.as_str());
    let signature = header_text(&headers, SIGNATURE_HEADER);
    let reconciler = state.reconciler.clone();

    // Run detached so a panic deep in an adapter still yields a relay page.
    let task = tokio::spawn(async move {
        match body {
            Ok(body) => {
                let inbound = InboundCallback {
                    payload: InboundPayload::detect(
                        content_type.as_deref(),
                        query.as_deref(),
                        &body,
                    ),
                    signature_header: signature.as_deref(),
                };
                reconciler.execute(&inbound).await.descriptor
            }
            Err(rejection) => {
                reconciler
                    .reject_unreadable(rejection.body_text())
                    .await
                    .descriptor
            }
        }
    });

    let descriptor = match task.await {
        Ok(descriptor) => descriptor,
        Err(e) => {
            tracing::error!(error = %e, "Callback reconciliation task aborted");
            CallbackError::SystemError(e.to_string()).descriptor()
        }
    };

    relay_response(&state, descriptor)
}

pub fn relay_response(state: &AppState, descriptor: OutcomeDescriptor) -> Response {
    let plan = RelayPlan::new(descriptor, &state.return_base_url, state.relay_timings);
    (
        StatusCode::OK,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
            (header::REFERRER_POLICY, "no-referrer"),
        ],
        Html(plan.render()),
    )
        .into_response()
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

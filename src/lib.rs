pub mod adapters;
pub mod callback;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod ports;
pub mod relay;
pub mod startup;
pub mod use_cases;
pub mod utils;
pub mod validation;

use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use url::Url;

use crate::ports::TransactionLedger;
use crate::relay::RelayTimings;
use crate::use_cases::ReconcileCallback;

pub const CALLBACK_PATH: &str = "/payment/3ds/callback";

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn TransactionLedger>,
    pub reconciler: Arc<ReconcileCallback>,
    pub return_base_url: Url,
    pub relay_timings: RelayTimings,
    pub cors_allowed_origins: Option<String>,
    pub log_request_body: bool,
}

pub fn create_app(state: AppState) -> Router {
    let lookup = Router::new()
        .route(
            "/transactions/:conversation_id",
            get(handlers::transactions::get_transaction),
        )
        .layer(cors_layer(state.cors_allowed_origins.as_deref()));

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            CALLBACK_PATH,
            get(handlers::callback::callback).post(handlers::callback::callback),
        )
        .merge(lookup)
        .layer(axum::middleware::from_fn_with_state(
            state.log_request_body,
            middleware::request_logger::request_logger_middleware,
        ))
        .with_state(state)
}

fn cors_layer(origins: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods([Method::GET]);
    match origins.map(str::trim) {
        None | Some("") | Some("*") => layer.allow_origin(Any),
        Some(list) => {
            let origins: Vec<HeaderValue> = list
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .filter_map(|entry| HeaderValue::from_str(entry).ok())
                .collect();
            layer.allow_origin(AllowOrigin::list(origins))
        }
    }
}

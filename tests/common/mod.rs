#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request},
    Router,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use threeds_reconciler::adapters::{InMemoryAuditLog, InMemoryLedger};
use threeds_reconciler::config::GatewayMode;
use threeds_reconciler::ports::{
    ChallengeCompleter, CompleterError, Completion, CompletionRequest,
};
use threeds_reconciler::relay::RelayTimings;
use threeds_reconciler::use_cases::{ReconcileCallback, ReconcileSettings};
use threeds_reconciler::{create_app, AppState, CALLBACK_PATH};
use tower::ServiceExt;

pub const RETURN_BASE: &str = "https://shop.test/checkout/result";

#[derive(Clone, Copy)]
pub enum FakeVerdict {
    Approve,
    Decline,
    Fail,
}

/// Gateway stand-in that counts calls and can be slowed down.
pub struct FakeCompleter {
    verdict: FakeVerdict,
    delay: Duration,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeCompleter {
    pub fn new(verdict: FakeVerdict) -> Self {
        Self {
            verdict,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChallengeCompleter for FakeCompleter {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CompleterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.verdict {
            FakeVerdict::Approve => Ok(Completion::Approved {
                auth_code: Some("AUTH-1".to_string()),
                raw: json!({ "status": "success", "paymentId": request.payment_id }),
            }),
            FakeVerdict::Decline => Ok(Completion::Declined {
                error_code: "10051".to_string(),
                error_message: "Insufficient funds".to_string(),
                raw: json!({ "status": "failure", "errorCode": "10051" }),
            }),
            FakeVerdict::Fail => Err(CompleterError::Transport("connection reset".to_string())),
        }
    }
}

pub struct TestHarness {
    pub ledger: Arc<InMemoryLedger>,
    pub audit: Arc<InMemoryAuditLog>,
    pub completer: Arc<FakeCompleter>,
    pub app: Router,
}

impl TestHarness {
    pub fn new(completer: FakeCompleter) -> Self {
        Self::with_settings(completer, ReconcileSettings::default())
    }

    pub fn live(completer: FakeCompleter, secret: &str) -> Self {
        Self::with_settings(
            completer,
            ReconcileSettings {
                mode: GatewayMode::Live,
                signature_secret: Some(secret.to_string()),
                ..ReconcileSettings::default()
            },
        )
    }

    pub fn with_settings(completer: FakeCompleter, settings: ReconcileSettings) -> Self {
        Self::build(completer, settings, false)
    }

    pub fn with_body_logging(completer: FakeCompleter) -> Self {
        Self::build(completer, ReconcileSettings::default(), true)
    }

    fn build(completer: FakeCompleter, settings: ReconcileSettings, log_request_body: bool) -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let completer = Arc::new(completer);

        let reconciler = Arc::new(ReconcileCallback::new(
            ledger.clone(),
            completer.clone(),
            audit.clone(),
            settings,
        ));

        let app = create_app(AppState {
            ledger: ledger.clone(),
            reconciler,
            return_base_url: url::Url::parse(RETURN_BASE).unwrap(),
            relay_timings: RelayTimings::default(),
            cors_allowed_origins: None,
            log_request_body,
        });

        Self {
            ledger,
            audit,
            completer,
            app,
        }
    }

    /// Browser redirect delivered as a form POST.
    pub async fn post_form(&self, body: &str) -> (u16, String) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(CALLBACK_PATH)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Browser redirect delivered as a GET with a query string.
    pub async fn get_query(&self, query: &str) -> (u16, String) {
        self.send(
            Request::builder()
                .method("GET")
                .uri(format!("{}?{}", CALLBACK_PATH, query))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Server-to-server notification delivered as JSON.
    pub async fn post_json(&self, body: serde_json::Value) -> (u16, String) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(CALLBACK_PATH)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn send(&self, request: Request<Body>) -> (u16, String) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status().as_u16();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }
}

pub fn redirect_form(conversation_id: &str, payment_id: &str, md_status: &str, status: &str) -> String {
    format!(
        "conversationId={}&paymentId={}&mdStatus={}&status={}&conversationData=cd-{}",
        conversation_id, payment_id, md_status, status, conversation_id
    )
}

pub fn outcome(html: &str) -> &'static str {
    if html.contains("data-outcome=\"success\"") {
        "success"
    } else if html.contains("data-outcome=\"failure\"") {
        "failure"
    } else {
        "unknown"
    }
}

pub fn error_code_in(html: &str, code: &str) -> bool {
    html.contains(&format!("\"errorCode\":\"{}\"", code))
}

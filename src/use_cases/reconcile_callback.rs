//! Reconcile callback use case.
//! Drives one inbound 3-D Secure callback to exactly one terminal outcome:
//! normalize, validate, verify, idempotency check, classify, complete or
//! reject, persist, audit. Every path ends in an [`OutcomeDescriptor`].

use serde_json::{json, Value};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::Instrument;

use crate::callback::{
    classify, normalize, signature_check, verify_signature, Classification, InboundCallback,
    InboundPayload, NormalizeError, SignatureCheck, SignatureError,
};
use crate::config::GatewayMode;
use crate::domain::{CallbackEvent, TerminalState};
use crate::error::{CallbackError, OutcomeKind};
use crate::ports::{
    AuditLogger, ChallengeCompleter, Completion, CompletionRequest, TransactionLedger,
};
use crate::relay::OutcomeDescriptor;
use crate::utils::sanitize::sanitize_json;
use crate::validation::{missing_required_fields, validate_field_lengths};

pub const UNKNOWN_CONVERSATION: &str = "unknown";
const RAW_BODY_AUDIT_LIMIT: usize = 4096;

#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub mode: GatewayMode,
    pub signature_secret: Option<String>,
    pub ledger_timeout: Duration,
    pub gateway_timeout: Duration,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            mode: GatewayMode::Sandbox,
            signature_secret: None,
            ledger_timeout: Duration::from_secs(5),
            gateway_timeout: Duration::from_secs(15),
        }
    }
}

/// Result of reconciling one callback.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutput {
    pub descriptor: OutcomeDescriptor,
    pub kind: OutcomeKind,
    pub conversation_id: Option<String>,
}

impl ReconcileOutput {
    fn failed(err: &CallbackError, conversation_id: Option<String>) -> Self {
        Self {
            descriptor: err.descriptor(),
            kind: err.kind(),
            conversation_id,
        }
    }
}

struct Reconciled {
    descriptor: OutcomeDescriptor,
    kind: OutcomeKind,
}

/// Use case for reconciling 3-D Secure callbacks.
pub struct ReconcileCallback {
    ledger: Arc<dyn TransactionLedger>,
    completer: Arc<dyn ChallengeCompleter>,
    audit: Arc<dyn AuditLogger>,
    settings: ReconcileSettings,
}

impl ReconcileCallback {
    pub fn new(
        ledger: Arc<dyn TransactionLedger>,
        completer: Arc<dyn ChallengeCompleter>,
        audit: Arc<dyn AuditLogger>,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            ledger,
            completer,
            audit,
            settings,
        }
    }

    /// Never fails: every error is converted into a failure descriptor.
    pub async fn execute(&self, inbound: &InboundCallback<'_>) -> ReconcileOutput {
        let event = match normalize(inbound) {
            Ok(event) => event,
            Err(NormalizeError::Malformed(reason)) => {
                tracing::warn!(reason = %reason, "Rejected malformed callback payload");
                let err = CallbackError::MalformedPayload(reason);
                let output = ReconcileOutput::failed(&err, None);
                self.audit(
                    UNKNOWN_CONVERSATION,
                    json!({
                        "stage": "outcome",
                        "outcome": output.kind.label(),
                        "error": err.to_string(),
                        "body": raw_body_text(&inbound.payload),
                    }),
                )
                .await;
                return output;
            }
            Err(NormalizeError::Interim {
                conversation_id,
                status,
                raw_fields,
            }) => {
                tracing::info!(
                    conversation_id = %conversation_id,
                    status = %status,
                    "Ignoring interim gateway notification"
                );
                let err = CallbackError::InterimNotification(status);
                let output =
                    ReconcileOutput::failed(&err, Some(conversation_id.clone()).filter(|c| !c.is_empty()));
                self.audit(
                    audit_key(&conversation_id),
                    json!({
                        "stage": "outcome",
                        "source": "server_notification",
                        "outcome": output.kind.label(),
                        "fields": raw_fields,
                    }),
                )
                .await;
                return output;
            }
        };

        let span = tracing::info_span!(
            "reconcile",
            conversation_id = %event.conversation_id,
            source = event.source.as_str()
        );

        async {
            self.audit(
                audit_key(&event.conversation_id),
                json!({
                    "stage": "received",
                    "source": event.source.as_str(),
                    "fields": event.raw_fields,
                }),
            )
            .await;

            let output = match self.process(&event).await {
                Ok(reconciled) => ReconcileOutput {
                    descriptor: reconciled.descriptor,
                    kind: reconciled.kind,
                    conversation_id: Some(event.conversation_id.clone()),
                },
                Err(err) => {
                    match &err {
                        CallbackError::SystemError(detail) => {
                            tracing::error!(error = %detail, "Callback reconciliation failed")
                        }
                        other => tracing::warn!(error = %other, "Callback refused"),
                    }
                    ReconcileOutput::failed(
                        &err,
                        Some(event.conversation_id.clone()).filter(|c| !c.is_empty()),
                    )
                }
            };

            self.audit(
                audit_key(&event.conversation_id),
                json!({
                    "stage": "outcome",
                    "source": event.source.as_str(),
                    "outcome": output.kind.label(),
                    "descriptor": output.descriptor,
                    "fields": event.raw_fields,
                }),
            )
            .await;

            tracing::info!(
                outcome = output.kind.label(),
                success = output.descriptor.success,
                "Callback reconciled"
            );
            output
        }
        .instrument(span)
        .await
    }

    /// For requests whose body could not be read at all.
    pub async fn reject_unreadable(&self, reason: String) -> ReconcileOutput {
        tracing::warn!(reason = %reason, "Rejected unreadable callback body");
        let err = CallbackError::MalformedPayload(reason);
        let output = ReconcileOutput::failed(&err, None);
        self.audit(
            UNKNOWN_CONVERSATION,
            json!({
                "stage": "outcome",
                "outcome": output.kind.label(),
                "error": err.to_string(),
            }),
        )
        .await;
        output
    }

    async fn process(&self, event: &CallbackEvent) -> Result<Reconciled, CallbackError> {
        let missing = missing_required_fields(event);
        if !missing.is_empty() {
            return Err(CallbackError::MissingParameters(missing));
        }
        validate_field_lengths(event)
            .map_err(|e| CallbackError::MalformedPayload(e.to_string()))?;

        self.verify(event)?;

        let existing = self
            .ledger_call(self.ledger.find_by_conversation_id(&event.conversation_id))
            .await?
            .ok_or_else(|| CallbackError::TransactionNotFound(event.conversation_id.clone()))?;

        if let Some(recorded) = OutcomeDescriptor::from_transaction(&existing) {
            tracing::info!(
                status = %existing.status,
                "Duplicate delivery; replaying recorded outcome"
            );
            return Ok(Reconciled {
                descriptor: recorded,
                kind: OutcomeKind::DuplicateDelivery,
            });
        }

        let classification = classify(&event.md_status, &event.status);
        tracing::debug!(
            md_status = %event.md_status,
            classification = classification.label(),
            "Classified authentication result"
        );

        let (terminal, kind) = match classification {
            Classification::Proceed => self.complete(event).await?,
            Classification::Reject { code, reason } | Classification::Malformed { code, reason } => (
                TerminalState::Failure {
                    payment_id: Some(event.payment_id.clone()),
                    error_code: code.clone(),
                    error_message: reason,
                    gateway_response: None,
                },
                OutcomeKind::ThreeDsRejected(code),
            ),
        };

        let applied = self
            .ledger_call(
                self.ledger
                    .transition_if_pending(&event.conversation_id, &terminal),
            )
            .await?;

        if !applied {
            // Another delivery reached a terminal state first.
            let current = self
                .ledger_call(self.ledger.find_by_conversation_id(&event.conversation_id))
                .await?
                .ok_or_else(|| CallbackError::TransactionNotFound(event.conversation_id.clone()))?;
            let recorded = OutcomeDescriptor::from_transaction(&current).ok_or_else(|| {
                CallbackError::SystemError(
                    "conditional update refused but transaction is still pending".to_string(),
                )
            })?;
            tracing::info!(status = %current.status, "Lost terminal-transition race; replaying winner");
            return Ok(Reconciled {
                descriptor: recorded,
                kind: OutcomeKind::DuplicateDelivery,
            });
        }

        let descriptor = match &terminal {
            TerminalState::Success { payment_id, .. } => {
                OutcomeDescriptor::success(existing.order_number.clone(), payment_id.clone())
            }
            TerminalState::Failure {
                payment_id,
                error_code,
                error_message,
                ..
            } => OutcomeDescriptor::failure(error_code.clone(), error_message.clone())
                .with_order(existing.order_number.clone(), payment_id.clone()),
        };

        Ok(Reconciled { descriptor, kind })
    }

    fn verify(&self, event: &CallbackEvent) -> Result<(), CallbackError> {
        match signature_check(
            self.settings.mode,
            self.settings.signature_secret.as_deref(),
            event,
        ) {
            SignatureCheck::Enforce(secret) => verify_signature(secret, event)
                .map_err(|e| CallbackError::InvalidSignature(e.to_string())),
            SignatureCheck::Skip => {
                tracing::debug!("Signature verification skipped in sandbox mode");
                Ok(())
            }
            SignatureCheck::Refuse => Err(CallbackError::InvalidSignature(
                SignatureError::SecretNotConfigured.to_string(),
            )),
        }
    }

    async fn complete(
        &self,
        event: &CallbackEvent,
    ) -> Result<(TerminalState, OutcomeKind), CallbackError> {
        let request = CompletionRequest {
            payment_id: event.payment_id.clone(),
            conversation_id: event.conversation_id.clone(),
            conversation_data: event.conversation_data.clone(),
        };

        let completion = match timeout(self.settings.gateway_timeout, self.completer.complete(&request)).await {
            Ok(Ok(completion)) => completion,
            Ok(Err(e)) => return Err(CallbackError::SystemError(e.to_string())),
            Err(_) => {
                return Err(CallbackError::SystemError(
                    "gateway completion timed out".to_string(),
                ))
            }
        };

        Ok(match completion {
            Completion::Approved { auth_code, raw } => {
                tracing::info!(
                    payment_id = %event.payment_id,
                    auth_code = auth_code.as_deref().unwrap_or("-"),
                    "Gateway approved challenge completion"
                );
                (
                    TerminalState::Success {
                        payment_id: event.payment_id.clone(),
                        gateway_response: raw,
                    },
                    OutcomeKind::Completed,
                )
            }
            Completion::Declined {
                error_code,
                error_message,
                raw,
            } => {
                tracing::warn!(
                    payment_id = %event.payment_id,
                    error_code = %error_code,
                    "Gateway declined challenge completion"
                );
                (
                    TerminalState::Failure {
                        payment_id: Some(event.payment_id.clone()),
                        error_code: error_code.clone(),
                        error_message,
                        gateway_response: Some(raw),
                    },
                    OutcomeKind::GatewayCompletionFailed(error_code),
                )
            }
        })
    }

    async fn ledger_call<T, E, F>(&self, call: F) -> Result<T, CallbackError>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        match timeout(self.settings.ledger_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CallbackError::SystemError(format!("ledger: {}", e))),
            Err(_) => Err(CallbackError::SystemError(
                "ledger call timed out".to_string(),
            )),
        }
    }

    /// Fire-and-forget: audit failures are reported to the log, never propagated.
    async fn audit(&self, conversation_id: &str, payload: Value) {
        match timeout(
            self.settings.ledger_timeout,
            self.audit.log_callback(conversation_id, &payload),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(
                conversation_id = %conversation_id,
                error = %e,
                payload = %sanitize_json(&payload),
                "Audit log write failed"
            ),
            Err(_) => tracing::warn!(
                conversation_id = %conversation_id,
                payload = %sanitize_json(&payload),
                "Audit log write timed out"
            ),
        }
    }
}

fn audit_key(conversation_id: &str) -> &str {
    if conversation_id.is_empty() {
        UNKNOWN_CONVERSATION
    } else {
        conversation_id
    }
}

fn raw_body_text(payload: &InboundPayload<'_>) -> String {
    let bytes = match payload {
        InboundPayload::Form(bytes) | InboundPayload::Json(bytes) => *bytes,
    };
    let limit = bytes.len().min(RAW_BODY_AUDIT_LIMIT);
    String::from_utf8_lossy(&bytes[..limit]).into_owned()
}

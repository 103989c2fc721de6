use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::ports::LedgerError;
use crate::relay::OutcomeDescriptor;

/// Errors of the JSON support endpoints. The callback endpoint never returns
/// these; it renders every failure through the result relay instead.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Ledger(LedgerError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

pub const GENERIC_CALLBACK_MESSAGE: &str = "The payment result could not be processed.";
pub const SYSTEM_ERROR_MESSAGE: &str = "An unexpected error occurred while finalizing the payment.";

/// Every way a callback can end, including the non-error short-circuits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeKind {
    Completed,
    DuplicateDelivery,
    ThreeDsRejected(String),
    GatewayCompletionFailed(String),
    MalformedPayload,
    MissingParameters,
    InvalidSignature,
    InterimNotification,
    TransactionNotFound,
    SystemError,
}

impl OutcomeKind {
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeKind::Completed => "completed",
            OutcomeKind::DuplicateDelivery => "duplicate_delivery",
            OutcomeKind::ThreeDsRejected(_) => "threeds_rejected",
            OutcomeKind::GatewayCompletionFailed(_) => "gateway_completion_failed",
            OutcomeKind::MalformedPayload => "malformed_payload",
            OutcomeKind::MissingParameters => "missing_parameters",
            OutcomeKind::InvalidSignature => "invalid_signature",
            OutcomeKind::InterimNotification => "interim_notification",
            OutcomeKind::TransactionNotFound => "transaction_not_found",
            OutcomeKind::SystemError => "system_error",
        }
    }
}

/// Callback failures that end processing before a terminal ledger write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Missing parameters: {}", .0.join(", "))]
    MissingParameters(Vec<&'static str>),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Interim notification with status {0}")]
    InterimNotification(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("System error: {0}")]
    SystemError(String),
}

impl CallbackError {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            CallbackError::MalformedPayload(_) => OutcomeKind::MalformedPayload,
            CallbackError::MissingParameters(_) => OutcomeKind::MissingParameters,
            CallbackError::InvalidSignature(_) => OutcomeKind::InvalidSignature,
            CallbackError::InterimNotification(_) => OutcomeKind::InterimNotification,
            CallbackError::TransactionNotFound(_) => OutcomeKind::TransactionNotFound,
            CallbackError::SystemError(_) => OutcomeKind::SystemError,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            CallbackError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            CallbackError::MissingParameters(_) => "MISSING_PARAMETERS",
            CallbackError::InvalidSignature(_) => "INVALID_SIGNATURE",
            CallbackError::InterimNotification(_) => "NOTIFICATION_IGNORED",
            CallbackError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            CallbackError::SystemError(_) => "SYSTEM_ERROR",
        }
    }

    /// Browser-facing descriptor. Internal detail stays in the logs.
    pub fn descriptor(&self) -> OutcomeDescriptor {
        let message = match self {
            CallbackError::SystemError(_) => SYSTEM_ERROR_MESSAGE,
            _ => GENERIC_CALLBACK_MESSAGE,
        };
        OutcomeDescriptor::failure(self.error_code(), message)
    }
}

impl From<LedgerError> for CallbackError {
    fn from(err: LedgerError) -> Self {
        CallbackError::SystemError(err.to_string())
    }
}

//! Ports: the seams between the reconciler and its external collaborators.
//! Adapters in `crate::adapters` implement these against Postgres, the
//! payment gateway's HTTP API, or in-memory state for tests.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::{Order, OrderStatus, PaymentStatus, TerminalState, Transaction};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Durable store for transactions and their orders.
#[async_trait]
pub trait TransactionLedger: Send + Sync {
    async fn find_by_conversation_id(&self, conversation_id: &str)
        -> LedgerResult<Option<Transaction>>;

    async fn find_order(&self, order_number: &str) -> LedgerResult<Option<Order>>;

    /// Moves a PENDING transaction to `terminal` and updates its order in the
    /// same unit of work. Returns `false` without writing anything when the
    /// transaction is already terminal.
    async fn transition_if_pending(
        &self,
        conversation_id: &str,
        terminal: &TerminalState,
    ) -> LedgerResult<bool>;

    async fn update_order(
        &self,
        order_number: &str,
        status: OrderStatus,
        payment_status: PaymentStatus,
    ) -> LedgerResult<()>;

    async fn ping(&self) -> LedgerResult<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub payment_id: String,
    pub conversation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_data: Option<String>,
}

/// Gateway verdict on finishing a 3-D Secure challenge.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Approved {
        auth_code: Option<String>,
        raw: serde_json::Value,
    },
    Declined {
        error_code: String,
        error_message: String,
        raw: serde_json::Value,
    },
}

#[derive(Debug, Error)]
pub enum CompleterError {
    #[error("Gateway request failed: {0}")]
    Transport(String),

    #[error("Gateway did not answer in time")]
    Timeout,

    #[error("Invalid response from gateway: {0}")]
    InvalidResponse(String),

    #[error("Circuit breaker open: {0}")]
    CircuitOpen(String),
}

#[async_trait]
pub trait ChallengeCompleter: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CompleterError>;
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit sink failed: {0}")]
    Sink(String),
}

/// Append-only record of every callback received.
#[async_trait]
pub trait AuditLogger: Send + Sync {
    async fn log_callback(
        &self,
        conversation_id: &str,
        payload: &serde_json::Value,
    ) -> Result<(), AuditError>;
}

//! Transaction domain entity.
//! One record per payment attempt, keyed by the conversation id chosen at checkout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::order::{OrderStatus, PaymentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failure,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Success => "SUCCESS",
            TransactionStatus::Failure => "FAILURE",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransactionStatus::Pending),
            "SUCCESS" => Ok(TransactionStatus::Success),
            "FAILURE" => Ok(TransactionStatus::Failure),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

/// Domain entity representing a payment attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub conversation_id: String,
    pub order_number: String,
    pub status: TransactionStatus,
    pub payment_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub gateway_response: Option<serde_json::Value>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// A fresh attempt, as created when checkout hands the customer to the gateway.
    pub fn pending(conversation_id: impl Into<String>, order_number: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.into(),
            order_number: order_number.into(),
            status: TransactionStatus::Pending,
            payment_id: None,
            error_code: None,
            error_message: None,
            gateway_response: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a terminal transition in place. Returns `false` and leaves the
    /// record untouched if it is no longer pending.
    pub fn apply(&mut self, terminal: &TerminalState, at: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = terminal.status();
        match terminal {
            TerminalState::Success {
                payment_id,
                gateway_response,
            } => {
                self.payment_id = Some(payment_id.clone());
                self.gateway_response = Some(gateway_response.clone());
            }
            TerminalState::Failure {
                payment_id,
                error_code,
                error_message,
                gateway_response,
            } => {
                if payment_id.is_some() {
                    self.payment_id = payment_id.clone();
                }
                self.error_code = Some(error_code.clone());
                self.error_message = Some(error_message.clone());
                self.gateway_response = gateway_response.clone();
            }
        }
        self.completed_at = Some(at);
        self.updated_at = at;
        true
    }
}

/// The single mutation a pending transaction ever receives.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalState {
    Success {
        payment_id: String,
        gateway_response: serde_json::Value,
    },
    Failure {
        payment_id: Option<String>,
        error_code: String,
        error_message: String,
        gateway_response: Option<serde_json::Value>,
    },
}

impl TerminalState {
    pub fn status(&self) -> TransactionStatus {
        match self {
            TerminalState::Success { .. } => TransactionStatus::Success,
            TerminalState::Failure { .. } => TransactionStatus::Failure,
        }
    }

    /// Order state is derived from the transaction outcome, never set independently.
    pub fn order_state(&self) -> (OrderStatus, PaymentStatus) {
        order_state_for(self.status())
    }
}

pub fn order_state_for(status: TransactionStatus) -> (OrderStatus, PaymentStatus) {
    match status {
        TransactionStatus::Pending => (OrderStatus::Pending, PaymentStatus::Awaiting),
        TransactionStatus::Success => (OrderStatus::Completed, PaymentStatus::Paid),
        TransactionStatus::Failure => (OrderStatus::Cancelled, PaymentStatus::Failed),
    }
}

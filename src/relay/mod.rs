//! Result Relay: pushes the final payment outcome into the browsing context
//! that started the 3-D Secure flow.
//!
//! The relay is a fan-out of independent [`Transport`]s plus a fixed
//! [`ScheduledTask`] timeline. Each transport is attempted on its own and a
//! failing one never prevents the others. The timeline guarantees forward
//! progress (resolved UI, forced navigation, forced close) even when every
//! transport is blocked by the browser.

pub mod page;

use serde::Serialize;
use std::time::Duration;
use url::Url;

use crate::domain::{Transaction, TransactionStatus};

pub const RESULT_MESSAGE_TYPE: &str = "threeds-result";
pub const ACK_MESSAGE_TYPE: &str = "threeds-ack";
pub const STORAGE_KEY: &str = "threeds_result";
pub const BROADCAST_CHANNEL: &str = "threeds_result";
pub const WINDOW_NAME_PREFIX: &str = "threeds-result:";

/// What the browser is told about the payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeDescriptor {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl OutcomeDescriptor {
    pub fn success(order_number: impl Into<String>, payment_id: impl Into<String>) -> Self {
        Self {
            success: true,
            order_number: Some(order_number.into()),
            payment_id: Some(payment_id.into()),
            error_code: None,
            error_message: None,
        }
    }

    pub fn failure(error_code: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            order_number: None,
            payment_id: None,
            error_code: Some(error_code.into()),
            error_message: Some(error_message.into()),
        }
    }

    pub fn with_order(mut self, order_number: impl Into<String>, payment_id: Option<String>) -> Self {
        self.order_number = Some(order_number.into());
        self.payment_id = payment_id.filter(|p| !p.is_empty());
        self
    }

    /// The outcome already recorded on a terminal transaction.
    pub fn from_transaction(tx: &Transaction) -> Option<Self> {
        match tx.status {
            TransactionStatus::Pending => None,
            TransactionStatus::Success => Some(Self::success(
                tx.order_number.clone(),
                tx.payment_id.clone().unwrap_or_default(),
            )),
            TransactionStatus::Failure => Some(
                Self::failure(
                    tx.error_code.clone().unwrap_or_else(|| "PAYMENT_FAILED".to_string()),
                    tx.error_message
                        .clone()
                        .unwrap_or_else(|| "Payment failed".to_string()),
                )
                .with_order(tx.order_number.clone(), tx.payment_id.clone()),
            ),
        }
    }
}

/// One independent way of reaching the initiating context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// `postMessage` to the hosting parent, repeated for late listeners.
    ParentMessage { repeats: u32, interval: Duration },
    /// Same-origin storage write followed by a change notification.
    SharedStorage { key: &'static str },
    BroadcastChannel { name: &'static str },
    /// Descriptor encoded into the `window.name` of parent, opener and self.
    WindowName { value: String },
    /// Popup flow: message the opener, then close this window.
    OpenerMessage { close_after: Duration },
}

impl Transport {
    pub fn name(&self) -> &'static str {
        match self {
            Transport::ParentMessage { .. } => "parent_message",
            Transport::SharedStorage { .. } => "shared_storage",
            Transport::BroadcastChannel { .. } => "broadcast_channel",
            Transport::WindowName { .. } => "window_name",
            Transport::OpenerMessage { .. } => "opener_message",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledAction {
    ResolveUi,
    NavigateToReturnPath,
    CloseContext,
}

impl ScheduledAction {
    pub fn name(&self) -> &'static str {
        match self {
            ScheduledAction::ResolveUi => "resolve_ui",
            ScheduledAction::NavigateToReturnPath => "navigate",
            ScheduledAction::CloseContext => "close",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTask {
    pub after: Duration,
    pub action: ScheduledAction,
    /// Cancelled once the host acknowledges delivery; the action then runs immediately.
    pub cancel_on_ack: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayTimings {
    pub parent_repeats: u32,
    pub parent_interval: Duration,
    pub popup_close_after: Duration,
    pub resolve_ui_after: Duration,
    pub navigate_after: Duration,
    pub close_after: Duration,
}

impl Default for RelayTimings {
    fn default() -> Self {
        Self {
            parent_repeats: 5,
            parent_interval: Duration::from_millis(200),
            popup_close_after: Duration::from_millis(1000),
            resolve_ui_after: Duration::from_millis(1500),
            navigate_after: Duration::from_millis(5000),
            close_after: Duration::from_millis(8000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayPlan {
    pub descriptor: OutcomeDescriptor,
    pub return_url: Url,
    pub transports: Vec<Transport>,
    pub schedule: Vec<ScheduledTask>,
}

impl RelayPlan {
    pub fn new(descriptor: OutcomeDescriptor, return_base: &Url, timings: RelayTimings) -> Self {
        let return_url = return_url(return_base, &descriptor);
        let window_name = window_name_value(&descriptor);

        let transports = vec![
            Transport::ParentMessage {
                repeats: timings.parent_repeats,
                interval: timings.parent_interval,
            },
            Transport::SharedStorage { key: STORAGE_KEY },
            Transport::BroadcastChannel {
                name: BROADCAST_CHANNEL,
            },
            Transport::WindowName { value: window_name },
            Transport::OpenerMessage {
                close_after: timings.popup_close_after,
            },
        ];

        let schedule = vec![
            ScheduledTask {
                after: timings.resolve_ui_after,
                action: ScheduledAction::ResolveUi,
                cancel_on_ack: true,
            },
            ScheduledTask {
                after: timings.navigate_after,
                action: ScheduledAction::NavigateToReturnPath,
                cancel_on_ack: false,
            },
            ScheduledTask {
                after: timings.close_after,
                action: ScheduledAction::CloseContext,
                cancel_on_ack: false,
            },
        ];

        Self {
            descriptor,
            return_url,
            transports,
            schedule,
        }
    }

    /// Latest point at which the page is guaranteed to have left the spinner.
    pub fn forward_progress_deadline(&self) -> Duration {
        self.schedule
            .iter()
            .map(|task| task.after)
            .max()
            .unwrap_or_default()
    }

    /// Origin that posted messages are addressed to.
    pub fn target_origin(&self) -> String {
        self.return_url.origin().ascii_serialization()
    }

    pub fn render(&self) -> String {
        page::render(self)
    }
}

pub fn return_url(base: &Url, descriptor: &OutcomeDescriptor) -> Url {
    let mut url = base.clone();
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("status", if descriptor.success { "success" } else { "failure" });
        if let Some(order_number) = &descriptor.order_number {
            query.append_pair("orderNumber", order_number);
        }
        if let Some(payment_id) = &descriptor.payment_id {
            query.append_pair("paymentId", payment_id);
        }
        if let Some(error_code) = &descriptor.error_code {
            query.append_pair("errorCode", error_code);
        }
    }
    url
}

pub fn window_name_value(descriptor: &OutcomeDescriptor) -> String {
    use base64::Engine;

    let json = serde_json::to_string(descriptor).unwrap_or_else(|_| "{}".to_string());
    format!(
        "{}{}",
        WINDOW_NAME_PREFIX,
        base64::engine::general_purpose::STANDARD.encode(json)
    )
}

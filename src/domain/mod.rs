//! Domain layer: framework-agnostic entities for the payment callback flow.

pub mod event;
pub mod order;
pub mod transaction;

pub use event::{CallbackEvent, CallbackSource};
pub use order::{Order, OrderStatus, PaymentStatus};
pub use transaction::{order_state_for, TerminalState, Transaction, TransactionStatus};

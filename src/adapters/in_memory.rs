//! In-memory ledger and audit log.
//!
//! A single mutex guards transactions and orders together, so a terminal
//! transition and its order update are observed as one step, mirroring the
//! SQL transaction used by the Postgres adapter. Read and write counters let
//! tests assert that a callback never reached the ledger.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::domain::{Order, OrderStatus, PaymentStatus, TerminalState, Transaction};
use crate::ports::{AuditError, AuditLogger, LedgerError, LedgerResult, TransactionLedger};

#[derive(Default)]
struct LedgerState {
    transactions: HashMap<String, Transaction>,
    orders: HashMap<String, Order>,
}

#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending attempt and a fresh order for it.
    pub fn seed(&self, tx: Transaction) {
        if let Ok(mut state) = self.state.lock() {
            state
                .orders
                .entry(tx.order_number.clone())
                .or_insert_with(|| Order::new(tx.order_number.clone()));
            state.transactions.insert(tx.conversation_id.clone(), tx);
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn accesses(&self) -> usize {
        self.reads() + self.writes()
    }

    /// Makes every subsequent call fail, as a lost database connection would.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delays every subsequent trait call, as a slow database would.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    async fn simulate_latency(&self) {
        let millis = self.latency_ms.load(Ordering::SeqCst);
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    /// Uncounted snapshot for assertions.
    pub fn transaction(&self, conversation_id: &str) -> Option<Transaction> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.transactions.get(conversation_id).cloned())
    }

    pub fn order(&self, order_number: &str) -> Option<Order> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.orders.get(order_number).cloned())
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, LedgerState>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("in-memory ledger offline".to_string()));
        }
        self.state
            .lock()
            .map_err(|_| LedgerError::Unavailable("ledger lock poisoned".to_string()))
    }
}

#[async_trait]
impl TransactionLedger for InMemoryLedger {
    async fn find_by_conversation_id(
        &self,
        conversation_id: &str,
    ) -> LedgerResult<Option<Transaction>> {
        self.simulate_latency().await;
        self.reads.fetch_add(1, Ordering::SeqCst);
        let state = self.lock()?;
        Ok(state.transactions.get(conversation_id).cloned())
    }

    async fn find_order(&self, order_number: &str) -> LedgerResult<Option<Order>> {
        self.simulate_latency().await;
        self.reads.fetch_add(1, Ordering::SeqCst);
        let state = self.lock()?;
        Ok(state.orders.get(order_number).cloned())
    }

    async fn transition_if_pending(
        &self,
        conversation_id: &str,
        terminal: &TerminalState,
    ) -> LedgerResult<bool> {
        self.simulate_latency().await;
        let mut state = self.lock()?;
        let now = Utc::now();

        let order_number = match state.transactions.get(conversation_id) {
            None => return Err(LedgerError::NotFound(conversation_id.to_string())),
            Some(tx) if tx.status.is_terminal() => return Ok(false),
            Some(tx) => tx.order_number.clone(),
        };
        if !state.orders.contains_key(&order_number) {
            return Err(LedgerError::NotFound(format!("order {}", order_number)));
        }

        let (order_status, payment_status) = terminal.order_state();
        if let Some(tx) = state.transactions.get_mut(conversation_id) {
            tx.apply(terminal, now);
        }
        if let Some(order) = state.orders.get_mut(&order_number) {
            order.status = order_status;
            order.payment_status = payment_status;
            order.updated_at = now;
        }

        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn update_order(
        &self,
        order_number: &str,
        status: OrderStatus,
        payment_status: PaymentStatus,
    ) -> LedgerResult<()> {
        self.simulate_latency().await;
        let mut state = self.lock()?;
        let order = state
            .orders
            .get_mut(order_number)
            .ok_or_else(|| LedgerError::NotFound(format!("order {}", order_number)))?;
        order.status = status;
        order.payment_status = payment_status;
        order.updated_at = Utc::now();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn ping(&self) -> LedgerResult<()> {
        self.simulate_latency().await;
        self.lock().map(|_| ())
    }
}

#[derive(Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<(String, serde_json::Value)>>,
    failing: AtomicBool,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn entries(&self) -> Vec<(String, serde_json::Value)> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn entries_for(&self, conversation_id: &str) -> Vec<serde_json::Value> {
        self.entries()
            .into_iter()
            .filter(|(id, _)| id == conversation_id)
            .map(|(_, payload)| payload)
            .collect()
    }
}

#[async_trait]
impl AuditLogger for InMemoryAuditLog {
    async fn log_callback(
        &self,
        conversation_id: &str,
        payload: &serde_json::Value,
    ) -> Result<(), AuditError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuditError::Sink("in-memory audit log offline".to_string()));
        }
        self.entries
            .lock()
            .map_err(|_| AuditError::Sink("audit lock poisoned".to_string()))?
            .push((conversation_id.to_string(), payload.clone()));
        Ok(())
    }
}

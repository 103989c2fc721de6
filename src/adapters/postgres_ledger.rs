//! Postgres implementation of TransactionLedger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{Order, OrderStatus, PaymentStatus, TerminalState, Transaction};
use crate::ports::{LedgerError, LedgerResult, TransactionLedger};

const TRANSACTION_COLUMNS: &str = "conversation_id, order_number, status, payment_id, error_code, \
     error_message, gateway_response, completed_at, created_at, updated_at";

/// Postgres-backed ledger.
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Registers a pending attempt and its order. Checkout does this before
    /// redirecting the customer to the gateway.
    pub async fn insert_pending(&self, tx: &Transaction) -> LedgerResult<()> {
        let mut db_tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (order_number, status, payment_status)
            VALUES ($1, 'PENDING', 'AWAITING')
            ON CONFLICT (order_number) DO NOTHING
            "#,
        )
        .bind(&tx.order_number)
        .execute(&mut *db_tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO payment_transactions (
                conversation_id, order_number, status, payment_id, created_at, updated_at
            ) VALUES ($1, $2, 'PENDING', $3, $4, $5)
            "#,
        )
        .bind(&tx.conversation_id)
        .bind(&tx.order_number)
        .bind(&tx.payment_id)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .execute(&mut *db_tx)
        .await?;

        db_tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl TransactionLedger for PostgresLedger {
    async fn find_by_conversation_id(
        &self,
        conversation_id: &str,
    ) -> LedgerResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM payment_transactions WHERE conversation_id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn find_order(&self, order_number: &str) -> LedgerResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT order_number, status, payment_status, updated_at FROM orders WHERE order_number = $1",
        )
        .bind(order_number)
        .fetch_optional(&self.pool)
        .await?;

        row.map(OrderRow::into_domain).transpose()
    }

    async fn transition_if_pending(
        &self,
        conversation_id: &str,
        terminal: &TerminalState,
    ) -> LedgerResult<bool> {
        let (payment_id, error_code, error_message, gateway_response) = match terminal {
            TerminalState::Success {
                payment_id,
                gateway_response,
            } => (
                Some(payment_id.as_str()),
                None,
                None,
                Some(gateway_response.clone()),
            ),
            TerminalState::Failure {
                payment_id,
                error_code,
                error_message,
                gateway_response,
            } => (
                payment_id.as_deref(),
                Some(error_code.as_str()),
                Some(error_message.as_str()),
                gateway_response.clone(),
            ),
        };
        let (order_status, payment_status) = terminal.order_state();

        let mut db_tx = self.pool.begin().await?;

        // The status guard makes this the single point where a terminal state is won.
        let updated: Option<(String,)> = sqlx::query_as(
            r#"
            UPDATE payment_transactions
            SET status = $2,
                payment_id = COALESCE($3, payment_id),
                error_code = $4,
                error_message = $5,
                gateway_response = $6,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE conversation_id = $1 AND status = 'PENDING'
            RETURNING order_number
            "#,
        )
        .bind(conversation_id)
        .bind(terminal.status().as_str())
        .bind(payment_id)
        .bind(error_code)
        .bind(error_message)
        .bind(gateway_response)
        .fetch_optional(&mut *db_tx)
        .await?;

        let Some((order_number,)) = updated else {
            db_tx.rollback().await?;
            return Ok(false);
        };

        let result = sqlx::query(
            "UPDATE orders SET status = $2, payment_status = $3, updated_at = NOW() WHERE order_number = $1",
        )
        .bind(&order_number)
        .bind(order_status.as_str())
        .bind(payment_status.as_str())
        .execute(&mut *db_tx)
        .await?;

        if result.rows_affected() == 0 {
            db_tx.rollback().await?;
            return Err(LedgerError::NotFound(format!("order {}", order_number)));
        }

        db_tx.commit().await?;
        Ok(true)
    }

    async fn update_order(
        &self,
        order_number: &str,
        status: OrderStatus,
        payment_status: PaymentStatus,
    ) -> LedgerResult<()> {
        let result = sqlx::query(
            "UPDATE orders SET status = $2, payment_status = $3, updated_at = NOW() WHERE order_number = $1",
        )
        .bind(order_number)
        .bind(status.as_str())
        .bind(payment_status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(format!("order {}", order_number)));
        }
        Ok(())
    }

    async fn ping(&self) -> LedgerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    conversation_id: String,
    order_number: String,
    status: String,
    payment_id: Option<String>,
    error_code: Option<String>,
    error_message: Option<String>,
    gateway_response: Option<serde_json::Value>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> LedgerResult<Transaction> {
        Ok(Transaction {
            status: self.status.parse().map_err(LedgerError::Corrupt)?,
            conversation_id: self.conversation_id,
            order_number: self.order_number,
            payment_id: self.payment_id,
            error_code: self.error_code,
            error_message: self.error_message,
            gateway_response: self.gateway_response,
            completed_at: self.completed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    order_number: String,
    status: String,
    payment_status: String,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_domain(self) -> LedgerResult<Order> {
        Ok(Order {
            status: self.status.parse().map_err(LedgerError::Corrupt)?,
            payment_status: self.payment_status.parse().map_err(LedgerError::Corrupt)?,
            order_number: self.order_number,
            updated_at: self.updated_at,
        })
    }
}

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use crate::domain::{Order, Transaction};
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub transaction: Transaction,
    pub order: Option<Order>,
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = state
        .ledger
        .find_by_conversation_id(&conversation_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", conversation_id)))?;

    let order = state.ledger.find_order(&transaction.order_number).await?;

    Ok(Json(TransactionView { transaction, order }))
}

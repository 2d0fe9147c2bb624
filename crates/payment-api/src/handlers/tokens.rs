//! 代币账本 API 处理器
//!
//! 余额、流水与文档扣费，操作用户来自身份中间件

use axum::{
    Extension, Json,
    extract::{Query, State},
};
use validator::Validate;

use payment_service::service::{BalanceDto, LedgerEntryDto};

use crate::dto::{
    BalanceResponse, DocumentChargeBody, DocumentChargeResponse, LedgerQuery, LedgerResponse,
};
use crate::error::{ApiError, Result};
use crate::middleware::ActingUser;
use crate::state::AppState;

const DEFAULT_LEDGER_LIMIT: i64 = 50;

/// 当前余额
///
/// GET /api/tokens/balance
pub async fn balance(
    State(state): State<AppState>,
    Extension(ActingUser(user_id)): Extension<ActingUser>,
) -> Result<Json<BalanceResponse>> {
    let token_balance = state.ledger.current_balance(user_id).await?;
    Ok(Json(BalanceResponse {
        ok: true,
        balance: BalanceDto {
            user_id,
            token_balance,
        },
    }))
}

/// 流水（按时间倒序）
///
/// GET /api/tokens/ledger?limit=
pub async fn ledger(
    State(state): State<AppState>,
    Extension(ActingUser(user_id)): Extension<ActingUser>,
    Query(query): Query<LedgerQuery>,
) -> Result<Json<LedgerResponse>> {
    query.validate()?;
    let entries = state
        .ledger
        .history(user_id, query.limit.unwrap_or(DEFAULT_LEDGER_LIMIT))
        .await?;

    Ok(Json(LedgerResponse {
        ok: true,
        entries: entries.into_iter().map(LedgerEntryDto::from).collect(),
    }))
}

/// 生成文档扣费
///
/// POST /api/documents/charge
pub async fn charge_document(
    State(state): State<AppState>,
    Extension(ActingUser(user_id)): Extension<ActingUser>,
    body: std::result::Result<Json<DocumentChargeBody>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<DocumentChargeResponse>> {
    let Json(body) = body.map_err(|e| ApiError::Validation(e.body_text()))?;
    body.validate()?;

    let entry = state
        .ledger
        .charge_document(user_id, &body.document_ref)
        .await?;

    Ok(Json(DocumentChargeResponse {
        ok: true,
        charged: -entry.delta,
        token_balance: entry.balance_after,
        entry: entry.into(),
    }))
}

//! 用户与代币流水实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{Currency, LedgerEntryType};

/// 用户
///
/// token_balance 是流水 delta 之和的缓存，只能通过记账事务修改
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    pub token_balance: i64,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 代币流水（只追加）
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: i64,
    pub entry_type: LedgerEntryType,
    /// 余额变动（充值为正，扣费为负）
    pub delta: i64,
    /// 本次变动后的余额
    pub balance_after: i64,
    #[sqlx(default)]
    pub currency: Option<Currency>,
    #[sqlx(default)]
    pub amount_minor: Option<i64>,
    pub reference: String,
    #[sqlx(default)]
    pub order_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// 追加流水参数
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub user_id: i64,
    pub entry_type: LedgerEntryType,
    pub delta: i64,
    pub currency: Option<Currency>,
    pub amount_minor: Option<i64>,
    pub reference: String,
    pub order_id: Option<i64>,
}

impl NewLedgerEntry {
    /// 文档扣费
    pub fn document_charge(user_id: i64, tokens: i64, document_ref: &str) -> Self {
        Self {
            user_id,
            entry_type: LedgerEntryType::Document,
            delta: -tokens,
            currency: None,
            amount_minor: None,
            reference: format!("document:{}", document_ref),
            order_id: None,
        }
    }
}

/// 账本一致性校验结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerConsistency {
    pub user_id: i64,
    pub cached_balance: i64,
    pub replayed_balance: i64,
    /// 最新一条流水的 balance_after，无流水时为 None
    pub latest_balance_after: Option<i64>,
}

impl LedgerConsistency {
    pub fn is_consistent(&self) -> bool {
        self.cached_balance == self.replayed_balance
            && self
                .latest_balance_after
                .is_none_or(|after| after == self.cached_balance)
    }
}

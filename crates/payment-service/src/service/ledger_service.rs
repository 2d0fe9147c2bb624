//! 代币账本服务
//!
//! 余额查询、流水查询、文档生成扣费与账本一致性校验

use std::sync::Arc;

use tracing::{info, instrument, warn};

use payment_shared::observability::metrics;

use crate::error::{PaymentError, Result};
use crate::models::{LedgerConsistency, LedgerEntry, NewLedgerEntry, User};
use crate::repository::LedgerRepositoryTrait;

const MAX_HISTORY_LIMIT: i64 = 200;

/// 代币账本服务
pub struct TokenLedgerService {
    ledger: Arc<dyn LedgerRepositoryTrait>,
    tokens_per_document: i64,
}

impl TokenLedgerService {
    pub fn new(ledger: Arc<dyn LedgerRepositoryTrait>, tokens_per_document: i64) -> Self {
        Self {
            ledger,
            tokens_per_document,
        }
    }

    pub fn tokens_per_document(&self) -> i64 {
        self.tokens_per_document
    }

    pub async fn user(&self, user_id: i64) -> Result<User> {
        self.ledger
            .get_user(user_id)
            .await?
            .ok_or_else(|| PaymentError::UserNotFound(user_id.to_string()))
    }

    pub async fn current_balance(&self, user_id: i64) -> Result<i64> {
        self.ledger.current_balance(user_id).await
    }

    /// 按时间倒序的流水，limit 限制在 1..=200
    pub async fn history(&self, user_id: i64, limit: i64) -> Result<Vec<LedgerEntry>> {
        // 先确认用户存在，避免把未知用户当成空流水
        self.user(user_id).await?;
        self.ledger
            .list_by_user(user_id, limit.clamp(1, MAX_HISTORY_LIMIT))
            .await
    }

    /// 生成文档扣费，余额不足返回 InsufficientTokens 且不写流水
    #[instrument(skip(self))]
    pub async fn charge_document(&self, user_id: i64, document_ref: &str) -> Result<LedgerEntry> {
        let document_ref = document_ref.trim();
        if document_ref.is_empty() {
            return Err(PaymentError::Validation("文档标识不能为空".to_string()));
        }

        let entry = NewLedgerEntry::document_charge(user_id, self.tokens_per_document, document_ref);
        let created = self.ledger.append(&entry).await?;

        metrics::record_tokens_charged(self.tokens_per_document);
        info!(
            balance_after = created.balance_after,
            charged = self.tokens_per_document,
            "文档扣费完成"
        );
        Ok(created)
    }

    /// 校验缓存余额、流水回放之和与最新 balance_after 三者一致
    pub async fn verify_user(&self, user_id: i64) -> Result<LedgerConsistency> {
        let user = self.user(user_id).await?;
        let replayed_balance = self.ledger.replay_balance(user_id).await?;
        let latest_balance_after = self
            .ledger
            .list_by_user(user_id, 1)
            .await?
            .first()
            .map(|e| e.balance_after);

        let consistency = LedgerConsistency {
            user_id,
            cached_balance: user.token_balance,
            replayed_balance,
            latest_balance_after,
        };
        if !consistency.is_consistent() {
            warn!(?consistency, "账本余额不一致");
        }
        Ok(consistency)
    }
}

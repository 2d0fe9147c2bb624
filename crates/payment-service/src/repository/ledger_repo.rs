//! 代币账本仓储
//!
//! 余额缓存在 users.token_balance，与流水追加在同一事务内完成

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use super::traits::LedgerRepositoryTrait;
use crate::error::{PaymentError, Result, is_unique_violation};
use crate::models::{Currency, LedgerEntry, NewLedgerEntry, User};

/// 代币账本仓储
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ==================== 事务操作 ====================

    /// 在事务中插入流水（余额已由调用方更新）
    pub async fn insert_entry_in_tx(
        tx: &mut PgConnection,
        entry: &NewLedgerEntry,
        balance_after: i64,
    ) -> Result<LedgerEntry> {
        let created = sqlx::query_as::<_, LedgerEntry>(
            r#"
            INSERT INTO ledger_entries
                (user_id, entry_type, delta, balance_after, currency, amount_minor, reference, order_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, user_id, entry_type, delta, balance_after, currency, amount_minor,
                      reference, order_id, created_at
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.entry_type)
        .bind(entry.delta)
        .bind(balance_after)
        .bind(entry.currency)
        .bind(entry.amount_minor)
        .bind(&entry.reference)
        .bind(entry.order_id)
        .fetch_one(&mut *tx)
        .await?;

        Ok(created)
    }

    /// 在事务中按邮箱增加余额，用户不存在时创建
    ///
    /// 返回 (user_id, 增加后的余额)
    pub async fn credit_by_email_in_tx(
        tx: &mut PgConnection,
        email: &str,
        tokens: i64,
        currency: Currency,
    ) -> Result<(i64, i64)> {
        let row: (i64, i64) = sqlx::query_as(
            r#"
            INSERT INTO users (email, token_balance, currency)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE
                SET token_balance = users.token_balance + EXCLUDED.token_balance,
                    updated_at = NOW()
            RETURNING id, token_balance
            "#,
        )
        .bind(email)
        .bind(tokens)
        .bind(currency)
        .fetch_one(&mut *tx)
        .await?;

        Ok(row)
    }

    /// 在事务中按用户 ID 增减余额
    ///
    /// 余额不足或用户不存在时返回对应错误，余额不变
    async fn apply_delta_in_tx(tx: &mut PgConnection, user_id: i64, delta: i64) -> Result<i64> {
        let updated: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE users
            SET token_balance = token_balance + $2, updated_at = NOW()
            WHERE id = $1 AND token_balance + $2 >= 0
            RETURNING token_balance
            "#,
        )
        .bind(user_id)
        .bind(delta)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some((balance,)) = updated {
            return Ok(balance);
        }

        let current: Option<(i64,)> =
            sqlx::query_as("SELECT token_balance FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;

        match current {
            None => Err(PaymentError::UserNotFound(user_id.to_string())),
            Some((available,)) => Err(PaymentError::InsufficientTokens {
                required: -delta,
                available,
            }),
        }
    }
}

#[async_trait]
impl LedgerRepositoryTrait for LedgerRepository {
    async fn append(&self, entry: &NewLedgerEntry) -> Result<LedgerEntry> {
        let mut tx = self.pool.begin().await?;

        let balance_after = Self::apply_delta_in_tx(&mut tx, entry.user_id, entry.delta).await?;
        let created = match Self::insert_entry_in_tx(&mut tx, entry, balance_after).await {
            Ok(created) => created,
            Err(PaymentError::Database(e)) if is_unique_violation(&e) => {
                return Err(PaymentError::DuplicateOrder(entry.reference.clone()));
            }
            Err(e) => return Err(e),
        };

        tx.commit().await?;
        Ok(created)
    }

    async fn current_balance(&self, user_id: i64) -> Result<i64> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT token_balance FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(balance,)| balance)
            .ok_or_else(|| PaymentError::UserNotFound(user_id.to_string()))
    }

    async fn list_by_user(&self, user_id: i64, limit: i64) -> Result<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, user_id, entry_type, delta, balance_after, currency, amount_minor,
                   reference, order_id, created_at
            FROM ledger_entries
            WHERE user_id = $1
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn count_top_ups(&self, order_id: i64) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM ledger_entries WHERE order_id = $1 AND entry_type = 'TOP_UP'",
        )
        .bind(order_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn replay_balance(&self, user_id: i64) -> Result<i64> {
        let (sum,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(delta), 0)::BIGINT FROM ledger_entries WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, token_balance, currency, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, token_balance, currency, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create_user(&self, email: &str, currency: Currency) -> Result<User> {
        // 冲突时做一次空更新，使 RETURNING 总能返回行
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, token_balance, currency)
            VALUES ($1, 0, $2)
            ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
            RETURNING id, email, token_balance, currency, created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(currency)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }
}

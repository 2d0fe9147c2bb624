//! 支付订单仓储
//!
//! 状态转换使用条件更新（WHERE status = 'PROCESSING'）实现 CAS，
//! 充值与状态转换在同一事务内提交

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{info, warn};

use super::ledger_repo::LedgerRepository;
use super::traits::OrderRepositoryTrait;
use crate::error::{PaymentError, Result, is_unique_violation};
use crate::models::{
    AuditEntry, LedgerEntryType, NewAnomaly, NewLedgerEntry, NewOrder, Order, OrderState,
    SettleResult,
};

/// 支付订单仓储
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn require(&self, merchant_order_id: &str) -> Result<Order> {
        self.get_by_merchant_id(merchant_order_id)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(merchant_order_id.to_string()))
    }
}

#[async_trait]
impl OrderRepositoryTrait for OrderRepository {
    async fn create(&self, order: &NewOrder) -> Result<Order> {
        let result = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO payment_orders
                (merchant_order_id, amount_minor, currency, user_email, tokens, description,
                 status, response)
            VALUES ($1, $2, $3, $4, $5, $6, 'PROCESSING', '{}'::jsonb)
            RETURNING id, merchant_order_id, system_order_id, amount_minor, currency, user_email,
                      tokens, description, status, response, created_at, updated_at
            "#,
        )
        .bind(&order.merchant_order_id)
        .bind(order.amount_minor)
        .bind(order.currency)
        .bind(&order.user_email)
        .bind(order.tokens)
        .bind(&order.description)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(created) => Ok(created),
            Err(e) if is_unique_violation(&e) => {
                Err(PaymentError::DuplicateOrder(order.merchant_order_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_by_merchant_id(&self, merchant_order_id: &str) -> Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT id, merchant_order_id, system_order_id, amount_minor, currency, user_email,
                   tokens, description, status, response, created_at, updated_at
            FROM payment_orders
            WHERE merchant_order_id = $1
            "#,
        )
        .bind(merchant_order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT id, merchant_order_id, system_order_id, amount_minor, currency, user_email,
                   tokens, description, status, response, created_at, updated_at
            FROM payment_orders
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    async fn merge_audit(&self, merchant_order_id: &str, entry: &AuditEntry) -> Result<()> {
        // 行锁内读取-合并-写回，与内存实现共用 merge_into 的合并规则
        let mut tx = self.pool.begin().await?;

        let current: Option<serde_json::Value> = sqlx::query_scalar(
            "SELECT response FROM payment_orders WHERE merchant_order_id = $1 FOR UPDATE",
        )
        .bind(merchant_order_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut document) = current else {
            tx.rollback().await?;
            return Err(PaymentError::OrderNotFound(merchant_order_id.to_string()));
        };
        entry.merge_into(&mut document);

        sqlx::query(
            r#"
            UPDATE payment_orders
            SET response = $2, updated_at = NOW()
            WHERE merchant_order_id = $1
            "#,
        )
        .bind(merchant_order_id)
        .bind(&document)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn attach_system_order_id(
        &self,
        merchant_order_id: &str,
        system_order_id: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE payment_orders
            SET system_order_id = $2, updated_at = NOW()
            WHERE merchant_order_id = $1 AND system_order_id IS NULL
            "#,
        )
        .bind(merchant_order_id)
        .bind(system_order_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn settle(&self, merchant_order_id: &str, target: OrderState) -> Result<SettleResult> {
        if !target.is_terminal() {
            return Err(PaymentError::Validation(format!(
                "结算目标状态必须为终态: {}",
                target
            )));
        }

        let mut tx = self.pool.begin().await?;

        // CAS：并发调用方在行锁上排队，提交后其余调用方的 WHERE 条件不再成立
        let transitioned = sqlx::query_as::<_, Order>(
            r#"
            UPDATE payment_orders
            SET status = $2, updated_at = NOW()
            WHERE merchant_order_id = $1 AND status = 'PROCESSING'
            RETURNING id, merchant_order_id, system_order_id, amount_minor, currency, user_email,
                      tokens, description, status, response, created_at, updated_at
            "#,
        )
        .bind(merchant_order_id)
        .bind(target)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order) = transitioned else {
            tx.rollback().await?;
            let current = self.require(merchant_order_id).await?;
            return Ok(SettleResult {
                order: current,
                won: false,
                credit: None,
            });
        };

        if target != OrderState::Approved {
            tx.commit().await?;
            info!(merchant_order_id, state = %target, "订单进入终态，无需充值");
            return Ok(SettleResult {
                order,
                won: true,
                credit: None,
            });
        }

        let (user_id, balance_after) = LedgerRepository::credit_by_email_in_tx(
            &mut tx,
            &order.user_email,
            order.tokens,
            order.currency,
        )
        .await?;

        let entry = NewLedgerEntry {
            user_id,
            entry_type: LedgerEntryType::TopUp,
            delta: order.tokens,
            currency: Some(order.currency),
            amount_minor: Some(order.amount_minor),
            reference: order.ledger_reference(),
            order_id: Some(order.id),
        };

        match LedgerRepository::insert_entry_in_tx(&mut tx, &entry, balance_after).await {
            Ok(credit) => {
                tx.commit().await?;
                info!(
                    merchant_order_id,
                    user_id,
                    tokens = order.tokens,
                    balance_after,
                    "订单已批准，代币已充值"
                );
                Ok(SettleResult {
                    order,
                    won: true,
                    credit: Some(credit),
                })
            }
            Err(PaymentError::Database(e)) if is_unique_violation(&e) => {
                // 充值流水已存在：整体回滚，视为竞争失败
                tx.rollback().await?;
                warn!(merchant_order_id, "充值流水已存在，回滚本次结算");
                let current = self.require(merchant_order_id).await?;
                Ok(SettleResult {
                    order: current,
                    won: false,
                    credit: None,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn list_stale_processing(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT id, merchant_order_id, system_order_id, amount_minor, currency, user_email,
                   tokens, description, status, response, created_at, updated_at
            FROM payment_orders
            WHERE status = 'PROCESSING' AND created_at < $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(older_than)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    async fn record_anomaly(&self, anomaly: &NewAnomaly) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_anomalies (kind, merchant_order_id, detail)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(anomaly.kind)
        .bind(&anomaly.merchant_order_id)
        .bind(&anomaly.detail)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

//! 内存存储
//!
//! 单进程开发与测试用的存储实现，同时实现订单、账本和计数器三个仓储接口。
//! 所有写操作持有同一把锁，以此模拟数据库的条件更新、唯一约束与事务原子性。
//! 多实例部署必须使用 PostgreSQL 实现。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::traits::{CounterRepositoryTrait, LedgerRepositoryTrait, OrderRepositoryTrait};
use crate::error::{PaymentError, Result};
use crate::models::{
    Anomaly, AuditEntry, Currency, LedgerEntry, LedgerEntryType, NewAnomaly, NewLedgerEntry,
    NewOrder, Order, OrderState, SettleResult, User,
};

#[derive(Default)]
struct State {
    orders: Vec<Order>,
    order_index: HashMap<String, usize>,
    users: Vec<User>,
    user_index: HashMap<String, usize>,
    ledger: Vec<LedgerEntry>,
    anomalies: Vec<Anomaly>,
    counters: HashMap<String, i64>,
}

impl State {
    fn order_mut(&mut self, merchant_order_id: &str) -> Result<&mut Order> {
        let idx = *self
            .order_index
            .get(merchant_order_id)
            .ok_or_else(|| PaymentError::OrderNotFound(merchant_order_id.to_string()))?;
        Ok(&mut self.orders[idx])
    }

    fn user_idx(&self, user_id: i64) -> Option<usize> {
        usize::try_from(user_id - 1)
            .ok()
            .filter(|idx| *idx < self.users.len())
    }

    fn upsert_user(&mut self, email: &str, currency: Currency) -> usize {
        if let Some(idx) = self.user_index.get(email) {
            return *idx;
        }
        let now = Utc::now();
        let idx = self.users.len();
        self.users.push(User {
            id: idx as i64 + 1,
            email: email.to_string(),
            token_balance: 0,
            currency,
            created_at: now,
            updated_at: now,
        });
        self.user_index.insert(email.to_string(), idx);
        idx
    }

    fn has_top_up(&self, order_id: i64) -> bool {
        self.ledger
            .iter()
            .any(|e| e.entry_type == LedgerEntryType::TopUp && e.order_id == Some(order_id))
    }

    /// 更新余额并追加流水，调用方已持有锁
    fn push_entry(&mut self, user_idx: usize, entry: &NewLedgerEntry) -> Result<LedgerEntry> {
        if entry.entry_type == LedgerEntryType::TopUp
            && entry.order_id.is_some_and(|id| self.has_top_up(id))
        {
            return Err(PaymentError::DuplicateOrder(entry.reference.clone()));
        }

        let user = &mut self.users[user_idx];
        let balance_after = user.token_balance + entry.delta;
        if balance_after < 0 {
            return Err(PaymentError::InsufficientTokens {
                required: -entry.delta,
                available: user.token_balance,
            });
        }
        user.token_balance = balance_after;
        user.updated_at = Utc::now();

        let created = LedgerEntry {
            id: self.ledger.len() as i64 + 1,
            user_id: user.id,
            entry_type: entry.entry_type,
            delta: entry.delta,
            balance_after,
            currency: entry.currency,
            amount_minor: entry.amount_minor,
            reference: entry.reference.clone(),
            order_id: entry.order_id,
            created_at: Utc::now(),
        };
        self.ledger.push(created.clone());
        Ok(created)
    }
}

/// 内存存储
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已记录的关联异常
    pub fn anomalies(&self) -> Vec<Anomaly> {
        self.state.lock().anomalies.clone()
    }

    /// 全部流水（按写入顺序）
    pub fn ledger_entries(&self) -> Vec<LedgerEntry> {
        self.state.lock().ledger.clone()
    }

    pub fn order_count(&self) -> usize {
        self.state.lock().orders.len()
    }
}

#[async_trait]
impl OrderRepositoryTrait for MemoryStore {
    async fn create(&self, order: &NewOrder) -> Result<Order> {
        let mut state = self.state.lock();
        if state.order_index.contains_key(&order.merchant_order_id) {
            return Err(PaymentError::DuplicateOrder(order.merchant_order_id.clone()));
        }

        let now = Utc::now();
        let idx = state.orders.len();
        let created = Order {
            id: idx as i64 + 1,
            merchant_order_id: order.merchant_order_id.clone(),
            system_order_id: None,
            amount_minor: order.amount_minor,
            currency: order.currency,
            user_email: order.user_email.clone(),
            tokens: order.tokens,
            description: order.description.clone(),
            status: OrderState::Processing,
            response: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        };
        state.orders.push(created.clone());
        state
            .order_index
            .insert(order.merchant_order_id.clone(), idx);
        Ok(created)
    }

    async fn get_by_merchant_id(&self, merchant_order_id: &str) -> Result<Option<Order>> {
        let state = self.state.lock();
        Ok(state
            .order_index
            .get(merchant_order_id)
            .map(|idx| state.orders[*idx].clone()))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Order>> {
        let state = self.state.lock();
        Ok(state.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn merge_audit(&self, merchant_order_id: &str, entry: &AuditEntry) -> Result<()> {
        let mut state = self.state.lock();
        let order = state.order_mut(merchant_order_id)?;
        entry.merge_into(&mut order.response);
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn attach_system_order_id(
        &self,
        merchant_order_id: &str,
        system_order_id: &str,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let order = state.order_mut(merchant_order_id)?;
        if order.system_order_id.is_none() {
            order.system_order_id = Some(system_order_id.to_string());
            order.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn settle(&self, merchant_order_id: &str, target: OrderState) -> Result<SettleResult> {
        if !target.is_terminal() {
            return Err(PaymentError::Validation(format!(
                "结算目标状态必须为终态: {}",
                target
            )));
        }

        let mut state = self.state.lock();
        let order = state.order_mut(merchant_order_id)?;
        if order.status != OrderState::Processing {
            return Ok(SettleResult {
                order: order.clone(),
                won: false,
                credit: None,
            });
        }

        let snapshot = order.clone();
        if target != OrderState::Approved {
            order.status = target;
            order.updated_at = Utc::now();
            return Ok(SettleResult {
                order: order.clone(),
                won: true,
                credit: None,
            });
        }

        // 流水写入失败时订单状态保持不变，等价于事务回滚
        let user_idx = state.upsert_user(&snapshot.user_email, snapshot.currency);
        let entry = NewLedgerEntry {
            user_id: user_idx as i64 + 1,
            entry_type: LedgerEntryType::TopUp,
            delta: snapshot.tokens,
            currency: Some(snapshot.currency),
            amount_minor: Some(snapshot.amount_minor),
            reference: snapshot.ledger_reference(),
            order_id: Some(snapshot.id),
        };
        let credit = match state.push_entry(user_idx, &entry) {
            Ok(credit) => credit,
            Err(PaymentError::DuplicateOrder(_)) => {
                return Ok(SettleResult {
                    order: snapshot,
                    won: false,
                    credit: None,
                });
            }
            Err(e) => return Err(e),
        };

        let order = state.order_mut(merchant_order_id)?;
        order.status = OrderState::Approved;
        order.updated_at = Utc::now();
        Ok(SettleResult {
            order: order.clone(),
            won: true,
            credit: Some(credit),
        })
    }

    async fn list_stale_processing(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>> {
        let state = self.state.lock();
        let mut stale: Vec<Order> = state
            .orders
            .iter()
            .filter(|o| o.status == OrderState::Processing && o.created_at < older_than)
            .cloned()
            .collect();
        stale.sort_by_key(|o| o.created_at);
        stale.truncate(limit.max(0) as usize);
        Ok(stale)
    }

    async fn record_anomaly(&self, anomaly: &NewAnomaly) -> Result<()> {
        let mut state = self.state.lock();
        let id = state.anomalies.len() as i64 + 1;
        state.anomalies.push(Anomaly {
            id,
            kind: anomaly.kind,
            merchant_order_id: anomaly.merchant_order_id.clone(),
            detail: anomaly.detail.clone(),
            created_at: Utc::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl LedgerRepositoryTrait for MemoryStore {
    async fn append(&self, entry: &NewLedgerEntry) -> Result<LedgerEntry> {
        let mut state = self.state.lock();
        let idx = state
            .user_idx(entry.user_id)
            .ok_or_else(|| PaymentError::UserNotFound(entry.user_id.to_string()))?;
        state.push_entry(idx, entry)
    }

    async fn current_balance(&self, user_id: i64) -> Result<i64> {
        let state = self.state.lock();
        state
            .user_idx(user_id)
            .map(|idx| state.users[idx].token_balance)
            .ok_or_else(|| PaymentError::UserNotFound(user_id.to_string()))
    }

    async fn list_by_user(&self, user_id: i64, limit: i64) -> Result<Vec<LedgerEntry>> {
        let state = self.state.lock();
        Ok(state
            .ledger
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_top_ups(&self, order_id: i64) -> Result<i64> {
        let state = self.state.lock();
        Ok(state
            .ledger
            .iter()
            .filter(|e| e.entry_type == LedgerEntryType::TopUp && e.order_id == Some(order_id))
            .count() as i64)
    }

    async fn replay_balance(&self, user_id: i64) -> Result<i64> {
        let state = self.state.lock();
        Ok(state
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.delta)
            .sum())
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let state = self.state.lock();
        Ok(state.user_idx(id).map(|idx| state.users[idx].clone()))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let state = self.state.lock();
        Ok(state
            .user_index
            .get(email)
            .map(|idx| state.users[*idx].clone()))
    }

    async fn create_user(&self, email: &str, currency: Currency) -> Result<User> {
        let mut state = self.state.lock();
        let idx = state.upsert_user(email, currency);
        Ok(state.users[idx].clone())
    }
}

#[async_trait]
impl CounterRepositoryTrait for MemoryStore {
    async fn get(&self, name: &str) -> Result<Option<i64>> {
        Ok(self.state.lock().counters.get(name).copied())
    }

    async fn increment(&self, name: &str, by: i64, seed: i64) -> Result<i64> {
        let mut state = self.state.lock();
        let value = state.counters.entry(name.to_string()).or_insert(seed);
        *value = value.saturating_add(by);
        Ok(*value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuditSource;
    use serde_json::json;

    fn new_order(id: &str, tokens: i64) -> NewOrder {
        NewOrder {
            merchant_order_id: id.to_string(),
            amount_minor: 1000,
            currency: Currency::Gbp,
            user_email: "buyer@example.com".to_string(),
            tokens,
            description: "Payment".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate() {
        let store = MemoryStore::new();
        store.create(&new_order("order_1", 1000)).await.unwrap();
        let err = store.create(&new_order("order_1", 1000)).await.unwrap_err();
        assert!(matches!(err, PaymentError::DuplicateOrder(_)));
        assert_eq!(store.order_count(), 1);
    }

    #[tokio::test]
    async fn test_settle_approved_credits_once() {
        let store = MemoryStore::new();
        let order = store.create(&new_order("order_1", 1000)).await.unwrap();

        let first = store.settle("order_1", OrderState::Approved).await.unwrap();
        assert!(first.won);
        assert_eq!(first.credit.as_ref().unwrap().balance_after, 1000);

        let second = store.settle("order_1", OrderState::Approved).await.unwrap();
        assert!(!second.won);
        assert!(second.credit.is_none());

        assert_eq!(store.count_top_ups(order.id).await.unwrap(), 1);
        let user = store.get_user_by_email("buyer@example.com").await.unwrap().unwrap();
        assert_eq!(user.token_balance, 1000);
    }

    #[tokio::test]
    async fn test_settle_declined_has_no_ledger_effect() {
        let store = MemoryStore::new();
        store.create(&new_order("order_1", 1000)).await.unwrap();

        let result = store.settle("order_1", OrderState::Declined).await.unwrap();
        assert!(result.won);
        assert_eq!(result.order.status, OrderState::Declined);
        assert!(store.ledger_entries().is_empty());

        // 终态不可再变
        let again = store.settle("order_1", OrderState::Approved).await.unwrap();
        assert!(!again.won);
        assert_eq!(again.order.status, OrderState::Declined);
    }

    #[tokio::test]
    async fn test_settle_rejects_non_terminal_target() {
        let store = MemoryStore::new();
        store.create(&new_order("order_1", 1000)).await.unwrap();
        let err = store
            .settle("order_1", OrderState::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Validation(_)));
    }

    #[tokio::test]
    async fn test_merge_audit_and_system_id() {
        let store = MemoryStore::new();
        store.create(&new_order("order_1", 1000)).await.unwrap();

        store
            .merge_audit("order_1", &AuditEntry::new(AuditSource::Sale, json!({"a": 1})))
            .await
            .unwrap();
        store
            .merge_audit("order_1", &AuditEntry::new(AuditSource::Webhook, json!({"b": 2})))
            .await
            .unwrap();
        store.attach_system_order_id("order_1", "sys-1").await.unwrap();
        store.attach_system_order_id("order_1", "sys-2").await.unwrap();

        let order = store.get_by_merchant_id("order_1").await.unwrap().unwrap();
        let trail = order.audit_trail();
        assert_eq!(trail.sale.unwrap().payload["a"], 1);
        assert_eq!(trail.webhook.unwrap().payload["b"], 2);
        assert_eq!(order.system_order_id.as_deref(), Some("sys-1"));
    }

    #[tokio::test]
    async fn test_append_rejects_overdraft() {
        let store = MemoryStore::new();
        let user = store.create_user("reader@example.com", Currency::Eur).await.unwrap();

        let err = store
            .append(&NewLedgerEntry::document_charge(user.id, 10, "doc-1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PaymentError::InsufficientTokens {
                required: 10,
                available: 0
            }
        ));
        assert_eq!(store.current_balance(user.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_counter_seed_and_increment() {
        let store = MemoryStore::new();
        assert_eq!(store.get("resumes").await.unwrap(), None);
        assert_eq!(store.increment("resumes", 1, 100).await.unwrap(), 101);
        assert_eq!(store.increment("resumes", 2, 100).await.unwrap(), 103);
    }

    #[tokio::test]
    async fn test_counter_saturates_at_max() {
        let store = MemoryStore::new();
        store.increment("resumes", i64::MAX - 200, 100).await.unwrap();
        assert_eq!(store.increment("resumes", 500, 100).await.unwrap(), i64::MAX);
        assert_eq!(store.increment("resumes", 500, 100).await.unwrap(), i64::MAX);
    }
}

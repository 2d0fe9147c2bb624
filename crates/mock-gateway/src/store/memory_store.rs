//! 支付内存存储
//!
//! 使用 DashMap 按商户订单号存储，状态推进在单条记录的写锁内完成。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::models::{MockPayment, MockState};

/// 支付存储
///
/// 克隆共享同一份数据
#[derive(Debug, Clone)]
pub struct PaymentStore {
    payments: Arc<DashMap<String, MockPayment>>,
    next_system_id: Arc<AtomicU64>,
}

impl Default for PaymentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentStore {
    pub fn new() -> Self {
        Self {
            payments: Arc::new(DashMap::new()),
            next_system_id: Arc::new(AtomicU64::new(100_000)),
        }
    }

    /// 分配网关订单号
    pub fn next_system_order_id(&self) -> u64 {
        self.next_system_id.fetch_add(1, Ordering::SeqCst)
    }

    /// 插入支付，商户订单号重复时返回 false 且不覆盖
    pub fn insert(&self, payment: MockPayment) -> bool {
        match self.payments.entry(payment.merchant_order_id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(payment);
                true
            }
        }
    }

    pub fn get(&self, merchant_order_id: &str) -> Option<MockPayment> {
        self.payments.get(merchant_order_id).map(|p| p.clone())
    }

    /// 记录一次状态查询
    ///
    /// 处理中的 Pending 场景达到 `settle_after` 次查询后转为批准
    pub fn record_status_check(
        &self,
        merchant_order_id: &str,
        settle_after: u32,
    ) -> Option<(MockPayment, bool)> {
        let mut payment = self.payments.get_mut(merchant_order_id)?;
        payment.status_checks += 1;

        let settles = payment.state == MockState::Processing
            && payment.scenario.challenge().is_none()
            && payment.status_checks >= settle_after;
        if settles {
            payment.state = MockState::Approved;
            payment.updated_at = Utc::now();
        }
        Some((payment.clone(), settles))
    }

    /// 完成 3DS 挑战
    ///
    /// 只对仍在处理中的挑战场景生效，返回推进后的记录
    pub fn complete_challenge(&self, merchant_order_id: &str) -> Option<MockPayment> {
        let mut payment = self.payments.get_mut(merchant_order_id)?;
        if payment.state == MockState::Processing && payment.scenario.challenge().is_some() {
            payment.state = payment.scenario.after_challenge();
            payment.updated_at = Utc::now();
        }
        Some(payment.clone())
    }

    pub fn count(&self) -> usize {
        self.payments.len()
    }

    pub fn list(&self) -> Vec<MockPayment> {
        self.payments.iter().map(|p| p.value().clone()).collect()
    }
}

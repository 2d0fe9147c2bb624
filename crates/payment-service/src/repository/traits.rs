//! 仓储 Trait 定义
//!
//! 服务层依赖抽象而非具体实现：生产环境使用 PostgreSQL，测试与单机模式使用内存实现

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    AuditEntry, Currency, LedgerEntry, NewAnomaly, NewLedgerEntry, NewOrder, Order, OrderState,
    SettleResult, User,
};

/// 订单仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRepositoryTrait: Send + Sync {
    /// 创建 PROCESSING 状态的订单，商户订单号重复时返回 DuplicateOrder
    async fn create(&self, order: &NewOrder) -> Result<Order>;

    async fn get_by_merchant_id(&self, merchant_order_id: &str) -> Result<Option<Order>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Order>>;

    /// 将一个来源的快照合并进审计文档，其他来源不受影响
    async fn merge_audit(&self, merchant_order_id: &str, entry: &AuditEntry) -> Result<()>;

    /// 仅在当前为空时写入网关订单号
    async fn attach_system_order_id(
        &self,
        merchant_order_id: &str,
        system_order_id: &str,
    ) -> Result<()>;

    /// 终态结算
    ///
    /// 条件更新 PROCESSING -> target，只有一个调用方能赢；
    /// 赢得 APPROVED 时在同一事务内增加用户余额并追加充值流水
    async fn settle(&self, merchant_order_id: &str, target: OrderState) -> Result<SettleResult>;

    /// 创建时间早于 older_than 且仍在处理中的订单
    async fn list_stale_processing(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>>;

    async fn record_anomaly(&self, anomaly: &NewAnomaly) -> Result<()>;
}

/// 代币账本仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerRepositoryTrait: Send + Sync {
    /// 原子地更新余额并追加流水，负向变动要求余额充足
    async fn append(&self, entry: &NewLedgerEntry) -> Result<LedgerEntry>;

    async fn current_balance(&self, user_id: i64) -> Result<i64>;

    /// 按时间倒序列出流水
    async fn list_by_user(&self, user_id: i64, limit: i64) -> Result<Vec<LedgerEntry>>;

    async fn count_top_ups(&self, order_id: i64) -> Result<i64>;

    /// 流水 delta 之和
    async fn replay_balance(&self, user_id: i64) -> Result<i64>;

    async fn get_user(&self, id: i64) -> Result<Option<User>>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// 创建用户，邮箱已存在时返回已有用户
    async fn create_user(&self, email: &str, currency: Currency) -> Result<User>;
}

/// 持久化计数器接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CounterRepositoryTrait: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<i64>>;

    /// 原子递增；计数器不存在时以 seed 为初值
    async fn increment(&self, name: &str, by: i64, seed: i64) -> Result<i64>;
}

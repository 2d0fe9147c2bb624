//! 支付订单对账与代币账本服务
//!
//! 负责向外部收单网关（CardServ）下单、承接 3DS 挑战流程、汇总来自多个通道的
//! 异步订单状态，并保证每个已批准订单只为用户充值一次。
//!
//! ## 模块结构
//!
//! - `models`: 领域模型（订单、流水、用户、审计文档）
//! - `error`: 错误类型定义
//! - `repository`: 仓储层（PostgreSQL 实现与内存实现）
//! - `gateway`: 网关客户端与响应归一化
//! - `service`: 业务服务（下单、对账引擎、代币账本、计数器）
//! - `challenge`: 3DS 挑战表单渲染与回调关联
//! - `poller`: 客户端状态轮询

pub mod challenge;
pub mod error;
pub mod gateway;
pub mod models;
pub mod poller;
pub mod repository;
pub mod service;

pub use error::{PaymentError, Result};
pub use gateway::{CardServClient, GatewayOutcome, PaymentGateway, SaleRequest, ThreeDsChallenge};
pub use models::*;
pub use poller::{HttpStatusClient, PollOutcome, StatusPoller, StatusSnapshot, StatusSource};
pub use repository::{
    CounterRepository, CounterRepositoryTrait, LedgerRepository, LedgerRepositoryTrait,
    MemoryStore, OrderRepository, OrderRepositoryTrait,
};
pub use service::{
    CounterService, OrderService, ReconcileOutcome, ReconciliationEngine, TokenLedgerService,
};

//! 服务层
//!
//! 协调仓储层与网关完成下单、对账、记账和计数。
//!
//! ## 模块结构
//!
//! - `dto`: 数据传输对象定义
//! - `reconciliation`: 对账引擎，所有订单状态通道的唯一入口
//! - `order_service`: 下单流程
//! - `ledger_service`: 代币账本（余额、流水、扣费、一致性校验）
//! - `counter_service`: 持久化计数器

pub mod counter_service;
pub mod dto;
pub mod ledger_service;
pub mod order_service;
pub mod reconciliation;

pub use counter_service::CounterService;
pub use dto::*;
pub use ledger_service::TokenLedgerService;
pub use order_service::OrderService;
pub use reconciliation::{ChallengeResolution, ReconcileOutcome, ReconciliationEngine};

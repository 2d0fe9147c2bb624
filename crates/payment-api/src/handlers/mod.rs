//! HTTP 请求处理器
//!
//! - `cardserv`: 下单、状态、Webhook、3DS 挑战与回调
//! - `tokens`: 余额、流水、文档扣费
//! - `counter`: 简历生成计数器
//! - `health`: 存活与就绪探针

pub mod cardserv;
pub mod counter;
pub mod health;
pub mod tokens;

//! 支付 API 服务
//!
//! 对外提供下单、3DS 中转、订单状态回调、代币账本与计数器的 REST API。
//!
//! ## 模块结构
//!
//! - `dto`: 请求和响应的数据传输对象
//! - `error`: 错误类型定义
//! - `handlers`: HTTP 请求处理器
//! - `middleware`: 用户身份中间件
//! - `routes`: 路由配置
//! - `state`: 应用状态
//! - `worker`: 后台巡检 Worker
//!
//! ## 技术栈
//!
//! - Web 框架：Axum
//! - 数据验证：validator
//! - 序列化：serde (camelCase)

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod worker;

pub use error::{ApiError, Result};
pub use state::{AppState, Dependencies};

//! Mock 服务模块
//!
//! - `gateway_service` - 下单、状态查询、ACS 挑战
//! - `webhook` - 状态变化后回调商户

mod gateway_service;
mod webhook;

pub use gateway_service::{GatewayState, gateway_routes};
pub use webhook::WebhookNotifier;

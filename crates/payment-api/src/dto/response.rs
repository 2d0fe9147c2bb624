//! 响应 DTO 定义
//!
//! 成功响应统一带 `ok: true`，与前端约定一致

use serde::Serialize;

use payment_service::service::{BalanceDto, CreateOrderResult, LedgerEntryDto};
use payment_service::{OrderState, ThreeDsChallenge};

/// 下单响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleResponse {
    pub ok: bool,
    pub order_merchant_id: String,
    pub state: OrderState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(rename = "threeDS", skip_serializing_if = "Option::is_none")]
    pub three_ds: Option<ThreeDsChallenge>,
}

impl From<CreateOrderResult> for SaleResponse {
    fn from(result: CreateOrderResult) -> Self {
        Self {
            ok: true,
            order_merchant_id: result.merchant_order_id,
            state: result.state,
            redirect_url: result.redirect_url,
            three_ds: result.challenge,
        }
    }
}

/// 订单状态响应（状态查询、Webhook）
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStateResponse {
    pub ok: bool,
    pub state: OrderState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

impl OrderStateResponse {
    pub fn new(state: OrderState, redirect_url: Option<String>) -> Self {
        Self {
            ok: true,
            state,
            redirect_url,
        }
    }
}

/// 余额响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub balance: BalanceDto,
}

/// 流水响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerResponse {
    pub ok: bool,
    pub entries: Vec<LedgerEntryDto>,
}

/// 文档扣费响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChargeResponse {
    pub ok: bool,
    pub charged: i64,
    pub token_balance: i64,
    pub entry: LedgerEntryDto,
}

/// 计数器响应
#[derive(Debug, Serialize)]
pub struct CounterResponse {
    pub count: i64,
}

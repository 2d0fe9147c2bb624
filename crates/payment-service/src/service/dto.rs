//! 服务层数据传输对象
//!
//! 定义服务层与外部交互使用的 DTO，与内部领域模型解耦

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::gateway::{BillingAddress, BrowserInfo, CardDetails, ThreeDsChallenge};
use crate::models::{Currency, LedgerEntry, LedgerEntryType, OrderState};

/// 下单命令
///
/// 币种保持原始字符串，由服务层解析，未知币种返回 InvalidCurrency
#[derive(Debug, Clone)]
pub struct CreateOrderCommand {
    pub amount_minor: i64,
    pub currency: String,
    pub email: String,
    pub card: CardDetails,
    pub description: Option<String>,
    pub billing: BillingAddress,
    /// 缺省时使用默认浏览器指纹
    pub browser: Option<BrowserInfo>,
}

/// 下单结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResult {
    pub merchant_order_id: String,
    pub state: OrderState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<ThreeDsChallenge>,
}

/// 余额视图
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceDto {
    pub user_id: i64,
    pub token_balance: i64,
}

/// 账本流水 DTO
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryDto {
    pub id: i64,
    pub entry_type: LedgerEntryType,
    pub delta: i64,
    pub balance_after: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_minor: Option<i64>,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for LedgerEntryDto {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id,
            entry_type: entry.entry_type,
            delta: entry.delta,
            balance_after: entry.balance_after,
            currency: entry.currency,
            amount_minor: entry.amount_minor,
            reference: entry.reference,
            created_at: entry.created_at,
        }
    }
}

/// 文档扣费结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChargeDto {
    pub charged: i64,
    pub token_balance: i64,
    pub entry: LedgerEntryDto,
}

//! 支付服务枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PaymentError;

/// 订单状态
///
/// PROCESSING 是唯一的非终态，其余三种状态一旦写入不再变化
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    #[default]
    Processing,
    Approved,
    Declined,
    Error,
}

impl OrderState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }

    /// 归一化网关返回的 orderState
    ///
    /// 未知或缺失的状态一律视为 PROCESSING，不推断终态
    pub fn from_gateway(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_uppercase()).as_deref() {
            Some("APPROVED") => Self::Approved,
            Some("DECLINED") => Self::Declined,
            Some("ERROR") => Self::Error,
            _ => Self::Processing,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "PROCESSING",
            Self::Approved => "APPROVED",
            Self::Declined => "DECLINED",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 支持的结算币种
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "varchar", rename_all = "UPPERCASE")]
pub enum Currency {
    Eur,
    Usd,
    #[default]
    Gbp,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Eur, Currency::Usd, Currency::Gbp];

    pub fn code(self) -> &'static str {
        match self {
            Self::Eur => "EUR",
            Self::Usd => "USD",
            Self::Gbp => "GBP",
        }
    }

    /// 持卡人账单地址使用的国家代码
    pub fn country_code(self) -> &'static str {
        match self {
            Self::Eur => "DE",
            Self::Usd => "US",
            Self::Gbp => "GB",
        }
    }
}

impl FromStr for Currency {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EUR" => Ok(Self::Eur),
            "USD" => Ok(Self::Usd),
            "GBP" => Ok(Self::Gbp),
            _ => Err(PaymentError::InvalidCurrency(s.to_string())),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// 代币流水类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEntryType {
    /// 支付成功后的充值
    TopUp,
    /// 生成文档的扣费
    Document,
}

/// 审计快照来源
///
/// 审计文档按来源分键存储，各来源互不覆盖
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSource {
    Sale,
    Status,
    Webhook,
    Result,
}

impl AuditSource {
    pub fn key(self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::Status => "status",
            Self::Webhook => "webhook",
            Self::Result => "result",
        }
    }
}

impl fmt::Display for AuditSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// 异常类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    /// 3DS 回调中既没有 MD 也没有 threeDSSessionData
    ChallengeMissingCorrelation,
    /// 3DS 回调关联到不存在的订单
    ChallengeUnknownOrder,
    /// Webhook 缺少订单号或无法解析
    WebhookMalformed,
    /// Webhook 关联到不存在的订单
    WebhookUnknownOrder,
}

impl AnomalyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChallengeMissingCorrelation => "CHALLENGE_MISSING_CORRELATION",
            Self::ChallengeUnknownOrder => "CHALLENGE_UNKNOWN_ORDER",
            Self::WebhookMalformed => "WEBHOOK_MALFORMED",
            Self::WebhookUnknownOrder => "WEBHOOK_UNKNOWN_ORDER",
        }
    }
}

//! 支付服务错误类型
//!
//! 定义服务层的业务错误和系统错误

use thiserror::Error;

/// 支付服务错误类型
#[derive(Debug, Error)]
pub enum PaymentError {
    // === 网关相关错误 ===
    /// 请求币种缺少网关凭据，不可重试
    #[error("网关配置缺失: {0}")]
    Configuration(String),

    /// 网络错误、超时、5xx 或无法解析的响应
    #[error("支付网关不可用: {0}")]
    GatewayUnavailable(String),

    // === 订单相关错误 ===
    #[error("订单不存在: {0}")]
    OrderNotFound(String),

    #[error("不支持的币种: {0}")]
    InvalidCurrency(String),

    #[error("重复的商户订单号: {0}")]
    DuplicateOrder(String),

    // === 账本相关错误 ===
    #[error("代币余额不足: 需要 {required}, 可用 {available}")]
    InsufficientTokens { required: i64, available: i64 },

    #[error("用户不存在: {0}")]
    UserNotFound(String),

    #[error("参数校验失败: {0}")]
    Validation(String),

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 支付服务 Result 类型别名
pub type Result<T> = std::result::Result<T, PaymentError>;

impl PaymentError {
    /// 检查是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::GatewayUnavailable(_) | Self::Database(_))
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        !matches!(
            self,
            Self::Configuration(_)
                | Self::GatewayUnavailable(_)
                | Self::Database(_)
                | Self::Serialization(_)
                | Self::Internal(_)
        )
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::GatewayUnavailable(_) => "GATEWAY_UNAVAILABLE",
            Self::OrderNotFound(_) => "ORDER_NOT_FOUND",
            Self::InvalidCurrency(_) => "INVALID_CURRENCY",
            Self::DuplicateOrder(_) => "DUPLICATE_ORDER",
            Self::InsufficientTokens { .. } => "INSUFFICIENT_TOKENS",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::GatewayUnavailable(format!("请求超时: {}", err))
        } else {
            Self::GatewayUnavailable(err.to_string())
        }
    }
}

/// 是否为唯一约束冲突（PostgreSQL 23505）
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}

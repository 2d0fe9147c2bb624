//! API 错误类型定义
//!
//! 服务层错误映射为 HTTP 状态码和统一错误体 `{ok: false, code, error}`

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use payment_service::PaymentError;

/// API 错误类型
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // 身份错误
    #[error("缺少用户身份")]
    Unauthorized,

    // 请求错误
    #[error("参数验证失败: {0}")]
    Validation(String),
    #[error("不支持的币种: {0}")]
    InvalidCurrency(String),

    // 资源不存在
    #[error("订单不存在: {0}")]
    OrderNotFound(String),
    #[error("用户不存在: {0}")]
    UserNotFound(String),
    #[error("订单没有待完成的 3DS 挑战: {0}")]
    ChallengeNotFound(String),

    // 业务错误
    #[error("代币余额不足: 需要 {required}, 可用 {available}")]
    InsufficientTokens { required: i64, available: i64 },
    #[error("重复的订单: {0}")]
    Conflict(String),

    // 外部依赖
    #[error("网关配置缺失: {0}")]
    Configuration(String),
    #[error("支付网关不可用: {0}")]
    GatewayUnavailable(String),

    // 系统错误
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("内部错误: {0}")]
    Internal(String),
}

impl ApiError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Validation(_) | Self::InvalidCurrency(_) => StatusCode::BAD_REQUEST,
            Self::OrderNotFound(_) | Self::UserNotFound(_) | Self::ChallengeNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::InsufficientTokens { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Configuration(_) | Self::Database(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidCurrency(_) => "INVALID_CURRENCY",
            Self::OrderNotFound(_) => "ORDER_NOT_FOUND",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::ChallengeNotFound(_) => "CHALLENGE_NOT_FOUND",
            Self::InsufficientTokens { .. } => "INSUFFICIENT_TOKENS",
            Self::Conflict(_) => "CONFLICT",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::GatewayUnavailable(_) => "GATEWAY_UNAVAILABLE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息仅记录日志
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "数据库操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Configuration(e) => {
                tracing::error!(error = %e, "支付网关配置缺失");
                "支付服务暂不可用".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "内部错误");
                "服务内部错误，请稍后重试".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "ok": false,
            "code": self.error_code(),
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// 从 validator 错误转换
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

/// 从支付服务错误转换
impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Configuration(msg) => Self::Configuration(msg),
            PaymentError::GatewayUnavailable(msg) => Self::GatewayUnavailable(msg),
            PaymentError::OrderNotFound(id) => Self::OrderNotFound(id),
            PaymentError::InvalidCurrency(code) => Self::InvalidCurrency(code),
            PaymentError::DuplicateOrder(id) => Self::Conflict(id),
            PaymentError::InsufficientTokens {
                required,
                available,
            } => Self::InsufficientTokens {
                required,
                available,
            },
            PaymentError::UserNotFound(id) => Self::UserNotFound(id),
            PaymentError::Validation(msg) => Self::Validation(msg),
            PaymentError::Database(e) => Self::Database(e),
            other => Self::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    fn all_error_variants() -> Vec<(ApiError, StatusCode, &'static str)> {
        vec![
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            (ApiError::Validation("amount".into()), StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            (ApiError::InvalidCurrency("JPY".into()), StatusCode::BAD_REQUEST, "INVALID_CURRENCY"),
            (ApiError::OrderNotFound("order_1".into()), StatusCode::NOT_FOUND, "ORDER_NOT_FOUND"),
            (ApiError::UserNotFound("7".into()), StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
            (ApiError::ChallengeNotFound("order_1".into()), StatusCode::NOT_FOUND, "CHALLENGE_NOT_FOUND"),
            (
                ApiError::InsufficientTokens { required: 10, available: 3 },
                StatusCode::PAYMENT_REQUIRED,
                "INSUFFICIENT_TOKENS",
            ),
            (ApiError::Conflict("order_1".into()), StatusCode::CONFLICT, "CONFLICT"),
            (ApiError::GatewayUnavailable("timeout".into()), StatusCode::BAD_GATEWAY, "GATEWAY_UNAVAILABLE"),
            (ApiError::Configuration("USD".into()), StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR"),
            (ApiError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        ]
    }

    #[test]
    fn test_status_and_code_mapping() {
        for (err, status, code) in all_error_variants() {
            assert_eq!(err.status_code(), status, "{:?}", err);
            assert_eq!(err.error_code(), code, "{:?}", err);
        }
    }

    #[test]
    fn test_payment_error_conversion() {
        let err: ApiError = PaymentError::InvalidCurrency("JPY".into()).into();
        assert!(matches!(err, ApiError::InvalidCurrency(_)));

        let err: ApiError = PaymentError::OrderNotFound("order_1".into()).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err: ApiError = PaymentError::Internal("x".into()).into();
        assert!(matches!(err, ApiError::Internal(_)));
    }

    #[tokio::test]
    async fn test_system_error_is_masked() {
        let response = ApiError::Internal("password=hunter2".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["ok"], false);
        assert_eq!(body["code"], "INTERNAL_ERROR");
        assert!(!body["error"].as_str().unwrap().contains("hunter2"));
    }
}

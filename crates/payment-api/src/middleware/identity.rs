//! 用户身份中间件
//!
//! 身份由上游身份网关注入 `x-user-id` 请求头（受信边界），此处只做解析。
//! 解析成功后将 `ActingUser` 注入请求扩展，缺失或非法时返回 401。

use axum::{body::Body, http::Request, middleware::Next, response::IntoResponse, response::Response};

use crate::error::ApiError;

/// 用户身份请求头
pub const USER_ID_HEADER: &str = "x-user-id";

/// 当前操作用户
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActingUser(pub i64);

/// 身份中间件
pub async fn require_user(mut request: Request<Body>, next: Next) -> Response {
    let user_id = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|id| *id > 0);

    match user_id {
        Some(id) => {
            request.extensions_mut().insert(ActingUser(id));
            next.run(request).await
        }
        None => ApiError::Unauthorized.into_response(),
    }
}

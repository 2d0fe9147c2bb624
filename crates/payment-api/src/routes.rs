//! 路由配置模块
//!
//! 定义所有 REST API 端点的路由映射

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};

use payment_shared::observability::middleware as obs_middleware;

use crate::{handlers, middleware::require_user, state::AppState};

/// 支付路由（公开，由网关与浏览器调用）
pub fn cardserv_routes() -> Router<AppState> {
    Router::new()
        .route("/cardserv/sale", post(handlers::cardserv::sale))
        .route("/cardserv/status", post(handlers::cardserv::status))
        .route("/cardserv/webhook", post(handlers::cardserv::webhook))
        .route(
            "/cardserv/result",
            post(handlers::cardserv::challenge_result)
                .get(handlers::cardserv::challenge_result_fallback),
        )
        .route(
            "/cardserv/challenge/{merchant_order_id}",
            get(handlers::cardserv::challenge_page),
        )
}

/// 代币路由（需要用户身份）
pub fn token_routes() -> Router<AppState> {
    Router::new()
        .route("/tokens/balance", get(handlers::tokens::balance))
        .route("/tokens/ledger", get(handlers::tokens::ledger))
        .route("/documents/charge", post(handlers::tokens::charge_document))
        .route_layer(middleware::from_fn(require_user))
}

/// 计数器路由
pub fn counter_routes() -> Router<AppState> {
    Router::new().route(
        "/metrics/resumes",
        get(handlers::counter::get_resumes).post(handlers::counter::increment_resumes),
    )
}

/// 构建 API 路由
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(cardserv_routes())
        .merge(token_routes())
        .merge(counter_routes())
}

/// 构建完整应用路由（含探针与可观测性中间件）
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state)
}

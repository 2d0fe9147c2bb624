//! 简历生成计数器 API 处理器

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use tracing::warn;

use payment_service::service::counter_service::RESUMES_SEED;

use crate::dto::{CounterIncrementBody, CounterResponse};
use crate::error::Result;
use crate::state::AppState;

const NO_STORE: &str = "no-store, no-cache, must-revalidate, proxy-revalidate";

/// 当前计数
///
/// GET /api/metrics/resumes
///
/// 存储不可用时返回初值，页面展示不受影响
pub async fn get_resumes(State(state): State<AppState>) -> Response {
    let count = match state.counter.get().await {
        Ok(count) => count,
        Err(e) => {
            warn!(error = %e, "读取计数器失败，返回初值");
            RESUMES_SEED
        }
    };
    no_store(Json(CounterResponse { count }))
}

/// 递增计数
///
/// POST /api/metrics/resumes
pub async fn increment_resumes(State(state): State<AppState>, body: Bytes) -> Result<Response> {
    let increment = CounterIncrementBody::parse(&body).normalized();
    let count = state.counter.increment(increment).await?;
    Ok(no_store(Json(CounterResponse { count })))
}

fn no_store(body: impl IntoResponse) -> Response {
    ([(header::CACHE_CONTROL, NO_STORE)], body).into_response()
}

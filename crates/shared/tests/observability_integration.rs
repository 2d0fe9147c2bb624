//! 可观测性模块集成测试
//!
//! 请求 ID 透传、HTTP 追踪中间件与指标记录在完整路由上的组合行为。

use axum::{
    Extension, Router,
    body::Body,
    http::{Request, StatusCode},
    middleware,
    routing::get,
};
use tower::ServiceExt;

use payment_shared::observability::metrics;
use payment_shared::observability::middleware::{
    REQUEST_ID_HEADER, RequestId, http_tracing, request_id,
};
use payment_shared::observability::tracing::init_for_tests;

fn app() -> Router {
    Router::new()
        .route(
            "/orders/{id}",
            get(|Extension(id): Extension<RequestId>| async move { id.as_str().to_string() }),
        )
        .route("/fail", get(|| async { StatusCode::BAD_GATEWAY }))
        .layer(middleware::from_fn(http_tracing))
        .layer(middleware::from_fn(request_id))
}

#[tokio::test]
async fn test_request_id_reaches_handler_and_response() {
    init_for_tests();

    let response = app()
        .oneshot(
            Request::builder()
                .uri("/orders/order_1")
                .header(REQUEST_ID_HEADER, "req-abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-abc");
}

#[tokio::test]
async fn test_generated_request_ids_are_unique() {
    let mut seen = Vec::new();
    for _ in 0..3 {
        let response = app()
            .oneshot(Request::builder().uri("/orders/x").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let id = response.headers()[REQUEST_ID_HEADER]
            .to_str()
            .unwrap()
            .to_string();
        assert!(!seen.contains(&id));
        seen.push(id);
    }
}

#[tokio::test]
async fn test_tracing_passes_error_status_through() {
    let response = app()
        .oneshot(Request::builder().uri("/fail").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
}

#[test]
fn test_payment_metrics_without_recorder() {
    // 未安装 recorder 时全部为空操作
    metrics::record_order_created("EUR");
    metrics::record_reconciliation("sweeper", "noop");
    metrics::record_tokens_credited(1000);
    metrics::record_tokens_charged(10);
    metrics::record_gateway_request("status", "unavailable", 10.0);
    metrics::record_anomaly("webhook_unknown_order");
    metrics::record_orders_swept(0);
    assert!(metrics::get_handle().is_none());
}

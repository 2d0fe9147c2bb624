//! 支付 API 路由测试
//!
//! 内存存储 + 脚本化网关，通过 `tower::ServiceExt::oneshot` 驱动完整路由

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tower::ServiceExt;

use payment_api::{AppState, Dependencies, routes};
use payment_service::{
    Currency, GatewayOutcome, LedgerRepositoryTrait, MemoryStore, PaymentError, PaymentGateway,
    SaleRequest,
};
use payment_service::service::counter_service::MAX_INCREMENT;
use payment_shared::config::AppConfig;

// ==================== 测试网关 ====================

struct ScriptedGateway {
    sale_payload: Value,
    status_payload: Mutex<Value>,
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    fn ensure_currency(&self, currency: Currency) -> payment_service::Result<()> {
        match currency {
            Currency::Usd => Err(PaymentError::Configuration("USD".to_string())),
            _ => Ok(()),
        }
    }

    async fn sale(&self, request: &SaleRequest) -> payment_service::Result<GatewayOutcome> {
        let mut outcome = GatewayOutcome::from_payload(&request.merchant_order_id, &self.sale_payload);
        outcome.raw.sale = Some(self.sale_payload.clone());
        Ok(outcome)
    }

    async fn status(
        &self,
        merchant_order_id: &str,
        _currency: Currency,
    ) -> payment_service::Result<GatewayOutcome> {
        let payload = self.status_payload.lock().clone();
        let mut outcome = GatewayOutcome::from_payload(merchant_order_id, &payload);
        outcome.raw.status = Some(payload);
        Ok(outcome)
    }
}

// ==================== 测试环境 ====================

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    gateway: Arc<ScriptedGateway>,
}

impl TestApp {
    fn new(sale_payload: Value) -> Self {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(ScriptedGateway {
            sale_payload,
            status_payload: Mutex::new(json!({ "orderState": "PROCESSING" })),
        });

        let mut config = AppConfig::default();
        config.gateway.app_url = "https://app.example/".to_string();

        let state = AppState::new(
            &config,
            Dependencies {
                orders: store.clone(),
                ledger: store.clone(),
                counters: store.clone(),
                gateway: gateway.clone(),
                database: None,
            },
        );

        Self {
            router: routes::app(state),
            store,
            gateway,
        }
    }

    fn set_status(&self, state: &str) {
        *self.gateway.status_payload.lock() = json!({ "orderState": state });
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, bytes.to_vec())
    }

    async fn json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, _, bytes) = self.send(request).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn place_order(&self, email: &str) -> String {
        let (status, body) = self.json(post_json("/api/cardserv/sale", sale_body(email, "GBP"))).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body["orderMerchantId"].as_str().unwrap().to_string()
    }
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn sale_body(email: &str, currency: &str) -> Value {
    json!({
        "amount": 10,
        "currency": currency,
        "email": email,
        "description": "Token top-up",
        "card": {
            "cardNumber": "4000 0000 0000 1091",
            "cvv": "123",
            "expiry": "12/30",
            "name": "Jane Roe"
        }
    })
}

// ==================== 下单 ====================

#[tokio::test]
async fn test_sale_returns_challenge_and_form_renders() {
    let app = TestApp::new(json!({
        "orderState": "PROCESSING",
        "threeDSAuth": { "acsUrl": "https://acs.example/3ds", "paReq": "eJxVUt1u" }
    }));

    let (status, body) = app
        .json(post_json("/api/cardserv/sale", sale_body("buyer@example.com", "GBP")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["state"], "PROCESSING");
    assert_eq!(body["threeDS"]["acsUrl"], "https://acs.example/3ds");
    let id = body["orderMerchantId"].as_str().unwrap();

    let (status, headers, html) = app.send(get(&format!("/api/cardserv/challenge/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );
    let html = String::from_utf8(html).unwrap();
    assert!(html.contains("action=\"https://acs.example/3ds\""));
    assert!(html.contains("name=\"PaReq\""));
    assert!(html.contains(&format!("value=\"{}\"", id)));
    assert!(html.contains("https://app.example/api/cardserv/result"));
}

#[tokio::test]
async fn test_sale_invalid_currency_is_bad_request() {
    let app = TestApp::new(json!({ "orderState": "APPROVED" }));

    let (status, body) = app
        .json(post_json("/api/cardserv/sale", sale_body("buyer@example.com", "JPY")))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert_eq!(body["code"], "INVALID_CURRENCY");
    assert_eq!(app.store.order_count(), 0);
}

#[tokio::test]
async fn test_sale_unconfigured_currency_is_masked_server_error() {
    let app = TestApp::new(json!({ "orderState": "APPROVED" }));

    let (status, body) = app
        .json(post_json("/api/cardserv/sale", sale_body("buyer@example.com", "USD")))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "CONFIGURATION_ERROR");
    assert!(!body["error"].as_str().unwrap().contains("USD"));
}

#[tokio::test]
async fn test_sale_malformed_body_is_bad_request() {
    let app = TestApp::new(json!({ "orderState": "APPROVED" }));

    let (status, body) = app
        .json(post_json("/api/cardserv/sale", json!({ "amount": "ten" })))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

// ==================== 状态与 Webhook ====================

#[tokio::test]
async fn test_status_poll_credits_once() {
    let app = TestApp::new(json!({ "orderState": "PROCESSING" }));
    let id = app.place_order("buyer@example.com").await;

    let (_, body) = app
        .json(post_json("/api/cardserv/status", json!({ "orderMerchantId": id })))
        .await;
    assert_eq!(body["state"], "PROCESSING");

    app.set_status("APPROVED");
    for _ in 0..2 {
        let (status, body) = app
            .json(post_json("/api/cardserv/status", json!({ "orderMerchantId": id })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true, "state": "APPROVED" }));
    }

    let user = app
        .store
        .get_user_by_email("buyer@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.token_balance, 1000);
    assert_eq!(app.store.ledger_entries().len(), 1);
}

#[tokio::test]
async fn test_status_missing_id_is_bad_request() {
    let app = TestApp::new(json!({ "orderState": "PROCESSING" }));
    let (status, body) = app.json(post_json("/api/cardserv/status", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn test_webhook_unknown_order_is_not_found() {
    let app = TestApp::new(json!({ "orderState": "PROCESSING" }));
    app.set_status("APPROVED");

    let (status, body) = app
        .json(post_json("/api/cardserv/webhook", json!({ "orderMerchantId": "order_ghost" })))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "ORDER_NOT_FOUND");
    assert!(app.store.ledger_entries().is_empty());
    assert_eq!(app.store.anomalies().len(), 1);
}

#[tokio::test]
async fn test_webhook_malformed_body_records_anomaly() {
    let app = TestApp::new(json!({ "orderState": "PROCESSING" }));

    let request = Request::builder()
        .method("POST")
        .uri("/api/cardserv/webhook")
        .body(Body::from("not json"))
        .unwrap();
    let (status, body) = app.json(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert_eq!(app.store.anomalies().len(), 1);
}

#[tokio::test]
async fn test_webhook_declined_settles_order() {
    let app = TestApp::new(json!({ "orderState": "PROCESSING" }));
    let id = app.place_order("buyer@example.com").await;

    app.set_status("DECLINED");
    let (status, body) = app
        .json(post_json("/api/cardserv/webhook", json!({ "orderMerchantId": id })))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "DECLINED");
    assert!(app.store.ledger_entries().is_empty());
}

// ==================== 3DS 回调 ====================

#[tokio::test]
async fn test_result_callback_redirects_to_processing_page() {
    let app = TestApp::new(json!({
        "orderState": "PROCESSING",
        "threeDSAuth": { "acsUrl": "https://acs.example/3ds", "paReq": "eJxVUt1u" }
    }));
    let id = app.place_order("buyer@example.com").await;
    app.set_status("APPROVED");

    let request = Request::builder()
        .method("POST")
        .uri("/api/cardserv/result")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("PaRes=eJzVWNm&MD={}", id)))
        .unwrap();
    let (status, headers, _) = app.send(request).await;

    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(
        headers[header::LOCATION],
        format!("https://app.example/payment/processing?order={}", id).as_str()
    );
    assert_eq!(app.store.ledger_entries().len(), 1);
}

#[tokio::test]
async fn test_result_callback_without_correlation_still_redirects() {
    let app = TestApp::new(json!({ "orderState": "PROCESSING" }));

    let request = Request::builder()
        .method("POST")
        .uri("/api/cardserv/result")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("cres=eyJ0cmFucyI6IlkifQ"))
        .unwrap();
    let (status, headers, _) = app.send(request).await;

    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(headers[header::LOCATION], "https://app.example/payment/processing");
    assert_eq!(app.store.anomalies().len(), 1);
}

#[tokio::test]
async fn test_result_get_fallback() {
    let app = TestApp::new(json!({ "orderState": "PROCESSING" }));

    let (status, headers, _) = app.send(get("/api/cardserv/result?order=order_42")).await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(
        headers[header::LOCATION],
        "https://app.example/payment/processing?order=order_42"
    );

    let (_, headers, _) = app.send(get("/api/cardserv/result")).await;
    assert_eq!(headers[header::LOCATION], "https://app.example/payment/processing");
}

// ==================== 代币与扣费 ====================

fn with_user(mut request: Request<Body>, user_id: i64) -> Request<Body> {
    request
        .headers_mut()
        .insert("x-user-id", user_id.to_string().parse().unwrap());
    request
}

#[tokio::test]
async fn test_token_routes_require_identity() {
    let app = TestApp::new(json!({ "orderState": "APPROVED" }));
    let (status, body) = app.json(get("/api/tokens/balance")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_document_charge_flow() {
    let app = TestApp::new(json!({ "orderState": "APPROVED" }));
    app.place_order("writer@example.com").await;
    let user = app
        .store
        .get_user_by_email("writer@example.com")
        .await
        .unwrap()
        .unwrap();

    let (status, body) = app
        .json(with_user(
            post_json("/api/documents/charge", json!({ "documentRef": "resume-7" })),
            user.id,
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["charged"], 10);
    assert_eq!(body["tokenBalance"], 990);

    let (_, body) = app.json(with_user(get("/api/tokens/balance"), user.id)).await;
    assert_eq!(body["tokenBalance"], 990);

    let (_, body) = app
        .json(with_user(get("/api/tokens/ledger?limit=10"), user.id))
        .await;
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["entryType"], "DOCUMENT");
    assert_eq!(entries[0]["balanceAfter"], 990);
    assert_eq!(entries[1]["entryType"], "TOP_UP");
}

#[tokio::test]
async fn test_document_charge_insufficient_tokens() {
    let app = TestApp::new(json!({ "orderState": "APPROVED" }));
    let user = app
        .store
        .create_user("broke@example.com", Currency::Gbp)
        .await
        .unwrap();

    let (status, body) = app
        .json(with_user(
            post_json("/api/documents/charge", json!({ "documentRef": "resume-1" })),
            user.id,
        ))
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["code"], "INSUFFICIENT_TOKENS");
}

// ==================== 计数器与探针 ====================

#[tokio::test]
async fn test_resume_counter() {
    let app = TestApp::new(json!({ "orderState": "APPROVED" }));

    let (status, headers, bytes) = app.send(get("/api/metrics/resumes")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CACHE_CONTROL].to_str().unwrap().contains("no-store"));
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({ "count": 16356 }));

    let (_, body) = app
        .json(post_json("/api/metrics/resumes", json!({ "increment": 2 })))
        .await;
    assert_eq!(body["count"], 16358);

    let (_, body) = app
        .json(post_json("/api/metrics/resumes", json!({ "increment": -9 })))
        .await;
    assert_eq!(body["count"], 16358);
}

#[tokio::test]
async fn test_resume_counter_huge_increments_are_capped() {
    let app = TestApp::new(json!({ "orderState": "APPROVED" }));

    let mut last = 16356;
    for _ in 0..3 {
        let (status, body) = app
            .json(post_json("/api/metrics/resumes", json!({ "increment": 9.2e18 })))
            .await;
        assert_eq!(status, StatusCode::OK);
        let count = body["count"].as_i64().unwrap();
        assert_eq!(count, last + MAX_INCREMENT);
        last = count;
    }
}

#[tokio::test]
async fn test_probes_and_request_id() {
    let app = TestApp::new(json!({ "orderState": "APPROVED" }));

    let (status, headers, _) = app.send(get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.contains_key("x-request-id"));

    let (status, body) = app.json(get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["database"], "memory");
}

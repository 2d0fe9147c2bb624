//! Mock CardServ 接口
//!
//! 与真实网关相同的路径与报文字段：
//!
//! - `POST /api/payments/sale/{requestorId}`
//! - `POST /api/payments/status/{requestorId}`
//! - `POST /acs/challenge` 模拟发卡行 ACS，完成后把浏览器送回商户

use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::config::MockGatewayConfig;
use crate::models::{MockPayment, MockState};
use crate::scenarios::{CardScenario, ThreeDsVersion};
use crate::services::WebhookNotifier;
use crate::store::PaymentStore;

/// 网关服务状态
pub struct GatewayState {
    pub payments: PaymentStore,
    pub config: MockGatewayConfig,
    pub webhooks: WebhookNotifier,
}

impl GatewayState {
    pub fn new(config: MockGatewayConfig) -> Self {
        Self {
            payments: PaymentStore::new(),
            webhooks: WebhookNotifier::new(config.send_webhooks),
            config,
        }
    }

    fn acs_url(&self) -> String {
        format!("{}/acs/challenge", self.config.public_url.trim_end_matches('/'))
    }

    /// 处理中的挑战订单附带 threeDSAuth
    fn payload_for(&self, payment: &MockPayment) -> Value {
        let mut payload = payment.status_payload();
        if payment.state != MockState::Processing {
            return payload;
        }

        let reference = format!("{}-{}", payment.system_order_id, payment.merchant_order_id);
        match payment.scenario.challenge() {
            Some(ThreeDsVersion::V1) => {
                payload["threeDSAuth"] = json!({
                    "acsUrl": self.acs_url(),
                    "paReq": format!("PAREQ-{}", reference),
                });
            }
            Some(ThreeDsVersion::V2) => {
                payload["threeDSAuth"] = json!({
                    "acsUrl": self.acs_url(),
                    "creq": format!("CREQ-{}", reference),
                });
            }
            None => {}
        }
        payload
    }
}

// ============================================================================
// 请求 DTO
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleOrder {
    pub order_merchant_id: String,
    pub order_amount: String,
    pub order_currency_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleCard {
    pub card_number: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleUrls {
    pub result_url: Option<String>,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SaleBody {
    pub order: SaleOrder,
    pub card: SaleCard,
    #[serde(default)]
    pub urls: SaleUrls,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    pub order_merchant_id: String,
}

/// ACS 表单，3DS1 与 3DS2 字段都可选
#[derive(Debug, Default, Deserialize)]
pub struct AcsForm {
    #[serde(rename = "PaReq")]
    pub pa_req: Option<String>,
    #[serde(rename = "MD")]
    pub md: Option<String>,
    #[serde(rename = "TermUrl")]
    pub term_url: Option<String>,
    pub creq: Option<String>,
    #[serde(rename = "threeDSSessionData")]
    pub three_ds_session_data: Option<String>,
}

// ============================================================================
// 路由定义
// ============================================================================

pub fn gateway_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/api/payments/sale/{requestor_id}", post(sale))
        .route("/api/payments/status/{requestor_id}", post(status))
        .route("/acs/challenge", post(acs_challenge))
        .route("/payments", get(list_payments))
}

// ============================================================================
// 路由处理器
// ============================================================================

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn error_reply(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({ "orderState": "ERROR", "errorMessage": message })),
    )
        .into_response()
}

/// 下单
///
/// POST /api/payments/sale/{requestor_id}
async fn sale(
    State(state): State<Arc<GatewayState>>,
    Path(requestor_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<SaleBody>, JsonRejection>,
) -> Response {
    if !state.config.authorize(&requestor_id, bearer_token(&headers)) {
        warn!(requestor_id = %requestor_id, "下单凭据无效");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let Json(body) = match body {
        Ok(body) => body,
        Err(e) => return error_reply(StatusCode::BAD_REQUEST, &e.body_text()),
    };

    let scenario = CardScenario::from_card(&body.card.card_number);
    let card_number: String = body
        .card
        .card_number
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let now = Utc::now();
    let payment = MockPayment {
        merchant_order_id: body.order.order_merchant_id,
        system_order_id: state.payments.next_system_order_id(),
        requestor_id,
        amount: body.order.order_amount,
        currency: body.order.order_currency_code,
        card_last4: card_number
            .get(card_number.len().saturating_sub(4)..)
            .unwrap_or_default()
            .to_string(),
        scenario,
        state: scenario.initial_state(),
        status_checks: 0,
        result_url: body.urls.result_url,
        webhook_url: body.urls.webhook_url,
        created_at: now,
        updated_at: now,
    };

    if !state.payments.insert(payment.clone()) {
        warn!(merchant_order_id = %payment.merchant_order_id, "重复的商户订单号");
        return error_reply(StatusCode::CONFLICT, "duplicate orderMerchantId");
    }

    info!(
        merchant_order_id = %payment.merchant_order_id,
        system_order_id = payment.system_order_id,
        scenario = ?payment.scenario,
        state = ?payment.state,
        "收到下单"
    );

    if payment.state.is_terminal() {
        state.webhooks.notify(&payment);
    }
    Json(state.payload_for(&payment)).into_response()
}

/// 状态查询
///
/// POST /api/payments/status/{requestor_id}
async fn status(
    State(state): State<Arc<GatewayState>>,
    Path(requestor_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<StatusBody>, JsonRejection>,
) -> Response {
    if !state.config.authorize(&requestor_id, bearer_token(&headers)) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let Json(body) = match body {
        Ok(body) => body,
        Err(e) => return error_reply(StatusCode::BAD_REQUEST, &e.body_text()),
    };

    let Some((payment, settled)) = state
        .payments
        .record_status_check(&body.order_merchant_id, state.config.settle_after_checks)
    else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "errorMessage": "order not found" })),
        )
            .into_response();
    };

    if settled {
        info!(merchant_order_id = %payment.merchant_order_id, "处理中订单已批准");
        state.webhooks.notify(&payment);
    }
    Json(state.payload_for(&payment)).into_response()
}

/// ACS 挑战
///
/// POST /acs/challenge
///
/// 直接视为持卡人验证通过，按场景推进订单后自动提交回商户
async fn acs_challenge(
    State(state): State<Arc<GatewayState>>,
    Form(form): Form<AcsForm>,
) -> Response {
    let Some(merchant_order_id) = form
        .md
        .as_deref()
        .or(form.three_ds_session_data.as_deref())
        .map(str::trim)
        .filter(|id| !id.is_empty())
    else {
        return (StatusCode::BAD_REQUEST, Html("<p>missing MD</p>".to_string())).into_response();
    };

    let Some(payment) = state.payments.complete_challenge(merchant_order_id) else {
        return (StatusCode::NOT_FOUND, Html("<p>unknown order</p>".to_string())).into_response();
    };
    info!(merchant_order_id = %payment.merchant_order_id, state = ?payment.state, "3DS 挑战完成");
    state.webhooks.notify(&payment);

    let (fields, target) = if form.creq.is_some() {
        (
            vec![
                ("cres", format!("CRES-{}", payment.system_order_id)),
                ("threeDSSessionData", payment.merchant_order_id.clone()),
            ],
            payment.challenge_return_url(),
        )
    } else {
        (
            vec![
                ("PaRes", format!("PARES-{}", payment.system_order_id)),
                ("MD", merchant_order_id.to_string()),
            ],
            form.term_url.clone().or_else(|| payment.challenge_return_url()),
        )
    };

    let Some(target) = target else {
        return Html("<p>challenge complete</p>".to_string()).into_response();
    };
    Html(render_return_form(&target, &fields)).into_response()
}

/// 列出所有模拟支付
///
/// GET /payments
async fn list_payments(State(state): State<Arc<GatewayState>>) -> Json<Vec<MockPayment>> {
    Json(state.payments.list())
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn render_return_form(action: &str, fields: &[(&str, String)]) -> String {
    let inputs: String = fields
        .iter()
        .map(|(name, value)| {
            format!(
                "<input type=\"hidden\" name=\"{}\" value=\"{}\"/>\n",
                name,
                escape(value)
            )
        })
        .collect();
    format!(
        "<!DOCTYPE html>\n<html><body onload=\"document.forms[0].submit()\">\n\
         <form method=\"POST\" action=\"{}\">\n{}</form>\n</body></html>\n",
        escape(action),
        inputs
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn app(config: MockGatewayConfig) -> Router {
        gateway_routes().with_state(Arc::new(GatewayState::new(config)))
    }

    fn quiet_config() -> MockGatewayConfig {
        MockGatewayConfig {
            public_url: "http://gw.test".to_string(),
            send_webhooks: false,
            ..Default::default()
        }
    }

    fn sale_body(id: &str, card: &str) -> Value {
        json!({
            "order": {
                "orderMerchantId": id,
                "orderDescription": "Payment",
                "orderAmount": "10.00",
                "orderCurrencyCode": "GBP"
            },
            "card": { "cardNumber": card, "cvv2": "123" },
            "urls": {
                "resultUrl": format!("https://app.test/payment/processing?order={}", id),
                "webhookUrl": "https://app.test/api/cardserv/webhook"
            }
        })
    }

    fn post(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, text) = send(app, request).await;
        (status, serde_json::from_str(&text).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_sale_approves_plain_card() {
        let app = app(quiet_config());
        let (status, body) = send_json(
            &app,
            post("/api/payments/sale/dev-gbp", sale_body("order_1", "4111 1111 1111 1111"), None),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["orderState"], "APPROVED");
        assert_eq!(body["orderMerchantId"], "order_1");
        assert!(body["orderSystemId"].is_u64());
        assert_eq!(
            body["outputRedirectToUrl"],
            "https://app.test/payment/processing?order=order_1"
        );
    }

    #[tokio::test]
    async fn test_sale_rejects_bad_token() {
        let config = MockGatewayConfig {
            requestors: HashMap::from([("dev-gbp".to_string(), "dev-token".to_string())]),
            ..quiet_config()
        };
        let app = app(config);

        let (status, _) = send(
            &app,
            post("/api/payments/sale/dev-gbp", sale_body("order_1", "4111111111111111"), Some("nope")),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app,
            post(
                "/api/payments/sale/dev-gbp",
                sale_body("order_1", "4111111111111111"),
                Some("dev-token"),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_duplicate_order_conflicts() {
        let app = app(quiet_config());
        let request = || post("/api/payments/sale/dev-gbp", sale_body("order_1", "4111111111111111"), None);
        send(&app, request()).await;
        let (status, body) = send_json(&app, request()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["orderState"], "ERROR");
    }

    #[tokio::test]
    async fn test_pending_card_settles_on_status_checks() {
        let app = app(quiet_config());
        let (_, body) = send_json(
            &app,
            post("/api/payments/sale/dev-gbp", sale_body("order_p", "4000000000000259"), None),
        )
        .await;
        assert_eq!(body["orderState"], "PROCESSING");

        let status_request =
            || post("/api/payments/status/dev-gbp", json!({ "orderMerchantId": "order_p" }), None);
        let (_, first) = send_json(&app, status_request()).await;
        assert_eq!(first["orderState"], "PROCESSING");
        let (_, second) = send_json(&app, status_request()).await;
        assert_eq!(second["orderState"], "APPROVED");
    }

    #[tokio::test]
    async fn test_status_unknown_order() {
        let app = app(quiet_config());
        let (status, _) = send(
            &app,
            post("/api/payments/status/dev-gbp", json!({ "orderMerchantId": "ghost" }), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_3ds1_challenge_round_trip() {
        let app = app(quiet_config());
        let (_, body) = send_json(
            &app,
            post("/api/payments/sale/dev-gbp", sale_body("order_c", "4000000000001091"), None),
        )
        .await;
        assert_eq!(body["orderState"], "PROCESSING");
        assert_eq!(body["threeDSAuth"]["acsUrl"], "http://gw.test/acs/challenge");
        assert!(body["threeDSAuth"]["paReq"].is_string());

        let acs = Request::builder()
            .method("POST")
            .uri("/acs/challenge")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(
                "PaReq=x&MD=order_c&TermUrl=https%3A%2F%2Fapp.test%2Fapi%2Fcardserv%2Fresult",
            ))
            .unwrap();
        let (status, html) = send(&app, acs).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("action=\"https://app.test/api/cardserv/result\""));
        assert!(html.contains("name=\"MD\" value=\"order_c\""));
        assert!(html.contains("name=\"PaRes\""));

        let (_, body) = send_json(
            &app,
            post("/api/payments/status/dev-gbp", json!({ "orderMerchantId": "order_c" }), None),
        )
        .await;
        assert_eq!(body["orderState"], "APPROVED");
        assert!(body.get("threeDSAuth").is_none());
    }

    #[tokio::test]
    async fn test_3ds2_challenge_returns_to_derived_url() {
        let app = app(quiet_config());
        let (_, body) = send_json(
            &app,
            post("/api/payments/sale/dev-gbp", sale_body("order_v2", "4000 0000 0000 3220"), None),
        )
        .await;
        assert!(body["threeDSAuth"]["creq"].is_string());

        let acs = Request::builder()
            .method("POST")
            .uri("/acs/challenge")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("creq=x&threeDSSessionData=order_v2"))
            .unwrap();
        let (_, html) = send(&app, acs).await;
        assert!(html.contains("action=\"https://app.test/api/cardserv/result\""));
        assert!(html.contains("name=\"threeDSSessionData\" value=\"order_v2\""));
    }

    #[tokio::test]
    async fn test_acs_unknown_order() {
        let app = app(quiet_config());
        let acs = Request::builder()
            .method("POST")
            .uri("/acs/challenge")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("PaReq=x&MD=ghost"))
            .unwrap();
        let (status, _) = send(&app, acs).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

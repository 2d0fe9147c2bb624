//! CardServ 支付 API 处理器
//!
//! 下单、状态查询、Webhook、3DS 挑战页面与发卡行回调。
//! 所有状态变化都经由对账引擎完成，处理器只负责协议转换。

use axum::{
    Form, Json,
    body::Bytes,
    extract::{Path, Query, State, rejection::FormRejection, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use serde_json::{Value, json};
use tracing::{info, warn};
use validator::Validate;

use payment_service::challenge::{
    ChallengeCallback, challenge_term_url, find_challenge, processing_page_url,
    render_challenge_form,
};
use payment_service::{AnomalyKind, NewAnomaly};

use crate::dto::{OrderRefBody, OrderStateResponse, ResultQuery, SaleBody, SaleResponse};
use crate::error::{ApiError, Result};
use crate::state::AppState;

/// 创建支付订单
///
/// POST /api/cardserv/sale
pub async fn sale(
    State(state): State<AppState>,
    body: std::result::Result<Json<SaleBody>, JsonRejection>,
) -> Result<Json<SaleResponse>> {
    let Json(body) = body.map_err(|e| ApiError::Validation(e.body_text()))?;
    body.validate()?;
    let amount_minor = body
        .amount_minor()
        .ok_or_else(|| ApiError::Validation("金额无效".to_string()))?;

    let result = state
        .orders
        .create_order(body.into_command(amount_minor))
        .await?;

    info!(
        merchant_order_id = %result.merchant_order_id,
        state = %result.state,
        "下单请求完成"
    );
    Ok(Json(result.into()))
}

/// 查询订单状态（处理中页面轮询）
///
/// POST /api/cardserv/status
pub async fn status(
    State(state): State<AppState>,
    body: std::result::Result<Json<OrderRefBody>, JsonRejection>,
) -> Result<Json<OrderStateResponse>> {
    let Json(body) = body.map_err(|e| ApiError::Validation(e.body_text()))?;
    let merchant_order_id = body
        .merchant_order_id()
        .ok_or_else(|| ApiError::Validation("缺少 orderMerchantId".to_string()))?;

    let outcome = state.engine.on_client_poll(merchant_order_id).await?;
    Ok(Json(OrderStateResponse::new(
        outcome.state,
        outcome.redirect_url,
    )))
}

/// 网关 Webhook
///
/// POST /api/cardserv/webhook
///
/// 报文无法解析或缺少订单号时记录异常并返回 400，未知订单返回 404
pub async fn webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<OrderStateResponse>> {
    let parsed = serde_json::from_slice::<Value>(&body).ok();
    let merchant_order_id = parsed
        .as_ref()
        .and_then(|v| serde_json::from_value::<OrderRefBody>(v.clone()).ok())
        .and_then(|b| b.merchant_order_id().map(str::to_string));

    let Some(merchant_order_id) = merchant_order_id else {
        let detail = match parsed {
            Some(payload) => json!({ "payload": payload }),
            None => json!({ "bodyLength": body.len() }),
        };
        state
            .engine
            .report_anomaly(NewAnomaly::new(AnomalyKind::WebhookMalformed, None, detail))
            .await;
        return Err(ApiError::Validation("缺少 orderMerchantId".to_string()));
    };

    let outcome = state.engine.on_webhook(&merchant_order_id).await?;
    Ok(Json(OrderStateResponse::new(outcome.state, None)))
}

/// 3DS 挑战页面：渲染自动提交到 ACS 的表单
///
/// GET /api/cardserv/challenge/{merchant_order_id}
pub async fn challenge_page(
    State(state): State<AppState>,
    Path(merchant_order_id): Path<String>,
) -> Result<Response> {
    let order = state
        .engine
        .find_order(&merchant_order_id)
        .await?
        .ok_or_else(|| ApiError::OrderNotFound(merchant_order_id.clone()))?;

    // 已有结果的订单不再进入挑战
    if order.is_terminal() {
        return Ok(redirect(&processing_page_url(
            &state.app_url,
            Some(&merchant_order_id),
        )));
    }

    let challenge =
        find_challenge(&order).ok_or_else(|| ApiError::ChallengeNotFound(merchant_order_id.clone()))?;
    let html = render_challenge_form(
        &challenge,
        &merchant_order_id,
        &challenge_term_url(&state.app_url),
    );
    Ok(Html(html).into_response())
}

/// 发卡行回调（3DS 完成后浏览器提交）
///
/// POST /api/cardserv/result
///
/// 无论对账结果如何都重定向到处理中页面，从不返回错误状态
pub async fn challenge_result(
    State(state): State<AppState>,
    form: std::result::Result<Form<ChallengeCallback>, FormRejection>,
) -> Response {
    let callback = match form {
        Ok(Form(callback)) => callback,
        Err(e) => {
            warn!(error = %e, "3DS 回调表单无法解析");
            ChallengeCallback::default()
        }
    };

    let resolution = state.engine.on_challenge_result(&callback).await;
    let target = processing_page_url(&state.app_url, resolution.merchant_order_id());
    info!(redirect = %target, "3DS 回调处理完成");
    redirect(&target)
}

/// 发卡行以 GET 方式回跳时的回退
///
/// GET /api/cardserv/result?order=
pub async fn challenge_result_fallback(
    State(state): State<AppState>,
    Query(query): Query<ResultQuery>,
) -> Response {
    let order = query
        .order
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());
    redirect(&processing_page_url(&state.app_url, order))
}

fn redirect(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

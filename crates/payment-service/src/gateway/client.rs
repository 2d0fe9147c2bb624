//! CardServ HTTP 客户端

use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use payment_shared::config::GatewayConfig;
use payment_shared::observability::metrics;
use payment_shared::retry::RetryPolicy;

use super::types::{GatewayOutcome, SaleRequest};
use super::{GatewayProfile, PaymentGateway};
use crate::challenge::processing_page_url;
use crate::error::{PaymentError, Result};
use crate::models::Currency;

/// CardServ 客户端
///
/// 每个请求都带有超时，超时与网络错误统一归为 GatewayUnavailable
pub struct CardServClient {
    http: reqwest::Client,
    config: GatewayConfig,
    poll_policy: RetryPolicy,
}

impl CardServClient {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| PaymentError::Configuration(format!("无法创建 HTTP 客户端: {}", e)))?;
        let poll_policy = RetryPolicy::from(&config.status_poll);

        Ok(Self {
            http,
            config,
            poll_policy,
        })
    }

    /// 覆盖下单后的状态轮询策略
    pub fn with_poll_policy(mut self, policy: RetryPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    fn app_url(&self) -> &str {
        self.config.app_url.trim_end_matches('/')
    }

    /// 构造下单报文
    pub(crate) fn build_sale_body(
        &self,
        request: &SaleRequest,
        profile: &GatewayProfile,
    ) -> Result<Value> {
        let (expire_month, expire_year) = request
            .card
            .expiry_parts()
            .ok_or_else(|| PaymentError::Validation("卡片有效期格式应为 MM/YY".to_string()))?;
        let (first_name, last_name) = request.card.holder_names();
        let browser = &request.browser;
        let billing = &request.billing;

        let description = if request.description.trim().is_empty() {
            "Payment"
        } else {
            request.description.trim()
        };

        Ok(json!({
            "order": {
                "orderMerchantId": request.merchant_order_id,
                "orderDescription": description,
                "orderAmount": format_amount(request.amount_minor),
                "orderCurrencyCode": profile.currency.code(),
                "challengeIndicator": "01",
            },
            "browser": {
                "ipAddress": browser.ip_address,
                "acceptHeader": browser.accept_header,
                "colorDepth": browser.color_depth,
                "javascriptEnabled": "true",
                "acceptLanguage": browser.accept_language,
                "screenHeight": browser.screen_height,
                "screenWidth": browser.screen_width,
                "timeZone": browser.time_zone,
                "userAgent": browser.user_agent,
                "javaEnabled": "false",
            },
            "customer": {
                "firstname": first_name,
                "lastname": last_name,
                "customerEmail": request.email,
                "address": {
                    "countryCode": profile.country,
                    "zipCode": billing.postal_code.as_deref().unwrap_or("SW1A1AA"),
                    "city": billing.city.as_deref().unwrap_or("London"),
                    "line1": billing.address.as_deref().unwrap_or("10 Downing Street"),
                },
            },
            "card": {
                "cardNumber": request.card.normalized_number(),
                "cvv2": request.card.cvv,
                "expireMonth": expire_month,
                "expireYear": expire_year,
                "cardPrintedName": request.card.name,
            },
            "urls": {
                "resultUrl": processing_page_url(self.app_url(), Some(request.merchant_order_id.as_str())),
                "webhookUrl": format!("{}/api/cardserv/webhook", self.app_url()),
            },
        }))
    }

    /// 发送 JSON 请求并解析响应
    ///
    /// 5xx 与无法解析的响应体视为网关不可用；401/403 视为凭据配置错误
    async fn post_json(
        &self,
        operation: &'static str,
        url: &str,
        token: &str,
        body: &Value,
    ) -> Result<Value> {
        let started = Instant::now();
        let result = self.send(url, token, body).await;
        let label = match &result {
            Ok(_) => "ok",
            Err(PaymentError::Configuration(_)) => "rejected",
            Err(_) => "unavailable",
        };
        metrics::record_gateway_request(operation, label, started.elapsed().as_secs_f64());
        result
    }

    async fn send(&self, url: &str, token: &str, body: &Value) -> Result<Value> {
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(PaymentError::Configuration(format!(
                "网关拒绝凭据: HTTP {}",
                status.as_u16()
            )));
        }
        if status.is_server_error() {
            return Err(PaymentError::GatewayUnavailable(format!(
                "网关返回 HTTP {}",
                status.as_u16()
            )));
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            PaymentError::GatewayUnavailable(format!("无法解析网关响应 (HTTP {}): {}", status, e))
        })
    }

    async fn query_status(
        &self,
        profile: &GatewayProfile,
        merchant_order_id: &str,
        system_order_id: Option<&str>,
    ) -> Result<Value> {
        let mut body = json!({ "orderMerchantId": merchant_order_id });
        if let Some(system_order_id) = system_order_id {
            body["orderSystemId"] = Value::String(system_order_id.to_string());
        }
        self.post_json("status", &profile.status_url(), &profile.token, &body)
            .await
    }
}

#[async_trait]
impl PaymentGateway for CardServClient {
    fn ensure_currency(&self, currency: Currency) -> Result<()> {
        GatewayProfile::resolve(&self.config, currency).map(|_| ())
    }

    #[instrument(skip(self, request), fields(merchant_order_id = %request.merchant_order_id, currency = %request.currency))]
    async fn sale(&self, request: &SaleRequest) -> Result<GatewayOutcome> {
        let profile = GatewayProfile::resolve(&self.config, request.currency)?;
        let body = self.build_sale_body(request, &profile)?;
        debug!(card = ?request.card, "发送下单请求");

        let sale_payload = self
            .post_json("sale", &profile.sale_url(), &profile.token, &body)
            .await?;
        let mut outcome = GatewayOutcome::from_payload(&request.merchant_order_id, &sale_payload);
        outcome.raw.sale = Some(sale_payload);

        if outcome.is_actionable() {
            info!(state = %outcome.order_state, "下单响应已给出结果，跳过轮询");
            return Ok(outcome);
        }

        for (attempt, delay) in self.poll_policy.delays().enumerate() {
            tokio::time::sleep(delay).await;

            let system_order_id = outcome.system_order_id.clone();
            match self
                .query_status(
                    &profile,
                    &request.merchant_order_id,
                    system_order_id.as_deref(),
                )
                .await
            {
                Ok(payload) => {
                    outcome.absorb_status(payload);
                    if outcome.is_actionable() {
                        break;
                    }
                }
                // 配置错误不会因重试而恢复
                Err(e @ PaymentError::Configuration(_)) => return Err(e),
                Err(e) => {
                    warn!(attempt, error = %e, "下单后状态轮询失败");
                }
            }
        }

        info!(
            state = %outcome.order_state,
            has_redirect = outcome.redirect_url.is_some(),
            has_challenge = outcome.challenge.is_some(),
            "下单完成"
        );
        Ok(outcome)
    }

    #[instrument(skip(self))]
    async fn status(&self, merchant_order_id: &str, currency: Currency) -> Result<GatewayOutcome> {
        let profile = GatewayProfile::resolve(&self.config, currency)?;
        let payload = self.query_status(&profile, merchant_order_id, None).await?;

        let mut outcome = GatewayOutcome::from_payload(merchant_order_id, &payload);
        outcome.raw.status = Some(payload);
        Ok(outcome)
    }
}

/// 最小货币单位格式化为两位小数
fn format_amount(amount_minor: i64) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

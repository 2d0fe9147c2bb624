//! 商户 Webhook 回调

use std::time::Duration;

use tracing::{info, warn};

use crate::models::MockPayment;

/// 回调发送器
///
/// 每次通知在独立任务中发送，失败只记录日志，不重试
#[derive(Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
    enabled: bool,
}

impl WebhookNotifier {
    pub fn new(enabled: bool) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self { http, enabled }
    }

    pub fn notify(&self, payment: &MockPayment) {
        if !self.enabled {
            return;
        }
        let Some(url) = payment.webhook_url.clone() else {
            return;
        };

        let http = self.http.clone();
        let body = payment.webhook_payload();
        let merchant_order_id = payment.merchant_order_id.clone();
        tokio::spawn(async move {
            match http.post(&url).json(&body).send().await {
                Ok(response) => info!(
                    merchant_order_id = %merchant_order_id,
                    status = response.status().as_u16(),
                    "Webhook 已发送"
                ),
                Err(e) => warn!(
                    merchant_order_id = %merchant_order_id,
                    url = %url,
                    error = %e,
                    "Webhook 发送失败"
                ),
            }
        });
    }
}

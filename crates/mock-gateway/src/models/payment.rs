//! 模拟支付记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::scenarios::CardScenario;

/// 网关侧订单状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MockState {
    Processing,
    Approved,
    Declined,
    Error,
}

impl MockState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }
}

/// 一笔模拟支付
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockPayment {
    pub merchant_order_id: String,
    pub system_order_id: u64,
    pub requestor_id: String,
    pub amount: String,
    pub currency: String,
    pub card_last4: String,
    pub scenario: CardScenario,
    pub state: MockState,
    /// 已收到的状态查询次数
    pub status_checks: u32,
    pub result_url: Option<String>,
    pub webhook_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MockPayment {
    /// 3DS 挑战完成后浏览器回传的商户地址（由 webhook 地址推导）
    pub fn challenge_return_url(&self) -> Option<String> {
        self.webhook_url
            .as_deref()
            .and_then(|url| url.strip_suffix("/webhook"))
            .map(|base| format!("{}/result", base))
    }

    /// 网关状态报文
    pub fn status_payload(&self) -> Value {
        let mut payload = json!({
            "orderMerchantId": self.merchant_order_id,
            "orderSystemId": self.system_order_id,
            "orderState": self.state,
            "orderAmount": self.amount,
            "orderCurrencyCode": self.currency,
        });

        if self.state == MockState::Approved {
            if let Some(url) = &self.result_url {
                payload["outputRedirectToUrl"] = Value::String(url.clone());
            }
        }
        if self.state == MockState::Declined {
            payload["errorMessage"] = Value::String("Do not honor".to_string());
        }
        payload
    }

    /// Webhook 通知报文
    pub fn webhook_payload(&self) -> Value {
        json!({
            "orderMerchantId": self.merchant_order_id,
            "orderSystemId": self.system_order_id,
            "orderState": self.state,
        })
    }
}

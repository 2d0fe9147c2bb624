//! 网关请求与响应类型
//!
//! 网关响应字段不稳定，这里只提取对账需要的字段，原始报文完整保留用于审计

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Currency, OrderState};

/// 银行卡信息
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDetails {
    pub card_number: String,
    pub cvv: String,
    /// MM/YY
    pub expiry: String,
    /// 卡面姓名
    pub name: String,
}

impl CardDetails {
    /// 去除空白后的卡号
    pub fn normalized_number(&self) -> String {
        self.card_number.chars().filter(|c| !c.is_whitespace()).collect()
    }

    /// 拆分有效期，年份保持两位
    pub fn expiry_parts(&self) -> Option<(String, String)> {
        let (month, year) = self.expiry.trim().split_once('/')?;
        let (month, year) = (month.trim(), year.trim());
        let valid = month.len() == 2
            && year.len() == 2
            && month.chars().chain(year.chars()).all(|c| c.is_ascii_digit())
            && matches!(month.parse::<u8>(), Ok(1..=12));
        valid.then(|| (month.to_string(), year.to_string()))
    }

    /// 持卡人姓、名，缺失时使用 John / Doe
    pub fn holder_names(&self) -> (String, String) {
        let mut parts = self.name.split_whitespace();
        let first = parts.next().unwrap_or("John").to_string();
        let last = parts.next().unwrap_or("Doe").to_string();
        (first, last)
    }

    /// 脱敏卡号（仅保留后四位）
    pub fn masked_number(&self) -> String {
        let digits = self.normalized_number();
        let tail: String = digits
            .chars()
            .skip(digits.len().saturating_sub(4))
            .collect();
        format!("****{}", tail)
    }
}

impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardDetails")
            .field("card_number", &self.masked_number())
            .field("cvv", &"***")
            .field("expiry", &self.expiry)
            .field("name", &self.name)
            .finish()
    }
}

/// 账单地址，缺省字段使用网关测试环境接受的默认值
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingAddress {
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
}

/// 3DS 风险评估所需的浏览器指纹
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserInfo {
    pub ip_address: String,
    pub accept_header: String,
    pub color_depth: u32,
    pub accept_language: String,
    pub screen_height: u32,
    pub screen_width: u32,
    pub time_zone: i32,
    pub user_agent: String,
}

impl Default for BrowserInfo {
    fn default() -> Self {
        Self {
            ip_address: "8.8.8.8".to_string(),
            accept_header: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                .to_string(),
            color_depth: 32,
            accept_language: "en-US".to_string(),
            screen_height: 1080,
            screen_width: 1920,
            time_zone: 0,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome Safari"
                .to_string(),
        }
    }
}

/// 下单请求
#[derive(Debug, Clone)]
pub struct SaleRequest {
    pub merchant_order_id: String,
    pub amount_minor: i64,
    pub currency: Currency,
    pub description: String,
    pub email: String,
    pub card: CardDetails,
    pub billing: BillingAddress,
    pub browser: BrowserInfo,
}

/// 3DS 挑战描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreeDsChallenge {
    pub acs_url: String,
    /// 3DS1
    pub pa_req: Option<String>,
    /// 3DS2
    pub creq: Option<String>,
    /// 网关指定的 MD，缺省时使用商户订单号
    pub md: Option<String>,
}

impl ThreeDsChallenge {
    /// 从网关报文提取挑战描述（`threeDSAuth`）
    ///
    /// 需要 ACS 地址以及 PaReq / CReq 至少其一
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let auth = payload
            .get("threeDSAuth")
            .or_else(|| payload.get("threeDSChallenge"))?;
        let field = |name: &str| {
            auth.get(name)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let acs_url = field("acsUrl")?;
        let pa_req = field("paReq");
        let creq = field("creq");
        if pa_req.is_none() && creq.is_none() {
            return None;
        }

        Some(Self {
            acs_url,
            pa_req,
            creq,
            md: field("md"),
        })
    }
}

/// 按优先级选取跳转地址
///
/// redirectData.redirectUrl > redirectData.threeDSRedirectUrl > outputRedirectToUrl > redirectUrl
pub fn pick_redirect_url(payload: &Value) -> Option<String> {
    [
        payload.pointer("/redirectData/redirectUrl"),
        payload.pointer("/redirectData/threeDSRedirectUrl"),
        payload.get("outputRedirectToUrl"),
        payload.get("redirectUrl"),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .map(str::trim)
    .find(|s| !s.is_empty())
    .map(str::to_string)
}

/// 网关订单号，可能是字符串或数字
pub fn extract_system_order_id(payload: &Value) -> Option<String> {
    match payload.get("orderSystemId")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// 本次交互的原始报文
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawExchange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
}

/// 归一化后的网关结果
#[derive(Debug, Clone)]
pub struct GatewayOutcome {
    pub merchant_order_id: String,
    pub system_order_id: Option<String>,
    pub order_state: OrderState,
    pub redirect_url: Option<String>,
    pub challenge: Option<ThreeDsChallenge>,
    pub raw: RawExchange,
}

impl GatewayOutcome {
    /// 从单个网关报文归一化
    pub fn from_payload(merchant_order_id: &str, payload: &Value) -> Self {
        Self {
            merchant_order_id: merchant_order_id.to_string(),
            system_order_id: extract_system_order_id(payload),
            order_state: OrderState::from_gateway(
                payload.get("orderState").and_then(Value::as_str),
            ),
            redirect_url: pick_redirect_url(payload),
            challenge: ThreeDsChallenge::from_payload(payload),
            raw: RawExchange::default(),
        }
    }

    /// 终态、跳转地址或挑战描述任一出现即可停止轮询
    pub fn is_actionable(&self) -> bool {
        self.order_state.is_terminal() || self.redirect_url.is_some() || self.challenge.is_some()
    }

    /// 合并一次状态查询的结果，已知的网关订单号不会被空值覆盖
    pub fn absorb_status(&mut self, payload: Value) {
        let polled = Self::from_payload(&self.merchant_order_id, &payload);
        self.order_state = polled.order_state;
        self.system_order_id = polled.system_order_id.or(self.system_order_id.take());
        self.redirect_url = polled.redirect_url;
        self.challenge = polled.challenge;
        self.raw.status = Some(payload);
    }

    /// 最能代表当前状态的报文（优先状态查询）
    pub fn latest_payload(&self) -> Value {
        self.raw
            .status
            .clone()
            .or_else(|| self.raw.sale.clone())
            .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn card(expiry: &str, name: &str) -> CardDetails {
        CardDetails {
            card_number: "4111 1111 1111 1111".to_string(),
            cvv: "123".to_string(),
            expiry: expiry.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_card_helpers() {
        let c = card("07/26", "Jane Smith");
        assert_eq!(c.normalized_number(), "4111111111111111");
        assert_eq!(c.expiry_parts(), Some(("07".to_string(), "26".to_string())));
        assert_eq!(c.holder_names(), ("Jane".to_string(), "Smith".to_string()));
        assert_eq!(c.masked_number(), "****1111");
        assert!(!format!("{:?}", c).contains("4111111111111111"));
    }

    #[test]
    fn test_card_expiry_validation() {
        assert!(card("13/26", "x").expiry_parts().is_none());
        assert!(card("07/2026", "x").expiry_parts().is_none());
        assert!(card("0726", "x").expiry_parts().is_none());
    }

    #[test]
    fn test_holder_name_defaults() {
        assert_eq!(
            card("07/26", "").holder_names(),
            ("John".to_string(), "Doe".to_string())
        );
        assert_eq!(
            card("07/26", "Cher").holder_names(),
            ("Cher".to_string(), "Doe".to_string())
        );
    }

    #[test]
    fn test_redirect_priority() {
        let payload = json!({
            "redirectUrl": "https://d",
            "outputRedirectToUrl": "https://c",
            "redirectData": {"threeDSRedirectUrl": "https://b", "redirectUrl": "https://a"}
        });
        assert_eq!(pick_redirect_url(&payload).as_deref(), Some("https://a"));

        let payload = json!({"redirectUrl": "https://d", "outputRedirectToUrl": ""});
        assert_eq!(pick_redirect_url(&payload).as_deref(), Some("https://d"));

        assert_eq!(pick_redirect_url(&json!({})), None);
    }

    #[test]
    fn test_challenge_extraction() {
        let payload = json!({"threeDSAuth": {"acsUrl": "https://acs", "creq": "abc"}});
        let challenge = ThreeDsChallenge::from_payload(&payload).unwrap();
        assert_eq!(challenge.acs_url, "https://acs");
        assert_eq!(challenge.creq.as_deref(), Some("abc"));
        assert!(challenge.pa_req.is_none());

        // 只有 ACS 地址不构成挑战
        let payload = json!({"threeDSAuth": {"acsUrl": "https://acs"}});
        assert!(ThreeDsChallenge::from_payload(&payload).is_none());
    }

    #[test]
    fn test_outcome_normalization() {
        let outcome = GatewayOutcome::from_payload(
            "order_1",
            &json!({"orderState": "WAITING", "orderSystemId": 98765}),
        );
        assert_eq!(outcome.order_state, OrderState::Processing);
        assert_eq!(outcome.system_order_id.as_deref(), Some("98765"));
        assert!(!outcome.is_actionable());

        let outcome = GatewayOutcome::from_payload("order_1", &json!({"orderState": "DECLINED"}));
        assert!(outcome.is_actionable());
    }

    #[test]
    fn test_absorb_status_keeps_known_system_id() {
        let mut outcome =
            GatewayOutcome::from_payload("order_1", &json!({"orderSystemId": "sys-1"}));
        outcome.absorb_status(json!({"orderState": "APPROVED"}));
        assert_eq!(outcome.order_state, OrderState::Approved);
        assert_eq!(outcome.system_order_id.as_deref(), Some("sys-1"));
        assert_eq!(outcome.latest_payload()["orderState"], "APPROVED");
    }
}

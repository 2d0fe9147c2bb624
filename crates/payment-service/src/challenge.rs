//! 3DS 挑战中转
//!
//! 渲染自动提交到 ACS 的表单，并从发卡行回调中提取订单关联 ID

use reqwest::Url;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::gateway::ThreeDsChallenge;
use crate::models::Order;

/// 处理中页面地址，带订单号时追加 `?order=`
pub fn processing_page_url(app_url: &str, merchant_order_id: Option<&str>) -> String {
    let base = format!("{}/payment/processing", app_url.trim_end_matches('/'));
    let Some(id) = merchant_order_id else {
        return base;
    };

    match Url::parse(&base) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("order", id);
            url.to_string()
        }
        Err(_) => format!("{}?order={}", base, id),
    }
}

/// 发卡行完成挑战后回传的地址
pub fn challenge_term_url(app_url: &str) -> String {
    format!("{}/api/cardserv/result", app_url.trim_end_matches('/'))
}

fn html_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// 渲染自动提交的挑战表单
///
/// 有 CReq 时按 3DS2 提交（creq + threeDSSessionData），否则按 3DS1 提交（PaReq + MD + TermUrl）
pub fn render_challenge_form(
    challenge: &ThreeDsChallenge,
    merchant_order_id: &str,
    term_url: &str,
) -> String {
    let fields: Vec<(&str, &str)> = match (&challenge.creq, &challenge.pa_req) {
        (Some(creq), _) => vec![
            ("creq", creq.as_str()),
            ("threeDSSessionData", merchant_order_id),
        ],
        (None, Some(pa_req)) => vec![
            ("PaReq", pa_req.as_str()),
            ("MD", challenge.md.as_deref().unwrap_or(merchant_order_id)),
            ("TermUrl", term_url),
        ],
        (None, None) => Vec::new(),
    };

    let inputs: String = fields
        .iter()
        .map(|(name, value)| {
            format!(
                "<input type=\"hidden\" name=\"{}\" value=\"{}\"/>\n",
                name,
                html_escape(value)
            )
        })
        .collect();

    format!(
        "<!DOCTYPE html>\n\
         <html><head><meta charset=\"utf-8\"><title>3-D Secure</title></head>\n\
         <body onload=\"document.forms[0].submit()\">\n\
         <form method=\"POST\" action=\"{}\">\n\
         {}<noscript><button type=\"submit\">Continue</button></noscript>\n\
         </form>\n\
         </body></html>\n",
        html_escape(&challenge.acs_url),
        inputs
    )
}

/// 从订单审计文档中取最新的挑战描述
pub fn find_challenge(order: &Order) -> Option<ThreeDsChallenge> {
    let trail = order.audit_trail();
    trail.newest_first().into_iter().find_map(|(_, snapshot)| {
        ThreeDsChallenge::from_payload(&snapshot.payload).or_else(|| {
            snapshot
                .payload
                .get("gateway")
                .and_then(ThreeDsChallenge::from_payload)
        })
    })
}

/// 发卡行回调表单
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChallengeCallback {
    #[serde(rename = "PaRes", default)]
    pub pa_res: Option<String>,
    #[serde(rename = "MD", default)]
    pub md: Option<String>,
    #[serde(default)]
    pub cres: Option<String>,
    #[serde(rename = "threeDSSessionData", default)]
    pub three_ds_session_data: Option<String>,
}

impl ChallengeCallback {
    /// 关联 ID：优先 MD，其次 threeDSSessionData
    pub fn correlation_id(&self) -> Option<&str> {
        [&self.md, &self.three_ds_session_data]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .map(str::trim)
            .find(|v| !v.is_empty())
    }

    /// 审计用摘要，不保存 PaRes / CRes 原文
    pub fn audit_payload(&self) -> Value {
        json!({
            "md": self.md,
            "threeDSSessionData": self.three_ds_session_data,
            "paResLength": self.pa_res.as_ref().map(String::len),
            "cresLength": self.cres.as_ref().map(String::len),
        })
    }
}

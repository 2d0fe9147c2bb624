//! 请求 DTO 定义
//!
//! 所有 REST API 的请求体结构，使用 validator 做基础校验

use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

use payment_service::gateway::{BillingAddress, BrowserInfo, CardDetails};
use payment_service::service::CreateOrderCommand;

/// 下单请求
///
/// amount 为主货币单位（10.00 GBP 传 10 或 10.0），服务端换算为最小单位
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SaleBody {
    #[validate(range(exclusive_min = 0.0, message = "金额必须大于 0"))]
    pub amount: f64,
    #[validate(length(min = 3, max = 3, message = "币种应为 3 位代码"))]
    pub currency: String,
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: String,
    #[validate(length(max = 255))]
    pub description: Option<String>,
    pub card: CardDetails,
    #[validate(length(max = 255))]
    pub address: Option<String>,
    #[validate(length(max = 128))]
    pub city: Option<String>,
    #[validate(length(max = 32))]
    pub postal_code: Option<String>,
    pub browser: Option<BrowserInfo>,
}

impl SaleBody {
    /// 主货币单位换算为最小单位
    pub fn amount_minor(&self) -> Option<i64> {
        let minor = (self.amount * 100.0).round();
        (minor.is_finite() && minor >= 1.0 && minor <= i64::MAX as f64).then_some(minor as i64)
    }

    pub fn into_command(self, amount_minor: i64) -> CreateOrderCommand {
        CreateOrderCommand {
            amount_minor,
            currency: self.currency,
            email: self.email,
            card: self.card,
            description: self.description,
            billing: BillingAddress {
                address: self.address,
                city: self.city,
                postal_code: self.postal_code,
            },
            browser: self.browser,
        }
    }
}

/// 按商户订单号引用订单（状态查询、Webhook）
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRefBody {
    #[serde(default)]
    pub order_merchant_id: Option<String>,
}

impl OrderRefBody {
    /// 去除空白后的订单号，空串视为缺失
    pub fn merchant_order_id(&self) -> Option<&str> {
        self.order_merchant_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// 3DS 结果 GET 回退参数
#[derive(Debug, Deserialize)]
pub struct ResultQuery {
    pub order: Option<String>,
}

/// 流水查询参数
#[derive(Debug, Deserialize, Validate)]
pub struct LedgerQuery {
    #[validate(range(min = 1, max = 200))]
    pub limit: Option<i64>,
}

/// 文档扣费请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChargeBody {
    #[validate(length(min = 1, max = 128, message = "文档标识长度应为 1-128"))]
    pub document_ref: String,
}

/// 计数器递增请求
///
/// increment 可为数字或数字字符串，缺失、非法或负数按 0 处理，小数向下取整
#[derive(Debug, Default, Deserialize)]
pub struct CounterIncrementBody {
    #[serde(default)]
    pub increment: Option<Value>,
}

impl CounterIncrementBody {
    pub fn parse(raw: &[u8]) -> Self {
        serde_json::from_slice(raw).unwrap_or_default()
    }

    pub fn normalized(&self) -> i64 {
        let raw = match &self.increment {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match raw {
            Some(v) if v.is_finite() && v > 0.0 => v.floor().min(i64::MAX as f64) as i64,
            _ => 0,
        }
    }
}

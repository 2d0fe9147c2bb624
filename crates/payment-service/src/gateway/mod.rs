//! 支付网关（CardServ）客户端
//!
//! - `types`: 请求/响应类型与报文归一化
//! - `client`: 基于 reqwest 的 HTTP 实现

mod client;
pub mod types;

use async_trait::async_trait;

use payment_shared::config::GatewayConfig;

use crate::error::{PaymentError, Result};
use crate::models::Currency;

pub use client::CardServClient;
pub use types::{
    BillingAddress, BrowserInfo, CardDetails, GatewayOutcome, RawExchange, SaleRequest,
    ThreeDsChallenge, pick_redirect_url,
};

/// 支付网关接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// 检查币种是否已配置凭据，未配置返回 Configuration
    fn ensure_currency(&self, currency: Currency) -> Result<()>;

    /// 下单并在有限次数内轮询状态
    async fn sale(&self, request: &SaleRequest) -> Result<GatewayOutcome>;

    /// 查询订单状态
    async fn status(&self, merchant_order_id: &str, currency: Currency) -> Result<GatewayOutcome>;
}

/// 单个币种的网关访问参数
#[derive(Debug, Clone)]
pub struct GatewayProfile {
    pub currency: Currency,
    pub country: &'static str,
    pub base_url: String,
    pub requestor_id: String,
    pub token: String,
}

impl GatewayProfile {
    /// 从配置解析币种对应的访问参数
    ///
    /// 凭据键按币种代码匹配，不区分大小写
    pub fn resolve(config: &GatewayConfig, currency: Currency) -> Result<Self> {
        let base_url = config.base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(PaymentError::Configuration(
                "gateway.base_url 未配置".to_string(),
            ));
        }

        let credentials = config
            .credentials
            .iter()
            .find(|(code, _)| code.eq_ignore_ascii_case(currency.code()))
            .map(|(_, creds)| creds)
            .filter(|creds| creds.is_complete())
            .ok_or_else(|| {
                PaymentError::Configuration(format!("币种 {} 缺少网关凭据", currency))
            })?;

        Ok(Self {
            currency,
            country: currency.country_code(),
            base_url: base_url.to_string(),
            requestor_id: credentials.requestor_id.trim().to_string(),
            token: credentials.token.trim().to_string(),
        })
    }

    pub fn sale_url(&self) -> String {
        format!("{}/api/payments/sale/{}", self.base_url, self.requestor_id)
    }

    pub fn status_url(&self) -> String {
        format!("{}/api/payments/status/{}", self.base_url, self.requestor_id)
    }
}

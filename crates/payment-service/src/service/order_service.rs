//! 下单服务
//!
//! 1. 解析币种 -> 2. 参数校验 -> 3. 凭据检查 -> 4. 生成商户订单号
//!    -> 5. 计算代币数 -> 6. 写入 PROCESSING 订单 -> 7. 调用网关下单
//!    -> 8. 交给对账引擎处理下单响应

use std::str::FromStr;
use std::sync::Arc;

use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use payment_shared::config::PricingConfig;
use payment_shared::observability::metrics;

use crate::error::{PaymentError, Result};
use crate::gateway::{PaymentGateway, SaleRequest};
use crate::models::{AuditEntry, AuditSource, Currency, NewOrder, OrderState};
use crate::repository::OrderRepositoryTrait;
use crate::service::dto::{CreateOrderCommand, CreateOrderResult};
use crate::service::reconciliation::ReconciliationEngine;

const DEFAULT_DESCRIPTION: &str = "Payment";

/// 下单服务
pub struct OrderService {
    orders: Arc<dyn OrderRepositoryTrait>,
    gateway: Arc<dyn PaymentGateway>,
    engine: Arc<ReconciliationEngine>,
    pricing: PricingConfig,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepositoryTrait>,
        gateway: Arc<dyn PaymentGateway>,
        engine: Arc<ReconciliationEngine>,
        pricing: PricingConfig,
    ) -> Self {
        Self {
            orders,
            gateway,
            engine,
            pricing,
        }
    }

    /// 创建订单并发起支付
    ///
    /// 网关不可用时订单保持 PROCESSING 并正常返回，由后续通道推进
    #[instrument(skip(self, command), fields(currency = %command.currency, amount_minor = command.amount_minor))]
    pub async fn create_order(&self, command: CreateOrderCommand) -> Result<CreateOrderResult> {
        let currency = Currency::from_str(&command.currency)?;
        validate_command(&command)?;
        self.gateway.ensure_currency(currency)?;

        let tokens = self.tokens_for(command.amount_minor)?;
        let merchant_order_id = generate_merchant_order_id();
        let description = command
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(DEFAULT_DESCRIPTION)
            .to_string();

        let order = self
            .orders
            .create(&NewOrder {
                merchant_order_id: merchant_order_id.clone(),
                amount_minor: command.amount_minor,
                currency,
                user_email: command.email.trim().to_string(),
                tokens,
                description: description.clone(),
            })
            .await?;
        metrics::record_order_created(currency.code());
        info!(merchant_order_id = %order.merchant_order_id, tokens, "订单已创建");

        let request = SaleRequest {
            merchant_order_id: merchant_order_id.clone(),
            amount_minor: command.amount_minor,
            currency,
            description,
            email: order.user_email.clone(),
            card: command.card,
            billing: command.billing,
            browser: command.browser.unwrap_or_default(),
        };

        match self.gateway.sale(&request).await {
            Ok(outcome) => {
                let reconciled = self.engine.apply_sale_outcome(&outcome).await?;
                Ok(CreateOrderResult {
                    merchant_order_id,
                    state: reconciled.state,
                    redirect_url: reconciled.redirect_url,
                    challenge: reconciled.challenge,
                })
            }
            Err(e @ PaymentError::GatewayUnavailable(_)) => {
                warn!(merchant_order_id = %merchant_order_id, error = %e, "下单请求未得到结果，订单保持处理中");
                self.orders
                    .merge_audit(
                        &merchant_order_id,
                        &AuditEntry::new(AuditSource::Sale, json!({ "error": e.to_string() })),
                    )
                    .await?;
                Ok(CreateOrderResult {
                    merchant_order_id,
                    state: OrderState::Processing,
                    redirect_url: None,
                    challenge: None,
                })
            }
            Err(e) => {
                error!(merchant_order_id = %merchant_order_id, error = %e, "下单失败，订单标记为 ERROR");
                let entry = AuditEntry::new(AuditSource::Sale, json!({ "error": e.to_string() }));
                if let Err(settle_err) = self
                    .engine
                    .reconcile(&merchant_order_id, OrderState::Error, entry)
                    .await
                {
                    error!(error = %settle_err, "订单状态回写失败");
                }
                Err(e)
            }
        }
    }

    /// 按金额计算充值代币数（amount_minor 为最小货币单位）
    pub fn tokens_for(&self, amount_minor: i64) -> Result<i64> {
        amount_minor
            .checked_mul(self.pricing.tokens_per_unit)
            .map(|v| v / 100)
            .ok_or_else(|| PaymentError::Validation("金额过大".to_string()))
    }
}

/// 商户订单号：order_ + 时间有序 UUID
fn generate_merchant_order_id() -> String {
    format!("order_{}", Uuid::now_v7().simple())
}

fn validate_command(command: &CreateOrderCommand) -> Result<()> {
    if command.amount_minor <= 0 {
        return Err(PaymentError::Validation("金额必须大于 0".to_string()));
    }

    let email = command.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(PaymentError::Validation("邮箱格式不正确".to_string()));
    }

    let number = command.card.normalized_number();
    if !(12..=19).contains(&number.len()) || !number.chars().all(|c| c.is_ascii_digit()) {
        return Err(PaymentError::Validation("卡号格式不正确".to_string()));
    }

    let cvv = command.card.cvv.trim();
    if !(3..=4).contains(&cvv.len()) || !cvv.chars().all(|c| c.is_ascii_digit()) {
        return Err(PaymentError::Validation("CVV 格式不正确".to_string()));
    }

    if command.card.expiry_parts().is_none() {
        return Err(PaymentError::Validation("有效期格式应为 MM/YY".to_string()));
    }

    Ok(())
}

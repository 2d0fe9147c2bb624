//! 对账引擎
//!
//! 所有通知通道（下单响应、3DS 回调、Webhook、客户端轮询、后台巡检）都汇入 `reconcile`。
//! 是否充值只由仓储层的条件更新决定，引擎本身不做任何"是否已充值"的判断。
//!
//! ## 对账流程
//!
//! 1. 加载订单，不存在则返回 OrderNotFound
//! 2. 订单已是终态：只合并审计快照
//! 3. 订单处理中且观测到终态：CAS 结算，赢家在同一事务内充值
//! 4. 无论结果如何都合并审计快照

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{error, info, instrument, warn};

use payment_shared::observability::metrics;

use crate::challenge::ChallengeCallback;
use crate::error::{PaymentError, Result};
use crate::gateway::{GatewayOutcome, PaymentGateway, ThreeDsChallenge};
use crate::models::{
    AnomalyKind, AuditEntry, AuditMerge, AuditSource, LedgerEntry, NewAnomaly, Order, OrderState,
};
use crate::repository::OrderRepositoryTrait;

/// 单次对账结果
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub merchant_order_id: String,
    /// 对账后的订单状态
    pub state: OrderState,
    /// 本次调用是否完成了 PROCESSING -> 终态 的转换
    pub transitioned: bool,
    /// 本次调用写入的充值流水
    pub credit: Option<LedgerEntry>,
    pub redirect_url: Option<String>,
    pub challenge: Option<ThreeDsChallenge>,
}

impl ReconcileOutcome {
    fn unchanged(merchant_order_id: &str, state: OrderState) -> Self {
        Self {
            merchant_order_id: merchant_order_id.to_string(),
            state,
            transitioned: false,
            credit: None,
            redirect_url: None,
            challenge: None,
        }
    }

    fn with_gateway_hints(mut self, outcome: &GatewayOutcome) -> Self {
        self.redirect_url = outcome.redirect_url.clone();
        self.challenge = outcome.challenge.clone();
        self
    }

    fn metric_label(&self) -> &'static str {
        match (self.transitioned, self.state) {
            (true, OrderState::Approved) => "approved",
            (true, OrderState::Declined) => "declined",
            (true, _) => "error",
            (false, OrderState::Processing) => "processing",
            (false, _) => "noop",
        }
    }
}

/// 3DS 回调的处理结果，决定浏览器跳转到哪里
#[derive(Debug, Clone)]
pub enum ChallengeResolution {
    /// 已完成对账
    Reconciled(ReconcileOutcome),
    /// 订单已关联，但对账暂时失败，由轮询或巡检继续推进
    Deferred(String),
    /// 无法关联到订单，已记录异常
    Uncorrelated,
}

impl ChallengeResolution {
    pub fn merchant_order_id(&self) -> Option<&str> {
        match self {
            Self::Reconciled(outcome) => Some(&outcome.merchant_order_id),
            Self::Deferred(id) => Some(id),
            Self::Uncorrelated => None,
        }
    }
}

/// 对账引擎
pub struct ReconciliationEngine {
    orders: Arc<dyn OrderRepositoryTrait>,
    gateway: Arc<dyn PaymentGateway>,
}

impl ReconciliationEngine {
    pub fn new(orders: Arc<dyn OrderRepositoryTrait>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { orders, gateway }
    }

    /// 对账入口
    ///
    /// observed 为网关给出的最新状态；非终态的观测只记录审计快照
    #[instrument(skip(self, entry), fields(source = %entry.source))]
    pub async fn reconcile(
        &self,
        merchant_order_id: &str,
        observed: OrderState,
        entry: AuditEntry,
    ) -> Result<ReconcileOutcome> {
        let order = self.load(merchant_order_id).await?;
        let source = entry.source;

        let settled = if order.is_terminal() {
            if observed.is_terminal() && observed != order.status {
                warn!(
                    recorded = %order.status,
                    observed = %observed,
                    "网关报告的终态与已记录终态不一致，保持已记录状态"
                );
            }
            None
        } else if observed.is_terminal() {
            Some(self.orders.settle(merchant_order_id, observed).await)
        } else {
            None
        };

        // 竞争失败方与终态后的投递追加到 duplicates，不覆盖已有快照
        let mode = match &settled {
            _ if order.is_terminal() => AuditMerge::Duplicate,
            Some(Ok(result)) if result.won => AuditMerge::Settlement,
            Some(Ok(_)) => AuditMerge::Duplicate,
            _ => AuditMerge::Replace,
        };
        let entry = entry.with_mode(mode);

        // 审计快照总是合并，即使结算失败
        let merged = self.orders.merge_audit(merchant_order_id, &entry).await;

        let outcome = match settled.transpose()? {
            Some(result) => {
                if let Some(credit) = &result.credit {
                    metrics::record_tokens_credited(credit.delta);
                }
                ReconcileOutcome {
                    merchant_order_id: merchant_order_id.to_string(),
                    state: result.order.status,
                    transitioned: result.won,
                    credit: result.credit,
                    redirect_url: None,
                    challenge: None,
                }
            }
            None => ReconcileOutcome::unchanged(merchant_order_id, order.status),
        };
        merged?;

        metrics::record_reconciliation(source.key(), outcome.metric_label());
        if outcome.transitioned {
            info!(state = %outcome.state, credited = outcome.credit.is_some(), "订单完成状态转换");
        }

        Ok(outcome)
    }

    /// 应用下单响应（含下单后的有限轮询）
    #[instrument(skip(self, outcome), fields(merchant_order_id = %outcome.merchant_order_id))]
    pub async fn apply_sale_outcome(&self, outcome: &GatewayOutcome) -> Result<ReconcileOutcome> {
        let merchant_order_id = outcome.merchant_order_id.as_str();

        if let Some(system_order_id) = &outcome.system_order_id {
            self.orders
                .attach_system_order_id(merchant_order_id, system_order_id)
                .await?;
        }
        if let Some(status_payload) = &outcome.raw.status {
            self.orders
                .merge_audit(
                    merchant_order_id,
                    &AuditEntry::new(AuditSource::Status, status_payload.clone()),
                )
                .await?;
        }

        let sale_payload = outcome.raw.sale.clone().unwrap_or(Value::Null);
        let reconciled = self
            .reconcile(
                merchant_order_id,
                outcome.order_state,
                AuditEntry::new(AuditSource::Sale, sale_payload),
            )
            .await?;

        Ok(reconciled.with_gateway_hints(outcome))
    }

    /// 重新查询网关状态后对账
    ///
    /// 网关不可用时不修改订单，返回当前记录的状态
    #[instrument(skip(self, callback))]
    pub async fn refresh(
        &self,
        merchant_order_id: &str,
        source: AuditSource,
        callback: Option<Value>,
    ) -> Result<ReconcileOutcome> {
        let order = self.load(merchant_order_id).await?;

        let status = match self.gateway.status(merchant_order_id, order.currency).await {
            Ok(status) => status,
            Err(e @ PaymentError::GatewayUnavailable(_)) => {
                warn!(error = %e, "网关不可用，保持订单当前状态");
                metrics::record_reconciliation(source.key(), "gateway_unavailable");
                if let Some(callback) = callback {
                    let entry = AuditEntry::new(
                        source,
                        json!({ "callback": callback, "gatewayError": e.to_string() }),
                    );
                    if let Err(merge_err) = self.orders.merge_audit(merchant_order_id, &entry).await
                    {
                        warn!(error = %merge_err, "审计快照写入失败");
                    }
                }
                return Ok(ReconcileOutcome::unchanged(merchant_order_id, order.status));
            }
            Err(e) => return Err(e),
        };

        if let Some(system_order_id) = &status.system_order_id {
            self.orders
                .attach_system_order_id(merchant_order_id, system_order_id)
                .await?;
        }

        let gateway_payload = status.latest_payload();
        let payload = match callback {
            Some(callback) => json!({ "callback": callback, "gateway": gateway_payload }),
            None => gateway_payload,
        };

        let reconciled = self
            .reconcile(
                merchant_order_id,
                status.order_state,
                AuditEntry::new(source, payload),
            )
            .await?;

        Ok(reconciled.with_gateway_hints(&status))
    }

    /// Webhook 触发；未知订单记录异常后返回 OrderNotFound
    pub async fn on_webhook(&self, merchant_order_id: &str) -> Result<ReconcileOutcome> {
        match self.refresh(merchant_order_id, AuditSource::Webhook, None).await {
            Err(PaymentError::OrderNotFound(id)) => {
                self.report_anomaly(NewAnomaly::new(
                    AnomalyKind::WebhookUnknownOrder,
                    Some(&id),
                    json!({}),
                ))
                .await;
                Err(PaymentError::OrderNotFound(id))
            }
            other => other,
        }
    }

    /// 客户端轮询触发
    pub async fn on_client_poll(&self, merchant_order_id: &str) -> Result<ReconcileOutcome> {
        self.refresh(merchant_order_id, AuditSource::Status, None)
            .await
    }

    /// 3DS 回调触发，从不返回错误
    #[instrument(skip(self, callback))]
    pub async fn on_challenge_result(&self, callback: &ChallengeCallback) -> ChallengeResolution {
        let Some(merchant_order_id) = callback.correlation_id() else {
            self.report_anomaly(NewAnomaly::new(
                AnomalyKind::ChallengeMissingCorrelation,
                None,
                callback.audit_payload(),
            ))
            .await;
            return ChallengeResolution::Uncorrelated;
        };

        match self
            .refresh(
                merchant_order_id,
                AuditSource::Result,
                Some(callback.audit_payload()),
            )
            .await
        {
            Ok(outcome) => ChallengeResolution::Reconciled(outcome),
            Err(PaymentError::OrderNotFound(_)) => {
                self.report_anomaly(NewAnomaly::new(
                    AnomalyKind::ChallengeUnknownOrder,
                    Some(merchant_order_id),
                    callback.audit_payload(),
                ))
                .await;
                ChallengeResolution::Uncorrelated
            }
            Err(e) => {
                error!(merchant_order_id, error = %e, "3DS 回调对账失败，等待后续通道推进");
                ChallengeResolution::Deferred(merchant_order_id.to_string())
            }
        }
    }

    /// 重新查询长时间处理中的订单，返回处理的订单数
    #[instrument(skip(self))]
    pub async fn sweep_stale(&self, older_than: DateTime<Utc>, limit: i64) -> Result<usize> {
        let stale = self.orders.list_stale_processing(older_than, limit).await?;
        let total = stale.len();

        for order in stale {
            if let Err(e) = self
                .refresh(&order.merchant_order_id, AuditSource::Status, None)
                .await
            {
                warn!(merchant_order_id = %order.merchant_order_id, error = %e, "巡检对账失败");
            }
        }

        metrics::record_orders_swept(total);
        Ok(total)
    }

    /// 记录关联异常，写入失败只记日志
    pub async fn report_anomaly(&self, anomaly: NewAnomaly) {
        metrics::record_anomaly(anomaly.kind.as_str());
        warn!(
            kind = anomaly.kind.as_str(),
            merchant_order_id = ?anomaly.merchant_order_id,
            "记录支付关联异常"
        );
        if let Err(e) = self.orders.record_anomaly(&anomaly).await {
            error!(error = %e, "异常记录写入失败");
        }
    }

    pub async fn find_order(&self, merchant_order_id: &str) -> Result<Option<Order>> {
        self.orders.get_by_merchant_id(merchant_order_id).await
    }

    async fn load(&self, merchant_order_id: &str) -> Result<Order> {
        self.orders
            .get_by_merchant_id(merchant_order_id)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(merchant_order_id.to_string()))
    }
}

//! 客户端状态轮询
//!
//! "处理中"页面的轮询循环：固定间隔查询订单状态直到终态，可随时取消。
//! 可重试错误（网关不可用、网络、数据库）视为仍在处理中，循环不设次数上限；
//! 订单不存在等确定性错误立即结束轮询。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{PaymentError, Result};
use crate::models::OrderState;
use crate::service::ReconciliationEngine;

/// 默认轮询间隔
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2500);

/// 一次状态查询的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub state: OrderState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

/// 状态来源
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn check_status(&self, merchant_order_id: &str) -> Result<StatusSnapshot>;
}

#[async_trait]
impl StatusSource for ReconciliationEngine {
    async fn check_status(&self, merchant_order_id: &str) -> Result<StatusSnapshot> {
        let outcome = self.on_client_poll(merchant_order_id).await?;
        Ok(StatusSnapshot {
            state: outcome.state,
            redirect_url: outcome.redirect_url,
        })
    }
}

/// 状态接口响应
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    ok: bool,
    state: Option<OrderState>,
    redirect_url: Option<String>,
    error: Option<String>,
}

/// 通过 HTTP 调用 `POST /api/cardserv/status` 的状态来源
pub struct HttpStatusClient {
    http: reqwest::Client,
    status_url: String,
}

impl HttpStatusClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::Configuration(format!("无法创建 HTTP 客户端: {}", e)))?;

        Ok(Self {
            http,
            status_url: format!("{}/api/cardserv/status", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl StatusSource for HttpStatusClient {
    async fn check_status(&self, merchant_order_id: &str) -> Result<StatusSnapshot> {
        let response = self
            .http
            .post(&self.status_url)
            .json(&json!({ "orderMerchantId": merchant_order_id }))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PaymentError::OrderNotFound(merchant_order_id.to_string()));
        }

        let body: StatusResponse = response.json().await?;
        match (body.ok, body.state) {
            (true, Some(state)) => Ok(StatusSnapshot {
                state,
                redirect_url: body.redirect_url,
            }),
            _ => Err(PaymentError::GatewayUnavailable(
                body.error.unwrap_or_else(|| "状态接口返回失败".to_string()),
            )),
        }
    }
}

/// 轮询结束原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Settled(StatusSnapshot),
    /// 订单不存在，重试也不会改变结果
    NotFound,
    /// 不可重试的其他错误
    Failed(String),
    Cancelled,
}

/// 可取消的状态轮询器
pub struct StatusPoller {
    source: Arc<dyn StatusSource>,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(source: Arc<dyn StatusSource>) -> Self {
        Self {
            source,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// 轮询直到终态或取消
    ///
    /// cancel 收到 true 或发送端被丢弃时结束；等待中的定时器随之丢弃
    pub async fn run(
        &self,
        merchant_order_id: &str,
        mut cancel: watch::Receiver<bool>,
    ) -> PollOutcome {
        let mut attempt: u64 = 0;

        loop {
            if *cancel.borrow() {
                return PollOutcome::Cancelled;
            }

            attempt += 1;
            let query = self.source.check_status(merchant_order_id);
            let result = tokio::select! {
                result = query => result,
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        return PollOutcome::Cancelled;
                    }
                    continue;
                }
            };

            match result {
                Ok(snapshot) if snapshot.state.is_terminal() => {
                    info!(merchant_order_id, attempt, state = %snapshot.state, "订单已到达终态");
                    return PollOutcome::Settled(snapshot);
                }
                Ok(_) => debug!(merchant_order_id, attempt, "订单仍在处理中"),
                Err(PaymentError::OrderNotFound(_)) => {
                    warn!(merchant_order_id, attempt, "订单不存在，停止轮询");
                    return PollOutcome::NotFound;
                }
                Err(e) if e.is_retryable() => {
                    warn!(merchant_order_id, attempt, error = %e, "状态查询失败，继续轮询")
                }
                Err(e) => {
                    warn!(merchant_order_id, attempt, error = %e, "状态查询出现不可重试错误，停止轮询");
                    return PollOutcome::Failed(e.to_string());
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        return PollOutcome::Cancelled;
                    }
                }
            }
        }
    }
}

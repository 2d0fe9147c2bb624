//! 待处理订单巡检 Worker
//!
//! 定期重新查询长时间停留在 PROCESSING 的订单，兜底丢失的 Webhook 与回调。
//! 所有状态变化经由对账引擎的条件更新完成，多实例同时运行也不会重复充值。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use payment_service::ReconciliationEngine;
use payment_shared::config::SweeperConfig;

/// min_age 上限（一年），保证 `now - min_age` 不会越界
pub const MAX_MIN_AGE_SECS: u64 = 365 * 24 * 60 * 60;

/// 待处理订单巡检 Worker
pub struct PendingOrderSweeper {
    engine: Arc<ReconciliationEngine>,
    /// 巡检间隔
    interval: Duration,
    /// 订单创建后至少经过多久才参与巡检
    min_age: chrono::Duration,
    /// 每轮处理的最大订单数
    batch_size: i64,
}

impl PendingOrderSweeper {
    pub fn new(engine: Arc<ReconciliationEngine>, config: &SweeperConfig) -> Self {
        Self {
            engine,
            interval: Duration::from_secs(config.interval_secs.max(1)),
            min_age: min_age_from_secs(config.min_age_secs),
            batch_size: config.batch_size.max(1),
        }
    }

    /// 主循环：持续巡检直到收到关闭信号
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval = ?self.interval,
            min_age_secs = self.min_age.num_seconds(),
            batch_size = self.batch_size,
            "PendingOrderSweeper 已启动"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {
                    info!("PendingOrderSweeper 收到关闭信号");
                    return;
                }
            }

            if *shutdown.borrow() {
                return;
            }

            self.run_once().await;
        }
    }

    pub fn min_age(&self) -> chrono::Duration {
        self.min_age
    }

    /// 执行一轮巡检，返回处理的订单数
    pub async fn run_once(&self) -> usize {
        let older_than = Utc::now() - self.min_age;
        match self.engine.sweep_stale(older_than, self.batch_size).await {
            Ok(0) => 0,
            Ok(count) => {
                info!(count, "巡检完成");
                count
            }
            Err(e) => {
                error!(error = %e, "巡检待处理订单出错");
                0
            }
        }
    }
}

fn min_age_from_secs(secs: u64) -> chrono::Duration {
    if secs > MAX_MIN_AGE_SECS {
        warn!(
            min_age_secs = secs,
            max = MAX_MIN_AGE_SECS,
            "min_age_secs 超出上限，已截断"
        );
    }
    let capped = secs.min(MAX_MIN_AGE_SECS);
    i64::try_from(capped)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or_else(chrono::Duration::zero)
}

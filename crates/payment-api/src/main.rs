//! 支付 API 服务
//!
//! 提供下单、3DS 中转、订单状态回调、代币账本与计数器 REST API。

use std::sync::Arc;

use payment_api::{AppState, Dependencies, routes, worker::PendingOrderSweeper};
use payment_service::{
    CardServClient, CounterRepository, LedgerRepository, MemoryStore, OrderRepository,
    PaymentGateway,
};
use payment_shared::{
    config::{AppConfig, StorageBackend},
    database::Database,
    observability,
    retry::RetryPolicy,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 统一加载配置：config/default.toml -> config/{env}.toml -> config/payment-api.toml -> 环境变量
    let config = AppConfig::load("payment-api")?;

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!(
        environment = %config.environment,
        storage = ?config.storage,
        "Starting payment-api on {}",
        config.server_addr()
    );

    let gateway: Arc<dyn PaymentGateway> = Arc::new(CardServClient::new(config.gateway.clone())?);
    if config.gateway.base_url.is_empty() {
        warn!("gateway.base_url 未配置，下单与状态查询将返回配置错误");
    }

    let deps = match config.storage {
        StorageBackend::Postgres => {
            // 数据库可能晚于服务就绪，按退避策略重试连接
            let db = Database::connect_with_retry(&config.database, &RetryPolicy::default()).await?;
            db.run_migrations().await?;
            Dependencies {
                orders: Arc::new(OrderRepository::new(db.pool().clone())),
                ledger: Arc::new(LedgerRepository::new(db.pool().clone())),
                counters: Arc::new(CounterRepository::new(db.pool().clone())),
                gateway,
                database: Some(db),
            }
        }
        StorageBackend::Memory => {
            if config.is_production() {
                warn!("生产环境使用内存存储，重启后数据丢失且不支持多实例");
            }
            let store = Arc::new(MemoryStore::new());
            Dependencies {
                orders: store.clone(),
                ledger: store.clone(),
                counters: store,
                gateway,
                database: None,
            }
        }
    };

    let state = AppState::new(&config, deps);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 启动待处理订单巡检 Worker
    let sweeper_handle = if config.sweeper.enabled {
        let sweeper = PendingOrderSweeper::new(state.engine.clone(), &config.sweeper);
        Some(tokio::spawn(async move { sweeper.run(shutdown_rx).await }))
    } else {
        info!("PendingOrderSweeper 已禁用");
        None
    };

    let database = state.database.clone();
    let app = routes::app(state);

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    // 优雅关闭：停止接收新连接，等待已有请求处理完毕后通知 Worker 退出
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    if let Some(handle) = sweeper_handle
        && let Err(e) = handle.await
    {
        error!(error = %e, "PendingOrderSweeper 异常退出");
    }
    if let Some(db) = database {
        db.close().await;
    }

    info!("Server shutdown complete");
    Ok(())
}

/// 监听关闭信号
///
/// K8s 通过 SIGTERM 通知 Pod 停止；本地开发通过 Ctrl+C。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}

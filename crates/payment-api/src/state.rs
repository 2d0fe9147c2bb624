//! 应用状态定义
//!
//! 包含 Axum 路由共享的应用状态

use std::sync::Arc;

use payment_service::{
    CounterRepositoryTrait, CounterService, LedgerRepositoryTrait, OrderRepositoryTrait,
    OrderService, PaymentGateway, ReconciliationEngine, TokenLedgerService,
};
use payment_shared::config::AppConfig;
use payment_shared::database::Database;

/// Axum 应用共享状态
///
/// 服务实例通过 Arc 在 handler 间共享，handler 本身不持有任何可变状态
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReconciliationEngine>,
    pub orders: Arc<OrderService>,
    pub ledger: Arc<TokenLedgerService>,
    pub counter: Arc<CounterService>,
    /// 前端站点地址，用于 3DS 回调后的跳转
    pub app_url: String,
    /// PostgreSQL 存储时用于就绪探针，内存存储为 None
    pub database: Option<Database>,
}

/// 构造 AppState 所需的仓储与网关
pub struct Dependencies {
    pub orders: Arc<dyn OrderRepositoryTrait>,
    pub ledger: Arc<dyn LedgerRepositoryTrait>,
    pub counters: Arc<dyn CounterRepositoryTrait>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub database: Option<Database>,
}

impl AppState {
    /// 根据配置组装服务
    pub fn new(config: &AppConfig, deps: Dependencies) -> Self {
        let engine = Arc::new(ReconciliationEngine::new(
            deps.orders.clone(),
            deps.gateway.clone(),
        ));
        let orders = Arc::new(OrderService::new(
            deps.orders,
            deps.gateway,
            engine.clone(),
            config.pricing.clone(),
        ));
        let ledger = Arc::new(TokenLedgerService::new(
            deps.ledger,
            config.pricing.tokens_per_document,
        ));
        let counter = Arc::new(CounterService::resumes(deps.counters));

        Self {
            engine,
            orders,
            ledger,
            counter,
            app_url: config.gateway.app_url.trim_end_matches('/').to_string(),
            database: deps.database,
        }
    }
}

//! 命令执行器

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::MockGatewayConfig;
use crate::scenarios::CardScenario;
use crate::services::{GatewayState, gateway_routes};

pub struct CommandRunner {
    config: MockGatewayConfig,
}

impl CommandRunner {
    pub fn new(config: MockGatewayConfig) -> Self {
        Self { config }
    }

    /// 启动 HTTP 服务，Ctrl+C 后优雅退出
    pub async fn run_server(mut self, port: Option<u16>, no_webhooks: bool) -> Result<()> {
        if let Some(port) = port {
            self.config.port = port;
        }
        if no_webhooks {
            self.config.send_webhooks = false;
        }

        let addr = self.config.server_addr();
        info!(
            addr = %addr,
            public_url = %self.config.public_url,
            webhooks = self.config.send_webhooks,
            requestors = self.config.requestors.len(),
            "启动 Mock 网关"
        );

        let state = Arc::new(GatewayState::new(self.config));
        let app = Router::new()
            .route("/health", get(health_check))
            .merge(gateway_routes().with_state(state))
            .layer(TraceLayer::new_for_http());

        let listener = TcpListener::bind(&addr).await.context("绑定端口失败")?;
        info!("Mock 网关已启动: http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("服务器运行失败")?;

        info!("Mock 网关已停止");
        Ok(())
    }

    /// 打印测试卡号
    pub fn run_cards(&self) {
        println!("{:<20} {:<20} 说明", "卡号", "场景");
        for (number, scenario) in CardScenario::catalog() {
            println!(
                "{:<20} {:<20} {}",
                number,
                format!("{:?}", scenario),
                scenario.description()
            );
        }
        println!("{:<20} {:<20} {}", "其他", "Approve", CardScenario::Approve.description());
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "mock-gateway" }))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("无法监听 Ctrl+C，服务将持续运行");
        std::future::pending::<()>().await;
    }
    info!("收到关闭信号");
}

//! Prometheus 指标模块
//!
//! 指标通过独立 HTTP 端口暴露，供 Prometheus 抓取。

use std::net::SocketAddr;
use std::sync::OnceLock;

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// 指标服务句柄
pub struct MetricsHandle {
    server_handle: tokio::task::JoinHandle<()>,
}

impl MetricsHandle {
    pub fn shutdown(self) {
        self.server_handle.abort();
    }
}

/// 安装 Prometheus recorder 并启动 `/metrics` 服务
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    describe_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle { server_handle })
}

fn describe_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!(
        "payment_orders_created_total",
        "Payment orders created, by currency"
    );
    metrics::describe_counter!(
        "payment_reconciliations_total",
        "Reconciliation attempts, by evidence source and outcome"
    );
    metrics::describe_counter!("tokens_credited_total", "Tokens credited by top-ups");
    metrics::describe_counter!("tokens_charged_total", "Tokens charged for documents");
    metrics::describe_counter!(
        "gateway_requests_total",
        "Outbound payment gateway requests, by operation and result"
    );
    metrics::describe_histogram!(
        "gateway_request_duration_seconds",
        "Outbound payment gateway request duration in seconds"
    );
    metrics::describe_counter!(
        "payment_anomalies_total",
        "Gateway payloads that could not be matched to an order"
    );
    metrics::describe_counter!(
        "stale_orders_swept_total",
        "Processing orders refreshed by the background sweeper"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    }))
}

pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ==================== 指标记录函数 ====================

#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status
    )
    .record(duration_secs);
}

#[inline]
pub fn record_order_created(currency: &str) {
    metrics::counter!("payment_orders_created_total", "currency" => currency.to_string())
        .increment(1);
}

/// 记录一次对账
///
/// source: sale/status/webhook/result/sweeper；outcome: approved/declined/processing/noop
#[inline]
pub fn record_reconciliation(source: &str, outcome: &str) {
    metrics::counter!(
        "payment_reconciliations_total",
        "source" => source.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

#[inline]
pub fn record_tokens_credited(tokens: i64) {
    metrics::counter!("tokens_credited_total").increment(tokens.max(0) as u64);
}

#[inline]
pub fn record_tokens_charged(tokens: i64) {
    metrics::counter!("tokens_charged_total").increment(tokens.max(0) as u64);
}

#[inline]
pub fn record_gateway_request(operation: &str, result: &str, duration_secs: f64) {
    metrics::counter!(
        "gateway_requests_total",
        "operation" => operation.to_string(),
        "result" => result.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "gateway_request_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}

#[inline]
pub fn record_anomaly(kind: &str) {
    metrics::counter!("payment_anomalies_total", "kind" => kind.to_string()).increment(1);
}

#[inline]
pub fn record_orders_swept(count: usize) {
    metrics::counter!("stale_orders_swept_total").increment(count as u64);
}

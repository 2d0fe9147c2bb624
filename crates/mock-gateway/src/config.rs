//! Mock 网关配置
//!
//! 加载顺序：config/mock-gateway.toml，然后是 MOCK_GATEWAY_ 前缀的环境变量

use std::collections::HashMap;
use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MockGatewayConfig {
    pub host: String,
    pub port: u16,
    /// 对外地址，用于拼接 ACS 挑战地址
    pub public_url: String,
    /// Pending 场景在第几次状态查询时批准
    pub settle_after_checks: u32,
    /// 状态变化后是否回调商户 webhook
    pub send_webhooks: bool,
    /// requestorId 到 Bearer token 的映射，为空时不校验
    pub requestors: HashMap<String, String>,
}

impl Default for MockGatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
            public_url: "http://localhost:8090".to_string(),
            settle_after_checks: 2,
            send_webhooks: true,
            requestors: HashMap::new(),
        }
    }
}

impl MockGatewayConfig {
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(Path::new(config_dir).join("mock-gateway.toml")).required(false))
            .add_source(
                Environment::with_prefix("MOCK_GATEWAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// 校验 requestorId 与 token 是否匹配
    pub fn authorize(&self, requestor_id: &str, token: Option<&str>) -> bool {
        if self.requestors.is_empty() {
            return true;
        }
        match (self.requestors.get(requestor_id), token) {
            (Some(expected), Some(token)) => expected == token,
            _ => false,
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

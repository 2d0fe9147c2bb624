//! CLI 命令定义

use clap::{Parser, Subcommand};

/// Mock CardServ 网关命令行工具
#[derive(Parser, Debug)]
#[command(name = "mock-gateway")]
#[command(version, about = "CardServ 收单网关模拟服务")]
#[command(propagate_version = true)]
pub struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// 配置目录
    #[arg(long, default_value = "config", env = "CONFIG_DIR")]
    pub config_dir: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 启动 Mock 网关
    Server {
        /// 覆盖配置中的端口
        #[arg(short, long)]
        port: Option<u16>,

        /// 关闭 webhook 回调
        #[arg(long)]
        no_webhooks: bool,
    },

    /// 列出测试卡号
    Cards,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server() {
        let cli = Cli::parse_from(["mock-gateway", "server", "--port", "9000", "--no-webhooks"]);
        match cli.command {
            Commands::Server { port, no_webhooks } => {
                assert_eq!(port, Some(9000));
                assert!(no_webhooks);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.log_level, "info");
    }
}

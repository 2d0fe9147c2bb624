//! Mock CardServ 网关入口

use clap::Parser;
use mock_gateway::cli::{Cli, CommandRunner, Commands};
use mock_gateway::config::MockGatewayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 优先使用环境变量 RUST_LOG，否则使用命令行参数指定的级别
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .init();

    let config = MockGatewayConfig::load(&cli.config_dir)?;
    let runner = CommandRunner::new(config);

    match cli.command {
        Commands::Server { port, no_webhooks } => runner.run_server(port, no_webhooks).await?,
        Commands::Cards => runner.run_cards(),
    }

    Ok(())
}

//! CLI 模块
//!
//! - `server` - 启动 Mock CardServ 网关
//! - `cards` - 列出测试卡号与对应场景
//!
//! ```bash
//! mock-gateway server --port 8090
//! mock-gateway cards
//! ```

pub mod commands;
pub mod runner;

pub use commands::{Cli, Commands};
pub use runner::CommandRunner;

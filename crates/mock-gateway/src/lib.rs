//! Mock CardServ 网关
//!
//! 本地开发与联调用的收单网关模拟，按卡号选择结果场景。
//!
//! # 主要模块
//!
//! - `models`: 模拟支付记录
//! - `scenarios`: 测试卡号到结果场景的映射
//! - `store`: 基于 DashMap 的支付存储
//! - `services`: 下单、状态查询与 ACS 挑战接口
//! - `config`: 配置加载
//! - `cli`: 命令行入口
//!
//! # 测试卡号
//!
//! | 卡号 | 场景 |
//! |------|------|
//! | 4000 0000 0000 0002 | 拒绝 |
//! | 4000 0000 0000 0119 | 网关错误 |
//! | 4000 0000 0000 0259 | 处理中，若干次状态查询后批准 |
//! | 4000 0000 0000 1091 | 3DS1 挑战后批准 |
//! | 4000 0000 0000 3220 | 3DS2 挑战后批准 |
//! | 4000 0000 0000 0036 | 3DS1 挑战后拒绝 |
//! | 其他 | 直接批准 |

pub mod cli;
pub mod config;
pub mod models;
pub mod scenarios;
pub mod services;
pub mod store;

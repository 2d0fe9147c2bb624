//! 数据库仓储层
//!
//! ## 设计原则
//!
//! - 仓储只负责数据持久化，不包含业务逻辑
//! - 并发安全只依赖数据库的条件更新与唯一约束，不依赖进程内锁
//! - 定义 trait 接口以支持 mock 测试和内存实现

mod counter_repo;
mod ledger_repo;
mod memory;
mod order_repo;
mod traits;

pub use counter_repo::CounterRepository;
pub use ledger_repo::LedgerRepository;
pub use memory::MemoryStore;
pub use order_repo::OrderRepository;
pub use traits::*;

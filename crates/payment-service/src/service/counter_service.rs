//! 持久化计数器服务
//!
//! 对外展示的累计简历生成数，多实例共享同一计数

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::repository::CounterRepositoryTrait;

/// 简历计数器名称
pub const RESUMES_COUNTER: &str = "resumes";
/// 计数器初值
pub const RESUMES_SEED: i64 = 16356;
/// 单次请求允许的最大增量
pub const MAX_INCREMENT: i64 = 1000;

/// 计数器服务
pub struct CounterService {
    counters: Arc<dyn CounterRepositoryTrait>,
    name: String,
    seed: i64,
}

impl CounterService {
    pub fn new(counters: Arc<dyn CounterRepositoryTrait>, name: impl Into<String>, seed: i64) -> Self {
        Self {
            counters,
            name: name.into(),
            seed,
        }
    }

    /// 简历生成计数器
    pub fn resumes(counters: Arc<dyn CounterRepositoryTrait>) -> Self {
        Self::new(counters, RESUMES_COUNTER, RESUMES_SEED)
    }

    /// 当前值，未初始化时返回初值
    pub async fn get(&self) -> Result<i64> {
        Ok(self.counters.get(&self.name).await?.unwrap_or(self.seed))
    }

    /// 递增并返回新值，增量限制在 0..=MAX_INCREMENT
    pub async fn increment(&self, by: i64) -> Result<i64> {
        let by = by.clamp(0, MAX_INCREMENT);
        let value = self.counters.increment(&self.name, by, self.seed).await?;
        debug!(counter = %self.name, by, value, "计数器已递增");
        Ok(value)
    }
}

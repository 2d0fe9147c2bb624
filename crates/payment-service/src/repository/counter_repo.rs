//! 持久化计数器仓储

use async_trait::async_trait;
use sqlx::PgPool;

use super::traits::CounterRepositoryTrait;
use crate::error::Result;

pub struct CounterRepository {
    pool: PgPool,
}

impl CounterRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CounterRepositoryTrait for CounterRepository {
    async fn get(&self, name: &str) -> Result<Option<i64>> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT value FROM counters WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn increment(&self, name: &str, by: i64, seed: i64) -> Result<i64> {
        let (value,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO counters (name, value)
            VALUES ($1, LEAST($3::numeric + $2, 9223372036854775807)::bigint)
            ON CONFLICT (name) DO UPDATE
                SET value = LEAST(counters.value::numeric + $2, 9223372036854775807)::bigint,
                    updated_at = NOW()
            RETURNING value
            "#,
        )
        .bind(name)
        .bind(by)
        .bind(seed)
        .fetch_one(&self.pool)
        .await?;

        Ok(value)
    }
}

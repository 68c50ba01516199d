use super::{Op, Store};
use crate::core::error::Error;
use chrono::Utc;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use std::time::Duration;

#[derive(Clone, Debug)]
pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub(crate) async fn connect(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Store for PgStore {
    async fn set_pop(&self, key: &str) -> Result<Option<String>, Error> {
        let member = sqlx::query(
            "DELETE FROM set_members
            WHERE (key, member) IN (
                SELECT key, member FROM set_members
                WHERE key = $1
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING member;",
        )
        .bind(key)
        .map(|row: PgRow| row.get("member"))
        .fetch_optional(&self.pool)
        .await?;

        Ok(member)
    }

    async fn set_is_member(&self, key: &str, member: &str) -> Result<bool, Error> {
        let exists = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM set_members WHERE key = $1 AND member = $2) AS present;",
        )
        .bind(key)
        .bind(member)
        .map(|row: PgRow| row.get("present"))
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, Error> {
        let members = sqlx::query("SELECT member FROM set_members WHERE key = $1;")
            .bind(key)
            .map(|row: PgRow| row.get("member"))
            .fetch_all(&self.pool)
            .await?;

        Ok(members)
    }

    async fn index_add(&self, key: &str, member: &str, score: i64) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO index_members (key, member, score) VALUES ($1, $2, $3)
            ON CONFLICT (key, member) DO UPDATE SET score = EXCLUDED.score;",
        )
        .bind(key)
        .bind(member)
        .bind(score)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn index_score(&self, key: &str, member: &str) -> Result<Option<i64>, Error> {
        let score = sqlx::query("SELECT score FROM index_members WHERE key = $1 AND member = $2;")
            .bind(key)
            .bind(member)
            .map(|row: PgRow| row.get("score"))
            .fetch_optional(&self.pool)
            .await?;

        Ok(score)
    }

    async fn try_lock(&self, key: &str, ttl: Duration) -> Result<bool, Error> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| Error::Store(e.to_string()))?;

        // an expired row is treated as absent and taken over
        let result = sqlx::query(
            "INSERT INTO locks (key, expires_at) VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET expires_at = EXCLUDED.expires_at
            WHERE locks.expires_at <= $3;",
        )
        .bind(key)
        .bind(now + ttl)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn unlock(&self, key: &str) -> Result<(), Error> {
        sqlx::query("DELETE FROM locks WHERE key = $1;")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn exec(&self, ops: Vec<Op>) -> Result<Vec<u64>, Error> {
        let mut tx = self.pool.begin().await?;
        let mut affected = Vec::with_capacity(ops.len());

        for op in &ops {
            let result = match op {
                Op::SetAdd { key, member } => {
                    sqlx::query(
                        "INSERT INTO set_members (key, member) VALUES ($1, $2) ON CONFLICT DO NOTHING;",
                    )
                    .bind(key)
                    .bind(member)
                    .execute(&mut *tx)
                    .await?
                }
                Op::SetRemove { key, member } => {
                    sqlx::query("DELETE FROM set_members WHERE key = $1 AND member = $2;")
                        .bind(key)
                        .bind(member)
                        .execute(&mut *tx)
                        .await?
                }
                Op::IndexAdd { key, member, score } => {
                    sqlx::query(
                        "INSERT INTO index_members (key, member, score) VALUES ($1, $2, $3)
                        ON CONFLICT (key, member) DO UPDATE SET score = EXCLUDED.score;",
                    )
                    .bind(key)
                    .bind(member)
                    .bind(score)
                    .execute(&mut *tx)
                    .await?
                }
                Op::IndexRemove { key, member } => {
                    sqlx::query("DELETE FROM index_members WHERE key = $1 AND member = $2;")
                        .bind(key)
                        .bind(member)
                        .execute(&mut *tx)
                        .await?
                }
                Op::Unlock { key } => {
                    sqlx::query("DELETE FROM locks WHERE key = $1;")
                        .bind(key)
                        .execute(&mut *tx)
                        .await?
                }
            };

            affected.push(result.rows_affected());
        }

        tx.commit().await?;

        Ok(affected)
    }
}

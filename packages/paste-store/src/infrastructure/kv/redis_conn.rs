//! Redis connection
//!
//! Wraps a `redis::aio::ConnectionManager`: one multiplexed connection that
//! reconnects on its own. Cloning the manager is cheap, so every call works on
//! its own handle. Batches run as `MULTI`/`EXEC` pipelines.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

use super::{KvConnection, KvOp};
use crate::error::Result;

const SCAN_BATCH: usize = 500;

#[derive(Clone)]
pub struct RedisConnection {
    manager: ConnectionManager,
}

impl RedisConnection {
    /// Connect to `redis://` / `rediss://` URL
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        info!(url = %redact(url), "Connected to Redis");
        Ok(Self { manager })
    }

    /// Build a connection URL from discrete settings
    pub fn url_from(host: &str, port: u16, db: i64, password: Option<&str>) -> String {
        match password {
            Some(pw) => format!("redis://:{}@{}:{}/{}", pw, host, port, db),
            None => format!("redis://{}:{}/{}", host, port, db),
        }
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}***{}", &url[..scheme_end + 3], &url[at..])
        }
        _ => url.to_string(),
    }
}

fn push_op(pipe: &mut redis::Pipeline, op: KvOp) {
    match op {
        KvOp::HSet { key, fields } => {
            pipe.cmd("HSET").arg(key).arg(fields).ignore();
        }
        KvOp::HDel { key, field } => {
            pipe.cmd("HDEL").arg(key).arg(field).ignore();
        }
        KvOp::SAdd { key, members } => {
            pipe.cmd("SADD").arg(key).arg(members).ignore();
        }
        KvOp::ZIncrBy { key, member, delta } => {
            pipe.cmd("ZINCRBY").arg(key).arg(delta).arg(member).ignore();
        }
        KvOp::ZAdd { key, member, score } => {
            pipe.cmd("ZADD").arg(key).arg(score).arg(member).ignore();
        }
        KvOp::ZRem { key, member } => {
            pipe.cmd("ZREM").arg(key).arg(member).ignore();
        }
        KvOp::Expire { key, seconds } => {
            pipe.cmd("EXPIRE").arg(key).arg(seconds).ignore();
        }
        KvOp::Del { key } => {
            pipe.cmd("DEL").arg(key).ignore();
        }
    }
}

#[async_trait]
impl KvConnection for RedisConnection {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn exec(&self, ops: Vec<KvOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let count = ops.len();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in ops {
            push_op(&mut pipe, op);
        }
        let mut conn = self.conn();
        let _: () = pipe.query_async(&mut conn).await?;
        debug!(commands = count, "EXEC");
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn();
        let found: i64 = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(found > 0)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        let value: Option<String> = redis::cmd("HGET")
            .arg(key)
            .arg(field)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let mut members: Vec<String> = redis::cmd("SMEMBERS").arg(key).query_async(&mut conn).await?;
        members.sort();
        Ok(members)
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        let mut conn = self.conn();
        let score: Option<f64> = redis::cmd("ZSCORE")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(score)
    }

    async fn zrange_with_scores(&self, key: &str) -> Result<Vec<(String, f64)>> {
        let mut conn = self.conn();
        let members: Vec<(String, f64)> = redis::cmd("ZRANGE")
            .arg(key)
            .arg(0)
            .arg(-1)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    async fn zrange_by_score(&self, key: &str, max: f64) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let members: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg("-inf")
            .arg(max)
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn();
        let removed: i64 = redis::cmd("ZREM")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn scan_keys(&self) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_from() {
        assert_eq!(
            RedisConnection::url_from("localhost", 6379, 2, None),
            "redis://localhost:6379/2"
        );
        assert_eq!(
            RedisConnection::url_from("cache", 6380, 0, Some("secret")),
            "redis://:secret@cache:6380/0"
        );
    }

    #[test]
    fn test_redact_hides_credentials() {
        assert_eq!(redact("redis://:secret@cache:6380/0"), "redis://***@cache:6380/0");
        assert_eq!(redact("redis://localhost:6379"), "redis://localhost:6379");
    }
}

//! Redis-backed RateCounter
//!
//! The increment and the expiry arm run inside one Lua script, so the
//! counter for a window is created and given its TTL atomically even when
//! several workers hit the same key at once.

use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use crate::storage_traits::{RateCounter, StorageResult};

const INCR_WITH_EXPIRY: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

/// Redis implementation of [`RateCounter`].
#[derive(Clone)]
pub struct RedisRateCounter {
    client: redis::Client,
    script: redis::Script,
}

impl RedisRateCounter {
    /// Open a client for `url` (e.g. `redis://127.0.0.1:6379`).
    ///
    /// No connection is made until the first increment.
    pub fn open(url: &str) -> StorageResult<Self> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            script: redis::Script::new(INCR_WITH_EXPIRY),
        })
    }
}

#[async_trait]
impl RateCounter for RedisRateCounter {
    async fn incr_with_expiry(&self, key: &str, window: Duration) -> StorageResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        let count: u64 = self
            .script
            .key(key)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await?;
        trace!(key = %key, count = count, "rate counter incremented");
        Ok(count)
    }
}

use super::{Decision, RateLimitConfig};
use crate::db::{with_savepoint, DbResult};
use chrono::Utc;
use log::{debug, warn};
use rusqlite::{params, Connection};
use std::time::Duration;

/// Fixed-window limiter whose counters live in `rate_limit_windows`.
#[derive(Debug, Clone, Copy)]
pub struct FixedWindowLimiter {
    config: RateLimitConfig,
}

impl FixedWindowLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Counts one request for `client_key` at the current wall-clock time.
    pub fn check(&self, conn: &Connection, client_key: &str) -> DbResult<Decision> {
        self.check_at(conn, client_key, Utc::now().timestamp_millis())
    }

    /// Counts one request for `client_key` at `now_ms` (epoch milliseconds).
    ///
    /// Older windows of the same key are pruned in the same transaction.
    pub fn check_at(&self, conn: &Connection, client_key: &str, now_ms: i64) -> DbResult<Decision> {
        let window_ms = self.window_ms();
        let window_start = now_ms - now_ms.rem_euclid(window_ms);
        let reset_after = Duration::from_millis((window_start + window_ms - now_ms) as u64);

        let hits: i64 = with_savepoint(conn, "rate_limit_check", |conn| -> DbResult<i64> {
            conn.execute(
                "DELETE FROM rate_limit_windows
                 WHERE client_key = ?1
                   AND window_start < ?2;",
                params![client_key, window_start],
            )?;
            let hits = conn.query_row(
                "INSERT INTO rate_limit_windows (client_key, window_start, hits)
                 VALUES (?1, ?2, 1)
                 ON CONFLICT (client_key, window_start)
                 DO UPDATE SET hits = hits + 1
                 RETURNING hits;",
                params![client_key, window_start],
                |row| row.get(0),
            )?;
            Ok(hits)
        })?;

        let limit = self.config.max_requests;
        let hits = u32::try_from(hits).unwrap_or(u32::MAX);
        if hits > limit {
            warn!(
                "event=rate_limit module=ratelimit status=denied client={} hits={} limit={} retry_after_ms={}",
                client_key,
                hits,
                limit,
                reset_after.as_millis()
            );
            return Ok(Decision::Denied {
                limit,
                retry_after: reset_after,
            });
        }

        Ok(Decision::Allowed {
            limit,
            remaining: limit - hits,
            reset_after,
        })
    }

    /// Deletes every counter row older than the window containing `now_ms`.
    pub fn purge_expired_at(&self, conn: &Connection, now_ms: i64) -> DbResult<usize> {
        let window_ms = self.window_ms();
        let window_start = now_ms - now_ms.rem_euclid(window_ms);
        let removed = conn.execute(
            "DELETE FROM rate_limit_windows WHERE window_start < ?1;",
            [window_start],
        )?;
        debug!(
            "event=rate_limit_purge module=ratelimit status=ok removed={}",
            removed
        );
        Ok(removed)
    }

    /// Deletes every expired counter row relative to wall-clock time.
    pub fn purge_expired(&self, conn: &Connection) -> DbResult<usize> {
        self.purge_expired_at(conn, Utc::now().timestamp_millis())
    }

    fn window_ms(&self) -> i64 {
        i64::try_from(self.config.window.as_millis())
            .unwrap_or(i64::MAX)
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::FixedWindowLimiter;
    use crate::db::open_db_in_memory;
    use crate::ratelimit::{Decision, RateLimitConfig};
    use std::time::Duration;

    #[test]
    fn reset_after_counts_down_to_window_end() {
        let conn = open_db_in_memory().unwrap();
        let limiter = FixedWindowLimiter::new(RateLimitConfig {
            max_requests: 5,
            window: Duration::from_secs(60),
        });

        let decision = limiter.check_at(&conn, "ip:1.2.3.4", 60_000 + 15_000).unwrap();
        assert_eq!(
            decision,
            Decision::Allowed {
                limit: 5,
                remaining: 4,
                reset_after: Duration::from_secs(45),
            }
        );
    }
}

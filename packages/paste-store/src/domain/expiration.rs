//! Expiration policy
//!
//! One place for the TTL arithmetic every backend needs:
//! - a document is live iff `expires_at` is `None` or strictly after now
//! - a write gets `now + ttl` unless the caller skips expiration
//! - a refresh moves an existing deadline forward, never creates one

use std::fmt;
use std::sync::Arc;

use crate::shared::clock::{Clock, SystemClock};

#[derive(Clone)]
pub struct ExpirationPolicy {
    ttl_secs: Option<u64>,
    clock: Arc<dyn Clock>,
}

impl ExpirationPolicy {
    /// `ttl_secs` of `None` or `Some(0)` disables expiration
    pub fn new(ttl_secs: Option<u64>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl_secs: ttl_secs.filter(|ttl| *ttl > 0),
            clock,
        }
    }

    /// No expiration, wall clock
    pub fn never() -> Self {
        Self::new(None, Arc::new(SystemClock))
    }

    /// Expire after `ttl_secs`, wall clock
    pub fn after(ttl_secs: u64) -> Self {
        Self::new(Some(ttl_secs), Arc::new(SystemClock))
    }

    pub fn ttl_secs(&self) -> Option<u64> {
        self.ttl_secs
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Deadline for a document written now, if any
    pub fn deadline(&self, skip_expire: bool) -> Option<i64> {
        if skip_expire {
            return None;
        }
        self.ttl_secs.map(|ttl| self.now().saturating_add(ttl as i64))
    }

    /// New deadline for a read at `now`, given the current one.
    ///
    /// Returns `None` when nothing should change: refresh suppressed, no TTL
    /// configured, document without deadline, or current deadline already later.
    pub fn refreshed(&self, current: Option<i64>, skip_expire: bool) -> Option<i64> {
        let current = current?;
        let next = self.deadline(skip_expire)?;
        (next > current).then_some(next)
    }

    pub fn is_live(&self, expires_at: Option<i64>) -> bool {
        is_live_at(expires_at, self.now())
    }
}

pub fn is_live_at(expires_at: Option<i64>, now: i64) -> bool {
    expires_at.map_or(true, |deadline| deadline > now)
}

impl fmt::Debug for ExpirationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpirationPolicy")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

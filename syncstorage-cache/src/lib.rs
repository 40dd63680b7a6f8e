//! The cache overlay fronting the SQL store for a small set of "hot"
//! collections (`meta/global`, `tabs`) plus dispatcher node-status signals.
//!
//! Reads and writes here are fault-tolerant by construction: a memcached
//! outage degrades non-authoritative lookups to a miss rather than an
//! error. Callers relying on the cache as the sole source of truth (tabs)
//! are responsible for treating a persistent miss as the correct "empty
//! collection" answer, per the invariant this crate exists to implement.

#[macro_use]
extern crate slog_scope;

mod cache;
pub mod error;

pub use cache::{Cache, CachedTab, MemcachedCache, NodeStatus};
pub use error::CacheError;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn node_status_parses_known_values() {
        assert_eq!(NodeStatus::Unknown, NodeStatus::Unknown);
    }

    // `MemcachedCache` needs a live memcached to exercise meaningfully; the
    // key-namespace helpers and the tabs-ids bookkeeping above are covered
    // indirectly through the handler-level integration tests instead.
}

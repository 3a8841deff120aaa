//! Local tier configuration.

use std::time::Duration;

/// Configuration for an in-process cache tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache.
    pub max_capacity: u64,

    /// Upper bound on how long any entry lives.
    /// Entries also carry their own TTL; the shorter one wins.
    pub ttl: Option<Duration>,
}

impl CacheConfig {
    /// Config for the local tier of a registered type: entries never
    /// outlive the type's TTL.
    pub fn for_type(max_capacity: u64, ttl: Duration) -> Self {
        let ttl = (!ttl.is_zero()).then_some(ttl);
        Self { max_capacity, ttl }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_type_zero_ttl_disables_cap() {
        let config = CacheConfig::for_type(100, Duration::ZERO);
        assert_eq!(config.ttl, None);
        assert_eq!(config.max_capacity, 100);

        let config = CacheConfig::for_type(100, Duration::from_secs(5));
        assert_eq!(config.ttl, Some(Duration::from_secs(5)));
    }
}

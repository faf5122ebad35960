use std::env;
use tick_scheduler::Duration;

/// Resolution used when nothing else is configured
pub const DEFAULT_RESOLUTION: Duration = Duration::from_millis(100);

/// Container configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Length of one scheduler tick
    pub resolution: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
        }
    }
}

impl CacheConfig {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            resolution: parse_resolution(env::var("CONTENT_CACHE_RESOLUTION_MS").ok().as_deref()),
        }
    }
}

fn parse_resolution(raw: Option<&str>) -> Duration {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_RESOLUTION)
}

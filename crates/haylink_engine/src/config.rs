//! Configuration for the connector.

use std::time::{Duration, SystemTime};

/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Where and as whom to connect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Server URL.
    pub url: String,
    /// User name.
    pub user: String,
    /// Password.
    pub password: String,
}

impl ConnectionParams {
    /// Creates connection parameters.
    pub fn new(url: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user: user.into(),
            password: password.into(),
        }
    }
}

/// Configuration for one connector (one remote server).
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Connector name, used as the watch display name.
    pub name: String,
    /// Connection target.
    pub params: ConnectionParams,
    /// Fixed delay between poll cycles.
    pub poll_interval: Duration,
    /// Lease requested when opening a watch.
    pub watch_lease: Option<Duration>,
    /// Extra navigation levels fetched eagerly on each expansion.
    pub nav_depth: usize,
    /// Reconnect behavior.
    pub retry: RetryConfig,
}

impl ConnectorConfig {
    /// Creates a connector configuration.
    pub fn new(name: impl Into<String>, params: ConnectionParams) -> Self {
        Self {
            name: name.into(),
            params,
            poll_interval: DEFAULT_POLL_INTERVAL,
            watch_lease: None,
            nav_depth: 1,
            retry: RetryConfig::forever(),
        }
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the watch lease.
    pub fn with_watch_lease(mut self, lease: Duration) -> Self {
        self.watch_lease = Some(lease);
        self
    }

    /// Sets the navigation look-ahead depth.
    pub fn with_nav_depth(mut self, depth: usize) -> Self {
        self.nav_depth = depth;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self::new("haystack", ConnectionParams::default())
    }
}

/// Reconnect backoff.
///
/// The delay doubles with every failed attempt, starting at `initial_delay`
/// and capped at `max_delay`. Jitter adds up to a quarter on top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for the backoff before jitter.
    pub max_delay: Duration,
    /// Whether to spread retries with jitter.
    pub jitter: bool,
}

impl RetryConfig {
    /// Creates a retry configuration allowing `max_attempts` connects.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }

    /// Keeps retrying until the connection is closed.
    pub fn forever() -> Self {
        Self::new(u32::MAX).with_initial_delay(Duration::from_secs(1))
    }

    /// Gives up after the first failure.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay to wait before `attempt` (0 is the first, immediate attempt).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let doublings = (attempt - 1).min(31);
        let delay = self
            .initial_delay
            .checked_mul(1 << doublings)
            .map_or(self.max_delay, |d| d.min(self.max_delay));
        if !self.jitter {
            return delay;
        }
        let extra = (delay / 4)
            .checked_mul(jitter_permille())
            .map(|d| d / 1000)
            .unwrap_or_default();
        delay.saturating_add(extra)
    }
}

/// Clock-derived jitter in `0..1000`.
fn jitter_permille() -> u32 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|elapsed| elapsed.subsec_micros() % 1000)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connector_config_builder() {
        let params = ConnectionParams::new("http://localhost/api/demo", "su", "secret");
        let config = ConnectorConfig::new("demo", params.clone())
            .with_poll_interval(Duration::from_secs(2))
            .with_watch_lease(Duration::from_secs(60))
            .with_nav_depth(0);

        assert_eq!(config.name, "demo");
        assert_eq!(config.params, params);
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.watch_lease, Some(Duration::from_secs(60)));
        assert_eq!(config.nav_depth, 0);
    }

    #[test]
    fn connector_config_defaults() {
        let config = ConnectorConfig::default();
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.nav_depth, 1);
        assert_eq!(config.retry.max_attempts, u32::MAX);
    }

    #[test]
    fn retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 1);
    }

    #[test]
    fn retry_delay_doubles() {
        let config = RetryConfig::new(5).with_initial_delay(Duration::from_millis(100));

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        // Jitter adds at most a quarter.
        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(125));

        let delay3 = config.delay_for_attempt(3);
        assert!(delay3 >= Duration::from_millis(400));
        assert!(delay3 <= Duration::from_millis(500));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn retry_delay_never_overflows() {
        let config = RetryConfig::forever()
            .with_initial_delay(Duration::MAX)
            .with_max_delay(Duration::MAX);

        assert_eq!(config.delay_for_attempt(1), Duration::MAX);
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::MAX);
    }
}

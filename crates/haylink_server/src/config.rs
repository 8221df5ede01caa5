//! Server configuration.

use haylink_protocol::WriteLevel;
use std::time::Duration;

/// Configuration for the reference server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Accepted user name and password; `None` accepts anyone.
    pub credentials: Option<(String, String)>,
    /// Maximum number of open watches.
    pub max_watches: usize,
    /// Lease granted when a watch is opened without one.
    pub default_lease: Duration,
    /// Number of priority levels per writable point.
    pub level_count: usize,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new() -> Self {
        Self {
            credentials: None,
            max_watches: 64,
            default_lease: Duration::from_secs(60),
            level_count: WriteLevel::COUNT,
        }
    }

    /// Requires the given credentials on connect.
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), password.into()));
        self
    }

    /// Sets the maximum number of open watches.
    pub fn with_max_watches(mut self, max: usize) -> Self {
        self.max_watches = max;
        self
    }

    /// Sets the default watch lease.
    pub fn with_default_lease(mut self, lease: Duration) -> Self {
        self.default_lease = lease;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

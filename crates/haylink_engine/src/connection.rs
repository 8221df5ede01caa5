//! Connection capability: a lazily connected, self-healing client.

use crate::client::{ClientFactory, RemoteClient};
use crate::config::{ConnectionParams, RetryConfig};
use crate::error::{SyncError, SyncResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// A connection state transition.
#[derive(Clone)]
pub enum ConnectionEvent {
    /// A new client is connected and ready.
    Connected(Arc<dyn RemoteClient>),
    /// The previous client is gone.
    Closed,
}

impl std::fmt::Debug for ConnectionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionEvent::Connected(_) => f.write_str("Connected"),
            ConnectionEvent::Closed => f.write_str("Closed"),
        }
    }
}

/// Hands out a connected client, reconnecting when it is invalidated.
///
/// Subscribers receive exactly one `Connected` per established connection and
/// exactly one `Closed` per lost one, in that order.
pub struct ConnectionManager {
    factory: Arc<dyn ClientFactory>,
    params: RwLock<ConnectionParams>,
    retry: RetryConfig,
    current: RwLock<Option<Arc<dyn RemoteClient>>>,
    connect_lock: tokio::sync::Mutex<()>,
    listeners: RwLock<Vec<UnboundedSender<ConnectionEvent>>>,
    closed: AtomicBool,
    runtime: Handle,
}

impl ConnectionManager {
    /// Creates a manager. No connection is attempted until [`client`] is called.
    ///
    /// [`client`]: ConnectionManager::client
    pub fn new(
        factory: Arc<dyn ClientFactory>,
        params: ConnectionParams,
        retry: RetryConfig,
        runtime: Handle,
    ) -> Arc<Self> {
        Arc::new(Self {
            factory,
            params: RwLock::new(params),
            retry,
            current: RwLock::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
            listeners: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
            runtime,
        })
    }

    /// Registers for connection events.
    ///
    /// If a client is already connected, the receiver starts with a
    /// `Connected` event for it.
    pub fn subscribe(&self) -> UnboundedReceiver<ConnectionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let current = self.current.read();
        if let Some(client) = current.as_ref() {
            let _ = tx.send(ConnectionEvent::Connected(Arc::clone(client)));
        }
        self.listeners.write().push(tx);
        rx
    }

    /// Returns the connected client, connecting first if needed.
    pub async fn client(&self) -> SyncResult<Arc<dyn RemoteClient>> {
        if let Some(client) = self.current() {
            return Ok(client);
        }

        let _guard = self.connect_lock.lock().await;
        if let Some(client) = self.current() {
            return Ok(client);
        }

        let mut attempt = 0u32;
        loop {
            if self.is_closed() {
                return Err(SyncError::Cancelled);
            }

            let factory = Arc::clone(&self.factory);
            let params = self.params.read().clone();
            let url = params.url.clone();
            let result = tokio::task::spawn_blocking(move || factory.connect(&params)).await?;

            match result {
                Ok(client) => {
                    let mut current = self.current.write();
                    if self.is_closed() {
                        drop(current);
                        let _ = client.close();
                        return Err(SyncError::Cancelled);
                    }
                    *current = Some(Arc::clone(&client));
                    info!(url = %url, "connected");
                    self.emit(ConnectionEvent::Connected(Arc::clone(&client)));
                    return Ok(client);
                }
                Err(err) => {
                    attempt = attempt.saturating_add(1);
                    if !err.is_retryable() || attempt >= self.retry.max_attempts {
                        warn!(url = %url, error = %err, "connect failed");
                        return Err(err);
                    }
                    let delay = self.retry.delay_for_attempt(attempt);
                    debug!(url = %url, attempt, ?delay, error = %err, "connect failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Returns the connected client without connecting.
    pub fn current(&self) -> Option<Arc<dyn RemoteClient>> {
        self.current.read().clone()
    }

    /// Returns true if a client is connected.
    pub fn is_connected(&self) -> bool {
        self.current.read().is_some()
    }

    /// Returns true once [`close`](ConnectionManager::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Current connection parameters.
    pub fn params(&self) -> ConnectionParams {
        self.params.read().clone()
    }

    /// Drops the connected client and reconnects in the background.
    pub fn invalidate(self: &Arc<Self>) {
        if self.drop_client() {
            self.reconnect();
        }
    }

    /// Like [`invalidate`](ConnectionManager::invalidate), but only if `client`
    /// is still the connected one.
    pub fn invalidate_client(self: &Arc<Self>, client: &Arc<dyn RemoteClient>) {
        let is_current = self
            .current
            .read()
            .as_ref()
            .is_some_and(|current| same_client(current, client));
        if is_current {
            self.invalidate();
        }
    }

    /// Switches to new connection parameters and reconnects.
    ///
    /// Reopens a manager that was closed.
    pub fn edit_connection(self: &Arc<Self>, params: ConnectionParams) {
        info!(url = %params.url, "editing connection");
        *self.params.write() = params;
        self.closed.store(false, Ordering::SeqCst);
        self.drop_client();
        self.reconnect();
    }

    /// Drops the connected client and stops reconnecting.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.drop_client();
    }

    fn drop_client(&self) -> bool {
        let mut current = self.current.write();
        let Some(client) = current.take() else {
            return false;
        };
        self.emit(ConnectionEvent::Closed);
        drop(current);

        info!("connection closed");
        self.runtime.spawn_blocking(move || {
            if let Err(err) = client.close() {
                debug!(error = %err, "client close failed");
            }
        });
        true
    }

    fn reconnect(self: &Arc<Self>) {
        if self.is_closed() {
            return;
        }
        let this = Arc::clone(self);
        self.runtime.spawn(async move {
            if let Err(err) = this.client().await {
                warn!(error = %err, "reconnect abandoned");
            }
        });
    }

    fn emit(&self, event: ConnectionEvent) {
        self.listeners
            .write()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Compares two clients by identity.
pub(crate) fn same_client(a: &Arc<dyn RemoteClient>, b: &Arc<dyn RemoteClient>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MockClient, MockFactory};
    use std::time::Duration;

    fn manager(factory: Arc<MockFactory>) -> Arc<ConnectionManager> {
        let retry = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(5))
            .with_jitter(false);
        ConnectionManager::new(
            factory,
            ConnectionParams::new("mock://server", "su", "pw"),
            retry,
            Handle::current(),
        )
    }

    async fn next(rx: &mut UnboundedReceiver<ConnectionEvent>) -> ConnectionEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn client_connects_once() {
        let factory = Arc::new(MockFactory::new(Arc::new(MockClient::new())));
        let conn = manager(factory.clone());
        let mut rx = conn.subscribe();

        let a = conn.client().await.unwrap();
        let b = conn.client().await.unwrap();
        assert!(same_client(&a, &b));
        assert_eq!(factory.connects(), 1);
        assert!(matches!(next(&mut rx).await, ConnectionEvent::Connected(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn client_retries_transient_failures() {
        let factory = Arc::new(MockFactory::new(Arc::new(MockClient::new())));
        factory.fail_next_connect(SyncError::transport_retryable("refused"));
        factory.fail_next_connect(SyncError::transport_retryable("refused"));
        let conn = manager(factory.clone());

        conn.client().await.unwrap();
        assert_eq!(factory.connects(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn client_gives_up_on_fatal_failure() {
        let factory = Arc::new(MockFactory::new(Arc::new(MockClient::new())));
        factory.fail_next_connect(SyncError::AuthenticationFailed("bad password".into()));
        let conn = manager(factory.clone());

        let err = conn.client().await.err().unwrap();
        assert!(matches!(err, SyncError::AuthenticationFailed(_)));
        assert!(!conn.is_connected());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalidate_emits_closed_then_reconnects() {
        let factory = Arc::new(MockFactory::new(Arc::new(MockClient::new())));
        let conn = manager(factory.clone());
        let mut rx = conn.subscribe();

        conn.client().await.unwrap();
        assert!(matches!(next(&mut rx).await, ConnectionEvent::Connected(_)));

        conn.invalidate();
        assert!(matches!(next(&mut rx).await, ConnectionEvent::Closed));
        assert!(matches!(next(&mut rx).await, ConnectionEvent::Connected(_)));
        assert_eq!(factory.connects(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn close_stops_reconnecting() {
        let factory = Arc::new(MockFactory::new(Arc::new(MockClient::new())));
        let conn = manager(factory.clone());
        conn.client().await.unwrap();

        conn.close();
        conn.invalidate();
        assert!(!conn.is_connected());
        assert!(matches!(conn.client().await, Err(SyncError::Cancelled)));

        conn.edit_connection(ConnectionParams::new("mock://other", "su", "pw"));
        let client = conn.client().await.unwrap();
        assert!(conn.is_connected());
        drop(client);
        assert_eq!(factory.last_params().unwrap().url, "mock://other");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn late_subscriber_sees_current_connection() {
        let factory = Arc::new(MockFactory::new(Arc::new(MockClient::new())));
        let conn = manager(factory);
        conn.client().await.unwrap();

        let mut rx = conn.subscribe();
        assert!(matches!(next(&mut rx).await, ConnectionEvent::Connected(_)));
    }
}

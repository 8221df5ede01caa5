//! In-process client for the reference server.

use crate::server::MemoryServer;
use haylink_engine::{ClientFactory, ConnectionParams, RemoteClient, SyncError, SyncResult};
use haylink_protocol::{EntityRef, Grid, PointWriteRequest, Row};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A client that calls a [`MemoryServer`] directly.
///
/// Server errors are translated to the engine's error kinds; once closed,
/// every call fails with [`SyncError::NotConnected`].
pub struct LoopbackClient {
    server: Arc<MemoryServer>,
    closed: AtomicBool,
}

impl LoopbackClient {
    /// Creates a client for `server` without authenticating.
    pub fn new(server: Arc<MemoryServer>) -> Self {
        Self {
            server,
            closed: AtomicBool::new(false),
        }
    }

    /// Returns true once [`RemoteClient::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn server(&self) -> SyncResult<&MemoryServer> {
        if self.is_closed() {
            Err(SyncError::NotConnected)
        } else {
            Ok(&self.server)
        }
    }
}

impl RemoteClient for LoopbackClient {
    fn open_watch(&self, dis: &str, lease: Option<Duration>) -> SyncResult<String> {
        Ok(self.server()?.watch_open(dis, lease)?)
    }

    fn watch_sub(&self, watch_id: &str, ids: &[EntityRef]) -> SyncResult<Grid> {
        Ok(self.server()?.watch_sub(watch_id, ids)?)
    }

    fn watch_unsub(&self, watch_id: &str, ids: &[EntityRef]) -> SyncResult<()> {
        Ok(self.server()?.watch_unsub(watch_id, ids)?)
    }

    fn watch_poll_changes(&self, watch_id: &str) -> SyncResult<Option<Grid>> {
        Ok(self.server()?.watch_poll(watch_id)?)
    }

    fn watch_close(&self, watch_id: &str) -> SyncResult<()> {
        Ok(self.server()?.watch_close(watch_id)?)
    }

    fn nav(&self, nav_id: Option<&str>) -> SyncResult<Grid> {
        Ok(self.server()?.nav(nav_id)?)
    }

    fn read_all(&self, filter: &str, limit: Option<usize>) -> SyncResult<Grid> {
        Ok(self.server()?.read(filter, limit)?)
    }

    fn read_by_id(&self, id: &EntityRef) -> SyncResult<Option<Row>> {
        Ok(self.server()?.read_by_id(id)?)
    }

    fn eval(&self, expr: &str) -> SyncResult<Grid> {
        Ok(self.server()?.eval(expr)?)
    }

    fn invoke_action(&self, id: &EntityRef, action: &str, args: &Row) -> SyncResult<Grid> {
        Ok(self.server()?.invoke(id, action, args)?)
    }

    fn point_write(&self, request: &PointWriteRequest) -> SyncResult<Grid> {
        Ok(self.server()?.point_write(request)?)
    }

    fn his_read(&self, id: &EntityRef, range: &str) -> SyncResult<Grid> {
        Ok(self.server()?.his_read(id, range)?)
    }

    fn close(&self) -> SyncResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connects [`LoopbackClient`]s to one server, checking credentials.
pub struct LoopbackFactory {
    server: Arc<MemoryServer>,
}

impl LoopbackFactory {
    /// Creates a factory for `server`.
    pub fn new(server: Arc<MemoryServer>) -> Self {
        Self { server }
    }

    /// Returns the server behind this factory.
    pub fn server(&self) -> &Arc<MemoryServer> {
        &self.server
    }
}

impl ClientFactory for LoopbackFactory {
    fn connect(&self, params: &ConnectionParams) -> SyncResult<Arc<dyn RemoteClient>> {
        self.server.authenticate(&params.user, &params.password)?;
        debug!(url = %params.url, user = %params.user, "loopback connected");
        Ok(Arc::new(LoopbackClient::new(Arc::clone(&self.server))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    #[test]
    fn errors_are_translated() {
        let server = MemoryServer::new(ServerConfig::default());
        let client = LoopbackClient::new(Arc::clone(&server));

        assert!(client.nav(Some("nowhere")).unwrap_err().is_nav_unsupported());
        assert!(matches!(
            client.watch_poll_changes("w"),
            Err(SyncError::WatchExpired(_))
        ));

        server.set_online(false);
        assert!(client.nav(None).unwrap_err().is_retryable());
    }

    #[test]
    fn closed_client_is_not_connected() {
        let server = MemoryServer::new(ServerConfig::default());
        let client = LoopbackClient::new(server);
        client.close().unwrap();
        assert!(client.is_closed());
        assert!(matches!(client.nav(None), Err(SyncError::NotConnected)));
    }

    #[test]
    fn factory_checks_credentials() {
        let server = MemoryServer::new(ServerConfig::new().with_credentials("su", "pw"));
        let factory = LoopbackFactory::new(Arc::clone(&server));

        assert!(factory
            .connect(&ConnectionParams::new("mem://", "su", "pw"))
            .is_ok());
        assert!(matches!(
            factory.connect(&ConnectionParams::new("mem://", "su", "bad")),
            Err(SyncError::AuthenticationFailed(_))
        ));
        assert_eq!(factory.server().connects(), 1);
    }
}

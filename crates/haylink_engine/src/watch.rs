//! Watch sessions.

use crate::client::RemoteClient;
use crate::error::SyncResult;
use haylink_protocol::{EntityRef, Grid};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A server-side watch session bound to the client that opened it.
///
/// A watch is only valid for the lifetime of its client. When the connection
/// is replaced, a new watch must be opened on the new client.
pub struct Watch {
    id: String,
    client: Arc<dyn RemoteClient>,
}

impl Watch {
    /// Opens a new watch on `client`.
    pub fn open(
        client: Arc<dyn RemoteClient>,
        dis: &str,
        lease: Option<Duration>,
    ) -> SyncResult<Self> {
        let id = client.open_watch(dis, lease)?;
        Ok(Self { id, client })
    }

    /// Server-assigned watch id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The client this watch belongs to.
    pub fn client(&self) -> &Arc<dyn RemoteClient> {
        &self.client
    }

    /// Adds one entity to the watch.
    pub fn sub(&self, id: &EntityRef) -> SyncResult<Grid> {
        self.client.watch_sub(&self.id, std::slice::from_ref(id))
    }

    /// Removes one entity from the watch.
    pub fn unsub(&self, id: &EntityRef) -> SyncResult<()> {
        self.client.watch_unsub(&self.id, std::slice::from_ref(id))
    }

    /// Returns changes since the previous poll.
    pub fn poll_changes(&self) -> SyncResult<Option<Grid>> {
        self.client.watch_poll_changes(&self.id)
    }

    /// Closes the watch on the server.
    pub fn close(&self) -> SyncResult<()> {
        self.client.watch_close(&self.id)
    }
}

impl fmt::Debug for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockClient;

    #[test]
    fn watch_delegates_to_client() {
        let client = Arc::new(MockClient::new());
        let watch = Watch::open(client.clone(), "test", None).unwrap();
        assert_eq!(watch.id(), "w-0");

        let r1 = EntityRef::new("r1");
        watch.sub(&r1).unwrap();
        watch.unsub(&r1).unwrap();
        watch.close().unwrap();

        assert_eq!(client.sub_count(&r1), 1);
        assert_eq!(client.unsub_count(&r1), 1);
        assert_eq!(client.closed_watches(), vec!["w-0".to_string()]);
    }
}

//! Remote client abstraction.

use crate::config::ConnectionParams;
use crate::error::{SyncError, SyncResult};
use haylink_protocol::{EntityRef, Grid, PointWriteRequest, Row};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A connected client for one remote server.
///
/// Every call is blocking. The engine never invokes a client from an async
/// task directly; calls are moved onto the blocking pool first.
pub trait RemoteClient: Send + Sync {
    /// Opens a watch session and returns its server-assigned id.
    fn open_watch(&self, dis: &str, lease: Option<Duration>) -> SyncResult<String>;

    /// Adds entities to a watch, returning their current rows.
    fn watch_sub(&self, watch_id: &str, ids: &[EntityRef]) -> SyncResult<Grid>;

    /// Removes entities from a watch.
    fn watch_unsub(&self, watch_id: &str, ids: &[EntityRef]) -> SyncResult<()>;

    /// Returns rows that changed since the previous poll, or `None` if nothing changed.
    fn watch_poll_changes(&self, watch_id: &str) -> SyncResult<Option<Grid>>;

    /// Closes a watch session.
    fn watch_close(&self, watch_id: &str) -> SyncResult<()>;

    /// Returns the navigation children of `nav_id`, or the roots when `None`.
    fn nav(&self, nav_id: Option<&str>) -> SyncResult<Grid>;

    /// Reads entities matching a filter.
    fn read_all(&self, filter: &str, limit: Option<usize>) -> SyncResult<Grid>;

    /// Reads one entity by id.
    fn read_by_id(&self, id: &EntityRef) -> SyncResult<Option<Row>>;

    /// Evaluates an expression on the server.
    fn eval(&self, expr: &str) -> SyncResult<Grid>;

    /// Invokes a named action on an entity.
    fn invoke_action(&self, id: &EntityRef, action: &str, args: &Row) -> SyncResult<Grid>;

    /// Writes or releases a priority level, returning the point's level array.
    fn point_write(&self, request: &PointWriteRequest) -> SyncResult<Grid>;

    /// Reads history samples for a point over a range expression.
    fn his_read(&self, id: &EntityRef, range: &str) -> SyncResult<Grid>;

    /// Closes the client.
    fn close(&self) -> SyncResult<()>;
}

/// Creates connected clients.
pub trait ClientFactory: Send + Sync {
    /// Connects (and authenticates) to the server described by `params`.
    fn connect(&self, params: &ConnectionParams) -> SyncResult<Arc<dyn RemoteClient>>;
}

/// A scriptable client for testing.
///
/// Nav results and poll results are queued up front; every call is recorded
/// so tests can assert on what the engine sent.
#[derive(Default)]
pub struct MockClient {
    connected: AtomicBool,
    next_watch: AtomicUsize,
    active_polls: AtomicUsize,
    max_active_polls: AtomicUsize,
    closes: AtomicUsize,
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    entities: HashMap<EntityRef, Row>,
    nav: HashMap<Option<String>, SyncResult<Grid>>,
    polls: VecDeque<SyncResult<Option<Grid>>>,
    poll_delay: Duration,
    fail_open: Option<SyncError>,
    fail_sub: Option<SyncError>,
    sub_counts: HashMap<EntityRef, usize>,
    unsub_counts: HashMap<EntityRef, usize>,
    poll_count: usize,
    nav_requests: Vec<Option<String>>,
    opened: Vec<String>,
    closed: Vec<String>,
    writes: Vec<PointWriteRequest>,
    responses: HashMap<&'static str, Grid>,
}

impl MockClient {
    /// Creates a connected mock client.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Registers an entity row returned by `watch_sub` and `read_by_id`.
    pub fn set_entity(&self, row: Row) {
        if let Some(id) = row.id().cloned() {
            self.state.lock().entities.insert(id, row);
        }
    }

    /// Sets the result of `nav(nav_id)`.
    pub fn set_nav(&self, nav_id: Option<&str>, result: SyncResult<Grid>) {
        self.state
            .lock()
            .nav
            .insert(nav_id.map(str::to_string), result);
    }

    /// Queues the result of the next `watch_poll_changes`.
    ///
    /// When the queue is empty, polls report no changes.
    pub fn push_poll(&self, result: SyncResult<Option<Grid>>) {
        self.state.lock().polls.push_back(result);
    }

    /// Makes every poll block for `delay` before answering.
    pub fn set_poll_delay(&self, delay: Duration) {
        self.state.lock().poll_delay = delay;
    }

    /// Makes the next `open_watch` fail.
    pub fn fail_next_open(&self, error: SyncError) {
        self.state.lock().fail_open = Some(error);
    }

    /// Makes the next `watch_sub` fail.
    pub fn fail_next_sub(&self, error: SyncError) {
        self.state.lock().fail_sub = Some(error);
    }

    /// Sets the grid returned by `read_all`, `eval`, `invoke_action` or `his_read`.
    pub fn set_response(&self, op: &'static str, grid: Grid) {
        self.state.lock().responses.insert(op, grid);
    }

    /// Number of times `id` was added to a watch.
    pub fn sub_count(&self, id: &EntityRef) -> usize {
        self.state.lock().sub_counts.get(id).copied().unwrap_or(0)
    }

    /// Number of times `id` was removed from a watch.
    pub fn unsub_count(&self, id: &EntityRef) -> usize {
        self.state.lock().unsub_counts.get(id).copied().unwrap_or(0)
    }

    /// Number of polls served.
    pub fn poll_count(&self) -> usize {
        self.state.lock().poll_count
    }

    /// Highest number of polls that were in flight at once.
    pub fn max_concurrent_polls(&self) -> usize {
        self.max_active_polls.load(Ordering::SeqCst)
    }

    /// Number of times the client was closed.
    ///
    /// Closing does not disconnect the mock; the factory hands the same
    /// client out again on reconnect.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Nav ids requested so far, in order.
    pub fn nav_requests(&self) -> Vec<Option<String>> {
        self.state.lock().nav_requests.clone()
    }

    /// Watch ids opened so far.
    pub fn opened_watches(&self) -> Vec<String> {
        self.state.lock().opened.clone()
    }

    /// Watch ids closed so far.
    pub fn closed_watches(&self) -> Vec<String> {
        self.state.lock().closed.clone()
    }

    /// Point writes received so far.
    pub fn writes(&self) -> Vec<PointWriteRequest> {
        self.state.lock().writes.clone()
    }

    fn check_connected(&self) -> SyncResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::NotConnected)
        }
    }

    fn response(&self, op: &'static str) -> SyncResult<Grid> {
        self.check_connected()?;
        Ok(self
            .state
            .lock()
            .responses
            .get(op)
            .cloned()
            .unwrap_or_else(Grid::empty))
    }
}

impl RemoteClient for MockClient {
    fn open_watch(&self, _dis: &str, _lease: Option<Duration>) -> SyncResult<String> {
        self.check_connected()?;
        let mut state = self.state.lock();
        if let Some(err) = state.fail_open.take() {
            return Err(err);
        }
        let id = format!("w-{}", self.next_watch.fetch_add(1, Ordering::SeqCst));
        state.opened.push(id.clone());
        Ok(id)
    }

    fn watch_sub(&self, _watch_id: &str, ids: &[EntityRef]) -> SyncResult<Grid> {
        self.check_connected()?;
        let mut state = self.state.lock();
        if let Some(err) = state.fail_sub.take() {
            return Err(err);
        }
        let mut grid = Grid::empty();
        for id in ids {
            *state.sub_counts.entry(id.clone()).or_insert(0) += 1;
            if let Some(row) = state.entities.get(id) {
                grid.push(row.clone());
            }
        }
        Ok(grid)
    }

    fn watch_unsub(&self, _watch_id: &str, ids: &[EntityRef]) -> SyncResult<()> {
        self.check_connected()?;
        let mut state = self.state.lock();
        for id in ids {
            *state.unsub_counts.entry(id.clone()).or_insert(0) += 1;
        }
        Ok(())
    }

    fn watch_poll_changes(&self, _watch_id: &str) -> SyncResult<Option<Grid>> {
        self.check_connected()?;
        let active = self.active_polls.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_polls.fetch_max(active, Ordering::SeqCst);

        let delay = self.state.lock().poll_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let result = {
            let mut state = self.state.lock();
            state.poll_count += 1;
            state.polls.pop_front().unwrap_or(Ok(None))
        };
        self.active_polls.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn watch_close(&self, watch_id: &str) -> SyncResult<()> {
        self.state.lock().closed.push(watch_id.to_string());
        Ok(())
    }

    fn nav(&self, nav_id: Option<&str>) -> SyncResult<Grid> {
        self.check_connected()?;
        let mut state = self.state.lock();
        let key = nav_id.map(str::to_string);
        state.nav_requests.push(key.clone());
        match state.nav.get(&key) {
            Some(result) => result.clone(),
            None => Err(SyncError::NavUnsupported(
                nav_id.unwrap_or("<root>").to_string(),
            )),
        }
    }

    fn read_all(&self, _filter: &str, _limit: Option<usize>) -> SyncResult<Grid> {
        self.response("read")
    }

    fn read_by_id(&self, id: &EntityRef) -> SyncResult<Option<Row>> {
        self.check_connected()?;
        Ok(self.state.lock().entities.get(id).cloned())
    }

    fn eval(&self, _expr: &str) -> SyncResult<Grid> {
        self.response("eval")
    }

    fn invoke_action(&self, _id: &EntityRef, _action: &str, _args: &Row) -> SyncResult<Grid> {
        self.response("invoke")
    }

    fn point_write(&self, request: &PointWriteRequest) -> SyncResult<Grid> {
        self.check_connected()?;
        self.state.lock().writes.push(request.clone());
        self.response("pointWrite")
    }

    fn his_read(&self, _id: &EntityRef, _range: &str) -> SyncResult<Grid> {
        self.response("hisRead")
    }

    fn close(&self) -> SyncResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A factory that hands out one shared [`MockClient`].
pub struct MockFactory {
    client: Arc<MockClient>,
    connects: AtomicUsize,
    failures: Mutex<VecDeque<SyncError>>,
    last_params: Mutex<Option<ConnectionParams>>,
}

impl MockFactory {
    /// Creates a factory around `client`.
    pub fn new(client: Arc<MockClient>) -> Self {
        Self {
            client,
            connects: AtomicUsize::new(0),
            failures: Mutex::new(VecDeque::new()),
            last_params: Mutex::new(None),
        }
    }

    /// Makes the next connect attempt fail.
    pub fn fail_next_connect(&self, error: SyncError) {
        self.failures.lock().push_back(error);
    }

    /// Number of successful connects.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Parameters of the most recent connect attempt.
    pub fn last_params(&self) -> Option<ConnectionParams> {
        self.last_params.lock().clone()
    }
}

impl ClientFactory for MockFactory {
    fn connect(&self, params: &ConnectionParams) -> SyncResult<Arc<dyn RemoteClient>> {
        *self.last_params.lock() = Some(params.clone());
        if let Some(err) = self.failures.lock().pop_front() {
            return Err(err);
        }
        self.client.set_connected(true);
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.client) as Arc<dyn RemoteClient>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_client_not_connected() {
        let client = MockClient::new();
        client.set_connected(false);
        let result = client.open_watch("test", None);
        assert!(matches!(result, Err(SyncError::NotConnected)));
    }

    #[test]
    fn mock_client_counts_subscriptions() {
        let client = MockClient::new();
        let r1 = EntityRef::new("r1");
        client.set_entity(Row::new().with("id", r1.clone()).with("curVal", 20.0));

        let watch = client.open_watch("test", None).unwrap();
        let grid = client.watch_sub(&watch, &[r1.clone()]).unwrap();
        assert_eq!(grid.len(), 1);
        client.watch_unsub(&watch, &[r1.clone()]).unwrap();

        assert_eq!(client.sub_count(&r1), 1);
        assert_eq!(client.unsub_count(&r1), 1);
    }

    #[test]
    fn mock_client_poll_queue() {
        let client = MockClient::new();
        client.push_poll(Ok(Some(Grid::from_rows(vec![Row::new().with("a", 1.0)]))));

        assert_eq!(client.watch_poll_changes("w").unwrap().map(|g| g.len()), Some(1));
        assert!(client.watch_poll_changes("w").unwrap().is_none());
        assert_eq!(client.poll_count(), 2);
        assert_eq!(client.max_concurrent_polls(), 1);
    }

    #[test]
    fn mock_client_unknown_nav() {
        let client = MockClient::new();
        let err = client.nav(Some("missing")).unwrap_err();
        assert!(err.is_nav_unsupported());
        assert_eq!(client.nav_requests(), vec![Some("missing".to_string())]);
    }

    #[test]
    fn mock_factory_failures() {
        let client = Arc::new(MockClient::new());
        let factory = MockFactory::new(Arc::clone(&client));
        factory.fail_next_connect(SyncError::AuthenticationFailed("bad password".into()));

        let params = ConnectionParams::new("http://x", "u", "p");
        assert!(factory.connect(&params).is_err());
        assert!(factory.connect(&params).is_ok());
        assert_eq!(factory.connects(), 1);
        assert_eq!(factory.last_params(), Some(params));
    }
}

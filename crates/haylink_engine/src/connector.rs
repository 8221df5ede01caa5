//! One connector per remote server: wires connection, watch, poll and nav.

use crate::actions::{self, InvokeArgs, PointWriteParams, Table};
use crate::client::{ClientFactory, RemoteClient};
use crate::config::{ConnectionParams, ConnectorConfig};
use crate::connection::{ConnectionEvent, ConnectionManager};
use crate::error::{SyncError, SyncResult};
use crate::nav::NavigationCrawler;
use crate::poll::{PollFailureHook, PollLoop};
use crate::registry::SubscriptionRegistry;
use crate::watch::Watch;
use haylink_protocol::EntityRef;
use haylink_tree::{NodeRef, TreeNode};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A running connector for one remote server.
///
/// The connector owns the subscription registry, the active watch and the
/// poll schedule for its server. The tree nodes stay owned by the host.
///
/// # Lifecycle
///
/// - `start`: listens for connection events and requests a first client
/// - on connect: opens a watch, replays bindings, arms polling
/// - on disconnect: cancels polling and forgets the watch
/// - `stop`: closes the connection; `destroy` also drops bindings and hooks
pub struct Connector {
    root: NodeRef,
    config: RwLock<ConnectorConfig>,
    connection: Arc<ConnectionManager>,
    registry: Arc<SubscriptionRegistry>,
    poller: Arc<PollLoop>,
    crawler: Arc<NavigationCrawler>,
    runtime: Handle,
    events: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Connector {
    /// Starts a connector on the current tokio runtime.
    ///
    /// The root node's list hook is wired to root navigation.
    pub fn start(
        root: NodeRef,
        config: ConnectorConfig,
        factory: Arc<dyn ClientFactory>,
    ) -> SyncResult<Arc<Self>> {
        let runtime = Handle::try_current().map_err(|e| SyncError::Worker(e.to_string()))?;

        let connection = ConnectionManager::new(
            factory,
            config.params.clone(),
            config.retry.clone(),
            runtime.clone(),
        );
        let registry = Arc::new(SubscriptionRegistry::new(runtime.clone()));
        let poller = PollLoop::new(Arc::clone(&registry), runtime.clone());
        let crawler = NavigationCrawler::new(
            Arc::clone(&connection),
            &registry,
            runtime.clone(),
            config.nav_depth,
        );

        info!(
            name = %config.name,
            url = %config.params.url,
            poll_interval = ?config.poll_interval,
            "starting connector"
        );

        let connector = Arc::new(Self {
            root,
            config: RwLock::new(config),
            connection,
            registry,
            poller,
            crawler,
            runtime,
            events: Mutex::new(None),
            stopped: AtomicBool::new(false),
        });

        let hook: PollFailureHook = {
            let connection = Arc::downgrade(&connector.connection);
            Arc::new(move |watch: Arc<Watch>, _err: SyncError| {
                if let Some(connection) = connection.upgrade() {
                    connection.invalidate_client(watch.client());
                }
            })
        };
        connector.poller.set_on_failure(Some(hook));

        connector
            .root
            .set_on_list(Some(connector.crawler.list_hook(&connector.root, None)));

        let rx = connector.connection.subscribe();
        let task = connector
            .runtime
            .spawn(Self::run_events(Arc::downgrade(&connector), rx));
        *connector.events.lock() = Some(task);

        connector.request_client();
        Ok(connector)
    }

    async fn run_events(this: Weak<Self>, mut rx: UnboundedReceiver<ConnectionEvent>) {
        while let Some(event) = rx.recv().await {
            let Some(connector) = this.upgrade() else {
                break;
            };
            match event {
                ConnectionEvent::Connected(client) => connector.on_connected(client).await,
                ConnectionEvent::Closed => connector.on_closed(),
            }
        }
        debug!("connection event loop finished");
    }

    async fn on_connected(&self, client: Arc<dyn RemoteClient>) {
        if self.is_stopped() {
            return;
        }
        let (name, lease, interval, backoff) = {
            let config = self.config.read();
            (
                config.name.clone(),
                config.watch_lease,
                config.poll_interval,
                config.retry.delay_for_attempt(1),
            )
        };

        let opener = Arc::clone(&client);
        let opened = tokio::task::spawn_blocking(move || Watch::open(opener, &name, lease))
            .await
            .map_err(SyncError::from)
            .and_then(|r| r);

        match opened {
            Ok(watch) => {
                self.registry.on_connect(Arc::new(watch));
                self.poller.arm(interval);
            }
            Err(err) => {
                warn!(error = %err, ?backoff, "watch open failed, reconnecting");
                let connection = Arc::downgrade(&self.connection);
                self.runtime.spawn(async move {
                    tokio::time::sleep(backoff).await;
                    if let Some(connection) = connection.upgrade() {
                        connection.invalidate_client(&client);
                    }
                });
            }
        }
    }

    fn on_closed(&self) {
        self.poller.cancel();
        self.registry.on_disconnect();
    }

    fn request_client(&self) {
        let connection = Arc::clone(&self.connection);
        self.runtime.spawn(async move {
            if let Err(err) = connection.client().await {
                warn!(error = %err, "initial connect failed");
            }
        });
    }

    /// The connector's name.
    pub fn name(&self) -> String {
        self.config.read().name.clone()
    }

    /// Current configuration.
    pub fn config(&self) -> ConnectorConfig {
        self.config.read().clone()
    }

    /// The node this connector populates.
    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    /// The subscription registry.
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// The connection capability.
    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// The poll schedule.
    pub fn poller(&self) -> &Arc<PollLoop> {
        &self.poller
    }

    /// The navigation crawler.
    pub fn crawler(&self) -> &Arc<NavigationCrawler> {
        &self.crawler
    }

    /// Returns true if a watch is active.
    pub fn is_watching(&self) -> bool {
        self.registry.current_watch().is_some()
    }

    /// Returns true once stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Expands the root node now.
    pub fn navigate_root(&self) -> JoinHandle<SyncResult<usize>> {
        self.crawler.navigate(Arc::clone(&self.root), None)
    }

    /// Binds `id` to `node`.
    pub fn subscribe(&self, id: EntityRef, node: NodeRef) {
        self.registry.subscribe(id, node);
    }

    /// Removes the binding for `id`.
    pub fn unsubscribe(&self, id: &EntityRef) {
        self.registry.unsubscribe(id);
    }

    /// Changes the poll interval, re-arming the schedule if a watch is active.
    pub fn set_poll_interval(&self, interval: Duration) {
        self.config.write().poll_interval = interval;
        if self.is_watching() {
            info!(?interval, "poll interval changed");
            self.poller.arm(interval);
        }
    }

    /// Points the connector at a new server and poll interval.
    ///
    /// Bindings are kept and replayed once the new connection is up.
    pub fn edit_connection(&self, params: ConnectionParams, poll_interval: Duration) {
        self.stopped.store(false, Ordering::SeqCst);
        self.config.write().params = params.clone();
        self.connection.edit_connection(params);
        self.set_poll_interval(poll_interval);
    }

    /// Stops polling and closes the connection. Bindings are kept.
    pub fn stop(&self) {
        info!(name = %self.name(), "stopping connector");
        self.stopped.store(true, Ordering::SeqCst);
        self.poller.cancel();
        if let Some(watch) = self.registry.on_disconnect() {
            self.runtime.spawn_blocking(move || {
                if let Err(err) = watch.close() {
                    debug!(error = %err, "watch close failed");
                }
            });
        }
        self.connection.close();
    }

    /// Stops the connector and discards bindings, hooks and background tasks.
    pub fn destroy(&self) {
        self.stop();
        if let Some(task) = self.events.lock().take() {
            task.abort();
        }
        self.root.set_on_list(None);
        self.registry.clear();
        self.crawler.reset();
    }

    /// Reads entities matching `filter` (at most `limit`, default 1).
    pub async fn read(&self, filter: &str, limit: Option<usize>) -> SyncResult<Table> {
        let filter = filter.to_string();
        self.call(move |client| actions::read(client, &filter, limit))
            .await
    }

    /// Evaluates an expression.
    pub async fn eval(&self, expr: &str) -> SyncResult<Table> {
        let expr = expr.to_string();
        self.call(move |client| actions::eval(client, &expr)).await
    }

    /// Reads history for `id` over `range`.
    pub async fn his_read(&self, id: &str, range: &str) -> SyncResult<Table> {
        let (id, range) = (id.to_string(), range.to_string());
        self.call(move |client| actions::his_read(client, &id, &range))
            .await
    }

    /// Invokes `action` on `id`.
    pub async fn invoke(&self, id: &str, action: &str, args: InvokeArgs) -> SyncResult<Table> {
        let (id, action) = (id.to_string(), action.to_string());
        self.call(move |client| actions::invoke(client, &id, &action, &args))
            .await
    }

    /// Writes or releases a priority level.
    ///
    /// Input is validated before any connection is made.
    pub async fn point_write(&self, params: PointWriteParams) -> SyncResult<Table> {
        params.to_request()?;
        self.call(move |client| actions::point_write(client, &params))
            .await
    }

    async fn call<T, F>(&self, f: F) -> SyncResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn RemoteClient) -> SyncResult<T> + Send + 'static,
    {
        let client = self.connection.client().await?;
        tokio::task::spawn_blocking(move || f(client.as_ref())).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MockClient, MockFactory};
    use crate::config::RetryConfig;
    use haylink_protocol::{Grid, Row};
    use haylink_tree::{MemoryNode, NodeValue};

    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..300 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    fn config() -> ConnectorConfig {
        ConnectorConfig::new("demo", ConnectionParams::new("mock://server", "su", "pw"))
            .with_poll_interval(Duration::from_millis(20))
            .with_retry(
                RetryConfig::new(10)
                    .with_initial_delay(Duration::from_millis(5))
                    .with_jitter(false),
            )
    }

    fn start(client: &Arc<MockClient>) -> (Arc<Connector>, Arc<MemoryNode>, Arc<MockFactory>) {
        let factory = Arc::new(MockFactory::new(Arc::clone(client)));
        let root = MemoryNode::root("demo");
        let connector = Connector::start(root.clone(), config(), factory.clone()).unwrap();
        (connector, root, factory)
    }

    fn temp_row(value: f64) -> Grid {
        Grid::from_rows(vec![Row::new()
            .with("id", EntityRef::new("r1"))
            .with("temp", value)])
    }

    #[test]
    fn start_outside_runtime_fails() {
        let factory = Arc::new(MockFactory::new(Arc::new(MockClient::new())));
        let result = Connector::start(MemoryNode::root("x"), config(), factory);
        assert!(matches!(result, Err(SyncError::Worker(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn connect_opens_watch_and_polls() {
        let client = Arc::new(MockClient::new());
        let (connector, _root, _factory) = start(&client);
        wait_until(|| connector.is_watching()).await;

        let node = MemoryNode::root("point");
        connector.subscribe(EntityRef::new("r1"), node.clone());
        client.push_poll(Ok(Some(temp_row(21.5))));
        wait_until(|| node.node("temp").is_some()).await;
        assert_eq!(node.node("temp").unwrap().value(), NodeValue::Number(21.5));
        assert!(connector.poller().is_armed());
        connector.destroy();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn poll_failure_reconnects_and_replays() {
        let client = Arc::new(MockClient::new());
        let (connector, _root, factory) = start(&client);
        wait_until(|| connector.is_watching()).await;

        let r1 = EntityRef::new("r1");
        connector.subscribe(r1.clone(), MemoryNode::root("point"));
        wait_until(|| client.sub_count(&r1) == 1).await;

        client.push_poll(Err(SyncError::WatchExpired("w-0".into())));
        wait_until(|| client.opened_watches().len() == 2 && connector.is_watching()).await;
        wait_until(|| client.sub_count(&r1) == 2).await;
        assert_eq!(factory.connects(), 2);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(client.sub_count(&r1), 2);
        connector.destroy();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_watch_open_retries() {
        let client = Arc::new(MockClient::new());
        client.fail_next_open(SyncError::ServerError("too many watches".into()));
        let (connector, _root, factory) = start(&client);

        wait_until(|| connector.is_watching()).await;
        assert_eq!(factory.connects(), 2);
        connector.destroy();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn set_poll_interval_rearms() {
        let client = Arc::new(MockClient::new());
        let (connector, _root, _factory) = start(&client);
        wait_until(|| connector.is_watching()).await;
        connector.subscribe(EntityRef::new("r1"), MemoryNode::root("point"));

        connector.set_poll_interval(Duration::from_secs(3600));
        let before = client.poll_count();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(client.poll_count() <= before + 1);

        connector.set_poll_interval(Duration::from_millis(10));
        wait_until(|| client.poll_count() >= before + 3).await;
        assert_eq!(connector.config().poll_interval, Duration::from_millis(10));
        connector.destroy();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn root_list_navigates() {
        let client = Arc::new(MockClient::new());
        client.set_nav(None, Ok(Grid::from_rows(vec![Row::new().with("dis", "Site")])));
        let (connector, root, _factory) = start(&client);

        assert!(root.list());
        wait_until(|| root.node("Site").is_some()).await;
        connector.destroy();
        assert!(!root.has_list_hook());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_and_edit_connection() {
        let client = Arc::new(MockClient::new());
        let (connector, _root, factory) = start(&client);
        wait_until(|| connector.is_watching()).await;
        let r1 = EntityRef::new("r1");
        connector.subscribe(r1.clone(), MemoryNode::root("point"));

        connector.stop();
        assert!(!connector.is_watching());
        assert!(!connector.poller().is_armed());
        assert!(!connector.connection().is_connected());
        assert_eq!(connector.registry().len(), 1);

        connector.edit_connection(
            ConnectionParams::new("mock://other", "su", "pw"),
            Duration::from_millis(15),
        );
        wait_until(|| connector.is_watching()).await;
        assert_eq!(factory.last_params().unwrap().url, "mock://other");
        wait_until(|| client.sub_count(&r1) >= 2).await;
        connector.destroy();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn actions_validate_before_connecting() {
        let client = Arc::new(MockClient::new());
        let (connector, _root, _factory) = start(&client);

        let err = connector
            .point_write(PointWriteParams::new("p").with_level("42"))
            .await
            .unwrap_err();
        assert!(err.is_user_error());

        client.set_response("eval", Grid::from_rows(vec![Row::new().with("val", 1.0)]));
        let table = connector.eval("1 + 0").await.unwrap();
        assert_eq!(table.cell(0, "val"), Some(&NodeValue::Number(1.0)));
        connector.destroy();
    }
}

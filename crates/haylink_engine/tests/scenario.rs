//! Connector scenarios driven through the public API with a scripted client.

use haylink_engine::{
    ConnectionParams, Connector, ConnectorConfig, MockClient, MockFactory, RetryConfig, SyncError,
};
use haylink_protocol::{EntityRef, Grid, Row};
use haylink_tree::{MemoryNode, NodeValue, TreeNode};
use std::sync::Arc;
use std::time::Duration;

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

fn config() -> ConnectorConfig {
    ConnectorConfig::new("site", ConnectionParams::new("mock://site", "su", "pw"))
        .with_poll_interval(Duration::from_millis(20))
        .with_retry(
            RetryConfig::new(20)
                .with_initial_delay(Duration::from_millis(5))
                .with_jitter(false),
        )
}

fn temp(value: f64) -> Option<Grid> {
    Some(Grid::from_rows(vec![Row::new()
        .with("id", EntityRef::new("R1"))
        .with("temp", value)]))
}

#[tokio::test(flavor = "multi_thread")]
async fn subscribe_poll_reconnect() {
    let client = Arc::new(MockClient::new());
    let factory = Arc::new(MockFactory::new(Arc::clone(&client)));
    let root = MemoryNode::root("site");
    let connector = Connector::start(root.clone(), config(), factory.clone()).unwrap();
    wait_until(|| connector.is_watching()).await;

    let r1 = EntityRef::new("R1");
    let node = root.create_child("point");
    connector.subscribe(r1.clone(), Arc::clone(&node));
    wait_until(|| client.sub_count(&r1) == 1).await;

    client.push_poll(Ok(temp(21.5)));
    wait_until(|| node.child("temp").map(|c| c.value()) == Some(NodeValue::Number(21.5))).await;

    client.push_poll(Ok(temp(22.0)));
    wait_until(|| node.child("temp").map(|c| c.value()) == Some(NodeValue::Number(22.0))).await;
    assert_eq!(node.child_names(), vec!["temp".to_string()]);

    // Drop the connection underneath the connector.
    client.push_poll(Err(SyncError::transport_retryable("connection reset")));
    wait_until(|| client.opened_watches().len() == 2 && connector.is_watching()).await;
    wait_until(|| client.sub_count(&r1) == 2).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.sub_count(&r1), 2);
    assert_eq!(node.child_names(), vec!["temp".to_string()]);
    connector.destroy();
}

#[tokio::test(flavor = "multi_thread")]
async fn unsubscribed_while_disconnected_is_not_replayed() {
    let client = Arc::new(MockClient::new());
    let factory = Arc::new(MockFactory::new(Arc::clone(&client)));
    let root = MemoryNode::root("site");
    let connector = Connector::start(root.clone(), config(), factory.clone()).unwrap();
    wait_until(|| connector.is_watching()).await;

    let keep = EntityRef::new("keep");
    let gone = EntityRef::new("gone");
    connector.subscribe(keep.clone(), root.create_child("keep"));
    connector.subscribe(gone.clone(), root.create_child("gone"));
    wait_until(|| client.sub_count(&keep) == 1 && client.sub_count(&gone) == 1).await;

    connector.stop();
    connector.unsubscribe(&gone);
    connector.edit_connection(
        ConnectionParams::new("mock://site", "su", "pw"),
        Duration::from_millis(20),
    );

    wait_until(|| client.sub_count(&keep) == 2).await;
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(client.sub_count(&gone), 1);
    assert_eq!(client.unsub_count(&gone), 0);
    connector.destroy();
}

#[tokio::test(flavor = "multi_thread")]
async fn navigation_then_observation_subscribes() {
    let client = Arc::new(MockClient::new());
    client.set_nav(
        None,
        Ok(Grid::from_rows(vec![Row::new()
            .with("dis", "Main Site")
            .with("navId", "site")])),
    );
    client.set_nav(
        Some("site"),
        Ok(Grid::from_rows(vec![Row::new()
            .with("dis", "Zone Temp")
            .with("id", EntityRef::new("zt"))
            .with("curVal", 70.0)])),
    );

    let factory = Arc::new(MockFactory::new(Arc::clone(&client)));
    let root = MemoryNode::root("site");
    let connector = Connector::start(root.clone(), config(), factory).unwrap();
    wait_until(|| connector.is_watching()).await;

    root.list();
    wait_until(|| root.resolve("Main Site/Zone Temp/id").is_some()).await;
    let point = root.resolve("Main Site/Zone Temp").unwrap();
    let id = point.node("id").unwrap();

    id.observe();
    let zt = EntityRef::new("zt");
    wait_until(|| client.sub_count(&zt) == 1).await;

    client.push_poll(Ok(Some(Grid::from_rows(vec![Row::new()
        .with("id", zt.clone())
        .with("curVal", 71.0)]))));
    wait_until(|| point.node("curVal").map(|c| c.value()) == Some(NodeValue::Number(71.0))).await;

    // Columns missing from the poll row are dropped; the identity leaf stays.
    assert!(point.node("dis").is_none());
    assert!(point.node("id").is_some());

    id.unobserve();
    wait_until(|| client.unsub_count(&zt) == 1).await;
    connector.destroy();
}

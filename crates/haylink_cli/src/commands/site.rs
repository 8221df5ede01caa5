//! The sample site served by the reference server, and connector setup.

use haylink_engine::{ConnectionParams, Connector, ConnectorConfig, RetryConfig};
use haylink_protocol::{EntityRef, Row, Value};
use haylink_server::{LoopbackFactory, MemoryServer, ServerConfig};
use haylink_tree::MemoryNode;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// How long commands wait for the connector to settle.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

const USER: &str = "demo";
const PASSWORD: &str = "demo";

/// (nav parent, id, display name, kind, unit, initial value)
const POINTS: [(&str, &str, &str, &str, Option<&str>, f64); 4] = [
    ("ahu1", "dat", "Discharge Air Temp", "Number", Some("°F"), 55.0),
    ("ahu1", "dmp", "Damper Cmd", "Number", Some("%"), 30.0),
    ("ahu1", "fan", "Fan Status", "Bool", None, 1.0),
    ("boiler", "hwt", "Hot Water Temp", "Number", Some("°F"), 140.0),
];

/// Builds a reference server holding one site with two pieces of equipment.
pub fn sample_server() -> Arc<MemoryServer> {
    let server = MemoryServer::new(ServerConfig::new().with_credentials(USER, PASSWORD));

    server.add_nav(
        None,
        Row::new()
            .with("id", EntityRef::new("hq"))
            .with("dis", "Headquarters")
            .with("navId", "hq")
            .with("site", Value::Marker),
    );
    for (nav_id, dis) in [("ahu1", "AHU-1"), ("boiler", "Boiler")] {
        server.add_nav(
            Some("hq"),
            Row::new()
                .with("id", EntityRef::new(nav_id))
                .with("dis", dis)
                .with("navId", nav_id)
                .with("equip", Value::Marker)
                .with("siteRef", EntityRef::new("hq")),
        );
    }
    for (parent, id, dis, kind, unit, value) in POINTS {
        server.add_nav(Some(parent), point_row(id, dis, kind, unit, value));
    }
    server
}

fn point_row(id: &str, dis: &str, kind: &str, unit: Option<&str>, value: f64) -> Row {
    let current = match (kind, unit) {
        ("Bool", _) => Value::Bool(value != 0.0),
        (_, Some(unit)) => Value::number_with_unit(value, unit),
        (_, None) => Value::number(value),
    };
    Row::new()
        .with("id", EntityRef::new(id))
        .with("dis", dis)
        .with("point", Value::Marker)
        .with("kind", kind)
        .with("curVal", current)
}

/// Ids of every point on the sample site.
pub fn point_ids() -> Vec<EntityRef> {
    POINTS.iter().map(|point| EntityRef::new(point.1)).collect()
}

/// Moves every point away from its initial value for `cycle`.
///
/// Returns the number of points updated.
pub fn drift(server: &MemoryServer, cycle: usize) -> usize {
    let mut updated = 0;
    for (_, id, _, kind, unit, base) in POINTS {
        let id = EntityRef::new(id);
        let value = match kind {
            "Bool" => Value::Bool(cycle % 2 == 0),
            _ => Value::Number {
                value: base + cycle as f64 * 0.5,
                unit: unit.map(str::to_string),
            },
        };
        match server.update(&id, "curVal", value) {
            Ok(()) => updated += 1,
            Err(err) => warn!(entity = %id, error = %err, "sample point not updated"),
        }
    }
    updated
}

/// Connector configuration for the sample site.
pub fn config(name: &str) -> ConnectorConfig {
    ConnectorConfig::new(name, ConnectionParams::new("mem://sample", USER, PASSWORD)).with_retry(
        RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(50))
            .with_max_delay(Duration::from_millis(500)),
    )
}

/// Starts a connector against `server` and waits for its watch to open.
pub async fn connect(
    server: &Arc<MemoryServer>,
    root: &Arc<MemoryNode>,
    config: ConnectorConfig,
) -> Result<Arc<Connector>, Box<dyn std::error::Error>> {
    let factory = Arc::new(LoopbackFactory::new(Arc::clone(server)));
    let connector = Connector::start(root.clone(), config, factory)?;
    wait_for(|| connector.is_watching(), SETTLE_TIMEOUT).await?;
    Ok(connector)
}

/// Waits until `check` holds, failing after `timeout`.
pub async fn wait_for(mut check: impl FnMut() -> bool, timeout: Duration) -> Result<(), String> {
    let step = Duration::from_millis(10);
    let mut waited = Duration::ZERO;
    while !check() {
        if waited >= timeout {
            return Err(format!("gave up after {timeout:?}"));
        }
        tokio::time::sleep(step).await;
        waited += step;
    }
    Ok(())
}

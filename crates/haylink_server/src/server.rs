//! In-memory reference server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::filter::Filter;
use haylink_engine::actions::level_row;
use haylink_protocol::{EntityRef, Grid, PointWriteRequest, Row, Value, WriteLevel};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Tag holding the effective value of a writable point.
const WRITE_VAL: &str = "writeVal";

/// Tag holding the level the effective value came from.
const WRITE_LEVEL: &str = "writeLevel";

/// A recorded action invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Target entity.
    pub id: EntityRef,
    /// Action name.
    pub action: String,
    /// Arguments as sent.
    pub args: Row,
}

/// The reference server.
///
/// All request methods fail with [`ServerError::Offline`] while the server is
/// switched off. Every watch tracks the entities changed since its last poll;
/// subscribing marks the new entities as changed so the first poll after a
/// subscribe reports them.
///
/// # Example
///
/// ```
/// use haylink_protocol::{EntityRef, Row};
/// use haylink_server::{MemoryServer, ServerConfig};
///
/// let server = MemoryServer::new(ServerConfig::default());
/// server.add_entity(Row::new().with("id", EntityRef::new("p1")).with("curVal", 72.0));
///
/// let watch = server.watch_open("demo", None).unwrap();
/// server.watch_sub(&watch, &[EntityRef::new("p1")]).unwrap();
/// assert_eq!(server.watch_poll(&watch).unwrap().map(|g| g.len()), Some(1));
/// assert!(server.watch_poll(&watch).unwrap().is_none());
/// ```
pub struct MemoryServer {
    config: ServerConfig,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    online: bool,
    entities: BTreeMap<EntityRef, Row>,
    nav: HashMap<Option<String>, Vec<Row>>,
    watches: HashMap<String, WatchState>,
    evals: HashMap<String, Grid>,
    history: HashMap<EntityRef, Vec<Row>>,
    actions: HashMap<EntityRef, HashSet<String>>,
    invocations: Vec<Invocation>,
    priorities: HashMap<EntityRef, Vec<Option<LevelSlot>>>,
    sub_requests: HashMap<EntityRef, usize>,
    poll_requests: usize,
    connects: usize,
}

struct WatchState {
    dis: String,
    lease: Duration,
    ids: BTreeSet<EntityRef>,
    dirty: BTreeSet<EntityRef>,
}

#[derive(Clone)]
struct LevelSlot {
    value: Value,
    who: Option<String>,
}

impl State {
    fn mark_dirty(&mut self, id: &EntityRef) {
        for watch in self.watches.values_mut() {
            if watch.ids.contains(id) {
                watch.dirty.insert(id.clone());
            }
        }
    }

    fn entity_mut(&mut self, id: &EntityRef) -> ServerResult<&mut Row> {
        self.entities
            .get_mut(id)
            .ok_or_else(|| ServerError::UnknownEntity(id.clone()))
    }

    fn watch_mut(&mut self, watch_id: &str) -> ServerResult<&mut WatchState> {
        self.watches
            .get_mut(watch_id)
            .ok_or_else(|| ServerError::UnknownWatch(watch_id.to_string()))
    }
}

impl MemoryServer {
    /// Creates an online server with no entities.
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(State {
                online: true,
                ..State::default()
            }),
        })
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn online(&self) -> ServerResult<parking_lot::MutexGuard<'_, State>> {
        let state = self.state.lock();
        if state.online {
            Ok(state)
        } else {
            Err(ServerError::Offline)
        }
    }

    // ----- world mutation -----

    /// Adds or replaces an entity. Rows without an `id` are ignored.
    pub fn add_entity(&self, row: Row) {
        let Some(id) = row.id().cloned() else {
            return;
        };
        let mut state = self.state.lock();
        state.entities.insert(id.clone(), row);
        state.mark_dirty(&id);
    }

    /// Adds a navigation child under `parent` (the roots when `None`).
    ///
    /// Children carrying an `id` are registered as entities too.
    pub fn add_nav(&self, parent: Option<&str>, row: Row) {
        if row.id().is_some() {
            self.add_entity(row.clone());
        }
        self.state
            .lock()
            .nav
            .entry(parent.map(str::to_string))
            .or_default()
            .push(row);
    }

    /// Sets a tag on an entity and marks it changed in every watch.
    pub fn update(&self, id: &EntityRef, tag: &str, value: impl Into<Value>) -> ServerResult<()> {
        let mut state = self.state.lock();
        state.entity_mut(id)?.set(tag, value);
        state.mark_dirty(id);
        Ok(())
    }

    /// Removes a tag from an entity and marks it changed in every watch.
    pub fn remove_tag(&self, id: &EntityRef, tag: &str) -> ServerResult<()> {
        let mut state = self.state.lock();
        state.entity_mut(id)?.remove(tag);
        state.mark_dirty(id);
        Ok(())
    }

    /// Returns the current row of an entity.
    pub fn entity(&self, id: &EntityRef) -> Option<Row> {
        self.state.lock().entities.get(id).cloned()
    }

    /// Switches the server on or off.
    pub fn set_online(&self, online: bool) {
        info!(online, "server availability changed");
        self.state.lock().online = online;
    }

    /// Returns true if the server accepts requests.
    pub fn is_online(&self) -> bool {
        self.state.lock().online
    }

    /// Drops every open watch, as if all leases ran out.
    pub fn expire_watches(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.watches.len();
        state.watches.clear();
        info!(count, "expired watches");
        count
    }

    /// Registers the result of an eval expression.
    pub fn register_eval(&self, expr: impl Into<String>, result: Grid) {
        self.state.lock().evals.insert(expr.into(), result);
    }

    /// Appends a history sample to a point.
    pub fn add_history(&self, id: &EntityRef, ts: impl Into<String>, value: impl Into<Value>) {
        let row = Row::new()
            .with("ts", Value::DateTime(ts.into()))
            .with("val", value);
        self.state
            .lock()
            .history
            .entry(id.clone())
            .or_default()
            .push(row);
    }

    /// Declares an action on an entity.
    pub fn add_action(&self, id: &EntityRef, action: impl Into<String>) {
        self.state
            .lock()
            .actions
            .entry(id.clone())
            .or_default()
            .insert(action.into());
    }

    // ----- inspection -----

    /// Returns every recorded invocation.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.state.lock().invocations.clone()
    }

    /// Returns how many times `id` was added to a watch.
    pub fn sub_requests(&self, id: &EntityRef) -> usize {
        self.state.lock().sub_requests.get(id).copied().unwrap_or(0)
    }

    /// Returns the number of poll requests served.
    pub fn poll_requests(&self) -> usize {
        self.state.lock().poll_requests
    }

    /// Returns the number of successful connects.
    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    /// Returns the number of open watches.
    pub fn watch_count(&self) -> usize {
        self.state.lock().watches.len()
    }

    /// Returns the ids subscribed to a watch.
    pub fn watched(&self, watch_id: &str) -> Option<Vec<EntityRef>> {
        self.state
            .lock()
            .watches
            .get(watch_id)
            .map(|watch| watch.ids.iter().cloned().collect())
    }

    // ----- requests -----

    /// Checks credentials and counts the connect.
    pub fn authenticate(&self, user: &str, password: &str) -> ServerResult<()> {
        let mut state = self.online()?;
        if let Some((expected_user, expected_password)) = &self.config.credentials {
            if user != expected_user || password != expected_password {
                return Err(ServerError::AuthenticationFailed(format!(
                    "bad credentials for {user}"
                )));
            }
        }
        state.connects += 1;
        Ok(())
    }

    /// Opens a watch and returns its id.
    pub fn watch_open(&self, dis: &str, lease: Option<Duration>) -> ServerResult<String> {
        let mut state = self.online()?;
        if state.watches.len() >= self.config.max_watches {
            return Err(ServerError::TooManyWatches(self.config.max_watches));
        }
        let watch_id = Uuid::new_v4().to_string();
        let lease = lease.unwrap_or(self.config.default_lease);
        state.watches.insert(
            watch_id.clone(),
            WatchState {
                dis: dis.to_string(),
                lease,
                ids: BTreeSet::new(),
                dirty: BTreeSet::new(),
            },
        );
        info!(watch = %watch_id, dis, ?lease, "watch opened");
        Ok(watch_id)
    }

    /// Returns the display name and lease of an open watch.
    pub fn watch_info(&self, watch_id: &str) -> Option<(String, Duration)> {
        self.state
            .lock()
            .watches
            .get(watch_id)
            .map(|watch| (watch.dis.clone(), watch.lease))
    }

    /// Adds entities to a watch and returns their current rows.
    ///
    /// Unknown ids are accepted and report nothing until they exist.
    pub fn watch_sub(&self, watch_id: &str, ids: &[EntityRef]) -> ServerResult<Grid> {
        let mut state = self.online()?;
        let watch = state.watch_mut(watch_id)?;
        for id in ids {
            watch.ids.insert(id.clone());
            watch.dirty.insert(id.clone());
        }
        for id in ids {
            *state.sub_requests.entry(id.clone()).or_insert(0) += 1;
        }
        debug!(watch = %watch_id, count = ids.len(), "watch sub");
        Ok(Grid::from_rows(
            ids.iter()
                .filter_map(|id| state.entities.get(id).cloned())
                .collect(),
        ))
    }

    /// Removes entities from a watch.
    pub fn watch_unsub(&self, watch_id: &str, ids: &[EntityRef]) -> ServerResult<()> {
        let mut state = self.online()?;
        let watch = state.watch_mut(watch_id)?;
        for id in ids {
            watch.ids.remove(id);
            watch.dirty.remove(id);
        }
        debug!(watch = %watch_id, count = ids.len(), "watch unsub");
        Ok(())
    }

    /// Returns the rows changed since the previous poll, or `None` if nothing changed.
    pub fn watch_poll(&self, watch_id: &str) -> ServerResult<Option<Grid>> {
        let mut state = self.online()?;
        state.poll_requests += 1;
        let dirty = std::mem::take(&mut state.watch_mut(watch_id)?.dirty);
        let rows: Vec<Row> = dirty
            .iter()
            .filter_map(|id| state.entities.get(id).cloned())
            .collect();
        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Grid::from_rows(rows)))
        }
    }

    /// Closes a watch.
    pub fn watch_close(&self, watch_id: &str) -> ServerResult<()> {
        let mut state = self.online()?;
        if state.watches.remove(watch_id).is_none() {
            return Err(ServerError::UnknownWatch(watch_id.to_string()));
        }
        info!(watch = %watch_id, "watch closed");
        Ok(())
    }

    /// Returns the navigation children of `nav_id`, or the roots when `None`.
    pub fn nav(&self, nav_id: Option<&str>) -> ServerResult<Grid> {
        let state = self.online()?;
        match state.nav.get(&nav_id.map(str::to_string)) {
            Some(children) => Ok(Grid::from_rows(children.clone())),
            None if nav_id.is_none() => Ok(Grid::empty()),
            None => Err(ServerError::UnknownNav(nav_id.unwrap_or_default().to_string())),
        }
    }

    /// Reads entities matching a filter, in id order.
    pub fn read(&self, filter: &str, limit: Option<usize>) -> ServerResult<Grid> {
        let filter = Filter::parse(filter)?;
        let state = self.online()?;
        Ok(Grid::from_rows(
            state
                .entities
                .values()
                .filter(|row| filter.matches(row))
                .take(limit.unwrap_or(usize::MAX))
                .cloned()
                .collect(),
        ))
    }

    /// Reads one entity by id.
    pub fn read_by_id(&self, id: &EntityRef) -> ServerResult<Option<Row>> {
        Ok(self.online()?.entities.get(id).cloned())
    }

    /// Evaluates a registered expression.
    pub fn eval(&self, expr: &str) -> ServerResult<Grid> {
        self.online()?
            .evals
            .get(expr)
            .cloned()
            .ok_or_else(|| ServerError::InvalidRequest(format!("cannot evaluate {expr:?}")))
    }

    /// Reads history samples of a point.
    ///
    /// A `YYYY-MM-DD` range keeps the samples of that day; any other range
    /// returns every sample.
    pub fn his_read(&self, id: &EntityRef, range: &str) -> ServerResult<Grid> {
        let state = self.online()?;
        if !state.entities.contains_key(id) {
            return Err(ServerError::UnknownEntity(id.clone()));
        }
        let range = range.trim();
        if range.is_empty() {
            return Err(ServerError::InvalidRequest("missing range".into()));
        }
        let day = is_date(range).then_some(range);
        let samples = state.history.get(id).map(Vec::as_slice).unwrap_or_default();
        Ok(Grid::from_rows(
            samples
                .iter()
                .filter(|row| match (day, row.get("ts")) {
                    (Some(day), Some(Value::DateTime(ts))) => ts.starts_with(day),
                    _ => true,
                })
                .cloned()
                .collect(),
        ))
    }

    /// Invokes a declared action and records it.
    pub fn invoke(&self, id: &EntityRef, action: &str, args: &Row) -> ServerResult<Grid> {
        let mut state = self.online()?;
        if !state.entities.contains_key(id) {
            return Err(ServerError::UnknownEntity(id.clone()));
        }
        let declared = state
            .actions
            .get(id)
            .is_some_and(|actions| actions.contains(action));
        if !declared {
            return Err(ServerError::UnknownAction {
                id: id.clone(),
                action: action.to_string(),
            });
        }
        state.invocations.push(Invocation {
            id: id.clone(),
            action: action.to_string(),
            args: args.clone(),
        });
        info!(entity = %id, action, "action invoked");
        Ok(Grid::from_rows(vec![Row::new()
            .with("id", id.clone())
            .with("action", action)]))
    }

    /// Sets or releases a priority level and returns the point's level array.
    ///
    /// The highest-priority occupied level feeds `writeVal` / `writeLevel`;
    /// with every level released both tags are removed.
    pub fn point_write(&self, request: &PointWriteRequest) -> ServerResult<Grid> {
        let mut state = self.online()?;
        if !state.entities.contains_key(&request.id) {
            return Err(ServerError::UnknownEntity(request.id.clone()));
        }
        let count = self.config.level_count;
        let index = request.level.index();
        if index >= count {
            return Err(ServerError::InvalidRequest(format!(
                "level {} out of range",
                request.level.get()
            )));
        }

        let levels = state
            .priorities
            .entry(request.id.clone())
            .or_insert_with(|| vec![None; count]);
        levels[index] = request.value.clone().map(|value| LevelSlot {
            value,
            who: request.who.clone(),
        });
        let winner = levels
            .iter()
            .enumerate()
            .find_map(|(i, slot)| slot.as_ref().map(|slot| (i, slot.value.clone())));
        let array = Grid::from_rows(
            levels
                .iter()
                .enumerate()
                .filter_map(|(i, slot)| {
                    let level = u8::try_from(i + 1).ok().and_then(|n| WriteLevel::new(n).ok())?;
                    Some(match slot {
                        Some(slot) => level_row(level, Some(slot.value.clone()), slot.who.as_deref()),
                        None => level_row(level, None, None),
                    })
                })
                .collect(),
        );

        let row = state.entity_mut(&request.id)?;
        match winner {
            Some((i, value)) => {
                row.set(WRITE_VAL, value);
                row.set(WRITE_LEVEL, (i + 1) as f64);
            }
            None => {
                row.remove(WRITE_VAL);
                row.remove(WRITE_LEVEL);
            }
        }
        state.mark_dirty(&request.id);
        info!(entity = %request.id, level = request.level.get(), "point write");
        Ok(array)
    }
}

fn is_date(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

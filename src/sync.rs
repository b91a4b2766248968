// File: src/sync.rs
// Live task collection for one signed-in user.
use crate::error::{Error, Result, WriteOp};
use crate::model::{Task, TaskPatch};
use crate::remote::{FeedEvent, RemoteError, RemoteTree, Subscription, TreePath};
use crate::session::Session;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug)]
pub enum SyncEvent {
    Snapshot {
        generation: u64,
        value: Value,
    },
    FeedError {
        generation: u64,
        error: RemoteError,
    },
    WriteDone {
        op: WriteOp,
        /// (task id, optimistic version) pairs confirmed or failed by this write.
        acks: Vec<(String, u64)>,
        result: std::result::Result<(), RemoteError>,
    },
}

/// Local edits not yet confirmed by the store. Re-applied on top of every
/// incoming snapshot until the write carrying `version` resolves.
#[derive(Debug, Clone, Default)]
struct Overlay {
    version: u64,
    patch: TaskPatch,
    deleted: bool,
}

pub struct TaskSync {
    remote: Arc<dyn RemoteTree>,
    path: TreePath,
    tasks: Vec<Task>,
    optimistic: HashMap<String, Overlay>,
    next_version: u64,
    generation: u64,
    subscription: Option<Subscription>,
    events_tx: mpsc::UnboundedSender<SyncEvent>,
    events_rx: mpsc::UnboundedReceiver<SyncEvent>,
    in_flight: usize,
    loaded: bool,
}

impl TaskSync {
    /// Open the single live subscription for `session`'s task path.
    /// A failed subscription is reported through the event stream.
    pub async fn connect(remote: Arc<dyn RemoteTree>, session: &Session) -> Result<Self> {
        let path = session.tasks_path()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut sync = Self {
            remote,
            path,
            tasks: Vec::new(),
            optimistic: HashMap::new(),
            next_version: 0,
            generation: 0,
            subscription: None,
            events_tx,
            events_rx,
            in_flight: 0,
            loaded: false,
        };
        sync.subscribe().await;
        Ok(sync)
    }

    async fn subscribe(&mut self) {
        self.generation += 1;
        match self.remote.subscribe(&self.path).await {
            Ok(sub) => {
                tracing::info!(path = %self.path, generation = self.generation, "task feed subscribed");
                self.subscription = Some(sub);
            }
            Err(error) => {
                tracing::warn!(path = %self.path, %error, "task feed subscription failed");
                self.subscription = None;
                let _ = self.events_tx.send(SyncEvent::FeedError {
                    generation: self.generation,
                    error,
                });
            }
        }
    }

    /// User-initiated retry after the feed broke. The collection is kept.
    pub async fn reconnect(&mut self) {
        self.subscription = None;
        self.subscribe().await;
    }

    /// Release the subscription. Events already produced by it are ignored.
    pub fn disconnect(&mut self) {
        if self.subscription.take().is_some() {
            tracing::info!(path = %self.path, "task feed released");
        }
        self.generation += 1;
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.key() == id)
    }

    /// Whether at least one snapshot has been applied.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn writes_in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn path(&self) -> &TreePath {
        &self.path
    }

    // --- EVENTS ---

    pub async fn next_event(&mut self) -> Option<SyncEvent> {
        let generation = self.generation;
        let feed = match &mut self.subscription {
            Some(sub) => tokio::select! {
                feed = sub.recv() => Some(feed),
                event = self.events_rx.recv() => return event,
            },
            None => None,
        };
        match feed {
            Some(Some(event)) => Some(Self::wrap_feed(generation, event)),
            Some(None) => {
                // Feed ended without an error of its own.
                self.subscription = None;
                Some(SyncEvent::FeedError {
                    generation,
                    error: RemoteError::Closed,
                })
            }
            None => self.events_rx.recv().await,
        }
    }

    /// Non-blocking variant for polling UI loops.
    pub fn try_next_event(&mut self) -> Option<SyncEvent> {
        if let Ok(event) = self.events_rx.try_recv() {
            return Some(event);
        }
        let sub = self.subscription.as_mut()?;
        sub.try_recv()
            .map(|event| Self::wrap_feed(self.generation, event))
    }

    fn wrap_feed(generation: u64, event: FeedEvent) -> SyncEvent {
        match event {
            FeedEvent::Snapshot(value) => SyncEvent::Snapshot { generation, value },
            FeedEvent::Error(error) => SyncEvent::FeedError { generation, error },
        }
    }

    /// Apply one event. `Ok(true)` when the collection changed; errors are
    /// non-fatal and meant to be shown to the user.
    pub fn apply(&mut self, event: SyncEvent) -> Result<bool> {
        match event {
            SyncEvent::Snapshot { generation, value } => {
                if generation != self.generation {
                    tracing::debug!(generation, "dropping snapshot from a released feed");
                    return Ok(false);
                }
                self.apply_snapshot(value);
                Ok(true)
            }
            SyncEvent::FeedError { generation, error } => {
                if generation != self.generation {
                    return Ok(false);
                }
                tracing::warn!(path = %self.path, %error, "task feed error, keeping last known tasks");
                Err(Error::Subscription(error.to_string()))
            }
            SyncEvent::WriteDone { op, acks, result } => {
                self.in_flight = self.in_flight.saturating_sub(1);
                // Failed or not, the overlay goes: local state is not rolled
                // back, and the next snapshot converges it. Only the versions
                // this write carried are released; a newer local edit keeps
                // its overlay until its own write resolves. A snapshot taken
                // before the store applied the write but delivered after the
                // ack shows the old value until the write's echo arrives.
                for (id, version) in &acks {
                    if self
                        .optimistic
                        .get(id)
                        .is_some_and(|o| o.version <= *version)
                    {
                        self.optimistic.remove(id);
                    }
                }
                match result {
                    Ok(()) => Ok(false),
                    Err(e) => {
                        tracing::warn!(?op, error = %e, "store write failed");
                        Err(Error::write(op, e))
                    }
                }
            }
        }
    }

    fn apply_snapshot(&mut self, value: Value) {
        let mut tasks = decode_snapshot(&value);
        tasks.retain(|t| !self.optimistic.get(t.key()).is_some_and(|o| o.deleted));
        for task in &mut tasks {
            if let Some(overlay) = self.optimistic.get(task.key()) {
                overlay.patch.apply_to(task);
            }
        }
        sort_by_order(&mut tasks);
        tracing::debug!(count = tasks.len(), pending = self.optimistic.len(), "snapshot applied");
        self.tasks = tasks;
        self.loaded = true;
    }

    // --- WRITES ---

    fn record(&mut self, id: &str, patch: &TaskPatch, deleted: bool) -> u64 {
        self.next_version += 1;
        let version = self.next_version;
        let overlay = self.optimistic.entry(id.to_string()).or_default();
        overlay.version = version;
        overlay.patch.merge(patch);
        overlay.deleted |= deleted;
        version
    }

    fn spawn_write<F>(&mut self, op: WriteOp, acks: Vec<(String, u64)>, write: F)
    where
        F: Future<Output = std::result::Result<(), RemoteError>> + Send + 'static,
    {
        self.in_flight += 1;
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = write.await;
            let _ = tx.send(SyncEvent::WriteDone { op, acks, result });
        });
    }

    fn persisted(&self, id: &str, op: WriteOp) -> Result<&Task> {
        self.task(id)
            .filter(|t| t.is_persisted())
            .ok_or_else(|| Error::write(op, format!("unknown task {}", id)))
    }

    fn task_path(&self, id: &str, op: WriteOp) -> Result<TreePath> {
        self.path.child(id).map_err(|e| Error::write(op, e))
    }

    /// Append a new task under a store-generated key. It shows up with the
    /// next snapshot.
    pub fn create_task(&mut self, task: &Task) -> Result<()> {
        let mut task = task.clone();
        task.name = task.name.trim().to_string();
        if task.name.is_empty() {
            return Err(Error::Validation("Task name is required.".into()));
        }
        task.completed = false;
        let remote = self.remote.clone();
        let path = self.path.clone();
        let value = task.to_value();
        tracing::info!(name = %task.name, "creating task");
        self.spawn_write(WriteOp::Create, Vec::new(), async move {
            remote.push(&path, value).await.map(|key| {
                tracing::debug!(%key, "task created");
            })
        });
        Ok(())
    }

    /// Merge `patch` into the stored task; fields left as `None` are untouched.
    pub fn update_task(&mut self, id: &str, patch: TaskPatch) -> Result<()> {
        self.patch_task(id, patch, WriteOp::Update)
    }

    pub fn complete_task(&mut self, id: &str) -> Result<()> {
        self.patch_task(id, TaskPatch::completed(), WriteOp::Complete)
    }

    fn patch_task(&mut self, id: &str, mut patch: TaskPatch, op: WriteOp) -> Result<()> {
        if let Some(name) = &patch.name {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                return Err(Error::Validation("Task name is required.".into()));
            }
            patch.name = Some(trimmed.to_string());
        }
        if patch.is_empty() {
            return Ok(());
        }
        self.persisted(id, op)?;
        let target = self.task_path(id, op)?;

        if let Some(task) = self.tasks.iter_mut().find(|t| t.key() == id) {
            patch.apply_to(task);
        }
        let version = self.record(id, &patch, false);

        let remote = self.remote.clone();
        let fields = patch.to_json();
        self.spawn_write(op, vec![(id.to_string(), version)], async move {
            remote.patch(&target, fields).await
        });
        Ok(())
    }

    pub fn delete_task(&mut self, id: &str) -> Result<()> {
        self.persisted(id, WriteOp::Delete)?;
        let target = self.task_path(id, WriteOp::Delete)?;

        self.tasks.retain(|t| t.key() != id);
        let version = self.record(id, &TaskPatch::default(), true);
        tracing::info!(%id, "deleting task");

        let remote = self.remote.clone();
        self.spawn_write(WriteOp::Delete, vec![(id.to_string(), version)], async move {
            remote.delete(&target).await
        });
        Ok(())
    }

    /// Give every task its index in `sequence` as `order`, locally at once
    /// and remotely as one batched patch of the entries that changed.
    pub fn reorder_tasks(&mut self, sequence: &[String]) -> Result<()> {
        let assignment = assign_order(&self.tasks, sequence);
        let changed: Vec<(String, i64)> = assignment
            .iter()
            .filter(|(id, order)| self.task(id).is_some_and(|t| t.order != Some(*order)))
            .cloned()
            .collect();

        let positions: HashMap<&str, i64> =
            assignment.iter().map(|(id, o)| (id.as_str(), *o)).collect();
        for task in &mut self.tasks {
            if let Some(order) = positions.get(task.key()) {
                task.order = Some(*order);
            }
        }
        sort_by_order(&mut self.tasks);

        if changed.is_empty() {
            return Ok(());
        }

        let mut fields = Map::new();
        let mut acks = Vec::with_capacity(changed.len());
        for (id, order) in &changed {
            if !self.task(id).is_some_and(|t| t.is_persisted()) {
                continue;
            }
            self.path
                .child(id)
                .map_err(|e| Error::write(WriteOp::Reorder, e))?;
            fields.insert(format!("{}/order", id), Value::from(*order));
            acks.push((id.clone(), self.record(id, &TaskPatch::order(*order), false)));
        }
        if fields.is_empty() {
            return Ok(());
        }
        tracing::debug!(count = fields.len(), "reordering tasks");

        let remote = self.remote.clone();
        let path = self.path.clone();
        self.spawn_write(WriteOp::Reorder, acks, async move {
            remote.patch(&path, fields).await
        });
        Ok(())
    }
}

/// Full replace: every child of the task path that decodes to a task, in
/// the store's key order. Malformed children are skipped.
pub fn decode_snapshot(value: &Value) -> Vec<Task> {
    let entries: Vec<(String, &Value)> = match value {
        Value::Null => return Vec::new(),
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        // Numeric keys come back as an array with holes.
        Value::Array(items) => items
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        other => {
            tracing::warn!(?other, "task path does not hold an object");
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|(key, v)| match Task::from_value(&key, v) {
            Ok(task) => Some(task),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed task");
                None
            }
        })
        .collect()
}

/// Ascending by `order` when any task has one; unordered tasks keep their
/// relative position after the ordered ones. No-op otherwise.
pub fn sort_by_order(tasks: &mut [Task]) {
    if tasks.iter().any(|t| t.order.is_some()) {
        tasks.sort_by_key(|t| t.order.unwrap_or(i64::MAX));
    }
}

/// Positions for the new sequence: ids from `sequence` that exist (first
/// occurrence wins), then the remaining tasks in their current order.
pub fn assign_order(tasks: &[Task], sequence: &[String]) -> Vec<(String, i64)> {
    let known: HashSet<&str> = tasks.iter().map(|t| t.key()).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut ordered: Vec<&str> = Vec::with_capacity(tasks.len());

    for id in sequence {
        if known.contains(id.as_str()) && seen.insert(id.as_str()) {
            ordered.push(id.as_str());
        }
    }
    for task in tasks {
        if seen.insert(task.key()) {
            ordered.push(task.key());
        }
    }

    ordered
        .into_iter()
        .enumerate()
        .map(|(i, id)| (id.to_string(), i as i64))
        .collect()
}

/// Move the entry at `from` to index `to`, as a drag-and-drop splice.
pub fn move_in_sequence(ids: &[String], from: usize, to: usize) -> Vec<String> {
    let mut ids = ids.to_vec();
    if from >= ids.len() || to >= ids.len() {
        return ids;
    }
    let moved = ids.remove(from);
    ids.insert(to, moved);
    ids
}

// File: src/remote/memory.rs
// In-process JSON tree with live subscribers. Used offline and in tests.
use super::{FeedEvent, RemoteError, RemoteTree, Subscription, TreePath, patch_at, value_at, write_at};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};

struct Subscriber {
    id: u64,
    path: TreePath,
    tx: mpsc::UnboundedSender<FeedEvent>,
}

#[derive(Default)]
struct Inner {
    root: Value,
    subscribers: Vec<Subscriber>,
    next_subscriber: u64,
    next_key: u64,
    failing_writes: Option<RemoteError>,
}

impl Inner {
    fn notify(&mut self, written: &TreePath) {
        let root = &self.root;
        // Closed receivers are dropped here as well.
        self.subscribers.retain(|sub| {
            if !sub.path.overlaps(written) {
                return !sub.tx.is_closed();
            }
            let snapshot = value_at(root, &sub.path).cloned().unwrap_or(Value::Null);
            sub.tx.send(FeedEvent::Snapshot(snapshot)).is_ok()
        });
    }
}

#[derive(Clone)]
pub struct MemoryTree {
    inner: Arc<Mutex<Inner>>,
    writes_open: watch::Sender<bool>,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTree {
    pub fn new() -> Self {
        let (writes_open, _) = watch::channel(true);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                root: Value::Object(Map::new()),
                ..Inner::default()
            })),
            writes_open,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn value(&self, path: &TreePath) -> Option<Value> {
        value_at(&self.lock().root, path).cloned()
    }

    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.lock();
        inner.subscribers.retain(|s| !s.tx.is_closed());
        inner.subscribers.len()
    }

    /// Make every subsequent write fail with `err` (`None` restores service).
    pub fn fail_writes(&self, err: Option<RemoteError>) {
        self.lock().failing_writes = err;
    }

    /// Park writes until `release_writes`, leaving them in flight.
    pub fn hold_writes(&self) {
        self.writes_open.send_replace(false);
    }

    pub fn release_writes(&self) {
        self.writes_open.send_replace(true);
    }

    /// Push an error to every live subscriber, as when read access is revoked.
    pub fn break_feeds(&self, err: RemoteError) {
        let inner = self.lock();
        for sub in &inner.subscribers {
            let _ = sub.tx.send(FeedEvent::Error(err.clone()));
        }
    }

    async fn write_gate(&self) -> Result<(), RemoteError> {
        let mut open = self.writes_open.subscribe();
        open.wait_for(|open| *open)
            .await
            .map_err(|_| RemoteError::Closed)?;
        match &self.lock().failing_writes {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Keys sort in creation order, like the hosted store's push ids.
    fn generate_key(inner: &mut Inner) -> String {
        inner.next_key += 1;
        format!(
            "-{:011x}{:08x}",
            Utc::now().timestamp_millis().max(0),
            inner.next_key
        )
    }
}

#[async_trait]
impl RemoteTree for MemoryTree {
    async fn subscribe(&self, path: &TreePath) -> Result<Subscription, RemoteError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.lock();
            inner.next_subscriber += 1;
            let id = inner.next_subscriber;
            // Initial snapshot, as a live read always starts with one.
            let snapshot = value_at(&inner.root, path).cloned().unwrap_or(Value::Null);
            let _ = tx.send(FeedEvent::Snapshot(snapshot));
            inner.subscribers.push(Subscriber {
                id,
                path: path.clone(),
                tx,
            });
            id
        };
        tracing::debug!(%path, subscriber = id, "memory tree subscription opened");

        let inner = Arc::downgrade(&self.inner);
        Ok(Subscription::new(rx, move || {
            if let Some(inner) = inner.upgrade() {
                let mut inner = inner.lock().unwrap_or_else(|p| p.into_inner());
                inner.subscribers.retain(|s| s.id != id);
            }
        }))
    }

    async fn set(&self, path: &TreePath, value: Value) -> Result<(), RemoteError> {
        self.write_gate().await?;
        let mut inner = self.lock();
        write_at(&mut inner.root, path, value);
        inner.notify(path);
        Ok(())
    }

    async fn patch(&self, path: &TreePath, fields: Map<String, Value>) -> Result<(), RemoteError> {
        self.write_gate().await?;
        let mut inner = self.lock();
        patch_at(&mut inner.root, path, fields)?;
        inner.notify(path);
        Ok(())
    }

    async fn delete(&self, path: &TreePath) -> Result<(), RemoteError> {
        self.write_gate().await?;
        let mut inner = self.lock();
        write_at(&mut inner.root, path, Value::Null);
        inner.notify(path);
        Ok(())
    }

    async fn push(&self, path: &TreePath, value: Value) -> Result<String, RemoteError> {
        self.write_gate().await?;
        let mut inner = self.lock();
        let key = Self::generate_key(&mut inner);
        let target = path.child(&key)?;
        write_at(&mut inner.root, &target, value);
        inner.notify(&target);
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tasks_path() -> TreePath {
        TreePath::parse("users/ada/tasks").expect("valid")
    }

    #[tokio::test]
    async fn test_subscription_receives_initial_and_live_snapshots() {
        let tree = MemoryTree::new();
        let mut sub = tree.subscribe(&tasks_path()).await.expect("subscribe");
        assert_eq!(sub.recv().await, Some(FeedEvent::Snapshot(Value::Null)));

        let key = tree
            .push(&tasks_path(), json!({ "taskName": "X" }))
            .await
            .expect("push");

        let Some(FeedEvent::Snapshot(snapshot)) = sub.recv().await else {
            panic!("expected snapshot");
        };
        assert_eq!(snapshot[&key]["taskName"], json!("X"));
    }

    #[tokio::test]
    async fn test_push_keys_sort_in_creation_order() {
        let tree = MemoryTree::new();
        let mut keys = Vec::new();
        for name in ["a", "b", "c"] {
            keys.push(
                tree.push(&tasks_path(), json!({ "taskName": name }))
                    .await
                    .expect("push"),
            );
        }
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[tokio::test]
    async fn test_dropping_subscription_releases_it() {
        let tree = MemoryTree::new();
        let sub = tree.subscribe(&tasks_path()).await.expect("subscribe");
        assert_eq!(tree.subscriber_count(), 1);
        drop(sub);
        assert_eq!(tree.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_unrelated_writes_do_not_notify() {
        let tree = MemoryTree::new();
        let mut sub = tree.subscribe(&tasks_path()).await.expect("subscribe");
        let _ = sub.recv().await;

        let other = TreePath::parse("users/bob/tasks").expect("valid");
        tree.push(&other, json!({ "taskName": "y" })).await.expect("push");
        assert_eq!(sub.try_recv(), None);
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let tree = MemoryTree::new();
        tree.fail_writes(Some(RemoteError::Permission("rules".into())));
        let err = tree
            .set(&tasks_path(), json!({}))
            .await
            .expect_err("write must fail");
        assert_eq!(err, RemoteError::Permission("rules".into()));
    }
}

// File: src/remote.rs
// The remote task store: a schema-less JSON tree with live subscriptions.
pub mod memory;
pub mod rest;

pub use memory::MemoryTree;
pub use rest::RestTree;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("unexpected response: {0}")]
    Protocol(String),
    #[error("live feed closed")]
    Closed,
}

/// Characters the tree's path grammar forbids inside a segment.
const ILLEGAL_SEGMENT_CHARS: [char; 6] = ['.', '#', '$', '[', ']', '/'];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TreePath(Vec<String>);

impl TreePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(raw: &str) -> Result<Self, RemoteError> {
        let mut path = Self::root();
        for segment in raw.split('/').filter(|s| !s.is_empty()) {
            path = path.child(segment)?;
        }
        Ok(path)
    }

    pub fn child(&self, segment: &str) -> Result<Self, RemoteError> {
        if segment.is_empty()
            || segment
                .chars()
                .any(|c| ILLEGAL_SEGMENT_CHARS.contains(&c) || c.is_control())
        {
            return Err(RemoteError::InvalidPath(format!(
                "{}/{}",
                self, segment
            )));
        }
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// True when one path contains the other (a write to either affects both).
    pub fn overlaps(&self, other: &TreePath) -> bool {
        let n = self.0.len().min(other.0.len());
        self.0[..n] == other.0[..n]
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Full value of the subscribed path; `Null` when it holds nothing.
    Snapshot(Value),
    Error(RemoteError),
}

/// A live feed. Dropping it releases the subscription; no events are
/// delivered afterwards.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<FeedEvent>,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(
        events: mpsc::UnboundedReceiver<FeedEvent>,
        release: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            events,
            release: Some(Box::new(release)),
        }
    }

    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<FeedEvent> {
        self.events.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.events.close();
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[async_trait]
pub trait RemoteTree: Send + Sync {
    async fn subscribe(&self, path: &TreePath) -> Result<Subscription, RemoteError>;

    async fn set(&self, path: &TreePath, value: Value) -> Result<(), RemoteError>;

    /// Merge `fields` into the object at `path`. Keys may be relative
    /// multi-segment paths (`"<id>/order"`), making this a batched update.
    /// `null` values delete the addressed child.
    async fn patch(&self, path: &TreePath, fields: Map<String, Value>) -> Result<(), RemoteError>;

    async fn delete(&self, path: &TreePath) -> Result<(), RemoteError>;

    /// Append `value` under a fresh store-generated key and return the key.
    async fn push(&self, path: &TreePath, value: Value) -> Result<String, RemoteError>;
}

// --- JSON tree helpers shared by the in-memory store and the live-feed mirror ---

pub(crate) fn value_at<'a>(root: &'a Value, path: &TreePath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |node, seg| node.as_object()?.get(seg))
}

/// Write `value` at `path`, creating intermediate objects. Writing `null`
/// removes the node and prunes parents left empty.
pub(crate) fn write_at(root: &mut Value, path: &TreePath, value: Value) {
    write_segments(root, path.segments(), value);
}

fn write_segments(node: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if value.is_null() && !node.is_object() {
        return;
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return;
    };
    if rest.is_empty() {
        if value.is_null() {
            map.remove(head);
        } else {
            map.insert(head.clone(), value);
        }
    } else {
        let child = map.entry(head.clone()).or_insert(Value::Null);
        write_segments(child, rest, value);
        if child.as_object().is_some_and(|m| m.is_empty()) || child.is_null() {
            map.remove(head);
        }
    }
}

/// Apply a (possibly multi-path) patch below `base`.
pub(crate) fn patch_at(
    root: &mut Value,
    base: &TreePath,
    fields: Map<String, Value>,
) -> Result<(), RemoteError> {
    for (key, value) in fields {
        let mut target = base.clone();
        for segment in key.split('/').filter(|s| !s.is_empty()) {
            target = target.child(segment)?;
        }
        write_at(root, &target, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_grammar() {
        let path = TreePath::parse("users/a_b/tasks").expect("valid");
        assert_eq!(path.to_string(), "users/a_b/tasks");
        assert!(TreePath::parse("users/a.b/tasks").is_err());
        assert!(path.child("x$y").is_err());
        assert!(path.overlaps(&TreePath::parse("users/a_b").expect("valid")));
        assert!(!path.overlaps(&TreePath::parse("users/other").expect("valid")));
    }

    #[test]
    fn test_write_null_prunes_empty_parents() {
        let mut root = json!({});
        let task = TreePath::parse("users/u/tasks/k1").expect("valid");
        write_at(&mut root, &task, json!({ "taskName": "a" }));
        assert_eq!(value_at(&root, &task), Some(&json!({ "taskName": "a" })));

        write_at(&mut root, &task, Value::Null);
        assert_eq!(root, json!({}));
    }

    #[test]
    fn test_multi_path_patch() {
        let mut root = json!({ "t": { "a": { "taskName": "a" }, "b": { "taskName": "b" } } });
        let base = TreePath::parse("t").expect("valid");
        let mut fields = Map::new();
        fields.insert("a/order".into(), json!(1));
        fields.insert("b/order".into(), json!(0));
        patch_at(&mut root, &base, fields).expect("patch");

        assert_eq!(root["t"]["a"]["order"], json!(1));
        assert_eq!(root["t"]["b"]["order"], json!(0));
        assert_eq!(root["t"]["b"]["taskName"], json!("b"));
    }
}

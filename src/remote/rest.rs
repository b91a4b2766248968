// File: src/remote/rest.rs
// REST client for a hosted realtime database: `<base>/<path>.json`, with the
// live feed served as `text/event-stream`.
use super::{FeedEvent, RemoteError, RemoteTree, Subscription, TreePath, patch_at, write_at};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

#[derive(Clone, Debug)]
pub struct RestTree {
    client: Client,
    base_url: String,
    auth: Option<String>,
}

#[derive(Deserialize)]
struct PushResponse {
    name: String,
}

/// Payload of `put` / `patch` feed events.
#[derive(Deserialize)]
struct FeedChange {
    path: String,
    data: Value,
}

impl RestTree {
    pub fn new(base_url: &str, auth: Option<String>) -> Result<Self, RemoteError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(RemoteError::Protocol(format!(
                "database URL must be http(s): {}",
                base_url
            )));
        }
        let client = Client::builder()
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            auth: auth.filter(|a| !a.is_empty()),
        })
    }

    fn url(&self, path: &TreePath) -> String {
        if path.is_root() {
            format!("{}/.json", self.base_url)
        } else {
            format!("{}/{}.json", self.base_url, path)
        }
    }

    fn with_auth(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some(token) => req.query(&[("auth", token.as_str())]),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, RemoteError> {
        let resp = self
            .with_auth(req)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        check_status(resp).await
    }

    async fn run_feed(
        client: Client,
        url: String,
        auth: Option<String>,
        tx: mpsc::UnboundedSender<FeedEvent>,
    ) -> Result<(), RemoteError> {
        let mut req = client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream");
        if let Some(token) = &auth {
            req = req.query(&[("auth", token.as_str())]);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        let resp = check_status(resp).await?;

        // The feed sends deltas; keep a mirror so subscribers always get a full snapshot.
        let mut mirror = Value::Null;
        let mut parser = EventStreamParser::default();
        let mut body = resp.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| RemoteError::Network(e.to_string()))?;
            for event in parser.feed(&chunk) {
                let Some(snapshot) = apply_feed_event(&mut mirror, &event)? else {
                    continue;
                };
                if tx.send(FeedEvent::Snapshot(snapshot)).is_err() {
                    return Ok(());
                }
            }
        }
        Err(RemoteError::Closed)
    }
}

/// Fold one feed event into `mirror`. Returns the full snapshot when the
/// event changed data, `None` for events that carry none.
pub fn apply_feed_event(
    mirror: &mut Value,
    event: &StreamEvent,
) -> Result<Option<Value>, RemoteError> {
    match event.name.as_str() {
        "put" | "patch" => {
            let change: FeedChange = serde_json::from_str(&event.data)
                .map_err(|e| RemoteError::Protocol(e.to_string()))?;
            let at = TreePath::parse(&change.path)?;
            if event.name == "put" {
                write_at(mirror, &at, change.data);
            } else if let Value::Object(fields) = change.data {
                patch_at(mirror, &at, fields)?;
            }
            Ok(Some(mirror.clone()))
        }
        "keep-alive" => Ok(None),
        "cancel" => Err(RemoteError::Permission(
            "read access to the task path was revoked".into(),
        )),
        "auth_revoked" => Err(RemoteError::Permission("credential expired".into())),
        other => {
            tracing::debug!(event = other, "ignoring feed event");
            Ok(None)
        }
    }
}

async fn check_status(resp: Response) -> Result<Response, RemoteError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Permission(body),
        _ => RemoteError::Protocol(format!("{}: {}", status, body)),
    })
}

#[async_trait]
impl RemoteTree for RestTree {
    async fn subscribe(&self, path: &TreePath) -> Result<Subscription, RemoteError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let url = self.url(path);
        let auth = self.auth.clone();
        let feed_path = path.to_string();

        let handle = tokio::spawn(async move {
            let err_tx = tx.clone();
            if let Err(e) = Self::run_feed(client, url, auth, tx).await {
                tracing::warn!(path = %feed_path, error = %e, "live feed stopped");
                let _ = err_tx.send(FeedEvent::Error(e));
            }
        });

        Ok(Subscription::new(rx, move || handle.abort()))
    }

    async fn set(&self, path: &TreePath, value: Value) -> Result<(), RemoteError> {
        self.send(self.client.put(self.url(path)).json(&value))
            .await
            .map(|_| ())
    }

    async fn patch(&self, path: &TreePath, fields: Map<String, Value>) -> Result<(), RemoteError> {
        self.send(self.client.patch(self.url(path)).json(&fields))
            .await
            .map(|_| ())
    }

    async fn delete(&self, path: &TreePath) -> Result<(), RemoteError> {
        self.send(self.client.delete(self.url(path))).await.map(|_| ())
    }

    async fn push(&self, path: &TreePath, value: Value) -> Result<String, RemoteError> {
        let resp = self
            .send(self.client.post(self.url(path)).json(&value))
            .await?;
        let created: PushResponse = resp
            .json()
            .await
            .map_err(|e| RemoteError::Protocol(e.to_string()))?;
        Ok(created.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub name: String,
    pub data: String,
}

/// Incremental `text/event-stream` decoder. Chunks may split anywhere,
/// including inside a UTF-8 sequence.
#[derive(Debug, Default)]
pub struct EventStreamParser {
    buf: Vec<u8>,
}

impl EventStreamParser {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(end) = find_blank_line(&self.buf) {
            let block: Vec<u8> = self.buf.drain(..end.0).collect();
            self.buf.drain(..end.1);
            if let Some(event) = parse_block(&String::from_utf8_lossy(&block)) {
                events.push(event);
            }
        }
        events
    }
}

/// Returns (block length, separator length) of the first complete block.
fn find_blank_line(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_block(block: &str) -> Option<StreamEvent> {
    let mut name = String::from("message");
    let mut data: Vec<&str> = Vec::new();
    for line in block.lines() {
        if let Some(v) = line.strip_prefix("event:") {
            name = v.trim().to_string();
        } else if let Some(v) = line.strip_prefix("data:") {
            data.push(v.strip_prefix(' ').unwrap_or(v));
        }
    }
    if data.is_empty() && name == "message" {
        return None;
    }
    Some(StreamEvent {
        name,
        data: data.join("\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(name: &str, data: Value) -> StreamEvent {
        StreamEvent {
            name: name.into(),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_event_stream_split_across_chunks() {
        let mut parser = EventStreamParser::default();
        let first = parser.feed(b"event: put\ndata: {\"path\":\"/\",");
        assert!(first.is_empty());

        let events = parser.feed(b"\"data\":null}\n\nevent: keep-alive\ndata: null\n\n");
        assert_eq!(
            events,
            vec![
                StreamEvent {
                    name: "put".into(),
                    data: "{\"path\":\"/\",\"data\":null}".into(),
                },
                StreamEvent {
                    name: "keep-alive".into(),
                    data: "null".into(),
                },
            ]
        );
    }

    #[test]
    fn test_crlf_separated_events() {
        let mut parser = EventStreamParser::default();
        let events = parser.feed(b"event: cancel\r\ndata: null\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "cancel");
    }

    #[test]
    fn test_urls() {
        let tree = RestTree::new("https://demo.firebaseio.com/", None).expect("valid url");
        let path = TreePath::parse("users/ada/tasks").expect("valid");
        assert_eq!(tree.url(&path), "https://demo.firebaseio.com/users/ada/tasks.json");
        assert!(RestTree::new("demo.firebaseio.com", None).is_err());
    }

    #[test]
    fn test_feed_put_at_root_replaces_mirror() {
        let mut mirror = json!({"old": {"name": "Gone"}});
        let snapshot = apply_feed_event(
            &mut mirror,
            &event("put", json!({"path": "/", "data": {"a": {"name": "Milk"}}})),
        )
        .expect("valid put");
        assert_eq!(snapshot, Some(json!({"a": {"name": "Milk"}})));
        assert_eq!(mirror, json!({"a": {"name": "Milk"}}));
    }

    #[test]
    fn test_feed_deep_put_and_null_prune() {
        let mut mirror = json!({
            "a": {"name": "Milk", "completed": false},
            "b": {"name": "Bread"},
        });
        apply_feed_event(
            &mut mirror,
            &event("put", json!({"path": "/a/completed", "data": true})),
        )
        .expect("deep put");
        assert_eq!(mirror["a"], json!({"name": "Milk", "completed": true}));

        let snapshot = apply_feed_event(
            &mut mirror,
            &event("put", json!({"path": "/b", "data": null})),
        )
        .expect("delete");
        assert_eq!(
            snapshot,
            Some(json!({"a": {"name": "Milk", "completed": true}}))
        );
    }

    #[test]
    fn test_feed_patch_merges_children() {
        let mut mirror = json!({"a": {"name": "Milk", "order": 0}});
        let snapshot = apply_feed_event(
            &mut mirror,
            &event(
                "patch",
                json!({"path": "/", "data": {"a/order": 1, "b": {"name": "Bread", "order": 0}}}),
            ),
        )
        .expect("valid patch");
        assert_eq!(
            snapshot,
            Some(json!({
                "a": {"name": "Milk", "order": 1},
                "b": {"name": "Bread", "order": 0},
            }))
        );
    }

    #[test]
    fn test_feed_control_events() {
        let mut mirror = json!({"a": {"name": "Milk"}});
        let keep_alive = apply_feed_event(&mut mirror, &event("keep-alive", Value::Null));
        assert!(matches!(keep_alive, Ok(None)));

        for name in ["cancel", "auth_revoked"] {
            let result = apply_feed_event(&mut mirror, &event(name, Value::Null));
            assert!(matches!(result, Err(RemoteError::Permission(_))), "{}", name);
        }
        let garbled = StreamEvent {
            name: "put".into(),
            data: "not json".into(),
        };
        assert!(matches!(
            apply_feed_event(&mut mirror, &garbled),
            Err(RemoteError::Protocol(_))
        ));
        assert_eq!(mirror, json!({"a": {"name": "Milk"}}));
    }
}

// File: src/error.rs
use crate::remote::RemoteError;
use std::fmt;
use thiserror::Error;

/// Which store write failed. Shown to the user in the alert text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Update,
    Complete,
    Delete,
    Reorder,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WriteOp::Create => "create the task",
            WriteOp::Update => "update the task",
            WriteOp::Complete => "mark the task as completed",
            WriteOp::Delete => "delete the task",
            WriteOp::Reorder => "reorder the tasks",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("sign-in failed: {0}")]
    Auth(String),
    #[error("failed to fetch tasks: {0}")]
    Subscription(String),
    #[error("failed to {op}: {message}")]
    Write { op: WriteOp, message: String },
    #[error("{0}")]
    Validation(String),
    #[error("remote store: {0}")]
    Remote(#[from] RemoteError),
    #[error("config: {0}")]
    Config(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn write(op: WriteOp, err: impl fmt::Display) -> Self {
        Self::Write {
            op,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

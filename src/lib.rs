// File: src/lib.rs
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod filter;
pub mod logging;
pub mod model;
pub mod paths;
pub mod reminder;
pub mod remote;
pub mod session;
pub mod sync;
pub mod view;

#[cfg(feature = "tui")]
pub mod tui;

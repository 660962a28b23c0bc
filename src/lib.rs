//! kube-web-terminal - browser terminal gateway for Kubernetes pods
//!
//! Each WebSocket client gets an interactive shell inside a pod container,
//! bridged through the Kubernetes exec API.
//!
//! # Architecture
//!
//! - Client frames are tagged: `'0'` + bytes is terminal input, `'1'` + JSON
//!   `{"cols":..,"rows":..}` is a resize
//! - Shell output is sent back as text frames, at most one chunk per frame
//! - If the client leaves first, the bridge nudges the shell with `exit\n`
//!   a bounded number of times before releasing the exec stream
//!
//! # Modules
//!
//! - [`bridge`] - Session lifecycle and the concurrent pumps
//! - [`exec`] - Remote exec transport abstraction and the kube-rs connector
//! - [`frame`] - Client frame codec
//! - [`terminal`] - Terminal size type and the resize queue
//! - [`server`] - HTTP / WebSocket endpoint
//! - [`config`] - Tunables
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod bridge;
pub mod config;
pub mod error;
pub mod exec;
pub mod frame;
pub mod server;
pub mod terminal;

pub use bridge::{SessionBridge, SessionRequest, SessionSummary};
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

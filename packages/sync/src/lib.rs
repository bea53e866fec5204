#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Keeps the relief map store in sync with the remote feed.
//!
//! [`SyncController`] owns the subscription lifecycle, turns snapshots into
//! store actions (including the unread-alert diff), and runs the write path
//! with its local fallback and retry queue. [`AppContext`] wires a store,
//! a feed and the device adapters into one session.

pub mod config;
pub mod context;
pub mod controller;
pub mod submit;

pub use config::{AppConfig, ConfigError};
pub use context::AppContext;
pub use controller::{SessionState, SyncController};
pub use submit::{
    PendingWrite, ReportDraft, RetryReport, SubmitError, SubmitOutcome, ValidationError,
};

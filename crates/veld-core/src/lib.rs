//! Core types and configuration for veld.
//!
//! This crate provides the data structures shared by the operation engine and
//! the front end: resolved path entries, per-view selections, notifications,
//! and the persisted settings file.

mod config;
mod entry;
mod error;
mod notify;
mod panel;
mod selection;

pub use config::{
    Action, DEFAULT_CHANNEL_SIZE, DEFAULT_MAX_DUPLICATE_ATTEMPTS, KeyBindings, OpsConfig,
    OpsConfigBuilder, Settings,
};
pub use entry::{PathEntry, normalize};
pub use error::{ConfigError, EntryError};
pub use notify::{Notification, Severity};
pub use panel::{Panel, ViewId};
pub use selection::SelectionSet;

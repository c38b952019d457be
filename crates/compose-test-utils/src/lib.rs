//! Shared test utilities for the extension-composer workspace.
//!
//! Dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`events`]: shared, ordered log that hooks and cleanups append to
//! - [`fixtures`]: descriptor builders whose hooks record into an [`EventLog`]

pub mod events;
pub mod fixtures;

pub use events::EventLog;
pub use fixtures::{RecordingHost, chain, traced};

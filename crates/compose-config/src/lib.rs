//! Declarative configuration overrides for Extension Composer.
//!
//! Projects can adjust extension configuration without touching code by
//! writing `[extensions."name"]` tables into layered TOML files. The
//! [`OverrideResolver`] merges those layers into one [`OverrideManifest`],
//! which is then queued on a [`compose_core::Composer`] as root-level
//! overrides.

pub mod error;
pub mod manifest;
pub mod resolver;

pub use error::{Error, Result};
pub use manifest::OverrideManifest;
pub use resolver::OverrideResolver;

//! Override manifests.
//!
//! A manifest holds one configuration override per extension name, written
//! as TOML tables:
//!
//! ```toml
//! [extensions."history"]
//! depth = 200
//!
//! [extensions."placeholder"]
//! text = "Start typing..."
//! ```
//!
//! Values are converted to `serde_json::Value` so they can be fed straight
//! into a composer as root-level overrides.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use compose_core::{Composer, deep_merge};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

#[derive(Debug, Default, Deserialize)]
struct RawManifest {
    #[serde(default)]
    extensions: BTreeMap<String, toml::Value>,
}

/// Per-extension configuration overrides parsed from one or more files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideManifest {
    /// Override objects keyed by extension name
    #[serde(default)]
    pub extensions: BTreeMap<String, Value>,
}

impl OverrideManifest {
    /// Parse a manifest from TOML content
    ///
    /// # Example
    ///
    /// ```
    /// use compose_config::OverrideManifest;
    ///
    /// let manifest = OverrideManifest::parse(r#"
    /// [extensions."history"]
    /// depth = 200
    /// "#).unwrap();
    ///
    /// assert_eq!(manifest.get("history").unwrap()["depth"], 200);
    /// ```
    pub fn parse(content: &str) -> Result<Self> {
        let raw: RawManifest = toml::from_str(content)?;
        let mut extensions = BTreeMap::new();
        for (name, table) in raw.extensions {
            if !table.is_table() {
                return Err(Error::InvalidOverride {
                    extension: name,
                    reason: format!("expected a table, found {}", table.type_str()),
                });
            }
            extensions.insert(name, serde_json::to_value(table)?);
        }
        Ok(Self { extensions })
    }

    /// Read and parse a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Merge another manifest into this one.
    ///
    /// Overrides for the same extension are deep-merged, `other` winning on
    /// conflicting keys.
    pub fn merge(&mut self, other: &OverrideManifest) {
        for (name, value) in &other.extensions {
            let merged = match self.extensions.remove(name) {
                Some(existing) => deep_merge(existing, value),
                None => value.clone(),
            };
            self.extensions.insert(name.clone(), merged);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.extensions.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.extensions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Queue every override on `composer` as a root-level override.
    ///
    /// Names are not checked here; an override for an extension that never
    /// gets registered fails when the composer sorts its graph.
    pub fn apply<H>(&self, composer: &mut Composer<H>) -> Result<()> {
        for (name, value) in &self.extensions {
            tracing::debug!(extension = %name, "Applying configured override");
            composer.override_config(name, value.clone())?;
        }
        Ok(())
    }
}

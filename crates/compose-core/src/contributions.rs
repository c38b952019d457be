//! Artifact contributions and their aggregation into a host configuration.
//!
//! Each extension may carry a [`Contributions`] value. After the graph is
//! sorted, every contribution is folded into a single [`HostConfig`] in
//! sorted order, which the caller's host factory consumes exactly once.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::merge::deep_merge_in_place;

/// Artifact fragments contributed by one extension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contributions {
    /// Scalar host options. Last writer in sorted order wins.
    #[serde(default)]
    pub options: BTreeMap<String, Value>,
    /// Content types registered with the host.
    #[serde(default)]
    pub node_types: Vec<String>,
    /// Theme fragment, deep-merged with the fragments of other extensions.
    #[serde(default)]
    pub theme: Option<Value>,
    /// Import handlers keyed by source tag.
    #[serde(default)]
    pub import_map: BTreeMap<String, Vec<String>>,
    /// Export handler keyed by content type.
    #[serde(default)]
    pub export_map: BTreeMap<String, String>,
    /// Replacement target mapped to the replacing item.
    #[serde(default)]
    pub replacements: BTreeMap<String, String>,
}

impl Contributions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a scalar host option.
    pub fn option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Register a content type.
    pub fn node_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_types.push(node_type.into());
        self
    }

    /// Add a theme fragment. Repeated calls deep-merge into one fragment.
    pub fn theme(mut self, fragment: Value) -> Self {
        match self.theme.as_mut() {
            Some(existing) => deep_merge_in_place(existing, &fragment),
            None => self.theme = Some(fragment),
        }
        self
    }

    /// Append an import handler for `tag`.
    pub fn import(mut self, tag: impl Into<String>, handler: impl Into<String>) -> Self {
        self.import_map
            .entry(tag.into())
            .or_default()
            .push(handler.into());
        self
    }

    /// Set the export handler for `node_type`.
    pub fn export(mut self, node_type: impl Into<String>, handler: impl Into<String>) -> Self {
        self.export_map.insert(node_type.into(), handler.into());
        self
    }

    /// Claim `target`, replacing it with `with`.
    pub fn replace(mut self, target: impl Into<String>, with: impl Into<String>) -> Self {
        self.replacements.insert(target.into(), with.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
            && self.node_types.is_empty()
            && self.theme.is_none()
            && self.import_map.is_empty()
            && self.export_map.is_empty()
            && self.replacements.is_empty()
    }
}

/// A claimed replacement in the aggregated host configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    /// The item that replaces the target.
    pub with: String,
    /// Extension that claimed the target.
    pub extension: String,
}

/// Aggregated host configuration handed to the host factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    pub options: BTreeMap<String, Value>,
    pub node_types: Vec<String>,
    pub theme: Value,
    pub import_map: BTreeMap<String, Vec<String>>,
    pub export_map: BTreeMap<String, String>,
    pub replacements: BTreeMap<String, Replacement>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            options: BTreeMap::new(),
            node_types: Vec::new(),
            theme: Value::Object(serde_json::Map::new()),
            import_map: BTreeMap::new(),
            export_map: BTreeMap::new(),
            replacements: BTreeMap::new(),
        }
    }
}

impl HostConfig {
    /// Get a scalar option.
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// Resolve a content type through the replacement table.
    pub fn resolve_node_type<'a>(&'a self, node_type: &'a str) -> &'a str {
        self.replacements
            .get(node_type)
            .map(|r| r.with.as_str())
            .unwrap_or(node_type)
    }

    /// Fold one extension's contributions into the aggregate.
    pub(crate) fn absorb(&mut self, extension: &str, contributions: &Contributions) -> Result<()> {
        for (key, value) in &contributions.options {
            if let Some(previous) = self.options.insert(key.clone(), value.clone()) {
                if &previous != value {
                    tracing::debug!(
                        option = %key,
                        extension,
                        "Host option overwritten by later extension"
                    );
                }
            }
        }

        for node_type in &contributions.node_types {
            if !self.node_types.contains(node_type) {
                self.node_types.push(node_type.clone());
            }
        }

        if let Some(fragment) = &contributions.theme {
            deep_merge_in_place(&mut self.theme, fragment);
        }

        for (tag, handlers) in &contributions.import_map {
            self.import_map
                .entry(tag.clone())
                .or_default()
                .extend(handlers.iter().cloned());
        }

        for (node_type, handler) in &contributions.export_map {
            self.export_map.insert(node_type.clone(), handler.clone());
        }

        for (target, with) in &contributions.replacements {
            if let Some(existing) = self.replacements.get(target) {
                return Err(Error::ReplaceCollision {
                    target: target.clone(),
                    first: existing.extension.clone(),
                    second: extension.to_string(),
                });
            }
            self.replacements.insert(
                target.clone(),
                Replacement {
                    with: with.clone(),
                    extension: extension.to_string(),
                },
            );
        }

        Ok(())
    }
}

/// Aggregate contributions in the given (sorted) order.
pub fn aggregate<'a, I>(contributions: I) -> Result<HostConfig>
where
    I: IntoIterator<Item = (&'a str, &'a Contributions)>,
{
    let mut host_config = HostConfig::default();
    for (extension, contribution) in contributions {
        host_config.absorb(extension, contribution)?;
    }
    Ok(host_config)
}

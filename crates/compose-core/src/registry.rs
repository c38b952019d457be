//! Extension graph construction and dependency-first ordering.
//!
//! The [`Registry`] owns every [`ExtensionRecord`] (keyed by name, in
//! registration order) together with the edge tables between them. Edges
//! point from dependent to dependency: if A depends on B, the edge is
//! `A -> B`, and the sorted order places B before A.
//!
//! A failed `add` or sort leaves the registry exactly as it was before the
//! call, so a rejected graph can never be composed later.
//!
//! # Example
//!
//! ```
//! use compose_core::{Extension, Registry};
//!
//! let c: Extension<()> = Extension::builder("c").finish();
//! let b = Extension::builder("b").depends_on(&c).finish();
//! let a = Extension::builder("a").depends_on(&b).finish();
//!
//! let mut registry = Registry::new();
//! registry.add(&a).unwrap();
//! assert_eq!(registry.sorted_names().unwrap(), ["c", "b", "a"]);
//! ```

use std::collections::{BTreeSet, HashMap};

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;

use crate::contributions::HostConfig;
use crate::error::{Error, Result};
use crate::extension::Extension;
use crate::record::{ExtensionRecord, LifecycleState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Name-keyed arena of extension records plus the edges between them.
pub struct Registry<H> {
    records: IndexMap<String, ExtensionRecord<H>>,
    /// Adjacency list: key depends on each target, carrying overrides.
    outgoing: IndexMap<String, IndexMap<String, Vec<Value>>>,
    /// Reverse index: key is depended upon by each value.
    incoming: HashMap<String, IndexSet<String>>,
    /// Conflicting name mapped to the extension that declared it.
    conflicts: HashMap<String, String>,
    root_overrides: Vec<(String, Value)>,
    sorted: Option<Vec<String>>,
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self {
            records: IndexMap::new(),
            outgoing: IndexMap::new(),
            incoming: HashMap::new(),
            conflicts: HashMap::new(),
            root_overrides: Vec::new(),
            sorted: None,
        }
    }
}

impl<H> Registry<H> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `extension` and, recursively, everything it depends on.
    ///
    /// Re-adding the same descriptor is a no-op. Peers only produce an edge;
    /// they must be registered by someone else to take effect.
    ///
    /// # Errors
    ///
    /// - `MutationAfterFreeze` once the sorted order has been computed
    /// - `DuplicateName` when a different descriptor already uses the name
    /// - `ConflictingExtension` when either side declared the other incompatible
    pub fn add(&mut self, extension: &Extension<H>) -> Result<()> {
        self.ensure_unfrozen(extension.name())?;
        let checkpoint = (self.records.len(), self.outgoing.len());
        let result = self.register(extension);
        if result.is_err() {
            self.rollback(checkpoint);
        }
        result
    }

    fn register(&mut self, extension: &Extension<H>) -> Result<()> {
        let name = extension.name();

        if let Some(existing) = self.records.get(name) {
            if existing.extension().ptr_eq(extension) {
                return Ok(());
            }
            return Err(Error::DuplicateName {
                name: name.to_string(),
            });
        }

        if let Some(declared_by) = self.conflicts.get(name) {
            return Err(Error::ConflictingExtension {
                extension: name.to_string(),
                declared_by: declared_by.clone(),
            });
        }
        for conflict in extension.conflicts_with() {
            if self.records.contains_key(conflict) {
                return Err(Error::ConflictingExtension {
                    extension: conflict.clone(),
                    declared_by: name.to_string(),
                });
            }
        }

        tracing::debug!(extension = %name, "Registering extension");
        self.records
            .insert(name.to_string(), ExtensionRecord::new(extension.clone()));
        for conflict in extension.conflicts_with() {
            self.conflicts
                .entry(conflict.clone())
                .or_insert_with(|| name.to_string());
        }

        for dependency in extension.dependencies() {
            let target = dependency.extension();
            self.add_edge(name, target.name(), dependency.overrides().iter().cloned());
            self.register(target)?;
        }
        for peer in extension.peers() {
            self.add_edge(name, peer.name(), peer.config_override().cloned());
        }

        Ok(())
    }

    /// Drop every record, edge and conflict flag added since `checkpoint`.
    ///
    /// Only records registered by the failed call declare edges or conflicts
    /// after the checkpoint, and both maps only grow at the end.
    fn rollback(&mut self, (records_len, outgoing_len): (usize, usize)) {
        let removed: Vec<String> = self
            .records
            .drain(records_len..)
            .map(|(name, _)| name)
            .collect();
        self.outgoing.truncate(outgoing_len);
        for dependents in self.incoming.values_mut() {
            dependents.retain(|from| !removed.contains(from));
        }
        self.incoming.retain(|_, dependents| !dependents.is_empty());
        self.conflicts.retain(|_, declared_by| !removed.contains(declared_by));
        tracing::debug!(removed = ?removed, "Rolled back rejected registration");
    }

    /// Register `extension` and queue root-level overrides for it.
    pub fn add_with_overrides(
        &mut self,
        extension: &Extension<H>,
        overrides: impl IntoIterator<Item = Value>,
    ) -> Result<()> {
        self.add(extension)?;
        for value in overrides {
            self.queue_override(extension.name(), value)?;
        }
        Ok(())
    }

    /// Queue a root-level override for `name`.
    ///
    /// Root overrides are applied after every edge override, in the order
    /// they were queued. The name is checked when the graph is sorted.
    pub fn queue_override(&mut self, name: &str, value: Value) -> Result<()> {
        self.ensure_unfrozen(name)?;
        self.root_overrides.push((name.to_string(), value));
        Ok(())
    }

    fn add_edge(&mut self, from: &str, to: &str, overrides: impl IntoIterator<Item = Value>) {
        self.outgoing
            .entry(from.to_string())
            .or_default()
            .entry(to.to_string())
            .or_default()
            .extend(overrides);
        self.incoming
            .entry(to.to_string())
            .or_default()
            .insert(from.to_string());
    }

    fn ensure_unfrozen(&self, name: &str) -> Result<()> {
        if self.sorted.is_some() {
            return Err(Error::MutationAfterFreeze {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Whether the sorted order has been computed.
    pub fn is_frozen(&self) -> bool {
        self.sorted.is_some()
    }

    /// Compute (once) the dependency-first order of every registered name.
    ///
    /// The first successful call sorts the graph, propagates edge and root
    /// overrides into the records and freezes the registry. Later calls
    /// return the cached order. A failing call changes nothing, so calling
    /// again reports the same error.
    ///
    /// # Errors
    ///
    /// - `CircularDependency` if the edges contain a cycle
    /// - `MissingDependencyRegistration` if a dependency edge has no record
    /// - `UnknownExtension` if a root override names an unregistered extension
    pub fn sorted_names(&mut self) -> Result<&[String]> {
        if self.sorted.is_none() {
            let order = self.resolve()?;
            if let Some((name, _)) = self
                .root_overrides
                .iter()
                .find(|(name, _)| !self.records.contains_key(name))
            {
                return Err(Error::UnknownExtension(name.clone()));
            }
            self.settle(&order)?;
            self.propagate_overrides(&order)?;
            tracing::debug!(order = ?order, "Resolved extension order");
            self.sorted = Some(order);
        }
        Ok(self.sorted.as_deref().unwrap_or(&[]))
    }

    /// Depth-first sort. Marks live in a side table until the whole graph
    /// is known to be valid.
    fn resolve(&self) -> Result<Vec<String>> {
        let mut marks = HashMap::with_capacity(self.records.len());
        let mut order = Vec::with_capacity(self.records.len());
        let mut path = Vec::new();
        for name in self.records.keys() {
            if !marks.contains_key(name.as_str()) {
                self.visit(name, &mut marks, &mut path, &mut order)?;
            }
        }
        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|n| *n == name).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(name.to_string());
                return Err(Error::CircularDependency { cycle });
            }
            None => {}
        }

        marks.insert(name, Mark::Visiting);
        path.push(name);
        if let Some(edges) = self.outgoing.get(name) {
            for target in edges.keys() {
                if !self.records.contains_key(target) {
                    self.check_inert_edge(name, target)?;
                    continue;
                }
                self.visit(target, marks, path, order)?;
            }
        }
        path.pop();

        marks.insert(name, Mark::Done);
        order.push(name.to_string());
        Ok(())
    }

    /// An edge to an unregistered target is only legal for peers.
    fn check_inert_edge(&self, from: &str, to: &str) -> Result<()> {
        let is_dependency = self
            .records
            .get(from)
            .is_some_and(|record| record.extension().depends_on(to));
        if is_dependency {
            return Err(Error::MissingDependencyRegistration {
                extension: from.to_string(),
                dependency: to.to_string(),
            });
        }
        tracing::debug!(extension = %from, peer = %to, "Peer not registered; edge is inert");
        Ok(())
    }

    /// Move every record through `temporary` to `permanent`.
    fn settle(&mut self, order: &[String]) -> Result<()> {
        for name in order {
            let record = self.get_mut(name)?;
            record.advance(LifecycleState::Unmarked)?;
            record.advance(LifecycleState::Temporary)?;
        }
        Ok(())
    }

    /// Edge overrides first, grouped by declaring extension in sorted order,
    /// then root overrides in the order they were queued.
    fn propagate_overrides(&mut self, order: &[String]) -> Result<()> {
        for from in order {
            let Some(edges) = self.outgoing.get(from) else {
                continue;
            };
            for (to, overrides) in edges {
                let Some(record) = self.records.get_mut(to) else {
                    continue;
                };
                for value in overrides {
                    tracing::trace!(from = %from, to = %to, "Propagating edge override");
                    record.push_override(value.clone())?;
                }
            }
        }
        for (name, value) in &self.root_overrides {
            let record = self
                .records
                .get_mut(name)
                .ok_or_else(|| Error::UnknownExtension(name.clone()))?;
            tracing::trace!(to = %name, "Propagating root override");
            record.push_override(value.clone())?;
        }
        Ok(())
    }

    /// Aggregate every extension's contributions in sorted order.
    ///
    /// Sorts the graph first if needed, which freezes the registry.
    pub fn host_config(&mut self) -> Result<HostConfig> {
        self.sorted_names()?;
        let order = self.sorted.as_deref().unwrap_or(&[]);
        let mut host_config = HostConfig::default();
        for name in order {
            if let Some(record) = self.records.get(name) {
                host_config.absorb(name, record.extension().contributions())?;
            }
        }
        Ok(host_config)
    }

    /// Look up a record by name.
    pub fn get(&self, name: &str) -> Option<&ExtensionRecord<H>> {
        self.records.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Result<&mut ExtensionRecord<H>> {
        self.records
            .get_mut(name)
            .ok_or_else(|| Error::UnknownExtension(name.to_string()))
    }

    /// Check if an extension is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(|s| s.as_str())
    }

    /// Number of registered extensions.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Targets of the edges declared by `name`, in declaration order.
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.outgoing
            .get(name)
            .map(|edges| edges.keys().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }

    /// Names of the extensions that declared an edge to `name`.
    pub fn dependents_of(&self, name: &str) -> BTreeSet<&str> {
        self.incoming
            .get(name)
            .map(|from| from.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }

    /// Return the number of edges, peer edges included.
    pub fn edge_count(&self) -> usize {
        self.outgoing.values().map(|edges| edges.len()).sum()
    }
}

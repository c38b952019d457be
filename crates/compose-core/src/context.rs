//! Read-only accessors handed to lifecycle hooks.
//!
//! Hooks never see the registry itself. They get an [`ExtensionContext`]
//! scoped to the extension being driven, which can only read other records
//! through the state checks in [`crate::record`]: outputs require the target
//! to be registered, init results require it to be initialized. The init
//! pass additionally receives the composition's cancellation token through
//! [`InitContext`].

use std::any::Any;
use std::collections::BTreeSet;
use std::ops::Deref;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::extension::{Artifact, Extension};
use crate::record::{ExtensionRecord, downcast_artifact};
use crate::registry::Registry;

/// Accessor for the extension currently being driven through a phase.
pub struct ExtensionContext<'a, H> {
    registry: &'a Registry<H>,
    extension: &'a Extension<H>,
}

impl<'a, H> ExtensionContext<'a, H> {
    pub(crate) fn new(registry: &'a Registry<H>, extension: &'a Extension<H>) -> Self {
        Self {
            registry,
            extension,
        }
    }

    /// Name of the extension this context belongs to.
    pub fn extension_name(&self) -> &'a str {
        self.extension.name()
    }

    /// Resolve a declared dependency.
    ///
    /// # Errors
    ///
    /// - `NotADependency` if `name` is not declared via `depends_on`
    /// - `MissingDependencyRegistration` if it has no record
    /// - `UsedBeforeRegistration` if it has not finished registering
    pub fn get_dependency(&self, name: &str) -> Result<ResolvedDependency<'a>> {
        if !self.extension.depends_on(name) {
            return Err(self.not_a_dependency(name));
        }
        let record = self
            .registry
            .get(name)
            .ok_or_else(|| Error::MissingDependencyRegistration {
                extension: self.extension.name().to_string(),
                dependency: name.to_string(),
            })?;
        ResolvedDependency::from_record(record)
    }

    /// Resolve a declared peer. Returns `None` if nobody registered it.
    pub fn get_peer(&self, name: &str) -> Result<Option<ResolvedDependency<'a>>> {
        if !self.extension.has_peer(name) {
            return Err(self.not_a_dependency(name));
        }
        self.registry
            .get(name)
            .map(ResolvedDependency::from_record)
            .transpose()
    }

    /// The init result of a dependency or registered peer.
    ///
    /// Extensions without an `init` hook report `()`.
    pub fn get_init_result<T: Any>(&self, name: &str) -> Result<Rc<T>> {
        if !self.extension.depends_on(name) && !self.extension.has_peer(name) {
            return Err(self.not_a_dependency(name));
        }
        let record = self
            .registry
            .get(name)
            .ok_or_else(|| Error::MissingDependencyRegistration {
                extension: self.extension.name().to_string(),
                dependency: name.to_string(),
            })?;
        downcast_artifact(record.init_result()?, name, "init result")
    }

    /// Names of the extensions that declared an edge to this one.
    pub fn direct_dependent_names(&self) -> BTreeSet<&'a str> {
        self.registry.dependents_of(self.extension.name())
    }

    /// Names this extension declared as peers, registered or not.
    pub fn peer_name_set(&self) -> BTreeSet<&'a str> {
        self.extension.peers().iter().map(|p| p.name()).collect()
    }

    fn not_a_dependency(&self, name: &str) -> Error {
        Error::NotADependency {
            extension: self.extension.name().to_string(),
            dependency: name.to_string(),
        }
    }
}

/// Accessor handed to `init` hooks.
///
/// Everything on [`ExtensionContext`] is available through `Deref`; outputs
/// of dependencies are not, since nothing is registered yet.
pub struct InitContext<'a, H> {
    inner: ExtensionContext<'a, H>,
    signal: &'a CancellationToken,
}

impl<'a, H> InitContext<'a, H> {
    pub(crate) fn new(inner: ExtensionContext<'a, H>, signal: &'a CancellationToken) -> Self {
        Self { inner, signal }
    }

    /// Token cancelled when the composition is disposed.
    pub fn signal(&self) -> &CancellationToken {
        self.signal
    }
}

impl<'a, H> Deref for InitContext<'a, H> {
    type Target = ExtensionContext<'a, H>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// A registered dependency as seen from a dependent's hook.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedDependency<'a> {
    name: &'a str,
    config: &'a Rc<Value>,
    output: &'a Artifact,
}

impl<'a> ResolvedDependency<'a> {
    fn from_record<H>(record: &'a ExtensionRecord<H>) -> Result<Self> {
        let output = record.output()?;
        Ok(Self {
            name: record.name(),
            config: record.config()?,
            output,
        })
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    /// The dependency's merged configuration.
    pub fn config(&self) -> &'a Value {
        self.config
    }

    /// Decode the merged configuration into `T`.
    pub fn config_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::clone(self.config)).map_err(|source| Error::InvalidConfig {
            extension: self.name.to_string(),
            source,
        })
    }

    /// The dependency's build output. Extensions without a `build` hook
    /// report `()`.
    pub fn output<T: Any>(&self) -> Result<Rc<T>> {
        downcast_artifact(self.output, self.name, "output")
    }

    /// Whether the dependency's `build` hook produced something other than `()`.
    pub fn has_output(&self) -> bool {
        !self.output.is::<()>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LifecycleState;
    use serde::Deserialize;
    use serde_json::json;

    fn drive_to(registry: &mut Registry<()>, target: LifecycleState) {
        let order = registry.sorted_names().unwrap().to_vec();
        for name in order {
            let record = registry.get_mut(&name).unwrap();
            while record.state() < target {
                let state = record.state();
                record.advance(state).unwrap();
                if record.state() == LifecycleState::Configured {
                    record.set_output(Rc::new(format!("{name}-output"))).unwrap();
                }
                if record.state() == LifecycleState::Initialized {
                    record.set_init_result(Rc::new(1_u32)).unwrap();
                }
            }
        }
    }

    fn graph() -> (Registry<()>, Extension<()>) {
        let base: Extension<()> = Extension::builder("base")
            .default_config(json!({"level": 2}))
            .finish();
        let feature = Extension::builder("feature")
            .depends_on(&base)
            .peer("optional")
            .finish();
        let mut registry = Registry::new();
        registry.add(&feature).unwrap();
        (registry, feature)
    }

    #[test]
    fn test_get_dependency_requires_registration() {
        let (mut registry, feature) = graph();
        drive_to(&mut registry, LifecycleState::Initialized);

        let ctx = ExtensionContext::new(&registry, &feature);
        let err = ctx.get_dependency("base").unwrap_err();
        assert!(matches!(err, Error::UsedBeforeRegistration { .. }));
        assert_eq!(*ctx.get_init_result::<u32>("base").unwrap(), 1);
    }

    #[test]
    fn test_get_dependency_after_registration() {
        #[derive(Deserialize)]
        struct BaseConfig {
            level: u8,
        }

        let (mut registry, feature) = graph();
        drive_to(&mut registry, LifecycleState::Registered);

        let ctx = ExtensionContext::new(&registry, &feature);
        let base = ctx.get_dependency("base").unwrap();
        assert_eq!(base.name(), "base");
        assert_eq!(base.config(), &json!({"level": 2}));
        assert_eq!(base.config_as::<BaseConfig>().unwrap().level, 2);
        assert_eq!(*base.output::<String>().unwrap(), "base-output");
        assert!(base.has_output());
        assert!(matches!(
            base.output::<u64>(),
            Err(Error::ArtifactType { .. })
        ));
    }

    #[test]
    fn test_undeclared_names_are_rejected() {
        let (registry, feature) = graph();
        let ctx = ExtensionContext::new(&registry, &feature);
        assert!(matches!(
            ctx.get_dependency("optional"),
            Err(Error::NotADependency { .. })
        ));
        assert!(matches!(
            ctx.get_peer("base"),
            Err(Error::NotADependency { .. })
        ));
    }

    #[test]
    fn test_missing_peer_resolves_to_none() {
        let (mut registry, feature) = graph();
        drive_to(&mut registry, LifecycleState::Registered);
        let ctx = ExtensionContext::new(&registry, &feature);
        assert!(ctx.get_peer("optional").unwrap().is_none());
        assert_eq!(ctx.peer_name_set(), BTreeSet::from(["optional"]));
    }

    #[test]
    fn test_direct_dependent_names() {
        let (registry, feature) = graph();
        let base = registry.get("base").unwrap().extension().clone();
        let ctx = ExtensionContext::new(&registry, &base);
        assert_eq!(ctx.direct_dependent_names(), BTreeSet::from(["feature"]));

        let ctx = ExtensionContext::new(&registry, &feature);
        assert!(ctx.direct_dependent_names().is_empty());
    }

    #[test]
    fn test_init_context_exposes_signal() {
        let (registry, feature) = graph();
        let token = CancellationToken::new();
        let ctx = InitContext::new(ExtensionContext::new(&registry, &feature), &token);
        assert_eq!(ctx.extension_name(), "feature");
        assert!(!ctx.signal().is_cancelled());
        token.cancel();
        assert!(ctx.signal().is_cancelled());
    }
}

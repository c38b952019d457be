//! Extension descriptors.
//!
//! An [`Extension`] is the immutable unit of composition: a name, a default
//! configuration, the edges it declares to other extensions, optional
//! lifecycle hooks and optional [`Contributions`]. Descriptors are built once
//! with [`ExtensionBuilder`] and shared by cloning the handle; the registry
//! compares handles by identity, never by structure.
//!
//! # Example
//!
//! ```
//! use compose_core::Extension;
//! use serde_json::json;
//!
//! let base: Extension<()> = Extension::builder("base")
//!     .default_config(json!({"x": 1}))
//!     .finish();
//! let feature: Extension<()> = Extension::builder("feature")
//!     .depends_on_with(&base, [json!({"x": 5})])
//!     .finish();
//!
//! assert_eq!(feature.dependencies().len(), 1);
//! assert!(feature.dependencies()[0].extension().ptr_eq(&base));
//! ```

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::context::{ExtensionContext, InitContext};
use crate::contributions::Contributions;
use crate::error::HookError;
use crate::merge::shallow_merge;

/// Type-erased output of a `build` or `init` hook.
pub type Artifact = Rc<dyn Any>;

/// Function folding one override into the accumulated configuration.
pub type MergeFn = Box<dyn Fn(Value, &Value) -> Value>;

pub(crate) type BuildHook<H> =
    Box<dyn Fn(&mut H, &Value, &ExtensionContext<'_, H>) -> Result<Artifact, HookError>>;
pub(crate) type InitHook<H> =
    Box<dyn Fn(&mut H, &Value, &InitContext<'_, H>) -> Result<Artifact, HookError>>;
pub(crate) type RegisterHook<H> =
    Box<dyn Fn(&mut H, &Value, &ExtensionContext<'_, H>) -> Result<Option<Cleanup>, HookError>>;

/// Teardown returned by a `register` or `after_initialization` hook.
pub struct Cleanup(Box<dyn FnOnce() -> Result<(), HookError>>);

impl Cleanup {
    pub fn new(f: impl FnOnce() -> Result<(), HookError> + 'static) -> Self {
        Self(Box::new(f))
    }

    /// Wrap a cleanup that cannot fail.
    pub fn infallible(f: impl FnOnce() + 'static) -> Self {
        Self(Box::new(move || {
            f();
            Ok(())
        }))
    }

    pub(crate) fn run(self) -> Result<(), HookError> {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// A dependency edge declared by a descriptor.
pub struct Dependency<H> {
    extension: Extension<H>,
    overrides: Vec<Value>,
}

impl<H> Dependency<H> {
    pub fn extension(&self) -> &Extension<H> {
        &self.extension
    }

    /// Overrides carried along the edge, in declaration order.
    pub fn overrides(&self) -> &[Value] {
        &self.overrides
    }
}

/// A peer edge declared by a descriptor. The target is never registered
/// through this edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Peer {
    name: String,
    config_override: Option<Value>,
}

impl Peer {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config_override(&self) -> Option<&Value> {
        self.config_override.as_ref()
    }
}

/// The immutable descriptor behind an [`Extension`] handle.
pub struct ExtensionDescriptor<H> {
    name: String,
    default_config: Value,
    dependencies: Vec<Dependency<H>>,
    peers: Vec<Peer>,
    conflicts_with: Vec<String>,
    merge: Option<MergeFn>,
    build: Option<BuildHook<H>>,
    init: Option<InitHook<H>>,
    register: Option<RegisterHook<H>>,
    after_initialization: Option<RegisterHook<H>>,
    contributions: Contributions,
}

/// Shared handle to an extension descriptor.
///
/// Cloning is cheap and preserves identity: two clones of one handle are
/// the same extension as far as the registry is concerned.
pub struct Extension<H>(Rc<ExtensionDescriptor<H>>);

impl<H> Clone for Extension<H> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<H> fmt::Debug for Extension<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("name", &self.0.name)
            .field(
                "dependencies",
                &self
                    .0
                    .dependencies
                    .iter()
                    .map(|d| d.extension.name())
                    .collect::<Vec<_>>(),
            )
            .field("peers", &self.0.peers)
            .field("conflicts_with", &self.0.conflicts_with)
            .finish_non_exhaustive()
    }
}

impl<H> Extension<H> {
    /// Start building a descriptor named `name`.
    pub fn builder(name: impl Into<String>) -> ExtensionBuilder<H> {
        ExtensionBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn default_config(&self) -> &Value {
        &self.0.default_config
    }

    pub fn dependencies(&self) -> &[Dependency<H>] {
        &self.0.dependencies
    }

    pub fn peers(&self) -> &[Peer] {
        &self.0.peers
    }

    pub fn conflicts_with(&self) -> &[String] {
        &self.0.conflicts_with
    }

    pub fn contributions(&self) -> &Contributions {
        &self.0.contributions
    }

    /// Whether both handles point at the same descriptor.
    pub fn ptr_eq(&self, other: &Extension<H>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Whether `name` is declared as a (non-peer) dependency.
    pub fn depends_on(&self, name: &str) -> bool {
        self.0.dependencies.iter().any(|d| d.extension.name() == name)
    }

    /// Whether `name` is declared as a peer dependency.
    pub fn has_peer(&self, name: &str) -> bool {
        self.0.peers.iter().any(|p| p.name == name)
    }

    /// Fold one override into `accumulated` with this extension's merge
    /// function, or [`shallow_merge`] when none was supplied.
    pub fn merge_config(&self, accumulated: Value, override_value: &Value) -> Value {
        match &self.0.merge {
            Some(merge) => merge(accumulated, override_value),
            None => shallow_merge(accumulated, override_value),
        }
    }

    pub(crate) fn build_hook(&self) -> Option<&BuildHook<H>> {
        self.0.build.as_ref()
    }

    pub(crate) fn init_hook(&self) -> Option<&InitHook<H>> {
        self.0.init.as_ref()
    }

    pub(crate) fn register_hook(&self) -> Option<&RegisterHook<H>> {
        self.0.register.as_ref()
    }

    pub(crate) fn after_initialization_hook(&self) -> Option<&RegisterHook<H>> {
        self.0.after_initialization.as_ref()
    }
}

/// Builder for [`Extension`] descriptors.
pub struct ExtensionBuilder<H> {
    descriptor: ExtensionDescriptor<H>,
}

impl<H> ExtensionBuilder<H> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            descriptor: ExtensionDescriptor {
                name: name.into(),
                default_config: Value::Object(serde_json::Map::new()),
                dependencies: Vec::new(),
                peers: Vec::new(),
                conflicts_with: Vec::new(),
                merge: None,
                build: None,
                init: None,
                register: None,
                after_initialization: None,
                contributions: Contributions::default(),
            },
        }
    }

    pub fn default_config(mut self, config: Value) -> Self {
        self.descriptor.default_config = config;
        self
    }

    /// Declare a dependency. The dependency is registered recursively.
    pub fn depends_on(self, extension: &Extension<H>) -> Self {
        self.depends_on_with(extension, [])
    }

    /// Declare a dependency that carries configuration overrides for it.
    pub fn depends_on_with(
        mut self,
        extension: &Extension<H>,
        overrides: impl IntoIterator<Item = Value>,
    ) -> Self {
        self.descriptor.dependencies.push(Dependency {
            extension: extension.clone(),
            overrides: overrides.into_iter().collect(),
        });
        self
    }

    /// Declare a peer dependency by name.
    pub fn peer(mut self, name: impl Into<String>) -> Self {
        self.descriptor.peers.push(Peer {
            name: name.into(),
            config_override: None,
        });
        self
    }

    /// Declare a peer dependency that carries a configuration override.
    pub fn peer_with(mut self, name: impl Into<String>, config_override: Value) -> Self {
        self.descriptor.peers.push(Peer {
            name: name.into(),
            config_override: Some(config_override),
        });
        self
    }

    /// Declare that `name` must never be composed alongside this extension.
    pub fn conflicts_with(mut self, name: impl Into<String>) -> Self {
        self.descriptor.conflicts_with.push(name.into());
        self
    }

    /// Replace the default shallow merge.
    pub fn merge_with(mut self, merge: impl Fn(Value, &Value) -> Value + 'static) -> Self {
        self.descriptor.merge = Some(Box::new(merge));
        self
    }

    pub fn contributes(mut self, contributions: Contributions) -> Self {
        self.descriptor.contributions = contributions;
        self
    }

    /// Hook run during the build pass. Its return value becomes the
    /// extension's output, visible to dependents once it is registered.
    pub fn on_build<T, F>(mut self, hook: F) -> Self
    where
        T: 'static,
        F: Fn(&mut H, &Value, &ExtensionContext<'_, H>) -> Result<T, HookError> + 'static,
    {
        self.descriptor.build = Some(Box::new(
            move |host: &mut H, config: &Value, ctx: &ExtensionContext<'_, H>| {
                hook(host, config, ctx).map(|output| Rc::new(output) as Artifact)
            },
        ));
        self
    }

    /// Hook run during the init pass. Its return value becomes the
    /// extension's init result.
    pub fn on_init<T, F>(mut self, hook: F) -> Self
    where
        T: 'static,
        F: Fn(&mut H, &Value, &InitContext<'_, H>) -> Result<T, HookError> + 'static,
    {
        self.descriptor.init = Some(Box::new(
            move |host: &mut H, config: &Value, ctx: &InitContext<'_, H>| {
                hook(host, config, ctx).map(|result| Rc::new(result) as Artifact)
            },
        ));
        self
    }

    pub fn on_register<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut H, &Value, &ExtensionContext<'_, H>) -> Result<Option<Cleanup>, HookError>
            + 'static,
    {
        self.descriptor.register = Some(Box::new(hook));
        self
    }

    pub fn on_after_initialization<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut H, &Value, &ExtensionContext<'_, H>) -> Result<Option<Cleanup>, HookError>
            + 'static,
    {
        self.descriptor.after_initialization = Some(Box::new(hook));
        self
    }

    pub fn finish(self) -> Extension<H> {
        Extension(Rc::new(self.descriptor))
    }
}

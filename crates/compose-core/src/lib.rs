//! Extension composition and lifecycle resolution.
//!
//! Extensions are immutable descriptors ([`Extension`]) that declare a name,
//! a default configuration, dependency and peer edges, conflicts, optional
//! lifecycle hooks and optional [`Contributions`] to the host configuration.
//!
//! Composing a set of root extensions:
//!
//! 1. registers them and their transitive dependencies in a [`Registry`]
//! 2. sorts the graph dependency-first and propagates configuration overrides
//! 3. aggregates every contribution into a [`HostConfig`] and builds the host
//! 4. runs the `build`, `init`, `register` and `after_initialization` passes
//! 5. returns the host together with a [`Disposer`] for teardown
//!
//! Hooks run synchronously on the calling thread; the host type is chosen by
//! the caller.

pub mod context;
pub mod contributions;
pub mod error;
pub mod extension;
pub mod lifecycle;
pub mod logging;
pub mod merge;
pub mod record;
pub mod registry;

pub use context::{ExtensionContext, InitContext, ResolvedDependency};
pub use contributions::{Contributions, HostConfig, Replacement, aggregate};
pub use error::{Error, HookError, Result};
pub use extension::{Artifact, Cleanup, Dependency, Extension, ExtensionBuilder, Peer};
pub use lifecycle::{Composer, Composition, Disposer, Phase, compose_extensions};
pub use merge::{deep_merge, shallow_merge};
pub use record::{ExtensionRecord, LifecycleState};
pub use registry::Registry;
pub use tokio_util::sync::CancellationToken;

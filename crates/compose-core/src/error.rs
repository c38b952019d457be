//! Error types for compose-core

use crate::record::LifecycleState;
use crate::lifecycle::Phase;

/// Boxed error returned by extension hooks and cleanups.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for compose-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while composing extensions.
///
/// Every variant describes an invalid extension graph or a misbehaving hook.
/// None of them are recoverable: the composition that produced one is
/// abandoned and no host object is handed back.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Two different descriptors were registered under the same name.
    #[error("extension name '{name}' is already bound to a different descriptor")]
    DuplicateName { name: String },

    /// An extension is present while another one declares it incompatible.
    #[error("extension '{extension}' conflicts with '{declared_by}'")]
    ConflictingExtension {
        extension: String,
        declared_by: String,
    },

    /// The dependency/peer edges contain a cycle.
    #[error("circular dependency detected: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    /// A record was asked to move out of a state it is not in.
    #[error("extension '{extension}' is in state {actual}, expected {expected}")]
    WrongLifecycleState {
        extension: String,
        expected: LifecycleState,
        actual: LifecycleState,
    },

    /// A declared dependency has no record in the registry.
    #[error("extension '{extension}' depends on '{dependency}', which was never registered")]
    MissingDependencyRegistration {
        extension: String,
        dependency: String,
    },

    /// Two extensions claim the same replacement target.
    #[error("replacement target '{target}' claimed by both '{first}' and '{second}'")]
    ReplaceCollision {
        target: String,
        first: String,
        second: String,
    },

    /// A dependency's output was requested before it finished registering.
    #[error("extension '{extension}' used before registration (state {state})")]
    UsedBeforeRegistration {
        extension: String,
        state: LifecycleState,
    },

    /// `add` was called after the sorted order was cached.
    #[error("cannot add extension '{name}': the extension graph is frozen")]
    MutationAfterFreeze { name: String },

    /// An accessor named an extension that is not a declared dependency.
    #[error("'{dependency}' is not a dependency of extension '{extension}'")]
    NotADependency {
        extension: String,
        dependency: String,
    },

    /// A root-level override targets a name that is not part of the graph.
    #[error("override targets unknown extension: {0}")]
    UnknownExtension(String),

    /// A stored output or init result does not have the requested type.
    #[error("{artifact} of extension '{extension}' is not a {expected}")]
    ArtifactType {
        extension: String,
        artifact: &'static str,
        expected: &'static str,
    },

    /// A merged configuration could not be decoded into the requested type.
    #[error("invalid configuration for extension '{extension}': {source}")]
    InvalidConfig {
        extension: String,
        #[source]
        source: serde_json::Error,
    },

    /// A lifecycle hook returned an error.
    #[error("{phase} hook of extension '{extension}' failed: {source}")]
    Hook {
        extension: String,
        phase: Phase,
        #[source]
        source: HookError,
    },

    /// A cleanup returned an error while disposing.
    #[error("cleanup of extension '{extension}' failed: {source}")]
    Cleanup {
        extension: String,
        #[source]
        source: HookError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_dependency_display_joins_chain() {
        let err = Error::CircularDependency {
            cycle: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(err.to_string(), "circular dependency detected: a -> b -> a");
    }

    #[test]
    fn test_wrong_state_display_names_both_states() {
        let err = Error::WrongLifecycleState {
            extension: "base".to_string(),
            expected: LifecycleState::Configured,
            actual: LifecycleState::Permanent,
        };
        let display = err.to_string();
        assert!(display.contains("base"));
        assert!(display.contains("configured"));
        assert!(display.contains("permanent"));
    }

    #[test]
    fn test_hook_error_keeps_source() {
        use std::error::Error as _;

        let err = Error::Hook {
            extension: "history".to_string(),
            phase: Phase::Register,
            source: "listener already attached".into(),
        };
        assert_eq!(
            err.to_string(),
            "register hook of extension 'history' failed: listener already attached"
        );
        assert!(err.source().is_some());
    }
}

//! Per-extension lifecycle records.
//!
//! The registry owns one [`ExtensionRecord`] per registered name. A record's
//! stage is a tagged union: the states up to `permanent` carry no
//! payload, and every stage from `configured` onwards carries the merged
//! configuration plus whatever the hooks produced so far. The only way to
//! move a record forward is [`ExtensionRecord::advance`], which enforces the
//! fixed order
//!
//! ```text
//! unmarked -> temporary -> permanent -> configured -> initialized -> registered -> after-initialization
//! ```

use std::any::type_name;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::extension::{Artifact, Extension};

/// Lifecycle states in their only legal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Unmarked,
    Temporary,
    Permanent,
    Configured,
    Initialized,
    Registered,
    AfterInitialization,
}

impl LifecycleState {
    /// The state directly after this one.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Unmarked => Some(Self::Temporary),
            Self::Temporary => Some(Self::Permanent),
            Self::Permanent => Some(Self::Configured),
            Self::Configured => Some(Self::Initialized),
            Self::Initialized => Some(Self::Registered),
            Self::Registered => Some(Self::AfterInitialization),
            Self::AfterInitialization => None,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unmarked => write!(f, "unmarked"),
            Self::Temporary => write!(f, "temporary"),
            Self::Permanent => write!(f, "permanent"),
            Self::Configured => write!(f, "configured"),
            Self::Initialized => write!(f, "initialized"),
            Self::Registered => write!(f, "registered"),
            Self::AfterInitialization => write!(f, "after-initialization"),
        }
    }
}

/// Data accumulated once a record has been configured.
struct Settled {
    config: Rc<Value>,
    output: Option<Artifact>,
    init_result: Option<Artifact>,
}

enum Stage {
    Unmarked,
    Temporary,
    Permanent,
    Configured(Settled),
    Initialized(Settled),
    Registered(Settled),
    AfterInitialization(Settled),
}

impl Stage {
    fn state(&self) -> LifecycleState {
        match self {
            Self::Unmarked => LifecycleState::Unmarked,
            Self::Temporary => LifecycleState::Temporary,
            Self::Permanent => LifecycleState::Permanent,
            Self::Configured(_) => LifecycleState::Configured,
            Self::Initialized(_) => LifecycleState::Initialized,
            Self::Registered(_) => LifecycleState::Registered,
            Self::AfterInitialization(_) => LifecycleState::AfterInitialization,
        }
    }

    fn settled(&self) -> Option<&Settled> {
        match self {
            Self::Configured(s)
            | Self::Initialized(s)
            | Self::Registered(s)
            | Self::AfterInitialization(s) => Some(s),
            _ => None,
        }
    }

    fn settled_mut(&mut self) -> Option<&mut Settled> {
        match self {
            Self::Configured(s)
            | Self::Initialized(s)
            | Self::Registered(s)
            | Self::AfterInitialization(s) => Some(s),
            _ => None,
        }
    }
}

/// Engine-owned wrapper around one registered descriptor.
pub struct ExtensionRecord<H> {
    extension: Extension<H>,
    stage: Stage,
    overrides: Vec<Value>,
}

impl<H> fmt::Debug for ExtensionRecord<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRecord")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("overrides", &self.overrides)
            .finish()
    }
}

impl<H> ExtensionRecord<H> {
    pub(crate) fn new(extension: Extension<H>) -> Self {
        Self {
            extension,
            stage: Stage::Unmarked,
            overrides: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.extension.name()
    }

    pub fn extension(&self) -> &Extension<H> {
        &self.extension
    }

    pub fn state(&self) -> LifecycleState {
        self.stage.state()
    }

    /// Overrides accumulated so far, in insertion order.
    pub fn overrides(&self) -> &[Value] {
        &self.overrides
    }

    /// Move from `expected` to the state directly after it.
    ///
    /// Leaving `permanent` computes and freezes the merged configuration.
    pub(crate) fn advance(&mut self, expected: LifecycleState) -> Result<()> {
        if self.state() != expected || expected.next().is_none() {
            return Err(self.wrong_state(expected));
        }

        self.stage = match std::mem::replace(&mut self.stage, Stage::Unmarked) {
            Stage::Unmarked => Stage::Temporary,
            Stage::Temporary => Stage::Permanent,
            Stage::Permanent => Stage::Configured(Settled {
                config: Rc::new(self.merge_configs()),
                output: None,
                init_result: None,
            }),
            Stage::Configured(settled) => Stage::Initialized(settled),
            Stage::Initialized(settled) => Stage::Registered(settled),
            Stage::Registered(settled) => Stage::AfterInitialization(settled),
            Stage::AfterInitialization(_) => {
                unreachable!("after-initialization has no successor")
            }
        };
        tracing::trace!(extension = %self.name(), state = %self.state(), "Advanced extension");
        Ok(())
    }

    /// Fold the accumulated overrides onto the default configuration.
    pub fn merge_configs(&self) -> Value {
        self.overrides.iter().fold(
            self.extension.default_config().clone(),
            |accumulated, override_value| self.extension.merge_config(accumulated, override_value),
        )
    }

    /// Queue an override. Only legal once sorted and before configuration.
    pub(crate) fn push_override(&mut self, value: Value) -> Result<()> {
        self.require_exact(LifecycleState::Permanent)?;
        self.overrides.push(value);
        Ok(())
    }

    /// The merged configuration, available from `configured` onwards.
    pub fn config(&self) -> Result<&Rc<Value>> {
        self.stage
            .settled()
            .map(|s| &s.config)
            .ok_or_else(|| self.wrong_state(LifecycleState::Configured))
    }

    /// The build output, readable once the record is registered.
    pub fn output(&self) -> Result<&Artifact> {
        if self.state() < LifecycleState::Registered {
            return Err(Error::UsedBeforeRegistration {
                extension: self.name().to_string(),
                state: self.state(),
            });
        }
        self.stage
            .settled()
            .and_then(|s| s.output.as_ref())
            .ok_or_else(|| self.wrong_state(LifecycleState::Registered))
    }

    /// The init result, readable once the record is initialized.
    pub fn init_result(&self) -> Result<&Artifact> {
        if self.state() < LifecycleState::Initialized {
            return Err(self.wrong_state(LifecycleState::Initialized));
        }
        self.stage
            .settled()
            .and_then(|s| s.init_result.as_ref())
            .ok_or_else(|| self.wrong_state(LifecycleState::Initialized))
    }

    pub(crate) fn set_output(&mut self, output: Artifact) -> Result<()> {
        self.require_exact(LifecycleState::Configured)?;
        if let Some(settled) = self.stage.settled_mut() {
            settled.output = Some(output);
        }
        Ok(())
    }

    pub(crate) fn set_init_result(&mut self, result: Artifact) -> Result<()> {
        self.require_exact(LifecycleState::Initialized)?;
        if let Some(settled) = self.stage.settled_mut() {
            settled.init_result = Some(result);
        }
        Ok(())
    }

    fn require_exact(&self, expected: LifecycleState) -> Result<()> {
        if self.state() == expected {
            Ok(())
        } else {
            Err(self.wrong_state(expected))
        }
    }

    fn wrong_state(&self, expected: LifecycleState) -> Error {
        Error::WrongLifecycleState {
            extension: self.name().to_string(),
            expected,
            actual: self.state(),
        }
    }
}

/// Downcast an artifact, naming the extension and artifact kind on mismatch.
pub(crate) fn downcast_artifact<T: 'static>(
    artifact: &Artifact,
    extension: &str,
    kind: &'static str,
) -> Result<Rc<T>> {
    Rc::clone(artifact)
        .downcast::<T>()
        .map_err(|_| Error::ArtifactType {
            extension: extension.to_string(),
            artifact: kind,
            expected: type_name::<T>(),
        })
}

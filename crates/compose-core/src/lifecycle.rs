//! Lifecycle driver and aggregate disposer.
//!
//! A [`Composer`] collects root extensions, resolves the graph once and then
//! drives every record through four complete passes over the sorted order:
//!
//! 1. build: configure each record and run its `build` hook
//! 2. init: run every `init` hook with the composition's cancellation token
//! 3. register: run every `register` hook, collecting cleanups
//! 4. after-initialization: run every `after_initialization` hook, collecting cleanups
//!
//! No pass starts before the previous one finished for every extension. The
//! collected cleanups end up in a single [`Disposer`].

use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::context::{ExtensionContext, InitContext};
use crate::contributions::HostConfig;
use crate::error::{Error, HookError, Result};
use crate::extension::{Artifact, Cleanup, Extension, RegisterHook};
use crate::record::LifecycleState;
use crate::registry::Registry;

/// The four lifecycle passes, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Build,
    Init,
    Register,
    AfterInitialization,
}

impl Phase {
    /// State every record must be in when the pass reaches it.
    pub fn entry_state(self) -> LifecycleState {
        match self {
            Self::Build => LifecycleState::Permanent,
            Self::Init => LifecycleState::Configured,
            Self::Register => LifecycleState::Initialized,
            Self::AfterInitialization => LifecycleState::Registered,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build => write!(f, "build"),
            Self::Init => write!(f, "init"),
            Self::Register => write!(f, "register"),
            Self::AfterInitialization => write!(f, "after-initialization"),
        }
    }
}

/// Collects extensions and composes them into a host.
pub struct Composer<H> {
    registry: Registry<H>,
}

impl<H> Default for Composer<H> {
    fn default() -> Self {
        Self {
            registry: Registry::new(),
        }
    }
}

impl<H> Composer<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a composer with every root already registered.
    pub fn from_extensions<'e>(roots: impl IntoIterator<Item = &'e Extension<H>>) -> Result<Self>
    where
        H: 'e,
    {
        let mut composer = Self::new();
        for root in roots {
            composer.add(root)?;
        }
        Ok(composer)
    }

    /// Register a root extension and its transitive dependencies.
    pub fn add(&mut self, extension: &Extension<H>) -> Result<()> {
        self.registry.add(extension)
    }

    /// Register a root extension with caller-supplied overrides.
    pub fn add_with_overrides(
        &mut self,
        extension: &Extension<H>,
        overrides: impl IntoIterator<Item = Value>,
    ) -> Result<()> {
        self.registry.add_with_overrides(extension, overrides)
    }

    /// Queue a root-level override for the extension named `name`.
    pub fn override_config(&mut self, name: &str, value: Value) -> Result<()> {
        self.registry.queue_override(name, value)
    }

    pub fn registry(&self) -> &Registry<H> {
        &self.registry
    }

    /// The dependency-first order. Freezes the graph.
    pub fn sorted_names(&mut self) -> Result<Vec<String>> {
        Ok(self.registry.sorted_names()?.to_vec())
    }

    /// Preview the aggregated host configuration. Freezes the graph.
    pub fn host_config(&mut self) -> Result<HostConfig> {
        self.registry.host_config()
    }

    /// Resolve the graph, create the host and run every lifecycle pass.
    ///
    /// `factory` receives the aggregated [`HostConfig`] exactly once, before
    /// the build pass. If a `register` or `after_initialization` hook fails,
    /// the cleanups collected so far are run before the error is returned.
    pub fn compose<F>(mut self, factory: F) -> Result<Composition<H>>
    where
        F: FnOnce(HostConfig) -> H,
    {
        let order = self.sorted_names()?;
        let host_config = self.registry.host_config()?;
        tracing::debug!(extensions = order.len(), "Composing extensions");

        let mut host = factory(host_config);
        let signal = CancellationToken::new();

        if let Err(err) = self
            .build_pass(&order, &mut host)
            .and_then(|()| self.init_pass(&order, &mut host, &signal))
        {
            signal.cancel();
            return Err(err);
        }

        let mut disposer = Disposer::new(signal);
        for (phase, hook_of) in [
            (Phase::Register, Extension::register_hook as HookSelector<H>),
            (
                Phase::AfterInitialization,
                Extension::after_initialization_hook as HookSelector<H>,
            ),
        ] {
            if let Err(err) = self.cleanup_pass(phase, hook_of, &order, &mut host, &mut disposer) {
                if let Err(cleanup_err) = disposer.dispose() {
                    tracing::warn!(error = %cleanup_err, "Cleanup failed while unwinding composition");
                }
                return Err(err);
            }
        }

        tracing::debug!(
            extensions = order.len(),
            cleanups = disposer.pending(),
            "Composition complete"
        );
        Ok(Composition {
            host,
            disposer,
            registry: self.registry,
        })
    }

    fn build_pass(&mut self, order: &[String], host: &mut H) -> Result<()> {
        tracing::debug!(phase = %Phase::Build, "Running lifecycle pass");
        for name in order {
            let record = self.registry.get_mut(name)?;
            record.advance(Phase::Build.entry_state())?;
            let extension = record.extension().clone();
            let config = Rc::clone(record.config()?);

            let output = match extension.build_hook() {
                Some(hook) => {
                    let ctx = ExtensionContext::new(&self.registry, &extension);
                    hook(host, &config, &ctx).map_err(|source| hook_error(name, Phase::Build, source))?
                }
                None => Rc::new(()) as Artifact,
            };
            self.registry.get_mut(name)?.set_output(output)?;
        }
        Ok(())
    }

    fn init_pass(&mut self, order: &[String], host: &mut H, signal: &CancellationToken) -> Result<()> {
        tracing::debug!(phase = %Phase::Init, "Running lifecycle pass");
        for name in order {
            let record = self.registry.get_mut(name)?;
            let extension = record.extension().clone();
            let config = Rc::clone(record.config()?);

            let result = match extension.init_hook() {
                Some(hook) => {
                    let ctx = InitContext::new(ExtensionContext::new(&self.registry, &extension), signal);
                    hook(host, &config, &ctx).map_err(|source| hook_error(name, Phase::Init, source))?
                }
                None => Rc::new(()) as Artifact,
            };
            let record = self.registry.get_mut(name)?;
            record.advance(Phase::Init.entry_state())?;
            record.set_init_result(result)?;
        }
        Ok(())
    }

    fn cleanup_pass(
        &mut self,
        phase: Phase,
        hook_of: HookSelector<H>,
        order: &[String],
        host: &mut H,
        disposer: &mut Disposer,
    ) -> Result<()> {
        tracing::debug!(phase = %phase, "Running lifecycle pass");
        for name in order {
            let record = self.registry.get_mut(name)?;
            let extension = record.extension().clone();
            let config = Rc::clone(record.config()?);

            if let Some(hook) = hook_of(&extension) {
                let ctx = ExtensionContext::new(&self.registry, &extension);
                let cleanup =
                    hook(host, &config, &ctx).map_err(|source| hook_error(name, phase, source))?;
                if let Some(cleanup) = cleanup {
                    disposer.push(name, cleanup);
                }
            }
            self.registry.get_mut(name)?.advance(phase.entry_state())?;
        }
        Ok(())
    }
}

type HookSelector<H> = fn(&Extension<H>) -> Option<&RegisterHook<H>>;

fn hook_error(extension: &str, phase: Phase, source: HookError) -> Error {
    tracing::debug!(extension, phase = %phase, error = %source, "Hook failed");
    Error::Hook {
        extension: extension.to_string(),
        phase,
        source,
    }
}

/// Compose `roots` into a host built by `factory`.
///
/// # Example
///
/// ```
/// use compose_core::{Cleanup, Extension, compose_extensions};
/// use serde_json::json;
///
/// let base: Extension<Vec<String>> = Extension::builder("base")
///     .default_config(json!({"x": 1}))
///     .on_register(|host: &mut Vec<String>, config, _ctx| {
///         host.push(format!("base x={}", config["x"]));
///         Ok(Some(Cleanup::infallible(|| {})))
///     })
///     .finish();
/// let feature = Extension::builder("feature")
///     .depends_on_with(&base, [json!({"x": 5})])
///     .finish();
///
/// let mut composition = compose_extensions(&[feature], |_config| Vec::new()).unwrap();
/// assert_eq!(composition.host(), &["base x=5".to_string()]);
/// composition.dispose().unwrap();
/// ```
pub fn compose_extensions<H, F>(roots: &[Extension<H>], factory: F) -> Result<Composition<H>>
where
    F: FnOnce(HostConfig) -> H,
{
    Composer::from_extensions(roots)?.compose(factory)
}

/// A composed host together with its teardown.
pub struct Composition<H> {
    host: H,
    disposer: Disposer,
    registry: Registry<H>,
}

impl<H> Composition<H> {
    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// The resolved registry, every record in `after-initialization`.
    pub fn registry(&self) -> &Registry<H> {
        &self.registry
    }

    /// Run the aggregate teardown. Safe to call any number of times.
    pub fn dispose(&mut self) -> Result<()> {
        self.disposer.dispose()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposer.is_disposed()
    }

    /// Split into the host and its disposer.
    pub fn into_parts(self) -> (H, Disposer) {
        (self.host, self.disposer)
    }
}

/// Aggregate teardown for one composition.
///
/// Disposing cancels the composition's token, then runs every cleanup in
/// reverse registration order. All cleanups run even if some fail; the
/// first failure is returned. Only the first call has any effect.
pub struct Disposer {
    signal: CancellationToken,
    cleanups: Option<Vec<(String, Cleanup)>>,
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("disposed", &self.is_disposed())
            .field("pending", &self.pending())
            .finish()
    }
}

impl Disposer {
    fn new(signal: CancellationToken) -> Self {
        Self {
            signal,
            cleanups: Some(Vec::new()),
        }
    }

    fn push(&mut self, extension: &str, cleanup: Cleanup) {
        if let Some(cleanups) = self.cleanups.as_mut() {
            cleanups.push((extension.to_string(), cleanup));
        }
    }

    /// Number of cleanups that have not run yet.
    pub fn pending(&self) -> usize {
        self.cleanups.as_ref().map_or(0, Vec::len)
    }

    pub fn is_disposed(&self) -> bool {
        self.cleanups.is_none()
    }

    /// Token handed to every `init` hook.
    pub fn signal(&self) -> &CancellationToken {
        &self.signal
    }

    pub fn dispose(&mut self) -> Result<()> {
        let Some(cleanups) = self.cleanups.take() else {
            return Ok(());
        };
        self.signal.cancel();
        tracing::debug!(cleanups = cleanups.len(), "Disposing composition");

        let mut first_error = None;
        for (extension, cleanup) in cleanups.into_iter().rev() {
            if let Err(source) = cleanup.run() {
                tracing::warn!(extension = %extension, error = %source, "Cleanup failed");
                if first_error.is_none() {
                    first_error = Some(Error::Cleanup { extension, source });
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

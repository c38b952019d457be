//! Descriptor fixtures.
//!
//! [`traced`] returns a builder whose four hooks log `build:<name>`,
//! `init:<name>`, `register:<name>` and `after:<name>`. The register hook
//! returns a cleanup logging `cleanup:<name>`. Callers keep chaining edges and
//! contributions onto the builder.

use compose_core::{Cleanup, Extension, ExtensionBuilder, HostConfig};

use crate::events::EventLog;

/// Minimal host that keeps the configuration it was built from.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub config: HostConfig,
    /// Names in the order their `build` hook touched the host.
    pub built: Vec<String>,
}

impl RecordingHost {
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            built: Vec::new(),
        }
    }
}

/// A builder with every hook wired to `log`.
pub fn traced(name: &str, log: &EventLog) -> ExtensionBuilder<RecordingHost> {
    let build_log = log.clone();
    let init_log = log.clone();
    let register_log = log.clone();
    let after_log = log.clone();

    Extension::builder(name)
        .on_build(move |host: &mut RecordingHost, _config, ctx| {
            build_log.record(format!("build:{}", ctx.extension_name()));
            host.built.push(ctx.extension_name().to_string());
            Ok(ctx.extension_name().to_string())
        })
        .on_init(move |_host, _config, ctx| {
            init_log.record(format!("init:{}", ctx.extension_name()));
            Ok(())
        })
        .on_register(move |_host, _config, ctx| {
            let name = ctx.extension_name().to_string();
            register_log.record(format!("register:{name}"));
            let cleanup_log = register_log.clone();
            Ok(Some(Cleanup::infallible(move || {
                cleanup_log.record(format!("cleanup:{name}"))
            })))
        })
        .on_after_initialization(move |_host, _config, ctx| {
            after_log.record(format!("after:{}", ctx.extension_name()));
            Ok(None)
        })
}

/// A linear chain `names[0] <- names[1] <- ...` of traced extensions.
/// Returns the handles in the same order as `names`.
pub fn chain(names: &[&str], log: &EventLog) -> Vec<Extension<RecordingHost>> {
    let mut handles: Vec<Extension<RecordingHost>> = Vec::with_capacity(names.len());
    for name in names {
        let mut builder = traced(name, log);
        if let Some(previous) = handles.last() {
            builder = builder.depends_on(previous);
        }
        handles.push(builder.finish());
    }
    handles
}

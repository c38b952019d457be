//! Layered override resolution
//!
//! The `OverrideResolver` loads override manifests from a fixed hierarchy,
//! later layers winning over earlier ones.

use std::path::{Path, PathBuf};

use crate::Result;
use crate::manifest::OverrideManifest;

/// Directory name under the platform config dir and the project root.
const GLOBAL_DIR_NAME: &str = "compose";
const PROJECT_DIR_NAME: &str = ".compose";
const OVERRIDES_FILE: &str = "overrides.toml";
const LOCAL_OVERRIDES_FILE: &str = "overrides.local.toml";

/// Resolves configuration overrides by merging layered manifests
///
/// Layers, in order:
/// 1. Global (`<config_dir>/compose/overrides.toml`)
/// 2. Project (`<root>/.compose/overrides.toml`)
/// 3. Local (`<root>/.compose/overrides.local.toml`), meant to stay untracked
///
/// Overrides for the same extension are deep-merged across layers.
pub struct OverrideResolver {
    root: PathBuf,

    /// Replaces `dirs::config_dir()/compose` when set.
    global_config_dir_override: Option<PathBuf>,
}

impl OverrideResolver {
    /// Create a resolver for the project at `root`.
    ///
    /// The global layer lives in the platform config directory:
    /// - Linux: `~/.config/compose/`
    /// - macOS: `~/Library/Application Support/compose/`
    /// - Windows: `%APPDATA%\compose\`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            global_config_dir_override: None,
        }
    }

    /// Create a resolver with a custom global config directory.
    pub fn with_global_config_dir(root: impl Into<PathBuf>, global_config_dir: PathBuf) -> Self {
        Self {
            root: root.into(),
            global_config_dir_override: Some(global_config_dir),
        }
    }

    fn global_config_dir(&self) -> Option<PathBuf> {
        if let Some(ref override_dir) = self.global_config_dir_override {
            return Some(override_dir.clone());
        }
        dirs::config_dir().map(|d| d.join(GLOBAL_DIR_NAME))
    }

    /// Candidate manifest paths in merge order. Files need not exist.
    pub fn layer_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(3);
        if let Some(global_dir) = self.global_config_dir() {
            paths.push(global_dir.join(OVERRIDES_FILE));
        }
        paths.push(self.project_path());
        paths.push(self.local_path());
        paths
    }

    /// Merge every layer that exists.
    ///
    /// Missing layers are skipped. Invalid TOML in any layer is an error.
    pub fn resolve(&self) -> Result<OverrideManifest> {
        let mut manifest = OverrideManifest::empty();
        for (layer, path) in self.layer_paths().iter().enumerate() {
            if path.is_file() {
                tracing::debug!(?path, layer = layer + 1, "Loading override layer");
                manifest.merge(&OverrideManifest::load(path)?);
            } else {
                tracing::debug!(?path, layer = layer + 1, "No override layer found, skipping");
            }
        }
        Ok(manifest)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check if a project override file exists
    pub fn has_overrides(&self) -> bool {
        self.project_path().is_file()
    }

    /// Check if local overrides exist
    pub fn has_local_overrides(&self) -> bool {
        self.local_path().is_file()
    }

    fn project_path(&self) -> PathBuf {
        self.root.join(PROJECT_DIR_NAME).join(OVERRIDES_FILE)
    }

    fn local_path(&self) -> PathBuf {
        self.root.join(PROJECT_DIR_NAME).join(LOCAL_OVERRIDES_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn isolated(root: &TempDir, global: &TempDir) -> OverrideResolver {
        OverrideResolver::with_global_config_dir(root.path(), global.path().to_path_buf())
    }

    #[test]
    fn resolve_returns_empty_when_no_layers_exist() {
        let root = TempDir::new().unwrap();
        let global = TempDir::new().unwrap();
        let resolver = isolated(&root, &global);

        assert!(!resolver.has_overrides());
        assert!(!resolver.has_local_overrides());
        assert!(resolver.resolve().unwrap().is_empty());
    }

    #[test]
    fn resolve_layers_global_project_local() {
        let root = TempDir::new().unwrap();
        let global = TempDir::new().unwrap();
        let project_dir = root.path().join(".compose");
        std::fs::create_dir_all(&project_dir).unwrap();

        std::fs::write(
            global.path().join("overrides.toml"),
            "[extensions.\"history\"]\ndepth = 10\nnew_group_delay = 500\n",
        )
        .unwrap();
        std::fs::write(
            project_dir.join("overrides.toml"),
            "[extensions.\"history\"]\ndepth = 50\n",
        )
        .unwrap();
        std::fs::write(
            project_dir.join("overrides.local.toml"),
            "[extensions.\"history\"]\ndepth = 99\n",
        )
        .unwrap();

        let resolver = isolated(&root, &global);
        assert!(resolver.has_overrides());
        assert!(resolver.has_local_overrides());

        let manifest = resolver.resolve().unwrap();
        assert_eq!(
            manifest.get("history"),
            Some(&json!({"depth": 99, "new_group_delay": 500}))
        );
    }

    #[test]
    fn layer_paths_follow_merge_order() {
        let resolver = OverrideResolver::with_global_config_dir("/project", PathBuf::from("/global"));
        assert_eq!(
            resolver.layer_paths(),
            vec![
                PathBuf::from("/global/overrides.toml"),
                PathBuf::from("/project/.compose/overrides.toml"),
                PathBuf::from("/project/.compose/overrides.local.toml"),
            ]
        );
        assert_eq!(resolver.root(), Path::new("/project"));
    }

    #[test]
    fn resolve_fails_on_invalid_layer() {
        let root = TempDir::new().unwrap();
        let global = TempDir::new().unwrap();
        std::fs::write(global.path().join("overrides.toml"), "not = [valid").unwrap();

        let resolver = isolated(&root, &global);
        assert!(matches!(
            resolver.resolve(),
            Err(crate::Error::ManifestParse(_))
        ));
    }
}

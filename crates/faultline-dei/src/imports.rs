//! Providers of imported-library namespaces for frame filtering.
//!
//! The callsite core only ever consumes the resolved list of prefixes;
//! reading dependency manifests happens here, behind [`ImportedLibraries`].

use std::fs;
use std::path::PathBuf;

use crate::error::{CallsiteError, CallsiteResult};

/// Supplies namespace prefixes of third-party libraries.
pub trait ImportedLibraries {
    fn namespaces(&self) -> CallsiteResult<Vec<String>>;
}

/// Treats nothing as imported.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoImports;

impl ImportedLibraries for NoImports {
    fn namespaces(&self) -> CallsiteResult<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Reads dependency names from a `Cargo.toml`.
///
/// Both `[dependencies]` and `[workspace.dependencies]` are consulted. A
/// dependency `foo-bar` becomes the prefix `foo_bar::`. Prefixes starting
/// with a whitelisted fragment are never reported.
#[derive(Debug, Clone)]
pub struct CargoManifestImports {
    manifest: PathBuf,
    whitelist: Vec<String>,
}

impl CargoManifestImports {
    pub fn new(manifest: impl Into<PathBuf>) -> Self {
        Self {
            manifest: manifest.into(),
            whitelist: Vec::new(),
        }
    }

    /// Parses a comma-separated whitelist such as `"shop_,billing"`.
    pub fn with_whitelist(mut self, whitelist: &str) -> Self {
        self.whitelist = whitelist
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect();
        self
    }
}

impl ImportedLibraries for CargoManifestImports {
    fn namespaces(&self) -> CallsiteResult<Vec<String>> {
        let text = fs::read_to_string(&self.manifest).map_err(|source| {
            CallsiteError::ManifestRead {
                path: self.manifest.clone(),
                source,
            }
        })?;
        let manifest: toml::Table =
            toml::from_str(&text).map_err(|source| CallsiteError::ManifestParse {
                path: self.manifest.clone(),
                source,
            })?;

        let workspace_deps = manifest
            .get("workspace")
            .and_then(|w| w.get("dependencies"))
            .and_then(toml::Value::as_table);
        let deps = manifest.get("dependencies").and_then(toml::Value::as_table);

        let mut namespaces: Vec<String> = deps
            .into_iter()
            .chain(workspace_deps)
            .flat_map(|table| table.keys())
            .map(|name| format!("{}::", name.replace('-', "_")))
            .filter(|ns| !self.whitelist.iter().any(|w| ns.starts_with(w.as_str())))
            .collect();
        namespaces.sort();
        namespaces.dedup();

        tracing::debug!(
            manifest = %self.manifest.display(),
            count = namespaces.len(),
            "resolved imported library namespaces"
        );
        Ok(namespaces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const MANIFEST: &str = r#"
[package]
name = "shop"

[dependencies]
serde_json = "1"
tokio-util = "0.7"
shop-protocol = { path = "../protocol" }

[workspace.dependencies]
tracing = "0.1"
serde_json = "1"
"#;

    #[test]
    fn reads_dependencies_as_prefixes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Cargo.toml");
        fs::write(&path, MANIFEST).unwrap();

        let namespaces = CargoManifestImports::new(&path).namespaces().unwrap();
        assert_eq!(
            namespaces,
            vec!["serde_json::", "shop_protocol::", "tokio_util::", "tracing::"]
        );
    }

    #[test]
    fn whitelist_keeps_own_crates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Cargo.toml");
        fs::write(&path, MANIFEST).unwrap();

        let namespaces = CargoManifestImports::new(&path)
            .with_whitelist("shop_, tracing")
            .namespaces()
            .unwrap();
        assert_eq!(namespaces, vec!["serde_json::", "tokio_util::"]);
    }

    #[test]
    fn missing_manifest_is_an_error() {
        let dir = tempdir().unwrap();
        let err = CargoManifestImports::new(dir.path().join("Cargo.toml"))
            .namespaces()
            .unwrap_err();
        assert!(matches!(err, CallsiteError::ManifestRead { .. }));
    }

    #[test]
    fn invalid_manifest_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Cargo.toml");
        fs::write(&path, "[dependencies\nserde = ").unwrap();
        let err = CargoManifestImports::new(&path).namespaces().unwrap_err();
        assert!(matches!(err, CallsiteError::ManifestParse { .. }));
    }

    #[test]
    fn no_imports_is_empty() {
        assert!(NoImports.namespaces().unwrap().is_empty());
    }
}

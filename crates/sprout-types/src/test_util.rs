//! Stub collaborators for exercising the pipeline without a real package
//! manager or transformer.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use sprout_vfs::Vfs;

use crate::{
    InstallError, InstallOptions, InstallResult, Installer, Reporter, ResolvedPackage,
    SourceTransformer, TransformError,
};

/// A reporter that records every progress line.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    messages: Mutex<Vec<String>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Reporter for CollectingReporter {
    fn on_progress(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// An installer that materializes every declared dependency from a fixed
/// in-memory registry.
#[derive(Debug, Default)]
pub struct StubInstaller {
    registry: BTreeMap<String, String>,
    calls: AtomicUsize,
}

impl StubInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a package version to resolve to.
    #[must_use]
    pub fn with_package(mut self, name: &str, version: &str) -> Self {
        self.registry.insert(name.to_string(), version.to_string());
        self
    }

    /// How many times `install` has run.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Installer for StubInstaller {
    async fn install(
        &self,
        vfs: &mut Vfs,
        project_path: &str,
        options: &InstallOptions,
        reporter: Option<&dyn Reporter>,
    ) -> Result<InstallResult, InstallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let manifest_path = format!("{project_path}/package.json");
        let manifest = vfs
            .read_to_string(&manifest_path)
            .map_err(|_| InstallError::ManifestMissing(manifest_path.clone()))?;
        let manifest: Value = serde_json::from_str(&manifest)?;

        let mut sections = vec!["dependencies"];
        if options.include_dev {
            sections.push("devDependencies");
        }
        if options.include_optional {
            sections.push("optionalDependencies");
        }

        let mut result = InstallResult::default();
        for section in sections {
            let Some(deps) = manifest.get(section).and_then(Value::as_object) else {
                continue;
            };
            for (name, spec) in deps {
                let spec = spec.as_str().unwrap_or_default();
                let version = self
                    .registry
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| spec.trim_start_matches(['^', '~', '=']).to_string());
                let package_dir = format!("{project_path}/node_modules/{name}");
                vfs.write_file(
                    &format!("{package_dir}/package.json"),
                    format!(r#"{{"name":"{name}","version":"{version}"}}"#).into_bytes(),
                )?;
                vfs.write_file(
                    &format!("{package_dir}/index.js"),
                    b"module.exports = {};\n".to_vec(),
                )?;
                if let Some(reporter) = reporter {
                    reporter.on_progress(&format!("Installed {name}@{version}"));
                }
                result.added.push(name.clone());
                result.installed.insert(
                    name.clone(),
                    ResolvedPackage {
                        version,
                        resolved: None,
                    },
                );
            }
        }
        result.added.sort();
        Ok(result)
    }
}

/// A transformer that counts the project's script files without changing
/// them.
#[derive(Debug, Default)]
pub struct StubTransformer {
    ready: AtomicBool,
    fail: AtomicBool,
}

impl StubTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `transform_package` call fail, for degradation tests.
    #[must_use]
    pub fn failing(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl SourceTransformer for StubTransformer {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn init(&self) -> Result<(), TransformError> {
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn transform_package(
        &self,
        vfs: &mut Vfs,
        project_path: &str,
        _reporter: Option<&dyn Reporter>,
    ) -> Result<usize, TransformError> {
        if !self.is_ready() {
            return Err(TransformError::NotInitialized);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransformError::File {
                path: project_path.to_string(),
                reason: "stubbed failure".to_string(),
            });
        }

        let mut count = 0usize;
        let mut stack = vec![project_path.to_string()];
        while let Some(dir) = stack.pop() {
            for name in vfs.read_dir(&dir)? {
                let child = format!("{dir}/{name}");
                let metadata = vfs.lstat(&child)?;
                if metadata.is_dir() {
                    if name != "node_modules" {
                        stack.push(child);
                    }
                } else if metadata.is_file()
                    && ["js", "jsx", "ts", "tsx", "mjs", "cjs"]
                        .iter()
                        .any(|ext| name.ends_with(&format!(".{ext}")))
                {
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}

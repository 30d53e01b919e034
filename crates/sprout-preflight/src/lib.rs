//! Pre-install validation of an imported project.
//!
//! The validator classifies structural hazards that would make a fresh
//! install fail or silently misbehave: unresolvable `workspace:` refs,
//! missing Vite framework plugins, and subpath imports not covered by a
//! dependency's `exports` map. It never mutates the project; the only
//! output besides diagnostics is a set of suggested install overrides.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use sprout_types::Reporter;
use sprout_vfs::Vfs;

/// Source files scanned for bare-specifier imports, at most.
const MAX_SCAN_FILES: usize = 200;

const SOURCE_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs", "cjs"];

/// Vite frameworks and the plugins that can satisfy them. The first plugin
/// is the canonical suggestion.
const VITE_PLUGINS: &[(&str, &[&str])] = &[
    ("react", &["@vitejs/plugin-react", "@vitejs/plugin-react-swc"]),
    ("vue", &["@vitejs/plugin-vue"]),
    ("svelte", &["@sveltejs/vite-plugin-svelte"]),
];

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?:import|export)\s[^'"]*?from\s*['"]([^'"]+)['"]|import\s*\(\s*['"]([^'"]+)['"]\s*\)|require\s*\(\s*['"]([^'"]+)['"]\s*\)|import\s*['"]([^'"]+)['"]"#,
    )
    .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Issue {
    pub code: String,
    pub severity: Severity,
    pub message: String,
    pub path: Option<String>,
}

/// Install options the validator suggests flipping. `None` means "no
/// opinion"; the coordinator merges these with caller options, caller wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOverrides {
    pub include_workspaces: Option<bool>,
    pub prefer_published_workspace_packages: Option<bool>,
}

#[derive(Default)]
pub struct PreflightOptions<'a> {
    /// Suggest install overrides for fixable hazards.
    pub auto_fix: bool,
    /// Caller-configured values; a hazard already covered by the caller's
    /// configuration produces no override.
    pub include_workspaces: Option<bool>,
    pub prefer_published_workspace_packages: Option<bool>,
    pub reporter: Option<&'a dyn Reporter>,
}

#[derive(Debug, Default)]
pub struct PreflightReport {
    pub issues: Vec<Issue>,
    pub install_overrides: InstallOverrides,
}

impl PreflightReport {
    pub fn has_errors(&self) -> bool {
        self.issues
            .iter()
            .any(|issue| issue.severity == Severity::Error)
    }
}

/// Validate the project rooted at `project_path`. Manifest checks run
/// first, then a bounded scan of project sources.
pub fn run(vfs: &Vfs, project_path: &str, options: &PreflightOptions<'_>) -> PreflightReport {
    let mut report = PreflightReport::default();

    let manifest_path = format!("{project_path}/package.json");
    let manifest = match vfs.read_to_string(&manifest_path) {
        Ok(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(manifest) => manifest,
            Err(err) => {
                debug!("Unparsable manifest at {manifest_path}: {err}");
                return report;
            }
        },
        Err(_) => return report,
    };

    check_workspace_root(&manifest, options, &mut report);
    check_vite_plugins(&manifest, options, &mut report);
    scan_subpath_imports(vfs, project_path, options, &mut report);

    report
}

fn push_issue(report: &mut PreflightReport, options: &PreflightOptions<'_>, issue: Issue) {
    if let Some(reporter) = options.reporter {
        let suffix = issue
            .path
            .as_deref()
            .map(|path| format!(" ({path})"))
            .unwrap_or_default();
        reporter.on_progress(&format!(
            "[preflight:{}] {}{suffix}",
            issue.severity, issue.message
        ));
    }
    report.issues.push(issue);
}

fn declared_dependencies(manifest: &Value) -> Vec<(&str, &str)> {
    let mut dependencies = Vec::new();
    for section in ["dependencies", "devDependencies", "optionalDependencies"] {
        if let Some(map) = manifest.get(section).and_then(Value::as_object) {
            for (name, spec) in map {
                dependencies.push((name.as_str(), spec.as_str().unwrap_or_default()));
            }
        }
    }
    dependencies
}

/// `workspace:` refs without a root workspace manifest cannot resolve; the
/// fix is installing workspace packages from the registry instead.
fn check_workspace_root(
    manifest: &Value,
    options: &PreflightOptions<'_>,
    report: &mut PreflightReport,
) {
    let uses_workspace_refs = declared_dependencies(manifest)
        .iter()
        .any(|(_, spec)| spec.starts_with("workspace:"));
    if !uses_workspace_refs || manifest.get("workspaces").is_some() {
        return;
    }

    push_issue(
        report,
        options,
        Issue {
            code: "preflight.workspace.root-missing".to_string(),
            severity: Severity::Error,
            message: "`workspace:` dependencies declared but no workspace root manifest found"
                .to_string(),
            path: None,
        },
    );
    if options.auto_fix {
        if options.include_workspaces.is_none() {
            report.install_overrides.include_workspaces = Some(true);
        }
        if options.prefer_published_workspace_packages.is_none() {
            report.install_overrides.prefer_published_workspace_packages = Some(true);
        }
    }
}

fn check_vite_plugins(
    manifest: &Value,
    options: &PreflightOptions<'_>,
    report: &mut PreflightReport,
) {
    let dependencies = declared_dependencies(manifest);
    let has = |name: &str| dependencies.iter().any(|(dep, _)| *dep == name);
    if !has("vite") {
        return;
    }
    for (framework, plugins) in VITE_PLUGINS {
        if has(framework) && !plugins.iter().any(|plugin| has(plugin)) {
            let plugin = plugins[0];
            push_issue(
                report,
                options,
                Issue {
                    code: format!("preflight.vite.{framework}.missing-plugin-{plugin}"),
                    severity: Severity::Error,
                    message: format!(
                        "project uses {framework} with Vite but does not declare {plugin}"
                    ),
                    path: None,
                },
            );
        }
    }
}

fn scan_subpath_imports(
    vfs: &Vfs,
    project_path: &str,
    options: &PreflightOptions<'_>,
    report: &mut PreflightReport,
) {
    let mut reported: BTreeSet<(String, String)> = BTreeSet::new();
    let mut scanned = 0usize;
    let mut stack = vec![project_path.to_string()];

    while let Some(dir) = stack.pop() {
        let Ok(names) = vfs.read_dir(&dir) else {
            continue;
        };
        for name in names {
            if scanned >= MAX_SCAN_FILES {
                return;
            }
            let child = if dir == "/" {
                format!("/{name}")
            } else {
                format!("{dir}/{name}")
            };
            let Ok(metadata) = vfs.lstat(&child) else {
                continue;
            };
            if metadata.is_dir() {
                if name != "node_modules" && !name.starts_with('.') {
                    stack.push(child);
                }
                continue;
            }
            if !metadata.is_file()
                || !SOURCE_EXTENSIONS
                    .iter()
                    .any(|ext| name.ends_with(&format!(".{ext}")))
            {
                continue;
            }
            scanned += 1;

            let Ok(source) = vfs.read_to_string(&child) else {
                continue;
            };
            for capture in IMPORT_RE.captures_iter(&source) {
                let Some(specifier) = (1..=4).find_map(|i| capture.get(i)) else {
                    continue;
                };
                let Some((package, subpath)) = split_specifier(specifier.as_str()) else {
                    continue;
                };
                if subpath.is_empty() || !reported.insert((package.clone(), subpath.clone())) {
                    continue;
                }
                check_subpath(
                    vfs,
                    project_path,
                    &package,
                    &subpath,
                    &child,
                    options,
                    report,
                );
            }
        }
    }
}

fn check_subpath(
    vfs: &Vfs,
    project_path: &str,
    package: &str,
    subpath: &str,
    source_path: &str,
    options: &PreflightOptions<'_>,
    report: &mut PreflightReport,
) {
    let package_dir = format!("{project_path}/node_modules/{package}");
    let Ok(raw) = vfs.read_to_string(&format!("{package_dir}/package.json")) else {
        return;
    };
    let Ok(manifest) = serde_json::from_str::<Value>(&raw) else {
        return;
    };
    // Without an `exports` map, plain file resolution applies.
    let Some(exports) = manifest.get("exports") else {
        return;
    };
    if exports_cover(vfs, &package_dir, exports, subpath) {
        return;
    }

    push_issue(
        report,
        options,
        Issue {
            code: "preflight.exports.subpath-missing".to_string(),
            severity: Severity::Warning,
            message: format!("`{package}/{subpath}` is not covered by the `exports` of {package}"),
            path: Some(source_path.to_string()),
        },
    );
}

/// Whether an `exports` map covers `./{subpath}`, honoring `./*`-style
/// wildcard patterns when the substituted file exists.
fn exports_cover(vfs: &Vfs, package_dir: &str, exports: &Value, subpath: &str) -> bool {
    let Value::Object(map) = exports else {
        // A bare string or array of fallbacks only exposes the root.
        return false;
    };
    let want = format!("./{subpath}");
    if map.contains_key(&want) {
        return true;
    }
    for (key, target) in map {
        let Some((prefix, suffix)) = key.split_once('*') else {
            continue;
        };
        let Some(star) = want
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(suffix))
        else {
            continue;
        };
        let Some(pattern) = first_target_string(target) else {
            continue;
        };
        let resolved = pattern.replacen('*', star, 1);
        let resolved = resolved.trim_start_matches("./");
        if vfs.exists(&format!("{package_dir}/{resolved}")) {
            return true;
        }
    }
    false
}

fn first_target_string(value: &Value) -> Option<&str> {
    match value {
        Value::String(target) => Some(target),
        Value::Object(map) => map.values().find_map(first_target_string),
        Value::Array(values) => values.iter().find_map(first_target_string),
        _ => None,
    }
}

/// Split a bare specifier into package name and subpath. Relative,
/// absolute, and builtin specifiers return `None`.
fn split_specifier(specifier: &str) -> Option<(String, String)> {
    if specifier.starts_with('.') || specifier.starts_with('/') || specifier.starts_with("node:") {
        return None;
    }
    if let Some(rest) = specifier.strip_prefix('@') {
        let (scope, remainder) = rest.split_once('/')?;
        match remainder.split_once('/') {
            Some((name, subpath)) => Some((format!("@{scope}/{name}"), subpath.to_string())),
            None => Some((format!("@{scope}/{remainder}"), String::new())),
        }
    } else {
        match specifier.split_once('/') {
            Some((name, subpath)) => Some((name.to_string(), subpath.to_string())),
            None => Some((specifier.to_string(), String::new())),
        }
    }
}

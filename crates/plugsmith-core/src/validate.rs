//! Static checks on a compiled plugin directory (`plugsmith validate`)

use crate::compiler::{BACKEND_DIR, is_host_external};
use crate::manifest::{MANIFEST_FILE, is_authoring_source};
use crate::platform::{Platform, native_library_name};
use crate::{Error, Result};
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::LazyLock;

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)(?:\bimport\s*(?:[^'"();]*?\bfrom\s*)?|\bexport\s*[^'"();]*?\bfrom\s*|\bimport\s*\(\s*)['"]([^'"]+)['"]"#)
        .expect("import pattern is valid")
});

/// Findings of a validation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Bare module specifiers imported by `source` that the host does not
/// provide. Relative, absolute and URL imports are fine.
pub fn external_imports(source: &str) -> Vec<String> {
    let mut found: Vec<String> = IMPORT_RE
        .captures_iter(source)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .filter(|spec| {
            !(spec.starts_with('.')
                || spec.starts_with('/')
                || spec.contains("://")
                || is_host_external(spec))
        })
        .collect();
    found.sort();
    found.dedup();
    found
}

/// Check the compiled plugin at `dir`. Problems are collected in the
/// report; only I/O failures are returned as errors.
pub async fn validate_compiled(dir: &Path, platform: &Platform) -> Result<ValidationReport> {
    let mut report = ValidationReport::default();

    if !tokio::fs::metadata(dir).await.is_ok_and(|m| m.is_dir()) {
        return Err(Error::PluginNotFound(dir.display().to_string()));
    }

    let manifest_path = dir.join(MANIFEST_FILE);
    if !tokio::fs::try_exists(&manifest_path).await? {
        report.error(format!("missing {}", MANIFEST_FILE));
        return Ok(report);
    }

    let data = tokio::fs::read_to_string(&manifest_path).await?;
    let manifest: Value = match serde_json::from_str(&data) {
        Ok(value) => value,
        Err(e) => {
            report.error(format!("{} is not valid JSON: {}", MANIFEST_FILE, e));
            return Ok(report);
        }
    };

    for field in ["id", "name", "version", "entry"] {
        let present = manifest
            .get(field)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty());
        if !present {
            report.error(format!("{} is missing '{}'", MANIFEST_FILE, field));
        }
    }

    if let Some(entry) = manifest.get("entry").and_then(Value::as_str) {
        check_entry(dir, entry, &mut report).await?;
    }

    let permissions_empty = manifest
        .get("permissions")
        .and_then(Value::as_array)
        .is_none_or(|p| p.is_empty());
    if permissions_empty {
        report.warning("no permissions declared");
    }

    let backend_enabled = manifest
        .pointer("/backend/enabled")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if backend_enabled {
        if let Some(id) = manifest.get("id").and_then(Value::as_str) {
            let library = native_library_name(id, platform);
            let path = dir.join(BACKEND_DIR).join(&library);
            if !tokio::fs::try_exists(&path).await? {
                report.warning(format!(
                    "backend is enabled but {}/{} is missing for {}",
                    BACKEND_DIR, library, platform
                ));
            }
        }
    }

    Ok(report)
}

async fn check_entry(dir: &Path, entry: &str, report: &mut ValidationReport) -> Result<()> {
    if entry.trim().is_empty() {
        return Ok(());
    }
    if is_authoring_source(entry) {
        report.error(format!("entry '{}' has not been compiled", entry));
    }

    let path = dir.join(entry);
    if !tokio::fs::try_exists(&path).await? {
        report.error(format!("entry file not found: {}", entry));
        return Ok(());
    }

    let source = tokio::fs::read_to_string(&path).await?;
    let externals = external_imports(&source);
    if !externals.is_empty() {
        report.error(format!(
            "entry imports packages the host does not provide: {}",
            externals.join(", ")
        ));
    }
    Ok(())
}

//! New plugin scaffolding (`plugsmith create`)

use crate::compiler::{BACKEND_DIR, BACKEND_MANIFEST};
use crate::descriptor::DESCRIPTOR_FILE;
use crate::install::install_dir_name;
use crate::platform::library_crate_name;
use crate::{Error, Result};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

/// Options for [`create_plugin`]
#[derive(Debug, Clone, Default)]
pub struct ScaffoldOptions {
    /// Also generate a native backend crate
    pub backend: bool,
    pub author: Option<String>,
    pub description: Option<String>,
}

/// Create `<plugins_dir>/<name>/` with a descriptor, entry point and README,
/// plus a backend crate when requested. Returns the new directory.
pub async fn create_plugin(
    plugins_dir: &Path,
    name: &str,
    options: &ScaffoldOptions,
) -> Result<PathBuf> {
    validate_plugin_name(name)?;

    let dir = plugins_dir.join(install_dir_name(name));
    if tokio::fs::try_exists(&dir).await? {
        return Err(Error::InvalidInput(format!(
            "plugin directory already exists: {}",
            dir.display()
        )));
    }

    info!(plugin = name, dir = %dir.display(), "Creating plugin");
    tokio::fs::create_dir_all(&dir).await?;

    let mut descriptor = serde_json::to_string_pretty(&descriptor_json(name, options))?;
    descriptor.push('\n');
    tokio::fs::write(dir.join(DESCRIPTOR_FILE), descriptor).await?;
    tokio::fs::write(dir.join("index.ts"), entry_source(name)).await?;
    tokio::fs::write(dir.join("README.md"), readme(name, options.backend)).await?;

    if options.backend {
        let backend = dir.join(BACKEND_DIR);
        tokio::fs::create_dir_all(backend.join("src")).await?;
        tokio::fs::write(backend.join(BACKEND_MANIFEST), backend_manifest(name)).await?;
        tokio::fs::write(backend.join("src").join("lib.rs"), BACKEND_LIB).await?;
    }

    Ok(dir)
}

/// Plugin names are npm package names: lowercase, optionally scoped
pub fn validate_plugin_name(name: &str) -> Result<()> {
    let unscoped = match name.strip_prefix('@') {
        Some(scoped) => {
            let Some((scope, rest)) = scoped.split_once('/') else {
                return Err(Error::InvalidInput(format!(
                    "scoped name '{}' must look like @scope/name",
                    name
                )));
            };
            check_segment(name, scope)?;
            rest
        }
        None => name,
    };
    check_segment(name, unscoped)
}

fn check_segment(name: &str, segment: &str) -> Result<()> {
    let valid = !segment.is_empty()
        && !segment.starts_with('.')
        && !segment.starts_with('_')
        && segment
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "invalid plugin name '{}': use lowercase letters, digits, '-', '_' or '.'",
            name
        )))
    }
}

fn descriptor_json(name: &str, options: &ScaffoldOptions) -> serde_json::Value {
    json!({
        "name": name,
        "version": "1.0.0",
        "displayName": name,
        "description": options.description.clone().unwrap_or_default(),
        "author": options.author.clone().unwrap_or_default(),
        "main": "index.ts",
        "permissions": ["hook:component"],
        "pluginDependencies": {},
        "backend": { "enabled": options.backend },
        "config": {}
    })
}

fn entry_source(name: &str) -> String {
    format!(
        r#"export default {{
  name: '{name}',
  version: '1.0.0',

  async onLoad(context) {{
    context.debug('{name} loaded')
  }},

  async onUnload(context) {{
    context.debug('{name} unloaded')
  }}
}}
"#
    )
}

fn readme(name: &str, backend: bool) -> String {
    let mut readme = format!(
        "# {name}\n\n## Development\n\n```bash\nplugsmith build {name}\nplugsmith package dist/plugins/{dir}\n```\n",
        dir = install_dir_name(name)
    );
    if backend {
        readme.push_str(
            "\nThe native backend lives in `backend/` and is built with `cargo build --release`.\n",
        );
    }
    readme
}

fn backend_manifest(name: &str) -> String {
    let lib = library_crate_name(name);
    format!(
        r#"[package]
name = "{package}"
version = "1.0.0"
edition = "2021"

[lib]
name = "{lib}"
crate-type = ["cdylib"]

[dependencies]
"#,
        package = lib.replace('_', "-"),
    )
}

const BACKEND_LIB: &str = r#"use std::ffi::{c_char, CStr, CString};

#[no_mangle]
pub extern "C" fn plugin_init() {}

#[no_mangle]
pub extern "C" fn plugin_cleanup() {}

#[no_mangle]
pub extern "C" fn plugin_health_check() -> bool {
    true
}

/// Echo the JSON argument back to the host
#[no_mangle]
pub extern "C" fn plugin_echo(args: *const c_char) -> *mut c_char {
    if args.is_null() {
        return std::ptr::null_mut();
    }
    let input = unsafe { CStr::from_ptr(args) }.to_string_lossy().into_owned();
    CString::new(input).map(CString::into_raw).unwrap_or(std::ptr::null_mut())
}

#[no_mangle]
pub extern "C" fn plugin_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe { drop(CString::from_raw(ptr)) };
    }
}
"#;

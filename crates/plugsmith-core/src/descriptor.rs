//! Author-supplied plugin descriptor (`package.json`)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};

/// File name of the build descriptor in both source and compiled trees
pub const DESCRIPTOR_FILE: &str = "package.json";

/// Fields stripped from the compiled copy of the descriptor
const DEV_ONLY_FIELDS: &[&str] = &["devDependencies", "scripts"];

/// Plugin metadata as written by the plugin author
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<Person>,
    #[serde(default)]
    pub homepage: Option<String>,
    /// Entry path, in authoring form (`index.ts` is fine here)
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub plugin_dependencies: Map<String, Value>,
    /// Regular package dependencies, reported in archive metadata
    #[serde(default)]
    pub dependencies: Map<String, Value>,
    #[serde(default)]
    pub backend: Option<BackendSpec>,
    #[serde(default)]
    pub config: Map<String, Value>,
}

/// npm-style person field: either `"Name <mail> (url)"` or an object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Person {
    Name(String),
    Detailed {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{}", name),
            Self::Detailed { name, email, url } => {
                write!(f, "{}", name)?;
                if let Some(email) = email {
                    write!(f, " <{}>", email)?;
                }
                if let Some(url) = url {
                    write!(f, " ({})", url)?;
                }
                Ok(())
            }
        }
    }
}

/// `backend` block of the descriptor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendSpec {
    #[serde(default)]
    pub enabled: bool,
    /// Anything else the author put in the block is carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PluginDescriptor {
    /// Check the fields every later stage depends on
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::MissingField("name"));
        }
        if self.version.trim().is_empty() {
            return Err(Error::MissingField("version"));
        }
        Ok(())
    }

    pub fn author_string(&self) -> String {
        self.author.as_ref().map(|a| a.to_string()).unwrap_or_default()
    }
}

/// A descriptor read from disk, keeping the raw JSON object so that fields
/// this crate does not model survive into the compiled copy
#[derive(Debug, Clone)]
pub struct DescriptorFile {
    pub path: PathBuf,
    pub descriptor: PluginDescriptor,
    pub raw: Map<String, Value>,
}

impl DescriptorFile {
    /// Read `package.json` from `dir`
    pub async fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(DESCRIPTOR_FILE);
        if !tokio::fs::try_exists(&path).await? {
            return Err(Error::MissingFile(DESCRIPTOR_FILE.to_string()));
        }

        let data = tokio::fs::read_to_string(&path).await?;
        Self::parse(path, &data)
    }

    pub fn parse(path: PathBuf, data: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(data).map_err(|e| Error::InvalidDescriptor {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let Value::Object(raw) = value else {
            return Err(Error::InvalidDescriptor {
                path,
                reason: "top-level value must be an object".to_string(),
            });
        };

        let descriptor: PluginDescriptor = serde_json::from_value(Value::Object(raw.clone()))
            .map_err(|e| Error::InvalidDescriptor {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            path,
            descriptor,
            raw,
        })
    }

    /// Descriptor copy shipped with the compiled plugin: dev-only fields
    /// removed, `main` pointing at the compiled entry, module type fixed
    pub fn trimmed(&self) -> Map<String, Value> {
        let mut trimmed = self.raw.clone();
        for field in DEV_ONLY_FIELDS {
            trimmed.remove(*field);
        }

        let main = self
            .descriptor
            .main
            .as_deref()
            .map(crate::manifest::normalize_entry)
            .unwrap_or_else(|| crate::manifest::DEFAULT_ENTRY.to_string());
        trimmed.insert("main".to_string(), Value::String(main));
        trimmed.insert("type".to_string(), Value::String("module".to_string()));
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> DescriptorFile {
        DescriptorFile::parse(PathBuf::from("package.json"), json).expect("parse descriptor")
    }

    #[test]
    fn test_parse_full_descriptor() {
        let file = parse(
            r#"{
                "name": "bilibili-emoji",
                "version": "1.2.0",
                "displayName": "Bilibili Emoji",
                "author": {"name": "Ada", "email": "ada@example.com"},
                "main": "index.ts",
                "permissions": ["network"],
                "pluginDependencies": {"core-tools": "^1.0.0"},
                "backend": {"enabled": true, "entry": "lib"},
                "config": {"size": 64}
            }"#,
        );

        let d = &file.descriptor;
        assert_eq!(d.name, "bilibili-emoji");
        assert_eq!(d.display_name.as_deref(), Some("Bilibili Emoji"));
        assert_eq!(d.author_string(), "Ada <ada@example.com>");
        assert_eq!(d.permissions, vec!["network".to_string()]);
        let backend = d.backend.as_ref().expect("backend block");
        assert!(backend.enabled);
        assert_eq!(backend.extra.get("entry"), Some(&Value::from("lib")));
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_missing_version_fails_validation() {
        let file = parse(r#"{"name": "x"}"#);
        let err = file.descriptor.validate().unwrap_err();
        assert!(matches!(err, Error::MissingField("version")));
    }

    #[test]
    fn test_blank_name_fails_validation() {
        let file = parse(r#"{"name": "  ", "version": "1.0.0"}"#);
        assert!(matches!(
            file.descriptor.validate(),
            Err(Error::MissingField("name"))
        ));
    }

    #[test]
    fn test_non_object_descriptor_is_rejected() {
        let err = DescriptorFile::parse(PathBuf::from("package.json"), "[1, 2]").unwrap_err();
        assert!(matches!(err, Error::InvalidDescriptor { .. }));
    }

    #[test]
    fn test_trimmed_removes_dev_fields_and_keeps_unknown_ones() {
        let file = parse(
            r#"{
                "name": "x",
                "version": "1.0.0",
                "main": "src/index.ts",
                "scripts": {"build": "tsc"},
                "devDependencies": {"typescript": "5"},
                "keywords": ["pet"]
            }"#,
        );

        let trimmed = file.trimmed();
        assert!(!trimmed.contains_key("scripts"));
        assert!(!trimmed.contains_key("devDependencies"));
        assert_eq!(trimmed["main"], "src/index.js");
        assert_eq!(trimmed["type"], "module");
        assert_eq!(trimmed["keywords"], serde_json::json!(["pet"]));
    }

    #[test]
    fn test_trimmed_defaults_main() {
        let file = parse(r#"{"name": "x", "version": "1.0.0"}"#);
        assert_eq!(file.trimmed()["main"], "index.js");
    }

    #[tokio::test]
    async fn test_load_missing_descriptor() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = DescriptorFile::load(dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::MissingFile(ref f) if f == "package.json"));
    }
}

//! The Composer manifest (`composer.json`).
//!
//! The document is kept as an order-preserving JSON value so that saving it
//! only changes what was edited. Synchronization only touches `require`.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::runtime::Runtime;

pub const MANIFEST_FILE: &str = "composer.json";

#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    document: Map<String, Value>,
}

/// A `repositories` entry of type `composer`.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryEntry {
    pub url: String,
}

impl Manifest {
    pub fn parse(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content).context("composer.json is not valid JSON")?;
        match value {
            Value::Object(document) => Ok(Self { document }),
            _ => bail!("composer.json must contain a JSON object"),
        }
    }

    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let content = runtime
            .read_to_string(path)
            .with_context(|| format!("Failed to read manifest {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Failed to parse manifest {:?}", path))
    }

    /// The version constraint required for `package`, if any.
    pub fn requirement(&self, package: &str) -> Option<&str> {
        self.document
            .get("require")
            .and_then(Value::as_object)
            .and_then(|require| require.get(package))
            .and_then(Value::as_str)
    }

    pub fn has_requirement(&self, package: &str) -> bool {
        self.document
            .get("require")
            .and_then(Value::as_object)
            .is_some_and(|require| require.contains_key(package))
    }

    /// All `require` entries in document order.
    pub fn requirements(&self) -> Vec<(String, String)> {
        self.document
            .get("require")
            .and_then(Value::as_object)
            .map(|require| {
                require
                    .iter()
                    .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Add a requirement unless one already exists for `package`.
    /// Returns whether the manifest changed.
    pub fn add_requirement(&mut self, package: &str, constraint: &str) -> bool {
        if self.has_requirement(package) {
            return false;
        }
        let require = self
            .document
            .entry("require")
            .or_insert_with(|| Value::Object(Map::new()));
        if !require.is_object() {
            *require = Value::Object(Map::new());
        }
        if let Value::Object(require) = require {
            require.insert(package.to_string(), Value::String(constraint.to_string()));
        }
        true
    }

    /// Remove the requirement for `package`. Returns whether it existed.
    pub fn remove_requirement(&mut self, package: &str) -> bool {
        self.document
            .get_mut("require")
            .and_then(Value::as_object_mut)
            .and_then(|require| require.shift_remove(package))
            .is_some()
    }

    /// `extra.<key>`, used for project layout settings.
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.document
            .get("extra")
            .and_then(Value::as_object)
            .and_then(|extra| extra.get(key))
    }

    /// `config.vendor-dir`, when set.
    pub fn vendor_dir(&self) -> Option<&str> {
        self.document
            .get("config")
            .and_then(Value::as_object)
            .and_then(|config| config.get("vendor-dir"))
            .and_then(Value::as_str)
    }

    /// Composer repositories in declaration order. The second value is false
    /// when the manifest disables packagist.org.
    pub fn repositories(&self) -> (Vec<RepositoryEntry>, bool) {
        let mut entries = Vec::new();
        let mut packagist = true;

        let items: Vec<&Value> = match self.document.get("repositories") {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(Value::Object(items)) => {
                if items.get("packagist.org") == Some(&Value::Bool(false))
                    || items.get("packagist") == Some(&Value::Bool(false))
                {
                    packagist = false;
                }
                items.values().collect()
            }
            _ => Vec::new(),
        };

        for item in items {
            let Some(object) = item.as_object() else {
                continue;
            };
            if object.get("packagist.org") == Some(&Value::Bool(false))
                || object.get("packagist") == Some(&Value::Bool(false))
            {
                packagist = false;
                continue;
            }
            if object.get("type").and_then(Value::as_str) == Some("composer")
                && let Some(url) = object.get("url").and_then(Value::as_str)
            {
                entries.push(RepositoryEntry {
                    url: url.trim_end_matches('/').to_string(),
                });
            }
        }

        (entries, packagist)
    }

    /// Serialize the way Composer writes the file: four-space indent and a
    /// trailing newline.
    pub fn to_pretty_string(&self) -> Result<String> {
        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.document.serialize(&mut serializer)?;
        buffer.push(b'\n');
        Ok(String::from_utf8(buffer)?)
    }

    /// SHA-256 of the serialized document, for change detection.
    pub fn content_hash(&self) -> Result<String> {
        let content = self.to_pretty_string()?;
        Ok(format!("{:x}", Sha256::digest(content.as_bytes())))
    }

    /// Write the manifest when its hash differs from `baseline_hash`.
    /// Returns whether the file was written.
    #[tracing::instrument(skip(self, runtime, baseline_hash))]
    pub fn save_if_changed<R: Runtime>(
        &self,
        runtime: &R,
        path: &Path,
        baseline_hash: &str,
    ) -> Result<bool> {
        if self.content_hash()? == baseline_hash {
            tracing::debug!("Manifest unchanged, not writing {:?}", path);
            return Ok(false);
        }
        runtime
            .write(path, self.to_pretty_string()?.as_bytes())
            .with_context(|| format!("Failed to save manifest {:?}", path))?;
        Ok(true)
    }
}

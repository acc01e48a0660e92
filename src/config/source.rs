//! Specification sources
//!
//! Every kind of source is normalized to a JSON mapping before it reaches
//! the merger. Text and files use TOML; files ending in `.json` are read as
//! JSON.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::merge::ensure_mapping;
use super::provenance::{digest_bytes, digest_value, SourceOrigin, SourceRecord};
use crate::cfspecs::CfSpecs;
use crate::error::CfError;

/// A source of specifications
#[derive(Debug, Clone)]
pub enum SpecsSource {
    /// An in-memory nested mapping
    Mapping(Value),
    /// Configuration text
    Text(String),
    /// Path to a configuration file
    Path(PathBuf),
    /// Resolved categories of an existing instance
    Specs(Box<CfSpecs>),
    /// Several sources, lowest priority first
    List(Vec<SpecsSource>),
}

/// A source normalized to a mapping, with its provenance
#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub value: Value,
    pub record: SourceRecord,
}

impl SpecsSource {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Normalize to mappings, flattening lists in priority order
    pub fn load(self) -> Result<Vec<LoadedSource>, CfError> {
        match self {
            SpecsSource::Mapping(value) => {
                ensure_mapping(&value, "mapping source")?;
                let digest = digest_value(&value)?;
                Ok(vec![LoadedSource::new(value, SourceOrigin::Mapping, None, digest)])
            }
            SpecsSource::Text(text) => {
                let value = parse_toml(&text, "config text")?;
                let digest = digest_bytes(text.as_bytes());
                Ok(vec![LoadedSource::new(value, SourceOrigin::Text, None, digest)])
            }
            SpecsSource::Path(path) => Ok(vec![load_file(&path, SourceOrigin::File)?]),
            SpecsSource::Specs(specs) => {
                let value = specs.to_mapping();
                let digest = digest_value(&value)?;
                Ok(vec![LoadedSource::new(value, SourceOrigin::Specs, None, digest)])
            }
            SpecsSource::List(sources) => {
                let mut loaded = Vec::new();
                for source in sources {
                    loaded.extend(source.load()?);
                }
                Ok(loaded)
            }
        }
    }
}

impl LoadedSource {
    pub(crate) fn new(
        value: Value,
        origin: SourceOrigin,
        path: Option<String>,
        digest: String,
    ) -> Self {
        Self {
            value,
            record: SourceRecord {
                origin,
                path,
                digest,
            },
        }
    }
}

impl From<Value> for SpecsSource {
    fn from(value: Value) -> Self {
        SpecsSource::Mapping(value)
    }
}

impl From<PathBuf> for SpecsSource {
    fn from(path: PathBuf) -> Self {
        SpecsSource::Path(path)
    }
}

impl From<&Path> for SpecsSource {
    fn from(path: &Path) -> Self {
        SpecsSource::Path(path.to_path_buf())
    }
}

impl From<CfSpecs> for SpecsSource {
    fn from(specs: CfSpecs) -> Self {
        SpecsSource::Specs(Box::new(specs))
    }
}

impl From<&CfSpecs> for SpecsSource {
    fn from(specs: &CfSpecs) -> Self {
        SpecsSource::Specs(Box::new(specs.clone()))
    }
}

impl From<Vec<SpecsSource>> for SpecsSource {
    fn from(sources: Vec<SpecsSource>) -> Self {
        SpecsSource::List(sources)
    }
}

/// Read a file source, recording its path and digest
pub(crate) fn load_file(path: &Path, origin: SourceOrigin) -> Result<LoadedSource, CfError> {
    let bytes = fs::read(path).map_err(|source| CfError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let digest = digest_bytes(&bytes);

    let contents = String::from_utf8(bytes)
        .map_err(|e| CfError::Config(format!("{}: invalid UTF-8: {}", path.display(), e)))?;

    let what = path.display().to_string();
    let value = if path.extension().is_some_and(|ext| ext == "json") {
        let value: Value = serde_json::from_str(&contents)
            .map_err(|e| CfError::Config(format!("{}: JSON parse error: {}", what, e)))?;
        ensure_mapping(&value, &what)?;
        value
    } else {
        parse_toml(&contents, &what)?
    };

    Ok(LoadedSource::new(
        value,
        origin,
        Some(path.to_string_lossy().to_string()),
        digest,
    ))
}

/// Parse TOML text into a JSON mapping
pub(crate) fn parse_toml(text: &str, what: &str) -> Result<Value, CfError> {
    let table: toml::Table = toml::from_str(text)
        .map_err(|e| CfError::Config(format!("{}: TOML parse error: {}", what, e)))?;
    Ok(toml_to_json(toml::Value::Table(table)))
}

/// Convert TOML Value to JSON Value
fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            Value::Object(map)
        }
    }
}

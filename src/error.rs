//! Error taxonomy
//!
//! Structural problems (malformed sources, inheritance cycles, unknown
//! references) surface eagerly when specs are built. "Not found" is never an
//! error: matching and searching return `None` for it.

use std::io;
use std::path::PathBuf;

use cf_array::ArrayError;

#[derive(Debug, thiserror::Error)]
pub enum CfError {
    /// Malformed source structure
    #[error("Config error: {0}")]
    Config(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cyclic inheritance in {category}: {}", .cycle.join(" -> "))]
    CyclicInheritance { category: String, cycle: Vec<String> },

    /// Reference to a nonexistent id, category or registry name
    #[error("Unknown {kind}: '{name}'")]
    UnknownSpec { kind: &'static str, name: String },

    /// Unrecognized field value in a specification
    #[error("Invalid spec: {0}")]
    InvalidSpec(String),

    #[error("Cannot squeeze dimension '{dim}' of size {size}")]
    Shape { dim: String, size: usize },

    #[error("Registration error: {0}")]
    Registration(String),

    /// Failure raised while applying a selection to array values
    #[error("Data error: {0}")]
    Data(#[from] ArrayError),
}

impl CfError {
    pub(crate) fn unknown(kind: &'static str, name: impl Into<String>) -> Self {
        Self::UnknownSpec {
            kind,
            name: name.into(),
        }
    }
}

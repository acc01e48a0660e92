//! Provenance of the sources that built a set of specs
//!
//! Kept for merge diagnostics only: nothing in matching or formatting
//! depends on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::CfError;

/// Origin of a contributing source
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceOrigin {
    Builtin,
    User,
    Mapping,
    Text,
    File,
    Specs,
}

/// A contributing source with provenance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceRecord {
    /// Origin of this source
    pub origin: SourceOrigin,

    /// File path (None unless read from disk)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of the raw bytes, or of the canonical JSON for mappings
    pub digest: String,
}

/// Sources of a set of specs in precedence order, lowest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecsProvenance {
    /// When the specs were last rebuilt
    pub created_at: DateTime<Utc>,

    /// Contributing sources
    pub sources: Vec<SourceRecord>,
}

impl SpecsProvenance {
    pub fn new(sources: Vec<SourceRecord>) -> Self {
        Self {
            created_at: Utc::now(),
            sources,
        }
    }

    pub fn origins(&self) -> Vec<SourceOrigin> {
        self.sources.iter().map(|s| s.origin).collect()
    }
}

/// Hex SHA-256 of raw bytes
pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hex SHA-256 of the JCS (RFC 8785) form of a mapping
pub fn digest_value(value: &Value) -> Result<String, CfError> {
    let jcs_bytes = serde_json_canonicalizer::to_vec(value)
        .map_err(|e| CfError::Config(format!("Cannot canonicalize mapping: {}", e)))?;
    Ok(digest_bytes(&jcs_bytes))
}

//! Typed positional selection

use cf_array::{ArrayError, DataArray};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Dimension name to selector, applied in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection(pub IndexMap<String, Selector>);

/// Positional selector along one dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selector {
    /// Single position; the dimension is dropped
    Index(i64),
    /// Half-open range; the dimension is kept
    Slice(SliceSpec),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SliceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<i64>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn apply(&self, array: &DataArray) -> Result<DataArray, ArrayError> {
        let mut out = array.clone();
        for (dim, selector) in &self.0 {
            out = match selector {
                Selector::Index(index) => out.isel_index(dim, *index)?,
                Selector::Slice(s) => out.isel_slice(dim, s.start, s.stop, s.step)?,
            };
        }
        Ok(out)
    }
}

//! Dataset type: data variables plus shared coordinates.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::array::{fill_names, Attrs, DataArray};
use crate::error::ArrayError;

/// A collection of named data variables sharing coordinates.
///
/// Keys and array names are kept in sync by the constructors; use
/// [`Dataset::normalized`] after deserializing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    /// Data variables in declaration order
    #[serde(default)]
    pub data_vars: IndexMap<String, DataArray>,

    /// Dataset-level coordinates in declaration order
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub coords: IndexMap<String, DataArray>,

    /// Global attributes
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attrs: Attrs,

    /// Storage encoding hints
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub encoding: Attrs,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a data variable, keyed by its name
    pub fn with_data_var(mut self, array: DataArray) -> Self {
        let key = array.name.clone().unwrap_or_default();
        self.data_vars.insert(key, array);
        self
    }

    /// Add a dataset-level coordinate, keyed by its name
    pub fn with_coord(mut self, coord: DataArray) -> Self {
        let key = coord.name.clone().unwrap_or_default();
        self.coords.insert(key, coord);
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn with_encoding(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.encoding.insert(key.into(), value.into());
        self
    }

    pub fn data_var(&self, name: &str) -> Option<&DataArray> {
        self.data_vars.get(name)
    }

    pub fn coord(&self, name: &str) -> Option<&DataArray> {
        self.coords.get(name)
    }

    /// All dimensions with their sizes, in order of first appearance
    pub fn dims(&self) -> IndexMap<String, usize> {
        let mut dims = IndexMap::new();
        for array in self.data_vars.values().chain(self.coords.values()) {
            for dim in &array.dims {
                dims.entry(dim.name.clone()).or_insert(dim.size);
            }
        }
        dims
    }

    /// Fill missing array names from their keys
    pub fn normalized(mut self) -> Self {
        self.data_vars = fill_names(self.data_vars);
        self.coords = fill_names(self.coords);
        self
    }

    /// Validate every array and check dimension sizes agree across arrays
    pub fn validate(&self) -> Result<(), ArrayError> {
        let mut sizes: IndexMap<&str, usize> = IndexMap::new();
        for array in self.data_vars.values().chain(self.coords.values()) {
            array.validate()?;
            for dim in &array.dims {
                match sizes.get(dim.name.as_str()) {
                    Some(&size) if size != dim.size => {
                        return Err(ArrayError::DimSizeConflict {
                            dim: dim.name.clone(),
                            left: size,
                            right: dim.size,
                        });
                    }
                    Some(_) => {}
                    None => {
                        sizes.insert(dim.name.as_str(), dim.size);
                    }
                }
            }
        }
        Ok(())
    }

    /// Rename a dimension on every array of the dataset
    pub fn rename_dim(&mut self, old: &str, new: &str) {
        for array in self.data_vars.values_mut().chain(self.coords.values_mut()) {
            array.rename_dim(old, new);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Dataset {
        Dataset::new()
            .with_data_var(
                DataArray::new("temp")
                    .with_dims([("time", 2), ("x", 3)])
                    .with_values(vec![0.0; 6]),
            )
            .with_coord(DataArray::new("x").with_dims([("x", 3)]))
            .with_attr("title", "test")
    }

    #[test]
    fn test_dims_in_order() {
        let dims = dataset().dims();
        let names: Vec<&String> = dims.keys().collect();
        assert_eq!(names, vec!["time", "x"]);
        assert_eq!(dims["x"], 3);
    }

    #[test]
    fn test_validate_conflicting_sizes() {
        let ds = dataset().with_coord(DataArray::new("xx").with_dims([("x", 4)]));
        assert!(matches!(
            ds.validate(),
            Err(ArrayError::DimSizeConflict { .. })
        ));
    }

    #[test]
    fn test_rename_dim() {
        let mut ds = dataset();
        ds.rename_dim("x", "lon");
        assert!(ds.data_vars["temp"].has_dim("lon"));
        assert!(ds.coords["x"].has_dim("lon"));
    }

    #[test]
    fn test_normalized_fills_names() {
        let ds: Dataset = serde_json::from_str(
            r#"{"data_vars": {"sst": {"dims": [{"name": "x", "size": 2}],
                "coords": {"x": {"dims": [{"name": "x", "size": 2}]}}}}}"#,
        )
        .unwrap();
        let ds = ds.normalized();
        assert_eq!(ds.data_vars["sst"].name(), Some("sst"));
        assert_eq!(ds.data_vars["sst"].coords["x"].name(), Some("x"));
    }
}

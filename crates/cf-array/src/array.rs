//! Labeled array type.
//!
//! Values are stored flat in row-major order. An empty value vector marks a
//! metadata-only array: dimension operations still apply to its shape.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ArrayError;

/// Free-form attribute mapping, kept in insertion order.
pub type Attrs = IndexMap<String, Value>;

/// A named dimension with its length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dim {
    pub name: String,
    pub size: usize,
}

impl Dim {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// A labeled array: name, dimensions, values, attributes and coordinates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataArray {
    /// Array name (None for anonymous arrays)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Ordered dimensions
    #[serde(default)]
    pub dims: Vec<Dim>,

    /// Row-major values (empty for metadata-only arrays)
    #[serde(default)]
    pub values: Vec<f64>,

    /// Descriptive attributes
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attrs: Attrs,

    /// Storage encoding hints
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub encoding: Attrs,

    /// Coordinate arrays attached to this array
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub coords: IndexMap<String, DataArray>,
}

impl DataArray {
    /// Create an empty array with a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Create an empty anonymous array
    pub fn unnamed() -> Self {
        Self::default()
    }

    pub fn with_dims<I, S>(mut self, dims: I) -> Self
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        self.dims = dims.into_iter().map(|(n, s)| Dim::new(n, s)).collect();
        self
    }

    pub fn with_values(mut self, values: Vec<f64>) -> Self {
        self.values = values;
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

    /// Attach a coordinate, keyed by its name
    pub fn with_coord(mut self, coord: DataArray) -> Self {
        let key = coord.name.clone().unwrap_or_default();
        self.coords.insert(key, coord);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Get a string attribute (non-string values are ignored)
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Value::as_str)
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attrs.insert(key.into(), value.into());
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.dims.iter().map(|d| d.size).collect()
    }

    pub fn dim_names(&self) -> impl Iterator<Item = &str> {
        self.dims.iter().map(|d| d.name.as_str())
    }

    pub fn has_dim(&self, dim: &str) -> bool {
        self.dims.iter().any(|d| d.name == dim)
    }

    pub fn size_of(&self, dim: &str) -> Option<usize> {
        self.dims.iter().find(|d| d.name == dim).map(|d| d.size)
    }

    fn dim_position(&self, dim: &str) -> Result<usize, ArrayError> {
        self.dims
            .iter()
            .position(|d| d.name == dim)
            .ok_or_else(|| ArrayError::UnknownDim(dim.to_string()))
    }

    /// Check that values fit the shape and coordinates agree on sizes
    pub fn validate(&self) -> Result<(), ArrayError> {
        if !self.values.is_empty() {
            let expected: usize = self.shape().iter().product();
            if expected != self.values.len() {
                return Err(ArrayError::ShapeMismatch {
                    expected,
                    actual: self.values.len(),
                });
            }
        }

        for coord in self.coords.values() {
            coord.validate()?;
            for dim in &coord.dims {
                if let Some(size) = self.size_of(&dim.name) {
                    if size != dim.size {
                        return Err(ArrayError::DimSizeConflict {
                            dim: dim.name.clone(),
                            left: size,
                            right: dim.size,
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Select a single position along a dimension, removing it.
    ///
    /// Negative indices count from the end.
    pub fn isel_index(&self, dim: &str, index: i64) -> Result<DataArray, ArrayError> {
        self.validate()?;
        let pos = self.dim_position(dim)?;
        let size = self.dims[pos].size;
        let resolved = resolve_index(dim, index, size)?;

        let mut out = self.take_along(pos, &[resolved]);
        out.dims.remove(pos);
        out.coords = self.map_coords(dim, |c| c.isel_index(dim, index))?;
        Ok(out)
    }

    /// Select a positional slice along a dimension, keeping it.
    ///
    /// Bounds follow the usual half-open slice rules, with negative values
    /// counted from the end and out-of-range bounds clamped.
    pub fn isel_slice(
        &self,
        dim: &str,
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    ) -> Result<DataArray, ArrayError> {
        self.validate()?;
        let pos = self.dim_position(dim)?;
        let indices = slice_indices(dim, self.dims[pos].size, start, stop, step)?;

        let mut out = self.take_along(pos, &indices);
        out.coords = self.map_coords(dim, |c| c.isel_slice(dim, start, stop, step))?;
        Ok(out)
    }

    /// Remove a dimension of size one
    pub fn squeeze_dim(&self, dim: &str) -> Result<DataArray, ArrayError> {
        let pos = self.dim_position(dim)?;
        let size = self.dims[pos].size;
        if size != 1 {
            return Err(ArrayError::NotSizeOne {
                dim: dim.to_string(),
                size,
            });
        }

        let mut out = self.clone();
        out.dims.remove(pos);
        out.coords = self.map_coords(dim, |c| c.squeeze_dim(dim))?;
        Ok(out)
    }

    /// Rename a dimension here and in every coordinate using it
    pub fn rename_dim(&mut self, old: &str, new: &str) {
        for dim in self.dims.iter_mut().filter(|d| d.name == old) {
            dim.name = new.to_string();
        }
        for coord in self.coords.values_mut() {
            coord.rename_dim(old, new);
        }
    }

    /// Fill missing coordinate names from their keys
    pub fn normalized(mut self) -> Self {
        self.coords = fill_names(self.coords);
        self
    }

    /// Copy of self keeping only `indices` along dimension `pos`
    fn take_along(&self, pos: usize, indices: &[usize]) -> DataArray {
        let mut out = self.clone();
        out.dims[pos].size = indices.len();

        if !self.values.is_empty() {
            let shape = self.shape();
            let outer: usize = shape[..pos].iter().product();
            let inner: usize = shape[pos + 1..].iter().product();
            let len = shape[pos];

            let mut values = Vec::with_capacity(outer * indices.len() * inner);
            for o in 0..outer {
                for &i in indices {
                    let offset = (o * len + i) * inner;
                    values.extend_from_slice(&self.values[offset..offset + inner]);
                }
            }
            out.values = values;
        }

        out
    }

    fn map_coords<F>(&self, dim: &str, op: F) -> Result<IndexMap<String, DataArray>, ArrayError>
    where
        F: Fn(&DataArray) -> Result<DataArray, ArrayError>,
    {
        self.coords
            .iter()
            .map(|(key, coord)| {
                let coord = if coord.has_dim(dim) {
                    op(coord)?
                } else {
                    coord.clone()
                };
                Ok((key.clone(), coord))
            })
            .collect()
    }
}

/// Set each array's name to its key when it has none
pub(crate) fn fill_names(arrays: IndexMap<String, DataArray>) -> IndexMap<String, DataArray> {
    arrays
        .into_iter()
        .map(|(key, mut array)| {
            if array.name.is_none() {
                array.name = Some(key.clone());
            }
            (key, array.normalized())
        })
        .collect()
}

fn resolve_index(dim: &str, index: i64, size: usize) -> Result<usize, ArrayError> {
    let len = size as i64;
    let resolved = if index < 0 { index + len } else { index };
    if resolved < 0 || resolved >= len {
        return Err(ArrayError::IndexOutOfRange {
            dim: dim.to_string(),
            index,
            size,
        });
    }
    Ok(resolved as usize)
}

fn slice_indices(
    dim: &str,
    size: usize,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> Result<Vec<usize>, ArrayError> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(ArrayError::ZeroStep(dim.to_string()));
    }

    let len = size as i64;
    let (lower, upper) = if step > 0 { (0, len) } else { (-1, len - 1) };
    let clamp = |bound: i64| {
        if bound < 0 {
            (bound + len).max(lower)
        } else {
            bound.min(upper)
        }
    };
    let start = start.map(clamp).unwrap_or(if step > 0 { lower } else { upper });
    let stop = stop.map(clamp).unwrap_or(if step > 0 { upper } else { lower });

    let mut indices = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        indices.push(i as usize);
        i += step;
    }
    Ok(indices)
}

//! Labeled arrays and datasets
//!
//! A minimal in-memory container model: named arrays carrying dimensions,
//! flat row-major values, free-form attributes and coordinate arrays, plus
//! datasets grouping data variables and shared coordinates.

pub mod array;
pub mod dataset;
pub mod error;

pub use array::{Attrs, DataArray, Dim};
pub use dataset::Dataset;
pub use error::ArrayError;

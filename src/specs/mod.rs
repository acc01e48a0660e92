//! Specification data model
//!
//! A record describes one physical quantity; a category holds the resolved
//! records of either data variables or coordinates.

mod category;
mod record;
mod select;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CfError;

pub use category::SpecCategory;
pub use record::{SearchCode, SearchOrder, SpecRecord};
pub use select::{Selection, Selector, SliceSpec};

/// Specification category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    DataVars,
    Coords,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::DataVars, Category::Coords];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::DataVars => "data_vars",
            Category::Coords => "coords",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = CfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "data_vars" => Ok(Category::DataVars),
            "coords" => Ok(Category::Coords),
            other => Err(CfError::unknown("category", other)),
        }
    }
}

/// Coordinate axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
    T,
    F,
}

impl Axis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
            Axis::T => "T",
            Axis::F => "F",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Axis {
    type Err = CfError;

    /// Case-insensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "X" => Ok(Axis::X),
            "Y" => Ok(Axis::Y),
            "Z" => Ok(Axis::Z),
            "T" => Ok(Axis::T),
            "F" => Ok(Axis::F),
            _ => Err(CfError::InvalidSpec(format!(
                "invalid axis '{}', expected one of X, Y, Z, T, F",
                s
            ))),
        }
    }
}

/// Descriptive domain of a quantity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    #[default]
    Generic,
    Atmos,
    Ocean,
    Surface,
}

//! Resolved specification record

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{Axis, Domain, Selection};
use crate::error::CfError;

/// One probe kind of a search order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchCode {
    /// `n`: array name
    Name,
    /// `s`: `standard_name` attribute
    StandardName,
    /// `u`: `units` attribute
    Units,
}

impl SearchCode {
    pub fn from_char(c: char) -> Result<Self, CfError> {
        match c {
            'n' => Ok(SearchCode::Name),
            's' => Ok(SearchCode::StandardName),
            'u' => Ok(SearchCode::Units),
            other => Err(CfError::InvalidSpec(format!(
                "unknown search code '{}', expected n, s or u",
                other
            ))),
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            SearchCode::Name => 'n',
            SearchCode::StandardName => 's',
            SearchCode::Units => 'u',
        }
    }

    /// Attribute probed by this code, None for the array name
    pub fn attr(&self) -> Option<&'static str> {
        match self {
            SearchCode::Name => None,
            SearchCode::StandardName => Some("standard_name"),
            SearchCode::Units => Some("units"),
        }
    }
}

/// Ordered probe kinds, written as a string of codes such as `"sn"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SearchOrder(Vec<SearchCode>);

impl SearchOrder {
    pub fn codes(&self) -> &[SearchCode] {
        &self.0
    }
}

impl Default for SearchOrder {
    fn default() -> Self {
        Self(vec![SearchCode::StandardName, SearchCode::Name])
    }
}

impl FromStr for SearchOrder {
    type Err = CfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(CfError::InvalidSpec("empty search order".to_string()));
        }
        let codes = s
            .chars()
            .map(SearchCode::from_char)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(codes))
    }
}

impl TryFrom<String> for SearchOrder {
    type Error = CfError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SearchOrder> for String {
    fn from(order: SearchOrder) -> Self {
        order.to_string()
    }
}

impl fmt::Display for SearchOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for code in &self.0 {
            write!(f, "{}", code.as_char())?;
        }
        Ok(())
    }
}

/// A fully resolved specification of one physical quantity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecRecord {
    /// Canonical identifier, unique within its category
    #[serde(skip)]
    pub id: String,

    /// Candidate names, canonical first (never empty)
    #[serde(rename = "name")]
    pub names: Vec<String>,

    /// Attribute kind to acceptable values, canonical first
    pub attrs: IndexMap<String, Vec<String>>,

    pub search_order: SearchOrder,

    pub domain: Domain,

    /// Selection applied after formatting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<Selection>,

    /// Size-one dimensions removed after formatting
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub squeeze: Vec<String>,

    /// Presentation hint, passed through
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmap: Option<String>,
}

impl SpecRecord {
    pub fn canonical_name(&self) -> &str {
        // names is non-empty once resolved: the id is always inserted
        self.names.first().map(String::as_str).unwrap_or(&self.id)
    }

    pub fn attr_values(&self, kind: &str) -> &[String] {
        self.attrs.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn first_attr(&self, kind: &str) -> Option<&str> {
        self.attr_values(kind).first().map(String::as_str)
    }

    pub fn axis(&self) -> Option<Axis> {
        self.first_attr("axis").and_then(|a| a.parse().ok())
    }
}

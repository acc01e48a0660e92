//! Staggered-grid location suffixes
//!
//! A location tag such as `u` or `rho` marks the grid-offset variant of a
//! quantity. It appears in three attributes, each with its own layout:
//!
//! | attribute       | layout                      |
//! |-----------------|-----------------------------|
//! | name            | `{root}_{loc}`              |
//! | standard_name   | `{root}_at_{loc}_location`  |
//! | long_name       | `{root} at {loc} location`  |
//!
//! Only tags listed in `valid_locations` parse as locations.

use cf_array::DataArray;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::CfError;

pub const DEFAULT_NAME_FORMAT: &str = "{root}_{loc}";
const STANDARD_NAME_FORMAT: &str = "{root}_at_{loc}_location";
const LONG_NAME_FORMAT: &str = "{root} at {loc} location";

pub const DEFAULT_LOCATIONS: [&str; 7] = ["t", "u", "v", "w", "f", "rho", "psi"];

/// Attribute carrying a location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocAttr {
    Name,
    StandardName,
    LongName,
}

impl LocAttr {
    pub const ALL: [LocAttr; 3] = [LocAttr::Name, LocAttr::StandardName, LocAttr::LongName];

    pub fn as_str(&self) -> &'static str {
        match self {
            LocAttr::Name => "name",
            LocAttr::StandardName => "standard_name",
            LocAttr::LongName => "long_name",
        }
    }

    /// The location-aware attribute with this name, if any
    pub fn from_attr(attr: &str) -> Option<LocAttr> {
        match attr {
            "name" => Some(LocAttr::Name),
            "standard_name" => Some(LocAttr::StandardName),
            "long_name" => Some(LocAttr::LongName),
            _ => None,
        }
    }

    fn index(&self) -> usize {
        match self {
            LocAttr::Name => 0,
            LocAttr::StandardName => 1,
            LocAttr::LongName => 2,
        }
    }

    fn root_pattern(&self) -> &'static str {
        match self {
            LocAttr::LongName => r"[\w ]+",
            _ => r"\w+",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SgLocatorConfig {
    #[serde(default = "default_name_format")]
    name_format: String,
    #[serde(default = "default_locations")]
    valid_locations: Vec<String>,
}

fn default_name_format() -> String {
    DEFAULT_NAME_FORMAT.to_string()
}

fn default_locations() -> Vec<String> {
    DEFAULT_LOCATIONS.iter().map(|s| s.to_string()).collect()
}

/// Parser and formatter of location suffixes
#[derive(Debug, Clone)]
pub struct SgLocator {
    name_format: String,
    valid_locations: Vec<String>,
    patterns: [Regex; 3],
}

#[derive(Serialize)]
struct SgLocatorView<'a> {
    name_format: &'a str,
    valid_locations: &'a [String],
}

impl SgLocator {
    pub fn new<I, S>(name_format: &str, valid_locations: I) -> Result<Self, CfError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for placeholder in ["{root}", "{loc}"] {
            if !name_format.contains(placeholder) {
                return Err(CfError::InvalidSpec(format!(
                    "sglocator.name_format must contain {{root}} and {{loc}}: '{}'",
                    name_format
                )));
            }
        }

        let mut locations: Vec<String> = Vec::new();
        for loc in valid_locations {
            let loc = loc.as_ref().to_lowercase();
            if loc.is_empty() {
                return Err(CfError::InvalidSpec(
                    "sglocator.valid_locations contains an empty location".to_string(),
                ));
            }
            if !locations.contains(&loc) {
                locations.push(loc);
            }
        }

        let loc_pattern = if locations.is_empty() {
            "[a-z]+".to_string()
        } else {
            let alternatives: Vec<String> =
                locations.iter().map(|l| regex_lite::escape(l)).collect();
            alternatives.join("|")
        };

        let patterns = [
            compile(name_format, LocAttr::Name, &loc_pattern)?,
            compile(STANDARD_NAME_FORMAT, LocAttr::StandardName, &loc_pattern)?,
            compile(LONG_NAME_FORMAT, LocAttr::LongName, &loc_pattern)?,
        ];

        Ok(Self {
            name_format: name_format.to_string(),
            valid_locations: locations,
            patterns,
        })
    }

    /// Build from the `sglocator` section of a merged mapping
    pub fn from_value(value: Option<&Value>) -> Result<Self, CfError> {
        let config: SgLocatorConfig = match value {
            None | Some(Value::Null) => SgLocatorConfig {
                name_format: default_name_format(),
                valid_locations: default_locations(),
            },
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| CfError::InvalidSpec(format!("sglocator: {}", e)))?,
        };
        Self::new(&config.name_format, &config.valid_locations)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(SgLocatorView {
            name_format: &self.name_format,
            valid_locations: &self.valid_locations,
        })
        .unwrap_or_else(|_| json!({}))
    }

    pub fn name_format(&self) -> &str {
        &self.name_format
    }

    pub fn valid_locations(&self) -> &[String] {
        &self.valid_locations
    }

    pub fn is_valid_location(&self, loc: &str) -> bool {
        let loc = loc.to_lowercase();
        self.valid_locations.is_empty() || self.valid_locations.contains(&loc)
    }

    /// Split a value into its root and lower-case location
    pub fn parse<'v>(&self, attr: LocAttr, value: &'v str) -> (&'v str, Option<String>) {
        match self.patterns[attr.index()].captures(value) {
            Some(caps) => match (caps.name("root"), caps.name("loc")) {
                (Some(root), Some(loc)) => (root.as_str(), Some(loc.as_str().to_lowercase())),
                _ => (value, None),
            },
            None => (value, None),
        }
    }

    /// Attach a location to a root
    pub fn format(&self, attr: LocAttr, root: &str, loc: Option<&str>) -> Result<String, CfError> {
        let Some(loc) = loc else {
            return Ok(root.to_string());
        };
        if !self.is_valid_location(loc) {
            return Err(CfError::InvalidSpec(format!(
                "invalid location '{}', expected one of: {}",
                loc,
                self.valid_locations.join(", ")
            )));
        }

        let (layout, loc) = match attr {
            LocAttr::Name => (self.name_format.as_str(), loc.to_lowercase()),
            LocAttr::StandardName => (STANDARD_NAME_FORMAT, loc.to_lowercase()),
            LocAttr::LongName => (LONG_NAME_FORMAT, loc.to_uppercase()),
        };
        Ok(layout.replace("{root}", root).replace("{loc}", &loc))
    }

    /// Location-aware equality of a value with a candidate.
    ///
    /// True on exact equality, or when the value carries a location and its
    /// root equals the candidate.
    pub fn matches(&self, attr: LocAttr, value: &str, candidate: &str) -> bool {
        if value == candidate {
            return true;
        }
        match self.parse(attr, value) {
            (root, Some(_)) => root == candidate,
            _ => false,
        }
    }

    /// Location of an array, from its name, else standard_name, else long_name
    pub fn location_of(&self, array: &DataArray) -> Option<String> {
        let found: Vec<(LocAttr, String)> = LocAttr::ALL
            .iter()
            .filter_map(|attr| {
                let value = match attr {
                    LocAttr::Name => array.name(),
                    other => array.attr_str(other.as_str()),
                }?;
                self.parse(*attr, value).1.map(|loc| (*attr, loc))
            })
            .collect();

        let (attr, loc) = found.first()?;
        if let Some((other, other_loc)) = found.iter().find(|(_, l)| l != loc) {
            debug!(
                kept = %attr.as_str(),
                ignored = %other.as_str(),
                location = %loc,
                conflicting = %other_loc,
                "Conflicting locations"
            );
        }
        Some(loc.clone())
    }
}

/// Location constraint applied when matching or searching arrays
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LocFilter {
    #[default]
    Any,
    /// Only arrays without a location
    Unlocated,
    /// Only arrays at this location
    At(String),
}

impl LocFilter {
    pub fn at(loc: impl Into<String>) -> Self {
        LocFilter::At(loc.into().to_lowercase())
    }

    pub fn accepts(&self, loc: Option<&str>) -> bool {
        match self {
            LocFilter::Any => true,
            LocFilter::Unlocated => loc.is_none(),
            LocFilter::At(want) => loc.is_some_and(|loc| loc.eq_ignore_ascii_case(want)),
        }
    }
}

impl SgLocator {
    /// Whether the location of an array passes a filter
    pub fn accepts(&self, array: &DataArray, filter: &LocFilter) -> bool {
        match filter {
            LocFilter::Any => true,
            _ => filter.accepts(self.location_of(array).as_deref()),
        }
    }
}

impl Default for SgLocator {
    fn default() -> Self {
        // The built-in layout and locations always compile
        match Self::new(DEFAULT_NAME_FORMAT, DEFAULT_LOCATIONS) {
            Ok(locator) => locator,
            Err(e) => unreachable!("default sglocator: {}", e),
        }
    }
}

impl PartialEq for SgLocator {
    fn eq(&self, other: &Self) -> bool {
        self.name_format == other.name_format && self.valid_locations == other.valid_locations
    }
}

/// Anchored, case-insensitive pattern of a layout
fn compile(layout: &str, attr: LocAttr, loc_pattern: &str) -> Result<Regex, CfError> {
    let root_group = format!("(?P<root>{})", attr.root_pattern());
    let loc_group = format!("(?P<loc>{})", loc_pattern);

    let mut pattern = String::from("(?i)^");
    for (i, part) in layout.split("{root}").enumerate() {
        if i > 0 {
            pattern.push_str(&root_group);
        }
        for (j, piece) in part.split("{loc}").enumerate() {
            if j > 0 {
                pattern.push_str(&loc_group);
            }
            pattern.push_str(&regex_lite::escape(piece));
        }
    }
    pattern.push('$');

    Regex::new(&pattern).map_err(|e| {
        CfError::InvalidSpec(format!("{} layout '{}': {}", attr.as_str(), layout, e))
    })
}

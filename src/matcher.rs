//! Matching arrays against specification records
//!
//! A record matches an array when any probe of its search order succeeds.
//! Name and standard_name probes are location-aware; units are compared
//! literally.

use cf_array::{DataArray, Dataset};
use tracing::trace;

use crate::cfspecs::CfSpecs;
use crate::error::CfError;
use crate::sglocator::{LocAttr, LocFilter};
use crate::specs::{Category, SearchCode, SpecRecord};

/// Containers whose children can be searched
pub trait Searchable {
    fn is_dataset(&self) -> bool;

    /// Arrays examined when searching a category, in declaration order
    fn candidates(&self, category: Category) -> Vec<&DataArray>;
}

impl Searchable for DataArray {
    fn is_dataset(&self) -> bool {
        false
    }

    /// Coordinates of the array, or the array itself for data variables
    fn candidates(&self, category: Category) -> Vec<&DataArray> {
        match category {
            Category::Coords => self.coords.values().collect(),
            Category::DataVars => vec![self],
        }
    }
}

impl Searchable for Dataset {
    fn is_dataset(&self) -> bool {
        true
    }

    /// Data variables, or dataset coordinates followed by coordinates only
    /// attached to variables
    fn candidates(&self, category: Category) -> Vec<&DataArray> {
        match category {
            Category::DataVars => self.data_vars.values().collect(),
            Category::Coords => {
                let mut seen: Vec<&str> = self.coords.keys().map(String::as_str).collect();
                let mut out: Vec<&DataArray> = self.coords.values().collect();
                for var in self.data_vars.values() {
                    for (key, coord) in &var.coords {
                        if !seen.contains(&key.as_str()) {
                            seen.push(key);
                            out.push(coord);
                        }
                    }
                }
                out
            }
        }
    }
}

/// Matching view over a set of specs
#[derive(Debug, Clone, Copy)]
pub struct MatchEngine<'a> {
    specs: &'a CfSpecs,
}

impl<'a> MatchEngine<'a> {
    pub fn new(specs: &'a CfSpecs) -> Self {
        Self { specs }
    }

    /// Whether any probe of the record's search order succeeds
    pub fn is_match(&self, array: &DataArray, record: &SpecRecord) -> bool {
        let sg = self.specs.sglocator();
        record.search_order.codes().iter().any(|code| match code {
            SearchCode::Name => array.name().is_some_and(|name| {
                record
                    .names
                    .iter()
                    .any(|candidate| sg.matches(LocAttr::Name, name, candidate))
            }),
            SearchCode::StandardName => {
                array.attr_str("standard_name").is_some_and(|value| {
                    record
                        .attr_values("standard_name")
                        .iter()
                        .any(|candidate| sg.matches(LocAttr::StandardName, value, candidate))
                })
            }
            SearchCode::Units => array
                .attr_str("units")
                .is_some_and(|value| record.attr_values("units").iter().any(|u| u == value)),
        })
    }

    /// Match an array against one record, or against every record of the
    /// category in declaration order.
    ///
    /// An unknown explicit id is an error; no match is `None`.
    pub fn match_array(
        &self,
        array: &DataArray,
        category: Category,
        id: Option<&str>,
    ) -> Result<Option<&'a SpecRecord>, CfError> {
        self.match_array_at(array, category, id, &LocFilter::Any)
    }

    /// Like [`match_array`](Self::match_array), for arrays whose location
    /// passes the filter only
    pub fn match_array_at(
        &self,
        array: &DataArray,
        category: Category,
        id: Option<&str>,
        loc: &LocFilter,
    ) -> Result<Option<&'a SpecRecord>, CfError> {
        let specs = &self.specs[category];
        let record = match id {
            Some(id) => Some(specs.record(id)?),
            None => None,
        };
        if !self.specs.sglocator().accepts(array, loc) {
            return Ok(None);
        }

        let found = match record {
            Some(record) => self.is_match(array, record).then_some(record),
            None => specs.records().find(|record| self.is_match(array, record)),
        };

        if let Some(record) = found {
            trace!(array = ?array.name(), category = %category, id = %record.id, "Matched");
        }
        Ok(found)
    }

    /// Match in both categories, the likelier one first.
    ///
    /// Coordinates come first when the array names one of its own
    /// dimensions or coordinates.
    pub fn match_any(&self, array: &DataArray) -> Option<(Category, &'a SpecRecord)> {
        let coord_like = array
            .name()
            .is_some_and(|name| array.has_dim(name) || array.coords.contains_key(name));
        let order = if coord_like {
            [Category::Coords, Category::DataVars]
        } else {
            [Category::DataVars, Category::Coords]
        };

        order.into_iter().find_map(|category| {
            self.specs[category]
                .records()
                .find(|record| self.is_match(array, record))
                .map(|record| (category, record))
        })
    }

    /// First child of the container matching in a category
    pub fn search<'c, C>(
        &self,
        container: &'c C,
        category: Category,
        id: Option<&str>,
        loc: &LocFilter,
    ) -> Result<Option<(&'c DataArray, &'a SpecRecord)>, CfError>
    where
        C: Searchable + ?Sized,
    {
        // Fail on unknown ids even when there is nothing to scan
        if let Some(id) = id {
            self.specs[category].record(id)?;
        }

        for candidate in container.candidates(category) {
            if let Some(record) = self.match_array_at(candidate, category, id, loc)? {
                return Ok(Some((candidate, record)));
            }
        }
        Ok(None)
    }

    /// Every child of the container matching in a category, in
    /// declaration order
    pub fn search_all<'c, C>(
        &self,
        container: &'c C,
        category: Category,
        id: Option<&str>,
        loc: &LocFilter,
    ) -> Result<Vec<(&'c DataArray, &'a SpecRecord)>, CfError>
    where
        C: Searchable + ?Sized,
    {
        if let Some(id) = id {
            self.specs[category].record(id)?;
        }

        let mut found = Vec::new();
        for candidate in container.candidates(category) {
            if let Some(record) = self.match_array_at(candidate, category, id, loc)? {
                found.push((candidate, record));
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpecsSource;
    use serde_json::json;

    fn specs() -> CfSpecs {
        CfSpecs::builder()
            .default_specs(false)
            .user_specs(false)
            .source(SpecsSource::from(json!({
                "data_vars": {
                    "temp": {
                        "name": ["temp", "tem"],
                        "attrs": {"standard_name": "sea_water_temperature", "units": "degC"}
                    },
                    "ptemp": {
                        "attrs": {"standard_name": "sea_water_temperature"}
                    },
                    "sal": {
                        "search_order": "u",
                        "attrs": {"units": "PSU"}
                    }
                },
                "coords": {
                    "lon": {
                        "name": ["lon", "longitude"],
                        "attrs": {"standard_name": "longitude", "axis": "X"}
                    },
                    "x": {"attrs": {"axis": "X"}}
                }
            })))
            .build()
            .unwrap()
    }

    #[test]
    fn test_match_by_name() {
        let specs = specs();
        let engine = MatchEngine::new(&specs);
        let record = engine
            .match_array(&DataArray::new("tem"), Category::DataVars, None)
            .unwrap()
            .unwrap();
        assert_eq!(record.id, "temp");
    }

    #[test]
    fn test_first_record_in_declaration_order_wins() {
        let specs = specs();
        let engine = MatchEngine::new(&specs);
        let array = DataArray::new("theta").with_attr("standard_name", "sea_water_temperature");
        let record = engine
            .match_array(&array, Category::DataVars, None)
            .unwrap()
            .unwrap();
        assert_eq!(record.id, "temp");
    }

    #[test]
    fn test_explicit_match() {
        let specs = specs();
        let engine = MatchEngine::new(&specs);
        let array = DataArray::new("theta").with_attr("standard_name", "sea_water_temperature");
        let record = engine
            .match_array(&array, Category::DataVars, Some("ptemp"))
            .unwrap();
        assert_eq!(record.map(|r| r.id.as_str()), Some("ptemp"));

        let miss = engine
            .match_array(&DataArray::new("theta"), Category::DataVars, Some("ptemp"))
            .unwrap();
        assert!(miss.is_none());

        let err = engine
            .match_array(&array, Category::DataVars, Some("banana"))
            .unwrap_err();
        assert!(matches!(err, CfError::UnknownSpec { .. }));
    }

    #[test]
    fn test_search_order_limits_probes() {
        let specs = specs();
        let engine = MatchEngine::new(&specs);
        // sal only probes units
        let by_name = engine
            .match_array(&DataArray::new("sal"), Category::DataVars, Some("sal"))
            .unwrap();
        assert!(by_name.is_none());

        let by_units = DataArray::new("s").with_attr("units", "PSU");
        let record = engine
            .match_array(&by_units, Category::DataVars, None)
            .unwrap()
            .unwrap();
        assert_eq!(record.id, "sal");
    }

    #[test]
    fn test_units_not_probed_by_default() {
        let specs = specs();
        let engine = MatchEngine::new(&specs);
        let array = DataArray::new("t").with_attr("units", "degC");
        assert!(engine
            .match_array(&array, Category::DataVars, Some("temp"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_location_aware_name() {
        let specs = specs();
        let engine = MatchEngine::new(&specs);
        let record = engine
            .match_array(&DataArray::new("temp_t"), Category::DataVars, None)
            .unwrap()
            .unwrap();
        assert_eq!(record.id, "temp");
    }

    #[test]
    fn test_match_with_location_filter() {
        let specs = specs();
        let engine = MatchEngine::new(&specs);
        let at_t = DataArray::new("temp_t");
        let match_at = |array: &DataArray, loc: &LocFilter| {
            engine
                .match_array_at(array, Category::DataVars, None, loc)
                .unwrap()
                .map(|r| r.id.as_str())
        };

        assert_eq!(match_at(&at_t, &LocFilter::at("t")), Some("temp"));
        assert_eq!(match_at(&at_t, &LocFilter::at("u")), None);
        assert_eq!(match_at(&at_t, &LocFilter::Unlocated), None);
        assert_eq!(match_at(&DataArray::new("tem"), &LocFilter::Unlocated), Some("temp"));

        // unknown ids fail whatever the location
        let err = engine
            .match_array_at(&at_t, Category::DataVars, Some("banana"), &LocFilter::at("u"))
            .unwrap_err();
        assert!(matches!(err, CfError::UnknownSpec { .. }));
    }

    #[test]
    fn test_no_cross_category_delegation() {
        let specs = specs();
        let engine = MatchEngine::new(&specs);
        assert!(engine
            .match_array(&DataArray::new("lon"), Category::DataVars, None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_match_any_prefers_coords_for_dimension_names() {
        let specs = specs();
        let engine = MatchEngine::new(&specs);
        let array = DataArray::new("longitude").with_dims([("longitude", 4)]);
        let (category, record) = engine.match_any(&array).unwrap();
        assert_eq!(category, Category::Coords);
        assert_eq!(record.id, "lon");
    }

    #[test]
    fn test_search_dataset() {
        let specs = specs();
        let engine = MatchEngine::new(&specs);
        let ds = Dataset::new()
            .with_data_var(
                DataArray::new("banana").with_coord(DataArray::new("longitude")),
            )
            .with_data_var(DataArray::new("tem"));

        let (array, record) = engine
            .search(&ds, Category::DataVars, None, &LocFilter::Any)
            .unwrap()
            .unwrap();
        assert_eq!(array.name(), Some("tem"));
        assert_eq!(record.id, "temp");

        let (coord, record) = engine
            .search(&ds, Category::Coords, None, &LocFilter::Any)
            .unwrap()
            .unwrap();
        assert_eq!(coord.name(), Some("longitude"));
        assert_eq!(record.id, "lon");

        assert!(engine
            .search(&ds, Category::DataVars, Some("sal"), &LocFilter::Any)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_search_all_keeps_declaration_order() {
        let specs = specs();
        let engine = MatchEngine::new(&specs);
        let ds = Dataset::new()
            .with_data_var(DataArray::new("temp_t"))
            .with_data_var(DataArray::new("banana"))
            .with_data_var(DataArray::new("s").with_attr("units", "PSU"))
            .with_data_var(DataArray::new("tem_u"));

        let found = engine
            .search_all(&ds, Category::DataVars, None, &LocFilter::Any)
            .unwrap();
        let pairs: Vec<(Option<&str>, &str)> = found
            .iter()
            .map(|(array, record)| (array.name(), record.id.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![(Some("temp_t"), "temp"), (Some("s"), "sal"), (Some("tem_u"), "temp")]
        );

        let at_u = engine
            .search_all(&ds, Category::DataVars, Some("temp"), &LocFilter::at("u"))
            .unwrap();
        assert_eq!(at_u.len(), 1);
        assert_eq!(at_u[0].0.name(), Some("tem_u"));

        let (first, _) = engine
            .search(&ds, Category::DataVars, Some("temp"), &LocFilter::at("u"))
            .unwrap()
            .unwrap();
        assert_eq!(first.name(), Some("tem_u"));

        assert!(engine
            .search_all(&ds, Category::Coords, None, &LocFilter::Any)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_search_unknown_id_on_empty_container() {
        let specs = specs();
        let engine = MatchEngine::new(&specs);
        let err = engine
            .search(&Dataset::new(), Category::Coords, Some("depth"), &LocFilter::Any)
            .unwrap_err();
        assert!(matches!(err, CfError::UnknownSpec { .. }));
    }

    #[test]
    fn test_dataset_coord_candidates_deduplicated() {
        let x = DataArray::new("x").with_dims([("x", 2)]);
        let ds = Dataset::new()
            .with_coord(x.clone())
            .with_data_var(DataArray::new("a").with_coord(x.clone()))
            .with_data_var(DataArray::new("b").with_coord(DataArray::new("y")));
        let names: Vec<Option<&str>> = ds
            .candidates(Category::Coords)
            .into_iter()
            .map(DataArray::name)
            .collect();
        assert_eq!(names, vec![Some("x"), Some("y")]);
    }
}

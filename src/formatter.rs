//! Canonical formatting of matched arrays
//!
//! Formatting writes the record's attributes, renames the array to its
//! canonical name (keeping its grid location), then applies the record's
//! selection and squeeze hints.

use cf_array::{DataArray, Dataset};
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::cfspecs::CfSpecs;
use crate::error::CfError;
use crate::matcher::MatchEngine;
use crate::sglocator::LocAttr;
use crate::specs::{Category, SpecRecord};

/// Record to format an array with
#[derive(Debug, Clone, Copy)]
pub enum FormatTarget<'r> {
    Id(&'r str),
    Record(&'r SpecRecord),
}

impl<'r> From<&'r str> for FormatTarget<'r> {
    fn from(id: &'r str) -> Self {
        FormatTarget::Id(id)
    }
}

impl<'r> From<&'r String> for FormatTarget<'r> {
    fn from(id: &'r String) -> Self {
        FormatTarget::Id(id)
    }
}

impl<'r> From<&'r SpecRecord> for FormatTarget<'r> {
    fn from(record: &'r SpecRecord) -> Self {
        FormatTarget::Record(record)
    }
}

/// Location given to formatted names and attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LocationPolicy {
    /// Keep the location parsed from the array
    #[default]
    Keep,
    /// Force this location
    Set(String),
    /// Drop any location
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOptions {
    pub location: LocationPolicy,
    /// Rename arrays to their canonical name
    pub rename: bool,
    /// Overwrite attributes already present
    pub replace_attrs: bool,
    /// Also format coordinates
    pub format_coords: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            location: LocationPolicy::Keep,
            rename: true,
            replace_attrs: true,
            format_coords: true,
        }
    }
}

impl FormatOptions {
    /// Only add missing attributes
    pub fn fill() -> Self {
        Self {
            rename: false,
            replace_attrs: false,
            ..Self::default()
        }
    }

    pub fn with_location(mut self, location: LocationPolicy) -> Self {
        self.location = location;
        self
    }

    pub fn with_format_coords(mut self, format_coords: bool) -> Self {
        self.format_coords = format_coords;
        self
    }
}

/// Containers that can be auto-formatted
pub trait AutoFormat: Sized {
    fn auto_format_with(
        &self,
        formatter: &Formatter<'_>,
        options: &FormatOptions,
    ) -> Result<Self, CfError>;
}

impl AutoFormat for DataArray {
    fn auto_format_with(
        &self,
        formatter: &Formatter<'_>,
        options: &FormatOptions,
    ) -> Result<Self, CfError> {
        formatter.auto_format_array(self, options)
    }
}

impl AutoFormat for Dataset {
    fn auto_format_with(
        &self,
        formatter: &Formatter<'_>,
        options: &FormatOptions,
    ) -> Result<Self, CfError> {
        formatter.auto_format_dataset(self, options)
    }
}

/// Dimension renames done while formatting, old name first
type DimRenames = Vec<(String, String)>;

/// Formatting view over a set of specs
#[derive(Debug, Clone, Copy)]
pub struct Formatter<'a> {
    specs: &'a CfSpecs,
}

impl<'a> Formatter<'a> {
    pub fn new(specs: &'a CfSpecs) -> Self {
        Self { specs }
    }

    /// Format an array with a given record of a category
    pub fn format_array<'r>(
        &self,
        array: &DataArray,
        target: impl Into<FormatTarget<'r>>,
        category: Category,
        options: &FormatOptions,
    ) -> Result<DataArray, CfError> {
        let record = match target.into() {
            FormatTarget::Id(id) => self.specs[category].record(id)?,
            FormatTarget::Record(record) => record,
        };
        let (out, _) = self.format_one(array, record, category, options)?;
        Ok(out)
    }

    /// Format an array if it matches any record; otherwise only its
    /// coordinates are formatted
    pub fn auto_format_array(
        &self,
        array: &DataArray,
        options: &FormatOptions,
    ) -> Result<DataArray, CfError> {
        match self.engine().match_any(array) {
            Some((category, record)) => {
                let (out, _) = self.format_one(array, record, category, options)?;
                Ok(out)
            }
            None => {
                let mut out = array.clone();
                if options.format_coords {
                    self.format_coords_of(&mut out, options)?;
                }
                Ok(out)
            }
        }
    }

    /// Format every matching coordinate and data variable of a dataset
    pub fn auto_format_dataset(
        &self,
        ds: &Dataset,
        options: &FormatOptions,
    ) -> Result<Dataset, CfError> {
        let engine = self.engine();
        let mut out = Dataset {
            attrs: ds.attrs.clone(),
            encoding: ds.encoding.clone(),
            ..Dataset::default()
        };
        let mut renames: DimRenames = Vec::new();

        for (key, coord) in &ds.coords {
            let record = if options.format_coords {
                engine.match_array(coord, Category::Coords, None)?
            } else {
                None
            };
            let coord_options = coord_options(options);
            let done = match record {
                Some(record) => self
                    .format_or_keep(coord, record, Category::Coords, &coord_options)?
                    .map(|done| (record, done)),
                None => None,
            };
            let formatted = match done {
                Some((record, (formatted, dims))) => {
                    if is_taken(formatted.name(), key, ds, &out) {
                        warn!(from = %key, to = ?formatted.name(), "Skipping rename of coordinate to an existing name");
                        self.format_kept_name(coord, record, Category::Coords, &coord_options)?
                    } else {
                        renames.extend(dims);
                        formatted
                    }
                }
                None => coord.clone(),
            };
            let new_key = formatted.name().unwrap_or(key.as_str()).to_string();
            out.coords.insert(new_key, formatted);
        }

        for (key, var) in &ds.data_vars {
            let done = match engine.match_array(var, Category::DataVars, None)? {
                Some(record) => self
                    .format_or_keep(var, record, Category::DataVars, options)?
                    .map(|done| (record, done)),
                None => None,
            };
            let formatted = match done {
                Some((record, (formatted, dims))) => {
                    if is_taken(formatted.name(), key, ds, &out) {
                        warn!(from = %key, to = ?formatted.name(), "Skipping rename of data variable to an existing name");
                        self.format_kept_name(var, record, Category::DataVars, options)?
                    } else {
                        renames.extend(dims);
                        formatted
                    }
                }
                None => {
                    let mut formatted = var.clone();
                    if options.format_coords {
                        renames.extend(self.format_coords_of(&mut formatted, options)?);
                    }
                    formatted
                }
            };
            let new_key = formatted.name().unwrap_or(key.as_str()).to_string();
            out.data_vars.insert(new_key, formatted);
        }

        for (old, new) in &renames {
            debug!(from = %old, to = %new, "Renaming dimension");
            out.rename_dim(old, new);
        }
        Ok(out)
    }

    fn engine(&self) -> MatchEngine<'a> {
        MatchEngine::new(self.specs)
    }

    fn format_one(
        &self,
        array: &DataArray,
        record: &SpecRecord,
        category: Category,
        options: &FormatOptions,
    ) -> Result<(DataArray, DimRenames), CfError> {
        let sg = self.specs.sglocator();
        let loc = match &options.location {
            LocationPolicy::Keep => sg.location_of(array),
            LocationPolicy::Set(loc) => Some(loc.to_lowercase()),
            LocationPolicy::Remove => None,
        };

        let mut out = array.clone();
        let mut renames: DimRenames = Vec::new();
        self.apply_attrs(&mut out, record, category, loc.as_deref(), options.replace_attrs)?;

        if options.rename {
            let new_name = sg.format(LocAttr::Name, record.canonical_name(), loc.as_deref())?;
            if let Some(old) = out.name.clone() {
                let is_dim_coord = out.ndim() == 1 && out.dims[0].name == old;
                if is_dim_coord && old != new_name {
                    out.rename_dim(&old, &new_name);
                    renames.push((old, new_name.clone()));
                }
            }
            out.set_name(new_name);
        }

        if options.format_coords {
            renames.extend(self.format_coords_of(&mut out, options)?);
        }

        if let Some(selection) = &record.select {
            out = selection.apply(&out)?;
        }

        for dim in &record.squeeze {
            match out.size_of(dim) {
                None => {}
                Some(1) => out = out.squeeze_dim(dim)?,
                Some(size) => {
                    return Err(CfError::Shape {
                        dim: dim.clone(),
                        size,
                    });
                }
            }
        }

        debug!(id = %record.id, category = %category, name = ?out.name(), "Formatted");
        Ok((out, renames))
    }

    /// Format one matched member of a container, or `None` when its data
    /// does not fit the record's selection or squeeze hints
    fn format_or_keep(
        &self,
        array: &DataArray,
        record: &SpecRecord,
        category: Category,
        options: &FormatOptions,
    ) -> Result<Option<(DataArray, DimRenames)>, CfError> {
        match self.format_one(array, record, category, options) {
            Ok(done) => Ok(Some(done)),
            Err(err @ (CfError::Shape { .. } | CfError::Data(_))) => {
                warn!(id = %record.id, name = ?array.name(), error = %err, "Keeping array unformatted");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Format without renaming, for arrays whose new name is taken
    fn format_kept_name(
        &self,
        array: &DataArray,
        record: &SpecRecord,
        category: Category,
        options: &FormatOptions,
    ) -> Result<DataArray, CfError> {
        let options = FormatOptions {
            rename: false,
            ..options.clone()
        };
        self.format_one(array, record, category, &options)
            .map(|(out, _)| out)
    }

    fn apply_attrs(
        &self,
        array: &mut DataArray,
        record: &SpecRecord,
        category: Category,
        loc: Option<&str>,
        replace: bool,
    ) -> Result<(), CfError> {
        let sg = self.specs.sglocator();
        for (kind, values) in &record.attrs {
            if kind == "axis" && category != Category::Coords {
                continue;
            }
            let Some(first) = values.first() else {
                continue;
            };
            if !replace && array.attrs.contains_key(kind) {
                continue;
            }
            let value = match LocAttr::from_attr(kind) {
                Some(attr @ (LocAttr::StandardName | LocAttr::LongName)) => {
                    let (root, _) = sg.parse(attr, first);
                    sg.format(attr, root, loc)?
                }
                _ => first.clone(),
            };
            array.set_attr(kind.clone(), value);
        }
        Ok(())
    }

    /// Format the matching coordinates of an array in place
    fn format_coords_of(
        &self,
        array: &mut DataArray,
        options: &FormatOptions,
    ) -> Result<DimRenames, CfError> {
        let engine = self.engine();
        let coord_options = coord_options(options);
        let mut coords: IndexMap<String, DataArray> = IndexMap::new();
        let mut renames: DimRenames = Vec::new();

        for (key, coord) in &array.coords {
            let Some(record) = engine.match_array(coord, Category::Coords, None)? else {
                coords.insert(key.clone(), coord.clone());
                continue;
            };

            let Some((mut formatted, dims)) =
                self.format_or_keep(coord, record, Category::Coords, &coord_options)?
            else {
                coords.insert(key.clone(), coord.clone());
                continue;
            };
            let new_key = formatted.name().unwrap_or(key.as_str()).to_string();
            if new_key != *key
                && (coords.contains_key(&new_key) || array.coords.contains_key(&new_key))
            {
                warn!(from = %key, to = %new_key, "Skipping rename of coordinate to an existing name");
                formatted = self.format_kept_name(coord, record, Category::Coords, &coord_options)?;
                coords.insert(key.clone(), formatted);
                continue;
            }
            renames.extend(dims);
            coords.insert(new_key, formatted);
        }

        array.coords = coords;
        for (old, new) in &renames {
            array.rename_dim(old, new);
        }
        Ok(renames)
    }
}

/// Coordinates keep their own location and have no nested coordinates
fn coord_options(options: &FormatOptions) -> FormatOptions {
    FormatOptions {
        location: LocationPolicy::Keep,
        format_coords: false,
        ..options.clone()
    }
}

/// Whether a new name clashes with another array of the dataset
fn is_taken(new_name: Option<&str>, key: &str, ds: &Dataset, out: &Dataset) -> bool {
    match new_name {
        Some(name) if name != key => {
            ds.data_vars.contains_key(name)
                || ds.coords.contains_key(name)
                || out.data_vars.contains_key(name)
                || out.coords.contains_key(name)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpecsSource;
    use cf_array::ArrayError;
    use serde_json::json;

    fn specs() -> CfSpecs {
        CfSpecs::builder()
            .default_specs(false)
            .user_specs(false)
            .source(SpecsSource::from(json!({
                "sglocator": {"valid_locations": ["t", "u", "v", "0"]},
                "data_vars": {
                    "temp": {
                        "name": ["temp", "tem"],
                        "attrs": {
                            "standard_name": "sea_water_temperature",
                            "long_name": "Temperature",
                            "units": "degC"
                        }
                    },
                    "u": {
                        "name": ["uo", "u"],
                        "attrs": {"standard_name": "sea_water_x_velocity"}
                    },
                    "sst": {
                        "attrs": {"standard_name": "sea_surface_temperature"},
                        "select": {"depth": -1}
                    },
                    "ssh": {
                        "attrs": {"standard_name": "sea_surface_height"},
                        "squeeze": ["time"]
                    }
                },
                "coords": {
                    "lon": {
                        "name": ["lon", "longitude", "nav_lon"],
                        "attrs": {"standard_name": "longitude", "units": "degrees_east", "axis": "X"}
                    },
                    "depth": {
                        "attrs": {"standard_name": "depth", "axis": "z"}
                    }
                }
            })))
            .build()
            .unwrap()
    }

    #[test]
    fn test_format_sets_name_and_attrs() {
        let specs = specs();
        let fmt = Formatter::new(&specs);
        let array = DataArray::new("tem").with_attr("comment", "raw");
        let out = fmt
            .format_array(&array, "temp", Category::DataVars, &FormatOptions::default())
            .unwrap();
        assert_eq!(out.name(), Some("temp"));
        assert_eq!(out.attr_str("standard_name"), Some("sea_water_temperature"));
        assert_eq!(out.attr_str("units"), Some("degC"));
        assert_eq!(out.attr_str("comment"), Some("raw"));
        assert!(out.attrs.get("axis").is_none());
    }

    #[test]
    fn test_format_keeps_location() {
        let specs = specs();
        let fmt = Formatter::new(&specs);
        let out = fmt
            .format_array(&DataArray::new("u_0"), "u", Category::DataVars, &FormatOptions::default())
            .unwrap();
        assert_eq!(out.name(), Some("uo_0"));
        assert_eq!(
            out.attr_str("standard_name"),
            Some("sea_water_x_velocity_at_0_location")
        );
        assert_eq!(out.attr_str("long_name"), Some("Sea water x velocity at 0 location"));
    }

    #[test]
    fn test_format_location_policies() {
        let specs = specs();
        let fmt = Formatter::new(&specs);
        let array = DataArray::new("temp_t");

        let options = FormatOptions::default().with_location(LocationPolicy::Remove);
        let out = fmt.format_array(&array, "temp", Category::DataVars, &options).unwrap();
        assert_eq!(out.name(), Some("temp"));

        let options = FormatOptions::default().with_location(LocationPolicy::Set("U".into()));
        let out = fmt.format_array(&array, "temp", Category::DataVars, &options).unwrap();
        assert_eq!(out.name(), Some("temp_u"));
        assert_eq!(out.attr_str("long_name"), Some("Temperature at U location"));

        let options = FormatOptions::default().with_location(LocationPolicy::Set("psi".into()));
        let err = fmt.format_array(&array, "temp", Category::DataVars, &options).unwrap_err();
        assert!(matches!(err, CfError::InvalidSpec(_)));
    }

    #[test]
    fn test_format_unknown_id() {
        let specs = specs();
        let fmt = Formatter::new(&specs);
        let err = fmt
            .format_array(&DataArray::new("a"), "banana", Category::DataVars, &FormatOptions::default())
            .unwrap_err();
        assert!(matches!(err, CfError::UnknownSpec { .. }));
    }

    #[test]
    fn test_format_coord_renames_dimension() {
        let specs = specs();
        let fmt = Formatter::new(&specs);
        let coord = DataArray::new("nav_lon").with_dims([("nav_lon", 3)]);
        let out = fmt
            .format_array(&coord, "lon", Category::Coords, &FormatOptions::default())
            .unwrap();
        assert_eq!(out.name(), Some("lon"));
        assert_eq!(out.dims[0].name, "lon");
        assert_eq!(out.attr_str("axis"), Some("X"));
    }

    #[test]
    fn test_format_data_var_formats_coords() {
        let specs = specs();
        let fmt = Formatter::new(&specs);
        let array = DataArray::new("tem")
            .with_dims([("longitude", 2)])
            .with_coord(DataArray::new("longitude").with_dims([("longitude", 2)]));
        let out = fmt
            .format_array(&array, "temp", Category::DataVars, &FormatOptions::default())
            .unwrap();
        assert!(out.coords.contains_key("lon"));
        assert_eq!(out.dims[0].name, "lon");
        assert_eq!(out.coords["lon"].attr_str("standard_name"), Some("longitude"));

        let options = FormatOptions::default().with_format_coords(false);
        let out = fmt.format_array(&array, "temp", Category::DataVars, &options).unwrap();
        assert!(out.coords.contains_key("longitude"));
    }

    #[test]
    fn test_fill_keeps_existing() {
        let specs = specs();
        let fmt = Formatter::new(&specs);
        let array = DataArray::new("tem").with_attr("units", "K");
        let out = fmt
            .format_array(&array, "temp", Category::DataVars, &FormatOptions::fill())
            .unwrap();
        assert_eq!(out.name(), Some("tem"));
        assert_eq!(out.attr_str("units"), Some("K"));
        assert_eq!(out.attr_str("long_name"), Some("Temperature"));
    }

    #[test]
    fn test_select_applied() {
        let specs = specs();
        let fmt = Formatter::new(&specs);
        let array = DataArray::new("sst")
            .with_dims([("depth", 2), ("x", 2)])
            .with_values(vec![1.0, 2.0, 3.0, 4.0]);
        let out = fmt
            .format_array(&array, "sst", Category::DataVars, &FormatOptions::default())
            .unwrap();
        assert_eq!(out.values, vec![3.0, 4.0]);
    }

    #[test]
    fn test_select_failure_is_data_error() {
        let specs = specs();
        let fmt = Formatter::new(&specs);
        let array = DataArray::new("sst").with_dims([("x", 2)]);
        let err = fmt
            .format_array(&array, "sst", Category::DataVars, &FormatOptions::default())
            .unwrap_err();
        assert!(matches!(err, CfError::Data(_)));
    }

    #[test]
    fn test_select_on_values_not_fitting_shape() {
        let specs = specs();
        let fmt = Formatter::new(&specs);
        let array = DataArray::new("sst")
            .with_dims([("depth", 2), ("x", 2)])
            .with_values(vec![1.0, 2.0, 3.0]);
        let err = fmt
            .format_array(&array, "sst", Category::DataVars, &FormatOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            CfError::Data(ArrayError::ShapeMismatch {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_squeeze() {
        let specs = specs();
        let fmt = Formatter::new(&specs);
        let options = FormatOptions::default();

        let array = DataArray::new("ssh").with_dims([("time", 1), ("x", 3)]);
        let out = fmt.format_array(&array, "ssh", Category::DataVars, &options).unwrap();
        assert_eq!(out.shape(), vec![3]);

        let absent = DataArray::new("ssh").with_dims([("x", 3)]);
        assert!(fmt.format_array(&absent, "ssh", Category::DataVars, &options).is_ok());

        let long = DataArray::new("ssh").with_dims([("time", 2)]);
        let err = fmt.format_array(&long, "ssh", Category::DataVars, &options).unwrap_err();
        assert!(matches!(err, CfError::Shape { size: 2, .. }));
    }

    #[test]
    fn test_auto_format_dataset() {
        let specs = specs();
        let fmt = Formatter::new(&specs);
        let ds = Dataset::new()
            .with_coord(DataArray::new("nav_lon").with_dims([("nav_lon", 2)]))
            .with_data_var(DataArray::new("tem").with_dims([("nav_lon", 2)]))
            .with_data_var(DataArray::new("banana").with_dims([("nav_lon", 2)]));

        let out = fmt.auto_format_dataset(&ds, &FormatOptions::default()).unwrap();
        let vars: Vec<&String> = out.data_vars.keys().collect();
        assert_eq!(vars, vec!["temp", "banana"]);
        assert!(out.coords.contains_key("lon"));
        assert!(out.data_vars["banana"].has_dim("lon"));
        assert_eq!(out.data_vars["banana"].attrs.len(), 0);
    }

    #[test]
    fn test_auto_format_dataset_name_collision() {
        let specs = specs();
        let fmt = Formatter::new(&specs);
        let ds = Dataset::new()
            .with_data_var(DataArray::new("temp"))
            .with_data_var(DataArray::new("tem"));

        let out = fmt.auto_format_dataset(&ds, &FormatOptions::default()).unwrap();
        let vars: Vec<&String> = out.data_vars.keys().collect();
        assert_eq!(vars, vec!["temp", "tem"]);
        assert_eq!(out.data_vars["tem"].attr_str("units"), Some("degC"));
    }

    #[test]
    fn test_auto_format_dataset_keeps_unfit_variable() {
        let specs = specs();
        let fmt = Formatter::new(&specs);
        // ssh cannot be squeezed along a time of size 2
        let ssh = DataArray::new("zos")
            .with_attr("standard_name", "sea_surface_height")
            .with_dims([("time", 2)]);
        let ds = Dataset::new()
            .with_data_var(ssh.clone())
            .with_data_var(DataArray::new("tem").with_dims([("time", 2)]));

        let out = fmt.auto_format_dataset(&ds, &FormatOptions::default()).unwrap();
        let vars: Vec<&String> = out.data_vars.keys().collect();
        assert_eq!(vars, vec!["zos", "temp"]);
        assert_eq!(out.data_vars["zos"], ssh);
        assert_eq!(out.data_vars["temp"].attr_str("units"), Some("degC"));
    }

    #[test]
    fn test_auto_format_coords_keeps_unfit_coordinate() {
        let specs = CfSpecs::builder()
            .default_specs(false)
            .user_specs(false)
            .source(SpecsSource::from(json!({
                "coords": {
                    "time": {"name": ["time"], "squeeze": ["time"]},
                    "lon": {"name": ["lon", "nav_lon"]}
                }
            })))
            .build()
            .unwrap();
        let fmt = Formatter::new(&specs);
        let array = DataArray::new("banana")
            .with_dims([("time", 2), ("nav_lon", 3)])
            .with_coord(DataArray::new("time").with_dims([("time", 2)]))
            .with_coord(DataArray::new("nav_lon").with_dims([("nav_lon", 3)]));

        let out = fmt.auto_format_array(&array, &FormatOptions::default()).unwrap();
        assert_eq!(out.coords["time"].shape(), vec![2]);
        assert!(out.coords.contains_key("lon"));
        assert!(out.has_dim("lon"));
    }

    #[test]
    fn test_auto_format_array_no_match() {
        let specs = specs();
        let fmt = Formatter::new(&specs);
        let array = DataArray::new("banana").with_attr("units", "kg");
        let out = fmt.auto_format_array(&array, &FormatOptions::default()).unwrap();
        assert_eq!(out, array);
    }
}

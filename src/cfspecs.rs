//! Top-level specifications aggregate
//!
//! A [`CfSpecs`] owns the resolved `data_vars` and `coords` categories of a
//! merged set of sources, plus the location settings and the registration
//! name. Matching and formatting go through [`MatchEngine`] and
//! [`Formatter`] views over it.

use std::ops::Index;
use std::sync::Arc;

use cf_array::{ArrayError, DataArray};
use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::{
    kind_of, merge_sources, BaseSpecs, BuiltinSpecs, LoadedSource, SpecsProvenance, SpecsSource,
};
use crate::error::CfError;
use crate::formatter::{AutoFormat, FormatOptions, FormatTarget, Formatter};
use crate::matcher::{MatchEngine, Searchable};
use crate::sglocator::{LocAttr, LocFilter, SgLocator};
use crate::specs::{Axis, Category, SearchOrder, SpecCategory, SpecRecord};

/// Axes by position from the last dimension
const POSITIONAL_AXES: [Axis; 4] = [Axis::X, Axis::Y, Axis::Z, Axis::T];

const KNOWN_SECTIONS: [&str; 5] = ["data_vars", "coords", "sglocator", "search_order", "register"];

/// Resolved specifications of both categories
#[derive(Debug, Clone)]
pub struct CfSpecs {
    name: Option<String>,
    data_vars: SpecCategory,
    coords: SpecCategory,
    sglocator: SgLocator,
    dims: IndexMap<Axis, Vec<String>>,
    raw: Value,
    provenance: SpecsProvenance,
}

/// Builder of [`CfSpecs`] from layered sources
#[derive(Debug, Clone)]
pub struct CfSpecsBuilder {
    sources: Vec<SpecsSource>,
    default_specs: bool,
    user_specs: bool,
    base: Option<Arc<dyn BaseSpecs>>,
}

impl Default for CfSpecsBuilder {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            default_specs: true,
            user_specs: true,
            base: None,
        }
    }
}

impl CfSpecsBuilder {
    /// Add a source above the ones already given
    pub fn source(mut self, source: impl Into<SpecsSource>) -> Self {
        self.sources.push(source.into());
        self
    }

    /// Add several sources, lowest priority first
    pub fn sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SpecsSource>,
    {
        self.sources.extend(sources.into_iter().map(Into::into));
        self
    }

    /// Seed with the built-in specs (default: true)
    pub fn default_specs(mut self, enabled: bool) -> Self {
        self.default_specs = enabled;
        self
    }

    /// Seed with the user specs (default: true)
    pub fn user_specs(mut self, enabled: bool) -> Self {
        self.user_specs = enabled;
        self
    }

    /// Provider of the built-in and user layers
    pub fn base(mut self, base: Arc<dyn BaseSpecs>) -> Self {
        self.base = Some(base);
        self
    }

    pub fn build(self) -> Result<CfSpecs, CfError> {
        let base: Arc<dyn BaseSpecs> = match self.base {
            Some(base) => base,
            None => Arc::new(BuiltinSpecs::new()),
        };

        let mut layers: Vec<LoadedSource> = Vec::new();
        if self.default_specs {
            layers.push(base.default_mapping()?);
        }
        if self.user_specs {
            if let Some(user) = base.user_mapping()? {
                layers.push(user);
            }
        }
        for source in self.sources {
            layers.extend(source.load()?);
        }

        CfSpecs::from_layers(layers)
    }
}

impl CfSpecs {
    pub fn builder() -> CfSpecsBuilder {
        CfSpecsBuilder::default()
    }

    /// Built-in and user specs overridden by a source
    pub fn new(source: impl Into<SpecsSource>) -> Result<Self, CfError> {
        Self::builder().source(source).build()
    }

    /// Built-in and user specs only
    pub fn default_specs() -> Result<Self, CfError> {
        Self::builder().build()
    }

    fn from_layers(layers: Vec<LoadedSource>) -> Result<Self, CfError> {
        let (values, records): (Vec<Value>, Vec<_>) = layers
            .into_iter()
            .map(|layer| (layer.value, layer.record))
            .unzip();

        debug!(layers = values.len(), "Merging specs sources");
        let merged = merge_sources(values)?;
        Self::from_mapping(merged, SpecsProvenance::new(records))
    }

    fn from_mapping(raw: Value, provenance: SpecsProvenance) -> Result<Self, CfError> {
        let Some(map) = raw.as_object() else {
            return Err(CfError::Config(format!(
                "specs must be a mapping, got {}",
                kind_of(&raw)
            )));
        };

        for key in map.keys() {
            if !KNOWN_SECTIONS.contains(&key.as_str()) {
                warn!(section = %key, "Ignoring unknown specs section");
            }
        }

        let (data_vars_order, coords_order) = parse_search_orders(map.get("search_order"))?;
        let sglocator = SgLocator::from_value(map.get("sglocator"))?;
        let data_vars = SpecCategory::build(Category::DataVars, map.get("data_vars"), data_vars_order)?;
        let coords = SpecCategory::build(Category::Coords, map.get("coords"), coords_order)?;
        let name = parse_register_name(map.get("register"))?;
        let dims = index_dims(&coords);

        debug!(
            name = ?name,
            data_vars = data_vars.len(),
            coords = coords.len(),
            "Built specs"
        );

        Ok(Self {
            name,
            data_vars,
            coords,
            sglocator,
            dims,
            raw,
            provenance,
        })
    }

    /// Merge a source on top of the current specs and rebuild.
    ///
    /// Nothing changes when the rebuild fails.
    pub fn load_cfg(&mut self, source: impl Into<SpecsSource>) -> Result<&mut Self, CfError> {
        let layers = source.into().load()?;

        // The current raw mapping stands for the sources already recorded
        let mut values = vec![self.raw.clone()];
        let mut sources = self.provenance.sources.clone();
        for layer in layers {
            values.push(layer.value);
            sources.push(layer.record);
        }

        let merged = merge_sources(values)?;
        *self = Self::from_mapping(merged, SpecsProvenance::new(sources))?;
        Ok(self)
    }

    /// Merge the fields of a single record
    pub fn set_specs(
        &mut self,
        category: Category,
        id: &str,
        fields: Value,
    ) -> Result<&mut Self, CfError> {
        let mut records = Map::new();
        records.insert(id.to_string(), fields);
        let mut mapping = Map::new();
        mapping.insert(category.as_str().to_string(), Value::Object(records));
        self.load_cfg(Value::Object(mapping))
    }

    /// Registration name (`register.name`)
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn data_vars(&self) -> &SpecCategory {
        &self.data_vars
    }

    pub fn coords(&self) -> &SpecCategory {
        &self.coords
    }

    pub fn category(&self, category: Category) -> &SpecCategory {
        match category {
            Category::DataVars => &self.data_vars,
            Category::Coords => &self.coords,
        }
    }

    pub fn categories(&self) -> [&SpecCategory; 2] {
        [&self.data_vars, &self.coords]
    }

    pub fn sglocator(&self) -> &SgLocator {
        &self.sglocator
    }

    /// Known dimension names per axis, lower case
    pub fn dims(&self) -> &IndexMap<Axis, Vec<String>> {
        &self.dims
    }

    pub fn provenance(&self) -> &SpecsProvenance {
        &self.provenance
    }

    /// The merged, unresolved mapping
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Resolved mapping, usable as a source
    pub fn to_mapping(&self) -> Value {
        let mut map = Map::new();
        if let Some(name) = &self.name {
            map.insert("register".to_string(), json!({ "name": name }));
        }
        map.insert(
            "search_order".to_string(),
            json!({
                "data_vars": self.data_vars.default_search_order().to_string(),
                "coords": self.coords.default_search_order().to_string(),
            }),
        );
        map.insert("sglocator".to_string(), self.sglocator.to_value());
        map.insert("data_vars".to_string(), self.data_vars.to_value());
        map.insert("coords".to_string(), self.coords.to_value());
        Value::Object(map)
    }

    /// Record of an id, looked up in data_vars then coords
    pub fn get(&self, id: &str) -> Option<&SpecRecord> {
        self.data_vars.get(id).or_else(|| self.coords.get(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    fn record(&self, id: &str) -> Result<&SpecRecord, CfError> {
        self.get(id).ok_or_else(|| CfError::unknown("id", id))
    }

    pub fn engine(&self) -> MatchEngine<'_> {
        MatchEngine::new(self)
    }

    pub fn formatter(&self) -> Formatter<'_> {
        Formatter::new(self)
    }

    pub fn match_array(
        &self,
        array: &DataArray,
        category: Category,
        id: Option<&str>,
    ) -> Result<Option<&SpecRecord>, CfError> {
        self.engine().match_array(array, category, id)
    }

    pub fn match_data_var(
        &self,
        array: &DataArray,
        id: Option<&str>,
    ) -> Result<Option<&SpecRecord>, CfError> {
        self.match_array(array, Category::DataVars, id)
    }

    pub fn match_coord(
        &self,
        array: &DataArray,
        id: Option<&str>,
    ) -> Result<Option<&SpecRecord>, CfError> {
        self.match_array(array, Category::Coords, id)
    }

    /// Match an array in whichever category fits it
    pub fn match_any(&self, array: &DataArray) -> Option<(Category, &SpecRecord)> {
        self.engine().match_any(array)
    }

    /// Match an array whose location passes a filter
    pub fn match_array_at(
        &self,
        array: &DataArray,
        category: Category,
        id: Option<&str>,
        loc: &LocFilter,
    ) -> Result<Option<&SpecRecord>, CfError> {
        self.engine().match_array_at(array, category, id, loc)
    }

    /// First child of a container matching a category, or both categories.
    ///
    /// Without a category, datasets are searched in data_vars then coords
    /// and arrays in coords then data_vars. With an id, only categories
    /// declaring it are searched. A plain array is searched through its
    /// attached coordinates, or itself as a data variable.
    pub fn search<'c, C>(
        &self,
        container: &'c C,
        category: Option<Category>,
        id: Option<&str>,
    ) -> Result<Option<(&'c DataArray, &SpecRecord)>, CfError>
    where
        C: Searchable + ?Sized,
    {
        self.search_at(container, category, id, &LocFilter::Any)
    }

    /// Like [`search`](Self::search), restricted to a location
    pub fn search_at<'c, C>(
        &self,
        container: &'c C,
        category: Option<Category>,
        id: Option<&str>,
        loc: &LocFilter,
    ) -> Result<Option<(&'c DataArray, &SpecRecord)>, CfError>
    where
        C: Searchable + ?Sized,
    {
        let engine = self.engine();
        for category in self.search_categories(container, category, id)? {
            if let Some(found) = engine.search(container, category, id, loc)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Every matching child of a container, category by category in the
    /// order [`search`](Self::search) uses. An array matching in both
    /// categories is listed once.
    pub fn search_all<'c, C>(
        &self,
        container: &'c C,
        category: Option<Category>,
        id: Option<&str>,
        loc: &LocFilter,
    ) -> Result<Vec<(&'c DataArray, &SpecRecord)>, CfError>
    where
        C: Searchable + ?Sized,
    {
        let engine = self.engine();
        let mut found: Vec<(&'c DataArray, &SpecRecord)> = Vec::new();
        for category in self.search_categories(container, category, id)? {
            for (array, record) in engine.search_all(container, category, id, loc)? {
                if !found.iter().any(|(seen, _)| std::ptr::eq(*seen, array)) {
                    found.push((array, record));
                }
            }
        }
        Ok(found)
    }

    fn search_categories<C>(
        &self,
        container: &C,
        category: Option<Category>,
        id: Option<&str>,
    ) -> Result<Vec<Category>, CfError>
    where
        C: Searchable + ?Sized,
    {
        if let Some(category) = category {
            return Ok(vec![category]);
        }
        let order = if container.is_dataset() {
            [Category::DataVars, Category::Coords]
        } else {
            [Category::Coords, Category::DataVars]
        };
        let order: Vec<Category> = order
            .into_iter()
            .filter(|c| id.map_or(true, |id| self[*c].contains(id)))
            .collect();
        if let (Some(id), true) = (id, order.is_empty()) {
            return Err(CfError::unknown("id", id));
        }
        Ok(order)
    }

    pub fn search_data_var<'c, C>(
        &self,
        container: &'c C,
        id: Option<&str>,
    ) -> Result<Option<(&'c DataArray, &SpecRecord)>, CfError>
    where
        C: Searchable + ?Sized,
    {
        self.search(container, Some(Category::DataVars), id)
    }

    pub fn search_coord<'c, C>(
        &self,
        container: &'c C,
        id: Option<&str>,
    ) -> Result<Option<(&'c DataArray, &SpecRecord)>, CfError>
    where
        C: Searchable + ?Sized,
    {
        self.search(container, Some(Category::Coords), id)
    }

    pub fn format_data_var<'r>(
        &self,
        array: &DataArray,
        target: impl Into<FormatTarget<'r>>,
    ) -> Result<DataArray, CfError> {
        self.formatter()
            .format_array(array, target, Category::DataVars, &FormatOptions::default())
    }

    pub fn format_coord<'r>(
        &self,
        array: &DataArray,
        target: impl Into<FormatTarget<'r>>,
    ) -> Result<DataArray, CfError> {
        self.formatter()
            .format_array(array, target, Category::Coords, &FormatOptions::default())
    }

    /// Format every matching array of a dataset, or a single array
    pub fn auto_format<T: AutoFormat>(&self, target: &T) -> Result<T, CfError> {
        self.auto_format_with(target, &FormatOptions::default())
    }

    pub fn auto_format_with<T: AutoFormat>(
        &self,
        target: &T,
        options: &FormatOptions,
    ) -> Result<T, CfError> {
        target.auto_format_with(&self.formatter(), options)
    }

    /// Add missing attributes without renaming anything
    pub fn fill_attrs<T: AutoFormat>(&self, target: &T) -> Result<T, CfError> {
        self.auto_format_with(target, &FormatOptions::fill())
    }

    /// Canonical name of an id
    pub fn get_name(&self, id: &str) -> Result<&str, CfError> {
        self.record(id).map(SpecRecord::canonical_name)
    }

    /// Canonical name of an id at a grid location
    pub fn get_name_at(&self, id: &str, loc: Option<&str>) -> Result<String, CfError> {
        let name = self.get_name(id)?;
        self.sglocator.format(LocAttr::Name, name, loc)
    }

    /// First declared value of every attribute kind of an id
    pub fn get_attrs(&self, id: &str) -> Result<IndexMap<String, String>, CfError> {
        let category = if self.data_vars.contains(id) {
            &self.data_vars
        } else {
            &self.coords
        };
        category.get_attrs(id).map_err(|_| CfError::unknown("id", id))
    }

    /// Axis of a coordinate, from its `axis` attribute or its match
    pub fn get_axis(&self, coord: &DataArray) -> Option<Axis> {
        if let Some(axis) = coord.attr_str("axis") {
            return axis.parse().ok();
        }
        self.coords
            .records()
            .find(|record| self.engine().is_match(coord, record))
            .and_then(SpecRecord::axis)
    }

    /// Axis of a dimension from its name, ignoring any location
    pub fn get_dim_type(&self, dim: &str) -> Option<Axis> {
        let (root, _) = self.sglocator.parse(LocAttr::Name, dim);
        let root = root.to_lowercase();
        self.dims
            .iter()
            .find(|(_, names)| names.contains(&root))
            .map(|(axis, _)| *axis)
    }

    /// Axis of a dimension of an array.
    ///
    /// Known dimension names come first, then the axis of the coordinate
    /// named after the dimension, then the axis of a 1-D array itself.
    pub fn get_dim_type_in(&self, array: &DataArray, dim: &str) -> Option<Axis> {
        if let Some(axis) = self.get_dim_type(dim) {
            return Some(axis);
        }
        if !array.has_dim(dim) {
            return None;
        }
        if let Some(coord) = array.coords.get(dim) {
            return self.get_axis(coord);
        }
        if array.ndim() == 1 {
            return self.get_axis(array);
        }
        None
    }

    /// Axis of every dimension of an array, `None` when unknown
    pub fn get_dim_types(&self, array: &DataArray) -> Vec<Option<Axis>> {
        array
            .dim_names()
            .map(|dim| self.get_dim_type_in(array, dim))
            .collect()
    }

    /// Name of the dimension of an array with a given axis.
    ///
    /// With a location, dimensions carrying another location are skipped;
    /// dimensions without any location are still considered.
    pub fn search_dim<'d>(
        &self,
        array: &'d DataArray,
        axis: Axis,
        loc: &LocFilter,
    ) -> Option<&'d str> {
        array.dim_names().find(|dim| {
            let (_, dim_loc) = self.sglocator.parse(LocAttr::Name, dim);
            let skipped = match (loc, dim_loc.as_deref()) {
                (LocFilter::At(want), Some(dim_loc)) => want != dim_loc,
                _ => false,
            };
            !skipped && self.get_dim_type_in(array, dim) == Some(axis)
        })
    }

    /// Dimension of a coordinate along its own axis, with that axis.
    ///
    /// A 1-D coordinate falls back to its only dimension even when its
    /// axis is unknown.
    pub fn search_coord_dim<'d>(&self, coord: &'d DataArray) -> Option<(&'d str, Option<Axis>)> {
        if let Some(axis) = self.get_axis(coord) {
            let found = coord
                .dim_names()
                .find(|dim| self.get_dim_type_in(coord, dim) == Some(axis));
            if let Some(dim) = found {
                return Some((dim, Some(axis)));
            }
        }
        match coord.dims.as_slice() {
            [only] => Some((only.name.as_str(), self.get_dim_type_in(coord, &only.name))),
            _ => None,
        }
    }

    /// Coordinate of an array that describes one of its dimensions.
    ///
    /// A coordinate named after the dimension wins when no other coordinate
    /// spans it. Otherwise the coordinate with the dimension's axis is
    /// taken, those with more dimensions first.
    pub fn search_from_dim<'d>(
        &self,
        array: &'d DataArray,
        dim: &str,
    ) -> Result<Option<&'d DataArray>, CfError> {
        if !array.has_dim(dim) {
            return Err(CfError::Data(ArrayError::UnknownDim(dim.to_string())));
        }

        if let Some(coord) = array.coords.get(dim) {
            let shared = array
                .coords
                .iter()
                .any(|(key, other)| key != dim && other.has_dim(dim));
            if !shared {
                return Ok(Some(coord));
            }
        }

        let Some(axis) = self.get_dim_type_in(array, dim) else {
            return Ok(None);
        };
        let mut spanning: Vec<&DataArray> =
            array.coords.values().filter(|c| c.has_dim(dim)).collect();
        spanning.sort_by_key(|c| std::cmp::Reverse(c.ndim()));
        Ok(spanning
            .into_iter()
            .find(|coord| self.get_axis(coord) == Some(axis)))
    }

    /// Dimension names of an array for a list of axes.
    ///
    /// With `allow_positional`, axes not found by name or coordinate fall
    /// back to the usual trailing `t, z, y, x` layout.
    pub fn get_dims<'d>(
        &self,
        array: &'d DataArray,
        axes: &[Axis],
        allow_positional: bool,
    ) -> Vec<Option<&'d str>> {
        if axes.len() > array.ndim() {
            warn!(
                array = ?array.name(),
                ndim = array.ndim(),
                requested = axes.len(),
                "Fewer dimensions than requested axes"
            );
        }

        let mut dims: Vec<Option<&'d str>> = axes
            .iter()
            .map(|axis| self.search_dim(array, *axis, &LocFilter::Any))
            .collect();

        if allow_positional {
            for (found, axis) in dims.iter_mut().zip(axes) {
                if found.is_some() {
                    continue;
                }
                let from_end = POSITIONAL_AXES.iter().position(|a| a == axis);
                *found = from_end
                    .and_then(|i| array.ndim().checked_sub(i + 1))
                    .map(|pos| array.dims[pos].name.as_str());
            }
        }

        for (found, axis) in dims.iter().zip(axes) {
            if found.is_none() {
                warn!(array = ?array.name(), axis = %axis, "No dimension found for axis");
            }
        }
        dims
    }
}

impl PartialEq for CfSpecs {
    /// Provenance and the unresolved mapping do not take part
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.data_vars == other.data_vars
            && self.coords == other.coords
            && self.sglocator == other.sglocator
    }
}

impl Index<Category> for CfSpecs {
    type Output = SpecCategory;

    fn index(&self, category: Category) -> &SpecCategory {
        self.category(category)
    }
}

fn parse_search_orders(value: Option<&Value>) -> Result<(SearchOrder, SearchOrder), CfError> {
    let mut data_vars = SearchOrder::default();
    let mut coords = SearchOrder::default();

    let Some(value) = value.filter(|v| !v.is_null()) else {
        return Ok((data_vars, coords));
    };
    let Some(map) = value.as_object() else {
        return Err(CfError::Config(format!(
            "search_order must be a mapping, got {}",
            kind_of(value)
        )));
    };

    for (key, order) in map {
        let category: Category = key.parse()?;
        let order: SearchOrder = match order.as_str() {
            Some(s) => s.parse()?,
            None => {
                return Err(CfError::InvalidSpec(format!(
                    "search_order.{} must be a string, got {}",
                    key,
                    kind_of(order)
                )));
            }
        };
        match category {
            Category::DataVars => data_vars = order,
            Category::Coords => coords = order,
        }
    }
    Ok((data_vars, coords))
}

fn parse_register_name(value: Option<&Value>) -> Result<Option<String>, CfError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => match map.get("name") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(name)) => Ok(Some(name.clone())),
            Some(other) => Err(CfError::Config(format!(
                "register.name must be a string, got {}",
                kind_of(other)
            ))),
        },
        Some(other) => Err(CfError::Config(format!(
            "register must be a mapping, got {}",
            kind_of(other)
        ))),
    }
}

/// Axis to known dimension names, from coordinates declaring an axis
fn index_dims(coords: &SpecCategory) -> IndexMap<Axis, Vec<String>> {
    let mut dims: IndexMap<Axis, Vec<String>> = IndexMap::new();
    for record in coords.records() {
        let Some(axis) = record.axis() else {
            continue;
        };
        let names = dims.entry(axis).or_default();
        for name in &record.names {
            let name = name.to_lowercase();
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    dims
}

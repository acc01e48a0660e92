//! Category resolution: parsing, inheritance and structural defaults

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{Axis, Category, Domain, SearchOrder, Selection, SpecRecord};
use crate::config::kind_of;
use crate::error::CfError;

/// A single string or a list of strings
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// Record fields as written in a source
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRecord {
    #[serde(default, alias = "names")]
    name: Option<OneOrMany>,
    #[serde(default)]
    attrs: IndexMap<String, OneOrMany>,
    #[serde(default)]
    search_order: Option<SearchOrder>,
    #[serde(default)]
    inherit: Option<String>,
    #[serde(default)]
    domain: Option<Domain>,
    #[serde(default)]
    select: Option<Selection>,
    #[serde(default)]
    squeeze: Option<Vec<String>>,
    #[serde(default)]
    cmap: Option<String>,
}

/// A record whose unset fields may still come from its parent
#[derive(Debug, Clone)]
struct Partial {
    names: Option<Vec<String>>,
    attrs: IndexMap<String, Vec<String>>,
    search_order: Option<SearchOrder>,
    inherit: Option<String>,
    domain: Option<Domain>,
    select: Option<Selection>,
    squeeze: Option<Vec<String>>,
    cmap: Option<String>,
}

impl From<RawRecord> for Partial {
    fn from(raw: RawRecord) -> Self {
        let mut attrs: IndexMap<String, Vec<String>> = raw
            .attrs
            .into_iter()
            .map(|(kind, values)| (kind, values.into_vec()))
            .filter(|(_, values)| !values.is_empty())
            .collect();

        // A record naming its own standard_name describes itself with it,
        // before anything is inherited
        if !attrs.contains_key("long_name") {
            if let Some(standard_name) = attrs.get("standard_name").and_then(|v| v.first()) {
                let long_name = humanize(standard_name);
                attrs.insert("long_name".to_string(), vec![long_name]);
            }
        }

        Self {
            names: raw.name.map(OneOrMany::into_vec),
            attrs,
            search_order: raw.search_order,
            inherit: raw.inherit,
            domain: raw.domain,
            select: raw.select,
            squeeze: raw.squeeze,
            cmap: raw.cmap,
        }
    }
}

impl Partial {
    /// Fill unset fields from a resolved parent; own values win
    fn inherit_from(self, parent: &Partial) -> Partial {
        let mut attrs = self.attrs;
        for (kind, values) in &parent.attrs {
            let own = attrs.entry(kind.clone()).or_default();
            for value in values {
                if !own.contains(value) {
                    own.push(value.clone());
                }
            }
        }

        Partial {
            names: self.names.or_else(|| parent.names.clone()),
            attrs,
            search_order: self.search_order.or_else(|| parent.search_order.clone()),
            inherit: None,
            domain: self.domain.or(parent.domain),
            select: self.select.or_else(|| parent.select.clone()),
            squeeze: self.squeeze.or_else(|| parent.squeeze.clone()),
            cmap: self.cmap.or_else(|| parent.cmap.clone()),
        }
    }

    fn finalize(
        self,
        id: &str,
        default_order: &SearchOrder,
    ) -> Result<SpecRecord, CfError> {
        let mut names = dedup(self.names.unwrap_or_default());
        if !names.iter().any(|n| n == id) {
            names.insert(0, id.to_string());
        }

        let mut attrs: IndexMap<String, Vec<String>> = self
            .attrs
            .into_iter()
            .map(|(kind, values)| (kind, dedup(values)))
            .collect();

        if !attrs.contains_key("long_name") {
            let source = attrs
                .get("standard_name")
                .and_then(|v| v.first())
                .map(String::as_str)
                .unwrap_or(id);
            attrs.insert("long_name".to_string(), vec![humanize(source)]);
        }

        if let Some(axes) = attrs.get_mut("axis") {
            for axis in axes.iter_mut() {
                let parsed: Axis = axis.parse().map_err(|e| match e {
                    CfError::InvalidSpec(msg) => CfError::InvalidSpec(format!("{}: {}", id, msg)),
                    other => other,
                })?;
                *axis = parsed.as_str().to_string();
            }
            let normalized = dedup(std::mem::take(axes));
            *axes = normalized;
        }

        Ok(SpecRecord {
            id: id.to_string(),
            names,
            attrs,
            search_order: self.search_order.unwrap_or_else(|| default_order.clone()),
            domain: self.domain.unwrap_or_default(),
            select: self.select.filter(|s| !s.is_empty()),
            squeeze: self.squeeze.unwrap_or_default(),
            cmap: self.cmap,
        })
    }
}

/// Resolved records of one category, in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct SpecCategory {
    category: Category,
    default_search_order: SearchOrder,
    records: IndexMap<String, SpecRecord>,
}

impl SpecCategory {
    /// An empty category
    pub fn empty(category: Category, default_search_order: SearchOrder) -> Self {
        Self {
            category,
            default_search_order,
            records: IndexMap::new(),
        }
    }

    /// Resolve the raw entries of a category.
    ///
    /// `raw` is the mapping id -> fields of the merged sources, or None when
    /// the category section is absent.
    pub fn build(
        category: Category,
        raw: Option<&Value>,
        default_search_order: SearchOrder,
    ) -> Result<Self, CfError> {
        let entries = match raw {
            None | Some(Value::Null) => {
                return Ok(Self::empty(category, default_search_order));
            }
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(CfError::Config(format!(
                    "{} must be a mapping, got {}",
                    category,
                    kind_of(other)
                )));
            }
        };

        let mut partials: IndexMap<String, Partial> = IndexMap::new();
        for (id, fields) in entries {
            let raw: RawRecord = serde_json::from_value(fields.clone()).map_err(|e| {
                CfError::InvalidSpec(format!("{}.{}: {}", category, id, e))
            })?;
            partials.insert(id.clone(), raw.into());
        }

        check_inherit_targets(category, &partials)?;
        let resolved = resolve_inheritance(category, partials)?;

        let records = resolved
            .into_iter()
            .map(|(id, partial)| {
                let record = partial.finalize(&id, &default_search_order)?;
                Ok((id, record))
            })
            .collect::<Result<IndexMap<_, _>, CfError>>()?;

        debug!(category = %category, records = records.len(), "Resolved category");

        Ok(Self {
            category,
            default_search_order,
            records,
        })
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn default_search_order(&self) -> &SearchOrder {
        &self.default_search_order
    }

    pub fn get(&self, id: &str) -> Option<&SpecRecord> {
        self.records.get(id)
    }

    /// Get a record, failing on unknown ids
    pub fn record(&self, id: &str) -> Result<&SpecRecord, CfError> {
        self.records
            .get(id)
            .ok_or_else(|| CfError::unknown(self.kind(), id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Records in declaration order
    pub fn records(&self) -> impl Iterator<Item = &SpecRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Canonical name of a record
    pub fn get_name(&self, id: &str) -> Result<&str, CfError> {
        self.record(id).map(SpecRecord::canonical_name)
    }

    /// First declared value of every attribute kind of a record
    pub fn get_attrs(&self, id: &str) -> Result<IndexMap<String, String>, CfError> {
        let record = self.record(id)?;
        Ok(record
            .attrs
            .iter()
            .filter_map(|(kind, values)| values.first().map(|v| (kind.clone(), v.clone())))
            .collect())
    }

    /// Mapping form, suitable as a source again
    pub fn to_value(&self) -> Value {
        let map: serde_json::Map<String, Value> = self
            .records
            .iter()
            .map(|(id, record)| {
                let value = serde_json::to_value(record).unwrap_or(Value::Null);
                (id.clone(), value)
            })
            .collect();
        Value::Object(map)
    }

    fn kind(&self) -> &'static str {
        match self.category {
            Category::DataVars => "data_vars id",
            Category::Coords => "coords id",
        }
    }
}

fn check_inherit_targets(
    category: Category,
    partials: &IndexMap<String, Partial>,
) -> Result<(), CfError> {
    for (id, partial) in partials {
        if let Some(parent) = &partial.inherit {
            if parent == id {
                return Err(CfError::CyclicInheritance {
                    category: category.to_string(),
                    cycle: vec![id.clone(), id.clone()],
                });
            }
            if !partials.contains_key(parent) {
                return Err(CfError::unknown(
                    "inherit target",
                    format!("{}.{} (from {})", category, parent, id),
                ));
            }
        }
    }
    Ok(())
}

/// Resolve inherit chains in passes until every record is resolved.
///
/// Output keeps declaration order.
fn resolve_inheritance(
    category: Category,
    partials: IndexMap<String, Partial>,
) -> Result<IndexMap<String, Partial>, CfError> {
    let order: Vec<String> = partials.keys().cloned().collect();
    let mut resolved: IndexMap<String, Partial> = IndexMap::new();
    let mut pending: IndexMap<String, Partial> = IndexMap::new();

    for (id, partial) in partials {
        if partial.inherit.is_none() {
            resolved.insert(id, partial);
        } else {
            pending.insert(id, partial);
        }
    }

    while !pending.is_empty() {
        let ready: Vec<String> = pending
            .iter()
            .filter(|(_, p)| {
                p.inherit
                    .as_ref()
                    .is_some_and(|parent| resolved.contains_key(parent))
            })
            .map(|(id, _)| id.clone())
            .collect();

        if ready.is_empty() {
            return Err(CfError::CyclicInheritance {
                category: category.to_string(),
                cycle: find_cycle(&pending),
            });
        }

        for id in ready {
            if let Some(partial) = pending.shift_remove(&id) {
                let parent_id = partial.inherit.clone().unwrap_or_default();
                let merged = match resolved.get(&parent_id) {
                    Some(parent) => partial.inherit_from(parent),
                    None => partial,
                };
                debug!(category = %category, id = %id, parent = %parent_id, "Inherited");
                resolved.insert(id, merged);
            }
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|id| resolved.shift_remove(&id).map(|p| (id, p)))
        .collect())
}

/// Walk inherit pointers from the first pending record until one repeats
fn find_cycle(pending: &IndexMap<String, Partial>) -> Vec<String> {
    let mut path: Vec<String> = Vec::new();
    let mut current = pending.keys().next().cloned();

    while let Some(id) = current {
        if let Some(start) = path.iter().position(|p| p == &id) {
            let mut cycle = path.split_off(start);
            cycle.push(id);
            return cycle;
        }
        current = pending.get(&id).and_then(|p| p.inherit.clone());
        path.push(id);
    }
    path
}

fn dedup(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

/// "sea_water_temperature" -> "Sea water temperature"
fn humanize(text: &str) -> String {
    let spaced = text.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build(raw: Value) -> Result<SpecCategory, CfError> {
        SpecCategory::build(Category::DataVars, Some(&raw), SearchOrder::default())
    }

    #[test]
    fn test_id_prepended_to_names() {
        let cat = build(json!({"temp": {"name": ["tem", "temperature"]}})).unwrap();
        assert_eq!(cat.get("temp").unwrap().names, vec!["temp", "tem", "temperature"]);
    }

    #[test]
    fn test_id_kept_in_place_when_listed() {
        let cat = build(json!({"temp": {"name": ["tem", "temp"]}})).unwrap();
        assert_eq!(cat.get_name("temp").unwrap(), "tem");
    }

    #[test]
    fn test_names_alias_and_single_string() {
        let cat = build(json!({"sal": {"names": "psal"}})).unwrap();
        assert_eq!(cat.get("sal").unwrap().names, vec!["sal", "psal"]);
    }

    #[test]
    fn test_long_name_derived() {
        let cat = build(json!({
            "temp": {"attrs": {"standard_name": "sea_water_temperature"}},
            "mld": {}
        }))
        .unwrap();
        assert_eq!(
            cat.get("temp").unwrap().first_attr("long_name"),
            Some("Sea water temperature")
        );
        assert_eq!(cat.get("mld").unwrap().first_attr("long_name"), Some("Mld"));
    }

    #[test]
    fn test_inherit_fills_unset_fields() {
        let cat = build(json!({
            "temp": {
                "name": ["temp", "tem"],
                "domain": "ocean",
                "cmap": "thermal",
                "attrs": {"standard_name": "sea_water_temperature", "units": "degC"}
            },
            "sst": {
                "inherit": "temp",
                "name": "sst",
                "attrs": {"standard_name": "sea_surface_temperature"}
            }
        }))
        .unwrap();

        let sst = cat.get("sst").unwrap();
        assert_eq!(sst.names, vec!["sst"]);
        assert_eq!(sst.domain, Domain::Ocean);
        assert_eq!(sst.cmap.as_deref(), Some("thermal"));
        assert_eq!(
            sst.attr_values("standard_name"),
            &["sea_surface_temperature", "sea_water_temperature"]
        );
        assert_eq!(sst.first_attr("long_name"), Some("Sea surface temperature"));
        assert_eq!(sst.first_attr("units"), Some("degC"));
    }

    #[test]
    fn test_inherit_chain_declared_out_of_order() {
        let cat = build(json!({
            "c": {"inherit": "b"},
            "b": {"inherit": "a", "cmap": "b"},
            "a": {"domain": "atmos", "cmap": "a"}
        }))
        .unwrap();
        let c = cat.get("c").unwrap();
        assert_eq!(c.cmap.as_deref(), Some("b"));
        assert_eq!(c.domain, Domain::Atmos);
        let ids: Vec<&str> = cat.ids().collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_cycle_detected() {
        let err = build(json!({
            "a": {"inherit": "b"},
            "b": {"inherit": "a"}
        }))
        .unwrap_err();
        match err {
            CfError::CyclicInheritance { category, cycle } => {
                assert_eq!(category, "data_vars");
                assert_eq!(cycle, vec!["a", "b", "a"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cycle_behind_chain() {
        let err = build(json!({
            "a": {"inherit": "b"},
            "b": {"inherit": "c"},
            "c": {"inherit": "b"}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("b -> c -> b"));
    }

    #[test]
    fn test_self_inherit() {
        let err = build(json!({"a": {"inherit": "a"}})).unwrap_err();
        assert!(matches!(err, CfError::CyclicInheritance { .. }));
    }

    #[test]
    fn test_unknown_inherit_target() {
        let err = build(json!({"sst": {"inherit": "temp"}})).unwrap_err();
        assert!(matches!(err, CfError::UnknownSpec { kind: "inherit target", .. }));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = build(json!({"temp": {"nmae": "t"}})).unwrap_err();
        assert!(matches!(err, CfError::InvalidSpec(_)));
        assert!(err.to_string().contains("data_vars.temp"));
    }

    #[test]
    fn test_unknown_search_code_rejected() {
        let err = build(json!({"temp": {"search_order": "snx"}})).unwrap_err();
        assert!(matches!(err, CfError::InvalidSpec(_)));
    }

    #[test]
    fn test_search_order_default_and_override() {
        let default: SearchOrder = "n".parse().unwrap();
        let raw = json!({"a": {}, "b": {"search_order": "u"}});
        let cat = SpecCategory::build(Category::Coords, Some(&raw), default.clone()).unwrap();
        assert_eq!(cat.get("a").unwrap().search_order, default);
        assert_eq!(cat.get("b").unwrap().search_order.to_string(), "u");
    }

    #[test]
    fn test_axis_normalized() {
        let raw = json!({"lon": {"attrs": {"axis": "x"}}});
        let cat = SpecCategory::build(Category::Coords, Some(&raw), SearchOrder::default())
            .unwrap();
        assert_eq!(cat.get("lon").unwrap().first_attr("axis"), Some("X"));
    }

    #[test]
    fn test_invalid_axis() {
        let raw = json!({"lon": {"attrs": {"axis": "Q"}}});
        let err = SpecCategory::build(Category::Coords, Some(&raw), SearchOrder::default())
            .unwrap_err();
        assert!(err.to_string().contains("lon"));
    }

    #[test]
    fn test_attrs_deduplicated() {
        let cat = build(json!({"u": {"attrs": {"units": ["m s-1", "m/s", "m s-1"]}}})).unwrap();
        assert_eq!(cat.get("u").unwrap().attr_values("units"), &["m s-1", "m/s"]);
    }

    #[test]
    fn test_rebuild_from_own_mapping_is_identical() {
        let cat = build(json!({
            "temp": {"attrs": {"standard_name": "sea_water_temperature"}},
            "sst": {"inherit": "temp", "name": "sst", "select": {"depth": -1}}
        }))
        .unwrap();
        let again = build(cat.to_value()).unwrap();
        assert_eq!(cat, again);
    }

    #[test]
    fn test_get_attrs_first_values() {
        let cat = build(json!({"temp": {"attrs": {"units": ["degC", "K"]}}})).unwrap();
        let attrs = cat.get_attrs("temp").unwrap();
        assert_eq!(attrs["units"], "degC");
        assert_eq!(attrs["long_name"], "Temp");
        assert!(matches!(
            cat.get_attrs("sal"),
            Err(CfError::UnknownSpec { .. })
        ));
    }

    #[test]
    fn test_non_mapping_category() {
        let raw = json!(["temp"]);
        let err = SpecCategory::build(Category::DataVars, Some(&raw), SearchOrder::default())
            .unwrap_err();
        assert!(matches!(err, CfError::Config(_)));
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize("sea_water_X_velocity"), "Sea water x velocity");
        assert_eq!(humanize(""), "");
    }
}

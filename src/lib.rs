//! cfspecs - convention matching for labeled scientific arrays
//!
//! Declarative specifications describe known physical quantities (sea water
//! temperature, longitude, ...). This crate decides whether an arbitrary
//! labeled array is an instance of one of them, by its name and attributes,
//! and rewrites identified arrays into their canonical name and attributes.
//!
//! Several specification sets ("profiles") may be merged with priority
//! ordering, registered under names and selected per dataset.

pub mod cfspecs;
pub mod config;
pub mod error;
pub mod formatter;
pub mod matcher;
pub mod registry;
pub mod sglocator;
pub mod specs;

pub use cf_array::{ArrayError, DataArray, Dataset, Dim};
pub use cfspecs::{CfSpecs, CfSpecsBuilder};
pub use config::{BaseSpecs, BuiltinSpecs, SpecsProvenance, SpecsSource};
pub use error::CfError;
pub use formatter::{AutoFormat, FormatOptions, FormatTarget, Formatter, LocationPolicy};
pub use matcher::{MatchEngine, Searchable};
pub use registry::{
    get_best_specs, get_current_specs, register_specs, registered_names, set_current_specs,
    set_current_specs_from, ProfileHint, Registry, ScopeId, SpecsGuard, PROFILE_HINT_KEY,
};
pub use sglocator::{LocAttr, LocFilter, SgLocator};
pub use specs::{
    Axis, Category, Domain, SearchCode, SearchOrder, Selection, Selector, SliceSpec, SpecCategory,
    SpecRecord,
};

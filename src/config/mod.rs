//! Specification sources and their merge
//!
//! Layers, lowest priority first:
//! 1. Built-in specs (embedded cf.toml)
//! 2. User specs (~/.config/cfspecs/cf.toml)
//! 3. Explicit sources, in the order given

mod defaults;
mod merge;
mod provenance;
mod source;

pub use defaults::{BaseSpecs, BuiltinSpecs, BUILTIN_SPECS, USER_FILE_ENV};
pub use merge::{deep_merge, merge_layers, merge_sources};
pub use provenance::{digest_bytes, digest_value, SourceOrigin, SourceRecord, SpecsProvenance};
pub use source::{LoadedSource, SpecsSource};

pub(crate) use merge::kind_of;

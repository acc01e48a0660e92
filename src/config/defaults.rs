//! Built-in and user-level base layers
//!
//! The built-in specifications are embedded at compile time. The user
//! layer is an optional file discovered from the environment.

use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::provenance::{digest_bytes, SourceOrigin};
use super::source::{load_file, parse_toml, LoadedSource};
use crate::error::CfError;

/// Embedded built-in specifications (TOML)
pub const BUILTIN_SPECS: &str = include_str!("cf.toml");

/// Environment variable naming the user override file
pub const USER_FILE_ENV: &str = "CFSPECS_USER_FILE";

/// Provider of the two base layers under explicit sources
pub trait BaseSpecs: Send + Sync + std::fmt::Debug {
    /// The default mapping, lowest priority
    fn default_mapping(&self) -> Result<LoadedSource, CfError>;

    /// The user mapping, or None when there is no user layer
    fn user_mapping(&self) -> Result<Option<LoadedSource>, CfError>;
}

/// Embedded defaults plus an optional user file
#[derive(Debug, Clone, Default)]
pub struct BuiltinSpecs {
    user_file: Option<PathBuf>,
}

impl BuiltinSpecs {
    /// Discover the user file from the environment
    pub fn new() -> Self {
        Self {
            user_file: discover_user_file(),
        }
    }

    pub fn with_user_file(path: impl Into<PathBuf>) -> Self {
        Self {
            user_file: Some(path.into()),
        }
    }

    pub fn without_user_file() -> Self {
        Self { user_file: None }
    }

    pub fn user_file(&self) -> Option<&Path> {
        self.user_file.as_deref()
    }
}

impl BaseSpecs for BuiltinSpecs {
    fn default_mapping(&self) -> Result<LoadedSource, CfError> {
        let value = parse_toml(BUILTIN_SPECS, "built-in specs")?;
        Ok(LoadedSource::new(
            value,
            SourceOrigin::Builtin,
            None,
            digest_bytes(BUILTIN_SPECS.as_bytes()),
        ))
    }

    fn user_mapping(&self) -> Result<Option<LoadedSource>, CfError> {
        match &self.user_file {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "Loading user specs");
                load_file(path, SourceOrigin::User).map(Some)
            }
            Some(path) => {
                debug!(path = %path.display(), "No user specs file");
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

/// First candidate user file from the environment, existing or not
fn discover_user_file() -> Option<PathBuf> {
    if let Some(path) = env::var_os(USER_FILE_ENV) {
        return Some(PathBuf::from(path));
    }
    default_user_file()
}

/// User file under the platform configuration directory
fn default_user_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| user_file_under(&dir))
}

fn user_file_under(config_dir: &Path) -> PathBuf {
    config_dir.join("cfspecs").join("cf.toml")
}

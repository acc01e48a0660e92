//! Process-wide registry of named specs
//!
//! The registry keeps named [`CfSpecs`] instances plus a "current" one.
//! Scoped activation pushes a new current instance and returns a
//! [`SpecsGuard`]; dropping the guard restores the previous instance,
//! including while unwinding.

use std::ops::Deref;
use std::sync::{Arc, OnceLock};

use cf_array::{DataArray, Dataset};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::cfspecs::CfSpecs;
use crate::config::SpecsSource;
use crate::error::CfError;

/// Attribute or encoding key naming the preferred specs of a dataset
pub const PROFILE_HINT_KEY: &str = "cfspecs";

/// Identifier of one scoped activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

/// Scoped activation and the specs it replaced
#[derive(Debug)]
struct Scope {
    id: ScopeId,
    previous: Option<Arc<CfSpecs>>,
}

/// Named specs and the current instance
#[derive(Debug, Default)]
pub struct Registry {
    named: IndexMap<String, Arc<CfSpecs>>,
    current: Option<Arc<CfSpecs>>,
    stack: Vec<Scope>,
    next_scope: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under `name`, or under the specs' own `register.name`.
    ///
    /// A later registration under the same name replaces the earlier one.
    pub fn register(&mut self, specs: Arc<CfSpecs>, name: Option<&str>) -> Result<String, CfError> {
        let name = match name.or_else(|| specs.name()) {
            Some(name) => name.to_string(),
            None => {
                return Err(CfError::Registration(
                    "no name given and the specs have no register.name".to_string(),
                ));
            }
        };
        debug!(name = %name, "Registering specs");
        self.named.insert(name.clone(), specs);
        Ok(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<CfSpecs>> {
        self.named.get(name).cloned()
    }

    /// Registered names in registration order
    pub fn names(&self) -> Vec<String> {
        self.named.keys().cloned().collect()
    }

    pub fn current(&self) -> Option<Arc<CfSpecs>> {
        self.current.clone()
    }

    /// The current specs, building and installing the default ones if unset
    pub fn current_or_default(&mut self) -> Result<Arc<CfSpecs>, CfError> {
        if let Some(current) = &self.current {
            return Ok(Arc::clone(current));
        }
        debug!("Building default specs");
        let specs = Arc::new(CfSpecs::default_specs()?);
        self.current = Some(Arc::clone(&specs));
        Ok(specs)
    }

    /// Make `specs` current until the returned scope is restored
    pub fn push_current(&mut self, specs: Arc<CfSpecs>) -> ScopeId {
        let id = ScopeId(self.next_scope);
        self.next_scope += 1;
        let previous = self.current.replace(specs);
        self.stack.push(Scope { id, previous });
        id
    }

    /// End a scoped activation.
    ///
    /// The innermost scope gives back the specs it replaced. A scope ended
    /// while newer ones are still active leaves the current specs alone and
    /// hands its own previous specs to the scope above it. Unknown or
    /// already restored scopes are ignored.
    pub fn restore(&mut self, id: ScopeId) {
        let Some(pos) = self.stack.iter().position(|scope| scope.id == id) else {
            return;
        };
        let scope = self.stack.remove(pos);
        match self.stack.get_mut(pos) {
            Some(above) => {
                debug!(scope = id.0, "Restoring a scope out of order");
                above.previous = scope.previous;
            }
            None => self.current = scope.previous,
        }
    }

    /// The registered specs named by a hint, else the current ones
    pub fn best(&self, hint: Option<&str>) -> Option<Arc<CfSpecs>> {
        hint.and_then(|name| self.get(name))
            .or_else(|| self.current())
    }
}

/// Containers declaring which specs they follow
pub trait ProfileHint {
    fn profile_hint(&self) -> Option<&str>;
}

impl ProfileHint for Dataset {
    fn profile_hint(&self) -> Option<&str> {
        self.encoding
            .get(PROFILE_HINT_KEY)
            .and_then(Value::as_str)
            .or_else(|| self.attrs.get(PROFILE_HINT_KEY).and_then(Value::as_str))
    }
}

impl ProfileHint for DataArray {
    fn profile_hint(&self) -> Option<&str> {
        self.encoding
            .get(PROFILE_HINT_KEY)
            .and_then(Value::as_str)
            .or_else(|| self.attr_str(PROFILE_HINT_KEY))
    }
}

/// Handle on a scoped current specs instance
#[must_use = "the previous specs are restored as soon as the guard is dropped"]
#[derive(Debug)]
pub struct SpecsGuard {
    specs: Arc<CfSpecs>,
    scope: ScopeId,
}

impl SpecsGuard {
    pub fn specs(&self) -> &Arc<CfSpecs> {
        &self.specs
    }
}

impl Deref for SpecsGuard {
    type Target = CfSpecs;

    fn deref(&self) -> &CfSpecs {
        &self.specs
    }
}

impl Drop for SpecsGuard {
    fn drop(&mut self) {
        registry().lock().restore(self.scope);
    }
}

static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();

fn registry() -> &'static Mutex<Registry> {
    REGISTRY.get_or_init(|| Mutex::new(Registry::new()))
}

/// Registered specs by name, or the current specs
pub fn get_current_specs(name: Option<&str>) -> Result<Arc<CfSpecs>, CfError> {
    let mut registry = registry().lock();
    match name {
        Some(name) => registry
            .get(name)
            .ok_or_else(|| CfError::unknown("registered specs", name)),
        None => registry.current_or_default(),
    }
}

/// Make specs current until the returned guard is dropped
pub fn set_current_specs(specs: impl Into<Arc<CfSpecs>>) -> SpecsGuard {
    let specs = specs.into();
    let scope = registry().lock().push_current(Arc::clone(&specs));
    SpecsGuard { specs, scope }
}

/// Build specs from a source and make them current
pub fn set_current_specs_from(source: impl Into<SpecsSource>) -> Result<SpecsGuard, CfError> {
    let specs = CfSpecs::new(source)?;
    Ok(set_current_specs(specs))
}

/// Register specs, returning the name used
pub fn register_specs(specs: impl Into<Arc<CfSpecs>>, name: Option<&str>) -> Result<String, CfError> {
    registry().lock().register(specs.into(), name)
}

/// Names registered so far
pub fn registered_names() -> Vec<String> {
    registry().lock().names()
}

/// Specs a container asks for through its profile hint, else the current
/// ones
pub fn get_best_specs<H: ProfileHint + ?Sized>(target: &H) -> Result<Arc<CfSpecs>, CfError> {
    let mut registry = registry().lock();
    match registry.best(target.profile_hint()) {
        Some(specs) => Ok(specs),
        None => registry.current_or_default(),
    }
}

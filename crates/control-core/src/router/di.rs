//! A small typed-singleton registry and initialization-order tracker, used
//! at service startup to assemble a `Deps` aggregate in a validated order.
//!
//! Kept from the teacher's `di::{DependencyRegistry, ContainerBuilder,
//! env_var*}` — the per-dispatch reflection-based injection this module
//! originally also provided is retired per SPEC_FULL §9 (dispatch now takes
//! an explicit `Deps` value), but the bootstrap-time registry is still
//! useful for wiring up collaborators in dependency order before the
//! aggregate is built.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug)]
pub enum DependencyError {
    NotFound(String),
    CircularDependency(Vec<String>),
    InitializationFailed {
        name: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    ConfigError(String),
}

impl std::fmt::Display for DependencyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyError::NotFound(name) => write!(f, "dependency not found: {name}"),
            DependencyError::CircularDependency(chain) => {
                write!(f, "circular dependency: {}", chain.join(" -> "))
            }
            DependencyError::InitializationFailed { name, source } => {
                write!(f, "failed to initialize '{name}': {source}")
            }
            DependencyError::ConfigError(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for DependencyError {}

/// Type-keyed registry of constructed singletons.
#[derive(Default)]
pub struct DependencyRegistry {
    singletons: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_singleton<T: Any + Send + Sync>(&mut self, value: T) {
        self.singletons.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn get_singleton<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.singletons
            .get(&TypeId::of::<T>())
            .and_then(|v| v.clone().downcast::<T>().ok())
    }

    pub fn has_singleton<T: Any + Send + Sync>(&self) -> bool {
        self.singletons.contains_key(&TypeId::of::<T>())
    }
}

/// Tracks the order in which a service's collaborators were brought up, so
/// startup failures name the step that failed rather than an opaque panic.
#[derive(Default)]
pub struct ContainerBuilder {
    initialization_order: Vec<String>,
    initialized: HashSet<String>,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_initialized(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.initialized.insert(name.clone());
        self.initialization_order.push(name);
    }

    pub fn is_initialized(&self, name: &str) -> bool {
        self.initialized.contains(name)
    }

    pub fn initialization_order(&self) -> &[String] {
        &self.initialization_order
    }

    pub fn validate_dependencies(&self, required: &[&str]) -> Result<(), DependencyError> {
        for name in required {
            if !self.is_initialized(name) {
                return Err(DependencyError::NotFound((*name).to_string()));
            }
        }
        Ok(())
    }
}

/// Read a required environment variable.
pub fn env_var(name: &str) -> Result<String, DependencyError> {
    std::env::var(name).map_err(|_| DependencyError::ConfigError(format!("missing env var: {name}")))
}

/// Read an optional environment variable.
pub fn env_var_opt(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Read an environment variable, falling back to `default` if unset.
pub fn env_var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Read and parse an environment variable, falling back to `default` if
/// unset or unparseable.
pub fn env_var_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_stores_and_retrieves_by_type() {
        let mut registry = DependencyRegistry::new();
        registry.store_singleton(42u32);
        assert_eq!(*registry.get_singleton::<u32>().unwrap(), 42);
        assert!(registry.get_singleton::<String>().is_none());
    }

    #[test]
    fn container_builder_tracks_order() {
        let mut builder = ContainerBuilder::new();
        builder.mark_initialized("cache");
        builder.mark_initialized("broker");
        assert_eq!(builder.initialization_order(), &["cache", "broker"]);
        assert!(builder.validate_dependencies(&["cache", "broker"]).is_ok());
        assert!(builder.validate_dependencies(&["missing"]).is_err());
    }

    #[test]
    fn env_var_parse_falls_back_on_missing() {
        let value: u32 = env_var_parse("CONTROL_CORE_TEST_DOES_NOT_EXIST", 7);
        assert_eq!(value, 7);
    }
}

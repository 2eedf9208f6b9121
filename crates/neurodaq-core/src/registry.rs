//! String-keyed factory registry for module instantiation
//!
//! Sources, filters, applications and plugins are resolved by name at
//! startup, keeping the pipeline pluggable without runtime reflection.

use crate::error::{DaqError, DaqResult};
use crate::module::{Application, Plugin, SignalFilter, SignalSource};
use std::collections::HashMap;

type SourceFactory = Box<dyn Fn() -> Box<dyn SignalSource> + Send + Sync>;
type FilterFactory = Box<dyn Fn() -> Box<dyn SignalFilter> + Send + Sync>;
type ApplicationFactory = Box<dyn Fn() -> Box<dyn Application> + Send + Sync>;
type PluginFactory = Box<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

/// Factory registry mapping module names to constructors
#[derive(Default)]
pub struct ModuleRegistry {
    sources: HashMap<String, SourceFactory>,
    filters: HashMap<String, FilterFactory>,
    applications: HashMap<String, ApplicationFactory>,
    plugins: HashMap<String, PluginFactory>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source constructor under `key`
    pub fn register_source<F>(&mut self, key: &str, factory: F)
    where
        F: Fn() -> Box<dyn SignalSource> + Send + Sync + 'static,
    {
        self.sources.insert(key.to_string(), Box::new(factory));
    }

    /// Register a filter constructor under `key`
    pub fn register_filter<F>(&mut self, key: &str, factory: F)
    where
        F: Fn() -> Box<dyn SignalFilter> + Send + Sync + 'static,
    {
        self.filters.insert(key.to_string(), Box::new(factory));
    }

    /// Register an application constructor under `key`
    pub fn register_application<F>(&mut self, key: &str, factory: F)
    where
        F: Fn() -> Box<dyn Application> + Send + Sync + 'static,
    {
        self.applications.insert(key.to_string(), Box::new(factory));
    }

    /// Register a plugin constructor under `key`
    pub fn register_plugin<F>(&mut self, key: &str, factory: F)
    where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        self.plugins.insert(key.to_string(), Box::new(factory));
    }

    /// Instantiate the source registered under `key`
    pub fn create_source(&self, key: &str) -> DaqResult<Box<dyn SignalSource>> {
        self.sources
            .get(key)
            .map(|f| f())
            .ok_or_else(|| DaqError::UnknownModule {
                kind: "source",
                key: key.to_string(),
            })
    }

    /// Instantiate the filter registered under `key`
    pub fn create_filter(&self, key: &str) -> DaqResult<Box<dyn SignalFilter>> {
        self.filters
            .get(key)
            .map(|f| f())
            .ok_or_else(|| DaqError::UnknownModule {
                kind: "filter",
                key: key.to_string(),
            })
    }

    /// Instantiate the application registered under `key`
    pub fn create_application(&self, key: &str) -> DaqResult<Box<dyn Application>> {
        self.applications
            .get(key)
            .map(|f| f())
            .ok_or_else(|| DaqError::UnknownModule {
                kind: "application",
                key: key.to_string(),
            })
    }

    /// Instantiate the plugin registered under `key`
    pub fn create_plugin(&self, key: &str) -> DaqResult<Box<dyn Plugin>> {
        self.plugins
            .get(key)
            .map(|f| f())
            .ok_or_else(|| DaqError::UnknownModule {
                kind: "plugin",
                key: key.to_string(),
            })
    }

    /// Names of all registered source factories
    pub fn source_keys(&self) -> Vec<&str> {
        self.sources.keys().map(String::as_str).collect()
    }

    /// Names of all registered filter factories
    pub fn filter_keys(&self) -> Vec<&str> {
        self.filters.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{PackageFormat, SamplePackage};
    use crate::telemetry::Telemetry;

    struct Identity;

    impl SignalFilter for Identity {
        fn name(&self) -> &str {
            "Identity"
        }

        fn configure(
            &mut self,
            input: &PackageFormat,
            _telemetry: &mut dyn Telemetry,
        ) -> DaqResult<PackageFormat> {
            Ok(*input)
        }

        fn process(
            &mut self,
            input: &SamplePackage,
            _telemetry: &mut dyn Telemetry,
        ) -> DaqResult<SamplePackage> {
            Ok(input.clone())
        }
    }

    #[test]
    fn test_unknown_key() {
        let registry = ModuleRegistry::new();
        let err = registry.create_source("missing").unwrap_err();
        let display = format!("{}", err);
        assert!(display.contains("source"));
        assert!(display.contains("missing"));
    }

    #[test]
    fn test_register_and_create_filter() {
        let mut registry = ModuleRegistry::new();
        registry.register_filter("identity", || Box::new(Identity));

        let filter = registry.create_filter("identity").unwrap();
        assert_eq!(filter.name(), "Identity");
        assert_eq!(registry.filter_keys(), vec!["identity"]);
    }
}

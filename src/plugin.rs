//! Plugin port: pluggable emitters invoked during a load.
//!
//! Two events exist: a parent named by a pointer is missing during edge
//! resolution, or a node finished loading. Plugins are registered under
//! string names and instantiated from `(name, params)` pairs in the
//! configuration.

use std::collections::BTreeMap;

use tracing::info;

use crate::config::PluginConfig;
use crate::error::LoadError;
use crate::graph::GraphStore;
use crate::prepare::PreparedNode;
use crate::stats::LoadCounters;
use crate::value::Value;

/// The event classes a plugin can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginEventKind {
    /// A parent pointer's target does not exist
    MissingParent,
    /// A node and its edges finished loading
    NodeLoaded,
}

/// A concrete event offered to a plugin.
#[derive(Debug)]
pub enum PluginEvent<'a> {
    /// Synthesize the missing parent so the edge can proceed
    MissingParent {
        line: usize,
        kind: &'a str,
        id_field: &'a str,
        id: &'a Value,
        row: &'a PreparedNode,
    },
    /// Derive auxiliary data after a child was loaded
    NodeLoaded { line: usize, row: &'a PreparedNode },
}

impl PluginEvent<'_> {
    /// The event class of this event.
    pub fn kind(&self) -> PluginEventKind {
        match self {
            PluginEvent::MissingParent { .. } => PluginEventKind::MissingParent,
            PluginEvent::NodeLoaded { .. } => PluginEventKind::NodeLoaded,
        }
    }
}

/// A pluggable emitter. `handle` returns true when the plugin produced the
/// node or edge it is responsible for; its counters are merged into the
/// engine totals after a successful load.
pub trait LoaderPlugin {
    /// Registry name of this plugin.
    fn name(&self) -> &str;

    /// Whether this plugin wants the given (node kind, event) combination.
    fn should_run(&self, node_kind: &str, event: PluginEventKind) -> bool;

    /// React to an event, writing through the given store.
    fn handle(
        &mut self,
        store: &mut dyn GraphStore,
        event: &PluginEvent<'_>,
    ) -> Result<bool, LoadError>;

    /// Counters accumulated by this plugin.
    fn counters(&self) -> &LoadCounters;
}

type PluginFactory = Box<dyn Fn(&serde_yaml::Value) -> Result<Box<dyn LoaderPlugin>, LoadError>>;

/// Name-keyed registry of plugin factories.
#[derive(Default)]
pub struct PluginRegistry {
    factories: BTreeMap<String, PluginFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a name. The factory receives the `params`
    /// value from the configuration entry.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&serde_yaml::Value) -> Result<Box<dyn LoaderPlugin>, LoadError> + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Instantiate every configured plugin. Unknown names are a
    /// configuration error.
    pub fn build(&self, configs: &[PluginConfig]) -> Result<Vec<Box<dyn LoaderPlugin>>, LoadError> {
        let mut plugins = Vec::new();
        for config in configs {
            let factory = self
                .factories
                .get(&config.name)
                .ok_or_else(|| LoadError::UnknownPlugin(config.name.clone()))?;
            info!(plugin = %config.name, "instantiating plugin");
            plugins.push(factory(&config.params)?);
        }
        Ok(plugins)
    }
}

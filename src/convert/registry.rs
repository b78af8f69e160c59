//! Ordered plugin catalog with startup dependency resolution.
//!
//! Registration order never matters to callers: the registry resolves the
//! declared dependency constraints once, orders plugins by phase then by
//! descending priority (ties keep resolution order), and stays immutable
//! for the lifetime of the process. Activation toggles flip a per-plugin
//! flag without reordering anything, so they are safe to apply while the
//! executor iterates.

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use thiserror::Error;

use super::plugin::{ConverterPlugin, PluginSpec};
use crate::element::ConversionPhase;

/// Fatal configuration errors detected while resolving the catalog.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// Two plugins declared the same name.
    #[error("duplicate plugin name: {0}")]
    DuplicateName(String),
    /// Plugins remained unresolvable after convergence: a dependency is
    /// circular or names a plugin that was never registered.
    #[error("unresolvable plugin dependencies (circular or missing): {}", pending.join(", "))]
    UnresolvedDependencies {
        /// Names of the plugins that never became ready.
        pending: Vec<String>,
    },
}

/// One resolved catalog slot.
pub struct RegisteredPlugin {
    spec: PluginSpec,
    plugin: Arc<dyn ConverterPlugin>,
    active: AtomicBool,
}

impl RegisteredPlugin {
    /// The plugin's registration declaration.
    #[must_use]
    pub fn spec(&self) -> &PluginSpec { &self.spec }

    /// The plugin implementation.
    #[must_use]
    pub fn plugin(&self) -> &Arc<dyn ConverterPlugin> { &self.plugin }

    /// Whether the plugin currently participates in conversions.
    #[must_use]
    pub fn is_active(&self) -> bool { self.active.load(Ordering::Relaxed) }
}

/// Immutable, dependency-resolved plugin catalog.
pub struct PluginRegistry {
    ordered: Vec<RegisteredPlugin>,
}

impl PluginRegistry {
    /// Resolve a catalog from the registered plugins and the parser
    /// selector that activates optional ones.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] for duplicate names or dependency
    /// constraints that never converge; both are fatal at startup.
    pub fn resolve(
        plugins: Vec<Arc<dyn ConverterPlugin>>,
        selector: &[String],
    ) -> Result<Self, RegistryError> {
        let specs: Vec<PluginSpec> = plugins.iter().map(|p| p.spec()).collect();

        let mut seen = HashSet::new();
        for spec in &specs {
            if !seen.insert(spec.name.clone()) {
                return Err(RegistryError::DuplicateName(spec.name.clone()));
            }
        }

        // Repeatedly promote pending plugins whose dependencies are all
        // satisfied until no further promotion happens.
        let mut pending: Vec<usize> = (0..plugins.len()).collect();
        let mut ready: Vec<usize> = Vec::with_capacity(plugins.len());
        let mut satisfied: HashSet<&str> = HashSet::new();
        loop {
            let mut still_pending = Vec::with_capacity(pending.len());
            let mut moved = false;
            for index in pending {
                let deps = &specs[index].depends_on;
                if deps.iter().all(|dep| satisfied.contains(dep.as_str())) {
                    satisfied.insert(specs[index].name.as_str());
                    ready.push(index);
                    moved = true;
                } else {
                    still_pending.push(index);
                }
            }
            pending = still_pending;
            if pending.is_empty() {
                break;
            }
            if !moved {
                return Err(RegistryError::UnresolvedDependencies {
                    pending: pending
                        .into_iter()
                        .map(|index| specs[index].name.clone())
                        .collect(),
                });
            }
        }

        ready.sort_by_key(|&index| {
            (
                specs[index].phase.ordering_key(),
                std::cmp::Reverse(specs[index].priority),
            )
        });

        let mut plugins: Vec<Option<Arc<dyn ConverterPlugin>>> =
            plugins.into_iter().map(Some).collect();
        let ordered = ready
            .into_iter()
            .map(|index| {
                let spec = specs[index].clone();
                let active = !spec.optional
                    || selector.iter().any(|parser_id| spec.answers_to(parser_id));
                RegisteredPlugin {
                    spec,
                    plugin: plugins[index].take().expect("each index taken once"),
                    active: AtomicBool::new(active),
                }
            })
            .collect();
        Ok(Self { ordered })
    }

    /// Catalog slots registered for `phase`, in execution order.
    pub fn entries_for(
        &self,
        phase: ConversionPhase,
    ) -> impl Iterator<Item = &RegisteredPlugin> {
        self.ordered.iter().filter(move |entry| entry.spec.phase == phase)
    }

    /// Activate or deactivate every plugin answering to `parser_id`.
    ///
    /// Returns how many plugins were toggled. Execution order is unaffected.
    pub fn set_active(&self, parser_id: &str, active: bool) -> usize {
        let mut toggled = 0;
        for entry in &self.ordered {
            if entry.spec.answers_to(parser_id) {
                entry.active.store(active, Ordering::Relaxed);
                toggled += 1;
            }
        }
        toggled
    }

    /// Plugin names in resolved execution order.
    #[must_use]
    pub fn ordered_names(&self) -> Vec<&str> {
        self.ordered.iter().map(|entry| entry.spec.name.as_str()).collect()
    }

    /// Number of registered plugins.
    #[must_use]
    pub fn len(&self) -> usize { self.ordered.len() }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.ordered.is_empty() }
}

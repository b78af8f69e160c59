//! Multi-phase conversion: plugin contract, catalog, and executor.

mod executor;
mod plugin;
mod registry;
#[cfg(test)]
mod tests;

pub use executor::{ConversionExecutor, ConversionOutcome, ConversionStatus};
pub use plugin::{ConversionContext, ConverterPlugin, PluginError, PluginSpec};
pub use registry::{PluginRegistry, RegisteredPlugin, RegistryError};

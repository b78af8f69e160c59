//! Unit tests for catalog resolution and ordering.

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    ConversionContext, ConverterPlugin, PluginError, PluginRegistry, PluginSpec, RegistryError,
};
use crate::element::{ConversionPhase, MessageElement};

struct DeclaredPlugin {
    spec: PluginSpec,
}

#[async_trait]
impl ConverterPlugin for DeclaredPlugin {
    fn spec(&self) -> PluginSpec { self.spec.clone() }

    async fn convert(
        &self,
        _element: &mut MessageElement,
        _ctx: &mut ConversionContext,
    ) -> Result<(), PluginError> {
        Ok(())
    }
}

fn plugin(spec: PluginSpec) -> Arc<dyn ConverterPlugin> { Arc::new(DeclaredPlugin { spec }) }

#[test]
fn orders_by_phase_then_descending_priority() {
    let registry = PluginRegistry::resolve(
        vec![
            plugin(PluginSpec::new("enrich", ConversionPhase::ContentEnrichment)),
            plugin(PluginSpec::new("proto-low", ConversionPhase::ProtocolParsing)),
            plugin(
                PluginSpec::new("proto-high", ConversionPhase::ProtocolParsing).with_priority(10),
            ),
            plugin(PluginSpec::new("prep", ConversionPhase::Preparation)),
        ],
        &[],
    )
    .expect("resolution should succeed");
    assert_eq!(
        registry.ordered_names(),
        vec!["prep", "proto-high", "proto-low", "enrich"]
    );
}

#[test]
fn equal_priority_preserves_registration_order() {
    let registry = PluginRegistry::resolve(
        vec![
            plugin(PluginSpec::new("first", ConversionPhase::ContentParsing)),
            plugin(PluginSpec::new("second", ConversionPhase::ContentParsing)),
            plugin(PluginSpec::new("third", ConversionPhase::ContentParsing)),
        ],
        &[],
    )
    .expect("resolution should succeed");
    assert_eq!(registry.ordered_names(), vec!["first", "second", "third"]);
}

#[test]
fn dependencies_resolve_over_multiple_passes() {
    let registry = PluginRegistry::resolve(
        vec![
            plugin(
                PluginSpec::new("c", ConversionPhase::Preparation)
                    .with_priority(3)
                    .with_dependencies(["b"]),
            ),
            plugin(
                PluginSpec::new("b", ConversionPhase::Preparation)
                    .with_priority(2)
                    .with_dependencies(["a"]),
            ),
            plugin(PluginSpec::new("a", ConversionPhase::Preparation).with_priority(1)),
        ],
        &[],
    )
    .expect("chain should converge");
    assert_eq!(registry.ordered_names(), vec!["c", "b", "a"]);
}

#[test]
fn circular_dependency_is_fatal() {
    let result = PluginRegistry::resolve(
        vec![
            plugin(PluginSpec::new("x", ConversionPhase::Preparation).with_dependencies(["y"])),
            plugin(PluginSpec::new("y", ConversionPhase::Preparation).with_dependencies(["x"])),
        ],
        &[],
    );
    let Err(RegistryError::UnresolvedDependencies { pending }) = result else {
        panic!("cycle must not resolve");
    };
    assert_eq!(pending, vec!["x".to_owned(), "y".to_owned()]);
}

#[test]
fn missing_dependency_is_fatal() {
    let result = PluginRegistry::resolve(
        vec![plugin(
            PluginSpec::new("lonely", ConversionPhase::Preparation).with_dependencies(["ghost"]),
        )],
        &[],
    );
    let Err(err) = result else {
        panic!("missing dependency must not resolve");
    };
    assert!(matches!(err, RegistryError::UnresolvedDependencies { .. }));
}

#[test]
fn duplicate_names_are_fatal() {
    let result = PluginRegistry::resolve(
        vec![
            plugin(PluginSpec::new("dup", ConversionPhase::Preparation)),
            plugin(PluginSpec::new("dup", ConversionPhase::Transmission)),
        ],
        &[],
    );
    let Err(err) = result else {
        panic!("duplicate names must not resolve");
    };
    assert!(matches!(err, RegistryError::DuplicateName(name) if name == "dup"));
}

#[test]
fn optional_plugins_need_the_selector() {
    let plugins = || {
        vec![
            plugin(PluginSpec::new("always", ConversionPhase::ContentParsing)),
            plugin(
                PluginSpec::new("jwt", ConversionPhase::ContentParsing)
                    .with_parser_ids(["token-parsers"])
                    .optional(),
            ),
        ]
    };

    let unselected = PluginRegistry::resolve(plugins(), &[]).expect("resolution");
    let active: Vec<_> = unselected
        .entries_for(ConversionPhase::ContentParsing)
        .filter(|entry| entry.is_active())
        .map(|entry| entry.spec().name.clone())
        .collect();
    assert_eq!(active, vec!["always"]);

    let selected =
        PluginRegistry::resolve(plugins(), &["token-parsers".to_owned()]).expect("resolution");
    assert!(
        selected
            .entries_for(ConversionPhase::ContentParsing)
            .all(|entry| entry.is_active())
    );
}

#[test]
fn activation_toggles_do_not_reorder() {
    let registry = PluginRegistry::resolve(
        vec![
            plugin(PluginSpec::new("a", ConversionPhase::ContentParsing).with_priority(2)),
            plugin(PluginSpec::new("b", ConversionPhase::ContentParsing).with_priority(1)),
        ],
        &[],
    )
    .expect("resolution");
    let before = registry.ordered_names();
    assert_eq!(registry.set_active("a", false), 1);
    assert_eq!(registry.ordered_names(), before);
    assert_eq!(registry.set_active("a", true), 1);
    assert_eq!(registry.set_active("unknown", false), 0);
}

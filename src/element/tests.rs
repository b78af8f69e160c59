//! Unit tests for element phases and facet bookkeeping.

use bytes::Bytes;
use rstest::rstest;

use super::{ConversionPhase, ElementId, Facet, FacetKind, MessageElement, Note};

fn element(id: &str) -> MessageElement {
    MessageElement::new(ElementId::from(id), Bytes::from_static(b"payload"))
}

#[rstest]
#[case(ConversionPhase::Unparsed, ConversionPhase::Preparation, true)]
#[case(ConversionPhase::Unparsed, ConversionPhase::Completed, true)]
#[case(ConversionPhase::Preparation, ConversionPhase::ContentParsing, true)]
#[case(ConversionPhase::ContentParsing, ConversionPhase::Preparation, false)]
#[case(ConversionPhase::Completed, ConversionPhase::Transmission, false)]
#[case(ConversionPhase::Completed, ConversionPhase::Deletion, false)]
#[case(ConversionPhase::Transmission, ConversionPhase::Deletion, true)]
#[case(ConversionPhase::Deletion, ConversionPhase::Deleted, true)]
#[case(ConversionPhase::Deletion, ConversionPhase::Transmission, false)]
#[case(ConversionPhase::Deleted, ConversionPhase::Deleted, false)]
fn phase_transition_rules(
    #[case] from: ConversionPhase,
    #[case] to: ConversionPhase,
    #[case] allowed: bool,
) {
    assert_eq!(from.can_advance_to(to), allowed, "{from} -> {to}");
}

#[test]
fn advance_rejects_backward_moves() {
    let mut element = element("e1");
    element
        .advance_to(ConversionPhase::ContentParsing)
        .expect("forward skip should succeed");
    let err = element
        .advance_to(ConversionPhase::Preparation)
        .expect_err("backward move should fail");
    assert_eq!(err.from, ConversionPhase::ContentParsing);
    assert_eq!(err.to, ConversionPhase::Preparation);
}

#[test]
fn deletion_reachable_from_any_pipeline_phase() {
    for phase in ConversionPhase::PIPELINE {
        let mut element = element("e2");
        element.advance_to(phase).expect("enter pipeline phase");
        element
            .advance_to(ConversionPhase::Deletion)
            .expect("deletion side path");
        element
            .advance_to(ConversionPhase::Deleted)
            .expect("terminal deleted");
        assert!(element.phase().is_terminal());
    }
}

#[test]
fn unique_facets_replace_rather_than_accumulate() {
    let mut element = element("e3");
    element.add_facet(Facet::Request {
        expects_reply: true,
    });
    element.add_facet(Facet::Request {
        expects_reply: false,
    });
    let requests: Vec<_> = element
        .facets()
        .iter()
        .filter(|f| f.kind() == FacetKind::Request)
        .collect();
    assert_eq!(requests.len(), 1);
    assert!(!element.expects_reply());
}

#[test]
fn notes_accumulate() {
    let mut element = element("e4");
    element.add_facet(Facet::Note(Note::warning("first")));
    element.add_facet(Facet::Note(Note::error("second")));
    assert_eq!(element.notes().count(), 2);
}

#[test]
fn children_borrow_parent_by_id() {
    let mut parent = element("parent");
    let child = element("child");
    parent.push_child(child);
    assert_eq!(parent.children().len(), 1);
    assert_eq!(
        parent.children()[0].parent(),
        Some(&ElementId::from("parent"))
    );
}

//! Unit tests for history bookkeeping, eviction, and completion waiting.

use std::{
    num::NonZeroU64,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;

use super::{MessageHistory, WaitError};
use crate::{
    config::CapacityPolicy,
    element::{ConversionPhase, ElementId, MessageElement, SequenceNumber},
};

const WAIT: Duration = Duration::from_secs(5);

fn element(id: &str, payload: &'static [u8]) -> MessageElement {
    MessageElement::new(ElementId::from(id), Bytes::from_static(payload))
}

fn completed_element(id: &str, payload: &'static [u8]) -> MessageElement {
    let mut element = element(id, payload);
    element
        .advance_to(ConversionPhase::Completed)
        .expect("fresh element completes");
    element
}

#[tokio::test]
async fn sequence_numbers_are_monotonic_and_never_reused() {
    let history = MessageHistory::new(
        CapacityPolicy::Bytes(NonZeroU64::new(8).expect("non-zero")),
        WAIT,
    );
    for index in 0..4 {
        let shared = history.admit(completed_element(&format!("m{index}"), b"12345"));
        let guard = shared.read().await;
        assert_eq!(guard.sequence(), Some(SequenceNumber::new(index)));
    }
    // eviction ran, but numbering continued from where it left off
    let shared = history.admit(completed_element("m4", b"12345"));
    assert_eq!(shared.read().await.sequence(), Some(SequenceNumber::new(4)));
}

#[tokio::test]
async fn eviction_is_oldest_first_and_bounded() {
    let history = MessageHistory::new(
        CapacityPolicy::Bytes(NonZeroU64::new(10).expect("non-zero")),
        WAIT,
    );
    let evicted: Arc<std::sync::Mutex<Vec<ElementId>>> = Arc::default();
    let log = Arc::clone(&evicted);
    history.add_removal_callback(move |id| log.lock().expect("log lock").push(id.clone()));

    history.admit(completed_element("a", b"1234"));
    history.admit(completed_element("b", b"1234"));
    history.admit(completed_element("c", b"1234"));

    assert!(history.total_bytes() <= 10);
    assert_eq!(history.len(), 2);
    assert_eq!(
        *evicted.lock().expect("log lock"),
        vec![ElementId::from("a")]
    );
    assert!(history.get(&ElementId::from("a")).is_none());
    assert!(history.get(&ElementId::from("c")).is_some());
}

#[tokio::test]
async fn zero_capacity_clears_on_every_admission() {
    let history = MessageHistory::new(CapacityPolicy::Zero, WAIT);
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    history.add_removal_callback(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    history.admit(completed_element("a", b"xx"));
    history.admit(completed_element("b", b"xx"));
    assert!(history.is_empty());
    assert_eq!(history.total_bytes(), 0);
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn explicit_remove_and_clear_notify_once_per_entry() {
    let history = MessageHistory::new(CapacityPolicy::Unbounded, WAIT);
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    history.add_removal_callback(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    history.admit(completed_element("a", b"x"));
    history.admit(completed_element("b", b"x"));
    history.admit(completed_element("c", b"x"));

    assert!(history.remove(&ElementId::from("b")));
    assert!(!history.remove(&ElementId::from("b")));
    history.clear_all();
    assert_eq!(count.load(Ordering::SeqCst), 3);
    assert!(history.is_empty());
}

#[tokio::test]
async fn complete_view_waits_for_terminal_phase() {
    let history = Arc::new(MessageHistory::new(CapacityPolicy::Unbounded, WAIT));
    let shared = history.admit(element("slow", b"payload"));
    let board = history.completion_board();

    let reader = {
        let history = Arc::clone(&history);
        tokio::spawn(async move {
            history
                .complete()
                .get(&ElementId::from("slow"))
                .await
                .expect("wait should succeed")
                .expect("element present")
        })
    };

    tokio::task::yield_now().await;
    {
        let mut guard = shared.write().await;
        guard
            .advance_to(ConversionPhase::Completed)
            .expect("completion");
    }
    board.complete(&ElementId::from("slow"));

    let element = reader.await.expect("reader task");
    assert!(element.read().await.phase().is_terminal());
}

#[tokio::test(start_paused = true)]
async fn stalled_element_times_out_naming_the_culprit() {
    let history = MessageHistory::new(CapacityPolicy::Unbounded, Duration::from_secs(100));
    history.admit(element("stuck", b"payload"));

    let err = history
        .complete()
        .get(&ElementId::from("stuck"))
        .await
        .expect_err("wait must time out");
    match err {
        WaitError::Timeout { id, timeout } => {
            assert_eq!(id, ElementId::from("stuck"));
            assert_eq!(timeout, Duration::from_secs(100));
        }
        WaitError::SignalLost { .. } => panic!("expected timeout, got signal loss"),
    }
}

#[tokio::test(start_paused = true)]
async fn abandoned_waits_leave_no_pending_registration() {
    let history = MessageHistory::new(CapacityPolicy::Unbounded, Duration::from_secs(100));
    history.admit(element("stuck", b"payload"));

    let result = history.complete().get(&ElementId::from("stuck")).await;
    assert!(result.is_err(), "wait must time out");
    assert_eq!(history.completion_board().pending(), 0);
}

#[tokio::test]
async fn snapshot_exposes_unfinished_elements_as_is() {
    let history = MessageHistory::new(CapacityPolicy::Unbounded, WAIT);
    history.admit(element("inflight", b"payload"));
    let snapshot = history.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(
        snapshot[0].read().await.phase(),
        ConversionPhase::Unparsed
    );
}

#[tokio::test]
async fn first_and_last_follow_sequence_order() {
    let history = MessageHistory::new(CapacityPolicy::Unbounded, WAIT);
    history.admit(completed_element("oldest", b"x"));
    history.admit(completed_element("newest", b"x"));
    let view = history.complete();
    let first = view.first().await.expect("wait").expect("present");
    let last = view.last().await.expect("wait").expect("present");
    assert_eq!(first.read().await.id(), &ElementId::from("oldest"));
    assert_eq!(last.read().await.id(), &ElementId::from("newest"));
}

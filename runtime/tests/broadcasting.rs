//! Integration tests for Store action broadcasting
//!
//! Covers the request-response pattern the check-in session relies on: send a
//! command, then wait for the completion action its effect feeds back.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use checkpoint_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};
use checkpoint_runtime::{Store, StoreError};
use std::time::Duration;

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum GateAction {
    /// Validate a badge (command)
    Validate { id: u64, badge: String },
    /// Validation finished (terminal action)
    Validated { id: u64, admitted: bool },
    /// Start a timer that fires `Tick`
    Arm { millis: u64 },
    /// Timer fired
    Tick,
}

#[derive(Debug, Clone, Default)]
struct GateState {
    in_flight: Option<u64>,
    admitted: u32,
    rejected: u32,
    ticks: u32,
}

#[derive(Clone)]
struct GateEnvironment;

#[derive(Clone)]
struct GateReducer;

impl Reducer for GateReducer {
    type State = GateState;
    type Action = GateAction;
    type Environment = GateEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            GateAction::Validate { id, badge } => {
                if state.in_flight.is_some() {
                    return smallvec![Effect::None];
                }
                state.in_flight = Some(id);
                smallvec![Effect::Future(Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Some(GateAction::Validated {
                        id,
                        admitted: badge.starts_with("VIP"),
                    })
                }))]
            },
            GateAction::Validated { admitted, .. } => {
                state.in_flight = None;
                if admitted {
                    state.admitted += 1;
                } else {
                    state.rejected += 1;
                }
                smallvec![Effect::None]
            },
            GateAction::Arm { millis } => smallvec![Effect::Delay {
                duration: Duration::from_millis(millis),
                action: Box::new(GateAction::Tick),
            }],
            GateAction::Tick => {
                state.ticks += 1;
                smallvec![Effect::None]
            },
        }
    }
}

fn gate_store() -> Store<GateState, GateAction, GateEnvironment, GateReducer> {
    Store::new(GateState::default(), GateReducer, GateEnvironment)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_send_and_wait_for_completion() {
    let store = gate_store();

    let result = store
        .send_and_wait_for(
            GateAction::Validate {
                id: 1,
                badge: "VIP-001".to_string(),
            },
            |a| matches!(a, GateAction::Validated { id: 1, .. }),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(result, GateAction::Validated { id: 1, admitted: true });

    let (in_flight, admitted) = store.state(|s| (s.in_flight, s.admitted)).await;
    assert_eq!(in_flight, None);
    assert_eq!(admitted, 1);
}

#[tokio::test]
async fn test_reducer_guard_is_atomic_under_concurrent_sends() {
    let store = gate_store();

    let first = store.send(GateAction::Validate {
        id: 1,
        badge: "GA-1".to_string(),
    });
    let second = store.send(GateAction::Validate {
        id: 2,
        badge: "GA-2".to_string(),
    });
    let (first, second) = tokio::join!(first, second);

    let mut first = first.unwrap();
    let mut second = second.unwrap();
    first.wait().await;
    second.wait().await;

    let (admitted, rejected) = store.state(|s| (s.admitted, s.rejected)).await;
    assert_eq!(admitted + rejected, 1);
}

#[tokio::test]
async fn test_subscribers_observe_feedback_actions_only() {
    let store = gate_store();
    let mut rx = store.subscribe_actions();

    let mut handle = store
        .send(GateAction::Validate {
            id: 7,
            badge: "GA-7".to_string(),
        })
        .await
        .unwrap();
    handle.wait().await;

    let observed = rx.recv().await.unwrap();
    assert_eq!(observed, GateAction::Validated { id: 7, admitted: false });
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_delayed_actions_are_broadcast() {
    let store = gate_store();
    let mut rx = store.subscribe_actions();

    let _ = store.send(GateAction::Arm { millis: 5 }).await.unwrap();

    let observed = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(observed, GateAction::Tick);
    assert_eq!(store.state(|s| s.ticks).await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_delays_are_dropped_after_shutdown() {
    let store = gate_store();

    let _ = store.send(GateAction::Arm { millis: 100 }).await.unwrap();
    store.shutdown(Duration::from_secs(1)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(store.state(|s| s.ticks).await, 0);
}

#[tokio::test]
async fn test_in_flight_effects_resolve_during_shutdown() {
    let store = gate_store();

    let _ = store
        .send(GateAction::Validate {
            id: 3,
            badge: "VIP-3".to_string(),
        })
        .await
        .unwrap();

    store.shutdown(Duration::from_secs(1)).await.unwrap();
    assert_eq!(store.state(|s| s.admitted).await, 1);

    let rejected = store
        .send(GateAction::Validate {
            id: 4,
            badge: "VIP-4".to_string(),
        })
        .await;
    assert!(matches!(rejected, Err(StoreError::ShutdownInProgress)));
}

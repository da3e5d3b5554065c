//! Property-based tests for the entry state machine
//!
//! These tests verify key invariants hold across all event sequences.

use super::*;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_state() -> impl Strategy<Value = EntryState> {
    prop_oneof![
        Just(EntryState::Pending),
        Just(EntryState::Streaming),
        Just(EntryState::Finalized),
        Just(EntryState::Failed),
    ]
}

fn arb_event() -> impl Strategy<Value = EntryEvent> {
    prop_oneof![
        Just(EntryEvent::StreamOpened),
        Just(EntryEvent::Fragment),
        Just(EntryEvent::StreamClosed),
        Just(EntryEvent::StreamFailed),
    ]
}

fn arb_terminal_state() -> impl Strategy<Value = EntryState> {
    prop_oneof![Just(EntryState::Finalized), Just(EntryState::Failed)]
}

/// Apply events, skipping rejected ones the way the store does
fn run(events: &[EntryEvent]) -> Vec<EntryState> {
    let mut state = EntryState::Pending;
    let mut trace = vec![state];
    for event in events {
        if let Ok(next) = transition(state, *event) {
            state = next;
        }
        trace.push(state);
    }
    trace
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Terminal states absorb every event: either rejected or unchanged
    #[test]
    fn terminal_states_are_absorbing(state in arb_terminal_state(), event in arb_event()) {
        match transition(state, event) {
            Ok(next) => prop_assert_eq!(next, state),
            Err(TransitionError::Terminal { state: reported }) => prop_assert_eq!(reported, state),
            Err(other) => prop_assert!(false, "unexpected error {other:?}"),
        }
    }

    /// Close and fail always leave a non-streaming state
    #[test]
    fn completion_always_stops_streaming(state in arb_state()) {
        let closed = transition(state, EntryEvent::StreamClosed).unwrap();
        let failed = transition(state, EntryEvent::StreamFailed).unwrap();
        prop_assert!(!closed.is_streaming());
        prop_assert!(!failed.is_streaming());
    }

    /// Once an entry stops streaming it never streams again
    #[test]
    fn no_resurrection(events in proptest::collection::vec(arb_event(), 0..30)) {
        let trace = run(&events);
        if let Some(first_terminal) = trace.iter().position(|s| s.is_terminal()) {
            let settled = trace[first_terminal];
            prop_assert!(trace[first_terminal..].iter().all(|s| *s == settled));
        }
    }

    /// Fragments never settle an entry on their own
    #[test]
    fn fragments_keep_streaming(count in 1usize..20) {
        let trace = run(&vec![EntryEvent::Fragment; count]);
        prop_assert!(trace.iter().all(|s| s.is_streaming()));
    }
}

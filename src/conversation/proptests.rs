//! Property-based tests for the message store
//!
//! Random interleavings of turns, fragments, completions and clears must
//! preserve the conversation invariants:
//! - At most one entry is streaming
//! - Entry ids are unique
//! - Every bot entry directly follows the user entry that triggered it
//! - Settled text never changes
//! - Writes through a stale ticket never land

use super::*;
use crate::llm::ModelVariant;
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
enum Op {
    Submit(String),
    Open,
    Fragment(String),
    Finalize,
    Fail,
    Clear,
    /// Write through the most recent ticket of any earlier generation
    StaleFragment(String),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => "[a-z ]{0,8}".prop_map(Op::Submit),
        2 => Just(Op::Open),
        5 => "[a-z ]{0,5}".prop_map(Op::Fragment),
        2 => Just(Op::Finalize),
        1 => Just(Op::Fail),
        1 => Just(Op::Clear),
        1 => "[a-z]{1,5}".prop_map(Op::StaleFragment),
    ]
}

fn check_invariants(store: &MessageStore, settled: &HashMap<EntryId, String>) -> Result<(), TestCaseError> {
    let entries = store.entries();

    let streaming = entries.iter().filter(|e| e.is_streaming()).count();
    prop_assert!(streaming <= 1, "{streaming} entries streaming");

    let ids: HashSet<EntryId> = entries.iter().map(|e| e.id).collect();
    prop_assert_eq!(ids.len(), entries.len());

    for (i, entry) in entries.iter().enumerate() {
        if entry.role == Role::Bot {
            prop_assert!(i > 0 && entries[i - 1].role == Role::User);
        }
        if let Some(text) = settled.get(&entry.id) {
            prop_assert_eq!(&entry.text, text);
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn store_invariants_hold(ops in proptest::collection::vec(arb_op(), 0..60)) {
        let mut store = MessageStore::new();
        let mut current: Option<StreamTicket> = None;
        let mut stale: Option<StreamTicket> = None;
        let mut accumulated = String::new();
        let mut settled: HashMap<EntryId, String> = HashMap::new();

        for op in ops {
            match op {
                Op::Submit(text) => {
                    let busy = store.streaming_entry().is_some();
                    let before = store.len();
                    match store.append_turn(text, Some(ModelVariant::Pro)) {
                        Ok(ticket) => {
                            prop_assert!(!busy);
                            current = Some(ticket);
                            accumulated.clear();
                        }
                        Err(StoreError::AlreadyStreaming { .. }) => {
                            prop_assert!(busy);
                            prop_assert_eq!(store.len(), before);
                        }
                        Err(other) => prop_assert!(false, "unexpected {other:?}"),
                    }
                }
                Op::Open => {
                    if let Some(ticket) = current {
                        let _ = store.begin_stream_for(ticket);
                    }
                }
                Op::Fragment(fragment) => {
                    if let Some(ticket) = current {
                        accumulated.push_str(&fragment);
                        if store.update_text_for(ticket, accumulated.clone()).is_ok() {
                            prop_assert_eq!(&store.get(ticket.bot_id).unwrap().text, &accumulated);
                        }
                    }
                }
                Op::Finalize => {
                    if let Some(ticket) = current {
                        if store.finalize_for(ticket).is_ok() {
                            let text = store.get(ticket.bot_id).unwrap().text.clone();
                            settled.entry(ticket.bot_id).or_insert(text);
                        }
                    }
                }
                Op::Fail => {
                    if let Some(ticket) = current {
                        if store.fail_for(ticket, "failed").is_ok() {
                            let text = store.get(ticket.bot_id).unwrap().text.clone();
                            settled.entry(ticket.bot_id).or_insert(text);
                        }
                    }
                }
                Op::Clear => {
                    store.clear();
                    stale = current.take().or(stale);
                    settled.clear();
                }
                Op::StaleFragment(fragment) => {
                    if let Some(ticket) = stale {
                        let before = store.entries().to_vec();
                        let result = store.update_text_for(ticket, fragment);
                        let is_stale = matches!(result, Err(StoreError::Stale { .. }));
                        prop_assert!(is_stale);
                        prop_assert_eq!(store.entries(), &before[..]);
                    }
                }
            }
            check_invariants(&store, &settled)?;
        }
    }
}

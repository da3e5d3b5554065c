//! Property-based tests for the streaming wire layer
//!
//! These tests verify that decoding does not depend on how the transport
//! happens to chunk the response body:
//! - Any split of an SSE body yields the same event payloads
//! - Any split of a Gemini reply yields the same fragments, in order
//! - History records the exact concatenation of the fragments

use super::gemini::fragment_stream;
use super::sse::SseDecoder;
use super::{HistoryTurn, LlmError};
use futures::stream::{self, StreamExt, TryStreamExt};
use proptest::prelude::*;
use std::sync::{Arc, Mutex};

// ============================================================================
// Strategies
// ============================================================================

/// Fragment text including multi-byte characters and JSON-sensitive chars
fn arb_fragment() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 .,!?\"\\\\é漢🙂\n]{1,20}"
}

/// Split `bytes` at the given (unsorted, possibly duplicate) cut points
fn split_bytes(bytes: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut points: Vec<usize> = cuts
        .iter()
        .map(|c| c % (bytes.len() + 1))
        .collect();
    points.sort_unstable();
    points.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for point in points {
        chunks.push(bytes[start..point].to_vec());
        start = point;
    }
    chunks.push(bytes[start..].to_vec());
    chunks
}

fn gemini_body(fragments: &[String]) -> String {
    fragments
        .iter()
        .map(|text| {
            format!(
                "data: {}\r\n\r\n",
                serde_json::json!({
                    "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
                })
            )
        })
        .collect()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn sse_decoding_is_chunking_invariant(
        payloads in proptest::collection::vec("[a-zA-Z0-9 {}:\",é]{1,30}", 1..8),
        cuts in proptest::collection::vec(any::<usize>(), 0..12),
    ) {
        let body: String = payloads.iter().map(|p| format!("data: {p}\n\n")).collect();

        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        for chunk in split_bytes(body.as_bytes(), &cuts) {
            events.extend(decoder.push(&chunk));
        }
        events.extend(decoder.finish());

        prop_assert_eq!(events, payloads);
    }

    #[test]
    fn gemini_fragments_are_chunking_invariant(
        fragments in proptest::collection::vec(arb_fragment(), 0..6),
        cuts in proptest::collection::vec(any::<usize>(), 0..10),
    ) {
        let body = gemini_body(&fragments);
        let chunks: Vec<Result<Vec<u8>, LlmError>> = split_bytes(body.as_bytes(), &cuts)
            .into_iter()
            .map(Ok)
            .collect();
        let history = Arc::new(Mutex::new(Vec::new()));

        let received: Vec<String> = futures::executor::block_on(
            fragment_stream(stream::iter(chunks).boxed(), history.clone(), "prompt".into())
                .try_collect(),
        )
        .unwrap();

        prop_assert_eq!(&received, &fragments);
        let expected_history = vec![
            HistoryTurn::user("prompt"),
            HistoryTurn::model(fragments.concat()),
        ];
        prop_assert_eq!(&*history.lock().unwrap(), &expected_history);
    }
}

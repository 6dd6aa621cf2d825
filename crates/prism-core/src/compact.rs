// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use tracing::debug;

use crate::round::{group_rounds, RoundMessage};

/// Strip thinking content from every assistant message outside the most
/// recent `keep_recent` rounds.
///
/// `keep_recent` is clamped to a minimum of 1: the current round always
/// keeps its thinking so the model can continue an in-progress chain of
/// reasoning.  Non-assistant messages are never modified, and within a
/// modified message every non-thinking block keeps its position.
///
/// The operation is idempotent and accepts empty input.  Returns the number
/// of messages that were modified.
pub fn compact_thinking<M: RoundMessage>(messages: &mut [M], keep_recent: usize) -> usize {
    let keep = keep_recent.max(1);
    let rounds = group_rounds(&*messages);
    if rounds.len() <= keep {
        return 0;
    }

    let cutoff = rounds.len() - keep;
    let mut stripped = 0usize;
    for round in &rounds[..cutoff] {
        for msg in &mut messages[round.start..round.end] {
            if msg.is_assistant() && msg.has_thinking() {
                msg.strip_thinking();
                stripped += 1;
            }
        }
    }
    if stripped > 0 {
        debug!(stripped, rounds = rounds.len(), keep, "compacted thinking content");
    }
    stripped
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

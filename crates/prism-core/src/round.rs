// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use prism_model::{ChatMessage, MessageParam};

/// The narrow view of a message that round grouping and compaction need.
///
/// Implemented once per provider shape so the algorithms in this crate stay
/// shape-agnostic.
pub trait RoundMessage {
    /// User-role message carrying no tool results.  Starts a new round.
    fn is_pure_user(&self) -> bool;
    fn is_assistant(&self) -> bool;
    fn is_tool_result(&self) -> bool;
    fn has_thinking(&self) -> bool;
    /// Remove thinking content, preserving everything else in order.
    fn strip_thinking(&mut self);
}

impl RoundMessage for ChatMessage {
    fn is_pure_user(&self) -> bool {
        self.is_pure_user()
    }
    fn is_assistant(&self) -> bool {
        self.is_assistant()
    }
    fn is_tool_result(&self) -> bool {
        self.is_tool_result()
    }
    fn has_thinking(&self) -> bool {
        self.reasoning_content.is_some()
    }
    fn strip_thinking(&mut self) {
        self.reasoning_content = None;
    }
}

impl RoundMessage for MessageParam {
    fn is_pure_user(&self) -> bool {
        self.is_pure_user()
    }
    fn is_assistant(&self) -> bool {
        self.is_assistant()
    }
    fn is_tool_result(&self) -> bool {
        self.has_tool_result()
    }
    fn has_thinking(&self) -> bool {
        self.has_thinking()
    }
    fn strip_thinking(&mut self) {
        self.strip_thinking();
    }
}

/// One conversation round: the half-open index range `[start, end)` into the
/// source message slice.  Borrowing index ranges rather than messages keeps
/// the concatenation-equals-input property trivially true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    pub start: usize,
    pub end: usize,
    pub is_current: bool,
}

impl Round {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Per-round counters used by compaction heuristics and diagnostics.
    pub fn stats<M: RoundMessage>(&self, messages: &[M]) -> RoundStats {
        let slice = &messages[self.start..self.end];
        RoundStats {
            pure_user: slice.iter().filter(|m| m.is_pure_user()).count(),
            assistant: slice.iter().filter(|m| m.is_assistant()).count(),
            tool_result: slice.iter().filter(|m| m.is_tool_result()).count(),
            total: slice.len(),
            has_thinking: slice.iter().any(|m| m.has_thinking()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundStats {
    pub pure_user: usize,
    pub assistant: usize,
    pub tool_result: usize,
    pub total: usize,
    pub has_thinking: bool,
}

/// Segment `messages` into conversation rounds in one linear pass.
///
/// Every pure user message begins a new round; all other messages extend the
/// round in progress.  The partition covers the input exactly and every
/// round contains exactly one pure user message: a history resumed mid-round
/// (leading assistant or tool-result messages) has that prefix folded into
/// the first round.  A non-empty sequence with no pure user message at all
/// cannot satisfy both properties; it degenerates to a single current round.
/// The last round is flagged current.  Empty input yields no rounds.
pub fn group_rounds<M: RoundMessage>(messages: &[M]) -> Vec<Round> {
    if messages.is_empty() {
        return Vec::new();
    }
    let mut starts: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.is_pure_user())
        .map(|(i, _)| i)
        .collect();
    if starts.is_empty() {
        return vec![Round { start: 0, end: messages.len(), is_current: true }];
    }
    starts[0] = 0;

    let mut rounds = Vec::with_capacity(starts.len());
    for (idx, &start) in starts.iter().enumerate() {
        let end = starts.get(idx + 1).copied().unwrap_or(messages.len());
        rounds.push(Round { start, end, is_current: idx + 1 == starts.len() });
    }
    rounds
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use prism_model::{ContentBlock, MessageContent};

    fn user(text: &str) -> MessageParam {
        MessageParam { role: "user".into(), content: MessageContent::Text(text.into()) }
    }

    fn assistant(text: &str) -> MessageParam {
        MessageParam { role: "assistant".into(), content: MessageContent::Text(text.into()) }
    }

    fn tool_result(id: &str) -> MessageParam {
        MessageParam::tool_result(id, "out", false)
    }

    fn thinking_assistant(thinking: &str, text: &str) -> MessageParam {
        MessageParam {
            role: "assistant".into(),
            content: MessageContent::Blocks(vec![
                ContentBlock::Thinking { thinking: thinking.into(), signature: None },
                ContentBlock::Text { text: text.into() },
            ]),
        }
    }

    #[test]
    fn empty_input_yields_no_rounds() {
        let msgs: Vec<MessageParam> = vec![];
        assert!(group_rounds(&msgs).is_empty());
    }

    #[test]
    fn single_user_message_is_one_current_round() {
        let msgs = vec![user("q")];
        let rounds = group_rounds(&msgs);
        assert_eq!(rounds.len(), 1);
        assert!(rounds[0].is_current);
        assert_eq!(rounds[0].len(), 1);
    }

    #[test]
    fn rounds_concatenate_to_input() {
        let msgs = vec![
            user("q1"),
            assistant("a1"),
            tool_result("t1"),
            assistant("a2"),
            user("q2"),
            assistant("a3"),
        ];
        let rounds = group_rounds(&msgs);
        assert_eq!(rounds.len(), 2);
        // contiguous, gap-free cover of the input
        assert_eq!(rounds[0].start, 0);
        for pair in rounds.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(rounds.last().unwrap().end, msgs.len());
    }

    #[test]
    fn only_last_round_is_current() {
        let msgs = vec![user("q1"), assistant("a1"), user("q2"), assistant("a2"), user("q3")];
        let rounds = group_rounds(&msgs);
        assert_eq!(rounds.len(), 3);
        assert_eq!(
            rounds.iter().filter(|r| r.is_current).count(),
            1,
            "exactly one current round"
        );
        assert!(rounds.last().unwrap().is_current);
    }

    #[test]
    fn tool_result_user_message_does_not_start_a_round() {
        let msgs = vec![user("q1"), assistant("a1"), tool_result("t1"), assistant("a2")];
        let rounds = group_rounds(&msgs);
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].len(), 4);
    }

    #[test]
    fn each_round_has_exactly_one_pure_user() {
        let msgs = vec![
            user("q1"),
            assistant("a1"),
            tool_result("t1"),
            user("q2"),
            assistant("a2"),
        ];
        for round in group_rounds(&msgs) {
            assert_eq!(round.stats(&msgs).pure_user, 1);
        }
    }

    #[test]
    fn leading_non_user_messages_fold_into_the_first_round() {
        // A history resumed mid-round: starts with an assistant message.
        let msgs = vec![assistant("resumed"), user("q1"), assistant("a1"), user("q2")];
        let rounds = group_rounds(&msgs);
        assert_eq!(rounds.len(), 2);
        assert_eq!(rounds[0].start, 0, "the resumed prefix belongs to the first round");
        assert_eq!(rounds[0].len(), 3);
        for round in &rounds {
            assert_eq!(round.stats(&msgs).pure_user, 1);
        }
        // The partition still covers the input exactly.
        assert_eq!(rounds[0].end, rounds[1].start);
        assert_eq!(rounds[1].end, msgs.len());
    }

    #[test]
    fn sequence_without_any_pure_user_degenerates_to_one_round() {
        let msgs = vec![assistant("a1"), tool_result("t1"), assistant("a2")];
        let rounds = group_rounds(&msgs);
        assert_eq!(rounds.len(), 1);
        assert!(rounds[0].is_current);
        assert_eq!(rounds[0].start, 0);
        assert_eq!(rounds[0].end, msgs.len());
    }

    #[test]
    fn stats_count_roles_and_thinking() {
        let msgs = vec![
            user("q"),
            thinking_assistant("hmm", "a"),
            tool_result("t1"),
        ];
        let rounds = group_rounds(&msgs);
        let stats = rounds[0].stats(&msgs);
        assert_eq!(stats.pure_user, 1);
        assert_eq!(stats.assistant, 1);
        assert_eq!(stats.tool_result, 1);
        assert_eq!(stats.total, 3);
        assert!(stats.has_thinking);
    }

    #[test]
    fn openai_shape_groups_on_tool_role() {
        use prism_model::ChatMessage;
        let msgs: Vec<ChatMessage> = serde_json::from_value(serde_json::json!([
            {"role": "user", "content": "q1"},
            {"role": "assistant", "content": "a1"},
            {"role": "tool", "tool_call_id": "tc1", "content": "out"},
            {"role": "user", "content": "q2"}
        ]))
        .unwrap();
        let rounds = group_rounds(&msgs);
        assert_eq!(rounds.len(), 2);
        assert_eq!(rounds[0].len(), 3);
        assert_eq!(rounds[0].stats(&msgs).tool_result, 1);
    }
}

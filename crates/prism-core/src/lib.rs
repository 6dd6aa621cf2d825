// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Conversation-round grouping and the smart-compact transformer.
//!
//! A *round* is a maximal contiguous run of messages starting at a pure user
//! message (user role, no tool-result content) and extending through every
//! following assistant and tool-result message.  Compaction strips the
//! model's thinking content from every round except the most recent K.
//!
//! Both provider shapes are supported through the [`RoundMessage`] trait;
//! the grouping and compaction algorithms never look at shape-specific
//! fields themselves.

mod compact;
mod round;

pub use compact::compact_thinking;
pub use round::{group_rounds, Round, RoundMessage, RoundStats};

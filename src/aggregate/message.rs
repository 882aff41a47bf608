//! Completed-message assembly

use super::{CompletedContentPart, CompletedInterrupt, CompletedMessage, CompletedToolCall};
use crate::events::{EndMessage, StartMessage};
use crate::state::Termination;

/// Collects the completed children of one message, tagged with their
/// creation sequence so the final lists come out in creation order
/// regardless of the order the children ended in.
#[derive(Debug, Default, Clone)]
pub struct MessageAggregator {
    content_parts: Vec<(u64, CompletedContentPart)>,
    tool_calls: Vec<(u64, CompletedToolCall)>,
    interrupts: Vec<(u64, CompletedInterrupt)>,
}

impl MessageAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_content_part(&mut self, seq: u64, part: CompletedContentPart) {
        self.content_parts.push((seq, part));
    }

    pub fn add_tool_call(&mut self, seq: u64, call: CompletedToolCall) {
        self.tool_calls.push((seq, call));
    }

    pub fn add_interrupt(&mut self, seq: u64, interrupt: CompletedInterrupt) {
        self.interrupts.push((seq, interrupt));
    }

    pub fn content_part(&self, content_part_id: &str) -> Option<&CompletedContentPart> {
        self.content_parts
            .iter()
            .map(|(_, p)| p)
            .find(|p| p.content_part_id == content_part_id)
    }

    pub fn tool_call(&self, tool_call_id: &str) -> Option<&CompletedToolCall> {
        self.tool_calls
            .iter()
            .map(|(_, t)| t)
            .find(|t| t.tool_call_id == tool_call_id)
    }

    pub fn interrupt(&self, interrupt_id: &str) -> Option<&CompletedInterrupt> {
        self.interrupts
            .iter()
            .map(|(_, i)| i)
            .find(|i| i.interrupt_id == interrupt_id)
    }

    /// Build the completed message
    pub fn finish(
        self,
        message_id: impl Into<String>,
        start: Option<StartMessage>,
        end: Option<EndMessage>,
        termination: Termination,
    ) -> CompletedMessage {
        CompletedMessage {
            message_id: message_id.into(),
            role: start.as_ref().map(|s| s.role),
            start,
            end,
            content_parts: in_creation_order(self.content_parts),
            tool_calls: in_creation_order(self.tool_calls),
            interrupts: in_creation_order(self.interrupts),
            termination,
        }
    }
}

fn in_creation_order<T>(mut items: Vec<(u64, T)>) -> Vec<T> {
    items.sort_by_key(|(seq, _)| *seq);
    items.into_iter().map(|(_, item)| item).collect()
}

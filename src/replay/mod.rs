//! Replay engine
//!
//! Rebuilds completed exchange trees from persisted history. [`restore`] is
//! a pure conversion; [`Session::replay`](crate::session::Session::replay)
//! installs the result as Ended entities without notifying observers or
//! sending anything.

mod records;

pub use records::{
    ContentPartData, ContentPartRecord, ExchangeRecord, FeedbackRating, InterruptRecord,
    MessageRecord, ToolCallRecord, ToolCallResult,
};

use tracing::debug;

use crate::aggregate::{
    Citation, CitationError, CitationErrorType, CompletedContentPart, CompletedExchange,
    CompletedInterrupt, CompletedMessage, CompletedToolCall, HistoryInfo,
};
use crate::events::{
    EndContentPart, EndExchange, EndInterrupt, EndMessage, EndToolCall, StartContentPart,
    StartExchange, StartInterrupt, StartMessage, StartToolCall,
};
use crate::state::Termination;

/// Convert persisted exchanges into completed records, in input order
pub fn restore(records: &[ExchangeRecord]) -> Vec<CompletedExchange> {
    records.iter().map(restore_exchange).collect()
}

fn restore_exchange(record: &ExchangeRecord) -> CompletedExchange {
    CompletedExchange {
        exchange_id: record.exchange_id.clone(),
        start: Some(StartExchange {
            conversation_sequence: record.conversation_sequence,
            timestamp: Some(record.created_time),
            metadata: None,
        }),
        end: Some(EndExchange::default()),
        messages: record.messages.iter().map(restore_message).collect(),
        history: Some(HistoryInfo {
            created_time: record.created_time,
            updated_time: record.updated_time,
            span_id: record.span_id.clone(),
            feedback_rating: record.feedback_rating,
        }),
        termination: Termination::Normal,
    }
}

fn restore_message(record: &MessageRecord) -> CompletedMessage {
    CompletedMessage {
        message_id: record.message_id.clone(),
        role: Some(record.role),
        start: Some(StartMessage {
            role: record.role,
            timestamp: Some(record.created_time),
            metadata: None,
        }),
        end: Some(EndMessage::default()),
        content_parts: record.content_parts.iter().map(restore_content_part).collect(),
        tool_calls: record.tool_calls.iter().map(restore_tool_call).collect(),
        interrupts: record.interrupts.iter().map(restore_interrupt).collect(),
        termination: Termination::Normal,
    }
}

fn restore_content_part(record: &ContentPartRecord) -> CompletedContentPart {
    let (data, external_value) = match &record.data {
        ContentPartData::Inline { inline } => (inline.clone(), None),
        ContentPartData::External(external) => (String::new(), Some(external.clone())),
    };

    let mut citations = Vec::new();
    let mut citation_errors = Vec::new();
    for citation in &record.citations {
        if valid_range(citation, &data) {
            citations.push(citation.clone());
        } else {
            debug!(
                content_part_id = %record.content_part_id,
                citation_id = %citation.citation_id,
                "persisted citation outside data"
            );
            citation_errors.push(CitationError {
                citation_id: citation.citation_id.clone(),
                error_type: CitationErrorType::CitationOutOfRange,
            });
        }
    }

    CompletedContentPart {
        content_part_id: record.content_part_id.clone(),
        start: Some(StartContentPart {
            mime_type: record.mime_type.clone(),
            external_value,
            metadata: None,
        }),
        end: Some(EndContentPart::default()),
        data,
        citations,
        citation_errors,
        termination: Termination::Normal,
    }
}

/// In bounds and on UTF-8 boundaries
fn valid_range(citation: &Citation, data: &str) -> bool {
    citation.slice(data).is_some()
}

fn restore_tool_call(record: &ToolCallRecord) -> CompletedToolCall {
    let start = StartToolCall {
        tool_name: record.name.clone(),
        input: record.input.clone(),
        timestamp: Some(record.created_time),
        metadata: None,
    };
    let end = record.result.as_ref().map(|result| EndToolCall {
        output: result.output.clone(),
        is_error: result.is_error,
        cancelled: result.cancelled,
        timestamp: result.timestamp,
        metadata: None,
    });
    CompletedToolCall::merge(
        record.tool_call_id.clone(),
        Some(&start),
        end.as_ref(),
        Termination::Normal,
    )
}

fn restore_interrupt(record: &InterruptRecord) -> CompletedInterrupt {
    CompletedInterrupt {
        interrupt_id: record.interrupt_id.clone(),
        start: Some(StartInterrupt {
            interrupt_type: record.interrupt_type.clone(),
            value: record.value.clone(),
        }),
        end: record.end_value.clone().map(EndInterrupt),
        termination: Termination::Normal,
    }
}

//! Exchange-level events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ErrorEvent, MessageEvent, MetaEvent, Metadata};
use crate::codec::wire::WireExchangeEvent;

/// One request/response cycle within a session, addressed by `exchangeId`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireExchangeEvent", into = "WireExchangeEvent")]
pub struct ExchangeEvent {
    /// Exchange identifier, unique within the session
    pub exchange_id: String,
    /// Payload
    pub kind: ExchangeEventKind,
}

/// Payload variants of an [`ExchangeEvent`]
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeEventKind {
    /// `startExchange`
    Start(StartExchange),
    /// `endExchange`
    End(EndExchange),
    /// A nested message event
    Message(MessageEvent),
    /// `metaEvent`
    Meta(MetaEvent),
    /// `exchangeError`
    Error(ErrorEvent),
    /// No recognized payload
    Unknown,
}

/// Opens an exchange
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartExchange {
    /// Optional ordering hint among exchanges of a conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_sequence: Option<u64>,
    /// When the exchange started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Optional metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Closes an exchange
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndExchange {
    /// Optional metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl ExchangeEvent {
    /// Wrap a payload for `exchange_id`
    pub fn new(exchange_id: impl Into<String>, kind: ExchangeEventKind) -> Self {
        Self {
            exchange_id: exchange_id.into(),
            kind,
        }
    }
}

impl StartExchange {
    /// Set the conversation sequence
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.conversation_sequence = Some(sequence);
        self
    }

    /// Set the timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

//! Typed references to entities in the session tree

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of an identified entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Session,
    Exchange,
    Message,
    ContentPart,
    ToolCall,
    Interrupt,
    AsyncToolCall,
    AsyncInputStream,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Exchange => "exchange",
            Self::Message => "message",
            Self::ContentPart => "contentPart",
            Self::ToolCall => "toolCall",
            Self::Interrupt => "interrupt",
            Self::AsyncToolCall => "asyncToolCall",
            Self::AsyncInputStream => "asyncInputStream",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full path of an entity from the session down.
///
/// Message ids are unique within their exchange, and content part, tool
/// call and interrupt ids within their message, so a reference carries
/// every ancestor id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EntityRef {
    Session,
    Exchange {
        exchange_id: String,
    },
    Message {
        exchange_id: String,
        message_id: String,
    },
    ContentPart {
        exchange_id: String,
        message_id: String,
        content_part_id: String,
    },
    ToolCall {
        exchange_id: String,
        message_id: String,
        tool_call_id: String,
    },
    Interrupt {
        exchange_id: String,
        message_id: String,
        interrupt_id: String,
    },
    AsyncToolCall {
        tool_call_id: String,
    },
    AsyncInputStream {
        stream_id: String,
    },
}

impl EntityRef {
    pub fn exchange(exchange_id: impl Into<String>) -> Self {
        Self::Exchange {
            exchange_id: exchange_id.into(),
        }
    }

    pub fn message(exchange_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self::Message {
            exchange_id: exchange_id.into(),
            message_id: message_id.into(),
        }
    }

    pub fn content_part(
        exchange_id: impl Into<String>,
        message_id: impl Into<String>,
        content_part_id: impl Into<String>,
    ) -> Self {
        Self::ContentPart {
            exchange_id: exchange_id.into(),
            message_id: message_id.into(),
            content_part_id: content_part_id.into(),
        }
    }

    pub fn tool_call(
        exchange_id: impl Into<String>,
        message_id: impl Into<String>,
        tool_call_id: impl Into<String>,
    ) -> Self {
        Self::ToolCall {
            exchange_id: exchange_id.into(),
            message_id: message_id.into(),
            tool_call_id: tool_call_id.into(),
        }
    }

    pub fn interrupt(
        exchange_id: impl Into<String>,
        message_id: impl Into<String>,
        interrupt_id: impl Into<String>,
    ) -> Self {
        Self::Interrupt {
            exchange_id: exchange_id.into(),
            message_id: message_id.into(),
            interrupt_id: interrupt_id.into(),
        }
    }

    pub fn async_tool_call(tool_call_id: impl Into<String>) -> Self {
        Self::AsyncToolCall {
            tool_call_id: tool_call_id.into(),
        }
    }

    pub fn async_input_stream(stream_id: impl Into<String>) -> Self {
        Self::AsyncInputStream {
            stream_id: stream_id.into(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Session => EntityKind::Session,
            Self::Exchange { .. } => EntityKind::Exchange,
            Self::Message { .. } => EntityKind::Message,
            Self::ContentPart { .. } => EntityKind::ContentPart,
            Self::ToolCall { .. } => EntityKind::ToolCall,
            Self::Interrupt { .. } => EntityKind::Interrupt,
            Self::AsyncToolCall { .. } => EntityKind::AsyncToolCall,
            Self::AsyncInputStream { .. } => EntityKind::AsyncInputStream,
        }
    }

    /// Own id (empty for the session)
    pub fn id(&self) -> &str {
        match self {
            Self::Session => "",
            Self::Exchange { exchange_id } => exchange_id,
            Self::Message { message_id, .. } => message_id,
            Self::ContentPart {
                content_part_id, ..
            } => content_part_id,
            Self::ToolCall { tool_call_id, .. } | Self::AsyncToolCall { tool_call_id } => {
                tool_call_id
            }
            Self::Interrupt { interrupt_id, .. } => interrupt_id,
            Self::AsyncInputStream { stream_id } => stream_id,
        }
    }

    /// Owning entity; `None` for the session
    pub fn parent(&self) -> Option<EntityRef> {
        match self {
            Self::Session => None,
            Self::Exchange { .. } | Self::AsyncToolCall { .. } | Self::AsyncInputStream { .. } => {
                Some(Self::Session)
            }
            Self::Message { exchange_id, .. } => Some(Self::exchange(exchange_id.as_str())),
            Self::ContentPart {
                exchange_id,
                message_id,
                ..
            }
            | Self::ToolCall {
                exchange_id,
                message_id,
                ..
            }
            | Self::Interrupt {
                exchange_id,
                message_id,
                ..
            } => Some(Self::message(exchange_id.as_str(), message_id.as_str())),
        }
    }

    /// Whether `self` is `scope` or one of its descendants
    pub fn is_within(&self, scope: &EntityRef) -> bool {
        if self == scope {
            return true;
        }
        let mut current = self.parent();
        while let Some(ancestor) = current {
            if &ancestor == scope {
                return true;
            }
            current = ancestor.parent();
        }
        false
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session => f.write_str("session"),
            Self::Exchange { exchange_id } => write!(f, "exchange {}", exchange_id),
            Self::Message {
                exchange_id,
                message_id,
            } => write!(f, "message {}/{}", exchange_id, message_id),
            Self::ContentPart {
                exchange_id,
                message_id,
                content_part_id,
            } => write!(
                f,
                "contentPart {}/{}/{}",
                exchange_id, message_id, content_part_id
            ),
            Self::ToolCall {
                exchange_id,
                message_id,
                tool_call_id,
            } => write!(f, "toolCall {}/{}/{}", exchange_id, message_id, tool_call_id),
            Self::Interrupt {
                exchange_id,
                message_id,
                interrupt_id,
            } => write!(f, "interrupt {}/{}/{}", exchange_id, message_id, interrupt_id),
            Self::AsyncToolCall { tool_call_id } => write!(f, "asyncToolCall {}", tool_call_id),
            Self::AsyncInputStream { stream_id } => write!(f, "asyncInputStream {}", stream_id),
        }
    }
}

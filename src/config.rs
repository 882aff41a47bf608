//! Session configuration
//!
//! Loading flow:
//! 1. Start with [`SessionConfig::default()`]
//! 2. Optionally deserialize from a JSON string or value (missing keys keep defaults)
//! 3. Apply `CONVOSTREAM_*` environment variable overrides
//!
//! Environment variables:
//! - `CONVOSTREAM_ECHO` (bool)
//! - `CONVOSTREAM_FRAME_FORMAT` (`text` | `binary`)
//! - `CONVOSTREAM_BUFFER_BEFORE_STARTED` (bool)
//! - `CONVOSTREAM_MAX_PRE_START_BUFFER` (1..=1_000_000)
//! - `CONVOSTREAM_ABANDON_POLICY` (`syntheticEnd` | `drop`)
//! - `CONVOSTREAM_SURFACE_VIOLATIONS` (bool)
//! - `CONVOSTREAM_MAX_RETAINED_EXCHANGES` (0..=1_000_000)

use std::ops::RangeInclusive;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::FrameFormat;
use crate::error::{ProtocolError, Result};

/// What happens to descendants still Active when their owner ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AbandonPolicy {
    /// Complete them with an abnormal termination marker
    #[default]
    SyntheticEnd,
    /// Discard them without a completed record
    Drop,
}

/// Per-session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Deliver locally emitted events to local observers too
    pub echo: bool,
    /// Frame encoding handed to the transport
    pub frame_format: FrameFormat,
    /// Buffer inbound child events that arrive before `sessionStarted`
    pub buffer_before_started: bool,
    /// Cap on that buffer
    pub max_pre_start_buffer: usize,
    /// Policy for descendants left Active
    pub abandon_policy: AbandonPolicy,
    /// Deliver inbound violations to observers as notifications
    pub surface_violations: bool,
    /// Cap on completed exchange records retained for lookups
    pub max_retained_exchanges: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            echo: false,
            frame_format: FrameFormat::Text,
            buffer_before_started: true,
            max_pre_start_buffer: 1024,
            abandon_policy: AbandonPolicy::SyntheticEnd,
            surface_violations: false,
            max_retained_exchanges: None,
        }
    }
}

impl SessionConfig {
    /// Parse from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ProtocolError::Config(e.to_string()))
    }

    /// Parse from a JSON value
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| ProtocolError::Config(e.to_string()))
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Enable echo mode
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Set the abandon policy
    pub fn with_abandon_policy(mut self, policy: AbandonPolicy) -> Self {
        self.abandon_policy = policy;
        self
    }

    /// Apply `CONVOSTREAM_*` overrides. Invalid values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(echo) = env_override("CONVOSTREAM_ECHO", parse_flag) {
            self.echo = echo;
        }
        if let Some(format) = env_override("CONVOSTREAM_FRAME_FORMAT", parse_variant::<FrameFormat>) {
            self.frame_format = format;
        }
        if let Some(buffer) = env_override("CONVOSTREAM_BUFFER_BEFORE_STARTED", parse_flag) {
            self.buffer_before_started = buffer;
        }
        if let Some(cap) = env_override("CONVOSTREAM_MAX_PRE_START_BUFFER", |raw| {
            parse_bounded(raw, 1..=MAX_BUFFER_SETTING)
        }) {
            self.max_pre_start_buffer = cap;
        }
        if let Some(policy) = env_override("CONVOSTREAM_ABANDON_POLICY", parse_variant::<AbandonPolicy>) {
            self.abandon_policy = policy;
        }
        if let Some(surface) = env_override("CONVOSTREAM_SURFACE_VIOLATIONS", parse_flag) {
            self.surface_violations = surface;
        }
        if let Some(cap) = env_override("CONVOSTREAM_MAX_RETAINED_EXCHANGES", |raw| {
            parse_bounded(raw, 0..=MAX_BUFFER_SETTING)
        }) {
            self.max_retained_exchanges = Some(cap);
        }
    }
}

// ============================================================================
// Environment overrides
// ============================================================================

const MAX_BUFFER_SETTING: usize = 1_000_000;

/// Read `name` and parse it, logging and discarding values `parse` rejects
fn env_override<T>(name: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    let parsed = parse(raw.trim());
    if parsed.is_none() {
        tracing::warn!(key = name, value = %raw, "ignoring invalid environment override");
    }
    parsed
}

fn parse_flag(raw: &str) -> Option<bool> {
    const ON: [&str; 4] = ["true", "1", "yes", "on"];
    const OFF: [&str; 4] = ["false", "0", "no", "off"];
    if ON.iter().any(|v| raw.eq_ignore_ascii_case(v)) {
        Some(true)
    } else if OFF.iter().any(|v| raw.eq_ignore_ascii_case(v)) {
        Some(false)
    } else {
        None
    }
}

fn parse_bounded(raw: &str, bounds: RangeInclusive<usize>) -> Option<usize> {
    raw.parse().ok().filter(|n| bounds.contains(n))
}

/// Enum settings use their camelCase wire names
fn parse_variant<T: DeserializeOwned>(raw: &str) -> Option<T> {
    if raw.is_empty() {
        return None;
    }
    serde_json::from_value(Value::String(raw.to_string())).ok()
}

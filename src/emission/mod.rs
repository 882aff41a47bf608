//! Outbound emission queue
//!
//! Every locally emitted envelope passes through an [`EmissionQueue`] on its
//! way to the [`Transport`]. While paused, envelopes are buffered in call
//! order; resuming flushes them FIFO before returning to direct writes. Pausing
//! lets a consumer register nested handlers before any start event can race
//! ahead on the wire. It does not throttle on peer acknowledgement.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::codec::{decode_frame, encode_frame, Frame, FrameFormat};
use crate::error::{ProtocolError, Result, TransportError};
use crate::events::ConversationEvent;

/// Write side of a duplex connection.
///
/// `send` must not block indefinitely.
pub trait Transport {
    /// Hand one frame to the connection
    fn send(&mut self, frame: Frame) -> std::result::Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, frame: Frame) -> std::result::Result<(), TransportError> {
        (**self).send(frame)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, frame: Frame) -> std::result::Result<(), TransportError> {
        (**self).send(frame)
    }
}

/// Transport that records frames in memory
#[derive(Debug, Default)]
pub struct MemoryTransport {
    frames: Vec<Frame>,
    offline: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames sent so far
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Drain the recorded frames
    pub fn take(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.frames)
    }

    /// Decode every recorded frame, skipping undecodable ones
    pub fn decoded(&self) -> Vec<ConversationEvent> {
        self.frames
            .iter()
            .filter_map(|f| decode_frame(f).ok())
            .collect()
    }

    /// While offline every `send` fails
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, frame: Frame) -> std::result::Result<(), TransportError> {
        if self.offline {
            return Err("memory transport is offline".into());
        }
        self.frames.push(frame);
        Ok(())
    }
}

/// FIFO outbound buffer with pause/resume
#[derive(Debug)]
pub struct EmissionQueue<T> {
    transport: T,
    format: FrameFormat,
    paused: bool,
    pending: VecDeque<ConversationEvent>,
}

impl<T: Transport> EmissionQueue<T> {
    /// Create a queue writing `format` frames to `transport`
    pub fn new(transport: T, format: FrameFormat) -> Self {
        Self {
            transport,
            format,
            paused: false,
            pending: VecDeque::new(),
        }
    }

    /// Send `event`, or buffer it while paused.
    ///
    /// A transport failure keeps `event` buffered and pauses the queue, so
    /// later emits line up behind it until [`resume`](Self::resume) succeeds.
    pub fn emit(&mut self, event: ConversationEvent) -> Result<()> {
        if self.paused {
            self.pending.push_back(event);
            return Ok(());
        }
        let frame = encode_frame(&event, self.format)?;
        if let Err(e) = self.transport.send(frame) {
            warn!(pending = self.pending.len() + 1, "transport write failed, pausing emission");
            self.pending.push_back(event);
            self.paused = true;
            return Err(ProtocolError::Transport(e));
        }
        Ok(())
    }

    /// Buffer subsequent emits until [`resume`](Self::resume)
    pub fn pause(&mut self) {
        if !self.paused {
            debug!("emission paused");
        }
        self.paused = true;
    }

    /// Flush buffered envelopes in FIFO order and return to direct writes.
    ///
    /// Returns the number flushed. If the transport fails, the failed
    /// envelope and everything after it stay buffered, the queue stays
    /// paused and the error is returned.
    pub fn resume(&mut self) -> Result<usize> {
        let mut flushed = 0;
        while let Some(event) = self.pending.front() {
            write_frame(&mut self.transport, self.format, event)?;
            self.pending.pop_front();
            flushed += 1;
        }
        if self.paused {
            debug!(flushed, "emission resumed");
        }
        self.paused = false;
        Ok(flushed)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Number of buffered envelopes
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the queue, dropping anything still buffered
    pub fn into_transport(self) -> T {
        self.transport
    }
}

fn write_frame<T: Transport>(
    transport: &mut T,
    format: FrameFormat,
    event: &ConversationEvent,
) -> Result<()> {
    let frame = encode_frame(event, format)?;
    transport.send(frame).map_err(ProtocolError::Transport)
}

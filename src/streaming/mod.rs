//! Inbound stream driver
//!
//! Feeds a stream of transport frames into a [`Session`] until the stream
//! is exhausted or the session ends.

use futures_util::StreamExt;
use tracing::{debug, warn};

use crate::codec::Frame;
use crate::emission::Transport;
use crate::error::{ProtocolError, Result};
use crate::registry::EntityRef;
use crate::session::Session;
use crate::state::Phase;

impl<T: Transport> Session<T> {
    /// Apply every frame from `frames`.
    ///
    /// Undecodable frames are logged and skipped. Stops early once the
    /// session has ended. Returns the number of frames applied.
    pub async fn drive<S>(&mut self, mut frames: S) -> Result<usize>
    where
        S: futures_util::Stream<Item = Frame> + Unpin,
    {
        let mut applied = 0;

        while let Some(frame) = frames.next().await {
            match self.receive_frame(&frame) {
                Ok(()) => applied += 1,
                Err(ProtocolError::Codec(e)) => {
                    warn!(conversation_id = %self.conversation_id(), error = %e, "skipping undecodable frame");
                    continue;
                }
                Err(e) => return Err(e),
            }
            if self.phase(&EntityRef::Session) == Some(Phase::Ended) {
                debug!(conversation_id = %self.conversation_id(), applied, "session ended, stopping driver");
                break;
            }
        }

        Ok(applied)
    }
}

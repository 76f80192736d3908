//! The outbound event stream for one turn.
//!
//! A [`TurnStream`] forwards events to a single consumer in order. Sending
//! never fails from the caller's point of view: once the consumer is gone the
//! stream is marked closed, later events are dropped, and the turn's
//! cancellation token fires so generation can stop early.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::stream_event::AgentStreamEvent;

/// Default buffer between the turn and its consumer.
pub const DEFAULT_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct TurnStream {
    tx: mpsc::Sender<AgentStreamEvent>,
    closed: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl TurnStream {
    /// Create a stream and the receiver that consumes it.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AgentStreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                closed: Arc::new(AtomicBool::new(false)),
                cancel: CancellationToken::new(),
            },
            rx,
        )
    }

    /// Forward one event. Returns `false` if the consumer has disconnected.
    pub async fn send(&self, event: AgentStreamEvent) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        if self.tx.send(event).await.is_err() {
            if !self.closed.swap(true, Ordering::AcqRel) {
                debug!("Stream consumer disconnected; cancelling generation");
                self.cancel.cancel();
            }
            return false;
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }

    /// Fires when the consumer goes away or the host cancels the turn.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stop generation without closing the stream.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for TurnStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnStream")
            .field("closed", &self.is_closed())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_order() {
        let (stream, mut rx) = TurnStream::channel(8);
        for step in 1..=3 {
            assert!(stream.send(AgentStreamEvent::StepStart { step }).await);
        }
        drop(stream);

        let mut steps = Vec::new();
        while let Some(event) = rx.recv().await {
            if let AgentStreamEvent::StepStart { step } = event {
                steps.push(step);
            }
        }
        assert_eq!(steps, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn disconnect_closes_and_cancels() {
        let (stream, rx) = TurnStream::channel(1);
        drop(rx);

        assert!(!stream.send(AgentStreamEvent::StepStart { step: 1 }).await);
        assert!(stream.is_closed());
        assert!(stream.cancellation().is_cancelled());

        // Later sends are dropped without error.
        assert!(!stream.send(AgentStreamEvent::StepStart { step: 2 }).await);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let (stream, rx) = TurnStream::channel(4);
        let other = stream.clone();
        drop(rx);
        other.send(AgentStreamEvent::StepStart { step: 1 }).await;
        assert!(stream.is_closed());
        assert!(stream.cancellation().is_cancelled());
    }

    #[test]
    fn host_cancel_leaves_stream_open() {
        let (stream, _rx) = TurnStream::channel(4);
        stream.cancel();
        assert!(stream.cancellation().is_cancelled());
        assert!(!stream.is_closed());
    }
}

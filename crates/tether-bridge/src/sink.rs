// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Outbound delivery to the web layer.
//
// The bridge never talks to a web view directly. Results and events are
// handed to a `MessageSink`, which the host wires to whatever transport the
// web layer listens on (script evaluation, message port, stdout, ...).

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use tether_core::types::{CallbackId, EventMessage, OutboundMessage, ResultMessage};

/// Receives every message the bridge sends outbound.
///
/// `send` may be called from any thread, including the primary context, so
/// implementations must not block.
pub trait MessageSink: Send + Sync {
    fn send(&self, message: OutboundMessage);
}

impl<F> MessageSink for F
where
    F: Fn(OutboundMessage) + Send + Sync,
{
    fn send(&self, message: OutboundMessage) {
        self(message)
    }
}

/// Sink that forwards into an unbounded tokio channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl ChannelSink {
    /// Create the sink and the receiver the transport drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MessageSink for ChannelSink {
    fn send(&self, message: OutboundMessage) {
        if self.tx.send(message).is_err() {
            debug!("outbound receiver dropped; message discarded");
        }
    }
}

/// Sink that keeps every message in memory. Used by tests and tooling.
#[derive(Default)]
pub struct MemorySink {
    messages: Mutex<Vec<OutboundMessage>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything received so far.
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages.lock().clone()
    }

    /// Result messages for one callback id, in delivery order.
    pub fn results_for(&self, callback_id: &CallbackId) -> Vec<ResultMessage> {
        self.messages
            .lock()
            .iter()
            .filter_map(OutboundMessage::as_result)
            .filter(|r| &r.callback_id == callback_id)
            .cloned()
            .collect()
    }

    /// All event messages, in delivery order.
    pub fn events(&self) -> Vec<EventMessage> {
        self.messages
            .lock()
            .iter()
            .filter_map(OutboundMessage::as_event)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageSink for MemorySink {
    fn send(&self, message: OutboundMessage) {
        self.messages.lock().push(message);
    }
}

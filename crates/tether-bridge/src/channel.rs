// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Result channel: the only way a handler reports back for a callback id.
//
// A channel is open until it carries a terminal emission (success, failure
// or end marker) or until the bridge is torn down. After that every emit is
// refused with an error the handler can see; nothing is silently dropped.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use tether_core::error::{BridgeError, Result};
use tether_core::types::{
    CallState, CallbackId, Emission, OutboundMessage, ResultMessage, ResultMode,
};

use crate::calls::CallTable;
use crate::sink::MessageSink;

/// Observable state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Still accepting emissions.
    Open,
    /// Terminal result delivered.
    Closed,
    /// Bridge torn down before a terminal result.
    Cancelled,
}

enum Phase {
    Open(Arc<dyn MessageSink>),
    Closed,
    Cancelled,
}

struct Slot {
    phase: Phase,
    emitted: usize,
}

struct Inner {
    callback_id: CallbackId,
    mode: ResultMode,
    slot: Mutex<Slot>,
    /// Call table entry to settle once the channel closes.
    table: Option<(Weak<CallTable>, u64)>,
}

/// Handle for emitting results for one `callback_id`.
///
/// Cheap to clone; every clone writes to the same channel, from any thread.
#[derive(Clone)]
pub struct ResultChannel {
    inner: Arc<Inner>,
}

impl ResultChannel {
    /// Channel not tracked by a call table.
    pub(crate) fn detached(
        callback_id: CallbackId,
        mode: ResultMode,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self::build(callback_id, mode, sink, None)
    }

    pub(crate) fn attached(
        callback_id: CallbackId,
        mode: ResultMode,
        sink: Arc<dyn MessageSink>,
        table: Weak<CallTable>,
        seq: u64,
    ) -> Self {
        Self::build(callback_id, mode, sink, Some((table, seq)))
    }

    fn build(
        callback_id: CallbackId,
        mode: ResultMode,
        sink: Arc<dyn MessageSink>,
        table: Option<(Weak<CallTable>, u64)>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                callback_id,
                mode,
                slot: Mutex::new(Slot {
                    phase: Phase::Open(sink),
                    emitted: 0,
                }),
                table,
            }),
        }
    }

    pub fn callback_id(&self) -> &CallbackId {
        &self.inner.callback_id
    }

    pub fn mode(&self) -> ResultMode {
        self.inner.mode
    }

    pub fn state(&self) -> ChannelState {
        match self.inner.slot.lock().phase {
            Phase::Open(_) => ChannelState::Open,
            Phase::Closed => ChannelState::Closed,
            Phase::Cancelled => ChannelState::Cancelled,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ChannelState::Closed
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == ChannelState::Cancelled
    }

    /// Number of messages delivered so far.
    pub fn emitted(&self) -> usize {
        self.inner.slot.lock().emitted
    }

    /// Deliver one emission to the web layer.
    ///
    /// Fails with `ProtocolViolation` after a terminal emission or for a
    /// partial or end marker on a single-result channel, and with
    /// `Cancelled` once the bridge is torn down.
    pub fn emit(&self, emission: Emission) -> Result<()> {
        let id = &self.inner.callback_id;
        let terminal = emission.is_terminal();

        let mut slot = self.inner.slot.lock();
        let sink = match &slot.phase {
            Phase::Open(sink) => Arc::clone(sink),
            Phase::Cancelled => return Err(BridgeError::Cancelled(id.to_string())),
            Phase::Closed => {
                warn!(callback_id = %id, "emit after terminal result");
                return Err(BridgeError::ProtocolViolation(format!(
                    "result already delivered for `{id}`"
                )));
            }
        };
        if self.inner.mode == ResultMode::Single
            && matches!(emission, Emission::Partial(_) | Emission::End)
        {
            warn!(callback_id = %id, "stream emission on single-result call");
            return Err(BridgeError::ProtocolViolation(format!(
                "`{id}` is a single-result call; it must end in success or failure"
            )));
        }

        // Sent under the lock so emissions for one id keep their order.
        sink.send(OutboundMessage::Result(ResultMessage::from_emission(
            id.clone(),
            emission,
        )));
        slot.emitted += 1;

        if terminal {
            slot.phase = Phase::Closed;
            drop(slot);
            debug!(callback_id = %id, "call completed");
            if let Some((table, seq)) = &self.inner.table {
                if let Some(table) = table.upgrade() {
                    table.finish(id, *seq, CallState::Completed);
                }
            }
        }
        Ok(())
    }

    /// Release the sink without delivering anything.
    ///
    /// Returns `true` if the channel was still open.
    pub(crate) fn cancel(&self) -> bool {
        let mut slot = self.inner.slot.lock();
        match slot.phase {
            Phase::Open(_) => {
                slot.phase = Phase::Cancelled;
                true
            }
            Phase::Closed | Phase::Cancelled => false,
        }
    }
}

impl std::fmt::Debug for ResultChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultChannel")
            .field("callback_id", &self.inner.callback_id)
            .field("mode", &self.inner.mode)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use serde_json::json;
    use tether_core::types::{CallFailure, ResultStatus};

    fn channel(mode: ResultMode) -> (ResultChannel, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let ch = ResultChannel::detached("cb".into(), mode, sink.clone());
        (ch, sink)
    }

    #[test]
    fn single_channel_delivers_exactly_one_terminal() {
        let (ch, sink) = channel(ResultMode::Single);
        ch.emit(Emission::Success(json!({"ok": true}))).expect("first");
        let err = ch
            .emit(Emission::Failure(CallFailure::new("late", None)))
            .expect_err("second terminal");
        assert!(matches!(err, BridgeError::ProtocolViolation(_)));
        assert_eq!(sink.len(), 1);
        assert!(ch.is_closed());
        assert_eq!(ch.emitted(), 1);
    }

    #[test]
    fn partial_on_single_channel_is_refused() {
        let (ch, sink) = channel(ResultMode::Single);
        let err = ch.emit(Emission::Partial(json!(1))).expect_err("partial");
        assert!(matches!(err, BridgeError::ProtocolViolation(_)));
        assert!(sink.is_empty());
        assert_eq!(ch.state(), ChannelState::Open);
    }

    #[test]
    fn end_marker_on_single_channel_is_refused() {
        let (ch, sink) = channel(ResultMode::Single);
        let err = ch.emit(Emission::End).expect_err("end");
        assert!(matches!(err, BridgeError::ProtocolViolation(_)));
        assert!(sink.is_empty());
        assert_eq!(ch.state(), ChannelState::Open);

        ch.emit(Emission::Success(json!(null))).expect("success still allowed");
        assert_eq!(ch.state(), ChannelState::Closed);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn stream_delivers_partials_then_end_in_order() {
        let (ch, sink) = channel(ResultMode::Stream);
        ch.emit(Emission::Partial(json!(1))).expect("p1");
        ch.emit(Emission::Partial(json!(2))).expect("p2");
        ch.emit(Emission::End).expect("end");
        assert!(ch.emit(Emission::Partial(json!(3))).is_err());

        let statuses: Vec<ResultStatus> = sink
            .results_for(&"cb".into())
            .into_iter()
            .map(|r| r.status)
            .collect();
        assert_eq!(
            statuses,
            vec![ResultStatus::Partial, ResultStatus::Partial, ResultStatus::End]
        );
    }

    #[test]
    fn cancelled_channel_refuses_and_sends_nothing() {
        let (ch, sink) = channel(ResultMode::Single);
        assert!(ch.cancel());
        assert!(!ch.cancel());
        let err = ch.emit(Emission::Success(json!(null))).expect_err("cancelled");
        assert!(matches!(err, BridgeError::Cancelled(_)));
        assert!(sink.is_empty());
        assert!(ch.is_cancelled());
    }

    #[test]
    fn clones_share_one_channel() {
        let (ch, sink) = channel(ResultMode::Single);
        let other = ch.clone();
        let t = std::thread::spawn(move || other.emit(Emission::Success(json!("a"))));
        let from_thread = t.join().expect("thread");
        let here = ch.emit(Emission::Success(json!("b")));
        assert!(from_thread.is_ok());
        assert!(matches!(here, Err(BridgeError::ProtocolViolation(_))));
        assert_eq!(sink.len(), 1);
    }
}

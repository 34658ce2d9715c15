// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Outstanding-call table.
//
// Tracks every accepted callback id from admission until its channel closes
// or the bridge is torn down, plus a bounded history of finished calls.
// Each admission gets a sequence number so a late `finish` from a previous
// call with the same id cannot settle a newer one.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use tether_core::error::{BridgeError, Result};
use tether_core::types::{CallEnvelope, CallRecord, CallState, CallbackId, ResultMode};

use crate::channel::ResultChannel;
use crate::sink::MessageSink;

struct Entry {
    record: CallRecord,
    channel: ResultChannel,
    seq: u64,
}

#[derive(Default)]
struct Table {
    outstanding: HashMap<CallbackId, Entry>,
    history: VecDeque<CallRecord>,
    next_seq: u64,
    closed: bool,
}

pub(crate) struct CallTable {
    table: Mutex<Table>,
    history_limit: usize,
}

impl CallTable {
    pub(crate) fn new(history_limit: usize) -> Self {
        Self {
            table: Mutex::new(Table::default()),
            history_limit,
        }
    }

    /// Accept a call and open its channel. The call starts `Pending`.
    pub(crate) fn admit(
        self: &Arc<Self>,
        envelope: &CallEnvelope,
        mode: ResultMode,
        sink: Arc<dyn MessageSink>,
    ) -> Result<(ResultChannel, u64)> {
        let mut table = self.table.lock();
        if table.closed {
            return Err(BridgeError::Cancelled(envelope.callback_id.to_string()));
        }
        if table.outstanding.contains_key(&envelope.callback_id) {
            return Err(BridgeError::DuplicateCallbackId(
                envelope.callback_id.to_string(),
            ));
        }

        table.next_seq += 1;
        let seq = table.next_seq;
        let channel = ResultChannel::attached(
            envelope.callback_id.clone(),
            mode,
            sink,
            Arc::downgrade(self),
            seq,
        );
        table.outstanding.insert(
            envelope.callback_id.clone(),
            Entry {
                record: CallRecord::new(envelope, CallState::Pending),
                channel: channel.clone(),
                seq,
            },
        );
        Ok((channel, seq))
    }

    pub(crate) fn is_outstanding(&self, callback_id: &CallbackId) -> bool {
        self.table.lock().outstanding.contains_key(callback_id)
    }

    /// `Pending -> Running`. False if the call is gone or already running.
    pub(crate) fn mark_running(&self, callback_id: &CallbackId, seq: u64) -> bool {
        let mut table = self.table.lock();
        match table.outstanding.get_mut(callback_id) {
            Some(entry) if entry.seq == seq && entry.record.state == CallState::Pending => {
                entry.record.state = CallState::Running;
                true
            }
            _ => false,
        }
    }

    /// Move a call into history with a finished state.
    pub(crate) fn finish(&self, callback_id: &CallbackId, seq: u64, state: CallState) {
        let mut table = self.table.lock();
        let matches = table
            .outstanding
            .get(callback_id)
            .is_some_and(|entry| entry.seq == seq);
        if !matches {
            return;
        }
        if let Some(mut entry) = table.outstanding.remove(callback_id) {
            entry.record.finish(state);
            self.push_history(&mut table, entry.record);
        }
    }

    /// Record a call that finished without ever being outstanding.
    pub(crate) fn record_finished(&self, mut record: CallRecord, state: CallState) {
        record.finish(state);
        let mut table = self.table.lock();
        self.push_history(&mut table, record);
    }

    fn push_history(&self, table: &mut Table, record: CallRecord) {
        if self.history_limit == 0 {
            return;
        }
        while table.history.len() >= self.history_limit {
            table.history.pop_front();
        }
        table.history.push_back(record);
    }

    /// Current state of a call, if it is outstanding or still in history.
    pub(crate) fn state(&self, callback_id: &CallbackId) -> Option<CallState> {
        let table = self.table.lock();
        if let Some(entry) = table.outstanding.get(callback_id) {
            return Some(entry.record.state);
        }
        table
            .history
            .iter()
            .rev()
            .find(|r| &r.callback_id == callback_id)
            .map(|r| r.state)
    }

    /// Snapshot of outstanding calls, oldest first.
    pub(crate) fn outstanding(&self) -> Vec<CallRecord> {
        let mut records: Vec<CallRecord> = self
            .table
            .lock()
            .outstanding
            .values()
            .map(|e| e.record.clone())
            .collect();
        records.sort_by_key(|r| r.accepted_at);
        records
    }

    /// Refuse new calls and cancel every outstanding one.
    ///
    /// Returns the number of calls cancelled.
    pub(crate) fn cancel_all(&self) -> usize {
        let drained: Vec<Entry> = {
            let mut table = self.table.lock();
            table.closed = true;
            table.outstanding.drain().map(|(_, entry)| entry).collect()
        };

        // Channels are cancelled outside the table lock; a concurrent
        // terminal emission may already have closed one.
        let mut cancelled = 0;
        let mut finished = Vec::with_capacity(drained.len());
        for Entry { mut record, channel, .. } in drained {
            let state = if channel.cancel() {
                cancelled += 1;
                CallState::Cancelled
            } else {
                CallState::Completed
            };
            debug!(callback_id = %record.callback_id, ?state, "call settled at teardown");
            record.finish(state);
            finished.push(record);
        }

        let mut table = self.table.lock();
        for record in finished {
            self.push_history(&mut table, record);
        }
        cancelled
    }
}

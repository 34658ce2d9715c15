// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Dispatcher: routes envelopes to handlers on their execution context.
//
//   dispatch ──► lookup ──► (unknown) ──► failure(MethodNotFound), Completed
//                  │
//                  └──► admit (Pending) ──► schedule ──► Running ──► handler
//                                                            │
//            terminal emit / handler Err / handler panic ◄───┘  => Completed
//
// `dispatch` never waits for the handler unless the method runs on the
// caller's context.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use tracing::{Span, debug, error, instrument, warn};

use tether_core::error::{BridgeError, Result};
use tether_core::types::{
    CallEnvelope, CallRecord, CallState, CallbackId, Emission, ResultMode,
};

use crate::call::PluginCall;
use crate::calls::CallTable;
use crate::channel::ResultChannel;
use crate::executor::{Job, Scheduler, panic_message};
use crate::registry::{MethodDescriptor, MethodRegistry};
use crate::sink::MessageSink;

pub struct Dispatcher {
    registry: Arc<MethodRegistry>,
    calls: Arc<CallTable>,
    scheduler: Scheduler,
    sink: Arc<dyn MessageSink>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<MethodRegistry>,
        scheduler: Scheduler,
        sink: Arc<dyn MessageSink>,
        history_limit: usize,
    ) -> Self {
        Self {
            registry,
            calls: Arc::new(CallTable::new(history_limit)),
            scheduler,
            sink,
        }
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Accept one envelope and return the channel its result arrives on.
    ///
    /// An unknown plugin or method is answered right away with a
    /// `MethodNotFound` failure. A `callback_id` that is still outstanding
    /// is refused with `DuplicateCallbackId` and nothing is sent.
    #[instrument(skip_all, fields(
        callback_id = %envelope.callback_id,
        plugin = %envelope.plugin_name,
        method = %envelope.method_name
    ))]
    pub fn dispatch(&self, envelope: CallEnvelope) -> Result<ResultChannel> {
        if self.calls.is_outstanding(&envelope.callback_id) {
            warn!("callback id already outstanding");
            return Err(BridgeError::DuplicateCallbackId(
                envelope.callback_id.to_string(),
            ));
        }

        let Some(descriptor) = self
            .registry
            .lookup(&envelope.plugin_name, &envelope.method_name)
            .cloned()
        else {
            return self.not_found(envelope);
        };

        let (channel, seq) = self
            .calls
            .admit(&envelope, descriptor.mode(), Arc::clone(&self.sink))?;
        let context = descriptor.context();
        debug!(%context, "call pending");

        let call = PluginCall::new(Arc::new(envelope), channel.clone());
        let calls = Arc::downgrade(&self.calls);
        let span = Span::current();
        let job: Job = Box::new(move || {
            let _entered = span.enter();
            run_handler(&descriptor, call, &calls, seq);
        });

        if let Err(err) = self.scheduler.schedule(context, job) {
            error!(error = %err, "could not schedule handler");
            fail(&channel, err);
        }
        Ok(channel)
    }

    fn not_found(&self, envelope: CallEnvelope) -> Result<ResultChannel> {
        debug!("method not found");
        let channel = ResultChannel::detached(
            envelope.callback_id.clone(),
            ResultMode::Single,
            Arc::clone(&self.sink),
        );
        let err = BridgeError::MethodNotFound {
            plugin: envelope.plugin_name.clone(),
            method: envelope.method_name.clone(),
        };
        channel.emit(Emission::Failure(err.into_failure()))?;
        self.calls
            .record_finished(CallRecord::new(&envelope, CallState::Pending), CallState::Completed);
        Ok(channel)
    }

    pub fn call_state(&self, callback_id: &CallbackId) -> Option<CallState> {
        self.calls.state(callback_id)
    }

    /// Calls accepted but not yet finished, oldest first.
    pub fn outstanding(&self) -> Vec<CallRecord> {
        self.calls.outstanding()
    }

    /// Cancel every outstanding call and refuse new ones.
    pub(crate) fn cancel_all(&self) -> usize {
        self.calls.cancel_all()
    }
}

fn run_handler(
    descriptor: &MethodDescriptor,
    call: PluginCall,
    calls: &Weak<CallTable>,
    seq: u64,
) {
    let started = calls
        .upgrade()
        .is_some_and(|table| table.mark_running(call.callback_id(), seq));
    if !started {
        debug!("call cancelled before it started");
        return;
    }

    let channel = call.channel().clone();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| descriptor.invoke(call)));
    let err = match outcome {
        Ok(Ok(())) => {
            if !channel.is_closed() && !channel.is_cancelled() {
                debug!("handler returned; call left open");
            }
            return;
        }
        Ok(Err(err)) => {
            debug!(error = %err, "handler returned an error");
            err
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(panic = %message, "handler panicked");
            BridgeError::HandlerFault(message)
        }
    };
    fail(&channel, err);
}

/// Resolve a call with a failure, unless it already finished.
fn fail(channel: &ResultChannel, err: BridgeError) {
    match channel.emit(Emission::Failure(err.into_failure())) {
        Ok(()) | Err(BridgeError::Cancelled(_)) => {}
        Err(late) => warn!(error = %late, "handler failed after its call completed"),
    }
}

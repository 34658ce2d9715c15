// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Tether plugin bridge: call envelopes, result
// outcomes, execution contexts and the messages exchanged with the web layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Ordered, string-keyed argument mapping of JSON values.
pub type Arguments = Map<String, Value>;

/// Caller-assigned correlation id for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackId(pub String);

impl CallbackId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallbackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallbackId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for CallbackId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opaque identity of an event listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(pub Uuid);

impl ListenerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One invocation request from the web layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnvelope {
    pub callback_id: CallbackId,
    pub plugin_name: String,
    pub method_name: String,
    #[serde(default)]
    pub arguments: Arguments,
}

impl CallEnvelope {
    pub fn new(
        callback_id: impl Into<CallbackId>,
        plugin_name: impl Into<String>,
        method_name: impl Into<String>,
    ) -> Self {
        Self {
            callback_id: callback_id.into(),
            plugin_name: plugin_name.into(),
            method_name: method_name.into(),
            arguments: Arguments::new(),
        }
    }

    /// Add (or replace) one argument.
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// Replace the whole argument mapping.
    pub fn with_arguments(mut self, arguments: Arguments) -> Self {
        self.arguments = arguments;
        self
    }
}

/// Scheduling domain a handler must run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionContext {
    /// The single UI-affine context. Handlers here must not block.
    Primary,
    /// Off-primary worker pool. Handlers may block on I/O.
    Background,
    /// Whatever context called `dispatch`; the handler runs inline.
    Caller,
}

impl std::fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Primary => "primary",
            Self::Background => "background",
            Self::Caller => "caller",
        })
    }
}

/// How many results a method may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultMode {
    /// Exactly one terminal result.
    Single,
    /// Any number of partial results closed by a terminal one.
    Stream,
}

/// Lifecycle of one outstanding `callback_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// Envelope accepted, handler not started yet.
    Pending,
    /// Handler executing (or holding the call open).
    Running,
    /// Terminal result delivered.
    Completed,
    /// Bridge torn down before completion; no result delivered.
    Cancelled,
}

impl CallState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Bookkeeping for one call, used for introspection and leak detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub callback_id: CallbackId,
    pub plugin_name: String,
    pub method_name: String,
    pub state: CallState,
    pub accepted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CallRecord {
    pub fn new(envelope: &CallEnvelope, state: CallState) -> Self {
        Self {
            callback_id: envelope.callback_id.clone(),
            plugin_name: envelope.plugin_name.clone(),
            method_name: envelope.method_name.clone(),
            state,
            accepted_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Move into a finished state and stamp the time.
    pub fn finish(&mut self, state: CallState) {
        self.state = state;
        self.finished_at = Some(Utc::now());
    }
}

/// Payload of a `failure` outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallFailure {
    pub message: String,
    pub code: Option<String>,
    pub data: Option<Value>,
}

impl CallFailure {
    pub fn new(message: impl Into<String>, code: Option<&str>) -> Self {
        Self {
            message: message.into(),
            code: code.map(str::to_owned),
            data: None,
        }
    }
}

/// A single thing a handler can write to its result channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    /// Non-terminal success (streaming methods only).
    Partial(Value),
    /// Terminal success.
    Success(Value),
    /// Terminal failure.
    Failure(CallFailure),
    /// Terminal "no more results" marker (streaming methods only).
    End,
}

impl Emission {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Partial(_))
    }
}

/// Wire status of a result message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Error,
    Partial,
    End,
}

/// Result message sent to the web layer for a `callback_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    pub callback_id: CallbackId,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResultMessage {
    pub fn success(callback_id: CallbackId, payload: Value) -> Self {
        Self {
            callback_id,
            status: ResultStatus::Success,
            payload: Some(payload),
            message: None,
            code: None,
            data: None,
        }
    }

    pub fn error(callback_id: CallbackId, failure: CallFailure) -> Self {
        Self {
            callback_id,
            status: ResultStatus::Error,
            payload: None,
            message: Some(failure.message),
            code: failure.code,
            data: failure.data,
        }
    }

    pub fn from_emission(callback_id: CallbackId, emission: Emission) -> Self {
        match emission {
            Emission::Success(payload) => Self::success(callback_id, payload),
            Emission::Failure(failure) => Self::error(callback_id, failure),
            Emission::Partial(payload) => Self {
                status: ResultStatus::Partial,
                ..Self::success(callback_id, payload)
            },
            Emission::End => Self {
                callback_id,
                status: ResultStatus::End,
                payload: None,
                message: None,
                code: None,
                data: None,
            },
        }
    }
}

/// Unsolicited event pushed from a plugin to a web-layer listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub plugin_name: String,
    pub event_name: String,
    pub payload: Value,
    pub listener_id: ListenerId,
}

/// Everything the bridge sends outbound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Result(ResultMessage),
    Event(EventMessage),
}

impl OutboundMessage {
    pub fn as_result(&self) -> Option<&ResultMessage> {
        match self {
            Self::Result(r) => Some(r),
            Self::Event(_) => None,
        }
    }

    pub fn as_event(&self) -> Option<&EventMessage> {
        match self {
            Self::Event(e) => Some(e),
            Self::Result(_) => None,
        }
    }
}

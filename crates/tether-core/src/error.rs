// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Tether.
//
// Every variant maps onto a wire code (see `codes`) so that a failure raised
// anywhere behind the dispatcher can be turned into a deterministic result
// for the web layer.

use serde_json::Value;
use thiserror::Error;

use crate::types::CallFailure;

/// Error codes carried in `error` results sent to the web layer.
pub mod codes {
    /// Plugin or method is not registered.
    pub const METHOD_NOT_FOUND: &str = "MethodNotFound";
    /// Required argument missing or of the wrong shape.
    pub const BAD_ARGUMENTS: &str = "BadArguments";
    /// Handler fault or any other unexpected failure.
    pub const INTERNAL_ERROR: &str = "InternalError";
}

/// Top-level error type for all Tether operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    // -- Dispatch errors --
    #[error("method not found: {plugin}.{method}")]
    MethodNotFound { plugin: String, method: String },

    #[error("bad arguments: {0}")]
    BadArguments(String),

    #[error("callback id `{0}` is already outstanding")]
    DuplicateCallbackId(String),

    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),

    // -- Load-time errors --
    #[error("method {plugin}.{method} is already registered")]
    DuplicateMethod { plugin: String, method: String },

    #[error("plugin `{plugin}` failed to load: {reason}")]
    PluginLoad { plugin: String, reason: String },

    // -- Result channel errors --
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("handler fault: {0}")]
    HandlerFault(String),

    #[error("call `{0}` was cancelled")]
    Cancelled(String),

    /// Failure reported by plugin code, forwarded to the web layer verbatim.
    #[error("{message}")]
    Rejected {
        message: String,
        code: Option<String>,
        data: Option<Value>,
    },

    // -- Runtime --
    #[error("executor unavailable: {0}")]
    Executor(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BridgeError {
    /// Shorthand for a plugin-level rejection with an optional code.
    pub fn rejected(message: impl Into<String>, code: Option<&str>) -> Self {
        Self::Rejected {
            message: message.into(),
            code: code.map(str::to_owned),
            data: None,
        }
    }

    /// Wire code the web layer sees when this error resolves a call.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::MethodNotFound { .. } | Self::UnknownPlugin(_) => Some(codes::METHOD_NOT_FOUND),
            Self::BadArguments(_) => Some(codes::BAD_ARGUMENTS),
            Self::Rejected { code, .. } => code.as_deref(),
            _ => Some(codes::INTERNAL_ERROR),
        }
    }

    /// Convert into the `failure` outcome delivered on a result channel.
    pub fn into_failure(self) -> CallFailure {
        let code = self.code().map(str::to_owned);
        match self {
            Self::Rejected { message, code, data } => CallFailure {
                message,
                code,
                data,
            },
            other => CallFailure {
                message: other.to_string(),
                code,
                data: None,
            },
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BridgeError>;

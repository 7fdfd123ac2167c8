// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured `<rpc-error>` records.
//!
//! All errors raised while processing one RPC accumulate into an
//! [`RpcErrorList`] and are emitted together inside the `<rpc-reply>`.

use crate::error::Status;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `error-type` classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorType {
    Transport,
    Rpc,
    Protocol,
    Application,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Transport => "transport",
            ErrorType::Rpc => "rpc",
            ErrorType::Protocol => "protocol",
            ErrorType::Application => "application",
        }
    }
}

/// `error-severity` classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Error,
    Warning,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Error => "error",
            ErrorSeverity::Warning => "warning",
        }
    }
}

/// The standard NETCONF `error-tag` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorTag {
    InUse,
    InvalidValue,
    TooBig,
    MissingAttribute,
    BadAttribute,
    UnknownAttribute,
    MissingElement,
    BadElement,
    UnknownElement,
    UnknownNamespace,
    AccessDenied,
    LockDenied,
    ResourceDenied,
    RollbackFailed,
    DataExists,
    DataMissing,
    OperationNotSupported,
    OperationFailed,
    PartialOperation,
    MalformedMessage,
}

impl ErrorTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorTag::InUse => "in-use",
            ErrorTag::InvalidValue => "invalid-value",
            ErrorTag::TooBig => "too-big",
            ErrorTag::MissingAttribute => "missing-attribute",
            ErrorTag::BadAttribute => "bad-attribute",
            ErrorTag::UnknownAttribute => "unknown-attribute",
            ErrorTag::MissingElement => "missing-element",
            ErrorTag::BadElement => "bad-element",
            ErrorTag::UnknownElement => "unknown-element",
            ErrorTag::UnknownNamespace => "unknown-namespace",
            ErrorTag::AccessDenied => "access-denied",
            ErrorTag::LockDenied => "lock-denied",
            ErrorTag::ResourceDenied => "resource-denied",
            ErrorTag::RollbackFailed => "rollback-failed",
            ErrorTag::DataExists => "data-exists",
            ErrorTag::DataMissing => "data-missing",
            ErrorTag::OperationNotSupported => "operation-not-supported",
            ErrorTag::OperationFailed => "operation-failed",
            ErrorTag::PartialOperation => "partial-operation",
            ErrorTag::MalformedMessage => "malformed-message",
        }
    }
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific `error-info` children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorInfo {
    BadElement(String),
    BadAttribute { attribute: String, element: String },
    BadNamespace(String),
    SessionId(u32),
    MissingChoice(String),
    NonUnique(String),
    OkElement(String),
    ErrElement(String),
    NoopElement(String),
}

impl ErrorInfo {
    /// Local element name this payload serializes under.
    pub fn element_name(&self) -> &'static str {
        match self {
            ErrorInfo::BadElement(_) => "bad-element",
            ErrorInfo::BadAttribute { .. } => "bad-attribute",
            ErrorInfo::BadNamespace(_) => "bad-namespace",
            ErrorInfo::SessionId(_) => "session-id",
            ErrorInfo::MissingChoice(_) => "missing-choice",
            ErrorInfo::NonUnique(_) => "non-unique",
            ErrorInfo::OkElement(_) => "ok-element",
            ErrorInfo::ErrElement(_) => "err-element",
            ErrorInfo::NoopElement(_) => "noop-element",
        }
    }
}

/// One structured RPC error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub error_type: ErrorType,
    pub error_tag: ErrorTag,
    pub severity: ErrorSeverity,
    pub app_tag: Option<String>,
    /// XPath-style path to the failing node, when one exists.
    pub path: Option<String>,
    pub message: Option<String>,
    /// xml:lang for the message.
    pub language: Option<String>,
    pub info: Vec<ErrorInfo>,
}

impl RpcError {
    /// Build an error record from an internal status via the translation
    /// table, with the message taken from the status display.
    pub fn from_status(status: &Status) -> RpcError {
        RpcError {
            error_type: status.error_type(),
            error_tag: status.error_tag(),
            severity: ErrorSeverity::Error,
            app_tag: status.app_tag().map(str::to_string),
            path: None,
            message: Some(status.to_string()),
            language: Some("en".to_string()),
            info: Vec::new(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_info(mut self, info: ErrorInfo) -> Self {
        self.info.push(info);
        self
    }
}

/// Accumulator for all errors raised by one RPC.
#[derive(Debug, Clone, Default)]
pub struct RpcErrorList {
    errors: Vec<RpcError>,
}

impl RpcErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: RpcError) {
        self.errors.push(err);
    }

    pub fn push_status(&mut self, status: &Status) {
        self.errors.push(RpcError::from_status(status));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RpcError> {
        self.errors.iter()
    }

    pub fn into_vec(self) -> Vec<RpcError> {
        self.errors
    }
}

#[cfg(test)]
#[path = "rpcerr_tests.rs"]
mod tests;

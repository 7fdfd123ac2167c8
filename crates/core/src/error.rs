// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Internal status codes and their NETCONF translation.
//!
//! Every layer reports failures as a [`Status`]; the single table in
//! [`Status::error_tag`] decides how a status surfaces on the wire.
//! Recoverable statuses accumulate into the per-RPC error list; fatal
//! ones tear the session down.

use crate::rpcerr::{ErrorTag, ErrorType};
use thiserror::Error;

/// Internal status code.
///
/// Broadly: internal-state errors are assert-class and fatal,
/// protocol-violation errors end the session after a best-effort reply,
/// the rest are RPC errors the session survives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Status {
    // fatal, assert-class
    #[error("internal error: {0}")]
    Internal(String),

    // session-fatal
    #[error("invalid message framing")]
    InvalidFraming,
    #[error("malformed XML: {0}")]
    XmlMalformed(String),
    #[error("message not allowed in this session state")]
    NoAccessState,
    #[error("wrong protocol version")]
    WrongVersion,

    // recoverable RPC errors
    #[error("resource denied: {0}")]
    ResourceDenied(String),
    #[error("access denied")]
    AccessDenied,
    #[error("lock denied by session {0}")]
    LockDenied(u32),
    #[error("target in use")]
    InUse,
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("message too big")]
    TooBig,
    #[error("missing attribute {0}")]
    MissingAttribute(String),
    #[error("bad attribute {0}")]
    BadAttribute(String),
    #[error("unknown attribute {0}")]
    UnknownAttribute(String),
    #[error("missing element {0}")]
    MissingElement(String),
    #[error("bad element {0}")]
    BadElement(String),
    #[error("unknown element {0}")]
    UnknownElement(String),
    #[error("unknown namespace {0}")]
    UnknownNamespace(String),
    #[error("missing mandatory choice {0}")]
    MissingChoice(String),
    #[error("list entries not unique")]
    NotUnique,
    #[error("rollback failed")]
    RollbackFailed,
    #[error("data already exists")]
    DataExists,
    #[error("data missing")]
    DataMissing,
    #[error("operation not supported: {0}")]
    OperationNotSupported(String),
    #[error("operation failed: {0}")]
    OperationFailed(String),
    #[error("operation partially completed")]
    PartialOperation,
}

impl Status {
    /// True when the session cannot continue after this status.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Status::Internal(_)
                | Status::InvalidFraming
                | Status::XmlMalformed(_)
                | Status::NoAccessState
                | Status::WrongVersion
        )
    }

    /// The one translation table from internal status to wire error-tag.
    pub fn error_tag(&self) -> ErrorTag {
        match self {
            Status::Internal(_) | Status::OperationFailed(_) => ErrorTag::OperationFailed,
            Status::InvalidFraming | Status::XmlMalformed(_) => ErrorTag::MalformedMessage,
            Status::NoAccessState | Status::WrongVersion | Status::AccessDenied => {
                ErrorTag::AccessDenied
            }
            Status::ResourceDenied(_) => ErrorTag::ResourceDenied,
            Status::LockDenied(_) => ErrorTag::LockDenied,
            Status::InUse => ErrorTag::InUse,
            Status::InvalidValue(_) => ErrorTag::InvalidValue,
            Status::TooBig => ErrorTag::TooBig,
            Status::MissingAttribute(_) => ErrorTag::MissingAttribute,
            Status::BadAttribute(_) => ErrorTag::BadAttribute,
            Status::UnknownAttribute(_) => ErrorTag::UnknownAttribute,
            Status::MissingElement(_) | Status::MissingChoice(_) => ErrorTag::MissingElement,
            Status::BadElement(_) | Status::NotUnique => ErrorTag::BadElement,
            Status::UnknownElement(_) => ErrorTag::UnknownElement,
            Status::UnknownNamespace(_) => ErrorTag::UnknownNamespace,
            Status::RollbackFailed => ErrorTag::RollbackFailed,
            Status::DataExists => ErrorTag::DataExists,
            Status::DataMissing => ErrorTag::DataMissing,
            Status::OperationNotSupported(_) => ErrorTag::OperationNotSupported,
            Status::PartialOperation => ErrorTag::PartialOperation,
        }
    }

    /// Default error-type classification for this status.
    pub fn error_type(&self) -> ErrorType {
        match self {
            Status::InvalidFraming | Status::XmlMalformed(_) => ErrorType::Rpc,
            Status::NoAccessState
            | Status::WrongVersion
            | Status::AccessDenied
            | Status::LockDenied(_)
            | Status::InUse
            | Status::MissingAttribute(_)
            | Status::BadAttribute(_)
            | Status::UnknownAttribute(_)
            | Status::UnknownNamespace(_)
            | Status::ResourceDenied(_)
            | Status::TooBig => ErrorType::Protocol,
            _ => ErrorType::Application,
        }
    }

    /// Error app-tag chosen per kind, where one applies.
    pub fn app_tag(&self) -> Option<&'static str> {
        match self {
            Status::NotUnique => Some("data-not-unique"),
            Status::MissingChoice(_) => Some("missing-choice"),
            Status::InvalidValue(_) => Some("invalid-value"),
            Status::DataExists | Status::DataMissing => Some("no-matches"),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

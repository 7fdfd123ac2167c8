// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ncs-core: data model shared by every layer of the NETCONF server.
//!
//! Holds the namespace registry, the schema object templates, the arena
//! value tree, the XPath subset used for filters and locks, RPC error
//! records, and the small identifier newtypes.

pub mod caps;
pub mod clock;
pub mod error;
pub mod id;
pub mod rpcerr;
pub mod schema;
pub mod value;
pub mod xmlns;
pub mod xpath;

pub use caps::{Capability, CapabilitySet};
pub use clock::{Clock, FakeClock, SystemClock};
pub use error::Status;
pub use id::{LockId, MsgId, SessionId, TxId};
pub use rpcerr::{ErrorInfo, ErrorSeverity, ErrorTag, ErrorType, RpcError, RpcErrorList};
pub use schema::{SchemaId, SchemaKind, SchemaNode, SchemaRegistry};
pub use value::{EditOp, InsertPoint, NodeId, ValueKind, ValueNode, ValueTree};
pub use xmlns::{NsId, NsRegistry};
pub use xpath::{XPathError, XPathProgram};

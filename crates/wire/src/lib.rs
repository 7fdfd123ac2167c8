// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ncs-wire: the NETCONF wire surface.
//!
//! Byte-stream framing (end-of-message and chunked modes), the typed
//! XML event reader, and the XML writer with per-message prefix
//! assignment used to build `<rpc-reply>` and notification documents.

pub mod framing;
pub mod msg;
pub mod reader;
pub mod writer;

pub use framing::{FrameDecoder, FrameEncoder, FramingError, FramingMode, InboundMessage};
pub use msg::{ReplyBody, ReplyBuilder};
pub use reader::{XmlAttr, XmlError, XmlEvent, XmlReader};
pub use writer::{PrefixMap, XmlWriter};

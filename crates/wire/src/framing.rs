// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NETCONF byte-stream framing.
//!
//! Two modes, fixed per session after the `<hello>` exchange:
//!
//! * end-of-message (base:1.0 over SSH): messages end with the literal
//!   `]]>]]>` terminator;
//! * chunked (base:1.1, RFC 6242 §4.2): `LF '#' SIZE LF <SIZE bytes>`
//!   repeated, terminated by `LF '#' '#' LF`. Sizes are decimal with no
//!   leading zero, at most 10 digits, at most 2^32-1.
//!
//! Framing errors are fatal to the session. Pipelined back-to-back
//! messages are buffered, never dropped.

use std::collections::VecDeque;
use thiserror::Error;

/// The base:1.0 end-of-message terminator.
pub const EOM: &[u8; 6] = b"]]>]]>";

/// Maximum digits in a chunk-size field.
const MAX_SIZE_DIGITS: usize = 10;

/// Outbound chunk payload cap; well under the 2^32-1 grammar maximum.
const MAX_OUT_CHUNK: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingMode {
    EndOfMessage,
    Chunked,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    #[error("invalid chunk framing: {0}")]
    Malformed(&'static str),
    #[error("chunk size exceeds 2^32-1")]
    ChunkTooBig,
}

/// One framed inbound message: an ordered list of buffers that
/// concatenate into one XML document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    pub buffers: Vec<Vec<u8>>,
    pub complete: bool,
}

impl InboundMessage {
    pub fn bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.buffers.iter().map(Vec::len).sum());
        for b in &self.buffers {
            out.extend_from_slice(b);
        }
        out
    }

    fn push(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.buffers.push(bytes.to_vec());
    }

    fn is_empty(&self) -> bool {
        self.buffers.iter().all(Vec::is_empty)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DecodeState {
    /// Waiting for the first byte of a message.
    Idle,
    /// EOM mode: inside message body, no partial terminator match.
    InMsg,
    /// EOM mode: matched `pos` bytes of the terminator.
    InEnd { pos: usize },
    /// Chunked: parsing `\n#SIZE\n`; `pos` counts consumed header bytes.
    ChunkStart { pos: usize, digits: Vec<u8> },
    /// Chunked: copying chunk payload.
    ChunkData { remaining: u64 },
    /// Chunked: after a chunk, expecting `\n#` then digit or `#`.
    Between { pos: usize },
    /// Chunked: inside the `\n##\n` end-of-chunks marker.
    EndMark { pos: usize },
}

/// Incremental frame decoder for one session's inbound stream.
#[derive(Debug)]
pub struct FrameDecoder {
    mode: FramingMode,
    state: DecodeState,
    current: InboundMessage,
    ready: VecDeque<InboundMessage>,
}

impl FrameDecoder {
    pub fn new(mode: FramingMode) -> Self {
        Self { mode, state: DecodeState::Idle, current: InboundMessage::default(), ready: VecDeque::new() }
    }

    pub fn mode(&self) -> FramingMode {
        self.mode
    }

    /// Switch framing after hello negotiation. Only legal between
    /// messages; mid-message the caller has already failed the session.
    pub fn set_mode(&mut self, mode: FramingMode) {
        self.mode = mode;
        self.state = DecodeState::Idle;
    }

    /// True when no partial message is buffered.
    pub fn is_idle(&self) -> bool {
        self.state == DecodeState::Idle && self.current.is_empty()
    }

    /// Feed raw bytes; completed messages queue up for [`Self::next_message`].
    pub fn accept(&mut self, bytes: &[u8]) -> Result<(), FramingError> {
        match self.mode {
            FramingMode::EndOfMessage => self.accept_eom(bytes),
            FramingMode::Chunked => self.accept_chunked(bytes),
        }
    }

    pub fn next_message(&mut self) -> Option<InboundMessage> {
        self.ready.pop_front()
    }

    pub fn pending_ready(&self) -> usize {
        self.ready.len()
    }

    fn finish_message(&mut self) {
        let mut msg = std::mem::take(&mut self.current);
        msg.complete = true;
        self.ready.push_back(msg);
        self.state = DecodeState::Idle;
    }

    fn accept_eom(&mut self, bytes: &[u8]) -> Result<(), FramingError> {
        // plain body bytes are batched between terminator candidates;
        // run_start == bytes.len() means nothing is pending
        let mut run_start = 0usize;
        let mut i = 0usize;
        while i < bytes.len() {
            let b = bytes[i];
            match &mut self.state {
                DecodeState::Idle | DecodeState::InMsg => {
                    if b == EOM[0] {
                        self.current.push(&bytes[run_start..i]);
                        run_start = bytes.len();
                        self.state = DecodeState::InEnd { pos: 1 };
                        i += 1;
                    } else {
                        self.state = DecodeState::InMsg;
                        // skip ahead to the next terminator candidate
                        i = match memchr::memchr(EOM[0], &bytes[i..]) {
                            Some(off) => i + off,
                            None => bytes.len(),
                        };
                    }
                }
                DecodeState::InEnd { pos } => {
                    if b == EOM[*pos] {
                        *pos += 1;
                        i += 1;
                        if *pos == EOM.len() {
                            self.finish_message();
                            run_start = i;
                        }
                    } else {
                        // failed partial match: the held prefix belongs
                        // to the body after all; re-examine this byte
                        let held = *pos;
                        self.current.push(&EOM[..held]);
                        self.state = DecodeState::InMsg;
                        run_start = i;
                    }
                }
                _ => return Err(FramingError::Malformed("mode mismatch")),
            }
        }
        // flush the trailing body run; a partial terminator match stays
        // held in the state until the next buffer disambiguates it
        if matches!(self.state, DecodeState::Idle | DecodeState::InMsg) && run_start < bytes.len() {
            self.current.push(&bytes[run_start..]);
        }
        Ok(())
    }

    fn accept_chunked(&mut self, bytes: &[u8]) -> Result<(), FramingError> {
        let mut i = 0usize;
        while i < bytes.len() {
            let b = bytes[i];
            match &mut self.state {
                DecodeState::Idle => {
                    if b != b'\n' {
                        return Err(FramingError::Malformed("expected LF to start chunk"));
                    }
                    self.state = DecodeState::ChunkStart { pos: 1, digits: Vec::new() };
                    i += 1;
                }
                DecodeState::ChunkStart { pos, digits } => {
                    match *pos {
                        1 => {
                            if b != b'#' {
                                return Err(FramingError::Malformed("expected '#' after LF"));
                            }
                            *pos = 2;
                        }
                        2 => {
                            // first size digit must be 1-9: no leading zeros
                            if !(b'1'..=b'9').contains(&b) {
                                return Err(FramingError::Malformed(
                                    "chunk size must start with 1-9",
                                ));
                            }
                            digits.push(b);
                            *pos = 3;
                        }
                        _ => {
                            if b == b'\n' {
                                let size = parse_chunk_size(digits)?;
                                self.state = DecodeState::ChunkData { remaining: size };
                            } else if b.is_ascii_digit() {
                                if digits.len() == MAX_SIZE_DIGITS {
                                    return Err(FramingError::Malformed(
                                        "chunk size longer than 10 digits",
                                    ));
                                }
                                digits.push(b);
                            } else {
                                return Err(FramingError::Malformed(
                                    "non-digit in chunk size",
                                ));
                            }
                        }
                    }
                    i += 1;
                }
                DecodeState::ChunkData { remaining } => {
                    let avail = (bytes.len() - i) as u64;
                    let take = avail.min(*remaining) as usize;
                    self.current.push(&bytes[i..i + take]);
                    *remaining -= take as u64;
                    i += take;
                    if *remaining == 0 {
                        self.state = DecodeState::Between { pos: 0 };
                    }
                }
                DecodeState::Between { pos } => {
                    match *pos {
                        0 => {
                            if b != b'\n' {
                                return Err(FramingError::Malformed(
                                    "expected LF after chunk data",
                                ));
                            }
                            *pos = 1;
                            i += 1;
                        }
                        1 => {
                            if b != b'#' {
                                return Err(FramingError::Malformed(
                                    "expected '#' after chunk data",
                                ));
                            }
                            *pos = 2;
                            i += 1;
                        }
                        _ => {
                            if b == b'#' {
                                self.state = DecodeState::EndMark { pos: 3 };
                                i += 1;
                            } else if (b'1'..=b'9').contains(&b) {
                                // next chunk header; re-process the digit
                                self.state =
                                    DecodeState::ChunkStart { pos: 2, digits: Vec::new() };
                            } else {
                                return Err(FramingError::Malformed(
                                    "expected digit or '#' after chunk",
                                ));
                            }
                        }
                    }
                }
                DecodeState::EndMark { pos } => {
                    if *pos == 3 {
                        if b != b'\n' {
                            return Err(FramingError::Malformed(
                                "expected LF to close end-of-chunks",
                            ));
                        }
                        self.finish_message();
                        i += 1;
                    } else {
                        return Err(FramingError::Malformed("bad end-of-chunks marker"));
                    }
                }
                DecodeState::InMsg | DecodeState::InEnd { .. } => {
                    return Err(FramingError::Malformed("mode mismatch"));
                }
            }
        }
        Ok(())
    }
}

fn parse_chunk_size(digits: &[u8]) -> Result<u64, FramingError> {
    let mut size: u64 = 0;
    for d in digits {
        size = size * 10 + u64::from(d - b'0');
    }
    if size > u64::from(u32::MAX) {
        return Err(FramingError::ChunkTooBig);
    }
    Ok(size)
}

/// Symmetric outbound framer.
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    mode: FramingMode,
}

impl FrameEncoder {
    pub fn new(mode: FramingMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> FramingMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: FramingMode) {
        self.mode = mode;
    }

    /// Frame one logical message for the wire.
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        match self.mode {
            FramingMode::EndOfMessage => {
                let mut out = Vec::with_capacity(payload.len() + EOM.len() + 1);
                out.extend_from_slice(payload);
                out.push(b'\n');
                out.extend_from_slice(EOM);
                out
            }
            FramingMode::Chunked => {
                let mut out = Vec::with_capacity(payload.len() + 32);
                for chunk in payload.chunks(MAX_OUT_CHUNK) {
                    out.push(b'\n');
                    out.push(b'#');
                    out.extend_from_slice(chunk.len().to_string().as_bytes());
                    out.push(b'\n');
                    out.extend_from_slice(chunk);
                }
                out.extend_from_slice(b"\n##\n");
                out
            }
        }
    }
}

#[cfg(test)]
#[path = "framing_tests.rs"]
mod tests;

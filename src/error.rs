// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy for the SGM driver.
//!
//! Mirrors the kind/propagation table of the command pipeline: every
//! pre-send failure is expected to run through [`crate::cmd::registry::CmdRegistry::bail_out`],
//! every post-send failure is surfaced through a [`crate::rsp::RspInfo`].

use std::fmt;

/// Error kinds produced by the command pipeline, the splitter, and the
/// path-delay registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SgmError {
    /// Null pointer, wrong size, bad channel-map, malformed property.
    BadParam(&'static str),
    /// Heap or SHM allocation failure.
    MemExhausted,
    /// An active command exists and the new opcode is not `GRAPH_CLOSE`.
    Busy,
    /// Master VA has no remote mapping, or handle translation returned invalid.
    NotMapped,
    /// The transport's `async_send` returned a non-zero status.
    TransportFailed,
    /// Cache flush or invalidate failed.
    Panic,
    /// Opcode not present in the dispatch table.
    Unsupported(u32),
    /// Used by the crash sweeper to mark handles that will never get a real response.
    Unexpected,
}

impl fmt::Display for SgmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadParam(what) => write!(f, "bad parameter: {what}"),
            Self::MemExhausted => write!(f, "heap or SHM allocation exhausted"),
            Self::Busy => write!(f, "a command is already in flight"),
            Self::NotMapped => write!(f, "no remote mapping for the given address"),
            Self::TransportFailed => write!(f, "transport send failed"),
            Self::Panic => write!(f, "cache flush/invalidate failed"),
            Self::Unsupported(opcode) => write!(f, "unsupported opcode: {opcode:#010x}"),
            Self::Unexpected => write!(f, "handle will never receive a real response"),
        }
    }
}

impl std::error::Error for SgmError {}

pub type Result<T> = std::result::Result<T, SgmError>;

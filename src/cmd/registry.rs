// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Command-handle registry (component C).
//!
//! `active` models the in-progress handle between `preprocess` and either
//! `postprocess` or `bail_out`. Once `postprocess` latches a handle it
//! moves into `handles`, where `lookup_by_token`/`destroy` find it for the
//! response path.

use crate::error::{Result, SgmError};
use crate::framework::SatelliteMemoryMapper;
use crate::shm::ShmRegion;
use crate::util::NodeList;
use crate::wire::opcode;
use std::sync::atomic::{AtomicU32, Ordering};

/// Where a SET/GET_CFG response's bytes should land, chosen at
/// `preprocess` time from which `handle_*` entry point was called.
#[derive(Debug, Clone)]
pub enum ResponseTarget {
    /// APM-destined: one capacity per requested `(module_instance_id,
    /// param_id)` pair, copied back into the caller's own descriptor
    /// array.
    Structured(Vec<ParamRequest>),
    /// Module-destined: one flat buffer of the given capacity, then
    /// forwarded on to the original client via a synthesized
    /// `APM_CMD_RSP_GET_CFG` packet.
    Packed {
        capacity: usize,
        client: CachedClientRequest,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamRequest {
    pub module_instance_id: u32,
    pub param_id: u32,
    pub capacity: usize,
}

/// Enough of the original client's request to mirror a response back to
/// it, with src/dst swapped and token preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedClientRequest {
    pub src_domain: u32,
    pub dst_domain: u32,
    pub src_port: u32,
    pub dst_port: u32,
    pub token: u32,
}

/// One in-flight command.
#[derive(Debug)]
pub struct CommandHandle {
    pub token: u32,
    pub opcode: u32,
    pub is_inband: bool,
    pub wait_for_rsp: bool,
    pub secondary_opcode: Option<u32>,
    pub is_apm_destination: bool,
    /// The incoming message this command was built from, kept so the
    /// crash sweeper can hand it back to the secondary result handler
    /// unchanged.
    pub cached_msg: Vec<u8>,
    pub shm: Option<ShmRegion>,
    pub payload: Vec<u8>,
    pub response_target: Option<ResponseTarget>,
}

impl CommandHandle {
    fn new(token: u32, opcode: u32, is_inband: bool) -> Self {
        Self {
            token,
            opcode,
            is_inband,
            wait_for_rsp: false,
            secondary_opcode: None,
            is_apm_destination: false,
            cached_msg: Vec::new(),
            shm: None,
            payload: Vec::new(),
            response_target: None,
        }
    }
}

/// Owns the active-in-progress handle plus the list of handles latched
/// in by a successful dispatch.
#[derive(Default)]
pub struct CmdRegistry {
    active: Option<CommandHandle>,
    handles: NodeList<CommandHandle>,
    next_token: AtomicU32,
}

impl CmdRegistry {
    pub fn new(start_token: u32) -> Self {
        Self {
            active: None,
            handles: NodeList::new(),
            next_token: AtomicU32::new(start_token),
        }
    }

    /// Shared by the path-delay synthesizer.
    pub fn next_token(&self) -> u32 {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    fn is_busy(&self) -> bool {
        self.active.is_some() || self.handles.iter().any(|h| h.wait_for_rsp)
    }

    /// Invariant 1: only GRAPH_CLOSE may be issued while
    /// another command is outstanding.
    pub fn preprocess(&mut self, opcode: u32, is_inband: bool) -> Result<u32> {
        if opcode != opcode::GRAPH_CLOSE && self.is_busy() {
            return Err(SgmError::Busy);
        }
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "[sgm::cmd] preprocess: token={:#x} opcode={:#x} inband={}",
            token,
            opcode,
            is_inband
        );
        self.active = Some(CommandHandle::new(token, opcode, is_inband));
        Ok(token)
    }

    pub fn active(&self) -> Option<&CommandHandle> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut CommandHandle> {
        self.active.as_mut()
    }

    /// Latches the active handle into the in-flight list once dispatch
    /// has sent it successfully.
    pub fn postprocess(&mut self) {
        if let Some(mut handle) = self.active.take() {
            handle.wait_for_rsp = true;
            log::debug!(
                "[sgm::cmd] postprocess: token={:#x} opcode={:#x} now in-flight",
                handle.token,
                handle.opcode
            );
            self.handles.add_tail(handle);
        }
    }

    /// Releases the active handle's SHM region and drops it outright
    /// (the payload buffer needs no explicit free in Rust). Idempotent
    /// against a vacant active slot.
    pub fn bail_out(&mut self, mapper: &mut dyn SatelliteMemoryMapper) {
        if let Some(handle) = self.active.take() {
            log::warn!(
                "[sgm::cmd] bail_out: token={:#x} opcode={:#x}",
                handle.token,
                handle.opcode
            );
            if let Some(region) = handle.shm {
                crate::shm::free(mapper, region);
            }
        }
    }

    pub fn lookup_by_token(&self, token: u32) -> Option<&CommandHandle> {
        self.handles.find(|h| h.token == token)
    }

    pub fn lookup_by_token_mut(&mut self, token: u32) -> Option<&mut CommandHandle> {
        self.handles.find_mut(|h| h.token == token)
    }

    /// Removes the handle for `token` from the in-flight list, releases
    /// its SHM region, and returns it for final post-processing. A handle
    /// must exist for at most one response per command.
    pub fn destroy(
        &mut self,
        token: u32,
        mapper: &mut dyn SatelliteMemoryMapper,
    ) -> Option<CommandHandle> {
        let mut handle = self.handles.take(|h| h.token == token)?;
        log::debug!(
            "[sgm::cmd] destroy: token={:#x} opcode={:#x}",
            handle.token,
            handle.opcode
        );
        if let Some(region) = handle.shm.take() {
            crate::shm::free(mapper, region);
        }
        Some(handle)
    }

    /// Pops the oldest in-flight handle without looking it up by token.
    /// Used exclusively by the crash sweeper.
    pub fn pop_front_in_flight(&mut self) -> Option<CommandHandle> {
        self.handles.pop_front()
    }

    pub fn in_flight_len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_in_flight_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shm::test_support::LocalMapper;

    #[test]
    fn second_non_close_command_is_rejected_while_busy() {
        let mut reg = CmdRegistry::new(1);
        reg.preprocess(opcode::GRAPH_PREPARE, true).expect("first");
        reg.postprocess();
        assert_eq!(
            reg.preprocess(opcode::GRAPH_START, true),
            Err(SgmError::Busy)
        );
        assert_eq!(reg.in_flight_len(), 1);
    }

    #[test]
    fn graph_close_is_admitted_while_another_command_outstanding() {
        let mut reg = CmdRegistry::new(1);
        reg.preprocess(opcode::GRAPH_PREPARE, true).expect("first");
        reg.postprocess();
        let close_token = reg
            .preprocess(opcode::GRAPH_CLOSE, true)
            .expect("close admitted despite busy");
        reg.postprocess();
        assert_eq!(reg.in_flight_len(), 2);
        assert!(reg.lookup_by_token(close_token).is_some());
    }

    #[test]
    fn tokens_strictly_increase() {
        let mut reg = CmdRegistry::new(100);
        let t1 = reg.preprocess(opcode::GRAPH_PREPARE, true).unwrap();
        reg.postprocess();
        let t2 = reg.preprocess(opcode::GRAPH_CLOSE, true).unwrap();
        assert!(t2 > t1);
    }

    #[test]
    fn bail_out_frees_shm_and_clears_active() {
        let mut mapper = LocalMapper::new();
        let mut reg = CmdRegistry::new(1);
        reg.preprocess(opcode::GRAPH_OPEN, false).unwrap();
        let region = crate::shm::alloc(&mut mapper, 64, 4).unwrap();
        reg.active_mut().unwrap().shm = Some(region);
        reg.bail_out(&mut mapper);
        assert!(reg.active().is_none());
        assert_eq!(reg.in_flight_len(), 0);
    }

    #[test]
    fn destroy_removes_from_in_flight_list_exactly_once() {
        let mut mapper = LocalMapper::new();
        let mut reg = CmdRegistry::new(1);
        let token = reg.preprocess(opcode::GRAPH_PREPARE, true).unwrap();
        reg.postprocess();
        assert!(reg.destroy(token, &mut mapper).is_some());
        assert!(reg.destroy(token, &mut mapper).is_none());
        assert!(reg.is_in_flight_empty());
    }

    #[test]
    fn pop_front_in_flight_drains_oldest_first() {
        let mut reg = CmdRegistry::new(1);
        let t1 = reg.preprocess(opcode::GRAPH_PREPARE, true).unwrap();
        reg.postprocess();
        reg.preprocess(opcode::GRAPH_CLOSE, true).unwrap();
        reg.postprocess();
        assert_eq!(reg.pop_front_in_flight().unwrap().token, t1);
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Collaborator traits for the ambient container framework.
//!
//! The event loop, channel/bit-mask scheduling, heap allocator and cache
//! primitives all live outside this crate. These traits are the seam:
//! production embedders implement them against the real container; this
//! crate's own tests implement them against in-memory fakes instead of a
//! live transport.

use crate::error::{Result, SgmError};

/// A single GPR-style packet exchanged with the satellite domain.
#[derive(Debug, Clone)]
pub struct Packet {
    pub src_domain: u32,
    pub dst_domain: u32,
    pub src_port: u32,
    pub dst_port: u32,
    pub token: u32,
    pub opcode: u32,
    pub payload: Vec<u8>,
}

/// The generic packet router (GPR) transport.
pub trait PacketRouter {
    fn register_container(&mut self, container_id: u32) -> Result<()>;
    fn deregister_container(&mut self, container_id: u32) -> Result<()>;

    /// Allocate a packet for a later fill + explicit send.
    fn alloc_packet(
        &mut self,
        src_domain: u32,
        dst_domain: u32,
        src_port: u32,
        dst_port: u32,
        token: u32,
        opcode: u32,
        payload_size: usize,
    ) -> Result<Packet>;

    /// Send an already-filled packet asynchronously.
    fn async_send(&mut self, packet: Packet) -> Result<()>;

    /// Allocate, fill and send in one step (used by the synthesized
    /// path-delay register/deregister commands, which bypass the normal
    /// command-handle pipeline).
    fn alloc_and_send(
        &mut self,
        src_domain: u32,
        dst_domain: u32,
        src_port: u32,
        dst_port: u32,
        token: u32,
        opcode: u32,
        payload: Vec<u8>,
    ) -> Result<()> {
        let mut packet = self.alloc_packet(
            src_domain,
            dst_domain,
            src_port,
            dst_port,
            token,
            opcode,
            payload.len(),
        )?;
        packet.payload = payload;
        self.async_send(packet)
    }

    /// Synthesize an end-command response with the given status and free
    /// the inbound packet, used for the `Unsupported` error path.
    fn end_command(&mut self, packet: Packet, status: u32);

    fn free_packet(&mut self, packet: Packet);
}

/// A remote handle plus byte offset for an OOB shared-memory region, as
/// seen from the satellite side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteHandle {
    pub satellite_handle: u32,
    pub offset: u32,
}

/// Sentinel for a failed remote handle translation.
pub const APM_OFFLOAD_INVALID_VAL: u32 = 0xFFFF_FFFF;

/// Shared-memory provisioning and cross-domain handle translation.
pub trait SatelliteMemoryMapper {
    fn shm_alloc(&mut self, size: usize, satellite_domain_id: u32) -> Result<RawShmRegion>;
    fn shm_free(&mut self, region: RawShmRegion);
    fn va_to_remote(&self, local_va: usize) -> Result<RemoteHandle>;
    fn offload_translate_persistent_handle(
        &self,
        satellite_domain: u32,
        master_handle: u32,
    ) -> Result<u32>;
}

/// The raw, framework-owned side of a shared-memory mapping: a local
/// writable slice plus its satellite-side handle/offset. [`crate::shm::ShmRegion`]
/// wraps this with ownership/Drop semantics for the command pipeline.
#[derive(Debug)]
pub struct RawShmRegion {
    pub local_va: usize,
    pub len: usize,
    pub satellite_handle: u32,
    pub offset: u32,
}

/// One of the container's two incoming message queues (event, response).
/// Production embedders back this with the real scheduler-bound queue;
/// this crate's tests use a `VecDeque`-backed fake.
pub trait Queue {
    fn pop_front(&mut self) -> Option<Packet>;
}

/// Cache flush/invalidate primitives, required to be exact-length per
/// the cache-discipline invariant on OOB sends and responses.
pub trait CacheOps {
    fn flush(&mut self, addr: usize, len: usize) -> Result<()>;
    fn invalidate(&mut self, addr: usize, len: usize) -> Result<()>;
}

/// Helper used by the dispatcher/router to turn a framework cache failure
/// into the driver's `Panic` error kind.
pub fn cache_result(ok: bool) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(SgmError::Panic)
    }
}

/// Data-path event collaborators: these events carry no
/// command-handle correlation and are simply forwarded to whatever part
/// of the container owns the shared-memory endpoint in question.
pub trait DataPathEvents {
    fn media_format(&mut self, read_port_index: u32, payload: &[u8]);
    fn operating_frame_size(&mut self, payload: &[u8]);
    fn metadata_clone(&mut self, payload: &[u8]);
    fn metadata_tracking(&mut self, payload: &[u8]);
}

/// Invoked once a container-delay event's satellite path id has been
/// translated back to the corresponding master path id.
pub trait ContainerDelayUpdater {
    fn update_path_delay(&mut self, master_path_id: u32, prev_delay_us: u32, new_delay_us: u32);
}

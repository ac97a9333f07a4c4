// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared-memory region manager (component B).
//!
//! Owns a region's create/open/free lifecycle, but the actual mapping is
//! delegated to a [`crate::framework::SatelliteMemoryMapper`] collaborator:
//! the satellite's addressing scheme is a framework concern, not something
//! this crate should assume is POSIX `shm_open`/`mmap`.

use crate::error::{Result, SgmError};
use crate::framework::{RawShmRegion, RemoteHandle, SatelliteMemoryMapper};

/// An owned shared-memory region as used by one in-flight command.
///
/// A region is exclusively owned by the [`crate::cmd::registry::CmdRegistry`]
/// handle that allocated it. `satellite_handle` of
/// [`crate::framework::APM_OFFLOAD_INVALID_VAL`] means the handle
/// translation failed; callers must bail out rather than use such a region.
#[derive(Debug)]
pub struct ShmRegion {
    raw: RawShmRegion,
}

impl ShmRegion {
    pub fn local_va(&self) -> usize {
        self.raw.local_va
    }

    pub fn len(&self) -> usize {
        self.raw.len
    }

    pub fn is_empty(&self) -> bool {
        self.raw.len == 0
    }

    pub fn satellite_handle(&self) -> u32 {
        self.raw.satellite_handle
    }

    pub fn offset(&self) -> u32 {
        self.raw.offset
    }

    pub fn is_valid(&self) -> bool {
        self.raw.satellite_handle != crate::framework::APM_OFFLOAD_INVALID_VAL
    }

    /// Writes `bytes` at the start of the region. `bytes.len()` must not
    /// exceed the region's length; this is the only place command payload
    /// bytes are copied into shared memory.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.raw.len {
            return Err(SgmError::BadParam("payload exceeds allocated SHM region"));
        }
        // SAFETY: local_va/len were returned together by the same
        // SatelliteMemoryMapper::shm_alloc call that produced this region,
        // and ShmRegion is single-writer until send (invariant 3).
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.raw.local_va as *mut u8,
                bytes.len(),
            );
        }
        Ok(())
    }

    /// Reads the full region back out as an owned buffer. Callers are
    /// responsible for invalidating the cache range first.
    pub fn read(&self) -> Vec<u8> {
        // SAFETY: local_va/len were returned together by the same
        // SatelliteMemoryMapper::shm_alloc call that produced this region.
        unsafe { std::slice::from_raw_parts(self.raw.local_va as *const u8, self.raw.len).to_vec() }
    }
}

/// Allocates a shared-memory region of `size` bytes through `mapper` and
/// returns [`SgmError::NotMapped`] if the handle translation failed rather
/// than returning an unusable region silently.
pub fn alloc(
    mapper: &mut dyn SatelliteMemoryMapper,
    size: usize,
    satellite_domain_id: u32,
) -> Result<ShmRegion> {
    let raw = mapper.shm_alloc(size, satellite_domain_id)?;
    if raw.satellite_handle == crate::framework::APM_OFFLOAD_INVALID_VAL {
        mapper.shm_free(raw);
        log::warn!("[sgm::shm] alloc: satellite handle translation returned invalid value");
        return Err(SgmError::NotMapped);
    }
    Ok(ShmRegion { raw })
}

/// Frees a region; callers should prefer letting a [`crate::cmd::registry::CommandHandle`]
/// drop it, this is the explicit funnel used by `bail_out` and `destroy`.
pub fn free(mapper: &mut dyn SatelliteMemoryMapper, region: ShmRegion) {
    mapper.shm_free(region.raw);
}

/// Resolves a master virtual address to its satellite-side handle/offset.
pub fn va_to_remote(mapper: &dyn SatelliteMemoryMapper, local_va: usize) -> Result<RemoteHandle> {
    mapper.va_to_remote(local_va)
}

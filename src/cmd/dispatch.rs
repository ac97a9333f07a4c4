// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dispatcher (component F).
//!
//! Assumes the caller has already run [`CmdRegistry::preprocess`]; this
//! module picks in-band vs out-of-band, fills the APM command header,
//! writes the already-packed payload to its destination, and either
//! bails the active handle out or latches it via `postprocess`.

use super::registry::CmdRegistry;
use crate::config::SgmConfig;
use crate::error::{Result, SgmError};
use crate::framework::{cache_result, CacheOps, PacketRouter, SatelliteMemoryMapper};
use crate::wire::types::{ApmCmdHeader, APM_CMD_HEADER_SIZE, APM_MODULE_INSTANCE_ID};

fn header_bytes(header: ApmCmdHeader) -> [u8; APM_CMD_HEADER_SIZE] {
    let mut out = [0u8; APM_CMD_HEADER_SIZE];
    out[0..4].copy_from_slice(&header.payload_address_lsw.to_ne_bytes());
    out[4..8].copy_from_slice(&header.payload_address_msw.to_ne_bytes());
    out[8..12].copy_from_slice(&header.mem_map_handle.to_ne_bytes());
    out[12..16].copy_from_slice(&header.payload_size.to_ne_bytes());
    out
}

/// Destination addressing for one outbound command.
#[derive(Debug, Clone, Copy)]
pub struct Destination {
    pub src_domain: u32,
    pub dst_domain: u32,
    pub src_port: u32,
    pub dst_port: u32,
}

impl Destination {
    /// `send_to_default_dst`: module-targeted set/get uses the satellite
    /// APM instance itself as the destination port.
    pub fn default_dst(src_domain: u32, dst_domain: u32, src_port: u32) -> Self {
        Self {
            src_domain,
            dst_domain,
            src_port,
            dst_port: APM_MODULE_INSTANCE_ID,
        }
    }

    /// `send_to_dst`: persistent-config commands and module-targeted
    /// set/get address a specific module instance / satellite APM port.
    pub fn to_port(src_domain: u32, dst_domain: u32, src_port: u32, dst_port: u32) -> Self {
        Self {
            src_domain,
            dst_domain,
            src_port,
            dst_port,
        }
    }
}

/// Sizes, packs the header around, sends `payload`, and either latches
/// the active command handle or bails it out.
///
/// `payload` must already be the fully packed wire body from
/// [`crate::wire::pack`]; this function never reinterprets its contents.
pub fn dispatch(
    registry: &mut CmdRegistry,
    router: &mut dyn PacketRouter,
    mapper: &mut dyn SatelliteMemoryMapper,
    cache: &mut dyn CacheOps,
    config: &SgmConfig,
    dest: Destination,
    satellite_domain_id: u32,
    payload: Vec<u8>,
) -> Result<()> {
    let (token, opcode) = match registry.active() {
        Some(h) => (h.token, h.opcode),
        None => {
            return Err(SgmError::BadParam(
                "dispatch called with no active command handle",
            ))
        }
    };

    let result = run_send(
        registry,
        router,
        mapper,
        cache,
        config,
        dest,
        satellite_domain_id,
        token,
        opcode,
        payload,
    );

    match result {
        Ok(()) => {
            registry.postprocess();
            Ok(())
        }
        Err(e) => {
            log::warn!(
                "[sgm::cmd] dispatch: token={:#x} opcode={:#x} failed: {e}",
                token,
                opcode
            );
            registry.bail_out(mapper);
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_send(
    registry: &mut CmdRegistry,
    router: &mut dyn PacketRouter,
    mapper: &mut dyn SatelliteMemoryMapper,
    cache: &mut dyn CacheOps,
    config: &SgmConfig,
    dest: Destination,
    satellite_domain_id: u32,
    token: u32,
    opcode: u32,
    payload: Vec<u8>,
) -> Result<()> {
    let is_inband = payload.len() <= config.in_band_payload_limit;

    if is_inband {
        let header = ApmCmdHeader::in_band(payload.len() as u32);
        let mut framed = Vec::with_capacity(APM_CMD_HEADER_SIZE + payload.len());
        framed.extend_from_slice(&header_bytes(header));
        framed.extend_from_slice(&payload);

        if let Some(handle) = registry.active_mut() {
            handle.is_inband = true;
            handle.payload = framed.clone();
        }
        router.alloc_and_send(
            dest.src_domain,
            dest.dst_domain,
            dest.src_port,
            dest.dst_port,
            token,
            opcode,
            framed,
        )
    } else {
        let region = crate::shm::alloc(mapper, payload.len(), satellite_domain_id)?;
        let mut region = region;
        if let Err(e) = region.write(&payload) {
            crate::shm::free(mapper, region);
            return Err(e);
        }
        if cache_result(cache.flush(region.local_va(), region.len()).is_ok()).is_err() {
            log::error!("[sgm::cmd] dispatch: OOB cache flush failed");
            crate::shm::free(mapper, region);
            return Err(SgmError::Panic);
        }

        let header = ApmCmdHeader::out_of_band(
            region.offset(),
            region.satellite_handle(),
            payload.len() as u32,
        );
        let header_only = header_bytes(header).to_vec();

        if let Some(handle) = registry.active_mut() {
            handle.is_inband = false;
            handle.payload = header_only.clone();
            handle.shm = Some(region);
        } else {
            crate::shm::free(mapper, region);
        }

        router.alloc_and_send(
            dest.src_domain,
            dest.dst_domain,
            dest.src_port,
            dest.dst_port,
            token,
            opcode,
            header_only,
        )
    }
}

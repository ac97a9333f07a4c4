// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Crash sweeper (component J).
//!
//! Triggered by an out-of-band service-registry down-notification, not by
//! anything on the command or response queues. Drains the in-flight list by
//! popping the head repeatedly rather than walking a live iterator, since
//! `destroy` would otherwise invalidate whatever the iterator is looking at.

use crate::cmd::registry::CmdRegistry;
use crate::framework::SatelliteMemoryMapper;
use crate::rsp::{ResultHandlers, RspInfo};

/// `RspInfo.status` used exclusively by the crash sweeper.
pub const STATUS_UNEXPECTED: u32 = u32::MAX;

/// Drains every in-flight command, reporting each one to `secondary` with
/// a synthetic [`RspInfo`] carrying `status = STATUS_UNEXPECTED`. Safe to
/// call with an empty registry; never invokes the dispatcher or response
/// router.
pub fn sweep(
    registry: &mut CmdRegistry,
    mapper: &mut dyn SatelliteMemoryMapper,
    mut secondary: Option<&mut dyn ResultHandlers>,
) {
    let mut swept = 0usize;
    while let Some(handle) = registry.pop_front_in_flight() {
        swept += 1;
        let info = RspInfo {
            status: STATUS_UNEXPECTED,
            opcode: handle.opcode,
            token: handle.token,
            cmd_msg: handle.cached_msg.clone(),
            ..Default::default()
        };
        if let Some(handlers) = secondary.as_deref_mut() {
            dispatch_secondary(handle.opcode, &info, handlers);
        } else {
            log::warn!(
                "[sgm::sweep] crash sweep: no secondary result-handler table bound, dropping token {:#x}",
                handle.token
            );
        }
        if let Some(region) = handle.shm {
            crate::shm::free(mapper, region);
        }
    }
    log::info!("[sgm::sweep] crash sweep complete: {swept} handle(s) swept");
}

fn dispatch_secondary(opcode: u32, info: &RspInfo, handlers: &mut dyn ResultHandlers) {
    use crate::wire::opcode as op;
    match opcode {
        o if o == op::GRAPH_OPEN => handlers.graph_open_rsp(info),
        o if o == op::GRAPH_CLOSE => handlers.graph_close_rsp(info),
        o if o == op::GRAPH_PREPARE
            || o == op::GRAPH_START
            || o == op::GRAPH_SUSPEND
            || o == op::GRAPH_STOP
            || o == op::GRAPH_FLUSH =>
        {
            handlers.graph_mgmt_rsp(info)
        }
        o if o == op::SET_GET_CFG => handlers.graph_set_get_cfg_rsp(info),
        o if o == op::PERSISTENT_CFG => handlers.graph_set_persistent_rsp(info),
        o if o == op::REGISTER_MODULE_EVENTS || o == op::DEREGISTER_MODULE_EVENTS => {
            handlers.graph_event_reg_rsp(info)
        }
        o if o == op::SET_GET_PATH_DELAY => handlers.graph_path_delay_rsp(info),
        _ => log::warn!(
            "[sgm::sweep] dispatch_secondary: no mapping for swept opcode {opcode:#010x}"
        ),
    }
}

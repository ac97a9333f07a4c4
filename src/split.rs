// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Open-payload splitter (component E).
//!
//! Classification is set-membership only — no transitive walk of the graph.

use crate::error::{Result, SgmError};
use crate::wire::pack::learn_satellite_domain;
use crate::wire::types::*;
use std::collections::HashSet;

/// Fixed per-direction IO port slot table capacity. Recovered from the
/// original SPF headers (`SPDM_MAX_IO_PORTS`); unrelated to any value this
/// crate's own config exposes, since it bounds a wire-level array rather
/// than a tunable runtime resource.
pub const SPDM_MAX_IO_PORTS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    IpcReadClient,
    IpcWriteClient,
}

/// One entry of a fixed-capacity IO port slot table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub slot_index: usize,
    pub kind: ConnectionKind,
    pub src_module_iid: u32,
    pub dst_module_iid: u32,
    pub in_use: bool,
}

fn new_slot_table(kind: ConnectionKind) -> Vec<Connection> {
    (0..SPDM_MAX_IO_PORTS)
        .map(|slot_index| Connection {
            slot_index,
            kind,
            src_module_iid: 0,
            dst_module_iid: 0,
            in_use: false,
        })
        .collect()
}

fn push_slot(table: &mut [Connection], src: u32, dst: u32) -> Result<()> {
    let slot = table
        .iter_mut()
        .find(|c| !c.in_use)
        .ok_or(SgmError::BadParam("IO port slot table exhausted"))?;
    slot.src_module_iid = src;
    slot.dst_module_iid = dst;
    slot.in_use = true;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Membership {
    Local,
    Satellite,
    External,
}

/// The combined input to a GRAPH_OPEN split.
#[derive(Debug, Clone, Default)]
pub struct OpenPayload {
    pub sub_graphs: Vec<SubGraphCfg>,
    pub modules: Vec<ModuleListEntry>,
    pub module_props: Vec<ModulePropCfg>,
    pub connections: Vec<ModuleConn>,
    pub imcl_peers: Vec<ImclPeerInfo>,
    pub ctrl_links: Vec<CtrlLinkCfg>,
    pub param_data: Vec<ParamData>,
    pub satellite_container_cfgs: Vec<ContainerCfg>,
    /// Data/control links whose heap is already local-only; copied
    /// unchanged into `local_image`, never reclassified.
    pub mixed_heap_links: Vec<ModuleConn>,
}

/// One per-domain output envelope. `local_image` and `satellite_image`
/// of a [`SplitResult`] share this shape with disjoint contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenImage {
    pub sub_graphs: Vec<SubGraphCfg>,
    pub modules: Vec<ModuleListEntry>,
    pub module_props: Vec<ModulePropCfg>,
    pub connections: Vec<ModuleConn>,
    pub imcl_peers: Vec<ImclPeerInfo>,
    pub ctrl_links: Vec<CtrlLinkCfg>,
    pub param_data: Vec<ParamData>,
    pub satellite_container_cfgs: Vec<ContainerCfg>,
    pub mixed_heap_links: Vec<ModuleConn>,
}

pub struct SplitResult {
    pub local_image: OpenImage,
    pub satellite_image: OpenImage,
    pub ipc_write: Vec<Connection>,
    pub ipc_read: Vec<Connection>,
    /// Learned from an embedded PROC_DOMAIN container property, if any.
    /// `None` means the payload carried no such property.
    pub satellite_domain_id: Option<u32>,
}

fn membership(iid: u32, local_ids: &HashSet<u32>, satellite_ids: &HashSet<u32>) -> Membership {
    if local_ids.contains(&iid) {
        Membership::Local
    } else if satellite_ids.contains(&iid) {
        Membership::Satellite
    } else {
        Membership::External
    }
}

/// Splits a combined GRAPH_OPEN payload into disjoint local/satellite
/// images plus the IPC read/write slot tables.
pub fn split_open(input: &OpenPayload, this_container_id: u32) -> Result<SplitResult> {
    let satellite_domain_id = learn_satellite_domain(&input.satellite_container_cfgs)?;

    let mut local_ids = HashSet::new();
    let mut satellite_ids = HashSet::new();
    let mut local_modules = Vec::new();
    let mut satellite_modules = Vec::new();
    for entry in &input.modules {
        if entry.container_id == this_container_id {
            for m in &entry.modules {
                local_ids.insert(m.instance_id);
            }
            local_modules.push(entry.clone());
        } else {
            for m in &entry.modules {
                satellite_ids.insert(m.instance_id);
            }
            satellite_modules.push(entry.clone());
        }
    }

    let mut local_connections = Vec::new();
    let mut satellite_connections = Vec::new();
    let mut ipc_write = new_slot_table(ConnectionKind::IpcWriteClient);
    let mut ipc_read = new_slot_table(ConnectionKind::IpcReadClient);

    for conn in &input.connections {
        let src = membership(conn.src_module_instance_id, &local_ids, &satellite_ids);
        let dst = membership(conn.dst_module_instance_id, &local_ids, &satellite_ids);
        match (src, dst) {
            (Membership::Satellite, Membership::Satellite) => {
                satellite_connections.push(*conn);
            }
            (Membership::External, Membership::Local) | (Membership::Local, Membership::External) => {
                local_connections.push(*conn);
            }
            (Membership::Local, Membership::Local) => {
                local_connections.push(*conn);
            }
            (Membership::Local, Membership::Satellite) => {
                push_slot(
                    &mut ipc_write,
                    conn.src_module_instance_id,
                    conn.dst_module_instance_id,
                )?;
            }
            (Membership::Satellite, Membership::Local) => {
                push_slot(
                    &mut ipc_read,
                    conn.src_module_instance_id,
                    conn.dst_module_instance_id,
                )?;
            }
            _ => {
                return Err(SgmError::BadParam(
                    "connection endpoints do not form a supported local/satellite/external pair",
                ));
            }
        }
    }

    for link in &input.ctrl_links {
        let peer_1 = membership(link.peer_1_mod_iid, &local_ids, &satellite_ids);
        let peer_2 = membership(link.peer_2_mod_iid, &local_ids, &satellite_ids);
        if peer_1 != Membership::Satellite && peer_2 != Membership::Satellite {
            log::error!(
                "[sgm::split] control link {}<->{} has no satellite endpoint",
                link.peer_1_mod_iid,
                link.peer_2_mod_iid
            );
            return Err(SgmError::BadParam(
                "control link must have at least one satellite-side endpoint",
            ));
        }
    }

    let mut local_param_data = Vec::new();
    let mut satellite_param_data = Vec::new();
    for pd in &input.param_data {
        if local_ids.contains(&pd.module_instance_id) {
            local_param_data.push(pd.clone());
        } else {
            satellite_param_data.push(pd.clone());
        }
    }

    let mut local_module_props = Vec::new();
    let mut satellite_module_props = Vec::new();
    for cfg in &input.module_props {
        if local_ids.contains(&cfg.instance_id) {
            local_module_props.push(cfg.clone());
        } else {
            satellite_module_props.push(cfg.clone());
        }
    }

    let local_image = OpenImage {
        sub_graphs: Vec::new(),
        modules: local_modules,
        module_props: local_module_props,
        connections: local_connections,
        imcl_peers: Vec::new(),
        ctrl_links: Vec::new(),
        param_data: local_param_data,
        satellite_container_cfgs: Vec::new(),
        mixed_heap_links: input.mixed_heap_links.clone(),
    };

    let satellite_image = OpenImage {
        sub_graphs: input.sub_graphs.clone(),
        modules: satellite_modules,
        module_props: satellite_module_props,
        connections: satellite_connections,
        imcl_peers: input.imcl_peers.clone(),
        ctrl_links: input.ctrl_links.clone(),
        param_data: satellite_param_data,
        satellite_container_cfgs: input.satellite_container_cfgs.clone(),
        mixed_heap_links: Vec::new(),
    };

    Ok(SplitResult {
        local_image,
        satellite_image,
        ipc_write,
        ipc_read,
        satellite_domain_id,
    })
}

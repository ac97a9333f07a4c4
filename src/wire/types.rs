// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! APM wire-schema object model.
//!
//! These are owned, typed records rather than the original's arrays of
//! pointers to blob bodies — the packer builds a separate wire buffer from
//! them.

/// Sentinel for an unknown satellite process domain.
pub const APM_PROC_DOMAIN_ID_INVALID: u32 = 0xFFFF_FFFF;

/// The APM module instance id used to address the satellite APM directly,
/// as opposed to addressing one of its hosted modules.
pub const APM_MODULE_INSTANCE_ID: u32 = 0x0000_0001;

/// `{ prop_id, prop_size, prop_bytes }` tuple walked in property lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub prop_id: u32,
    pub bytes: Vec<u8>,
}

impl Property {
    pub fn new(prop_id: u32, bytes: Vec<u8>) -> Self {
        Self { prop_id, bytes }
    }

    pub fn prop_size(&self) -> u32 {
        self.bytes.len() as u32
    }
}

/// PROC_DOMAIN container property id; carries a single u32.
pub const APM_CONTAINER_PROP_ID_PROC_DOMAIN: u32 = 0x0B00_1001;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubGraphCfg {
    pub sub_graph_id: u32,
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerCfg {
    pub container_id: u32,
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleEntry {
    pub module_id: u32,
    pub instance_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleListEntry {
    pub sub_graph_id: u32,
    pub container_id: u32,
    pub modules: Vec<ModuleEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePropCfg {
    pub instance_id: u32,
    pub properties: Vec<Property>,
}

/// A fixed-size module-to-module connection record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleConn {
    pub src_module_instance_id: u32,
    pub src_port_id: u32,
    pub dst_module_instance_id: u32,
    pub dst_port_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImclPeerInfo {
    pub module_instance_id: u32,
    pub peer_domain_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtrlLinkCfg {
    pub peer_1_mod_iid: u32,
    pub peer_2_mod_iid: u32,
    pub properties: Vec<Property>,
}

/// A generic `param-data` blob, individually 8-byte aligned in the
/// destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamData {
    pub module_instance_id: u32,
    pub param_id: u32,
    pub data: Vec<u8>,
}

/// One path definition used by the path-delay get/set payload. `module_iids` is the ordered chain of modules the path traverses;
/// the original carries a richer per-node description, but the delay
/// value itself is keyed purely by `path_id` for this driver's purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathDelayDefn {
    pub path_id: u32,
    pub module_iids: Vec<u32>,
}

/// `{ module_instance_id, param_id, param_size, error_code }`, the header
/// prefixing every top-level param block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamHeader {
    pub module_instance_id: u32,
    pub param_id: u32,
    pub param_size: u32,
    pub error_code: u32,
}

pub const PARAM_HEADER_SIZE: usize = 16;

/// The APM command header: in-band sets the first three fields
/// to zero; OOB sets `payload_address_lsw` to the region offset and
/// `mem_map_handle` to the satellite-side handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApmCmdHeader {
    pub payload_address_lsw: u32,
    pub payload_address_msw: u32,
    pub mem_map_handle: u32,
    pub payload_size: u32,
}

pub const APM_CMD_HEADER_SIZE: usize = 16;

impl ApmCmdHeader {
    pub fn in_band(payload_size: u32) -> Self {
        Self {
            payload_address_lsw: 0,
            payload_address_msw: 0,
            mem_map_handle: 0,
            payload_size,
        }
    }

    pub fn out_of_band(offset: u32, satellite_handle: u32, payload_size: u32) -> Self {
        Self {
            payload_address_lsw: offset,
            payload_address_msw: 0,
            mem_map_handle: satellite_handle,
            payload_size,
        }
    }
}

/// Top-level APM parameter ids.
pub mod pid {
    pub const SUB_GRAPH_CONFIG: u32 = 0x0001_0001;
    pub const CONTAINER_CONFIG: u32 = 0x0001_0002;
    pub const MODULES_LIST: u32 = 0x0001_0003;
    pub const MODULE_PROP: u32 = 0x0001_0004;
    pub const MODULE_CONN: u32 = 0x0001_0005;
    pub const IMCL_PEER_DOMAIN_INFO: u32 = 0x0001_0006;
    pub const MODULE_CTRL_LINK_CFG: u32 = 0x0001_0007;
    pub const SUB_GRAPH_LIST: u32 = 0x0001_0008;
    pub const OFFLOAD_GRAPH_PATH_DELAY: u32 = 0x0300_1007;
}

/// Rounds `size` up to the next multiple of 8.
pub fn align_8(size: usize) -> usize {
    (size + 7) & !7
}

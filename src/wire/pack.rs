// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Two-pass "measure then fill" packer (component D).
//!
//! Every payload kind gets a `size_*` pass that walks the caller-provided
//! object arrays and a `fill_*`/`pack_*` pass that writes the exact number
//! of bytes computed by the first pass. A missing per-entry pointer would
//! be a `BadParam` in the original; here that case can't arise because the
//! data model owns its entries outright, so the Rust signatures return
//! plain `Vec<u8>` rather than `Result`. Higher-level callers that build
//! these arrays from external input are the ones expected to validate and
//! produce `BadParam`.

use super::types::*;
use crate::error::{Result, SgmError};

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_ne_bytes());
}

fn get_u32(buf: &[u8], pos: &mut usize) -> Result<u32> {
    let bytes: [u8; 4] = buf
        .get(*pos..*pos + 4)
        .ok_or(SgmError::BadParam("truncated u32"))?
        .try_into()
        .unwrap();
    *pos += 4;
    Ok(u32::from_ne_bytes(bytes))
}

fn get_bytes<'a>(buf: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let slice = buf
        .get(*pos..*pos + len)
        .ok_or(SgmError::BadParam("truncated blob"))?;
    *pos += len;
    Ok(slice)
}

fn pad_buf_to_8(buf: &mut Vec<u8>) {
    let padded = align_8(buf.len());
    buf.resize(padded, 0);
}

fn write_param_header(buf: &mut Vec<u8>, module_instance_id: u32, param_id: u32, body_len: usize) {
    put_u32(buf, module_instance_id);
    put_u32(buf, param_id);
    put_u32(buf, body_len as u32);
    put_u32(buf, 0); // error_code, always zero on the outbound side
}

fn size_property(p: &Property) -> usize {
    8 + p.bytes.len()
}

fn write_property(buf: &mut Vec<u8>, p: &Property) {
    put_u32(buf, p.prop_id);
    put_u32(buf, p.prop_size());
    buf.extend_from_slice(&p.bytes);
}

fn read_property(buf: &[u8], pos: &mut usize) -> Result<Property> {
    let prop_id = get_u32(buf, pos)?;
    let prop_size = get_u32(buf, pos)? as usize;
    let bytes = get_bytes(buf, pos, prop_size)?.to_vec();
    Ok(Property::new(prop_id, bytes))
}

// ---------------------------------------------------------------------
// Sub-graph config (APM_PARAM_ID_SUB_GRAPH_CONFIG)
// ---------------------------------------------------------------------

fn size_sub_graph_cfg(sg: &SubGraphCfg) -> usize {
    8 + sg.properties.iter().map(size_property).sum::<usize>()
}

/// Measures the full padded wire size of a sub-graph config block,
/// including the leading [`ParamHeader`].
pub fn size_sub_graph_config(list: &[SubGraphCfg]) -> usize {
    let body = 4 + list.iter().map(size_sub_graph_cfg).sum::<usize>();
    align_8(PARAM_HEADER_SIZE + body)
}

pub fn pack_sub_graph_config(list: &[SubGraphCfg]) -> Vec<u8> {
    let body_len = 4 + list.iter().map(size_sub_graph_cfg).sum::<usize>();
    let mut buf = Vec::with_capacity(size_sub_graph_config(list));
    write_param_header(&mut buf, 0, pid::SUB_GRAPH_CONFIG, body_len);
    put_u32(&mut buf, list.len() as u32);
    for sg in list {
        put_u32(&mut buf, sg.sub_graph_id);
        put_u32(&mut buf, sg.properties.len() as u32);
        for p in &sg.properties {
            write_property(&mut buf, p);
        }
    }
    pad_buf_to_8(&mut buf);
    buf
}

pub fn unpack_sub_graph_config(buf: &[u8]) -> Result<Vec<SubGraphCfg>> {
    let mut pos = 0usize;
    let _module_instance_id = get_u32(buf, &mut pos)?;
    let _param_id = get_u32(buf, &mut pos)?;
    let _param_size = get_u32(buf, &mut pos)?;
    let _error_code = get_u32(buf, &mut pos)?;
    let count = get_u32(buf, &mut pos)? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let sub_graph_id = get_u32(buf, &mut pos)?;
        let num_props = get_u32(buf, &mut pos)? as usize;
        let mut properties = Vec::with_capacity(num_props);
        for _ in 0..num_props {
            properties.push(read_property(buf, &mut pos)?);
        }
        out.push(SubGraphCfg {
            sub_graph_id,
            properties,
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------
// Container config (APM_PARAM_ID_CONTAINER_CONFIG)
//
// On fill, any PROC_DOMAIN property is stripped from the copy forwarded
// to the satellite, and its value is learned as the driver's
// satellite-domain-id. Disagreement across entries
// is a BadParam.
// ---------------------------------------------------------------------

/// Scans `list` for embedded PROC_DOMAIN properties and returns the
/// learned satellite-domain-id, or `BadParam` if two containers disagree.
pub fn learn_satellite_domain(list: &[ContainerCfg]) -> Result<Option<u32>> {
    let mut learned: Option<u32> = None;
    for cfg in list {
        for p in &cfg.properties {
            if p.prop_id == APM_CONTAINER_PROP_ID_PROC_DOMAIN {
                if p.bytes.len() != 4 {
                    return Err(SgmError::BadParam("PROC_DOMAIN property must be 4 bytes"));
                }
                let value = u32::from_ne_bytes(p.bytes[..4].try_into().unwrap());
                match learned {
                    None => learned = Some(value),
                    Some(existing) if existing != value => {
                        return Err(SgmError::BadParam(
                            "conflicting PROC_DOMAIN values across container configs",
                        ));
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(learned)
}

fn stripped_properties(cfg: &ContainerCfg) -> Vec<&Property> {
    cfg.properties
        .iter()
        .filter(|p| p.prop_id != APM_CONTAINER_PROP_ID_PROC_DOMAIN)
        .collect()
}

fn size_container_cfg(cfg: &ContainerCfg) -> usize {
    8 + stripped_properties(cfg)
        .iter()
        .map(|p| size_property(p))
        .sum::<usize>()
}

pub fn size_container_config(list: &[ContainerCfg]) -> usize {
    let body = 4 + list.iter().map(size_container_cfg).sum::<usize>();
    align_8(PARAM_HEADER_SIZE + body)
}

pub fn pack_container_config(list: &[ContainerCfg]) -> Vec<u8> {
    let body_len = 4 + list.iter().map(size_container_cfg).sum::<usize>();
    let mut buf = Vec::with_capacity(size_container_config(list));
    write_param_header(&mut buf, 0, pid::CONTAINER_CONFIG, body_len);
    put_u32(&mut buf, list.len() as u32);
    for cfg in list {
        let kept = stripped_properties(cfg);
        put_u32(&mut buf, cfg.container_id);
        put_u32(&mut buf, kept.len() as u32);
        for p in kept {
            write_property(&mut buf, p);
        }
    }
    pad_buf_to_8(&mut buf);
    buf
}

// ---------------------------------------------------------------------
// Module list (APM_PARAM_ID_MODULES_LIST) — flat, no property tails
// ---------------------------------------------------------------------

fn size_module_list_entry(entry: &ModuleListEntry) -> usize {
    12 + entry.modules.len() * 8
}

pub fn size_modules_list(list: &[ModuleListEntry]) -> usize {
    let body = 4 + list.iter().map(size_module_list_entry).sum::<usize>();
    align_8(PARAM_HEADER_SIZE + body)
}

pub fn pack_modules_list(list: &[ModuleListEntry]) -> Vec<u8> {
    let body_len = 4 + list.iter().map(size_module_list_entry).sum::<usize>();
    let mut buf = Vec::with_capacity(size_modules_list(list));
    write_param_header(&mut buf, 0, pid::MODULES_LIST, body_len);
    put_u32(&mut buf, list.len() as u32);
    for entry in list {
        put_u32(&mut buf, entry.sub_graph_id);
        put_u32(&mut buf, entry.container_id);
        put_u32(&mut buf, entry.modules.len() as u32);
        for m in &entry.modules {
            put_u32(&mut buf, m.module_id);
            put_u32(&mut buf, m.instance_id);
        }
    }
    pad_buf_to_8(&mut buf);
    buf
}

pub fn unpack_modules_list(buf: &[u8]) -> Result<Vec<ModuleListEntry>> {
    let mut pos = 0usize;
    let _ = get_u32(buf, &mut pos)?;
    let _ = get_u32(buf, &mut pos)?;
    let _ = get_u32(buf, &mut pos)?;
    let _ = get_u32(buf, &mut pos)?;
    let count = get_u32(buf, &mut pos)? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let sub_graph_id = get_u32(buf, &mut pos)?;
        let container_id = get_u32(buf, &mut pos)?;
        let num_modules = get_u32(buf, &mut pos)? as usize;
        let mut modules = Vec::with_capacity(num_modules);
        for _ in 0..num_modules {
            let module_id = get_u32(buf, &mut pos)?;
            let instance_id = get_u32(buf, &mut pos)?;
            modules.push(ModuleEntry {
                module_id,
                instance_id,
            });
        }
        out.push(ModuleListEntry {
            sub_graph_id,
            container_id,
            modules,
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------
// Module properties (APM_PARAM_ID_MODULE_PROP) — same pattern as sub-graph
// ---------------------------------------------------------------------

fn size_module_prop_cfg(cfg: &ModulePropCfg) -> usize {
    8 + cfg.properties.iter().map(size_property).sum::<usize>()
}

pub fn size_module_prop(list: &[ModulePropCfg]) -> usize {
    let body = 4 + list.iter().map(size_module_prop_cfg).sum::<usize>();
    align_8(PARAM_HEADER_SIZE + body)
}

pub fn pack_module_prop(list: &[ModulePropCfg]) -> Vec<u8> {
    let body_len = 4 + list.iter().map(size_module_prop_cfg).sum::<usize>();
    let mut buf = Vec::with_capacity(size_module_prop(list));
    write_param_header(&mut buf, 0, pid::MODULE_PROP, body_len);
    put_u32(&mut buf, list.len() as u32);
    for cfg in list {
        put_u32(&mut buf, cfg.instance_id);
        put_u32(&mut buf, cfg.properties.len() as u32);
        for p in &cfg.properties {
            write_property(&mut buf, p);
        }
    }
    pad_buf_to_8(&mut buf);
    buf
}

// ---------------------------------------------------------------------
// Module connections (APM_PARAM_ID_MODULE_CONN) — fixed-size records
// ---------------------------------------------------------------------

const MODULE_CONN_RECORD_SIZE: usize = 16;

pub fn size_module_conn(list: &[ModuleConn]) -> usize {
    align_8(PARAM_HEADER_SIZE + 4 + list.len() * MODULE_CONN_RECORD_SIZE)
}

pub fn pack_module_conn(list: &[ModuleConn]) -> Vec<u8> {
    let body_len = 4 + list.len() * MODULE_CONN_RECORD_SIZE;
    let mut buf = Vec::with_capacity(size_module_conn(list));
    write_param_header(&mut buf, 0, pid::MODULE_CONN, body_len);
    put_u32(&mut buf, list.len() as u32);
    for c in list {
        put_u32(&mut buf, c.src_module_instance_id);
        put_u32(&mut buf, c.src_port_id);
        put_u32(&mut buf, c.dst_module_instance_id);
        put_u32(&mut buf, c.dst_port_id);
    }
    pad_buf_to_8(&mut buf);
    buf
}

pub fn unpack_module_conn(buf: &[u8]) -> Result<Vec<ModuleConn>> {
    let mut pos = 0usize;
    let _ = get_u32(buf, &mut pos)?;
    let _ = get_u32(buf, &mut pos)?;
    let _ = get_u32(buf, &mut pos)?;
    let _ = get_u32(buf, &mut pos)?;
    let count = get_u32(buf, &mut pos)? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(ModuleConn {
            src_module_instance_id: get_u32(buf, &mut pos)?,
            src_port_id: get_u32(buf, &mut pos)?,
            dst_module_instance_id: get_u32(buf, &mut pos)?,
            dst_port_id: get_u32(buf, &mut pos)?,
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------
// IMCL peer info (APM_PARAM_ID_IMCL_PEER_DOMAIN_INFO) — fixed-size records
// ---------------------------------------------------------------------

const IMCL_PEER_RECORD_SIZE: usize = 8;

pub fn size_imcl_peer_info(list: &[ImclPeerInfo]) -> usize {
    align_8(PARAM_HEADER_SIZE + 4 + list.len() * IMCL_PEER_RECORD_SIZE)
}

pub fn pack_imcl_peer_info(list: &[ImclPeerInfo]) -> Vec<u8> {
    let body_len = 4 + list.len() * IMCL_PEER_RECORD_SIZE;
    let mut buf = Vec::with_capacity(size_imcl_peer_info(list));
    write_param_header(&mut buf, 0, pid::IMCL_PEER_DOMAIN_INFO, body_len);
    put_u32(&mut buf, list.len() as u32);
    for p in list {
        put_u32(&mut buf, p.module_instance_id);
        put_u32(&mut buf, p.peer_domain_id);
    }
    pad_buf_to_8(&mut buf);
    buf
}

// ---------------------------------------------------------------------
// Module control-link cfg (APM_PARAM_ID_MODULE_CTRL_LINK_CFG)
// ---------------------------------------------------------------------

fn size_ctrl_link_cfg(cfg: &CtrlLinkCfg) -> usize {
    8 + cfg.properties.iter().map(size_property).sum::<usize>()
}

pub fn size_module_ctrl_link_cfg(list: &[CtrlLinkCfg]) -> usize {
    let body = 4 + list.iter().map(size_ctrl_link_cfg).sum::<usize>();
    align_8(PARAM_HEADER_SIZE + body)
}

pub fn pack_module_ctrl_link_cfg(list: &[CtrlLinkCfg]) -> Vec<u8> {
    let body_len = 4 + list.iter().map(size_ctrl_link_cfg).sum::<usize>();
    let mut buf = Vec::with_capacity(size_module_ctrl_link_cfg(list));
    write_param_header(&mut buf, 0, pid::MODULE_CTRL_LINK_CFG, body_len);
    put_u32(&mut buf, list.len() as u32);
    for cfg in list {
        put_u32(&mut buf, cfg.peer_1_mod_iid);
        put_u32(&mut buf, cfg.peer_2_mod_iid);
        put_u32(&mut buf, cfg.properties.len() as u32);
        for p in &cfg.properties {
            write_property(&mut buf, p);
        }
    }
    pad_buf_to_8(&mut buf);
    buf
}

// ---------------------------------------------------------------------
// Generic param-data (no wrapping PID) — each param individually
// 8-byte aligned in the destination.
// ---------------------------------------------------------------------

pub fn size_param_data(list: &[ParamData]) -> usize {
    list.iter()
        .map(|p| align_8(PARAM_HEADER_SIZE + p.data.len()))
        .sum()
}

pub fn pack_param_data(list: &[ParamData]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(size_param_data(list));
    for p in list {
        write_param_header(&mut buf, p.module_instance_id, p.param_id, p.data.len());
        buf.extend_from_slice(&p.data);
        pad_buf_to_8(&mut buf);
    }
    buf
}

pub fn unpack_param_data(buf: &[u8]) -> Result<Vec<ParamData>> {
    let mut pos = 0usize;
    let mut out = Vec::new();
    while pos < buf.len() {
        let start = pos;
        let module_instance_id = get_u32(buf, &mut pos)?;
        let param_id = get_u32(buf, &mut pos)?;
        let param_size = get_u32(buf, &mut pos)? as usize;
        let _error_code = get_u32(buf, &mut pos)?;
        let data = get_bytes(buf, &mut pos, param_size)?.to_vec();
        out.push(ParamData {
            module_instance_id,
            param_id,
            data,
        });
        pos = start + align_8(pos - start);
    }
    Ok(out)
}

// ---------------------------------------------------------------------
// Graph-mgmt sub-graph list (APM_PARAM_ID_SUB_GRAPH_LIST)
//
// Used for PREPARE/START/STOP/FLUSH/SUSPEND. CLOSE additionally appends
// the connection and control-link sections.
// ---------------------------------------------------------------------

pub fn size_sub_graph_list(ids: &[u32]) -> usize {
    align_8(PARAM_HEADER_SIZE + 4 + ids.len() * 4)
}

pub fn pack_sub_graph_list(ids: &[u32]) -> Vec<u8> {
    let body_len = 4 + ids.len() * 4;
    let mut buf = Vec::with_capacity(size_sub_graph_list(ids));
    write_param_header(&mut buf, 0, pid::SUB_GRAPH_LIST, body_len);
    put_u32(&mut buf, ids.len() as u32);
    for id in ids {
        put_u32(&mut buf, *id);
    }
    pad_buf_to_8(&mut buf);
    buf
}

pub fn unpack_sub_graph_list(buf: &[u8]) -> Result<Vec<u32>> {
    let mut pos = 0usize;
    let _ = get_u32(buf, &mut pos)?;
    let _ = get_u32(buf, &mut pos)?;
    let _ = get_u32(buf, &mut pos)?;
    let _ = get_u32(buf, &mut pos)?;
    let count = get_u32(buf, &mut pos)? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(get_u32(buf, &mut pos)?);
    }
    Ok(out)
}

/// Builds the full GRAPH_CLOSE payload: the sub-graph list section
/// followed by the connection and control-link sections.
pub fn pack_graph_close(ids: &[u32], conns: &[ModuleConn], links: &[CtrlLinkCfg]) -> Vec<u8> {
    let mut buf = pack_sub_graph_list(ids);
    buf.extend_from_slice(&pack_module_conn(conns));
    buf.extend_from_slice(&pack_module_ctrl_link_cfg(links));
    buf
}

// ---------------------------------------------------------------------
// Path-delay get (wrapped as a single module-param with PID
// APM_PARAM_ID_OFFLOAD_GRAPH_PATH_DELAY) — fixed size: header + param +
// single path record.
// ---------------------------------------------------------------------

pub fn size_path_delay_get(path: &PathDelayDefn) -> usize {
    align_8(PARAM_HEADER_SIZE + 8 + path.module_iids.len() * 4)
}

pub fn pack_path_delay_get(path: &PathDelayDefn) -> Vec<u8> {
    let body_len = 8 + path.module_iids.len() * 4;
    let mut buf = Vec::with_capacity(size_path_delay_get(path));
    write_param_header(
        &mut buf,
        APM_MODULE_INSTANCE_ID,
        pid::OFFLOAD_GRAPH_PATH_DELAY,
        body_len,
    );
    put_u32(&mut buf, path.path_id);
    put_u32(&mut buf, path.module_iids.len() as u32);
    for iid in &path.module_iids {
        put_u32(&mut buf, *iid);
    }
    pad_buf_to_8(&mut buf);
    buf
}

pub fn unpack_path_delay_get(buf: &[u8]) -> Result<PathDelayDefn> {
    let mut pos = 0usize;
    let _ = get_u32(buf, &mut pos)?;
    let _ = get_u32(buf, &mut pos)?;
    let _ = get_u32(buf, &mut pos)?;
    let _ = get_u32(buf, &mut pos)?;
    let path_id = get_u32(buf, &mut pos)?;
    let count = get_u32(buf, &mut pos)? as usize;
    let mut module_iids = Vec::with_capacity(count);
    for _ in 0..count {
        module_iids.push(get_u32(buf, &mut pos)?);
    }
    Ok(PathDelayDefn {
        path_id,
        module_iids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sub_graphs() -> Vec<SubGraphCfg> {
        vec![
            SubGraphCfg {
                sub_graph_id: 0x1001,
                properties: vec![Property::new(1, vec![1, 2, 3])],
            },
            SubGraphCfg {
                sub_graph_id: 0x1002,
                properties: vec![],
            },
        ]
    }

    #[test]
    fn sub_graph_config_round_trips() {
        let original = sample_sub_graphs();
        let packed = pack_sub_graph_config(&original);
        assert_eq!(packed.len(), size_sub_graph_config(&original));
        assert_eq!(packed.len() % 8, 0);
        let unpacked = unpack_sub_graph_config(&packed).expect("unpack");
        assert_eq!(unpacked, original);
    }

    #[test]
    fn container_config_strips_proc_domain_property() {
        let list = vec![ContainerCfg {
            container_id: 7,
            properties: vec![
                Property::new(APM_CONTAINER_PROP_ID_PROC_DOMAIN, 4u32.to_ne_bytes().to_vec()),
                Property::new(99, vec![0xAB]),
            ],
        }];
        assert_eq!(learn_satellite_domain(&list).unwrap(), Some(4));
        let packed = pack_container_config(&list);
        // Only the non-PROC_DOMAIN property should survive in the wire form.
        assert_eq!(packed.len(), size_container_config(&list));
        let expected_kept = 1usize;
        // num_properties field sits right after container_id (two u32s in).
        let num_props = u32::from_ne_bytes(packed[20..24].try_into().unwrap());
        assert_eq!(num_props as usize, expected_kept);
    }

    #[test]
    fn container_config_conflicting_proc_domain_is_bad_param() {
        let list = vec![
            ContainerCfg {
                container_id: 1,
                properties: vec![Property::new(
                    APM_CONTAINER_PROP_ID_PROC_DOMAIN,
                    4u32.to_ne_bytes().to_vec(),
                )],
            },
            ContainerCfg {
                container_id: 2,
                properties: vec![Property::new(
                    APM_CONTAINER_PROP_ID_PROC_DOMAIN,
                    5u32.to_ne_bytes().to_vec(),
                )],
            },
        ];
        assert!(learn_satellite_domain(&list).is_err());
    }

    #[test]
    fn modules_list_round_trips() {
        let list = vec![ModuleListEntry {
            sub_graph_id: 1,
            container_id: 2,
            modules: vec![
                ModuleEntry {
                    module_id: 0xA,
                    instance_id: 0xB,
                },
                ModuleEntry {
                    module_id: 0xC,
                    instance_id: 0xD,
                },
            ],
        }];
        let packed = pack_modules_list(&list);
        assert_eq!(unpack_modules_list(&packed).unwrap(), list);
    }

    #[test]
    fn module_conn_round_trips() {
        let list = vec![ModuleConn {
            src_module_instance_id: 1,
            src_port_id: 2,
            dst_module_instance_id: 3,
            dst_port_id: 4,
        }];
        let packed = pack_module_conn(&list);
        assert_eq!(unpack_module_conn(&packed).unwrap(), list);
    }

    #[test]
    fn param_data_entries_are_individually_8_byte_aligned() {
        let list = vec![
            ParamData {
                module_instance_id: 1,
                param_id: 2,
                data: vec![1, 2, 3], // 3 bytes -> header(16)+3=19 -> pad to 24
            },
            ParamData {
                module_instance_id: 4,
                param_id: 5,
                data: vec![],
            },
        ];
        let packed = pack_param_data(&list);
        assert_eq!(packed.len(), 24 + 16);
        let unpacked = unpack_param_data(&packed).unwrap();
        assert_eq!(unpacked, list);
    }

    #[test]
    fn path_delay_get_round_trips() {
        let path = PathDelayDefn {
            path_id: 0x10,
            module_iids: vec![0xA, 0xB, 0xC],
        };
        let packed = pack_path_delay_get(&path);
        assert_eq!(packed.len(), size_path_delay_get(&path));
        assert_eq!(unpack_path_delay_get(&packed).unwrap(), path);
    }

    #[test]
    fn sub_graph_list_round_trips() {
        let ids = vec![1, 2, 3, 4];
        let packed = pack_sub_graph_list(&ids);
        assert_eq!(unpack_sub_graph_list(&packed).unwrap(), ids);
    }

    #[test]
    fn graph_close_appends_connection_and_ctrl_link_sections() {
        let ids = vec![1];
        let conns = vec![ModuleConn {
            src_module_instance_id: 1,
            src_port_id: 0,
            dst_module_instance_id: 2,
            dst_port_id: 0,
        }];
        let links = vec![];
        let packed = pack_graph_close(&ids, &conns, &links);
        let expected_len =
            size_sub_graph_list(&ids) + size_module_conn(&conns) + size_module_ctrl_link_cfg(&links);
        assert_eq!(packed.len(), expected_len);
    }

    #[test]
    fn all_top_level_blocks_are_8_byte_aligned() {
        assert_eq!(size_sub_graph_config(&sample_sub_graphs()) % 8, 0);
        assert_eq!(size_modules_list(&[]) % 8, 0);
        assert_eq!(size_module_conn(&[]) % 8, 0);
        assert_eq!(size_imcl_peer_info(&[]) % 8, 0);
    }
}

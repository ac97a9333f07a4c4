// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Response-queue handler (component G).
//!
//! Wire convention for a `GPR_IBASIC_RSP_RESULT` packet's payload: the
//! first 8 bytes are `{ rsp_opcode: u32, status: u32 }`, mirroring the
//! original `gpr_ibasic_rsp_result_t`; the rest (if any) is opcode-specific
//! and currently unused by any response this driver receives that way.

use crate::cmd::registry::{CmdRegistry, ResponseTarget};
use crate::framework::{cache_result, CacheOps, PacketRouter, SatelliteMemoryMapper};
use crate::framework::Packet;
use crate::wire::opcode;
use crate::wire::pack::unpack_param_data;
use crate::wire::types::{ParamData, APM_MODULE_INSTANCE_ID};

/// Everything a result handler needs to know about one completed
/// command.
#[derive(Debug, Clone, Default)]
pub struct RspInfo {
    pub status: u32,
    pub opcode: u32,
    pub token: u32,
    pub cmd_msg: Vec<u8>,
    /// Populated only for the APM-destined structured GET_CFG path.
    pub structured_result: Vec<ParamData>,
    /// Populated only for the module-destined packed GET_CFG path.
    pub packed_result: Vec<u8>,
}

/// The nine-method result-handler table. Two instances
/// are registered on the driver: primary (normal responses) and
/// secondary (crash-sweep synthesized failures).
pub trait ResultHandlers {
    fn graph_open_rsp(&mut self, info: &RspInfo);
    /// Shared by PREPARE/START/SUSPEND/STOP/FLUSH, which all carry the
    /// same sub-graph-list payload kind and differ only in
    /// `info.opcode`.
    fn graph_mgmt_rsp(&mut self, info: &RspInfo);
    fn graph_close_rsp(&mut self, info: &RspInfo);
    fn graph_set_get_cfg_rsp(&mut self, info: &RspInfo);
    fn graph_set_get_cfg_packed_rsp(&mut self, info: &RspInfo);
    fn graph_set_persistent_rsp(&mut self, info: &RspInfo);
    fn graph_set_persistent_packed_rsp(&mut self, info: &RspInfo);
    fn graph_event_reg_rsp(&mut self, info: &RspInfo);
    fn graph_path_delay_rsp(&mut self, info: &RspInfo);
}

fn dispatch_by_opcode(opcode: u32, info: &RspInfo, handlers: &mut dyn ResultHandlers) {
    match opcode {
        o if o == self::opcode::GRAPH_OPEN => handlers.graph_open_rsp(info),
        o if o == self::opcode::GRAPH_CLOSE => handlers.graph_close_rsp(info),
        o if o == self::opcode::GRAPH_PREPARE
            || o == self::opcode::GRAPH_START
            || o == self::opcode::GRAPH_SUSPEND
            || o == self::opcode::GRAPH_STOP
            || o == self::opcode::GRAPH_FLUSH =>
        {
            handlers.graph_mgmt_rsp(info)
        }
        o if o == self::opcode::SET_GET_PATH_DELAY => handlers.graph_path_delay_rsp(info),
        _ => log::warn!(
            "[sgm::rsp] dispatch_by_opcode: no result-handler mapping for opcode {opcode:#010x}"
        ),
    }
}

fn decode_ibasic_payload(payload: &[u8]) -> Option<(u32, u32)> {
    if payload.len() < 8 {
        return None;
    }
    let rsp_opcode = u32::from_ne_bytes(payload[0..4].try_into().unwrap());
    let status = u32::from_ne_bytes(payload[4..8].try_into().unwrap());
    Some((rsp_opcode, status))
}

/// Stateless entry point for the response-queue handler; all mutable
/// state lives in the collaborators passed in.
pub struct RspRouter;

impl RspRouter {
    /// Pops every packet currently queued on `queue` and routes each in
    /// turn. The container framework
    /// owns scheduling/wakeup for the queue itself; this just drains
    /// whatever is already sitting on it when invoked.
    #[allow(clippy::too_many_arguments)]
    pub fn drain(
        queue: &mut dyn crate::framework::Queue,
        registry: &mut CmdRegistry,
        mapper: &mut dyn SatelliteMemoryMapper,
        cache: &mut dyn CacheOps,
        router: &mut dyn PacketRouter,
        handlers: &mut dyn ResultHandlers,
    ) {
        while let Some(packet) = queue.pop_front() {
            Self::route(packet, registry, mapper, cache, router, handlers);
        }
    }

    /// Routes one packet popped from the response queue.
    pub fn route(
        packet: Packet,
        registry: &mut CmdRegistry,
        mapper: &mut dyn SatelliteMemoryMapper,
        cache: &mut dyn CacheOps,
        router: &mut dyn PacketRouter,
        handlers: &mut dyn ResultHandlers,
    ) {
        if packet.opcode == opcode::GPR_IBASIC_RSP_RESULT {
            Self::handle_ibasic_result(packet, registry, mapper, router, handlers);
        } else if packet.opcode == opcode::APM_CMD_RSP_GET_CFG {
            Self::handle_get_cfg_response(packet, registry, mapper, cache, router, handlers);
        } else {
            log::warn!(
                "[sgm::rsp] route: unsupported response opcode {:#010x}",
                packet.opcode
            );
            router.end_command(packet, opcode::STATUS_UNSUPPORTED);
        }
    }

    fn handle_ibasic_result(
        packet: Packet,
        registry: &mut CmdRegistry,
        mapper: &mut dyn SatelliteMemoryMapper,
        router: &mut dyn PacketRouter,
        handlers: &mut dyn ResultHandlers,
    ) {
        let Some((rsp_opcode, status)) = decode_ibasic_payload(&packet.payload) else {
            log::warn!("[sgm::rsp] handle_ibasic_result: payload too short to carry a status");
            router.free_packet(packet);
            return;
        };

        let is_event_reg =
            rsp_opcode == opcode::REGISTER_MODULE_EVENTS || rsp_opcode == opcode::DEREGISTER_MODULE_EVENTS;

        if is_event_reg && packet.token == 0 {
            // Synthesized path-delay register/deregister command: not
            // correlated through the command-handle registry.
            let info = RspInfo {
                status,
                opcode: rsp_opcode,
                token: 0,
                ..Default::default()
            };
            handlers.graph_event_reg_rsp(&info);
            router.free_packet(packet);
            return;
        }

        let Some(handle) = registry.lookup_by_token(packet.token) else {
            log::warn!(
                "[sgm::rsp] handle_ibasic_result: no command handle for token {:#x}",
                packet.token
            );
            router.free_packet(packet);
            return;
        };
        if handle.opcode != rsp_opcode {
            log::warn!(
                "[sgm::rsp] handle_ibasic_result: token {:#x} handle opcode {:#x} != response opcode {:#x}",
                packet.token, handle.opcode, rsp_opcode
            );
        }
        let cmd_msg = handle.cached_msg.clone();

        let info = RspInfo {
            status,
            opcode: rsp_opcode,
            token: packet.token,
            cmd_msg,
            ..Default::default()
        };

        if rsp_opcode == opcode::SET_GET_CFG || rsp_opcode == opcode::PERSISTENT_CFG {
            let packed = packet.src_port != APM_MODULE_INSTANCE_ID;
            if rsp_opcode == opcode::SET_GET_CFG {
                if packed {
                    handlers.graph_set_get_cfg_packed_rsp(&info);
                } else {
                    handlers.graph_set_get_cfg_rsp(&info);
                }
            } else if packed {
                handlers.graph_set_persistent_packed_rsp(&info);
            } else {
                handlers.graph_set_persistent_rsp(&info);
            }
        } else if is_event_reg {
            handlers.graph_event_reg_rsp(&info);
        } else {
            dispatch_by_opcode(rsp_opcode, &info, handlers);
        }

        registry.destroy(packet.token, mapper);
        router.free_packet(packet);
    }

    /// The OOB/in-band copy-back path for GET_CFG responses carrying
    /// actual parameter data.
    fn handle_get_cfg_response(
        packet: Packet,
        registry: &mut CmdRegistry,
        mapper: &mut dyn SatelliteMemoryMapper,
        cache: &mut dyn CacheOps,
        router: &mut dyn PacketRouter,
        handlers: &mut dyn ResultHandlers,
    ) {
        let Some(handle) = registry.destroy(packet.token, mapper) else {
            log::warn!(
                "[sgm::rsp] handle_get_cfg_response: no command handle for token {:#x}",
                packet.token
            );
            router.free_packet(packet);
            return;
        };

        let bytes = match &handle.shm {
            Some(region) => {
                if cache_result(cache.invalidate(region.local_va(), region.len()).is_ok()).is_err() {
                    log::error!(
                        "[sgm::rsp] handle_get_cfg_response: cache invalidate failed for token {:#x}",
                        packet.token
                    );
                }
                region.read()
            }
            None => packet.payload.clone(),
        };

        let mut info = RspInfo {
            status: opcode::STATUS_SUCCESS,
            opcode: handle.opcode,
            token: packet.token,
            cmd_msg: handle.cached_msg.clone(),
            ..Default::default()
        };

        match &handle.response_target {
            Some(ResponseTarget::Structured(requests)) => {
                if let Ok(records) = unpack_param_data(&bytes) {
                    for req in requests {
                        if let Some(rec) = records.iter().find(|r| {
                            r.module_instance_id == req.module_instance_id && r.param_id == req.param_id
                        }) {
                            let n = rec.data.len().min(req.capacity);
                            info.structured_result.push(ParamData {
                                module_instance_id: req.module_instance_id,
                                param_id: req.param_id,
                                data: rec.data[..n].to_vec(),
                            });
                        }
                    }
                }
                handlers.graph_set_get_cfg_rsp(&info);
            }
            Some(ResponseTarget::Packed { capacity, client }) => {
                let n = bytes.len().min(*capacity);
                info.packed_result = bytes[..n].to_vec();
                let reply = Packet {
                    src_domain: client.dst_domain,
                    dst_domain: client.src_domain,
                    src_port: client.dst_port,
                    dst_port: client.src_port,
                    token: client.token,
                    opcode: opcode::APM_CMD_RSP_GET_CFG,
                    payload: info.packed_result.clone(),
                };
                if let Err(e) = router.async_send(reply) {
                    log::warn!(
                        "[sgm::rsp] handle_get_cfg_response: forwarding reply to client failed: {e}"
                    );
                }
                handlers.graph_set_get_cfg_packed_rsp(&info);
            }
            None => {
                log::warn!(
                    "[sgm::rsp] handle_get_cfg_response: token {:#x} had no response target",
                    packet.token
                );
            }
        }

        router.free_packet(packet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::registry::{CachedClientRequest, ParamRequest};
    use crate::shm::test_support::LocalMapper;
    use crate::wire::pack::pack_param_data;
    use crate::wire::types::ParamData;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingHandlers {
        calls: RefCell<Vec<&'static str>>,
        last_structured: RefCell<Vec<ParamData>>,
        last_packed: RefCell<Vec<u8>>,
    }

    impl ResultHandlers for RecordingHandlers {
        fn graph_open_rsp(&mut self, _info: &RspInfo) {
            self.calls.borrow_mut().push("open");
        }
        fn graph_mgmt_rsp(&mut self, _info: &RspInfo) {
            self.calls.borrow_mut().push("mgmt");
        }
        fn graph_close_rsp(&mut self, _info: &RspInfo) {
            self.calls.borrow_mut().push("close");
        }
        fn graph_set_get_cfg_rsp(&mut self, info: &RspInfo) {
            self.calls.borrow_mut().push("set_get_cfg");
            *self.last_structured.borrow_mut() = info.structured_result.clone();
        }
        fn graph_set_get_cfg_packed_rsp(&mut self, info: &RspInfo) {
            self.calls.borrow_mut().push("set_get_cfg_packed");
            *self.last_packed.borrow_mut() = info.packed_result.clone();
        }
        fn graph_set_persistent_rsp(&mut self, _info: &RspInfo) {
            self.calls.borrow_mut().push("persistent");
        }
        fn graph_set_persistent_packed_rsp(&mut self, _info: &RspInfo) {
            self.calls.borrow_mut().push("persistent_packed");
        }
        fn graph_event_reg_rsp(&mut self, _info: &RspInfo) {
            self.calls.borrow_mut().push("event_reg");
        }
        fn graph_path_delay_rsp(&mut self, _info: &RspInfo) {
            self.calls.borrow_mut().push("path_delay");
        }
    }

    #[derive(Default)]
    struct FakeRouter {
        ended: Vec<(u32,)>,
        sent: Vec<Packet>,
        freed: usize,
    }

    impl PacketRouter for FakeRouter {
        fn register_container(&mut self, _c: u32) -> crate::error::Result<()> {
            Ok(())
        }
        fn deregister_container(&mut self, _c: u32) -> crate::error::Result<()> {
            Ok(())
        }
        fn alloc_packet(
            &mut self,
            src_domain: u32,
            dst_domain: u32,
            src_port: u32,
            dst_port: u32,
            token: u32,
            opcode: u32,
            payload_size: usize,
        ) -> crate::error::Result<Packet> {
            Ok(Packet {
                src_domain,
                dst_domain,
                src_port,
                dst_port,
                token,
                opcode,
                payload: vec![0u8; payload_size],
            })
        }
        fn async_send(&mut self, packet: Packet) -> crate::error::Result<()> {
            self.sent.push(packet);
            Ok(())
        }
        fn end_command(&mut self, _packet: Packet, status: u32) {
            self.ended.push((status,));
        }
        fn free_packet(&mut self, _packet: Packet) {
            self.freed += 1;
        }
    }

    #[derive(Default)]
    struct FakeCache;
    impl CacheOps for FakeCache {
        fn flush(&mut self, _addr: usize, _len: usize) -> crate::error::Result<()> {
            Ok(())
        }
        fn invalidate(&mut self, _addr: usize, _len: usize) -> crate::error::Result<()> {
            Ok(())
        }
    }

    fn ibasic_payload(rsp_opcode: u32, status: u32) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&rsp_opcode.to_ne_bytes());
        v.extend_from_slice(&status.to_ne_bytes());
        v
    }

    #[test]
    fn graph_open_ack_calls_open_handler_and_destroys_handle() {
        let mut registry = CmdRegistry::new(1);
        let token = registry.preprocess(opcode::GRAPH_OPEN, true).unwrap();
        registry.postprocess();
        let mut mapper = LocalMapper::new();
        let mut cache = FakeCache;
        let mut router = FakeRouter::default();
        let mut handlers = RecordingHandlers::default();

        let packet = Packet {
            src_domain: 2,
            dst_domain: 1,
            src_port: APM_MODULE_INSTANCE_ID,
            dst_port: 1,
            token,
            opcode: opcode::GPR_IBASIC_RSP_RESULT,
            payload: ibasic_payload(opcode::GRAPH_OPEN, opcode::STATUS_SUCCESS),
        };
        RspRouter::route(packet, &mut registry, &mut mapper, &mut cache, &mut router, &mut handlers);

        assert_eq!(*handlers.calls.borrow(), vec!["open"]);
        assert!(registry.lookup_by_token(token).is_none());
        assert_eq!(router.freed, 1);
    }

    #[test]
    fn set_get_cfg_ack_picks_packed_handler_by_source_port() {
        let mut registry = CmdRegistry::new(1);
        let token = registry.preprocess(opcode::SET_GET_CFG, true).unwrap();
        registry.postprocess();
        let mut mapper = LocalMapper::new();
        let mut cache = FakeCache;
        let mut router = FakeRouter::default();
        let mut handlers = RecordingHandlers::default();

        let packet = Packet {
            src_domain: 2,
            dst_domain: 1,
            src_port: 0xBEEF, // module-destined, not the APM instance id
            dst_port: 1,
            token,
            opcode: opcode::GPR_IBASIC_RSP_RESULT,
            payload: ibasic_payload(opcode::SET_GET_CFG, opcode::STATUS_SUCCESS),
        };
        RspRouter::route(packet, &mut registry, &mut mapper, &mut cache, &mut router, &mut handlers);
        assert_eq!(*handlers.calls.borrow(), vec!["set_get_cfg_packed"]);
    }

    #[test]
    fn zero_token_event_registration_ack_is_tolerated() {
        let mut registry = CmdRegistry::new(1);
        let mut mapper = LocalMapper::new();
        let mut cache = FakeCache;
        let mut router = FakeRouter::default();
        let mut handlers = RecordingHandlers::default();

        let packet = Packet {
            src_domain: 2,
            dst_domain: 1,
            src_port: 0x10,
            dst_port: 1,
            token: 0,
            opcode: opcode::GPR_IBASIC_RSP_RESULT,
            payload: ibasic_payload(opcode::REGISTER_MODULE_EVENTS, opcode::STATUS_SUCCESS),
        };
        RspRouter::route(packet, &mut registry, &mut mapper, &mut cache, &mut router, &mut handlers);
        assert_eq!(*handlers.calls.borrow(), vec!["event_reg"]);
        assert!(registry.is_in_flight_empty());
    }

    #[test]
    fn real_token_event_registration_ack_destroys_its_handle() {
        let mut registry = CmdRegistry::new(1);
        let token = registry
            .preprocess(opcode::REGISTER_MODULE_EVENTS, true)
            .unwrap();
        registry.postprocess();
        let mut mapper = LocalMapper::new();
        let mut cache = FakeCache;
        let mut router = FakeRouter::default();
        let mut handlers = RecordingHandlers::default();

        let packet = Packet {
            src_domain: 2,
            dst_domain: 1,
            src_port: 0x10,
            dst_port: 1,
            token,
            opcode: opcode::GPR_IBASIC_RSP_RESULT,
            payload: ibasic_payload(opcode::REGISTER_MODULE_EVENTS, opcode::STATUS_SUCCESS),
        };
        RspRouter::route(packet, &mut registry, &mut mapper, &mut cache, &mut router, &mut handlers);
        assert_eq!(*handlers.calls.borrow(), vec!["event_reg"]);
        // A real (non-zero) token went through the normal command pipeline
        // and must be destroyed like any other command, otherwise the
        // driver stays permanently "busy".
        assert!(registry.is_in_flight_empty());
    }

    #[test]
    fn unsupported_response_opcode_ends_command() {
        let mut registry = CmdRegistry::new(1);
        let mut mapper = LocalMapper::new();
        let mut cache = FakeCache;
        let mut router = FakeRouter::default();
        let mut handlers = RecordingHandlers::default();

        let packet = Packet {
            src_domain: 2,
            dst_domain: 1,
            src_port: 1,
            dst_port: 1,
            token: 0,
            opcode: 0xDEAD_BEEF,
            payload: vec![],
        };
        RspRouter::route(packet, &mut registry, &mut mapper, &mut cache, &mut router, &mut handlers);
        assert_eq!(router.ended.len(), 1);
        assert_eq!(router.ended[0].0, opcode::STATUS_UNSUPPORTED);
    }

    #[test]
    fn get_cfg_structured_response_copies_matching_descriptor_bytes() {
        let mut registry = CmdRegistry::new(1);
        let token = registry.preprocess(opcode::SET_GET_CFG, false).unwrap();
        registry.active_mut().unwrap().response_target = Some(ResponseTarget::Structured(vec![
            ParamRequest {
                module_instance_id: 0xA,
                param_id: 1,
                capacity: 64,
            },
        ]));
        registry.postprocess();

        let mut mapper = LocalMapper::new();
        let mut cache = FakeCache;
        let mut router = FakeRouter::default();
        let mut handlers = RecordingHandlers::default();

        let param_bytes = pack_param_data(&[ParamData {
            module_instance_id: 0xA,
            param_id: 1,
            data: vec![9, 9, 9],
        }]);

        let packet = Packet {
            src_domain: 2,
            dst_domain: 1,
            src_port: APM_MODULE_INSTANCE_ID,
            dst_port: 1,
            token,
            opcode: opcode::APM_CMD_RSP_GET_CFG,
            payload: param_bytes,
        };
        RspRouter::route(packet, &mut registry, &mut mapper, &mut cache, &mut router, &mut handlers);
        assert_eq!(*handlers.calls.borrow(), vec!["set_get_cfg"]);
        assert_eq!(handlers.last_structured.borrow()[0].data, vec![9, 9, 9]);
    }

    #[test]
    fn get_cfg_packed_response_forwards_reply_to_original_client() {
        let mut registry = CmdRegistry::new(1);
        let token = registry.preprocess(opcode::SET_GET_CFG, true).unwrap();
        registry.active_mut().unwrap().response_target = Some(ResponseTarget::Packed {
            capacity: 8,
            client: CachedClientRequest {
                src_domain: 5,
                dst_domain: 1,
                src_port: 0x77,
                dst_port: 0x99,
                token: 0xCAFE,
            },
        });
        registry.postprocess();

        let mut mapper = LocalMapper::new();
        let mut cache = FakeCache;
        let mut router = FakeRouter::default();
        let mut handlers = RecordingHandlers::default();

        let packet = Packet {
            src_domain: 2,
            dst_domain: 1,
            src_port: 0xBEEF,
            dst_port: 1,
            token,
            opcode: opcode::APM_CMD_RSP_GET_CFG,
            payload: vec![1, 2, 3, 4],
        };
        RspRouter::route(packet, &mut registry, &mut mapper, &mut cache, &mut router, &mut handlers);
        assert_eq!(*handlers.calls.borrow(), vec!["set_get_cfg_packed"]);
        assert_eq!(router.sent.len(), 1);
        assert_eq!(router.sent[0].dst_domain, 5);
        assert_eq!(router.sent[0].token, 0xCAFE);
    }

    #[derive(Default)]
    struct FakeQueue {
        packets: std::collections::VecDeque<Packet>,
    }

    impl crate::framework::Queue for FakeQueue {
        fn pop_front(&mut self) -> Option<Packet> {
            self.packets.pop_front()
        }
    }

    #[test]
    fn drain_routes_every_queued_packet_until_empty() {
        let mut registry = CmdRegistry::new(1);
        let open_token = registry.preprocess(opcode::GRAPH_OPEN, true).unwrap();
        registry.postprocess();
        let close_token = registry.preprocess(opcode::GRAPH_CLOSE, true).unwrap();
        registry.postprocess();

        let mut queue = FakeQueue::default();
        queue.packets.push_back(Packet {
            src_domain: 2,
            dst_domain: 1,
            src_port: APM_MODULE_INSTANCE_ID,
            dst_port: 1,
            token: open_token,
            opcode: opcode::GPR_IBASIC_RSP_RESULT,
            payload: ibasic_payload(opcode::GRAPH_OPEN, opcode::STATUS_SUCCESS),
        });
        queue.packets.push_back(Packet {
            src_domain: 2,
            dst_domain: 1,
            src_port: APM_MODULE_INSTANCE_ID,
            dst_port: 1,
            token: close_token,
            opcode: opcode::GPR_IBASIC_RSP_RESULT,
            payload: ibasic_payload(opcode::GRAPH_CLOSE, opcode::STATUS_SUCCESS),
        });

        let mut mapper = LocalMapper::new();
        let mut cache = FakeCache;
        let mut router = FakeRouter::default();
        let mut handlers = RecordingHandlers::default();

        RspRouter::drain(&mut queue, &mut registry, &mut mapper, &mut cache, &mut router, &mut handlers);

        assert!(queue.packets.is_empty());
        assert_eq!(*handlers.calls.borrow(), vec!["open", "close"]);
        assert!(registry.is_in_flight_empty());
    }
}

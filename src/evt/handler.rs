// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Event-queue dispatch (component H).
//!
//! `APM_EVENT_MODULE_TO_CLIENT` carries an `apm_module_event_t` header —
//! `{ event_id: u32, event_payload_size: u32 }` — followed by the nested
//! event's own payload. A non-zero token means a registered module event,
//! forwarded to the client as-is. A zero token means an internal
//! offload-config event, where `event_id` is inspected to decide what to
//! do with the nested payload; the only one recognized today is
//! `OFFLOAD_EVENT_ID_GET_CONTAINER_DELAY`, whose nested payload is
//! `{ prev_delay_us: u32, new_delay_us: u32, path_id_satellite: u32 }`.

use crate::framework::{ContainerDelayUpdater, DataPathEvents, Packet, PacketRouter};
use crate::pathdelay::PathDelayRegistry;
use crate::util::NodeList;
use crate::wire::opcode;

/// One live module-to-client event forwarding registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRegistration {
    pub module_instance_id: u32,
    pub client_port_id: u32,
    pub client_domain_id: u32,
    pub client_token: u32,
    pub driver_assigned_token: u32,
}

/// Tracks live event registrations keyed by the driver-assigned token
/// handed back to the satellite at register time.
#[derive(Default)]
pub struct EventRegistry {
    registrations: NodeList<EventRegistration>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        module_instance_id: u32,
        client_port_id: u32,
        client_domain_id: u32,
        client_token: u32,
        driver_assigned_token: u32,
    ) {
        self.registrations.add_tail(EventRegistration {
            module_instance_id,
            client_port_id,
            client_domain_id,
            client_token,
            driver_assigned_token,
        });
    }

    pub fn deregister(&mut self, driver_assigned_token: u32) -> Option<EventRegistration> {
        self.registrations
            .take(|r| r.driver_assigned_token == driver_assigned_token)
    }

    pub fn find_by_token(&self, driver_assigned_token: u32) -> Option<&EventRegistration> {
        self.registrations
            .find(|r| r.driver_assigned_token == driver_assigned_token)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EventRegistration> {
        self.registrations.iter()
    }

    /// Drains every live registration, for driver teardown.
    pub fn drain_all(&mut self) -> Vec<EventRegistration> {
        let mut out = Vec::with_capacity(self.registrations.len());
        while let Some(reg) = self.registrations.pop_front() {
            out.push(reg);
        }
        out
    }
}

/// Splits the leading `apm_module_event_t` header off a module-to-client
/// payload, returning `(event_id, event_payload_size, rest)`.
fn decode_module_event_header(payload: &[u8]) -> Option<(u32, u32, &[u8])> {
    if payload.len() < 8 {
        return None;
    }
    let event_id = u32::from_ne_bytes(payload[0..4].try_into().unwrap());
    let event_payload_size = u32::from_ne_bytes(payload[4..8].try_into().unwrap());
    Some((event_id, event_payload_size, &payload[8..]))
}

fn decode_container_delay(payload: &[u8]) -> Option<(u32, u32, u32)> {
    if payload.len() < 12 {
        return None;
    }
    let prev = u32::from_ne_bytes(payload[0..4].try_into().unwrap());
    let new = u32::from_ne_bytes(payload[4..8].try_into().unwrap());
    let satellite_path_id = u32::from_ne_bytes(payload[8..12].try_into().unwrap());
    Some((prev, new, satellite_path_id))
}

/// Stateless entry point for the event-queue handler, mirroring
/// [`crate::rsp::RspRouter`]'s shape.
pub struct EventDispatch;

impl EventDispatch {
    /// Pops every packet currently queued on `queue` and routes each in
    /// turn, mirroring
    /// [`crate::rsp::RspRouter::drain`].
    #[allow(clippy::too_many_arguments)]
    pub fn drain(
        queue: &mut dyn crate::framework::Queue,
        events: &mut EventRegistry,
        path_delay: &mut PathDelayRegistry,
        router: &mut dyn PacketRouter,
        data_path: &mut dyn DataPathEvents,
        delay_updater: &mut dyn ContainerDelayUpdater,
    ) {
        while let Some(packet) = queue.pop_front() {
            Self::route(packet, events, path_delay, router, data_path, delay_updater);
        }
    }

    /// Routes one packet popped from the event queue.
    #[allow(clippy::too_many_arguments)]
    pub fn route(
        packet: Packet,
        events: &mut EventRegistry,
        path_delay: &mut PathDelayRegistry,
        router: &mut dyn PacketRouter,
        data_path: &mut dyn DataPathEvents,
        delay_updater: &mut dyn ContainerDelayUpdater,
    ) {
        match packet.opcode {
            o if o == opcode::GPR_IBASIC_RSP_RESULT => {
                router.free_packet(packet);
            }
            o if o == opcode::APM_EVENT_MODULE_TO_CLIENT => {
                Self::handle_module_to_client(packet, events, path_delay, router, delay_updater);
            }
            o if o == opcode::OFFLOAD_EVENT_ID_RD_SH_MEM_EP_MEDIA_FORMAT => {
                data_path.media_format(packet.src_port, &packet.payload);
                router.free_packet(packet);
            }
            o if o == opcode::OFFLOAD_EVENT_ID_SH_MEM_EP_OPERATING_FRAME_SIZE => {
                data_path.operating_frame_size(&packet.payload);
                router.free_packet(packet);
            }
            o if o == opcode::EVENT_ID_MODULE_CMN_METADATA_CLONE_MD => {
                data_path.metadata_clone(&packet.payload);
                router.free_packet(packet);
            }
            o if o == opcode::EVENT_ID_MODULE_CMN_METADATA_TRACKING_EVENT => {
                data_path.metadata_tracking(&packet.payload);
                router.free_packet(packet);
            }
            _ => {
                log::warn!(
                    "[sgm::evt] route: unsupported event opcode {:#010x}",
                    packet.opcode
                );
                router.end_command(packet, opcode::STATUS_UNSUPPORTED);
            }
        }
    }

    fn handle_module_to_client(
        packet: Packet,
        events: &EventRegistry,
        path_delay: &mut PathDelayRegistry,
        router: &mut dyn PacketRouter,
        delay_updater: &mut dyn ContainerDelayUpdater,
    ) {
        if packet.token == 0 {
            Self::handle_offload_cfg_event(packet, path_delay, delay_updater, router);
            return;
        }
        let Some(reg) = events.find_by_token(packet.token) else {
            log::warn!(
                "[sgm::evt] handle_module_to_client: no registration for token {:#x}",
                packet.token
            );
            router.free_packet(packet);
            return;
        };
        if reg.module_instance_id != packet.src_port {
            log::warn!(
                "[sgm::evt] handle_module_to_client: token {:#x} registration module {:#x} != src_port {:#x}",
                packet.token, reg.module_instance_id, packet.src_port
            );
            router.free_packet(packet);
            return;
        }
        let forward = Packet {
            src_domain: packet.dst_domain,
            dst_domain: reg.client_domain_id,
            src_port: packet.src_port,
            dst_port: reg.client_port_id,
            token: reg.client_token,
            opcode: opcode::APM_EVENT_MODULE_TO_CLIENT,
            payload: packet.payload.clone(),
        };
        if let Err(e) = router.async_send(forward) {
            log::warn!("[sgm::evt] handle_module_to_client: forwarding failed: {e}");
        }
        router.free_packet(packet);
    }

    /// Handles a zero-token `APM_EVENT_MODULE_TO_CLIENT` packet: an
    /// internal offload-config event identified by the nested
    /// `apm_module_event_t::event_id`, not by the outer GPR opcode.
    fn handle_offload_cfg_event(
        packet: Packet,
        path_delay: &mut PathDelayRegistry,
        delay_updater: &mut dyn ContainerDelayUpdater,
        router: &mut dyn PacketRouter,
    ) {
        let Some((event_id, _event_payload_size, nested)) =
            decode_module_event_header(&packet.payload)
        else {
            log::warn!("[sgm::evt] handle_offload_cfg_event: payload too short for apm_module_event_t header");
            router.free_packet(packet);
            return;
        };
        match event_id {
            o if o == opcode::OFFLOAD_EVENT_ID_GET_CONTAINER_DELAY => {
                Self::handle_container_delay(nested, path_delay, delay_updater);
            }
            _ => log::debug!(
                "[sgm::evt] handle_offload_cfg_event: unrecognized nested event id {event_id:#010x}"
            ),
        }
        router.free_packet(packet);
    }

    fn handle_container_delay(
        nested_payload: &[u8],
        path_delay: &PathDelayRegistry,
        delay_updater: &mut dyn ContainerDelayUpdater,
    ) {
        let Some((prev, new, satellite_path_id)) = decode_container_delay(nested_payload) else {
            log::warn!("[sgm::evt] handle_container_delay: payload too short");
            return;
        };
        match path_delay.lookup_master_by_satellite(satellite_path_id) {
            Some(master_path_id) => delay_updater.update_path_delay(master_path_id, prev, new),
            None => log::debug!(
                "[sgm::evt] handle_container_delay: no master path for satellite path {:#x}, ignoring",
                satellite_path_id
            ),
        }
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Path-delay registry (component I).
//!
//! The synthesized register/deregister event commands bypass the normal
//! command-handle pipeline; they carry `token = 0`
//! and the response router tolerates that specially.

use crate::framework::PacketRouter;
use crate::util::NodeList;
use crate::wire::opcode;
use crate::wire::types::APM_MODULE_INSTANCE_ID;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathDelayMapping {
    pub master_path_id: u32,
    pub satellite_path_id: u32,
}

/// A remote container's subscription to the container-delay event,
/// refcounted by the set of master path ids that currently need it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDelaySubscription {
    pub satellite_container_id: u32,
    pub is_registered: bool,
    pub refcount: Vec<u32>,
}

fn pack_register_events_payload(event_id: u32, is_register: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    buf.extend_from_slice(&APM_MODULE_INSTANCE_ID.to_ne_bytes());
    buf.extend_from_slice(&event_id.to_ne_bytes());
    buf.extend_from_slice(&(is_register as u32).to_ne_bytes());
    buf.extend_from_slice(&0u32.to_ne_bytes()); // event-config payload size, unused for container-delay
    buf
}

#[derive(Default)]
pub struct PathDelayRegistry {
    path_map: NodeList<PathDelayMapping>,
    subscriptions: NodeList<ContainerDelaySubscription>,
}

impl PathDelayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures a subscription exists for `sat_cont_id` and that it
    /// refcounts `master_path_id`.
    pub fn add_container_for_path(&mut self, sat_cont_id: u32, master_path_id: u32) {
        if self
            .subscriptions
            .find(|s| s.satellite_container_id == sat_cont_id)
            .is_none()
        {
            self.subscriptions.add_tail(ContainerDelaySubscription {
                satellite_container_id: sat_cont_id,
                is_registered: false,
                refcount: Vec::new(),
            });
        }
        let sub = self
            .subscriptions
            .find_mut(|s| s.satellite_container_id == sat_cont_id)
            .expect("just inserted above");
        if !sub.refcount.contains(&master_path_id) {
            sub.refcount.push(master_path_id);
        }
    }

    pub fn update_path_map(&mut self, master_id: u32, satellite_id: u32, add: bool) {
        if add {
            self.path_map.add_tail(PathDelayMapping {
                master_path_id: master_id,
                satellite_path_id: satellite_id,
            });
        } else {
            self.path_map.find_delete(|m| m.master_path_id == master_id);
        }
    }

    pub fn lookup_master_by_satellite(&self, satellite_id: u32) -> Option<u32> {
        self.path_map
            .find(|m| m.satellite_path_id == satellite_id)
            .map(|m| m.master_path_id)
    }

    /// `register(true)`: synthesizes a register-event command for every
    /// subscription not yet registered. `register(false)`: synthesizes a
    /// deregister-event command for every registered subscription whose
    /// refcount has dropped to zero.
    pub fn register(&mut self, enable: bool, router: &mut dyn PacketRouter, src_domain: u32) {
        let (target_opcode, event_action) = if enable {
            (opcode::REGISTER_MODULE_EVENTS, true)
        } else {
            (opcode::DEREGISTER_MODULE_EVENTS, false)
        };
        for sub in self.subscriptions.iter_mut() {
            let eligible = if enable {
                !sub.is_registered
            } else {
                sub.is_registered && sub.refcount.is_empty()
            };
            if !eligible {
                continue;
            }
            let payload = pack_register_events_payload(
                opcode::OFFLOAD_EVENT_ID_GET_CONTAINER_DELAY,
                event_action,
            );
            let status = router.alloc_and_send(
                src_domain,
                sub.satellite_container_id,
                APM_MODULE_INSTANCE_ID,
                APM_MODULE_INSTANCE_ID,
                0,
                target_opcode,
                payload,
            );
            match status {
                Ok(()) => {
                    sub.is_registered = enable;
                    log::debug!(
                        "[sgm::pathdelay] register({enable}): container {:#x} now registered={}",
                        sub.satellite_container_id,
                        sub.is_registered
                    );
                }
                Err(e) => {
                    log::warn!(
                        "[sgm::pathdelay] register({enable}): send failed for container {:#x}: {e}",
                        sub.satellite_container_id
                    );
                }
            }
        }
    }

    /// Removes `master_id` from `path_map` and from every subscription's
    /// refcount; drops subscriptions that become both deregistered and
    /// empty.
    pub fn destroy_path(&mut self, master_id: u32, router: &mut dyn PacketRouter, src_domain: u32) {
        self.path_map.find_delete(|m| m.master_path_id == master_id);
        for sub in self.subscriptions.iter_mut() {
            sub.refcount.retain(|&id| id != master_id);
        }
        self.register(false, router, src_domain);
        self.subscriptions
            .retain(|s| !(s.refcount.is_empty() && !s.is_registered));
    }

    /// Clears all subscriptions, optionally deregistering the remaining
    /// ones first.
    pub fn destroy_all(&mut self, deregister_remaining: bool, router: &mut dyn PacketRouter, src_domain: u32) {
        for sub in self.subscriptions.iter_mut() {
            sub.refcount.clear();
        }
        if deregister_remaining {
            self.register(false, router, src_domain);
        }
        self.subscriptions.retain(|_| false);
        self.path_map.retain(|_| false);
    }

    pub fn subscription_for(&self, sat_cont_id: u32) -> Option<&ContainerDelaySubscription> {
        self.subscriptions
            .find(|s| s.satellite_container_id == sat_cont_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::framework::Packet;

    #[derive(Default)]
    struct FakeRouter {
        sent: Vec<Packet>,
    }

    impl PacketRouter for FakeRouter {
        fn register_container(&mut self, _c: u32) -> Result<()> {
            Ok(())
        }
        fn deregister_container(&mut self, _c: u32) -> Result<()> {
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
        ) -> Result<Packet> {
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
        fn async_send(&mut self, packet: Packet) -> Result<()> {
            self.sent.push(packet);
            Ok(())
        }
        fn end_command(&mut self, _packet: Packet, _status: u32) {}
        fn free_packet(&mut self, _packet: Packet) {}
    }

    #[test]
    fn first_subscription_triggers_register_event_command() {
        let mut registry = PathDelayRegistry::new();
        registry.add_container_for_path(0x50, 0x10);
        let mut router = FakeRouter::default();
        registry.register(true, &mut router, 1);

        assert_eq!(router.sent.len(), 1);
        assert_eq!(router.sent[0].token, 0);
        assert_eq!(router.sent[0].opcode, opcode::REGISTER_MODULE_EVENTS);
        assert!(registry.subscription_for(0x50).unwrap().is_registered);
    }

    #[test]
    fn second_path_on_same_container_does_not_re_register() {
        let mut registry = PathDelayRegistry::new();
        registry.add_container_for_path(0x50, 0x10);
        let mut router = FakeRouter::default();
        registry.register(true, &mut router, 1);
        registry.add_container_for_path(0x50, 0x11);
        registry.register(true, &mut router, 1);
        assert_eq!(router.sent.len(), 1);
    }

    #[test]
    fn destroy_path_deregisters_once_refcount_drains() {
        let mut registry = PathDelayRegistry::new();
        registry.add_container_for_path(0x50, 0x10);
        let mut router = FakeRouter::default();
        registry.register(true, &mut router, 1);
        registry.update_path_map(0x10, 0x33, true);

        registry.destroy_path(0x10, &mut router, 1);

        assert_eq!(router.sent.len(), 2);
        assert_eq!(router.sent[1].opcode, opcode::DEREGISTER_MODULE_EVENTS);
        assert!(registry.subscription_for(0x50).is_none());
        assert!(registry.lookup_master_by_satellite(0x33).is_none());
    }

    #[test]
    fn lookup_master_by_satellite_round_trips() {
        let mut registry = PathDelayRegistry::new();
        registry.update_path_map(0x10, 0x33, true);
        assert_eq!(registry.lookup_master_by_satellite(0x33), Some(0x10));
        registry.update_path_map(0x10, 0x33, false);
        assert_eq!(registry.lookup_master_by_satellite(0x33), None);
    }
}

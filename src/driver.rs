// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Driver init/deinit and the thirteen public command handlers
//! (component K).

use crate::cmd::dispatch::{dispatch, Destination};
use crate::cmd::registry::{CachedClientRequest, CmdRegistry, ParamRequest, ResponseTarget};
use crate::config::SgmConfig;
use crate::error::{Result, SgmError};
use crate::evt::EventRegistry;
use crate::framework::{CacheOps, PacketRouter, SatelliteMemoryMapper};
use crate::pathdelay::PathDelayRegistry;
use crate::split::{split_open, OpenPayload};
use crate::wire::opcode;
use crate::wire::pack;
use crate::wire::types::{
    ContainerCfg, CtrlLinkCfg, ModuleConn, ModuleListEntry, ParamData, PathDelayDefn,
    APM_MODULE_INSTANCE_ID, APM_PROC_DOMAIN_ID_INVALID,
};

/// First token value handed out by the counter. Mirrored by [`SgmConfig::dynamic_token_start`];
/// this constant documents the recovered original value.
pub const DYNAMIC_TOKEN_START: u32 = 1;

/// Bit this driver's response queue is registered under in the
/// framework's scheduling bitmask.
/// Not interpreted by this crate beyond being passed through to the
/// queue-registration call.
pub const SGM_RSPQ_BIT_MASK: u32 = 0x1000_0000;
pub const SGM_EVENTQ_BIT_MASK: u32 = 0x2000_0000;

/// Container/process-domain identity. `satellite_domain_id`
/// stays the sentinel until the first GRAPH_OPEN discovers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SgmIds {
    pub container_id: u32,
    pub log_id: u32,
    pub master_domain_id: u32,
    pub satellite_domain_id: u32,
}

impl SgmIds {
    pub fn new(container_id: u32, log_id: u32, master_domain_id: u32) -> Self {
        Self {
            container_id,
            log_id,
            master_domain_id,
            satellite_domain_id: APM_PROC_DOMAIN_ID_INVALID,
        }
    }

    pub fn satellite_domain_known(&self) -> bool {
        self.satellite_domain_id != APM_PROC_DOMAIN_ID_INVALID
    }
}

/// The three module lists a driver instance partitions its graph into:
/// the ones staying in this container, the ones forwarded to the
/// satellite, and the ones with an event-registration entry.
#[derive(Debug, Clone, Default)]
pub struct GraphInfo {
    pub olc: Vec<ModuleListEntry>,
    pub satellite: Vec<ModuleListEntry>,
    pub event_reg: Vec<ModuleListEntry>,
}

/// Accumulates deinit-path errors instead of short-circuiting on the
/// first one.
#[derive(Debug, Default)]
pub struct DeinitReport {
    pub errors: Vec<SgmError>,
}

impl DeinitReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Root owner, one instance per offload container.
pub struct SgmDriver {
    pub ids: SgmIds,
    pub config: SgmConfig,
    pub registry: CmdRegistry,
    pub events: EventRegistry,
    pub path_delay: PathDelayRegistry,
    pub graph: GraphInfo,
}

impl SgmDriver {
    /// Registers the container with the packet router and brings up an
    /// otherwise-empty driver. The two incoming queues
    /// (event, response) are an ambient-framework concern this crate
    /// doesn't own directly; the embedder wires them against
    /// [`crate::rsp::RspRouter::route`] / [`crate::evt::EventDispatch::route`].
    pub fn init(
        container_id: u32,
        log_id: u32,
        master_domain_id: u32,
        config: SgmConfig,
        router: &mut dyn PacketRouter,
    ) -> Result<Self> {
        router.register_container(container_id)?;
        log::info!("[sgm] init: container_id={container_id:#x} log_id={log_id:#x}");
        Ok(Self {
            ids: SgmIds::new(container_id, log_id, master_domain_id),
            registry: CmdRegistry::new(config.dynamic_token_start),
            config,
            events: EventRegistry::new(),
            path_delay: PathDelayRegistry::new(),
            graph: GraphInfo::default(),
        })
    }

    /// Tears the driver down: deregisters remaining container-delay
    /// subscriptions, deregisters the container with the packet router.
    /// Errors are accumulated rather than aborting the sequence.
    pub fn deinit(&mut self, router: &mut dyn PacketRouter) -> DeinitReport {
        let mut report = DeinitReport::default();
        let drained = self.events.drain_all();
        if !drained.is_empty() {
            log::debug!(
                "[sgm::evt] deinit: dropping {} live event registration(s)",
                drained.len()
            );
        }
        self.path_delay.destroy_all(true, router, self.ids.master_domain_id);
        if let Err(e) = router.deregister_container(self.ids.container_id) {
            log::error!("[sgm] deinit: deregister_container failed: {e}");
            report.errors.push(e);
        }
        log::info!(
            "[sgm] deinit: container_id={:#x} clean={}",
            self.ids.container_id,
            report.is_clean()
        );
        report
    }

    fn graph_mgmt_dest(&self) -> Destination {
        Destination::default_dst(
            self.ids.master_domain_id,
            self.ids.satellite_domain_id,
            self.ids.container_id,
        )
    }

    fn dispatch_payload(
        &mut self,
        router: &mut dyn PacketRouter,
        mapper: &mut dyn SatelliteMemoryMapper,
        cache: &mut dyn CacheOps,
        dest: Destination,
        payload: Vec<u8>,
    ) -> Result<()> {
        dispatch(
            &mut self.registry,
            router,
            mapper,
            cache,
            &self.config,
            dest,
            self.ids.satellite_domain_id,
            payload,
        )
    }

    /// `handle_open`: splits the combined payload,
    /// learns the satellite domain id on first open, and dispatches the
    /// satellite-bound image. The caller is responsible for acting on
    /// `SplitResult::local_image`/`ipc_read`/`ipc_write` in the rest of
    /// the container (out of this crate's scope).
    pub fn handle_open(
        &mut self,
        payload: OpenPayload,
        router: &mut dyn PacketRouter,
        mapper: &mut dyn SatelliteMemoryMapper,
        cache: &mut dyn CacheOps,
    ) -> Result<crate::split::SplitResult> {
        let split = split_open(&payload, self.ids.container_id)?;
        if let Some(domain) = split.satellite_domain_id {
            if self.ids.satellite_domain_known() && self.ids.satellite_domain_id != domain {
                return Err(SgmError::BadParam(
                    "satellite domain id changed across GRAPH_OPEN calls",
                ));
            }
            self.ids.satellite_domain_id = domain;
        }
        self.graph.satellite = split.satellite_image.modules.clone();
        self.graph.olc = split.local_image.modules.clone();

        self.registry.preprocess(opcode::GRAPH_OPEN, true)?;
        let wire = pack_open_image(&split.satellite_image);
        let dest = self.graph_mgmt_dest();
        self.dispatch_payload(router, mapper, cache, dest, wire)?;
        Ok(split)
    }

    fn handle_graph_mgmt(
        &mut self,
        op: u32,
        sub_graph_ids: &[u32],
        router: &mut dyn PacketRouter,
        mapper: &mut dyn SatelliteMemoryMapper,
        cache: &mut dyn CacheOps,
    ) -> Result<()> {
        self.registry.preprocess(op, true)?;
        let wire = pack::pack_sub_graph_list(sub_graph_ids);
        let dest = self.graph_mgmt_dest();
        self.dispatch_payload(router, mapper, cache, dest, wire)
    }

    pub fn handle_prepare(
        &mut self,
        sub_graph_ids: &[u32],
        router: &mut dyn PacketRouter,
        mapper: &mut dyn SatelliteMemoryMapper,
        cache: &mut dyn CacheOps,
    ) -> Result<()> {
        self.handle_graph_mgmt(opcode::GRAPH_PREPARE, sub_graph_ids, router, mapper, cache)
    }

    pub fn handle_start(
        &mut self,
        sub_graph_ids: &[u32],
        router: &mut dyn PacketRouter,
        mapper: &mut dyn SatelliteMemoryMapper,
        cache: &mut dyn CacheOps,
    ) -> Result<()> {
        self.handle_graph_mgmt(opcode::GRAPH_START, sub_graph_ids, router, mapper, cache)
    }

    pub fn handle_suspend(
        &mut self,
        sub_graph_ids: &[u32],
        router: &mut dyn PacketRouter,
        mapper: &mut dyn SatelliteMemoryMapper,
        cache: &mut dyn CacheOps,
    ) -> Result<()> {
        self.handle_graph_mgmt(opcode::GRAPH_SUSPEND, sub_graph_ids, router, mapper, cache)
    }

    pub fn handle_stop(
        &mut self,
        sub_graph_ids: &[u32],
        router: &mut dyn PacketRouter,
        mapper: &mut dyn SatelliteMemoryMapper,
        cache: &mut dyn CacheOps,
    ) -> Result<()> {
        self.handle_graph_mgmt(opcode::GRAPH_STOP, sub_graph_ids, router, mapper, cache)
    }

    pub fn handle_flush(
        &mut self,
        sub_graph_ids: &[u32],
        router: &mut dyn PacketRouter,
        mapper: &mut dyn SatelliteMemoryMapper,
        cache: &mut dyn CacheOps,
    ) -> Result<()> {
        self.handle_graph_mgmt(opcode::GRAPH_FLUSH, sub_graph_ids, router, mapper, cache)
    }

    /// `handle_close` is exempted from the busy-check by `CmdRegistry::preprocess` itself; additionally
    /// appends the connection and control-link sections to the payload.
    pub fn handle_close(
        &mut self,
        sub_graph_ids: &[u32],
        conns: &[ModuleConn],
        links: &[CtrlLinkCfg],
        router: &mut dyn PacketRouter,
        mapper: &mut dyn SatelliteMemoryMapper,
        cache: &mut dyn CacheOps,
    ) -> Result<()> {
        self.registry.preprocess(opcode::GRAPH_CLOSE, true)?;
        let wire = pack::pack_graph_close(sub_graph_ids, conns, links);
        let dest = self.graph_mgmt_dest();
        self.dispatch_payload(router, mapper, cache, dest, wire)
    }

    /// `handle_set_get_cfg`: APM-destined, structured response (caller
    /// supplies one capacity per descriptor).
    pub fn handle_set_get_cfg(
        &mut self,
        params: &[ParamData],
        requests: Vec<ParamRequest>,
        router: &mut dyn PacketRouter,
        mapper: &mut dyn SatelliteMemoryMapper,
        cache: &mut dyn CacheOps,
    ) -> Result<()> {
        self.registry.preprocess(opcode::SET_GET_CFG, true)?;
        if let Some(handle) = self.registry.active_mut() {
            handle.is_apm_destination = true;
            handle.response_target = Some(ResponseTarget::Structured(requests));
        }
        let wire = pack::pack_param_data(params);
        let dest = Destination::to_port(
            self.ids.master_domain_id,
            self.ids.satellite_domain_id,
            self.ids.container_id,
            APM_MODULE_INSTANCE_ID,
        );
        self.dispatch_payload(router, mapper, cache, dest, wire)
    }

    /// `handle_set_get_cfg_packed`: module-destined, single flat buffer
    /// forwarded back to the original client.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_set_get_cfg_packed(
        &mut self,
        module_instance_id: u32,
        params: &[ParamData],
        capacity: usize,
        client: CachedClientRequest,
        router: &mut dyn PacketRouter,
        mapper: &mut dyn SatelliteMemoryMapper,
        cache: &mut dyn CacheOps,
    ) -> Result<()> {
        self.registry.preprocess(opcode::SET_GET_CFG, true)?;
        if let Some(handle) = self.registry.active_mut() {
            handle.is_apm_destination = false;
            handle.response_target = Some(ResponseTarget::Packed { capacity, client });
        }
        let wire = pack::pack_param_data(params);
        let dest = Destination::to_port(
            self.ids.master_domain_id,
            self.ids.satellite_domain_id,
            self.ids.container_id,
            module_instance_id,
        );
        self.dispatch_payload(router, mapper, cache, dest, wire)
    }

    pub fn handle_persistent_cfg(
        &mut self,
        params: &[ParamData],
        requests: Vec<ParamRequest>,
        router: &mut dyn PacketRouter,
        mapper: &mut dyn SatelliteMemoryMapper,
        cache: &mut dyn CacheOps,
    ) -> Result<()> {
        self.registry.preprocess(opcode::PERSISTENT_CFG, true)?;
        if let Some(handle) = self.registry.active_mut() {
            handle.is_apm_destination = true;
            handle.response_target = Some(ResponseTarget::Structured(requests));
        }
        let wire = pack::pack_param_data(params);
        let dest = Destination::to_port(
            self.ids.master_domain_id,
            self.ids.satellite_domain_id,
            self.ids.container_id,
            APM_MODULE_INSTANCE_ID,
        );
        self.dispatch_payload(router, mapper, cache, dest, wire)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn handle_persistent_packed(
        &mut self,
        module_instance_id: u32,
        params: &[ParamData],
        capacity: usize,
        client: CachedClientRequest,
        router: &mut dyn PacketRouter,
        mapper: &mut dyn SatelliteMemoryMapper,
        cache: &mut dyn CacheOps,
    ) -> Result<()> {
        self.registry.preprocess(opcode::PERSISTENT_CFG, true)?;
        if let Some(handle) = self.registry.active_mut() {
            handle.is_apm_destination = false;
            handle.response_target = Some(ResponseTarget::Packed { capacity, client });
        }
        let wire = pack::pack_param_data(params);
        let dest = Destination::to_port(
            self.ids.master_domain_id,
            self.ids.satellite_domain_id,
            self.ids.container_id,
            module_instance_id,
        );
        self.dispatch_payload(router, mapper, cache, dest, wire)
    }

    /// `handle_register_module_events`: registers a new forwarding
    /// entry and issues the wire command with a fresh driver-assigned
    /// token used both as the correlation token on the wire and as the
    /// [`crate::evt::EventRegistration`] key.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_register_module_events(
        &mut self,
        module_instance_id: u32,
        client_port_id: u32,
        client_domain_id: u32,
        client_token: u32,
        router: &mut dyn PacketRouter,
        mapper: &mut dyn SatelliteMemoryMapper,
        cache: &mut dyn CacheOps,
    ) -> Result<u32> {
        let driver_assigned_token = self.registry.preprocess(opcode::REGISTER_MODULE_EVENTS, true)?;
        self.events.register(
            module_instance_id,
            client_port_id,
            client_domain_id,
            client_token,
            driver_assigned_token,
        );
        let wire = pack::pack_param_data(&[ParamData {
            module_instance_id,
            param_id: 0,
            data: Vec::new(),
        }]);
        let dest = Destination::to_port(
            self.ids.master_domain_id,
            self.ids.satellite_domain_id,
            self.ids.container_id,
            module_instance_id,
        );
        self.dispatch_payload(router, mapper, cache, dest, wire)?;
        Ok(driver_assigned_token)
    }

    /// `handle_deregister_module_events`: the matching teardown for
    /// [`Self::handle_register_module_events`]. Removes
    /// the registration keyed by `driver_assigned_token` up front, then
    /// issues the wire command with that same token regardless of whether
    /// one was still live, mirroring `handle_register_module_events`'s
    /// token reuse.
    pub fn handle_deregister_module_events(
        &mut self,
        module_instance_id: u32,
        driver_assigned_token: u32,
        router: &mut dyn PacketRouter,
        mapper: &mut dyn SatelliteMemoryMapper,
        cache: &mut dyn CacheOps,
    ) -> Result<()> {
        if self.events.deregister(driver_assigned_token).is_none() {
            log::debug!(
                "[sgm::evt] deregister_module_events: token={:#x} had no live registration",
                driver_assigned_token
            );
        }
        self.registry
            .preprocess(opcode::DEREGISTER_MODULE_EVENTS, true)?;
        let wire = pack::pack_param_data(&[ParamData {
            module_instance_id,
            param_id: 0,
            data: Vec::new(),
        }]);
        let dest = Destination::to_port(
            self.ids.master_domain_id,
            self.ids.satellite_domain_id,
            self.ids.container_id,
            module_instance_id,
        );
        self.dispatch_payload(router, mapper, cache, dest, wire)
    }

    /// `handle_set_get_path_delay`: issues the PID_OFFLOAD_GRAPH_PATH_DELAY
    /// query for `path` and subscribes `satellite_container_id` to the
    /// container-delay event (first subscriber triggers the register
    /// command).
    pub fn handle_set_get_path_delay(
        &mut self,
        path: &PathDelayDefn,
        satellite_container_id: u32,
        router: &mut dyn PacketRouter,
        mapper: &mut dyn SatelliteMemoryMapper,
        cache: &mut dyn CacheOps,
    ) -> Result<()> {
        self.registry.preprocess(opcode::SET_GET_PATH_DELAY, true)?;
        self.path_delay
            .add_container_for_path(satellite_container_id, path.path_id);
        let wire = pack::pack_path_delay_get(path);
        let dest = self.graph_mgmt_dest();
        self.dispatch_payload(router, mapper, cache, dest, wire)?;
        self.path_delay
            .register(true, router, self.ids.master_domain_id);
        Ok(())
    }
}

/// Concatenates whichever sections of a split `OpenImage` are non-empty
/// into one wire buffer, in the order the original APM schema expects.
/// Sections with zero entries are skipped entirely to avoid sending
/// empty top-level params the satellite APM would reject.
fn pack_open_image(image: &crate::split::OpenImage) -> Vec<u8> {
    let mut buf = Vec::new();
    if !image.sub_graphs.is_empty() {
        buf.extend_from_slice(&pack::pack_sub_graph_config(&image.sub_graphs));
    }
    if !image.satellite_container_cfgs.is_empty() {
        buf.extend_from_slice(&pack::pack_container_config(&image.satellite_container_cfgs));
    }
    if !image.modules.is_empty() {
        buf.extend_from_slice(&pack::pack_modules_list(&image.modules));
    }
    if !image.module_props.is_empty() {
        buf.extend_from_slice(&pack::pack_module_prop(&image.module_props));
    }
    if !image.connections.is_empty() {
        buf.extend_from_slice(&pack::pack_module_conn(&image.connections));
    }
    if !image.imcl_peers.is_empty() {
        buf.extend_from_slice(&pack::pack_imcl_peer_info(&image.imcl_peers));
    }
    if !image.ctrl_links.is_empty() {
        buf.extend_from_slice(&pack::pack_module_ctrl_link_cfg(&image.ctrl_links));
    }
    if !image.param_data.is_empty() {
        buf.extend_from_slice(&pack::pack_param_data(&image.param_data));
    }
    buf
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! APM command, response and event opcodes.
//!
//! Values are stable ids assigned by the APM wire-schema contract this
//! crate treats as given. They are opaque `u32`s as far as this
//! crate is concerned — matched against, never interpreted.

/// Command opcodes issued by this driver.
pub const GRAPH_OPEN: u32 = 0x0100_1001;
pub const GRAPH_PREPARE: u32 = 0x0100_1002;
pub const GRAPH_START: u32 = 0x0100_1003;
pub const GRAPH_SUSPEND: u32 = 0x0100_1004;
pub const GRAPH_STOP: u32 = 0x0100_1005;
pub const GRAPH_FLUSH: u32 = 0x0100_1006;
pub const GRAPH_CLOSE: u32 = 0x0100_1007;
pub const SET_GET_CFG: u32 = 0x0100_1008;
pub const PERSISTENT_CFG: u32 = 0x0100_1009;
pub const REGISTER_MODULE_EVENTS: u32 = 0x0100_100A;
pub const DEREGISTER_MODULE_EVENTS: u32 = 0x0100_100B;
pub const SET_GET_PATH_DELAY: u32 = 0x0100_100C;

/// Response opcodes.
pub const GPR_IBASIC_RSP_RESULT: u32 = 0x0200_0001;
pub const APM_CMD_RSP_GET_CFG: u32 = 0x0200_0002;

/// Event opcodes.
pub const APM_EVENT_MODULE_TO_CLIENT: u32 = 0x0300_1001;
pub const OFFLOAD_EVENT_ID_GET_CONTAINER_DELAY: u32 = 0x0300_1002;
pub const OFFLOAD_EVENT_ID_RD_SH_MEM_EP_MEDIA_FORMAT: u32 = 0x0300_1003;
pub const OFFLOAD_EVENT_ID_SH_MEM_EP_OPERATING_FRAME_SIZE: u32 = 0x0300_1004;
pub const EVENT_ID_MODULE_CMN_METADATA_CLONE_MD: u32 = 0x0300_1005;
pub const EVENT_ID_MODULE_CMN_METADATA_TRACKING_EVENT: u32 = 0x0300_1006;

/// `RspInfo.status` values; any non-`SUCCESS` value is treated
/// as an error by result handlers, but the driver only ever constructs
/// these two itself — the rest come verbatim from the satellite.
pub const STATUS_SUCCESS: u32 = 0;
pub const STATUS_UNSUPPORTED: u32 = 1;

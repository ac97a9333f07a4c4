// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Driver configuration.

#[cfg_attr(feature = "config", derive(serde::Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SgmConfig {
    /// Payloads at or under this size stay in-band; larger ones are
    /// demoted to an out-of-band SHM region. The reference
    /// build used a deliberately tiny 8-byte threshold to exercise the
    /// OOB path in testing; production embedders should raise this.
    pub in_band_payload_limit: usize,
    /// Capacity hint for the response queue.
    pub rsp_queue_capacity: usize,
    /// Capacity hint for the event queue.
    pub evt_queue_capacity: usize,
    /// First value handed out by the monotonic token counter.
    pub dynamic_token_start: u32,
}

impl Default for SgmConfig {
    fn default() -> Self {
        Self {
            in_band_payload_limit: 8,
            rsp_queue_capacity: 128,
            evt_queue_capacity: 128,
            dynamic_token_start: 1,
        }
    }
}

#[cfg(feature = "config")]
impl SgmConfig {
    /// Parses a config from TOML text, falling back to [`Default`] for
    /// any field the document omits.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

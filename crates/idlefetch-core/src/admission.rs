//! Network admission policy and adaptive chunk sizing.
//!
//! Admission is a pure predicate over a [`NetworkInfo`] snapshot and the
//! caller's [`AdmissionFlags`]. A rejection is not an error: the caller simply
//! tries again later.

use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use crate::config::NetworkConfig;

/// Downlink assumed when the host reports none, in Mbit/s.
pub const DEFAULT_DOWNLINK_MBPS: f64 = 5.0;

const CHUNK_FAST: u64 = 4_000_000;
const CHUNK_MEDIUM: u64 = 1_000_000;
const CHUNK_SLOW: u64 = 512_000;

/// Effective connection type, as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveType {
    Slow2g,
    TwoG,
    ThreeG,
    FourG,
}

impl EffectiveType {
    /// 2g and 3g class links are treated as metered cellular connections.
    pub fn is_cellular(self) -> bool {
        !matches!(self, EffectiveType::FourG)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EffectiveType::Slow2g => "slow-2g",
            EffectiveType::TwoG => "2g",
            EffectiveType::ThreeG => "3g",
            EffectiveType::FourG => "4g",
        }
    }
}

impl FromStr for EffectiveType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slow-2g" => Ok(EffectiveType::Slow2g),
            "2g" => Ok(EffectiveType::TwoG),
            "3g" => Ok(EffectiveType::ThreeG),
            "4g" => Ok(EffectiveType::FourG),
            other => Err(format!("unknown effective connection type: {other}")),
        }
    }
}

impl std::fmt::Display for EffectiveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the current connection characteristics. Unknown fields are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetworkInfo {
    pub effective_type: Option<EffectiveType>,
    pub downlink_mbps: Option<f64>,
    pub save_data: bool,
}

impl NetworkInfo {
    /// Snapshot from the `[network]` config section. Unparseable types are ignored.
    pub fn from_config(cfg: &NetworkConfig) -> Self {
        let effective_type = cfg.effective_type.as_deref().and_then(|s| match s.parse() {
            Ok(t) => Some(t),
            Err(e) => {
                tracing::warn!("{e}; treating connection type as unknown");
                None
            }
        });
        Self {
            effective_type,
            downlink_mbps: cfg.downlink_mbps,
            save_data: cfg.save_data,
        }
    }
}

/// Read-only source of connection characteristics.
pub trait NetworkQuality: Send + Sync {
    fn snapshot(&self) -> NetworkInfo;
}

/// Fixed network conditions.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticNetwork(pub NetworkInfo);

impl NetworkQuality for StaticNetwork {
    fn snapshot(&self) -> NetworkInfo {
        self.0
    }
}

/// Network conditions the host can update at any time.
#[derive(Debug, Default)]
pub struct SharedNetwork {
    info: RwLock<NetworkInfo>,
}

impl SharedNetwork {
    pub fn new(info: NetworkInfo) -> Self {
        Self {
            info: RwLock::new(info),
        }
    }

    pub fn set(&self, info: NetworkInfo) {
        *self.info.write().unwrap_or_else(PoisonError::into_inner) = info;
    }
}

impl NetworkQuality for SharedNetwork {
    fn snapshot(&self) -> NetworkInfo {
        *self.info.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Per-request admission switches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmissionFlags {
    pub allow_on_cellular: bool,
    pub respect_save_data: bool,
    /// Minimum downlink estimate in Mbit/s; `None` disables the check.
    pub min_downlink_mbps: Option<f64>,
}

impl Default for AdmissionFlags {
    fn default() -> Self {
        Self {
            allow_on_cellular: false,
            respect_save_data: true,
            min_downlink_mbps: Some(2.0),
        }
    }
}

impl From<&NetworkConfig> for AdmissionFlags {
    fn from(cfg: &NetworkConfig) -> Self {
        Self {
            allow_on_cellular: cfg.allow_on_cellular,
            respect_save_data: cfg.respect_save_data,
            min_downlink_mbps: cfg.min_downlink_mbps,
        }
    }
}

/// Why the policy refused to start a transfer.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error("data saver is on")]
    SaveData,
    #[error("cellular connection ({0})")]
    Cellular(EffectiveType),
    #[error("downlink {downlink} Mbit/s below minimum {minimum} Mbit/s")]
    SlowDownlink { downlink: f64, minimum: f64 },
}

/// Decide whether a transfer may start under `net`.
///
/// An unknown downlink passes the minimum-downlink check.
pub fn admit(net: &NetworkInfo, flags: &AdmissionFlags) -> Result<(), Rejection> {
    if flags.respect_save_data && net.save_data {
        return Err(Rejection::SaveData);
    }
    if let Some(t) = net.effective_type {
        if t.is_cellular() && !flags.allow_on_cellular {
            return Err(Rejection::Cellular(t));
        }
    }
    if let (Some(minimum), Some(downlink)) = (flags.min_downlink_mbps, net.downlink_mbps) {
        if downlink < minimum {
            return Err(Rejection::SlowDownlink { downlink, minimum });
        }
    }
    Ok(())
}

/// Chunk size for the next range request: `fixed` if set, else picked from the downlink.
pub fn adaptive_chunk_size(fixed: Option<u64>, net: &NetworkInfo) -> u64 {
    if let Some(size) = fixed.filter(|s| *s > 0) {
        return size;
    }
    let downlink = net.downlink_mbps.unwrap_or(DEFAULT_DOWNLINK_MBPS);
    if downlink > 10.0 {
        CHUNK_FAST
    } else if downlink > 2.0 {
        CHUNK_MEDIUM
    } else {
        CHUNK_SLOW
    }
}

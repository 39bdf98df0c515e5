//! DDC communication channels
//!
//! A [`ChannelBackend`] opens one [`DdcChannel`] per display. Two backends
//! exist on Linux (raw `/dev/i2c-*` access and the `ddcutil` CLI); the one to
//! use is chosen at startup by probing what the machine offers.

use crate::codec::{CodecError, VcpReply};
use crate::ddcutil::DdcutilBackend;
use crate::i2c::I2cBackend;
use crate::mock::MockBackend;
use crate::{DisplayId, HalError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Display {0} has no DDC channel")]
    Unavailable(DisplayId),

    #[error("Malformed reply: {0}")]
    Codec(#[from] CodecError),

    #[error("System call failed: {0}")]
    Sys(#[from] nix::Error),

    #[error("Command failed: {0}")]
    Command(String),

    #[error("Operation not supported by {0} backend")]
    Unsupported(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// GPU vendor driving a display's bus; affects inter-request pacing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuVendor {
    Amd,
    Intel,
    Nvidia,
    #[default]
    Unknown,
}

impl GpuVendor {
    /// Map a PCI vendor id
    pub fn from_pci_id(id: u16) -> Self {
        match id {
            0x1002 | 0x1022 => GpuVendor::Amd,
            0x8086 => GpuVendor::Intel,
            0x10DE => GpuVendor::Nvidia,
            _ => GpuVendor::Unknown,
        }
    }

    /// Parse a sysfs vendor file such as `0x1002`
    pub fn from_sysfs(contents: &str) -> Self {
        let trimmed = contents.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        u16::from_str_radix(digits, 16)
            .map(Self::from_pci_id)
            .unwrap_or_default()
    }
}

/// Everything a backend needs to open a channel for one display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTarget {
    pub display: DisplayId,
    pub i2c_bus: Option<u32>,
    pub gpu_vendor: GpuVendor,
}

/// An open DDC/CI connection to one display.
///
/// Calls block until the display answered or the backend gave up.
pub trait DdcChannel: Send {
    /// Set a VCP feature. `source` is the host source address byte.
    fn write_vcp(&mut self, code: u8, value: u16, source: u8) -> Result<(), ChannelError>;

    /// Get a VCP feature
    fn read_vcp(&mut self, code: u8) -> Result<VcpReply, ChannelError>;

    /// Read the raw EDID block
    fn read_edid(&mut self) -> Result<Vec<u8>, ChannelError>;
}

/// Factory for [`DdcChannel`]s
pub trait ChannelBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn open(&self, target: &ChannelTarget) -> Result<Box<dyn DdcChannel>, ChannelError>;
}

/// Which backend [`probe`] should return
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Auto,
    I2c,
    Ddcutil,
    Mock,
}

impl BackendKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(BackendKind::Auto),
            "i2c" | "i2c-dev" => Some(BackendKind::I2c),
            "ddcutil" => Some(BackendKind::Ddcutil),
            "mock" => Some(BackendKind::Mock),
            _ => None,
        }
    }
}

/// Pick a backend by probing platform capabilities
pub fn probe(kind: BackendKind) -> Result<Arc<dyn ChannelBackend>, HalError> {
    match kind {
        BackendKind::Mock => {
            tracing::info!("Using mock DDC backend");
            Ok(Arc::new(MockBackend::new()))
        }
        BackendKind::I2c => I2cBackend::detect()
            .map(|b| Arc::new(b) as Arc<dyn ChannelBackend>)
            .ok_or(HalError::NoBackend),
        BackendKind::Ddcutil => DdcutilBackend::detect()
            .map(|b| Arc::new(b) as Arc<dyn ChannelBackend>)
            .ok_or(HalError::NoBackend),
        BackendKind::Auto => {
            if let Some(backend) = I2cBackend::detect() {
                tracing::info!("Using i2c-dev DDC backend");
                return Ok(Arc::new(backend));
            }
            if let Some(backend) = DdcutilBackend::detect() {
                tracing::info!("Using ddcutil DDC backend");
                return Ok(Arc::new(backend));
            }
            Err(HalError::NoBackend)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_vendor_from_sysfs() {
        assert_eq!(GpuVendor::from_sysfs("0x1002\n"), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_sysfs("0x8086"), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_sysfs("0x10de"), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_sysfs("garbage"), GpuVendor::Unknown);
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!(BackendKind::parse("MOCK"), Some(BackendKind::Mock));
        assert_eq!(BackendKind::parse("i2c-dev"), Some(BackendKind::I2c));
        assert_eq!(BackendKind::parse("x"), None);
    }

    #[test]
    fn test_probe_mock() {
        let backend = probe(BackendKind::Mock).unwrap();
        assert_eq!(backend.name(), "mock");
    }
}

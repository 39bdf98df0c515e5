//! Helio hardware layer
//!
//! DDC/CI access to external monitors: the VCP control registry, EDID
//! decoding, the packet codec, channel backends, fault tracking and the
//! fault-gated [`Transport`], plus discovery of connected displays and the
//! session state that decides whether I/O may happen.
//!
//! # Example
//!
//! ```no_run
//! use helio_hal::{BackendKind, ControlId, DisplayDirectory, FaultPolicy, SysfsDisplays, Transport, TransportPolicy};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = helio_hal::probe(BackendKind::Auto)?;
//!     let transport = Transport::new(backend, TransportPolicy::default(), FaultPolicy::default());
//!
//!     let directory = DisplayDirectory::new(Arc::new(SysfsDisplays::default()), Default::default());
//!     directory.enumerate(&transport)?;
//!
//!     for display in directory.displays() {
//!         let brightness = transport.read(display.id, ControlId::Brightness)?;
//!         println!("{}: {}/{}", display.name, brightness.current_value, brightness.max_value);
//!     }
//!     Ok(())
//! }
//! ```

pub mod backlight;
pub mod channel;
pub mod codec;
pub mod controls;
pub mod ddcutil;
pub mod directory;
pub mod edid;
pub mod faults;
pub mod i2c;
pub mod input;
pub mod mock;
pub mod session;
pub mod transport;

pub use backlight::{ReferenceSource, SysfsBacklight};
pub use channel::{
    BackendKind, ChannelBackend, ChannelError, ChannelTarget, DdcChannel, GpuVendor, probe,
};
pub use controls::ControlId;
pub use directory::{
    DisplayDirectory, DisplayFilter, DisplayRecord, Exclusion, PlatformDisplay, PlatformDisplays,
    SysfsDisplays, TopologyDiff,
};
pub use edid::EdidInfo;
pub use faults::{Direction, FailureFlags, FaultPolicy, FaultReport, FaultTracker, Severity};
pub use input::VideoInputSource;
pub use session::{SessionProvider, SessionState, SystemSession};
pub use transport::{
    DdcReadResult, Delivery, Gate, LatencyReport, SuspendReason, Transport, TransportError,
    TransportPolicy,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HalError {
    #[error("Invalid EDID: {0}")]
    InvalidEdid(String),

    #[error("No usable DDC backend (load i2c-dev or install ddcutil)")]
    NoBackend,

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// HAL Result type
pub type Result<T> = std::result::Result<T, HalError>;

/// Opaque platform identifier of a connected display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayId(pub u32);

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_id_serializes_as_number() {
        assert_eq!(serde_json::to_string(&DisplayId(42)).unwrap(), "42");
    }

    #[test]
    fn test_hal_error_display() {
        let err = HalError::InvalidEdid("short".to_string());
        assert!(format!("{}", err).contains("Invalid EDID"));
    }
}

//! Settings to hardware-layer policy

use helio_config::{DaemonConfig, DdcConfig};
use helio_hal::{BackendKind, DisplayFilter, FaultPolicy, TransportPolicy};

pub fn fault_policy(ddc: &DdcConfig) -> FaultPolicy {
    FaultPolicy {
        max_read_faults: ddc.max_read_faults,
        max_write_faults: ddc.max_write_faults,
        failure_weight: ddc.failure_severity,
        timeout_weight: ddc.timeout_severity,
        failed_flag_streak: ddc.failed_streak,
    }
}

pub fn transport_policy(ddc: &DdcConfig) -> TransportPolicy {
    TransportPolicy {
        max_read_duration: ddc.max_read_duration(),
        max_write_duration: ddc.max_write_duration(),
        amd_delay: ddc.amd_delay(),
        default_delay: ddc.default_delay(),
        failure_delay: ddc.failure_delay(),
        wake_hold: ddc.wake_hold(),
    }
}

pub fn display_filter(daemon: &DaemonConfig) -> DisplayFilter {
    DisplayFilter {
        include_virtual: daemon.include_virtual,
        include_projectors: daemon.include_projectors,
        include_airplay: daemon.include_airplay,
        include_dummy: daemon.include_dummy,
    }
}

/// Backend named in `[ddc]`; validation already rejected unknown names
pub fn backend_kind(ddc: &DdcConfig) -> BackendKind {
    BackendKind::parse(&ddc.backend).unwrap_or(BackendKind::Auto)
}

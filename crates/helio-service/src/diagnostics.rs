//! Diagnostics dump and self-test

use chrono::{DateTime, Utc};
use helio_config::{AdaptiveMode, BrightnessRange};
use helio_hal::{
    ControlId, DisplayId, FaultReport, LatencyReport, SessionState, SuspendReason,
};
use serde::Serialize;

use crate::controller::Controller;
use crate::error::Result;

/// Values swept by the self-test
const SWEEP: std::ops::RangeInclusive<u16> = 1..=100;
const SWEPT_CONTROLS: [ControlId; 2] = [ControlId::Brightness, ControlId::Contrast];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplaySummary {
    pub id: DisplayId,
    pub name: String,
    pub serial: String,
    pub connector: String,
    pub active: bool,
    /// Whether a DDC channel could be resolved
    pub ddc: bool,
    pub range: BrightnessRange,
}

/// Snapshot of the transport and adaptive state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticsReport {
    pub generated_at: DateTime<Utc>,
    pub backend: &'static str,
    pub mode: AdaptiveMode,
    pub suspension: Option<SuspendReason>,
    pub session: SessionState,
    pub displays: Vec<DisplaySummary>,
    pub latency: Vec<LatencyReport>,
    pub faults: Vec<FaultReport>,
}

impl DiagnosticsReport {
    pub fn collect(controller: &Controller) -> Self {
        let transport = controller.transport();
        let settings = controller.settings();
        let displays = controller
            .displays()
            .into_iter()
            .map(|d| DisplaySummary {
                range: settings.range_for(&d.serial),
                ddc: d.ddc_capable(),
                id: d.id,
                name: d.name,
                serial: d.serial,
                connector: d.connector,
                active: d.active,
            })
            .collect();

        Self {
            generated_at: Utc::now(),
            backend: transport.backend_name(),
            mode: controller.mode(),
            suspension: transport.gate().suspension(),
            session: controller.session_state(),
            displays,
            latency: transport.latency_report(),
            faults: transport.faults().report(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// One write the self-test could not make
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub display: DisplayId,
    pub control: ControlId,
    pub value: u16,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelfTestReport {
    pub tested: Vec<DisplayId>,
    /// Displays without a DDC channel
    pub untestable: Vec<DisplayId>,
    pub writes: u32,
    pub failures: Vec<SweepFailure>,
    pub diagnostics: DiagnosticsReport,
}

impl SelfTestReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Sweep brightness and contrast through 1..=100 on every active display
///
/// Original values are read first and written back afterwards. The report
/// ends with a diagnostics snapshot so fault counts from the sweep show up.
pub async fn self_test(controller: &Controller) -> Result<SelfTestReport> {
    let mut tested = Vec::new();
    let mut untestable = Vec::new();
    let mut failures = Vec::new();
    let mut writes = 0;

    for display in controller.displays().into_iter().filter(|d| d.active) {
        if !display.ddc_capable() {
            untestable.push(display.id);
            continue;
        }
        let display_ref = &display;
        tracing::info!("Self-test on {} ({})", display_ref.name, display_ref.id);
        tested.push(display.id);

        for control in SWEPT_CONTROLS {
            let original = controller.get_current_value(display.id, control).await;
            for value in SWEEP {
                writes += 1;
                if let Err(e) = controller.queue().write(display.id, control, value).await {
                    failures.push(SweepFailure {
                        display: display.id,
                        control,
                        value,
                        error: e.to_string(),
                    });
                }
            }
            if let Some(original) = original {
                if let Err(e) = controller.set_value(display.id, control, original).await {
                    let display_ref = &display;
                    tracing::warn!("Restoring {} on display {} failed: {}", control, display_ref.id, e);
                }
            }
        }
    }

    if failures.is_empty() {
        tracing::info!("Self-test passed: {} writes", writes);
    } else {
        tracing::warn!("Self-test: {} of {} writes failed", failures.len(), writes);
    }

    Ok(SelfTestReport {
        tested,
        untestable,
        writes,
        failures,
        diagnostics: DiagnosticsReport::collect(controller),
    })
}

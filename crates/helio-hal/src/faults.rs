//! Fault tracking
//!
//! Independent read and write fault counters per (display, control). Faults
//! add their severity weight up to `max + 1`; going over `max` puts the pair
//! in the skip-set for that direction until an explicit reset. Every success
//! takes one point off, so a control that fails rarely heals while one that
//! mostly fails still ends up skipped.

use crate::DisplayId;
use crate::controls::ControlId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Direction of a DDC operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Read,
    Write,
}

/// How bad a fault was
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The operation reported an error
    Failure,
    /// The operation took longer than its duration budget
    Timeout,
}

/// Thresholds and weights used by the [`FaultTracker`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultPolicy {
    pub max_read_faults: u32,
    pub max_write_faults: u32,
    pub failure_weight: u32,
    pub timeout_weight: u32,
    /// Consecutive failures that raise a display's failed flag
    pub failed_flag_streak: u32,
}

impl Default for FaultPolicy {
    fn default() -> Self {
        Self {
            max_read_faults: 10,
            max_write_faults: 20,
            failure_weight: 1,
            timeout_weight: 4,
            failed_flag_streak: 3,
        }
    }
}

impl FaultPolicy {
    pub fn max_faults(&self, direction: Direction) -> u32 {
        match direction {
            Direction::Read => self.max_read_faults,
            Direction::Write => self.max_write_faults,
        }
    }

    pub fn weight(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Failure => self.failure_weight,
            Severity::Timeout => self.timeout_weight,
        }
    }
}

/// Derived per-display flags read by the adaptive layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FailureFlags {
    pub brightness_failed: bool,
    pub volume_failed: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct Counter {
    faults: u32,
    streak: u32,
    skipped: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct ControlFaults {
    read: Counter,
    write: Counter,
}

impl ControlFaults {
    fn get(&self, direction: Direction) -> &Counter {
        match direction {
            Direction::Read => &self.read,
            Direction::Write => &self.write,
        }
    }

    fn get_mut(&mut self, direction: Direction) -> &mut Counter {
        match direction {
            Direction::Read => &mut self.read,
            Direction::Write => &mut self.write,
        }
    }
}

#[derive(Debug, Default)]
struct DisplayFaults {
    controls: HashMap<ControlId, ControlFaults>,
    flags: FailureFlags,
}

/// Fault counts for one control in a [`FaultReport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlFaultCount {
    pub control: ControlId,
    pub read_faults: u32,
    pub write_faults: u32,
}

/// Point-in-time view of one display's fault state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaultReport {
    pub display: DisplayId,
    pub flags: FailureFlags,
    pub skipped_reads: Vec<ControlId>,
    pub skipped_writes: Vec<ControlId>,
    pub counts: Vec<ControlFaultCount>,
}

/// Shared fault table
#[derive(Debug, Default)]
pub struct FaultTracker {
    policy: FaultPolicy,
    displays: Mutex<HashMap<DisplayId, DisplayFaults>>,
}

impl FaultTracker {
    pub fn new(policy: FaultPolicy) -> Self {
        Self {
            policy,
            displays: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &FaultPolicy {
        &self.policy
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DisplayId, DisplayFaults>> {
        self.displays.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a fault. Returns true if this fault moved the pair into the skip-set.
    pub fn record_fault(
        &self,
        display: DisplayId,
        control: ControlId,
        direction: Direction,
        severity: Severity,
    ) -> bool {
        let max = self.policy.max_faults(direction);
        let weight = self.policy.weight(severity);

        let mut displays = self.lock();
        let entry = displays.entry(display).or_default();
        let counter = entry
            .controls
            .entry(control)
            .or_default()
            .get_mut(direction);

        counter.faults = counter.faults.saturating_add(weight).min(max + 1);
        counter.streak = counter.streak.saturating_add(1);

        let newly_skipped = counter.faults > max && !counter.skipped;
        if newly_skipped {
            counter.skipped = true;
            let display_id = display;
            tracing::warn!(
                "Display {}: giving up on {} {} after {} faults",
                display_id,
                match direction {
                    Direction::Read => "reading",
                    Direction::Write => "writing",
                },
                control,
                counter.faults
            );
        }

        let streak_reached = counter.streak >= self.policy.failed_flag_streak;
        let skipped = counter.skipped;
        match (control, direction) {
            (ControlId::Brightness, Direction::Read) if streak_reached || skipped => {
                entry.flags.brightness_failed = true;
            }
            (ControlId::Brightness, Direction::Write) if skipped => {
                entry.flags.brightness_failed = true;
            }
            (ControlId::AudioSpeakerVolume, Direction::Write) if streak_reached || skipped => {
                entry.flags.volume_failed = true;
            }
            (ControlId::AudioSpeakerVolume, Direction::Read) if skipped => {
                entry.flags.volume_failed = true;
            }
            _ => {}
        }

        newly_skipped
    }

    /// Record a successful operation: one point off the counter, streak cleared
    pub fn record_success(&self, display: DisplayId, control: ControlId, direction: Direction) {
        let mut displays = self.lock();
        let entry = displays.entry(display).or_default();
        let counter = entry
            .controls
            .entry(control)
            .or_default()
            .get_mut(direction);

        counter.faults = counter.faults.saturating_sub(1);
        counter.streak = 0;

        if counter.skipped {
            return;
        }
        match (control, direction) {
            (ControlId::Brightness, Direction::Read) => entry.flags.brightness_failed = false,
            (ControlId::AudioSpeakerVolume, Direction::Write) => entry.flags.volume_failed = false,
            _ => {}
        }
    }

    pub fn is_skipped(&self, display: DisplayId, control: ControlId, direction: Direction) -> bool {
        self.lock()
            .get(&display)
            .and_then(|d| d.controls.get(&control))
            .is_some_and(|c| c.get(direction).skipped)
    }

    /// Current fault counter for a pair
    pub fn faults(&self, display: DisplayId, control: ControlId, direction: Direction) -> u32 {
        self.lock()
            .get(&display)
            .and_then(|d| d.controls.get(&control))
            .map_or(0, |c| c.get(direction).faults)
    }

    pub fn flags(&self, display: DisplayId) -> FailureFlags {
        self.lock()
            .get(&display)
            .map(|d| d.flags)
            .unwrap_or_default()
    }

    /// Clear counters, skip-sets and flags for one display, or all of them
    pub fn reset(&self, display: Option<DisplayId>) {
        let mut displays = self.lock();
        match display {
            Some(id) => {
                displays.remove(&id);
                tracing::info!("Fault state reset for display {}", id);
            }
            None => {
                displays.clear();
                tracing::info!("Fault state reset for all displays");
            }
        }
    }

    /// Snapshot every display with any recorded state, ordered by id
    pub fn report(&self) -> Vec<FaultReport> {
        let displays = self.lock();
        let mut ids: Vec<DisplayId> = displays.keys().copied().collect();
        ids.sort();

        ids.into_iter()
            .filter_map(|id| displays.get(&id).map(|d| (id, d)))
            .map(|(id, faults)| {
                let ordered: BTreeMap<ControlId, ControlFaults> =
                    faults.controls.iter().map(|(c, f)| (*c, *f)).collect();
                FaultReport {
                    display: id,
                    flags: faults.flags,
                    skipped_reads: ordered
                        .iter()
                        .filter(|(_, f)| f.read.skipped)
                        .map(|(c, _)| *c)
                        .collect(),
                    skipped_writes: ordered
                        .iter()
                        .filter(|(_, f)| f.write.skipped)
                        .map(|(c, _)| *c)
                        .collect(),
                    counts: ordered
                        .iter()
                        .filter(|(_, f)| f.read.faults > 0 || f.write.faults > 0)
                        .map(|(c, f)| ControlFaultCount {
                            control: *c,
                            read_faults: f.read.faults,
                            write_faults: f.write.faults,
                        })
                        .collect(),
                }
            })
            .collect()
    }
}

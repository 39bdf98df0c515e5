//! Helio service layer
//!
//! Ties the hardware layer, settings and adaptive engine together: a single
//! worker serializes all DDC traffic, the [`Controller`] exposes manual and
//! adaptive control to callers, and the [`Scheduler`] runs the background
//! loops that keep displays adapted.

pub mod controller;
pub mod diagnostics;
pub mod error;
pub mod policy;
pub mod queue;
pub mod scheduler;

pub use controller::{AdaptOutcome, AppliedTarget, Controller, Providers, SessionChange};
pub use diagnostics::{DiagnosticsReport, DisplaySummary, SelfTestReport, SweepFailure, self_test};
pub use error::{Result, ServiceError};
pub use queue::DdcQueue;
pub use scheduler::{Debouncer, Scheduler};

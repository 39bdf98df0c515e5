//! Adaptive brightness for Helio
//!
//! Computes the brightness and contrast each display should have, either
//! from the sun's position over the day or from a reference display's
//! brightness. Nothing here touches hardware; the service layer writes the
//! returned [`Target`] values through the DDC transport.

pub mod apps;
pub mod engine;
pub mod history;
pub mod mode;
pub mod moment;
pub mod solar;

pub use apps::RunningApps;
pub use engine::{
    AdaptiveEngine, CurveParams, CurvePoint, Offsets, Target, compute_batch, compute_location,
    compute_sync, manual_value,
};
pub use history::ReferenceHistory;
pub use mode::ModeState;
pub use moment::MomentCache;
pub use solar::Moment;

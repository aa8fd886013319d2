//! Non-rigid 2D point-set registration
//!
//! This crate provides the TPS-RPM (Thin-Plate Spline Robust Point Matching)
//! algorithm:
//! - deterministic-annealing outer loop over a geometric temperature schedule
//! - SoftAssign correspondence estimation with outlier slack row/column
//! - thin-plate spline fitting regularized by a bending-energy penalty

pub mod rpm;

pub use rpm::config::RpmConfig;
pub use rpm::correspondence::estimate_correspondence;
pub use rpm::softassign::soft_assign;
pub use rpm::thin_plate::ThinPlateSpline;
pub use rpm::transform::{apply_correspondence, estimate_transform};
pub use rpm::{estimate, RpmResult, TemperatureSchedule};

pub use rpm_core::{Error, Result};

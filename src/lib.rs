//! OSC attitude - receive sensor-rig telemetry over OSC/UDP and fuse it into an
//! orientation
//!
//! A handheld rig streams OSC bundles of nine IMU readings (accelerometer,
//! magnetometer, gyroscope) plus single messages for two rotary encoders and a
//! reset button. This crate provides:
//!
//! - [`codec`]: OSC 1.0 packet decoding and encoding
//! - [`link`]: a UDP receiver with a data-silence watchdog
//! - [`estimator`]: Madgwick quaternion AHRS and an Euler complementary filter
//! - [`orchestrator`]: the glue that validates bundles, throttles output and
//!   converts encoder ticks to angles
//!
//! # Quick Start
//!
//! ```rust
//! use nalgebra::Vector3;
//! use osc_attitude::{FusionSettings, InertialSample, Orientation, estimator};
//!
//! let mut filter = estimator::build(&FusionSettings::default());
//!
//! let sample = InertialSample::new(
//!     Vector3::new(0.0, 0.0, 1.0), // accelerometer, g
//!     Vector3::new(0.1, 0.0, 0.0), // gyroscope, rad/s
//!     Vector3::new(0.3, 0.0, -0.4), // magnetometer
//! );
//!
//! // 10 ms step
//! let Orientation::Quaternion(q) = filter.update_with_dt(&sample, 0.01) else {
//!     unreachable!()
//! };
//! assert!((q.norm() - 1.0).abs() < 1e-5);
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod estimator;
pub mod link;
mod math;
pub mod orchestrator;
mod types;
pub mod watchdog;

// Re-export the commonly used types
pub use error::{ConfigError, DecodeError, Error, LinkError, Result, ShapeError};
pub use estimator::{AttitudeEstimator, Complementary, Madgwick};
pub use link::{Handler, LinkEvent, LinkSettings, LinkSupervisor};
pub use math::Vector3Ext;
pub use types::*;

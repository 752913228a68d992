//! Attitude estimators
//!
//! Two interchangeable filters share the [`AttitudeEstimator`] contract:
//!
//! - [`Madgwick`]: quaternion gradient-descent AHRS
//! - [`Complementary`]: Euler-angle complementary filter with optional tilt
//!   compensated heading
//!
//! The filter is picked once per session through [`build`]. Each instance
//! owns its state; there is no process-wide filter state, so independent
//! sessions can run side by side.

mod complementary;
mod madgwick;

use std::time::Instant;

pub use complementary::Complementary;
pub use madgwick::Madgwick;

use crate::types::{EstimatorKind, FusionSettings, InertialSample, Orientation};

/// Common contract of the attitude estimators
pub trait AttitudeEstimator: Send {
    /// Which algorithm this is.
    fn kind(&self) -> EstimatorKind;

    /// Fuse one sample, measuring the time step from the wall clock.
    ///
    /// The first call measures from construction (or the last [`reset`]).
    ///
    /// [`reset`]: AttitudeEstimator::reset
    fn update(&mut self, sample: &InertialSample) -> Orientation;

    /// Fuse one sample with an explicit time step in seconds.
    ///
    /// Does not touch the wall-clock reference used by [`update`], which makes
    /// runs with identical inputs reproducible.
    ///
    /// [`update`]: AttitudeEstimator::update
    fn update_with_dt(&mut self, sample: &InertialSample, delta_time: f32) -> Orientation;

    /// Current estimate.
    fn orientation(&self) -> Orientation;

    /// Return to the initial state.
    fn reset(&mut self);
}

/// Create the estimator selected by `settings.filter`.
///
/// # Example
/// ```
/// use osc_attitude::{EstimatorKind, FusionSettings, estimator};
///
/// let settings = FusionSettings { filter: EstimatorKind::Complementary, ..Default::default() };
/// let filter = estimator::build(&settings);
/// assert_eq!(filter.kind(), EstimatorKind::Complementary);
/// ```
pub fn build(settings: &FusionSettings) -> Box<dyn AttitudeEstimator> {
    match settings.filter {
        EstimatorKind::Madgwick => Box::new(Madgwick::with_beta(settings.beta)),
        EstimatorKind::Complementary => Box::new(Complementary::with_settings(*settings)),
    }
}

/// Wall-clock step measurement shared by both estimators
#[derive(Debug, Clone, Copy)]
pub(crate) struct StepClock {
    last: Instant,
}

impl StepClock {
    pub(crate) fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    /// Seconds since the previous tick (or construction).
    pub(crate) fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last).as_secs_f32();
        self.last = now;
        elapsed
    }
}

//! Euler-angle complementary filter
//!
//! Each axis is an independent first-order blend of gyroscope integration and
//! an absolute reference angle:
//!
//! ```text
//! angle = α · (angle + rate · dt) + (1 − α) · reference
//! ```
//!
//! Pitch and roll references come from the normalised accelerometer, the yaw
//! reference from the magnetometer (optionally tilt compensated). There is no
//! cross-axis coupling and no wrapping of the accumulated angles.

use nalgebra::Vector3;

use super::{AttitudeEstimator, StepClock};
use crate::math::Vector3Ext;
use crate::types::{
    EstimatorKind, EulerAngles, FusionSettings, InertialSample, Orientation, YawMode,
};

/// Complementary filter state
#[derive(Debug, Clone)]
pub struct Complementary {
    settings: FusionSettings,
    angles: EulerAngles,
    clock: StepClock,
}

impl Complementary {
    /// Create a filter with default settings (α = 0.98, tilt-compensated yaw)
    pub fn new() -> Self {
        Self::with_settings(FusionSettings::default())
    }

    /// Create a filter with specified settings
    pub fn with_settings(settings: FusionSettings) -> Self {
        Self {
            settings,
            angles: EulerAngles::default(),
            clock: StepClock::new(),
        }
    }

    pub fn settings(&self) -> FusionSettings {
        self.settings
    }

    /// Current filtered angles in radians
    pub fn angles(&self) -> EulerAngles {
        self.angles
    }

    /// Fuse one sample with the given time step and return the new angles
    ///
    /// A non-positive time step, or one above `max_dt`, is replaced by
    /// `fallback_dt`.
    ///
    /// # Example
    /// ```
    /// use nalgebra::Vector3;
    /// use osc_attitude::InertialSample;
    /// use osc_attitude::estimator::Complementary;
    ///
    /// let mut filter = Complementary::new();
    /// let level = InertialSample::new(
    ///     Vector3::new(0.0, 0.0, 1.0),
    ///     Vector3::zeros(),
    ///     Vector3::new(1.0, 0.0, 0.0),
    /// );
    /// let angles = filter.filter(&level, 0.01);
    /// assert_eq!(angles.angle_x, 0.0);
    /// ```
    pub fn filter(&mut self, sample: &InertialSample, delta_time: f32) -> EulerAngles {
        let dt = self.sanitise_dt(delta_time);
        let gyro = sample.gyro;

        let tilt = sample.acc.try_unit().map(|a| {
            let pitch = a.y.atan2((a.x * a.x + a.z * a.z).sqrt());
            let roll = (-a.x).atan2(a.z);
            (pitch, roll)
        });

        let heading = self.heading(sample.mag, tilt);

        self.angles = EulerAngles {
            angle_x: self.blend(self.angles.angle_x, gyro.x, dt, tilt.map(|(p, _)| p)),
            angle_y: self.blend(self.angles.angle_y, gyro.y, dt, tilt.map(|(_, r)| r)),
            angle_z: self.blend(self.angles.angle_z, gyro.z, dt, heading),
        };
        self.angles
    }

    fn sanitise_dt(&self, delta_time: f32) -> f32 {
        if delta_time > 0.0 && delta_time <= self.settings.max_dt {
            delta_time
        } else {
            self.settings.fallback_dt
        }
    }

    /// Magnetometer yaw reference, `None` for a zero field
    fn heading(&self, mag: Vector3<f32>, tilt: Option<(f32, f32)>) -> Option<f32> {
        if mag.is_exactly_zero() {
            return None;
        }
        let yaw = match self.settings.yaw {
            YawMode::Magnetic => mag.y.atan2(mag.x),
            YawMode::TiltCompensated => {
                // Without a gravity reference, tilt by the filtered angles
                let (pitch, roll) =
                    tilt.unwrap_or((self.angles.angle_x, self.angles.angle_y));
                tilt_compensated_yaw(mag, pitch, roll)
            }
        };
        Some(yaw)
    }

    /// One complementary step; gyro-only integration when there is no reference
    fn blend(&self, previous: f32, rate: f32, dt: f32, reference: Option<f32>) -> f32 {
        let predicted = previous + rate * dt;
        match reference {
            Some(reference) => {
                let alpha = self.settings.alpha;
                alpha * predicted + (1.0 - alpha) * reference
            }
            None => predicted,
        }
    }
}

/// Heading after rotating the magnetometer into the level frame
pub fn tilt_compensated_yaw(mag: Vector3<f32>, pitch: f32, roll: f32) -> f32 {
    let (sin_p, cos_p) = pitch.sin_cos();
    let (sin_r, cos_r) = roll.sin_cos();
    let mag_x = mag.x * cos_p + mag.z * sin_p;
    let mag_y = mag.x * sin_r * sin_p + mag.y * cos_r - mag.z * sin_r * cos_p;
    mag_y.atan2(mag_x)
}

impl Default for Complementary {
    fn default() -> Self {
        Self::new()
    }
}

impl AttitudeEstimator for Complementary {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::Complementary
    }

    fn update(&mut self, sample: &InertialSample) -> Orientation {
        let delta_time = self.clock.tick();
        self.update_with_dt(sample, delta_time)
    }

    fn update_with_dt(&mut self, sample: &InertialSample, delta_time: f32) -> Orientation {
        Orientation::Euler(self.filter(sample, delta_time))
    }

    fn orientation(&self) -> Orientation {
        Orientation::Euler(self.angles)
    }

    fn reset(&mut self) {
        self.angles = EulerAngles::default();
        self.clock = StepClock::new();
    }
}

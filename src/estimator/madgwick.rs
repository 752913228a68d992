//! Quaternion gradient-descent AHRS
//!
//! Madgwick's MARG orientation filter: the gyroscope rate of change of the
//! quaternion is corrected by one normalised gradient-descent step on the
//! accelerometer and magnetometer residuals, integrated over the time step and
//! renormalised on every call.

use nalgebra::{Quaternion, UnitQuaternion, Vector3};

use super::{AttitudeEstimator, StepClock};
use crate::math::{Vector3Ext, inv_sqrt};
use crate::types::{
    AttitudeAngles, EstimatorKind, InertialSample, Orientation, QuaternionOrientation,
};

/// Default gradient-descent step weight
pub const DEFAULT_BETA: f32 = 0.06;

/// Quaternion AHRS state
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use osc_attitude::estimator::Madgwick;
///
/// let mut filter = Madgwick::new();
/// let gyro = Vector3::new(0.0, 0.0, 0.1);   // rad/s
/// let acc = Vector3::new(0.0, 0.0, 1.0);    // g
/// let mag = Vector3::new(0.4, 0.0, -0.3);
///
/// filter.update_marg(gyro, acc, mag, 0.01);
/// let q = filter.quaternion();
/// assert!((q.norm() - 1.0).abs() < 1e-6);
/// ```
#[derive(Debug, Clone)]
pub struct Madgwick {
    /// Gradient-descent step weight
    beta: f32,
    /// Current orientation (WXYZ), unit norm after every update
    quaternion: UnitQuaternion<f32>,
    clock: StepClock,
}

impl Madgwick {
    /// Create a filter with the default `beta`
    pub fn new() -> Self {
        Self::with_beta(DEFAULT_BETA)
    }

    /// Create a filter with a specific `beta`
    pub fn with_beta(beta: f32) -> Self {
        Self {
            beta,
            quaternion: UnitQuaternion::identity(),
            clock: StepClock::new(),
        }
    }

    pub fn beta(&self) -> f32 {
        self.beta
    }

    /// Get current orientation quaternion
    pub fn quaternion(&self) -> UnitQuaternion<f32> {
        self.quaternion
    }

    /// Set orientation quaternion directly
    pub fn set_quaternion(&mut self, quaternion: UnitQuaternion<f32>) {
        self.quaternion = quaternion;
    }

    /// Update with gyroscope (rad/s), accelerometer and magnetometer readings
    ///
    /// A zero accelerometer degrades to pure gyroscope integration for this
    /// step. A zero magnetometer falls back to [`update_imu`](Self::update_imu).
    pub fn update_marg(
        &mut self,
        gyroscope: Vector3<f32>,
        accelerometer: Vector3<f32>,
        magnetometer: Vector3<f32>,
        delta_time: f32,
    ) {
        let Some(m) = magnetometer.try_unit() else {
            self.update_imu(gyroscope, accelerometer, delta_time);
            return;
        };

        let mut q_dot = self.gyroscope_rate(gyroscope);

        if let Some(a) = accelerometer.try_unit() {
            if let Some(step) = self.marg_gradient(a, m) {
                q_dot = q_dot - step * self.beta;
            }
        }

        self.integrate(q_dot, delta_time);
    }

    /// Update with gyroscope (rad/s) and accelerometer readings only
    pub fn update_imu(
        &mut self,
        gyroscope: Vector3<f32>,
        accelerometer: Vector3<f32>,
        delta_time: f32,
    ) {
        let mut q_dot = self.gyroscope_rate(gyroscope);

        if let Some(a) = accelerometer.try_unit() {
            if let Some(step) = self.imu_gradient(a) {
                q_dot = q_dot - step * self.beta;
            }
        }

        self.integrate(q_dot, delta_time);
    }

    /// Roll, pitch and yaw of the current quaternion (aerospace sequence)
    ///
    /// Diagnostic only; nothing here feeds back into the filter state.
    pub fn euler_angles(&self) -> AttitudeAngles {
        let q = self.quaternion.as_ref();
        let (q0, q1, q2, q3) = (q.w, q.i, q.j, q.k);
        let ww = q0 * q0;
        let xx = q1 * q1;
        let yy = q2 * q2;
        let zz = q3 * q3;

        AttitudeAngles {
            roll: (2.0 * (q2 * q3 + q1 * q0)).atan2(-xx - yy + zz + ww),
            pitch: (-2.0 * (q1 * q3 - q2 * q0)).clamp(-1.0, 1.0).asin(),
            yaw: (2.0 * (q1 * q2 + q3 * q0)).atan2(xx - yy - zz + ww),
        }
    }

    /// Rate of change of quaternion from the gyroscope: `0.5 * q ⊗ (0, ω)`
    fn gyroscope_rate(&self, gyroscope: Vector3<f32>) -> Quaternion<f32> {
        let omega = Quaternion::from_parts(0.0, gyroscope);
        (self.quaternion.as_ref() * omega) * 0.5
    }

    /// Normalised objective-function gradient for accelerometer + magnetometer
    ///
    /// `a` and `m` must already be unit vectors.
    fn marg_gradient(&self, a: Vector3<f32>, m: Vector3<f32>) -> Option<Quaternion<f32>> {
        let q = self.quaternion.as_ref();
        let (q0, q1, q2, q3) = (q.w, q.i, q.j, q.k);
        let (ax, ay, az) = (a.x, a.y, a.z);
        let (mx, my, mz) = (m.x, m.y, m.z);

        // Auxiliary variables to avoid repeated arithmetic
        let two_q0mx = 2.0 * q0 * mx;
        let two_q0my = 2.0 * q0 * my;
        let two_q0mz = 2.0 * q0 * mz;
        let two_q1mx = 2.0 * q1 * mx;
        let two_q0 = 2.0 * q0;
        let two_q1 = 2.0 * q1;
        let two_q2 = 2.0 * q2;
        let two_q3 = 2.0 * q3;
        let two_q0q2 = 2.0 * q0 * q2;
        let two_q2q3 = 2.0 * q2 * q3;
        let q0q0 = q0 * q0;
        let q0q1 = q0 * q1;
        let q0q2 = q0 * q2;
        let q0q3 = q0 * q3;
        let q1q1 = q1 * q1;
        let q1q2 = q1 * q2;
        let q1q3 = q1 * q3;
        let q2q2 = q2 * q2;
        let q2q3 = q2 * q3;
        let q3q3 = q3 * q3;

        // Reference direction of Earth's magnetic field
        let hx = mx * q0q0 - two_q0my * q3 + two_q0mz * q2 + mx * q1q1 + two_q1 * my * q2
            + two_q1 * mz * q3
            - mx * q2q2
            - mx * q3q3;
        let hy = two_q0mx * q3 + my * q0q0 - two_q0mz * q1 + two_q1mx * q2 - my * q1q1
            + my * q2q2
            + two_q2 * mz * q3
            - my * q3q3;
        let two_bx = (hx * hx + hy * hy).sqrt();
        let two_bz = -two_q0mx * q2 + two_q0my * q1 + mz * q0q0 + two_q1mx * q3 - mz * q1q1
            + two_q2 * my * q3
            - mz * q2q2
            + mz * q3q3;
        let four_bx = 2.0 * two_bx;
        let four_bz = 2.0 * two_bz;

        // Residuals of predicted gravity and field against the measurements
        let f_ax = 2.0 * q1q3 - two_q0q2 - ax;
        let f_ay = 2.0 * q0q1 + two_q2q3 - ay;
        let f_az = 1.0 - 2.0 * q1q1 - 2.0 * q2q2 - az;
        let f_mx = two_bx * (0.5 - q2q2 - q3q3) + two_bz * (q1q3 - q0q2) - mx;
        let f_my = two_bx * (q1q2 - q0q3) + two_bz * (q0q1 + q2q3) - my;
        let f_mz = two_bx * (q0q2 + q1q3) + two_bz * (0.5 - q1q1 - q2q2) - mz;

        let s0 = -two_q2 * f_ax + two_q1 * f_ay - two_bz * q2 * f_mx
            + (-two_bx * q3 + two_bz * q1) * f_my
            + two_bx * q2 * f_mz;
        let s1 = two_q3 * f_ax + two_q0 * f_ay - 4.0 * q1 * f_az
            + two_bz * q3 * f_mx
            + (two_bx * q2 + two_bz * q0) * f_my
            + (two_bx * q3 - four_bz * q1) * f_mz;
        let s2 = -two_q0 * f_ax + two_q3 * f_ay - 4.0 * q2 * f_az
            + (-four_bx * q2 - two_bz * q0) * f_mx
            + (two_bx * q1 + two_bz * q3) * f_my
            + (two_bx * q0 - four_bz * q2) * f_mz;
        let s3 = two_q1 * f_ax
            + two_q2 * f_ay
            + (-four_bx * q3 + two_bz * q1) * f_mx
            + (-two_bx * q0 + two_bz * q2) * f_my
            + two_bx * q1 * f_mz;

        normalise_step(s0, s1, s2, s3)
    }

    /// Normalised objective-function gradient for the accelerometer alone
    fn imu_gradient(&self, a: Vector3<f32>) -> Option<Quaternion<f32>> {
        let q = self.quaternion.as_ref();
        let (q0, q1, q2, q3) = (q.w, q.i, q.j, q.k);
        let (ax, ay, az) = (a.x, a.y, a.z);

        let two_q0 = 2.0 * q0;
        let two_q1 = 2.0 * q1;
        let two_q2 = 2.0 * q2;
        let two_q3 = 2.0 * q3;
        let four_q0 = 4.0 * q0;
        let four_q1 = 4.0 * q1;
        let four_q2 = 4.0 * q2;
        let eight_q1 = 8.0 * q1;
        let eight_q2 = 8.0 * q2;
        let q0q0 = q0 * q0;
        let q1q1 = q1 * q1;
        let q2q2 = q2 * q2;
        let q3q3 = q3 * q3;

        let s0 = four_q0 * q2q2 + two_q2 * ax + four_q0 * q1q1 - two_q1 * ay;
        let s1 = four_q1 * q3q3 - two_q3 * ax + 4.0 * q0q0 * q1 - two_q0 * ay - four_q1
            + eight_q1 * q1q1
            + eight_q1 * q2q2
            + four_q1 * az;
        let s2 = 4.0 * q0q0 * q2 + two_q0 * ax + four_q2 * q3q3 - two_q3 * ay - four_q2
            + eight_q2 * q1q1
            + eight_q2 * q2q2
            + four_q2 * az;
        let s3 = 4.0 * q1q1 * q3 - two_q1 * ax + 4.0 * q2q2 * q3 - two_q2 * ay;

        normalise_step(s0, s1, s2, s3)
    }

    /// Integrate the quaternion derivative and renormalise
    fn integrate(&mut self, q_dot: Quaternion<f32>, delta_time: f32) {
        let q = self.quaternion.as_ref() + q_dot * delta_time;
        let (w, x, y, z) = (q.w, q.i, q.j, q.k);

        // A zero-norm result can only come from non-finite input; keep the
        // previous orientation rather than storing NaN.
        if let Some(recip_norm) = inv_sqrt(w * w + x * x + y * y + z * z) {
            self.quaternion = UnitQuaternion::new_unchecked(q * recip_norm);
        }
    }
}

/// Scale the gradient to unit length; `None` when it vanishes.
fn normalise_step(s0: f32, s1: f32, s2: f32, s3: f32) -> Option<Quaternion<f32>> {
    inv_sqrt(s0 * s0 + s1 * s1 + s2 * s2 + s3 * s3)
        .map(|recip_norm| Quaternion::new(s0, s1, s2, s3) * recip_norm)
}

impl Default for Madgwick {
    fn default() -> Self {
        Self::new()
    }
}

impl AttitudeEstimator for Madgwick {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::Madgwick
    }

    fn update(&mut self, sample: &InertialSample) -> Orientation {
        let delta_time = self.clock.tick();
        self.update_with_dt(sample, delta_time)
    }

    fn update_with_dt(&mut self, sample: &InertialSample, delta_time: f32) -> Orientation {
        self.update_marg(sample.gyro, sample.acc, sample.mag, delta_time);
        self.orientation()
    }

    fn orientation(&self) -> Orientation {
        let q = self.quaternion.as_ref();
        Orientation::Quaternion(QuaternionOrientation {
            w: q.w,
            x: q.i,
            y: q.j,
            z: q.k,
        })
    }

    fn reset(&mut self) {
        self.quaternion = UnitQuaternion::identity();
        self.clock = StepClock::new();
    }
}

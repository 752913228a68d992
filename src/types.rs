//! Core types shared by the codec, the link supervisor and the estimators

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Number of readings carried by one IMU bundle.
pub const READINGS_PER_SAMPLE: usize = 9;

/// One inertial/magnetic triad assembled from a single bundle
///
/// Readings arrive in the fixed order `acc.x, acc.y, acc.z, mag.x, mag.y,
/// mag.z, gyro.x, gyro.y, gyro.z`. Acceleration is expected in g (the
/// orchestrator divides raw m/s² readings by the configured divisor), angular
/// rate in rad/s and the magnetic field in any consistent unit.
///
/// # Example
/// ```
/// use osc_attitude::InertialSample;
///
/// let sample = InertialSample::from_readings([0.0, 0.0, 1.0, 0.3, 0.0, -0.5, 0.0, 0.0, 0.1]);
/// assert_eq!(sample.acc.z, 1.0);
/// assert_eq!(sample.mag.x, 0.3);
/// assert_eq!(sample.gyro.z, 0.1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InertialSample {
    /// Accelerometer reading
    pub acc: Vector3<f32>,
    /// Gyroscope reading in rad/s
    pub gyro: Vector3<f32>,
    /// Magnetometer reading
    pub mag: Vector3<f32>,
}

impl InertialSample {
    pub fn new(acc: Vector3<f32>, gyro: Vector3<f32>, mag: Vector3<f32>) -> Self {
        Self { acc, gyro, mag }
    }

    /// Build a sample from nine readings in wire order (acc, mag, gyro).
    pub fn from_readings(r: [f32; READINGS_PER_SAMPLE]) -> Self {
        Self {
            acc: Vector3::new(r[0], r[1], r[2]),
            mag: Vector3::new(r[3], r[4], r[5]),
            gyro: Vector3::new(r[6], r[7], r[8]),
        }
    }
}

/// Unit quaternion orientation as published to consumers (`{w, x, y, z}`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuaternionOrientation {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl QuaternionOrientation {
    pub fn norm(&self) -> f32 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Independently filtered Euler angles in radians
///
/// `angle_x` tracks pitch, `angle_y` roll and `angle_z` yaw.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EulerAngles {
    pub angle_x: f32,
    pub angle_y: f32,
    pub angle_z: f32,
}

/// Aerospace roll/pitch/yaw derived from a quaternion, in radians
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AttitudeAngles {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

/// Output of one estimator step
///
/// Serialises to the bare payload shape (`{w,x,y,z}` or
/// `{angleX,angleY,angleZ}`) so consumers don't need to know which estimator
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Orientation {
    Quaternion(QuaternionOrientation),
    Euler(EulerAngles),
}

impl Orientation {
    /// Whether every component is finite.
    pub fn is_finite(&self) -> bool {
        match self {
            Orientation::Quaternion(q) => [q.w, q.x, q.y, q.z].iter().all(|v| v.is_finite()),
            Orientation::Euler(e) => [e.angle_x, e.angle_y, e.angle_z]
                .iter()
                .all(|v| v.is_finite()),
        }
    }
}

/// Rotary encoder channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EncoderChannel {
    /// `/encA`, drives the alidade
    A,
    /// `/encB`, drives the rete
    B,
}

impl EncoderChannel {
    pub fn from_address(address: &str) -> Option<Self> {
        match address {
            "/encA" => Some(EncoderChannel::A),
            "/encB" => Some(EncoderChannel::B),
            _ => None,
        }
    }
}

/// Raw encoder reading, passed through unmodified
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderEvent {
    pub channel: EncoderChannel,
    pub raw_value: f32,
}

/// Liveness of the sensor feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// No datagram decoded yet since start
    #[default]
    Waiting,
    /// Data decoded within the last timeout interval
    Alive,
    /// A full timeout interval elapsed without a successful decode
    TimedOut,
}

/// Which attitude estimator a session runs
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    /// Quaternion gradient-descent AHRS
    #[default]
    Madgwick,
    /// Euler-angle complementary filter
    Complementary,
}

/// Heading source for the complementary filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YawMode {
    /// `atan2(mag.y, mag.x)` with no tilt correction
    Magnetic,
    /// Magnetometer rotated into the level frame using accelerometer pitch/roll
    #[default]
    TiltCompensated,
}

/// Fusion settings
///
/// Tuning constants for both estimators; only the fields relevant to the
/// selected `filter` are read.
///
/// # Example
/// ```
/// use osc_attitude::{EstimatorKind, FusionSettings};
///
/// let settings = FusionSettings {
///     filter: EstimatorKind::Complementary,
///     alpha: 0.95,
///     ..Default::default()
/// };
/// assert_eq!(settings.beta, 0.06);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionSettings {
    /// Estimator selection
    pub filter: EstimatorKind,
    /// Gradient-descent step weight for the quaternion AHRS (typically 0.06)
    pub beta: f32,
    /// Gyroscope weight of the complementary blend (typically 0.98)
    pub alpha: f32,
    /// Time step substituted when the measured one is non-positive or above
    /// `max_dt`, in seconds
    pub fallback_dt: f32,
    /// Largest measured time step accepted by the complementary filter, in
    /// seconds
    pub max_dt: f32,
    /// Heading source for the complementary filter
    pub yaw: YawMode,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            filter: EstimatorKind::default(),
            beta: 0.06,
            alpha: 0.98,
            fallback_dt: 0.01,
            max_dt: 1.0,
            yaw: YawMode::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_readings_order() {
        let sample = InertialSample::from_readings([1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(sample.acc, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(sample.mag, Vector3::new(4.0, 5.0, 6.0));
        assert_eq!(sample.gyro, Vector3::new(7.0, 8.0, 9.0));
    }

    #[test]
    fn test_orientation_serialises_bare_payload() {
        let euler = Orientation::Euler(EulerAngles {
            angle_x: 0.5,
            angle_y: 0.0,
            angle_z: -1.0,
        });
        let json = serde_json::to_string(&euler).unwrap();
        assert_eq!(json, r#"{"angleX":0.5,"angleY":0.0,"angleZ":-1.0}"#);

        let quat = Orientation::Quaternion(QuaternionOrientation {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        });
        let json = serde_json::to_string(&quat).unwrap();
        assert_eq!(json, r#"{"w":1.0,"x":0.0,"y":0.0,"z":0.0}"#);
    }

    #[test]
    fn test_encoder_channel_from_address() {
        assert_eq!(EncoderChannel::from_address("/encA"), Some(EncoderChannel::A));
        assert_eq!(EncoderChannel::from_address("/encB"), Some(EncoderChannel::B));
        assert_eq!(EncoderChannel::from_address("/reset"), None);
    }

    #[test]
    fn test_fusion_settings_deserialise_partial() {
        let settings: FusionSettings = toml::from_str(
            r#"
            filter = "complementary"
            yaw = "magnetic"
            "#,
        )
        .unwrap();
        assert_eq!(settings.filter, EstimatorKind::Complementary);
        assert_eq!(settings.yaw, YawMode::Magnetic);
        assert_eq!(settings.alpha, 0.98);
    }
}

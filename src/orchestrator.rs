//! Glue between the link supervisor, the estimator and the presentation layer
//!
//! Every valid IMU bundle updates the estimator; fused output is forwarded at
//! most once per display interval. Encoder and reset messages pass straight
//! through. Link status changes become `ctrlMsg` records.
//!
//! Outbound events go one way, into a crossbeam channel; nothing the consumer
//! does feeds back into the fusion.

use std::f32::consts::TAU;
use std::future::Future;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use serde::Serialize;

use crate::codec::{OscBundle, OscMessage, OscPacket};
use crate::error::ShapeError;
use crate::estimator::AttitudeEstimator;
use crate::link::{LinkEvent, LinkSupervisor};
use crate::types::{
    EncoderChannel, EncoderEvent, InertialSample, Orientation, READINGS_PER_SAMPLE,
};

/// Text published when data resumes after a timeout.
pub const RECOVERED_MESSAGE: &str = "Receiving new data from the sensors.";

/// Orchestrator tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorSettings {
    /// Raw accelerometer readings are divided by this before fusion (9.81
    /// turns m/s² into g; 1.0 passes readings through)
    pub accelerometer_divisor: f32,
    /// Minimum spacing of published rotation updates
    pub display_interval: Duration,
    /// Encoder ticks per full turn of the alidade/rete
    pub encoder_ticks_per_turn: f32,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            accelerometer_divisor: 9.81,
            display_interval: Duration::from_millis(33),
            encoder_ticks_per_turn: 30.0,
        }
    }
}

/// Severity of a status record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlLevel {
    Success,
    Warning,
    Danger,
}

/// Link status record (`{type, msg}`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlMessage {
    #[serde(rename = "type")]
    pub level: ControlLevel,
    pub msg: String,
}

impl ControlMessage {
    pub fn new(level: ControlLevel, msg: impl Into<String>) -> Self {
        Self {
            level,
            msg: msg.into(),
        }
    }
}

/// Event pushed to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundEvent {
    #[serde(rename = "rotation:data")]
    Rotation(Orientation),
    /// Encoder A angle in radians
    #[serde(rename = "alidade:data")]
    Alidade(f32),
    /// Encoder B angle in radians
    #[serde(rename = "rete:data")]
    Rete(f32),
    #[serde(rename = "reset")]
    Reset,
    #[serde(rename = "ctrlMsg")]
    Control(ControlMessage),
}

/// Meaning of a single (non-bundle) message
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RigMessage {
    Encoder(EncoderEvent),
    Reset,
    Unknown,
}

impl RigMessage {
    /// Classify by address; encoder values are passed through unscaled.
    pub fn classify(msg: &OscMessage) -> Result<Self, ShapeError> {
        if let Some(channel) = EncoderChannel::from_address(&msg.address) {
            let raw_value = msg
                .args
                .first()
                .ok_or(ShapeError::MissingArgument { index: 0 })?
                .as_f32()
                .ok_or(ShapeError::NonNumericArgument { index: 0 })?;
            return Ok(RigMessage::Encoder(EncoderEvent { channel, raw_value }));
        }
        match msg.address.as_str() {
            "/reset" => Ok(RigMessage::Reset),
            _ => Ok(RigMessage::Unknown),
        }
    }
}

/// Build a sample from an IMU bundle
///
/// The bundle must carry exactly nine messages (acc, mag, gyro, x/y/z each)
/// whose first argument is numeric. Accelerometer readings are divided by
/// `accelerometer_divisor`.
pub fn sample_from_bundle(
    bundle: &OscBundle,
    accelerometer_divisor: f32,
) -> Result<InertialSample, ShapeError> {
    if bundle.content.len() != READINGS_PER_SAMPLE {
        return Err(ShapeError::WrongElementCount {
            expected: READINGS_PER_SAMPLE,
            actual: bundle.content.len(),
        });
    }

    let mut readings = [0.0f32; READINGS_PER_SAMPLE];
    for (index, (packet, slot)) in bundle.content.iter().zip(readings.iter_mut()).enumerate() {
        let OscPacket::Message(msg) = packet else {
            return Err(ShapeError::MissingArgument { index });
        };
        *slot = msg
            .args
            .first()
            .ok_or(ShapeError::MissingArgument { index })?
            .as_f32()
            .ok_or(ShapeError::NonNumericArgument { index })?;
    }

    let mut sample = InertialSample::from_readings(readings);
    sample.acc /= accelerometer_divisor;
    Ok(sample)
}

/// Encoder ticks to radians, wrapped to one turn
///
/// `-(raw mod ticks) · 2π / ticks`; the sign follows the rig's mounting.
pub fn encoder_radians(raw_value: f32, ticks_per_turn: f32) -> f32 {
    -(raw_value % ticks_per_turn) * (TAU / ticks_per_turn)
}

/// Minimum-spacing gate for published output
#[derive(Debug, Clone, Copy)]
struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Owns the estimator for one session and forwards results
pub struct Orchestrator {
    settings: OrchestratorSettings,
    estimator: Box<dyn AttitudeEstimator>,
    throttle: Throttle,
    sink: Sender<OutboundEvent>,
}

impl Orchestrator {
    pub fn new(
        settings: OrchestratorSettings,
        estimator: Box<dyn AttitudeEstimator>,
        sink: Sender<OutboundEvent>,
    ) -> Self {
        Self {
            settings,
            throttle: Throttle::new(settings.display_interval),
            estimator,
            sink,
        }
    }

    pub fn estimator(&self) -> &dyn AttitudeEstimator {
        self.estimator.as_ref()
    }

    /// Pull events from `link` until `shutdown` resolves or the link closes.
    pub async fn run<F: Future<Output = ()>>(&mut self, link: &mut LinkSupervisor, shutdown: F) {
        tokio::pin!(shutdown);
        loop {
            let next = {
                tokio::select! {
                    _ = &mut shutdown => None,
                    event = link.next_event() => event,
                }
            };
            let Some(event) = next else {
                break;
            };
            self.handle(event, Instant::now());
        }
        link.close();
    }

    /// React to one supervisor notification observed at `now`.
    pub fn handle(&mut self, event: LinkEvent, now: Instant) {
        match event {
            LinkEvent::Bundle(bundle) => {
                if let Err(err) = self.handle_bundle(&bundle, now) {
                    log::warn!("Illegal IMU bundle: {}", err);
                    self.publish(OutboundEvent::Control(ControlMessage::new(
                        ControlLevel::Warning,
                        format!("corrupted IMU message: {err}"),
                    )));
                }
            }
            LinkEvent::Message(message) => {
                if let Err(err) = self.handle_message(&message) {
                    log::warn!("Illegal {} message: {}", message.address, err);
                    self.publish(OutboundEvent::Control(ControlMessage::new(
                        ControlLevel::Warning,
                        format!("corrupted encoder message: {err}"),
                    )));
                }
            }
            LinkEvent::TimedOut(msg) => {
                self.publish(OutboundEvent::Control(ControlMessage::new(
                    ControlLevel::Danger,
                    msg,
                )));
            }
            LinkEvent::Recovered => {
                self.publish(OutboundEvent::Control(ControlMessage::new(
                    ControlLevel::Success,
                    RECOVERED_MESSAGE,
                )));
            }
            LinkEvent::DecodeFailed(failure) => {
                self.publish(OutboundEvent::Control(ControlMessage::new(
                    ControlLevel::Warning,
                    failure.to_string(),
                )));
            }
        }
    }

    /// Validate, fuse, and publish if the display interval has elapsed.
    ///
    /// The estimator runs on every valid bundle regardless of throttling.
    pub fn handle_bundle(&mut self, bundle: &OscBundle, now: Instant) -> Result<(), ShapeError> {
        let sample = sample_from_bundle(bundle, self.settings.accelerometer_divisor)?;
        let orientation = self.estimator.update(&sample);
        if self.throttle.ready(now) {
            self.publish(OutboundEvent::Rotation(orientation));
        }
        Ok(())
    }

    pub fn handle_message(&mut self, message: &OscMessage) -> Result<(), ShapeError> {
        match RigMessage::classify(message)? {
            RigMessage::Encoder(EncoderEvent { channel, raw_value }) => {
                let angle = encoder_radians(raw_value, self.settings.encoder_ticks_per_turn);
                self.publish(match channel {
                    EncoderChannel::A => OutboundEvent::Alidade(angle),
                    EncoderChannel::B => OutboundEvent::Rete(angle),
                });
            }
            RigMessage::Reset => self.publish(OutboundEvent::Reset),
            RigMessage::Unknown => log::debug!("Ignoring OSC address {}", message.address),
        }
        Ok(())
    }

    fn publish(&self, event: OutboundEvent) {
        if self.sink.send(event).is_err() {
            log::debug!("Presentation channel closed, dropping event");
        }
    }
}

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use nalgebra::Vector3;
use osc_attitude::codec::{self, OscBundle, OscMessage, OscPacket, OscTime, OscType};
use osc_attitude::orchestrator::sample_from_bundle;
use osc_attitude::{AttitudeEstimator, Complementary, InertialSample, Madgwick};
use rand::prelude::*;
use rand_pcg::Pcg64;
use std::f32::consts::PI;

// Pre-generated sensor data to eliminate RNG overhead during benchmarks
struct PreGeneratedData {
    samples: Vec<InertialSample>,
    index: usize,
}

impl PreGeneratedData {
    fn new(count: usize, seed: u64) -> Self {
        let mut rng = Pcg64::seed_from_u64(seed);
        let mut samples = Vec::with_capacity(count);

        for i in 0..count {
            let time = i as f32 * 0.01; // 100Hz sample rate
            let motion_phase = time * 0.5 * 2.0 * PI;

            let gyroscope = Vector3::new(
                0.2 * motion_phase.sin() + rng.random_range(-0.01..0.01),
                0.2 * (motion_phase * 1.3).cos() + rng.random_range(-0.01..0.01),
                0.2 * (motion_phase * 0.7).sin() + rng.random_range(-0.01..0.01),
            );

            let accelerometer = Vector3::new(
                -0.1 * motion_phase.sin() + rng.random_range(-0.002..0.002),
                0.1 * motion_phase.cos() + rng.random_range(-0.002..0.002),
                1.0 + rng.random_range(-0.002..0.002),
            );

            let magnetometer = Vector3::new(
                0.3 + 0.05 * motion_phase.cos() + rng.random_range(-0.05..0.05),
                0.05 * motion_phase.sin() + rng.random_range(-0.05..0.05),
                -0.4 + rng.random_range(-0.05..0.05),
            );

            samples.push(InertialSample::new(accelerometer, gyroscope, magnetometer));
        }

        Self { samples, index: 0 }
    }

    fn next(&mut self) -> InertialSample {
        let sample = self.samples[self.index];
        self.index = (self.index + 1) % self.samples.len();
        sample
    }
}

/// One rig datagram: nine float messages in a bundle
fn rig_datagram(sample: &InertialSample) -> Vec<u8> {
    let readings = [
        sample.acc.x,
        sample.acc.y,
        sample.acc.z,
        sample.mag.x,
        sample.mag.y,
        sample.mag.z,
        sample.gyro.x,
        sample.gyro.y,
        sample.gyro.z,
    ];
    codec::encode(&OscPacket::Bundle(OscBundle {
        timetag: OscTime::IMMEDIATE,
        content: readings
            .iter()
            .map(|&v| OscPacket::Message(OscMessage::new("/imu", vec![OscType::Float(v)])))
            .collect(),
    }))
}

fn bench_madgwick_update(c: &mut Criterion) {
    let mut filter = Madgwick::new();
    let mut data = PreGeneratedData::new(1000, 42);

    c.bench_function("madgwick_update_marg", |b| {
        b.iter(|| {
            let sample = data.next();
            filter.update_with_dt(black_box(&sample), black_box(0.01))
        })
    });
}

/// Zero magnetometer takes the 6-DOF path
fn bench_madgwick_update_imu(c: &mut Criterion) {
    let mut filter = Madgwick::new();
    let mut data = PreGeneratedData::new(1000, 43);

    c.bench_function("madgwick_update_imu", |b| {
        b.iter(|| {
            let mut sample = data.next();
            sample.mag = Vector3::zeros();
            filter.update_with_dt(black_box(&sample), black_box(0.01))
        })
    });
}

fn bench_complementary_update(c: &mut Criterion) {
    let mut filter = Complementary::new();
    let mut data = PreGeneratedData::new(1000, 44);

    c.bench_function("complementary_update", |b| {
        b.iter(|| {
            let sample = data.next();
            filter.update_with_dt(black_box(&sample), black_box(0.01))
        })
    });
}

/// Benchmark batch processing of one second of 100 Hz data
fn bench_batch_updates(c: &mut Criterion) {
    let mut filter = Madgwick::new();
    let mut data = PreGeneratedData::new(100, 45);

    c.bench_function("madgwick_batch_100_updates", |b| {
        b.iter(|| {
            for _ in 0..100 {
                let sample = data.next();
                filter.update_with_dt(black_box(&sample), black_box(0.01));
            }
        })
    });
}

fn bench_euler_angles(c: &mut Criterion) {
    let mut filter = Madgwick::new();
    let mut data = PreGeneratedData::new(100, 46);
    for _ in 0..100 {
        filter.update_with_dt(&data.next(), 0.01);
    }

    c.bench_function("madgwick_euler_angles", |b| {
        b.iter(|| black_box(filter.euler_angles()))
    });
}

/// Decode plus shape check, the per-datagram cost ahead of the estimator
fn bench_decode_bundle(c: &mut Criterion) {
    let mut data = PreGeneratedData::new(1, 47);
    let datagram = rig_datagram(&data.next());

    c.bench_function("decode_rig_bundle", |b| {
        b.iter(|| {
            let Ok(OscPacket::Bundle(bundle)) = codec::decode(black_box(&datagram)) else {
                unreachable!()
            };
            sample_from_bundle(&bundle, 9.81)
        })
    });
}

criterion_group!(
    benches,
    bench_madgwick_update,
    bench_madgwick_update_imu,
    bench_complementary_update,
    bench_batch_updates,
    bench_euler_angles,
    bench_decode_bundle
);

criterion_main!(benches);

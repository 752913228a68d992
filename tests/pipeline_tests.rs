use std::f32::consts::FRAC_PI_2;
use std::net::{Ipv4Addr, UdpSocket};
use std::time::Duration;

use osc_attitude::codec::{self, OscBundle, OscMessage, OscPacket, OscTime, OscType};
use osc_attitude::orchestrator::{
    ControlLevel, ControlMessage, Orchestrator, OrchestratorSettings, OutboundEvent,
};
use osc_attitude::{
    EstimatorKind, FusionSettings, LinkSettings, LinkSupervisor, Orientation, estimator,
};

fn rig_bundle(readings: &[f32]) -> Vec<u8> {
    let names = ["/ax", "/ay", "/az", "/mx", "/my", "/mz", "/gx", "/gy", "/gz"];
    let content = readings
        .iter()
        .zip(names.iter().cycle())
        .map(|(&v, name)| OscPacket::Message(OscMessage::new(*name, vec![OscType::Float(v)])))
        .collect();
    codec::encode(&OscPacket::Bundle(OscBundle {
        timetag: OscTime::IMMEDIATE,
        content,
    }))
}

fn message(address: &str, args: Vec<OscType>) -> Vec<u8> {
    codec::encode(&OscPacket::Message(OscMessage::new(address, args)))
}

async fn run_session(filter: EstimatorKind, datagrams: Vec<Vec<u8>>) -> Vec<OutboundEvent> {
    let mut link = LinkSupervisor::new(LinkSettings {
        local_address: Ipv4Addr::LOCALHOST,
        port: 0,
        multicast_group: None,
        timeout: Duration::from_secs(5),
        ..Default::default()
    });
    link.init().await.unwrap();

    let target = link.local_addr().unwrap();
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    for datagram in &datagrams {
        socket.send_to(datagram, target).unwrap();
    }

    let (tx, rx) = crossbeam_channel::unbounded();
    let settings = FusionSettings {
        filter,
        ..Default::default()
    };
    let mut orchestrator = Orchestrator::new(
        OrchestratorSettings::default(),
        estimator::build(&settings),
        tx,
    );
    orchestrator
        .run(&mut link, tokio::time::sleep(Duration::from_millis(300)))
        .await;
    assert!(!link.is_open());

    drop(orchestrator);
    rx.into_iter().collect()
}

#[tokio::test]
async fn test_rig_session_end_to_end() {
    let level = [0.0, 0.0, 9.81, 0.3, 0.0, -0.4, 0.0, 0.0, 0.0];
    let events = run_session(
        EstimatorKind::Madgwick,
        vec![
            rig_bundle(&level),
            rig_bundle(&level),
            message("/encA", vec![OscType::Float(7.5)]),
            message("/reset", vec![]),
        ],
    )
    .await;

    // Both bundles arrive within one display interval
    let rotations: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            OutboundEvent::Rotation(Orientation::Quaternion(q)) => Some(*q),
            _ => None,
        })
        .collect();
    assert_eq!(rotations.len(), 1);
    assert!((rotations[0].norm() - 1.0).abs() < 1e-5);

    assert!(events.iter().any(
        |e| matches!(e, OutboundEvent::Alidade(a) if (a + FRAC_PI_2).abs() < 1e-6)
    ));
    assert!(events.contains(&OutboundEvent::Reset));
    assert!(!events.iter().any(|e| matches!(e, OutboundEvent::Control(_))));
}

#[tokio::test]
async fn test_malformed_bundles_become_warnings() {
    let events = run_session(
        EstimatorKind::Complementary,
        vec![
            rig_bundle(&[0.0; 8]),
            rig_bundle(&[0.0; 10]),
            b"#bundle\0\0\0\0\0".to_vec(),
            message("/encB", vec![OscType::Float(15.0)]),
        ],
    )
    .await;

    let warnings: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            OutboundEvent::Control(ControlMessage { level, msg }) => {
                assert_eq!(*level, ControlLevel::Warning);
                Some(msg.clone())
            }
            _ => None,
        })
        .collect();
    assert_eq!(warnings.len(), 3);
    assert!(warnings.iter().all(|m| m.starts_with("corrupted IMU message")));

    assert!(!events.iter().any(|e| matches!(e, OutboundEvent::Rotation(_))));
    // The receive loop kept going after the bad bundles
    assert!(events.iter().any(|e| matches!(e, OutboundEvent::Rete(_))));
}

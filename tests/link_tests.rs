use std::cell::RefCell;
use std::net::{Ipv4Addr, UdpSocket};
use std::rc::Rc;
use std::time::Duration;

use osc_attitude::codec::{self, OscBundle, OscMessage, OscPacket, OscTime, OscType};
use osc_attitude::link::DecodeFailure;
use osc_attitude::{Handler, LinkEvent, LinkSettings, LinkState, LinkSupervisor};

/// Generous upper bound for events that should arrive promptly
const PATIENCE: Duration = Duration::from_secs(2);

fn loopback(timeout: Duration) -> LinkSupervisor {
    LinkSupervisor::new(LinkSettings {
        local_address: Ipv4Addr::LOCALHOST,
        port: 0,
        multicast_group: None,
        timeout,
        ..Default::default()
    })
}

fn sender(link: &LinkSupervisor) -> impl Fn(&[u8]) + use<> {
    let target = link.local_addr().expect("link is open");
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind sender");
    move |bytes: &[u8]| {
        socket.send_to(bytes, target).expect("send datagram");
    }
}

fn imu_bundle() -> Vec<u8> {
    let content = (0..9)
        .map(|i| OscPacket::Message(OscMessage::new("/imu", vec![OscType::Float(i as f32)])))
        .collect();
    codec::encode(&OscPacket::Bundle(OscBundle {
        timetag: OscTime::IMMEDIATE,
        content,
    }))
}

async fn next(link: &mut LinkSupervisor) -> LinkEvent {
    tokio::time::timeout(PATIENCE, link.next_event())
        .await
        .expect("event within patience")
        .expect("link still open")
}

#[tokio::test]
async fn test_timeout_then_recovery() {
    let mut link = loopback(Duration::from_millis(200));
    link.init().await.unwrap();
    let send = sender(&link);
    assert_eq!(link.state(), LinkState::Waiting);

    assert_eq!(
        next(&mut link).await,
        LinkEvent::TimedOut("No data coming from the network")
    );
    assert_eq!(link.state(), LinkState::TimedOut);

    send(&imu_bundle());
    assert_eq!(next(&mut link).await, LinkEvent::Recovered);
    assert!(matches!(next(&mut link).await, LinkEvent::Bundle(b) if b.content.len() == 9));
    assert_eq!(link.state(), LinkState::Alive);

    // Well inside the fresh interval: nothing pending
    let quiet = tokio::time::timeout(Duration::from_millis(80), link.next_event()).await;
    assert!(quiet.is_err());

    // Another full interval of silence times out again
    assert!(matches!(next(&mut link).await, LinkEvent::TimedOut(_)));
}

#[tokio::test]
async fn test_first_packet_is_not_a_recovery() {
    let mut link = loopback(Duration::from_secs(5));
    link.init().await.unwrap();
    let send = sender(&link);

    send(&imu_bundle());
    assert!(matches!(next(&mut link).await, LinkEvent::Bundle(_)));
    assert_eq!(link.state(), LinkState::Alive);
}

#[tokio::test]
async fn test_corrupted_packets_do_not_stop_the_loop() {
    let mut link = loopback(Duration::from_secs(5));
    link.init().await.unwrap();
    let send = sender(&link);

    let mut corrupted = imu_bundle();
    corrupted.truncate(corrupted.len() - 4);
    send(&corrupted);
    send(b"/enc");
    send(&imu_bundle());

    assert_eq!(
        next(&mut link).await,
        LinkEvent::DecodeFailed(DecodeFailure::Imu)
    );
    assert_eq!(
        next(&mut link).await,
        LinkEvent::DecodeFailed(DecodeFailure::Encoder)
    );
    // Failures do not feed the watchdog
    assert_eq!(link.state(), LinkState::Waiting);
    assert!(matches!(next(&mut link).await, LinkEvent::Bundle(_)));
}

#[tokio::test]
async fn test_encoder_value_passes_through() {
    let mut link = loopback(Duration::from_secs(5));
    link.init().await.unwrap();
    let send = sender(&link);

    send(&codec::encode(&OscPacket::Message(OscMessage::new(
        "/encA",
        vec![OscType::Float(12.0)],
    ))));

    let LinkEvent::Message(msg) = next(&mut link).await else {
        panic!("expected a message");
    };
    assert_eq!(msg.address, "/encA");
    assert_eq!(msg.args, vec![OscType::Float(12.0)]);
}

#[tokio::test]
async fn test_run_until_dispatches_to_handlers() {
    let mut link = loopback(Duration::from_secs(5));
    link.init().await.unwrap();
    let send = sender(&link);

    let bundles = Rc::new(RefCell::new(0));
    let addresses = Rc::new(RefCell::new(Vec::new()));
    let failures = Rc::new(RefCell::new(Vec::new()));
    let timeouts = Rc::new(RefCell::new(0));

    let sink = Rc::clone(&bundles);
    link.on(Handler::Bundle(Box::new(move |_| {
        *sink.borrow_mut() += 1;
        Ok(())
    })));
    let sink = Rc::clone(&addresses);
    link.on(Handler::Message(Box::new(move |msg| {
        sink.borrow_mut().push(msg.address.clone());
        Ok(())
    })));
    let sink = Rc::clone(&failures);
    link.on(Handler::DecodeFailed(Box::new(move |f| sink.borrow_mut().push(f))));
    let sink = Rc::clone(&timeouts);
    link.on(Handler::TimedOut(Box::new(move |_| *sink.borrow_mut() += 1)));

    send(&imu_bundle());
    send(b"junk");
    send(&codec::encode(&OscPacket::Message(OscMessage::new(
        "/encB",
        vec![OscType::Int(3)],
    ))));
    send(&codec::encode(&OscPacket::Message(OscMessage::new("/reset", vec![]))));

    link.run_until(tokio::time::sleep(Duration::from_millis(300)))
        .await;

    assert!(!link.is_open());
    assert_eq!(*bundles.borrow(), 1);
    assert_eq!(*addresses.borrow(), vec!["/encB".to_string(), "/reset".to_string()]);
    assert_eq!(*failures.borrow(), vec![DecodeFailure::Encoder]);
    assert_eq!(*timeouts.borrow(), 0);
    assert!(link.next_event().await.is_none());
}

#[tokio::test]
async fn test_bind_conflict_is_reported() {
    let holder = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = holder.local_addr().unwrap().port();

    let mut link = LinkSupervisor::new(LinkSettings {
        local_address: Ipv4Addr::LOCALHOST,
        port,
        multicast_group: None,
        ..Default::default()
    });

    let err = link.init().await.unwrap_err();
    assert!(matches!(err, osc_attitude::LinkError::Bind { .. }));
    assert!(!link.is_open());
}

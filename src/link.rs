//! UDP multicast link supervisor
//!
//! Receives OSC datagrams from the sensor rig and tracks liveness with a
//! [`Watchdog`]. Everything runs on one task: a single `select!` waits for
//! either the next datagram or the watchdog deadline, so decode, watchdog
//! update and dispatch of one datagram never interleave with another.
//!
//! Two ways to consume events:
//!
//! - pull: [`LinkSupervisor::next_event`] in the owner's own loop
//! - push: register callbacks with [`LinkSupervisor::on`] and drive them with
//!   [`LinkSupervisor::run_until`]
//!
//! # Example
//!
//! ```no_run
//! use osc_attitude::link::{Handler, LinkSettings, LinkSupervisor};
//!
//! # async fn demo() -> Result<(), osc_attitude::LinkError> {
//! let mut link = LinkSupervisor::new(LinkSettings::default());
//! link.on(Handler::TimedOut(Box::new(|msg| eprintln!("{msg}"))));
//! link.on(Handler::Bundle(Box::new(|bundle| {
//!     println!("{} readings", bundle.content.len());
//!     Ok(())
//! })));
//! link.init().await?;
//! link.run_until(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await;
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;

use crate::codec::{self, OscBundle, OscMessage, OscPacket, PacketKind};
use crate::error::LinkError;
use crate::types::LinkState;
use crate::watchdog::{DEFAULT_TIMEOUT, TIMEOUT_MESSAGE, Transition, Watchdog};

/// Default multicast group joined by the receiver.
pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 0, 1);

/// Default listen port.
pub const DEFAULT_PORT: u16 = 9999;

/// Maximum UDP datagram size (64KB for fragmented packets).
const MAX_DATAGRAM_SIZE: usize = 65536;

/// Socket and watchdog configuration
#[derive(Debug, Clone)]
pub struct LinkSettings {
    /// Interface address used for the multicast membership, or the unicast
    /// bind address when `multicast_group` is `None`
    pub local_address: Ipv4Addr,
    /// UDP port to listen on (0 picks an ephemeral port)
    pub port: u16,
    /// Multicast group to join; `None` receives plain unicast only
    pub multicast_group: Option<Ipv4Addr>,
    /// Silence interval before the link is declared lost
    pub timeout: Duration,
    /// Receive buffer size
    pub max_datagram_size: usize,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            local_address: Ipv4Addr::UNSPECIFIED,
            port: DEFAULT_PORT,
            multicast_group: Some(DEFAULT_MULTICAST_GROUP),
            timeout: DEFAULT_TIMEOUT,
            max_datagram_size: MAX_DATAGRAM_SIZE,
        }
    }
}

/// Which receive path a corrupted packet belonged to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeFailure {
    /// Bundle path (IMU readings)
    Imu,
    /// Single-message path (encoders, reset)
    Encoder,
}

impl From<PacketKind> for DecodeFailure {
    fn from(kind: PacketKind) -> Self {
        match kind {
            PacketKind::Bundle => DecodeFailure::Imu,
            PacketKind::Message => DecodeFailure::Encoder,
        }
    }
}

impl fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeFailure::Imu => f.write_str("corrupted IMU message"),
            DecodeFailure::Encoder => f.write_str("corrupted encoder message"),
        }
    }
}

/// Notification produced by the supervisor
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A bundle decoded; only its immediate children are carried
    Bundle(OscBundle),
    /// A single message decoded
    Message(OscMessage),
    /// A full timeout interval passed without a successful decode
    TimedOut(&'static str),
    /// Data decoded again after a timeout
    Recovered,
    /// A datagram failed to decode, or its handler rejected it
    DecodeFailed(DecodeFailure),
}

type HandlerResult = crate::error::Result<()>;

/// Callback registration, one slot per variant
///
/// Registering a variant again replaces the previous callback.
pub enum Handler {
    TimedOut(Box<dyn FnMut(&str)>),
    Recovered(Box<dyn FnMut()>),
    Bundle(Box<dyn FnMut(&OscBundle) -> HandlerResult>),
    Message(Box<dyn FnMut(&OscMessage) -> HandlerResult>),
    DecodeFailed(Box<dyn FnMut(DecodeFailure)>),
}

#[derive(Default)]
struct Handlers {
    timed_out: Option<Box<dyn FnMut(&str)>>,
    recovered: Option<Box<dyn FnMut()>>,
    bundle: Option<Box<dyn FnMut(&OscBundle) -> HandlerResult>>,
    message: Option<Box<dyn FnMut(&OscMessage) -> HandlerResult>>,
    decode_failed: Option<Box<dyn FnMut(DecodeFailure)>>,
}

/// What woke the receive loop
enum Wake {
    Datagram(std::io::Result<(usize, SocketAddr)>),
    Deadline,
}

/// Owns the socket and the watchdog for the lifetime of a session
pub struct LinkSupervisor {
    settings: LinkSettings,
    socket: Option<UdpSocket>,
    watchdog: Option<Watchdog>,
    pending: VecDeque<LinkEvent>,
    handlers: Handlers,
    buffer: Vec<u8>,
}

impl LinkSupervisor {
    pub fn new(settings: LinkSettings) -> Self {
        let buffer = vec![0u8; settings.max_datagram_size];
        Self {
            settings,
            socket: None,
            watchdog: None,
            pending: VecDeque::new(),
            handlers: Handlers::default(),
            buffer,
        }
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    /// Bind the socket, join the multicast group and arm the watchdog.
    ///
    /// Bind or membership failure is returned synchronously and leaves the
    /// supervisor closed. Calling `init` on an open supervisor is a no-op.
    pub async fn init(&mut self) -> Result<(), LinkError> {
        if self.socket.is_some() {
            return Ok(());
        }

        // Multicast traffic is only delivered to sockets bound to the wildcard
        // (or group) address; the interface is chosen by the membership.
        let bind_ip = match self.settings.multicast_group {
            Some(_) => Ipv4Addr::UNSPECIFIED,
            None => self.settings.local_address,
        };
        let addr = SocketAddr::from((bind_ip, self.settings.port));
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| LinkError::Bind { addr, source })?;

        if let Some(group) = self.settings.multicast_group {
            let interface = self.settings.local_address;
            socket
                .join_multicast_v4(group, interface)
                .map_err(|source| LinkError::Multicast {
                    group,
                    interface,
                    source,
                })?;
            log::info!("Joined multicast group {} on {}", group, interface);
        }

        log::info!("Listening for OSC on {}", socket.local_addr()?);

        self.watchdog = Some(Watchdog::new(self.settings.timeout, Instant::now()));
        self.socket = Some(socket);
        Ok(())
    }

    /// Release the socket and cancel the watchdog.
    ///
    /// Safe to call more than once. No event is produced afterwards.
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            log::info!("Link closed");
        }
        self.watchdog = None;
        self.pending.clear();
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Bound socket address, once initialised.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Current liveness; `Waiting` while closed.
    pub fn state(&self) -> LinkState {
        self.watchdog
            .as_ref()
            .map(Watchdog::state)
            .unwrap_or_default()
    }

    /// Register a callback, replacing any previous one for the same event.
    pub fn on(&mut self, handler: Handler) {
        match handler {
            Handler::TimedOut(f) => self.handlers.timed_out = Some(f),
            Handler::Recovered(f) => self.handlers.recovered = Some(f),
            Handler::Bundle(f) => self.handlers.bundle = Some(f),
            Handler::Message(f) => self.handlers.message = Some(f),
            Handler::DecodeFailed(f) => self.handlers.decode_failed = Some(f),
        }
    }

    /// Wait for the next notification.
    ///
    /// Returns `None` once the supervisor is closed (or was never
    /// initialised). Cancel safe: dropping the future loses no datagram and no
    /// watchdog transition.
    pub async fn next_event(&mut self) -> Option<LinkEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            let wake = {
                let (Some(socket), Some(watchdog)) = (self.socket.as_ref(), self.watchdog.as_ref())
                else {
                    return None;
                };
                let deadline = tokio::time::Instant::from_std(watchdog.deadline());
                tokio::select! {
                    received = socket.recv_from(&mut self.buffer) => Wake::Datagram(received),
                    _ = tokio::time::sleep_until(deadline) => Wake::Deadline,
                }
            };

            match wake {
                Wake::Datagram(Ok((len, src))) => self.on_datagram(len, src),
                Wake::Datagram(Err(e)) => log::warn!("UDP recv error: {}", e),
                Wake::Deadline => self.on_deadline(),
            }
        }
    }

    /// Dispatch events to the registered handlers until `shutdown` resolves,
    /// then close.
    pub async fn run_until<F: Future<Output = ()>>(&mut self, shutdown: F) {
        tokio::pin!(shutdown);
        loop {
            let next = {
                tokio::select! {
                    _ = &mut shutdown => None,
                    event = self.next_event() => event,
                }
            };
            let Some(event) = next else {
                break;
            };
            self.dispatch(event);
        }
        self.close();
    }

    fn on_datagram(&mut self, len: usize, src: SocketAddr) {
        let bytes = &self.buffer[..len];
        log::trace!("{} bytes from {}", len, src);

        match codec::decode(bytes) {
            Ok(packet) => {
                if let Some(watchdog) = self.watchdog.as_mut() {
                    if watchdog.feed(Instant::now()) == Some(Transition::Recovered) {
                        log::info!("Sensor data resumed");
                        self.pending.push_back(LinkEvent::Recovered);
                    }
                }
                self.pending.push_back(match packet {
                    OscPacket::Bundle(bundle) => LinkEvent::Bundle(bundle),
                    OscPacket::Message(message) => LinkEvent::Message(message),
                });
            }
            Err(err) => {
                let failure = DecodeFailure::from(codec::peek_kind(bytes));
                log::warn!("Received {} from {}: {}", failure, src, err);
                self.pending.push_back(LinkEvent::DecodeFailed(failure));
            }
        }
    }

    fn on_deadline(&mut self) {
        let Some(watchdog) = self.watchdog.as_mut() else {
            return;
        };
        if watchdog.expire(Instant::now()) == Some(Transition::TimedOut) {
            log::warn!("{} for {:?}", TIMEOUT_MESSAGE, watchdog.timeout());
            self.pending.push_back(LinkEvent::TimedOut(TIMEOUT_MESSAGE));
        }
    }

    fn dispatch(&mut self, event: LinkEvent) {
        let handlers = &mut self.handlers;
        let failure = match event {
            LinkEvent::Bundle(bundle) => handlers
                .bundle
                .as_mut()
                .and_then(|f| f(&bundle).err())
                .map(|err| {
                    log::warn!("Bundle handler rejected packet: {}", err);
                    DecodeFailure::Imu
                }),
            LinkEvent::Message(message) => handlers
                .message
                .as_mut()
                .and_then(|f| f(&message).err())
                .map(|err| {
                    log::warn!("Message handler rejected {}: {}", message.address, err);
                    DecodeFailure::Encoder
                }),
            LinkEvent::TimedOut(msg) => {
                if let Some(f) = handlers.timed_out.as_mut() {
                    f(msg);
                }
                None
            }
            LinkEvent::Recovered => {
                if let Some(f) = handlers.recovered.as_mut() {
                    f();
                }
                None
            }
            LinkEvent::DecodeFailed(failure) => Some(failure),
        };

        if let (Some(failure), Some(f)) = (failure, handlers.decode_failed.as_mut()) {
            f(failure);
        }
    }
}

impl Drop for LinkSupervisor {
    fn drop(&mut self) {
        self.close();
    }
}

//! Error types for osc-attitude

use std::net::{Ipv4Addr, SocketAddr};

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Malformed datagram, raised by the codec
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("empty packet")]
    Empty,

    #[error("truncated packet: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("packet length {0} is not a multiple of 4")]
    Misaligned(usize),

    #[error("invalid bundle element length: {0}")]
    BadLength(i32),

    #[error("unterminated string")]
    UnterminatedString,

    #[error("string is not valid UTF-8")]
    Utf8,

    #[error("address pattern must start with '/'")]
    InvalidAddress,

    #[error("unknown type tag '{0}'")]
    UnknownTypeTag(char),

    #[error("unbalanced array brackets in type tags")]
    UnbalancedArray,
}

/// Correctly framed bundle that cannot be turned into an inertial sample
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    #[error("expected {expected} bundle elements, got {actual}")]
    WrongElementCount { expected: usize, actual: usize },

    #[error("bundle element {index} carries no argument")]
    MissingArgument { index: usize },

    #[error("bundle element {index} is not numeric")]
    NonNumericArgument { index: usize },
}

/// Startup configuration failure, fatal
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no usable local IPv4 address found")]
    NoLocalAddress,

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Socket setup or receive failure
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("failed to join multicast group {group} on {interface}: {source}")]
    Multicast {
        group: Ipv4Addr,
        interface: Ipv4Addr,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-level error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Link(#[from] LinkError),
}

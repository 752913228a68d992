//! OSC 1.0 packet codec
//!
//! Decodes one UDP payload into either a single addressed [`OscMessage`] or an
//! [`OscBundle`]. A bundle exposes only its immediate children; nested bundles
//! stay nested inside their parent and are never surfaced as separate
//! packets, so a consumer sees each datagram exactly once.
//!
//! All integers are big-endian and every field is padded to 4 bytes.
//!
//! ```text
//! bundle:  "#bundle\0" | time tag (u64) | { size (i32) | element }*
//! message: address "\0"-padded | ",tags" "\0"-padded | arguments
//! ```
//!
//! Decoding is pure: no I/O, no state between calls.

use crate::error::DecodeError;

const BUNDLE_TAG: &[u8; 8] = b"#bundle\0";

/// NTP-style time tag carried by bundles and `t` arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OscTime {
    pub seconds: u32,
    pub fractional: u32,
}

impl OscTime {
    /// The special "immediately" time tag.
    pub const IMMEDIATE: OscTime = OscTime {
        seconds: 0,
        fractional: 1,
    };
}

/// Typed OSC argument
#[derive(Debug, Clone, PartialEq)]
pub enum OscType {
    Int(i32),
    Float(f32),
    String(String),
    Blob(Vec<u8>),
    Long(i64),
    Time(OscTime),
    Double(f64),
    Char(char),
    Color(u32),
    Midi([u8; 4]),
    Bool(bool),
    Nil,
    Inf,
    Array(Vec<OscType>),
}

impl OscType {
    /// Numeric value as `f32`, coercing integer and double arguments.
    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            OscType::Float(v) => Some(v),
            OscType::Int(v) => Some(v as f32),
            OscType::Long(v) => Some(v as f32),
            OscType::Double(v) => Some(v as f32),
            _ => None,
        }
    }
}

/// Single addressed message
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscType>,
}

impl OscMessage {
    pub fn new(address: impl Into<String>, args: Vec<OscType>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }
}

/// Time-tagged group of packets
#[derive(Debug, Clone, PartialEq)]
pub struct OscBundle {
    pub timetag: OscTime,
    pub content: Vec<OscPacket>,
}

/// Decoded datagram
#[derive(Debug, Clone, PartialEq)]
pub enum OscPacket {
    Message(OscMessage),
    Bundle(OscBundle),
}

/// Packet class as told by the leading marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Bundle,
    Message,
}

/// Classify a payload without decoding it.
///
/// Works on malformed input too, which lets the supervisor attribute a decode
/// failure to the IMU (bundle) or encoder (message) path.
pub fn peek_kind(bytes: &[u8]) -> PacketKind {
    if bytes.first() == Some(&b'#') {
        PacketKind::Bundle
    } else {
        PacketKind::Message
    }
}

/// Decode one datagram.
///
/// # Example
/// ```
/// use osc_attitude::codec::{self, OscMessage, OscPacket, OscType};
///
/// let bytes = codec::encode(&OscPacket::Message(OscMessage::new("/encA", vec![OscType::Float(12.0)])));
/// let packet = codec::decode(&bytes).unwrap();
/// assert!(matches!(packet, OscPacket::Message(m) if m.address == "/encA"));
/// ```
pub fn decode(bytes: &[u8]) -> Result<OscPacket, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    if bytes.len() % 4 != 0 {
        return Err(DecodeError::Misaligned(bytes.len()));
    }

    let mut reader = Reader::new(bytes);
    if bytes.starts_with(BUNDLE_TAG) {
        reader.take(BUNDLE_TAG.len())?;
        decode_bundle(&mut reader).map(OscPacket::Bundle)
    } else {
        decode_message(&mut reader).map(OscPacket::Message)
    }
}

fn decode_bundle(reader: &mut Reader<'_>) -> Result<OscBundle, DecodeError> {
    let timetag = reader.read_time()?;
    let mut content = Vec::new();

    while reader.remaining() > 0 {
        let size = reader.read_i32()?;
        if size <= 0 || size % 4 != 0 {
            return Err(DecodeError::BadLength(size));
        }
        let element = reader.take(size as usize)?;
        // Children are decoded but only collected here; nothing is emitted per
        // nested element.
        content.push(decode(element)?);
    }

    Ok(OscBundle { timetag, content })
}

fn decode_message(reader: &mut Reader<'_>) -> Result<OscMessage, DecodeError> {
    let address = reader.read_string()?;
    if !address.starts_with('/') {
        return Err(DecodeError::InvalidAddress);
    }

    // Pre-1.0 senders may omit the type tag string entirely.
    if reader.remaining() == 0 {
        return Ok(OscMessage {
            address,
            args: Vec::new(),
        });
    }

    let tags = reader.read_string()?;
    let mut chars = tags.chars();
    match chars.next() {
        Some(',') => {}
        Some(c) => return Err(DecodeError::UnknownTypeTag(c)),
        None => return Err(DecodeError::UnknownTypeTag('\0')),
    }

    let mut stack: Vec<Vec<OscType>> = vec![Vec::new()];
    for tag in chars {
        let arg = match tag {
            '[' => {
                stack.push(Vec::new());
                continue;
            }
            ']' => {
                if stack.len() < 2 {
                    return Err(DecodeError::UnbalancedArray);
                }
                let items = stack.pop().unwrap_or_default();
                OscType::Array(items)
            }
            other => reader.read_arg(other)?,
        };
        if let Some(top) = stack.last_mut() {
            top.push(arg);
        }
    }

    if stack.len() != 1 {
        return Err(DecodeError::UnbalancedArray);
    }
    let args = stack.pop().unwrap_or_default();

    Ok(OscMessage { address, args })
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if n > self.remaining() {
            return Err(DecodeError::Truncated {
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_u32(&mut self) -> Result<u32, DecodeError> {
        self.read_array::<4>().map(u32::from_be_bytes)
    }

    fn read_i32(&mut self) -> Result<i32, DecodeError> {
        self.read_array::<4>().map(i32::from_be_bytes)
    }

    fn read_time(&mut self) -> Result<OscTime, DecodeError> {
        Ok(OscTime {
            seconds: self.read_u32()?,
            fractional: self.read_u32()?,
        })
    }

    fn read_string(&mut self) -> Result<String, DecodeError> {
        let rest = &self.buf[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(DecodeError::UnterminatedString)?;
        let text = core::str::from_utf8(&rest[..nul])
            .map_err(|_| DecodeError::Utf8)?
            .to_owned();
        self.take(padded(nul + 1))?;
        Ok(text)
    }

    fn read_blob(&mut self) -> Result<Vec<u8>, DecodeError> {
        let size = self.read_i32()?;
        if size < 0 {
            return Err(DecodeError::BadLength(size));
        }
        let size = size as usize;
        let data = self.take(size)?.to_vec();
        self.take(padded(size) - size)?;
        Ok(data)
    }

    fn read_arg(&mut self, tag: char) -> Result<OscType, DecodeError> {
        let arg = match tag {
            'i' => OscType::Int(self.read_i32()?),
            'f' => OscType::Float(f32::from_be_bytes(self.read_array::<4>()?)),
            's' | 'S' => OscType::String(self.read_string()?),
            'b' => OscType::Blob(self.read_blob()?),
            'h' => OscType::Long(i64::from_be_bytes(self.read_array::<8>()?)),
            't' => OscType::Time(self.read_time()?),
            'd' => OscType::Double(f64::from_be_bytes(self.read_array::<8>()?)),
            'c' => OscType::Char(char::from_u32(self.read_u32()?).ok_or(DecodeError::Utf8)?),
            'r' => OscType::Color(self.read_u32()?),
            'm' => OscType::Midi(self.read_array::<4>()?),
            'T' => OscType::Bool(true),
            'F' => OscType::Bool(false),
            'N' => OscType::Nil,
            'I' => OscType::Inf,
            other => return Err(DecodeError::UnknownTypeTag(other)),
        };
        Ok(arg)
    }
}

fn padded(len: usize) -> usize {
    (len + 3) & !3
}

/// Encode a packet into its wire form.
///
/// Used to build test traffic and by rig simulators; the receive path only
/// decodes.
pub fn encode(packet: &OscPacket) -> Vec<u8> {
    let mut out = Vec::new();
    write_packet(&mut out, packet);
    out
}

fn write_packet(out: &mut Vec<u8>, packet: &OscPacket) {
    match packet {
        OscPacket::Message(msg) => write_message(out, msg),
        OscPacket::Bundle(bundle) => {
            out.extend_from_slice(BUNDLE_TAG);
            out.extend_from_slice(&bundle.timetag.seconds.to_be_bytes());
            out.extend_from_slice(&bundle.timetag.fractional.to_be_bytes());
            for child in &bundle.content {
                let element = encode(child);
                out.extend_from_slice(&(element.len() as i32).to_be_bytes());
                out.extend_from_slice(&element);
            }
        }
    }
}

fn write_message(out: &mut Vec<u8>, msg: &OscMessage) {
    write_string(out, &msg.address);
    let mut tags = String::from(",");
    let mut data = Vec::new();
    for arg in &msg.args {
        write_arg(&mut tags, &mut data, arg);
    }
    write_string(out, &tags);
    out.extend_from_slice(&data);
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    let len = s.len() + 1;
    out.resize(out.len() + padded(len) - s.len(), 0);
}

fn write_arg(tags: &mut String, data: &mut Vec<u8>, arg: &OscType) {
    match arg {
        OscType::Int(v) => {
            tags.push('i');
            data.extend_from_slice(&v.to_be_bytes());
        }
        OscType::Float(v) => {
            tags.push('f');
            data.extend_from_slice(&v.to_be_bytes());
        }
        OscType::String(s) => {
            tags.push('s');
            write_string(data, s);
        }
        OscType::Blob(b) => {
            tags.push('b');
            data.extend_from_slice(&(b.len() as i32).to_be_bytes());
            data.extend_from_slice(b);
            data.resize(data.len() + padded(b.len()) - b.len(), 0);
        }
        OscType::Long(v) => {
            tags.push('h');
            data.extend_from_slice(&v.to_be_bytes());
        }
        OscType::Time(t) => {
            tags.push('t');
            data.extend_from_slice(&t.seconds.to_be_bytes());
            data.extend_from_slice(&t.fractional.to_be_bytes());
        }
        OscType::Double(v) => {
            tags.push('d');
            data.extend_from_slice(&v.to_be_bytes());
        }
        OscType::Char(c) => {
            tags.push('c');
            data.extend_from_slice(&(*c as u32).to_be_bytes());
        }
        OscType::Color(v) => {
            tags.push('r');
            data.extend_from_slice(&v.to_be_bytes());
        }
        OscType::Midi(m) => {
            tags.push('m');
            data.extend_from_slice(m);
        }
        OscType::Bool(true) => tags.push('T'),
        OscType::Bool(false) => tags.push('F'),
        OscType::Nil => tags.push('N'),
        OscType::Inf => tags.push('I'),
        OscType::Array(items) => {
            tags.push('[');
            for item in items {
                write_arg(tags, data, item);
            }
            tags.push(']');
        }
    }
}

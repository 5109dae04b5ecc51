//! Telemetry packet layout and checksum verification.
//!
//! All multi-byte fields are little-endian and packed without padding:
//!
//! ```text
//! offset  size  field
//!      0     4  id          u32
//!      4     8  timestamp   i64, nanoseconds since the Unix epoch
//!     12     2  data_count  u16, declared number of samples
//!     14    16  checksum    MD5 of the rendered samples
//!     30   2*n  data        i16 samples, n = min(data_count, MAX_DATA_LEN)
//! ```
//!
//! The checksum is not taken over the payload bytes. It is the MD5 digest of
//! the samples rendered as comma-joined decimal text (`"1,2,3"`), which is
//! what every sender in the field computes, so verification has to match it.

use crate::config::*;
use md5::{Digest, Md5};
use std::fmt;
use time::macros::format_description;
use time::OffsetDateTime;

const OFF_ID: usize = 0;
const OFF_TIMESTAMP: usize = 4;
const OFF_DATA_COUNT: usize = 12;
const OFF_CHECKSUM: usize = 14;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("datagram of {len} bytes is shorter than the {} byte header", HEADER_SIZE)]
    TooShort { len: usize },
}

/// Point in time carried by a packet, in nanoseconds since the Unix epoch.
///
/// The receiver never interprets it beyond display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub fn now() -> Self {
        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
        Self(i64::try_from(nanos).unwrap_or(i64::MAX))
    }

    pub const fn as_nanos(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    /// UTC, `YYYY-MM-DD HH:MM:SS.nnnnnnnnn`; the raw nanosecond count if the
    /// value cannot be represented as a date.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let format = format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:9]"
        );
        let rendered = OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.0))
            .ok()
            .and_then(|at| at.format(format).ok());
        match rendered {
            Some(text) => f.write_str(&text),
            None => write!(f, "{}ns", self.0),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Checksum(pub [u8; CHECKSUM_LEN]);

impl Checksum {
    /// MD5 over the textual rendering of `samples`.
    pub fn of_samples(samples: &[i16]) -> Self {
        let digest = Md5::digest(render_samples(samples).as_bytes());
        let mut bytes = [0u8; CHECKSUM_LEN];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Comma-joined decimal rendering of the samples, no trailing separator.
pub fn render_samples(samples: &[i16]) -> String {
    samples
        .iter()
        .map(i16::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Ok,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Ok => f.write_str("OK"),
            Verdict::Fail => f.write_str("FAIL"),
        }
    }
}

/// Fixed-capacity sample storage with a separate logical length.
///
/// The physical array always holds `MAX_DATA_LEN` values; only the first
/// `len` are meaningful and nothing past the capacity is ever addressed.
#[derive(Clone)]
pub struct Samples {
    values: [i16; MAX_DATA_LEN],
    len: usize,
}

impl Samples {
    pub fn new() -> Self {
        Self {
            values: [0; MAX_DATA_LEN],
            len: 0,
        }
    }

    /// Copies at most `MAX_DATA_LEN` values from `values`.
    pub fn from_slice(values: &[i16]) -> Self {
        let mut samples = Self::new();
        let len = values.len().min(MAX_DATA_LEN);
        samples.values[..len].copy_from_slice(&values[..len]);
        samples.len = len;
        samples
    }

    /// `len` zeroed samples, clamped to `MAX_DATA_LEN`.
    pub fn zeroed(len: usize) -> Self {
        let mut samples = Self::new();
        samples.len = len.min(MAX_DATA_LEN);
        samples
    }

    pub fn as_slice(&self) -> &[i16] {
        &self.values[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [i16] {
        &mut self.values[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for Samples {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Samples {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for Samples {}

impl fmt::Debug for Samples {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketHeader {
    pub id: u32,
    pub timestamp: Timestamp,
    pub data_count: u16,
    pub checksum: Checksum,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    data: Samples,
}

/// A packet decoded from a datagram plus what had to be repaired on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub packet: Packet,
    /// Declared sample count when it exceeded `MAX_DATA_LEN`.
    pub truncated_from: Option<u16>,
    /// Samples the header announced but the datagram did not carry (zero-filled).
    pub missing: usize,
}

impl Packet {
    /// Builds a packet whose `data_count` matches `data`.
    pub fn new(id: u32, timestamp: Timestamp, checksum: Checksum, data: Samples) -> Self {
        Self {
            header: PacketHeader {
                id,
                timestamp,
                data_count: data.len() as u16,
                checksum,
            },
            data,
        }
    }

    pub fn samples(&self) -> &[i16] {
        self.data.as_slice()
    }

    pub fn verify(&self) -> Verdict {
        if self.header.checksum == Checksum::of_samples(self.samples()) {
            Verdict::Ok
        } else {
            Verdict::Fail
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Decoded, PacketError> {
        if buf.len() < HEADER_SIZE {
            return Err(PacketError::TooShort { len: buf.len() });
        }

        let id = u32::from_le_bytes(read_array(buf, OFF_ID));
        let timestamp = Timestamp(i64::from_le_bytes(read_array(buf, OFF_TIMESTAMP)));
        let declared = u16::from_le_bytes(read_array(buf, OFF_DATA_COUNT));
        let checksum = Checksum(read_array(buf, OFF_CHECKSUM));

        let count = (declared as usize).min(MAX_DATA_LEN);
        let truncated_from = (declared as usize > MAX_DATA_LEN).then_some(declared);

        let mut data = Samples::zeroed(count);
        let mut filled = 0;
        for (slot, pair) in data
            .as_mut_slice()
            .iter_mut()
            .zip(buf[HEADER_SIZE..].chunks_exact(2))
        {
            *slot = i16::from_le_bytes([pair[0], pair[1]]);
            filled += 1;
        }
        let missing = count - filled;

        Ok(Decoded {
            packet: Packet::new(id, timestamp, checksum, data),
            truncated_from,
            missing,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        write_datagram(
            self.header.id,
            self.header.timestamp,
            self.header.data_count,
            self.header.checksum,
            self.samples(),
        )
    }
}

/// Serializes a datagram with an arbitrary declared `data_count`.
///
/// The count is written as given, so callers can announce more samples than
/// they send or more than a receiver will keep.
pub fn write_datagram(
    id: u32,
    timestamp: Timestamp,
    data_count: u16,
    checksum: Checksum,
    samples: &[i16],
) -> Vec<u8> {
    let mut buf = vec![0u8; HEADER_SIZE + samples.len() * 2];
    buf[OFF_ID..OFF_ID + 4].copy_from_slice(&id.to_le_bytes());
    buf[OFF_TIMESTAMP..OFF_TIMESTAMP + 8].copy_from_slice(&timestamp.0.to_le_bytes());
    buf[OFF_DATA_COUNT..OFF_DATA_COUNT + 2].copy_from_slice(&data_count.to_le_bytes());
    buf[OFF_CHECKSUM..OFF_CHECKSUM + CHECKSUM_LEN].copy_from_slice(&checksum.0);
    for (slot, value) in buf[HEADER_SIZE..].chunks_exact_mut(2).zip(samples) {
        slot.copy_from_slice(&value.to_le_bytes());
    }
    buf
}

fn read_array<const N: usize>(buf: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    out
}

pub struct PacketBuilder {
    id: u32,
    timestamp: Timestamp,
    data: Samples,
    checksum: Option<Checksum>,
}

impl PacketBuilder {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            timestamp: Timestamp::now(),
            data: Samples::new(),
            checksum: None,
        }
    }

    pub fn timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn samples(mut self, values: &[i16]) -> Self {
        self.data = Samples::from_slice(values);
        self
    }

    /// Overrides the computed checksum.
    pub fn checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = Some(checksum);
        self
    }

    pub fn build(self) -> Packet {
        let checksum = self
            .checksum
            .unwrap_or_else(|| Checksum::of_samples(self.data.as_slice()));
        Packet::new(self.id, self.timestamp, checksum, self.data)
    }
}

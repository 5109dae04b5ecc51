//! Simulated telemetry source.
//!
//! Produces random sample streams and ships them to a sink, optionally
//! mixing in the malformed traffic a receiver has to survive: corrupted
//! checksums, counts above the sample cap and runt frames.

use crate::config::*;
use crate::packet::{write_datagram, Checksum, Packet, PacketBuilder, Timestamp};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use tracing::trace;

/// Random-walk sample generator.
pub struct SampleGenerator {
    rng: StdRng,
    level: i16,
}

impl SampleGenerator {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self { rng, level: 0 }
    }

    pub fn next_samples(&mut self, len: usize) -> Vec<i16> {
        (0..len)
            .map(|_| {
                let step = self.rng.gen_range(-256..=256);
                self.level = self.level.saturating_add(step);
                self.level
            })
            .collect()
    }
}

impl Default for SampleGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Probabilities, each in `0.0..=1.0`, of sending a malformed datagram.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scenario {
    pub corrupt_rate: f64,
    pub oversize_rate: f64,
    pub runt_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Valid,
    /// Checksum does not match the samples.
    Corrupted,
    /// Declares and carries more samples than the receiver keeps; the
    /// checksum covers the part that survives truncation.
    Oversized,
    /// Shorter than a header.
    Runt,
}

pub struct TelemetrySender {
    socket: UdpSocket,
    target: SocketAddr,
    next_id: u32,
    generator: SampleGenerator,
    scenario: Scenario,
}

impl TelemetrySender {
    /// Binds an ephemeral local socket for sending to `target`.
    pub fn connect(target: SocketAddr, scenario: Scenario) -> io::Result<Self> {
        let local = if target.is_ipv4() {
            SocketAddr::from(([0u8; 4], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        Ok(Self {
            socket: UdpSocket::bind(local)?,
            target,
            next_id: 0,
            generator: SampleGenerator::new(),
            scenario,
        })
    }

    pub fn with_generator(mut self, generator: SampleGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn send(&self, packet: &Packet) -> io::Result<usize> {
        self.send_raw(&packet.encode())
    }

    pub fn send_raw(&self, bytes: &[u8]) -> io::Result<usize> {
        self.socket.send_to(bytes, self.target)
    }

    /// Builds the next datagram of the stream with `samples` samples,
    /// choosing its shape from the scenario.
    pub fn next_datagram(&mut self, samples: usize) -> (Shape, Vec<u8>) {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        let shape = self.pick_shape();

        let bytes = match shape {
            Shape::Valid => {
                let values = self.generator.next_samples(samples.min(MAX_DATA_LEN));
                PacketBuilder::new(id).samples(&values).build().encode()
            }
            Shape::Corrupted => {
                let values = self.generator.next_samples(samples.min(MAX_DATA_LEN));
                let mut checksum = Checksum::of_samples(&values);
                checksum.0[0] ^= 0xff;
                PacketBuilder::new(id)
                    .samples(&values)
                    .checksum(checksum)
                    .build()
                    .encode()
            }
            Shape::Oversized => {
                let max = (SOCK_BUF_SIZE - HEADER_SIZE) / 2;
                let count = samples.clamp(MAX_DATA_LEN + 1, max);
                let values = self.generator.next_samples(count);
                let checksum = Checksum::of_samples(&values[..MAX_DATA_LEN]);
                write_datagram(id, Timestamp::now(), count as u16, checksum, &values)
            }
            Shape::Runt => {
                let len = self.generator.rng.gen_range(0..HEADER_SIZE);
                vec![0u8; len]
            }
        };
        (shape, bytes)
    }

    pub fn send_next(&mut self, samples: usize) -> io::Result<Shape> {
        let (shape, bytes) = self.next_datagram(samples);
        self.send_raw(&bytes)?;
        trace!(?shape, len = bytes.len(), "sent datagram");
        Ok(shape)
    }

    fn pick_shape(&mut self) -> Shape {
        let Scenario {
            corrupt_rate,
            oversize_rate,
            runt_rate,
        } = self.scenario;
        let roll: f64 = self.generator.rng.gen();
        if roll < runt_rate {
            Shape::Runt
        } else if roll < runt_rate + oversize_rate {
            Shape::Oversized
        } else if roll < runt_rate + oversize_rate + corrupt_rate {
            Shape::Corrupted
        } else {
            Shape::Valid
        }
    }
}

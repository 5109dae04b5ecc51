use crate::config::*;
use crate::console::Console;
use crate::packet::{Decoded, Packet, PacketError, Verdict};
use crate::queue::BoundedQueue;
use std::fmt::Write as _;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use tracing::{debug, error, info, trace};

#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    #[error("failed to bind UDP socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to receive datagram: {0}")]
    Recv(#[source] io::Error),
    #[error("failed to write receiver log: {0}")]
    Output(#[source] io::Error),
}

/// Owns the inbound socket and feeds every decodable datagram into the queue.
///
/// Senders are not told apart; all datagrams form one stream.
pub struct Receiver {
    socket: UdpSocket,
    queue: Arc<BoundedQueue>,
    console: Arc<Console>,
    buffer: Box<[u8; SOCK_BUF_SIZE]>,
}

impl Receiver {
    pub fn bind(
        addr: SocketAddr,
        queue: Arc<BoundedQueue>,
        console: Arc<Console>,
    ) -> Result<Self, ReceiverError> {
        let socket = UdpSocket::bind(addr).map_err(|source| {
            error!(%addr, error = %source, "failed to bind UDP socket");
            ReceiverError::Bind { addr, source }
        })?;
        Ok(Self {
            socket,
            queue,
            console,
            buffer: Box::new([0; SOCK_BUF_SIZE]),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receives until the socket fails. Never returns `Ok`.
    pub fn run(&mut self) -> Result<(), ReceiverError> {
        let addr = self.local_addr().map_err(ReceiverError::Recv)?;
        info!(%addr, "receiver listening");
        self.console
            .write_line(format_args!(
                "UDP server started at port {}. Waiting for data",
                addr.port()
            ))
            .map_err(ReceiverError::Output)?;

        loop {
            let (len, _) = self.socket.recv_from(&mut self.buffer[..]).map_err(|e| {
                error!(error = %e, "receive failed, stopping receiver");
                ReceiverError::Recv(e)
            })?;
            self.handle(&self.buffer[..len])?;
        }
    }

    /// Decodes, verifies, logs and enqueues one datagram.
    ///
    /// Returns `None` for frames too short to carry a header. A failed
    /// checksum is reported but the packet is still queued.
    pub fn handle(&self, datagram: &[u8]) -> Result<Option<Verdict>, ReceiverError> {
        let decoded = match Packet::decode(datagram) {
            Ok(decoded) => decoded,
            Err(PacketError::TooShort { len }) => {
                trace!(len, "skipping runt datagram");
                return Ok(None);
            }
        };

        let packet = &decoded.packet;
        let verdict = packet.verify();
        if let Some(declared) = decoded.truncated_from {
            debug!(id = packet.header.id, declared, "sample count clamped");
        }

        self.console
            .write_line(format_args!(
                "Received:  #{} {} md5={} CheckMd5={}{}",
                packet.header.id,
                packet.header.timestamp,
                packet.header.checksum,
                verdict,
                annotation(&decoded)
            ))
            .map_err(ReceiverError::Output)?;

        self.queue.push(decoded.packet);
        Ok(Some(verdict))
    }
}

/// Suffix for the receive line describing repairs made while decoding.
pub fn annotation(decoded: &Decoded) -> String {
    let mut note = String::new();
    // writing into a String cannot fail
    if decoded.truncated_from.is_some() {
        let _ = write!(
            note,
            " (DataCount>{MAX_DATA_LEN} Read only {MAX_DATA_LEN} elements)"
        );
    }
    if decoded.missing > 0 {
        let _ = write!(note, " (missing {} samples)", decoded.missing);
    }
    if decoded.packet.samples().is_empty() {
        note.push_str(" No data");
    }
    note
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{write_datagram, Checksum, PacketBuilder, Timestamp};

    fn receiver(capacity: usize) -> (Receiver, Arc<BoundedQueue>) {
        let queue = Arc::new(BoundedQueue::new(capacity));
        let console = Arc::new(Console::new(io::sink()));
        let receiver = Receiver::bind(
            "127.0.0.1:0".parse().unwrap(),
            Arc::clone(&queue),
            console,
        )
        .unwrap();
        (receiver, queue)
    }

    #[test]
    fn runt_frames_are_skipped() {
        let (receiver, queue) = receiver(4);
        assert_eq!(receiver.handle(&[0u8; HEADER_SIZE - 1]).unwrap(), None);
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn failed_checksum_is_still_queued() {
        let (receiver, queue) = receiver(4);
        let packet = PacketBuilder::new(5)
            .samples(&[1, 2, 3])
            .checksum(Checksum([0xab; CHECKSUM_LEN]))
            .build();
        assert_eq!(
            receiver.handle(&packet.encode()).unwrap(),
            Some(Verdict::Fail)
        );
        assert_eq!(queue.size(), 1);
        assert_eq!(queue.pop().header.id, 5);
    }

    #[test]
    fn oversized_count_is_clamped_and_annotated() {
        let (receiver, queue) = receiver(4);
        let values: Vec<i16> = (0..2000).map(|v| (v % 300) as i16 - 150).collect();
        let bytes = write_datagram(
            8,
            Timestamp::now(),
            2000,
            Checksum::of_samples(&values[..MAX_DATA_LEN]),
            &values,
        );

        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(
            annotation(&decoded),
            " (DataCount>1600 Read only 1600 elements)"
        );

        assert_eq!(receiver.handle(&bytes).unwrap(), Some(Verdict::Ok));
        let stored = queue.pop();
        assert_eq!(stored.samples(), &values[..MAX_DATA_LEN]);
        assert_eq!(stored.header.data_count as usize, MAX_DATA_LEN);
    }

    #[test]
    fn empty_and_short_payloads_are_annotated() {
        let empty = Packet::decode(&PacketBuilder::new(1).build().encode()).unwrap();
        assert_eq!(annotation(&empty), " No data");

        let short = write_datagram(2, Timestamp::default(), 3, Checksum::default(), &[1]);
        let decoded = Packet::decode(&short).unwrap();
        assert_eq!(annotation(&decoded), " (missing 2 samples)");
    }

    struct Broken;

    impl io::Write for Broken {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn broken_receiver() -> (Receiver, Arc<BoundedQueue>) {
        let queue = Arc::new(BoundedQueue::new(4));
        let receiver = Receiver::bind(
            "127.0.0.1:0".parse().unwrap(),
            Arc::clone(&queue),
            Arc::new(Console::new(Broken)),
        )
        .unwrap();
        (receiver, queue)
    }

    #[test]
    fn output_failure_drops_the_packet_and_fails() {
        let (receiver, queue) = broken_receiver();
        let packet = PacketBuilder::new(3).samples(&[1, 2]).build();
        let err = receiver.handle(&packet.encode()).unwrap_err();
        assert!(matches!(err, ReceiverError::Output(_)));
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn output_failure_stops_the_role() {
        let (mut receiver, queue) = broken_receiver();
        assert!(matches!(receiver.run(), Err(ReceiverError::Output(_))));
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn bind_conflict_is_reported() {
        let (first, _) = receiver(1);
        let addr = first.local_addr().unwrap();
        let err = Receiver::bind(
            addr,
            Arc::new(BoundedQueue::new(1)),
            Arc::new(Console::new(io::sink())),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ReceiverError::Bind { .. }));
    }
}

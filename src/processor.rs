use crate::console::Console;
use crate::packet::{Packet, Verdict};
use crate::queue::BoundedQueue;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, trace};

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("failed to write processor log: {0}")]
    Output(#[from] io::Error),
}

/// Drains the queue one packet at a time, simulating `delay` of work per
/// packet before re-verifying and reporting it.
pub struct Processor {
    queue: Arc<BoundedQueue>,
    console: Arc<Console>,
    delay: Duration,
}

impl Processor {
    pub fn new(queue: Arc<BoundedQueue>, console: Arc<Console>, delay: Duration) -> Self {
        Self {
            queue,
            console,
            delay,
        }
    }

    /// Sleeps on the queue while it is empty; runs until output fails.
    pub fn run(&self) -> Result<(), ProcessorError> {
        loop {
            let packet = self.queue.pop_wait();
            self.process(&packet).inspect_err(|e| {
                error!(error = %e, "stopping processor");
            })?;
        }
    }

    pub fn process(&self, packet: &Packet) -> Result<Verdict, ProcessorError> {
        thread::sleep(self.delay);
        let verdict = packet.verify();
        trace!(id = packet.header.id, samples = packet.samples().len(), %verdict, "processed");
        self.console.write_line(format_args!(
            "Processed: #{} {} md5={} CheckMd5={}",
            packet.header.id, packet.header.timestamp, packet.header.checksum, verdict
        ))?;
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Checksum, PacketBuilder};
    use std::io::Write;
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn reports_independent_verification_after_delay() {
        let capture = Capture::default();
        let processor = Processor::new(
            Arc::new(BoundedQueue::new(1)),
            Arc::new(Console::new(capture.clone())),
            Duration::from_millis(15),
        );

        let good = PacketBuilder::new(7).samples(&[1, 2, 3]).build();
        let bad = PacketBuilder::new(8)
            .samples(&[1, 2, 3])
            .checksum(Checksum::default())
            .build();

        let start = Instant::now();
        assert_eq!(processor.process(&good).unwrap(), Verdict::Ok);
        assert!(start.elapsed() >= Duration::from_millis(15));
        assert_eq!(processor.process(&bad).unwrap(), Verdict::Fail);

        let out = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Processed: #7 "));
        assert!(lines[0].ends_with("md5=55b84a9d317184fe61224bfb4a060fb0 CheckMd5=OK"));
        assert!(lines[1].starts_with("Processed: #8 "));
        assert!(lines[1].ends_with("CheckMd5=FAIL"));
    }

    #[test]
    fn output_failure_stops_the_role() {
        let queue = Arc::new(BoundedQueue::new(2));
        queue.push(PacketBuilder::new(1).build());
        let processor = Processor::new(queue, Arc::new(Console::new(Broken)), Duration::ZERO);
        assert!(matches!(processor.run(), Err(ProcessorError::Output(_))));
    }
}

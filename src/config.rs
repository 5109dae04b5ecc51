use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3500;
pub const SOCK_BUF_SIZE: usize = 5000; // largest datagram read in one recv
pub const MAX_DATA_LEN: usize = 1600; // in samples
pub const CHECKSUM_LEN: usize = 16;
pub const HEADER_SIZE: usize = 4 + 8 + 2 + CHECKSUM_LEN; // id + timestamp + count + md5

pub const DEFAULT_QUEUE_CAPACITY: usize = 16;
pub const PROCESSING_DELAY: Duration = Duration::from_millis(15);

// SCHED_RR priorities, only applied on PREEMPT-RT kernels
pub const THREAD_PRIORITY_RECEIVER: i32 = 50;
pub const THREAD_PRIORITY_PROCESSOR: i32 = 40;

/// Runtime settings for a [`crate::Server`].
///
/// `Default` reproduces the fixed constants above: all interfaces on port
/// 3500, a 16 packet queue, 15 ms of simulated work per packet and no
/// thread pinning.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub queue_capacity: usize,
    pub processing_delay: Duration,
    pub receiver_core: Option<usize>,
    pub processor_core: Option<usize>,
    pub realtime: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            processing_delay: PROCESSING_DELAY,
            receiver_core: None,
            processor_core: None,
            realtime: false,
        }
    }
}

use crate::packet::Packet;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Fixed-capacity FIFO of packets shared by the receiver and the processor.
///
/// When full, `push` evicts the oldest packet instead of blocking the
/// producer; a slow consumer therefore loses data silently rather than
/// slowing the socket down.
pub struct BoundedQueue {
    packets: Mutex<VecDeque<Packet>>,
    available: Condvar,
    capacity: usize,
    evicted: AtomicU64,
}

impl BoundedQueue {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            // grows on demand; a large capacity must not reserve memory up front
            packets: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            capacity,
            evicted: AtomicU64::new(0),
        }
    }

    // A panic while holding the lock cannot leave the deque half-updated,
    // so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Packet>> {
        self.packets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, packet: Packet) {
        {
            let mut packets = self.lock();
            if packets.len() == self.capacity {
                packets.pop_front();
                self.evicted.fetch_add(1, Ordering::Relaxed);
            }
            packets.push_back(packet);
        }
        self.available.notify_one();
    }

    /// Removes the oldest packet, or returns an empty [`Packet::default`]
    /// when there is nothing queued.
    pub fn pop(&self) -> Packet {
        self.lock().pop_front().unwrap_or_default()
    }

    /// Blocks until a packet is queued and removes it.
    pub fn pop_wait(&self) -> Packet {
        let mut packets = self
            .available
            .wait_while(self.lock(), |packets| packets.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        packets.pop_front().unwrap_or_default()
    }

    /// Like [`pop_wait`](Self::pop_wait) but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Packet> {
        let deadline = Instant::now() + timeout;
        let mut packets = self.lock();
        while packets.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            packets = self
                .available
                .wait_timeout(packets, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        packets.pop_front()
    }

    pub fn size(&self) -> usize {
        self.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total packets dropped by the overflow policy since creation.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use telemsink::{BoundedQueue, Packet, PacketBuilder, Verdict};

const PACKETS: u32 = 20_000;

fn packet(id: u32) -> Packet {
    let len = (id % 8) as usize;
    let values: Vec<i16> = (0..len).map(|i| (id as i16).wrapping_mul(i as i16)).collect();
    PacketBuilder::new(id).samples(&values).build()
}

fn check(popped: &[Packet], queue: &BoundedQueue) {
    assert!(
        popped.windows(2).all(|w| w[0].header.id < w[1].header.id),
        "packets duplicated or reordered"
    );
    assert!(popped.iter().all(|p| p.verify() == Verdict::Ok));
    assert_eq!(popped.len() as u64 + queue.evicted(), PACKETS as u64);
    assert_eq!(queue.size(), 0);
}

#[test]
fn concurrent_push_and_blocking_pop() {
    let queue = Arc::new(BoundedQueue::new(16));
    let done = Arc::new(AtomicBool::new(false));

    let producer = {
        let queue = Arc::clone(&queue);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut rng = rand::thread_rng();
            for id in 0..PACKETS {
                queue.push(packet(id));
                if rng.gen_ratio(1, 64) {
                    thread::yield_now();
                }
            }
            done.store(true, Ordering::Release);
        })
    };

    let consumer = {
        let queue = Arc::clone(&queue);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut popped = Vec::new();
            loop {
                match queue.pop_timeout(Duration::from_millis(1)) {
                    Some(packet) => popped.push(packet),
                    None if done.load(Ordering::Acquire) && queue.size() == 0 => break,
                    None => {}
                }
            }
            popped
        })
    };

    producer.join().unwrap();
    let popped = consumer.join().unwrap();
    check(&popped, &queue);
}

#[test]
fn concurrent_push_and_polling_pop() {
    let queue = Arc::new(BoundedQueue::new(4));
    let done = Arc::new(AtomicBool::new(false));

    let producer = {
        let queue = Arc::clone(&queue);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for id in 0..PACKETS {
                queue.push(packet(id));
            }
            done.store(true, Ordering::Release);
        })
    };

    let mut popped = Vec::new();
    loop {
        if queue.size() > 0 {
            popped.push(queue.pop());
        } else if done.load(Ordering::Acquire) && queue.size() == 0 {
            break;
        } else {
            thread::yield_now();
        }
    }

    producer.join().unwrap();
    check(&popped, &queue);
}

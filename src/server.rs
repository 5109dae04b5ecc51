use crate::config::*;
use crate::console::Console;
use crate::processor::{Processor, ProcessorError};
use crate::queue::BoundedQueue;
use crate::receiver::{Receiver, ReceiverError};
use crate::sched;
use std::io;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{channel, Receiver as ExitReceiver};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Receiver(#[from] ReceiverError),
    #[error(transparent)]
    Processor(#[from] ProcessorError),
    #[error("failed to spawn {role} thread: {source}")]
    Spawn {
        role: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("{role} thread panicked")]
    Panicked { role: &'static str },
}

enum Exit {
    Receiver(Result<(), ReceiverError>),
    Processor(Result<(), ProcessorError>),
    Panicked(&'static str),
}

pub struct Server {
    config: Config,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Binds the socket and launches the receiver and processor threads.
    ///
    /// The bind happens on the calling thread so that an unusable address is
    /// reported here rather than from inside a role.
    pub fn start(self, console: Arc<Console>) -> Result<ServerHandle, ServerError> {
        let config = self.config;
        info!(
            bind_addr = %config.bind_addr,
            queue_capacity = config.queue_capacity,
            processing_delay_ms = config.processing_delay.as_millis() as u64,
            "telemetry sink starting"
        );

        if config.realtime {
            sched::detect_rt_scheduler();
        }

        let queue = Arc::new(BoundedQueue::new(config.queue_capacity));
        let mut receiver =
            Receiver::bind(config.bind_addr, Arc::clone(&queue), Arc::clone(&console))?;
        let local_addr = receiver.local_addr().map_err(ReceiverError::Recv)?;
        let processor = Processor::new(Arc::clone(&queue), console, config.processing_delay);

        let (exit_tx, exits) = channel();

        debug!("spawning receiver thread");
        let receiver_exit = exit_tx.clone();
        let receiver_core = config.receiver_core;
        let realtime = config.realtime;
        thread::Builder::new()
            .name("telemsink-rx".into())
            .spawn(move || {
                let exit = run_role("receiver", || {
                    prepare_thread("receiver", receiver_core, realtime, THREAD_PRIORITY_RECEIVER);
                    info!("receiver thread started");
                    Exit::Receiver(receiver.run())
                });
                let _ = receiver_exit.send(exit);
            })
            .map_err(|source| ServerError::Spawn {
                role: "receiver",
                source,
            })?;

        debug!("spawning processor thread");
        let processor_core = config.processor_core;
        thread::Builder::new()
            .name("telemsink-proc".into())
            .spawn(move || {
                let exit = run_role("processor", || {
                    prepare_thread("processor", processor_core, realtime, THREAD_PRIORITY_PROCESSOR);
                    info!("processor thread started");
                    Exit::Processor(processor.run())
                });
                let _ = exit_tx.send(exit);
            })
            .map_err(|source| ServerError::Spawn {
                role: "processor",
                source,
            })?;

        info!(%local_addr, "telemetry sink started");
        Ok(ServerHandle {
            local_addr,
            queue,
            exits,
        })
    }
}

// Turns a panic in a role into an exit message so `join` sees it even while
// the other role keeps the channel open.
fn run_role(role: &'static str, body: impl FnOnce() -> Exit) -> Exit {
    panic::catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|_| {
        error!(role, "role thread panicked");
        Exit::Panicked(role)
    })
}

fn prepare_thread(role: &str, core: Option<usize>, realtime: bool, priority: i32) {
    if let Some(core) = core {
        sched::pin_current_thread(core, role);
    }
    #[cfg(target_os = "linux")]
    if realtime {
        sched::raise_current_thread_priority(priority, role);
    }
    #[cfg(not(target_os = "linux"))]
    let _ = (realtime, priority);
}

/// Handle to the two running roles.
pub struct ServerHandle {
    local_addr: SocketAddr,
    queue: Arc<BoundedQueue>,
    exits: ExitReceiver<Exit>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn queue(&self) -> &Arc<BoundedQueue> {
        &self.queue
    }

    /// Blocks until the first role stops, for any reason, and returns why.
    ///
    /// Both roles only stop on unrecoverable I/O errors, so in normal
    /// operation this never returns.
    pub fn join(self) -> Result<(), ServerError> {
        match self.exits.recv() {
            Ok(Exit::Receiver(result)) => Ok(result?),
            Ok(Exit::Processor(result)) => Ok(result?),
            Ok(Exit::Panicked(role)) => Err(ServerError::Panicked { role }),
            Err(_) => Err(ServerError::Panicked { role: "unknown" }),
        }
    }
}

pub mod config;
mod console;
pub mod logging;
mod packet;
mod processor;
mod queue;
mod receiver;
mod sched;
pub mod sender;
mod server;

pub use config::Config;
pub use console::Console;
pub use packet::*;
pub use processor::{Processor, ProcessorError};
pub use queue::BoundedQueue;
pub use receiver::{annotation, Receiver, ReceiverError};
pub use server::{Server, ServerError, ServerHandle};

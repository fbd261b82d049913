//! Sink implementations

mod file;
mod log;
mod memory;

pub use self::file::{FileSink, FileSinkConfig};
pub use self::log::LogSink;
pub use self::memory::{MemorySink, MemorySinkHandle};

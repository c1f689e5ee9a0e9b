//! Ordered hand-off from the serial read path to line processing
pub mod assembler;
pub mod queue;

pub use assembler::LineAssembler;
pub use queue::{dispatch_queue, ChunkSender, ConsumerExit, DispatchConsumer};

/// A fragment of the byte stream exactly as read from the port
pub type RawChunk = Vec<u8>;

/// Receives complete, non-empty lines in arrival order, one at a time
pub trait LineSink: Send + Sync {
    fn handle_line(&self, line: &str);
}

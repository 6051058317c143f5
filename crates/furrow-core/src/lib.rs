pub mod bits;
pub mod buffer;
pub mod core;
pub mod error;
pub mod format;
pub mod io;
pub mod queue;
pub mod types;

pub use bits::{BitReader, PackedBits};
pub use buffer::{HeapBuffer, HeapMemory, HeapStats, WorkHeap};
pub use core::{AutoResetSignal, Fence, RingConsumer, RingProducer, command_ring};
pub use error::FurrowError;
pub use format::{FORMAT_DESCRIPTION, PLOT_MAGIC, PLOT_TABLE_POINTERS_SIZE, PlotHeader};
pub use io::{FileRegistry, FileSet};
pub use queue::{Command, DiskQueue};
pub use types::{
    DEFAULT_BUCKET_COUNT, DEFAULT_HEAP_SIZE, DEFAULT_RING_CAPACITY, FileId, QueueConfig, Result,
};

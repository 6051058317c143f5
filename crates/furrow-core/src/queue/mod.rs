mod command;
mod dispatch;

pub use command::{Command, IoRegion};

use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::buffer::{HeapBuffer, HeapMemory, HeapStats, WorkHeap};
use crate::core::{Fence, RingProducer, command_ring};
use crate::format::PlotHeader;
use crate::io::FileRegistry;
use crate::io::block_io::round_up_to_block;
use crate::types::{FileId, QueueConfig, Result};

use self::dispatch::Dispatcher;

/// Producer-side handle to the asynchronous disk I/O queue.
///
/// Spawning the queue opens every temporary file set, sizes the work heap
/// from the discovered block size and starts the dispatch thread. Command
/// methods stage work into the ring; nothing reaches the dispatch thread
/// until [`commit_commands`](Self::commit_commands) publishes the batch.
///
/// The handle is `Send` but its command methods take `&mut self`, so exactly
/// one producer context can stage commands at a time; the borrow checker
/// enforces the single-producer/single-consumer contract of the ring.
///
/// Dropping the queue sends a poison command, waits for the dispatch thread
/// to drain everything committed before it, and joins.
pub struct DiskQueue {
    producer: RingProducer<Command>,
    heap: Arc<WorkHeap>,
    registry: Arc<Mutex<FileRegistry>>,
    /// Queue-owned plot header buffer; referenced by the header write
    /// command, so it must live for the queue's lifetime.
    plot_header: Option<HeapMemory>,
    plot_header_len: usize,
    plot_table_pointers: u64,
    block_size: usize,
    k: u8,
    join_handle: Option<JoinHandle<()>>,
}

impl DiskQueue {
    /// Opens every temporary file set under `config.work_dir`, allocates the
    /// work heap and starts the dispatch thread.
    pub fn spawn(config: QueueConfig) -> Result<Self> {
        let mut registry = FileRegistry::new(config.work_dir.clone(), config.direct_io);
        for file_id in FileId::TEMP {
            let buckets = if file_id.is_bucketed() {
                config.bucket_count
            } else {
                1
            };
            registry.init_set(file_id, file_id.base_name(), buckets)?;
        }

        let block_size = registry
            .block_size()
            .expect("block size is published while opening the temp sets");

        let heap = Arc::new(WorkHeap::new(HeapMemory::alloc(
            config.heap_size,
            block_size,
        )));
        let registry = Arc::new(Mutex::new(registry));
        let (producer, consumer) = command_ring(config.ring_capacity);

        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&heap),
            consumer,
            block_size,
            config.direct_io,
        );
        let join_handle = thread::Builder::new()
            .name("furrow-io-dispatch".into())
            .spawn(move || dispatcher.run())?;

        tracing::debug!(
            work_dir = %config.work_dir.display(),
            bucket_count = config.bucket_count,
            block_size,
            direct_io = config.direct_io,
            "disk queue started"
        );

        Ok(Self {
            producer,
            heap,
            registry,
            plot_header: None,
            plot_header_len: 0,
            plot_table_pointers: 0,
            block_size,
            k: config.k,
            join_handle: Some(join_handle),
        })
    }

    /// Uniform block size of the temporary files.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Directory holding the temporary work files.
    pub fn work_dir(&self) -> PathBuf {
        self.registry
            .lock()
            .expect("file registry mutex poisoned")
            .work_dir()
            .to_path_buf()
    }

    /// Blocks until the work heap can satisfy `len` bytes and returns the
    /// buffer. The returned buffer is block-aligned.
    pub fn get_buffer(&self, len: usize) -> Result<HeapBuffer> {
        self.heap.alloc(len)
    }

    /// Snapshot of work heap occupancy.
    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    /// Queues a bucketed write of `sizes[i]` bytes per bucket from the
    /// packed `buffer`.
    ///
    /// In direct-I/O mode only whole blocks are written per bucket and the
    /// source advances to the next block boundary, so the caller writes
    /// remainders explicitly via later [`write_file`](Self::write_file)
    /// calls.
    pub fn write_buckets(&mut self, file_id: FileId, buffer: &HeapBuffer, sizes: &[u32]) {
        self.producer.push(Command::WriteBuckets {
            file_id,
            buffer: IoRegion::loan(buffer, buffer.len()),
            sizes: sizes.into(),
        });
    }

    /// Queues a write of the first `size` bytes of `buffer` to one file.
    pub fn write_file(&mut self, file_id: FileId, bucket: u32, buffer: &HeapBuffer, size: usize) {
        self.producer.push(Command::WriteFile {
            file_id,
            bucket,
            buffer: IoRegion::loan(buffer, size),
        });
    }

    /// Queues a read of `size` logical bytes into `buffer`.
    ///
    /// The producer must not touch the buffer until a fence queued after
    /// this command has been waited on.
    pub fn read_file(&mut self, file_id: FileId, bucket: u32, buffer: &mut HeapBuffer, size: usize) {
        assert!(
            round_up_to_block(size, self.block_size) <= buffer.capacity(),
            "read destination too small for a block-rounded read"
        );
        self.producer.push(Command::ReadFile {
            file_id,
            bucket,
            buffer: IoRegion::loan(buffer, size),
        });
    }

    /// Queues a seek on one file of the set.
    pub fn seek_file(&mut self, file_id: FileId, bucket: u32, seek: SeekFrom) {
        self.producer.push(Command::SeekFile {
            file_id,
            bucket,
            seek,
        });
    }

    /// Queues a seek on every file of the set.
    pub fn seek_bucket(&mut self, file_id: FileId, seek: SeekFrom) {
        self.producer.push(Command::SeekBucket { file_id, seek });
    }

    /// Queues the buffer's return to the work heap. Consuming the handle
    /// makes any later producer access a compile error; the region itself is
    /// recycled only when the dispatch thread executes the release, so
    /// writes queued before it stay valid.
    pub fn release_buffer(&mut self, buffer: HeapBuffer) {
        self.producer.push(Command::ReleaseBuffer { buffer });
    }

    /// Queues a raw fence signal.
    pub fn signal_fence(&mut self, fence: &Arc<Fence>) {
        self.producer.push(Command::SignalFence {
            fence: Arc::clone(fence),
            value: None,
        });
    }

    /// Queues a fence signal carrying `value`.
    pub fn signal_fence_value(&mut self, fence: &Arc<Fence>, value: u32) {
        self.producer.push(Command::SignalFence {
            fence: Arc::clone(fence),
            value: Some(value),
        });
    }

    /// Queues a wait on `fence`, blocking the dispatch thread itself and
    /// thereby serializing every later command behind the fence.
    pub fn wait_for_fence(&mut self, fence: &Arc<Fence>) {
        self.producer.push(Command::WaitForFence {
            fence: Arc::clone(fence),
        });
    }

    /// Queues closing and deleting one file. Failures are logged, not fatal.
    pub fn delete_file(&mut self, file_id: FileId, bucket: u32) {
        self.producer.push(Command::DeleteFile { file_id, bucket });
    }

    /// Queues closing and deleting every file in the set.
    pub fn delete_bucket(&mut self, file_id: FileId) {
        self.producer.push(Command::DeleteBucket { file_id });
    }

    /// Publishes every staged command and wakes the dispatch thread.
    pub fn commit_commands(&mut self) {
        self.producer.commit();
    }

    /// Opens the plot file and queues its header write (committed
    /// immediately).
    ///
    /// Open failure is recoverable: the error is returned and the queue
    /// stays usable for temp-file work.
    pub fn open_plot_file(
        &mut self,
        file_name: &str,
        plot_id: [u8; 32],
        memo: &[u8],
    ) -> Result<()> {
        {
            let mut registry = self.registry.lock().expect("file registry mutex poisoned");
            registry.init_set(FileId::Plot, file_name, 1)?;
        }

        let header = PlotHeader::new(plot_id, self.k, memo);
        let header_len = header.encoded_len();

        // Lazily (re)allocate the queue-owned header buffer; it backs the
        // write command, so it stays alive until the queue shuts down.
        if self
            .plot_header
            .as_ref()
            .map_or(true, |memory| memory.len() < header_len)
        {
            self.plot_header = Some(HeapMemory::alloc(
                round_up_to_block(header_len, self.block_size),
                self.block_size,
            ));
        }
        let memory = self
            .plot_header
            .as_mut()
            .expect("plot header buffer allocated above");

        let table_pointers = header.encode_into(memory.as_mut_slice());
        self.plot_header_len = header_len;
        self.plot_table_pointers = table_pointers as u64;

        let region = IoRegion::from_raw_parts(memory.as_ptr(), header_len, memory.len());
        self.producer.push(Command::WriteFile {
            file_id: FileId::Plot,
            bucket: 0,
            buffer: region,
        });
        self.commit_commands();

        tracing::debug!(file = file_name, header_len, "plot file opened");
        Ok(())
    }

    /// Size of the encoded plot header, set by
    /// [`open_plot_file`](Self::open_plot_file).
    pub fn plot_header_len(&self) -> usize {
        self.plot_header_len
    }

    /// Offset of the table pointer area within the plot header, set by
    /// [`open_plot_file`](Self::open_plot_file).
    pub fn plot_table_pointers_offset(&self) -> u64 {
        self.plot_table_pointers
    }

    /// Synchronously folds staged buffer releases back into the heap. Used
    /// at phase boundaries to reclaim memory without waiting on allocation.
    pub fn complete_pending_releases(&self) {
        self.heap.complete_pending_releases();
    }

    /// Replaces the heap's backing storage with a fresh allocation of
    /// `heap_size` bytes. The heap must be idle.
    pub fn reset_heap(&self, heap_size: usize) -> Result<()> {
        self.heap
            .reset(HeapMemory::alloc(heap_size, self.block_size))
            .map(drop)
    }
}

impl Drop for DiskQueue {
    fn drop(&mut self) {
        self.producer.push(Command::Exit);
        self.producer.commit();

        if let Some(handle) = self.join_handle.take() {
            if handle.join().is_err() {
                tracing::error!("dispatch thread panicked during shutdown");
            }
        }
    }
}

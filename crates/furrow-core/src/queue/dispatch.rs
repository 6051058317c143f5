use std::io::{Seek, SeekFrom};
use std::process;
use std::sync::{Arc, Mutex};

use crate::buffer::{HeapMemory, WorkHeap};
use crate::core::RingConsumer;
use crate::io::FileRegistry;
use crate::io::block_io::{bucket_write_spans, read_from_file, round_up_to_block, write_to_file};
use crate::types::FileId;

use super::command::{Command, IoRegion};

/// Commands drained from the ring per batch.
pub(crate) const DISPATCH_BATCH: usize = 64;

/// Owns the consumer side of the command ring and executes every command in
/// strict FIFO order against the file registry.
pub(crate) struct Dispatcher {
    registry: Arc<Mutex<FileRegistry>>,
    heap: Arc<WorkHeap>,
    consumer: RingConsumer<Command>,
    /// One block used to zero-pad direct-mode write tails.
    scratch: HeapMemory,
    block_size: usize,
    direct_io: bool,
}

impl Dispatcher {
    pub(crate) fn new(
        registry: Arc<Mutex<FileRegistry>>,
        heap: Arc<WorkHeap>,
        consumer: RingConsumer<Command>,
        block_size: usize,
        direct_io: bool,
    ) -> Self {
        Self {
            registry,
            heap,
            consumer,
            scratch: HeapMemory::alloc(block_size, block_size),
            block_size,
            direct_io,
        }
    }

    /// Dispatch loop: wait for a commit, then drain batches of up to
    /// [`DISPATCH_BATCH`] commands, executing each to completion before the
    /// next batch. The consumed signal is raised as soon as a batch is
    /// copied out of the ring, so the producer refills while I/O proceeds.
    pub(crate) fn run(mut self) {
        let mut batch: Vec<Command> = Vec::with_capacity(DISPATCH_BATCH);

        loop {
            self.consumer.wait_ready();

            loop {
                let count = self.consumer.dequeue(&mut batch, DISPATCH_BATCH);
                if count == 0 {
                    break;
                }

                for command in batch.drain(..) {
                    if matches!(command, Command::Exit) {
                        tracing::debug!("dispatch thread exiting");
                        return;
                    }
                    self.execute(command);
                }
            }
        }
    }

    fn execute(&mut self, command: Command) {
        tracing::trace!(command = command.name(), "executing command");

        match command {
            Command::WriteBuckets {
                file_id,
                buffer,
                sizes,
            } => self.write_buckets(file_id, buffer, &sizes),
            Command::WriteFile {
                file_id,
                bucket,
                buffer,
            } => self.write_file(file_id, bucket, buffer),
            Command::ReadFile {
                file_id,
                bucket,
                buffer,
            } => self.read_file(file_id, bucket, buffer),
            Command::SeekFile {
                file_id,
                bucket,
                seek,
            } => self.seek_file(file_id, bucket, seek),
            Command::SeekBucket { file_id, seek } => self.seek_bucket(file_id, seek),
            Command::ReleaseBuffer { buffer } => self.heap.release(buffer),
            Command::SignalFence { fence, value } => match value {
                Some(value) => fence.signal_value(value),
                None => fence.signal(),
            },
            // Serializes every later command behind the fence, letting
            // producers order later I/O after earlier I/O has drained.
            Command::WaitForFence { fence } => fence.wait(),
            Command::DeleteFile { file_id, bucket } => {
                let mut registry = self.registry.lock().expect("file registry mutex poisoned");
                registry.remove_file(file_id, bucket);
            }
            Command::DeleteBucket { file_id } => {
                let mut registry = self.registry.lock().expect("file registry mutex poisoned");
                registry.remove_set(file_id);
            }
            Command::Exit => unreachable!("exit is handled by the run loop"),
        }
    }

    fn write_buckets(&mut self, file_id: FileId, buffer: IoRegion, sizes: &[u32]) {
        let registry = self.registry.lock().expect("file registry mutex poisoned");
        let set = registry
            .set(file_id)
            .unwrap_or_else(|| fatal_missing_set(file_id));

        // SAFETY: the producer keeps the backing allocation live and
        // unmutated until the matching release command executes.
        let source = unsafe { buffer.as_slice() };
        let spans = bucket_write_spans(sizes, self.block_size, self.direct_io);

        for (bucket, (offset, write_size)) in spans.into_iter().enumerate() {
            let file = set
                .file(bucket)
                .unwrap_or_else(|| fatal_missing_file(set.name(), bucket));
            if let Err(error) = write_to_file(
                file,
                write_size,
                &source[offset..],
                self.direct_io,
                self.block_size,
                self.scratch.as_mut_slice(),
            ) {
                fatal_io(set.name(), bucket, "write", &error);
            }
        }
    }

    fn write_file(&mut self, file_id: FileId, bucket: u32, buffer: IoRegion) {
        let registry = self.registry.lock().expect("file registry mutex poisoned");
        let set = registry
            .set(file_id)
            .unwrap_or_else(|| fatal_missing_set(file_id));
        let file = set
            .file(bucket as usize)
            .unwrap_or_else(|| fatal_missing_file(set.name(), bucket as usize));

        // SAFETY: see `write_buckets`.
        let source = unsafe { buffer.as_slice() };
        if let Err(error) = write_to_file(
            file,
            buffer.len(),
            source,
            self.direct_io,
            self.block_size,
            self.scratch.as_mut_slice(),
        ) {
            fatal_io(set.name(), bucket as usize, "write", &error);
        }
    }

    fn read_file(&mut self, file_id: FileId, bucket: u32, buffer: IoRegion) {
        let registry = self.registry.lock().expect("file registry mutex poisoned");
        let set = registry
            .set(file_id)
            .unwrap_or_else(|| fatal_missing_set(file_id));
        let file = set
            .file(bucket as usize)
            .unwrap_or_else(|| fatal_missing_file(set.name(), bucket as usize));

        debug_assert!(round_up_to_block(buffer.len(), self.block_size) <= buffer.cap());

        // SAFETY: the producer loaned the region for this read and will not
        // touch it until a fence confirms completion.
        let dest = unsafe { buffer.as_mut_slice() };
        if let Err(error) = read_from_file(file, buffer.len(), dest, self.direct_io, self.block_size)
        {
            fatal_io(set.name(), bucket as usize, "read", &error);
        }
    }

    fn seek_file(&mut self, file_id: FileId, bucket: u32, seek: SeekFrom) {
        let registry = self.registry.lock().expect("file registry mutex poisoned");
        let set = registry
            .set(file_id)
            .unwrap_or_else(|| fatal_missing_set(file_id));
        let mut file = set
            .file(bucket as usize)
            .unwrap_or_else(|| fatal_missing_file(set.name(), bucket as usize));

        if let Err(error) = file.seek(seek) {
            fatal_io(set.name(), bucket as usize, "seek", &error);
        }
    }

    fn seek_bucket(&mut self, file_id: FileId, seek: SeekFrom) {
        let registry = self.registry.lock().expect("file registry mutex poisoned");
        let set = registry
            .set(file_id)
            .unwrap_or_else(|| fatal_missing_set(file_id));

        for bucket in 0..set.bucket_count() {
            let mut file = set
                .file(bucket)
                .unwrap_or_else(|| fatal_missing_file(set.name(), bucket));
            if let Err(error) = file.seek(seek) {
                fatal_io(set.name(), bucket, "seek", &error);
            }
        }
    }
}

/// Dispatch-side failures are unrecoverable: the plotter's contract is that
/// local storage is present and functional, so log and abort.
fn fatal_io(name: &str, bucket: usize, op: &str, error: &std::io::Error) -> ! {
    tracing::error!(file = %name, bucket, op, %error, "unrecoverable disk I/O failure");
    process::abort();
}

fn fatal_missing_set(file_id: FileId) -> ! {
    tracing::error!(?file_id, "command targets an unopened file set");
    process::abort();
}

fn fatal_missing_file(name: &str, bucket: usize) -> ! {
    tracing::error!(file = %name, bucket, "command targets a deleted file");
    process::abort();
}

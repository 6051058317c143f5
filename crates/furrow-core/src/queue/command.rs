use std::io::SeekFrom;
use std::sync::Arc;

use crate::buffer::HeapBuffer;
use crate::core::Fence;
use crate::types::FileId;

/// Raw view of a buffer region loaned to the dispatch thread.
///
/// `len` is the logical byte count of the operation; `cap` is the reserved
/// capacity behind the pointer (block-aligned for heap buffers), which
/// direct-mode reads may fill up to.
#[derive(Debug, Clone, Copy)]
pub struct IoRegion {
    ptr: *mut u8,
    len: usize,
    cap: usize,
}

impl IoRegion {
    /// Loans `len` bytes of `buffer` to a command.
    ///
    /// # Panics
    /// Panics if `len` exceeds the buffer's reserved capacity.
    pub(crate) fn loan(buffer: &HeapBuffer, len: usize) -> Self {
        assert!(len <= buffer.capacity(), "region exceeds buffer capacity");
        Self {
            ptr: buffer.as_ptr(),
            len,
            cap: buffer.capacity(),
        }
    }

    /// Wraps a queue-owned allocation (the plot header buffer).
    pub(crate) fn from_raw_parts(ptr: *mut u8, len: usize, cap: usize) -> Self {
        debug_assert!(len <= cap);
        Self { ptr, len, cap }
    }

    /// Logical byte count of the operation.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn cap(&self) -> usize {
        self.cap
    }

    /// The loaned bytes.
    ///
    /// # Safety
    /// The region must still be live in its owning allocation and must not
    /// be mutated concurrently. The queue guarantees both between command
    /// submission and the matching release.
    pub(crate) unsafe fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// The loaned bytes, writable, spanning the full reserved capacity.
    ///
    /// # Safety
    /// As [`as_slice`](Self::as_slice), and the producer must not touch the
    /// region until a fence confirms the read completed.
    pub(crate) unsafe fn as_mut_slice(&self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.cap) }
    }
}

/// One dispatch-thread action. Variants mirror the producer methods on
/// [`DiskQueue`](crate::DiskQueue).
#[derive(Debug)]
pub enum Command {
    WriteBuckets {
        file_id: FileId,
        buffer: IoRegion,
        sizes: Box<[u32]>,
    },
    WriteFile {
        file_id: FileId,
        bucket: u32,
        buffer: IoRegion,
    },
    ReadFile {
        file_id: FileId,
        bucket: u32,
        buffer: IoRegion,
    },
    SeekFile {
        file_id: FileId,
        bucket: u32,
        seek: SeekFrom,
    },
    SeekBucket {
        file_id: FileId,
        seek: SeekFrom,
    },
    ReleaseBuffer {
        buffer: HeapBuffer,
    },
    SignalFence {
        fence: Arc<Fence>,
        value: Option<u32>,
    },
    WaitForFence {
        fence: Arc<Fence>,
    },
    DeleteFile {
        file_id: FileId,
        bucket: u32,
    },
    DeleteBucket {
        file_id: FileId,
    },
    /// Shuts the dispatch thread down; sent by the queue's `Drop`.
    Exit,
}

// SAFETY: `IoRegion` pointers target heap or queue-owned allocations that
// outlive the dispatch thread, and the producer contract forbids mutable
// aliasing while a command referencing them is in flight.
unsafe impl Send for Command {}

impl Command {
    /// Short name used in dispatch trace logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::WriteBuckets { .. } => "WriteBuckets",
            Command::WriteFile { .. } => "WriteFile",
            Command::ReadFile { .. } => "ReadFile",
            Command::SeekFile { .. } => "SeekFile",
            Command::SeekBucket { .. } => "SeekBucket",
            Command::ReleaseBuffer { .. } => "ReleaseBuffer",
            Command::SignalFence { .. } => "SignalFence",
            Command::WaitForFence { .. } => "WaitForFence",
            Command::DeleteFile { .. } => "DeleteFile",
            Command::DeleteBucket { .. } => "DeleteBucket",
            Command::Exit => "Exit",
        }
    }
}

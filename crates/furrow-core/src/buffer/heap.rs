use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::{Condvar, Mutex};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::error::FurrowError;
use crate::types::Result;

use super::memory::HeapMemory;

/// Arena of block-aligned bucket buffers shared between the producer and
/// the dispatch thread.
///
/// Every reservation is rounded up to the heap alignment, so buffers always
/// satisfy the direct-I/O contract of the temp files and never overlap.
/// Releases arrive from the dispatch thread through a staging channel and
/// are folded back into the free list the next time an allocation runs, or
/// synchronously via [`complete_pending_releases`](Self::complete_pending_releases).
#[derive(Debug)]
pub struct WorkHeap {
    state: Mutex<HeapState>,
    space_freed: Condvar,
    pending_tx: Sender<PendingRelease>,
    pending_rx: Receiver<PendingRelease>,
    align: usize,
}

#[derive(Debug)]
struct HeapState {
    memory: HeapMemory,
    /// Free regions sorted by offset; lengths and offsets are always
    /// multiples of the heap alignment.
    free: Vec<FreeRegion>,
    live: usize,
}

#[derive(Debug, Clone, Copy)]
struct FreeRegion {
    offset: usize,
    len: usize,
}

#[derive(Debug)]
struct PendingRelease {
    offset: usize,
    len: usize,
}

impl WorkHeap {
    /// Wraps `memory` as the heap's backing storage. The memory's alignment
    /// becomes the allocation granularity.
    pub fn new(memory: HeapMemory) -> Self {
        let align = memory.align();
        let usable = memory.len() / align * align;
        let free = if usable > 0 {
            vec![FreeRegion {
                offset: 0,
                len: usable,
            }]
        } else {
            Vec::new()
        };

        let (pending_tx, pending_rx) = unbounded();
        Self {
            state: Mutex::new(HeapState {
                memory,
                free,
                live: 0,
            }),
            space_freed: Condvar::new(),
            pending_tx,
            pending_rx,
            align,
        }
    }

    /// Allocation granularity; every buffer's pointer and capacity are
    /// multiples of it.
    pub fn align(&self) -> usize {
        self.align
    }

    /// Reserves `len` bytes, blocking until the heap can satisfy the
    /// request. Fails fast if `len` can never fit.
    pub fn alloc(&self, len: usize) -> Result<HeapBuffer> {
        let reserve = len.max(1).div_ceil(self.align) * self.align;

        let mut state = self.state.lock().expect("heap mutex poisoned");
        let capacity = state.memory.len() / self.align * self.align;
        if reserve > capacity {
            return Err(FurrowError::AllocTooLarge {
                requested: len,
                capacity,
            });
        }

        loop {
            self.drain_pending(&mut state);

            if let Some(offset) = take_first_fit(&mut state.free, reserve) {
                state.live += 1;
                // SAFETY: `offset + reserve <= memory.len()`, so the pointer
                // stays inside the backing allocation.
                let ptr = unsafe { state.memory.as_ptr().add(offset) };
                return Ok(HeapBuffer {
                    ptr: NonNull::new(ptr).expect("heap base pointer is non-null"),
                    offset,
                    len,
                    cap: reserve,
                });
            }

            tracing::debug!(requested = len, "work heap exhausted; waiting for releases");
            state = self
                .space_freed
                .wait(state)
                .expect("heap mutex poisoned");
        }
    }

    /// Returns a buffer's region to the heap.
    ///
    /// Normally invoked by the dispatch thread when a `ReleaseBuffer`
    /// command executes; the region is staged and folded into the free list
    /// by the next allocation.
    pub fn release(&self, buffer: HeapBuffer) {
        self.pending_tx
            .send(PendingRelease {
                offset: buffer.offset,
                len: buffer.cap,
            })
            .expect("heap release channel closed");

        // Taking the lock serializes with an allocator that has checked the
        // free list but not yet parked, so the wakeup cannot be lost.
        let _state = self.state.lock().expect("heap mutex poisoned");
        self.space_freed.notify_all();
    }

    /// Synchronously folds every staged release back into the free list.
    ///
    /// Used at phase boundaries to reclaim buffers whose release commands
    /// have already executed.
    pub fn complete_pending_releases(&self) {
        let mut state = self.state.lock().expect("heap mutex poisoned");
        self.drain_pending(&mut state);
    }

    /// Replaces the backing storage, returning the previous memory.
    ///
    /// The caller guarantees the heap is idle; live allocations make this
    /// fail with [`FurrowError::HeapNotIdle`].
    pub fn reset(&self, memory: HeapMemory) -> Result<HeapMemory> {
        let mut state = self.state.lock().expect("heap mutex poisoned");
        self.drain_pending(&mut state);

        if state.live > 0 {
            return Err(FurrowError::HeapNotIdle { live: state.live });
        }

        let usable = memory.len() / self.align * self.align;
        state.free.clear();
        if usable > 0 {
            state.free.push(FreeRegion {
                offset: 0,
                len: usable,
            });
        }
        Ok(std::mem::replace(&mut state.memory, memory))
    }

    /// Snapshot of the heap's occupancy.
    pub fn stats(&self) -> HeapStats {
        let state = self.state.lock().expect("heap mutex poisoned");
        HeapStats {
            capacity: state.memory.len(),
            free: state.free.iter().map(|region| region.len).sum(),
            live: state.live,
            pending_releases: self.pending_rx.len(),
        }
    }

    fn drain_pending(&self, state: &mut HeapState) {
        while let Ok(released) = self.pending_rx.try_recv() {
            insert_free(&mut state.free, released.offset, released.len);
            state.live -= 1;
        }
    }
}

fn take_first_fit(free: &mut Vec<FreeRegion>, reserve: usize) -> Option<usize> {
    let index = free.iter().position(|region| region.len >= reserve)?;
    let region = &mut free[index];
    let offset = region.offset;
    region.offset += reserve;
    region.len -= reserve;
    if region.len == 0 {
        free.remove(index);
    }
    Some(offset)
}

fn insert_free(free: &mut Vec<FreeRegion>, offset: usize, len: usize) {
    let index = free
        .iter()
        .position(|region| region.offset > offset)
        .unwrap_or(free.len());
    free.insert(index, FreeRegion { offset, len });

    // Coalesce with the following region, then the preceding one.
    if index + 1 < free.len() && free[index].offset + free[index].len == free[index + 1].offset {
        free[index].len += free[index + 1].len;
        free.remove(index + 1);
    }
    if index > 0 && free[index - 1].offset + free[index - 1].len == free[index].offset {
        free[index - 1].len += free[index].len;
        free.remove(index);
    }
}

/// A snapshot of work heap occupancy at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    /// Backing allocation size in bytes.
    pub capacity: usize,
    /// Bytes currently in the free list.
    pub free: usize,
    /// Live allocations, including those with a staged release.
    pub live: usize,
    /// Releases staged but not yet folded into the free list.
    pub pending_releases: usize,
}

/// Handle to one live allocation in a [`WorkHeap`].
///
/// The handle is the only way to touch its region: producers fill it through
/// `DerefMut`, loan it to write commands, and give it back with a
/// `ReleaseBuffer` command, which consumes the handle so post-release access
/// cannot compile. While a write command referencing the region is in flight
/// the producer must not mutate the contents; the heap keeps the region
/// reserved until the release executes.
///
/// Dropping the handle without queueing a release leaks the region until the
/// heap is reset.
#[derive(Debug)]
pub struct HeapBuffer {
    ptr: NonNull<u8>,
    offset: usize,
    len: usize,
    cap: usize,
}

// SAFETY: the handle uniquely identifies a reserved, non-overlapping heap
// region; sending it to the dispatch thread transfers that exclusivity.
unsafe impl Send for HeapBuffer {}

impl HeapBuffer {
    /// Logical length requested at allocation time.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reserved capacity behind the pointer, always a multiple of the heap
    /// alignment.
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Base pointer of the reserved region.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

impl Deref for HeapBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        // SAFETY: the region is reserved for this handle and stays mapped
        // for the heap's lifetime.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for HeapBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: as above, plus `&mut self` guarantees exclusive access on
        // the producer side.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

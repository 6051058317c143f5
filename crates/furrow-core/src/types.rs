use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::FurrowError;

pub type Result<T> = std::result::Result<T, FurrowError>;

/// Default number of buckets for bucketed file sets.
pub const DEFAULT_BUCKET_COUNT: u32 = 256;

/// Default capacity of the command ring.
pub const DEFAULT_RING_CAPACITY: usize = 256;

/// Default work heap size in bytes.
pub const DEFAULT_HEAP_SIZE: usize = 64 * 1024 * 1024;

/// Identifies one logical file set used by the plotter.
///
/// Bucketed sets are split into one temp file per bucket; per-table
/// left/right and marked-entry sets are monolithic, as is the plot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileId {
    Y0,
    Y1,
    MetaA0,
    MetaA1,
    MetaB0,
    MetaB1,
    X,
    F7,
    T2L,
    T2R,
    T3L,
    T3R,
    T4L,
    T4R,
    T5L,
    T5R,
    T6L,
    T6R,
    T7L,
    T7R,
    SortKey2,
    SortKey3,
    SortKey4,
    SortKey5,
    SortKey6,
    SortKey7,
    Map2,
    Map3,
    Map4,
    Map5,
    Map6,
    Map7,
    MarkedEntries2,
    MarkedEntries3,
    MarkedEntries4,
    MarkedEntries5,
    MarkedEntries6,
    Plot,
}

impl FileId {
    /// Total number of file ids, including [`FileId::Plot`].
    pub const COUNT: usize = 38;

    /// Every temporary file set, in registry order. The plot file is opened
    /// on demand via `open_plot_file` and is not listed here.
    pub const TEMP: [FileId; 37] = [
        FileId::Y0,
        FileId::Y1,
        FileId::MetaA0,
        FileId::MetaA1,
        FileId::MetaB0,
        FileId::MetaB1,
        FileId::X,
        FileId::F7,
        FileId::T2L,
        FileId::T2R,
        FileId::T3L,
        FileId::T3R,
        FileId::T4L,
        FileId::T4R,
        FileId::T5L,
        FileId::T5R,
        FileId::T6L,
        FileId::T6R,
        FileId::T7L,
        FileId::T7R,
        FileId::SortKey2,
        FileId::SortKey3,
        FileId::SortKey4,
        FileId::SortKey5,
        FileId::SortKey6,
        FileId::SortKey7,
        FileId::Map2,
        FileId::Map3,
        FileId::Map4,
        FileId::Map5,
        FileId::Map6,
        FileId::Map7,
        FileId::MarkedEntries2,
        FileId::MarkedEntries3,
        FileId::MarkedEntries4,
        FileId::MarkedEntries5,
        FileId::MarkedEntries6,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Base name used to form this set's on-disk file names.
    pub fn base_name(self) -> &'static str {
        match self {
            FileId::Y0 => "y0",
            FileId::Y1 => "y1",
            FileId::MetaA0 => "meta_a0",
            FileId::MetaA1 => "meta_a1",
            FileId::MetaB0 => "meta_b0",
            FileId::MetaB1 => "meta_b1",
            FileId::X => "x",
            FileId::F7 => "f7",
            FileId::T2L => "table_2_l",
            FileId::T2R => "table_2_r",
            FileId::T3L => "table_3_l",
            FileId::T3R => "table_3_r",
            FileId::T4L => "table_4_l",
            FileId::T4R => "table_4_r",
            FileId::T5L => "table_5_l",
            FileId::T5R => "table_5_r",
            FileId::T6L => "table_6_l",
            FileId::T6R => "table_6_r",
            FileId::T7L => "table_7_l",
            FileId::T7R => "table_7_r",
            FileId::SortKey2 => "table_2_key",
            FileId::SortKey3 => "table_3_key",
            FileId::SortKey4 => "table_4_key",
            FileId::SortKey5 => "table_5_key",
            FileId::SortKey6 => "table_6_key",
            FileId::SortKey7 => "table_7_key",
            FileId::Map2 => "table_2_map",
            FileId::Map3 => "table_3_map",
            FileId::Map4 => "table_4_map",
            FileId::Map5 => "table_5_map",
            FileId::Map6 => "table_6_map",
            FileId::Map7 => "table_7_map",
            FileId::MarkedEntries2 => "table_2_marks",
            FileId::MarkedEntries3 => "table_3_marks",
            FileId::MarkedEntries4 => "table_4_marks",
            FileId::MarkedEntries5 => "table_5_marks",
            FileId::MarkedEntries6 => "table_6_marks",
            FileId::Plot => "plot",
        }
    }

    /// Whether this set is split across the configured bucket count.
    pub fn is_bucketed(self) -> bool {
        !matches!(
            self,
            FileId::T2L
                | FileId::T2R
                | FileId::T3L
                | FileId::T3R
                | FileId::T4L
                | FileId::T4R
                | FileId::T5L
                | FileId::T5R
                | FileId::T6L
                | FileId::T6R
                | FileId::T7L
                | FileId::T7R
                | FileId::MarkedEntries2
                | FileId::MarkedEntries3
                | FileId::MarkedEntries4
                | FileId::MarkedEntries5
                | FileId::MarkedEntries6
                | FileId::Plot
        )
    }
}

/// Configuration for [`DiskQueue::spawn`](crate::DiskQueue::spawn).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Directory holding the temporary work files.
    pub work_dir: PathBuf,
    /// Number of buckets for bucketed file sets.
    pub bucket_count: u32,
    /// Size of the work heap backing allocation in bytes.
    pub heap_size: usize,
    /// Bypass the OS page cache and perform block-aligned I/O.
    pub direct_io: bool,
    /// Capacity of the command ring.
    pub ring_capacity: usize,
    /// Plot space parameter written into the plot header.
    pub k: u8,
}

impl QueueConfig {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            bucket_count: DEFAULT_BUCKET_COUNT,
            heap_size: DEFAULT_HEAP_SIZE,
            direct_io: false,
            ring_capacity: DEFAULT_RING_CAPACITY,
            k: 32,
        }
    }

    pub fn with_bucket_count(mut self, bucket_count: u32) -> Self {
        self.bucket_count = bucket_count;
        self
    }

    pub fn with_heap_size(mut self, heap_size: usize) -> Self {
        self.heap_size = heap_size;
        self
    }

    pub fn with_direct_io(mut self, direct_io: bool) -> Self {
        self.direct_io = direct_io;
        self
    }

    pub fn with_ring_capacity(mut self, ring_capacity: usize) -> Self {
        self.ring_capacity = ring_capacity;
        self
    }

    pub fn with_k(mut self, k: u8) -> Self {
        self.k = k;
        self
    }
}

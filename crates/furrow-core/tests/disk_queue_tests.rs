use std::io::SeekFrom;
use std::sync::Arc;
use std::time::Duration;

use furrow_core::{DiskQueue, Fence, FileId, FurrowError, QueueConfig};
use tempfile::{TempDir, tempdir};

const BUCKETS: u32 = 4;

fn test_queue() -> (TempDir, DiskQueue) {
    let dir = tempdir().expect("create temp work dir");
    let config = QueueConfig::new(dir.path())
        .with_bucket_count(BUCKETS)
        .with_heap_size(4 * 1024 * 1024)
        .with_ring_capacity(64);
    let queue = DiskQueue::spawn(config).expect("spawn disk queue");
    (dir, queue)
}

/// Queues a fence signal, commits, and blocks until the dispatch thread has
/// executed everything staged before it.
fn drain(queue: &mut DiskQueue, fence: &Arc<Fence>) {
    queue.signal_fence(fence);
    queue.commit_commands();
    fence.wait();
}

#[test]
fn spawn_creates_every_temp_file() {
    let (dir, queue) = test_queue();

    for file_id in FileId::TEMP {
        let buckets = if file_id.is_bucketed() { BUCKETS } else { 1 };
        for bucket in 0..buckets {
            let path = dir
                .path()
                .join(format!("{}_{bucket}.tmp", file_id.base_name()));
            assert!(path.is_file(), "missing {}", path.display());
        }
    }

    assert!(queue.block_size() >= 2);
    drop(queue);
}

#[test]
fn write_seek_read_round_trip() {
    let (_dir, mut queue) = test_queue();
    let fence = Arc::new(Fence::new());

    let mut source = queue.get_buffer(8192).unwrap();
    for (index, byte) in source.iter_mut().enumerate() {
        *byte = (index % 251) as u8;
    }
    let expected = source.to_vec();

    let mut dest = queue.get_buffer(8192).unwrap();
    dest.fill(0);

    queue.write_file(FileId::Y0, 1, &source, 8192);
    queue.seek_file(FileId::Y0, 1, SeekFrom::Start(0));
    queue.read_file(FileId::Y0, 1, &mut dest, 8192);
    drain(&mut queue, &fence);

    assert_eq!(&dest[..], &expected[..]);

    queue.release_buffer(source);
    queue.release_buffer(dest);
    queue.commit_commands();
}

#[test]
fn commands_execute_in_submission_order() {
    let (_dir, mut queue) = test_queue();
    let fence = Arc::new(Fence::new());

    // Three writes to the same bucket, back to back; the file must contain
    // them in program order.
    let mut buffer = queue.get_buffer(3 * 64).unwrap();
    for chunk in 0..3u8 {
        buffer[chunk as usize * 64..(chunk as usize + 1) * 64].fill(chunk + 1);
    }

    for chunk in 0..3usize {
        let piece = &buffer[chunk * 64..(chunk + 1) * 64];
        // Write each piece through its own staged command.
        let mut staged = queue.get_buffer(64).unwrap();
        staged.copy_from_slice(piece);
        queue.write_file(FileId::X, 0, &staged, 64);
        queue.release_buffer(staged);
    }
    drain(&mut queue, &fence);

    let mut read_back = queue.get_buffer(192).unwrap();
    queue.seek_file(FileId::X, 0, SeekFrom::Start(0));
    queue.read_file(FileId::X, 0, &mut read_back, 192);
    drain(&mut queue, &fence);

    assert_eq!(&read_back[..64], &[1u8; 64][..]);
    assert_eq!(&read_back[64..128], &[2u8; 64][..]);
    assert_eq!(&read_back[128..192], &[3u8; 64][..]);
}

#[test]
fn wait_for_fence_gates_later_commands() {
    let (dir, mut queue) = test_queue();

    let written = Arc::new(Fence::new());
    let gate = Arc::new(Fence::new());
    let drained = Arc::new(Fence::new());

    let mut first = queue.get_buffer(512).unwrap();
    first.fill(0xA1);
    let mut second = queue.get_buffer(512).unwrap();
    second.fill(0xB2);

    queue.write_file(FileId::Y0, 3, &first, 512);
    queue.signal_fence(&written);
    queue.wait_for_fence(&gate);
    queue.write_file(FileId::Y1, 3, &second, 512);
    queue.signal_fence(&drained);
    queue.commit_commands();

    // The first write has drained; the dispatch thread is parked on the
    // gate, so the second file must still be empty.
    written.wait();
    let y0 = std::fs::read(dir.path().join("y0_3.tmp")).unwrap();
    assert_eq!(y0, vec![0xA1u8; 512]);
    assert_eq!(
        std::fs::metadata(dir.path().join("y1_3.tmp")).unwrap().len(),
        0
    );

    gate.signal();
    drained.wait();
    let y1 = std::fs::read(dir.path().join("y1_3.tmp")).unwrap();
    assert_eq!(y1, vec![0xB2u8; 512]);

    queue.release_buffer(first);
    queue.release_buffer(second);
    queue.commit_commands();
}

#[test]
fn write_buckets_splits_a_packed_buffer() {
    let (dir, mut queue) = test_queue();
    let fence = Arc::new(Fence::new());

    // Buffered mode packs buckets back to back.
    let sizes = [300u32, 700, 41, 1024];
    let total: usize = sizes.iter().map(|&size| size as usize).sum();

    let mut buffer = queue.get_buffer(total).unwrap();
    let mut cursor = 0usize;
    for (bucket, &size) in sizes.iter().enumerate() {
        buffer[cursor..cursor + size as usize].fill(bucket as u8 + 10);
        cursor += size as usize;
    }

    queue.write_buckets(FileId::F7, &buffer, &sizes);
    drain(&mut queue, &fence);

    for (bucket, &size) in sizes.iter().enumerate() {
        let path = dir.path().join(format!("f7_{bucket}.tmp"));
        let contents = std::fs::read(&path).unwrap();
        assert_eq!(contents.len(), size as usize, "bucket {bucket} length");
        assert!(
            contents.iter().all(|&byte| byte == bucket as u8 + 10),
            "bucket {bucket} contents"
        );
    }

    queue.release_buffer(buffer);
    queue.commit_commands();
}

#[test]
fn seek_bucket_rewinds_every_file() {
    let (_dir, mut queue) = test_queue();
    let fence = Arc::new(Fence::new());

    let mut buffer = queue.get_buffer(256).unwrap();
    buffer.fill(0x77);
    for bucket in 0..BUCKETS {
        queue.write_file(FileId::SortKey2, bucket, &buffer, 256);
    }
    queue.seek_bucket(FileId::SortKey2, SeekFrom::Start(0));

    let mut reads = Vec::new();
    for bucket in 0..BUCKETS {
        let mut dest = queue.get_buffer(256).unwrap();
        queue.read_file(FileId::SortKey2, bucket, &mut dest, 256);
        reads.push(dest);
    }
    drain(&mut queue, &fence);

    for dest in &reads {
        assert!(dest.iter().all(|&byte| byte == 0x77));
    }
}

#[test]
fn delete_commands_remove_files_from_disk() {
    let (dir, mut queue) = test_queue();
    let fence = Arc::new(Fence::new());

    let y0_2 = dir.path().join("y0_2.tmp");
    assert!(y0_2.is_file());

    queue.delete_file(FileId::Y0, 2);
    queue.delete_bucket(FileId::Map3);
    drain(&mut queue, &fence);

    assert!(!y0_2.exists());
    for bucket in 0..BUCKETS {
        assert!(!dir.path().join(format!("table_3_map_{bucket}.tmp")).exists());
    }

    // The rest of the set survives a single-file delete.
    assert!(dir.path().join("y0_0.tmp").is_file());
}

#[test]
fn released_buffers_are_reusable_after_the_release_executes() {
    let (_dir, mut queue) = test_queue();
    let fence = Arc::new(Fence::new());

    let block = queue.block_size();
    let stats_before = queue.heap_stats();

    let buffer = queue.get_buffer(4 * block).unwrap();
    queue.release_buffer(buffer);
    drain(&mut queue, &fence);
    queue.complete_pending_releases();

    let stats_after = queue.heap_stats();
    assert_eq!(stats_after.live, stats_before.live);
    assert_eq!(stats_after.free, stats_before.free);
}

#[test]
fn reset_heap_swaps_backing_storage_when_idle() {
    let (_dir, mut queue) = test_queue();
    let fence = Arc::new(Fence::new());

    let held = queue.get_buffer(1024).unwrap();
    assert!(matches!(
        queue.reset_heap(8 * 1024 * 1024),
        Err(FurrowError::HeapNotIdle { .. })
    ));

    queue.release_buffer(held);
    drain(&mut queue, &fence);

    queue.reset_heap(8 * 1024 * 1024).unwrap();
    assert_eq!(queue.heap_stats().capacity, 8 * 1024 * 1024);

    // The fresh heap serves allocations.
    let buffer = queue.get_buffer(1024).unwrap();
    queue.release_buffer(buffer);
    queue.commit_commands();
}

#[test]
fn open_plot_file_writes_the_header() {
    let (dir, mut queue) = test_queue();
    let fence = Arc::new(Fence::new());

    let plot_id: [u8; 32] = core::array::from_fn(|index| index as u8);
    let memo = vec![0xCDu8; 48];
    queue
        .open_plot_file("final.plot.tmp", plot_id, &memo)
        .unwrap();
    drain(&mut queue, &fence);

    let header = std::fs::read(dir.path().join("final.plot.tmp")).unwrap();
    assert_eq!(header.len(), queue.plot_header_len());

    let magic = furrow_core::PLOT_MAGIC;
    assert_eq!(&header[..magic.len()], magic);
    assert_eq!(&header[magic.len()..magic.len() + 32], &plot_id);
    assert_eq!(header[magic.len() + 32], 32);

    let tables_offset = queue.plot_table_pointers_offset() as usize;
    assert_eq!(
        tables_offset,
        header.len() - furrow_core::PLOT_TABLE_POINTERS_SIZE
    );
    let memo_start = tables_offset - memo.len();
    assert_eq!(&header[memo_start..tables_offset], &memo[..]);
}

#[test]
fn open_plot_file_failure_is_recoverable() {
    let (_dir, mut queue) = test_queue();
    let fence = Arc::new(Fence::new());

    let result = queue.open_plot_file("missing-dir/final.plot.tmp", [0u8; 32], b"memo");
    assert!(matches!(result, Err(FurrowError::PlotFileOpen { .. })));

    // Temp-file work continues after the failed open.
    let mut buffer = queue.get_buffer(128).unwrap();
    buffer.fill(0x33);
    queue.write_file(FileId::Y1, 0, &buffer, 128);
    drain(&mut queue, &fence);

    queue.release_buffer(buffer);
    queue.commit_commands();
}

#[test]
fn fence_values_track_dispatch_progress() {
    let (_dir, mut queue) = test_queue();
    let fence = Arc::new(Fence::new());

    let mut buffer = queue.get_buffer(64).unwrap();
    buffer.fill(1);

    for step in 1..=10u32 {
        queue.write_file(FileId::MetaA0, 0, &buffer, 64);
        queue.signal_fence_value(&fence, step);
    }
    queue.commit_commands();

    let mut last = 0u32;
    for _ in 0..10 {
        fence.wait();
        let value = fence.value();
        assert!(value >= last, "fence value regressed");
        last = value;
    }
    assert_eq!(last, 10);
}

#[test]
fn drop_joins_the_dispatch_thread_after_draining() {
    let (dir, mut queue) = test_queue();

    let mut buffer = queue.get_buffer(2048).unwrap();
    buffer.fill(0x9E);
    queue.write_file(FileId::T4L, 0, &buffer, 2048);
    queue.release_buffer(buffer);
    queue.commit_commands();

    // Dropping must execute the committed write before joining.
    drop(queue);

    let contents = std::fs::read(dir.path().join("table_4_l_0.tmp")).unwrap();
    assert_eq!(contents, vec![0x9Eu8; 2048]);
}

#[test]
fn backpressured_producer_makes_progress() {
    let dir = tempdir().unwrap();
    let config = QueueConfig::new(dir.path())
        .with_bucket_count(2)
        .with_heap_size(1024 * 1024)
        .with_ring_capacity(4);
    let mut queue = DiskQueue::spawn(config).unwrap();
    let fence = Arc::new(Fence::new());

    let mut buffer = queue.get_buffer(64).unwrap();
    buffer.fill(0x11);

    // Far more commands than ring slots; commits let the dispatch thread
    // drain while the producer refills.
    for _ in 0..100 {
        queue.write_file(FileId::Y0, 0, &buffer, 64);
        queue.commit_commands();
    }
    drain(&mut queue, &fence);

    // Exactly one signal per drain; nothing left over.
    assert!(!fence.wait_timeout(Duration::from_millis(0)));
    queue.release_buffer(buffer);
    queue.commit_commands();
}

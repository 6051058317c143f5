use std::fs::File;
use std::io::{self, Read, Write};

/// Rounds `size` up to the next multiple of `block_size`.
pub fn round_up_to_block(size: usize, block_size: usize) -> usize {
    size.div_ceil(block_size) * block_size
}

/// Per-bucket `(source offset, write length)` spans for a packed bucket
/// buffer submitted as one write.
///
/// In direct mode each bucket writes only its block-aligned prefix and the
/// next bucket's data starts at the following block boundary; the caller
/// writes remainders explicitly later. Buffered mode writes every byte and
/// packs buckets back to back.
pub fn bucket_write_spans(
    sizes: &[u32],
    block_size: usize,
    direct_io: bool,
) -> Vec<(usize, usize)> {
    let mut spans = Vec::with_capacity(sizes.len());
    let mut offset = 0usize;

    for &size in sizes {
        let size = size as usize;
        let write_size = if direct_io {
            size / block_size * block_size
        } else {
            size
        };
        spans.push((offset, write_size));

        offset += if direct_io {
            round_up_to_block(size, block_size)
        } else {
            size
        };
    }

    spans
}

/// Writes `size` bytes from `buffer` to `file`.
///
/// Buffered mode writes the bytes verbatim. Direct mode writes whole blocks
/// only: the block-aligned prefix goes out first and a non-zero remainder is
/// zero-padded through `scratch` (exactly one block), so the file grows to
/// the next block boundary. Callers track logical sizes out-of-band.
pub fn write_to_file(
    file: &File,
    size: usize,
    buffer: &[u8],
    direct_io: bool,
    block_size: usize,
    scratch: &mut [u8],
) -> io::Result<()> {
    debug_assert!(buffer.len() >= size);
    let mut writer = file;

    if !direct_io {
        return writer.write_all(&buffer[..size]);
    }

    let aligned = size / block_size * block_size;
    writer.write_all(&buffer[..aligned])?;

    let remainder = size - aligned;
    if remainder > 0 {
        debug_assert!(scratch.len() >= block_size);
        let block = &mut scratch[..block_size];
        block.fill(0);
        block[..remainder].copy_from_slice(&buffer[aligned..size]);
        writer.write_all(block)?;
    }

    Ok(())
}

/// Reads `size` logical bytes from `file` into `buffer`.
///
/// Direct mode reads the block-rounded length; `buffer` must have room for
/// it (heap buffers always do, their capacity is block-aligned). Only the
/// first `size` bytes are meaningful to the caller.
pub fn read_from_file(
    file: &File,
    size: usize,
    buffer: &mut [u8],
    direct_io: bool,
    block_size: usize,
) -> io::Result<()> {
    let read_len = if direct_io {
        round_up_to_block(size, block_size)
    } else {
        size
    };
    debug_assert!(buffer.len() >= read_len);

    let mut reader = file;
    reader.read_exact(&mut buffer[..read_len])
}

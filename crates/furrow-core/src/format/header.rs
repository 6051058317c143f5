/// Magic bytes opening every plot file.
pub const PLOT_MAGIC: &[u8] = b"Proof of Space Plot";

/// Plot format description embedded in the header.
pub const FORMAT_DESCRIPTION: &[u8] = b"v1.0";

/// Reserved space for the ten 64-bit big-endian table pointers.
pub const PLOT_TABLE_POINTERS_SIZE: usize = 80;

/// Plot-file header fields supplied by the caller.
///
/// Encoded layout, in order: magic, 32-byte plot id, `k`, big-endian u16
/// format-description length plus bytes, big-endian u16 memo length plus
/// bytes, and the table pointer area the plotter fills in once the tables
/// are final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotHeader {
    pub plot_id: [u8; 32],
    pub k: u8,
    pub memo: Vec<u8>,
}

impl PlotHeader {
    /// Creates a header. The memo length must fit the on-disk u16 field.
    ///
    /// # Panics
    /// Panics if `memo` is longer than `u16::MAX` bytes.
    pub fn new(plot_id: [u8; 32], k: u8, memo: impl Into<Vec<u8>>) -> Self {
        let memo = memo.into();
        assert!(memo.len() <= u16::MAX as usize, "plot memo too long");
        Self { plot_id, k, memo }
    }

    /// Total encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        PLOT_MAGIC.len()
            + 32
            + 1
            + 2
            + FORMAT_DESCRIPTION.len()
            + 2
            + self.memo.len()
            + PLOT_TABLE_POINTERS_SIZE
    }

    /// Offset of the table pointer area within the encoded header.
    pub fn table_pointers_offset(&self) -> usize {
        self.encoded_len() - PLOT_TABLE_POINTERS_SIZE
    }

    /// Encodes the header into `out` and returns the table pointer offset.
    /// The pointer area itself is left untouched; the plotter writes it at
    /// the end of the run.
    ///
    /// # Panics
    /// Panics if `out` is shorter than [`encoded_len`](Self::encoded_len).
    pub fn encode_into(&self, out: &mut [u8]) -> usize {
        assert!(out.len() >= self.encoded_len(), "header buffer too small");

        let mut cursor = 0usize;

        out[cursor..cursor + PLOT_MAGIC.len()].copy_from_slice(PLOT_MAGIC);
        cursor += PLOT_MAGIC.len();

        out[cursor..cursor + 32].copy_from_slice(&self.plot_id);
        cursor += 32;

        out[cursor] = self.k;
        cursor += 1;

        let desc_len = FORMAT_DESCRIPTION.len() as u16;
        out[cursor..cursor + 2].copy_from_slice(&desc_len.to_be_bytes());
        cursor += 2;
        out[cursor..cursor + FORMAT_DESCRIPTION.len()].copy_from_slice(FORMAT_DESCRIPTION);
        cursor += FORMAT_DESCRIPTION.len();

        let memo_len = self.memo.len() as u16;
        out[cursor..cursor + 2].copy_from_slice(&memo_len.to_be_bytes());
        cursor += 2;
        out[cursor..cursor + self.memo.len()].copy_from_slice(&self.memo);
        cursor += self.memo.len();

        debug_assert_eq!(cursor, self.table_pointers_offset());
        cursor
    }
}

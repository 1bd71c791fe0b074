//! Reusable per-column scratch buffers.
//!
//! Sort keys and index buffers are allocated once per chunk and reused across
//! operations; they live as long as the column and are released with it.

use crate::column::chunk::AlignedChunk;
use crate::column::Element;
use crate::error::GalleonError;

/// Lazily materialized scratch space owned by a column.
#[derive(Default)]
pub struct ColumnScratch<T: Element> {
    /// Per-chunk order-preserving `u64` sort keys.
    pub sort_keys: Vec<Vec<u64>>,
    /// Per-chunk local row indices, permuted alongside the keys.
    pub sort_indices: Vec<Vec<u32>>,
    /// Ping-pong partners for the radix passes.
    pub sort_keys_tmp: Vec<Vec<u64>>,
    pub sort_indices_tmp: Vec<Vec<u32>>,
    /// One chunk-sized staging buffer of `T`.
    pub temp_chunk: Option<AlignedChunk<T>>,
}

impl<T: Element> ColumnScratch<T> {
    /// Sizes the per-chunk sort buffers to match `chunk_sizes`, reusing any
    /// existing allocations.
    pub fn ensure_sort_buffers(&mut self, chunk_sizes: &[usize]) {
        let n = chunk_sizes.len();
        self.sort_keys.resize_with(n, Vec::new);
        self.sort_indices.resize_with(n, Vec::new);
        self.sort_keys_tmp.resize_with(n, Vec::new);
        self.sort_indices_tmp.resize_with(n, Vec::new);
        for (c, &size) in chunk_sizes.iter().enumerate() {
            self.sort_keys[c].resize(size, 0);
            self.sort_indices[c].resize(size, 0);
            self.sort_keys_tmp[c].resize(size, 0);
            self.sort_indices_tmp[c].resize(size, 0);
        }
    }

    /// Materializes the chunk-sized temp buffer.
    pub fn ensure_temp_chunk(&mut self) -> Result<&mut AlignedChunk<T>, GalleonError> {
        if self.temp_chunk.is_none() {
            self.temp_chunk = Some(AlignedChunk::new()?);
        }
        match self.temp_chunk.as_mut() {
            Some(chunk) => Ok(chunk),
            None => Err(GalleonError::Memory("temp chunk unavailable".to_string())),
        }
    }
}

//! Chunked columnar storage.
//!
//! A column stores its values in fixed-size, cache-aligned chunks of
//! [`CHUNK_SIZE`](crate::CHUNK_SIZE) elements. Every chunk except the last is
//! full, so element addressing is a shift and a mask away. Columns optionally
//! own reusable scratch buffers for the sort paths.

pub mod chunk;
pub mod scratch;

pub use chunk::AlignedChunk;
pub use scratch::ColumnScratch;

use crate::error::GalleonError;
use crate::CHUNK_SIZE;

/// Primitive element types a column can hold.
pub trait Element:
    Copy + Default + PartialEq + PartialOrd + Send + Sync + std::fmt::Debug + 'static
{
    /// Order-preserving mapping into `u64`, used for the scratch sort keys.
    fn sort_key(self) -> u64;
}

impl Element for f64 {
    fn sort_key(self) -> u64 {
        let bits = self.to_bits();
        if bits >> 63 == 1 {
            !bits
        } else {
            bits ^ (1u64 << 63)
        }
    }
}

impl Element for f32 {
    fn sort_key(self) -> u64 {
        let bits = self.to_bits();
        let key = if bits >> 31 == 1 {
            !bits
        } else {
            bits ^ (1u32 << 31)
        };
        key as u64
    }
}

impl Element for i64 {
    fn sort_key(self) -> u64 {
        (self as u64) ^ (1u64 << 63)
    }
}

impl Element for i32 {
    fn sort_key(self) -> u64 {
        ((self as u32) ^ (1u32 << 31)) as u64
    }
}

impl Element for u64 {
    fn sort_key(self) -> u64 {
        self
    }
}

impl Element for u32 {
    fn sort_key(self) -> u64 {
        self as u64
    }
}

impl Element for bool {
    fn sort_key(self) -> u64 {
        self as u64
    }
}

/// A chunked column of primitive values.
pub struct ChunkedColumn<T: Element> {
    chunks: Vec<AlignedChunk<T>>,
    chunk_sizes: Vec<usize>,
    total_len: usize,
    scratch: Option<Box<ColumnScratch<T>>>,
}

impl<T: Element> ChunkedColumn<T> {
    /// Builds a full column by copying `data` in chunks of `CHUNK_SIZE`.
    pub fn from_slice(data: &[T]) -> Result<Self, GalleonError> {
        let num_chunks = data.len().div_ceil(CHUNK_SIZE);
        let mut chunks = Vec::with_capacity(num_chunks);
        let mut chunk_sizes = Vec::with_capacity(num_chunks);
        for piece in data.chunks(CHUNK_SIZE) {
            let mut chunk = AlignedChunk::new()?;
            chunk.as_mut_slice(piece.len()).copy_from_slice(piece);
            chunks.push(chunk);
            chunk_sizes.push(piece.len());
        }
        Ok(Self {
            chunks,
            chunk_sizes,
            total_len: data.len(),
            scratch: None,
        })
    }

    /// Pre-allocates chunk buffers for `capacity` elements; the column starts
    /// logically empty.
    pub fn with_capacity(capacity: usize) -> Result<Self, GalleonError> {
        let num_chunks = capacity.div_ceil(CHUNK_SIZE);
        let mut chunks = Vec::with_capacity(num_chunks);
        for _ in 0..num_chunks {
            chunks.push(AlignedChunk::new()?);
        }
        Ok(Self {
            chunks,
            chunk_sizes: vec![0; num_chunks],
            total_len: 0,
            scratch: None,
        })
    }

    /// Assembles a column from already-filled chunk buffers.
    pub(crate) fn from_parts(chunks: Vec<AlignedChunk<T>>, chunk_sizes: Vec<usize>) -> Self {
        debug_assert_eq!(chunks.len(), chunk_sizes.len());
        let total_len = chunk_sizes.iter().sum();
        Self {
            chunks,
            chunk_sizes,
            total_len,
            scratch: None,
        }
    }

    pub fn len(&self) -> usize {
        self.total_len
    }

    pub fn is_empty(&self) -> bool {
        self.total_len == 0
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk_sizes(&self) -> &[usize] {
        &self.chunk_sizes
    }

    /// Logical view of chunk `c`, or `None` when `c` is out of range.
    pub fn chunk(&self, c: usize) -> Option<&[T]> {
        let size = *self.chunk_sizes.get(c)?;
        Some(self.chunks[c].as_slice(size))
    }

    /// Value at global row `index`, or `None` when out of range.
    pub fn get(&self, index: usize) -> Option<T> {
        if index >= self.total_len {
            return None;
        }
        let chunk = index / CHUNK_SIZE;
        let local = index % CHUNK_SIZE;
        Some(self.chunks[chunk].as_slice(self.chunk_sizes[chunk])[local])
    }

    /// Writes `value` at global row `index`; reports whether the write landed.
    /// Never resizes.
    pub fn set(&mut self, index: usize, value: T) -> bool {
        if index >= self.total_len {
            return false;
        }
        let chunk = index / CHUNK_SIZE;
        let local = index % CHUNK_SIZE;
        self.chunks[chunk].as_mut_slice(self.chunk_sizes[chunk])[local] = value;
        true
    }

    /// Appends within pre-allocated capacity; reports whether there was room.
    /// Never allocates.
    pub fn push(&mut self, value: T) -> bool {
        let chunk = self.total_len / CHUNK_SIZE;
        if chunk >= self.chunks.len() {
            return false;
        }
        let local = self.total_len % CHUNK_SIZE;
        self.chunks[chunk].as_mut_slice(local + 1)[local] = value;
        self.chunk_sizes[chunk] = local + 1;
        self.total_len += 1;
        true
    }

    /// Iterates elements in storage order across chunks.
    pub fn iter(&self) -> ColumnIter<'_, T> {
        ColumnIter {
            col: self,
            chunk: 0,
            local: 0,
        }
    }

    /// Collects the column into a contiguous vector.
    pub fn to_vec(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.total_len);
        for c in 0..self.chunks.len() {
            out.extend_from_slice(self.chunks[c].as_slice(self.chunk_sizes[c]));
        }
        out
    }

    /// Copies the whole column into `dest`; reports whether the lengths match.
    pub fn copy_to(&self, dest: &mut [T]) -> bool {
        if dest.len() != self.total_len {
            return false;
        }
        let mut offset = 0;
        for c in 0..self.chunks.len() {
            let size = self.chunk_sizes[c];
            dest[offset..offset + size].copy_from_slice(self.chunks[c].as_slice(size));
            offset += size;
        }
        true
    }

    /// Materializes the scratch struct (empty).
    pub fn ensure_scratch(&mut self) -> &mut ColumnScratch<T> {
        self.scratch.get_or_insert_with(Default::default)
    }

    /// Allocates (or re-sizes) the per-chunk sort buffers.
    pub fn ensure_sort_buffers(&mut self) {
        let sizes = &self.chunk_sizes;
        let scratch = self.scratch.get_or_insert_with(Default::default);
        scratch.ensure_sort_buffers(sizes);
    }

    /// Materializes the chunk-sized temp buffer.
    pub fn ensure_temp_chunk(&mut self) -> Result<(), GalleonError> {
        self.scratch
            .get_or_insert_with(Default::default)
            .ensure_temp_chunk()?;
        Ok(())
    }

    /// Detaches the scratch so workers can borrow it independently of the
    /// column's chunks; pair with [`Self::put_scratch`].
    pub(crate) fn take_scratch(&mut self) -> Option<Box<ColumnScratch<T>>> {
        self.scratch.take()
    }

    pub(crate) fn put_scratch(&mut self, scratch: Box<ColumnScratch<T>>) {
        self.scratch = Some(scratch);
    }
}

/// Element iterator over a chunked column.
pub struct ColumnIter<'a, T: Element> {
    col: &'a ChunkedColumn<T>,
    chunk: usize,
    local: usize,
}

impl<'a, T: Element> Iterator for ColumnIter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        while self.chunk < self.col.chunks.len() {
            if self.local < self.col.chunk_sizes[self.chunk] {
                let v = self.col.chunks[self.chunk].as_slice(self.col.chunk_sizes[self.chunk])
                    [self.local];
                self.local += 1;
                return Some(v);
            }
            self.chunk += 1;
            self.local = 0;
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.col.total_len))
    }
}

//! Cache-aligned chunk buffers.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

use crate::column::Element;
use crate::error::GalleonError;
use crate::{CACHE_LINE_SIZE, CHUNK_SIZE};

/// One fixed-capacity chunk buffer, aligned to a cache line.
///
/// Every chunk owns `CHUNK_SIZE` elements of backing storage regardless of
/// how many are logically present; the owning column tracks the logical
/// length per chunk.
pub struct AlignedChunk<T: Element> {
    ptr: NonNull<T>,
}

unsafe impl<T: Element> Send for AlignedChunk<T> {}
unsafe impl<T: Element> Sync for AlignedChunk<T> {}

impl<T: Element> AlignedChunk<T> {
    pub fn new() -> Result<Self, GalleonError> {
        let layout = Self::layout()?;
        let raw = unsafe { alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw as *mut T) else {
            return Err(GalleonError::Memory("failed to allocate chunk buffer".to_string()));
        };
        Ok(Self { ptr })
    }

    fn layout() -> Result<Layout, GalleonError> {
        Layout::from_size_align(CHUNK_SIZE * std::mem::size_of::<T>(), CACHE_LINE_SIZE)
            .map_err(|e| GalleonError::Memory(format!("invalid chunk layout: {}", e)))
    }

    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// View of the first `len` elements.
    pub fn as_slice(&self, len: usize) -> &[T] {
        debug_assert!(len <= CHUNK_SIZE);
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), len) }
    }

    /// Mutable view of the first `len` elements.
    pub fn as_mut_slice(&mut self, len: usize) -> &mut [T] {
        debug_assert!(len <= CHUNK_SIZE);
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), len) }
    }
}

impl<T: Element> Drop for AlignedChunk<T> {
    fn drop(&mut self) {
        // Layout construction succeeded at allocation time.
        if let Ok(layout) = Self::layout() {
            unsafe { dealloc(self.ptr.as_ptr() as *mut u8, layout) };
        }
    }
}

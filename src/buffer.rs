use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use crate::error::{allocation_error, layout_error, Result};

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for u16 {}
    impl Sealed for u8 {}
}

/// Element types the codec reads and writes.
///
/// Implemented for `f32`, `u16` (f16 / bf16 bit patterns) and `u8`. All of them
/// are plain data for which the all-zero bit pattern is a valid value.
pub trait Element: sealed::Sealed + Copy + Send + Sync + 'static {
    /// Native-endian byte view of a slice, as checksummed by [`crate::checksum`].
    #[inline(always)]
    fn as_bytes(slice: &[Self]) -> &[u8] {
        // SAFETY: `Self` is one of f32/u16/u8: no padding, every byte initialized,
        // and u8 has alignment 1.
        unsafe {
            std::slice::from_raw_parts(slice.as_ptr().cast::<u8>(), std::mem::size_of_val(slice))
        }
    }
}

impl Element for f32 {}
impl Element for u16 {}
impl Element for u8 {}

/// A zero-initialized, heap-allocated buffer with a caller-chosen alignment.
///
/// Kernels are correct on any alignment; page-aligned buffers are what the
/// reference fixture uses for stable throughput.
pub struct AlignedBuffer<T: Element> {
    ptr: NonNull<T>,
    len: usize,
    layout: Layout,
}

// SAFETY: the buffer uniquely owns its allocation, like a `Box<[T]>`.
unsafe impl<T: Element> Send for AlignedBuffer<T> {}
unsafe impl<T: Element> Sync for AlignedBuffer<T> {}

impl<T: Element> AlignedBuffer<T> {
    /// Allocates `len` zeroed elements aligned to `align` bytes.
    ///
    /// # Errors
    ///
    /// Returns a layout error if `align` is not a power of two, is smaller than
    /// the alignment of `T`, or if the total size overflows, and an allocation
    /// error if the allocator fails.
    pub fn zeroed(len: usize, align: usize) -> Result<Self> {
        if align < std::mem::align_of::<T>() {
            return Err(layout_error(
                len,
                align,
                format!("alignment below that of {}", std::any::type_name::<T>()),
            ));
        }

        let size_bytes = len
            .checked_mul(std::mem::size_of::<T>())
            .ok_or_else(|| layout_error(len, align, "total size overflows usize"))?;

        let layout = Layout::from_size_align(size_bytes, align)
            .map_err(|err| layout_error(size_bytes, align, err.to_string()))?;

        if size_bytes == 0 {
            // Nothing to allocate; a dangling pointer aligned to `align` is valid for
            // zero-length slices.
            let ptr = NonNull::new(align as *mut T)
                .ok_or_else(|| layout_error(size_bytes, align, "alignment must be non-zero"))?;
            return Ok(Self { ptr, len, layout });
        }

        // SAFETY: `layout` has a non-zero size.
        let raw = unsafe { alloc_zeroed(layout) }.cast::<T>();
        let ptr = NonNull::new(raw)
            .ok_or_else(|| allocation_error(size_bytes, align, "allocator returned null"))?;

        Ok(Self { ptr, len, layout })
    }

    /// Allocates an aligned copy of `values`.
    pub fn from_slice(values: &[T], align: usize) -> Result<Self> {
        let mut buffer = Self::zeroed(values.len(), align)?;
        buffer.copy_from_slice(values);
        Ok(buffer)
    }

    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    pub fn as_bytes(&self) -> &[u8] {
        T::as_bytes(self)
    }
}

impl<T: Element> Deref for AlignedBuffer<T> {
    type Target = [T];

    #[inline(always)]
    fn deref(&self) -> &[T] {
        // SAFETY: `ptr` is valid for `len` initialized elements (zeroed at allocation).
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Element> DerefMut for AlignedBuffer<T> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut [T] {
        // SAFETY: as in `deref`, and `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Element> Drop for AlignedBuffer<T> {
    fn drop(&mut self) {
        if self.layout.size() != 0 {
            // SAFETY: allocated in `zeroed` with exactly this layout.
            unsafe { dealloc(self.ptr.as_ptr().cast::<u8>(), self.layout) }
        }
    }
}

impl<T: Element + std::fmt::Debug> std::fmt::Debug for AlignedBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("len", &self.len)
            .field("align", &self.layout.align())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CastError;
    use crate::PAGE_ALIGNMENT;

    #[test]
    fn zeroed_buffers_are_aligned_and_zero() {
        let buffer = AlignedBuffer::<f32>::zeroed(4608, PAGE_ALIGNMENT).unwrap();
        assert_eq!(buffer.len(), 4608);
        assert_eq!(buffer.as_ptr() as usize % PAGE_ALIGNMENT, 0);
        assert!(buffer.iter().all(|&v| v.to_bits() == 0));
        assert_eq!(buffer.alignment(), PAGE_ALIGNMENT);
    }

    #[test]
    fn byte_view_covers_every_element() {
        let buffer = AlignedBuffer::from_slice(&[0x0102u16, 0x0304], 64).unwrap();
        assert_eq!(buffer.as_bytes().len(), 4);
        assert_eq!(buffer.as_bytes(), &[0x02, 0x01, 0x04, 0x03][..]);
    }

    #[test]
    fn writes_through_deref_mut() {
        let mut buffer = AlignedBuffer::<u8>::zeroed(16, 32).unwrap();
        buffer[3] = 7;
        assert_eq!(buffer[3], 7);
        assert_eq!(buffer.iter().map(|&b| b as u32).sum::<u32>(), 7);
    }

    #[test]
    fn empty_buffer() {
        let buffer = AlignedBuffer::<u16>::zeroed(0, 64).unwrap();
        assert!(buffer.is_empty());
        assert!(buffer.as_bytes().is_empty());
    }

    #[test]
    fn rejects_bad_alignment() {
        assert!(matches!(
            AlignedBuffer::<f32>::zeroed(8, 3),
            Err(CastError::Layout { .. })
        ));
        assert!(matches!(
            AlignedBuffer::<f32>::zeroed(8, 2),
            Err(CastError::Layout { .. })
        ));
    }

    #[test]
    fn rejects_overflowing_size() {
        assert!(matches!(
            AlignedBuffer::<f32>::zeroed(usize::MAX, 64),
            Err(CastError::Layout { .. })
        ));
    }
}

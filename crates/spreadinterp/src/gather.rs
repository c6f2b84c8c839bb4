//! Indexed gather and scatter over strided records.
//!
//! A record is `stride` consecutive scalars. `indices[k]` names a record of
//! the global buffer; record `k` of the local buffer pairs with it.
//!
//! Gathers read the global buffer through a shared slice. Scatters go through
//! [`DisjointSlice`], which parallel column tasks share while writing
//! disjoint records.

use std::marker::PhantomData;
use std::ops::AddAssign;

/// Copy `src` record `indices[k]` into `dst` record `k`.
#[inline]
pub fn gather<T: Copy>(dst: &mut [T], src: &[T], indices: &[usize], stride: usize) {
    debug_assert!(dst.len() >= indices.len() * stride);
    for (k, &idx) in indices.iter().enumerate() {
        dst[k * stride..(k + 1) * stride].copy_from_slice(&src[idx * stride..(idx + 1) * stride]);
    }
}

/// A mutable buffer shared by parallel tasks that write disjoint records.
///
/// Holds the exclusive borrow for `'a`, so nothing else can touch the buffer
/// while tasks run. Disjointness between tasks is the caller's obligation;
/// every record is bounds-checked.
pub(crate) struct DisjointSlice<'a, T> {
    ptr: *mut T,
    len: usize,
    _borrow: PhantomData<&'a mut [T]>,
}

// Safety: access goes through the unsafe methods below, whose callers
// guarantee that concurrent tasks write disjoint records.
unsafe impl<T: Send> Send for DisjointSlice<'_, T> {}
unsafe impl<T: Send> Sync for DisjointSlice<'_, T> {}

impl<'a, T: Copy> DisjointSlice<'a, T> {
    pub(crate) fn new(buffer: &'a mut [T]) -> Self {
        Self {
            ptr: buffer.as_mut_ptr(),
            len: buffer.len(),
            _borrow: PhantomData,
        }
    }

    /// Record `idx` as a mutable slice.
    ///
    /// # Safety
    /// No other live reference may overlap this record.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    unsafe fn record(&self, idx: usize, stride: usize) -> &mut [T] {
        let end = (idx + 1) * stride;
        assert!(end <= self.len, "record {} out of bounds ({} scalars)", idx, self.len);
        std::slice::from_raw_parts_mut(self.ptr.add(idx * stride), stride)
    }

    /// Overwrite records `indices[k]` with `src` record `k`.
    ///
    /// # Safety
    /// No other task may read or write any of these records concurrently.
    pub(crate) unsafe fn scatter(&self, src: &[T], indices: &[usize], stride: usize) {
        for (k, &idx) in indices.iter().enumerate() {
            self.record(idx, stride)
                .copy_from_slice(&src[k * stride..(k + 1) * stride]);
        }
    }
}

impl<T: Copy + AddAssign> DisjointSlice<'_, T> {
    /// Accumulate `src` record `k` into record `indices[k]`.
    ///
    /// # Safety
    /// No other task may read or write any of these records concurrently.
    pub(crate) unsafe fn scatter_add(&self, src: &[T], indices: &[usize], stride: usize) {
        for (k, &idx) in indices.iter().enumerate() {
            let dst = self.record(idx, stride);
            for (d, &s) in dst.iter_mut().zip(&src[k * stride..(k + 1) * stride]) {
                *d += s;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_gather_strided() {
        let src = [0.0, 1.0, 10.0, 11.0, 20.0, 21.0];
        let mut dst = [0.0; 4];
        gather(&mut dst, &src, &[2, 0], 2);
        assert_eq!(dst, [20.0, 21.0, 0.0, 1.0]);
    }

    #[test]
    fn test_gather_integers() {
        let src = [5u16, 6, 7];
        let mut dst = [0u16; 2];
        gather(&mut dst, &src, &[1, 1], 1);
        assert_eq!(dst, [6, 6]);
    }

    #[test]
    fn test_scatter_overwrites() {
        let mut dst = [1.0; 6];
        {
            let shared = DisjointSlice::new(&mut dst);
            unsafe { shared.scatter(&[7.0, 8.0, 9.0, 10.0], &[2, 0], 2) };
        }
        assert_eq!(dst, [9.0, 10.0, 1.0, 1.0, 7.0, 8.0]);
    }

    #[test]
    fn test_scatter_add_accumulates_repeats() {
        let mut dst = [1.0; 3];
        {
            let shared = DisjointSlice::new(&mut dst);
            unsafe { shared.scatter_add(&[1.0, 2.0, 4.0], &[0, 2, 0], 1) };
        }
        assert_eq!(dst, [6.0, 1.0, 3.0]);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_scatter_add_rejects_out_of_range_record() {
        let mut dst = [0.0; 4];
        let shared = DisjointSlice::new(&mut dst);
        // Index built from a wrapped negative coordinate
        unsafe { shared.scatter_add(&[1.0], &[(-1isize) as usize / 2], 1) };
    }

    #[test]
    fn test_disjoint_slice_parallel_writes() {
        let mut buffer = vec![0.0f64; 64];
        {
            let shared = DisjointSlice::new(&mut buffer);
            (0..8usize).into_par_iter().for_each(|task| {
                let indices: Vec<usize> = (0..8).map(|r| task * 8 + r).collect();
                let src = vec![task as f64; 8];
                unsafe { shared.scatter_add(&src, &indices, 1) };
            });
        }
        for (i, v) in buffer.iter().enumerate() {
            assert_eq!(*v, (i / 8) as f64);
        }
    }

    #[test]
    fn test_disjoint_slice_scatter_integers() {
        let mut buffer = vec![0u32; 6];
        {
            let shared = DisjointSlice::new(&mut buffer);
            unsafe { shared.scatter(&[3, 4], &[2], 2) };
        }
        assert_eq!(buffer, vec![0, 0, 0, 0, 3, 4]);
    }
}

//! Growable columnar backing stores.

use crate::pipeline::error::{PipelineError, PipelineResult};
use std::ops::Range;

/// A contiguous buffer shared by all axes of one kind through
/// offset + length slicing.
///
/// Storage only ever grows. `clear` resets the logical length without
/// touching contents, so slices past a fresh `resize_to_fit` may hold data
/// from an earlier tick until written.
#[derive(Debug, Clone)]
pub struct ColumnBuffer<T> {
    name: &'static str,
    data: Vec<T>,
    len: usize,
    limit: usize,
}

impl<T: Copy + Default> ColumnBuffer<T> {
    pub fn new(name: &'static str, limit: usize) -> Self {
        Self {
            name,
            data: Vec::new(),
            len: 0,
            limit,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocated entries (never decreases).
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Set the logical length to `len`, growing storage if needed.
    pub fn resize_to_fit(&mut self, len: usize) -> PipelineResult<()> {
        if len > self.limit {
            return Err(PipelineError::Capacity {
                buffer: self.name,
                requested: len,
                limit: self.limit,
            });
        }
        if self.data.len() < len {
            self.data.resize(len, T::default());
        }
        self.len = len;
        Ok(())
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data[..self.len]
    }

    #[inline]
    pub fn slice(&self, range: Range<usize>) -> &[T] {
        &self.as_slice()[range]
    }

    #[inline]
    pub fn slice_mut(&mut self, range: Range<usize>) -> &mut [T] {
        &mut self.as_mut_slice()[range]
    }
}

/// Carve `N` pairwise-disjoint mutable sub-slices out of `buf`.
///
/// Results come back in the order of `ranges`. Empty ranges always succeed
/// and yield empty slices. Overlapping or out-of-bounds ranges fail with
/// [`PipelineError::SliceConflict`].
pub fn split_disjoint_mut<'a, T, const N: usize>(
    buf: &'a mut [T],
    ranges: [Range<usize>; N],
) -> PipelineResult<[&'a mut [T]; N]> {
    let mut order: [usize; N] = std::array::from_fn(|i| i);
    order.sort_unstable_by_key(|&i| ranges[i].start);

    let mut out: [&'a mut [T]; N] = std::array::from_fn(|_| Default::default());
    let mut rest: &'a mut [T] = buf;
    let mut consumed = 0usize;

    for &i in &order {
        let range = &ranges[i];
        if range.start > range.end {
            return Err(PipelineError::SliceConflict(format!(
                "inverted range {:?}",
                range
            )));
        }
        if range.is_empty() {
            continue;
        }
        if range.start < consumed {
            return Err(PipelineError::SliceConflict(format!(
                "range {:?} overlaps a range ending at {}",
                range, consumed
            )));
        }
        if range.end - consumed > rest.len() {
            return Err(PipelineError::SliceConflict(format!(
                "range {:?} exceeds buffer length {}",
                range,
                consumed + rest.len()
            )));
        }

        let taken = std::mem::take(&mut rest);
        let (_, tail) = taken.split_at_mut(range.start - consumed);
        let (slice, tail) = tail.split_at_mut(range.end - range.start);
        out[i] = slice;
        rest = tail;
        consumed = range.end;
    }

    Ok(out)
}

//! Random-access iteration over fixed-width prefixes.

use std::iter::FusedIterator;

/// Iterator over the prefixes of a [`PrefixListReader`](super::PrefixListReader).
///
/// Positions are prefix indices, not byte offsets, so `nth` and
/// `nth_back` are O(1).
#[derive(Debug, Clone)]
pub struct PrefixIter<'a> {
    data: &'a [u8],
    width: usize,
    front: usize,
    back: usize,
}

impl<'a> PrefixIter<'a> {
    /// Iterate `data` in `width`-byte steps starting at prefix `index`.
    pub(super) fn new(data: &'a [u8], width: usize, index: usize) -> Self {
        let back = if width == 0 { 0 } else { data.len() / width };
        Self {
            data,
            width,
            front: index.min(back),
            back,
        }
    }

    /// Index of the next prefix `next()` would yield.
    #[must_use]
    pub fn position(&self) -> usize {
        self.front
    }

    fn prefix_at(&self, index: usize) -> Option<&'a [u8]> {
        let start = index.checked_mul(self.width)?;
        self.data.get(start..start.checked_add(self.width)?)
    }
}

impl<'a> Iterator for PrefixIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        let item = self.prefix_at(self.front);
        self.front += 1;
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        self.front = self.front.saturating_add(n).min(self.back);
        self.next()
    }
}

impl DoubleEndedIterator for PrefixIter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        self.prefix_at(self.back)
    }

    fn nth_back(&mut self, n: usize) -> Option<Self::Item> {
        self.back = self.back.saturating_sub(n).max(self.front);
        self.next_back()
    }
}

impl ExactSizeIterator for PrefixIter<'_> {}

impl FusedIterator for PrefixIter<'_> {}

//! Chunk partitioning over target-unit indices.
//!
//! A pass sees the artifact as `N` removable target units, numbered 1..=N in
//! definition order. The engine partitions that range into contiguous chunks
//! and attempts to drop one chunk at a time. A kept-chunk set is an ordered,
//! non-overlapping, ascending slice of chunks; every index not covered by it
//! is implicitly removed, so no explicit removed set is ever materialized.

/// An inclusive range of 1-based target-unit indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// First target-unit index in the chunk.
    pub begin: usize,
    /// Last target-unit index in the chunk (inclusive).
    pub end: usize,
}

impl Chunk {
    /// Create a chunk covering `begin..=end`.
    pub fn new(begin: usize, end: usize) -> Self {
        debug_assert!(begin >= 1 && begin <= end);
        Chunk { begin, end }
    }

    /// Whether the given 1-based index falls inside this chunk.
    pub fn contains(&self, index: usize) -> bool {
        index >= self.begin && index <= self.end
    }

    /// Number of target units covered. Never zero.
    pub fn len(&self) -> usize {
        self.end - self.begin + 1
    }
}

/// Split `[1, n]` into `k` contiguous chunks as evenly as possible.
///
/// Chunk sizes differ by at most one unit; chunks never overlap and their
/// union is exactly `[1, n]`. Requires `1 <= k <= n`.
pub fn compute_chunks(n: usize, k: usize) -> Vec<Chunk> {
    assert!(k >= 1 && k <= n, "chunk count {} out of range for {} targets", k, n);

    let base = n / k;
    let remainder = n % k;

    let mut chunks = Vec::with_capacity(k);
    let mut begin = 1;
    for i in 0..k {
        // The first `remainder` chunks absorb the extra unit each.
        let size = if i < remainder { base + 1 } else { base };
        chunks.push(Chunk::new(begin, begin + size - 1));
        begin += size;
    }
    chunks
}

/// Whether `index` is covered by any chunk of an ascending kept set.
pub fn covered(kept: &[Chunk], index: usize) -> bool {
    kept.iter().any(|c| c.contains(index))
}

//! The reduction pass capability.
//!
//! A pass defines one granularity of structural removal: what a "target
//! unit" is for this pass, how many the artifact currently has, and how to
//! build a candidate with every out-of-chunk unit removed. New passes plug
//! in by implementing the trait; there is no central dispatch over pass
//! kinds anywhere in the engine.

use crate::artifact::Artifact;
use crate::chunk::Chunk;

/// One kind of structural removal, polymorphic over the artifact type.
pub trait ReductionPass<A: Artifact> {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    /// Number of removable target units in `artifact` at this pass's
    /// granularity.
    ///
    /// Must be a pure function of the artifact: no side effects, and stable
    /// across repeated calls on the same unmodified artifact. Declarations
    /// and other non-removable elements are never counted.
    fn count_targets(&self, artifact: &A) -> usize;

    /// Build a candidate containing only the target units whose 1-based
    /// index falls inside some chunk of `kept`.
    ///
    /// Must not mutate `artifact`. References into removed units are patched
    /// to a neutral placeholder rather than left dangling. Total over every
    /// kept set: an empty `kept` yields a degenerate but structurally valid
    /// artifact with zero target units.
    fn reduce(&self, artifact: &A, kept: &[Chunk]) -> A;
}

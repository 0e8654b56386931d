//! The artifact capability: the core's only view of the program under
//! reduction.
//!
//! The engine and driver never look inside an artifact. They clone it to
//! build disposable candidates, serialize it when the oracle needs a file on
//! disk, and probe its structural validity to catch passes that break their
//! contract. Parsing and the concrete representation live with the artifact
//! implementation (see `ir::Module` for the built-in one).

use std::io::{self, Write};

/// A program artifact that can be reduced.
///
/// `Clone` backs candidate construction: every candidate is built from a
/// clone and the caller's best artifact is never mutated in place.
pub trait Artifact: Clone {
    /// Write the serialized form of the artifact to `out`.
    ///
    /// Called once per oracle invocation (scratch file) and once at the end
    /// of a successful run (final output). The core touches raw bytes
    /// nowhere else.
    fn serialize(&self, out: &mut dyn Write) -> io::Result<()>;

    /// Whether the artifact is structurally valid.
    ///
    /// A pass that returns a candidate failing this check has broken the
    /// `reduce` contract; the engine treats such a candidate as not
    /// interesting without spending an oracle call.
    fn is_well_formed(&self) -> bool;
}

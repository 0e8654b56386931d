//! # delta-reduce
//!
//! An oracle-driven test-case reducer: given a structured program artifact
//! and an external interestingness command (exit 0 iff a candidate still
//! reproduces the target property), it repeatedly removes pieces of the
//! artifact while the property keeps holding, converging on a 1-minimal
//! artifact that still triggers it.
//!
//! The search is chunk-based bisection: partition the removable units into
//! contiguous chunks, try dropping one chunk at a time, accept whatever the
//! oracle confirms, and refine the granularity once a sweep stops making
//! progress. Structural removals plug in as [`pass::ReductionPass`]
//! implementations; whole-function removal over the built-in IR is the
//! worked example.
//!
//! Global minimality is intractable and out of scope: the guarantee on
//! termination is that no single remaining chunk can be dropped alone
//! without losing interestingness.

pub mod artifact;
pub mod chunk;
pub mod driver;
pub mod engine;
pub mod ir;
pub mod oracle;
pub mod pass;
pub mod remove_functions;

// Re-export core types for easy access
pub use artifact::Artifact;
pub use driver::{
    reduce_file, FileReduceOptions, FileReduction, ReduceError, Reduction, ReductionDriver,
};
pub use chunk::{compute_chunks, Chunk};
pub use engine::{AbortedSearch, BisectionEngine, EngineConfig, EngineStats, GranularityReset};
pub use ir::{Function, Inst, Module, Operand, ParseError};
pub use oracle::{Oracle, OracleConfig, OracleError, OracleRunner, Verdict};
pub use pass::ReductionPass;
pub use remove_functions::RemoveFunctions;

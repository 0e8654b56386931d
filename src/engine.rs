//! The bisection engine: coarse-to-fine chunk removal against one pass.
//!
//! For a pass reporting `N` target units, the engine partitions `[1, N]`
//! into `K` chunks, builds one candidate per chunk with that chunk dropped
//! and every other chunk kept, and asks the oracle about each in turn. An
//! accepted candidate becomes the new best and the search restarts at the
//! configured granularity; an exhausted sweep refines `K`. `K` grows toward
//! `N` (clamped, so the singleton sweep always runs before termination),
//! which is what makes the final artifact 1-minimal for the pass: the last
//! full sweep tried dropping every remaining unit alone and failed.
//!
//! Every acceptance strictly decreases `N` and every failed sweep strictly
//! grows `K`, so the search halts after a bounded number of oracle calls.

use crate::artifact::Artifact;
use crate::chunk::{compute_chunks, Chunk};
use crate::oracle::{Oracle, OracleError, Verdict};
use crate::pass::ReductionPass;

/// Granularity policy applied after an accepted candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GranularityReset {
    /// Restart at the starting granularity. Unit indexing shifted, so a
    /// coarse cut may now succeed where it previously did not. The default.
    Coarse,
    /// Stay at the current granularity (clamped to the new target count).
    Hold,
}

/// Tuning knobs for the bisection search.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Initial number of chunks per sweep. 2 tries dropping half the units
    /// at a time, the coarsest cut short of dropping everything.
    pub start_granularity: usize,
    /// Policy after a successful removal.
    pub reset: GranularityReset,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig { start_granularity: 2, reset: GranularityReset::Coarse }
    }
}

/// Counters accumulated across `run` invocations.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineStats {
    /// Oracle invocations made.
    pub oracle_calls: u64,
    /// Candidates the oracle accepted.
    pub candidates_accepted: u64,
    /// Full chunk sweeps started.
    pub sweeps: u64,
    /// Candidates rejected before the oracle because a pass returned a
    /// structurally invalid artifact.
    pub invariant_violations: u64,
}

/// An oracle failure that ended a search early.
///
/// The error is fatal, but accepted candidates are not thrown away with it:
/// `best` is the most-reduced interesting artifact owned at the point of
/// failure (the unmodified input when nothing had been accepted yet), so
/// callers can still offer it as partial output.
#[derive(Debug)]
pub struct AbortedSearch<A> {
    pub error: OracleError,
    pub best: A,
}

/// The chunk-based bisection search.
#[derive(Debug, Default)]
pub struct BisectionEngine {
    config: EngineConfig,
    stats: EngineStats,
}

impl BisectionEngine {
    pub fn new(config: EngineConfig) -> Self {
        BisectionEngine { config, stats: EngineStats::default() }
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Run `pass` to exhaustion against `best`, returning the 1-minimal
    /// artifact for this pass.
    ///
    /// `best` is consumed; the engine works on its own copies and the
    /// returned artifact is interesting whenever the input was (the input is
    /// returned unchanged if nothing could be removed). An oracle failure
    /// aborts the search; the partial best travels back inside the error.
    pub fn run<A, O, P>(
        &mut self,
        pass: &P,
        oracle: &mut O,
        mut best: A,
    ) -> Result<A, AbortedSearch<A>>
    where
        A: Artifact,
        O: Oracle<A>,
        P: ReductionPass<A> + ?Sized,
    {
        let mut n = pass.count_targets(&best);
        tracing::info!(pass = pass.name(), targets = n, "bisection start");
        if n == 0 {
            return Ok(best);
        }

        let mut k = self.config.start_granularity.clamp(1, n);
        'sweep: loop {
            self.stats.sweeps += 1;
            tracing::debug!(pass = pass.name(), granularity = k, targets = n, "sweep");

            let chunks = compute_chunks(n, k);
            for drop_index in 0..chunks.len() {
                let kept: Vec<Chunk> = chunks
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != drop_index)
                    .map(|(_, c)| *c)
                    .collect();

                let candidate = pass.reduce(&best, &kept);
                if !candidate.is_well_formed() {
                    // The pass broke its contract; never the oracle's problem.
                    self.stats.invariant_violations += 1;
                    tracing::warn!(
                        pass = pass.name(),
                        chunk = ?chunks[drop_index],
                        "pass produced an invalid candidate; treating as not interesting"
                    );
                    continue;
                }

                self.stats.oracle_calls += 1;
                let verdict = match oracle.test(&candidate) {
                    Ok(verdict) => verdict,
                    Err(error) => return Err(AbortedSearch { error, best }),
                };
                match verdict {
                    Verdict::NotInteresting => continue,
                    Verdict::Interesting => {
                        best = candidate;
                        let remaining = pass.count_targets(&best);
                        debug_assert!(remaining < n, "accepted candidate did not shrink");
                        n = remaining;
                        self.stats.candidates_accepted += 1;
                        tracing::debug!(
                            pass = pass.name(),
                            dropped = ?chunks[drop_index],
                            targets = n,
                            "candidate accepted"
                        );

                        if n == 0 {
                            break 'sweep;
                        }
                        k = match self.config.reset {
                            GranularityReset::Coarse => self.config.start_granularity.clamp(1, n),
                            GranularityReset::Hold => k.min(n),
                        };
                        continue 'sweep;
                    }
                }
            }

            // Sweep exhausted without progress: refine, or stop once the
            // singleton sweep itself failed.
            if k >= n {
                break;
            }
            k = (k * 2).min(n);
        }

        tracing::info!(pass = pass.name(), targets = n, "bisection done");
        Ok(best)
    }
}

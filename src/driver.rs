//! The reduction driver: sequencing passes over one evolving best artifact.
//!
//! The driver owns the pass list and the single long-lived best artifact.
//! It first verifies that the unmodified input is interesting at all (an
//! input that never reproduced the property is a fatal condition, reported
//! distinctly from "nothing could be removed"), then runs each pass to
//! exhaustion through the bisection engine, feeding the updated best into
//! the next pass.
//!
//! `reduce_file` is the concrete pipeline over the built-in IR: load and
//! parse once at the start, reduce, and write the final artifact once at
//! the end, never in between. An oracle failure mid-run is fatal to the
//! search but not to its gains: whatever candidate was last accepted is
//! written out as a partial result.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::artifact::Artifact;
use crate::engine::{AbortedSearch, BisectionEngine, EngineConfig, EngineStats};
use crate::ir::{Module, ParseError};
use crate::oracle::{Oracle, OracleConfig, OracleError, OracleRunner, Verdict};
use crate::pass::ReductionPass;
use crate::remove_functions::RemoveFunctions;

/// Fatal conditions of a reduction run.
#[derive(Debug, thiserror::Error)]
pub enum ReduceError {
    #[error("failed to parse input: {0}")]
    InputParse(#[from] ParseError),

    #[error("input artifact is structurally broken")]
    InputInvalid,

    #[error("the unmodified input is not interesting; nothing to reduce")]
    InputNotInteresting,

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result of a driver run.
#[derive(Debug)]
pub struct Reduction<A> {
    /// The most-reduced interesting artifact found. Always interesting:
    /// either an accepted candidate or the verified original.
    pub artifact: A,
    /// Whether any candidate was accepted at all.
    pub reduced: bool,
    /// Aggregate engine counters across all passes.
    pub stats: EngineStats,
    /// Oracle failure that cut the search short, if any. `artifact` is then
    /// the partial best accepted before the failure: still interesting, but
    /// with no 1-minimality claim.
    pub aborted: Option<OracleError>,
}

/// Sequences reduction passes against a single best artifact.
pub struct ReductionDriver<A: Artifact> {
    passes: Vec<Box<dyn ReductionPass<A>>>,
    engine: BisectionEngine,
}

impl<A: Artifact> ReductionDriver<A> {
    pub fn new(config: EngineConfig) -> Self {
        ReductionDriver { passes: Vec::new(), engine: BisectionEngine::new(config) }
    }

    /// Append a pass; passes run in registration order.
    pub fn with_pass(mut self, pass: impl ReductionPass<A> + 'static) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// Run every pass to exhaustion against `initial`.
    ///
    /// The input is tested once, unmodified, before any reduction is
    /// attempted; a negative verdict is `InputNotInteresting`. Afterwards
    /// the best artifact is only ever replaced by oracle-accepted
    /// candidates, so the returned artifact is interesting by construction.
    ///
    /// An oracle failure after the gate does not discard that artifact: the
    /// run returns it as a partial result with the failure recorded in
    /// `Reduction::aborted`. Only a gate-time failure is a bare error.
    pub fn run<O: Oracle<A>>(
        &mut self,
        oracle: &mut O,
        initial: A,
    ) -> Result<Reduction<A>, ReduceError> {
        match oracle.test(&initial)? {
            Verdict::Interesting => {}
            Verdict::NotInteresting => return Err(ReduceError::InputNotInteresting),
        }

        let ReductionDriver { passes, engine } = self;
        let mut best = initial;
        let mut aborted = None;
        for pass in passes.iter() {
            best = match engine.run(pass.as_ref(), oracle, best) {
                Ok(best) => best,
                Err(AbortedSearch { error, best }) => {
                    tracing::warn!(
                        error = %error,
                        "oracle failed mid-run; keeping the partial best"
                    );
                    aborted = Some(error);
                    best
                }
            };
            if aborted.is_some() {
                break;
            }
        }

        let stats = engine.stats();
        tracing::info!(
            oracle_calls = stats.oracle_calls,
            accepted = stats.candidates_accepted,
            "reduction finished"
        );
        Ok(Reduction { artifact: best, reduced: stats.candidates_accepted > 0, stats, aborted })
    }
}

/// Options for the file-level pipeline.
#[derive(Debug, Clone)]
pub struct FileReduceOptions {
    /// Path of the artifact to reduce.
    pub input: PathBuf,
    /// External interestingness command.
    pub oracle: OracleConfig,
    /// Where to write the reduced artifact. Defaults to a `reduced.sir`
    /// sibling of the input.
    pub output: Option<PathBuf>,
    /// Overwrite the input file instead of writing `output`.
    pub in_place: bool,
    /// Engine tuning.
    pub engine: EngineConfig,
}

impl FileReduceOptions {
    pub fn new(input: impl Into<PathBuf>, oracle: OracleConfig) -> Self {
        FileReduceOptions {
            input: input.into(),
            oracle,
            output: None,
            in_place: false,
            engine: EngineConfig::default(),
        }
    }

    fn output_path(&self) -> PathBuf {
        if self.in_place {
            self.input.clone()
        } else {
            match &self.output {
                Some(path) => path.clone(),
                None => self.input.with_file_name("reduced.sir"),
            }
        }
    }
}

/// Outcome of the file-level pipeline.
#[derive(Debug)]
pub struct FileReduction {
    /// The final best module.
    pub module: Module,
    /// Where the reduced artifact was written, or `None` when nothing could
    /// be removed (the input file is left as the canonical artifact).
    pub output: Option<PathBuf>,
    /// Aggregate engine counters.
    pub stats: EngineStats,
    /// Total oracle invocations, including the initial interestingness gate.
    pub oracle_calls: u64,
    /// Oracle failure that cut the run short. When set, `output` holds the
    /// partial best and `module` makes no 1-minimality claim.
    pub aborted: Option<OracleError>,
}

/// Load, reduce and write back a module artifact.
///
/// Parses and validates the input once, gates on its interestingness, runs
/// the registered passes, and writes the reduced artifact exactly once at
/// the end — and only if some candidate was accepted.
pub fn reduce_file(opts: &FileReduceOptions) -> Result<FileReduction, ReduceError> {
    let text = fs::read_to_string(&opts.input)?;
    let module = Module::parse(&text)?;
    if !module.validate() {
        return Err(ReduceError::InputInvalid);
    }

    let mut runner = OracleRunner::new(opts.oracle.clone())?;
    let mut driver = ReductionDriver::new(opts.engine.clone()).with_pass(RemoveFunctions);
    let reduction = driver.run(&mut runner, module)?;
    let oracle_calls = runner.calls();

    if !reduction.reduced {
        if let Some(error) = reduction.aborted {
            // Nothing was accepted before the failure, so there is no
            // partial best to offer.
            return Err(ReduceError::Oracle(error));
        }
        tracing::info!(input = %opts.input.display(), "could not reduce input");
        return Ok(FileReduction {
            module: reduction.artifact,
            output: None,
            stats: reduction.stats,
            oracle_calls,
            aborted: None,
        });
    }

    let output = opts.output_path();
    write_artifact(&reduction.artifact, &output)?;
    match &reduction.aborted {
        None => tracing::info!(output = %output.display(), "wrote reduced artifact"),
        Some(error) => tracing::warn!(
            output = %output.display(),
            error = %error,
            "oracle failed mid-run; wrote the partial best"
        ),
    }
    Ok(FileReduction {
        module: reduction.artifact,
        output: Some(output),
        stats: reduction.stats,
        oracle_calls,
        aborted: reduction.aborted,
    })
}

fn write_artifact(module: &Module, path: &Path) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    module.serialize(&mut file)?;
    file.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Module {
        Module::parse(
            "fn keep {\n  ret\n}\nfn chaff_a {\n  ret\n}\nfn chaff_b {\n  ret\n}\n",
        )
        .unwrap()
    }

    // Interesting iff `keep` is still defined.
    fn keep_oracle(module: &Module) -> Result<Verdict, OracleError> {
        if module.definitions().any(|f| f.name == "keep") {
            Ok(Verdict::Interesting)
        } else {
            Ok(Verdict::NotInteresting)
        }
    }

    #[test]
    fn uninteresting_input_is_fatal() {
        let mut driver = ReductionDriver::new(EngineConfig::default()).with_pass(RemoveFunctions);
        let mut oracle = |_: &Module| Ok(Verdict::NotInteresting);
        let result = driver.run(&mut oracle, sample());
        assert!(matches!(result, Err(ReduceError::InputNotInteresting)));
    }

    #[test]
    fn driver_converges_on_the_necessary_function() {
        let mut driver = ReductionDriver::new(EngineConfig::default()).with_pass(RemoveFunctions);
        let mut oracle = keep_oracle;
        let reduction = driver.run(&mut oracle, sample()).unwrap();
        assert!(reduction.reduced);
        let names: Vec<_> = reduction.artifact.definitions().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["keep"]);
    }

    #[test]
    fn unreducible_input_is_reported_not_rewritten() {
        // Interesting only while all three definitions are present.
        let mut driver = ReductionDriver::new(EngineConfig::default()).with_pass(RemoveFunctions);
        let mut oracle = |module: &Module| {
            if module.definitions().count() == 3 {
                Ok(Verdict::Interesting)
            } else {
                Ok(Verdict::NotInteresting)
            }
        };
        let input = sample();
        let reduction = driver.run(&mut oracle, input.clone()).unwrap();
        assert!(!reduction.reduced);
        assert_eq!(reduction.artifact, input);
    }

    #[test]
    fn mid_run_oracle_failure_yields_the_partial_best() {
        let mut driver = ReductionDriver::new(EngineConfig::default()).with_pass(RemoveFunctions);
        let mut calls = 0u32;
        // Gate passes, the first coarse cut is accepted, then the oracle
        // goes away.
        let mut oracle = |_: &Module| -> Result<Verdict, OracleError> {
            calls += 1;
            match calls {
                1 | 2 => Ok(Verdict::Interesting),
                _ => Err(OracleError::Launch {
                    command: "oracle".to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
                }),
            }
        };
        let reduction = driver.run(&mut oracle, sample()).unwrap();

        assert!(reduction.reduced);
        assert!(matches!(reduction.aborted, Some(OracleError::Launch { .. })));
        assert_eq!(reduction.artifact.definitions().count(), 1);
        assert_eq!(reduction.stats.candidates_accepted, 1);
    }

    #[test]
    fn passes_run_in_registration_order_on_the_updated_best() {
        // Two instances of the same pass: the second starts from the first's
        // result, so it finds nothing left to remove.
        let mut driver = ReductionDriver::new(EngineConfig::default())
            .with_pass(RemoveFunctions)
            .with_pass(RemoveFunctions);
        let mut oracle = keep_oracle;
        let reduction = driver.run(&mut oracle, sample()).unwrap();
        assert_eq!(reduction.artifact.definitions().count(), 1);
    }
}

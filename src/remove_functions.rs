//! The worked reduction pass: whole-function removal.
//!
//! Target units are the defined (non-declaration) functions of a module,
//! indexed 1-based in definition order. Removal is a strict three-phase
//! rewrite on a clone of the input:
//!
//! 1. patch every call whose callee is an out-of-chunk definition to the
//!    `undef` placeholder, so nothing dangles while bodies still exist;
//! 2. delete the out-of-chunk definitions themselves;
//! 3. sweep the surviving bodies for calls whose callee resolved only to the
//!    placeholder, replacing uses of their results with `undef` before the
//!    calls are deleted.
//!
//! The phase order is a contract: patching must fully complete before any
//! deletion, and the dead-call sweep runs only after all definitions are
//! gone. Interleaving the phases is how dangling-reference bugs happen.

use std::collections::HashSet;

use crate::chunk::{covered, Chunk};
use crate::ir::{Callee, Inst, Module, Operand};
use crate::pass::ReductionPass;

/// Removes defined functions that fall outside the kept chunks.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoveFunctions;

impl ReductionPass<Module> for RemoveFunctions {
    fn name(&self) -> &str {
        "remove-functions"
    }

    fn count_targets(&self, module: &Module) -> usize {
        module.definitions().count()
    }

    fn reduce(&self, module: &Module, kept: &[Chunk]) -> Module {
        let mut clone = module.clone();

        // Definitions whose 1-based index escapes every kept chunk.
        let dropped: HashSet<String> = clone
            .definitions()
            .enumerate()
            .filter(|(i, _)| !covered(kept, i + 1))
            .map(|(_, f)| f.name.clone())
            .collect();

        if !dropped.is_empty() {
            tracing::trace!(count = dropped.len(), "dropping definitions");
        }

        // Phase 1: patch all call sites into dropped definitions.
        for body in clone.functions.iter_mut().filter_map(|f| f.body.as_mut()) {
            for inst in body.iter_mut() {
                if let Inst::Call { callee, .. } = inst {
                    if matches!(callee, Callee::Func(name) if dropped.contains(name.as_str())) {
                        *callee = Callee::Undef;
                    }
                }
            }
        }

        // Phase 2: delete the dropped definitions.
        clone
            .functions
            .retain(|f| f.is_declaration() || !dropped.contains(f.name.as_str()));

        // Phase 3: sweep calls left targeting the placeholder. Their results
        // might be used further down the body, so uses are patched to
        // `undef` before the calls themselves go.
        for body in clone.functions.iter_mut().filter_map(|f| f.body.as_mut()) {
            let dead_regs: HashSet<u32> = body
                .iter()
                .filter_map(|inst| match inst {
                    Inst::Call { dest, callee: Callee::Undef, .. } => Some(*dest),
                    _ => None,
                })
                .collect();
            if dead_regs.is_empty() {
                continue;
            }

            for inst in body.iter_mut() {
                patch_uses(inst, &dead_regs);
            }
            body.retain(|inst| !matches!(inst, Inst::Call { callee: Callee::Undef, .. }));
        }

        clone
    }
}

fn patch_uses(inst: &mut Inst, dead: &HashSet<u32>) {
    let patch = |op: &mut Operand| {
        if let Operand::Reg(r) = op {
            if dead.contains(r) {
                *op = Operand::Undef;
            }
        }
    };
    match inst {
        Inst::Const { .. } => {}
        Inst::Add { lhs, rhs, .. } => {
            patch(lhs);
            patch(rhs);
        }
        Inst::Call { args, .. } => args.iter_mut().for_each(patch),
        Inst::Ret { value } => {
            if let Some(v) = value {
                patch(v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;

    const SAMPLE: &str = "\
declare putchar
fn one {
  %0 = const 1
  ret %0
}
fn two {
  %0 = call one
  ret %0
}
fn three {
  %0 = call two
  %1 = add %0 %0
  %2 = call putchar %1
  ret %1
}
";

    fn sample() -> Module {
        Module::parse(SAMPLE).unwrap()
    }

    #[test]
    fn counts_only_definitions() {
        assert_eq!(RemoveFunctions.count_targets(&sample()), 3);
    }

    #[test]
    fn counting_is_idempotent() {
        let module = sample();
        assert_eq!(
            RemoveFunctions.count_targets(&module),
            RemoveFunctions.count_targets(&module)
        );
    }

    #[test]
    fn input_is_never_mutated() {
        let module = sample();
        let before = module.clone();
        let _ = RemoveFunctions.reduce(&module, &[Chunk::new(2, 2)]);
        assert_eq!(module, before);
    }

    #[test]
    fn keeps_only_in_chunk_definitions() {
        let reduced = RemoveFunctions.reduce(&sample(), &[Chunk::new(2, 3)]);
        let names: Vec<_> = reduced.definitions().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["two", "three"]);
        // The declaration survives regardless of chunks.
        assert!(reduced.functions.iter().any(|f| f.name == "putchar"));
    }

    #[test]
    fn calls_into_removed_functions_are_swept() {
        // Dropping `one` leaves `two` calling a placeholder; the sweep must
        // delete that call and patch the use of its result in `ret`.
        let reduced = RemoveFunctions.reduce(&sample(), &[Chunk::new(2, 3)]);
        assert!(reduced.validate(), "candidate leaked a dangling reference:\n{}", reduced);

        let two = reduced.functions.iter().find(|f| f.name == "two").unwrap();
        let body = two.body.as_ref().unwrap();
        assert_eq!(body.len(), 1);
        assert_eq!(body[0], Inst::Ret { value: Some(Operand::Undef) });
    }

    #[test]
    fn downstream_uses_of_a_dead_call_become_undef() {
        // Drop `two`: `three`'s call to it dies and %0's uses get patched.
        let reduced =
            RemoveFunctions.reduce(&sample(), &[Chunk::new(1, 1), Chunk::new(3, 3)]);
        assert!(reduced.validate());

        let three = reduced.functions.iter().find(|f| f.name == "three").unwrap();
        let body = three.body.as_ref().unwrap();
        assert_eq!(
            body[0],
            Inst::Add { dest: 1, lhs: Operand::Undef, rhs: Operand::Undef }
        );
    }

    #[test]
    fn empty_kept_set_yields_a_valid_empty_candidate() {
        let reduced = RemoveFunctions.reduce(&sample(), &[]);
        assert_eq!(RemoveFunctions.count_targets(&reduced), 0);
        assert!(reduced.validate());
        // Declarations are not targets and survive total removal.
        assert_eq!(reduced.functions.len(), 1);
        assert!(reduced.functions[0].is_declaration());
    }

    #[test]
    fn keeping_everything_is_the_identity() {
        let module = sample();
        let reduced = RemoveFunctions.reduce(&module, &[Chunk::new(1, 3)]);
        assert_eq!(reduced, module);
    }
}

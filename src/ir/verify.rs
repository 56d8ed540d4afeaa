use crate::ir::*;
use rustc_hash::FxHashSet;
use std::fmt;

#[derive(Debug)]
pub enum VerifyError {
    BadInst(InstId),
    BadBlock(BlockId),
    BadOperand {
        inst: InstId,
    },
    BadTerminator(BlockId),
    MisplacedInst {
        inst: InstId,
        block: BlockId,
    },
    DuplicatePlacement(InstId),
    EntryHasPredecessors(BlockId),
    PhiPredMismatch {
        phi: InstId,
        expected: usize,
        got: usize,
    },
    PhiBadSource {
        phi: InstId,
        block: BlockId,
    },
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyError::BadInst(i) => write!(f, "Invalid InstId: {}", i),
            VerifyError::BadBlock(b) => write!(f, "Invalid BlockId: {}", b),
            VerifyError::BadOperand { inst } => {
                write!(f, "Instruction {} has an out-of-range operand", inst)
            }
            VerifyError::BadTerminator(b) => {
                write!(f, "Invalid terminator operand in block {}", b)
            }
            VerifyError::MisplacedInst { inst, block } => {
                write!(f, "Instruction {} listed in block {} but owned elsewhere", inst, block)
            }
            VerifyError::DuplicatePlacement(i) => {
                write!(f, "Instruction {} placed more than once", i)
            }
            VerifyError::EntryHasPredecessors(b) => {
                write!(f, "Entry block {} has predecessors", b)
            }
            VerifyError::PhiPredMismatch { phi, expected, got } => write!(
                f,
                "Phi {} has wrong incoming count. Expected {}, got {}",
                phi, expected, got
            ),
            VerifyError::PhiBadSource { phi, block } => write!(
                f,
                "Phi {} has an incoming from non-predecessor block {}",
                phi, block
            ),
        }
    }
}

/// Structural well-formedness check. The passes assume well-formed SSA and
/// never call this themselves; the pipeline invokes it behind an env gate.
pub fn verify_fn(func: &Function) -> Result<(), VerifyError> {
    check_blk(func, func.entry)?;

    // 1. Arena ids must match positions; every operand must be in range and
    // must not name the result of a void instruction.
    for (iid, inst) in func.insts.iter().enumerate() {
        if inst.id != iid {
            return Err(VerifyError::BadInst(iid));
        }
        let mut bad = false;
        inst.kind.for_each_operand(&mut |v| {
            if !value_ok(func, v) {
                bad = true;
            }
        });
        if let InstKind::Phi { incomings } = &inst.kind {
            for (_, bid) in incomings {
                if *bid >= func.blocks.len() {
                    bad = true;
                }
            }
        }
        if bad {
            return Err(VerifyError::BadOperand { inst: iid });
        }
    }

    // 2. Block structure: ids, terminator targets and operands.
    for (bid, block) in func.blocks.iter().enumerate() {
        if block.id != bid {
            return Err(VerifyError::BadBlock(bid));
        }
        for succ in block.term.successors() {
            check_blk(func, succ)?;
        }
        let mut bad = false;
        block.term.for_each_operand(&mut |v| {
            if !value_ok(func, v) {
                bad = true;
            }
        });
        if bad {
            return Err(VerifyError::BadTerminator(bid));
        }
    }

    // Safe to derive now that every successor is in range.
    let preds = func.predecessors();

    if !preds[func.entry].is_empty() {
        return Err(VerifyError::EntryHasPredecessors(func.entry));
    }

    // 3. Placement: each listed instruction belongs to that block, once.
    let mut placed = FxHashSet::default();
    for block in &func.blocks {
        for &iid in &block.insts {
            if iid >= func.insts.len() {
                return Err(VerifyError::BadInst(iid));
            }
            if func.insts[iid].bid != block.id {
                return Err(VerifyError::MisplacedInst {
                    inst: iid,
                    block: block.id,
                });
            }
            if !placed.insert(iid) {
                return Err(VerifyError::DuplicatePlacement(iid));
            }
        }
    }

    // 4. Placed phis must mirror their block's predecessor set exactly.
    for block in &func.blocks {
        for &iid in &block.insts {
            let InstKind::Phi { incomings } = &func.insts[iid].kind else {
                continue;
            };
            if incomings.len() != preds[block.id].len() {
                return Err(VerifyError::PhiPredMismatch {
                    phi: iid,
                    expected: preds[block.id].len(),
                    got: incomings.len(),
                });
            }
            let mut seen = FxHashSet::default();
            for (_, src) in incomings {
                if !preds[block.id].contains(src) || !seen.insert(*src) {
                    return Err(VerifyError::PhiBadSource {
                        phi: iid,
                        block: *src,
                    });
                }
            }
        }
    }

    Ok(())
}

fn value_ok(func: &Function, v: &Value) -> bool {
    match v {
        Value::Const(_) => true,
        Value::Inst(id) => *id < func.insts.len() && !func.insts[*id].kind.is_void(),
        Value::Arg(i) => *i < func.params.len(),
    }
}

fn check_blk(func: &Function, bid: BlockId) -> Result<(), VerifyError> {
    if bid >= func.blocks.len() {
        Err(VerifyError::BadBlock(bid))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_minimal_function() {
        let mut f = Function::new("id", vec!["x".to_string()]);
        let b0 = f.add_block();
        f.blocks[b0].term = Terminator::Return(Some(Value::Arg(0)));
        assert!(verify_fn(&f).is_ok());
    }

    #[test]
    fn rejects_phi_with_missing_incoming() {
        let mut f = Function::new("bad_phi", vec![]);
        let b0 = f.add_block();
        let b1 = f.add_block();
        let b2 = f.add_block();
        let b3 = f.add_block();
        f.blocks[b0].term = Terminator::Branch {
            cond: Value::Const(Imm::Bool(true)),
            then_bb: b1,
            else_bb: b2,
        };
        f.blocks[b1].term = Terminator::Jump(b3);
        f.blocks[b2].term = Terminator::Jump(b3);
        let phi = f.add_inst(
            b3,
            InstKind::Phi {
                incomings: vec![(Value::Const(Imm::Int(1)), b1)],
            },
        );
        f.blocks[b3].term = Terminator::Return(Some(Value::Inst(phi)));
        assert!(matches!(
            verify_fn(&f),
            Err(VerifyError::PhiPredMismatch { .. })
        ));
    }

    #[test]
    fn rejects_use_of_a_void_result() {
        let mut f = Function::new("void_use", vec![]);
        let b0 = f.add_block();
        let slot = f.add_inst(
            b0,
            InstKind::Alloca {
                size: Value::Const(Imm::Int(1)),
            },
        );
        let st = f.add_inst(
            b0,
            InstKind::Store {
                addr: Value::Inst(slot),
                value: Value::Const(Imm::Int(0)),
            },
        );
        f.blocks[b0].term = Terminator::Return(Some(Value::Inst(st)));
        assert!(matches!(verify_fn(&f), Err(VerifyError::BadTerminator(_))));
    }

    #[test]
    fn rejects_branch_into_entry() {
        let mut f = Function::new("loop_to_entry", vec![]);
        let b0 = f.add_block();
        f.blocks[b0].term = Terminator::Jump(b0);
        assert!(matches!(
            verify_fn(&f),
            Err(VerifyError::EntryHasPredecessors(_))
        ));
    }
}

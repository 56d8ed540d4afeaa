use crate::ir::*;
use rustc_hash::FxHashSet;
use tracing::debug;

// Mark and sweep over one function. Roots are the critical instructions
// (observable side effects or memory writes) and the terminator operands;
// everything a live instruction reads is transitively live; the sweep
// deletes the rest.
pub fn optimize(func: &mut Function) -> bool {
    let mut live: FxHashSet<InstId> = FxHashSet::default();
    let mut worklist: Vec<InstId> = Vec::new();

    for block in &func.blocks {
        for &iid in &block.insts {
            if is_critical(&func.insts[iid].kind) && live.insert(iid) {
                worklist.push(iid);
            }
        }
        block.term.for_each_operand(&mut |v| {
            if let Value::Inst(id) = v {
                if live.insert(*id) {
                    worklist.push(*id);
                }
            }
        });
    }

    while let Some(iid) = worklist.pop() {
        func.insts[iid].kind.for_each_operand(&mut |v| {
            if let Value::Inst(id) = v {
                if live.insert(*id) {
                    worklist.push(*id);
                }
            }
        });
    }

    let mut changed = false;
    for block in &mut func.blocks {
        let before = block.insts.len();
        block.insts.retain(|iid| live.contains(iid));
        if block.insts.len() != before {
            debug!(
                block = block.id,
                removed = before - block.insts.len(),
                "swept dead instructions"
            );
            changed = true;
        }
    }
    changed
}

// Calls are uniformly critical: this IR carries no purity information for
// callees.
fn is_critical(kind: &InstKind) -> bool {
    kind.has_side_effects() || kind.may_write_memory()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> Value {
        Value::Const(Imm::Int(v))
    }

    #[test]
    fn removes_unused_arithmetic() {
        let mut f = Function::new("dead_add", vec![]);
        let b0 = f.add_block();
        let d = f.add_inst(
            b0,
            InstKind::Binary {
                op: BinOp::Add,
                lhs: int(1),
                rhs: int(2),
            },
        );
        f.blocks[b0].term = Terminator::Return(Some(int(0)));

        assert!(optimize(&mut f));
        assert!(f.blocks[b0].insts.is_empty());
        // The arena entry stays; only the placement is gone.
        assert_eq!(f.insts[d].id, d);
    }

    #[test]
    fn keeps_returned_chain_alive() {
        let mut f = Function::new("chain", vec!["n".to_string()]);
        let b0 = f.add_block();
        let x = f.add_inst(
            b0,
            InstKind::Binary {
                op: BinOp::Add,
                lhs: Value::Arg(0),
                rhs: int(1),
            },
        );
        let y = f.add_inst(
            b0,
            InstKind::Binary {
                op: BinOp::Mul,
                lhs: Value::Inst(x),
                rhs: int(2),
            },
        );
        f.blocks[b0].term = Terminator::Return(Some(Value::Inst(y)));

        assert!(!optimize(&mut f));
        assert_eq!(f.blocks[b0].insts, vec![x, y]);
    }

    #[test]
    fn stores_root_their_operands() {
        let mut f = Function::new("store_root", vec![]);
        let b0 = f.add_block();
        let slot = f.add_inst(b0, InstKind::Alloca { size: int(1) });
        let v = f.add_inst(
            b0,
            InstKind::Binary {
                op: BinOp::Add,
                lhs: int(20),
                rhs: int(22),
            },
        );
        f.add_inst(
            b0,
            InstKind::Store {
                addr: Value::Inst(slot),
                value: Value::Inst(v),
            },
        );
        f.blocks[b0].term = Terminator::Return(None);

        assert!(!optimize(&mut f));
        assert_eq!(f.blocks[b0].insts.len(), 3);
    }

    #[test]
    fn calls_survive_without_uses() {
        let mut f = Function::new("call_kept", vec![]);
        let b0 = f.add_block();
        let c = f.add_inst(
            b0,
            InstKind::Call {
                callee: "emit".to_string(),
                args: vec![int(1)],
            },
        );
        let dead = f.add_inst(
            b0,
            InstKind::Binary {
                op: BinOp::Sub,
                lhs: Value::Inst(c),
                rhs: int(1),
            },
        );
        f.blocks[b0].term = Terminator::Return(None);

        assert!(optimize(&mut f));
        assert_eq!(f.blocks[b0].insts, vec![c]);
        let _ = dead;
    }

    #[test]
    fn branch_condition_stays_alive() {
        let mut f = Function::new("cond_live", vec!["p".to_string()]);
        let b0 = f.add_block();
        let b1 = f.add_block();
        let b2 = f.add_block();
        let c = f.add_inst(
            b0,
            InstKind::Binary {
                op: BinOp::Gt,
                lhs: Value::Arg(0),
                rhs: int(0),
            },
        );
        f.blocks[b0].term = Terminator::Branch {
            cond: Value::Inst(c),
            then_bb: b1,
            else_bb: b2,
        };
        f.blocks[b1].term = Terminator::Return(Some(int(1)));
        f.blocks[b2].term = Terminator::Return(Some(int(0)));

        assert!(!optimize(&mut f));
        assert_eq!(f.blocks[b0].insts, vec![c]);
    }
}

use crate::ir::*;
use tracing::debug;

// Rewrites self-recursive tail calls into a branch back to a loop header
// whose phis re-bind the parameters. Functions taking variable arguments or
// using dynamically-sized stack allocation are skipped entirely.
pub fn optimize(func: &mut Function) -> bool {
    if func.varargs || has_dynamic_alloca(func) {
        return false;
    }

    // Return(call) where the call is self-recursive and last in its block.
    let tail_blocks = find_tail_calls(func);
    if tail_blocks.is_empty() {
        return false;
    }

    // The old entry becomes the loop header; a fresh entry falls through to
    // it. The entry block has no predecessors in well-formed input, so the
    // header's phis only need the fall-through and the back edges.
    let header = func.entry;
    let new_entry = func.add_block();
    func.blocks[new_entry].term = Terminator::Jump(header);
    func.entry = new_entry;

    let mut phis = Vec::with_capacity(func.params.len());
    for i in 0..func.params.len() {
        let id = func.insts.len();
        func.insts.push(Inst {
            id,
            kind: InstKind::Phi {
                incomings: vec![(Value::Arg(i), new_entry)],
            },
            bid: header,
        });
        func.blocks[header].insts.insert(i, id);
        phis.push(id);
    }

    // The loop body now reads the current iteration's parameters through
    // the phis; only the phis themselves keep the raw arguments.
    for inst in &mut func.insts {
        if phis.contains(&inst.id) {
            continue;
        }
        inst.kind.for_each_operand_mut(&mut |v| {
            if let Value::Arg(i) = v {
                *v = Value::Inst(phis[*i]);
            }
        });
    }
    for block in &mut func.blocks {
        block.term.for_each_operand_mut(&mut |v| {
            if let Value::Arg(i) = v {
                *v = Value::Inst(phis[*i]);
            }
        });
    }

    // Retire each tail call: its (rewritten) arguments feed the phis and
    // the return becomes the back edge.
    for (bid, call_id) in tail_blocks {
        let args = match &func.insts[call_id].kind {
            InstKind::Call { args, .. } => args.clone(),
            _ => continue,
        };
        for (i, &phi) in phis.iter().enumerate() {
            if let InstKind::Phi { incomings } = &mut func.insts[phi].kind {
                incomings.push((args[i].clone(), bid));
            }
        }
        func.blocks[bid].insts.retain(|&iid| iid != call_id);
        func.blocks[bid].term = Terminator::Jump(header);
        debug!(block = bid, "tail call rewritten into loop back edge");
    }

    true
}

fn find_tail_calls(func: &Function) -> Vec<(BlockId, InstId)> {
    let mut found = Vec::new();
    for block in &func.blocks {
        let Terminator::Return(Some(Value::Inst(ret_id))) = &block.term else {
            continue;
        };
        let Some(&last) = block.insts.last() else {
            continue;
        };
        if last != *ret_id {
            continue;
        }
        if let InstKind::Call { callee, args } = &func.insts[last].kind {
            if callee == &func.name && args.len() == func.params.len() {
                found.push((block.id, last));
            }
        }
    }
    found
}

fn has_dynamic_alloca(func: &Function) -> bool {
    func.blocks.iter().flat_map(|b| &b.insts).any(|&iid| {
        matches!(&func.insts[iid].kind,
            InstKind::Alloca { size } if !matches!(size, Value::Const(_)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::verify::verify_fn;

    fn int(v: i64) -> Value {
        Value::Const(Imm::Int(v))
    }

    // count(n): entry: c = n <= 0; br c, base, rec
    //           base: ret 0
    //           rec: m = n - 1; r = count(m); ret r
    fn build_countdown() -> (Function, BlockId, BlockId, InstId) {
        let mut f = Function::new("count", vec!["n".to_string()]);
        let entry = f.add_block();
        let base = f.add_block();
        let rec = f.add_block();
        let c = f.add_inst(
            entry,
            InstKind::Binary {
                op: BinOp::Le,
                lhs: Value::Arg(0),
                rhs: int(0),
            },
        );
        f.blocks[entry].term = Terminator::Branch {
            cond: Value::Inst(c),
            then_bb: base,
            else_bb: rec,
        };
        f.blocks[base].term = Terminator::Return(Some(int(0)));
        let m = f.add_inst(
            rec,
            InstKind::Binary {
                op: BinOp::Sub,
                lhs: Value::Arg(0),
                rhs: int(1),
            },
        );
        let r = f.add_inst(
            rec,
            InstKind::Call {
                callee: "count".to_string(),
                args: vec![Value::Inst(m)],
            },
        );
        f.blocks[rec].term = Terminator::Return(Some(Value::Inst(r)));
        (f, entry, rec, r)
    }

    #[test]
    fn rewrites_tail_recursion_into_loop() {
        let (mut f, old_entry, rec, call) = build_countdown();
        assert!(optimize(&mut f));

        // Fresh entry jumps into the old entry, now the loop header.
        assert_ne!(f.entry, old_entry);
        assert_eq!(f.blocks[f.entry].term, Terminator::Jump(old_entry));

        // One parameter phi at the head of the header.
        let phi = f.blocks[old_entry].insts[0];
        let InstKind::Phi { incomings } = &f.insts[phi].kind else {
            panic!("expected a parameter phi");
        };
        assert_eq!(incomings.len(), 2);
        assert_eq!(incomings[0], (Value::Arg(0), f.entry));
        assert_eq!(incomings[1].1, rec);

        // The call is gone and the return became a back edge.
        assert!(!f.blocks[rec].insts.contains(&call));
        assert_eq!(f.blocks[rec].term, Terminator::Jump(old_entry));

        // Body reads the parameter through the phi.
        let m = f.blocks[rec].insts[0];
        assert!(matches!(
            &f.insts[m].kind,
            InstKind::Binary { lhs: Value::Inst(p), .. } if *p == phi
        ));

        assert!(verify_fn(&f).is_ok());
    }

    #[test]
    fn second_run_finds_nothing() {
        let (mut f, _, _, _) = build_countdown();
        assert!(optimize(&mut f));
        assert!(!optimize(&mut f));
    }

    #[test]
    fn skips_varargs_functions() {
        let (mut f, _, _, _) = build_countdown();
        f.varargs = true;
        assert!(!optimize(&mut f));
    }

    #[test]
    fn skips_dynamic_alloca() {
        let (mut f, _, rec, _) = build_countdown();
        let slot = f.add_inst(
            rec,
            InstKind::Alloca {
                size: Value::Arg(0),
            },
        );
        // Keep the call in tail position.
        let n = f.blocks[rec].insts.len();
        f.blocks[rec].insts.swap(n - 1, n - 2);
        let _ = slot;
        assert!(!optimize(&mut f));
    }

    #[test]
    fn ignores_non_tail_self_call() {
        // r = count(m); s = r + 1; ret s  -- the call is not last-and-returned.
        let mut f = Function::new("count", vec!["n".to_string()]);
        let b0 = f.add_block();
        let r = f.add_inst(
            b0,
            InstKind::Call {
                callee: "count".to_string(),
                args: vec![Value::Arg(0)],
            },
        );
        let s = f.add_inst(
            b0,
            InstKind::Binary {
                op: BinOp::Add,
                lhs: Value::Inst(r),
                rhs: int(1),
            },
        );
        f.blocks[b0].term = Terminator::Return(Some(Value::Inst(s)));
        assert!(!optimize(&mut f));
    }

    #[test]
    fn ignores_calls_to_other_functions() {
        let mut f = Function::new("outer", vec!["n".to_string()]);
        let b0 = f.add_block();
        let r = f.add_inst(
            b0,
            InstKind::Call {
                callee: "inner".to_string(),
                args: vec![Value::Arg(0)],
            },
        );
        f.blocks[b0].term = Terminator::Return(Some(Value::Inst(r)));
        assert!(!optimize(&mut f));
    }
}

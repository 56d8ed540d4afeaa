use crate::ir::*;
use crate::opt::fold;
use rustc_hash::{FxHashMap, FxHashSet};
use std::hash::Hash;
use tracing::{debug, trace};

/// Flat three-point lattice: Top (undefined) above Const above Bottom
/// (overdefined). A state only ever moves downward during one run.
#[derive(Clone, Debug, PartialEq)]
pub enum Lattice {
    Top,
    Const(Imm),
    Bottom,
}

impl Lattice {
    fn meet(&self, other: &Lattice) -> Lattice {
        match (self, other) {
            (Lattice::Top, x) | (x, Lattice::Top) => x.clone(),
            (Lattice::Bottom, _) | (_, Lattice::Bottom) => Lattice::Bottom,
            (Lattice::Const(a), Lattice::Const(b)) => {
                if a == b {
                    Lattice::Const(a.clone())
                } else {
                    Lattice::Bottom
                }
            }
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Lattice::Top => 0,
            Lattice::Const(_) => 1,
            Lattice::Bottom => 2,
        }
    }
}

// LIFO worklist with duplicate suppression while an item is pending. Pop
// order is most-recently-inserted first; any pop order reaches the same
// fixpoint, this one is fixed so diagnostics replay identically.
struct WorkStack<T> {
    stack: Vec<T>,
    pending: FxHashSet<T>,
}

impl<T: Copy + Eq + Hash> WorkStack<T> {
    fn new() -> Self {
        Self {
            stack: Vec::new(),
            pending: FxHashSet::default(),
        }
    }

    fn push(&mut self, item: T) {
        if self.pending.insert(item) {
            self.stack.push(item);
        }
    }

    fn pop(&mut self) -> Option<T> {
        let item = self.stack.pop()?;
        self.pending.remove(&item);
        Some(item)
    }

    fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

// Pending evaluation: an instruction, or the terminator of a block whose
// branch condition may have refined.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum Work {
    Inst(InstId),
    Term(BlockId),
}

/// Read-only outcome of one fixpoint run: exact reachability plus the proven
/// constants, for whichever cleanup policy a later pass chooses.
#[derive(Debug)]
pub struct SccpReport {
    pub executable_blocks: FxHashSet<BlockId>,
    pub executable_edges: FxHashSet<(BlockId, BlockId)>,
    pub constants: FxHashMap<InstId, Imm>,
}

pub struct Sccp;

impl Sccp {
    pub fn new() -> Self {
        Self
    }

    /// Full engine: fixpoint analysis, then constant substitution and
    /// deletion of the proven-constant instructions.
    pub fn optimize(&self, func: &mut Function) -> bool {
        let constants = {
            let mut solver = Solver::new(func);
            solver.solve();
            solver.constants()
        };
        rewrite(func, &constants)
    }

    /// Analysis only: solve the fixpoint without touching the function.
    pub fn analyze(&self, func: &Function) -> SccpReport {
        let mut solver = Solver::new(func);
        solver.solve();
        let constants = solver.constants();
        let Solver {
            exec_blocks,
            exec_edges,
            ..
        } = solver;
        SccpReport {
            executable_blocks: exec_blocks,
            executable_edges: exec_edges,
            constants,
        }
    }
}

// All scratch state lives here and dies with the invocation; nothing
// persists across functions or repeated calls.
struct Solver<'a> {
    func: &'a Function,
    state: FxHashMap<InstId, Lattice>,
    exec_edges: FxHashSet<(BlockId, BlockId)>,
    exec_blocks: FxHashSet<BlockId>,
    visited: FxHashSet<BlockId>,
    inst_work: WorkStack<Work>,
    block_work: WorkStack<BlockId>,
    users: FxHashMap<InstId, Vec<Work>>,
}

impl<'a> Solver<'a> {
    fn new(func: &'a Function) -> Self {
        Self {
            func,
            state: FxHashMap::default(),
            exec_edges: FxHashSet::default(),
            exec_blocks: FxHashSet::default(),
            visited: FxHashSet::default(),
            inst_work: WorkStack::new(),
            block_work: WorkStack::new(),
            users: build_users(func),
        }
    }

    // Entry is reachable by fiat; everything else must earn an executable
    // edge. Alternates between draining the instruction list and the block
    // list until neither has work, which is the fixpoint.
    fn solve(&mut self) {
        if self.func.blocks.is_empty() {
            return;
        }
        self.exec_blocks.insert(self.func.entry);
        self.block_work.push(self.func.entry);

        while !self.inst_work.is_empty() || !self.block_work.is_empty() {
            while let Some(item) = self.inst_work.pop() {
                match item {
                    Work::Inst(id) => self.visit_inst(id),
                    Work::Term(bid) => self.visit_term(bid),
                }
            }
            while let Some(bid) = self.block_work.pop() {
                self.visit_block(bid);
            }
        }
    }

    // Phis are re-evaluated on every pop: an edge proven executable after
    // the body ran (a loop back edge) can still refine them. The rest of
    // the body runs once.
    fn visit_block(&mut self, bid: BlockId) {
        let func = self.func;
        for &iid in &func.blocks[bid].insts {
            if func.insts[iid].kind.is_phi() {
                self.visit_inst(iid);
            }
        }
        if self.visited.insert(bid) {
            for &iid in &func.blocks[bid].insts {
                if !func.insts[iid].kind.is_phi() {
                    self.visit_inst(iid);
                }
            }
            self.visit_term(bid);
        }
    }

    // The value view of the lattice: literals are constants, arguments are
    // overdefined (they are never literals in this IR), instruction results
    // default to Top until proven otherwise.
    fn value_state(&self, v: &Value) -> Lattice {
        match v {
            Value::Const(imm) => Lattice::Const(imm.clone()),
            Value::Arg(_) => Lattice::Bottom,
            Value::Inst(id) => self.inst_state(*id),
        }
    }

    fn inst_state(&self, id: InstId) -> Lattice {
        self.state.get(&id).cloned().unwrap_or(Lattice::Top)
    }

    // Meet with the current state. Transitions are monotone (Top -> Const ->
    // Bottom); every change re-enqueues the users of this result.
    fn raise(&mut self, id: InstId, new: Lattice) {
        let old = self.inst_state(id);
        let merged = old.meet(&new);
        debug_assert!(
            merged.rank() >= old.rank(),
            "non-monotone transition for %{}",
            id
        );
        if merged != old {
            trace!(inst = id, state = ?merged, "lattice raised");
            self.state.insert(id, merged);
            if let Some(users) = self.users.get(&id) {
                for &u in users {
                    self.inst_work.push(u);
                }
            }
        }
    }

    fn is_executable(&self, from: BlockId, to: BlockId) -> bool {
        self.exec_edges.contains(&(from, to))
    }

    // Flips exactly once; the first flip wakes both endpoints so newly
    // reachable code is (re-)visited.
    fn mark_executable(&mut self, from: BlockId, to: BlockId) {
        if self.exec_edges.insert((from, to)) {
            trace!(from, to, "edge executable");
            self.exec_blocks.insert(to);
            self.block_work.push(from);
            self.block_work.push(to);
        }
    }

    // One dispatch point over the instruction kind.
    fn visit_inst(&mut self, id: InstId) {
        let func = self.func;
        let inst = &func.insts[id];
        let new = match &inst.kind {
            InstKind::Binary { op, lhs, rhs } => {
                match (self.value_state(lhs), self.value_state(rhs)) {
                    // An undefined operand may still become constant: wait.
                    (Lattice::Top, _) | (_, Lattice::Top) => return,
                    (Lattice::Bottom, _) | (_, Lattice::Bottom) => Lattice::Bottom,
                    (Lattice::Const(a), Lattice::Const(b)) => {
                        match fold::fold_binary(*op, &a, &b) {
                            Some(imm) => Lattice::Const(imm),
                            None => Lattice::Bottom,
                        }
                    }
                }
            }
            InstKind::Unary { op, operand } => match self.value_state(operand) {
                Lattice::Top => return,
                Lattice::Bottom => Lattice::Bottom,
                Lattice::Const(a) => match fold::fold_unary(*op, &a) {
                    Some(imm) => Lattice::Const(imm),
                    None => Lattice::Bottom,
                },
            },
            InstKind::Phi { incomings } => self.eval_phi(inst.bid, incomings),
            // Loads, calls and allocas are opaque: never constant.
            InstKind::Load { .. } | InstKind::Call { .. } | InstKind::Alloca { .. } => {
                Lattice::Bottom
            }
            // Stores produce no value.
            InstKind::Store { .. } => return,
        };
        self.raise(id, new);
    }

    // Merge rule: only incomings on executable edges count. Any considered
    // Bottom wins immediately; two different constants on live edges can
    // never merge back, so they are Bottom too; a considered Top keeps the
    // phi undefined until the operand resolves.
    fn eval_phi(&self, bid: BlockId, incomings: &[(Value, BlockId)]) -> Lattice {
        let mut common: Option<Imm> = None;
        let mut saw_top = false;
        for (value, pred) in incomings {
            if !self.is_executable(*pred, bid) {
                continue;
            }
            match self.value_state(value) {
                Lattice::Bottom => return Lattice::Bottom,
                Lattice::Top => saw_top = true,
                Lattice::Const(imm) => match &common {
                    None => common = Some(imm),
                    Some(c) if *c == imm => {}
                    Some(_) => return Lattice::Bottom,
                },
            }
        }
        if saw_top {
            return Lattice::Top;
        }
        match common {
            Some(imm) => Lattice::Const(imm),
            // No executable incoming yet.
            None => Lattice::Top,
        }
    }

    // Branch rule: a constant condition selects one successor edge; a
    // condition not yet known to be constant keeps both (don't prune too
    // early). Jumps are unconditional.
    fn visit_term(&mut self, bid: BlockId) {
        let func = self.func;
        match &func.blocks[bid].term {
            Terminator::Jump(target) => self.mark_executable(bid, *target),
            Terminator::Branch {
                cond,
                then_bb,
                else_bb,
            } => match self.value_state(cond) {
                Lattice::Const(Imm::Bool(true)) => self.mark_executable(bid, *then_bb),
                Lattice::Const(Imm::Bool(false)) => self.mark_executable(bid, *else_bb),
                // Unknown, overdefined, or non-boolean condition.
                _ => {
                    self.mark_executable(bid, *then_bb);
                    self.mark_executable(bid, *else_bb);
                }
            },
            Terminator::Return(_) | Terminator::Unreachable => {}
        }
    }

    fn constants(&self) -> FxHashMap<InstId, Imm> {
        self.state
            .iter()
            .filter_map(|(id, s)| match s {
                Lattice::Const(imm) => Some((*id, imm.clone())),
                _ => None,
            })
            .collect()
    }
}

// Def-use edges, prebuilt once per invocation from the instruction arena and
// the branch conditions. The map is a snapshot: the graph is read-only for
// the whole analysis phase.
fn build_users(func: &Function) -> FxHashMap<InstId, Vec<Work>> {
    let mut users: FxHashMap<InstId, Vec<Work>> = FxHashMap::default();
    for inst in &func.insts {
        inst.kind.for_each_operand(&mut |v| {
            if let Value::Inst(def) = v {
                users.entry(*def).or_default().push(Work::Inst(inst.id));
            }
        });
    }
    for block in &func.blocks {
        if let Terminator::Branch {
            cond: Value::Inst(def),
            ..
        } = &block.term
        {
            users.entry(*def).or_default().push(Work::Term(block.id));
        }
    }
    users
}

// Substitute every proven constant into its use sites, then drop the
// defining instructions from their blocks. Branches and unreachable blocks
// are left alone: reachability is reported, pruning is a later pass's job.
fn rewrite(func: &mut Function, constants: &FxHashMap<InstId, Imm>) -> bool {
    if constants.is_empty() {
        return false;
    }

    for iid in 0..func.insts.len() {
        if constants.contains_key(&iid) {
            debug!(inst = %func.insts[iid], "deleting constant instruction");
        }
        func.insts[iid].kind.for_each_operand_mut(&mut |v| {
            if let Value::Inst(def) = v {
                if let Some(imm) = constants.get(def) {
                    *v = Value::Const(imm.clone());
                }
            }
        });
    }
    for block in &mut func.blocks {
        block.term.for_each_operand_mut(&mut |v| {
            if let Value::Inst(def) = v {
                if let Some(imm) = constants.get(def) {
                    *v = Value::Const(imm.clone());
                }
            }
        });
        block.insts.retain(|iid| !constants.contains_key(iid));
    }
    true
}

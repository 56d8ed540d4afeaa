pub type BlockId = usize;
pub type InstId = usize;

/// Immediate scalar constant, known at compile time.
#[derive(Debug, Clone, PartialEq)]
pub enum Imm {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Eq for Imm {}
impl std::hash::Hash for Imm {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Imm::Int(i) => i.hash(state),
            Imm::Float(v) => v.to_bits().hash(state),
            Imm::Bool(b) => b.hash(state),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Neg,
    Not,
}

/// An abstract operand: a literal, the result of an instruction, or a
/// function argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Const(Imm),
    Inst(InstId),
    Arg(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstKind {
    Binary {
        op: BinOp,
        lhs: Value,
        rhs: Value,
    },
    Unary {
        op: UnOp,
        operand: Value,
    },

    // Merges values from predecessor blocks.
    Phi {
        incomings: Vec<(Value, BlockId)>,
    },

    // Opaque call. The optimizer knows nothing about the callee body.
    Call {
        callee: String,
        args: Vec<Value>,
    },

    // Stack allocation, yielding an address. Dynamic when `size` is not a
    // literal.
    Alloca {
        size: Value,
    },
    Load {
        addr: Value,
    },
    // Void: produces no result.
    Store {
        addr: Value,
        value: Value,
    },
}

impl InstKind {
    pub fn is_phi(&self) -> bool {
        matches!(self, InstKind::Phi { .. })
    }

    /// Produces no result value.
    pub fn is_void(&self) -> bool {
        matches!(self, InstKind::Store { .. })
    }

    /// Observable effects beyond producing a value.
    pub fn has_side_effects(&self) -> bool {
        matches!(self, InstKind::Call { .. } | InstKind::Store { .. })
    }

    pub fn may_write_memory(&self) -> bool {
        matches!(self, InstKind::Store { .. })
    }

    pub fn for_each_operand(&self, f: &mut impl FnMut(&Value)) {
        match self {
            InstKind::Binary { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            InstKind::Unary { operand, .. } => f(operand),
            InstKind::Phi { incomings } => {
                for (v, _) in incomings {
                    f(v);
                }
            }
            InstKind::Call { args, .. } => {
                for a in args {
                    f(a);
                }
            }
            InstKind::Alloca { size } => f(size),
            InstKind::Load { addr } => f(addr),
            InstKind::Store { addr, value } => {
                f(addr);
                f(value);
            }
        }
    }

    pub fn for_each_operand_mut(&mut self, f: &mut impl FnMut(&mut Value)) {
        match self {
            InstKind::Binary { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            InstKind::Unary { operand, .. } => f(operand),
            InstKind::Phi { incomings } => {
                for (v, _) in incomings {
                    f(v);
                }
            }
            InstKind::Call { args, .. } => {
                for a in args {
                    f(a);
                }
            }
            InstKind::Alloca { size } => f(size),
            InstKind::Load { addr } => f(addr),
            InstKind::Store { addr, value } => {
                f(addr);
                f(value);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Inst {
    pub id: InstId,
    pub kind: InstKind,
    pub bid: BlockId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Terminator {
    Jump(BlockId),
    Branch {
        cond: Value,
        then_bb: BlockId,
        else_bb: BlockId,
    },
    Return(Option<Value>),
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Jump(target) => vec![*target],
            Terminator::Branch {
                then_bb, else_bb, ..
            } => vec![*then_bb, *else_bb],
            Terminator::Return(_) | Terminator::Unreachable => Vec::new(),
        }
    }

    pub fn for_each_operand(&self, f: &mut impl FnMut(&Value)) {
        match self {
            Terminator::Branch { cond, .. } => f(cond),
            Terminator::Return(Some(v)) => f(v),
            _ => {}
        }
    }

    pub fn for_each_operand_mut(&mut self, f: &mut impl FnMut(&mut Value)) {
        match self {
            Terminator::Branch { cond, .. } => f(cond),
            Terminator::Return(Some(v)) => f(v),
            _ => {}
        }
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub insts: Vec<InstId>, // program order
    pub term: Terminator,
}

/// One function body in SSA form. Blocks and instructions live in arenas
/// indexed by `BlockId`/`InstId`; a block owns only the positions of its
/// instructions, so deleting an instruction invalidates an index, never a
/// reference.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub varargs: bool,
    pub blocks: Vec<Block>,  // indices are BlockIds
    pub insts: Vec<Inst>,    // indices are InstIds
    pub entry: BlockId,
}

impl Function {
    pub fn new(name: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            name: name.into(),
            params,
            varargs: false,
            blocks: Vec::new(),
            insts: Vec::new(),
            entry: 0,
        }
    }

    pub fn add_block(&mut self) -> BlockId {
        let id = self.blocks.len();
        self.blocks.push(Block {
            id,
            insts: Vec::new(),
            // Set to a real terminator when the block is finalized.
            term: Terminator::Unreachable,
        });
        id
    }

    /// Appends an instruction to `bid` and returns its id.
    pub fn add_inst(&mut self, bid: BlockId, kind: InstKind) -> InstId {
        let id = self.insts.len();
        self.insts.push(Inst { id, kind, bid });
        self.blocks[bid].insts.push(id);
        id
    }

    pub fn predecessors(&self) -> Vec<Vec<BlockId>> {
        let mut preds: Vec<Vec<BlockId>> = vec![Vec::new(); self.blocks.len()];
        for block in &self.blocks {
            for succ in block.term.successors() {
                preds[succ].push(block.id);
            }
        }
        preds
    }
}

use crate::ir::def::*;
use std::fmt;

impl fmt::Display for Imm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Imm::Int(i) => write!(f, "{}", i),
            // Debug keeps the decimal point, so 1.0 stays distinct from 1.
            Imm::Float(v) => write!(f, "{:?}", v),
            Imm::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Const(imm) => write!(f, "{}", imm),
            Value::Inst(id) => write!(f, "%{}", id),
            Value::Arg(i) => write!(f, "arg{}", i),
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Rem => "rem",
            BinOp::Eq => "eq",
            BinOp::Ne => "ne",
            BinOp::Lt => "lt",
            BinOp::Le => "le",
            BinOp::Gt => "gt",
            BinOp::Ge => "ge",
            BinOp::And => "and",
            BinOp::Or => "or",
        };
        write!(f, "{}", name)
    }
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnOp::Neg => write!(f, "neg"),
            UnOp::Not => write!(f, "not"),
        }
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            InstKind::Binary { op, lhs, rhs } => {
                write!(f, "%{} = {} {}, {}", self.id, op, lhs, rhs)
            }
            InstKind::Unary { op, operand } => write!(f, "%{} = {} {}", self.id, op, operand),
            InstKind::Phi { incomings } => {
                write!(f, "%{} = phi", self.id)?;
                for (i, (v, bid)) in incomings.iter().enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    write!(f, "{}[{}, bb{}]", sep, v, bid)?;
                }
                Ok(())
            }
            InstKind::Call { callee, args } => {
                write!(f, "%{} = call {}(", self.id, callee)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            InstKind::Alloca { size } => write!(f, "%{} = alloca {}", self.id, size),
            InstKind::Load { addr } => write!(f, "%{} = load {}", self.id, addr),
            InstKind::Store { addr, value } => write!(f, "store {}, {}", addr, value),
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Jump(target) => write!(f, "jmp bb{}", target),
            Terminator::Branch {
                cond,
                then_bb,
                else_bb,
            } => write!(f, "br {}, bb{}, bb{}", cond, then_bb, else_bb),
            Terminator::Return(Some(v)) => write!(f, "ret {}", v),
            Terminator::Return(None) => write!(f, "ret"),
            Terminator::Unreachable => write!(f, "unreachable"),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        if self.varargs {
            write!(f, ", ...")?;
        }
        writeln!(f, ")")?;
        for block in &self.blocks {
            writeln!(f, "bb{}:", block.id)?;
            for &iid in &block.insts {
                writeln!(f, "  {}", self.insts[iid])?;
            }
            writeln!(f, "  {}", block.term)?;
        }
        Ok(())
    }
}

use crate::ir::{BinOp, Imm, UnOp};

// Pure constant folding over immediate operands. `None` means "not foldable"
// and is an ordinary outcome for the caller, never a fault: SCCP keeps
// refining the rest of the function around an unfoldable expression.

pub fn fold_binary(op: BinOp, lhs: &Imm, rhs: &Imm) -> Option<Imm> {
    match (lhs, rhs) {
        (Imm::Int(a), Imm::Int(b)) => fold_int(op, *a, *b),
        (Imm::Float(a), Imm::Float(b)) => fold_float(op, *a, *b),
        (Imm::Bool(a), Imm::Bool(b)) => fold_bool(op, *a, *b),
        // Mixed operand types are left to the runtime.
        _ => None,
    }
}

pub fn fold_unary(op: UnOp, operand: &Imm) -> Option<Imm> {
    match (op, operand) {
        (UnOp::Neg, Imm::Int(a)) => Some(Imm::Int(a.wrapping_neg())),
        (UnOp::Neg, Imm::Float(a)) => Some(Imm::Float(-a)),
        (UnOp::Not, Imm::Bool(b)) => Some(Imm::Bool(!b)),
        _ => None,
    }
}

// Two's-complement wrapping semantics. Division and remainder give up on a
// zero divisor and on i64::MIN / -1 instead of taking a side on them.
fn fold_int(op: BinOp, a: i64, b: i64) -> Option<Imm> {
    let imm = match op {
        BinOp::Add => Imm::Int(a.wrapping_add(b)),
        BinOp::Sub => Imm::Int(a.wrapping_sub(b)),
        BinOp::Mul => Imm::Int(a.wrapping_mul(b)),
        BinOp::Div => {
            if b == 0 || (a == i64::MIN && b == -1) {
                return None;
            }
            Imm::Int(a / b)
        }
        BinOp::Rem => {
            if b == 0 || (a == i64::MIN && b == -1) {
                return None;
            }
            Imm::Int(a % b)
        }
        BinOp::Eq => Imm::Bool(a == b),
        BinOp::Ne => Imm::Bool(a != b),
        BinOp::Lt => Imm::Bool(a < b),
        BinOp::Le => Imm::Bool(a <= b),
        BinOp::Gt => Imm::Bool(a > b),
        BinOp::Ge => Imm::Bool(a >= b),
        BinOp::And | BinOp::Or => return None,
    };
    Some(imm)
}

fn fold_float(op: BinOp, a: f64, b: f64) -> Option<Imm> {
    let imm = match op {
        BinOp::Add => Imm::Float(a + b),
        BinOp::Sub => Imm::Float(a - b),
        BinOp::Mul => Imm::Float(a * b),
        BinOp::Div => Imm::Float(a / b),
        BinOp::Rem => Imm::Float(a % b),
        BinOp::Eq => Imm::Bool(a == b),
        BinOp::Ne => Imm::Bool(a != b),
        BinOp::Lt => Imm::Bool(a < b),
        BinOp::Le => Imm::Bool(a <= b),
        BinOp::Gt => Imm::Bool(a > b),
        BinOp::Ge => Imm::Bool(a >= b),
        BinOp::And | BinOp::Or => return None,
    };
    Some(imm)
}

fn fold_bool(op: BinOp, a: bool, b: bool) -> Option<Imm> {
    let imm = match op {
        BinOp::And => Imm::Bool(a && b),
        BinOp::Or => Imm::Bool(a || b),
        BinOp::Eq => Imm::Bool(a == b),
        BinOp::Ne => Imm::Bool(a != b),
        _ => return None,
    };
    Some(imm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_arithmetic() {
        assert_eq!(
            fold_binary(BinOp::Add, &Imm::Int(2), &Imm::Int(3)),
            Some(Imm::Int(5))
        );
        assert_eq!(
            fold_binary(BinOp::Mul, &Imm::Int(-4), &Imm::Int(6)),
            Some(Imm::Int(-24))
        );
        assert_eq!(
            fold_binary(BinOp::Div, &Imm::Int(7), &Imm::Int(2)),
            Some(Imm::Int(3))
        );
        assert_eq!(
            fold_binary(BinOp::Rem, &Imm::Int(7), &Imm::Int(2)),
            Some(Imm::Int(1))
        );
    }

    #[test]
    fn division_by_zero_is_not_foldable() {
        assert_eq!(fold_binary(BinOp::Div, &Imm::Int(7), &Imm::Int(0)), None);
        assert_eq!(fold_binary(BinOp::Rem, &Imm::Int(7), &Imm::Int(0)), None);
        assert_eq!(
            fold_binary(BinOp::Div, &Imm::Int(i64::MIN), &Imm::Int(-1)),
            None
        );
    }

    #[test]
    fn wrapping_overflow() {
        assert_eq!(
            fold_binary(BinOp::Add, &Imm::Int(i64::MAX), &Imm::Int(1)),
            Some(Imm::Int(i64::MIN))
        );
        assert_eq!(fold_unary(UnOp::Neg, &Imm::Int(i64::MIN)), Some(Imm::Int(i64::MIN)));
    }

    #[test]
    fn comparisons() {
        assert_eq!(
            fold_binary(BinOp::Lt, &Imm::Int(2), &Imm::Int(3)),
            Some(Imm::Bool(true))
        );
        assert_eq!(
            fold_binary(BinOp::Ge, &Imm::Float(1.5), &Imm::Float(2.5)),
            Some(Imm::Bool(false))
        );
    }

    #[test]
    fn booleans() {
        assert_eq!(
            fold_binary(BinOp::And, &Imm::Bool(true), &Imm::Bool(false)),
            Some(Imm::Bool(false))
        );
        assert_eq!(
            fold_binary(BinOp::Or, &Imm::Bool(false), &Imm::Bool(true)),
            Some(Imm::Bool(true))
        );
        assert_eq!(fold_unary(UnOp::Not, &Imm::Bool(true)), Some(Imm::Bool(false)));
    }

    #[test]
    fn type_mismatch_is_not_foldable() {
        assert_eq!(fold_binary(BinOp::Add, &Imm::Int(1), &Imm::Float(1.0)), None);
        assert_eq!(fold_binary(BinOp::And, &Imm::Int(1), &Imm::Int(0)), None);
        assert_eq!(fold_unary(UnOp::Not, &Imm::Int(1)), None);
    }
}

//! Synchronous kernels: everything that computes its results directly from
//! ready operand payloads.

use crate::error::Error;
use crate::program::op::OpKind;
use crate::program::types::Type;
use crate::runtime::value::Payload;

/// Evaluate a pure arithmetic or logic operation.
pub(crate) fn evaluate(kind: &OpKind, operands: &[Payload]) -> Result<Vec<Payload>, Error> {
    use Payload::*;
    let name = || kind.name();
    let mismatch = |expected: &Type, found: &Payload| {
        Err(Error::type_mismatch(name(), expected, &found.ty()))
    };
    let [a, b] = operands else {
        return Err(Error::signature(
            name(),
            format!("expected 2 operands, found {}", operands.len()),
        ));
    };
    match (kind, a, b) {
        (OpKind::Add(_), I32(x), I32(y)) => Ok(vec![I32(x.wrapping_add(*y))]),
        (OpKind::Add(_), I64(x), I64(y)) => Ok(vec![I64(x.wrapping_add(*y))]),
        (OpKind::Add(_), F32(x), F32(y)) => Ok(vec![F32(x + y)]),
        (OpKind::Add(_), F64(x), F64(y)) => Ok(vec![F64(x + y)]),
        (OpKind::And, Bool(x), Bool(y)) => Ok(vec![Bool(*x && *y)]),
        (OpKind::Equal(_), Bool(x), Bool(y)) => Ok(vec![Bool(x == y)]),
        (OpKind::Equal(_), I32(x), I32(y)) => Ok(vec![Bool(x == y)]),
        (OpKind::Equal(_), I64(x), I64(y)) => Ok(vec![Bool(x == y)]),
        (OpKind::Div(_), I32(_), I32(0)) | (OpKind::Div(_), I64(_), I64(0)) => {
            Err(Error::DivideByZero)
        }
        (OpKind::Div(_), I32(x), I32(y)) => {
            Ok(vec![I32(x.wrapping_div(*y)), I32(x.wrapping_rem(*y))])
        }
        (OpKind::Div(_), I64(x), I64(y)) => {
            Ok(vec![I64(x.wrapping_div(*y)), I64(x.wrapping_rem(*y))])
        }
        (OpKind::Add(ty) | OpKind::Equal(ty) | OpKind::Div(ty), a, b) => {
            if &a.ty() != ty {
                mismatch(ty, a)
            } else {
                mismatch(ty, b)
            }
        }
        (OpKind::And, a, b) => {
            if a.ty() != Type::I1 {
                mismatch(&Type::I1, a)
            } else {
                mismatch(&Type::I1, b)
            }
        }
        _ => Err(Error::signature(name(), "not a pure kernel")),
    }
}

/// The line a `print` writes for `value`.
pub(crate) fn render(value: &Payload) -> String {
    format!("{} = {}", value.ty(), value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn div_yields_quotient_and_remainder() {
        assert_eq!(
            evaluate(&OpKind::Div(Type::I32), &[Payload::I32(10), Payload::I32(3)]),
            Ok(vec![Payload::I32(3), Payload::I32(1)])
        );
        assert_eq!(
            evaluate(&OpKind::Div(Type::I64), &[Payload::I64(-7), Payload::I64(2)]),
            Ok(vec![Payload::I64(-3), Payload::I64(-1)])
        );
    }

    #[test]
    fn div_by_zero_fails() {
        assert_eq!(
            evaluate(&OpKind::Div(Type::I32), &[Payload::I32(10), Payload::I32(0)]),
            Err(Error::DivideByZero)
        );
    }

    #[test]
    fn integer_add_wraps() {
        assert_eq!(
            evaluate(
                &OpKind::Add(Type::I32),
                &[Payload::I32(i32::MAX), Payload::I32(1)]
            ),
            Ok(vec![Payload::I32(i32::MIN)])
        );
    }

    #[test]
    fn logic_and_equality() {
        assert_eq!(
            evaluate(&OpKind::And, &[Payload::Bool(true), Payload::Bool(false)]),
            Ok(vec![Payload::Bool(false)])
        );
        assert_eq!(
            evaluate(&OpKind::Equal(Type::I64), &[Payload::I64(4), Payload::I64(4)]),
            Ok(vec![Payload::Bool(true)])
        );
    }

    #[test]
    fn operand_of_the_wrong_type() {
        assert_eq!(
            evaluate(&OpKind::Add(Type::I32), &[Payload::I32(1), Payload::I64(1)]),
            Err(Error::type_mismatch("add.i32", &Type::I32, &Type::I64))
        );
    }

    #[test]
    fn render_includes_type() {
        assert_eq!(render(&Payload::I32(3)), "i32 = 3");
        assert_eq!(render(&Payload::F64(1.5)), "f64 = 1.5");
        assert_eq!(render(&Payload::Bool(true)), "i1 = true");
    }
}

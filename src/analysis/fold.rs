//! Folding of pure operations over [`Value`]s.
//!
//! Each function takes operand values and returns the result value. Constants fold with the
//! operation's real semantics; unknown operands give an unknown of the result kind, except
//! where an algebraic identity decides the result anyway (`x * 0`, `x & 0`). `Undefined`
//! operands give `Undefined`.

use std::cmp::Ordering;

use crate::{
    analysis::value::{ConstValue, Value, ValueType},
    graph::{BinaryOp, BitwiseOp, CompareKind, CompareOp, ShiftOp},
    metadata::PrimitiveType,
};

fn any_undefined(values: &[&Value]) -> bool {
    values.iter().any(|v| v.is_undefined())
}

fn unknown(ty: PrimitiveType) -> Value {
    Value::Unknown(ValueType::from(ty))
}

fn integer_zero(value: &Value) -> bool {
    matches!(value, Value::Const(c) if c.is_integer_zero())
}

/// Folds `left op right` for operands of kind `ty`.
#[must_use]
pub fn fold_binary(ty: PrimitiveType, op: BinaryOp, left: &Value, right: &Value) -> Value {
    if any_undefined(&[left, right]) {
        return Value::Undefined;
    }

    let integral = matches!(ty, PrimitiveType::Int | PrimitiveType::Long);
    if op == BinaryOp::Mul && integral {
        if integer_zero(left) {
            return left.clone();
        }
        if integer_zero(right) {
            return right.clone();
        }
    }

    let (Value::Const(a), Value::Const(b)) = (left, right) else {
        return unknown(ty);
    };
    let folded = match op {
        BinaryOp::Add => a.add(b),
        BinaryOp::Sub => a.sub(b),
        BinaryOp::Mul => a.mul(b),
        BinaryOp::Div => a.div(b),
        BinaryOp::Rem => a.rem(b),
    };
    folded.map_or_else(|| unknown(ty), Value::Const)
}

/// Folds `-operand`.
#[must_use]
pub fn fold_negate(ty: PrimitiveType, operand: &Value) -> Value {
    match operand {
        Value::Undefined => Value::Undefined,
        Value::Const(c) => c.negate().map_or_else(|| unknown(ty), Value::Const),
        _ => unknown(ty),
    }
}

/// Folds a shift of `value` by `count`.
#[must_use]
pub fn fold_shift(ty: PrimitiveType, op: ShiftOp, value: &Value, count: &Value) -> Value {
    if any_undefined(&[value, count]) {
        return Value::Undefined;
    }
    let (Value::Const(v), Value::Const(c)) = (value, count) else {
        return unknown(ty);
    };
    let folded = match op {
        ShiftOp::Shl => v.shl(c),
        ShiftOp::Shr => v.shr(c),
        ShiftOp::Ushr => v.ushr(c),
    };
    folded.map_or_else(|| unknown(ty), Value::Const)
}

/// Folds bitwise logic.
#[must_use]
pub fn fold_bitwise(ty: PrimitiveType, op: BitwiseOp, left: &Value, right: &Value) -> Value {
    if any_undefined(&[left, right]) {
        return Value::Undefined;
    }
    if op == BitwiseOp::And {
        if integer_zero(left) {
            return left.clone();
        }
        if integer_zero(right) {
            return right.clone();
        }
    }
    let (Value::Const(a), Value::Const(b)) = (left, right) else {
        return unknown(ty);
    };
    let folded = match op {
        BitwiseOp::And => a.and(b),
        BitwiseOp::Or => a.or(b),
        BitwiseOp::Xor => a.xor(b),
    };
    folded.map_or_else(|| unknown(ty), Value::Const)
}

/// Folds a primitive conversion.
#[must_use]
pub fn fold_convert(to: PrimitiveType, operand: &Value) -> Value {
    match operand {
        Value::Undefined => Value::Undefined,
        Value::Const(c) => c.convert(to).map_or_else(|| unknown(to), Value::Const),
        _ => unknown(to),
    }
}

/// Folds a three-way comparison to `-1`, `0` or `1`.
#[must_use]
pub fn fold_compare(op: CompareOp, left: &Value, right: &Value) -> Value {
    if any_undefined(&[left, right]) {
        return Value::Undefined;
    }
    let (Value::Const(a), Value::Const(b)) = (left, right) else {
        return Value::Unknown(ValueType::Int);
    };

    let nan_result = match op {
        CompareOp::Fcmpl | CompareOp::Dcmpl => -1,
        _ => 1,
    };
    let ordering = match (op, a, b) {
        (CompareOp::Lcmp, ConstValue::Long(x), ConstValue::Long(y)) => Some(x.cmp(y)),
        (CompareOp::Fcmpl | CompareOp::Fcmpg, ConstValue::Float(x), ConstValue::Float(y)) => {
            x.partial_cmp(y)
        }
        (CompareOp::Dcmpl | CompareOp::Dcmpg, ConstValue::Double(x), ConstValue::Double(y)) => {
            x.partial_cmp(y)
        }
        _ => return Value::Unknown(ValueType::Int),
    };

    Value::int(match ordering {
        Some(Ordering::Less) => -1,
        Some(Ordering::Equal) => 0,
        Some(Ordering::Greater) => 1,
        None => nan_result,
    })
}

/// Decides a conditional jump.
///
/// Integers compare numerically. References support only `Eq` and `Ne`: two known objects
/// are equal exactly when they are the same allocation, a known object never equals
/// `null` or a string literal, and string literals are interned so they compare by content.
/// Returns `None` when the outcome depends on something unknown.
#[must_use]
pub fn compare_branch(kind: CompareKind, left: &Value, right: &Value) -> Option<bool> {
    let ordering = match (left, right) {
        (Value::Const(ConstValue::Int(a)), Value::Const(ConstValue::Int(b))) => a.cmp(b),
        _ => {
            let equal = reference_equality(left, right)?;
            match kind {
                CompareKind::Eq => return Some(equal),
                CompareKind::Ne => return Some(!equal),
                _ => return None,
            }
        }
    };
    Some(kind.holds(ordering))
}

fn reference_equality(left: &Value, right: &Value) -> Option<bool> {
    match (left, right) {
        (Value::Ref(a), Value::Ref(b)) => Some(a == b),
        (Value::Ref(_), Value::Const(ConstValue::Null | ConstValue::String(_)))
        | (Value::Const(ConstValue::Null | ConstValue::String(_)), Value::Ref(_)) => Some(false),
        (Value::Const(ConstValue::Null), Value::Const(ConstValue::Null)) => Some(true),
        (Value::Const(ConstValue::String(a)), Value::Const(ConstValue::String(b))) => {
            Some(a == b)
        }
        (Value::Const(ConstValue::Null), Value::Const(ConstValue::String(_)))
        | (Value::Const(ConstValue::String(_)), Value::Const(ConstValue::Null)) => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::heap::ObjectRef;

    const INT: PrimitiveType = PrimitiveType::Int;

    #[test]
    fn test_min_int_divided_by_minus_one() {
        let result = fold_binary(INT, BinaryOp::Div, &Value::int(i32::MIN), &Value::int(-1));
        assert_eq!(result, Value::int(i32::MIN));
    }

    #[test]
    fn test_folding_is_idempotent() {
        let a = fold_binary(INT, BinaryOp::Mul, &Value::int(7), &Value::int(6));
        let b = fold_binary(INT, BinaryOp::Mul, &Value::int(7), &Value::int(6));
        assert_eq!(a, b);
        assert_eq!(a, Value::int(42));
    }

    #[test]
    fn test_mixed_arithmetic() {
        // (3 + 4) * 5 - 10 / 3 % 2
        let sum = fold_binary(INT, BinaryOp::Add, &Value::int(3), &Value::int(4));
        let product = fold_binary(INT, BinaryOp::Mul, &sum, &Value::int(5));
        let quotient = fold_binary(INT, BinaryOp::Div, &Value::int(10), &Value::int(3));
        let remainder = fold_binary(INT, BinaryOp::Rem, &quotient, &Value::int(2));
        let result = fold_binary(INT, BinaryOp::Sub, &product, &remainder);
        assert_eq!(result, Value::int(34));
    }

    #[test]
    fn test_multiplication_by_zero_with_unknown() {
        let unknown = Value::Unknown(ValueType::Int);
        assert_eq!(
            fold_binary(INT, BinaryOp::Mul, &unknown, &Value::int(0)),
            Value::int(0)
        );
        assert_eq!(
            fold_binary(INT, BinaryOp::Mul, &Value::int(0), &unknown),
            Value::int(0)
        );
        assert_eq!(
            fold_binary(INT, BinaryOp::Add, &Value::int(0), &unknown),
            Value::Unknown(ValueType::Int)
        );
    }

    #[test]
    fn test_float_multiplication_by_zero_needs_both() {
        let unknown = Value::Unknown(ValueType::Double);
        let zero = Value::Const(ConstValue::Double(0.0));
        assert_eq!(
            fold_binary(PrimitiveType::Double, BinaryOp::Mul, &unknown, &zero),
            Value::Unknown(ValueType::Double)
        );
    }

    #[test]
    fn test_and_with_zero() {
        let unknown = Value::Unknown(ValueType::Int);
        assert_eq!(
            fold_bitwise(INT, BitwiseOp::And, &unknown, &Value::int(0)),
            Value::int(0)
        );
        assert_eq!(
            fold_bitwise(INT, BitwiseOp::Or, &unknown, &Value::int(0)),
            Value::Unknown(ValueType::Int)
        );
    }

    #[test]
    fn test_undefined_propagates() {
        assert_eq!(
            fold_binary(INT, BinaryOp::Add, &Value::Undefined, &Value::int(1)),
            Value::Undefined
        );
        assert_eq!(fold_negate(INT, &Value::Undefined), Value::Undefined);
    }

    #[test]
    fn test_nan_compare() {
        let nan = Value::Const(ConstValue::Float(f32::NAN));
        let one = Value::Const(ConstValue::Float(1.0));
        assert_eq!(fold_compare(CompareOp::Fcmpl, &nan, &one), Value::int(-1));
        assert_eq!(fold_compare(CompareOp::Fcmpg, &nan, &one), Value::int(1));
        assert_eq!(fold_compare(CompareOp::Fcmpg, &one, &one), Value::int(0));
    }

    #[test]
    fn test_lcmp() {
        let a = Value::Const(ConstValue::Long(5));
        let b = Value::Const(ConstValue::Long(9));
        assert_eq!(fold_compare(CompareOp::Lcmp, &a, &b), Value::int(-1));
        assert_eq!(fold_compare(CompareOp::Lcmp, &b, &a), Value::int(1));
    }

    #[test]
    fn test_convert_sign_extends() {
        assert_eq!(
            fold_convert(PrimitiveType::Byte, &Value::int(200)),
            Value::int(-56)
        );
        assert_eq!(
            fold_convert(PrimitiveType::Long, &Value::int(-1)),
            Value::Const(ConstValue::Long(-1))
        );
    }

    #[test]
    fn test_branch_on_integers() {
        assert_eq!(
            compare_branch(CompareKind::Gt, &Value::int(0), &Value::int(1)),
            Some(false)
        );
        assert_eq!(
            compare_branch(CompareKind::Le, &Value::int(0), &Value::int(1)),
            Some(true)
        );
        assert_eq!(
            compare_branch(
                CompareKind::Eq,
                &Value::Unknown(ValueType::Int),
                &Value::int(1)
            ),
            None
        );
    }

    #[test]
    fn test_branch_on_reference_identity() {
        let a = Value::Ref(ObjectRef(1));
        let b = Value::Ref(ObjectRef(2));
        let null = Value::Const(ConstValue::Null);
        assert_eq!(compare_branch(CompareKind::Eq, &a, &a), Some(true));
        assert_eq!(compare_branch(CompareKind::Eq, &a, &b), Some(false));
        assert_eq!(compare_branch(CompareKind::Ne, &a, &null), Some(true));
        assert_eq!(compare_branch(CompareKind::Eq, &null, &null), Some(true));
        assert_eq!(
            compare_branch(CompareKind::Eq, &a, &Value::Unknown(ValueType::Reference)),
            None
        );
    }
}

//! Abstract values for compile-time evaluation.
//!
//! A [`Value`] is what the evaluator knows about an output port. It is one of:
//!
//! - `Undefined` - the optimistic "not reached yet" element, the identity of [`Value::meet`]
//! - `Unknown(ty)` - any value of kind `ty`
//! - `Const(c)` - a known scalar or string literal, see [`ConstValue`]
//! - `Ref(r)` - a known heap object allocated during the evaluation, see
//!   [`crate::analysis::heap`]
//! - `Env(heap)` - a known environment: the heap of every object allocated so far
//!
//! Arrays and objects live in the [`Heap`] carried by the environment, keyed by
//! [`ObjectRef`]. A reference therefore compares by identity, not structure, and an array
//! holding itself is just an element equal to its own `Ref`.

use std::{
    fmt,
    hash::{Hash, Hasher},
    rc::Rc,
};

use strum::Display;

use crate::{
    analysis::heap::{Heap, ObjectRef},
    metadata::PrimitiveType,
    Error, Result,
};

/// The kind tag of an unknown value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ValueType {
    /// 32-bit integer, also used for boolean, byte, char and short
    Int,
    /// 64-bit integer
    Long,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// Object, array or null
    Reference,
    /// The side-effect environment
    Environment,
}

impl From<PrimitiveType> for ValueType {
    fn from(kind: PrimitiveType) -> Self {
        match kind.stack_kind() {
            PrimitiveType::Long => ValueType::Long,
            PrimitiveType::Float => ValueType::Float,
            PrimitiveType::Double => ValueType::Double,
            PrimitiveType::Reference => ValueType::Reference,
            _ => ValueType::Int,
        }
    }
}

/// A compile-time constant.
///
/// Floats compare and hash by bit pattern, so `NaN == NaN` holds here and folding the same
/// expression twice always yields equal constants.
#[derive(Debug, Clone)]
pub enum ConstValue {
    /// `int`, `boolean`, `byte`, `char`, `short`
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// The null reference
    Null,
    /// An interned string literal
    String(Rc<str>),
}

impl PartialEq for ConstValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::Null, Self::Null) => true,
            (Self::String(a), Self::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ConstValue {}

impl Hash for ConstValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Int(v) => v.hash(state),
            Self::Long(v) => v.hash(state),
            Self::Float(v) => v.to_bits().hash(state),
            Self::Double(v) => v.to_bits().hash(state),
            Self::Null => {}
            Self::String(s) => s.hash(state),
        }
    }
}

impl ConstValue {
    /// Kind of this constant.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Int(_) => ValueType::Int,
            Self::Long(_) => ValueType::Long,
            Self::Float(_) => ValueType::Float,
            Self::Double(_) => ValueType::Double,
            Self::Null | Self::String(_) => ValueType::Reference,
        }
    }

    /// Returns the integer if this is an `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns `true` for the integer and long zero.
    #[must_use]
    pub fn is_integer_zero(&self) -> bool {
        matches!(self, Self::Int(0) | Self::Long(0))
    }

    /// The default value of a field or array element of `kind`.
    #[must_use]
    pub fn default_for(kind: PrimitiveType) -> Self {
        match kind.stack_kind() {
            PrimitiveType::Long => Self::Long(0),
            PrimitiveType::Float => Self::Float(0.0),
            PrimitiveType::Double => Self::Double(0.0),
            PrimitiveType::Reference => Self::Null,
            _ => Self::Int(0),
        }
    }

    /// Wrapping addition.
    #[must_use]
    pub fn add(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(Self::Int(a.wrapping_add(*b))),
            (Self::Long(a), Self::Long(b)) => Some(Self::Long(a.wrapping_add(*b))),
            (Self::Float(a), Self::Float(b)) => Some(Self::Float(a + b)),
            (Self::Double(a), Self::Double(b)) => Some(Self::Double(a + b)),
            _ => None,
        }
    }

    /// Wrapping subtraction.
    #[must_use]
    pub fn sub(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(Self::Int(a.wrapping_sub(*b))),
            (Self::Long(a), Self::Long(b)) => Some(Self::Long(a.wrapping_sub(*b))),
            (Self::Float(a), Self::Float(b)) => Some(Self::Float(a - b)),
            (Self::Double(a), Self::Double(b)) => Some(Self::Double(a - b)),
            _ => None,
        }
    }

    /// Wrapping multiplication.
    #[must_use]
    pub fn mul(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(Self::Int(a.wrapping_mul(*b))),
            (Self::Long(a), Self::Long(b)) => Some(Self::Long(a.wrapping_mul(*b))),
            (Self::Float(a), Self::Float(b)) => Some(Self::Float(a * b)),
            (Self::Double(a), Self::Double(b)) => Some(Self::Double(a * b)),
            _ => None,
        }
    }

    /// Wrapping division. Integer division by zero does not fold.
    #[must_use]
    pub fn div(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Int(_) | Self::Long(_), _) if other.is_integer_zero() => None,
            (Self::Int(a), Self::Int(b)) => Some(Self::Int(a.wrapping_div(*b))),
            (Self::Long(a), Self::Long(b)) => Some(Self::Long(a.wrapping_div(*b))),
            (Self::Float(a), Self::Float(b)) => Some(Self::Float(a / b)),
            (Self::Double(a), Self::Double(b)) => Some(Self::Double(a / b)),
            _ => None,
        }
    }

    /// Wrapping remainder. Integer remainder by zero does not fold.
    #[must_use]
    pub fn rem(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Int(_) | Self::Long(_), _) if other.is_integer_zero() => None,
            (Self::Int(a), Self::Int(b)) => Some(Self::Int(a.wrapping_rem(*b))),
            (Self::Long(a), Self::Long(b)) => Some(Self::Long(a.wrapping_rem(*b))),
            (Self::Float(a), Self::Float(b)) => Some(Self::Float(a % b)),
            (Self::Double(a), Self::Double(b)) => Some(Self::Double(a % b)),
            _ => None,
        }
    }

    /// Arithmetic negation.
    #[must_use]
    pub fn negate(&self) -> Option<Self> {
        match self {
            Self::Int(v) => Some(Self::Int(v.wrapping_neg())),
            Self::Long(v) => Some(Self::Long(v.wrapping_neg())),
            Self::Float(v) => Some(Self::Float(-v)),
            Self::Double(v) => Some(Self::Double(-v)),
            _ => None,
        }
    }

    /// Left shift; the count is masked to 5 or 6 bits.
    #[must_use]
    pub fn shl(&self, count: &Self) -> Option<Self> {
        let count = count.as_int()?;
        match self {
            Self::Int(v) => Some(Self::Int(v.wrapping_shl(count as u32 & 0x1f))),
            Self::Long(v) => Some(Self::Long(v.wrapping_shl(count as u32 & 0x3f))),
            _ => None,
        }
    }

    /// Arithmetic right shift.
    #[must_use]
    pub fn shr(&self, count: &Self) -> Option<Self> {
        let count = count.as_int()?;
        match self {
            Self::Int(v) => Some(Self::Int(v.wrapping_shr(count as u32 & 0x1f))),
            Self::Long(v) => Some(Self::Long(v.wrapping_shr(count as u32 & 0x3f))),
            _ => None,
        }
    }

    /// Logical right shift.
    #[must_use]
    pub fn ushr(&self, count: &Self) -> Option<Self> {
        let count = count.as_int()?;
        match self {
            Self::Int(v) => Some(Self::Int(((*v as u32) >> (count as u32 & 0x1f)) as i32)),
            Self::Long(v) => Some(Self::Long(((*v as u64) >> (count as u32 & 0x3f)) as i64)),
            _ => None,
        }
    }

    /// Bitwise and.
    #[must_use]
    pub fn and(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(Self::Int(a & b)),
            (Self::Long(a), Self::Long(b)) => Some(Self::Long(a & b)),
            _ => None,
        }
    }

    /// Bitwise or.
    #[must_use]
    pub fn or(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(Self::Int(a | b)),
            (Self::Long(a), Self::Long(b)) => Some(Self::Long(a | b)),
            _ => None,
        }
    }

    /// Bitwise exclusive or.
    #[must_use]
    pub fn xor(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(Self::Int(a ^ b)),
            (Self::Long(a), Self::Long(b)) => Some(Self::Long(a ^ b)),
            _ => None,
        }
    }

    /// Primitive conversion to `to`.
    ///
    /// Narrowing to `Byte` and `Short` sign-extends the result back to `Int`, `Char`
    /// zero-extends. Float to integer conversions saturate and map NaN to zero.
    #[must_use]
    pub fn convert(&self, to: PrimitiveType) -> Option<Self> {
        let converted = match (self, to) {
            (Self::Int(v), PrimitiveType::Long) => Self::Long(i64::from(*v)),
            (Self::Int(v), PrimitiveType::Float) => Self::Float(*v as f32),
            (Self::Int(v), PrimitiveType::Double) => Self::Double(f64::from(*v)),
            (Self::Int(v), PrimitiveType::Byte) => Self::Int(i32::from(*v as i8)),
            (Self::Int(v), PrimitiveType::Char) => Self::Int(i32::from(*v as u16)),
            (Self::Int(v), PrimitiveType::Short) => Self::Int(i32::from(*v as i16)),
            (Self::Long(v), PrimitiveType::Int) => Self::Int(*v as i32),
            (Self::Long(v), PrimitiveType::Float) => Self::Float(*v as f32),
            (Self::Long(v), PrimitiveType::Double) => Self::Double(*v as f64),
            (Self::Float(v), PrimitiveType::Int) => Self::Int(*v as i32),
            (Self::Float(v), PrimitiveType::Long) => Self::Long(*v as i64),
            (Self::Float(v), PrimitiveType::Double) => Self::Double(f64::from(*v)),
            (Self::Double(v), PrimitiveType::Int) => Self::Int(*v as i32),
            (Self::Double(v), PrimitiveType::Long) => Self::Long(*v as i64),
            (Self::Double(v), PrimitiveType::Float) => Self::Float(*v as f32),
            _ => return None,
        };
        Some(converted)
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}L"),
            Self::Float(v) => write!(f, "{v}f"),
            Self::Double(v) => write!(f, "{v}d"),
            Self::Null => write!(f, "null"),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// What the evaluator knows about one output port.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Not reached yet. Identity of [`Value::meet`].
    Undefined,
    /// Any value of the given kind.
    Unknown(ValueType),
    /// A known constant.
    Const(ConstValue),
    /// A known object allocated during this evaluation.
    Ref(ObjectRef),
    /// A known environment.
    Env(Heap),
}

impl Value {
    /// The unknown environment.
    pub const UNKNOWN_ENV: Value = Value::Unknown(ValueType::Environment);

    /// Shorthand for `Value::Const(ConstValue::Int(v))`.
    #[must_use]
    pub fn int(v: i32) -> Self {
        Value::Const(ConstValue::Int(v))
    }

    /// Returns `true` if this is a scalar or string constant.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        matches!(self, Value::Const(_))
    }

    /// Returns `true` for [`Value::Undefined`].
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Returns the constant.
    ///
    /// # Errors
    /// Returns [`crate::Error::Invariant`] if the value is not constant.
    pub fn constant(&self) -> Result<&ConstValue> {
        match self {
            Value::Const(c) => Ok(c),
            other => Err(Error::Invariant(format!(
                "value {other} is not a constant"
            ))),
        }
    }

    /// Returns the integer if this is an `Int` constant.
    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Const(c) => c.as_int(),
            _ => None,
        }
    }

    /// Kind of this value; `None` for `Undefined`.
    #[must_use]
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Undefined => None,
            Value::Unknown(ty) => Some(*ty),
            Value::Const(c) => Some(c.value_type()),
            Value::Ref(_) => Some(ValueType::Reference),
            Value::Env(_) => Some(ValueType::Environment),
        }
    }

    /// Greatest lower bound of two values.
    ///
    /// `Undefined` is the identity, equal values are kept, anything else becomes unknown.
    #[must_use]
    pub fn meet(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Undefined, v) | (v, Value::Undefined) => v.clone(),
            (a, b) if a == b => a.clone(),
            (a, b) => Value::Unknown(
                a.value_type()
                    .or_else(|| b.value_type())
                    .unwrap_or(ValueType::Reference),
            ),
        }
    }

    /// The heap of a known environment.
    #[must_use]
    pub fn heap(&self) -> Option<&Heap> {
        match self {
            Value::Env(heap) => Some(heap),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Unknown(ty) => write!(f, "unknown {ty}"),
            Value::Const(c) => write!(f, "{c}"),
            Value::Ref(r) => write!(f, "{r}"),
            Value::Env(heap) => write!(f, "env({} objects)", heap.len()),
        }
    }
}

impl From<ConstValue> for Value {
    fn from(value: ConstValue) -> Self {
        Value::Const(value)
    }
}

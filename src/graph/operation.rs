//! The closed set of node operations.
//!
//! Every pass matches on [`Operation`] exhaustively, so adding a variant is a compile error
//! in each pass that has not decided how to treat it.
//!
//! Operations fall into five groups, reported by [`Operation::class`]:
//!
//! | Class        | Env in | Env out | Examples                                   |
//! |--------------|--------|---------|--------------------------------------------|
//! | `Entry`      | no     | yes     | `MethodEntry`, `BlockEntry`                |
//! | `Pure`       | no     | no      | `Constant`, `Binary`, `Convert`            |
//! | `Reader`     | yes    | no      | `LoadElement`, `LoadField`, `LoadLocal`    |
//! | `Effect`     | yes    | yes     | `StoreElement`, `Invoke`, `Push`, `Pop`    |
//! | `Terminator` | yes    | no      | `Jump`, `Branch`, `Switch`, `Return`       |

use std::{collections::BTreeMap, fmt, rc::Rc};

use strum::{AsRefStr, Display, EnumIter};

use crate::{
    analysis::ConstValue,
    graph::MethodId,
    metadata::{FieldRef, FieldType, MethodRef, PrimitiveType},
};

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
}

/// Shift operators. Shift counts are masked to the operand width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum ShiftOp {
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `>>>`
    Ushr,
}

/// Bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum BitwiseOp {
    /// `&`
    And,
    /// `|`
    Or,
    /// `^`
    Xor,
}

/// Three-way comparisons producing `-1`, `0` or `1`.
///
/// The `l` and `g` variants differ only in the result for NaN operands: `-1` and `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum CompareOp {
    /// `lcmp`
    Lcmp,
    /// `fcmpl`
    Fcmpl,
    /// `fcmpg`
    Fcmpg,
    /// `dcmpl`
    Dcmpl,
    /// `dcmpg`
    Dcmpg,
}

/// Conditions of a conditional jump, in opcode order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum CompareKind {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `>`
    Gt,
    /// `<=`
    Le,
}

impl CompareKind {
    /// Applies the condition to an ordering.
    #[must_use]
    pub fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match self {
            CompareKind::Eq => ordering == Equal,
            CompareKind::Ne => ordering != Equal,
            CompareKind::Lt => ordering == Less,
            CompareKind::Ge => ordering != Less,
            CompareKind::Gt => ordering == Greater,
            CompareKind::Le => ordering != Greater,
        }
    }
}

/// Invocation flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum InvokeKind {
    /// `invokevirtual`
    Virtual,
    /// `invokespecial`
    Special,
    /// `invokestatic`
    Static,
    /// `invokeinterface`
    Interface,
}

/// Successor selection of a multi-way jump.
///
/// `cases` maps match values to indices into the owning block's successor list; any value
/// not present selects `default`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JumpTable {
    /// Successor index taken when no case matches
    pub default: usize,
    /// Match value to successor index
    pub cases: BTreeMap<i32, usize>,
}

impl JumpTable {
    /// Successor index selected by `key`.
    #[must_use]
    pub fn target(&self, key: i32) -> usize {
        self.cases.get(&key).copied().unwrap_or(self.default)
    }
}

/// Coarse classification of an operation's environment behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum OperationClass {
    /// Block or method entry: manufactures outputs, has no inputs.
    Entry,
    /// No environment ports.
    Pure,
    /// Environment input only.
    Reader,
    /// Environment input and output.
    Effect,
    /// Ends a block.
    Terminator,
}

/// The operation a node performs.
#[derive(Debug, Clone, PartialEq, AsRefStr)]
pub enum Operation {
    /// Entry of a method's init block. `locals[slot]` is the kind of each argument slot;
    /// the second slot of a wide argument repeats its kind.
    MethodEntry {
        /// Kinds of the argument slots
        locals: Rc<[PrimitiveType]>,
    },
    /// Entry of an ordinary block.
    BlockEntry,

    /// A literal.
    Constant(ConstValue),
    /// Arithmetic on two operands of kind `ty`.
    Binary {
        /// Operand kind
        ty: PrimitiveType,
        /// Operator
        op: BinaryOp,
    },
    /// Arithmetic negation.
    Negate(PrimitiveType),
    /// Shift of an `Int` or `Long` by an `Int` count.
    Shift {
        /// Operand kind
        ty: PrimitiveType,
        /// Operator
        op: ShiftOp,
    },
    /// Bitwise logic on `Int` or `Long`.
    Bitwise {
        /// Operand kind
        ty: PrimitiveType,
        /// Operator
        op: BitwiseOp,
    },
    /// Primitive conversion.
    Convert {
        /// Source kind
        from: PrimitiveType,
        /// Target kind; `Byte`, `Char` and `Short` narrow an `Int`
        to: PrimitiveType,
    },
    /// Three-way comparison.
    Compare(CompareOp),
    /// `checkcast`: passes its operand through.
    CheckCast(String),
    /// `instanceof`
    InstanceOf(String),

    /// Array allocation with the given element type.
    NewArray(FieldType),
    /// `arraylength`
    ArrayLength,
    /// Array element read; the payload is the element kind.
    LoadElement(PrimitiveType),
    /// Array element write; the payload is the element kind.
    StoreElement(PrimitiveType),
    /// Object allocation.
    NewInstance(String),
    /// Field read.
    LoadField {
        /// The field
        field: Rc<FieldRef>,
        /// `getstatic` rather than `getfield`
        is_static: bool,
    },
    /// Field write.
    StoreField {
        /// The field
        field: Rc<FieldRef>,
        /// `putstatic` rather than `putfield`
        is_static: bool,
    },
    /// Method call. `target` is filled in once the callee is resolved.
    Invoke {
        /// Invocation flavour
        kind: InvokeKind,
        /// The referenced method
        method: Rc<MethodRef>,
        /// Resolved callee
        target: Option<MethodId>,
    },
    /// `monitorenter`
    MonitorEnter,
    /// `monitorexit`
    MonitorExit,

    /// Operand stack push marker.
    Push,
    /// Operand stack pop marker.
    Pop,
    /// Local variable store marker.
    StoreLocal(u32),
    /// Local variable load marker.
    LoadLocal(u32),

    /// Unconditional jump to successor 0.
    Jump,
    /// Compares `Arg(0)` with `Arg(1)`; successor 0 when the condition holds, else 1.
    Branch {
        /// Condition
        kind: CompareKind,
        /// Operand kind, `Int` or `Reference`
        operand: PrimitiveType,
    },
    /// Multi-way jump on `Arg(0)`.
    Switch(JumpTable),
    /// Return, with the value in `Arg(0)` unless `None`.
    Return(Option<PrimitiveType>),
    /// Abrupt completion throwing `Arg(0)`.
    Throw,
}

impl Operation {
    /// Environment behaviour of this operation.
    #[must_use]
    pub fn class(&self) -> OperationClass {
        match self {
            Operation::MethodEntry { .. } | Operation::BlockEntry => OperationClass::Entry,
            Operation::Constant(_)
            | Operation::Binary { .. }
            | Operation::Negate(_)
            | Operation::Shift { .. }
            | Operation::Bitwise { .. }
            | Operation::Convert { .. }
            | Operation::Compare(_)
            | Operation::CheckCast(_)
            | Operation::InstanceOf(_) => OperationClass::Pure,
            Operation::ArrayLength
            | Operation::LoadElement(_)
            | Operation::LoadField { .. }
            | Operation::LoadLocal(_) => OperationClass::Reader,
            Operation::NewArray(_)
            | Operation::StoreElement(_)
            | Operation::NewInstance(_)
            | Operation::StoreField { .. }
            | Operation::Invoke { .. }
            | Operation::MonitorEnter
            | Operation::MonitorExit
            | Operation::Push
            | Operation::Pop
            | Operation::StoreLocal(_) => OperationClass::Effect,
            Operation::Jump
            | Operation::Branch { .. }
            | Operation::Switch(_)
            | Operation::Return(_)
            | Operation::Throw => OperationClass::Terminator,
        }
    }

    /// Returns `true` for block and method entries.
    #[must_use]
    pub fn is_entry(&self) -> bool {
        self.class() == OperationClass::Entry
    }

    /// Returns `true` for block terminators.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        self.class() == OperationClass::Terminator
    }

    /// Returns `true` for terminators that transfer control to successor blocks and
    /// therefore carry live-out stack and local ports.
    #[must_use]
    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            Operation::Jump | Operation::Branch { .. } | Operation::Switch(_)
        )
    }

    /// Returns `true` for the stack and local bookkeeping markers.
    #[must_use]
    pub fn is_marker(&self) -> bool {
        matches!(
            self,
            Operation::Push | Operation::Pop | Operation::StoreLocal(_) | Operation::LoadLocal(_)
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::MethodEntry { .. } => write!(f, "method-entry"),
            Operation::BlockEntry => write!(f, "block-entry"),
            Operation::Constant(value) => write!(f, "const {value}"),
            Operation::Binary { ty, op } => write!(f, "{ty} {op}"),
            Operation::Negate(ty) => write!(f, "{ty} neg"),
            Operation::Shift { ty, op } => write!(f, "{ty} {op}"),
            Operation::Bitwise { ty, op } => write!(f, "{ty} {op}"),
            Operation::Convert { from, to } => write!(f, "{from} to {to}"),
            Operation::Compare(op) => write!(f, "{op}"),
            Operation::CheckCast(class) => write!(f, "checkcast {class}"),
            Operation::InstanceOf(class) => write!(f, "instanceof {class}"),
            Operation::NewArray(element) => write!(f, "new {element}[]"),
            Operation::ArrayLength => write!(f, "arraylength"),
            Operation::LoadElement(ty) => write!(f, "{ty}[] load"),
            Operation::StoreElement(ty) => write!(f, "{ty}[] store"),
            Operation::NewInstance(class) => write!(f, "new {class}"),
            Operation::LoadField { field, is_static } => {
                write!(f, "{} {field}", if *is_static { "getstatic" } else { "getfield" })
            }
            Operation::StoreField { field, is_static } => {
                write!(f, "{} {field}", if *is_static { "putstatic" } else { "putfield" })
            }
            Operation::Invoke { kind, method, .. } => write!(f, "invoke{kind} {method}"),
            Operation::MonitorEnter => write!(f, "monitorenter"),
            Operation::MonitorExit => write!(f, "monitorexit"),
            Operation::Push => write!(f, "push"),
            Operation::Pop => write!(f, "pop"),
            Operation::StoreLocal(slot) => write!(f, "store local {slot}"),
            Operation::LoadLocal(slot) => write!(f, "load local {slot}"),
            Operation::Jump => write!(f, "jump"),
            Operation::Branch { kind, operand } => write!(f, "if {operand} {kind}"),
            Operation::Switch(table) => write!(
                f,
                "switch ({} cases, default {})",
                table.cases.len(),
                table.default
            ),
            Operation::Return(Some(ty)) => write!(f, "return {ty}"),
            Operation::Return(None) => write!(f, "return"),
            Operation::Throw => write!(f, "throw"),
        }
    }
}

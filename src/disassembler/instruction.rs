//! Decoded instructions.

use std::fmt;

use crate::{
    analysis::ConstValue,
    disassembler::Opcode,
    graph::{BinaryOp, BitwiseOp, CompareKind, CompareOp, InvokeKind, ShiftOp},
    metadata::PrimitiveType,
};

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Continues with the next instruction.
    Sequential,
    /// Jumps to its target or continues with the next instruction.
    ConditionalBranch,
    /// Always jumps to its target.
    UnconditionalBranch,
    /// Jumps to one of several targets.
    Switch,
    /// Leaves the method normally.
    Return,
    /// Leaves the method abruptly.
    Throw,
}

impl FlowType {
    /// Returns `true` if the instruction ends a basic block.
    #[must_use]
    pub fn ends_block(self) -> bool {
        !matches!(self, FlowType::Sequential)
    }

    /// Returns `true` if execution may continue with the next instruction.
    #[must_use]
    pub fn falls_through(self) -> bool {
        matches!(self, FlowType::Sequential | FlowType::ConditionalBranch)
    }
}

/// The semantic content of one instruction, with operands decoded.
///
/// Branch targets are absolute byte offsets within the method's code. Constant pool operands
/// stay as indices; the builder resolves them.
#[derive(Debug, Clone, PartialEq)]
pub enum InstructionKind {
    /// `nop`
    Nop,
    /// `aconst_null`, `iconst_*`, `lconst_*`, `fconst_*`, `dconst_*`, `bipush`, `sipush`
    Constant(ConstValue),
    /// `ldc`, `ldc_w`, `ldc2_w`
    Ldc(u16),
    /// Local variable load of the given kind
    Load(PrimitiveType, u32),
    /// Local variable store of the given kind
    Store(PrimitiveType, u32),
    /// Array element load; the kind is the element kind
    ArrayLoad(PrimitiveType),
    /// Array element store; the kind is the element kind
    ArrayStore(PrimitiveType),
    /// `pop`
    Pop,
    /// `pop2`
    Pop2,
    /// `dup`
    Dup,
    /// `dup_x1`
    DupX1,
    /// `dup_x2`
    DupX2,
    /// `dup2`
    Dup2,
    /// `dup2_x1`
    Dup2X1,
    /// `dup2_x2`
    Dup2X2,
    /// `swap`
    Swap,
    /// Arithmetic
    Binary {
        /// Operand kind
        ty: PrimitiveType,
        /// Operator
        op: BinaryOp,
    },
    /// Negation
    Negate(PrimitiveType),
    /// Shift
    Shift {
        /// Operand kind
        ty: PrimitiveType,
        /// Operator
        op: ShiftOp,
    },
    /// Bitwise logic
    Bitwise {
        /// Operand kind
        ty: PrimitiveType,
        /// Operator
        op: BitwiseOp,
    },
    /// `iinc`
    Iinc {
        /// Local slot
        slot: u32,
        /// Signed increment
        delta: i32,
    },
    /// Primitive conversion
    Convert {
        /// Source kind
        from: PrimitiveType,
        /// Target kind
        to: PrimitiveType,
    },
    /// `lcmp`, `fcmp*`, `dcmp*`
    Compare(CompareOp),
    /// Conditional branch
    Branch {
        /// Condition
        kind: CompareKind,
        /// `Int` or `Reference`
        operand: PrimitiveType,
        /// Compares a single operand against zero or `null`
        unary: bool,
        /// Offset jumped to when the condition holds
        target: usize,
    },
    /// `goto`, `goto_w`
    Goto(usize),
    /// `tableswitch`
    TableSwitch {
        /// Offset for keys outside `low..low + targets.len()`
        default: usize,
        /// Key of `targets[0]`
        low: i32,
        /// Offsets for consecutive keys
        targets: Vec<usize>,
    },
    /// `lookupswitch`
    LookupSwitch {
        /// Offset for keys not listed
        default: usize,
        /// Key and offset pairs, sorted by key
        pairs: Vec<(i32, usize)>,
    },
    /// Return, with the value kind unless `void`
    Return(Option<PrimitiveType>),
    /// `getstatic`
    GetStatic(u16),
    /// `putstatic`
    PutStatic(u16),
    /// `getfield`
    GetField(u16),
    /// `putfield`
    PutField(u16),
    /// Invocation of the method reference at `index`
    Invoke {
        /// Invocation flavour
        kind: InvokeKind,
        /// Constant pool index
        index: u16,
    },
    /// `new`
    New(u16),
    /// `newarray` of a primitive element kind
    NewArray(PrimitiveType),
    /// `anewarray` of the class at the index
    ANewArray(u16),
    /// `arraylength`
    ArrayLength,
    /// `athrow`
    AThrow,
    /// `checkcast`
    CheckCast(u16),
    /// `instanceof`
    InstanceOf(u16),
    /// `monitorenter`
    MonitorEnter,
    /// `monitorexit`
    MonitorExit,
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Byte offset within the method's code
    pub offset: usize,
    /// Encoded size in bytes, including operands and switch padding
    pub size: usize,
    /// The opcode as read
    pub opcode: Opcode,
    /// Decoded operands and semantics
    pub kind: InstructionKind,
}

impl Instruction {
    /// Offset of the instruction that follows this one.
    #[must_use]
    pub fn next_offset(&self) -> usize {
        self.offset + self.size
    }

    /// The opcode mnemonic.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        self.opcode.into()
    }

    /// Control flow behaviour.
    #[must_use]
    pub fn flow(&self) -> FlowType {
        match self.kind {
            InstructionKind::Branch { .. } => FlowType::ConditionalBranch,
            InstructionKind::Goto(_) => FlowType::UnconditionalBranch,
            InstructionKind::TableSwitch { .. } | InstructionKind::LookupSwitch { .. } => {
                FlowType::Switch
            }
            InstructionKind::Return(_) => FlowType::Return,
            InstructionKind::AThrow => FlowType::Throw,
            _ => FlowType::Sequential,
        }
    }

    /// Every explicit jump target, without the fall-through offset.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<usize> {
        match &self.kind {
            InstructionKind::Branch { target, .. } | InstructionKind::Goto(target) => {
                vec![*target]
            }
            InstructionKind::TableSwitch {
                default, targets, ..
            } => std::iter::once(*default)
                .chain(targets.iter().copied())
                .collect(),
            InstructionKind::LookupSwitch { default, pairs } => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, target)| *target))
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>4}: {}", self.offset, self.opcode)?;
        match &self.kind {
            InstructionKind::Ldc(index)
            | InstructionKind::GetStatic(index)
            | InstructionKind::PutStatic(index)
            | InstructionKind::GetField(index)
            | InstructionKind::PutField(index)
            | InstructionKind::Invoke { index, .. }
            | InstructionKind::New(index)
            | InstructionKind::ANewArray(index)
            | InstructionKind::CheckCast(index)
            | InstructionKind::InstanceOf(index) => write!(f, " #{index}"),
            InstructionKind::Load(_, slot) | InstructionKind::Store(_, slot) if self.size > 1 => {
                write!(f, " {slot}")
            }
            InstructionKind::Constant(value)
                if matches!(self.opcode, Opcode::Bipush | Opcode::Sipush) =>
            {
                write!(f, " {value}")
            }
            InstructionKind::Iinc { slot, delta } => write!(f, " {slot} {delta}"),
            InstructionKind::Branch { target, .. } | InstructionKind::Goto(target) => {
                write!(f, " {target}")
            }
            InstructionKind::NewArray(element) => write!(f, " {element}"),
            InstructionKind::TableSwitch {
                default,
                low,
                targets,
            } => {
                write!(f, " {{")?;
                for (i, target) in targets.iter().enumerate() {
                    write!(f, " {}: {target}", i64::from(*low) + i as i64)?;
                }
                write!(f, " default: {default} }}")
            }
            InstructionKind::LookupSwitch { default, pairs } => {
                write!(f, " {{")?;
                for (key, target) in pairs {
                    write!(f, " {key}: {target}")?;
                }
                write!(f, " default: {default} }}")
            }
            _ => Ok(()),
        }
    }
}

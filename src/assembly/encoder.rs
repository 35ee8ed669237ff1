//! JVM bytecode encoding with label resolution.
//!
//! [`BytecodeAssembler`] is the reverse of [`crate::disassembler::decode_method`]: it emits
//! instructions through a fluent interface and resolves named labels when finished. It picks
//! the compact encoding where the JVM has one (`iconst_1`, `iload_0`, `ldc` vs `ldc_w`) and
//! lays out switch padding from the instruction's position.
//!
//! # Usage Examples
//!
//! ```rust
//! use portflow::assembly::BytecodeAssembler;
//!
//! // static int max(int a, int b) { return a >= b ? a : b; }
//! let mut asm = BytecodeAssembler::new();
//! asm.iload(0)?
//!     .iload(1)?
//!     .if_icmplt("second")?
//!     .iload(0)?
//!     .ireturn()?
//!     .label("second")?
//!     .iload(1)?
//!     .ireturn()?;
//! let code = asm.finish()?;
//! assert_eq!(code[2], 0xa1);
//! # Ok::<(), portflow::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    disassembler::Opcode,
    graph::{BinaryOp, BitwiseOp, CompareKind, CompareOp, ShiftOp},
    metadata::PrimitiveType,
    Error, Result,
};

/// A branch offset waiting for its label.
#[derive(Debug, Clone)]
struct LabelFixup {
    /// The target label name
    label: String,
    /// Position of the opcode the offset is relative to
    origin: usize,
    /// Position of the offset bytes
    position: usize,
    /// Size of the offset field, 2 or 4 bytes
    width: u8,
}

/// Fluent JVM bytecode encoder.
///
/// Every emitting method returns `Result<&mut Self>` so instruction sequences chain with
/// `?`. Branch targets are label names; offsets are patched in [`BytecodeAssembler::finish`].
#[derive(Debug, Default)]
pub struct BytecodeAssembler {
    bytecode: Vec<u8>,
    labels: HashMap<String, usize>,
    fixups: Vec<LabelFixup>,
}

impl BytecodeAssembler {
    /// Creates an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current write position, which is the offset of the next instruction.
    #[must_use]
    pub fn position(&self) -> usize {
        self.bytecode.len()
    }

    /// Binds `name` to the current position.
    ///
    /// # Errors
    /// Returns [`crate::Error::DuplicateLabel`] if `name` is already bound.
    pub fn label(&mut self, name: &str) -> Result<&mut Self> {
        if self.labels.contains_key(name) {
            return Err(Error::DuplicateLabel(name.to_string()));
        }
        self.labels.insert(name.to_string(), self.bytecode.len());
        Ok(self)
    }

    /// Emits an opcode without operands.
    ///
    /// This is the escape hatch for instructions without a dedicated method, including
    /// ones the decoder rejects.
    ///
    /// # Errors
    /// Never fails; the `Result` keeps the method chainable with the others.
    pub fn emit(&mut self, opcode: Opcode) -> Result<&mut Self> {
        self.bytecode.push(opcode.byte());
        Ok(self)
    }

    fn emit_u8(&mut self, opcode: Opcode, operand: u8) -> Result<&mut Self> {
        self.bytecode.extend_from_slice(&[opcode.byte(), operand]);
        Ok(self)
    }

    fn emit_u16(&mut self, opcode: Opcode, operand: u16) -> Result<&mut Self> {
        self.bytecode.push(opcode.byte());
        self.bytecode.extend_from_slice(&operand.to_be_bytes());
        Ok(self)
    }

    fn emit_branch(&mut self, opcode: Opcode, label: &str, width: u8) -> Result<&mut Self> {
        let origin = self.bytecode.len();
        self.bytecode.push(opcode.byte());
        self.fixups.push(LabelFixup {
            label: label.to_string(),
            origin,
            position: self.bytecode.len(),
            width,
        });
        self.bytecode
            .resize(self.bytecode.len() + usize::from(width), 0);
        Ok(self)
    }

    fn pad_switch(&mut self) {
        while self.bytecode.len() % 4 != 0 {
            self.bytecode.push(0);
        }
    }

    fn switch_target(&mut self, origin: usize, label: &str) {
        self.fixups.push(LabelFixup {
            label: label.to_string(),
            origin,
            position: self.bytecode.len(),
            width: 4,
        });
        self.bytecode.extend_from_slice(&[0; 4]);
    }

    // ---- constants ----

    /// `nop`
    ///
    /// # Errors
    /// Never fails.
    pub fn nop(&mut self) -> Result<&mut Self> {
        self.emit(Opcode::Nop)
    }

    /// `aconst_null`
    ///
    /// # Errors
    /// Never fails.
    pub fn aconst_null(&mut self) -> Result<&mut Self> {
        self.emit(Opcode::AconstNull)
    }

    /// Pushes an `int` with `iconst_*`, `bipush` or `sipush`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for values outside the `short` range, which
    /// need an `ldc` of a pool constant.
    pub fn iconst(&mut self, value: i32) -> Result<&mut Self> {
        match value {
            -1..=5 => {
                let Some(opcode) = u8::try_from(value + 3).ok().and_then(Opcode::from_repr) else {
                    return Err(Error::NotSupported(format!("iconst {value}")));
                };
                self.emit(opcode)
            }
            _ => {
                if let Ok(byte) = i8::try_from(value) {
                    self.emit_u8(Opcode::Bipush, byte.to_be_bytes()[0])
                } else if let Ok(short) = i16::try_from(value) {
                    self.bytecode.push(Opcode::Sipush.byte());
                    self.bytecode.extend_from_slice(&short.to_be_bytes());
                    Ok(self)
                } else {
                    Err(Error::NotSupported(format!(
                        "int constant {value} needs a constant pool entry"
                    )))
                }
            }
        }
    }

    /// `lconst_0` or `lconst_1`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for any other value.
    pub fn lconst(&mut self, value: i64) -> Result<&mut Self> {
        match value {
            0 => self.emit(Opcode::Lconst0),
            1 => self.emit(Opcode::Lconst1),
            _ => Err(Error::NotSupported(format!(
                "long constant {value} needs a constant pool entry"
            ))),
        }
    }

    /// `dconst_0` or `dconst_1`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for any other value.
    pub fn dconst(&mut self, value: f64) -> Result<&mut Self> {
        if value.to_bits() == 0.0f64.to_bits() {
            self.emit(Opcode::Dconst0)
        } else if value.to_bits() == 1.0f64.to_bits() {
            self.emit(Opcode::Dconst1)
        } else {
            Err(Error::NotSupported(format!(
                "double constant {value} needs a constant pool entry"
            )))
        }
    }

    /// Loads a single-slot pool constant with `ldc` or `ldc_w`.
    ///
    /// # Errors
    /// Never fails.
    pub fn ldc(&mut self, index: u16) -> Result<&mut Self> {
        match u8::try_from(index) {
            Ok(short) => self.emit_u8(Opcode::Ldc, short),
            Err(_) => self.emit_u16(Opcode::LdcW, index),
        }
    }

    /// Loads a `long` or `double` pool constant.
    ///
    /// # Errors
    /// Never fails.
    pub fn ldc2_w(&mut self, index: u16) -> Result<&mut Self> {
        self.emit_u16(Opcode::Ldc2W, index)
    }

    // ---- locals ----

    /// Loads local `slot` of the given kind, using the `_n` form for slots 0 to 3.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for sub-int kinds and slots above 255, which
    /// would need `wide`.
    pub fn load(&mut self, kind: PrimitiveType, slot: u32) -> Result<&mut Self> {
        let (short, base) = match kind {
            PrimitiveType::Int => (Opcode::Iload, Opcode::Iload0),
            PrimitiveType::Long => (Opcode::Lload, Opcode::Lload0),
            PrimitiveType::Float => (Opcode::Fload, Opcode::Fload0),
            PrimitiveType::Double => (Opcode::Dload, Opcode::Dload0),
            PrimitiveType::Reference => (Opcode::Aload, Opcode::Aload0),
            other => return Err(Error::NotSupported(format!("load of {other}"))),
        };
        self.local(short, base, slot)
    }

    /// Stores to local `slot` with the given kind, using the `_n` form for slots 0 to 3.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for sub-int kinds and slots above 255.
    pub fn store(&mut self, kind: PrimitiveType, slot: u32) -> Result<&mut Self> {
        let (short, base) = match kind {
            PrimitiveType::Int => (Opcode::Istore, Opcode::Istore0),
            PrimitiveType::Long => (Opcode::Lstore, Opcode::Lstore0),
            PrimitiveType::Float => (Opcode::Fstore, Opcode::Fstore0),
            PrimitiveType::Double => (Opcode::Dstore, Opcode::Dstore0),
            PrimitiveType::Reference => (Opcode::Astore, Opcode::Astore0),
            other => return Err(Error::NotSupported(format!("store of {other}"))),
        };
        self.local(short, base, slot)
    }

    fn local(&mut self, explicit: Opcode, base: Opcode, slot: u32) -> Result<&mut Self> {
        let Ok(index) = u8::try_from(slot) else {
            return Err(Error::NotSupported(format!("local slot {slot} needs wide")));
        };
        if index <= 3 {
            match Opcode::from_repr(base.byte() + index) {
                Some(opcode) => self.emit(opcode),
                None => Err(Error::NotSupported(format!("{base} for slot {slot}"))),
            }
        } else {
            self.emit_u8(explicit, index)
        }
    }

    /// `iload`
    ///
    /// # Errors
    /// See [`BytecodeAssembler::load`].
    pub fn iload(&mut self, slot: u32) -> Result<&mut Self> {
        self.load(PrimitiveType::Int, slot)
    }

    /// `aload`
    ///
    /// # Errors
    /// See [`BytecodeAssembler::load`].
    pub fn aload(&mut self, slot: u32) -> Result<&mut Self> {
        self.load(PrimitiveType::Reference, slot)
    }

    /// `istore`
    ///
    /// # Errors
    /// See [`BytecodeAssembler::store`].
    pub fn istore(&mut self, slot: u32) -> Result<&mut Self> {
        self.store(PrimitiveType::Int, slot)
    }

    /// `astore`
    ///
    /// # Errors
    /// See [`BytecodeAssembler::store`].
    pub fn astore(&mut self, slot: u32) -> Result<&mut Self> {
        self.store(PrimitiveType::Reference, slot)
    }

    /// `iinc slot delta`
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the slot or delta needs `wide`.
    pub fn iinc(&mut self, slot: u32, delta: i32) -> Result<&mut Self> {
        let (Ok(index), Ok(delta)) = (u8::try_from(slot), i8::try_from(delta)) else {
            return Err(Error::NotSupported(format!("iinc {slot} {delta} needs wide")));
        };
        self.bytecode
            .extend_from_slice(&[Opcode::Iinc.byte(), index, delta.to_be_bytes()[0]]);
        Ok(self)
    }

    // ---- arrays ----

    /// Array element load for the given element kind.
    ///
    /// # Errors
    /// Never fails.
    pub fn array_load(&mut self, element: PrimitiveType) -> Result<&mut Self> {
        self.emit(match element {
            PrimitiveType::Int => Opcode::Iaload,
            PrimitiveType::Long => Opcode::Laload,
            PrimitiveType::Float => Opcode::Faload,
            PrimitiveType::Double => Opcode::Daload,
            PrimitiveType::Reference => Opcode::Aaload,
            PrimitiveType::Boolean | PrimitiveType::Byte => Opcode::Baload,
            PrimitiveType::Char => Opcode::Caload,
            PrimitiveType::Short => Opcode::Saload,
        })
    }

    /// Array element store for the given element kind.
    ///
    /// # Errors
    /// Never fails.
    pub fn array_store(&mut self, element: PrimitiveType) -> Result<&mut Self> {
        self.emit(match element {
            PrimitiveType::Int => Opcode::Iastore,
            PrimitiveType::Long => Opcode::Lastore,
            PrimitiveType::Float => Opcode::Fastore,
            PrimitiveType::Double => Opcode::Dastore,
            PrimitiveType::Reference => Opcode::Aastore,
            PrimitiveType::Boolean | PrimitiveType::Byte => Opcode::Bastore,
            PrimitiveType::Char => Opcode::Castore,
            PrimitiveType::Short => Opcode::Sastore,
        })
    }

    /// `iaload`
    ///
    /// # Errors
    /// Never fails.
    pub fn iaload(&mut self) -> Result<&mut Self> {
        self.array_load(PrimitiveType::Int)
    }

    /// `iastore`
    ///
    /// # Errors
    /// Never fails.
    pub fn iastore(&mut self) -> Result<&mut Self> {
        self.array_store(PrimitiveType::Int)
    }

    /// `aaload`
    ///
    /// # Errors
    /// Never fails.
    pub fn aaload(&mut self) -> Result<&mut Self> {
        self.array_load(PrimitiveType::Reference)
    }

    /// `aastore`
    ///
    /// # Errors
    /// Never fails.
    pub fn aastore(&mut self) -> Result<&mut Self> {
        self.array_store(PrimitiveType::Reference)
    }

    /// `newarray` of a primitive element kind.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for `Reference`; use
    /// [`BytecodeAssembler::anewarray`].
    pub fn newarray(&mut self, element: PrimitiveType) -> Result<&mut Self> {
        match element.array_type_code() {
            Some(code) => self.emit_u8(Opcode::Newarray, code),
            None => Err(Error::NotSupported(
                "newarray of references, use anewarray".to_string(),
            )),
        }
    }

    /// `anewarray` of the class at pool `index`.
    ///
    /// # Errors
    /// Never fails.
    pub fn anewarray(&mut self, index: u16) -> Result<&mut Self> {
        self.emit_u16(Opcode::Anewarray, index)
    }

    /// `arraylength`
    ///
    /// # Errors
    /// Never fails.
    pub fn arraylength(&mut self) -> Result<&mut Self> {
        self.emit(Opcode::Arraylength)
    }

    // ---- stack ----

    /// `pop`
    ///
    /// # Errors
    /// Never fails.
    pub fn pop(&mut self) -> Result<&mut Self> {
        self.emit(Opcode::Pop)
    }

    /// `dup`
    ///
    /// # Errors
    /// Never fails.
    pub fn dup(&mut self) -> Result<&mut Self> {
        self.emit(Opcode::Dup)
    }

    /// `dup_x1`
    ///
    /// # Errors
    /// Never fails.
    pub fn dup_x1(&mut self) -> Result<&mut Self> {
        self.emit(Opcode::DupX1)
    }

    /// `swap`
    ///
    /// # Errors
    /// Never fails.
    pub fn swap(&mut self) -> Result<&mut Self> {
        self.emit(Opcode::Swap)
    }

    // ---- arithmetic ----

    /// Arithmetic on the given kind.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for sub-int and reference kinds.
    pub fn binary(&mut self, ty: PrimitiveType, op: BinaryOp) -> Result<&mut Self> {
        let row = match op {
            BinaryOp::Add => Opcode::Iadd,
            BinaryOp::Sub => Opcode::Isub,
            BinaryOp::Mul => Opcode::Imul,
            BinaryOp::Div => Opcode::Idiv,
            BinaryOp::Rem => Opcode::Irem,
        };
        self.typed(row, ty)
    }

    /// Arithmetic negation of the given kind.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for sub-int and reference kinds.
    pub fn negate(&mut self, ty: PrimitiveType) -> Result<&mut Self> {
        self.typed(Opcode::Ineg, ty)
    }

    /// Opcodes for `Int`, `Long`, `Float` and `Double` are consecutive from `int_form`.
    fn typed(&mut self, int_form: Opcode, ty: PrimitiveType) -> Result<&mut Self> {
        let step = match ty {
            PrimitiveType::Int => 0,
            PrimitiveType::Long => 1,
            PrimitiveType::Float => 2,
            PrimitiveType::Double => 3,
            other => return Err(Error::NotSupported(format!("{int_form} on {other}"))),
        };
        match Opcode::from_repr(int_form.byte() + step) {
            Some(opcode) => self.emit(opcode),
            None => Err(Error::NotSupported(format!("{int_form} on {ty}"))),
        }
    }

    /// Shift of an `Int` or `Long`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for other kinds.
    pub fn shift(&mut self, ty: PrimitiveType, op: ShiftOp) -> Result<&mut Self> {
        let opcode = match (ty, op) {
            (PrimitiveType::Int, ShiftOp::Shl) => Opcode::Ishl,
            (PrimitiveType::Long, ShiftOp::Shl) => Opcode::Lshl,
            (PrimitiveType::Int, ShiftOp::Shr) => Opcode::Ishr,
            (PrimitiveType::Long, ShiftOp::Shr) => Opcode::Lshr,
            (PrimitiveType::Int, ShiftOp::Ushr) => Opcode::Iushr,
            (PrimitiveType::Long, ShiftOp::Ushr) => Opcode::Lushr,
            _ => return Err(Error::NotSupported(format!("{op} on {ty}"))),
        };
        self.emit(opcode)
    }

    /// Bitwise logic on an `Int` or `Long`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for other kinds.
    pub fn bitwise(&mut self, ty: PrimitiveType, op: BitwiseOp) -> Result<&mut Self> {
        let opcode = match (ty, op) {
            (PrimitiveType::Int, BitwiseOp::And) => Opcode::Iand,
            (PrimitiveType::Long, BitwiseOp::And) => Opcode::Land,
            (PrimitiveType::Int, BitwiseOp::Or) => Opcode::Ior,
            (PrimitiveType::Long, BitwiseOp::Or) => Opcode::Lor,
            (PrimitiveType::Int, BitwiseOp::Xor) => Opcode::Ixor,
            (PrimitiveType::Long, BitwiseOp::Xor) => Opcode::Lxor,
            _ => return Err(Error::NotSupported(format!("{op} on {ty}"))),
        };
        self.emit(opcode)
    }

    /// Primitive conversion.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for pairs without a JVM instruction.
    pub fn convert(&mut self, from: PrimitiveType, to: PrimitiveType) -> Result<&mut Self> {
        use PrimitiveType::{Byte, Char, Double, Float, Int, Long, Short};
        let opcode = match (from, to) {
            (Int, Long) => Opcode::I2l,
            (Int, Float) => Opcode::I2f,
            (Int, Double) => Opcode::I2d,
            (Long, Int) => Opcode::L2i,
            (Long, Float) => Opcode::L2f,
            (Long, Double) => Opcode::L2d,
            (Float, Int) => Opcode::F2i,
            (Float, Long) => Opcode::F2l,
            (Float, Double) => Opcode::F2d,
            (Double, Int) => Opcode::D2i,
            (Double, Long) => Opcode::D2l,
            (Double, Float) => Opcode::D2f,
            (Int, Byte) => Opcode::I2b,
            (Int, Char) => Opcode::I2c,
            (Int, Short) => Opcode::I2s,
            _ => return Err(Error::NotSupported(format!("conversion {from} to {to}"))),
        };
        self.emit(opcode)
    }

    /// Three-way comparison.
    ///
    /// # Errors
    /// Never fails.
    pub fn compare(&mut self, op: CompareOp) -> Result<&mut Self> {
        self.emit(match op {
            CompareOp::Lcmp => Opcode::Lcmp,
            CompareOp::Fcmpl => Opcode::Fcmpl,
            CompareOp::Fcmpg => Opcode::Fcmpg,
            CompareOp::Dcmpl => Opcode::Dcmpl,
            CompareOp::Dcmpg => Opcode::Dcmpg,
        })
    }

    /// `iadd`
    ///
    /// # Errors
    /// Never fails.
    pub fn iadd(&mut self) -> Result<&mut Self> {
        self.emit(Opcode::Iadd)
    }

    /// `isub`
    ///
    /// # Errors
    /// Never fails.
    pub fn isub(&mut self) -> Result<&mut Self> {
        self.emit(Opcode::Isub)
    }

    /// `imul`
    ///
    /// # Errors
    /// Never fails.
    pub fn imul(&mut self) -> Result<&mut Self> {
        self.emit(Opcode::Imul)
    }

    /// `idiv`
    ///
    /// # Errors
    /// Never fails.
    pub fn idiv(&mut self) -> Result<&mut Self> {
        self.emit(Opcode::Idiv)
    }

    // ---- control flow ----

    /// Conditional branch comparing an `int` against zero (`ifeq` .. `ifle`).
    ///
    /// # Errors
    /// Never fails; the label is resolved in [`BytecodeAssembler::finish`].
    pub fn if_zero(&mut self, kind: CompareKind, label: &str) -> Result<&mut Self> {
        self.emit_branch(condition(Opcode::Ifeq, kind), label, 2)
    }

    /// Conditional branch comparing two `int`s (`if_icmpeq` .. `if_icmple`).
    ///
    /// # Errors
    /// Never fails; the label is resolved in [`BytecodeAssembler::finish`].
    pub fn if_icmp(&mut self, kind: CompareKind, label: &str) -> Result<&mut Self> {
        self.emit_branch(condition(Opcode::IfIcmpeq, kind), label, 2)
    }

    /// Conditional branch comparing two references for identity.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidBranch`] for conditions other than `Eq` and `Ne`.
    pub fn if_acmp(&mut self, kind: CompareKind, label: &str) -> Result<&mut Self> {
        match kind {
            CompareKind::Eq => self.emit_branch(Opcode::IfAcmpeq, label, 2),
            CompareKind::Ne => self.emit_branch(Opcode::IfAcmpne, label, 2),
            other => Err(Error::InvalidBranch(format!(
                "references cannot be compared with {other}"
            ))),
        }
    }

    /// `ifeq`
    ///
    /// # Errors
    /// Never fails.
    pub fn ifeq(&mut self, label: &str) -> Result<&mut Self> {
        self.if_zero(CompareKind::Eq, label)
    }

    /// `ifne`
    ///
    /// # Errors
    /// Never fails.
    pub fn ifne(&mut self, label: &str) -> Result<&mut Self> {
        self.if_zero(CompareKind::Ne, label)
    }

    /// `if_icmplt`
    ///
    /// # Errors
    /// Never fails.
    pub fn if_icmplt(&mut self, label: &str) -> Result<&mut Self> {
        self.if_icmp(CompareKind::Lt, label)
    }

    /// `if_icmpge`
    ///
    /// # Errors
    /// Never fails.
    pub fn if_icmpge(&mut self, label: &str) -> Result<&mut Self> {
        self.if_icmp(CompareKind::Ge, label)
    }

    /// `ifnull`
    ///
    /// # Errors
    /// Never fails.
    pub fn ifnull(&mut self, label: &str) -> Result<&mut Self> {
        self.emit_branch(Opcode::Ifnull, label, 2)
    }

    /// `ifnonnull`
    ///
    /// # Errors
    /// Never fails.
    pub fn ifnonnull(&mut self, label: &str) -> Result<&mut Self> {
        self.emit_branch(Opcode::Ifnonnull, label, 2)
    }

    /// `goto`
    ///
    /// # Errors
    /// Never fails; the label is resolved in [`BytecodeAssembler::finish`].
    pub fn goto(&mut self, label: &str) -> Result<&mut Self> {
        self.emit_branch(Opcode::Goto, label, 2)
    }

    /// `goto_w`
    ///
    /// # Errors
    /// Never fails; the label is resolved in [`BytecodeAssembler::finish`].
    pub fn goto_w(&mut self, label: &str) -> Result<&mut Self> {
        self.emit_branch(Opcode::GotoW, label, 4)
    }

    /// `tableswitch` for the consecutive keys `low..low + labels.len()`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidBranch`] if `labels` is empty or the key range
    /// overflows an `int`.
    pub fn tableswitch(&mut self, low: i32, labels: &[&str], default: &str) -> Result<&mut Self> {
        let high = i32::try_from(labels.len())
            .ok()
            .and_then(|count| low.checked_add(count - 1))
            .filter(|_| !labels.is_empty());
        let Some(high) = high else {
            return Err(Error::InvalidBranch(format!(
                "tableswitch from {low} with {} targets",
                labels.len()
            )));
        };

        let origin = self.bytecode.len();
        self.bytecode.push(Opcode::Tableswitch.byte());
        self.pad_switch();
        self.switch_target(origin, default);
        self.bytecode.extend_from_slice(&low.to_be_bytes());
        self.bytecode.extend_from_slice(&high.to_be_bytes());
        for label in labels {
            self.switch_target(origin, label);
        }
        Ok(self)
    }

    /// `lookupswitch` over explicit keys; pairs are sorted by key before encoding.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidBranch`] for duplicate keys.
    pub fn lookupswitch(&mut self, pairs: &[(i32, &str)], default: &str) -> Result<&mut Self> {
        let mut sorted = pairs.to_vec();
        sorted.sort_by_key(|(key, _)| *key);
        if sorted.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(Error::InvalidBranch(
                "lookupswitch with duplicate keys".to_string(),
            ));
        }
        let Ok(count) = i32::try_from(sorted.len()) else {
            return Err(Error::InvalidBranch("too many lookupswitch pairs".to_string()));
        };

        let origin = self.bytecode.len();
        self.bytecode.push(Opcode::Lookupswitch.byte());
        self.pad_switch();
        self.switch_target(origin, default);
        self.bytecode.extend_from_slice(&count.to_be_bytes());
        for (key, label) in sorted {
            self.bytecode.extend_from_slice(&key.to_be_bytes());
            self.switch_target(origin, label);
        }
        Ok(self)
    }

    /// `ireturn`
    ///
    /// # Errors
    /// Never fails.
    pub fn ireturn(&mut self) -> Result<&mut Self> {
        self.emit(Opcode::Ireturn)
    }

    /// `areturn`
    ///
    /// # Errors
    /// Never fails.
    pub fn areturn(&mut self) -> Result<&mut Self> {
        self.emit(Opcode::Areturn)
    }

    /// `return` from a `void` method.
    ///
    /// # Errors
    /// Never fails.
    pub fn vreturn(&mut self) -> Result<&mut Self> {
        self.emit(Opcode::Return)
    }

    /// `athrow`
    ///
    /// # Errors
    /// Never fails.
    pub fn athrow(&mut self) -> Result<&mut Self> {
        self.emit(Opcode::Athrow)
    }

    // ---- objects and calls ----

    /// `getstatic`
    ///
    /// # Errors
    /// Never fails.
    pub fn getstatic(&mut self, index: u16) -> Result<&mut Self> {
        self.emit_u16(Opcode::Getstatic, index)
    }

    /// `putstatic`
    ///
    /// # Errors
    /// Never fails.
    pub fn putstatic(&mut self, index: u16) -> Result<&mut Self> {
        self.emit_u16(Opcode::Putstatic, index)
    }

    /// `getfield`
    ///
    /// # Errors
    /// Never fails.
    pub fn getfield(&mut self, index: u16) -> Result<&mut Self> {
        self.emit_u16(Opcode::Getfield, index)
    }

    /// `putfield`
    ///
    /// # Errors
    /// Never fails.
    pub fn putfield(&mut self, index: u16) -> Result<&mut Self> {
        self.emit_u16(Opcode::Putfield, index)
    }

    /// `invokevirtual`
    ///
    /// # Errors
    /// Never fails.
    pub fn invokevirtual(&mut self, index: u16) -> Result<&mut Self> {
        self.emit_u16(Opcode::Invokevirtual, index)
    }

    /// `invokespecial`
    ///
    /// # Errors
    /// Never fails.
    pub fn invokespecial(&mut self, index: u16) -> Result<&mut Self> {
        self.emit_u16(Opcode::Invokespecial, index)
    }

    /// `invokestatic`
    ///
    /// # Errors
    /// Never fails.
    pub fn invokestatic(&mut self, index: u16) -> Result<&mut Self> {
        self.emit_u16(Opcode::Invokestatic, index)
    }

    /// `invokeinterface` with the argument slot `count` including the receiver.
    ///
    /// # Errors
    /// Never fails.
    pub fn invokeinterface(&mut self, index: u16, count: u8) -> Result<&mut Self> {
        self.emit_u16(Opcode::Invokeinterface, index)?;
        self.bytecode.extend_from_slice(&[count, 0]);
        Ok(self)
    }

    /// `new`
    ///
    /// # Errors
    /// Never fails.
    pub fn new_instance(&mut self, index: u16) -> Result<&mut Self> {
        self.emit_u16(Opcode::New, index)
    }

    /// `checkcast`
    ///
    /// # Errors
    /// Never fails.
    pub fn checkcast(&mut self, index: u16) -> Result<&mut Self> {
        self.emit_u16(Opcode::Checkcast, index)
    }

    /// `instanceof`
    ///
    /// # Errors
    /// Never fails.
    pub fn instanceof(&mut self, index: u16) -> Result<&mut Self> {
        self.emit_u16(Opcode::Instanceof, index)
    }

    /// Resolves every label reference and returns the code.
    ///
    /// # Errors
    /// Returns [`crate::Error::UndefinedLabel`] for a reference to an unbound label and
    /// [`crate::Error::InvalidBranch`] for an offset that does not fit a 2-byte field.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        let fixups = std::mem::take(&mut self.fixups);
        for fixup in &fixups {
            let target = self
                .labels
                .get(&fixup.label)
                .ok_or_else(|| Error::UndefinedLabel(fixup.label.clone()))?;

            let (Ok(target), Ok(origin)) = (i64::try_from(*target), i64::try_from(fixup.origin))
            else {
                return Err(Error::InvalidBranch(format!(
                    "branch to {} is out of range",
                    fixup.label
                )));
            };
            let offset = target - origin;
            let range = fixup.position..fixup.position + usize::from(fixup.width);
            if fixup.width == 2 {
                let Ok(offset) = i16::try_from(offset) else {
                    return Err(Error::InvalidBranch(format!(
                        "offset {offset} to {} does not fit a short branch",
                        fixup.label
                    )));
                };
                self.bytecode[range].copy_from_slice(&offset.to_be_bytes());
            } else {
                let Ok(offset) = i32::try_from(offset) else {
                    return Err(Error::InvalidBranch(format!(
                        "offset {offset} to {} is out of range",
                        fixup.label
                    )));
                };
                self.bytecode[range].copy_from_slice(&offset.to_be_bytes());
            }
        }
        Ok(self.bytecode)
    }
}

/// Conditional opcodes follow the order of [`CompareKind`] from the `eq` form.
fn condition(eq_form: Opcode, kind: CompareKind) -> Opcode {
    let step = match kind {
        CompareKind::Eq => 0,
        CompareKind::Ne => 1,
        CompareKind::Lt => 2,
        CompareKind::Ge => 3,
        CompareKind::Gt => 4,
        CompareKind::Le => 5,
    };
    Opcode::from_repr(eq_form.byte() + step).unwrap_or(eq_form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disassembler::{decode_method, InstructionKind};

    #[test]
    fn test_compact_encodings() -> crate::Result<()> {
        let mut asm = BytecodeAssembler::new();
        asm.iconst(-1)?
            .iconst(5)?
            .iconst(-100)?
            .iconst(1000)?
            .iload(2)?
            .iload(9)?
            .ldc(3)?
            .ldc(300)?
            .vreturn()?;
        let code = asm.finish()?;
        assert_eq!(
            code,
            vec![
                0x02, 0x08, 0x10, 0x9c, 0x11, 0x03, 0xe8, 0x1c, 0x15, 0x09, 0x12, 0x03, 0x13,
                0x01, 0x2c, 0xb1
            ]
        );
        Ok(())
    }

    #[test]
    fn test_labels_round_trip_through_decoder() -> crate::Result<()> {
        let mut asm = BytecodeAssembler::new();
        asm.label("top")?
            .iload(0)?
            .ifeq("done")?
            .iinc(0, -1)?
            .goto("top")?
            .label("done")?
            .iconst(0)?
            .ireturn()?;
        let instructions = decode_method(&asm.finish()?)?;
        assert_eq!(
            instructions[1].kind,
            InstructionKind::Branch {
                kind: CompareKind::Eq,
                operand: PrimitiveType::Int,
                unary: true,
                target: 10
            }
        );
        assert_eq!(instructions[3].kind, InstructionKind::Goto(0));
        Ok(())
    }

    #[test]
    fn test_switches_round_trip_through_decoder() -> crate::Result<()> {
        let mut asm = BytecodeAssembler::new();
        asm.iload(0)?
            .tableswitch(1, &["one", "two"], "other")?
            .label("one")?
            .iconst(10)?
            .ireturn()?
            .label("two")?
            .iload(0)?
            .lookupswitch(&[(7, "other"), (3, "one")], "other")?
            .label("other")?
            .iconst(0)?
            .ireturn()?;
        let instructions = decode_method(&asm.finish()?)?;

        let InstructionKind::TableSwitch { low, targets, .. } = &instructions[1].kind else {
            panic!("expected tableswitch, found {:?}", instructions[1].kind);
        };
        assert_eq!(*low, 1);
        assert_eq!(targets[0], instructions[2].offset);
        assert_eq!(targets[1], instructions[4].offset);

        let InstructionKind::LookupSwitch { pairs, default } = &instructions[5].kind else {
            panic!("expected lookupswitch, found {:?}", instructions[5].kind);
        };
        assert_eq!(pairs[0], (3, instructions[2].offset));
        assert_eq!(*default, instructions[6].offset);
        Ok(())
    }

    #[test]
    fn test_label_errors() {
        let mut asm = BytecodeAssembler::new();
        assert!(asm.label("a").is_ok());
        assert!(matches!(asm.label("a"), Err(Error::DuplicateLabel(_))));

        let mut asm = BytecodeAssembler::new();
        assert!(asm.goto("nowhere").is_ok());
        assert!(matches!(asm.finish(), Err(Error::UndefinedLabel(_))));

        let mut asm = BytecodeAssembler::new();
        assert!(matches!(
            asm.tableswitch(0, &[], "x"),
            Err(Error::InvalidBranch(_))
        ));
    }

    #[test]
    fn test_typed_rows() -> crate::Result<()> {
        let mut asm = BytecodeAssembler::new();
        asm.binary(PrimitiveType::Double, BinaryOp::Rem)?
            .negate(PrimitiveType::Long)?
            .if_icmp(CompareKind::Le, "end")?
            .label("end")?;
        assert_eq!(asm.finish()?, vec![0x73, 0x75, 0xa4, 0x00, 0x03]);
        Ok(())
    }
}

//! JVM bytecode decoding.
//!
//! This module turns a method's raw code into a list of [`Instruction`]s with resolved
//! branch offsets. Only the instruction subset the graph builder understands is accepted;
//! subroutines (`jsr`, `ret`), `wide`, `multianewarray`, `invokedynamic` and the reserved
//! opcodes are rejected as format errors naming the offending offset.
//!
//! # Example: Decoding a Single Instruction
//!
//! ```rust
//! use portflow::disassembler::{decode_instruction, InstructionKind, Parser};
//!
//! let code = [0x10, 0xfe]; // bipush -2
//! let mut parser = Parser::new(&code);
//! let instruction = decode_instruction(&mut parser)?;
//! assert_eq!(instruction.mnemonic(), "bipush");
//! assert_eq!(instruction.size, 2);
//! # Ok::<(), portflow::Error>(())
//! ```
//!
//! # Example: Decoding a Method
//!
//! ```rust
//! use portflow::disassembler::decode_method;
//!
//! let code = [0x03, 0xac]; // iconst_0, ireturn
//! let instructions = decode_method(&code)?;
//! assert_eq!(instructions.len(), 2);
//! assert_eq!(instructions[1].offset, 1);
//! # Ok::<(), portflow::Error>(())
//! ```

use std::collections::BTreeSet;

use crate::{
    analysis::ConstValue,
    disassembler::{Instruction, InstructionKind, Opcode, Parser},
    graph::{BinaryOp, BitwiseOp, CompareKind, CompareOp, InvokeKind, ShiftOp},
    metadata::PrimitiveType,
    Error, Result,
};

/// Decodes every instruction of a method body and validates its control flow.
///
/// # Arguments
///
/// * `code` - The raw bytecode of one method
///
/// # Errors
///
/// Returns [`crate::Error::Format`] if:
/// - the code is empty or an instruction is truncated
/// - an opcode is unknown or outside the supported subset
/// - a branch target is not the start of an instruction
/// - the last instruction can fall through past the end of the code
pub fn decode_method(code: &[u8]) -> Result<Vec<Instruction>> {
    if code.is_empty() {
        return Err(format_error!(0, code, "method has no code"));
    }

    let mut parser = Parser::new(code);
    let mut instructions = Vec::new();
    while parser.has_more_data() {
        instructions.push(decode_instruction(&mut parser)?);
    }

    let boundaries: BTreeSet<usize> = instructions.iter().map(|i| i.offset).collect();
    for instruction in &instructions {
        for target in instruction.branch_targets() {
            if !boundaries.contains(&target) {
                return Err(format_error!(
                    instruction.offset,
                    &code[instruction.offset..instruction.next_offset()],
                    "{} targets offset {} which is not an instruction boundary",
                    instruction.mnemonic(),
                    target
                ));
            }
        }
    }

    if let Some(last) = instructions.last() {
        if last.flow().falls_through() {
            return Err(format_error!(
                last.offset,
                &code[last.offset..last.next_offset()],
                "execution falls off the end of the code after {}",
                last.mnemonic()
            ));
        }
    }

    Ok(instructions)
}

/// Decodes the instruction at the parser's position and advances past it.
///
/// Branch targets are converted to absolute offsets, measured from the start of the
/// parser's data.
///
/// # Errors
///
/// Returns [`crate::Error::Format`] for unknown or unsupported opcodes, truncated operands,
/// negative branch targets, nonzero switch padding and `tableswitch` with `low > high`.
pub fn decode_instruction(parser: &mut Parser) -> Result<Instruction> {
    let offset = parser.pos();
    match decode_at(parser, offset) {
        Ok(instruction) => Ok(instruction),
        Err(Error::OutOfBounds) => {
            let data = parser.data();
            Err(format_error!(
                offset,
                &data[offset.min(data.len())..],
                "instruction is truncated"
            ))
        }
        Err(e) => Err(e),
    }
}

fn decode_at(parser: &mut Parser, offset: usize) -> Result<Instruction> {
    let byte = parser.read_be::<u8>()?;
    let Some(opcode) = Opcode::from_repr(byte) else {
        return Err(format_error!(
            offset,
            [byte],
            "unknown opcode 0x{:02x}",
            byte
        ));
    };

    let kind = match opcode {
        Opcode::Nop => InstructionKind::Nop,
        Opcode::AconstNull => InstructionKind::Constant(ConstValue::Null),
        Opcode::IconstM1
        | Opcode::Iconst0
        | Opcode::Iconst1
        | Opcode::Iconst2
        | Opcode::Iconst3
        | Opcode::Iconst4
        | Opcode::Iconst5 => InstructionKind::Constant(ConstValue::Int(
            i32::from(byte) - i32::from(Opcode::Iconst0.byte()),
        )),
        Opcode::Lconst0 => InstructionKind::Constant(ConstValue::Long(0)),
        Opcode::Lconst1 => InstructionKind::Constant(ConstValue::Long(1)),
        Opcode::Fconst0 => InstructionKind::Constant(ConstValue::Float(0.0)),
        Opcode::Fconst1 => InstructionKind::Constant(ConstValue::Float(1.0)),
        Opcode::Fconst2 => InstructionKind::Constant(ConstValue::Float(2.0)),
        Opcode::Dconst0 => InstructionKind::Constant(ConstValue::Double(0.0)),
        Opcode::Dconst1 => InstructionKind::Constant(ConstValue::Double(1.0)),
        Opcode::Bipush => {
            InstructionKind::Constant(ConstValue::Int(i32::from(parser.read_be::<i8>()?)))
        }
        Opcode::Sipush => {
            InstructionKind::Constant(ConstValue::Int(i32::from(parser.read_be::<i16>()?)))
        }
        Opcode::Ldc => InstructionKind::Ldc(u16::from(parser.read_be::<u8>()?)),
        Opcode::LdcW | Opcode::Ldc2W => InstructionKind::Ldc(parser.read_be::<u16>()?),

        Opcode::Iload => InstructionKind::Load(PrimitiveType::Int, local(parser)?),
        Opcode::Lload => InstructionKind::Load(PrimitiveType::Long, local(parser)?),
        Opcode::Fload => InstructionKind::Load(PrimitiveType::Float, local(parser)?),
        Opcode::Dload => InstructionKind::Load(PrimitiveType::Double, local(parser)?),
        Opcode::Aload => InstructionKind::Load(PrimitiveType::Reference, local(parser)?),
        Opcode::Iload0 | Opcode::Iload1 | Opcode::Iload2 | Opcode::Iload3 => {
            InstructionKind::Load(PrimitiveType::Int, implicit_slot(byte, Opcode::Iload0))
        }
        Opcode::Lload0 | Opcode::Lload1 | Opcode::Lload2 | Opcode::Lload3 => {
            InstructionKind::Load(PrimitiveType::Long, implicit_slot(byte, Opcode::Lload0))
        }
        Opcode::Fload0 | Opcode::Fload1 | Opcode::Fload2 | Opcode::Fload3 => {
            InstructionKind::Load(PrimitiveType::Float, implicit_slot(byte, Opcode::Fload0))
        }
        Opcode::Dload0 | Opcode::Dload1 | Opcode::Dload2 | Opcode::Dload3 => {
            InstructionKind::Load(PrimitiveType::Double, implicit_slot(byte, Opcode::Dload0))
        }
        Opcode::Aload0 | Opcode::Aload1 | Opcode::Aload2 | Opcode::Aload3 => {
            InstructionKind::Load(PrimitiveType::Reference, implicit_slot(byte, Opcode::Aload0))
        }
        Opcode::Istore => InstructionKind::Store(PrimitiveType::Int, local(parser)?),
        Opcode::Lstore => InstructionKind::Store(PrimitiveType::Long, local(parser)?),
        Opcode::Fstore => InstructionKind::Store(PrimitiveType::Float, local(parser)?),
        Opcode::Dstore => InstructionKind::Store(PrimitiveType::Double, local(parser)?),
        Opcode::Astore => InstructionKind::Store(PrimitiveType::Reference, local(parser)?),
        Opcode::Istore0 | Opcode::Istore1 | Opcode::Istore2 | Opcode::Istore3 => {
            InstructionKind::Store(PrimitiveType::Int, implicit_slot(byte, Opcode::Istore0))
        }
        Opcode::Lstore0 | Opcode::Lstore1 | Opcode::Lstore2 | Opcode::Lstore3 => {
            InstructionKind::Store(PrimitiveType::Long, implicit_slot(byte, Opcode::Lstore0))
        }
        Opcode::Fstore0 | Opcode::Fstore1 | Opcode::Fstore2 | Opcode::Fstore3 => {
            InstructionKind::Store(PrimitiveType::Float, implicit_slot(byte, Opcode::Fstore0))
        }
        Opcode::Dstore0 | Opcode::Dstore1 | Opcode::Dstore2 | Opcode::Dstore3 => {
            InstructionKind::Store(PrimitiveType::Double, implicit_slot(byte, Opcode::Dstore0))
        }
        Opcode::Astore0 | Opcode::Astore1 | Opcode::Astore2 | Opcode::Astore3 => {
            InstructionKind::Store(PrimitiveType::Reference, implicit_slot(byte, Opcode::Astore0))
        }

        Opcode::Iaload => InstructionKind::ArrayLoad(PrimitiveType::Int),
        Opcode::Laload => InstructionKind::ArrayLoad(PrimitiveType::Long),
        Opcode::Faload => InstructionKind::ArrayLoad(PrimitiveType::Float),
        Opcode::Daload => InstructionKind::ArrayLoad(PrimitiveType::Double),
        Opcode::Aaload => InstructionKind::ArrayLoad(PrimitiveType::Reference),
        Opcode::Baload => InstructionKind::ArrayLoad(PrimitiveType::Byte),
        Opcode::Caload => InstructionKind::ArrayLoad(PrimitiveType::Char),
        Opcode::Saload => InstructionKind::ArrayLoad(PrimitiveType::Short),
        Opcode::Iastore => InstructionKind::ArrayStore(PrimitiveType::Int),
        Opcode::Lastore => InstructionKind::ArrayStore(PrimitiveType::Long),
        Opcode::Fastore => InstructionKind::ArrayStore(PrimitiveType::Float),
        Opcode::Dastore => InstructionKind::ArrayStore(PrimitiveType::Double),
        Opcode::Aastore => InstructionKind::ArrayStore(PrimitiveType::Reference),
        Opcode::Bastore => InstructionKind::ArrayStore(PrimitiveType::Byte),
        Opcode::Castore => InstructionKind::ArrayStore(PrimitiveType::Char),
        Opcode::Sastore => InstructionKind::ArrayStore(PrimitiveType::Short),

        Opcode::Pop => InstructionKind::Pop,
        Opcode::Pop2 => InstructionKind::Pop2,
        Opcode::Dup => InstructionKind::Dup,
        Opcode::DupX1 => InstructionKind::DupX1,
        Opcode::DupX2 => InstructionKind::DupX2,
        Opcode::Dup2 => InstructionKind::Dup2,
        Opcode::Dup2X1 => InstructionKind::Dup2X1,
        Opcode::Dup2X2 => InstructionKind::Dup2X2,
        Opcode::Swap => InstructionKind::Swap,

        Opcode::Iadd => binary(PrimitiveType::Int, BinaryOp::Add),
        Opcode::Ladd => binary(PrimitiveType::Long, BinaryOp::Add),
        Opcode::Fadd => binary(PrimitiveType::Float, BinaryOp::Add),
        Opcode::Dadd => binary(PrimitiveType::Double, BinaryOp::Add),
        Opcode::Isub => binary(PrimitiveType::Int, BinaryOp::Sub),
        Opcode::Lsub => binary(PrimitiveType::Long, BinaryOp::Sub),
        Opcode::Fsub => binary(PrimitiveType::Float, BinaryOp::Sub),
        Opcode::Dsub => binary(PrimitiveType::Double, BinaryOp::Sub),
        Opcode::Imul => binary(PrimitiveType::Int, BinaryOp::Mul),
        Opcode::Lmul => binary(PrimitiveType::Long, BinaryOp::Mul),
        Opcode::Fmul => binary(PrimitiveType::Float, BinaryOp::Mul),
        Opcode::Dmul => binary(PrimitiveType::Double, BinaryOp::Mul),
        Opcode::Idiv => binary(PrimitiveType::Int, BinaryOp::Div),
        Opcode::Ldiv => binary(PrimitiveType::Long, BinaryOp::Div),
        Opcode::Fdiv => binary(PrimitiveType::Float, BinaryOp::Div),
        Opcode::Ddiv => binary(PrimitiveType::Double, BinaryOp::Div),
        Opcode::Irem => binary(PrimitiveType::Int, BinaryOp::Rem),
        Opcode::Lrem => binary(PrimitiveType::Long, BinaryOp::Rem),
        Opcode::Frem => binary(PrimitiveType::Float, BinaryOp::Rem),
        Opcode::Drem => binary(PrimitiveType::Double, BinaryOp::Rem),
        Opcode::Ineg => InstructionKind::Negate(PrimitiveType::Int),
        Opcode::Lneg => InstructionKind::Negate(PrimitiveType::Long),
        Opcode::Fneg => InstructionKind::Negate(PrimitiveType::Float),
        Opcode::Dneg => InstructionKind::Negate(PrimitiveType::Double),
        Opcode::Ishl => shift(PrimitiveType::Int, ShiftOp::Shl),
        Opcode::Lshl => shift(PrimitiveType::Long, ShiftOp::Shl),
        Opcode::Ishr => shift(PrimitiveType::Int, ShiftOp::Shr),
        Opcode::Lshr => shift(PrimitiveType::Long, ShiftOp::Shr),
        Opcode::Iushr => shift(PrimitiveType::Int, ShiftOp::Ushr),
        Opcode::Lushr => shift(PrimitiveType::Long, ShiftOp::Ushr),
        Opcode::Iand => bitwise(PrimitiveType::Int, BitwiseOp::And),
        Opcode::Land => bitwise(PrimitiveType::Long, BitwiseOp::And),
        Opcode::Ior => bitwise(PrimitiveType::Int, BitwiseOp::Or),
        Opcode::Lor => bitwise(PrimitiveType::Long, BitwiseOp::Or),
        Opcode::Ixor => bitwise(PrimitiveType::Int, BitwiseOp::Xor),
        Opcode::Lxor => bitwise(PrimitiveType::Long, BitwiseOp::Xor),
        Opcode::Iinc => InstructionKind::Iinc {
            slot: local(parser)?,
            delta: i32::from(parser.read_be::<i8>()?),
        },

        Opcode::I2l => convert(PrimitiveType::Int, PrimitiveType::Long),
        Opcode::I2f => convert(PrimitiveType::Int, PrimitiveType::Float),
        Opcode::I2d => convert(PrimitiveType::Int, PrimitiveType::Double),
        Opcode::L2i => convert(PrimitiveType::Long, PrimitiveType::Int),
        Opcode::L2f => convert(PrimitiveType::Long, PrimitiveType::Float),
        Opcode::L2d => convert(PrimitiveType::Long, PrimitiveType::Double),
        Opcode::F2i => convert(PrimitiveType::Float, PrimitiveType::Int),
        Opcode::F2l => convert(PrimitiveType::Float, PrimitiveType::Long),
        Opcode::F2d => convert(PrimitiveType::Float, PrimitiveType::Double),
        Opcode::D2i => convert(PrimitiveType::Double, PrimitiveType::Int),
        Opcode::D2l => convert(PrimitiveType::Double, PrimitiveType::Long),
        Opcode::D2f => convert(PrimitiveType::Double, PrimitiveType::Float),
        Opcode::I2b => convert(PrimitiveType::Int, PrimitiveType::Byte),
        Opcode::I2c => convert(PrimitiveType::Int, PrimitiveType::Char),
        Opcode::I2s => convert(PrimitiveType::Int, PrimitiveType::Short),

        Opcode::Lcmp => InstructionKind::Compare(CompareOp::Lcmp),
        Opcode::Fcmpl => InstructionKind::Compare(CompareOp::Fcmpl),
        Opcode::Fcmpg => InstructionKind::Compare(CompareOp::Fcmpg),
        Opcode::Dcmpl => InstructionKind::Compare(CompareOp::Dcmpl),
        Opcode::Dcmpg => InstructionKind::Compare(CompareOp::Dcmpg),

        Opcode::Ifeq => branch(parser, offset, CompareKind::Eq, PrimitiveType::Int, true)?,
        Opcode::Ifne => branch(parser, offset, CompareKind::Ne, PrimitiveType::Int, true)?,
        Opcode::Iflt => branch(parser, offset, CompareKind::Lt, PrimitiveType::Int, true)?,
        Opcode::Ifge => branch(parser, offset, CompareKind::Ge, PrimitiveType::Int, true)?,
        Opcode::Ifgt => branch(parser, offset, CompareKind::Gt, PrimitiveType::Int, true)?,
        Opcode::Ifle => branch(parser, offset, CompareKind::Le, PrimitiveType::Int, true)?,
        Opcode::IfIcmpeq => branch(parser, offset, CompareKind::Eq, PrimitiveType::Int, false)?,
        Opcode::IfIcmpne => branch(parser, offset, CompareKind::Ne, PrimitiveType::Int, false)?,
        Opcode::IfIcmplt => branch(parser, offset, CompareKind::Lt, PrimitiveType::Int, false)?,
        Opcode::IfIcmpge => branch(parser, offset, CompareKind::Ge, PrimitiveType::Int, false)?,
        Opcode::IfIcmpgt => branch(parser, offset, CompareKind::Gt, PrimitiveType::Int, false)?,
        Opcode::IfIcmple => branch(parser, offset, CompareKind::Le, PrimitiveType::Int, false)?,
        Opcode::IfAcmpeq => {
            branch(parser, offset, CompareKind::Eq, PrimitiveType::Reference, false)?
        }
        Opcode::IfAcmpne => {
            branch(parser, offset, CompareKind::Ne, PrimitiveType::Reference, false)?
        }
        Opcode::Ifnull => branch(parser, offset, CompareKind::Eq, PrimitiveType::Reference, true)?,
        Opcode::Ifnonnull => {
            branch(parser, offset, CompareKind::Ne, PrimitiveType::Reference, true)?
        }
        Opcode::Goto => {
            let delta = i32::from(parser.read_be::<i16>()?);
            InstructionKind::Goto(relative(parser, offset, delta)?)
        }
        Opcode::GotoW => {
            let delta = parser.read_be::<i32>()?;
            InstructionKind::Goto(relative(parser, offset, delta)?)
        }
        Opcode::Tableswitch => table_switch(parser, offset)?,
        Opcode::Lookupswitch => lookup_switch(parser, offset)?,

        Opcode::Ireturn => InstructionKind::Return(Some(PrimitiveType::Int)),
        Opcode::Lreturn => InstructionKind::Return(Some(PrimitiveType::Long)),
        Opcode::Freturn => InstructionKind::Return(Some(PrimitiveType::Float)),
        Opcode::Dreturn => InstructionKind::Return(Some(PrimitiveType::Double)),
        Opcode::Areturn => InstructionKind::Return(Some(PrimitiveType::Reference)),
        Opcode::Return => InstructionKind::Return(None),

        Opcode::Getstatic => InstructionKind::GetStatic(parser.read_be::<u16>()?),
        Opcode::Putstatic => InstructionKind::PutStatic(parser.read_be::<u16>()?),
        Opcode::Getfield => InstructionKind::GetField(parser.read_be::<u16>()?),
        Opcode::Putfield => InstructionKind::PutField(parser.read_be::<u16>()?),
        Opcode::Invokevirtual => invoke(parser, InvokeKind::Virtual)?,
        Opcode::Invokespecial => invoke(parser, InvokeKind::Special)?,
        Opcode::Invokestatic => invoke(parser, InvokeKind::Static)?,
        Opcode::Invokeinterface => {
            let index = parser.read_be::<u16>()?;
            let _count = parser.read_be::<u8>()?;
            let zero = parser.read_be::<u8>()?;
            if zero != 0 {
                return Err(format_error!(
                    offset,
                    &parser.data()[offset..parser.pos()],
                    "invokeinterface has nonzero trailing byte"
                ));
            }
            InstructionKind::Invoke {
                kind: InvokeKind::Interface,
                index,
            }
        }
        Opcode::New => InstructionKind::New(parser.read_be::<u16>()?),
        Opcode::Newarray => {
            let code = parser.read_be::<u8>()?;
            let Some(element) = PrimitiveType::from_array_type_code(code) else {
                return Err(format_error!(
                    offset,
                    &parser.data()[offset..parser.pos()],
                    "newarray with invalid element type {}",
                    code
                ));
            };
            InstructionKind::NewArray(element)
        }
        Opcode::Anewarray => InstructionKind::ANewArray(parser.read_be::<u16>()?),
        Opcode::Arraylength => InstructionKind::ArrayLength,
        Opcode::Athrow => InstructionKind::AThrow,
        Opcode::Checkcast => InstructionKind::CheckCast(parser.read_be::<u16>()?),
        Opcode::Instanceof => InstructionKind::InstanceOf(parser.read_be::<u16>()?),
        Opcode::Monitorenter => InstructionKind::MonitorEnter,
        Opcode::Monitorexit => InstructionKind::MonitorExit,

        Opcode::Jsr
        | Opcode::Ret
        | Opcode::JsrW
        | Opcode::Wide
        | Opcode::Multianewarray
        | Opcode::Invokedynamic
        | Opcode::Breakpoint
        | Opcode::Impdep1
        | Opcode::Impdep2 => {
            return Err(format_error!(
                offset,
                [byte],
                "unsupported opcode {}",
                opcode
            ))
        }
    };

    Ok(Instruction {
        offset,
        size: parser.pos() - offset,
        opcode,
        kind,
    })
}

fn local(parser: &mut Parser) -> Result<u32> {
    Ok(u32::from(parser.read_be::<u8>()?))
}

fn implicit_slot(byte: u8, base: Opcode) -> u32 {
    u32::from(byte - base.byte())
}

fn binary(ty: PrimitiveType, op: BinaryOp) -> InstructionKind {
    InstructionKind::Binary { ty, op }
}

fn shift(ty: PrimitiveType, op: ShiftOp) -> InstructionKind {
    InstructionKind::Shift { ty, op }
}

fn bitwise(ty: PrimitiveType, op: BitwiseOp) -> InstructionKind {
    InstructionKind::Bitwise { ty, op }
}

fn convert(from: PrimitiveType, to: PrimitiveType) -> InstructionKind {
    InstructionKind::Convert { from, to }
}

fn invoke(parser: &mut Parser, kind: InvokeKind) -> Result<InstructionKind> {
    Ok(InstructionKind::Invoke {
        kind,
        index: parser.read_be::<u16>()?,
    })
}

/// Resolves a branch offset relative to the opcode at `offset`.
fn relative(parser: &Parser, offset: usize, delta: i32) -> Result<usize> {
    let target = i64::try_from(offset).unwrap_or(i64::MAX) + i64::from(delta);
    usize::try_from(target).map_err(|_| {
        format_error!(
            offset,
            &parser.data()[offset..parser.pos()],
            "branch target {} is before the start of the code",
            target
        )
    })
}

fn branch(
    parser: &mut Parser,
    offset: usize,
    kind: CompareKind,
    operand: PrimitiveType,
    unary: bool,
) -> Result<InstructionKind> {
    let delta = i32::from(parser.read_be::<i16>()?);
    Ok(InstructionKind::Branch {
        kind,
        operand,
        unary,
        target: relative(parser, offset, delta)?,
    })
}

fn switch_padding(parser: &mut Parser, offset: usize) -> Result<()> {
    let padding = parser.align(4)?;
    if padding.iter().any(|b| *b != 0) {
        return Err(format_error!(
            offset,
            &parser.data()[offset..parser.pos()],
            "switch padding is not zero"
        ));
    }
    Ok(())
}

fn table_switch(parser: &mut Parser, offset: usize) -> Result<InstructionKind> {
    switch_padding(parser, offset)?;
    let default = parser.read_be::<i32>()?;
    let low = parser.read_be::<i32>()?;
    let high = parser.read_be::<i32>()?;
    if low > high {
        return Err(format_error!(
            offset,
            &parser.data()[offset..parser.pos()],
            "tableswitch low {} is greater than high {}",
            low,
            high
        ));
    }

    let count = i64::from(high) - i64::from(low) + 1;
    let remaining = (parser.len() - parser.pos()) / 4;
    if usize::try_from(count).map_or(true, |count| count > remaining) {
        return Err(Error::OutOfBounds);
    }

    let mut targets = Vec::new();
    for _ in 0..count {
        let delta = parser.read_be::<i32>()?;
        targets.push(relative(parser, offset, delta)?);
    }
    Ok(InstructionKind::TableSwitch {
        default: relative(parser, offset, default)?,
        low,
        targets,
    })
}

fn lookup_switch(parser: &mut Parser, offset: usize) -> Result<InstructionKind> {
    switch_padding(parser, offset)?;
    let default = parser.read_be::<i32>()?;
    let count = parser.read_be::<i32>()?;
    let Ok(count) = usize::try_from(count) else {
        return Err(format_error!(
            offset,
            &parser.data()[offset..parser.pos()],
            "lookupswitch with negative pair count {}",
            count
        ));
    };
    if count > (parser.len() - parser.pos()) / 8 {
        return Err(Error::OutOfBounds);
    }

    let mut pairs: Vec<(i32, usize)> = Vec::with_capacity(count);
    for _ in 0..count {
        let key = parser.read_be::<i32>()?;
        let delta = parser.read_be::<i32>()?;
        if pairs.last().is_some_and(|(previous, _)| *previous >= key) {
            return Err(format_error!(
                offset,
                &parser.data()[offset..parser.pos()],
                "lookupswitch keys are not sorted at key {}",
                key
            ));
        }
        pairs.push((key, relative(parser, offset, delta)?));
    }
    Ok(InstructionKind::LookupSwitch {
        default: relative(parser, offset, default)?,
        pairs,
    })
}

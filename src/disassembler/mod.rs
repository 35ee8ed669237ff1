//! JVM bytecode decoding.
//!
//! This module decodes method bytecode into [`Instruction`]s, the input of the block builder.
//! It does no control flow analysis of its own beyond validating branch targets; block
//! discovery happens in [`crate::builder`].
//!
//! # Key Types
//! - [`Instruction`] - A decoded instruction with its offset, size and opcode
//! - [`InstructionKind`] - Decoded operands and semantics
//! - [`Opcode`] - The opcode table, with mnemonics
//! - [`FlowType`] - How an instruction affects control flow
//! - [`Parser`] - Big-endian cursor over raw bytes
//!
//! # Main Functions
//! - [`decode_instruction`] - Decode a single instruction
//! - [`decode_method`] - Decode and validate a whole method body
//!
//! # Example
//! ```rust
//! use portflow::disassembler::{decode_method, FlowType};
//!
//! let code = [0x1a, 0x04, 0x60, 0xac]; // iload_0, iconst_1, iadd, ireturn
//! let instructions = decode_method(&code)?;
//! assert_eq!(instructions.last().map(|i| i.flow()), Some(FlowType::Return));
//! for instruction in &instructions {
//!     println!("{instruction}");
//! }
//! # Ok::<(), portflow::Error>(())
//! ```

mod decoder;
mod instruction;
mod opcode;
mod parser;

pub use decoder::{decode_instruction, decode_method};
pub use instruction::{FlowType, Instruction, InstructionKind};
pub use opcode::Opcode;
pub use parser::{BigEndian, Parser};

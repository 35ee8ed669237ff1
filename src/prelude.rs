//! # portflow Prelude
//!
//! The most commonly used types from across the crate, for glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all portflow operations
pub use crate::Error;

/// The result type used throughout portflow
pub use crate::Result;

// ================================================================================================
// Metadata
// ================================================================================================

/// Class records and providers
pub use crate::metadata::{ClassBuilder, ClassFile, ClassPath, ClassProvider};

/// Methods, descriptors and the constant pool
pub use crate::metadata::{
    ConstantPool, FieldRef, FieldType, MethodAccessFlags, MethodDescriptor, MethodInfo, MethodRef,
    PrimitiveType,
};

// ================================================================================================
// Bytecode
// ================================================================================================

/// Decoding
pub use crate::disassembler::{decode_method, Instruction, InstructionKind, Opcode};

/// Encoding
pub use crate::assembly::BytecodeAssembler;

// ================================================================================================
// Graph
// ================================================================================================

/// Arena, handles and operations
pub use crate::graph::{
    BlockId, Graph, InputId, MethodId, NodeId, Operation, OperationClass, OutputId, PortId,
};

/// Graph construction
pub use crate::builder::{BlockBuilder, MethodBuilder};

// ================================================================================================
// Analysis and Transformation
// ================================================================================================

/// Lattice values and evaluation
pub use crate::analysis::{ConstValue, Evaluation, GraphEvaluator, Heap, Value, ValueType};

/// The driver and its configuration
pub use crate::compiler::{CompilerConfig, EventKind, EventLog, Program};

//! Class, method and type records consumed by the graph builder.
//!
//! This module holds what a class-file loader hands to the core:
//!
//! - [`types`] - primitive kinds, field types and method descriptors
//! - [`constpool`] - the constant pool and the references it resolves to
//! - [`method`] - method records and access flags
//! - [`class`] - classes, the [`ClassProvider`] trait and the in-memory [`ClassPath`]
//!
//! Reading `.class` files from disk is not part of this crate; records are assembled in
//! memory, typically with [`ClassBuilder`] and [`crate::assembly::BytecodeAssembler`].

pub mod class;
pub mod constpool;
pub mod method;
pub mod types;

pub use class::{ClassBuilder, ClassFile, ClassPath, ClassProvider};
pub use constpool::{Constant, ConstantPool, FieldRef, Literal, MethodRef};
pub use method::{Code, MethodAccessFlags, MethodInfo};
pub use types::{FieldType, MethodDescriptor, PrimitiveType};

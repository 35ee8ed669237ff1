//! JVM bytecode assembly.
//!
//! [`BytecodeAssembler`] produces method code from a fluent instruction sequence with named
//! labels. It exists for building test fixtures and synthetic classes with
//! [`crate::metadata::ClassBuilder`]; nothing in the optimizer writes bytecode back out.

mod encoder;

pub use encoder::BytecodeAssembler;

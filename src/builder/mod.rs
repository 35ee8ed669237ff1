//! Translation of decoded bytecode into the port graph.
//!
//! [`MethodBuilder`] cuts a method into blocks and drives a [`BlockBuilder`] per block. The
//! graph it produces still contains stack and local markers (`Push`, `Pop`, `LoadLocal`,
//! `StoreLocal`) wherever a value crosses a block boundary;
//! [`crate::compiler::blocks::eliminate_stack`] turns them into boundary ports.

mod block;
mod method;

pub use block::{BlockBuilder, StackEntry};
pub use method::MethodBuilder;

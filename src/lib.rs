// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]

//! # portflow
//!
//! A dataflow intermediate representation for JVM bytecode. Each method is translated from
//! its stack-machine instruction stream into a graph of nodes connected through explicit
//! ports: operands, results, the threaded environment (heap state) and the values that
//! flow across block boundaries. Local passes and whole-program passes then simplify the
//! graph.
//!
//! ## Features
//!
//! - **Port graph** - one arena per run, stable handles, symmetric links checked by
//!   [`graph::Graph::verify_links`]
//! - **Stack elimination** - operand stack and local variables become block boundary ports
//! - **Constant propagation** - an SCCP-style evaluator over a lattice with a persistent heap
//!   model for arrays and objects
//! - **Control-flow cleanup** - decided branches become jumps, dead blocks disappear and
//!   straight-line blocks are fused
//! - **Constant-call inlining** - calls without visible effects are replaced by their result
//!
//! ## Quick Start
//!
//! ```rust
//! use portflow::prelude::*;
//!
//! let mut class = ClassBuilder::new("Test");
//! let zero = class.pool().add_method_ref("Test", "zero", "()I");
//!
//! let mut asm = BytecodeAssembler::new();
//! asm.invokestatic(zero)?.invokestatic(zero)?.iadd()?.ireturn()?;
//! class.method("main", "()I", MethodAccessFlags::STATIC, asm.finish()?);
//!
//! let mut asm = BytecodeAssembler::new();
//! asm.iconst(0)?.ireturn()?;
//! class.method("zero", "()I", MethodAccessFlags::STATIC, asm.finish()?);
//!
//! let mut program = Program::new(ClassPath::new().with(class.build()));
//! let main = program.method_id("Test", "main", "()I")?;
//! program.optimize(main)?;
//!
//! let evaluation = program.evaluate(main, &[])?;
//! assert_eq!(evaluation.return_value(program.graph()), Value::int(0));
//! # Ok::<(), portflow::Error>(())
//! ```
//!
//! ## Layers
//!
//! - [`metadata`] - classes, constant pools, descriptors and the [`metadata::ClassProvider`]
//! - [`disassembler`] - bytecode decoding
//! - [`assembly`] - a label-resolving bytecode encoder
//! - [`graph`] - the port graph
//! - [`builder`] - bytecode to graph
//! - [`analysis`] - value lattice and graph evaluation
//! - [`compiler`] - transformations and the [`compiler::Program`] driver
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`]. Errors that describe untranslatable input
//! (see [`Error::is_format`]) are contained per method by the driver; everything else
//! aborts the run.

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust
/// use portflow::prelude::*;
///
/// let mut graph = Graph::new();
/// let block = graph.new_block(Operation::BlockEntry, None);
/// assert!(graph.contains_block(block));
/// ```
pub mod prelude;

/// Bytecode decoding.
///
/// [`disassembler::decode_method`] turns a code array into [`disassembler::Instruction`]s
/// with offsets, operands and control-flow classification.
pub mod disassembler;

/// Class, method and constant pool records, and descriptor parsing.
///
/// Classes are supplied in memory through a [`metadata::ClassProvider`]; the
/// [`metadata::ClassBuilder`] assembles them for tests and tools.
pub mod metadata;

/// A fluent bytecode encoder with label resolution.
pub mod assembly;

/// The port graph: nodes, ports, links and blocks.
pub mod graph;

/// Translation of bytecode into the port graph.
pub mod builder;

/// The value lattice and the graph evaluator.
pub mod analysis;

/// Graph transformations and the whole-program driver.
pub mod compiler;

/// `portflow` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `portflow` Error type
///
/// The main error type for all operations in this crate. See [`error`](crate::Error) for
/// the variants.
pub use error::Error;

//! Compile-time evaluation of method graphs.
//!
//! This module provides the value lattice the optimizer reasons with and the evaluator that
//! computes it:
//!
//! - [`value`] - [`Value`], [`ConstValue`] and [`ValueType`]
//! - [`heap`] - arrays and objects allocated during evaluation, keyed by [`ObjectRef`]
//! - [`fold`] - folding of pure operations and branch conditions
//! - [`chain`] - the persistent stack used while eliminating stack markers
//! - [`sccp`] - [`GraphEvaluator`], which interprets a whole method graph
//!
//! # Usage
//!
//! ```rust,ignore
//! use portflow::analysis::{GraphEvaluator, Value};
//!
//! let evaluation = GraphEvaluator::new(&graph, entry)
//!     .with_argument(0, Value::int(1))
//!     .run()?;
//! if evaluation.converged() {
//!     println!("returns {}", evaluation.return_value(&graph));
//! }
//! ```

pub mod chain;
pub mod fold;
pub mod heap;
pub mod sccp;
pub mod value;

pub use chain::Chain;
pub use heap::{ArrayValue, Heap, HeapObject, ObjectRef, ObjectValue};
pub use sccp::{Evaluation, GraphEvaluator};
pub use value::{ConstValue, Value, ValueType};

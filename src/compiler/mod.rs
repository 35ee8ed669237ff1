//! Transformations over the port graph.
//!
//! This module sits on top of the other layers:
//!
//! - [`crate::builder`] - bytecode to graph, with stack and local markers
//! - [`crate::analysis`] - evaluation of a method's graph over the value lattice
//! - [`compiler`](self) - normalization, simplification and inlining
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Compiler Pipeline                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  Program                     Whole-program state                 │
//! │    ├─ Graph                   (blocks of every loaded method)    │
//! │    ├─ Method table            (lazy build, unparseable memo)     │
//! │    └─ EventLog                                                   │
//! │                                                                  │
//! │  blocks::prepare             Run once per built method           │
//! │    ├─ eliminate_stack         (markers -> boundary ports)        │
//! │    ├─ add_missing_block_ports (values flowing through blocks)    │
//! │    └─ remove_extra_block_ports + pruning                         │
//! │                                                                  │
//! │  blocks::simplify_method     Per-method fixpoint                 │
//! │    ├─ propagate_constants     (fold outputs, decide branches)    │
//! │    ├─ remove_dead_blocks                                         │
//! │    ├─ cleanup                 (unused ports and nodes)           │
//! │    └─ fuse_jumps                                                 │
//! │                                                                  │
//! │  inline_constant_calls       Calls without visible effects       │
//! │                                                                  │
//! │  Program::optimize alternates the last two until stable          │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod blocks;
mod config;
mod events;
mod inline;
mod program;

pub use config::CompilerConfig;
pub use events::{Event, EventBuilder, EventKind, EventLog};
pub use inline::inline_constant_calls;
pub use program::{Method, MethodState, Program};

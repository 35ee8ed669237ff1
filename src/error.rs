//! Error handling for bytecode decoding, graph construction and graph rewriting.
//!
//! The crate distinguishes two classes of failure:
//!
//! - **Format errors** ([`Error::Format`], [`Error::Malformed`], [`Error::NotSupported`]) describe
//!   input that cannot be translated. They are recoverable at method granularity: the offending
//!   method is marked unparseable and the rest of the program continues.
//! - **Invariant violations** ([`Error::Invariant`], [`Error::IndexOutOfBounds`]) mean a pass found the
//!   graph in a state it must never be in. They propagate out of the driver and abort the run.
//!
//! Link-level contract violations inside [`crate::graph::Graph`] (double linking, removing an
//! output that still has targets, merging mismatched nodes) panic instead, since no caller can
//! continue from a corrupted arena.

use thiserror::Error;

/// Creates an [`Error::Malformed`] that records the source location of the check.
///
/// # Examples
///
/// ```rust,ignore
/// return Err(malformed_error!("unterminated class name in {}", descriptor));
/// ```
macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// Creates an [`Error::Format`] for the instruction at `offset` whose raw bytes are `bytes`.
///
/// # Examples
///
/// ```rust,ignore
/// return Err(format_error!(offset, &code[offset..end], "unsupported opcode 0x{:02x}", op));
/// ```
macro_rules! format_error {
    ($offset:expr, $bytes:expr, $msg:expr) => {
        crate::Error::Format {
            offset: $offset,
            bytes: $bytes.to_vec(),
            message: $msg.to_string(),
        }
    };

    ($offset:expr, $bytes:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::Format {
            offset: $offset,
            bytes: $bytes.to_vec(),
            message: format!($fmt, $($arg)*),
        }
    };
}

/// Creates an [`Error::Invariant`] from a format string.
macro_rules! invariant_error {
    ($($arg:tt)*) => {
        crate::Error::Invariant(format!($($arg)*))
    };
}

/// Renders raw instruction bytes as space separated hex for diagnostics.
fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// The generic Error type, which provides coverage for all errors this library can return.
///
/// # Error Categories
///
/// ## Format Errors
/// - [`Error::Format`] - Malformed or unsupported bytecode at a specific offset
/// - [`Error::Malformed`] - Corrupted descriptor or constant pool data
/// - [`Error::OutOfBounds`] - Read past the end of a byte stream
/// - [`Error::NotSupported`] - A feature outside the supported subset
///
/// ## Resolution Errors
/// - [`Error::ClassNotFound`] - The class provider has no such class
/// - [`Error::MethodNotFound`] - The class exists but lacks the requested method
/// - [`Error::Unparseable`] - A method previously failed to build
///
/// ## Assembly Errors
/// - [`Error::DuplicateLabel`] - A label was defined twice
/// - [`Error::UndefinedLabel`] - A branch refers to a label that was never defined
/// - [`Error::InvalidBranch`] - A branch offset or switch layout cannot be encoded
///
/// ## Invariant Violations
/// - [`Error::Invariant`] - A pass found the graph in an impossible state
/// - [`Error::IndexOutOfBounds`] - Constant array access outside the array during folding
///
/// # Examples
///
/// ```rust,ignore
/// use portflow::{Error, compiler::Program};
///
/// match program.graph_of(method) {
///     Ok(Some(entry)) => println!("built {entry}"),
///     Ok(None) => println!("native method"),
///     Err(Error::Format { offset, message, .. }) => eprintln!("bad code at {offset}: {message}"),
///     Err(e) => eprintln!("{e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The bytecode of a method could not be translated.
    ///
    /// Raised by the decoder and the block builder for unsupported opcodes, truncated
    /// instructions, branch targets that do not land on an instruction boundary, inconsistent
    /// jump tables and stacks that do not balance across block edges.
    ///
    /// # Fields
    ///
    /// * `offset` - Byte offset of the offending instruction within the method's code
    /// * `bytes` - Raw bytes of the offending instruction (possibly truncated)
    /// * `message` - Description of the problem
    #[error("Format error at offset {offset} [{}]: {message}", hex(.bytes))]
    Format {
        /// Byte offset of the offending instruction
        offset: usize,
        /// Raw instruction bytes
        bytes: Vec<u8>,
        /// Description of the problem
        message: String,
    },

    /// Descriptor or constant pool data is damaged.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while reading a byte stream.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// The requested feature is outside the supported subset.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// The class provider could not supply the named class.
    #[error("Class not found - {0}")]
    ClassNotFound(String),

    /// The class was found but does not declare the requested method.
    #[error("Method not found - {class}.{name}{descriptor}")]
    MethodNotFound {
        /// Internal name of the declaring class
        class: String,
        /// Method name
        name: String,
        /// Method descriptor
        descriptor: String,
    },

    /// A method failed to build earlier in this run.
    ///
    /// The memoized failure is reported again instead of re-running the builder.
    #[error("Method {method} is unparseable: {reason}")]
    Unparseable {
        /// Display name of the method
        method: String,
        /// Rendering of the original failure
        reason: String,
    },

    /// A label was defined more than once while assembling bytecode.
    #[error("Duplicate label - {0}")]
    DuplicateLabel(String),

    /// A branch refers to a label that was never defined.
    #[error("Undefined label - {0}")]
    UndefinedLabel(String),

    /// A branch could not be encoded.
    ///
    /// Raised for branch offsets outside the range of their encoding and for switch
    /// instructions without cases.
    #[error("Invalid branch - {0}")]
    InvalidBranch(String),

    /// A graph invariant was violated by a pass.
    ///
    /// This is never recovered from: it indicates the graph is malformed and any further
    /// rewriting would be unsound.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// Folding reached a constant array access outside `[0, length)`.
    ///
    /// Verified bytecode reaching this point means an analysis bug or code that should
    /// have been pruned as unreachable first.
    #[error("Array index {index} out of bounds for length {length}")]
    IndexOutOfBounds {
        /// The constant index
        index: i32,
        /// The constant array length
        length: i32,
    },
}

impl Error {
    /// Returns `true` for errors describing input that cannot be translated.
    ///
    /// These are recoverable at method granularity; everything else is either a lookup
    /// failure or an invariant violation.
    #[must_use]
    pub fn is_format(&self) -> bool {
        matches!(
            self,
            Error::Format { .. } | Error::Malformed { .. } | Error::OutOfBounds | Error::NotSupported(_)
        )
    }
}

//! Method records as delivered by a class loader.

use bitflags::bitflags;

bitflags! {
    /// Method access and property flags (`access_flags` of a `method_info`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MethodAccessFlags: u16 {
        /// Declared `public`
        const PUBLIC = 0x0001;
        /// Declared `private`
        const PRIVATE = 0x0002;
        /// Declared `protected`
        const PROTECTED = 0x0004;
        /// Declared `static`
        const STATIC = 0x0008;
        /// Declared `final`
        const FINAL = 0x0010;
        /// Declared `synchronized`
        const SYNCHRONIZED = 0x0020;
        /// A compiler-generated bridge method
        const BRIDGE = 0x0040;
        /// Declared with variable arity
        const VARARGS = 0x0080;
        /// Declared `native`
        const NATIVE = 0x0100;
        /// Declared `abstract`
        const ABSTRACT = 0x0400;
        /// Declared `strictfp`
        const STRICT = 0x0800;
        /// Not present in source
        const SYNTHETIC = 0x1000;
    }
}

/// The `Code` attribute of a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    /// Maximum operand stack depth
    pub max_stack: u16,
    /// Number of local variable slots
    pub max_locals: u16,
    /// Raw bytecode
    pub bytes: Vec<u8>,
}

/// One method of a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    /// Method name
    pub name: String,
    /// Raw method descriptor
    pub descriptor: String,
    /// Access flags
    pub access: MethodAccessFlags,
    /// Bytecode, `None` for native and abstract methods
    pub code: Option<Code>,
    /// Declared checked exceptions, by internal name
    pub exceptions: Vec<String>,
}

impl MethodInfo {
    /// Creates a method with the given bytecode.
    ///
    /// `max_stack` and `max_locals` are not used by the graph builder and are set to the
    /// loosest legal values.
    #[must_use]
    pub fn new(name: &str, descriptor: &str, access: MethodAccessFlags, code: Vec<u8>) -> Self {
        MethodInfo {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access,
            code: Some(Code {
                max_stack: u16::MAX,
                max_locals: u16::MAX,
                bytes: code,
            }),
            exceptions: Vec::new(),
        }
    }

    /// Creates a method without a body.
    #[must_use]
    pub fn native(name: &str, descriptor: &str, access: MethodAccessFlags) -> Self {
        MethodInfo {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access: access | MethodAccessFlags::NATIVE,
            code: None,
            exceptions: Vec::new(),
        }
    }

    /// Returns `true` for `static` methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access.contains(MethodAccessFlags::STATIC)
    }
}

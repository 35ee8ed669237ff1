//! JVM type descriptors.
//!
//! Field descriptors (`I`, `J`, `Ljava/lang/String;`, `[[D`) and method descriptors
//! (`(IJ)V`) are parsed into [`FieldType`] and [`MethodDescriptor`]. Malformed descriptors
//! are rejected here, before any block building begins.
//!
//! # Examples
//!
//! ```rust
//! use portflow::metadata::{MethodDescriptor, PrimitiveType};
//!
//! let desc = MethodDescriptor::parse("(IJLjava/lang/Object;)D")?;
//! assert_eq!(desc.parameters.len(), 3);
//! assert_eq!(desc.argument_slots(true), 4);
//! assert_eq!(desc.return_kind(), Some(PrimitiveType::Double));
//! # Ok::<(), portflow::Error>(())
//! ```

use std::fmt;

use strum::{AsRefStr, Display};

use crate::Result;

/// The primitive kinds a value can have on the operand stack or in a field.
///
/// `Reference` covers objects, arrays and `null`. The sub-int kinds (`Boolean`, `Byte`,
/// `Char`, `Short`) only occur as field, array element and conversion types; on the
/// operand stack they are widened to `Int`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum PrimitiveType {
    /// `Z`
    Boolean,
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `S`
    Short,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `F`
    Float,
    /// `D`
    Double,
    /// `L...;` or `[...`
    Reference,
}

impl PrimitiveType {
    /// Returns `true` for the two-slot kinds `Long` and `Double`.
    #[must_use]
    pub const fn is_wide(self) -> bool {
        matches!(self, PrimitiveType::Long | PrimitiveType::Double)
    }

    /// Number of local variable / operand stack slots a value of this kind occupies.
    #[must_use]
    pub const fn slots(self) -> u32 {
        if self.is_wide() {
            2
        } else {
            1
        }
    }

    /// The kind this type takes on the operand stack.
    #[must_use]
    pub const fn stack_kind(self) -> PrimitiveType {
        match self {
            PrimitiveType::Boolean
            | PrimitiveType::Byte
            | PrimitiveType::Char
            | PrimitiveType::Short
            | PrimitiveType::Int => PrimitiveType::Int,
            other => other,
        }
    }

    /// Maps a primitive descriptor character to its kind.
    #[must_use]
    pub const fn from_descriptor(c: u8) -> Option<PrimitiveType> {
        match c {
            b'Z' => Some(PrimitiveType::Boolean),
            b'B' => Some(PrimitiveType::Byte),
            b'C' => Some(PrimitiveType::Char),
            b'S' => Some(PrimitiveType::Short),
            b'I' => Some(PrimitiveType::Int),
            b'J' => Some(PrimitiveType::Long),
            b'F' => Some(PrimitiveType::Float),
            b'D' => Some(PrimitiveType::Double),
            _ => None,
        }
    }

    /// Maps the `atype` operand of `newarray` to its element kind.
    #[must_use]
    pub const fn from_array_type_code(code: u8) -> Option<PrimitiveType> {
        match code {
            4 => Some(PrimitiveType::Boolean),
            5 => Some(PrimitiveType::Char),
            6 => Some(PrimitiveType::Float),
            7 => Some(PrimitiveType::Double),
            8 => Some(PrimitiveType::Byte),
            9 => Some(PrimitiveType::Short),
            10 => Some(PrimitiveType::Int),
            11 => Some(PrimitiveType::Long),
            _ => None,
        }
    }

    /// The `newarray` operand for this element kind, if it has one.
    #[must_use]
    pub const fn array_type_code(self) -> Option<u8> {
        match self {
            PrimitiveType::Boolean => Some(4),
            PrimitiveType::Char => Some(5),
            PrimitiveType::Float => Some(6),
            PrimitiveType::Double => Some(7),
            PrimitiveType::Byte => Some(8),
            PrimitiveType::Short => Some(9),
            PrimitiveType::Int => Some(10),
            PrimitiveType::Long => Some(11),
            PrimitiveType::Reference => None,
        }
    }

    fn descriptor_char(self) -> char {
        match self {
            PrimitiveType::Boolean => 'Z',
            PrimitiveType::Byte => 'B',
            PrimitiveType::Char => 'C',
            PrimitiveType::Short => 'S',
            PrimitiveType::Int => 'I',
            PrimitiveType::Long => 'J',
            PrimitiveType::Float => 'F',
            PrimitiveType::Double => 'D',
            PrimitiveType::Reference => 'L',
        }
    }
}

/// A parsed field descriptor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldType {
    /// A non-reference primitive.
    Primitive(PrimitiveType),
    /// A class or interface, by internal name (`java/lang/Object`).
    Object(String),
    /// An array of the given component type.
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parses a complete field descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the descriptor is empty, has trailing
    /// characters, or contains an unterminated class name.
    pub fn parse(descriptor: &str) -> Result<FieldType> {
        let bytes = descriptor.as_bytes();
        let mut pos = 0;
        let parsed = Self::parse_at(bytes, &mut pos, descriptor)?;
        if pos != bytes.len() {
            return Err(malformed_error!(
                "trailing characters in field descriptor {}",
                descriptor
            ));
        }
        Ok(parsed)
    }

    fn parse_at(bytes: &[u8], pos: &mut usize, descriptor: &str) -> Result<FieldType> {
        let Some(&c) = bytes.get(*pos) else {
            return Err(malformed_error!("truncated descriptor {}", descriptor));
        };
        *pos += 1;

        if let Some(primitive) = PrimitiveType::from_descriptor(c) {
            return Ok(FieldType::Primitive(primitive));
        }

        match c {
            b'L' => {
                let start = *pos;
                while *pos < bytes.len() && bytes[*pos] != b';' {
                    *pos += 1;
                }
                if *pos >= bytes.len() || *pos == start {
                    return Err(malformed_error!(
                        "unterminated class name in descriptor {}",
                        descriptor
                    ));
                }
                let name = &descriptor[start..*pos];
                *pos += 1;
                Ok(FieldType::Object(name.to_string()))
            }
            b'[' => Ok(FieldType::Array(Box::new(Self::parse_at(
                bytes, pos, descriptor,
            )?))),
            other => Err(malformed_error!(
                "unexpected character '{}' in descriptor {}",
                other as char,
                descriptor
            )),
        }
    }

    /// The kind a value of this type has on the operand stack.
    #[must_use]
    pub fn kind(&self) -> PrimitiveType {
        match self {
            FieldType::Primitive(p) => *p,
            FieldType::Object(_) | FieldType::Array(_) => PrimitiveType::Reference,
        }
    }

    /// Number of slots occupied by a value of this type.
    #[must_use]
    pub fn slots(&self) -> u32 {
        self.kind().slots()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Primitive(p) => write!(f, "{}", p.descriptor_char()),
            FieldType::Object(name) => write!(f, "L{name};"),
            FieldType::Array(component) => write!(f, "[{component}"),
        }
    }
}

impl From<PrimitiveType> for FieldType {
    fn from(kind: PrimitiveType) -> Self {
        match kind {
            PrimitiveType::Reference => FieldType::Object("java/lang/Object".to_string()),
            other => FieldType::Primitive(other),
        }
    }
}

/// A parsed method descriptor: parameter types and an optional return type (`None` is `V`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Declared parameters, excluding the implicit receiver
    pub parameters: Vec<FieldType>,
    /// Return type, `None` for `void`
    pub return_type: Option<FieldType>,
}

impl MethodDescriptor {
    /// Parses a method descriptor of the form `(ArgTypes)ReturnType`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a missing parenthesis, a bad parameter or
    /// return type, or trailing characters.
    pub fn parse(descriptor: &str) -> Result<MethodDescriptor> {
        let bytes = descriptor.as_bytes();
        if bytes.first() != Some(&b'(') {
            return Err(malformed_error!(
                "method descriptor {} does not start with '('",
                descriptor
            ));
        }

        let mut pos = 1;
        let mut parameters = Vec::new();
        loop {
            match bytes.get(pos) {
                Some(b')') => {
                    pos += 1;
                    break;
                }
                Some(_) => parameters.push(FieldType::parse_at(bytes, &mut pos, descriptor)?),
                None => {
                    return Err(malformed_error!(
                        "unterminated parameter list in {}",
                        descriptor
                    ))
                }
            }
        }

        let return_type = if bytes.get(pos) == Some(&b'V') {
            pos += 1;
            None
        } else {
            Some(FieldType::parse_at(bytes, &mut pos, descriptor)?)
        };

        if pos != bytes.len() {
            return Err(malformed_error!(
                "trailing characters in method descriptor {}",
                descriptor
            ));
        }

        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }

    /// Number of local variable slots the arguments occupy on entry.
    ///
    /// Instance methods receive the receiver in slot 0.
    #[must_use]
    pub fn argument_slots(&self, is_static: bool) -> u32 {
        let receiver = u32::from(!is_static);
        receiver + self.parameters.iter().map(FieldType::slots).sum::<u32>()
    }

    /// Number of operand stack values an invocation consumes, including the receiver.
    #[must_use]
    pub fn argument_count(&self, is_static: bool) -> usize {
        self.parameters.len() + usize::from(!is_static)
    }

    /// Kinds of each argument position, receiver first for instance methods.
    #[must_use]
    pub fn argument_kinds(&self, is_static: bool) -> Vec<PrimitiveType> {
        let mut kinds = Vec::with_capacity(self.argument_count(is_static));
        if !is_static {
            kinds.push(PrimitiveType::Reference);
        }
        kinds.extend(self.parameters.iter().map(FieldType::kind));
        kinds
    }

    /// Local slot of each argument position.
    ///
    /// For `(JI)V` on a static method this is `[0, 2]`.
    #[must_use]
    pub fn argument_local_slots(&self, is_static: bool) -> Vec<u32> {
        let mut slot = 0;
        self.argument_kinds(is_static)
            .into_iter()
            .map(|kind| {
                let current = slot;
                slot += kind.slots();
                current
            })
            .collect()
    }

    /// Argument position that arrives in local `slot`, if any.
    #[must_use]
    pub fn argument_position(&self, slot: u32, is_static: bool) -> Option<usize> {
        self.argument_local_slots(is_static)
            .iter()
            .position(|&s| s == slot)
    }

    /// Stack kind of the return value, `None` for `void`.
    #[must_use]
    pub fn return_kind(&self) -> Option<PrimitiveType> {
        self.return_type.as_ref().map(|t| t.kind().stack_kind())
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for parameter in &self.parameters {
            write!(f, "{parameter}")?;
        }
        write!(f, ")")?;
        match &self.return_type {
            Some(ret) => write!(f, "{ret}"),
            None => write!(f, "V"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field_types() {
        assert_eq!(
            FieldType::parse("I").unwrap(),
            FieldType::Primitive(PrimitiveType::Int)
        );
        assert_eq!(
            FieldType::parse("Ljava/lang/String;").unwrap(),
            FieldType::Object("java/lang/String".to_string())
        );
        assert_eq!(
            FieldType::parse("[[J").unwrap(),
            FieldType::Array(Box::new(FieldType::Array(Box::new(FieldType::Primitive(
                PrimitiveType::Long
            )))))
        );
    }

    #[test]
    fn test_parse_field_type_rejects_garbage() {
        assert!(FieldType::parse("").is_err());
        assert!(FieldType::parse("Q").is_err());
        assert!(FieldType::parse("Ljava/lang/String").is_err());
        assert!(FieldType::parse("L;").is_err());
        assert!(FieldType::parse("II").is_err());
    }

    #[test]
    fn test_parse_method_descriptor() {
        let desc = MethodDescriptor::parse("(I[Ljava/lang/Object;J)V").unwrap();
        assert_eq!(desc.parameters.len(), 3);
        assert_eq!(desc.return_type, None);
        assert_eq!(desc.argument_slots(true), 4);
        assert_eq!(desc.argument_slots(false), 5);
        assert_eq!(desc.argument_local_slots(true), vec![0, 1, 2]);
        assert_eq!(desc.argument_local_slots(false), vec![0, 1, 2, 3]);
        assert_eq!(desc.to_string(), "(I[Ljava/lang/Object;J)V");
    }

    #[test]
    fn test_argument_position_skips_wide_halves() {
        let desc = MethodDescriptor::parse("(JI)I").unwrap();
        assert_eq!(desc.argument_position(0, true), Some(0));
        assert_eq!(desc.argument_position(1, true), None);
        assert_eq!(desc.argument_position(2, true), Some(1));
        assert_eq!(desc.return_kind(), Some(PrimitiveType::Int));
    }

    #[test]
    fn test_sub_int_return_widens() {
        let desc = MethodDescriptor::parse("()Z").unwrap();
        assert_eq!(desc.return_kind(), Some(PrimitiveType::Int));
    }

    #[test]
    fn test_parse_method_descriptor_rejects_garbage() {
        assert!(MethodDescriptor::parse("I)V").is_err());
        assert!(MethodDescriptor::parse("(I").is_err());
        assert!(MethodDescriptor::parse("(I)").is_err());
        assert!(MethodDescriptor::parse("(I)VV").is_err());
        assert!(MethodDescriptor::parse("(X)V").is_err());
    }
}

//! In-memory constant pool.
//!
//! The pool is indexed from 1 like a class file's; `long` and `double` entries occupy two
//! indices. Lookups that hit the wrong entry kind, an unusable slot or an index past the end
//! are [`crate::Error::Malformed`]. The `add_*` methods intern entries and return their index,
//! which is how test fixtures and the assembler build pools.

use std::fmt;

use crate::{
    metadata::types::{FieldType, MethodDescriptor},
    Result,
};

/// One constant pool entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Placeholder for index 0 and the second half of wide entries.
    Unusable,
    /// `CONSTANT_Utf8`
    Utf8(String),
    /// `CONSTANT_Integer`
    Integer(i32),
    /// `CONSTANT_Float`
    Float(f32),
    /// `CONSTANT_Long`
    Long(i64),
    /// `CONSTANT_Double`
    Double(f64),
    /// `CONSTANT_Class`
    Class {
        /// Index of the internal name
        name_index: u16,
    },
    /// `CONSTANT_String`
    String {
        /// Index of the string contents
        string_index: u16,
    },
    /// `CONSTANT_Fieldref`
    FieldRef {
        /// Index of the declaring class
        class_index: u16,
        /// Index of the name and type
        name_and_type_index: u16,
    },
    /// `CONSTANT_Methodref`
    MethodRef {
        /// Index of the declaring class
        class_index: u16,
        /// Index of the name and type
        name_and_type_index: u16,
    },
    /// `CONSTANT_InterfaceMethodref`
    InterfaceMethodRef {
        /// Index of the declaring interface
        class_index: u16,
        /// Index of the name and type
        name_and_type_index: u16,
    },
    /// `CONSTANT_NameAndType`
    NameAndType {
        /// Index of the member name
        name_index: u16,
        /// Index of the descriptor
        descriptor_index: u16,
    },
}

impl Constant {
    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

/// A resolved field reference.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldRef {
    /// Internal name of the declaring class
    pub class: String,
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: FieldType,
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.class, self.name, self.field_type)
    }
}

/// A resolved method reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Internal name of the declaring class or interface
    pub class: String,
    /// Method name
    pub name: String,
    /// Raw descriptor string
    pub descriptor: String,
    /// Parsed descriptor
    pub signature: MethodDescriptor,
    /// Whether the reference was an `InterfaceMethodref`
    pub interface: bool,
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.class, self.name, self.descriptor)
    }
}

/// A literal loadable by `ldc`, `ldc_w` or `ldc2_w`.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `int`
    Integer(i32),
    /// `float`
    Float(f32),
    /// `long`
    Long(i64),
    /// `double`
    Double(f64),
    /// A string literal
    String(String),
}

/// The constant pool of one class.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    /// Creates a pool containing only the reserved index 0.
    #[must_use]
    pub fn new() -> Self {
        ConstantPool {
            entries: vec![Constant::Unusable],
        }
    }

    /// Creates a pool from raw entries, where `entries[0]` is the reserved slot.
    #[must_use]
    pub fn from_entries(entries: Vec<Constant>) -> Self {
        ConstantPool { entries }
    }

    /// Number of indices in use, including index 0.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the pool holds nothing beyond index 0.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Returns the entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for index 0, out-of-range indices and the
    /// unusable second half of wide entries.
    pub fn get(&self, index: u16) -> Result<&Constant> {
        match self.entries.get(usize::from(index)) {
            Some(Constant::Unusable) | None => Err(malformed_error!(
                "constant pool index {} is not usable",
                index
            )),
            Some(constant) => Ok(constant),
        }
    }

    /// Returns the UTF-8 string at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is not `Utf8`.
    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Utf8(s) => Ok(s),
            other => Err(malformed_error!(
                "expected Utf8 at index {}, found {:?}",
                index,
                other
            )),
        }
    }

    /// Returns the internal name of the `Class` entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is not `Class`.
    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            other => Err(malformed_error!(
                "expected Class at index {}, found {:?}",
                index,
                other
            )),
        }
    }

    fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            other => Err(malformed_error!(
                "expected NameAndType at index {}, found {:?}",
                index,
                other
            )),
        }
    }

    /// Resolves the `Fieldref` at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a wrong entry kind or a bad field descriptor.
    pub fn field_ref(&self, index: u16) -> Result<FieldRef> {
        match self.get(index)? {
            Constant::FieldRef {
                class_index,
                name_and_type_index,
            } => {
                let class = self.class_name(*class_index)?;
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                Ok(FieldRef {
                    class: class.to_string(),
                    name: name.to_string(),
                    field_type: FieldType::parse(descriptor)?,
                })
            }
            other => Err(malformed_error!(
                "expected Fieldref at index {}, found {:?}",
                index,
                other
            )),
        }
    }

    /// Resolves the `Methodref` or `InterfaceMethodref` at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a wrong entry kind or a bad method descriptor.
    pub fn method_ref(&self, index: u16) -> Result<MethodRef> {
        let (class_index, name_and_type_index, interface) = match self.get(index)? {
            Constant::MethodRef {
                class_index,
                name_and_type_index,
            } => (*class_index, *name_and_type_index, false),
            Constant::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => (*class_index, *name_and_type_index, true),
            other => {
                return Err(malformed_error!(
                    "expected Methodref at index {}, found {:?}",
                    index,
                    other
                ))
            }
        };

        let class = self.class_name(class_index)?;
        let (name, descriptor) = self.name_and_type(name_and_type_index)?;
        Ok(MethodRef {
            class: class.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            signature: MethodDescriptor::parse(descriptor)?,
            interface,
        })
    }

    /// Resolves the literal loaded by `ldc` from `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for class, method handle and dynamic
    /// constants and [`crate::Error::Malformed`] for anything else that is not loadable.
    pub fn literal(&self, index: u16) -> Result<Literal> {
        match self.get(index)? {
            Constant::Integer(v) => Ok(Literal::Integer(*v)),
            Constant::Float(v) => Ok(Literal::Float(*v)),
            Constant::Long(v) => Ok(Literal::Long(*v)),
            Constant::Double(v) => Ok(Literal::Double(*v)),
            Constant::String { string_index } => {
                Ok(Literal::String(self.utf8(*string_index)?.to_string()))
            }
            Constant::Class { .. } => Err(crate::Error::NotSupported(format!(
                "class literal at constant pool index {index}"
            ))),
            other => Err(malformed_error!(
                "constant pool entry {} is not loadable: {:?}",
                index,
                other
            )),
        }
    }

    /// Appends `constant` without interning and returns its index.
    ///
    /// # Panics
    /// Panics if the pool outgrows the 16-bit index space.
    pub fn push(&mut self, constant: Constant) -> u16 {
        let Ok(index) = u16::try_from(self.entries.len()) else {
            panic!("constant pool overflow at {} entries", self.entries.len());
        };
        let wide = constant.is_wide();
        self.entries.push(constant);
        if wide {
            self.entries.push(Constant::Unusable);
        }
        index
    }

    fn intern(&mut self, constant: Constant) -> u16 {
        if let Some(existing) = self.entries.iter().position(|c| *c == constant) {
            if let Ok(index) = u16::try_from(existing) {
                return index;
            }
        }
        self.push(constant)
    }

    /// Interns a UTF-8 entry.
    pub fn add_utf8(&mut self, value: &str) -> u16 {
        self.intern(Constant::Utf8(value.to_string()))
    }

    /// Interns a `Class` entry for `name`.
    pub fn add_class(&mut self, name: &str) -> u16 {
        let name_index = self.add_utf8(name);
        self.intern(Constant::Class { name_index })
    }

    /// Interns a `String` literal.
    pub fn add_string(&mut self, value: &str) -> u16 {
        let string_index = self.add_utf8(value);
        self.intern(Constant::String { string_index })
    }

    /// Interns an `Integer` literal.
    pub fn add_integer(&mut self, value: i32) -> u16 {
        self.intern(Constant::Integer(value))
    }

    /// Interns a `Float` literal.
    pub fn add_float(&mut self, value: f32) -> u16 {
        self.intern(Constant::Float(value))
    }

    /// Interns a `Long` literal.
    pub fn add_long(&mut self, value: i64) -> u16 {
        self.intern(Constant::Long(value))
    }

    /// Interns a `Double` literal.
    pub fn add_double(&mut self, value: f64) -> u16 {
        self.intern(Constant::Double(value))
    }

    /// Interns a `NameAndType` entry.
    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.add_utf8(name);
        let descriptor_index = self.add_utf8(descriptor);
        self.intern(Constant::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    /// Interns a `Fieldref` entry.
    pub fn add_field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.add_class(class);
        let name_and_type_index = self.add_name_and_type(name, descriptor);
        self.intern(Constant::FieldRef {
            class_index,
            name_and_type_index,
        })
    }

    /// Interns a `Methodref` entry.
    pub fn add_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.add_class(class);
        let name_and_type_index = self.add_name_and_type(name, descriptor);
        self.intern(Constant::MethodRef {
            class_index,
            name_and_type_index,
        })
    }

    /// Interns an `InterfaceMethodref` entry.
    pub fn add_interface_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.add_class(class);
        let name_and_type_index = self.add_name_and_type(name, descriptor);
        self.intern(Constant::InterfaceMethodRef {
            class_index,
            name_and_type_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::types::PrimitiveType;

    #[test]
    fn test_method_ref_resolution() {
        let mut pool = ConstantPool::new();
        let index = pool.add_method_ref("Test", "max", "(II)I");
        let method = pool.method_ref(index).unwrap();
        assert_eq!(method.class, "Test");
        assert_eq!(method.name, "max");
        assert_eq!(method.signature.parameters.len(), 2);
        assert!(!method.interface);
        assert_eq!(method.to_string(), "Test.max(II)I");
    }

    #[test]
    fn test_field_ref_resolution() {
        let mut pool = ConstantPool::new();
        let index = pool.add_field_ref("Point", "x", "I");
        let field = pool.field_ref(index).unwrap();
        assert_eq!(field.field_type, FieldType::Primitive(PrimitiveType::Int));
        assert_eq!(field.to_string(), "Point.x:I");
    }

    #[test]
    fn test_interning_reuses_entries() {
        let mut pool = ConstantPool::new();
        let a = pool.add_method_ref("Test", "zero", "()I");
        let b = pool.add_method_ref("Test", "zero", "()I");
        assert_eq!(a, b);
    }

    #[test]
    fn test_wide_entries_take_two_slots() {
        let mut pool = ConstantPool::new();
        let long = pool.add_long(7);
        let next = pool.add_integer(1);
        assert_eq!(next, long + 2);
        assert!(pool.get(long + 1).is_err());
        assert_eq!(pool.literal(long).unwrap(), Literal::Long(7));
    }

    #[test]
    fn test_wrong_kind_is_malformed() {
        let mut pool = ConstantPool::new();
        let index = pool.add_integer(3);
        assert!(matches!(
            pool.method_ref(index),
            Err(crate::Error::Malformed { .. })
        ));
        assert!(pool.get(0).is_err());
        assert!(pool.get(100).is_err());
    }

    #[test]
    fn test_class_literal_not_supported() {
        let mut pool = ConstantPool::new();
        let index = pool.add_class("Test");
        assert!(matches!(
            pool.literal(index),
            Err(crate::Error::NotSupported(_))
        ));
    }
}

//! Heap model for compile-time evaluation.
//!
//! The heap maps [`ObjectRef`] identities to array and object contents. Identities are the
//! allocation-site node of the object, which is sound because the evaluator gives every
//! output port exactly one value: an allocation inside a loop sees an unknown environment
//! and never produces a `Ref`.
//!
//! # Structural Sharing
//!
//! The heap uses `imbl::OrdMap` and arrays use `imbl::Vector`, so cloning a heap or an
//! array is O(1) and every store produces a new version without disturbing the old one.
//! This is what lets different control-flow paths carry different heaps.

use std::{fmt, rc::Rc};

use imbl::{OrdMap, Vector};

use crate::{
    analysis::value::{ConstValue, Value, ValueType},
    graph::NodeId,
    metadata::{FieldRef, PrimitiveType},
    Error, Result,
};

/// Arrays longer than this are tracked by length only.
const MAX_TRACKED_ELEMENTS: i32 = 1 << 16;

/// Identity of a heap object: its allocation site.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ObjectRef(pub(crate) usize);

impl ObjectRef {
    /// The identity of the object allocated by `site`.
    #[must_use]
    pub const fn site(site: NodeId) -> Self {
        ObjectRef(site.index())
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj{}", self.0)
    }
}

/// Contents of an array.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue {
    /// Element kind
    pub element: PrimitiveType,
    /// Length, constant or unknown
    pub length: Value,
    elements: Option<Vector<Value>>,
}

impl ArrayValue {
    /// A freshly allocated array: every element holds the default value of `element`.
    ///
    /// Returns `None` for a negative constant length, which would throw at runtime.
    #[must_use]
    pub fn allocate(element: PrimitiveType, length: &Value) -> Option<Self> {
        match length.as_int() {
            Some(n) if n < 0 => None,
            Some(n) if n <= MAX_TRACKED_ELEMENTS => Some(ArrayValue {
                element,
                length: length.clone(),
                elements: Some(
                    std::iter::repeat(Value::Const(ConstValue::default_for(element)))
                        .take(n as usize)
                        .collect(),
                ),
            }),
            Some(_) => Some(ArrayValue {
                element,
                length: length.clone(),
                elements: None,
            }),
            None => Some(ArrayValue {
                element,
                length: Value::Unknown(ValueType::Int),
                elements: None,
            }),
        }
    }

    fn unknown_element(&self) -> Value {
        Value::Unknown(ValueType::from(self.element))
    }

    fn check_bounds(&self, index: i32) -> Result<()> {
        if let Some(length) = self.length.as_int() {
            if index < 0 || index >= length {
                return Err(Error::IndexOutOfBounds { index, length });
            }
        }
        Ok(())
    }

    /// Reads one element.
    ///
    /// A constant in-range index on a tracked array yields the element, anything not
    /// constant yields an unknown of the element kind.
    ///
    /// # Errors
    /// Returns [`crate::Error::IndexOutOfBounds`] for a constant index outside
    /// `[0, length)`.
    pub fn extract_element(&self, index: &Value) -> Result<Value> {
        let Some(index) = index.as_int() else {
            return Ok(self.unknown_element());
        };
        self.check_bounds(index)?;

        match &self.elements {
            Some(elements) => Ok(elements
                .get(index as usize)
                .cloned()
                .unwrap_or_else(|| self.unknown_element())),
            None => Ok(self.unknown_element()),
        }
    }

    /// Returns a copy with one element replaced.
    ///
    /// Unmodified elements are shared with `self`. A write through an unknown index makes
    /// every element unknown, since any of them may have changed.
    ///
    /// # Errors
    /// Returns [`crate::Error::IndexOutOfBounds`] for a constant index outside
    /// `[0, length)`.
    pub fn insert_element(&self, index: &Value, value: Value) -> Result<ArrayValue> {
        let Some(index) = index.as_int() else {
            return Ok(ArrayValue {
                element: self.element,
                length: self.length.clone(),
                elements: None,
            });
        };
        self.check_bounds(index)?;

        let elements = self
            .elements
            .as_ref()
            .map(|elements| elements.update(index as usize, value));
        Ok(ArrayValue {
            element: self.element,
            length: self.length.clone(),
            elements,
        })
    }

    /// Returns `true` if the length and every element are known.
    ///
    /// References count as known identities; their targets are not inspected.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        self.length.is_constant()
            && self.elements.as_ref().is_some_and(|elements| {
                elements
                    .iter()
                    .all(|e| matches!(e, Value::Const(_) | Value::Ref(_)))
            })
    }
}

/// Contents of an object: a structural map from field to value.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectValue {
    /// Internal name of the instantiated class
    pub class: Rc<str>,
    fields: OrdMap<Rc<FieldRef>, Value>,
}

impl ObjectValue {
    /// A freshly allocated object. Every field reads as its default value until written.
    #[must_use]
    pub fn allocate(class: &str) -> Self {
        ObjectValue {
            class: Rc::from(class),
            fields: OrdMap::new(),
        }
    }

    /// Reads a field.
    #[must_use]
    pub fn field(&self, field: &FieldRef) -> Value {
        self.fields
            .get(field)
            .cloned()
            .unwrap_or_else(|| Value::Const(ConstValue::default_for(field.field_type.kind())))
    }

    /// Returns a copy with one field replaced.
    #[must_use]
    pub fn with_field(&self, field: Rc<FieldRef>, value: Value) -> Self {
        ObjectValue {
            class: self.class.clone(),
            fields: self.fields.update(field, value),
        }
    }

    /// Fields written since allocation, with their current values.
    pub fn written_fields(&self) -> impl Iterator<Item = (&Rc<FieldRef>, &Value)> + '_ {
        self.fields.iter()
    }

    /// Returns `true` if every written field is known.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        self.fields
            .values()
            .all(|v| matches!(v, Value::Const(_) | Value::Ref(_)))
    }
}

/// One heap entry.
#[derive(Debug, Clone, PartialEq)]
pub enum HeapObject {
    /// An array
    Array(ArrayValue),
    /// An instance
    Object(ObjectValue),
}

/// The objects allocated so far along one evaluation path.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Heap {
    objects: OrdMap<ObjectRef, HeapObject>,
}

impl Heap {
    /// An empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns `true` if nothing has been allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Every tracked object, in identity order.
    pub fn iter(&self) -> impl Iterator<Item = (&ObjectRef, &HeapObject)> + '_ {
        self.objects.iter()
    }

    /// Looks up an object.
    #[must_use]
    pub fn get(&self, reference: ObjectRef) -> Option<&HeapObject> {
        self.objects.get(&reference)
    }

    /// Looks up an array.
    #[must_use]
    pub fn array(&self, reference: ObjectRef) -> Option<&ArrayValue> {
        match self.get(reference) {
            Some(HeapObject::Array(array)) => Some(array),
            _ => None,
        }
    }

    /// Looks up an instance.
    #[must_use]
    pub fn object(&self, reference: ObjectRef) -> Option<&ObjectValue> {
        match self.get(reference) {
            Some(HeapObject::Object(object)) => Some(object),
            _ => None,
        }
    }

    /// Returns a new heap in which `reference` maps to `object`.
    #[must_use]
    pub fn with_object(&self, reference: ObjectRef, object: HeapObject) -> Heap {
        Heap {
            objects: self.objects.update(reference, object),
        }
    }

    /// Returns a new heap holding a fresh array at `reference`, or `None` for a negative
    /// constant length.
    #[must_use]
    pub fn allocate_array(
        &self,
        reference: ObjectRef,
        element: PrimitiveType,
        length: &Value,
    ) -> Option<Heap> {
        let array = ArrayValue::allocate(element, length)?;
        Some(self.with_object(reference, HeapObject::Array(array)))
    }

    /// Returns a new heap holding a fresh instance of `class` at `reference`.
    #[must_use]
    pub fn allocate_object(&self, reference: ObjectRef, class: &str) -> Heap {
        self.with_object(reference, HeapObject::Object(ObjectValue::allocate(class)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::FieldType;

    #[test]
    fn test_allocate_defaults() {
        let array = ArrayValue::allocate(PrimitiveType::Int, &Value::int(3)).unwrap();
        assert_eq!(array.extract_element(&Value::int(2)).unwrap(), Value::int(0));
        assert!(array.is_constant());

        let refs = ArrayValue::allocate(PrimitiveType::Reference, &Value::int(1)).unwrap();
        assert_eq!(
            refs.extract_element(&Value::int(0)).unwrap(),
            Value::Const(ConstValue::Null)
        );
        assert!(ArrayValue::allocate(PrimitiveType::Int, &Value::int(-1)).is_none());
    }

    #[test]
    fn test_insert_is_functional() {
        let array = ArrayValue::allocate(PrimitiveType::Int, &Value::int(3)).unwrap();
        let written = array.insert_element(&Value::int(0), Value::int(1)).unwrap();
        assert_eq!(written.extract_element(&Value::int(0)).unwrap(), Value::int(1));
        assert_eq!(array.extract_element(&Value::int(0)).unwrap(), Value::int(0));
        assert_eq!(written.extract_element(&Value::int(2)).unwrap(), Value::int(0));
    }

    #[test]
    fn test_out_of_bounds_is_error() {
        let array = ArrayValue::allocate(PrimitiveType::Int, &Value::int(3)).unwrap();
        assert!(matches!(
            array.extract_element(&Value::int(3)),
            Err(Error::IndexOutOfBounds { index: 3, length: 3 })
        ));
        assert!(array.insert_element(&Value::int(-1), Value::int(0)).is_err());
    }

    #[test]
    fn test_unknown_index() {
        let array = ArrayValue::allocate(PrimitiveType::Int, &Value::int(3)).unwrap();
        let unknown = Value::Unknown(ValueType::Int);
        assert_eq!(
            array.extract_element(&unknown).unwrap(),
            Value::Unknown(ValueType::Int)
        );
        let smeared = array.insert_element(&unknown, Value::int(9)).unwrap();
        assert_eq!(smeared.length, Value::int(3));
        assert!(!smeared.is_constant());
        assert_eq!(
            smeared.extract_element(&Value::int(0)).unwrap(),
            Value::Unknown(ValueType::Int)
        );
    }

    #[test]
    fn test_self_referential_array() {
        let site = ObjectRef(7);
        let array = ArrayValue::allocate(PrimitiveType::Reference, &Value::int(1)).unwrap();
        let array = array
            .insert_element(&Value::int(0), Value::Ref(site))
            .unwrap();
        let heap = Heap::new().with_object(site, HeapObject::Array(array));

        let stored = heap
            .array(site)
            .unwrap()
            .extract_element(&Value::int(0))
            .unwrap();
        assert_eq!(stored, Value::Ref(site));
        assert!(heap.array(site).unwrap().is_constant());
    }

    #[test]
    fn test_object_fields() {
        let field = Rc::new(FieldRef {
            class: "Point".to_string(),
            name: "x".to_string(),
            field_type: FieldType::Primitive(PrimitiveType::Int),
        });
        let object = ObjectValue::allocate("Point");
        assert_eq!(object.field(&field), Value::int(0));
        let written = object.with_field(field.clone(), Value::int(4));
        assert_eq!(written.field(&field), Value::int(4));
        assert_eq!(object.written_fields().count(), 0);
        assert_eq!(
            written.written_fields().collect::<Vec<_>>(),
            vec![(&field, &Value::int(4))]
        );
        assert_eq!(object.field(&field), Value::int(0));
    }

    #[test]
    fn test_heap_versions_are_independent() {
        let a = ObjectRef(1);
        let base = Heap::new();
        let next = base.allocate_object(a, "A");
        assert!(base.is_empty());
        assert_eq!(next.len(), 1);
        assert!(next.object(a).is_some());
        assert!(next.array(a).is_none());
    }

    #[test]
    fn test_allocate_array_rejects_negative_length() {
        let heap = Heap::new();
        assert!(heap
            .allocate_array(ObjectRef(1), PrimitiveType::Int, &Value::int(-2))
            .is_none());
        let heap = heap
            .allocate_array(ObjectRef(1), PrimitiveType::Int, &Value::int(2))
            .unwrap();
        assert_eq!(heap.array(ObjectRef(1)).unwrap().length, Value::int(2));
    }
}

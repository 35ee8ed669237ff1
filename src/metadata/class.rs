//! Classes and the provider interface used to load them on demand.

use std::{collections::HashMap, rc::Rc};

use crate::{
    metadata::{
        constpool::ConstantPool,
        method::{MethodAccessFlags, MethodInfo},
    },
    Result,
};

/// A loaded class: its constant pool and methods.
#[derive(Debug, Clone)]
pub struct ClassFile {
    /// Internal name (`java/lang/Object`)
    pub name: String,
    /// Internal name of the superclass
    pub super_class: Option<String>,
    /// The class's constant pool, shared by all of its methods
    pub constant_pool: Rc<ConstantPool>,
    /// Declared methods
    pub methods: Vec<Rc<MethodInfo>>,
}

impl ClassFile {
    /// Looks up a declared method by name and descriptor.
    #[must_use]
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&Rc<MethodInfo>> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }
}

/// Source of classes for a compilation run.
///
/// Returning `Ok(None)` means the class does not exist; `Err` means it exists but could not
/// be read.
pub trait ClassProvider {
    /// Loads the class with internal name `name`.
    ///
    /// # Errors
    /// Implementations return an error when the class exists but cannot be decoded.
    fn load_class(&self, name: &str) -> Result<Option<Rc<ClassFile>>>;
}

/// An in-memory [`ClassProvider`].
#[derive(Debug, Clone, Default)]
pub struct ClassPath {
    classes: HashMap<String, Rc<ClassFile>>,
}

impl ClassPath {
    /// Creates an empty class path.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a class, replacing any previous class of the same name.
    pub fn add(&mut self, class: ClassFile) {
        self.classes.insert(class.name.clone(), Rc::new(class));
    }

    /// Builder form of [`ClassPath::add`].
    #[must_use]
    pub fn with(mut self, class: ClassFile) -> Self {
        self.add(class);
        self
    }
}

impl ClassProvider for ClassPath {
    fn load_class(&self, name: &str) -> Result<Option<Rc<ClassFile>>> {
        Ok(self.classes.get(name).cloned())
    }
}

/// Incrementally assembles a [`ClassFile`].
///
/// The pool is filled while method bodies are written, so references can be created before
/// the methods they point to exist.
///
/// # Examples
///
/// ```rust
/// use portflow::{assembly::BytecodeAssembler, metadata::{ClassBuilder, MethodAccessFlags}};
///
/// let mut class = ClassBuilder::new("Test");
/// let zero = class.pool().add_method_ref("Test", "zero", "()I");
/// let mut asm = BytecodeAssembler::new();
/// asm.invokestatic(zero)?.ireturn()?;
/// class.method("main", "()I", MethodAccessFlags::STATIC, asm.finish()?);
///
/// let mut asm = BytecodeAssembler::new();
/// asm.iconst(0)?.ireturn()?;
/// class.method("zero", "()I", MethodAccessFlags::STATIC, asm.finish()?);
/// let class = class.build();
/// assert!(class.method("zero", "()I").is_some());
/// # Ok::<(), portflow::Error>(())
/// ```
#[derive(Debug)]
pub struct ClassBuilder {
    name: String,
    super_class: Option<String>,
    pool: ConstantPool,
    methods: Vec<Rc<MethodInfo>>,
}

impl ClassBuilder {
    /// Starts a class extending `java/lang/Object`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        ClassBuilder {
            name: name.to_string(),
            super_class: Some("java/lang/Object".to_string()),
            pool: ConstantPool::new(),
            methods: Vec::new(),
        }
    }

    /// Overrides the superclass; `None` is only valid for `java/lang/Object`.
    #[must_use]
    pub fn extends(mut self, super_class: Option<&str>) -> Self {
        self.super_class = super_class.map(str::to_string);
        self
    }

    /// Mutable access to the class's constant pool.
    pub fn pool(&mut self) -> &mut ConstantPool {
        &mut self.pool
    }

    /// Adds a method with bytecode.
    pub fn method(
        &mut self,
        name: &str,
        descriptor: &str,
        access: MethodAccessFlags,
        code: Vec<u8>,
    ) -> &mut Self {
        self.methods
            .push(Rc::new(MethodInfo::new(name, descriptor, access, code)));
        self
    }

    /// Adds a method without a body.
    pub fn native_method(
        &mut self,
        name: &str,
        descriptor: &str,
        access: MethodAccessFlags,
    ) -> &mut Self {
        self.methods
            .push(Rc::new(MethodInfo::native(name, descriptor, access)));
        self
    }

    /// Finishes the class.
    #[must_use]
    pub fn build(self) -> ClassFile {
        ClassFile {
            name: self.name,
            super_class: self.super_class,
            constant_pool: Rc::new(self.pool),
            methods: self.methods,
        }
    }
}

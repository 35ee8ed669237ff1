//! Whole-program state: the shared graph and every method loaded into it.
//!
//! A [`Program`] owns one [`Graph`] holding the blocks of all loaded methods, and a table of
//! [`Method`]s indexed by [`MethodId`]. Methods are loaded lazily from a [`ClassProvider`]
//! and built on first use. A method whose bytecode cannot be translated is marked
//! [`MethodState::Unparseable`] once; later requests report the memoized failure.

use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    fmt,
    rc::Rc,
};

use crate::{
    analysis::{Evaluation, GraphEvaluator, Value},
    builder::MethodBuilder,
    compiler::{blocks, inline_constant_calls, CompilerConfig, EventKind, EventLog},
    graph::{BlockId, Graph, MethodId, NodeId, Operation},
    metadata::{ClassFile, ClassProvider, ConstantPool, MethodDescriptor, MethodInfo},
    Error, Result,
};

/// Build state of a [`Method`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodState {
    /// Registered but not yet built.
    Pending,
    /// Built and prepared; `entry` is the init block.
    Built {
        /// The method's init block
        entry: BlockId,
    },
    /// The method has no bytecode (native or abstract).
    Native,
    /// Building failed with a format error, rendered in the payload.
    Unparseable(String),
}

/// A method registered with a [`Program`].
#[derive(Debug, Clone)]
pub struct Method {
    class: String,
    name: String,
    descriptor: String,
    info: Rc<MethodInfo>,
    pool: Rc<ConstantPool>,
    signature: MethodDescriptor,
    state: MethodState,
    callers: Vec<NodeId>,
}

impl Method {
    /// Internal name of the declaring class.
    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Parsed descriptor.
    #[must_use]
    pub fn signature(&self) -> &MethodDescriptor {
        &self.signature
    }

    /// The method as declared in its class file.
    #[must_use]
    pub fn info(&self) -> &MethodInfo {
        &self.info
    }

    /// Current build state.
    #[must_use]
    pub fn state(&self) -> &MethodState {
        &self.state
    }

    /// The init block, once built.
    #[must_use]
    pub fn entry(&self) -> Option<BlockId> {
        match self.state {
            MethodState::Built { entry } => Some(entry),
            _ => None,
        }
    }

    /// Returns `true` for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.info.is_static()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.class, self.name, self.descriptor)
    }
}

type MethodKey = (String, String, String);

/// All methods reachable from some entry point, sharing one graph.
///
/// # Examples
///
/// ```rust
/// use portflow::{
///     assembly::BytecodeAssembler,
///     compiler::Program,
///     metadata::{ClassBuilder, ClassPath, MethodAccessFlags},
/// };
///
/// let mut class = ClassBuilder::new("Test");
/// let mut asm = BytecodeAssembler::new();
/// asm.iconst(6)?.iconst(7)?.imul()?.ireturn()?;
/// class.method("answer", "()I", MethodAccessFlags::STATIC, asm.finish()?);
///
/// let mut program = Program::new(ClassPath::new().with(class.build()));
/// let answer = program.method_id("Test", "answer", "()I")?;
/// program.optimize(answer)?;
///
/// let evaluation = program.evaluate(answer, &[])?;
/// assert_eq!(evaluation.return_value(program.graph()).as_int(), Some(42));
/// # Ok::<(), portflow::Error>(())
/// ```
pub struct Program<P: ClassProvider> {
    provider: P,
    pub(super) config: CompilerConfig,
    pub(super) graph: Graph,
    pub(super) events: EventLog,
    methods: Vec<Method>,
    index: HashMap<MethodKey, MethodId>,
    classes: HashMap<String, Rc<ClassFile>>,
}

impl<P: ClassProvider> Program<P> {
    /// Creates an empty program with the default configuration.
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, CompilerConfig::default())
    }

    /// Creates an empty program.
    #[must_use]
    pub fn with_config(provider: P, config: CompilerConfig) -> Self {
        Program {
            provider,
            config,
            graph: Graph::new(),
            events: EventLog::new(),
            methods: Vec::new(),
            index: HashMap::new(),
            classes: HashMap::new(),
        }
    }

    /// The shared graph.
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Everything the passes recorded so far.
    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// The method behind `method`.
    ///
    /// # Panics
    /// Panics if `method` was not handed out by this program.
    #[must_use]
    pub fn method(&self, method: MethodId) -> &Method {
        &self.methods[method.index()]
    }

    /// Every registered method with its id.
    pub fn methods(&self) -> impl Iterator<Item = (MethodId, &Method)> + '_ {
        self.methods
            .iter()
            .enumerate()
            .map(|(index, method)| (MethodId::new(index), method))
    }

    // ---- resolution ----

    fn class(&mut self, name: &str) -> Result<Rc<ClassFile>> {
        if let Some(found) = self.classes.get(name) {
            return Ok(found.clone());
        }
        let Some(loaded) = self.provider.load_class(name)? else {
            return Err(Error::ClassNotFound(name.to_string()));
        };
        self.classes.insert(name.to_string(), loaded.clone());
        Ok(loaded)
    }

    /// Resolves a method, registering it on first use.
    ///
    /// The lookup starts at `class` and walks up the superclass chain, so a reference
    /// through a subclass resolves to the inherited declaration.
    ///
    /// # Errors
    /// Returns [`Error::ClassNotFound`] if a class on the chain cannot be loaded,
    /// [`Error::MethodNotFound`] if no class on the chain declares the method, and
    /// [`Error::Malformed`] for an unparseable descriptor.
    pub fn method_id(&mut self, class: &str, name: &str, descriptor: &str) -> Result<MethodId> {
        let key = (class.to_string(), name.to_string(), descriptor.to_string());
        if let Some(id) = self.index.get(&key) {
            return Ok(*id);
        }

        let mut current = class.to_string();
        let (declaring, info) = loop {
            let found = self.class(&current)?;
            if let Some(info) = found.method(name, descriptor) {
                break (found.clone(), info.clone());
            }
            match &found.super_class {
                Some(super_class) => current.clone_from(super_class),
                None => {
                    return Err(Error::MethodNotFound {
                        class: class.to_string(),
                        name: name.to_string(),
                        descriptor: descriptor.to_string(),
                    })
                }
            }
        };

        let declared = (
            declaring.name.clone(),
            name.to_string(),
            descriptor.to_string(),
        );
        let id = match self.index.get(&declared) {
            Some(id) => *id,
            None => {
                let signature = MethodDescriptor::parse(descriptor)?;
                let state = if info.code.is_some() {
                    MethodState::Pending
                } else {
                    MethodState::Native
                };
                let id = MethodId::new(self.methods.len());
                self.methods.push(Method {
                    class: declaring.name.clone(),
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                    info,
                    pool: declaring.constant_pool.clone(),
                    signature,
                    state,
                    callers: Vec::new(),
                });
                self.index.insert(declared, id);
                log::trace!("registered {id} as {}", self.methods[id.index()]);
                id
            }
        };
        self.index.insert(key, id);
        Ok(id)
    }

    // ---- building ----

    /// The init block of `method`, building the method on first request.
    ///
    /// Returns `None` for methods without bytecode.
    ///
    /// # Errors
    /// Returns the format error that made the build fail, and [`Error::Unparseable`] on
    /// every later request for the same method. Invariant violations are returned as-is.
    pub fn graph_of(&mut self, method: MethodId) -> Result<Option<BlockId>> {
        let found = &self.methods[method.index()];
        match &found.state {
            MethodState::Built { entry } => return Ok(Some(*entry)),
            MethodState::Native => return Ok(None),
            MethodState::Unparseable(reason) => {
                return Err(Error::Unparseable {
                    method: found.to_string(),
                    reason: reason.clone(),
                })
            }
            MethodState::Pending => {}
        }

        let (info, pool, signature) = (found.info.clone(), found.pool.clone(), found.signature.clone());
        let mark = self.graph.block_ids().last().map_or(0, |block| block.index() + 1);
        let built = MethodBuilder::build(&mut self.graph, method, &info, &pool, &signature)
            .and_then(|entry| blocks::prepare(&mut self.graph, entry).map(|()| entry));

        match built {
            Ok(entry) => {
                self.methods[method.index()].state = MethodState::Built { entry };
                self.events
                    .record(EventKind::MethodParsed)
                    .method(method)
                    .block(entry)
                    .message(format!("{} blocks", self.graph.method_blocks(entry).len()));
                Ok(Some(entry))
            }
            Err(error) => {
                self.discard_blocks_from(mark);
                if error.is_format() {
                    let found = &mut self.methods[method.index()];
                    log::warn!("{found} is unparseable: {error}");
                    found.state = MethodState::Unparseable(error.to_string());
                    let message = format!("{found}: {error}");
                    self.events
                        .record(EventKind::MethodUnparseable)
                        .method(method)
                        .message(message);
                }
                Err(error)
            }
        }
    }

    fn discard_blocks_from(&mut self, mark: usize) {
        let abandoned: Vec<BlockId> = self
            .graph
            .block_ids()
            .filter(|block| block.index() >= mark)
            .collect();
        for block in abandoned {
            self.graph.remove_block(block);
        }
    }

    /// Builds `entry` and every method it may call, transitively.
    ///
    /// Call sites are resolved as they are found: each `Invoke` gets its target set and is
    /// recorded as a caller of the target. Calls that cannot be resolved and callees that
    /// cannot be built are logged and left alone. Returns the loaded methods in discovery
    /// order, `entry` first.
    ///
    /// # Errors
    /// Returns an error if `entry` itself cannot be built, or if any build violates a
    /// graph invariant.
    pub fn load_reachable(&mut self, entry: MethodId) -> Result<Vec<MethodId>> {
        let mut order = Vec::new();
        let mut seen = BTreeSet::from([entry]);
        let mut work = VecDeque::from([entry]);

        while let Some(method) = work.pop_front() {
            let block = match self.graph_of(method) {
                Ok(block) => block,
                Err(error) if method != entry && is_skippable(&error) => {
                    self.events
                        .warn(format!("{}: {error}", self.methods[method.index()]));
                    continue;
                }
                Err(error) => return Err(error),
            };
            order.push(method);
            let Some(block) = block else {
                continue;
            };

            for node in self.graph.method_nodes(block) {
                let Operation::Invoke { method: reference, target, .. } = self.graph.op(node)
                else {
                    continue;
                };
                let (reference, target) = (reference.clone(), *target);
                let callee = match target {
                    Some(callee) => callee,
                    None => {
                        match self.method_id(&reference.class, &reference.name, &reference.descriptor) {
                            Ok(callee) => {
                                self.graph.resolve_call(node, callee);
                                callee
                            }
                            Err(error) => {
                                log::warn!("cannot resolve {reference} called by {node}: {error}");
                                self.events
                                    .record(EventKind::Warning)
                                    .method(method)
                                    .message(format!("unresolved call to {reference}: {error}"));
                                continue;
                            }
                        }
                    }
                };

                let callers = &mut self.methods[callee.index()].callers;
                if !callers.contains(&node) {
                    callers.push(node);
                }
                if seen.insert(callee) {
                    work.push_back(callee);
                }
            }
        }
        Ok(order)
    }

    /// Live call sites currently targeting `method`.
    #[must_use]
    pub fn callers(&self, method: MethodId) -> Vec<NodeId> {
        self.methods[method.index()]
            .callers
            .iter()
            .copied()
            .filter(|node| {
                self.graph.contains_node(*node)
                    && matches!(
                        self.graph.op(*node),
                        Operation::Invoke { target: Some(target), .. } if *target == method
                    )
            })
            .collect()
    }

    // ---- optimization ----

    /// Loads everything reachable from `entry` and simplifies it until nothing changes.
    ///
    /// Every loaded method is simplified on its own, then constant calls are inlined;
    /// the two alternate until a round changes nothing or the iteration limit is reached.
    /// Returns the number of transformations recorded.
    ///
    /// # Errors
    /// Returns an error if `entry` cannot be built or a pass finds the graph in an
    /// inconsistent state.
    pub fn optimize(&mut self, entry: MethodId) -> Result<usize> {
        let before = self.events.transformation_count();
        let reachable = self.load_reachable(entry)?;

        for round in 1..=self.config.max_iterations {
            let mut changed = false;
            for method in &reachable {
                let Some(block) = self.methods[method.index()].entry() else {
                    continue;
                };
                changed |= blocks::simplify_method(&mut self.graph, block, &self.config, &mut self.events)?;
            }
            if self.config.enable_inlining {
                changed |= inline_constant_calls(self, &reachable)? > 0;
            }
            if !changed {
                log::debug!("program stable after {round} rounds");
                break;
            }
        }

        let count = self.events.transformation_count() - before;
        log::info!(
            "optimized {} methods from {}: {count} transformations",
            reachable.len(),
            self.methods[entry.index()]
        );
        log::debug!("events so far:\n{}", self.events.summary());
        Ok(count)
    }

    /// Evaluates `method` with the given argument values, receiver first.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] for methods without bytecode or a wrong number of
    /// arguments, and any error building or evaluating the method.
    pub fn evaluate(&mut self, method: MethodId, arguments: &[Value]) -> Result<Evaluation> {
        let Some(entry) = self.graph_of(method)? else {
            return Err(Error::NotSupported(format!(
                "{} has no bytecode",
                self.methods[method.index()]
            )));
        };
        let found = &self.methods[method.index()];
        let slots = found.signature.argument_local_slots(found.is_static());
        if slots.len() != arguments.len() {
            return Err(Error::NotSupported(format!(
                "{found} takes {} arguments, {} given",
                slots.len(),
                arguments.len()
            )));
        }

        let evaluator = slots.into_iter().zip(arguments).fold(
            GraphEvaluator::new(&self.graph, entry).with_max_rounds(self.config.max_evaluation_rounds),
            |evaluator, (slot, value)| evaluator.with_argument(slot, value.clone()),
        );
        evaluator.run()
    }
}

fn is_skippable(error: &Error) -> bool {
    error.is_format() || matches!(error, Error::Unparseable { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::BytecodeAssembler,
        metadata::{ClassBuilder, ClassPath, MethodAccessFlags},
    };

    fn inheriting() -> Result<ClassPath> {
        let mut base = ClassBuilder::new("Base");
        let mut asm = BytecodeAssembler::new();
        asm.iconst(1)?.ireturn()?;
        base.method("value", "()I", MethodAccessFlags::STATIC, asm.finish()?);

        let derived = ClassBuilder::new("Derived").extends(Some("Base"));
        Ok(ClassPath::new().with(base.build()).with(derived.build()))
    }

    #[test]
    fn test_resolution_walks_superclasses() -> Result<()> {
        let mut program = Program::new(inheriting()?);
        let inherited = program.method_id("Derived", "value", "()I")?;
        let declared = program.method_id("Base", "value", "()I")?;
        assert_eq!(inherited, declared);
        assert_eq!(program.method(declared).class(), "Base");
        assert_eq!(program.methods().count(), 1);

        assert!(matches!(
            program.method_id("Missing", "value", "()I"),
            Err(Error::ClassNotFound(name)) if name == "Missing"
        ));
        // Base extends java/lang/Object, which the class path does not contain
        assert!(matches!(
            program.method_id("Base", "other", "()I"),
            Err(Error::ClassNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn test_method_not_found_at_root() -> Result<()> {
        let root = ClassBuilder::new("Root").extends(None);
        let mut program = Program::new(ClassPath::new().with(root.build()));
        assert!(matches!(
            program.method_id("Root", "run", "()V"),
            Err(Error::MethodNotFound { name, .. }) if name == "run"
        ));
        Ok(())
    }

    #[test]
    fn test_unparseable_is_memoized() -> Result<()> {
        let mut class = ClassBuilder::new("Test");
        let mut asm = BytecodeAssembler::new();
        asm.iload(1)?.ireturn()?;
        class.method("broken", "()I", MethodAccessFlags::STATIC, asm.finish()?);

        let mut program = Program::new(ClassPath::new().with(class.build()));
        let broken = program.method_id("Test", "broken", "()I")?;

        assert!(matches!(program.graph_of(broken), Err(Error::Format { .. })));
        assert!(matches!(program.graph_of(broken), Err(Error::Unparseable { .. })));
        assert!(matches!(
            program.method(broken).state(),
            MethodState::Unparseable(_)
        ));
        assert_eq!(program.events().count_kind(EventKind::MethodUnparseable), 1);
        assert_eq!(program.graph().block_ids().count(), 0);
        Ok(())
    }

    #[test]
    fn test_load_reachable_resolves_calls() -> Result<()> {
        let mut class = ClassBuilder::new("Test");
        let zero = class.pool().add_method_ref("Test", "zero", "()I");
        let missing = class.pool().add_method_ref("Gone", "value", "()I");
        let mut asm = BytecodeAssembler::new();
        asm.invokestatic(zero)?
            .invokestatic(zero)?
            .iadd()?
            .invokestatic(missing)?
            .iadd()?
            .ireturn()?;
        class.method("main", "()I", MethodAccessFlags::STATIC, asm.finish()?);
        let mut asm = BytecodeAssembler::new();
        asm.iconst(0)?.ireturn()?;
        class.method("zero", "()I", MethodAccessFlags::STATIC, asm.finish()?);

        let mut program = Program::new(ClassPath::new().with(class.build()));
        let main = program.method_id("Test", "main", "()I")?;
        let loaded = program.load_reachable(main)?;
        let zero = program.method_id("Test", "zero", "()I")?;

        assert_eq!(loaded, vec![main, zero]);
        assert_eq!(program.callers(zero).len(), 2);
        assert_eq!(program.events().count_kind(EventKind::Warning), 1);
        assert_eq!(program.events().count_kind(EventKind::MethodParsed), 2);
        program.graph().verify_links()
    }

    #[test]
    fn test_native_methods_have_no_graph() -> Result<()> {
        let mut class = ClassBuilder::new("Test");
        class.native_method("now", "()J", MethodAccessFlags::STATIC | MethodAccessFlags::NATIVE);

        let mut program = Program::new(ClassPath::new().with(class.build()));
        let now = program.method_id("Test", "now", "()J")?;
        assert_eq!(program.graph_of(now)?, None);
        assert_eq!(program.method(now).state(), &MethodState::Native);
        assert!(matches!(
            program.evaluate(now, &[]),
            Err(Error::NotSupported(_))
        ));
        Ok(())
    }

    #[test]
    fn test_optimize_records_events() -> Result<()> {
        let mut class = ClassBuilder::new("Test");
        let zero = class.pool().add_method_ref("Test", "zero", "()I");
        let mut asm = BytecodeAssembler::new();
        asm.invokestatic(zero)?.ireturn()?;
        class.method("main", "()I", MethodAccessFlags::STATIC, asm.finish()?);
        let mut asm = BytecodeAssembler::new();
        asm.iconst(0)?.ireturn()?;
        class.method("zero", "()I", MethodAccessFlags::STATIC, asm.finish()?);

        let mut program = Program::new(ClassPath::new().with(class.build()));
        let main = program.method_id("Test", "main", "()I")?;
        assert!(program.optimize(main)? > 0);

        let summary = program.events().summary();
        assert!(summary.contains("call inlined: 1"));
        assert!(summary.contains("method parsed: 2"));
        Ok(())
    }

    #[test]
    fn test_evaluate_with_arguments() -> Result<()> {
        let mut class = ClassBuilder::new("Test");
        let mut asm = BytecodeAssembler::new();
        asm.iload(0)?.iconst(1)?.iadd()?.ireturn()?;
        class.method("inc", "(I)I", MethodAccessFlags::STATIC, asm.finish()?);

        let mut program = Program::new(ClassPath::new().with(class.build()));
        let inc = program.method_id("Test", "inc", "(I)I")?;
        let evaluation = program.evaluate(inc, &[Value::int(41)])?;
        assert_eq!(evaluation.return_value(program.graph()), Value::int(42));

        assert!(matches!(
            program.evaluate(inc, &[]),
            Err(Error::NotSupported(_))
        ));
        Ok(())
    }
}

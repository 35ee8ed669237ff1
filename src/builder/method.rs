//! Translation of a whole method body into blocks.

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    rc::Rc,
};

use crate::{
    analysis::ConstValue,
    builder::BlockBuilder,
    disassembler::{decode_method, Instruction, InstructionKind},
    graph::{BinaryOp, BlockId, Graph, InvokeKind, JumpTable, MethodId, Operation, PortId},
    metadata::{ConstantPool, FieldType, Literal, MethodDescriptor, MethodInfo, PrimitiveType},
    Result,
};

/// Builds the block graph of one method.
///
/// The instruction stream is cut into blocks at every leader: offset 0, every branch target
/// and every instruction following a terminator. Blocks are built in discovery order from
/// offset 0, so the stack shape a block is entered with is known from the first predecessor
/// that reached it. Code that cannot be reached from offset 0 is dropped.
///
/// The result is the method's init block: an [`Operation::MethodEntry`] whose outputs are
/// the environment and one `Local(slot)` per argument, jumping to the block at offset 0.
///
/// # Examples
///
/// ```rust
/// use portflow::assembly::BytecodeAssembler;
/// use portflow::builder::MethodBuilder;
/// use portflow::graph::{Graph, MethodId};
/// use portflow::metadata::{ConstantPool, MethodAccessFlags, MethodDescriptor, MethodInfo};
///
/// let mut asm = BytecodeAssembler::new();
/// asm.iload(0)?.iconst(1)?.iadd()?.ireturn()?;
/// let info = MethodInfo::new("inc", "(I)I", MethodAccessFlags::STATIC, asm.finish()?);
/// let descriptor = MethodDescriptor::parse(&info.descriptor)?;
///
/// let mut graph = Graph::new();
/// let pool = ConstantPool::new();
/// let init = MethodBuilder::build(&mut graph, MethodId::new(0), &info, &pool, &descriptor)?;
/// assert_eq!(graph.method_blocks(init).len(), 2);
/// # Ok::<(), portflow::Error>(())
/// ```
pub struct MethodBuilder<'a> {
    graph: &'a mut Graph,
    pool: &'a ConstantPool,
    code: &'a [u8],
    instructions: Vec<Instruction>,
    index: BTreeMap<usize, usize>,
    blocks: BTreeMap<usize, BlockId>,
    shapes: BTreeMap<usize, Vec<bool>>,
    built: BTreeSet<usize>,
    work: VecDeque<usize>,
}

impl<'a> MethodBuilder<'a> {
    /// Builds `info` into `graph` and returns its init block.
    ///
    /// # Errors
    /// Returns [`crate::Error::Format`] for code that cannot be decoded or uses an
    /// unsupported instruction or constant, and [`crate::Error::NotSupported`] for a method
    /// without code.
    pub fn build(
        graph: &'a mut Graph,
        method: MethodId,
        info: &'a MethodInfo,
        pool: &'a ConstantPool,
        descriptor: &MethodDescriptor,
    ) -> Result<BlockId> {
        let Some(code) = info.code.as_ref() else {
            return Err(crate::Error::NotSupported(format!(
                "{}{} has no code",
                info.name, info.descriptor
            )));
        };
        let instructions = decode_method(&code.bytes)?;
        let index: BTreeMap<usize, usize> = instructions
            .iter()
            .enumerate()
            .map(|(position, instruction)| (instruction.offset, position))
            .collect();

        let mut leaders = BTreeSet::from([0]);
        for instruction in &instructions {
            leaders.extend(instruction.branch_targets());
            if instruction.flow().ends_block() {
                leaders.insert(instruction.next_offset());
            }
        }
        let blocks = leaders
            .into_iter()
            .filter(|offset| index.contains_key(offset))
            .map(|offset| (offset, graph.new_block(Operation::BlockEntry, Some(offset))))
            .collect();

        let mut builder = MethodBuilder {
            graph,
            pool,
            code: &code.bytes,
            instructions,
            index,
            blocks,
            shapes: BTreeMap::from([(0, Vec::new())]),
            built: BTreeSet::new(),
            work: VecDeque::from([0]),
        };
        let init = builder.init_block(descriptor, info.is_static())?;
        while let Some(offset) = builder.work.pop_front() {
            builder.build_block(offset)?;
        }
        let unreachable = builder.drop_unreachable();

        log::debug!(
            "built {method} ({}{}): {} blocks from {} instructions, {unreachable} unreachable",
            info.name,
            info.descriptor,
            builder.built.len(),
            builder.instructions.len()
        );
        Ok(init)
    }

    fn init_block(&mut self, descriptor: &MethodDescriptor, is_static: bool) -> Result<BlockId> {
        let mut locals = Vec::new();
        for kind in descriptor.argument_kinds(is_static) {
            for _ in 0..kind.slots() {
                locals.push(kind.stack_kind());
            }
        }
        let init = self.graph.new_block(
            Operation::MethodEntry {
                locals: Rc::from(locals),
            },
            None,
        );
        let entry = self.graph.block(init).entry();
        for slot in descriptor.argument_local_slots(is_static) {
            self.graph.add_output(entry, PortId::Local(slot));
        }

        let Some(first) = self.blocks.get(&0).copied() else {
            return Err(format_error!(0, self.code, "method has no instruction at offset 0"));
        };
        BlockBuilder::new(self.graph, init, Vec::new()).terminate(Operation::Jump, &[], vec![first]);
        Ok(init)
    }

    fn build_block(&mut self, offset: usize) -> Result<()> {
        if !self.built.insert(offset) {
            return Ok(());
        }
        let (Some(&block), Some(&start)) = (self.blocks.get(&offset), self.index.get(&offset))
        else {
            return Err(format_error!(
                offset,
                opcode_at(self.code, offset),
                "no block starts at offset {}",
                offset
            ));
        };
        let shape = self.shapes.get(&offset).cloned().unwrap_or_default();

        let mut translator = Translator {
            builder: BlockBuilder::new(self.graph, block, shape),
            pool: self.pool,
            code: self.code,
            blocks: &self.blocks,
        };
        let mut successors = None;
        for instruction in &self.instructions[start..] {
            if instruction.offset != offset && self.blocks.contains_key(&instruction.offset) {
                translator.jump(instruction.offset)?;
                successors = Some(vec![instruction.offset]);
                break;
            }
            if let Some(targets) = translator.instruction(instruction)? {
                successors = Some(targets);
                break;
            }
        }
        let Some(successors) = successors else {
            return Err(format_error!(
                offset,
                opcode_at(self.code, offset),
                "block falls off the end of the code"
            ));
        };

        let outgoing = translator.builder.outgoing();
        for successor in successors {
            if !self.shapes.contains_key(&successor) {
                self.shapes.insert(successor, outgoing.clone());
                self.work.push_back(successor);
            }
        }
        Ok(())
    }

    /// Removes blocks created for leaders that no built block jumps to.
    fn drop_unreachable(&mut self) -> usize {
        let mut removed = 0;
        for (offset, block) in &self.blocks {
            if !self.built.contains(offset) {
                self.graph.remove_block(*block);
                removed += 1;
            }
        }
        removed
    }
}

/// Translates instructions into nodes of one block.
struct Translator<'b, 'g> {
    builder: BlockBuilder<'g>,
    pool: &'b ConstantPool,
    code: &'b [u8],
    blocks: &'b BTreeMap<usize, BlockId>,
}

impl Translator<'_, '_> {
    fn block_at(&self, offset: usize) -> Result<BlockId> {
        self.blocks
            .get(&offset)
            .copied()
            .ok_or_else(|| {
                format_error!(
                    offset,
                    opcode_at(self.code, offset),
                    "jump target {} is not a block",
                    offset
                )
            })
    }

    fn jump(&mut self, target: usize) -> Result<()> {
        let block = self.block_at(target)?;
        self.builder.terminate(Operation::Jump, &[], vec![block]);
        Ok(())
    }

    /// Adds the nodes of `instruction`. Returns the successor offsets once the block is
    /// terminated.
    fn instruction(&mut self, instruction: &Instruction) -> Result<Option<Vec<usize>>> {
        let b = &mut self.builder;
        match &instruction.kind {
            InstructionKind::Nop => {}
            InstructionKind::Constant(value) => {
                let wide = matches!(value, ConstValue::Long(_) | ConstValue::Double(_));
                let value = b.constant(value.clone());
                b.push(value, wide);
            }
            InstructionKind::Ldc(index) => {
                let literal = self
                    .pool
                    .literal(*index)
                    .map_err(|error| self.error(instruction, &error.to_string()))?;
                let (value, wide) = match literal {
                    Literal::Integer(v) => (ConstValue::Int(v), false),
                    Literal::Float(v) => (ConstValue::Float(v), false),
                    Literal::Long(v) => (ConstValue::Long(v), true),
                    Literal::Double(v) => (ConstValue::Double(v), true),
                    Literal::String(s) => (ConstValue::String(Rc::from(s.as_str())), false),
                };
                let b = &mut self.builder;
                let value = b.constant(value);
                b.push(value, wide);
            }

            InstructionKind::Load(kind, slot) => {
                let value = b.load_local(*slot);
                b.push(value, kind.is_wide());
            }
            InstructionKind::Store(_, slot) => {
                let value = b.pop();
                b.store_local(*slot, value);
            }
            InstructionKind::Iinc { slot, delta } => {
                let current = b.load_local(*slot);
                let delta = b.constant(ConstValue::Int(*delta));
                let sum = b.pure(
                    Operation::Binary {
                        ty: PrimitiveType::Int,
                        op: BinaryOp::Add,
                    },
                    &[current, delta],
                );
                b.store_local(*slot, sum);
            }

            InstructionKind::ArrayLoad(kind) => {
                let args = b.pop_values(2);
                let value = b.reader(Operation::LoadElement(*kind), &args);
                b.push(value, kind.is_wide());
            }
            InstructionKind::ArrayStore(kind) => {
                let args = b.pop_values(3);
                b.effect(Operation::StoreElement(*kind), &args, false);
            }
            InstructionKind::ArrayLength => {
                let array = b.pop();
                let length = b.reader(Operation::ArrayLength, &[array]);
                b.push(length, false);
            }
            InstructionKind::NewArray(element) => {
                let length = b.pop();
                let array = b.effect(
                    Operation::NewArray(FieldType::Primitive(*element)),
                    &[length],
                    true,
                );
                push_result(b, array, false);
            }
            InstructionKind::ANewArray(index) => {
                let class = self.class(instruction, *index)?;
                let element = if class.starts_with('[') {
                    FieldType::parse(&class).map_err(|e| self.error(instruction, &e.to_string()))?
                } else {
                    FieldType::Object(class)
                };
                let b = &mut self.builder;
                let length = b.pop();
                let array = b.effect(Operation::NewArray(element), &[length], true);
                push_result(b, array, false);
            }

            InstructionKind::Pop => {
                b.pop_slots(1);
            }
            InstructionKind::Pop2 => {
                b.pop_slots(2);
            }
            InstructionKind::Dup => {
                let top = b.pop_slots(1);
                b.push_entries(&top);
                b.push_entries(&top);
            }
            InstructionKind::DupX1 => {
                let top = b.pop_slots(1);
                let below = b.pop_slots(1);
                b.push_entries(&top);
                b.push_entries(&below);
                b.push_entries(&top);
            }
            InstructionKind::DupX2 => {
                let top = b.pop_slots(1);
                let below = b.pop_slots(2);
                b.push_entries(&top);
                b.push_entries(&below);
                b.push_entries(&top);
            }
            InstructionKind::Dup2 => {
                let top = b.pop_slots(2);
                b.push_entries(&top);
                b.push_entries(&top);
            }
            InstructionKind::Dup2X1 => {
                let top = b.pop_slots(2);
                let below = b.pop_slots(1);
                b.push_entries(&top);
                b.push_entries(&below);
                b.push_entries(&top);
            }
            InstructionKind::Dup2X2 => {
                let top = b.pop_slots(2);
                let below = b.pop_slots(2);
                b.push_entries(&top);
                b.push_entries(&below);
                b.push_entries(&top);
            }
            InstructionKind::Swap => {
                let top = b.pop_entry();
                let below = b.pop_entry();
                b.push_entries(&[top, below]);
            }

            InstructionKind::Binary { ty, op } => {
                let args = b.pop_values(2);
                let value = b.pure(Operation::Binary { ty: *ty, op: *op }, &args);
                b.push(value, ty.is_wide());
            }
            InstructionKind::Negate(ty) => {
                let operand = b.pop();
                let value = b.pure(Operation::Negate(*ty), &[operand]);
                b.push(value, ty.is_wide());
            }
            InstructionKind::Shift { ty, op } => {
                let args = b.pop_values(2);
                let value = b.pure(Operation::Shift { ty: *ty, op: *op }, &args);
                b.push(value, ty.is_wide());
            }
            InstructionKind::Bitwise { ty, op } => {
                let args = b.pop_values(2);
                let value = b.pure(Operation::Bitwise { ty: *ty, op: *op }, &args);
                b.push(value, ty.is_wide());
            }
            InstructionKind::Convert { from, to } => {
                let operand = b.pop();
                let value = b.pure(
                    Operation::Convert {
                        from: *from,
                        to: *to,
                    },
                    &[operand],
                );
                b.push(value, to.is_wide());
            }
            InstructionKind::Compare(op) => {
                let args = b.pop_values(2);
                let value = b.pure(Operation::Compare(*op), &args);
                b.push(value, false);
            }

            InstructionKind::GetStatic(index) | InstructionKind::GetField(index) => {
                let is_static = matches!(instruction.kind, InstructionKind::GetStatic(_));
                let field = self
                    .pool
                    .field_ref(*index)
                    .map_err(|e| self.error(instruction, &e.to_string()))?;
                let wide = field.field_type.slots() == 2;
                let b = &mut self.builder;
                let args = b.pop_values(usize::from(!is_static));
                let value = b.reader(
                    Operation::LoadField {
                        field: Rc::new(field),
                        is_static,
                    },
                    &args,
                );
                b.push(value, wide);
            }
            InstructionKind::PutStatic(index) | InstructionKind::PutField(index) => {
                let is_static = matches!(instruction.kind, InstructionKind::PutStatic(_));
                let field = self
                    .pool
                    .field_ref(*index)
                    .map_err(|e| self.error(instruction, &e.to_string()))?;
                let b = &mut self.builder;
                let args = b.pop_values(if is_static { 1 } else { 2 });
                b.effect(
                    Operation::StoreField {
                        field: Rc::new(field),
                        is_static,
                    },
                    &args,
                    false,
                );
            }
            InstructionKind::Invoke { kind, index } => {
                let method = self
                    .pool
                    .method_ref(*index)
                    .map_err(|e| self.error(instruction, &e.to_string()))?;
                let count = method
                    .signature
                    .argument_count(*kind == InvokeKind::Static);
                let result = method.signature.return_kind();
                let b = &mut self.builder;
                let args = b.pop_values(count);
                let value = b.effect(
                    Operation::Invoke {
                        kind: *kind,
                        method: Rc::new(method),
                        target: None,
                    },
                    &args,
                    result.is_some(),
                );
                push_result(b, value, result.is_some_and(PrimitiveType::is_wide));
            }
            InstructionKind::New(index) => {
                let class = self.class(instruction, *index)?;
                let b = &mut self.builder;
                let object = b.effect(Operation::NewInstance(class), &[], true);
                push_result(b, object, false);
            }
            InstructionKind::CheckCast(index) | InstructionKind::InstanceOf(index) => {
                let class = self.class(instruction, *index)?;
                let op = if matches!(instruction.kind, InstructionKind::CheckCast(_)) {
                    Operation::CheckCast(class)
                } else {
                    Operation::InstanceOf(class)
                };
                let b = &mut self.builder;
                let operand = b.pop();
                let value = b.pure(op, &[operand]);
                b.push(value, false);
            }
            InstructionKind::MonitorEnter | InstructionKind::MonitorExit => {
                let op = if matches!(instruction.kind, InstructionKind::MonitorEnter) {
                    Operation::MonitorEnter
                } else {
                    Operation::MonitorExit
                };
                let monitor = b.pop();
                b.effect(op, &[monitor], false);
            }

            InstructionKind::Branch {
                kind,
                operand,
                unary,
                target,
            } => {
                let fallthrough = instruction.next_offset();
                let (taken, next) = (self.block_at(*target)?, self.block_at(fallthrough)?);
                let b = &mut self.builder;
                let right = if *unary { None } else { Some(b.pop()) };
                let left = b.pop();
                if taken == next {
                    b.terminate(Operation::Jump, &[], vec![taken]);
                    return Ok(Some(vec![*target]));
                }
                let right = match right {
                    Some(right) => right,
                    None if *operand == PrimitiveType::Reference => b.constant(ConstValue::Null),
                    None => b.constant(ConstValue::Int(0)),
                };
                b.terminate(
                    Operation::Branch {
                        kind: *kind,
                        operand: *operand,
                    },
                    &[left, right],
                    vec![taken, next],
                );
                return Ok(Some(vec![*target, fallthrough]));
            }
            InstructionKind::Goto(target) => {
                self.jump(*target)?;
                return Ok(Some(vec![*target]));
            }
            InstructionKind::TableSwitch {
                default,
                low,
                targets,
            } => {
                let cases = (0i64..)
                    .zip(targets)
                    .filter_map(|(i, target)| {
                        i32::try_from(i64::from(*low) + i)
                            .ok()
                            .map(|key| (key, *target))
                    })
                    .collect::<Vec<_>>();
                return self.switch(*default, &cases).map(Some);
            }
            InstructionKind::LookupSwitch { default, pairs } => {
                return self.switch(*default, pairs).map(Some);
            }
            InstructionKind::Return(kind) => {
                let value = kind.map(|_| b.pop());
                let args: Vec<_> = value.into_iter().collect();
                b.terminate(Operation::Return(*kind), &args, Vec::new());
                return Ok(Some(Vec::new()));
            }
            InstructionKind::AThrow => {
                let exception = b.pop();
                b.terminate(Operation::Throw, &[exception], Vec::new());
                return Ok(Some(Vec::new()));
            }
        }
        Ok(None)
    }

    /// Ends the block with a switch over the popped key. Successors are deduplicated by
    /// offset, the default first.
    fn switch(&mut self, default: usize, cases: &[(i32, usize)]) -> Result<Vec<usize>> {
        let mut offsets = vec![default];
        let mut table = JumpTable {
            default: 0,
            cases: BTreeMap::new(),
        };
        for (key, target) in cases {
            let index = match offsets.iter().position(|offset| offset == target) {
                Some(index) => index,
                None => {
                    offsets.push(*target);
                    offsets.len() - 1
                }
            };
            table.cases.insert(*key, index);
        }
        let successors = offsets
            .iter()
            .map(|offset| self.block_at(*offset))
            .collect::<Result<Vec<_>>>()?;

        let key = self.builder.pop();
        self.builder.terminate(Operation::Switch(table), &[key], successors);
        Ok(offsets)
    }

    fn class(&self, instruction: &Instruction, index: u16) -> Result<String> {
        self.pool
            .class_name(index)
            .map(str::to_string)
            .map_err(|e| self.error(instruction, &e.to_string()))
    }

    fn error(&self, instruction: &Instruction, message: &str) -> crate::Error {
        let bytes = self
            .code
            .get(instruction.offset..instruction.next_offset())
            .unwrap_or_default();
        format_error!(instruction.offset, bytes, "{}: {}", instruction.mnemonic(), message)
    }
}

/// The opcode byte at `offset`, for diagnostics.
fn opcode_at(code: &[u8], offset: usize) -> &[u8] {
    code.get(offset..=offset).unwrap_or_default()
}

fn push_result(builder: &mut BlockBuilder<'_>, value: Option<crate::graph::OutputId>, wide: bool) {
    if let Some(value) = value {
        builder.push(value, wide);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::BytecodeAssembler,
        graph::CompareKind,
        metadata::MethodAccessFlags,
    };

    fn build(
        graph: &mut Graph,
        descriptor: &str,
        access: MethodAccessFlags,
        pool: &ConstantPool,
        asm: BytecodeAssembler,
    ) -> Result<BlockId> {
        let info = MethodInfo::new("test", descriptor, access, asm.finish()?);
        let descriptor = MethodDescriptor::parse(descriptor)?;
        MethodBuilder::build(graph, MethodId::new(0), &info, pool, &descriptor)
    }

    fn ops(graph: &Graph, block: BlockId) -> Vec<String> {
        graph
            .block(block)
            .nodes()
            .iter()
            .map(|node| graph.op(*node).to_string())
            .collect()
    }

    #[test]
    fn test_entry_ports_follow_descriptor() -> Result<()> {
        let mut graph = Graph::new();
        let mut asm = BytecodeAssembler::new();
        asm.vreturn()?;
        let init = build(
            &mut graph,
            "(JI)V",
            MethodAccessFlags::empty(),
            &ConstantPool::new(),
            asm,
        )?;

        let entry = graph.block(init).entry();
        let ports: Vec<PortId> = graph.outputs(entry).keys().copied().collect();
        assert_eq!(
            ports,
            vec![PortId::Env, PortId::Local(0), PortId::Local(1), PortId::Local(3)]
        );
        let Operation::MethodEntry { locals } = graph.op(entry) else {
            panic!("init block does not start with a method entry");
        };
        assert_eq!(
            &locals[..],
            &[
                PrimitiveType::Reference,
                PrimitiveType::Long,
                PrimitiveType::Long,
                PrimitiveType::Int
            ]
        );
        assert_eq!(graph.successors(init).len(), 1);
        graph.verify_links()
    }

    #[test]
    fn test_straight_line_has_no_markers() -> Result<()> {
        let mut graph = Graph::new();
        let mut asm = BytecodeAssembler::new();
        asm.iconst(2)?.iconst(3)?.imul()?.ireturn()?;
        let init = build(
            &mut graph,
            "()I",
            MethodAccessFlags::STATIC,
            &ConstantPool::new(),
            asm,
        )?;

        let body = graph.successors(init)[0];
        assert!(ops(&graph, body).iter().all(|op| !op.contains("push")));
        assert!(ops(&graph, body).contains(&"int mul".to_string()));
        graph.verify_links()
    }

    #[test]
    fn test_branch_blocks() -> Result<()> {
        let mut graph = Graph::new();
        let mut asm = BytecodeAssembler::new();
        asm.iload(0)?
            .ifeq("zero")?
            .iconst(1)?
            .ireturn()?
            .label("zero")?
            .iconst(0)?
            .ireturn()?;
        let init = build(
            &mut graph,
            "(I)I",
            MethodAccessFlags::STATIC,
            &ConstantPool::new(),
            asm,
        )?;

        let head = graph.successors(init)[0];
        assert_eq!(graph.successors(head).len(), 2);
        let Some(terminator) = graph.block(head).terminator() else {
            panic!("head block is not terminated");
        };
        assert_eq!(
            graph.op(terminator),
            &Operation::Branch {
                kind: CompareKind::Eq,
                operand: PrimitiveType::Int
            }
        );
        assert_eq!(graph.method_blocks(init).len(), 4);
        graph.verify_links()
    }

    #[test]
    fn test_values_crossing_blocks_use_markers() -> Result<()> {
        // x != 0 ? 1 : 2, with the result merged on the stack
        let mut graph = Graph::new();
        let mut asm = BytecodeAssembler::new();
        asm.iload(0)?
            .ifeq("else")?
            .iconst(1)?
            .goto("end")?
            .label("else")?
            .iconst(2)?
            .label("end")?
            .ireturn()?;
        let init = build(
            &mut graph,
            "(I)I",
            MethodAccessFlags::STATIC,
            &ConstantPool::new(),
            asm,
        )?;

        let blocks = graph.method_blocks(init);
        let pushes = blocks
            .iter()
            .flat_map(|block| ops(&graph, *block))
            .filter(|op| op == "push")
            .count();
        let pops = blocks
            .iter()
            .flat_map(|block| ops(&graph, *block))
            .filter(|op| op == "pop")
            .count();
        assert_eq!(pushes, 2);
        assert_eq!(pops, 1);
        graph.verify_links()
    }

    #[test]
    fn test_switch_successors_are_deduplicated() -> Result<()> {
        let mut graph = Graph::new();
        let mut asm = BytecodeAssembler::new();
        asm.iload(0)?
            .tableswitch(0, &["a", "b", "a"], "b")?
            .label("a")?
            .iconst(1)?
            .ireturn()?
            .label("b")?
            .iconst(2)?
            .ireturn()?;
        let init = build(
            &mut graph,
            "(I)I",
            MethodAccessFlags::STATIC,
            &ConstantPool::new(),
            asm,
        )?;

        let head = graph.successors(init)[0];
        assert_eq!(graph.successors(head).len(), 2);
        let Some(terminator) = graph.block(head).terminator() else {
            panic!("head block is not terminated");
        };
        let Operation::Switch(table) = graph.op(terminator) else {
            panic!("expected a switch, found {}", graph.op(terminator));
        };
        assert_eq!(table.target(0), table.target(2));
        assert_eq!(table.target(1), table.default);
        assert_ne!(table.target(0), table.default);
        graph.verify_links()
    }

    #[test]
    fn test_branch_to_next_becomes_jump() -> Result<()> {
        let mut graph = Graph::new();
        let mut asm = BytecodeAssembler::new();
        asm.iload(0)?.ifne("next")?.label("next")?.iconst(0)?.ireturn()?;
        let init = build(
            &mut graph,
            "(I)I",
            MethodAccessFlags::STATIC,
            &ConstantPool::new(),
            asm,
        )?;

        let head = graph.successors(init)[0];
        let Some(terminator) = graph.block(head).terminator() else {
            panic!("head block is not terminated");
        };
        assert_eq!(graph.op(terminator), &Operation::Jump);
        graph.verify_links()
    }

    #[test]
    fn test_ldc_of_class_is_format_error() -> Result<()> {
        let mut graph = Graph::new();
        let mut pool = ConstantPool::new();
        let class = pool.add_class("java/lang/Object");
        let mut asm = BytecodeAssembler::new();
        asm.ldc(class)?.areturn()?;
        let result = build(
            &mut graph,
            "()Ljava/lang/Object;",
            MethodAccessFlags::STATIC,
            &pool,
            asm,
        );
        assert!(matches!(result, Err(crate::Error::Format { offset: 0, .. })));
        Ok(())
    }

    #[test]
    fn test_unreachable_code_is_dropped() -> Result<()> {
        let mut graph = Graph::new();
        let mut asm = BytecodeAssembler::new();
        asm.iconst(0)?
            .ireturn()?
            .label("dead")?
            .iconst(1)?
            .ireturn()?;
        let init = build(
            &mut graph,
            "()I",
            MethodAccessFlags::STATIC,
            &ConstantPool::new(),
            asm,
        )?;
        assert_eq!(graph.method_blocks(init).len(), 2);
        graph.verify_links()
    }
}

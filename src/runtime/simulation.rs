//! The stepping engine
//!
//! A [`Simulation`] executes a compiled [`Program`] one observable step at a
//! time.  Execution works over a stack of runtime construct instances: the
//! top instance is repeatedly given the chance to push children or advance
//! its state (`up_next`), and each call to [`Simulation::step_forward`]
//! performs exactly one observable step on whatever instance ends up on top.
//! When an instance has nothing left to do it is popped, and its parent
//! reads its result out of the instance arena.
//!
//! Faults (undefined behavior, leaks, and friends) are reported as events
//! and execution continues, so a lesson can show what the questionable
//! operation actually did.  The exception is a crash (null dereference),
//! which halts the simulation at the faulting step.
//!
//! Stepping backward is replay: the simulation is deterministic, so
//! rebuilding it and stepping forward `n - 1` times reproduces the previous
//! state exactly.

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::ast::BinaryOp;
use crate::compiler::constructs::{
    ConstructId, ConstructKind, ConversionKind, Declaration, ExprKind, InitKind, Statement,
};
use crate::compiler::entities::{Entity, EntityId, VariableKind};
use crate::compiler::Program;
use crate::memory::{Memory, ObjectId, Value};
use crate::runtime::constructs::{RtResult, RtState, RuntimeConstruct, RuntimeId};
use crate::runtime::events::{Event, EventLog, FaultKind};
use crate::types::Type;

/// A stepwise execution of one compiled program
#[derive(Debug, Clone)]
pub struct Simulation {
    program: Program,
    memory: Memory,
    /// Every runtime instance ever created, in creation order
    nodes: Vec<RuntimeConstruct>,
    /// The execution stack, indices into `nodes`
    stack: Vec<RuntimeId>,
    events: EventLog,
    steps_taken: usize,
    at_end: bool,
    crashed: bool,
    /// Whether the static-storage deallocator has been pushed
    statics_cleaned: bool,
    /// Heap allocations made by a new-expression whose value has not yet
    /// been consumed; counted as leak-check roots
    pending_news: Vec<ObjectId>,
    /// Heap allocations already reported as leaked
    leaked_reported: FxHashSet<ObjectId>,
    return_value: Option<Value>,
}

impl Simulation {
    /// Build a simulation of `program` and run its setup: static storage is
    /// allocated, the global initializers and the call to `main` are queued.
    /// No steps have been taken yet.
    ///
    /// # Panics
    ///
    /// Panics if the program has compile errors; only an error-free program
    /// has defined runtime semantics.
    pub fn new(program: Program) -> Simulation {
        assert!(
            !program.has_errors(),
            "cannot simulate a program with compile errors"
        );
        let mut sim = Simulation {
            program,
            memory: Memory::new(),
            nodes: Vec::new(),
            stack: Vec::new(),
            events: EventLog::new(),
            steps_taken: 0,
            at_end: false,
            crashed: false,
            statics_cleaned: false,
            pending_news: Vec::new(),
            leaked_reported: FxHashSet::default(),
            return_value: None,
        };
        sim.start();
        sim.settle();
        sim
    }

    fn start(&mut self) {
        let classes = self.program.classes.clone();
        for literal in self.program.string_literals.clone() {
            let id = self.memory.allocate_string_literal(&literal, &classes);
            self.events.record(0, Event::ObjectAllocated { object: id });
        }
        for &entity in &self.program.static_entities.clone() {
            let ent = self.program.entity(entity);
            if ent.ty().is_reference() {
                continue;
            }
            let (name, ty) = (ent.describe(), ent.ty().clone());
            let id = self.memory.allocate_static(entity, name, &ty, &classes);
            self.events.record(0, Event::ObjectAllocated { object: id });
        }

        if let Some(main_call) = self.program.main_call {
            self.push_node(main_call, None);
        }
        // globals initialize before main runs, in declaration order
        for &decl in self.program.globals.clone().iter().rev() {
            self.push_node(decl, None);
        }
        debug!(
            statics = self.program.static_entities.len(),
            literals = self.program.string_literals.len(),
            "simulation ready"
        );
    }

    // ------------------------------------------------------------- inspection

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    pub fn at_end(&self) -> bool {
        self.at_end
    }

    pub fn crashed(&self) -> bool {
        self.crashed
    }

    /// The value `main` returned, once execution has passed the end of the
    /// call to `main`
    pub fn return_value(&self) -> Option<Value> {
        self.return_value
    }

    /// The construct the next step will act on
    pub fn current_construct(&self) -> Option<ConstructId> {
        self.stack.last().map(|&rt| self.nodes[rt.0].model)
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    // --------------------------------------------------------------- stepping

    /// Perform one observable step.  Returns false once the simulation has
    /// ended or crashed.
    pub fn step_forward(&mut self) -> bool {
        if self.at_end || self.crashed {
            return false;
        }
        let Some(&top) = self.stack.last() else {
            return false;
        };
        self.steps_taken += 1;
        self.node_step(top);
        self.settle();
        true
    }

    /// Undo the most recent step by replaying the execution from the start.
    /// Returns false when there is nothing to undo.
    pub fn step_backward(&mut self) -> bool {
        if self.steps_taken == 0 {
            return false;
        }
        let target = self.steps_taken - 1;
        let program = self.program.clone();
        *self = Simulation::new(program);
        for _ in 0..target {
            if !self.step_forward() {
                break;
            }
        }
        true
    }

    pub fn step_to_end(&mut self) {
        while self.step_forward() {}
    }

    /// Return to the state before any step was taken
    pub fn reset(&mut self) {
        let program = self.program.clone();
        *self = Simulation::new(program);
    }

    /// Advance the stack to the next instance that needs a step: push child
    /// instances, advance states, pop finished instances.  Terminates with
    /// either a steppable instance on top or the simulation at its end.
    fn settle(&mut self) {
        loop {
            if self.crashed {
                return;
            }
            let Some(&top) = self.stack.last() else {
                if !self.statics_cleaned {
                    self.statics_cleaned = true;
                    let dealloc = self.program.static_deallocator;
                    self.push_node(dealloc, None);
                    continue;
                }
                self.leak_check();
                self.at_end = true;
                return;
            };
            if self.nodes[top.0].finished {
                let model = self.nodes[top.0].model;
                if let Some(td) = self.program.construct(model).temp_deallocator {
                    let has_temps = match &self.program.construct(td).kind {
                        ConstructKind::Deallocator(d) => !d.targets.is_empty(),
                        _ => false,
                    };
                    if has_temps && !self.nodes[top.0].temp_dealloc_pushed {
                        self.nodes[top.0].temp_dealloc_pushed = true;
                        self.push_node(td, Some(top));
                        continue;
                    }
                }
                self.pop_top();
                continue;
            }
            if self.node_up_next(top) {
                continue;
            }
            return;
        }
    }

    fn push_node(&mut self, model: ConstructId, parent: Option<RuntimeId>) -> RuntimeId {
        let id = RuntimeId(self.nodes.len());
        self.nodes.push(RuntimeConstruct::new(id, model, parent));
        if let Some(p) = parent {
            self.nodes[p.0].children.push(id);
        }
        self.stack.push(id);
        self.events
            .record(self.steps_taken, Event::ConstructPushed { construct: model });
        id
    }

    fn pop_top(&mut self) {
        let Some(top) = self.stack.pop() else {
            return;
        };
        let model = self.nodes[top.0].model;
        self.events
            .record(self.steps_taken, Event::ConstructPopped { construct: model });

        let kind = self.program.construct(model).kind.clone();
        match &kind {
            ConstructKind::FunctionDef(def) => {
                let function = def.entity;
                self.memory.pop_frame();
                self.events
                    .record(self.steps_taken, Event::FunctionReturned { function });
                self.leak_check();
            }
            ConstructKind::Statement(_) => self.leak_check(),
            ConstructKind::FunctionCall(fc) => {
                if Some(model) == self.program.main_call {
                    let value = fc
                        .return_target
                        .and_then(|te| self.nodes[top.0].temp_objects.get(&te).copied())
                        .and_then(|obj| self.memory.object(obj).value);
                    // a bare `return;` in main returns 0
                    self.return_value = Some(value.unwrap_or(Value::Int(0)));
                }
            }
            _ => {}
        }
    }

    fn fault(&mut self, kind: FaultKind, message: impl Into<String>) {
        self.events.record(
            self.steps_taken,
            Event::Fault {
                kind,
                message: message.into(),
            },
        );
    }

    fn crash(&mut self, message: impl Into<String>) {
        self.fault(FaultKind::Crash, message);
        self.crashed = true;
    }

    // ------------------------------------------------------------- resolution

    /// The stack frame of the function activation an instance runs in
    fn frame_of(&self, mut rt: RuntimeId) -> Option<usize> {
        loop {
            let node = &self.nodes[rt.0];
            if matches!(
                self.program.construct(node.model).kind,
                ConstructKind::FunctionDef(_)
            ) {
                return node.frame;
            }
            rt = node.parent?;
        }
    }

    /// The function activation instance an instance runs in
    fn containing_function(&self, mut rt: RuntimeId) -> Option<RuntimeId> {
        loop {
            if matches!(
                self.program.construct(self.nodes[rt.0].model).kind,
                ConstructKind::FunctionDef(_)
            ) {
                return Some(rt);
            }
            rt = self.nodes[rt.0].parent?;
        }
    }

    /// The nearest enclosing full-expression root instance, owner of the
    /// materialized temporaries
    fn full_expr_root(&self, mut rt: RuntimeId) -> RuntimeId {
        loop {
            let node = &self.nodes[rt.0];
            if self.program.construct(node.model).temp_deallocator.is_some() {
                return rt;
            }
            match node.parent {
                Some(p) => rt = p,
                None => return rt,
            }
        }
    }

    /// Translate a `Parameter` entity into the callee-scope entity it
    /// initializes
    fn parameter_entity(&self, function: EntityId, index: usize) -> Option<EntityId> {
        let Entity::Function { definition, .. } = self.program.entity(function) else {
            return None;
        };
        let def = (*definition)?;
        match &self.program.construct(def).kind {
            ConstructKind::FunctionDef(d) => d.params.get(index).copied(),
            _ => None,
        }
    }

    /// Resolve an entity to the physical object it designates at this point
    /// of the execution, from the perspective of instance `rt`.
    pub fn lookup_object(&self, rt: RuntimeId, entity: EntityId) -> Option<ObjectId> {
        match self.program.entity(entity) {
            Entity::LocalObject { .. } | Entity::LocalReference { .. } => {
                let frame = self.frame_of(rt)?;
                self.memory.lookup_in_frame(frame, entity)
            }
            Entity::GlobalObject { ty, .. } => {
                if ty.is_reference() {
                    self.memory.global_bindings.get(&entity).copied()
                } else {
                    self.memory.statics.get(&entity).copied()
                }
            }
            // parameters resolve through the pending (topmost) frame: their
            // initializers run before the callee has gained control
            Entity::Parameter {
                function, index, ..
            } => {
                let callee = self.parameter_entity(*function, *index)?;
                let top = self.memory.frames.len().checked_sub(1)?;
                self.memory.lookup_in_frame(top, callee)
            }
            Entity::ReturnObject { .. } => {
                let frame = self.frame_of(rt)?;
                self.memory.frame(frame).return_object
            }
            Entity::Receiver { .. } => {
                let frame = self.frame_of(rt)?;
                self.memory.frame(frame).receiver
            }
            Entity::TemporaryObject { .. } => {
                let root = self.full_expr_root(rt);
                self.nodes[root.0].temp_objects.get(&entity).copied()
            }
            Entity::ArraySubobject { of, index, .. } => {
                let parent = self.lookup_object(rt, *of)?;
                self.memory.object(parent).element(*index)
            }
            Entity::MemberSubobject { of, name, .. } => {
                let parent = self.lookup_object(rt, *of)?;
                self.member_lookup(parent, name)
            }
            Entity::BaseSubobject { of, .. } => {
                let parent = self.lookup_object(rt, *of)?;
                self.memory.object(parent).base_subobject()
            }
            Entity::NewObject { expr, .. } => {
                let mut cur = Some(rt);
                while let Some(c) = cur {
                    if self.nodes[c.0].model == *expr {
                        return self.nodes[c.0].allocated;
                    }
                    cur = self.nodes[c.0].parent;
                }
                None
            }
            Entity::Function { .. } => None,
        }
    }

    /// Find a member by name, walking down the base-subobject chain
    fn member_lookup(&self, obj: ObjectId, name: &str) -> Option<ObjectId> {
        let mut cur = Some(obj);
        while let Some(o) = cur {
            if let Some(m) = self.memory.object(o).member(name) {
                return Some(m);
            }
            cur = self.memory.object(o).base_subobject();
        }
        None
    }

    // ----------------------------------------------------------------- values

    fn child_result(&self, rt: RuntimeId, i: usize) -> RtResult {
        match self.nodes[rt.0].children.get(i) {
            Some(&c) => self.nodes[c.0].result,
            None => RtResult::None,
        }
    }

    /// Turn an instance result into a value, reading memory (and reporting
    /// the read) when the result designates an object.
    fn value_of(&mut self, result: RtResult) -> Value {
        match result {
            RtResult::Value(v) => v,
            RtResult::Object(obj) => match self.memory.read_value(obj) {
                Ok(v) => {
                    self.events
                        .record(self.steps_taken, Event::ValueRead { object: obj, value: v });
                    v
                }
                Err(e) => {
                    self.fault(FaultKind::UndefinedBehavior, e.to_string());
                    self.zero_for_object(obj)
                }
            },
            RtResult::None => {
                self.fault(
                    FaultKind::UndefinedBehavior,
                    "use of a value that was never produced",
                );
                Value::Int(0)
            }
        }
    }

    /// A stand-in value after a faulting read, typed like the object
    fn zero_for_object(&self, obj: ObjectId) -> Value {
        let ty = &self.memory.object(obj).ty;
        match ty.as_atomic() {
            Some(atomic) => Value::zero_of(atomic),
            None => Value::Pointer(0),
        }
    }

    fn write_object(&mut self, obj: ObjectId, value: Value) {
        match self.memory.write_value(obj, value) {
            Ok(()) => self
                .events
                .record(self.steps_taken, Event::ValueWritten { object: obj, value }),
            Err(e) => self.fault(FaultKind::UndefinedBehavior, e.to_string()),
        }
    }

    fn expr_ty(&self, model: ConstructId) -> Option<Type> {
        self.program
            .construct(model)
            .as_expression()
            .and_then(|e| e.ty.clone())
    }

    // ---------------------------------------------------------------- up_next

    /// Give the top instance a chance to push children, advance its state,
    /// or finish.  Returns false when the instance needs an observable step.
    fn node_up_next(&mut self, rt: RuntimeId) -> bool {
        let kind = self.program.construct(self.nodes[rt.0].model).kind.clone();
        let state = self.nodes[rt.0].state;
        match kind {
            ConstructKind::Expression(e) => self.expr_up_next(rt, state, &e.kind),
            ConstructKind::Statement(s) => self.stmt_up_next(rt, state, &s),
            ConstructKind::Declaration(Declaration::Variable { init, .. }) => match state {
                RtState::Start => {
                    self.push_node(init, Some(rt));
                    self.nodes[rt.0].state = RtState::At(0);
                    true
                }
                _ => {
                    self.nodes[rt.0].finished = true;
                    true
                }
            },
            ConstructKind::Initializer(init) => self.init_up_next(rt, state, &init.kind),
            ConstructKind::Deallocator(d) => self.dealloc_up_next(rt, state, &d),
            ConstructKind::FunctionCall(fc) => match state {
                RtState::Start => false,
                RtState::CallArguments(i) => {
                    if let Some(&init) = fc.param_inits.get(i) {
                        self.push_node(init, Some(rt));
                        self.nodes[rt.0].state = RtState::CallArguments(i + 1);
                    } else {
                        self.nodes[rt.0].state = RtState::Ready;
                    }
                    true
                }
                RtState::Ready => false,
                RtState::CallBody => {
                    let ret_ref = match self.program.entity(fc.function) {
                        Entity::Function { signature, .. } => signature.return_type.is_reference(),
                        _ => false,
                    };
                    if ret_ref {
                        if let Some(callee) = self.nodes[rt.0].last_child() {
                            self.nodes[rt.0].result = self.nodes[callee.0].result;
                        }
                    }
                    self.nodes[rt.0].finished = true;
                    true
                }
                _ => false,
            },
            ConstructKind::FunctionDef(def) => match state {
                RtState::Start => {
                    if !def.member_inits.is_empty() {
                        self.nodes[rt.0].state = RtState::FnMemberInits(0);
                    } else {
                        self.push_node(def.body, Some(rt));
                        self.nodes[rt.0].state = RtState::FnBody;
                    }
                    true
                }
                RtState::FnMemberInits(i) => {
                    if let Some(&init) = def.member_inits.get(i) {
                        self.push_node(init, Some(rt));
                        self.nodes[rt.0].state = RtState::FnMemberInits(i + 1);
                    } else {
                        self.push_node(def.body, Some(rt));
                        self.nodes[rt.0].state = RtState::FnBody;
                    }
                    true
                }
                RtState::FnBody => {
                    if let Some(dealloc) = def.member_dealloc {
                        self.push_node(dealloc, Some(rt));
                        self.nodes[rt.0].state = RtState::FnMemberCleanup;
                    } else {
                        self.fn_after_cleanup(rt, &def);
                    }
                    true
                }
                RtState::FnMemberCleanup => {
                    self.fn_after_cleanup(rt, &def);
                    true
                }
                RtState::FnFlowCheck => false,
                RtState::FnParamCleanup => {
                    self.nodes[rt.0].finished = true;
                    true
                }
                _ => false,
            },
        }
    }

    /// After the body (and, for destructors, the member cleanup): handle a
    /// missing return, then destroy the parameters.
    fn fn_after_cleanup(&mut self, rt: RuntimeId, def: &crate::compiler::constructs::FunctionDef) {
        let needs_flow_check = !def.return_type.is_void() && !self.nodes[rt.0].returned;
        if needs_flow_check {
            self.nodes[rt.0].state = RtState::FnFlowCheck;
        } else {
            self.push_node(def.param_dealloc, Some(rt));
            self.nodes[rt.0].state = RtState::FnParamCleanup;
        }
    }

    fn expr_up_next(&mut self, rt: RuntimeId, state: RtState, kind: &ExprKind) -> bool {
        match kind {
            ExprKind::IntLiteral(_)
            | ExprKind::CharLiteral(_)
            | ExprKind::BoolLiteral(_)
            | ExprKind::DoubleLiteral(_)
            | ExprKind::StringLiteral { .. }
            | ExprKind::NullptrLiteral
            | ExprKind::Identifier { .. } => false,

            ExprKind::Binary { op, lhs, rhs }
                if matches!(op, BinaryOp::LogicalAnd | BinaryOp::LogicalOr) =>
            {
                match state {
                    RtState::Start => {
                        self.push_node(*lhs, Some(rt));
                        self.nodes[rt.0].state = RtState::At(0);
                        true
                    }
                    // At(0): the short-circuit decision is a step
                    RtState::At(1) => {
                        if self.nodes[rt.0].children.len() < 2 {
                            self.push_node(*rhs, Some(rt));
                        } else {
                            self.nodes[rt.0].state = RtState::Ready;
                        }
                        true
                    }
                    _ => false,
                }
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.two_operands(rt, state, *lhs, *rhs)
            }
            ExprKind::Negate { operand }
            | ExprKind::Not { operand }
            | ExprKind::AddressOf { operand }
            | ExprKind::Dereference { operand }
            | ExprKind::ImplicitConversion { operand, .. } => match state {
                RtState::Start => {
                    self.push_node(*operand, Some(rt));
                    self.nodes[rt.0].state = RtState::At(0);
                    true
                }
                RtState::At(0) => {
                    self.nodes[rt.0].state = RtState::Ready;
                    true
                }
                _ => false,
            },
            // C++17 ordering: the right side is sequenced first
            ExprKind::Assignment { lhs, rhs } => self.two_operands(rt, state, *rhs, *lhs),
            ExprKind::Subscript { operand, index } => {
                self.two_operands(rt, state, *operand, *index)
            }
            ExprKind::MemberAccess { object, .. } => match state {
                RtState::Start => {
                    self.push_node(*object, Some(rt));
                    self.nodes[rt.0].state = RtState::At(0);
                    true
                }
                RtState::At(0) => {
                    self.nodes[rt.0].state = RtState::Ready;
                    true
                }
                _ => false,
            },
            ExprKind::Call { call } => match state {
                RtState::Start => match call {
                    Some(c) => {
                        self.push_node(*c, Some(rt));
                        self.nodes[rt.0].state = RtState::At(0);
                        true
                    }
                    None => {
                        self.nodes[rt.0].finished = true;
                        true
                    }
                },
                RtState::At(0) => {
                    self.nodes[rt.0].result = self.child_result(rt, 0);
                    self.nodes[rt.0].finished = true;
                    true
                }
                _ => false,
            },
            ExprKind::New { init, .. } => match state {
                RtState::Start => false,
                RtState::NewInit => {
                    match init {
                        Some(i) if self.nodes[rt.0].children.is_empty() => {
                            self.push_node(*i, Some(rt));
                        }
                        _ => self.nodes[rt.0].state = RtState::Ready,
                    }
                    true
                }
                _ => false,
            },
            ExprKind::Delete {
                operand, dtor_call, ..
            } => match state {
                RtState::Start => {
                    self.push_node(*operand, Some(rt));
                    self.nodes[rt.0].state = RtState::At(0);
                    true
                }
                RtState::At(0) => {
                    self.nodes[rt.0].state = RtState::DeleteValidate;
                    true
                }
                RtState::DeleteDtors(_) => {
                    if self.nodes[rt.0].pending_dtors.is_empty() {
                        self.nodes[rt.0].state = RtState::DeleteFree;
                    } else {
                        let receiver = self.nodes[rt.0].pending_dtors.remove(0);
                        if let Some(call) = dtor_call {
                            let child = self.push_node(*call, Some(rt));
                            self.nodes[child.0].receiver = Some(receiver);
                        }
                    }
                    true
                }
                _ => false,
            },
        }
    }

    /// The push-a-push-b-then-compute protocol shared by the two-operand
    /// expressions.  `first` is evaluated before `second`.
    fn two_operands(
        &mut self,
        rt: RuntimeId,
        state: RtState,
        first: ConstructId,
        second: ConstructId,
    ) -> bool {
        match state {
            RtState::Start => {
                self.push_node(first, Some(rt));
                self.nodes[rt.0].state = RtState::At(0);
                true
            }
            RtState::At(0) => {
                self.push_node(second, Some(rt));
                self.nodes[rt.0].state = RtState::At(1);
                true
            }
            RtState::At(1) => {
                self.nodes[rt.0].state = RtState::Ready;
                true
            }
            _ => false,
        }
    }

    fn stmt_up_next(&mut self, rt: RuntimeId, state: RtState, stmt: &Statement) -> bool {
        let returned = self
            .containing_function(rt)
            .map(|f| self.nodes[f.0].returned)
            .unwrap_or(false);
        match stmt {
            Statement::Expression { expr } => self.wrap_one(rt, state, *expr),
            Statement::Declaration { decl } => self.wrap_one(rt, state, *decl),
            Statement::Block {
                statements,
                local_dealloc,
            } => match state {
                RtState::Start | RtState::At(_) => {
                    let mut i = match state {
                        RtState::At(i) => i,
                        _ => 0,
                    };
                    // an early return skips the remaining statements but
                    // still destroys the block's locals
                    if returned {
                        i = statements.len();
                    }
                    if let Some(&s) = statements.get(i) {
                        self.push_node(s, Some(rt));
                        self.nodes[rt.0].state = RtState::At(i + 1);
                    } else {
                        match local_dealloc {
                            Some(d) => {
                                self.push_node(*d, Some(rt));
                                self.nodes[rt.0].state = RtState::Ready;
                            }
                            None => self.nodes[rt.0].finished = true,
                        }
                    }
                    true
                }
                _ => {
                    self.nodes[rt.0].finished = true;
                    true
                }
            },
            Statement::If { condition, .. } => match state {
                RtState::Start => {
                    self.push_node(*condition, Some(rt));
                    self.nodes[rt.0].state = RtState::At(0);
                    true
                }
                RtState::At(0) => {
                    self.nodes[rt.0].state = RtState::BranchDecide;
                    true
                }
                RtState::BranchDecide => false,
                _ => {
                    self.nodes[rt.0].finished = true;
                    true
                }
            },
            Statement::While { condition, .. } => {
                if returned {
                    self.nodes[rt.0].finished = true;
                    return true;
                }
                match state {
                    RtState::Start | RtState::LoopCondition => {
                        self.push_node(*condition, Some(rt));
                        self.nodes[rt.0].state = RtState::LoopDecide;
                        true
                    }
                    RtState::LoopDecide => false,
                    RtState::LoopBody => {
                        self.nodes[rt.0].state = RtState::LoopCondition;
                        true
                    }
                    _ => false,
                }
            }
            Statement::Return { initializer } => match state {
                RtState::Start => {
                    match initializer {
                        Some(i) => {
                            self.push_node(*i, Some(rt));
                            self.nodes[rt.0].state = RtState::At(0);
                        }
                        None => self.nodes[rt.0].state = RtState::Ready,
                    }
                    true
                }
                RtState::At(0) => {
                    self.nodes[rt.0].state = RtState::Ready;
                    true
                }
                _ => false,
            },
            Statement::Null => {
                self.nodes[rt.0].finished = true;
                true
            }
        }
    }

    /// Statements that push exactly one child and finish when it does
    fn wrap_one(&mut self, rt: RuntimeId, state: RtState, child: ConstructId) -> bool {
        match state {
            RtState::Start => {
                self.push_node(child, Some(rt));
                self.nodes[rt.0].state = RtState::At(0);
                true
            }
            _ => {
                self.nodes[rt.0].finished = true;
                true
            }
        }
    }

    fn init_up_next(&mut self, rt: RuntimeId, state: RtState, kind: &InitKind) -> bool {
        match kind {
            InitKind::ReferenceBind { arg, .. } | InitKind::AtomicArg { arg } => match state {
                RtState::Start => {
                    self.push_node(*arg, Some(rt));
                    self.nodes[rt.0].state = RtState::At(0);
                    true
                }
                RtState::At(0) => {
                    self.nodes[rt.0].state = RtState::Ready;
                    true
                }
                _ => false,
            },
            InitKind::AtomicDefault | InitKind::AtomicValue | InitKind::ArrayString { .. } => false,
            InitKind::ArrayDefault { element_inits }
            | InitKind::ArrayValue { element_inits }
            | InitKind::ArrayList { element_inits } => match state {
                RtState::Start | RtState::At(_) => {
                    let i = match state {
                        RtState::At(i) => i,
                        _ => 0,
                    };
                    if let Some(&init) = element_inits.get(i) {
                        self.push_node(init, Some(rt));
                        self.nodes[rt.0].state = RtState::At(i + 1);
                    } else {
                        self.nodes[rt.0].state = RtState::Ready;
                    }
                    true
                }
                _ => false,
            },
            InitKind::ClassCtor {
                zero_fill,
                ctor_call,
            } => match state {
                RtState::Start => {
                    if *zero_fill {
                        false
                    } else {
                        self.push_ctor(rt, *ctor_call);
                        true
                    }
                }
                RtState::At(0) => {
                    self.push_ctor(rt, *ctor_call);
                    true
                }
                RtState::At(1) => {
                    self.nodes[rt.0].state = RtState::Ready;
                    true
                }
                _ => false,
            },
            InitKind::Invalid => {
                self.nodes[rt.0].finished = true;
                true
            }
        }
    }

    fn push_ctor(&mut self, rt: RuntimeId, ctor_call: ConstructId) {
        let target = self.init_target(rt);
        let receiver = target.and_then(|t| self.lookup_object(rt, t));
        let child = self.push_node(ctor_call, Some(rt));
        self.nodes[child.0].receiver = receiver;
        self.nodes[rt.0].state = RtState::At(1);
    }

    fn init_target(&self, rt: RuntimeId) -> Option<EntityId> {
        match &self.program.construct(self.nodes[rt.0].model).kind {
            ConstructKind::Initializer(init) => Some(init.target),
            _ => None,
        }
    }

    fn dealloc_up_next(
        &mut self,
        rt: RuntimeId,
        state: RtState,
        dealloc: &crate::compiler::constructs::Deallocator,
    ) -> bool {
        match state {
            RtState::Start => false,
            RtState::DeallocTarget(i) => {
                let Some(target) = dealloc.targets.get(i) else {
                    self.nodes[rt.0].finished = true;
                    return true;
                };
                let entity = target.entity;
                let is_reference =
                    self.program.entity(entity).variable_kind() == VariableKind::Reference;
                if is_reference {
                    if self.reference_bound(rt, entity) {
                        self.nodes[rt.0].state = RtState::DeallocKill(i);
                    } else {
                        self.nodes[rt.0].state = RtState::DeallocTarget(i + 1);
                    }
                    return true;
                }
                match self.lookup_object(rt, entity) {
                    Some(obj) if self.memory.object(obj).is_alive() => {
                        if let Some(dtor) = target.dtors.first() {
                            let receiver = self.lookup_object(rt, dtor.receiver);
                            let child = self.push_node(dtor.call, Some(rt));
                            self.nodes[child.0].receiver = receiver;
                            self.nodes[rt.0].state = RtState::DeallocDtor(i, 0);
                        } else {
                            self.nodes[rt.0].state = RtState::DeallocKill(i);
                        }
                    }
                    // never came alive (or already dead): nothing to destroy
                    _ => self.nodes[rt.0].state = RtState::DeallocTarget(i + 1),
                }
                true
            }
            RtState::DeallocDtor(i, k) => {
                let next = dealloc
                    .targets
                    .get(i)
                    .and_then(|t| t.dtors.get(k + 1))
                    .copied();
                match next {
                    Some(dtor) => {
                        let receiver = self.lookup_object(rt, dtor.receiver);
                        let child = self.push_node(dtor.call, Some(rt));
                        self.nodes[child.0].receiver = receiver;
                        self.nodes[rt.0].state = RtState::DeallocDtor(i, k + 1);
                    }
                    None => self.nodes[rt.0].state = RtState::DeallocKill(i),
                }
                true
            }
            RtState::DeallocKill(_) => false,
            _ => false,
        }
    }

    fn reference_bound(&self, rt: RuntimeId, entity: EntityId) -> bool {
        match self.program.entity(entity) {
            Entity::GlobalObject { .. } => self.memory.global_bindings.contains_key(&entity),
            _ => match self.frame_of(rt) {
                Some(f) => self.memory.frame(f).bindings.contains_key(&entity),
                None => false,
            },
        }
    }

    // ------------------------------------------------------------------ steps

    /// Perform one observable step on an instance
    fn node_step(&mut self, rt: RuntimeId) {
        let kind = self.program.construct(self.nodes[rt.0].model).kind.clone();
        let state = self.nodes[rt.0].state;
        match kind {
            ConstructKind::Expression(e) => self.expr_step(rt, state, &e),
            ConstructKind::Statement(s) => self.stmt_step(rt, state, &s),
            ConstructKind::Initializer(init) => self.init_step(rt, state, &init),
            ConstructKind::Deallocator(d) => self.dealloc_step(rt, state, &d),
            ConstructKind::FunctionCall(fc) => self.call_step(rt, state, &fc),
            ConstructKind::FunctionDef(def) => self.fn_step(rt, state, &def),
            // declarations advance purely through up_next
            ConstructKind::Declaration(_) => {
                self.nodes[rt.0].finished = true;
            }
        }
    }

    fn finish_value(&mut self, rt: RuntimeId, value: Value) {
        self.nodes[rt.0].result = RtResult::Value(value);
        self.nodes[rt.0].finished = true;
    }

    fn finish_object(&mut self, rt: RuntimeId, obj: ObjectId) {
        self.nodes[rt.0].result = RtResult::Object(obj);
        self.nodes[rt.0].finished = true;
    }

    fn expr_step(
        &mut self,
        rt: RuntimeId,
        state: RtState,
        expr: &crate::compiler::constructs::Expression,
    ) {
        match &expr.kind {
            ExprKind::IntLiteral(v) => self.finish_value(rt, Value::Int(*v)),
            ExprKind::CharLiteral(v) => self.finish_value(rt, Value::Char(*v)),
            ExprKind::BoolLiteral(v) => self.finish_value(rt, Value::Bool(*v)),
            ExprKind::DoubleLiteral(v) => self.finish_value(rt, Value::Double(*v)),
            ExprKind::NullptrLiteral => self.finish_value(rt, Value::Pointer(0)),
            ExprKind::StringLiteral { index } => {
                match self.memory.string_literal_objects.get(*index).copied() {
                    Some(obj) => self.finish_object(rt, obj),
                    None => self.crash("string literal object missing"),
                }
            }
            ExprKind::Identifier { name, entity } => {
                let obj = entity.and_then(|e| self.lookup_object(rt, e));
                match obj {
                    Some(o) => self.finish_object(rt, o),
                    None => self.crash(format!("'{name}' does not designate an object here")),
                }
            }
            ExprKind::Binary { op, .. }
                if matches!(op, BinaryOp::LogicalAnd | BinaryOp::LogicalOr) =>
            {
                match state {
                    RtState::At(0) => {
                        let v = self.value_of(self.child_result(rt, 0)).as_bool();
                        let decided = match op {
                            BinaryOp::LogicalAnd => !v,
                            _ => v,
                        };
                        if decided {
                            self.finish_value(rt, Value::Bool(v));
                        } else {
                            self.nodes[rt.0].state = RtState::At(1);
                        }
                    }
                    _ => {
                        let v = self.value_of(self.child_result(rt, 1)).as_bool();
                        self.finish_value(rt, Value::Bool(v));
                    }
                }
            }
            ExprKind::Binary { op, lhs, .. } => {
                let l = self.value_of(self.child_result(rt, 0));
                let r = self.value_of(self.child_result(rt, 1));
                let result = self.binary_value(*op, l, r, rt, *lhs);
                self.finish_value(rt, result);
            }
            ExprKind::Negate { .. } => {
                let v = self.value_of(self.child_result(rt, 0));
                let result = match v {
                    Value::Double(d) => Value::Double(-d),
                    other => match other.as_int().checked_neg() {
                        Some(n) => Value::Int(n),
                        None => {
                            self.fault(FaultKind::UndefinedBehavior, "signed integer overflow");
                            Value::Int(other.as_int().wrapping_neg())
                        }
                    },
                };
                self.finish_value(rt, result);
            }
            ExprKind::Not { .. } => {
                let v = self.value_of(self.child_result(rt, 0));
                self.finish_value(rt, Value::Bool(!v.as_bool()));
            }
            ExprKind::AddressOf { .. } => match self.child_result(rt, 0) {
                RtResult::Object(obj) => {
                    let addr = self.memory.object(obj).address;
                    self.finish_value(rt, Value::Pointer(addr));
                }
                _ => self.crash("cannot take the address of a non-object"),
            },
            ExprKind::Dereference { .. } => {
                let addr = self.value_of(self.child_result(rt, 0)).as_address();
                self.deref_step(rt, addr);
            }
            ExprKind::Subscript { .. } => {
                let base = self.value_of(self.child_result(rt, 0)).as_address();
                let index = self.value_of(self.child_result(rt, 1)).as_int();
                if base == 0 {
                    self.crash("subscript of a null pointer");
                    return;
                }
                let size = expr
                    .ty
                    .as_ref()
                    .map(|t| t.size(&self.program.classes))
                    .unwrap_or(1) as i64;
                let addr = (base as i64).wrapping_add(index as i64 * size) as u64;
                self.deref_step(rt, addr);
            }
            ExprKind::MemberAccess { member, .. } => match self.child_result(rt, 0) {
                RtResult::Object(obj) => match self.member_lookup(obj, member) {
                    Some(m) => self.finish_object(rt, m),
                    None => self.crash(format!("no member '{member}' in this object")),
                },
                _ => self.crash("member access on a non-object"),
            },
            ExprKind::Assignment { .. } => {
                // right operand was evaluated first
                let value = self.value_of(self.child_result(rt, 0));
                match self.child_result(rt, 1) {
                    RtResult::Object(obj) => {
                        self.write_object(obj, value);
                        self.finish_object(rt, obj);
                    }
                    _ => self.crash("assignment to a non-object"),
                }
            }
            ExprKind::ImplicitConversion { conversion, .. } => {
                self.conversion_step(rt, *conversion, expr.ty.as_ref());
            }
            ExprKind::Call { .. } => {
                // calls finish through up_next once the callee pops
                self.nodes[rt.0].finished = true;
            }
            ExprKind::New { allocated_type, .. } => match state {
                RtState::Start => {
                    let array = allocated_type.is_bounded_array();
                    let classes = self.program.classes.clone();
                    let obj = self.memory.allocate_heap(allocated_type, array, &classes);
                    self.events
                        .record(self.steps_taken, Event::ObjectAllocated { object: obj });
                    self.pending_news.push(obj);
                    self.nodes[rt.0].allocated = Some(obj);
                    self.nodes[rt.0].state = RtState::NewInit;
                }
                _ => {
                    if let Some(obj) = self.nodes[rt.0].allocated {
                        let addr = self.memory.object(obj).address;
                        self.pending_news.retain(|&o| o != obj);
                        self.finish_value(rt, Value::Pointer(addr));
                    } else {
                        self.crash("new-expression lost its allocation");
                    }
                }
            },
            ExprKind::Delete { array_form, .. } => match state {
                RtState::DeleteValidate => self.delete_validate(rt, *array_form),
                _ => {
                    // DeleteFree
                    if let Some(obj) = self.nodes[rt.0].allocated {
                        self.memory.free_heap(obj);
                        self.events
                            .record(self.steps_taken, Event::ObjectDeallocated { object: obj });
                    }
                    self.nodes[rt.0].finished = true;
                }
            },
        }
    }

    fn deref_step(&mut self, rt: RuntimeId, addr: u64) {
        if addr == 0 {
            self.crash("dereference of a null pointer");
            return;
        }
        let ty = self
            .expr_ty(self.nodes[rt.0].model)
            .unwrap_or_else(Type::int);
        match self.memory.find_object(addr, &ty) {
            Ok(obj) => self.finish_object(rt, obj),
            Err(e) => {
                self.fault(FaultKind::UndefinedBehavior, e.to_string());
                self.nodes[rt.0].finished = true;
            }
        }
    }

    fn conversion_step(&mut self, rt: RuntimeId, conversion: ConversionKind, target: Option<&Type>) {
        let operand = self.child_result(rt, 0);
        match conversion {
            ConversionKind::LvalueToRvalue => {
                let v = self.value_of(operand);
                self.finish_value(rt, v);
            }
            ConversionKind::ArrayToPointer => match operand {
                RtResult::Object(obj) => {
                    let addr = self.memory.object(obj).address;
                    self.finish_value(rt, Value::Pointer(addr));
                }
                _ => self.crash("array-to-pointer decay on a non-object"),
            },
            ConversionKind::IntegralPromotion
            | ConversionKind::IntegralConversion
            | ConversionKind::FloatingIntegralConversion => {
                let v = self.value_of(operand);
                let converted = match target.and_then(|t| t.as_atomic()) {
                    Some(atomic) => v.convert_to(atomic),
                    None => v,
                };
                self.finish_value(rt, converted);
            }
            ConversionKind::NullptrToPointer => self.finish_value(rt, Value::Pointer(0)),
            ConversionKind::Qualification => {
                let result = operand;
                self.nodes[rt.0].result = result;
                self.nodes[rt.0].finished = true;
            }
        }
    }

    fn binary_value(
        &mut self,
        op: BinaryOp,
        l: Value,
        r: Value,
        rt: RuntimeId,
        lhs_model: ConstructId,
    ) -> Value {
        use BinaryOp::*;
        let node_ty = self.expr_ty(self.nodes[rt.0].model);

        // pointer arithmetic scales by the pointee size
        if matches!(op, Add | Sub) {
            match (l, r) {
                (Value::Pointer(p), other) | (other, Value::Pointer(p))
                    if !matches!((l, r), (Value::Pointer(_), Value::Pointer(_))) =>
                {
                    let size = node_ty
                        .as_ref()
                        .and_then(|t| t.pointee())
                        .map(|t| t.size(&self.program.classes))
                        .unwrap_or(1) as i64;
                    let offset = other.as_int() as i64 * size;
                    let addr = match op {
                        Sub => (p as i64).wrapping_sub(offset),
                        _ => (p as i64).wrapping_add(offset),
                    };
                    return Value::Pointer(addr as u64);
                }
                (Value::Pointer(a), Value::Pointer(b)) if op == Sub => {
                    let size = self
                        .expr_ty(lhs_model)
                        .as_ref()
                        .and_then(|t| t.pointee())
                        .map(|t| t.size(&self.program.classes))
                        .unwrap_or(1) as i64;
                    let diff = (a as i64 - b as i64) / size.max(1);
                    return Value::Int(diff as i32);
                }
                _ => {}
            }
        }

        match op {
            Add | Sub | Mul => {
                if matches!(l, Value::Double(_)) || matches!(r, Value::Double(_)) {
                    let (a, b) = (l.as_double(), r.as_double());
                    Value::Double(match op {
                        Add => a + b,
                        Sub => a - b,
                        _ => a * b,
                    })
                } else {
                    let (a, b) = (l.as_int(), r.as_int());
                    let checked = match op {
                        Add => a.checked_add(b),
                        Sub => a.checked_sub(b),
                        _ => a.checked_mul(b),
                    };
                    match checked {
                        Some(v) => Value::Int(v),
                        None => {
                            self.fault(FaultKind::UndefinedBehavior, "signed integer overflow");
                            Value::Int(match op {
                                Add => a.wrapping_add(b),
                                Sub => a.wrapping_sub(b),
                                _ => a.wrapping_mul(b),
                            })
                        }
                    }
                }
            }
            Div | Mod => {
                if matches!(l, Value::Double(_)) || matches!(r, Value::Double(_)) {
                    Value::Double(l.as_double() / r.as_double())
                } else {
                    let (a, b) = (l.as_int(), r.as_int());
                    if b == 0 {
                        self.fault(
                            FaultKind::UndefinedBehavior,
                            if op == Div {
                                "division by zero"
                            } else {
                                "remainder by zero"
                            },
                        );
                        return Value::Int(0);
                    }
                    match if op == Div {
                        a.checked_div(b)
                    } else {
                        a.checked_rem(b)
                    } {
                        Some(v) => Value::Int(v),
                        None => {
                            self.fault(FaultKind::UndefinedBehavior, "signed integer overflow");
                            Value::Int(0)
                        }
                    }
                }
            }
            Eq | Ne | Lt | Le | Gt | Ge => self.compare(op, l, r),
            LogicalAnd | LogicalOr => {
                unreachable!("logical operators take the short-circuit path")
            }
        }
    }

    fn compare(&mut self, op: BinaryOp, l: Value, r: Value) -> Value {
        use std::cmp::Ordering;
        use BinaryOp::*;
        let ord = match (l, r) {
            (Value::Pointer(a), Value::Pointer(b)) => {
                // ordering pointers into different complete objects is not
                // specified; equality is always fine
                if !matches!(op, Eq | Ne) && a != 0 && b != 0 {
                    let oa = self.memory.owner_of_address(a);
                    let ob = self.memory.owner_of_address(b);
                    if oa != ob {
                        self.fault(
                            FaultKind::UnspecifiedBehavior,
                            "relational comparison of pointers into different objects",
                        );
                    }
                }
                a.cmp(&b)
            }
            _ if matches!(l, Value::Double(_)) || matches!(r, Value::Double(_)) => l
                .as_double()
                .partial_cmp(&r.as_double())
                .unwrap_or(Ordering::Equal),
            _ => l.as_int().cmp(&r.as_int()),
        };
        Value::Bool(match op {
            Eq => ord == Ordering::Equal,
            Ne => ord != Ordering::Equal,
            Lt => ord == Ordering::Less,
            Le => ord != Ordering::Greater,
            Gt => ord == Ordering::Greater,
            _ => ord != Ordering::Less,
        })
    }

    fn delete_validate(&mut self, rt: RuntimeId, array_form: bool) {
        let addr = self.value_of(self.child_result(rt, 0)).as_address();
        if addr == 0 {
            // deleting a null pointer does nothing, silently
            self.nodes[rt.0].finished = true;
            return;
        }
        let Some(obj) = self.memory.heap_allocation_at(addr) else {
            self.fault(
                FaultKind::UndefinedBehavior,
                format!("delete of address {addr:#x}, which new did not produce"),
            );
            self.nodes[rt.0].finished = true;
            return;
        };
        if self.memory.object(obj).is_dead() {
            self.fault(
                FaultKind::UndefinedBehavior,
                "double free: this allocation was already deleted",
            );
            self.nodes[rt.0].finished = true;
            return;
        }
        let storage = self.memory.object(obj).storage;
        if let crate::memory::StorageKind::Dynamic { array_allocation } = storage {
            if array_allocation != array_form {
                self.fault(
                    FaultKind::UndefinedBehavior,
                    if array_form {
                        "delete[] of an allocation that new[] did not produce"
                    } else {
                        "delete of an allocation produced by new[]"
                    },
                );
            }
        }

        // destructor receivers, in destruction order
        let mut receivers = Vec::new();
        let allocation = self.memory.object(obj);
        if allocation.ty.class_id().is_some() {
            receivers.push(obj);
        } else if let crate::memory::SubObjects::Array(elements) = &allocation.subobjects {
            if allocation
                .ty
                .elem_type()
                .and_then(|t| t.class_id())
                .is_some()
            {
                receivers.extend(elements.iter().rev().copied());
            }
        }

        self.nodes[rt.0].allocated = Some(obj);
        self.nodes[rt.0].pending_dtors = receivers;
        self.nodes[rt.0].state = if self.nodes[rt.0].pending_dtors.is_empty() {
            RtState::DeleteFree
        } else {
            RtState::DeleteDtors(0)
        };
    }

    fn stmt_step(&mut self, rt: RuntimeId, _state: RtState, stmt: &Statement) {
        match stmt {
            Statement::If {
                then_stmt,
                else_stmt,
                ..
            } => {
                let v = self.value_of(self.child_result(rt, 0)).as_bool();
                if v {
                    self.push_node(*then_stmt, Some(rt));
                    self.nodes[rt.0].state = RtState::Branch;
                } else if let Some(e) = else_stmt {
                    self.push_node(*e, Some(rt));
                    self.nodes[rt.0].state = RtState::Branch;
                } else {
                    self.nodes[rt.0].finished = true;
                }
            }
            Statement::While { body, .. } => {
                let last = self.nodes[rt.0].children.len().saturating_sub(1);
                let v = self.value_of(self.child_result(rt, last)).as_bool();
                if v {
                    self.push_node(*body, Some(rt));
                    self.nodes[rt.0].state = RtState::LoopBody;
                } else {
                    self.nodes[rt.0].finished = true;
                }
            }
            Statement::Return { .. } => {
                if let Some(f) = self.containing_function(rt) {
                    self.nodes[f.0].returned = true;
                }
                self.nodes[rt.0].finished = true;
            }
            // the rest advance purely through up_next
            _ => {
                self.nodes[rt.0].finished = true;
            }
        }
    }

    fn init_step(
        &mut self,
        rt: RuntimeId,
        state: RtState,
        init: &crate::compiler::constructs::Initializer,
    ) {
        let target = init.target;
        match &init.kind {
            InitKind::ReferenceBind { materialize, .. } => {
                let obj = match self.child_result(rt, 0) {
                    RtResult::Object(o) => Some(o),
                    RtResult::Value(v) => materialize.map(|temp| self.materialize(rt, temp, v)),
                    RtResult::None => None,
                };
                match obj {
                    Some(o) => self.bind_target(rt, target, o),
                    None => self.crash("reference initializer produced nothing to bind"),
                }
                self.nodes[rt.0].finished = true;
            }
            InitKind::AtomicDefault => {
                if let Some(obj) = self.resolve_target(rt, target) {
                    // storage a zero-filling class initialization already
                    // brought alive keeps its zeroes
                    if !self.memory.object(obj).is_alive() {
                        self.memory.clear_value(obj);
                    }
                    self.memory.begin_lifetime(obj);
                    self.events
                        .record(self.steps_taken, Event::LifetimeBegan { object: obj });
                }
                self.nodes[rt.0].finished = true;
            }
            InitKind::AtomicValue => {
                if let Some(obj) = self.resolve_target(rt, target) {
                    self.memory.begin_lifetime(obj);
                    self.events
                        .record(self.steps_taken, Event::LifetimeBegan { object: obj });
                    let zero = self.zero_for_object(obj);
                    self.write_object(obj, zero);
                }
                self.nodes[rt.0].finished = true;
            }
            InitKind::AtomicArg { .. } => {
                let v = self.value_of(self.child_result(rt, 0));
                if let Some(obj) = self.resolve_target(rt, target) {
                    self.memory.begin_lifetime(obj);
                    self.events
                        .record(self.steps_taken, Event::LifetimeBegan { object: obj });
                    let v = match self.memory.object(obj).ty.as_atomic() {
                        Some(atomic) => v.convert_to(atomic),
                        None => v,
                    };
                    self.write_object(obj, v);
                }
                self.nodes[rt.0].finished = true;
            }
            InitKind::ArrayDefault { element_inits } => {
                if let Some(obj) = self.resolve_target(rt, target) {
                    if element_inits.is_empty() {
                        if !self.memory.object(obj).is_alive() {
                            self.memory.clear_values_recursive(obj);
                        }
                        self.memory.begin_lifetime_recursive(obj);
                    } else {
                        self.memory.begin_lifetime(obj);
                    }
                    self.events
                        .record(self.steps_taken, Event::LifetimeBegan { object: obj });
                }
                self.nodes[rt.0].finished = true;
            }
            InitKind::ArrayValue { .. } | InitKind::ArrayList { .. } => {
                if let Some(obj) = self.resolve_target(rt, target) {
                    self.memory.begin_lifetime(obj);
                    self.events
                        .record(self.steps_taken, Event::LifetimeBegan { object: obj });
                }
                self.nodes[rt.0].finished = true;
            }
            InitKind::ArrayString { literal_index } => {
                self.array_string_step(rt, target, *literal_index);
            }
            InitKind::ClassCtor { .. } => match state {
                RtState::Start => {
                    // zero-initialize before the (trivial) constructor runs
                    if let Some(obj) = self.resolve_target(rt, target) {
                        self.memory.zero_fill(obj);
                    }
                    self.nodes[rt.0].state = RtState::At(0);
                }
                _ => {
                    if let Some(obj) = self.resolve_target(rt, target) {
                        self.memory.begin_lifetime(obj);
                        self.events
                            .record(self.steps_taken, Event::LifetimeBegan { object: obj });
                    }
                    self.nodes[rt.0].finished = true;
                }
            },
            InitKind::Invalid => {
                self.nodes[rt.0].finished = true;
            }
        }
    }

    fn resolve_target(&mut self, rt: RuntimeId, target: EntityId) -> Option<ObjectId> {
        let obj = self.lookup_object(rt, target);
        if obj.is_none() {
            let name = self.program.entity(target).describe();
            self.crash(format!("cannot locate storage for {name}"));
        }
        obj
    }

    fn array_string_step(&mut self, rt: RuntimeId, target: EntityId, literal_index: usize) {
        let Some(obj) = self.resolve_target(rt, target) else {
            self.nodes[rt.0].finished = true;
            return;
        };
        let bytes = self
            .program
            .string_literals
            .get(literal_index)
            .cloned()
            .unwrap_or_default();
        self.memory.begin_lifetime_recursive(obj);
        self.events
            .record(self.steps_taken, Event::LifetimeBegan { object: obj });
        let len = self.memory.object(obj).ty.array_len().unwrap_or(0);
        for i in 0..len {
            let Some(elem) = self.memory.object(obj).element(i) else {
                break;
            };
            // elements past the literal are null-filled
            let b = bytes.get(i).copied().unwrap_or(0);
            self.write_object(elem, Value::Char(b));
        }
        self.nodes[rt.0].finished = true;
    }

    /// Store a prvalue into its materialized temporary, registered with the
    /// enclosing full expression
    fn materialize(&mut self, rt: RuntimeId, temp: EntityId, value: Value) -> ObjectId {
        let ent = self.program.entity(temp);
        let (description, ty) = (ent.describe(), ent.ty().clone());
        let classes = self.program.classes.clone();
        let obj = self.memory.allocate_temporary(description, &ty, &classes);
        self.events
            .record(self.steps_taken, Event::ObjectAllocated { object: obj });
        self.memory.begin_lifetime(obj);
        self.events
            .record(self.steps_taken, Event::LifetimeBegan { object: obj });
        self.write_object(obj, value);
        let root = self.full_expr_root(rt);
        self.nodes[root.0].temp_objects.insert(temp, obj);
        obj
    }

    fn bind_target(&mut self, rt: RuntimeId, target: EntityId, obj: ObjectId) {
        let entity = self.program.entity(target).clone();
        match &entity {
            Entity::LocalReference { .. } => {
                if let Some(frame) = self.frame_of(rt) {
                    self.memory.bind_reference(frame, target, obj);
                }
            }
            Entity::Parameter {
                function, index, ..
            } => {
                let (function, index) = (*function, *index);
                if let (Some(callee), Some(top)) = (
                    self.parameter_entity(function, index),
                    self.memory.frames.len().checked_sub(1),
                ) {
                    self.memory.bind_reference(top, callee, obj);
                }
            }
            Entity::GlobalObject { .. } => {
                self.memory.global_bindings.insert(target, obj);
            }
            // a returned reference travels through the activation's result
            Entity::ReturnObject { .. } => {
                if let Some(f) = self.containing_function(rt) {
                    self.nodes[f.0].result = RtResult::Object(obj);
                }
            }
            _ => {
                self.crash("reference bound to an unexpected entity");
                return;
            }
        }
        self.events.record(
            self.steps_taken,
            Event::ReferenceBound {
                entity: target,
                object: obj,
            },
        );
    }

    fn dealloc_step(
        &mut self,
        rt: RuntimeId,
        state: RtState,
        dealloc: &crate::compiler::constructs::Deallocator,
    ) {
        match state {
            // scope exit is observable even with nothing to destroy
            RtState::Start => {
                self.nodes[rt.0].state = RtState::DeallocTarget(0);
            }
            RtState::DeallocKill(i) => {
                let Some(target) = dealloc.targets.get(i) else {
                    self.nodes[rt.0].finished = true;
                    return;
                };
                let entity = target.entity;
                if self.program.entity(entity).variable_kind() == VariableKind::Reference {
                    match self.program.entity(entity) {
                        Entity::GlobalObject { .. } => {
                            self.memory.global_bindings.remove(&entity);
                        }
                        _ => {
                            if let Some(frame) = self.frame_of(rt) {
                                self.memory.unbind_reference(frame, entity);
                            }
                        }
                    }
                    self.events
                        .record(self.steps_taken, Event::ReferenceUnbound { entity });
                } else if let Some(obj) = self.lookup_object(rt, entity) {
                    self.memory.end_lifetime_recursive(obj);
                    self.events
                        .record(self.steps_taken, Event::LifetimeEnded { object: obj });
                }
                self.nodes[rt.0].state = RtState::DeallocTarget(i + 1);
            }
            _ => {
                self.nodes[rt.0].finished = true;
            }
        }
    }

    fn call_step(
        &mut self,
        rt: RuntimeId,
        state: RtState,
        fc: &crate::compiler::constructs::FunctionCall,
    ) {
        match state {
            RtState::Start => {
                let definition = match self.program.entity(fc.function) {
                    Entity::Function { definition, .. } => *definition,
                    _ => None,
                };
                let Some(def_id) = definition else {
                    self.crash(format!(
                        "call to '{}', which has no body",
                        self.program.entity(fc.function).describe()
                    ));
                    return;
                };
                let def = match &self.program.construct(def_id).kind {
                    ConstructKind::FunctionDef(d) => d.clone(),
                    _ => {
                        self.crash("function entity does not name a function body");
                        return;
                    }
                };

                // the caller owns the temporary a value return lands in
                let mut return_object = None;
                if let Some(te) = fc.return_target {
                    let ent = self.program.entity(te);
                    let (description, ty) = (ent.describe(), ent.ty().clone());
                    let classes = self.program.classes.clone();
                    let obj = self.memory.allocate_temporary(description, &ty, &classes);
                    self.events
                        .record(self.steps_taken, Event::ObjectAllocated { object: obj });
                    let root = self.full_expr_root(rt);
                    self.nodes[root.0].temp_objects.insert(te, obj);
                    self.nodes[rt.0].result = RtResult::Object(obj);
                    return_object = Some(obj);
                }

                let locals: Vec<(EntityId, Type, String)> = def
                    .locals
                    .iter()
                    .map(|&e| {
                        let ent = self.program.entity(e);
                        (e, ent.ty().clone(), ent.describe())
                    })
                    .collect();
                let classes = self.program.classes.clone();
                let receiver = self.nodes[rt.0].receiver;
                let frame = self
                    .memory
                    .push_frame(fc.function, &locals, receiver, return_object, &classes);
                self.nodes[rt.0].frame = Some(frame);
                self.events.record(
                    self.steps_taken,
                    Event::FunctionCalled {
                        function: fc.function,
                    },
                );
                self.nodes[rt.0].state = RtState::CallArguments(0);
            }
            RtState::Ready => {
                let definition = match self.program.entity(fc.function) {
                    Entity::Function { definition, .. } => *definition,
                    _ => None,
                };
                let Some(def_id) = definition else {
                    self.crash("function body disappeared between steps");
                    return;
                };
                let frame = self.nodes[rt.0].frame;
                let receiver = self.nodes[rt.0].receiver;
                let child = self.push_node(def_id, Some(rt));
                self.nodes[child.0].frame = frame;
                self.nodes[child.0].receiver = receiver;
                self.nodes[rt.0].state = RtState::CallBody;
            }
            _ => {
                self.nodes[rt.0].finished = true;
            }
        }
    }

    fn fn_step(
        &mut self,
        rt: RuntimeId,
        state: RtState,
        def: &crate::compiler::constructs::FunctionDef,
    ) {
        match state {
            RtState::FnFlowCheck => {
                let is_main = self.program.main == Some(def.entity);
                if is_main {
                    // main without a return statement returns 0
                    let frame = self.nodes[rt.0].frame;
                    let ret = frame.and_then(|f| self.memory.frame(f).return_object);
                    if let Some(obj) = ret {
                        if self.memory.object(obj).value.is_none() {
                            self.memory.begin_lifetime(obj);
                            self.write_object(obj, Value::Int(0));
                        }
                    }
                } else {
                    self.fault(
                        FaultKind::UndefinedBehavior,
                        format!(
                            "control flowed off the end of '{}' without returning a value",
                            def.name
                        ),
                    );
                }
                self.push_node(def.param_dealloc, Some(rt));
                self.nodes[rt.0].state = RtState::FnParamCleanup;
            }
            _ => {
                self.nodes[rt.0].finished = true;
            }
        }
    }

    // ------------------------------------------------------------- leak check

    /// Report live heap allocations no longer reachable from any root:
    /// frames, statics, string literals, live evaluation state, and pointer
    /// chains out of all of those.
    fn leak_check(&mut self) {
        let mut work: Vec<ObjectId> = Vec::new();
        work.extend(self.memory.statics.values().copied());
        work.extend(self.memory.global_bindings.values().copied());
        work.extend(self.memory.string_literal_objects.iter().copied());
        work.extend(self.pending_news.iter().copied());
        for frame in &self.memory.frames {
            work.extend(frame.objects.values().copied());
            work.extend(frame.bindings.values().copied());
            work.extend(frame.receiver);
            work.extend(frame.return_object);
        }

        let follow_result = |result: RtResult, work: &mut Vec<ObjectId>, extra: &mut Vec<u64>| {
            match result {
                RtResult::Object(o) => work.push(o),
                RtResult::Value(Value::Pointer(p)) if p != 0 => extra.push(p),
                _ => {}
            }
        };
        let mut addresses: Vec<u64> = Vec::new();
        for &rt in &self.stack {
            let node = &self.nodes[rt.0];
            follow_result(node.result, &mut work, &mut addresses);
            work.extend(node.temp_objects.values().copied());
            work.extend(node.allocated);
            work.extend(node.receiver);
            work.extend(node.pending_dtors.iter().copied());
            // results of already-popped operands the instance still holds
            for &child in &node.children {
                follow_result(self.nodes[child.0].result, &mut work, &mut addresses);
            }
        }
        for addr in addresses {
            work.extend(self.memory.owner_of_address(addr));
        }

        let mut reachable: FxHashSet<ObjectId> = FxHashSet::default();
        while let Some(id) = work.pop() {
            if !reachable.insert(id) {
                continue;
            }
            let obj = self.memory.object(id);
            match &obj.subobjects {
                crate::memory::SubObjects::Array(elements) => work.extend(elements.iter().copied()),
                crate::memory::SubObjects::Class { base, members } => {
                    work.extend(base.iter().copied());
                    work.extend(members.iter().map(|&(_, m)| m));
                }
                crate::memory::SubObjects::None => {}
            }
            if obj.is_alive() {
                if let Some(Value::Pointer(p)) = obj.value {
                    if p != 0 {
                        work.extend(self.memory.owner_of_address(p));
                    }
                }
            }
        }

        let heap: Vec<ObjectId> = self.memory.heap_allocations().collect();
        for id in heap {
            if self.memory.object(id).is_alive()
                && !reachable.contains(&id)
                && self.leaked_reported.insert(id)
            {
                let addr = self.memory.object(id).address;
                self.fault(
                    FaultKind::MemoryLeak,
                    format!("the allocation at {addr:#x} is no longer reachable"),
                );
            }
        }
    }
}

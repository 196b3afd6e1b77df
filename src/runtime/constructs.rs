//! Runtime construct instances
//!
//! Each time execution reaches a semantic construct, the simulation creates
//! a fresh [`RuntimeConstruct`] instance for it and pushes it on the
//! execution stack.  The instance carries the per-execution state: where it
//! is in its own little state machine, the result it produced, and any
//! objects it is responsible for (materialized temporaries, a pushed stack
//! frame, a pending heap allocation).
//!
//! Instances are kept in an arena and never removed, so a parent can read a
//! popped child's result and the whole execution remains inspectable.

use rustc_hash::FxHashMap;

use crate::compiler::constructs::ConstructId;
use crate::compiler::entities::EntityId;
use crate::memory::{ObjectId, Value};

/// Index of a runtime instance in the simulation's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuntimeId(pub usize);

/// What an expression-like instance produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RtResult {
    None,
    Value(Value),
    Object(ObjectId),
}

/// Where an instance is in its execution.  The variants are shared across
/// construct kinds; each kind uses the subset that fits its protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtState {
    /// Created, nothing done yet
    Start,
    /// Waiting on (or about to push) operand / statement / initializer `i`
    At(usize),
    /// All operands done; one compute step pending
    Ready,
    /// Function call: parameter initializer `i`
    CallArguments(usize),
    /// Function call: callee pushed
    CallBody,
    /// Function: member initializer `i` (constructors)
    FnMemberInits(usize),
    FnBody,
    /// Function: member deallocator pushed (destructors)
    FnMemberCleanup,
    /// Function: missing-return handling step pending
    FnFlowCheck,
    FnParamCleanup,
    LoopCondition,
    /// Loop condition evaluated; the continue/exit decision step is pending
    LoopDecide,
    LoopBody,
    /// If condition evaluated; the branch decision step is pending
    BranchDecide,
    /// Chosen branch pushed
    Branch,
    /// Deallocator: considering target `i`
    DeallocTarget(usize),
    /// Deallocator: destructor `k` of target `i` pushed
    DeallocDtor(usize, usize),
    /// Deallocator: target `i` resolved and alive; the kill step is pending
    DeallocKill(usize),
    /// New: allocation done, initializer pushed
    NewInit,
    /// Delete: operand evaluated; the validation step is pending
    DeleteValidate,
    /// Delete: `remaining` destructor calls left to push
    DeleteDtors(usize),
    /// Delete: destruction done; the free step is pending
    DeleteFree,
}

#[derive(Debug, Clone)]
pub struct RuntimeConstruct {
    pub id: RuntimeId,
    pub model: ConstructId,
    pub parent: Option<RuntimeId>,
    /// Children pushed so far, in push order
    pub children: Vec<RuntimeId>,
    pub state: RtState,
    pub result: RtResult,
    /// Set when the instance has nothing left to do and should be popped
    pub finished: bool,
    /// Full-expression roots: temporary deallocator already pushed
    pub temp_dealloc_pushed: bool,
    /// Full-expression roots: materialized temporaries by entity
    pub temp_objects: FxHashMap<EntityId, ObjectId>,
    /// Function calls and function instances: the stack frame index
    pub frame: Option<usize>,
    /// Receiver object for member function calls, set by whoever pushed the
    /// call
    pub receiver: Option<ObjectId>,
    /// New and delete expressions: the heap allocation being worked on
    pub allocated: Option<ObjectId>,
    /// Delete expressions: receivers of the destructor calls still to push,
    /// in destruction order
    pub pending_dtors: Vec<ObjectId>,
    /// Function instances: a return statement has completed
    pub returned: bool,
}

impl RuntimeConstruct {
    pub fn new(id: RuntimeId, model: ConstructId, parent: Option<RuntimeId>) -> RuntimeConstruct {
        RuntimeConstruct {
            id,
            model,
            parent,
            children: Vec::new(),
            state: RtState::Start,
            result: RtResult::None,
            finished: false,
            temp_dealloc_pushed: false,
            temp_objects: FxHashMap::default(),
            frame: None,
            receiver: None,
            allocated: None,
            pending_dtors: Vec::new(),
            returned: false,
        }
    }

    pub fn last_child(&self) -> Option<RuntimeId> {
        self.children.last().copied()
    }
}

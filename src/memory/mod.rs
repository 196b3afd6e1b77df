//! The runtime memory model
//!
//! An explicit, observable model of program memory: a flat object arena,
//! stack frames mapping entities to objects, a heap keyed by address, and
//! static storage for globals and string literals.
//!
//! Addresses are synthetic but stable: statics low, the stack in the
//! middle, the heap high.  Objects are laid out packed (no padding), with
//! subobjects at their natural offsets, so pointer arithmetic behaves the
//! way the type sizes promise.
//!
//! Nothing is ever removed from the arena.  Releasing storage turns objects
//! into tombstones, and the address index keeps mapping their addresses to
//! them, which is how a dangling pointer dereference or a double free can be
//! reported precisely instead of failing silently.

pub mod objects;
pub mod value;

pub use objects::{CppObject, Lifetime, ObjectId, StorageKind, SubObjects};
pub use value::{Address, Value};

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::trace;

use crate::compiler::entities::EntityId;
use crate::types::{ClassDefinition, Type};

/// Base address of static storage
pub const STATIC_BASE: Address = 0x1000;
/// Base address of the stack region
pub const STACK_BASE: Address = 0x10_0000;
/// Base address of the heap region
pub const HEAP_BASE: Address = 0x8000_0000;

/// A memory operation that would be undefined or unspecified behavior in a
/// real execution.  The simulation turns these into events rather than
/// aborting.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MemoryError {
    #[error("use of {description}, whose lifetime has ended")]
    DeadObject { description: String },
    #[error("use of the indeterminate value of {description}")]
    IndeterminateValue { description: String },
    #[error("no object exists at address {address:#x}")]
    InvalidAddress { address: Address },
}

/// One function activation's storage
#[derive(Debug, Clone)]
pub struct StackFrame {
    pub function: EntityId,
    /// Frame entities that own storage
    pub objects: FxHashMap<EntityId, ObjectId>,
    /// Reference entities bound so far in this activation
    pub bindings: FxHashMap<EntityId, ObjectId>,
    /// The receiver object for member function activations
    pub receiver: Option<ObjectId>,
    /// Where a value return lands; owned by the caller
    pub return_object: Option<ObjectId>,
    base: Address,
}

#[derive(Debug, Clone, Default)]
pub struct Memory {
    objects: Vec<CppObject>,
    /// Every object ever created at an address, oldest first.  Later entries
    /// shadow earlier tombstones when storage is reused.
    addr_index: FxHashMap<Address, Vec<ObjectId>>,
    pub frames: Vec<StackFrame>,
    /// Heap allocations by address, tombstones included
    heap: FxHashMap<Address, ObjectId>,
    /// Objects of static storage duration, by entity
    pub statics: FxHashMap<EntityId, ObjectId>,
    /// Bindings of global references
    pub global_bindings: FxHashMap<EntityId, ObjectId>,
    pub string_literal_objects: Vec<ObjectId>,
    next_static: Address,
    next_stack: Address,
    next_heap: Address,
}

impl Memory {
    pub fn new() -> Memory {
        Memory {
            next_static: STATIC_BASE,
            next_stack: STACK_BASE,
            next_heap: HEAP_BASE,
            ..Memory::default()
        }
    }

    pub fn object(&self, id: ObjectId) -> &CppObject {
        &self.objects[id.0]
    }

    pub fn object_mut(&mut self, id: ObjectId) -> &mut CppObject {
        &mut self.objects[id.0]
    }

    pub fn objects(&self) -> &[CppObject] {
        &self.objects
    }

    // ------------------------------------------------------------ allocation

    /// Create an object (and its whole subobject tree) at `address`
    fn create(
        &mut self,
        ty: &Type,
        address: Address,
        storage: StorageKind,
        name: Option<String>,
        classes: &[ClassDefinition],
    ) -> ObjectId {
        let id = ObjectId(self.objects.len());
        self.objects.push(CppObject {
            id,
            address,
            size: ty.size(classes),
            ty: ty.clone(),
            storage,
            lifetime: Lifetime::NotYetAlive,
            value: None,
            subobjects: SubObjects::None,
            name: name.clone(),
        });
        self.addr_index.entry(address).or_default().push(id);

        let subobjects = match ty {
            Type::BoundedArray { elem, len } => {
                let elem_size = elem.size(classes) as Address;
                let elements = (0..*len)
                    .map(|i| {
                        let elem_name = name.as_ref().map(|n| format!("{n}[{i}]"));
                        self.create(
                            elem,
                            address + i as Address * elem_size,
                            StorageKind::Subobject { of: id },
                            elem_name,
                            classes,
                        )
                    })
                    .collect();
                SubObjects::Array(elements)
            }
            Type::Class { class, .. } => {
                let def = &classes[class.0];
                let mut offset = 0 as Address;
                let base = def.base.map(|b| {
                    let base_ty = Type::class(b);
                    let base_size = base_ty.size(classes) as Address;
                    let o = self.create(
                        &base_ty,
                        address,
                        StorageKind::Subobject { of: id },
                        name.as_ref().map(|n| format!("{n}::[base]")),
                        classes,
                    );
                    offset += base_size;
                    o
                });
                let mut members = Vec::new();
                for m in def.members.clone() {
                    let member_name = name.as_ref().map(|n| format!("{n}.{}", m.name));
                    let o = self.create(
                        &m.ty,
                        address + offset,
                        StorageKind::Subobject { of: id },
                        member_name,
                        classes,
                    );
                    offset += m.ty.size(classes) as Address;
                    members.push((m.name.clone(), o));
                }
                SubObjects::Class { base, members }
            }
            _ => SubObjects::None,
        };
        self.objects[id.0].subobjects = subobjects;
        id
    }

    pub fn allocate_static(
        &mut self,
        entity: EntityId,
        name: String,
        ty: &Type,
        classes: &[ClassDefinition],
    ) -> ObjectId {
        let address = self.next_static;
        self.next_static += ty.size(classes).max(1) as Address;
        let id = self.create(ty, address, StorageKind::Static, Some(name), classes);
        self.statics.insert(entity, id);
        id
    }

    /// String literals live in static storage, already alive and filled in
    pub fn allocate_string_literal(
        &mut self,
        bytes: &[i8],
        classes: &[ClassDefinition],
    ) -> ObjectId {
        let ty = Type::array_of(Type::char_().with_const(true), bytes.len());
        let address = self.next_static;
        self.next_static += bytes.len().max(1) as Address;
        let id = self.create(&ty, address, StorageKind::Static, None, classes);
        self.begin_lifetime_recursive(id);
        if let SubObjects::Array(elements) = self.objects[id.0].subobjects.clone() {
            for (&b, e) in bytes.iter().zip(elements) {
                self.objects[e.0].value = Some(Value::Char(b));
            }
        }
        self.string_literal_objects.push(id);
        id
    }

    pub fn allocate_temporary(
        &mut self,
        description: String,
        ty: &Type,
        classes: &[ClassDefinition],
    ) -> ObjectId {
        let address = self.next_stack;
        self.next_stack += ty.size(classes).max(1) as Address;
        self.create(ty, address, StorageKind::Temporary, Some(description), classes)
    }

    pub fn allocate_heap(
        &mut self,
        ty: &Type,
        array_allocation: bool,
        classes: &[ClassDefinition],
    ) -> ObjectId {
        let address = self.next_heap;
        self.next_heap += ty.size(classes).max(1) as Address;
        let id = self.create(
            ty,
            address,
            StorageKind::Dynamic { array_allocation },
            None,
            classes,
        );
        self.heap.insert(address, id);
        trace!(address, "heap allocation");
        id
    }

    /// Release a heap allocation's storage.  The object stays in the heap
    /// map as a tombstone so a second delete of the same address can be
    /// diagnosed.
    pub fn free_heap(&mut self, id: ObjectId) {
        self.end_lifetime_recursive(id);
        trace!(address = self.objects[id.0].address, "heap free");
    }

    /// The heap allocation whose storage starts at `address`, alive or not
    pub fn heap_allocation_at(&self, address: Address) -> Option<ObjectId> {
        self.heap.get(&address).copied()
    }

    pub fn heap_allocations(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.heap.values().copied()
    }

    // ---------------------------------------------------------------- frames

    pub fn push_frame(
        &mut self,
        function: EntityId,
        locals: &[(EntityId, Type, String)],
        receiver: Option<ObjectId>,
        return_object: Option<ObjectId>,
        classes: &[ClassDefinition],
    ) -> usize {
        let base = self.next_stack;
        let mut objects = FxHashMap::default();
        for (entity, ty, name) in locals {
            if ty.is_reference() {
                continue;
            }
            let address = self.next_stack;
            self.next_stack += ty.size(classes).max(1) as Address;
            let id = self.create(ty, address, StorageKind::Automatic, Some(name.clone()), classes);
            objects.insert(*entity, id);
        }
        self.frames.push(StackFrame {
            function,
            objects,
            bindings: FxHashMap::default(),
            receiver,
            return_object,
            base,
        });
        self.frames.len() - 1
    }

    /// Pop the top frame, tombstoning anything still alive in it and
    /// releasing its addresses for reuse.
    pub fn pop_frame(&mut self) {
        if let Some(frame) = self.frames.pop() {
            let roots: Vec<ObjectId> = frame.objects.values().copied().collect();
            for id in roots {
                self.end_lifetime_recursive(id);
            }
            self.next_stack = frame.base;
        }
    }

    pub fn top_frame(&self) -> Option<&StackFrame> {
        self.frames.last()
    }

    pub fn frame(&self, index: usize) -> &StackFrame {
        &self.frames[index]
    }

    pub fn bind_reference(&mut self, frame: usize, entity: EntityId, object: ObjectId) {
        self.frames[frame].bindings.insert(entity, object);
    }

    pub fn unbind_reference(&mut self, frame: usize, entity: EntityId) {
        self.frames[frame].bindings.remove(&entity);
    }

    /// Look an entity up in a frame: owned objects first, then bindings
    pub fn lookup_in_frame(&self, frame: usize, entity: EntityId) -> Option<ObjectId> {
        let f = &self.frames[frame];
        f.objects
            .get(&entity)
            .or_else(|| f.bindings.get(&entity))
            .copied()
    }

    // -------------------------------------------------------------- lifetime

    pub fn begin_lifetime(&mut self, id: ObjectId) {
        self.objects[id.0].lifetime = Lifetime::Alive;
    }

    pub fn begin_lifetime_recursive(&mut self, id: ObjectId) {
        self.objects[id.0].lifetime = Lifetime::Alive;
        for child in self.children(id) {
            self.begin_lifetime_recursive(child);
        }
    }

    pub fn end_lifetime_recursive(&mut self, id: ObjectId) {
        self.objects[id.0].lifetime = Lifetime::Dead;
        for child in self.children(id) {
            self.end_lifetime_recursive(child);
        }
    }

    /// Begin the lifetime of the whole tree with every atomic leaf zeroed
    pub fn zero_fill(&mut self, id: ObjectId) {
        self.objects[id.0].lifetime = Lifetime::Alive;
        if let Some(atomic) = self.objects[id.0].ty.as_atomic() {
            self.objects[id.0].value = Some(Value::zero_of(atomic));
        } else if self.objects[id.0].ty.is_pointer() {
            self.objects[id.0].value = Some(Value::Pointer(0));
        }
        for child in self.children(id) {
            self.zero_fill(child);
        }
    }

    /// Make the object's value indeterminate again (default initialization
    /// of an atomic object, including re-initialization in a loop)
    pub fn clear_value(&mut self, id: ObjectId) {
        self.objects[id.0].value = None;
    }

    pub fn clear_values_recursive(&mut self, id: ObjectId) {
        self.objects[id.0].value = None;
        for child in self.children(id) {
            self.clear_values_recursive(child);
        }
    }

    fn children(&self, id: ObjectId) -> Vec<ObjectId> {
        match &self.objects[id.0].subobjects {
            SubObjects::None => Vec::new(),
            SubObjects::Array(elements) => elements.clone(),
            SubObjects::Class { base, members } => base
                .iter()
                .copied()
                .chain(members.iter().map(|&(_, m)| m))
                .collect(),
        }
    }

    // ------------------------------------------------------------ data access

    pub fn read_value(&self, id: ObjectId) -> Result<Value, MemoryError> {
        let obj = &self.objects[id.0];
        if obj.is_dead() {
            return Err(MemoryError::DeadObject {
                description: obj.describe(),
            });
        }
        obj.value.ok_or_else(|| MemoryError::IndeterminateValue {
            description: obj.describe(),
        })
    }

    pub fn write_value(&mut self, id: ObjectId, value: Value) -> Result<(), MemoryError> {
        let obj = &mut self.objects[id.0];
        if obj.is_dead() {
            return Err(MemoryError::DeadObject {
                description: obj.describe(),
            });
        }
        obj.value = Some(value);
        Ok(())
    }

    /// The root allocation (or named object) whose storage contains the
    /// given address.  Follows the subobject chain upward from whatever was
    /// created there most recently.
    pub fn owner_of_address(&self, address: Address) -> Option<ObjectId> {
        let mut id = *self.addr_index.get(&address)?.last()?;
        loop {
            match self.objects[id.0].storage {
                StorageKind::Subobject { of } => id = of,
                _ => return Some(id),
            }
        }
    }

    /// The object of (roughly) the given type whose storage starts at
    /// `address`.  The newest object wins, so pointers into reused storage
    /// resolve to the current occupant, and a matching tombstone is still
    /// returned so the caller can report use-after-free.
    pub fn find_object(&self, address: Address, ty: &Type) -> Result<ObjectId, MemoryError> {
        let candidates = self
            .addr_index
            .get(&address)
            .ok_or(MemoryError::InvalidAddress { address })?;
        candidates
            .iter()
            .rev()
            .find(|&&id| self.objects[id.0].ty.same_type_as(ty))
            .or_else(|| candidates.last())
            .copied()
            .ok_or(MemoryError::InvalidAddress { address })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClassMember;

    #[test]
    fn static_objects_get_distinct_addresses() {
        let mut mem = Memory::new();
        let a = mem.allocate_static(EntityId(0), "a".into(), &Type::int(), &[]);
        let b = mem.allocate_static(EntityId(1), "b".into(), &Type::int(), &[]);
        assert_eq!(mem.object(a).address, STATIC_BASE);
        assert_eq!(mem.object(b).address, STATIC_BASE + 4);
    }

    #[test]
    fn array_elements_are_laid_out_contiguously() {
        let mut mem = Memory::new();
        let arr = mem.allocate_static(EntityId(0), "xs".into(), &Type::array_of(Type::int(), 3), &[]);
        let base = mem.object(arr).address;
        for i in 0..3 {
            let e = mem.object(arr).element(i).unwrap();
            assert_eq!(mem.object(e).address, base + 4 * i as Address);
        }
    }

    #[test]
    fn class_members_follow_the_base_subobject() {
        let base_class = ClassDefinition {
            id: crate::types::ClassId(0),
            name: "B".into(),
            base: None,
            members: vec![ClassMember {
                name: "b".into(),
                ty: Type::int(),
            }],
            constructors: vec![],
            destructor: None,
            has_user_constructor: false,
            has_user_copy_constructor: false,
            has_user_destructor: false,
            location: Default::default(),
        };
        let derived = ClassDefinition {
            id: crate::types::ClassId(1),
            name: "D".into(),
            base: Some(crate::types::ClassId(0)),
            members: vec![ClassMember {
                name: "d".into(),
                ty: Type::char_(),
            }],
            constructors: vec![],
            destructor: None,
            has_user_constructor: false,
            has_user_copy_constructor: false,
            has_user_destructor: false,
            location: Default::default(),
        };
        let classes = vec![base_class, derived];
        let mut mem = Memory::new();
        let obj = mem.allocate_static(
            EntityId(0),
            "d".into(),
            &Type::class(crate::types::ClassId(1)),
            &classes,
        );
        let addr = mem.object(obj).address;
        let base = mem.object(obj).base_subobject().unwrap();
        let member = mem.object(obj).member("d").unwrap();
        assert_eq!(mem.object(base).address, addr);
        assert_eq!(mem.object(member).address, addr + 4);
    }

    #[test]
    fn reading_before_initialization_is_indeterminate() {
        let mut mem = Memory::new();
        let a = mem.allocate_static(EntityId(0), "a".into(), &Type::int(), &[]);
        mem.begin_lifetime(a);
        assert!(matches!(
            mem.read_value(a),
            Err(MemoryError::IndeterminateValue { .. })
        ));
        mem.write_value(a, Value::Int(5)).unwrap();
        assert_eq!(mem.read_value(a).unwrap(), Value::Int(5));
    }

    #[test]
    fn dead_objects_reject_reads_and_writes() {
        let mut mem = Memory::new();
        let a = mem.allocate_heap(&Type::int(), false, &[]);
        mem.begin_lifetime(a);
        mem.write_value(a, Value::Int(1)).unwrap();
        mem.free_heap(a);
        assert!(matches!(
            mem.read_value(a),
            Err(MemoryError::DeadObject { .. })
        ));
        assert!(matches!(
            mem.write_value(a, Value::Int(2)),
            Err(MemoryError::DeadObject { .. })
        ));
    }

    #[test]
    fn popped_frames_tombstone_their_locals() {
        let mut mem = Memory::new();
        let locals = vec![(EntityId(0), Type::int(), "x".to_string())];
        mem.push_frame(EntityId(9), &locals, None, None, &[]);
        let x = mem.lookup_in_frame(0, EntityId(0)).unwrap();
        mem.begin_lifetime(x);
        mem.pop_frame();
        assert!(mem.object(x).is_dead());
        assert!(mem.frames.is_empty());
    }

    #[test]
    fn stack_addresses_are_reused_after_pop() {
        let mut mem = Memory::new();
        let locals = vec![(EntityId(0), Type::int(), "x".to_string())];
        mem.push_frame(EntityId(9), &locals, None, None, &[]);
        let first = mem.lookup_in_frame(0, EntityId(0)).unwrap();
        let first_addr = mem.object(first).address;
        mem.pop_frame();
        mem.push_frame(EntityId(9), &locals, None, None, &[]);
        let second = mem.lookup_in_frame(0, EntityId(0)).unwrap();
        assert_eq!(mem.object(second).address, first_addr);
        // the newest occupant shadows the tombstone
        assert_eq!(mem.find_object(first_addr, &Type::int()).unwrap(), second);
    }

    #[test]
    fn string_literal_bytes_include_the_null() {
        let mut mem = Memory::new();
        let s = mem.allocate_string_literal(&[104, 105, 0], &[]);
        let values: Vec<Value> = (0..3)
            .map(|i| {
                let e = mem.object(s).element(i).unwrap();
                mem.read_value(e).unwrap()
            })
            .collect();
        assert_eq!(
            values,
            vec![Value::Char(104), Value::Char(105), Value::Char(0)]
        );
    }
}

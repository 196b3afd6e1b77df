//! Runtime objects
//!
//! Every region of storage the simulation knows about is a [`CppObject`]:
//! named locals and globals, heap allocations, temporaries, and all of their
//! subobjects (array elements, class members, base subobjects).  Objects are
//! never removed from the arena once created; an object whose storage is
//! released becomes a tombstone, which is what makes use-after-free and
//! double-free diagnosable instead of silent.

use crate::memory::value::{Address, Value};
use crate::types::Type;

/// Index of an object in the memory arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub usize);

/// Where an object's storage comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// A local in some stack frame
    Automatic,
    /// Static storage duration: globals and string literals
    Static,
    /// Heap storage from `new`; `array_allocation` distinguishes `new T[n]`
    /// so that the matching delete form can be checked
    Dynamic { array_allocation: bool },
    /// A materialized temporary, owned by a full expression
    Temporary,
    /// Part of another object's storage
    Subobject { of: ObjectId },
}

/// The lifetime state of an object, separate from its storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Storage exists but no initializer has completed yet
    NotYetAlive,
    Alive,
    /// Lifetime ended; reads and writes are undefined behavior
    Dead,
}

/// The subobject structure of a compound object
#[derive(Debug, Clone)]
pub enum SubObjects {
    None,
    Array(Vec<ObjectId>),
    Class {
        base: Option<ObjectId>,
        members: Vec<(String, ObjectId)>,
    },
}

#[derive(Debug, Clone)]
pub struct CppObject {
    pub id: ObjectId,
    pub address: Address,
    pub size: usize,
    pub ty: Type,
    pub storage: StorageKind,
    pub lifetime: Lifetime,
    /// Atomic leaves only; `None` means the value is indeterminate
    pub value: Option<Value>,
    pub subobjects: SubObjects,
    /// Display name, when the object corresponds to something nameable
    pub name: Option<String>,
}

impl CppObject {
    pub fn is_alive(&self) -> bool {
        self.lifetime == Lifetime::Alive
    }

    pub fn is_dead(&self) -> bool {
        self.lifetime == Lifetime::Dead
    }

    /// The member subobject with the given name, if this is a class object
    pub fn member(&self, name: &str) -> Option<ObjectId> {
        match &self.subobjects {
            SubObjects::Class { members, .. } => members
                .iter()
                .find(|(n, _)| n == name)
                .map(|&(_, id)| id),
            _ => None,
        }
    }

    pub fn element(&self, index: usize) -> Option<ObjectId> {
        match &self.subobjects {
            SubObjects::Array(elements) => elements.get(index).copied(),
            _ => None,
        }
    }

    pub fn base_subobject(&self) -> Option<ObjectId> {
        match &self.subobjects {
            SubObjects::Class { base, .. } => *base,
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match &self.name {
            Some(n) => n.clone(),
            None => format!("object at {:#x}", self.address),
        }
    }
}

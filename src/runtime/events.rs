//! Simulation events
//!
//! Everything observable the simulation does is appended to the
//! [`EventLog`], tagged with the step at which it happened: construct
//! lifecycle, object lifecycle, reads and writes, and faults.  Faults are
//! events like any other; the simulation keeps running after reporting one
//! (except a crash), which lets a lesson show what the undefined behavior
//! actually did.

use crate::compiler::constructs::ConstructId;
use crate::compiler::entities::EntityId;
use crate::memory::{ObjectId, Value};

/// The behavior taxonomy for fault events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    UndefinedBehavior,
    UnspecifiedBehavior,
    ImplementationDefinedBehavior,
    MemoryLeak,
    AssertionFailure,
    Crash,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ConstructPushed { construct: ConstructId },
    ConstructPopped { construct: ConstructId },
    ObjectAllocated { object: ObjectId },
    ObjectDeallocated { object: ObjectId },
    LifetimeBegan { object: ObjectId },
    LifetimeEnded { object: ObjectId },
    ValueRead { object: ObjectId, value: Value },
    ValueWritten { object: ObjectId, value: Value },
    ReferenceBound { entity: EntityId, object: ObjectId },
    ReferenceUnbound { entity: EntityId },
    FunctionCalled { function: EntityId },
    FunctionReturned { function: EntityId },
    Fault { kind: FaultKind, message: String },
}

/// The append-only record of everything that happened, by step
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<(usize, Event)>,
}

impl EventLog {
    pub fn new() -> EventLog {
        EventLog::default()
    }

    pub fn record(&mut self, step: usize, event: Event) {
        self.events.push((step, event));
    }

    pub fn iter(&self) -> impl Iterator<Item = &(usize, Event)> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn faults(&self) -> impl Iterator<Item = (usize, FaultKind, &str)> {
        self.events.iter().filter_map(|(step, e)| match e {
            Event::Fault { kind, message } => Some((*step, *kind, message.as_str())),
            _ => None,
        })
    }

    pub fn has_fault(&self, kind: FaultKind) -> bool {
        self.faults().any(|(_, k, _)| k == kind)
    }

    pub fn fault_count(&self, kind: FaultKind) -> usize {
        self.faults().filter(|&(_, k, _)| k == kind).count()
    }

    /// Events recorded during the given step
    pub fn at_step(&self, step: usize) -> impl Iterator<Item = &Event> {
        self.events
            .iter()
            .filter(move |(s, _)| *s == step)
            .map(|(_, e)| e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_queries_filter_by_kind() {
        let mut log = EventLog::new();
        log.record(
            1,
            Event::Fault {
                kind: FaultKind::UndefinedBehavior,
                message: "bad".into(),
            },
        );
        log.record(
            2,
            Event::Fault {
                kind: FaultKind::MemoryLeak,
                message: "leak".into(),
            },
        );
        assert!(log.has_fault(FaultKind::UndefinedBehavior));
        assert!(log.has_fault(FaultKind::MemoryLeak));
        assert!(!log.has_fault(FaultKind::Crash));
        assert_eq!(log.fault_count(FaultKind::UndefinedBehavior), 1);
    }
}

//! Deallocator compilation
//!
//! A deallocator is a compiled construct that ends the lifetimes of a fixed
//! set of objects in reverse declaration order, pushing destructor calls for
//! class-typed targets as it goes.  One is compiled for every place object
//! lifetimes end in a structured way: block exit (locals), full-expression
//! end (temporaries), function return (parameters), destructor completion
//! (member subobjects), and program end (statics).
//!
//! At runtime a deallocator always takes at least one step, even when it has
//! nothing to destroy, so that scope exit is an observable event.

use crate::ast::SourceLocation;
use crate::compiler::constructs::{
    ConstructId, ConstructKind, DeallocKind, DeallocTarget, Deallocator, DtorCall,
};
use crate::compiler::entities::{Entity, EntityId};
use crate::compiler::expressions::compile_call;
use crate::compiler::notes::Note;
use crate::compiler::Compilation;
use crate::types::ClassId;

/// Build the destructor calls for one deallocation target, based on its
/// type: one call for a class object, one per element (highest index first)
/// for an array of class objects, none otherwise.
fn dtors_for(
    cmp: &mut Compilation,
    node: ConstructId,
    entity: EntityId,
    location: SourceLocation,
) -> Vec<DtorCall> {
    let ty = cmp.entity(entity).ty().clone();

    if let Some(class) = ty.class_id() {
        return match cmp.class(class).destructor {
            Some(dtor) => {
                let call = compile_call(cmp, dtor, Vec::new(), location);
                cmp.attach(node, call);
                vec![DtorCall {
                    receiver: entity,
                    call,
                }]
            }
            None => {
                let name = ty.describe(&cmp.classes);
                cmp.note(node, Note::no_destructor(&name));
                Vec::new()
            }
        };
    }

    if let (Some(elem), Some(len)) = (ty.elem_type().cloned(), ty.array_len()) {
        if let Some(class) = elem.class_id() {
            let Some(dtor) = cmp.class(class).destructor else {
                let name = elem.describe(&cmp.classes);
                cmp.note(node, Note::no_destructor(&name));
                return Vec::new();
            };
            return (0..len)
                .rev()
                .map(|index| {
                    let receiver = cmp.add_entity(Entity::ArraySubobject {
                        of: entity,
                        index,
                        ty: elem.clone(),
                    });
                    let call = compile_call(cmp, dtor, Vec::new(), location);
                    cmp.attach(node, call);
                    DtorCall { receiver, call }
                })
                .collect();
        }
    }

    Vec::new()
}

/// Compile a deallocator for `entities`, given in declaration order; the
/// deallocator destroys them back to front.
pub fn compile_deallocator(
    cmp: &mut Compilation,
    kind: DeallocKind,
    entities: &[EntityId],
    location: SourceLocation,
) -> ConstructId {
    let node = cmp.add_construct(
        ConstructKind::Deallocator(Deallocator {
            kind,
            targets: Vec::new(),
        }),
        Some(location),
    );
    let targets: Vec<DeallocTarget> = entities
        .iter()
        .rev()
        .map(|&entity| {
            let dtors = dtors_for(cmp, node, entity, location);
            DeallocTarget { entity, dtors }
        })
        .collect();
    if let ConstructKind::Deallocator(d) = &mut cmp.construct_mut(node).kind {
        d.targets = targets;
    }
    node
}

/// The temporary deallocator sealed onto a full-expression root.
/// Temporaries die in reverse creation order.
pub fn compile_temporary_deallocator(cmp: &mut Compilation, temps: &[EntityId]) -> ConstructId {
    compile_deallocator(cmp, DeallocKind::Temporaries, temps, SourceLocation::default())
}

/// Destroys a constructor's receiver subobjects after the destructor body:
/// members in reverse declaration order, then the base subobject.
pub fn compile_member_deallocator(
    cmp: &mut Compilation,
    receiver: EntityId,
    class: ClassId,
    location: SourceLocation,
) -> ConstructId {
    let def = cmp.class(class);
    let base = def.base;
    let members: Vec<(String, crate::types::Type)> = def
        .members
        .iter()
        .map(|m| (m.name.clone(), m.ty.clone()))
        .collect();

    // declaration order here; compile_deallocator reverses, so the base
    // (constructed first) goes in front and dies last
    let mut entities = Vec::new();
    if let Some(base_class) = base {
        entities.push(cmp.add_entity(Entity::BaseSubobject {
            of: receiver,
            class: base_class,
            ty: crate::types::Type::class(base_class),
        }));
    }
    for (name, ty) in members {
        entities.push(cmp.add_entity(Entity::MemberSubobject {
            of: receiver,
            name,
            ty,
        }));
    }
    compile_deallocator(cmp, DeallocKind::Members, &entities, location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn targets_are_reversed_into_destruction_order() {
        let mut cmp = Compilation::new();
        let a = cmp.add_entity(Entity::LocalObject {
            name: "a".to_string(),
            ty: Type::int(),
        });
        let b = cmp.add_entity(Entity::LocalObject {
            name: "b".to_string(),
            ty: Type::int(),
        });
        let d = compile_deallocator(
            &mut cmp,
            DeallocKind::Locals,
            &[a, b],
            SourceLocation::default(),
        );
        match &cmp.construct(d).kind {
            ConstructKind::Deallocator(de) => {
                assert_eq!(de.targets.len(), 2);
                assert_eq!(de.targets[0].entity, b);
                assert_eq!(de.targets[1].entity, a);
                assert!(de.targets.iter().all(|t| t.dtors.is_empty()));
            }
            _ => panic!("not a deallocator"),
        }
    }

    #[test]
    fn empty_deallocator_compiles_with_no_targets() {
        let mut cmp = Compilation::new();
        let d = compile_temporary_deallocator(&mut cmp, &[]);
        match &cmp.construct(d).kind {
            ConstructKind::Deallocator(de) => assert!(de.targets.is_empty()),
            _ => panic!("not a deallocator"),
        }
    }
}

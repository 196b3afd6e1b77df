//! Declaration compilation
//!
//! Variables, functions, and classes.  Functions and classes are processed
//! in two passes by [`super::program`]: registration first (names, entity
//! signatures, class layouts), then bodies, so that declaration order never
//! matters for calls between functions.
//!
//! Classes get their special members completed here: an implicit default
//! constructor when the user wrote none, an implicit destructor when the
//! user wrote none, and a rule-of-three check when a user destructor exists
//! without a user copy constructor.

use crate::ast::{
    BaseTypeSpec, ClassAst, FunctionAst, MemberAst, MemberInitAst, ParamAst, SourceLocation,
    StmtAst, TypeSpec, VarDeclAst,
};
use crate::compiler::constructs::{
    ConstructId, ConstructKind, DeallocKind, Declaration, FunctionDef, StorageDuration,
};
use crate::compiler::deallocators::{compile_deallocator, compile_member_deallocator};
use crate::compiler::entities::{Entity, EntityId, FunctionKind, FunctionSignature, ScopeId};
use crate::compiler::expressions::{compile_expr, ExprContext};
use crate::compiler::initializers;
use crate::compiler::notes::{Note, NoteKind};
use crate::compiler::statements::{compile_block, FnBody};
use crate::compiler::Compilation;
use crate::types::{ClassDefinition, ClassId, ClassMember, Type};

/// Resolve type syntax against the class registry.
///
/// Declarator layering: base, then const, then pointers, then array
/// dimensions (outermost first), then an outermost reference.
pub fn resolve_type(cmp: &Compilation, spec: &TypeSpec) -> Result<Type, Note> {
    let mut ty = match &spec.base {
        BaseTypeSpec::Bool => Type::bool_(),
        BaseTypeSpec::Char => Type::char_(),
        BaseTypeSpec::Int => Type::int(),
        BaseTypeSpec::Double => Type::double(),
        BaseTypeSpec::Void => Type::Void,
        BaseTypeSpec::Class(name) => match cmp.class_by_name(name) {
            Some(def) => Type::class(def.id),
            None => return Err(Note::unknown_type(name)),
        },
    };
    if spec.is_const {
        ty = ty.with_const(true);
    }
    for _ in 0..spec.pointer_depth {
        ty = Type::pointer_to(ty);
    }
    for &dim in spec.array_dims.iter().rev() {
        ty = Type::array_of(ty, dim);
    }
    if spec.is_reference {
        ty = Type::reference_to(ty);
    }
    Ok(ty)
}

fn variable_entity(name: &str, ty: Type, global: bool) -> Entity {
    if global {
        Entity::GlobalObject {
            name: name.to_string(),
            ty,
        }
    } else if ty.is_reference() {
        Entity::LocalReference {
            name: name.to_string(),
            ty,
        }
    } else {
        Entity::LocalObject {
            name: name.to_string(),
            ty,
        }
    }
}

/// Compile a local variable declaration: create and declare the entity,
/// compile its initializer, and add it to the frame layout.
pub fn compile_local_variable(
    cmp: &mut Compilation,
    fctx: &mut FnBody,
    scope: ScopeId,
    decl: &VarDeclAst,
) -> ConstructId {
    let (entity, init, note) = compile_variable(cmp, fctx.receiver, scope, decl, false);
    fctx.locals.push(entity);
    let node = cmp.add_construct(
        ConstructKind::Declaration(Declaration::Variable {
            entity,
            init,
            storage: StorageDuration::Automatic,
        }),
        Some(decl.location),
    );
    cmp.attach(node, init);
    if let Some(note) = note {
        cmp.note(node, note);
    }
    node
}

/// Compile a global variable declaration
pub fn compile_global_variable(
    cmp: &mut Compilation,
    global_scope: ScopeId,
    decl: &VarDeclAst,
) -> (ConstructId, EntityId) {
    let (entity, init, note) = compile_variable(cmp, None, global_scope, decl, true);
    let node = cmp.add_construct(
        ConstructKind::Declaration(Declaration::Variable {
            entity,
            init,
            storage: StorageDuration::Static,
        }),
        Some(decl.location),
    );
    cmp.attach(node, init);
    if let Some(note) = note {
        cmp.note(node, note);
    }
    (node, entity)
}

fn compile_variable(
    cmp: &mut Compilation,
    receiver: Option<EntityId>,
    scope: ScopeId,
    decl: &VarDeclAst,
    global: bool,
) -> (EntityId, ConstructId, Option<Note>) {
    let (ty, type_note) = match resolve_type(cmp, &decl.type_spec) {
        Ok(t) => (t, None),
        Err(n) => (Type::int(), Some(n.at(decl.location))),
    };
    let entity = cmp.add_entity(variable_entity(&decl.name, ty, global));
    let mut note = type_note;
    if !cmp.scope_mut(scope).declare_variable(&decl.name, entity) {
        note = note.or_else(|| Some(Note::redeclaration(&decl.name).at(decl.location)));
    }
    let ctx = ExprContext { scope, receiver };
    let init = initializers::compile_initializer(cmp, ctx, entity, &decl.init, decl.location);
    (entity, init, note)
}

// ----------------------------------------------------------------- functions

/// Pass 1 for a free function: create and declare the function entity
pub fn register_function(
    cmp: &mut Compilation,
    scope: ScopeId,
    f: &FunctionAst,
) -> Option<EntityId> {
    let return_type = match resolve_type(cmp, &f.return_type) {
        Ok(t) => t,
        Err(n) => {
            cmp.notes.push(n.at(f.location));
            return None;
        }
    };
    let mut param_types = Vec::with_capacity(f.params.len());
    for p in &f.params {
        match resolve_type(cmp, &p.type_spec) {
            Ok(t) => param_types.push(t),
            Err(n) => {
                cmp.notes.push(n.at(f.location));
                return None;
            }
        }
    }
    let entity = cmp.add_entity(Entity::Function {
        name: f.name.clone(),
        signature: FunctionSignature {
            return_type,
            param_types,
        },
        kind: FunctionKind::Free,
        definition: None,
    });
    if !cmp.scope_mut(scope).declare_function(&f.name, entity) {
        cmp.notes.push(Note::redeclaration(&f.name).at(f.location));
        return None;
    }
    Some(entity)
}

/// Pass 2 for a free function: compile the body into a `FunctionDef`
pub fn compile_function_body(
    cmp: &mut Compilation,
    global_scope: ScopeId,
    entity: EntityId,
    f: &FunctionAst,
) -> ConstructId {
    compile_def(
        cmp,
        global_scope,
        DefParts {
            entity,
            kind: FunctionKind::Free,
            name: f.name.clone(),
            params: &f.params,
            body: &f.body,
            member_inits: None,
            class: None,
            location: f.location,
        },
    )
}

struct DefParts<'a> {
    entity: EntityId,
    kind: FunctionKind,
    name: String,
    params: &'a [ParamAst],
    body: &'a [StmtAst],
    /// Constructor member initializer list
    member_inits: Option<&'a [MemberInitAst]>,
    class: Option<ClassId>,
    location: SourceLocation,
}

fn compile_def(cmp: &mut Compilation, global_scope: ScopeId, parts: DefParts<'_>) -> ConstructId {
    let Entity::Function { signature, .. } = cmp.entity(parts.entity) else {
        unreachable!("function body compiled for a non-function entity");
    };
    let return_type = signature.return_type.clone();
    let param_types = signature.param_types.clone();

    let fn_scope = cmp.add_scope(Some(global_scope));
    let receiver = parts.class.map(|class| {
        cmp.add_entity(Entity::Receiver {
            class,
            ty: Type::class(class),
        })
    });

    let mut param_entities = Vec::with_capacity(parts.params.len());
    for (p, ty) in parts.params.iter().zip(param_types) {
        let entity = cmp.add_entity(variable_entity(&p.name, ty, false));
        if !cmp.scope_mut(fn_scope).declare_variable(&p.name, entity) {
            cmp.notes
                .push(Note::redeclaration(&p.name).at(parts.location));
        }
        param_entities.push(entity);
    }

    let return_object = if return_type.is_void() {
        None
    } else {
        Some(cmp.add_entity(Entity::ReturnObject {
            ty: return_type.clone(),
        }))
    };
    let is_main = parts.name == "main" && parts.class.is_none();

    let node = cmp.add_construct(
        ConstructKind::FunctionDef(FunctionDef {
            entity: parts.entity,
            name: parts.name.clone(),
            return_type: return_type.clone(),
            kind: parts.kind,
            params: param_entities.clone(),
            locals: Vec::new(),
            body: ConstructId(0),
            member_inits: Vec::new(),
            member_dealloc: None,
            param_dealloc: ConstructId(0),
        }),
        Some(parts.location),
    );

    let mut fctx = FnBody {
        function: parts.entity,
        return_type,
        return_object,
        receiver,
        is_main,
        locals: param_entities.clone(),
    };

    // constructor: initialize base then members, before the body runs
    let mut member_init_ids = Vec::new();
    if matches!(parts.kind, FunctionKind::Constructor(_)) {
        let class = parts.class.unwrap_or(ClassId(0));
        let receiver = receiver.unwrap_or(EntityId(0));
        member_init_ids = compile_member_inits(
            cmp,
            fn_scope,
            node,
            class,
            receiver,
            parts.member_inits.unwrap_or(&[]),
            parts.location,
        );
    }

    let body = compile_block(cmp, &mut fctx, fn_scope, parts.body, parts.location);
    cmp.attach(node, body);

    // destructor: members die after the destructor body
    let member_dealloc = if let FunctionKind::Destructor(class) = parts.kind {
        let receiver = receiver.unwrap_or(EntityId(0));
        let d = compile_member_deallocator(cmp, receiver, class, parts.location);
        cmp.attach(node, d);
        Some(d)
    } else {
        None
    };

    let param_dealloc = compile_deallocator(
        cmp,
        DeallocKind::Parameters,
        &param_entities,
        parts.location,
    );
    cmp.attach(node, param_dealloc);

    if let ConstructKind::FunctionDef(def) = &mut cmp.construct_mut(node).kind {
        def.locals = fctx.locals;
        def.body = body;
        def.member_inits = member_init_ids;
        def.member_dealloc = member_dealloc;
        def.param_dealloc = param_dealloc;
    }
    if let Entity::Function { definition, .. } = cmp.entity_mut(parts.entity) {
        *definition = Some(node);
    }
    node
}

/// Build the base and member initializers of a constructor, in
/// initialization order: base subobject first, then members in declaration
/// order.  Entries of the written initializer list are matched by name;
/// anything left unnamed is default-initialized.
fn compile_member_inits(
    cmp: &mut Compilation,
    fn_scope: ScopeId,
    node: ConstructId,
    class: ClassId,
    receiver: EntityId,
    written: &[MemberInitAst],
    location: SourceLocation,
) -> Vec<ConstructId> {
    let def = cmp.class(class);
    let base = def.base;
    let base_name = base.map(|b| cmp.class(b).name.clone());
    let members: Vec<ClassMember> = def.members.clone();

    let mut used = vec![false; written.len()];
    let find_written = |name: &str, used: &mut Vec<bool>| -> Option<usize> {
        written.iter().position(|mi| mi.name == name).inspect(|&i| {
            used[i] = true;
        })
    };

    let ctx = ExprContext {
        scope: fn_scope,
        receiver: Some(receiver),
    };
    let mut inits = Vec::new();

    if let Some(base_class) = base {
        let target = cmp.add_entity(Entity::BaseSubobject {
            of: receiver,
            class: base_class,
            ty: Type::class(base_class),
        });
        let init = match base_name
            .as_deref()
            .and_then(|n| find_written(n, &mut used))
        {
            Some(i) => {
                let args = written[i]
                    .args
                    .iter()
                    .map(|a| compile_expr(cmp, ctx, a))
                    .collect();
                initializers::direct_initializer_from_args(cmp, target, args, written[i].location)
            }
            None => initializers::default_initializer(cmp, target, location),
        };
        cmp.attach(node, init);
        inits.push(init);
    }

    for m in &members {
        let target = cmp.add_entity(Entity::MemberSubobject {
            of: receiver,
            name: m.name.clone(),
            ty: m.ty.clone(),
        });
        let init = match find_written(&m.name, &mut used) {
            Some(i) => {
                let args = written[i]
                    .args
                    .iter()
                    .map(|a| compile_expr(cmp, ctx, a))
                    .collect();
                initializers::direct_initializer_from_args(cmp, target, args, written[i].location)
            }
            None => initializers::default_initializer(cmp, target, location),
        };
        cmp.attach(node, init);
        inits.push(init);
    }

    for (i, mi) in written.iter().enumerate() {
        if !used[i] {
            cmp.note(
                node,
                Note::error(
                    NoteKind::MemberInitUnknown,
                    format!("'{}' does not name a base or member of this class", mi.name),
                )
                .at(mi.location),
            );
        }
    }
    inits
}

// ------------------------------------------------------------------- classes

/// Pass 1 for a class: register its layout and the entities for its
/// constructors and destructor (synthesizing the implicit ones), and run the
/// rule-of-three check.
pub fn register_class(cmp: &mut Compilation, c: &ClassAst) -> Option<ClassId> {
    if cmp.class_by_name(&c.name).is_some() {
        cmp.notes.push(Note::redeclaration(&c.name).at(c.location));
        return None;
    }
    let id = ClassId(cmp.classes.len());

    let base = match &c.base {
        Some(name) => match cmp.class_by_name(name) {
            Some(def) => Some(def.id),
            None => {
                cmp.notes.push(Note::unknown_type(name).at(c.location));
                None
            }
        },
        None => None,
    };

    let mut members = Vec::new();
    for m in &c.members {
        if let MemberAst::Field {
            name,
            type_spec,
            location,
        } = m
        {
            match resolve_type(cmp, type_spec) {
                Ok(ty) => members.push(ClassMember {
                    name: name.clone(),
                    ty,
                }),
                Err(n) => cmp.notes.push(n.at(*location)),
            }
        }
    }

    // the definition must exist before constructor parameter types can name
    // the class itself (copy constructors)
    cmp.classes.push(ClassDefinition {
        id,
        name: c.name.clone(),
        base,
        members,
        constructors: Vec::new(),
        destructor: None,
        has_user_constructor: false,
        has_user_copy_constructor: false,
        has_user_destructor: false,
        location: c.location,
    });

    let mut constructors = Vec::new();
    let mut destructor = None;
    let mut has_user_constructor = false;
    let mut has_user_copy_constructor = false;
    let mut has_user_destructor = false;
    let mut dtor_body_nonempty = false;

    for m in &c.members {
        match m {
            MemberAst::Constructor {
                params, location, ..
            } => {
                let mut param_types = Vec::with_capacity(params.len());
                let mut ok = true;
                for p in params {
                    match resolve_type(cmp, &p.type_spec) {
                        Ok(t) => param_types.push(t),
                        Err(n) => {
                            cmp.notes.push(n.at(*location));
                            ok = false;
                        }
                    }
                }
                if !ok {
                    continue;
                }
                if param_types.len() == 1 {
                    if let Some(referent) = param_types[0].referent() {
                        if referent.class_id() == Some(id) {
                            has_user_copy_constructor = true;
                        }
                    }
                }
                has_user_constructor = true;
                constructors.push(cmp.add_entity(Entity::Function {
                    name: c.name.clone(),
                    signature: FunctionSignature {
                        return_type: Type::Void,
                        param_types,
                    },
                    kind: FunctionKind::Constructor(id),
                    definition: None,
                }));
            }
            MemberAst::Destructor { body, location } => {
                if has_user_destructor {
                    cmp.notes
                        .push(Note::redeclaration(&format!("~{}", c.name)).at(*location));
                    continue;
                }
                has_user_destructor = true;
                dtor_body_nonempty = !body.is_empty();
                destructor = Some(cmp.add_entity(Entity::Function {
                    name: format!("~{}", c.name),
                    signature: FunctionSignature {
                        return_type: Type::Void,
                        param_types: Vec::new(),
                    },
                    kind: FunctionKind::Destructor(id),
                    definition: None,
                }));
            }
            MemberAst::Field { .. } => {}
        }
    }

    if !has_user_constructor {
        constructors.push(cmp.add_entity(Entity::Function {
            name: c.name.clone(),
            signature: FunctionSignature {
                return_type: Type::Void,
                param_types: Vec::new(),
            },
            kind: FunctionKind::Constructor(id),
            definition: None,
        }));
    }
    if destructor.is_none() {
        destructor = Some(cmp.add_entity(Entity::Function {
            name: format!("~{}", c.name),
            signature: FunctionSignature {
                return_type: Type::Void,
                param_types: Vec::new(),
            },
            kind: FunctionKind::Destructor(id),
            definition: None,
        }));
    }

    if has_user_destructor && !has_user_copy_constructor {
        cmp.notes
            .push(Note::rule_of_three(&c.name, dtor_body_nonempty).at(c.location));
    }

    let def = &mut cmp.classes[id.0];
    def.constructors = constructors;
    def.destructor = destructor;
    def.has_user_constructor = has_user_constructor;
    def.has_user_copy_constructor = has_user_copy_constructor;
    def.has_user_destructor = has_user_destructor;
    Some(id)
}

/// Pass 2 for a class: compile constructor and destructor bodies
pub fn compile_class_bodies(cmp: &mut Compilation, global_scope: ScopeId, c: &ClassAst) {
    let Some(def) = cmp.class_by_name(&c.name) else {
        return;
    };
    let class = def.id;
    let has_user_constructor = def.has_user_constructor;
    let has_user_destructor = def.has_user_destructor;
    let constructors = def.constructors.clone();
    let destructor = def.destructor;

    if has_user_constructor {
        let mut next = 0;
        for m in &c.members {
            if let MemberAst::Constructor {
                params,
                member_inits,
                body,
                location,
            } = m
            {
                // registration may have skipped a constructor with bad types
                let Some(&entity) = constructors.get(next) else {
                    break;
                };
                let Entity::Function { signature, .. } = cmp.entity(entity) else {
                    continue;
                };
                if signature.param_types.len() != params.len() {
                    continue;
                }
                next += 1;
                compile_def(
                    cmp,
                    global_scope,
                    DefParts {
                        entity,
                        kind: FunctionKind::Constructor(class),
                        name: c.name.clone(),
                        params,
                        body,
                        member_inits: Some(member_inits),
                        class: Some(class),
                        location: *location,
                    },
                );
            }
        }
    } else if let Some(&implicit) = constructors.first() {
        compile_def(
            cmp,
            global_scope,
            DefParts {
                entity: implicit,
                kind: FunctionKind::Constructor(class),
                name: c.name.clone(),
                params: &[],
                body: &[],
                member_inits: Some(&[]),
                class: Some(class),
                location: c.location,
            },
        );
    }

    if let Some(dtor) = destructor {
        let user_body: Option<(&[StmtAst], SourceLocation)> = c.members.iter().find_map(|m| {
            if let MemberAst::Destructor { body, location } = m {
                Some((body.as_slice(), *location))
            } else {
                None
            }
        });
        let (body, location) = match (has_user_destructor, user_body) {
            (true, Some(b)) => b,
            _ => (&[] as &[StmtAst], c.location),
        };
        compile_def(
            cmp,
            global_scope,
            DefParts {
                entity: dtor,
                kind: FunctionKind::Destructor(class),
                name: format!("~{}", c.name),
                params: &[],
                body,
                member_inits: None,
                class: Some(class),
                location,
            },
        );
    }
}

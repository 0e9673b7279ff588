//! Behavior Registry - named trait definitions, composition, instantiation
//! and teardown.
//!
//! Definitions live at dotted paths (`"UI.Window"`); intermediate segments
//! must already exist. Composition (`behave_like`) merges one definition's
//! surface into another and re-linearizes its behavior list so
//! dependencies construct first. `create` builds an instance by running
//! every behavior's constructor in linearized order, each against its own
//! private state slot; `finish` runs destructors in reverse.
//!
//! Registry state is thread-local (one registry per thread), with
//! `reset_registry()` as the test seam.

mod definition;
mod instance;
mod linearize;

pub use definition::{DefinitionInfo, Method, PropertySpec, Routine, StoreFactory, TraitId, TraitSpec};
pub use instance::{Instance, StateRecord, TraitState};

use indexmap::IndexMap;
use log::warn;
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::stage::{ComponentId, Stage};
use crate::types::Value;

use definition::TraitDefinition;

/// Constructor arguments: one `Value::List` slice per trait full name.
pub type CreateArgs = IndexMap<String, Value>;

// =============================================================================
// Engine context
// =============================================================================

/// Context handed to constructor and destructor routines. Instances built
/// inside a component tree receive the stage and their owning component so
/// widget constructors can populate their own subtree; detached instances
/// receive neither.
pub struct EngineCx<'a> {
    pub stage: Option<&'a mut Stage>,
    pub component: Option<ComponentId>,
}

impl EngineCx<'_> {
    /// Context for instances created outside any component tree.
    pub fn detached() -> EngineCx<'static> {
        EngineCx { stage: None, component: None }
    }
}

// =============================================================================
// Registry state
// =============================================================================

struct RegistryState {
    /// Definition arena. Never shrinks; shadowed definitions stay.
    defs: Vec<TraitDefinition>,
    /// Root path segment bindings.
    roots: std::collections::HashMap<String, TraitId>,
}

thread_local! {
    static REGISTRY: RefCell<RegistryState> = RefCell::new(RegistryState {
        defs: Vec::new(),
        roots: std::collections::HashMap::new(),
    });
}

/// Reset all registry state (for testing).
pub fn reset_registry() {
    REGISTRY.with(|reg| {
        let mut reg = reg.borrow_mut();
        reg.defs.clear();
        reg.roots.clear();
    });
}

fn resolve(state: &RegistryState, name: &str) -> Option<TraitId> {
    let mut segments = name.split('.');
    let first = segments.next()?;
    let mut cur = *state.roots.get(first)?;
    for segment in segments {
        cur = *state.defs[cur.0].children.get(segment)?;
    }
    Some(cur)
}

// =============================================================================
// define
// =============================================================================

/// Register a trait definition at a dotted path.
///
/// Intermediate path segments must already be defined; a missing one fails
/// with [`Error::PathNotFound`]. Redefining a leaf logs a warning and
/// shadows the old definition (existing compositions keep their identity
/// reference to it).
pub fn define(name: &str, spec: TraitSpec) -> Result<TraitId> {
    let id = REGISTRY.with(|reg| {
        let mut reg = reg.borrow_mut();
        let segments: Vec<&str> = name.split('.').collect();
        let Some((leaf, path)) = segments.split_last() else {
            return Err(Error::PathNotFound {
                path: name.to_string(),
                segment: String::new(),
            });
        };

        // Walk to the parent of the leaf.
        let mut parent: Option<TraitId> = None;
        for segment in path {
            let next = match parent {
                None => reg.roots.get(*segment).copied(),
                Some(p) => reg.defs[p.0].children.get(*segment).copied(),
            };
            match next {
                Some(id) => parent = Some(id),
                None => {
                    return Err(Error::PathNotFound {
                        path: name.to_string(),
                        segment: (*segment).to_string(),
                    });
                }
            }
        }

        let shadowed = match parent {
            None => reg.roots.contains_key(*leaf),
            Some(p) => reg.defs[p.0].children.contains_key(*leaf),
        };
        if shadowed {
            warn!("'{name}' redefined");
        }

        let id = TraitId(reg.defs.len());
        let mut def = TraitDefinition::new(name.to_string());
        def.ctor = spec.ctor;
        def.dtor = spec.dtor;
        def.methods = spec.methods;
        def.properties = spec.properties;
        def.store = spec.store;
        reg.defs.push(def);

        match parent {
            None => {
                reg.roots.insert((*leaf).to_string(), id);
            }
            Some(p) => {
                reg.defs[p.0].children.insert((*leaf).to_string(), id);
            }
        }
        Ok(id)
    })?;

    for source in &spec.composes_with {
        behave_like(name, source)?;
    }
    Ok(id)
}

// =============================================================================
// behave_like
// =============================================================================

/// Compose `source`'s surface into `target`.
///
/// No-op when already composed (tracked by identity, not name). After
/// inserting the source, its own behaviors compose in recursively, the
/// target's behavior list re-linearizes, the source's method and property
/// surface copies over, and the target's revision bumps.
pub fn behave_like(target: &str, source: &str) -> Result<()> {
    if target == source {
        return Ok(());
    }
    REGISTRY.with(|reg| {
        let mut reg = reg.borrow_mut();
        let target_id =
            resolve(&reg, target).ok_or_else(|| Error::ClassNotFound(target.to_string()))?;
        let source_id =
            resolve(&reg, source).ok_or_else(|| Error::ClassNotFound(source.to_string()))?;
        behave_like_ids(&mut reg, target_id, source_id)
    })
}

fn behave_like_ids(reg: &mut RegistryState, target_id: TraitId, source_id: TraitId) -> Result<()> {
    if target_id == source_id {
        return Ok(());
    }
    if reg.defs[target_id.0].sealed {
        return Err(Error::SealedTarget(reg.defs[target_id.0].full_name.clone()));
    }
    if reg.defs[target_id.0].behaves.contains(&source_id) {
        return Ok(());
    }

    // Snapshot so a failed composition leaves the target untouched.
    let saved_behaves = reg.defs[target_id.0].behaves.clone();
    let saved_revision = reg.defs[target_id.0].revision;
    if let Err(err) = compose_into(reg, target_id, source_id) {
        let target_def = &mut reg.defs[target_id.0];
        target_def.behaves = saved_behaves;
        target_def.revision = saved_revision;
        return Err(err);
    }
    Ok(())
}

fn compose_into(reg: &mut RegistryState, target_id: TraitId, source_id: TraitId) -> Result<()> {
    reg.defs[target_id.0].behaves.push(source_id);

    // The source's own behaviors compose in transitively.
    let nested: Vec<TraitId> = reg.defs[source_id.0].behaves.to_vec();
    for behavior in nested {
        behave_like_ids(reg, target_id, behavior)?;
    }

    let target_name = reg.defs[target_id.0].full_name.clone();
    let list = reg.defs[target_id.0].behaves.to_vec();
    let order = linearize::linearize(&reg.defs, &target_name, &list)?;
    reg.defs[target_id.0].behaves = order;

    // Copy the composed surface onto the target.
    let methods: Vec<(String, Method)> = reg.defs[source_id.0]
        .methods
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let properties = reg.defs[source_id.0].properties.clone();
    let target_def = &mut reg.defs[target_id.0];
    for (name, method) in methods {
        target_def.methods.insert(name, method);
    }
    for prop in properties {
        target_def
            .properties
            .retain(|existing| existing.name() != prop.name());
        target_def.properties.push(prop);
    }

    target_def.revision += 1;
    Ok(())
}

// =============================================================================
// seal / lookup
// =============================================================================

/// Prevent further composition into `name`.
pub fn seal(name: &str) -> Result<()> {
    REGISTRY.with(|reg| {
        let mut reg = reg.borrow_mut();
        let id = resolve(&reg, name).ok_or_else(|| Error::ClassNotFound(name.to_string()))?;
        reg.defs[id.0].sealed = true;
        Ok(())
    })
}

/// Read-only snapshot of a definition, identity translated to names.
pub fn get_definition(name: &str) -> Option<DefinitionInfo> {
    REGISTRY.with(|reg| {
        let reg = reg.borrow();
        let id = resolve(&reg, name)?;
        let def = &reg.defs[id.0];
        Some(DefinitionInfo {
            full_name: def.full_name.clone(),
            behaves: def
                .behaves
                .iter()
                .map(|b| reg.defs[b.0].full_name.clone())
                .collect(),
            revision: def.revision,
            sealed: def.sealed,
            properties: def.properties.iter().map(|p| p.name().to_string()).collect(),
            methods: def.methods.keys().cloned().collect(),
        })
    })
}

// =============================================================================
// create
// =============================================================================

struct CtorPlan {
    full_name: String,
    revision: u64,
    store: Option<StoreFactory>,
    routine: Option<Routine>,
}

fn build_plan(name: &str) -> Result<(TraitId, Vec<CtorPlan>, CtorPlan, IndexMap<String, Method>, Vec<PropertySpec>)> {
    REGISTRY.with(|reg| {
        let reg = reg.borrow();
        let id = resolve(&reg, name).ok_or_else(|| Error::ClassNotFound(name.to_string()))?;
        let def = &reg.defs[id.0];
        let behaviors = def
            .behaves
            .iter()
            .map(|&b| {
                let bdef = &reg.defs[b.0];
                CtorPlan {
                    full_name: bdef.full_name.clone(),
                    revision: bdef.revision,
                    store: bdef.store.clone(),
                    routine: bdef.ctor.clone(),
                }
            })
            .collect();
        let own = CtorPlan {
            full_name: def.full_name.clone(),
            revision: def.revision,
            store: def.store.clone(),
            routine: def.ctor.clone(),
        };
        Ok((id, behaviors, own, def.methods.clone(), def.properties.clone()))
    })
}

fn args_for<'a>(args: &'a CreateArgs, full_name: &str) -> Result<&'a [Value]> {
    match args.get(full_name) {
        None => Ok(&[]),
        Some(Value::List(items)) => Ok(items),
        Some(_) => Err(Error::ArgumentShape(full_name.to_string())),
    }
}

fn make_store(factory: &Option<StoreFactory>) -> Box<dyn Any> {
    match factory {
        Some(f) => f(),
        None => Box::new(StateRecord::new()),
    }
}

fn create_with_cx(name: &str, args: &CreateArgs, cx: &mut EngineCx<'_>) -> Result<Instance> {
    let (type_id, behaviors, own, methods, properties) = build_plan(name)?;

    let mut instance = Instance {
        type_name: own.full_name.clone(),
        type_id,
        internal: IndexMap::new(),
        properties: IndexMap::new(),
        computed: IndexMap::new(),
        methods,
        finished: false,
    };

    // Allocate every slot up front so constructors can see their own state
    // and check `instance_of` against composed behaviors.
    for plan in &behaviors {
        instance.internal.insert(
            plan.full_name.clone(),
            TraitState::new(plan.revision, make_store(&plan.store)),
        );
    }
    instance.internal.insert(
        own.full_name.clone(),
        TraitState::new(own.revision, make_store(&own.store)),
    );

    // Behavior constructors in linearized order, then the target's own.
    for plan in &behaviors {
        let slice = args_for(args, &plan.full_name)?;
        if let Some(ctor) = &plan.routine {
            ctor(&mut instance, cx, slice)?;
        }
    }
    let slice = args_for(args, &own.full_name)?;
    if let Some(ctor) = &own.routine {
        ctor(&mut instance, cx, slice)?;
    }

    for prop in properties {
        match prop {
            PropertySpec::Plain(prop_name, value) => {
                instance.properties.entry(prop_name).or_insert(value);
            }
            PropertySpec::Computed(prop_name, f) => {
                instance.computed.insert(prop_name, Rc::clone(&f));
            }
        }
    }

    Ok(instance)
}

/// Build an instance of `name`, running every composed constructor in
/// linearized order with its own argument slice (keyed by full trait
/// name; a non-list value for a key fails with [`Error::ArgumentShape`]).
pub fn create(name: &str, args: &CreateArgs) -> Result<Instance> {
    create_with_cx(name, args, &mut EngineCx::detached())
}

/// Like [`create`], but inside a component tree: constructors receive the
/// stage and the component that owns the new instance.
pub fn create_in(
    stage: &mut Stage,
    component: ComponentId,
    name: &str,
    args: &CreateArgs,
) -> Result<Instance> {
    let mut cx = EngineCx { stage: Some(stage), component: Some(component) };
    create_with_cx(name, args, &mut cx)
}

// =============================================================================
// finish
// =============================================================================

fn teardown_plan(instance: &Instance) -> Vec<(String, Option<Routine>)> {
    REGISTRY.with(|reg| {
        let reg = reg.borrow();
        let def = &reg.defs[instance.type_id().0];
        let mut plan = vec![(def.full_name.clone(), def.dtor.clone())];
        for &b in def.behaves.iter().rev() {
            let bdef = &reg.defs[b.0];
            plan.push((bdef.full_name.clone(), bdef.dtor.clone()));
        }
        plan
    })
}

fn finish_with_cx(instance: &mut Instance, args: &CreateArgs, cx: &mut EngineCx<'_>) -> Result<()> {
    if instance.finished {
        return Ok(());
    }
    instance.finished = true;

    // Best effort, aggregated: the whole reverse chain always runs and
    // every failure is reported together.
    let mut errors = Vec::new();
    for (full_name, dtor) in teardown_plan(instance) {
        let slice = match args_for(args, &full_name) {
            Ok(slice) => slice,
            Err(err) => {
                errors.push(err);
                &[]
            }
        };
        if let Some(dtor) = dtor {
            if let Err(err) = dtor(instance, cx, slice) {
                errors.push(err);
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Teardown { name: instance.type_name.clone(), errors })
    }
}

/// Tear an instance down: the target's destructor, then every behavior's,
/// in reverse linearized order. Destructor failures are collected and
/// reported together as [`Error::Teardown`]; the chain always completes.
/// Finishing twice is a no-op.
pub fn finish(instance: &mut Instance, args: &CreateArgs) -> Result<()> {
    finish_with_cx(instance, args, &mut EngineCx::detached())
}

/// Like [`finish`], inside a component tree.
pub fn finish_in(
    stage: &mut Stage,
    component: ComponentId,
    instance: &mut Instance,
    args: &CreateArgs,
) -> Result<()> {
    let mut cx = EngineCx { stage: Some(stage), component: Some(component) };
    finish_with_cx(instance, args, &mut cx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() {
        reset_registry();
    }

    fn args() -> CreateArgs {
        CreateArgs::new()
    }

    #[test]
    fn test_define_and_create() {
        setup();
        define(
            "Counter",
            TraitSpec::new().ctor(|instance, _cx, _args| {
                instance
                    .record_mut("Counter")
                    .expect("record")
                    .insert("value".into(), Value::Number(0.0));
                Ok(())
            }),
        )
        .unwrap();

        let instance = create("Counter", &args()).unwrap();
        assert_eq!(instance.type_name(), "Counter");
        assert_eq!(
            instance.record("Counter").unwrap().get("value"),
            Some(&Value::Number(0.0))
        );
        assert_eq!(instance.revision(), 1);
    }

    #[test]
    fn test_define_missing_path_segment() {
        setup();
        let err = define("App.Widget", TraitSpec::new()).unwrap_err();
        assert!(matches!(err, Error::PathNotFound { .. }));

        define("App", TraitSpec::new()).unwrap();
        define("App.Widget", TraitSpec::new()).unwrap();
        assert!(get_definition("App.Widget").is_some());
    }

    #[test]
    fn test_create_unknown_class() {
        setup();
        assert!(matches!(
            create("Nope", &args()),
            Err(Error::ClassNotFound(_))
        ));
    }

    #[test]
    fn test_argument_shape() {
        setup();
        define("Thing", TraitSpec::new()).unwrap();
        let mut bad = CreateArgs::new();
        bad.insert("Thing".into(), Value::Str("not a list".into()));
        assert!(matches!(
            create("Thing", &bad),
            Err(Error::ArgumentShape(_))
        ));
    }

    #[test]
    fn test_ctor_args_by_trait_name() {
        setup();
        define(
            "Named",
            TraitSpec::new().ctor(|instance, _cx, args| {
                let name = args.first().and_then(Value::as_str).unwrap_or("?").to_string();
                instance
                    .record_mut("Named")
                    .expect("record")
                    .insert("name".into(), Value::Str(name));
                Ok(())
            }),
        )
        .unwrap();

        let mut call = CreateArgs::new();
        call.insert("Named".into(), Value::List(vec![Value::Str("zed".into())]));
        let instance = create("Named", &call).unwrap();
        assert_eq!(
            instance.record("Named").unwrap().get("name"),
            Some(&Value::Str("zed".into()))
        );
    }

    #[test]
    fn test_composition_idempotent_by_identity() {
        setup();
        define("A", TraitSpec::new()).unwrap();
        define("B", TraitSpec::new()).unwrap();

        behave_like("A", "B").unwrap();
        let once = get_definition("A").unwrap();
        behave_like("A", "B").unwrap();
        let twice = get_definition("A").unwrap();

        assert_eq!(once.behaves, vec!["B".to_string()]);
        assert_eq!(once.behaves, twice.behaves);
        assert_eq!(once.revision, twice.revision);
    }

    #[test]
    fn test_composition_orders_dependencies_first() {
        setup();
        define("Base", TraitSpec::new()).unwrap();
        define("Mid", TraitSpec::new().composes_with(["Base"])).unwrap();
        define("Top", TraitSpec::new()).unwrap();

        // Compose dependent before its dependency; linearization must put
        // Base ahead of Mid anyway.
        behave_like("Top", "Mid").unwrap();
        let info = get_definition("Top").unwrap();
        assert_eq!(info.behaves, vec!["Base".to_string(), "Mid".to_string()]);
    }

    #[test]
    fn test_ctor_order_follows_linearization() {
        setup();
        use std::cell::RefCell;
        use std::rc::Rc;
        let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

        let o = order.clone();
        define(
            "Base",
            TraitSpec::new().ctor(move |_, _, _| {
                o.borrow_mut().push("base");
                Ok(())
            }),
        )
        .unwrap();
        let o = order.clone();
        define(
            "Mid",
            TraitSpec::new()
                .composes_with(["Base"])
                .ctor(move |_, _, _| {
                    o.borrow_mut().push("mid");
                    Ok(())
                }),
        )
        .unwrap();
        let o = order.clone();
        define(
            "Top",
            TraitSpec::new()
                .composes_with(["Mid"])
                .ctor(move |_, _, _| {
                    o.borrow_mut().push("top");
                    Ok(())
                }),
        )
        .unwrap();

        create("Top", &args()).unwrap();
        assert_eq!(*order.borrow(), vec!["base", "mid", "top"]);
    }

    #[test]
    fn test_dtor_reverse_order() {
        setup();
        use std::cell::RefCell;
        use std::rc::Rc;
        let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

        let o = order.clone();
        define(
            "Base",
            TraitSpec::new().dtor(move |_, _, _| {
                o.borrow_mut().push("base");
                Ok(())
            }),
        )
        .unwrap();
        let o = order.clone();
        define(
            "Top",
            TraitSpec::new()
                .composes_with(["Base"])
                .dtor(move |_, _, _| {
                    o.borrow_mut().push("top");
                    Ok(())
                }),
        )
        .unwrap();

        let mut instance = create("Top", &args()).unwrap();
        finish(&mut instance, &args()).unwrap();
        assert_eq!(*order.borrow(), vec!["top", "base"]);
        assert!(instance.is_finished());

        // Second finish is a no-op.
        finish(&mut instance, &args()).unwrap();
        assert_eq!(order.borrow().len(), 2);
    }

    #[test]
    fn test_teardown_aggregates_failures() {
        setup();
        define(
            "Bad1",
            TraitSpec::new().dtor(|_, _, _| Err(Error::Eval("one".into()))),
        )
        .unwrap();
        define(
            "Bad2",
            TraitSpec::new()
                .composes_with(["Bad1"])
                .dtor(|_, _, _| Err(Error::Eval("two".into()))),
        )
        .unwrap();

        let mut instance = create("Bad2", &args()).unwrap();
        let err = finish(&mut instance, &args()).unwrap_err();
        match err {
            Error::Teardown { errors, .. } => assert_eq!(errors.len(), 2),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn test_cycle_fails_with_unresolvable() {
        setup();
        define("X", TraitSpec::new()).unwrap();
        define("Y", TraitSpec::new()).unwrap();
        define("Z", TraitSpec::new()).unwrap();
        behave_like("X", "Y").unwrap();
        behave_like("Y", "Z").unwrap();
        let err = behave_like("Z", "X").unwrap_err();
        assert!(matches!(err, Error::UnresolvableDependency { .. }));
    }

    #[test]
    fn test_failed_composition_restores_target() {
        setup();
        define("X", TraitSpec::new()).unwrap();
        define("Y", TraitSpec::new()).unwrap();
        define("Z", TraitSpec::new()).unwrap();
        behave_like("X", "Y").unwrap();
        behave_like("Y", "Z").unwrap();

        let before = get_definition("Z").unwrap();
        behave_like("Z", "X").unwrap_err();
        let after = get_definition("Z").unwrap();

        assert_eq!(before.behaves, after.behaves);
        assert_eq!(before.revision, after.revision);
    }

    #[test]
    fn test_sealed_rejects_composition() {
        setup();
        define("Open", TraitSpec::new()).unwrap();
        define("Locked", TraitSpec::new()).unwrap();
        seal("Locked").unwrap();
        assert!(matches!(
            behave_like("Locked", "Open"),
            Err(Error::SealedTarget(_))
        ));
    }

    #[test]
    fn test_method_surface_copied_on_composition() {
        setup();
        define(
            "Greeter",
            TraitSpec::new().method("greet", |_, _| Ok(Value::Str("hi".into()))),
        )
        .unwrap();
        define("Host", TraitSpec::new()).unwrap();
        behave_like("Host", "Greeter").unwrap();

        let mut instance = create("Host", &args()).unwrap();
        assert_eq!(instance.invoke("greet", &[]).unwrap(), Value::Str("hi".into()));
    }

    #[test]
    fn test_revision_snapshot() {
        setup();
        define("Evolving", TraitSpec::new()).unwrap();
        define("Extra", TraitSpec::new()).unwrap();

        let before = create("Evolving", &args()).unwrap();
        behave_like("Evolving", "Extra").unwrap();
        let after = create("Evolving", &args()).unwrap();

        assert_eq!(before.revision(), 1);
        assert_eq!(after.revision(), 2);
    }

    #[test]
    fn test_redefinition_shadows() {
        setup();
        define("Twice", TraitSpec::new().property("mark", Value::Number(1.0))).unwrap();
        define("Twice", TraitSpec::new().property("mark", Value::Number(2.0))).unwrap();

        let instance = create("Twice", &args()).unwrap();
        assert_eq!(instance.property("mark"), Some(Value::Number(2.0)));
    }

    #[test]
    fn test_instance_of() {
        setup();
        define("Mixin", TraitSpec::new()).unwrap();
        define("Thing", TraitSpec::new().composes_with(["Mixin"])).unwrap();
        let instance = create("Thing", &args()).unwrap();
        assert!(instance.instance_of("Thing"));
        assert!(instance.instance_of("Mixin"));
        assert!(!instance.instance_of("Other"));
    }

    #[test]
    fn test_custom_store_type() {
        setup();
        struct Slots {
            hits: u32,
        }
        define(
            "Stored",
            TraitSpec::new()
                .store(|| Slots { hits: 7 })
                .ctor(|instance, _, _| {
                    let slots = instance.store_mut::<Slots>("Stored").expect("store");
                    slots.hits += 1;
                    Ok(())
                }),
        )
        .unwrap();

        let instance = create("Stored", &args()).unwrap();
        assert_eq!(instance.store::<Slots>("Stored").unwrap().hits, 8);
    }
}

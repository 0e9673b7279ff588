//! Trait definitions - the composable behavior records the registry stores.
//!
//! A definition is identified by its dotted path name but referenced
//! internally by `TraitId` (arena index), so composition tracking survives
//! redefinition shadowing: a shadowed definition stays in the arena and
//! existing references keep pointing at it.

use indexmap::IndexMap;
use smallvec::SmallVec;
use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::Result;
use crate::types::Value;

use super::{EngineCx, Instance};

// =============================================================================
// Identity and callable shapes
// =============================================================================

/// Arena index of a trait definition. Identity, not name: two definitions
/// may share a dotted path after redefinition, but never a `TraitId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraitId(pub(crate) usize);

/// Constructor/destructor routine. Receives the instance under
/// construction, the engine context (stage + owning component, when the
/// instance is built inside a component tree) and its argument slice.
pub type Routine = Rc<dyn Fn(&mut Instance, &mut EngineCx<'_>, &[Value]) -> Result<()>>;

/// A surface method, copied between definitions on composition.
pub type Method = Rc<dyn Fn(&mut Instance, &[Value]) -> Result<Value>>;

/// Factory for a trait's private backing store. Defaults to a plain record
/// (`IndexMap<String, Value>`).
pub type StoreFactory = Rc<dyn Fn() -> Box<dyn Any>>;

/// A declared property: a plain value, or a computed accessor evaluated on
/// read.
#[derive(Clone)]
pub enum PropertySpec {
    Plain(String, Value),
    Computed(String, Rc<dyn Fn() -> Value>),
}

impl PropertySpec {
    pub fn name(&self) -> &str {
        match self {
            PropertySpec::Plain(name, _) => name,
            PropertySpec::Computed(name, _) => name,
        }
    }
}

// =============================================================================
// TraitDefinition
// =============================================================================

pub struct TraitDefinition {
    pub(crate) full_name: String,
    /// Linearized behavior list: dependencies precede dependents.
    pub(crate) behaves: SmallVec<[TraitId; 4]>,
    pub(crate) ctor: Option<Routine>,
    pub(crate) dtor: Option<Routine>,
    /// Method surface. Composition copies the source's surface in.
    pub(crate) methods: IndexMap<String, Method>,
    pub(crate) properties: Vec<PropertySpec>,
    pub(crate) store: Option<StoreFactory>,
    pub(crate) revision: u64,
    pub(crate) sealed: bool,
    /// Child definitions by path segment.
    pub(crate) children: HashMap<String, TraitId>,
}

impl TraitDefinition {
    pub(crate) fn new(full_name: String) -> Self {
        TraitDefinition {
            full_name,
            behaves: SmallVec::new(),
            ctor: None,
            dtor: None,
            methods: IndexMap::new(),
            properties: Vec::new(),
            store: None,
            revision: 1,
            sealed: false,
            children: HashMap::new(),
        }
    }
}

// =============================================================================
// TraitSpec - the `define` argument
// =============================================================================

/// Builder handed to [`define`](super::define).
#[derive(Default, Clone)]
pub struct TraitSpec {
    pub(crate) ctor: Option<Routine>,
    pub(crate) dtor: Option<Routine>,
    pub(crate) composes_with: Vec<String>,
    pub(crate) methods: IndexMap<String, Method>,
    pub(crate) properties: Vec<PropertySpec>,
    pub(crate) store: Option<StoreFactory>,
}

impl TraitSpec {
    pub fn new() -> Self {
        TraitSpec::default()
    }

    pub fn ctor<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Instance, &mut EngineCx<'_>, &[Value]) -> Result<()> + 'static,
    {
        self.ctor = Some(Rc::new(f));
        self
    }

    pub fn dtor<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Instance, &mut EngineCx<'_>, &[Value]) -> Result<()> + 'static,
    {
        self.dtor = Some(Rc::new(f));
        self
    }

    /// Behaviors to compose in at definition time, by dotted path.
    pub fn composes_with<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.composes_with = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn method<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut Instance, &[Value]) -> Result<Value> + 'static,
    {
        self.methods.insert(name.to_string(), Rc::new(f));
        self
    }

    pub fn property(mut self, name: &str, value: Value) -> Self {
        self.properties.push(PropertySpec::Plain(name.to_string(), value));
        self
    }

    pub fn computed_property<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        self.properties
            .push(PropertySpec::Computed(name.to_string(), Rc::new(f)));
        self
    }

    /// Custom backing-store type for the trait's private state. The default
    /// is a plain `IndexMap<String, Value>` record.
    pub fn store<T, F>(mut self, factory: F) -> Self
    where
        T: Any,
        F: Fn() -> T + 'static,
    {
        self.store = Some(Rc::new(move || Box::new(factory())));
        self
    }
}

/// Read-only snapshot returned by `get_definition`: identity translated to
/// names, no live pointers.
#[derive(Debug, Clone, PartialEq)]
pub struct DefinitionInfo {
    pub full_name: String,
    pub behaves: Vec<String>,
    pub revision: u64,
    pub sealed: bool,
    pub properties: Vec<String>,
    pub methods: Vec<String>,
}

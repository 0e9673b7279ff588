//! Instances - per-trait state arenas produced by `create`.
//!
//! An instance exposes an `internal` namespace keyed by trait name. Each
//! trait sees only its own slot; traits share nothing implicitly. The slot
//! holds the trait's private backing store (a custom type from the
//! definition's store factory, or a plain record) plus a read-only revision
//! snapshot taken at construction.

use indexmap::IndexMap;
use std::any::Any;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::types::Value;

use super::definition::{Method, TraitId};

/// A plain-record backing store: the default when a definition declares no
/// custom store type.
pub type StateRecord = IndexMap<String, Value>;

/// One trait's private slot inside an instance.
pub struct TraitState {
    /// Definition revision at construction time.
    pub revision: u64,
    pub data: Box<dyn Any>,
}

impl TraitState {
    pub(crate) fn new(revision: u64, data: Box<dyn Any>) -> Self {
        TraitState { revision, data }
    }

    /// Downcast the backing store to a concrete type.
    pub fn data_ref<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    pub fn data_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.data.downcast_mut::<T>()
    }
}

// =============================================================================
// Instance
// =============================================================================

pub struct Instance {
    pub(crate) type_name: String,
    pub(crate) type_id: TraitId,
    /// Per-trait state, keyed by full trait name, in construction order.
    pub(crate) internal: IndexMap<String, TraitState>,
    pub(crate) properties: IndexMap<String, Value>,
    pub(crate) computed: IndexMap<String, Rc<dyn Fn() -> Value>>,
    pub(crate) methods: IndexMap<String, Method>,
    pub(crate) finished: bool,
}

impl Instance {
    /// Full dotted name of the defining trait.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub(crate) fn type_id(&self) -> TraitId {
        self.type_id
    }

    /// Revision snapshot of the defining trait at construction.
    pub fn revision(&self) -> u64 {
        self.internal
            .get(&self.type_name)
            .map(|state| state.revision)
            .unwrap_or(0)
    }

    /// True when `name` is the defining trait or any composed behavior.
    pub fn instance_of(&self, name: &str) -> bool {
        self.internal.contains_key(name)
    }

    /// A trait's private slot.
    pub fn state(&self, trait_name: &str) -> Option<&TraitState> {
        self.internal.get(trait_name)
    }

    pub fn state_mut(&mut self, trait_name: &str) -> Option<&mut TraitState> {
        self.internal.get_mut(trait_name)
    }

    /// The plain-record view of a trait's slot. `None` when the trait is
    /// absent or uses a custom store type.
    pub fn record(&self, trait_name: &str) -> Option<&StateRecord> {
        self.internal.get(trait_name)?.data_ref::<StateRecord>()
    }

    pub fn record_mut(&mut self, trait_name: &str) -> Option<&mut StateRecord> {
        self.internal.get_mut(trait_name)?.data_mut::<StateRecord>()
    }

    /// Custom-typed view of a trait's backing store.
    pub fn store<T: Any>(&self, trait_name: &str) -> Option<&T> {
        self.internal.get(trait_name)?.data_ref::<T>()
    }

    pub fn store_mut<T: Any>(&mut self, trait_name: &str) -> Option<&mut T> {
        self.internal.get_mut(trait_name)?.data_mut::<T>()
    }

    /// A declared property: plain values first, computed accessors on read.
    pub fn property(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.properties.get(name) {
            return Some(value.clone());
        }
        self.computed.get(name).map(|f| f())
    }

    pub fn set_property(&mut self, name: &str, value: Value) {
        self.properties.insert(name.to_string(), value);
    }

    /// Invoke a surface method by name.
    pub fn invoke(&mut self, name: &str, args: &[Value]) -> Result<Value> {
        let method = self
            .methods
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Eval(format!("no method '{name}' on '{}'", self.type_name)))?;
        method(self, args)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// True after `finish` ran its destructor chain.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

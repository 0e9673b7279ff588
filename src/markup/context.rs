//! Expression scopes - chained name/value frames.
//!
//! Each composite opened during parsing gets a child frame; lookups walk
//! toward the root, so inner markup sees its own props first and the
//! caller's bindings behind them.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

use crate::types::Value;

struct Frame {
    values: IndexMap<String, Value>,
    parent: Option<Context>,
}

/// A shared, chainable scope. Cloning is cheap and aliases the same frame.
#[derive(Clone)]
pub struct Context(Rc<RefCell<Frame>>);

impl Context {
    pub fn new() -> Self {
        Context(Rc::new(RefCell::new(Frame {
            values: IndexMap::new(),
            parent: None,
        })))
    }

    /// A child scope whose lookups fall through to this one.
    pub fn child(&self) -> Context {
        Context(Rc::new(RefCell::new(Frame {
            values: IndexMap::new(),
            parent: Some(self.clone()),
        })))
    }

    pub fn set(&self, name: &str, value: Value) {
        self.0.borrow_mut().values.insert(name.to_string(), value);
    }

    /// Look `name` up in this frame, then up the parent chain.
    pub fn get(&self, name: &str) -> Option<Value> {
        let frame = self.0.borrow();
        if let Some(value) = frame.values.get(name) {
            return Some(value.clone());
        }
        frame.parent.as_ref()?.get(name)
    }

    /// Resolve a dotted path, descending into map values after the first
    /// segment.
    pub fn get_path(&self, path: &[String]) -> Option<Value> {
        let (first, rest) = path.split_first()?;
        let mut cur = self.get(first)?;
        for segment in rest {
            match cur {
                Value::Map(map) => cur = map.get(segment)?.clone(),
                _ => return None,
            }
        }
        Some(cur)
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

//! Core value model shared across the registry, the component engine and the
//! markup parser.
//!
//! `Value` is the lingua franca for constructor arguments, declared
//! properties, tag attributes and evaluated expression results. It is a
//! small JSON-like model; nothing here is reactive.

use indexmap::IndexMap;
use std::fmt;

// =============================================================================
// Value
// =============================================================================

/// A dynamically typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Bool(bool),
    Number(f64),
    Str(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    /// True for `Unit`, `false` and empty strings. Filter handlers and
    /// script hosts use this to signal rejection.
    pub fn is_falsy(&self) -> bool {
        match self {
            Value::Unit => true,
            Value::Bool(b) => !b,
            Value::Str(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// The textual form spliced into a markup stream: strings verbatim,
    /// numbers without a trailing `.0`, lists as element concatenation.
    pub fn splice_text(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::List(items) => {
                let mut out = String::new();
                for item in items {
                    out.push_str(&item.splice_text());
                }
                out
            }
            other => other.to_string(),
        }
    }

    /// Parse an attribute value the way the engine stores props: numeric
    /// text becomes a number, everything else stays a string.
    pub fn from_attribute(text: &str) -> Value {
        match text.trim().parse::<f64>() {
            Ok(n) if !text.trim().is_empty() => Value::Number(n),
            _ => Value::Str(text.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, ""),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                for item in items {
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Map(_) => write!(f, "[object]"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

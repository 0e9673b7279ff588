//! Declarative markup packets.
//!
//! A packet is a markup string converted into live elements of a target
//! component: primitive tags become projected document nodes, the
//! composite tag becomes a nested component (optionally driven by a
//! registry class and populated from a fetched template), `{expression}`
//! segments are evaluated and spliced back into the stream before
//! scanning continues, and script blocks are handed to the embedding's
//! script host.
//!
//! The three collaborator seams are all pluggable: [`ExpressionLanguage`]
//! for `{...}` segments, [`PacketSource`] for `src` template retrieval and
//! [`ScriptHost`] for script blocks. Absent collaborators degrade softly;
//! structural markup errors do not.

mod context;
mod expr;
mod parser;
mod source;

pub use context::Context;
pub use expr::{BasicExpressions, ExpressionLanguage, Parsed};
pub use source::{MapSource, PacketSource};

use indexmap::IndexMap;

use crate::dom::NodeId;
use crate::component::ElementSpec;
use crate::error::{Error, Result};
use crate::stage::{ComponentId, Stage};

/// Runs script blocks found in packets. `language` is the block's
/// `language` attribute, when present.
pub trait ScriptHost {
    fn run(&mut self, code: &str, language: Option<&str>, scope: &Context) -> Result<()>;
}

/// Per-call packet conversion options. The defaults evaluate expressions
/// with the built-in language against a fresh scope and have no template
/// source or script host.
pub struct PacketOptions<'a> {
    /// Evaluate `{...}` segments. When off they pass through as text.
    pub run_macro: bool,
    pub context: Option<Context>,
    pub source: Option<&'a mut dyn PacketSource>,
    pub script_host: Option<&'a mut dyn ScriptHost>,
    pub expressions: Option<&'a dyn ExpressionLanguage>,
}

impl PacketOptions<'_> {
    pub fn new() -> Self {
        PacketOptions {
            run_macro: true,
            context: None,
            source: None,
            script_host: None,
            expressions: None,
        }
    }
}

impl Default for PacketOptions<'_> {
    fn default() -> Self {
        PacketOptions::new()
    }
}

/// What a packet conversion produced: identified nodes by id, nested
/// components by bind/id, and the names of the entries bound at the
/// packet's top level, in order.
#[derive(Debug, Default)]
pub struct PacketResult {
    pub elements: IndexMap<String, NodeId>,
    pub components: IndexMap<String, ComponentId>,
    pub roots: Vec<String>,
}

impl Stage {
    /// Convert a packet and append its top-level elements to `comp`.
    pub fn element_push_packet<'a>(
        &'a mut self,
        comp: ComponentId,
        text: &str,
        opts: PacketOptions<'a>,
    ) -> Result<PacketResult> {
        parser::parse_packet(self, comp, text, opts)
    }

    /// Convert a packet ahead of `comp`'s existing elements. The packet's
    /// content lands grouped in an anonymous composite at the front, so
    /// its internal order is preserved in a single pass.
    pub fn element_unshift_packet<'a>(
        &'a mut self,
        comp: ComponentId,
        text: &str,
        opts: PacketOptions<'a>,
    ) -> Result<PacketResult> {
        let Some(name) = self.element_unshift(comp, ElementSpec::composite(None))? else {
            return Ok(PacketResult::default());
        };
        let wrapper = self
            .element_component(comp, &name)
            .ok_or_else(|| Error::Eval("wrapper composite missing".to_string()))?;
        parser::parse_packet(self, wrapper, text, opts)
    }

    /// Replace `comp`'s elements with a packet's content. `Ok(None)` when
    /// an output filter rejected the clear; nothing mutates in that case.
    pub fn element_set_packet<'a>(
        &'a mut self,
        comp: ComponentId,
        text: &str,
        opts: PacketOptions<'a>,
    ) -> Result<Option<PacketResult>> {
        if !self.elements_clear(comp)? {
            return Ok(None);
        }
        parser::parse_packet(self, comp, text, opts).map(Some)
    }
}

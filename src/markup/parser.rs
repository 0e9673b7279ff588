//! The packet state machine.
//!
//! Single pass over a mutable character buffer. Expression splices rewrite
//! the buffer in place and scanning resumes at the splice point, so an
//! expression may inject further markup. Structural errors (an unmatched
//! close tag, a close tag the open stack cannot satisfy) abort the
//! conversion; expression failures degrade to literal text with a log
//! line.

use indexmap::IndexMap;
use log::{debug, warn};

use crate::component::ElementSpec;
use crate::dom::{Namespace, NodeId};
use crate::error::{Error, Result};
use crate::registry::{self, CreateArgs};
use crate::stage::{ComponentId, Stage};
use crate::tags;
use crate::types::Value;

use super::context::Context;
use super::expr::{BasicExpressions, ExpressionLanguage};
use super::source::PacketSource;
use super::{PacketOptions, PacketResult, ScriptHost};

/// Tags that never take content and close themselves.
static VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link",
    "meta", "param", "source", "track", "wbr",
];

/// Where the content currently being scanned lands.
#[derive(Clone, Copy)]
enum Target {
    /// Top of a component: tags become sibling-level entries.
    Component(ComponentId),
    /// Inside a primitive element: tags become plain document children.
    Node { node: NodeId, owner: ComponentId },
    /// Inside a filter-rejected element: content is dropped.
    Discard,
}

struct Frame {
    tag: String,
    target: Target,
    direct_text: bool,
    context: Context,
}

pub(crate) fn parse_packet<'a>(
    stage: &'a mut Stage,
    comp: ComponentId,
    text: &str,
    opts: PacketOptions<'a>,
) -> Result<PacketResult> {
    let default_lang = BasicExpressions::new();
    let lang = opts.expressions.unwrap_or(&default_lang);
    let mut parser = Parser {
        stage,
        run_macro: opts.run_macro,
        source: opts.source,
        script: opts.script_host,
        lang,
        buf: text.chars().collect(),
        pos: 0,
        stack: Vec::new(),
        text: String::new(),
        root: Target::Component(comp),
        base_context: opts.context.unwrap_or_default(),
        result: PacketResult::default(),
    };
    parser.run()?;
    Ok(parser.result)
}

// The language lives on its own lifetime: the default implementation is a
// local of `parse_packet`, while stage and collaborators borrow from the
// caller.
struct Parser<'a, 'l> {
    stage: &'a mut Stage,
    run_macro: bool,
    source: Option<&'a mut dyn PacketSource>,
    script: Option<&'a mut dyn ScriptHost>,
    lang: &'l dyn ExpressionLanguage,
    buf: Vec<char>,
    pos: usize,
    stack: Vec<Frame>,
    text: String,
    root: Target,
    base_context: Context,
    result: PacketResult,
}

impl Parser<'_, '_> {
    // =========================================================================
    // Scanning helpers
    // =========================================================================

    fn peek(&self) -> Option<char> {
        self.buf.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.buf.get(self.pos + ahead).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn starts_with(&self, pat: &str) -> bool {
        pat.chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == Some(c))
    }

    /// Tag or class name: `div`, `svg`, `Component`, `App.Toolbar`.
    fn read_name(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | '$'))
        {
            self.pos += 1;
        }
        self.buf[start..self.pos].iter().collect()
    }

    fn current_target(&self) -> Target {
        self.stack.last().map(|f| f.target).unwrap_or(self.root)
    }

    fn current_context(&self) -> Context {
        self.stack
            .last()
            .map(|f| f.context.clone())
            .unwrap_or_else(|| self.base_context.clone())
    }

    fn current_owner(&self) -> ComponentId {
        match self.current_target() {
            Target::Component(comp) => comp,
            Target::Node { owner, .. } => owner,
            Target::Discard => match self.root {
                Target::Component(comp) => comp,
                Target::Node { owner, .. } => owner,
                Target::Discard => self.stage.root_component(),
            },
        }
    }

    fn direct_text_parent(&self) -> bool {
        self.stack.last().map(|f| f.direct_text).unwrap_or(false)
    }

    // =========================================================================
    // Main loop
    // =========================================================================

    fn run(&mut self) -> Result<()> {
        while self.pos < self.buf.len() {
            let c = self.buf[self.pos];
            if c == '<' {
                if self.starts_with("<!--") {
                    self.skip_comment();
                } else if self.peek_at(1) == Some('/') {
                    self.close_tag()?;
                } else if self.peek_at(1) == Some('!') {
                    // Doctype and CDATA are not part of the packet grammar.
                    debug!("skipping declaration at {}", self.pos);
                    while self.peek().is_some_and(|c| c != '>') {
                        self.pos += 1;
                    }
                    self.eat('>');
                } else if self
                    .peek_at(1)
                    .is_some_and(|c| c.is_alphabetic() || c == '$')
                {
                    self.open_tag()?;
                } else {
                    self.text.push('<');
                    self.pos += 1;
                }
            } else if c == '{' && self.run_macro {
                self.splice();
            } else {
                self.text.push(c);
                self.pos += 1;
            }
        }
        self.flush_text()?;
        if let Some(frame) = self.stack.last() {
            return Err(Error::UnbalancedTag {
                tag: frame.tag.clone(),
                offset: self.buf.len(),
            });
        }
        Ok(())
    }

    fn skip_comment(&mut self) {
        self.pos += 4;
        while self.pos < self.buf.len() && !self.starts_with("-->") {
            self.pos += 1;
        }
        self.pos = (self.pos + 3).min(self.buf.len());
    }

    // =========================================================================
    // Expression splicing
    // =========================================================================

    /// Evaluate the `{...}` at the cursor and splice its text back into
    /// the buffer. Scanning resumes at the splice point, so spliced markup
    /// is parsed like any other. A lone brace or a failed expression stays
    /// in the stream as literal text.
    fn splice(&mut self) {
        let parsed = match self.lang.parse(&self.buf[self.pos..], self.pos) {
            Ok(parsed) => parsed,
            Err(err) if err.is_incomplete() => {
                self.text.push('{');
                self.pos += 1;
                return;
            }
            Err(err) => {
                warn!("expression at {} kept literal: {err}", err.location);
                self.text.push('{');
                self.pos += 1;
                return;
            }
        };
        let consumed = parsed.consumed.max(1);
        let scope = self.current_context();
        match self.lang.eval(&parsed, &scope) {
            Ok(value) => {
                let replacement: Vec<char> = value.splice_text().chars().collect();
                let end = (self.pos + consumed).min(self.buf.len());
                if replacement == self.buf[self.pos..end] {
                    // Evaluates to its own source text; take it literally
                    // instead of re-scanning forever.
                    self.text.extend(&self.buf[self.pos..end]);
                    self.pos = end;
                    return;
                }
                self.buf.splice(self.pos..end, replacement);
            }
            Err(err) => {
                warn!("expression at {} kept literal: {err}", self.pos);
                self.text.push('{');
                self.pos += 1;
            }
        }
    }

    /// Splice `{...}` segments inside raw-text content. Tags stay literal;
    /// only expressions evaluate. Evaluated text is taken as-is, not
    /// re-scanned.
    fn splice_raw(&self, content: &str) -> String {
        if !self.run_macro {
            return content.to_string();
        }
        let chars: Vec<char> = content.chars().collect();
        let scope = self.current_context();
        let mut out = String::new();
        let mut pos = 0;
        while pos < chars.len() {
            if chars[pos] == '{' {
                match self.lang.parse(&chars[pos..], pos) {
                    Ok(parsed) => {
                        let consumed = parsed.consumed.clamp(1, chars.len() - pos);
                        match self.lang.eval(&parsed, &scope) {
                            Ok(value) => {
                                out.push_str(&value.splice_text());
                                pos += consumed;
                                continue;
                            }
                            Err(err) => {
                                warn!("expression at {pos} kept literal: {err}");
                            }
                        }
                    }
                    Err(err) if err.is_incomplete() => {}
                    Err(err) => {
                        warn!("expression at {} kept literal: {err}", err.location);
                    }
                }
            }
            out.push(chars[pos]);
            pos += 1;
        }
        out
    }

    // =========================================================================
    // Text
    // =========================================================================

    fn flush_text(&mut self) -> Result<()> {
        let text = std::mem::take(&mut self.text);
        if text.trim().is_empty() {
            return Ok(());
        }
        match self.current_target() {
            Target::Discard => Ok(()),
            Target::Node { node, .. } if self.direct_text_parent() => {
                let doc = self.stage.document_mut();
                let t = doc.create_text(&text);
                doc.append_child(node, t);
                Ok(())
            }
            Target::Node { node, .. } => {
                // Text under a non-text parent rides in an auto-named span.
                let doc = self.stage.document_mut();
                let span = doc.create_element("span", Namespace::Html);
                let t = doc.create_text(&text);
                doc.append_child(span, t);
                doc.append_child(node, span);
                Ok(())
            }
            Target::Component(comp) => {
                let Some(name) = self.stage.element_push(comp, ElementSpec::tag("span"))? else {
                    return Ok(());
                };
                if let Some(node) = self.stage.element_node(comp, &name) {
                    let doc = self.stage.document_mut();
                    let t = doc.create_text(&text);
                    doc.append_child(node, t);
                    if self.stack.is_empty() {
                        self.result.roots.push(name);
                    }
                }
                Ok(())
            }
        }
    }

    // =========================================================================
    // Tags
    // =========================================================================

    fn close_tag(&mut self) -> Result<()> {
        self.flush_text()?;
        let offset = self.pos;
        self.pos += 2;
        let tag = self.read_name();
        self.skip_ws();
        if !self.eat('>') {
            return Err(Error::UnbalancedTag { tag, offset });
        }
        let Some(frame) = self.stack.pop() else {
            return Err(Error::UnbalancedTag { tag, offset });
        };
        if !frame.tag.eq_ignore_ascii_case(&tag) {
            // Name the tag still waiting for its close, not the stray one.
            return Err(Error::UnbalancedTag {
                tag: frame.tag,
                offset,
            });
        }
        Ok(())
    }

    fn open_tag(&mut self) -> Result<()> {
        self.flush_text()?;
        let start = self.pos;
        self.pos += 1;
        let tag = self.read_name();

        let mut attrs: IndexMap<String, Value> = IndexMap::new();
        let mut self_close = false;
        loop {
            self.skip_ws();
            match self.peek() {
                None => {
                    return Err(Error::UnbalancedTag { tag, offset: start });
                }
                Some('>') => {
                    self.pos += 1;
                    break;
                }
                Some('/') if self.peek_at(1) == Some('>') => {
                    self.pos += 2;
                    self_close = true;
                    break;
                }
                _ => {
                    let (key, value) = self.read_attr();
                    if !key.is_empty() {
                        attrs.insert(key, value);
                    }
                }
            }
        }
        let closed = self_close || VOID_TAGS.contains(&tag.to_ascii_lowercase().as_str());

        if matches!(self.current_target(), Target::Discard) {
            if tags::is_raw_text(&tag) && !closed {
                self.read_raw_until_close(&tag)?;
            } else if !closed {
                self.stack.push(Frame {
                    tag,
                    target: Target::Discard,
                    direct_text: false,
                    context: self.current_context(),
                });
            }
            return Ok(());
        }

        if tags::is_composite(&tag) {
            self.open_composite(tag, attrs, closed)
        } else {
            self.open_primitive(tag, attrs, closed)
        }
    }

    fn read_attr(&mut self) -> (String, Value) {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| !c.is_whitespace() && !matches!(c, '=' | '>' | '/'))
        {
            self.pos += 1;
        }
        let key: String = self.buf[start..self.pos].iter().collect();
        if key.is_empty() {
            // Stray character inside a tag; step over it.
            self.pos += 1;
            return (key, Value::Bool(true));
        }
        self.skip_ws();
        if !self.eat('=') {
            // Bare boolean attribute.
            return (key, Value::Bool(true));
        }
        self.skip_ws();
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != quote) {
                    self.pos += 1;
                }
                let value: String = self.buf[start..self.pos].iter().collect();
                self.eat(quote);
                (key, Value::Str(value))
            }
            Some('{') if self.run_macro => {
                match self.lang.parse(&self.buf[self.pos..], self.pos) {
                    Ok(parsed) => {
                        let end = (self.pos + parsed.consumed.max(1)).min(self.buf.len());
                        let raw: String = self.buf[self.pos..end].iter().collect();
                        self.pos = end;
                        let scope = self.current_context();
                        match self.lang.eval(&parsed, &scope) {
                            Ok(value) => (key, value),
                            Err(err) => {
                                warn!("attribute expression kept literal: {err}");
                                (key, Value::Str(raw))
                            }
                        }
                    }
                    Err(err) => {
                        warn!("attribute expression kept literal: {err}");
                        // Consume through the closing brace so the rest of
                        // the bad expression cannot leak into attribute
                        // scanning.
                        let start = self.pos;
                        while self.peek().is_some_and(|c| c != '}' && c != '>') {
                            self.pos += 1;
                        }
                        self.eat('}');
                        let raw: String = self.buf[start..self.pos].iter().collect();
                        (key, Value::Str(raw))
                    }
                }
            }
            _ => {
                let start = self.pos;
                while self
                    .peek()
                    .is_some_and(|c| !c.is_whitespace() && !matches!(c, '>' | '/'))
                {
                    self.pos += 1;
                }
                let raw: String = self.buf[start..self.pos].iter().collect();
                (key, Value::from_attribute(&raw))
            }
        }
    }

    fn open_primitive(
        &mut self,
        tag: String,
        attrs: IndexMap<String, Value>,
        closed: bool,
    ) -> Result<()> {
        let id_attr = attrs.get("id").map(Value::splice_text);
        let owner = self.current_owner();

        let node = match self.current_target() {
            Target::Component(comp) => {
                let mut spec = ElementSpec::tag(&tag);
                for (key, value) in &attrs {
                    spec = spec.attribute(key, &value.splice_text());
                }
                if let Some(id) = &id_attr {
                    spec = spec.named(id);
                }
                let Some(name) = self.stage.element_push(comp, spec)? else {
                    debug!("'{tag}' rejected by element filter");
                    if !closed {
                        self.stack.push(Frame {
                            tag,
                            target: Target::Discard,
                            direct_text: false,
                            context: self.current_context(),
                        });
                    }
                    return Ok(());
                };
                let Some(node) = self.stage.element_node(comp, &name) else {
                    return Ok(());
                };
                // Anonymous elements keep their stamped name but are not
                // exposed in the result map.
                if id_attr.is_some() {
                    self.result.elements.insert(name.clone(), node);
                }
                if self.stack.is_empty() {
                    self.result.roots.push(name);
                }
                node
            }
            Target::Node { node: parent, .. } => {
                let ns = if tags::is_svg(&tag) {
                    Namespace::Svg
                } else {
                    Namespace::Html
                };
                let doc = self.stage.document_mut();
                let node = doc.create_element(&tag, ns);
                for (key, value) in &attrs {
                    doc.set_attribute(node, key, &value.splice_text());
                }
                doc.append_child(parent, node);
                if let Some(id) = &id_attr {
                    self.result.elements.insert(id.clone(), node);
                }
                node
            }
            Target::Discard => return Ok(()),
        };

        if tags::is_raw_text(&tag) && !closed {
            let content = self.read_raw_until_close(&tag)?;
            if tag.eq_ignore_ascii_case("script") {
                // Script bodies reach the host verbatim, braces included.
                self.run_script(&content, &attrs)?;
            } else {
                let text = self.splice_raw(&content);
                if !text.is_empty() {
                    let doc = self.stage.document_mut();
                    let t = doc.create_text(&text);
                    doc.append_child(node, t);
                }
            }
            return Ok(());
        }

        if !closed {
            let context = self.current_context();
            self.stack.push(Frame {
                direct_text: tags::is_direct_text(&tag),
                target: Target::Node { node, owner },
                tag,
                context,
            });
        }
        Ok(())
    }

    fn run_script(&mut self, code: &str, attrs: &IndexMap<String, Value>) -> Result<()> {
        let language = attrs.get("language").map(Value::splice_text);
        if language.as_deref() == Some("comment") {
            return Ok(());
        }
        let scope = self.current_context();
        match self.script.as_deref_mut() {
            Some(host) => host.run(code, language.as_deref(), &scope),
            None => {
                if !code.trim().is_empty() {
                    debug!("script block skipped: no script host");
                }
                Ok(())
            }
        }
    }

    fn open_composite(
        &mut self,
        tag: String,
        attrs: IndexMap<String, Value>,
        closed: bool,
    ) -> Result<()> {
        // <Component class="X"> or a registry path used directly as a tag.
        let class_name = if tag == tags::COMPOSITE_TAG {
            attrs.get("class").map(Value::splice_text)
        } else {
            Some(tag.clone())
        };
        let id_attr = attrs.get("id").map(Value::splice_text);
        let bind = attrs.get("bind").map(Value::splice_text);
        let src = attrs.get("src").map(Value::splice_text);
        let src_data = attrs.get("srcData").map(Value::splice_text);

        // Remaining attributes become props: visible to the composite's
        // markup scope and handed to its class constructor as a map.
        let child_context = self.current_context().child();
        let mut props = IndexMap::new();
        for (key, value) in &attrs {
            if matches!(key.as_str(), "id" | "bind" | "src" | "srcData" | "class") {
                continue;
            }
            child_context.set(key, value.clone());
            props.insert(key.clone(), value.clone());
        }
        let mut args = CreateArgs::new();
        if let Some(class) = &class_name {
            args.insert(class.clone(), Value::List(vec![Value::Map(props)]));
        }

        let child = match self.current_target() {
            Target::Component(comp) => {
                let mut spec = ElementSpec::composite(class_name.as_deref()).args(args);
                if let Some(name) = bind.as_ref().or(id_attr.as_ref()) {
                    spec = spec.named(name);
                }
                let Some(name) = self.stage.element_push(comp, spec)? else {
                    if !closed {
                        self.stack.push(Frame {
                            tag,
                            target: Target::Discard,
                            direct_text: false,
                            context: child_context,
                        });
                    }
                    return Ok(());
                };
                if self.stack.is_empty() {
                    self.result.roots.push(name.clone());
                }
                let Some(child) = self.stage.element_component(comp, &name) else {
                    return Ok(());
                };
                child
            }
            Target::Node { node, owner } => {
                // A composite below a primitive subtree mounts directly
                // under that node; it is not a sibling-level entry.
                let child = self.stage.create_component(Some(node));
                self.stage.component_mut(owner).nested.push(child);
                if let Some(class) = &class_name {
                    let instance = registry::create_in(self.stage, child, class, &args)?;
                    self.stage.component_mut(child).instance = Some(instance);
                }
                child
            }
            Target::Discard => return Ok(()),
        };
        if let Some(key) = bind.as_ref().or(id_attr.as_ref()) {
            self.result.components.insert(key.clone(), child);
        }

        // Template content, fetched once per stage, parsed into the child.
        // Inner markup then lands in the template's $childrenTarget when it
        // declares one.
        let mut inner = Target::Component(child);
        let template = match (&src, &src_data) {
            (Some(key), _) => Some(self.fetch_template(key)?),
            (None, Some(binding)) => Some(self.inline_template(binding)?),
            (None, None) => None,
        };
        if let Some(text) = template {
            let tpl = self.parse_fragment(&text, Target::Component(child), child_context.clone())?;
            if let Some(&target) = tpl.elements.get("$childrenTarget") {
                inner = Target::Node {
                    node: target,
                    owner: child,
                };
            }
        }

        if !closed {
            self.stack.push(Frame {
                tag,
                target: inner,
                direct_text: false,
                context: child_context,
            });
        }
        Ok(())
    }

    fn fetch_template(&mut self, key: &str) -> Result<String> {
        if let Some(text) = self.stage.cached_packet(key) {
            return Ok(text.to_string());
        }
        let Some(source) = self.source.as_deref_mut() else {
            return Err(Error::Fetch {
                key: key.to_string(),
                reason: "no packet source configured".to_string(),
            });
        };
        let text = source.fetch(key)?;
        self.stage.cache_packet(key, text.clone());
        Ok(text)
    }

    fn inline_template(&self, binding: &str) -> Result<String> {
        self.current_context()
            .get(binding)
            .map(|value| value.splice_text())
            .ok_or_else(|| Error::Fetch {
                key: binding.to_string(),
                reason: "srcData binding not found in scope".to_string(),
            })
    }

    /// Parse a nested packet (a fetched template) with its own buffer and
    /// stack, into its own result.
    fn parse_fragment(
        &mut self,
        text: &str,
        root: Target,
        context: Context,
    ) -> Result<PacketResult> {
        let saved_buf = std::mem::replace(&mut self.buf, text.chars().collect());
        let saved_pos = std::mem::replace(&mut self.pos, 0);
        let saved_stack = std::mem::take(&mut self.stack);
        let saved_text = std::mem::take(&mut self.text);
        let saved_root = std::mem::replace(&mut self.root, root);
        let saved_context = std::mem::replace(&mut self.base_context, context);
        let saved_result = std::mem::take(&mut self.result);

        let outcome = self.run();

        let fragment = std::mem::replace(&mut self.result, saved_result);
        self.buf = saved_buf;
        self.pos = saved_pos;
        self.stack = saved_stack;
        self.text = saved_text;
        self.root = saved_root;
        self.base_context = saved_context;
        outcome?;
        Ok(fragment)
    }

    /// Consume verbatim content up to the literal close sequence of a
    /// raw-text tag, the close sequence included.
    fn read_raw_until_close(&mut self, tag: &str) -> Result<String> {
        let needle: Vec<char> = format!("</{tag}").to_ascii_lowercase().chars().collect();
        let mut i = self.pos;
        while i < self.buf.len() {
            let matches = self.buf[i..]
                .iter()
                .map(|c| c.to_ascii_lowercase())
                .take(needle.len())
                .eq(needle.iter().copied())
                && self.buf[i..].len() >= needle.len()
                && self
                    .buf
                    .get(i + needle.len())
                    .is_none_or(|c| c.is_whitespace() || *c == '>');
            if matches {
                let content: String = self.buf[self.pos..i].iter().collect();
                let mut j = i + needle.len();
                while self.buf.get(j).is_some_and(|c| c.is_whitespace()) {
                    j += 1;
                }
                if self.buf.get(j) == Some(&'>') {
                    self.pos = j + 1;
                    return Ok(content);
                }
            }
            i += 1;
        }
        Err(Error::UnbalancedTag {
            tag: tag.to_string(),
            offset: self.buf.len(),
        })
    }
}

//! Component element operations - the ordered, named, projected child
//! collection every composite exposes.
//!
//! Elements are either *primitive* (a real document node) or *composite*
//! (a nested component with no node of its own). Every mutating operation
//! runs the collection's filters against pre-mutation state, projects the
//! document change, then fires notices, so observers always see the
//! document already consistent with the collection.

use indexmap::IndexMap;
use log::debug;

use crate::children::{Filter, FilterArgs, HookId, InsertOp, Notice, NoticeArgs, RemoveOp};
use crate::dom::{Namespace, NodeId};
use crate::error::{Error, Result};
use crate::projector;
use crate::registry::{self, CreateArgs};
use crate::stage::{ComponentId, Stage};
use crate::tags;

// =============================================================================
// Entries
// =============================================================================

#[derive(Debug)]
pub(crate) enum ChildKind {
    Primitive { node: NodeId },
    Composite { component: ComponentId },
}

/// One element of a component's child collection.
#[derive(Debug)]
pub struct ChildEntry {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) tag: String,
    pub(crate) kind: ChildKind,
}

impl ChildEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.kind, ChildKind::Composite { .. })
    }

    /// The real document node, for primitive entries.
    pub fn node(&self) -> Option<NodeId> {
        match self.kind {
            ChildKind::Primitive { node } => Some(node),
            ChildKind::Composite { .. } => None,
        }
    }

    pub fn component(&self) -> Option<ComponentId> {
        match self.kind {
            ChildKind::Primitive { .. } => None,
            ChildKind::Composite { component } => Some(component),
        }
    }
}

// =============================================================================
// ElementSpec
// =============================================================================

/// What to insert: a primitive tag or a composite, optionally named,
/// with attributes and (for composites) a registry class plus arguments.
pub struct ElementSpec {
    tag: String,
    name: Option<String>,
    attributes: IndexMap<String, String>,
    class_name: Option<String>,
    args: CreateArgs,
}

impl ElementSpec {
    /// A primitive element.
    pub fn tag(tag: &str) -> Self {
        ElementSpec {
            tag: tag.to_string(),
            name: None,
            attributes: IndexMap::new(),
            class_name: None,
            args: CreateArgs::new(),
        }
    }

    /// A composite, optionally driven by a registry class.
    pub fn composite(class_name: Option<&str>) -> Self {
        ElementSpec {
            tag: tags::COMPOSITE_TAG.to_string(),
            name: None,
            attributes: IndexMap::new(),
            class_name: class_name.map(str::to_string),
            args: CreateArgs::new(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn args(mut self, args: CreateArgs) -> Self {
        self.args = args;
        self
    }
}

// =============================================================================
// Element operations
// =============================================================================

impl Stage {
    fn entry_index(&self, comp: ComponentId, name: &str) -> Option<usize> {
        let component = self.component(comp);
        let id = *component.names.get(name)?;
        component.children.find_index(0, |_, entry| entry.id == id)
    }

    fn insert_element(
        &mut self,
        comp: ComponentId,
        spec: ElementSpec,
        op: InsertOp,
    ) -> Result<Option<String>> {
        if let Some(name) = &spec.name {
            if self.component(comp).names.contains_key(name) {
                return Err(Error::DuplicateName(name.clone()));
            }
        }

        let entry_id = self.next_entry;
        self.next_entry += 1;

        let mut composite_child = None;
        let (kind, auto_name) = if tags::is_composite(&spec.tag) {
            let parent_node = self.component(comp).parent_node;
            let child = self.new_child_component(parent_node, comp);
            self.component_mut(child).entry_in_parent = Some(entry_id);
            composite_child = Some(child);
            let auto = self.doc.next_conversion_id();
            (ChildKind::Composite { component: child }, auto)
        } else {
            let ns = if tags::is_svg(&spec.tag) {
                Namespace::Svg
            } else {
                Namespace::Html
            };
            let node = self.doc.create_element(&spec.tag, ns);
            let auto = self
                .doc
                .get_attribute(node, "id")
                .unwrap_or_default()
                .to_string();
            for (name, value) in &spec.attributes {
                self.doc.set_attribute(node, name, value);
            }
            (ChildKind::Primitive { node }, auto)
        };

        let name = spec.name.unwrap_or(auto_name);
        let entry = ChildEntry {
            id: entry_id,
            name: name.clone(),
            tag: spec.tag.clone(),
            kind,
        };

        let staged = match op {
            InsertOp::Push => self.component_mut(comp).children.stage_push(entry),
            InsertOp::Unshift => self.component_mut(comp).children.stage_unshift(entry),
        };
        let Some(index) = staged else {
            debug!("element '{name}' rejected by filter");
            // A composite shell may already exist; mark it dead.
            if let Some(child) = composite_child {
                self.component_mut(child).disposed = true;
            }
            return Ok(None);
        };

        // Project before notices fire so observers see the document in
        // sync with the collection.
        let placed = self
            .component(comp)
            .children
            .get(index)
            .ok()
            .and_then(ChildEntry::node);
        if let Some(node) = placed {
            projector::insert_node(&mut self.doc, &self.components, comp, index, node)?;
        } else if let (Some(class_name), Some(child)) = (&spec.class_name, composite_child) {
            let instance = registry::create_in(self, child, class_name, &spec.args)?;
            self.component_mut(child).instance = Some(instance);
        }

        self.component_mut(comp).names.insert(name.clone(), entry_id);
        self.component(comp).children.notify_inserted(index, op);
        Ok(Some(name))
    }

    /// Append an element. Returns the bound name, or `None` when a filter
    /// rejected the insert.
    pub fn element_push(&mut self, comp: ComponentId, spec: ElementSpec) -> Result<Option<String>> {
        self.insert_element(comp, spec, InsertOp::Push)
    }

    /// Prepend an element. Returns the bound name, or `None` on rejection.
    pub fn element_unshift(
        &mut self,
        comp: ComponentId,
        spec: ElementSpec,
    ) -> Result<Option<String>> {
        self.insert_element(comp, spec, InsertOp::Unshift)
    }

    fn teardown_entry(&mut self, entry: &ChildEntry) -> Result<()> {
        match entry.kind {
            ChildKind::Primitive { node } => {
                self.doc.detach(node);
                Ok(())
            }
            ChildKind::Composite { component } => self.dispose_component(component),
        }
    }

    fn remove_end(&mut self, comp: ComponentId, op: RemoveOp) -> Result<Option<String>> {
        let len = self.component(comp).children.count();
        if len == 0 {
            return Ok(None);
        }
        let index = match op {
            RemoveOp::Pop => len - 1,
            _ => 0,
        };
        let Some(entry) = self.component_mut(comp).children.stage_remove(index, op) else {
            return Ok(None);
        };
        // Bookkeeping finishes even when teardown fails: the alias must go
        // and the notice must fire, or the collection drifts from the
        // document.
        let outcome = self.teardown_entry(&entry);
        self.component_mut(comp).names.shift_remove(&entry.name);
        self.component(comp).children.notify_removed(index, op);
        outcome?;
        Ok(Some(entry.name))
    }

    /// Remove the last element, tearing it down. Returns its name, or
    /// `None` when empty or rejected.
    pub fn element_pop(&mut self, comp: ComponentId) -> Result<Option<String>> {
        self.remove_end(comp, RemoveOp::Pop)
    }

    /// Remove the first element, tearing it down.
    pub fn element_shift(&mut self, comp: ComponentId) -> Result<Option<String>> {
        self.remove_end(comp, RemoveOp::Shift)
    }

    /// Remove a named element. `Ok(false)` when the name is unbound or a
    /// filter rejected the removal.
    pub fn element_remove(&mut self, comp: ComponentId, name: &str) -> Result<bool> {
        let Some(index) = self.entry_index(comp, name) else {
            return Ok(false);
        };
        let Some(entry) = self
            .component_mut(comp)
            .children
            .stage_remove(index, RemoveOp::At)
        else {
            return Ok(false);
        };
        let outcome = self.teardown_entry(&entry);
        self.component_mut(comp).names.shift_remove(&entry.name);
        self.component(comp)
            .children
            .notify_removed(index, RemoveOp::At);
        outcome?;
        Ok(true)
    }

    /// Remove every element. All output filters run against pre-mutation
    /// state; one rejection aborts the whole batch.
    pub fn elements_clear(&mut self, comp: ComponentId) -> Result<bool> {
        let Some(removed) = self.component_mut(comp).children.clear() else {
            return Ok(false);
        };
        self.component_mut(comp).names.clear();
        let mut errors = Vec::new();
        for entry in &removed {
            if let Err(err) = self.teardown_entry(entry) {
                errors.push(err);
            }
        }
        if errors.is_empty() {
            Ok(true)
        } else {
            Err(Error::Teardown {
                name: "elements".to_string(),
                errors,
            })
        }
    }

    /// Rebind an element under a new name. The entry itself does not move;
    /// only the alias changes.
    pub fn element_rename(&mut self, comp: ComponentId, old: &str, new: &str) -> Result<bool> {
        if self.component(comp).names.contains_key(new) {
            return Err(Error::DuplicateName(new.to_string()));
        }
        let Some(id) = self.component_mut(comp).names.shift_remove(old) else {
            return Ok(false);
        };
        self.component_mut(comp).names.insert(new.to_string(), id);
        if let Some(index) = self
            .component(comp)
            .children
            .find_index(0, |_, entry| entry.id == id)
        {
            if let Some(entry) = self.component_mut(comp).children.get_mut(index) {
                entry.name = new.to_string();
            }
        }
        Ok(true)
    }

    // =========================================================================
    // Locking
    // =========================================================================

    /// Reject every mutation of the component's elements until unlocked.
    pub fn element_lock(&mut self, comp: ComponentId) {
        if self.component(comp).lock.is_some() {
            return;
        }
        let input = self
            .component_mut(comp)
            .children
            .on_filter(Filter::Input, |_| false);
        let output = self
            .component_mut(comp)
            .children
            .on_filter(Filter::Output, |_| false);
        self.component_mut(comp).lock = Some((input, output));
    }

    pub fn element_unlock(&mut self, comp: ComponentId) {
        if let Some((input, output)) = self.component_mut(comp).lock.take() {
            self.component_mut(comp).children.off(input);
            self.component_mut(comp).children.off(output);
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn element_count(&self, comp: ComponentId) -> usize {
        self.component(comp).children.count()
    }

    pub fn element_names(&self, comp: ComponentId) -> Vec<String> {
        self.component(comp).names.keys().cloned().collect()
    }

    /// The real document node behind a named primitive element.
    pub fn element_node(&self, comp: ComponentId, name: &str) -> Option<NodeId> {
        let index = self.entry_index(comp, name)?;
        self.component(comp).children.get(index).ok()?.node()
    }

    /// The nested component behind a named composite element.
    pub fn element_component(&self, comp: ComponentId, name: &str) -> Option<ComponentId> {
        let index = self.entry_index(comp, name)?;
        self.component(comp).children.get(index).ok()?.component()
    }

    pub fn element_is_composite(&self, comp: ComponentId, name: &str) -> Option<bool> {
        let index = self.entry_index(comp, name)?;
        Some(self.component(comp).children.get(index).ok()?.is_composite())
    }

    /// Concatenated text content of a named primitive element's subtree.
    pub fn element_contents(&self, comp: ComponentId, name: &str) -> Option<String> {
        let node = self.element_node(comp, name)?;
        Some(self.doc.text_content(node))
    }

    // =========================================================================
    // Hooks
    // =========================================================================

    pub fn on_elements_filter<F>(&mut self, comp: ComponentId, kind: Filter, handler: F) -> HookId
    where
        F: Fn(&FilterArgs<'_, ChildEntry>) -> bool + 'static,
    {
        self.component_mut(comp).children.on_filter(kind, handler)
    }

    pub fn on_elements_notice<F>(&mut self, comp: ComponentId, kind: Notice, handler: F) -> HookId
    where
        F: Fn(&NoticeArgs<'_, ChildEntry>) + 'static,
    {
        self.component_mut(comp).children.on_notice(kind, handler)
    }

    pub fn off_elements(&mut self, comp: ComponentId, id: HookId) {
        self.component_mut(comp).children.off(id);
    }

    // =========================================================================
    // Disposal
    // =========================================================================

    /// Tear a component down: nested composites finish deepest-first, real
    /// nodes detach, then the component's own instance runs its destructor
    /// chain. Disposal bypasses filters; it is not cancelable. Failures are
    /// collected so the whole tree always unwinds.
    pub fn dispose_component(&mut self, comp: ComponentId) -> Result<()> {
        if self.component(comp).disposed {
            return Ok(());
        }
        self.component_mut(comp).disposed = true;

        let mut errors = Vec::new();
        let entries = self.component_mut(comp).children.drain_all();
        for entry in &entries {
            match entry.kind {
                ChildKind::Primitive { node } => self.doc.detach(node),
                ChildKind::Composite { component } => {
                    if let Err(err) = self.dispose_component(component) {
                        errors.push(err);
                    }
                }
            }
        }
        let nested = std::mem::take(&mut self.component_mut(comp).nested);
        for child in nested {
            if let Err(err) = self.dispose_component(child) {
                errors.push(err);
            }
        }
        self.component_mut(comp).names.clear();

        if let Some(mut instance) = self.component_mut(comp).instance.take() {
            if let Err(err) = registry::finish_in(self, comp, &mut instance, &CreateArgs::new()) {
                errors.push(err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Teardown {
                name: "component".to_string(),
                errors,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{reset_registry, TraitSpec};
    use crate::types::Value;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn setup() -> (Stage, ComponentId) {
        reset_registry();
        let stage = Stage::new();
        let root = stage.root_component();
        (stage, root)
    }

    #[test]
    fn test_push_projects_in_document_order() {
        let (mut stage, root) = setup();
        let a = stage.element_push(root, ElementSpec::tag("div")).unwrap().unwrap();
        let b = stage.element_push(root, ElementSpec::tag("span")).unwrap().unwrap();

        assert_eq!(a, "_0");
        assert_eq!(b, "_1");
        let a_node = stage.element_node(root, &a).unwrap();
        let b_node = stage.element_node(root, &b).unwrap();
        let doc_root = stage.document().root();
        assert_eq!(stage.document().child_nodes(doc_root), &[a_node, b_node]);
    }

    #[test]
    fn test_named_element_with_attributes() {
        let (mut stage, root) = setup();
        let name = stage
            .element_push(
                root,
                ElementSpec::tag("div").named("panel").attribute("class", "wide"),
            )
            .unwrap()
            .unwrap();
        assert_eq!(name, "panel");

        let node = stage.element_node(root, "panel").unwrap();
        assert_eq!(stage.document().get_attribute(node, "class"), Some("wide"));
        assert_eq!(stage.element_is_composite(root, "panel"), Some(false));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let (mut stage, root) = setup();
        stage
            .element_push(root, ElementSpec::tag("div").named("x"))
            .unwrap();
        let err = stage
            .element_push(root, ElementSpec::tag("span").named("x"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateName(_)));
    }

    #[test]
    fn test_composite_flattening_interleaved() {
        let (mut stage, root) = setup();
        stage
            .element_push(root, ElementSpec::tag("div").named("a"))
            .unwrap();
        let c = stage
            .element_push(root, ElementSpec::composite(None).named("c"))
            .unwrap()
            .unwrap();
        stage
            .element_push(root, ElementSpec::tag("div").named("b"))
            .unwrap();

        // Content pushed into the composite afterwards still lands between
        // its siblings' nodes.
        let comp = stage.element_component(root, &c).unwrap();
        stage
            .element_push(comp, ElementSpec::tag("span").named("inner"))
            .unwrap();

        let a_node = stage.element_node(root, "a").unwrap();
        let b_node = stage.element_node(root, "b").unwrap();
        let inner = stage.element_node(comp, "inner").unwrap();
        let doc_root = stage.document().root();
        assert_eq!(
            stage.document().child_nodes(doc_root),
            &[a_node, inner, b_node]
        );
    }

    #[test]
    fn test_empty_composite_unshift_prepends() {
        let (mut stage, root) = setup();
        let c = stage
            .element_push(root, ElementSpec::composite(None))
            .unwrap()
            .unwrap();
        stage
            .element_push(root, ElementSpec::tag("div").named("after"))
            .unwrap();

        let comp = stage.element_component(root, &c).unwrap();
        stage
            .element_unshift(comp, ElementSpec::tag("span").named("first"))
            .unwrap();

        let first = stage.element_node(comp, "first").unwrap();
        let after = stage.element_node(root, "after").unwrap();
        let doc_root = stage.document().root();
        assert_eq!(stage.document().child_nodes(doc_root), &[first, after]);
    }

    #[test]
    fn test_nested_composites_flatten() {
        let (mut stage, root) = setup();
        let outer = stage
            .element_push(root, ElementSpec::composite(None))
            .unwrap()
            .unwrap();
        let outer_id = stage.element_component(root, &outer).unwrap();
        stage
            .element_push(outer_id, ElementSpec::tag("div").named("lead"))
            .unwrap();
        let inner = stage
            .element_push(outer_id, ElementSpec::composite(None))
            .unwrap()
            .unwrap();
        let inner_id = stage.element_component(outer_id, &inner).unwrap();
        stage
            .element_push(inner_id, ElementSpec::tag("em").named("deep"))
            .unwrap();
        stage
            .element_push(root, ElementSpec::tag("div").named("tail"))
            .unwrap();

        let lead = stage.element_node(outer_id, "lead").unwrap();
        let deep = stage.element_node(inner_id, "deep").unwrap();
        let tail = stage.element_node(root, "tail").unwrap();
        let doc_root = stage.document().root();
        assert_eq!(
            stage.document().child_nodes(doc_root),
            &[lead, deep, tail]
        );
    }

    #[test]
    fn test_remove_detaches_node() {
        let (mut stage, root) = setup();
        stage
            .element_push(root, ElementSpec::tag("div").named("x"))
            .unwrap();
        let node = stage.element_node(root, "x").unwrap();

        assert!(stage.element_remove(root, "x").unwrap());
        assert!(stage.element_node(root, "x").is_none());
        assert_eq!(stage.document().parent(node), None);
        assert!(!stage.element_remove(root, "x").unwrap());
    }

    #[test]
    fn test_pop_and_shift_return_names() {
        let (mut stage, root) = setup();
        stage
            .element_push(root, ElementSpec::tag("div").named("a"))
            .unwrap();
        stage
            .element_push(root, ElementSpec::tag("div").named("b"))
            .unwrap();

        assert_eq!(stage.element_pop(root).unwrap(), Some("b".to_string()));
        assert_eq!(stage.element_shift(root).unwrap(), Some("a".to_string()));
        assert_eq!(stage.element_pop(root).unwrap(), None);
    }

    #[test]
    fn test_lock_blocks_mutation() {
        let (mut stage, root) = setup();
        stage
            .element_push(root, ElementSpec::tag("div").named("kept"))
            .unwrap();
        stage.element_lock(root);

        assert_eq!(stage.element_push(root, ElementSpec::tag("span")).unwrap(), None);
        assert_eq!(stage.element_pop(root).unwrap(), None);
        assert_eq!(stage.element_count(root), 1);

        stage.element_unlock(root);
        assert!(stage.element_push(root, ElementSpec::tag("span")).unwrap().is_some());
    }

    #[test]
    fn test_rename_keeps_position() {
        let (mut stage, root) = setup();
        stage
            .element_push(root, ElementSpec::tag("div").named("old"))
            .unwrap();
        let node = stage.element_node(root, "old").unwrap();

        assert!(stage.element_rename(root, "old", "new").unwrap());
        assert!(stage.element_node(root, "old").is_none());
        assert_eq!(stage.element_node(root, "new"), Some(node));
        assert!(!stage.element_rename(root, "old", "other").unwrap());

        stage
            .element_push(root, ElementSpec::tag("div").named("taken"))
            .unwrap();
        assert!(matches!(
            stage.element_rename(root, "new", "taken"),
            Err(Error::DuplicateName(_))
        ));
    }

    #[test]
    fn test_composite_instance_ctor_populates() {
        let (mut stage, root) = setup();
        crate::registry::define(
            "Widget",
            TraitSpec::new().ctor(|_, cx, _| {
                let comp = cx.component.expect("component");
                let stage = cx.stage.as_mut().expect("stage");
                stage.element_push(comp, ElementSpec::tag("div").named("body"))?;
                Ok(())
            }),
        )
        .unwrap();

        let name = stage
            .element_push(root, ElementSpec::composite(Some("Widget")))
            .unwrap()
            .unwrap();
        let comp = stage.element_component(root, &name).unwrap();
        assert!(stage.element_node(comp, "body").is_some());
        assert!(stage.instance(comp).is_some());
        assert!(stage.instance(comp).unwrap().instance_of("Widget"));
    }

    #[test]
    fn test_ctor_args_reach_composite_instance() {
        let (mut stage, root) = setup();
        crate::registry::define(
            "Labeled",
            TraitSpec::new().ctor(|instance, _, args| {
                let label = args.first().and_then(Value::as_str).unwrap_or("").to_string();
                instance
                    .record_mut("Labeled")
                    .expect("record")
                    .insert("label".into(), Value::Str(label));
                Ok(())
            }),
        )
        .unwrap();

        let mut args = CreateArgs::new();
        args.insert("Labeled".into(), Value::List(vec![Value::Str("hi".into())]));
        let name = stage
            .element_push(root, ElementSpec::composite(Some("Labeled")).args(args))
            .unwrap()
            .unwrap();
        let comp = stage.element_component(root, &name).unwrap();
        assert_eq!(
            stage.instance(comp).unwrap().record("Labeled").unwrap().get("label"),
            Some(&Value::Str("hi".into()))
        );
    }

    #[test]
    fn test_dispose_finishes_children_before_parent() {
        let (mut stage, root) = setup();
        let order: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

        let log = order.clone();
        crate::registry::define(
            "Leaf",
            TraitSpec::new().dtor(move |instance, _, _| {
                log.borrow_mut().push(format!("leaf:{}", instance.type_name()));
                Ok(())
            }),
        )
        .unwrap();
        let log = order.clone();
        crate::registry::define(
            "Holder",
            TraitSpec::new()
                .ctor(|_, cx, _| {
                    let comp = cx.component.expect("component");
                    let stage = cx.stage.as_mut().expect("stage");
                    stage.element_push(comp, ElementSpec::composite(Some("Leaf")))?;
                    stage.element_push(comp, ElementSpec::composite(Some("Leaf")))?;
                    Ok(())
                })
                .dtor(move |_, _, _| {
                    log.borrow_mut().push("holder".to_string());
                    Ok(())
                }),
        )
        .unwrap();

        let name = stage
            .element_push(root, ElementSpec::composite(Some("Holder")))
            .unwrap()
            .unwrap();
        let comp = stage.element_component(root, &name).unwrap();
        stage.dispose_component(comp).unwrap();

        assert_eq!(
            *order.borrow(),
            vec!["leaf:Leaf".to_string(), "leaf:Leaf".to_string(), "holder".to_string()]
        );
        assert!(stage.is_disposed(comp));
        // Idempotent.
        stage.dispose_component(comp).unwrap();
        assert_eq!(order.borrow().len(), 3);
    }

    #[test]
    fn test_clear_is_atomic_under_output_filter() {
        let (mut stage, root) = setup();
        stage
            .element_push(root, ElementSpec::tag("div").named("a"))
            .unwrap();
        stage
            .element_push(root, ElementSpec::tag("div").named("b"))
            .unwrap();
        stage.on_elements_filter(root, Filter::Output, |args| {
            args.old.map(|e| e.name() != "a").unwrap_or(true)
        });

        assert!(!stage.elements_clear(root).unwrap());
        assert_eq!(stage.element_count(root), 2);
    }

    #[test]
    fn test_remove_completes_bookkeeping_on_dtor_failure() {
        let (mut stage, root) = setup();
        crate::registry::define(
            "Flaky",
            TraitSpec::new().dtor(|_, _, _| Err(Error::Eval("boom".to_string()))),
        )
        .unwrap();
        let name = stage
            .element_push(root, ElementSpec::composite(Some("Flaky")).named("f"))
            .unwrap()
            .unwrap();
        let removals = Rc::new(RefCell::new(0usize));
        let count = removals.clone();
        stage.on_elements_notice(root, Notice::Remove, move |_| {
            *count.borrow_mut() += 1;
        });

        let err = stage.element_remove(root, &name).unwrap_err();
        assert!(matches!(err, Error::Teardown { .. }));
        // The alias is gone, the notice fired and the name is free again.
        assert_eq!(stage.element_count(root), 0);
        assert!(stage.element_component(root, "f").is_none());
        assert_eq!(*removals.borrow(), 1);
        assert!(stage
            .element_push(root, ElementSpec::tag("div").named("f"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_clear_completes_on_dtor_failure() {
        let (mut stage, root) = setup();
        crate::registry::define(
            "Flaky",
            TraitSpec::new().dtor(|_, _, _| Err(Error::Eval("boom".to_string()))),
        )
        .unwrap();
        stage
            .element_push(root, ElementSpec::composite(Some("Flaky")).named("f"))
            .unwrap();
        stage
            .element_push(root, ElementSpec::tag("div").named("d"))
            .unwrap();
        let node = stage.element_node(root, "d").unwrap();

        let err = stage.elements_clear(root).unwrap_err();
        assert!(matches!(err, Error::Teardown { .. }));
        assert_eq!(stage.element_count(root), 0);
        assert!(stage.element_names(root).is_empty());
        assert_eq!(stage.document().parent(node), None);
    }

    #[test]
    fn test_node_mounted_component_appends_after_existing() {
        let (mut stage, root) = setup();
        stage
            .element_push(root, ElementSpec::tag("div").named("box"))
            .unwrap();
        let container = stage.element_node(root, "box").unwrap();
        let existing = stage.document_mut().create_element("em", Namespace::Html);
        stage.document_mut().append_child(container, existing);

        let mounted = stage.create_component(Some(container));
        stage
            .element_push(mounted, ElementSpec::tag("span").named("late"))
            .unwrap();

        let late = stage.element_node(mounted, "late").unwrap();
        assert_eq!(stage.document().child_nodes(container), &[existing, late]);
    }

    #[test]
    fn test_insert_notices_fire_after_projection() {
        let (mut stage, root) = setup();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        stage.on_elements_notice(root, Notice::InsertPush, move |args| {
            log.borrow_mut().push((args.index, args.new.map(|e| e.name().to_string())));
        });

        stage
            .element_push(root, ElementSpec::tag("div").named("x"))
            .unwrap();
        assert_eq!(*seen.borrow(), vec![(0, Some("x".to_string()))]);
    }
}

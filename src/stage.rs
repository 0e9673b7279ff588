//! Stage - owner of the document tree and the component arena.
//!
//! A stage bundles the host document, every component mounted into it and
//! the fetched-template cache. Components are addressed by `ComponentId`
//! (arena index); disposal marks a component dead rather than freeing its
//! slot, so ids stay stable for the stage's lifetime.

use indexmap::IndexMap;
use std::collections::HashMap;

use crate::children::{ChildList, HookId};
use crate::component::ChildEntry;
use crate::dom::{Document, NodeId};
use crate::registry::Instance;

/// Arena index of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(pub(crate) usize);

/// A composite tree node: an ordered child collection projected into the
/// document under a single container node. Composites contribute no node
/// of their own, so nested composites share their nearest real ancestor's
/// container.
pub struct Component {
    pub(crate) children: ChildList<ChildEntry>,
    /// Alias map: element name to entry id.
    pub(crate) names: IndexMap<String, u64>,
    /// The document node this component's content projects under.
    pub(crate) parent_node: NodeId,
    pub(crate) parent_component: Option<ComponentId>,
    /// Entry id of this component inside its parent's child collection,
    /// when it is a sibling-level composite entry.
    pub(crate) entry_in_parent: Option<u64>,
    /// For node-attached components: the container's last child at mount
    /// time. Projection falls back to it so mounted content lands after
    /// whatever the container already held.
    pub(crate) mount_anchor: Option<NodeId>,
    /// Registry instance driving this component, when one was attached.
    pub(crate) instance: Option<Instance>,
    /// Composites mounted under this component's primitive subtrees; they
    /// are not sibling entries but still belong to this component for
    /// disposal.
    pub(crate) nested: Vec<ComponentId>,
    pub(crate) lock: Option<(HookId, HookId)>,
    pub(crate) disposed: bool,
}

impl Component {
    fn new(parent_node: NodeId, parent_component: Option<ComponentId>) -> Self {
        Component {
            children: ChildList::new(),
            names: IndexMap::new(),
            parent_node,
            parent_component,
            entry_in_parent: None,
            mount_anchor: None,
            instance: None,
            nested: Vec::new(),
            lock: None,
            disposed: false,
        }
    }
}

// =============================================================================
// Stage
// =============================================================================

pub struct Stage {
    pub(crate) doc: Document,
    pub(crate) components: Vec<Component>,
    /// Fetched template text by source key. One fetch per key per stage.
    pub(crate) packet_cache: HashMap<String, String>,
    pub(crate) next_entry: u64,
    root: ComponentId,
}

impl Stage {
    /// A fresh stage: new document, one root component projecting into the
    /// document root.
    pub fn new() -> Self {
        let doc = Document::new();
        let root_node = doc.root();
        let root = ComponentId(0);
        Stage {
            doc,
            components: vec![Component::new(root_node, None)],
            packet_cache: HashMap::new(),
            next_entry: 0,
            root,
        }
    }

    pub fn root_component(&self) -> ComponentId {
        self.root
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Mount a new parentless component under `node` (the document root
    /// when `None`). Its content projects into that node after any
    /// children present at mount time; it has no sibling-level parent.
    pub fn create_component(&mut self, node: Option<NodeId>) -> ComponentId {
        let parent_node = node.unwrap_or_else(|| self.doc.root());
        let id = ComponentId(self.components.len());
        let mut component = Component::new(parent_node, None);
        component.mount_anchor = self.doc.child_nodes(parent_node).last().copied();
        self.components.push(component);
        id
    }

    pub(crate) fn new_child_component(
        &mut self,
        parent_node: NodeId,
        parent_component: ComponentId,
    ) -> ComponentId {
        let id = ComponentId(self.components.len());
        self.components
            .push(Component::new(parent_node, Some(parent_component)));
        id
    }

    pub(crate) fn component(&self, id: ComponentId) -> &Component {
        &self.components[id.0]
    }

    pub(crate) fn component_mut(&mut self, id: ComponentId) -> &mut Component {
        &mut self.components[id.0]
    }

    /// The registry instance attached to a composite, if any.
    pub fn instance(&self, id: ComponentId) -> Option<&Instance> {
        self.components[id.0].instance.as_ref()
    }

    pub fn instance_mut(&mut self, id: ComponentId) -> Option<&mut Instance> {
        self.components[id.0].instance.as_mut()
    }

    pub fn is_disposed(&self, id: ComponentId) -> bool {
        self.components[id.0].disposed
    }

    // =========================================================================
    // Packet cache
    // =========================================================================

    pub(crate) fn cached_packet(&self, key: &str) -> Option<&str> {
        self.packet_cache.get(key).map(String::as_str)
    }

    pub(crate) fn cache_packet(&mut self, key: &str, text: String) {
        self.packet_cache.insert(key.to_string(), text);
    }

    /// Drop every cached template so the next use re-fetches.
    pub fn clear_packet_cache(&mut self) {
        self.packet_cache.clear();
    }
}

impl Default for Stage {
    fn default() -> Self {
        Stage::new()
    }
}

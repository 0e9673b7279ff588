//! Host document tree - an index arena of element and text nodes.
//!
//! The document is the real tree the projector keeps in lock-step with each
//! component's ordered child collection. Nodes are addressed by `NodeId`
//! (arena index); sibling order lives in each node's child vector. Every
//! created element is stamped with a process-unique conversion id (`_N`).

use indexmap::IndexMap;

// =============================================================================
// Ids and node data
// =============================================================================

/// Arena index of a document node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// Element namespace, decided by the tag table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Html,
    Svg,
}

#[derive(Debug)]
pub(crate) enum NodeKind {
    Element {
        tag: String,
        ns: Namespace,
        attributes: IndexMap<String, String>,
    },
    Text(String),
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

// =============================================================================
// Document
// =============================================================================

/// An in-memory document tree with a single root container.
#[derive(Debug)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    conversion_counter: usize,
}

impl Document {
    /// Create a document with an empty root container element.
    pub fn new() -> Self {
        let root_node = Node {
            kind: NodeKind::Element {
                tag: "body".to_string(),
                ns: Namespace::Html,
                attributes: IndexMap::new(),
            },
            parent: None,
            children: Vec::new(),
        };
        Document {
            nodes: vec![root_node],
            root: NodeId(0),
            conversion_counter: 0,
        }
    }

    /// The externally supplied root container all parentless components
    /// append into.
    pub fn root(&self) -> NodeId {
        self.root
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Next process-unique conversion id (`_N`).
    pub fn next_conversion_id(&mut self) -> String {
        let id = format!("_{}", self.conversion_counter);
        self.conversion_counter += 1;
        id
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Allocate a detached element and stamp its conversion id.
    pub fn create_element(&mut self, tag: &str, ns: Namespace) -> NodeId {
        let conv = self.next_conversion_id();
        let mut attributes = IndexMap::new();
        attributes.insert("id".to_string(), conv);
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind: NodeKind::Element {
                tag: tag.to_string(),
                ns,
                attributes,
            },
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Allocate a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind: NodeKind::Text(text.to_string()),
            parent: None,
            children: Vec::new(),
        });
        id
    }

    // =========================================================================
    // Tree mutation
    // =========================================================================

    /// Append `child` as the last child of `parent`. Detaches it from any
    /// previous parent first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.node_mut(parent).children.push(child);
        self.node_mut(child).parent = Some(parent);
    }

    /// Insert `child` immediately before `reference` among `parent`'s
    /// children. Appends when the reference is not a child of `parent`.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) {
        self.detach(child);
        let pos = self.node(parent).children.iter().position(|&c| c == reference);
        match pos {
            Some(pos) => self.node_mut(parent).children.insert(pos, child),
            None => self.node_mut(parent).children.push(child),
        }
        self.node_mut(child).parent = Some(parent);
    }

    /// Insert `child` immediately after `reference` among `parent`'s
    /// children. Appends when the reference is not a child of `parent`.
    pub fn insert_after(&mut self, parent: NodeId, child: NodeId, reference: NodeId) {
        self.detach(child);
        let pos = self.node(parent).children.iter().position(|&c| c == reference);
        match pos {
            Some(pos) => self.node_mut(parent).children.insert(pos + 1, child),
            None => self.node_mut(parent).children.push(child),
        }
        self.node_mut(child).parent = Some(parent);
    }

    /// Insert `child` as the first child of `parent`.
    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.node_mut(parent).children.insert(0, child);
        self.node_mut(child).parent = Some(parent);
    }

    /// Detach a node from its parent. The node and its subtree stay
    /// allocated; entries are identified by id, not liveness.
    pub fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.node(child).parent {
            self.node_mut(parent).children.retain(|&c| c != child);
            self.node_mut(child).parent = None;
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn child_nodes(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { tag, .. } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    pub fn namespace(&self, id: NodeId) -> Option<Namespace> {
        match &self.node(id).kind {
            NodeKind::Element { ns, .. } => Some(*ns),
            NodeKind::Text(_) => None,
        }
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.node(id).kind, NodeKind::Text(_))
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeKind::Element { attributes, .. } = &mut self.node_mut(id).kind {
            attributes.insert(name.to_string(), value.to_string());
        }
    }

    pub fn get_attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { attributes, .. } => attributes.get(name).map(String::as_str),
            NodeKind::Text(_) => None,
        }
    }

    pub fn attributes(&self, id: NodeId) -> Option<&IndexMap<String, String>> {
        match &self.node(id).kind {
            NodeKind::Element { attributes, .. } => Some(attributes),
            NodeKind::Text(_) => None,
        }
    }

    /// Concatenated text of the node's subtree, depth-first.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        let mut stack = vec![id];
        let mut ordered = Vec::new();
        while let Some(cur) = stack.pop() {
            ordered.push(cur);
            for &child in self.node(cur).children.iter().rev() {
                stack.push(child);
            }
        }
        for cur in ordered {
            if let NodeKind::Text(text) = &self.node(cur).kind {
                out.push_str(text);
            }
        }
        out
    }
}

impl Default for Document {
    fn default() -> Self {
        Document::new()
    }
}

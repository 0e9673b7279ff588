//! Projection - keeps the document tree isomorphic to the flattened
//! component tree.
//!
//! Composites contribute no document node, so placing a new real node
//! means finding where the owning component's content sits among its
//! ancestors' content. The anchor search walks backwards from the staged
//! entry: the nearest preceding real node (descending through composite
//! entries back to front) is the insertion anchor. With no anchor anywhere
//! up the sibling chain, a node-attached component falls back to its mount
//! anchor; with neither the node becomes the container's first child.

use crate::component::{ChildEntry, ChildKind};
use crate::dom::{Document, NodeId};
use crate::error::{Error, Result};
use crate::stage::{Component, ComponentId};

/// Deepest trailing real node contributed by an entry: a primitive's own
/// node, or a composite's last projected node. Explicit work stack, so
/// deeply nested composites cannot exhaust the call stack.
fn last_real_node(components: &[Component], entry: &ChildEntry) -> Option<NodeId> {
    let first = match &entry.kind {
        ChildKind::Primitive { node } => return Some(*node),
        ChildKind::Composite { component } => *component,
    };
    let mut stack: Vec<(ComponentId, usize)> =
        vec![(first, components[first.0].children.count())];
    'walk: while let Some((comp, mut idx)) = stack.pop() {
        while idx > 0 {
            idx -= 1;
            let Ok(candidate) = components[comp.0].children.get(idx) else {
                continue;
            };
            match &candidate.kind {
                ChildKind::Primitive { node } => return Some(*node),
                ChildKind::Composite { component } => {
                    // Finish the inner composite before the earlier
                    // entries of the current one.
                    stack.push((comp, idx));
                    stack.push((*component, components[component.0].children.count()));
                    continue 'walk;
                }
            }
        }
    }
    None
}

/// Nearest real node before position `index` in `comp`'s content, walking
/// up through sibling-level composite parents when the component's own
/// leading entries contribute nothing.
fn preceding_anchor(
    components: &[Component],
    mut comp: ComponentId,
    mut index: usize,
) -> Option<NodeId> {
    loop {
        let current = &components[comp.0];
        for i in (0..index).rev() {
            if let Ok(entry) = current.children.get(i) {
                if let Some(node) = last_real_node(components, entry) {
                    return Some(node);
                }
            }
        }
        let (Some(parent), Some(entry_id)) =
            (current.parent_component, current.entry_in_parent)
        else {
            // Node-attached components insert after whatever the container
            // held when they mounted.
            return current.mount_anchor;
        };
        index = components[parent.0]
            .children
            .find_index(0, |_, entry| entry.id == entry_id)?;
        comp = parent;
    }
}

fn describe(doc: &Document, node: NodeId) -> String {
    doc.get_attribute(node, "id")
        .or_else(|| doc.tag(node))
        .unwrap_or("#text")
        .to_string()
}

/// Place a freshly staged primitive node into the document at the position
/// its entry occupies in the flattened component tree.
pub(crate) fn insert_node(
    doc: &mut Document,
    components: &[Component],
    comp: ComponentId,
    staged_index: usize,
    node: NodeId,
) -> Result<()> {
    let parent_node = components[comp.0].parent_node;
    match preceding_anchor(components, comp, staged_index) {
        Some(anchor) => {
            if doc.parent(anchor) != Some(parent_node) {
                return Err(Error::ProjectionMismatch {
                    entry: describe(doc, anchor),
                });
            }
            doc.insert_after(parent_node, node, anchor);
            Ok(())
        }
        None => {
            doc.prepend_child(parent_node, node);
            Ok(())
        }
    }
}

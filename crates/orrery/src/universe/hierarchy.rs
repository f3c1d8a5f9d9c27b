//! # Entity Hierarchies — Parent/Child Links
//!
//! Only entities that actually take part in a hierarchy get a
//! [`HierarchyNode`]. A node holds the entity's parent, its first child,
//! its next sibling, and its transform relative to the parent.
//!
//! ```text
//!          root
//!           │ first_child
//!           ▼
//!          c3 ──next_sibling──► c2 ──next_sibling──► c1
//!           │ first_child
//!           ▼
//!          g1
//! ```
//!
//! New children are linked at the front of the sibling list, so siblings
//! iterate newest first.
//!
//! ## Garbage Collection
//!
//! A node with neither parent nor children is removed at once: the last node
//! is moved into its row and the moved node's owner gets its back-reference
//! patched. Memory stays proportional to hierarchy participants rather than
//! to the total entity count.
//!
//! ## Cycles
//!
//! [`Universe::set_parent`] refuses to make an entity a child of its own
//! descendant. The check walks the subtree with an explicit stack, so deep
//! hierarchies cannot overflow the native call stack.

use super::entity::Entity;
use super::Universe;
use crate::error::{Result, UniverseError};
use crate::math::Transform;

/// Links of one entity in the tree plus its parent-relative transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct HierarchyNode {
    pub entity: Entity,
    pub parent: Option<Entity>,
    pub first_child: Option<Entity>,
    pub next_sibling: Option<Entity>,
    pub local_transform: Transform,
}

impl HierarchyNode {
    fn new(entity: Entity) -> Self {
        Self {
            entity,
            parent: None,
            first_child: None,
            next_sibling: None,
            local_transform: Transform::IDENTITY,
        }
    }
}

/// Iterator over the direct children of an entity, newest first.
pub struct Children<'a> {
    universe: &'a Universe,
    next: Option<Entity>,
}

impl Iterator for Children<'_> {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        let current = self.next?;
        self.next = self.universe.next_sibling(current);
        Some(current)
    }
}

impl Universe {
    // ── Queries ──────────────────────────────────────────────────────

    pub(crate) fn node(&self, entity: Entity) -> Option<&HierarchyNode> {
        self.entity_data(entity)
            .hierarchy
            .map(|index| &self.hierarchy[index as usize])
    }

    pub(crate) fn node_mut(&mut self, entity: Entity) -> Option<&mut HierarchyNode> {
        let index = self.entity_data(entity).hierarchy?;
        Some(&mut self.hierarchy[index as usize])
    }

    pub fn parent(&self, entity: Entity) -> Option<Entity> {
        self.node(entity)?.parent
    }

    pub fn first_child(&self, entity: Entity) -> Option<Entity> {
        self.node(entity)?.first_child
    }

    pub fn next_sibling(&self, entity: Entity) -> Option<Entity> {
        self.node(entity)?.next_sibling
    }

    pub fn children(&self, entity: Entity) -> Children<'_> {
        Children {
            universe: self,
            next: self.first_child(entity),
        }
    }

    /// Number of entities that currently have a hierarchy node.
    pub fn hierarchy_node_count(&self) -> usize {
        self.hierarchy.len()
    }

    /// Whether `descendant` is anywhere below `ancestor`.
    pub fn is_descendant(&self, ancestor: Entity, descendant: Entity) -> bool {
        let mut stack: Vec<Entity> = self.children(ancestor).collect();
        while let Some(e) = stack.pop() {
            if e == descendant {
                return true;
            }
            stack.extend(self.children(e));
        }
        false
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Make `child` a child of `new_parent`, or a root when `None`.
    ///
    /// The child keeps its world transform; its local transform is derived
    /// from the new parent. Reparenting under one's own descendant is
    /// rejected and leaves the tree untouched.
    pub fn set_parent(&mut self, new_parent: Option<Entity>, child: Entity) -> Result<()> {
        self.assert_alive(child);
        if let Some(parent) = new_parent {
            self.assert_alive(parent);
            if parent == child || self.is_descendant(child, parent) {
                let err = UniverseError::HierarchyCycle { parent, child };
                log::error!("{err}");
                return Err(err);
            }
        }
        self.relink(new_parent, child);
        Ok(())
    }

    /// `set_parent` without the cycle check.
    pub(crate) fn relink(&mut self, new_parent: Option<Entity>, child: Entity) {
        self.unlink_from_parent(child);

        match new_parent {
            Some(parent) => {
                let child_index = self.ensure_node(child);
                let parent_index = self.ensure_node(parent);
                let local = self.transform(parent).inverted() * self.transform(child);

                let next_sibling = self.hierarchy[parent_index].first_child.replace(child);
                let node = &mut self.hierarchy[child_index];
                node.parent = Some(parent);
                node.next_sibling = next_sibling;
                node.local_transform = local;
            }
            None => self.collect_garbage(child),
        }
    }

    fn unlink_from_parent(&mut self, child: Entity) {
        let Some(old_parent) = self.parent(child) else {
            return;
        };
        let after = self.next_sibling(child);

        if self.first_child(old_parent) == Some(child) {
            if let Some(node) = self.node_mut(old_parent) {
                node.first_child = after;
            }
        } else {
            let mut cursor = self.first_child(old_parent);
            while let Some(sibling) = cursor {
                let next = self.next_sibling(sibling);
                if next == Some(child) {
                    if let Some(node) = self.node_mut(sibling) {
                        node.next_sibling = after;
                    }
                    break;
                }
                cursor = next;
            }
        }

        if let Some(node) = self.node_mut(child) {
            node.parent = None;
            node.next_sibling = None;
        }
        self.collect_garbage(old_parent);
    }

    /// Index of `entity`'s node, allocating one if needed. Allocation only
    /// appends, so indices returned earlier stay valid.
    fn ensure_node(&mut self, entity: Entity) -> usize {
        if let Some(index) = self.entity_data(entity).hierarchy {
            return index as usize;
        }
        let index = self.hierarchy.len();
        self.hierarchy.push(HierarchyNode::new(entity));
        self.entity_data_mut(entity).hierarchy = Some(index as u32);
        index
    }

    /// Drop `entity`'s node if it has neither parent nor children.
    fn collect_garbage(&mut self, entity: Entity) {
        let Some(index) = self.entity_data(entity).hierarchy else {
            return;
        };
        let node = &self.hierarchy[index as usize];
        if node.parent.is_some() || node.first_child.is_some() {
            return;
        }

        self.hierarchy.swap_remove(index as usize);
        if let Some(moved) = self.hierarchy.get(index as usize) {
            let owner = moved.entity;
            self.slots.slots[owner.slot()].hierarchy = Some(index);
        }
        self.entity_data_mut(entity).hierarchy = None;
    }
}

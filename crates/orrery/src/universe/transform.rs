//! # Transforms — World Placement and Propagation
//!
//! The transform store holds every entity's *world* transform. Entities in a
//! hierarchy also cache a transform relative to their parent, and the
//! universe keeps the two consistent:
//!
//! ```text
//! world(child) = world(parent) * local(child)
//! ```
//!
//! ## Propagation
//!
//! Setting a world transform recomputes the entity's local transform from
//! its parent, then walks the subtree depth-first rewriting each
//! descendant's world transform from its unchanged local one. Setting a
//! local transform derives the world transform from the parent and
//! propagates the same way.
//!
//! The walk uses an explicit stack. `entity_transformed` fires once per
//! entity it reaches, after that entity and its direct children have their
//! new world transforms. A listener may mutate the universe; the walk
//! re-reads the tree after every event and skips entities that died.
//!
//! Entities without a hierarchy node are leaves: setters write the store and
//! fire one event.

use super::entity::Entity;
use super::Universe;
use crate::math::{DVec3, Mat4, Quat, RigidTransform, Transform};

impl Universe {
    // ── World space ──────────────────────────────────────────────────

    pub fn transform(&self, entity: Entity) -> Transform {
        self.assert_alive(entity);
        self.transforms[entity.slot()]
    }

    pub fn position(&self, entity: Entity) -> DVec3 {
        self.transform(entity).position
    }

    pub fn rotation(&self, entity: Entity) -> Quat {
        self.transform(entity).rotation
    }

    pub fn scale(&self, entity: Entity) -> f32 {
        self.transform(entity).scale
    }

    /// Model matrix with translation relative to `base_pos`.
    pub fn relative_matrix(&self, entity: Entity, base_pos: DVec3) -> Mat4 {
        self.transform(entity).relative_matrix(base_pos)
    }

    pub fn set_transform(&mut self, entity: Entity, transform: Transform) {
        self.write_world(entity, transform);
        self.transform_entity(entity, true);
    }

    /// Set position and rotation, keeping the current scale.
    pub fn set_rigid_transform(&mut self, entity: Entity, transform: RigidTransform) {
        let scale = self.scale(entity);
        self.set_transform(entity, transform.with_scale(scale));
    }

    pub fn set_position(&mut self, entity: Entity, position: DVec3) {
        let transform = Transform {
            position,
            ..self.transform(entity)
        };
        self.set_transform(entity, transform);
    }

    pub fn set_rotation(&mut self, entity: Entity, rotation: Quat) {
        let transform = self.transform(entity).with_rotation(rotation);
        self.set_transform(entity, transform);
    }

    pub fn set_scale(&mut self, entity: Entity, scale: f32) {
        let transform = self.transform(entity).with_scale(scale);
        self.set_transform(entity, transform);
    }

    /// Move `entity` without moving its children: their world transforms
    /// stay put and their local transforms are recomputed instead.
    pub fn set_transform_keep_children(&mut self, entity: Entity, transform: Transform) {
        self.write_world(entity, transform);
        self.refresh_local(entity);

        let inverse = transform.inverted();
        let children: Vec<Entity> = self.children(entity).collect();
        for child in children {
            let local = inverse * self.transforms[child.slot()];
            if let Some(node) = self.node_mut(child) {
                node.local_transform = local;
            }
        }
        self.fire_entity_transformed(entity);
    }

    // ── Parent space ─────────────────────────────────────────────────

    /// Transform relative to the parent. For a root entity this is its
    /// world transform.
    pub fn local_transform(&self, entity: Entity) -> Transform {
        match self.node(entity) {
            Some(node) if node.parent.is_some() => node.local_transform,
            _ => self.transform(entity),
        }
    }

    pub fn local_scale(&self, entity: Entity) -> f32 {
        self.local_transform(entity).scale
    }

    /// What `world` would be in `parent`'s space.
    pub fn compute_local_transform(&self, parent: Entity, world: Transform) -> Transform {
        self.transform(parent).inverted() * world
    }

    pub fn set_local_transform(&mut self, entity: Entity, local: Transform) {
        let Some(parent) = self.parent(entity) else {
            self.set_transform(entity, local);
            return;
        };
        let world = self.transform(parent) * local;
        if let Some(node) = self.node_mut(entity) {
            node.local_transform = local;
        }
        self.write_world(entity, world);
        self.transform_entity(entity, false);
    }

    pub fn set_local_position(&mut self, entity: Entity, position: DVec3) {
        let local = Transform {
            position,
            ..self.local_transform(entity)
        };
        self.set_local_transform(entity, local);
    }

    pub fn set_local_rotation(&mut self, entity: Entity, rotation: Quat) {
        let local = self.local_transform(entity).with_rotation(rotation);
        self.set_local_transform(entity, local);
    }

    pub fn set_local_scale(&mut self, entity: Entity, scale: f32) {
        let local = self.local_transform(entity).with_scale(scale);
        self.set_local_transform(entity, local);
    }

    // ── Propagation ──────────────────────────────────────────────────

    fn write_world(&mut self, entity: Entity, transform: Transform) {
        self.assert_alive(entity);
        self.transforms[entity.slot()] = transform;
    }

    /// Recompute the cached local transform from the current world ones.
    fn refresh_local(&mut self, entity: Entity) {
        let Some(parent) = self.parent(entity) else {
            return;
        };
        let local = self.transform(parent).inverted() * self.transforms[entity.slot()];
        if let Some(node) = self.node_mut(entity) {
            node.local_transform = local;
        }
    }

    /// `entity`'s world transform changed: fix up its local transform (when
    /// `update_local`) and every descendant's world transform.
    fn transform_entity(&mut self, entity: Entity, update_local: bool) {
        if update_local {
            self.refresh_local(entity);
        }

        // Each queued child remembers the parent it was queued under. A
        // listener may destroy it and hand its index to a new entity.
        let mut stack = vec![(entity, None)];
        while let Some((current, queued_under)) = stack.pop() {
            if !self.has_entity(current) {
                continue;
            }
            if queued_under.is_some() && self.parent(current) != queued_under {
                continue;
            }

            let world = self.transforms[current.slot()];
            let children: Vec<Entity> = self.children(current).collect();
            for &child in &children {
                if let Some(local) = self.node(child).map(|n| n.local_transform) {
                    self.transforms[child.slot()] = world * local;
                }
            }

            self.fire_entity_transformed(current);
            // Reverse so the first child is visited first.
            stack.extend(children.into_iter().rev().map(|child| (child, Some(current))));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::f32::consts::FRAC_PI_2;
    use std::rc::Rc;

    use super::*;

    const EPS: f64 = 1e-5;

    fn spawn(universe: &mut Universe, x: f64, y: f64, z: f64) -> Entity {
        universe.create_entity(DVec3::new(x, y, z), Quat::IDENTITY)
    }

    fn record_moves(universe: &mut Universe) -> Rc<RefCell<Vec<Entity>>> {
        let moved = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&moved);
        universe
            .events_mut()
            .entity_transformed
            .subscribe(move |_, e| sink.borrow_mut().push(e));
        moved
    }

    #[test]
    fn moving_root_moves_whole_chain() {
        let mut universe = Universe::new();
        let e0 = spawn(&mut universe, 0.0, 0.0, 0.0);
        let e1 = spawn(&mut universe, 2.0, 0.0, 0.0);
        let e2 = spawn(&mut universe, 2.0, 3.0, 0.0);
        universe.set_parent(Some(e1), e2).unwrap();
        universe.set_parent(Some(e0), e1).unwrap();

        let locals = (universe.local_transform(e1), universe.local_transform(e2));
        let moved = record_moves(&mut universe);

        universe.set_position(e0, DVec3::new(1.0, 0.0, 0.0));

        assert_eq!(universe.position(e1), DVec3::new(3.0, 0.0, 0.0));
        assert_eq!(universe.position(e2), DVec3::new(3.0, 3.0, 0.0));
        assert_eq!((universe.local_transform(e1), universe.local_transform(e2)), locals);
        assert_eq!(*moved.borrow(), vec![e0, e1, e2]);
    }

    #[test]
    fn rotating_parent_swings_children() {
        let mut universe = Universe::new();
        let parent = spawn(&mut universe, 0.0, 0.0, 0.0);
        let child = spawn(&mut universe, 1.0, 0.0, 0.0);
        universe.set_parent(Some(parent), child).unwrap();

        universe.set_rotation(parent, Quat::from_rotation_z(FRAC_PI_2));

        let expected = Transform::from_xyz(0.0, 1.0, 0.0).with_rotation(Quat::from_rotation_z(FRAC_PI_2));
        assert!(universe.transform(child).abs_diff_eq(&expected, EPS));
    }

    #[test]
    fn parent_scale_scales_child_offset() {
        let mut universe = Universe::new();
        let parent = spawn(&mut universe, 1.0, 0.0, 0.0);
        let child = spawn(&mut universe, 2.0, 0.0, 0.0);
        universe.set_parent(Some(parent), child).unwrap();

        universe.set_scale(parent, 3.0);

        assert!(universe.position(child).abs_diff_eq(DVec3::new(4.0, 0.0, 0.0), EPS));
        assert_eq!(universe.scale(child), 3.0);
        assert_eq!(universe.local_scale(child), 1.0);
    }

    #[test]
    fn setting_child_world_updates_its_local() {
        let mut universe = Universe::new();
        let parent = spawn(&mut universe, 10.0, 0.0, 0.0);
        let child = spawn(&mut universe, 11.0, 0.0, 0.0);
        universe.set_parent(Some(parent), child).unwrap();

        universe.set_position(child, DVec3::new(15.0, 0.0, 0.0));

        assert!(universe
            .local_transform(child)
            .abs_diff_eq(&Transform::from_xyz(5.0, 0.0, 0.0), EPS));
        assert_eq!(universe.position(parent), DVec3::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn local_setters_derive_world() {
        let mut universe = Universe::new();
        let parent = universe.create_entity(DVec3::new(0.0, 5.0, 0.0), Quat::from_rotation_y(FRAC_PI_2));
        let child = spawn(&mut universe, 0.0, 0.0, 0.0);
        let grandchild = spawn(&mut universe, 0.0, 0.0, 0.0);
        universe.set_parent(Some(parent), child).unwrap();
        universe.set_parent(Some(child), grandchild).unwrap();

        universe.set_local_position(child, DVec3::new(0.0, 0.0, 2.0));

        // Rotating +Z by 90 degrees about Y lands on +X.
        assert!(universe.position(child).abs_diff_eq(DVec3::new(2.0, 5.0, 0.0), EPS));
        assert_eq!(universe.local_transform(child).position, DVec3::new(0.0, 0.0, 2.0));

        let expected = universe.transform(child) * universe.local_transform(grandchild);
        assert!(universe.transform(grandchild).abs_diff_eq(&expected, EPS));
    }

    #[test]
    fn local_setters_on_root_write_world() {
        let mut universe = Universe::new();
        let root = spawn(&mut universe, 1.0, 1.0, 1.0);
        let child = spawn(&mut universe, 2.0, 1.0, 1.0);
        universe.set_parent(Some(root), child).unwrap();

        universe.set_local_position(root, DVec3::new(4.0, 1.0, 1.0));
        universe.set_local_scale(root, 2.0);

        assert_eq!(universe.local_transform(root), universe.transform(root));
        assert!(universe.position(child).abs_diff_eq(DVec3::new(6.0, 1.0, 1.0), EPS));
    }

    #[test]
    fn keep_children_leaves_children_in_place() {
        let mut universe = Universe::new();
        let parent = spawn(&mut universe, 0.0, 0.0, 0.0);
        let child = spawn(&mut universe, 1.0, 0.0, 0.0);
        universe.set_parent(Some(parent), child).unwrap();
        let moved = record_moves(&mut universe);

        universe.set_transform_keep_children(parent, Transform::from_xyz(0.0, 4.0, 0.0));

        assert_eq!(universe.position(child), DVec3::new(1.0, 0.0, 0.0));
        assert!(universe
            .local_transform(child)
            .abs_diff_eq(&Transform::from_xyz(1.0, -4.0, 0.0), EPS));
        assert_eq!(*moved.borrow(), vec![parent]);

        // Moving the parent again now carries the child along from its new local.
        universe.set_position(parent, DVec3::ZERO);
        assert!(universe.position(child).abs_diff_eq(DVec3::new(1.0, -4.0, 0.0), EPS));
    }

    #[test]
    fn rigid_transform_keeps_scale() {
        let mut universe = Universe::new();
        let e = spawn(&mut universe, 0.0, 0.0, 0.0);
        universe.set_scale(e, 2.5);
        universe.set_rigid_transform(
            e,
            RigidTransform {
                position: DVec3::new(1.0, 2.0, 3.0),
                rotation: Quat::from_rotation_x(0.3),
            },
        );
        assert_eq!(universe.scale(e), 2.5);
        assert_eq!(universe.position(e), DVec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn compute_local_inverts_parent() {
        let mut universe = Universe::new();
        let parent = universe.create_entity(DVec3::new(3.0, 0.0, 0.0), Quat::from_rotation_z(0.7));
        universe.set_scale(parent, 2.0);
        let world = Transform::from_xyz(-1.0, 4.0, 2.0).with_rotation(Quat::from_rotation_x(1.1));

        let local = universe.compute_local_transform(parent, world);
        assert!((universe.transform(parent) * local).abs_diff_eq(&world, EPS));
    }

    #[test]
    fn listener_destroying_descendant_stops_walk_there() {
        let mut universe = Universe::new();
        let root = spawn(&mut universe, 0.0, 0.0, 0.0);
        let child = spawn(&mut universe, 1.0, 0.0, 0.0);
        let grandchild = spawn(&mut universe, 2.0, 0.0, 0.0);
        universe.set_parent(Some(root), child).unwrap();
        universe.set_parent(Some(child), grandchild).unwrap();

        let moved = record_moves(&mut universe);
        universe.events_mut().entity_transformed.subscribe(move |u, e| {
            if e == root && u.has_entity(child) {
                u.destroy_entity(child);
            }
        });

        universe.set_position(root, DVec3::new(0.0, 1.0, 0.0));

        assert!(!universe.has_entity(child));
        assert_eq!(*moved.borrow(), vec![root]);
        // Promoted to a root before the walk could reach it.
        assert_eq!(universe.parent(grandchild), None);
    }

    #[test]
    fn walk_skips_queued_child_whose_index_was_reused() {
        let mut universe = Universe::new();
        let root = spawn(&mut universe, 0.0, 0.0, 0.0);
        let child = spawn(&mut universe, 1.0, 0.0, 0.0);
        universe.set_parent(Some(root), child).unwrap();

        let moved = record_moves(&mut universe);
        let replacement = Rc::new(Cell::new(None));
        {
            let replacement = Rc::clone(&replacement);
            universe.events_mut().entity_transformed.subscribe(move |u, e| {
                if e == root && replacement.get().is_none() {
                    u.destroy_entity(child);
                    let fresh = u.create_entity(DVec3::new(100.0, 0.0, 0.0), Quat::IDENTITY);
                    replacement.set(Some(fresh));
                }
            });
        }

        universe.set_position(root, DVec3::new(0.0, 1.0, 0.0));

        let fresh = replacement.get().unwrap();
        assert_eq!(fresh, child);
        assert_eq!(universe.position(fresh), DVec3::new(100.0, 0.0, 0.0));
        assert_eq!(*moved.borrow(), vec![root]);
    }
}

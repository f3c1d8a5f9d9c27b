//! # Universe — The Entity Registry
//!
//! The [`Universe`] tracks every live entity, where it sits in space and in
//! the parent/child tree, what it is called, and which component types are
//! attached to it. Component payloads live in the scene modules; the
//! universe only routes calls to them by type id.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Universe                                                     │
//! │                                                              │
//! │  slots:      Vec<EntityData>   ← dense, doubles as free list │
//! │  transforms: Vec<Transform>    ← world space, same indices   │
//! │                                                              │
//! │  hierarchy:  Vec<HierarchyNode>  ← only entities with a      │
//! │                                    parent or children        │
//! │  names:      Vec<EntityName>     ← only named entities       │
//! │                                                              │
//! │  components: ComponentRegistry ← type id → owning scene      │
//! │  events:     UniverseEvents    ← created/destroyed/moved/... │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The sparse tables are compacted by swap-remove; each entity record keeps
//! the index of its row so lookups stay O(1).
//!
//! ## Module Overview
//!
//! - [`entity`] — Entity ids and the slot table / free list
//! - [`hierarchy`] — Parent/child links and cycle checks
//! - [`transform`] — World/local transforms and propagation
//! - [`names`] — Display names and lookup
//! - [`component`] — Type registry and dispatch to scene modules
//! - [`events`] — Multicast notifications
//! - [`prefab`] — Prefab stamping, authoring and cloning
//! - [`serialize`] — The raw skeleton file
//!
//! ## Threading
//!
//! Single-threaded by construction (`Rc` callbacks). Every mutation and every
//! event happens synchronously on the caller's thread.

pub mod component;
pub mod entity;
pub mod events;
pub mod hierarchy;
pub mod names;
pub mod prefab;
pub mod serialize;
pub mod transform;

#[cfg(test)]
pub(crate) mod testing;

pub use component::{
    ComponentBinding, ComponentIter, ComponentRegistry, ComponentType, ComponentUid, Scene,
    SceneHandle, MAX_COMPONENT_TYPES,
};
pub use entity::Entity;
pub use events::{Delegate, ListenerId, UniverseEvents};
pub use hierarchy::Children;
pub use names::MAX_NAME_LENGTH;
pub use prefab::PrefabVersion;
pub use serialize::{SkeletonHeader, SKELETON_MAGIC, SKELETON_VERSION};

use crate::config::UniverseConfig;
use crate::math::{DVec3, Quat, Transform};
use entity::{EntityData, SlotTable};
use hierarchy::HierarchyNode;
use names::EntityName;

/// The runtime registry of entities, transforms, hierarchy and components.
pub struct Universe {
    slots: SlotTable,
    /// World transforms, indexed like `slots`.
    transforms: Vec<Transform>,
    hierarchy: Vec<HierarchyNode>,
    names: Vec<EntityName>,
    components: ComponentRegistry,
    /// Scene modules with the CRC32 of their names.
    scenes: Vec<(u32, SceneHandle)>,
    events: UniverseEvents,
}

impl Universe {
    pub fn new() -> Self {
        Self::with_config(&UniverseConfig::default())
    }

    pub fn with_config(config: &UniverseConfig) -> Self {
        Self {
            slots: SlotTable::with_capacity(config.reserved_entities),
            transforms: Vec::with_capacity(config.reserved_entities),
            hierarchy: Vec::with_capacity(config.reserved_hierarchy_nodes),
            names: Vec::with_capacity(config.reserved_names),
            components: ComponentRegistry::new(),
            scenes: Vec::new(),
            events: UniverseEvents::default(),
        }
    }

    pub fn events(&self) -> &UniverseEvents {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut UniverseEvents {
        &mut self.events
    }

    // ── Create / Destroy ─────────────────────────────────────────────

    /// Create an entity at the given placement with scale 1, no name, no
    /// components and no hierarchy node.
    pub fn create_entity(&mut self, position: DVec3, rotation: Quat) -> Entity {
        let index = self.slots.allocate();
        self.sync_transform_len();
        let entity = Entity(index);
        self.transforms[entity.slot()] = Transform::new(position, rotation, 1.0);
        self.fire_entity_created(entity);
        entity
    }

    /// Make exactly `entity` live, growing the tables if needed. Used by
    /// undo/redo and loading, which must recreate specific indices.
    ///
    /// # Panics
    ///
    /// Panics if `entity` is already live.
    pub fn emplace_entity(&mut self, entity: Entity) {
        self.slots.emplace(entity.index());
        self.sync_transform_len();
        self.transforms[entity.slot()] = Transform::IDENTITY;
        self.fire_entity_created(entity);
    }

    /// Destroy an entity. Children are promoted to roots in place, every
    /// attached component is destroyed through its scene, the name is
    /// released and the slot goes back on the free list.
    ///
    /// # Panics
    ///
    /// Panics if `entity` is not live, or if a scene fails to report a
    /// component as destroyed.
    pub fn destroy_entity(&mut self, entity: Entity) {
        self.assert_alive(entity);

        while let Some(child) = self.first_child(entity) {
            self.relink(None, child);
        }
        self.relink(None, entity);

        // Listeners may attach components during teardown.
        loop {
            let mask = self.entity_data(entity).components;
            if mask == 0 {
                break;
            }
            let ty = ComponentType::from_index(mask.trailing_zeros() as usize);
            match self.components.binding(ty).cloned() {
                Some(binding) => (binding.destroy)(self, entity),
                None => {
                    // Masks restored from a skeleton file may name types no
                    // scene claimed this run.
                    log::error!("{entity} has {ty} but no scene owns it; dropping the bit");
                    self.entity_data_mut(entity).components &= !ty.bit();
                }
            }
            assert_ne!(
                mask,
                self.entity_data(entity).components,
                "scene owning {ty} did not call on_component_destroyed for {entity}"
            );
        }

        if let Some(name_index) = self.entity_data(entity).name {
            self.remove_name_entry(name_index);
        }
        self.slots.release(entity.index());
        self.fire_entity_destroyed(entity);
    }

    // ── Lookup / Iteration ───────────────────────────────────────────

    pub fn has_entity(&self, entity: Entity) -> bool {
        self.slots.is_valid(entity.index())
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.slots.alive()
    }

    /// Number of slots, live or free.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn first_entity(&self) -> Option<Entity> {
        self.slots.next_live(0).map(Entity)
    }

    pub fn next_entity(&self, entity: Entity) -> Option<Entity> {
        self.slots.next_live(entity.slot() + 1).map(Entity)
    }

    /// All live entities in index order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        std::iter::successors(self.first_entity(), |&e| self.next_entity(e))
    }

    // ── Internals ────────────────────────────────────────────────────

    #[track_caller]
    pub(crate) fn assert_alive(&self, entity: Entity) {
        assert!(
            self.has_entity(entity),
            "{entity} is not a live entity (destroyed or never created)"
        );
    }

    #[track_caller]
    pub(crate) fn entity_data(&self, entity: Entity) -> &EntityData {
        self.assert_alive(entity);
        &self.slots.slots[entity.slot()]
    }

    #[track_caller]
    pub(crate) fn entity_data_mut(&mut self, entity: Entity) -> &mut EntityData {
        self.assert_alive(entity);
        &mut self.slots.slots[entity.slot()]
    }

    fn sync_transform_len(&mut self) {
        // Synthesized free slots get a scale of -1 so they stand out in dumps.
        let placeholder = Transform::IDENTITY.with_scale(-1.0);
        self.transforms.resize(self.slots.len(), placeholder);
    }
}

impl Default for Universe {
    fn default() -> Self {
        Self::new()
    }
}

//! # Prefabs — Stamping, Authoring and Cloning
//!
//! A prefab is a self-contained blob describing a small tree of entities and
//! their components. It can be instantiated any number of times at
//! different placements.
//!
//! ## Blob Layout
//!
//! ```text
//! u32 version                         ← see PrefabVersion
//! i32 count
//! count × {
//!     u64 prefab_id                   ← source entity index, informational
//!     i32 parent                      ← index into this blob, -1 = root   ┐ Hierarchy
//!     [f64; 3] local position         ← only if parent is in range      │ and newer
//!     [f32; 4] local rotation  (xyzw) ← only if parent is in range      │
//!     f32      local scale            ← only if parent is in range      ┘
//!     { u32 type_hash, i32 scene_version, payload… }*
//!     u32 0                           ← end of component list
//! }
//! ```
//!
//! Type hashes are resolved against the universe's component registry, so
//! a blob stays valid regardless of the order modules registered in.
//!
//! ## Failure
//!
//! An unsupported version, an empty prefab or a count that cannot fit in
//! the blob is rejected before anything is created. A failure after that
//! point leaves the entities created so far alive and reports them in
//! [`UniverseError::PrefabAborted`].

use std::collections::HashMap;

use super::component::ComponentType;
use super::entity::Entity;
use super::Universe;
use crate::error::{BlobError, Result, UniverseError};
use crate::math::{DVec3, Quat, Transform};
use crate::stream::{InputBlob, OutputBlob};

/// Smallest possible entity record: the prefab id and the list terminator.
const MIN_RECORD_SIZE: usize = 8 + 4;

/// Format revisions of the prefab blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum PrefabVersion {
    /// Entities and components only.
    Flat = 0,
    /// Component payloads may reference entities by id.
    EntityIds = 1,
    /// Records carry a parent index and a local transform.
    Hierarchy = 2,
}

impl PrefabVersion {
    /// The version [`Universe::serialize_prefab`] writes.
    pub const LAST: Self = Self::Hierarchy;

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Flat),
            1 => Some(Self::EntityIds),
            2 => Some(Self::Hierarchy),
            _ => None,
        }
    }

    pub fn has_hierarchy(self) -> bool {
        self >= Self::Hierarchy
    }
}

impl Universe {
    /// Stamp a prefab blob into the universe at the given placement and
    /// return its root (the first record).
    ///
    /// Every record starts at the placement; records with an in-blob parent
    /// are then attached to it at their stored local transform.
    pub fn instantiate_prefab(
        &mut self,
        blob: &[u8],
        position: DVec3,
        rotation: Quat,
        scale: f32,
    ) -> Result<Entity> {
        let mut input = InputBlob::new(blob);
        let raw_version = input.read::<u32>()?;
        let Some(version) = PrefabVersion::from_u32(raw_version) else {
            let err = UniverseError::UnsupportedPrefabVersion {
                found: raw_version,
                supported: PrefabVersion::LAST as u32,
            };
            log::error!("{err}");
            return Err(err);
        };

        let count = input.read::<i32>()?;
        if count == 0 {
            return Err(UniverseError::EmptyPrefab);
        }
        if count < 0 || count as usize > input.remaining() / MIN_RECORD_SIZE {
            return Err(BlobError::InvalidLength(count).into());
        }

        let entities: Vec<Entity> = (0..count)
            .map(|_| self.create_entity(position, rotation))
            .collect();
        let placement = Transform::new(position, rotation, scale);

        if let Err(source) = self.read_prefab_records(&mut input, version, &entities, placement) {
            log::error!("Prefab instantiation failed: {source}");
            return Err(UniverseError::PrefabAborted {
                source: Box::new(source),
                created: entities,
            });
        }

        log::debug!(
            "Instantiated {} prefab entities (version {version:?}) at {position}",
            entities.len()
        );
        Ok(entities[0])
    }

    fn read_prefab_records(
        &mut self,
        input: &mut InputBlob<'_>,
        version: PrefabVersion,
        entities: &[Entity],
        placement: Transform,
    ) -> Result<()> {
        for &entity in entities {
            let _prefab_id = input.read::<u64>()?;
            self.set_transform(entity, placement);

            if version.has_hierarchy() {
                let parent_index = input.read::<i32>()?;
                let parent = usize::try_from(parent_index)
                    .ok()
                    .and_then(|index| entities.get(index).copied());
                if let Some(parent) = parent {
                    let position = DVec3::from_array(input.read::<[f64; 3]>()?);
                    let rotation = Quat::from_array(input.read::<[f32; 4]>()?);
                    let scale = input.read::<f32>()?;
                    self.set_parent(Some(parent), entity)?;
                    self.set_local_transform(entity, Transform::new(position, rotation, scale));
                }
            }

            loop {
                let hash = input.read::<u32>()?;
                if hash == 0 {
                    break;
                }
                let ty = self
                    .components
                    .type_from_hash(hash)
                    .ok_or(UniverseError::UnknownComponentHash(hash))?;
                let scene_version = input.read::<i32>()?;
                self.deserialize_component(input, entity, ty, scene_version)?;
            }
        }
        Ok(())
    }

    /// Write `root` and all its descendants as a prefab blob at the
    /// current version. Parents precede their children; `root` is the first
    /// record and is stored without a parent.
    ///
    /// Nothing is appended to `out` if any component fails to serialize.
    pub fn serialize_prefab(&self, root: Entity, out: &mut OutputBlob) -> Result<()> {
        self.assert_alive(root);

        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(entity) = stack.pop() {
            order.push(entity);
            // Popping reverses the sibling order; linking children at the
            // front on instantiation reverses it back.
            stack.extend(self.children(entity));
        }
        let index_of: HashMap<Entity, i32> = order
            .iter()
            .enumerate()
            .map(|(i, &e)| (e, i as i32))
            .collect();

        let mut blob = OutputBlob::with_capacity(256);
        blob.write(PrefabVersion::LAST as u32);
        blob.write(order.len() as i32);
        for &entity in &order {
            blob.write(entity.index() as u64);

            let parent = (entity != root)
                .then(|| self.parent(entity))
                .flatten()
                .and_then(|p| index_of.get(&p).copied());
            match parent {
                Some(parent_index) => {
                    let local = self.local_transform(entity);
                    blob.write(parent_index);
                    blob.write(local.position.to_array());
                    blob.write(local.rotation.to_array());
                    blob.write(local.scale);
                }
                None => blob.write(-1i32),
            }

            for cmp in self.components(entity) {
                let binding = self.require_binding(cmp.ty)?;
                blob.write(self.components.type_hash(cmp.ty));
                blob.write(binding.scene_version());
                (binding.serialize)(self, entity, &mut blob);
            }
            blob.write(0u32);
        }

        out.write_bytes(blob.as_slice());
        Ok(())
    }

    /// Duplicate `entity`: same world transform, same parent, and a copy of
    /// every component made by serializing it and deserializing the bytes
    /// onto the clone. Children are not cloned.
    ///
    /// If a component cannot be copied the clone is destroyed again and the
    /// error returned.
    pub fn clone_entity(&mut self, entity: Entity) -> Result<Entity> {
        let transform = self.transform(entity);
        let parent = self.parent(entity);

        let clone = self.create_entity(transform.position, transform.rotation);
        self.set_scale(clone, transform.scale);
        self.relink(parent, clone);

        let types: Vec<ComponentType> = self.components(entity).map(|cmp| cmp.ty).collect();
        let mut scratch = OutputBlob::with_capacity(1024);
        for ty in types {
            scratch.clear();
            if let Err(err) = self.copy_component(ty, entity, clone, &mut scratch) {
                log::error!("Failed to clone {ty} of {entity}: {err}");
                self.destroy_entity(clone);
                return Err(err);
            }
        }
        Ok(clone)
    }

    fn copy_component(
        &mut self,
        ty: ComponentType,
        source: Entity,
        target: Entity,
        scratch: &mut OutputBlob,
    ) -> Result<()> {
        let binding = self.require_binding(ty)?;
        (binding.serialize)(self, source, scratch);
        let mut input = InputBlob::new(scratch.as_slice());
        (binding.deserialize)(self, target, &mut input, binding.scene_version())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::universe::testing::{init_logger, install_payload_scene};

    const EPS: f64 = 1e-5;

    fn flat_blob(version: u32, count: i32) -> OutputBlob {
        let mut blob = OutputBlob::new();
        blob.write(version);
        blob.write(count);
        for id in 0..count {
            blob.write(id as u64);
            if PrefabVersion::from_u32(version).is_some_and(PrefabVersion::has_hierarchy) {
                blob.write(-1i32);
            }
            blob.write(0u32);
        }
        blob
    }

    #[test]
    fn authored_prefab_stamps_at_placement() {
        init_logger();
        let mut author = Universe::new();
        let (scene, ty) = install_payload_scene(&mut author, "payload");
        let root = author.create_entity(DVec3::ZERO, Quat::IDENTITY);
        let a = author.create_entity(DVec3::new(1.0, 0.0, 0.0), Quat::IDENTITY);
        let b = author.create_entity(DVec3::new(0.0, 2.0, 0.0), Quat::IDENTITY);
        author.set_parent(Some(root), a).unwrap();
        author.set_parent(Some(root), b).unwrap();
        for (e, value) in [(root, 10), (a, 11), (b, 12)] {
            author.create_component(e, ty).unwrap();
            scene.set(e, value);
        }
        let mut blob = OutputBlob::new();
        author.serialize_prefab(root, &mut blob).unwrap();

        let mut world = Universe::new();
        let (scene, ty) = install_payload_scene(&mut world, "payload");
        let placed = world
            .instantiate_prefab(blob.as_slice(), DVec3::new(5.0, 0.0, 0.0), Quat::IDENTITY, 1.0)
            .unwrap();

        assert_eq!(world.entity_count(), 3);
        assert_eq!(world.position(placed), DVec3::new(5.0, 0.0, 0.0));
        let children: Vec<_> = world.children(placed).collect();
        assert_eq!(children.len(), 2);
        // Sibling order survives the round trip: newest (b) first.
        assert!(world.position(children[0]).abs_diff_eq(DVec3::new(5.0, 2.0, 0.0), EPS));
        assert!(world.position(children[1]).abs_diff_eq(DVec3::new(6.0, 0.0, 0.0), EPS));

        let values = scene.values.borrow();
        assert_eq!(values[&placed], 10);
        assert_eq!(values[&children[0]], 12);
        assert_eq!(values[&children[1]], 11);
        assert!(scene.seen_versions.borrow().iter().all(|&v| v == 3));
        assert!(world.has_component(children[0], ty));
    }

    #[test]
    fn placement_rotation_and_scale_apply_to_children() {
        let mut author = Universe::new();
        let root = author.create_entity(DVec3::ZERO, Quat::IDENTITY);
        let child = author.create_entity(DVec3::new(1.0, 0.0, 0.0), Quat::IDENTITY);
        author.set_parent(Some(root), child).unwrap();
        let mut blob = OutputBlob::new();
        author.serialize_prefab(root, &mut blob).unwrap();

        let mut world = Universe::new();
        let rotation = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
        let placed = world
            .instantiate_prefab(blob.as_slice(), DVec3::new(0.0, 0.0, 3.0), rotation, 2.0)
            .unwrap();

        let child = world.first_child(placed).unwrap();
        assert!(world.position(child).abs_diff_eq(DVec3::new(0.0, 2.0, 3.0), EPS));
        assert_eq!(world.scale(child), 2.0);
        assert_eq!(world.local_scale(child), 1.0);
    }

    #[test]
    fn unsupported_version_creates_nothing() {
        init_logger();
        let mut world = Universe::new();
        let blob = flat_blob(PrefabVersion::LAST as u32 + 1, 2);
        let err = world
            .instantiate_prefab(blob.as_slice(), DVec3::ZERO, Quat::IDENTITY, 1.0)
            .unwrap_err();
        assert!(matches!(err, UniverseError::UnsupportedPrefabVersion { found: 3, supported: 2 }));
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn empty_and_oversized_counts_are_rejected() {
        let mut world = Universe::new();
        let empty = flat_blob(2, 0);
        assert!(matches!(
            world.instantiate_prefab(empty.as_slice(), DVec3::ZERO, Quat::IDENTITY, 1.0),
            Err(UniverseError::EmptyPrefab)
        ));

        let mut lying = OutputBlob::new();
        lying.write(2u32);
        lying.write(1_000_000i32);
        assert!(matches!(
            world.instantiate_prefab(lying.as_slice(), DVec3::ZERO, Quat::IDENTITY, 1.0),
            Err(UniverseError::Blob(BlobError::InvalidLength(1_000_000)))
        ));
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn flat_prefab_places_every_entity() {
        let mut world = Universe::new();
        let blob = flat_blob(PrefabVersion::Flat as u32, 2);
        let root = world
            .instantiate_prefab(blob.as_slice(), DVec3::new(1.0, 2.0, 3.0), Quat::IDENTITY, 1.0)
            .unwrap();

        assert_eq!(world.entity_count(), 2);
        for e in world.entities() {
            assert_eq!(world.position(e), DVec3::new(1.0, 2.0, 3.0));
            assert_eq!(world.parent(e), None);
        }
        assert_eq!(world.first_entity(), Some(root));
    }

    #[test]
    fn unknown_component_hash_aborts_with_created_entities() {
        init_logger();
        let mut world = Universe::new();
        let mut blob = OutputBlob::new();
        blob.write(PrefabVersion::Hierarchy as u32);
        blob.write(2i32);
        blob.write(0u64);
        blob.write(-1i32);
        blob.write(0xDEAD_BEEFu32);
        blob.write(0i32);
        blob.write(0u32);
        blob.write(1u64);
        blob.write(-1i32);
        blob.write(0u32);

        let err = world
            .instantiate_prefab(blob.as_slice(), DVec3::ZERO, Quat::IDENTITY, 1.0)
            .unwrap_err();
        let (source, created) = match err {
            UniverseError::PrefabAborted { source, created } => (source, created),
            other => panic!("expected PrefabAborted, got {other:?}"),
        };
        assert!(matches!(*source, UniverseError::UnknownComponentHash(0xDEAD_BEEF)));
        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|&e| world.has_entity(e)));
    }

    #[test]
    fn truncated_record_aborts() {
        let mut world = Universe::new();
        let mut blob = flat_blob(PrefabVersion::Hierarchy as u32, 1);
        // Drop the terminator but keep the size check happy with padding.
        let mut bytes = blob.as_slice().to_vec();
        bytes.truncate(bytes.len() - 4);
        blob.clear();
        blob.write_bytes(&bytes);
        blob.write(7u16);

        let err = world
            .instantiate_prefab(blob.as_slice(), DVec3::ZERO, Quat::IDENTITY, 1.0)
            .unwrap_err();
        assert!(matches!(
            err,
            UniverseError::PrefabAborted { ref source, .. }
                if matches!(**source, UniverseError::Blob(BlobError::UnexpectedEnd { .. }))
        ));
    }

    #[test]
    fn clone_copies_transform_parent_and_components() {
        let mut world = Universe::new();
        let (scene, ty) = install_payload_scene(&mut world, "payload");
        let parent = world.create_entity(DVec3::new(1.0, 0.0, 0.0), Quat::IDENTITY);
        let source = world.create_entity(DVec3::new(2.0, 3.0, 0.0), Quat::from_rotation_y(0.25));
        world.set_scale(source, 1.5);
        world.set_parent(Some(parent), source).unwrap();
        world.create_component(source, ty).unwrap();
        scene.set(source, 42);

        let clone = world.clone_entity(source).unwrap();

        assert_ne!(clone, source);
        assert!(world.transform(clone).abs_diff_eq(&world.transform(source), EPS));
        assert_eq!(world.parent(clone), Some(parent));
        assert!(world.has_component(clone, ty));
        assert_eq!(scene.values.borrow()[&clone], 42);
        assert_eq!(*scene.seen_versions.borrow(), vec![3]);
    }

    #[test]
    fn serialize_prefab_of_missing_binding_writes_nothing() {
        let mut world = Universe::new();
        let ty = world.component_types_mut().register_type("ghost").unwrap();
        let e = world.create_entity(DVec3::ZERO, Quat::IDENTITY);
        // A mask restored from disk can name a type nobody bound.
        world.entity_data_mut(e).components |= ty.bit();

        let mut out = OutputBlob::new();
        assert!(matches!(
            world.serialize_prefab(e, &mut out),
            Err(UniverseError::ComponentTypeUnbound(t)) if t == ty
        ));
        assert!(out.is_empty());
    }
}

//! # Components — Type Registry and Dispatch to Scene Modules
//!
//! The universe never stores component payloads. A component is one bit in
//! the owning entity's 64-bit mask plus a [`ComponentBinding`] that says
//! which scene module owns the type and how to reach it.
//!
//! ## Flow
//!
//! ```text
//! create_component(e, ty)
//!   └─► binding.create(universe, e)          (scene module code)
//!         ├─ attach payload in the scene's own storage
//!         └─► universe.on_component_created(e, ty)
//!               ├─ set bit `ty` in e's mask
//!               └─ fire component_added
//! ```
//!
//! The module flips the bit, not the universe. A module that cannot attach
//! the component simply never calls back, and the bit stays clear. Destroy
//! mirrors this through [`Universe::on_component_destroyed`].
//!
//! ## Type ids
//!
//! Ids are handed out per universe by [`ComponentRegistry::register_type`],
//! keyed by a stable name. The CRC32 of the name is the type's hash, which
//! is what prefab blobs store, so a blob stays valid even if modules register
//! in a different order next run.
//!
//! ## Borrowing
//!
//! Bindings hold their scene as a shared `Rc<S>` and call it through `&S`.
//! Scenes keep their storage behind their own cells and must release any
//! borrow before calling back into the universe: the `on_component_*`
//! callbacks fire events, and a listener may re-enter the same scene.

use std::fmt;
use std::rc::Rc;

use super::entity::Entity;
use super::Universe;
use crate::error::{BlobError, Result, UniverseError};
use crate::stream::{InputBlob, OutputBlob};

/// Number of distinct component types one universe can hold (bits in the mask).
pub const MAX_COMPONENT_TYPES: usize = 64;

/// Small integer id of a component type; also its bit in the entity mask.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ComponentType(u8);

impl ComponentType {
    pub(crate) fn from_index(index: usize) -> Self {
        debug_assert!(index < MAX_COMPONENT_TYPES);
        Self(index as u8)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn bit(self) -> u64 {
        1u64 << self.0
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component#{}", self.0)
    }
}

/// One attached component: which entity, which type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ComponentUid {
    pub entity: Entity,
    pub ty: ComponentType,
}

/// A pluggable module that owns component payloads.
pub trait Scene {
    /// Stable name; its CRC32 identifies the scene in saved data.
    fn name(&self) -> &str;

    /// Wire-format version handed back to `deserialize` callbacks.
    fn version(&self) -> i32 {
        0
    }
}

pub type SceneHandle = Rc<dyn Scene>;

type CreateFn = Box<dyn Fn(&mut Universe, Entity)>;
type DestroyFn = Box<dyn Fn(&mut Universe, Entity)>;
type SerializeFn = Box<dyn Fn(&Universe, Entity, &mut OutputBlob)>;
type DeserializeFn =
    Box<dyn Fn(&mut Universe, Entity, &mut InputBlob<'_>, i32) -> std::result::Result<(), BlobError>>;

/// The owning scene of a component type plus its four callbacks.
pub struct ComponentBinding {
    scene: SceneHandle,
    scene_version: i32,
    pub(crate) create: CreateFn,
    pub(crate) destroy: DestroyFn,
    pub(crate) serialize: SerializeFn,
    pub(crate) deserialize: DeserializeFn,
}

impl ComponentBinding {
    /// Bind a scene's methods, e.g.
    ///
    /// ```ignore
    /// ComponentBinding::new(&gui, GuiScene::create_rect, GuiScene::destroy_rect,
    ///                       GuiScene::serialize_rect, GuiScene::deserialize_rect)
    /// ```
    pub fn new<S: Scene + 'static>(
        scene: &Rc<S>,
        create: fn(&S, &mut Universe, Entity),
        destroy: fn(&S, &mut Universe, Entity),
        serialize: fn(&S, &Universe, Entity, &mut OutputBlob),
        deserialize: fn(
            &S,
            &mut Universe,
            Entity,
            &mut InputBlob<'_>,
            i32,
        ) -> std::result::Result<(), BlobError>,
    ) -> Self {
        let scene_version = scene.version();
        let create: CreateFn = {
            let scene = Rc::clone(scene);
            Box::new(move |u, e| create(&scene, u, e))
        };
        let destroy: DestroyFn = {
            let scene = Rc::clone(scene);
            Box::new(move |u, e| destroy(&scene, u, e))
        };
        let serialize: SerializeFn = {
            let scene = Rc::clone(scene);
            Box::new(move |u, e, out| serialize(&scene, u, e, out))
        };
        let deserialize: DeserializeFn = {
            let scene = Rc::clone(scene);
            Box::new(move |u, e, input, version| deserialize(&scene, u, e, input, version))
        };
        let handle: SceneHandle = Rc::clone(scene) as SceneHandle;
        Self {
            scene: handle,
            scene_version,
            create,
            destroy,
            serialize,
            deserialize,
        }
    }

    pub fn scene(&self) -> &SceneHandle {
        &self.scene
    }

    pub fn scene_version(&self) -> i32 {
        self.scene_version
    }
}

struct TypeInfo {
    name: String,
    hash: u32,
}

/// Per-universe table of component types: names, hashes and bindings.
pub struct ComponentRegistry {
    types: Vec<TypeInfo>,
    bindings: [Option<Rc<ComponentBinding>>; MAX_COMPONENT_TYPES],
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            types: Vec::new(),
            bindings: std::array::from_fn(|_| None),
        }
    }

    /// Hash used for a component type name in saved data.
    pub fn hash_name(name: &str) -> u32 {
        crc32fast::hash(name.as_bytes())
    }

    /// Get or assign the id for `name`.
    pub fn register_type(&mut self, name: &str) -> Result<ComponentType> {
        if let Some(ty) = self.type_by_name(name) {
            return Ok(ty);
        }
        if self.types.len() >= MAX_COMPONENT_TYPES {
            return Err(UniverseError::ComponentTypesExhausted(MAX_COMPONENT_TYPES));
        }
        let hash = Self::hash_name(name);
        // 0 terminates component lists in prefab blobs.
        if hash == 0 || self.type_from_hash(hash).is_some() {
            return Err(UniverseError::ComponentHashCollision {
                name: name.to_owned(),
                hash,
            });
        }
        self.types.push(TypeInfo {
            name: name.to_owned(),
            hash,
        });
        Ok(ComponentType::from_index(self.types.len() - 1))
    }

    pub fn type_by_name(&self, name: &str) -> Option<ComponentType> {
        self.types
            .iter()
            .position(|t| t.name == name)
            .map(ComponentType::from_index)
    }

    pub fn type_from_hash(&self, hash: u32) -> Option<ComponentType> {
        self.types
            .iter()
            .position(|t| t.hash == hash)
            .map(ComponentType::from_index)
    }

    pub fn type_hash(&self, ty: ComponentType) -> u32 {
        self.types[ty.index()].hash
    }

    pub fn type_name(&self, ty: ComponentType) -> &str {
        &self.types[ty.index()].name
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Attach the owning scene and callbacks. Each type is bound once.
    pub fn bind(&mut self, ty: ComponentType, binding: ComponentBinding) -> Result<()> {
        let slot = &mut self.bindings[ty.index()];
        if slot.is_some() {
            return Err(UniverseError::ComponentTypeAlreadyBound(ty));
        }
        *slot = Some(Rc::new(binding));
        Ok(())
    }

    pub fn binding(&self, ty: ComponentType) -> Option<&Rc<ComponentBinding>> {
        self.bindings[ty.index()].as_ref()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterates the set bits of a component mask, lowest type first.
#[derive(Debug, Clone)]
pub struct ComponentIter {
    entity: Entity,
    mask: u64,
}

impl Iterator for ComponentIter {
    type Item = ComponentUid;

    fn next(&mut self) -> Option<ComponentUid> {
        if self.mask == 0 {
            return None;
        }
        let index = self.mask.trailing_zeros() as usize;
        self.mask &= self.mask - 1;
        Some(ComponentUid {
            entity: self.entity,
            ty: ComponentType::from_index(index),
        })
    }
}

impl Universe {
    // ── Registry ─────────────────────────────────────────────────────

    pub fn component_types(&self) -> &ComponentRegistry {
        &self.components
    }

    pub fn component_types_mut(&mut self) -> &mut ComponentRegistry {
        &mut self.components
    }

    /// Bind `ty` to its owning scene. Rejects a second binding for the same
    /// type.
    pub fn register_component_type(
        &mut self,
        ty: ComponentType,
        binding: ComponentBinding,
    ) -> Result<()> {
        self.components.bind(ty, binding).inspect_err(|e| {
            log::error!("{e}");
        })
    }

    pub(crate) fn require_binding(&self, ty: ComponentType) -> Result<Rc<ComponentBinding>> {
        self.components
            .binding(ty)
            .cloned()
            .ok_or(UniverseError::ComponentTypeUnbound(ty))
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Ask the owning scene to attach a `ty` component to `entity`.
    ///
    /// Whether the component was actually attached is visible through
    /// [`has_component`](Self::has_component) afterwards.
    pub fn create_component(&mut self, entity: Entity, ty: ComponentType) -> Result<()> {
        self.assert_alive(entity);
        let binding = self.require_binding(ty)?;
        (binding.create)(self, entity);
        Ok(())
    }

    /// Ask the owning scene to detach a `ty` component from `entity`.
    pub fn destroy_component(&mut self, entity: Entity, ty: ComponentType) -> Result<()> {
        self.assert_alive(entity);
        let binding = self.require_binding(ty)?;
        (binding.destroy)(self, entity);
        Ok(())
    }

    pub fn serialize_component(
        &self,
        entity: Entity,
        ty: ComponentType,
        out: &mut OutputBlob,
    ) -> Result<()> {
        self.assert_alive(entity);
        let binding = self.require_binding(ty)?;
        (binding.serialize)(self, entity, out);
        Ok(())
    }

    /// Replay a serialized component onto `entity`. `scene_version` is the
    /// owning scene's version at the time the bytes were written.
    pub fn deserialize_component(
        &mut self,
        input: &mut InputBlob<'_>,
        entity: Entity,
        ty: ComponentType,
        scene_version: i32,
    ) -> Result<()> {
        self.assert_alive(entity);
        let binding = self.require_binding(ty)?;
        (binding.deserialize)(self, entity, input, scene_version)?;
        Ok(())
    }

    // ── Callbacks from scene modules ─────────────────────────────────

    /// Called by the owning scene once it has attached the payload.
    pub fn on_component_created(&mut self, entity: Entity, ty: ComponentType) {
        self.entity_data_mut(entity).components |= ty.bit();
        self.fire_component_added(ComponentUid { entity, ty });
    }

    /// Called by the owning scene once it has detached the payload.
    ///
    /// # Panics
    ///
    /// Panics if the bit was not set.
    pub fn on_component_destroyed(&mut self, entity: Entity, ty: ComponentType) {
        let data = self.entity_data_mut(entity);
        let old_mask = data.components;
        data.components &= !ty.bit();
        assert_ne!(
            old_mask, data.components,
            "{ty} destroyed on {entity}, which did not have it"
        );
        self.fire_component_destroyed(ComponentUid { entity, ty });
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn has_component(&self, entity: Entity, ty: ComponentType) -> bool {
        self.entity_data(entity).components & ty.bit() != 0
    }

    pub fn component(&self, entity: Entity, ty: ComponentType) -> Option<ComponentUid> {
        self.has_component(entity, ty)
            .then_some(ComponentUid { entity, ty })
    }

    pub fn components_mask(&self, entity: Entity) -> u64 {
        self.entity_data(entity).components
    }

    /// All components attached to `entity`, lowest type id first.
    pub fn components(&self, entity: Entity) -> ComponentIter {
        ComponentIter {
            entity,
            mask: self.components_mask(entity),
        }
    }

    pub fn first_component(&self, entity: Entity) -> Option<ComponentUid> {
        self.components(entity).next()
    }

    /// The attached component with the next higher type id after `cmp`.
    pub fn next_component(&self, cmp: ComponentUid) -> Option<ComponentUid> {
        let above = match cmp.ty.index() + 1 {
            MAX_COMPONENT_TYPES => 0,
            shift => !0u64 << shift,
        };
        ComponentIter {
            entity: cmp.entity,
            mask: self.components_mask(cmp.entity) & above,
        }
        .next()
    }

    // ── Scenes ───────────────────────────────────────────────────────

    pub fn add_scene(&mut self, scene: SceneHandle) {
        let hash = ComponentRegistry::hash_name(scene.name());
        self.scenes.push((hash, scene));
    }

    /// Returns `false` if the scene was not registered.
    pub fn remove_scene(&mut self, scene: &SceneHandle) -> bool {
        match self.scenes.iter().position(|(_, s)| Rc::ptr_eq(s, scene)) {
            Some(index) => {
                self.scenes.swap_remove(index);
                true
            }
            None => false,
        }
    }

    pub fn scenes(&self) -> impl Iterator<Item = &SceneHandle> {
        self.scenes.iter().map(|(_, s)| s)
    }

    /// Find a scene by the CRC32 of its name.
    pub fn scene_by_hash(&self, hash: u32) -> Option<&SceneHandle> {
        self.scenes.iter().find(|(h, _)| *h == hash).map(|(_, s)| s)
    }

    /// The scene owning component type `ty`.
    pub fn scene_of(&self, ty: ComponentType) -> Option<&SceneHandle> {
        self.components.binding(ty).map(|b| b.scene())
    }
}

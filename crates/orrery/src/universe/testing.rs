//! A minimal scene module for tests: each component is one `u32`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use super::component::{ComponentBinding, ComponentType, Scene};
use super::entity::Entity;
use super::Universe;
use crate::error::BlobError;
use crate::stream::{InputBlob, OutputBlob};

pub(crate) struct PayloadScene {
    pub name: String,
    pub ty: ComponentType,
    pub values: RefCell<HashMap<Entity, u32>>,
    pub refuse_create: Cell<bool>,
    /// Versions seen by `deserialize`, in call order.
    pub seen_versions: RefCell<Vec<i32>>,
}

impl Scene for PayloadScene {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> i32 {
        3
    }
}

impl PayloadScene {
    fn create(&self, universe: &mut Universe, entity: Entity) {
        if self.refuse_create.get() {
            return;
        }
        self.values.borrow_mut().insert(entity, 0);
        universe.on_component_created(entity, self.ty);
    }

    fn destroy(&self, universe: &mut Universe, entity: Entity) {
        self.values.borrow_mut().remove(&entity);
        universe.on_component_destroyed(entity, self.ty);
    }

    fn serialize(&self, _universe: &Universe, entity: Entity, out: &mut OutputBlob) {
        out.write(self.values.borrow().get(&entity).copied().unwrap_or_default());
    }

    fn deserialize(
        &self,
        universe: &mut Universe,
        entity: Entity,
        input: &mut InputBlob<'_>,
        version: i32,
    ) -> Result<(), BlobError> {
        let value = input.read::<u32>()?;
        self.seen_versions.borrow_mut().push(version);
        self.values.borrow_mut().insert(entity, value);
        universe.on_component_created(entity, self.ty);
        Ok(())
    }

    pub fn binding(scene: &Rc<Self>) -> ComponentBinding {
        ComponentBinding::new(
            scene,
            Self::create,
            Self::destroy,
            Self::serialize,
            Self::deserialize,
        )
    }

    pub fn set(&self, entity: Entity, value: u32) {
        self.values.borrow_mut().insert(entity, value);
    }
}

/// Register a type called `name` and bind it to a fresh [`PayloadScene`].
pub(crate) fn install_payload_scene(
    universe: &mut Universe,
    name: &str,
) -> (Rc<PayloadScene>, ComponentType) {
    let ty = universe
        .component_types_mut()
        .register_type(name)
        .unwrap();
    let scene = Rc::new(PayloadScene {
        name: name.to_owned(),
        ty,
        values: RefCell::new(HashMap::new()),
        refuse_create: Cell::new(false),
        seen_versions: RefCell::new(Vec::new()),
    });
    universe
        .register_component_type(ty, PayloadScene::binding(&scene))
        .unwrap();
    (scene, ty)
}

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

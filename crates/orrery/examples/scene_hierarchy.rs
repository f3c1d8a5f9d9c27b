//! Entity Hierarchies — headless solar system.
//!
//! Planets hang off the sun, moons off their planet. Spinning the sun swings
//! every descendant along; a planet+moon pair is captured as a prefab and
//! stamped back in twice; the skeleton is saved and reloaded at the end.
//!
//! Run with: `RUST_LOG=info cargo run -p orrery --example scene_hierarchy`

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use orrery::prelude::*;

// ── Orbit scene module ───────────────────────────────────────────────────

/// Owns the `orbit` component: an angular speed per entity.
struct OrbitScene {
    ty: ComponentType,
    speeds: RefCell<HashMap<Entity, f32>>,
}

impl Scene for OrbitScene {
    fn name(&self) -> &str {
        "orbit"
    }

    fn version(&self) -> i32 {
        1
    }
}

impl OrbitScene {
    fn create(&self, universe: &mut Universe, entity: Entity) {
        self.speeds.borrow_mut().insert(entity, 1.0);
        universe.on_component_created(entity, self.ty);
    }

    fn destroy(&self, universe: &mut Universe, entity: Entity) {
        self.speeds.borrow_mut().remove(&entity);
        universe.on_component_destroyed(entity, self.ty);
    }

    fn serialize(&self, _universe: &Universe, entity: Entity, out: &mut OutputBlob) {
        out.write(self.speeds.borrow().get(&entity).copied().unwrap_or_default());
    }

    fn deserialize(
        &self,
        universe: &mut Universe,
        entity: Entity,
        input: &mut InputBlob<'_>,
        _version: i32,
    ) -> std::result::Result<(), BlobError> {
        let speed = input.read::<f32>()?;
        self.speeds.borrow_mut().insert(entity, speed);
        universe.on_component_created(entity, self.ty);
        Ok(())
    }

    /// Advance every orbiting entity by `dt` seconds.
    fn update(&self, universe: &mut Universe, dt: f32) {
        let speeds: Vec<(Entity, f32)> = self.speeds.borrow().iter().map(|(&e, &s)| (e, s)).collect();
        for (entity, speed) in speeds {
            let rotation = universe.local_transform(entity).rotation;
            universe.set_local_rotation(entity, Quat::from_rotation_y(speed * dt) * rotation);
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let mut universe = Universe::new();
    let ty = universe.component_types_mut().register_type("orbit")?;
    let orbit = Rc::new(OrbitScene {
        ty,
        speeds: RefCell::new(HashMap::new()),
    });
    universe.register_component_type(
        ty,
        ComponentBinding::new(
            &orbit,
            OrbitScene::create,
            OrbitScene::destroy,
            OrbitScene::serialize,
            OrbitScene::deserialize,
        ),
    )?;
    universe.add_scene(orbit.clone());

    universe.events_mut().entity_destroyed.subscribe(|_, e| {
        log::info!("destroyed {e}");
    });

    // Sun at the origin, spinning slowly.
    let sun = universe.create_entity(DVec3::ZERO, Quat::IDENTITY);
    universe.set_name(sun, "sun");
    universe.create_component(sun, ty)?;

    let mut planets = Vec::new();
    for (i, distance) in [10.0, 16.0, 25.0].into_iter().enumerate() {
        let planet = universe.create_entity(DVec3::new(distance, 0.0, 0.0), Quat::IDENTITY);
        universe.set_name(planet, &format!("planet_{i}"));
        universe.set_parent(Some(sun), planet)?;
        universe.create_component(planet, ty)?;

        let moon = universe.create_entity(DVec3::new(distance + 2.0, 0.0, 0.0), Quat::IDENTITY);
        universe.set_name(moon, "moon");
        universe.set_parent(Some(planet), moon)?;
        planets.push(planet);
    }

    // Spin for a second of simulated time.
    for _ in 0..60 {
        orbit.update(&mut universe, 1.0 / 60.0);
    }
    for &planet in &planets {
        let moon = universe.find_by_name(Some(planet), "moon");
        log::info!(
            "{} at {:.2}, moon at {:.2}",
            universe.name(planet),
            universe.position(planet),
            moon.map(|m| universe.position(m)).unwrap_or_default(),
        );
    }

    // Capture the innermost planet as a prefab and stamp two copies.
    let mut prefab = OutputBlob::new();
    universe.serialize_prefab(planets[0], &mut prefab)?;
    for x in [-40.0, 40.0] {
        let copy = universe.instantiate_prefab(prefab.as_slice(), DVec3::new(x, 0.0, 0.0), Quat::IDENTITY, 1.0)?;
        log::info!("stamped prefab root {copy} with {} children", universe.children(copy).count());
    }

    // Destroying a planet promotes its moon to a root in place.
    universe.destroy_entity(planets[1]);
    log::info!(
        "{} entities, {} hierarchy nodes",
        universe.entity_count(),
        universe.hierarchy_node_count()
    );

    let file = universe.save_skeleton();
    let mut reloaded = Universe::new();
    reloaded.load_skeleton(&file)?;
    log::info!(
        "reloaded {} entities; sun is {:?}",
        reloaded.entity_count(),
        reloaded.find_by_name(None, "sun")
    );
    Ok(())
}

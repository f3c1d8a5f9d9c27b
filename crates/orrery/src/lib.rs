//! # Orrery — Entity Registry for a Real-Time Engine
//!
//! The [`Universe`] is the game-object model underneath an engine: stable
//! entity ids over recycled slots, world and parent-relative transforms kept
//! consistent through a mutable hierarchy, names, and a 64-bit component
//! mask per entity whose bits are owned by pluggable scene modules.
//!
//! Start with `use orrery::prelude::*`.
//!
//! ```ignore
//! let mut universe = Universe::new();
//! let sun = universe.create_entity(DVec3::ZERO, Quat::IDENTITY);
//! let planet = universe.create_entity(DVec3::new(10.0, 0.0, 0.0), Quat::IDENTITY);
//! universe.set_parent(Some(sun), planet)?;
//! universe.set_rotation(sun, Quat::from_rotation_y(0.1)); // planet swings along
//! ```

pub mod config;
pub mod error;
pub mod math;
pub mod prelude;
pub mod stream;
pub mod universe;

pub use config::UniverseConfig;
pub use error::{BlobError, Result, UniverseError};
pub use universe::{Entity, Universe};

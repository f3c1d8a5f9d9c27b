//! Everything a host or scene module usually needs.

pub use crate::config::UniverseConfig;
pub use crate::error::{BlobError, Result, UniverseError};
pub use crate::math::{DVec3, Quat, RigidTransform, Transform};
pub use crate::stream::{InputBlob, OutputBlob};
pub use crate::universe::{
    ComponentBinding, ComponentType, ComponentUid, Entity, PrefabVersion, Scene, SceneHandle,
    Universe,
};

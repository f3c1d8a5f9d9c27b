//! Error types.
//!
//! Only recoverable conditions live here: policy violations (a reparent that
//! would create a cycle) and data errors (bad versions, truncated streams,
//! unknown component hashes). Programming errors such as touching a
//! destroyed entity are assertions, not values of these enums.

use thiserror::Error;

use crate::universe::{ComponentType, Entity};

/// Failure while reading a byte stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlobError {
    #[error("unexpected end of stream: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd { needed: usize, remaining: usize },
    #[error("invalid length prefix {0}")]
    InvalidLength(i32),
    #[error("string of {len} bytes exceeds the {max} byte limit")]
    StringTooLong { len: usize, max: usize },
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
}

/// Everything the universe reports instead of asserting.
#[derive(Debug, Error)]
pub enum UniverseError {
    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error("hierarchy can not contain a cycle: {parent} is a descendant of {child}")]
    HierarchyCycle { parent: Entity, child: Entity },

    #[error("all {0} component type ids are in use")]
    ComponentTypesExhausted(usize),
    #[error("component type name `{name}` hashes to {hash:#010x}, which is reserved or taken")]
    ComponentHashCollision { name: String, hash: u32 },
    #[error("component type {0} already has an owning scene")]
    ComponentTypeAlreadyBound(ComponentType),
    #[error("component type {0} has no owning scene")]
    ComponentTypeUnbound(ComponentType),
    #[error("no component type hashes to {0:#010x}")]
    UnknownComponentHash(u32),

    #[error("unsupported prefab version {found} (newest supported is {supported})")]
    UnsupportedPrefabVersion { found: u32, supported: u32 },
    #[error("prefab contains no entities")]
    EmptyPrefab,
    #[error("prefab instantiation aborted after creating {} entities: {source}", .created.len())]
    PrefabAborted {
        #[source]
        source: Box<UniverseError>,
        /// Entities already created for this instantiation. They are left
        /// alive; destroying them is up to the caller.
        created: Vec<Entity>,
    },

    #[error("not a universe file (magic {0:#010x})")]
    BadMagic(u32),
    #[error("unsupported universe file version {0}")]
    UnsupportedFileVersion(u32),
    #[error("universe file checksum mismatch: header says {expected:#010x}, body is {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("corrupt skeleton: {0}")]
    CorruptSkeleton(String),

    #[error("failed to read config: {0}")]
    ConfigIo(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, UniverseError>;

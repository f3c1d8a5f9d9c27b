//! # Skeleton — Raw Universe Snapshot
//!
//! The skeleton is everything the universe itself owns: slot records,
//! world transforms, names, the free-list head and the hierarchy table.
//! Component payloads are not part of it; scene modules persist those on
//! their own and reattach them once the skeleton is back.
//!
//! ## Layout
//!
//! ```text
//! i32 slot_count
//! RawEntity    × slot_count
//! RawTransform × slot_count
//! i32 name_count
//! name_count × { i32 entity, string name }
//! i32 first_free                      ← -1 = empty free list
//! i32 node_count
//! RawHierarchyNode × node_count
//! ```
//!
//! Records are `#[repr(C)]` with explicit padding fields and go through
//! `bytemuck` as raw blocks. Absent indices are written as -1.
//!
//! [`Universe::save_skeleton`] prepends a [`SkeletonHeader`] carrying a
//! magic number, the format version and a CRC32 of the body.

use bytemuck::{Pod, Zeroable};

use super::entity::{Entity, EntityData, SlotTable};
use super::hierarchy::HierarchyNode;
use super::names::{EntityName, MAX_NAME_LENGTH};
use super::Universe;
use crate::error::{BlobError, Result, UniverseError};
use crate::math::{DVec3, Quat, Transform};
use crate::stream::{InputBlob, OutputBlob};

/// Marks a skeleton file; never a valid slot count, so files with and
/// without a header can not be confused.
pub const SKELETON_MAGIC: u32 = 0xFFFF_FFFF;

/// Current skeleton file version.
pub const SKELETON_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct SkeletonHeader {
    pub magic: u32,
    pub version: u32,
    /// CRC32 of everything after the header.
    pub hash: u32,
    pub reserved: u32,
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct RawEntity {
    components: u64,
    valid: u32,
    hierarchy: i32,
    name: i32,
    prev: i32,
    next: i32,
    _reserved: u32,
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct RawTransform {
    position: [f64; 3],
    rotation: [f32; 4],
    scale: f32,
    _pad: f32,
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct RawHierarchyNode {
    entity: i32,
    parent: i32,
    first_child: i32,
    next_sibling: i32,
    position: [f64; 3],
    rotation: [f32; 4],
    scale: f32,
    _pad: u32,
}

fn encode(index: Option<u32>) -> i32 {
    index.map_or(-1, |i| i as i32)
}

fn encode_entity(entity: Option<Entity>) -> i32 {
    encode(entity.map(Entity::index))
}

fn corrupt(message: impl Into<String>) -> UniverseError {
    UniverseError::CorruptSkeleton(message.into())
}

/// Decode an index written by [`encode`], requiring it to be below `bound`.
fn decode(raw: i32, bound: usize, what: &str) -> Result<Option<u32>> {
    match raw {
        -1 => Ok(None),
        i if i >= 0 && (i as usize) < bound => Ok(Some(i as u32)),
        i => Err(corrupt(format!("{what} index {i} out of range 0..{bound}"))),
    }
}

/// The live entity at `raw`.
fn live_entity(slots: &[EntityData], raw: i32, what: &str) -> Result<Entity> {
    match decode(raw, slots.len(), what)? {
        Some(index) if slots[index as usize].valid => Ok(Entity(index)),
        _ => Err(corrupt(format!("{what} refers to {raw}, which is not a live slot"))),
    }
}

fn optional_entity(slots: &[EntityData], raw: i32, what: &str) -> Result<Option<Entity>> {
    if raw == -1 {
        return Ok(None);
    }
    live_entity(slots, raw, what).map(Some)
}

/// Read an i32 record count and make sure that many records of
/// `record_size` bytes can still be in the stream.
fn read_count(input: &mut InputBlob<'_>, record_size: usize) -> Result<usize> {
    let count = input.read::<i32>()?;
    if count < 0 {
        return Err(BlobError::InvalidLength(count).into());
    }
    let count = count as usize;
    let needed = count.saturating_mul(record_size);
    if needed > input.remaining() {
        return Err(BlobError::UnexpectedEnd {
            needed,
            remaining: input.remaining(),
        }
        .into());
    }
    Ok(count)
}

impl From<&Transform> for RawTransform {
    fn from(t: &Transform) -> Self {
        Self {
            position: t.position.to_array(),
            rotation: t.rotation.to_array(),
            scale: t.scale,
            _pad: 0.0,
        }
    }
}

impl From<RawTransform> for Transform {
    fn from(raw: RawTransform) -> Self {
        Transform::new(
            DVec3::from_array(raw.position),
            Quat::from_array(raw.rotation),
            raw.scale,
        )
    }
}

impl Universe {
    /// Append the skeleton to `out`.
    pub fn serialize(&self, out: &mut OutputBlob) {
        let raw_entities: Vec<RawEntity> = self
            .slots
            .slots
            .iter()
            .map(|data| RawEntity {
                components: data.components,
                valid: data.valid as u32,
                hierarchy: encode(data.hierarchy),
                name: encode(data.name),
                prev: encode(data.prev),
                next: encode(data.next),
                _reserved: 0,
            })
            .collect();
        let raw_transforms: Vec<RawTransform> =
            self.transforms.iter().map(RawTransform::from).collect();

        out.write(raw_entities.len() as i32);
        out.write_slice(&raw_entities);
        out.write_slice(&raw_transforms);

        out.write(self.names.len() as i32);
        for entry in &self.names {
            out.write(entry.entity.index() as i32);
            out.write_string(&entry.name);
        }

        out.write(encode(self.slots.first_free));

        let raw_nodes: Vec<RawHierarchyNode> = self
            .hierarchy
            .iter()
            .map(|node| {
                let local = RawTransform::from(&node.local_transform);
                RawHierarchyNode {
                    entity: node.entity.index() as i32,
                    parent: encode_entity(node.parent),
                    first_child: encode_entity(node.first_child),
                    next_sibling: encode_entity(node.next_sibling),
                    position: local.position,
                    rotation: local.rotation,
                    scale: local.scale,
                    _pad: 0,
                }
            })
            .collect();
        out.write(raw_nodes.len() as i32);
        out.write_slice(&raw_nodes);
    }

    /// Replace the entity skeleton with one read from `input`.
    ///
    /// Everything is read and cross-checked before the universe is touched;
    /// on error the universe is unchanged. Component masks are restored as
    /// stored, without calling any scene. No events fire.
    pub fn deserialize(&mut self, input: &mut InputBlob<'_>) -> Result<()> {
        let slot_count = read_count(
            input,
            size_of::<RawEntity>() + size_of::<RawTransform>(),
        )?;
        let raw_entities = input.read_vec::<RawEntity>(slot_count)?;
        let raw_transforms = input.read_vec::<RawTransform>(slot_count)?;

        let name_count = read_count(input, size_of::<i32>() * 2)?;
        let mut raw_names = Vec::with_capacity(name_count);
        for _ in 0..name_count {
            let entity = input.read::<i32>()?;
            let name = input.read_string(MAX_NAME_LENGTH - 1)?;
            raw_names.push((entity, name));
        }

        let first_free = input.read::<i32>()?;
        let node_count = read_count(input, size_of::<RawHierarchyNode>())?;
        let raw_nodes = input.read_vec::<RawHierarchyNode>(node_count)?;

        let (slots, names, hierarchy) =
            validate_skeleton(&raw_entities, &raw_names, first_free, &raw_nodes)?;

        self.slots = slots;
        self.transforms = raw_transforms.into_iter().map(Transform::from).collect();
        self.names = names;
        self.hierarchy = hierarchy;
        log::debug!(
            "Loaded skeleton: {} slots, {} live, {} names, {} hierarchy nodes",
            self.slots.len(),
            self.slots.alive(),
            self.names.len(),
            self.hierarchy.len()
        );
        Ok(())
    }

    /// The skeleton with a versioned, checksummed header.
    pub fn save_skeleton(&self) -> Vec<u8> {
        let mut body = OutputBlob::new();
        self.serialize(&mut body);

        let header = SkeletonHeader {
            magic: SKELETON_MAGIC,
            version: SKELETON_VERSION,
            hash: crc32fast::hash(body.as_slice()),
            reserved: 0,
        };
        let mut out = OutputBlob::with_capacity(size_of::<SkeletonHeader>() + body.len());
        out.write(header);
        out.write_bytes(body.as_slice());
        log::info!(
            "Saved skeleton of {} entities ({} bytes)",
            self.entity_count(),
            out.len()
        );
        out.into_vec()
    }

    /// Load a file written by [`save_skeleton`](Self::save_skeleton).
    pub fn load_skeleton(&mut self, bytes: &[u8]) -> Result<()> {
        let mut input = InputBlob::new(bytes);
        let header = input.read::<SkeletonHeader>()?;
        if header.magic != SKELETON_MAGIC {
            let err = UniverseError::BadMagic(header.magic);
            log::error!("{err}");
            return Err(err);
        }
        if header.version != SKELETON_VERSION {
            let err = UniverseError::UnsupportedFileVersion(header.version);
            log::error!("{err}");
            return Err(err);
        }

        let body = &bytes[input.position()..];
        let actual = crc32fast::hash(body);
        if actual != header.hash {
            let err = UniverseError::ChecksumMismatch {
                expected: header.hash,
                actual,
            };
            log::error!("{err}");
            return Err(err);
        }

        let mut body = InputBlob::new(body);
        self.deserialize(&mut body)?;
        if !body.is_at_end() {
            log::warn!("{} trailing bytes after skeleton", body.remaining());
        }
        Ok(())
    }
}

/// Cross-check every stored index and rebuild the in-memory tables.
fn validate_skeleton(
    raw_entities: &[RawEntity],
    raw_names: &[(i32, String)],
    raw_first_free: i32,
    raw_nodes: &[RawHierarchyNode],
) -> Result<(SlotTable, Vec<EntityName>, Vec<HierarchyNode>)> {
    let slot_count = raw_entities.len();
    let node_count = raw_nodes.len();

    let mut slots = Vec::with_capacity(slot_count);
    for (index, raw) in raw_entities.iter().enumerate() {
        let valid = match raw.valid {
            0 => false,
            1 => true,
            other => return Err(corrupt(format!("slot {index} has validity flag {other}"))),
        };
        let data = if valid {
            EntityData {
                valid,
                hierarchy: decode(raw.hierarchy, node_count, "hierarchy")?,
                name: None,
                components: raw.components,
                prev: None,
                next: None,
            }
        } else {
            EntityData {
                valid,
                hierarchy: None,
                name: None,
                components: 0,
                prev: decode(raw.prev, slot_count, "free list")?,
                next: decode(raw.next, slot_count, "free list")?,
            }
        };
        slots.push(data);
    }

    let mut names = Vec::with_capacity(raw_names.len());
    let mut name_links = Vec::with_capacity(raw_names.len());
    for (row, (raw_entity, name)) in raw_names.iter().enumerate() {
        let entity = live_entity(&slots, *raw_entity, "name owner")?;
        name_links.push((entity, row as u32));
        names.push(EntityName {
            entity,
            name: name.clone(),
        });
    }
    for (entity, row) in name_links {
        let data = &mut slots[entity.slot()];
        if data.name.is_some() {
            return Err(corrupt(format!("{entity} has more than one name")));
        }
        data.name = Some(row);
    }

    let mut hierarchy = Vec::with_capacity(node_count);
    for (row, raw) in raw_nodes.iter().enumerate() {
        let entity = live_entity(&slots, raw.entity, "hierarchy node owner")?;
        if slots[entity.slot()].hierarchy != Some(row as u32) {
            return Err(corrupt(format!("hierarchy row {row} is not owned by {entity}")));
        }
        let node = HierarchyNode {
            entity,
            parent: optional_entity(&slots, raw.parent, "parent")?,
            first_child: optional_entity(&slots, raw.first_child, "first child")?,
            next_sibling: optional_entity(&slots, raw.next_sibling, "next sibling")?,
            local_transform: Transform::new(
                DVec3::from_array(raw.position),
                Quat::from_array(raw.rotation),
                raw.scale,
            ),
        };
        for linked in [node.parent, node.first_child, node.next_sibling].into_iter().flatten() {
            if slots[linked.slot()].hierarchy.is_none() {
                return Err(corrupt(format!("{entity} links to {linked}, which has no hierarchy node")));
            }
        }
        hierarchy.push(node);
    }
    for (index, data) in slots.iter().enumerate() {
        if let Some(row) = data.hierarchy {
            let owner = hierarchy[row as usize].entity;
            if owner.slot() != index {
                return Err(corrupt(format!(
                    "slot {index} claims hierarchy row {row}, which belongs to {owner}"
                )));
            }
        }
    }
    validate_links(&slots, &hierarchy)?;

    let first_free = decode(raw_first_free, slot_count, "first free")?;
    let free_count = slots.iter().filter(|s| !s.valid).count();
    let mut walked = 0;
    let mut prev = None;
    let mut cursor = first_free;
    while let Some(index) = cursor {
        let data = &slots[index as usize];
        if data.valid || data.prev != prev || walked == free_count {
            return Err(corrupt(format!("free list is broken at slot {index}")));
        }
        walked += 1;
        prev = Some(index);
        cursor = data.next;
    }
    if walked != free_count {
        return Err(corrupt(format!(
            "free list reaches {walked} of {free_count} free slots"
        )));
    }

    Ok((SlotTable::from_parts(slots, first_free), names, hierarchy))
}

fn node_row(slots: &[EntityData], entity: Entity) -> Result<usize> {
    slots[entity.slot()]
        .hierarchy
        .map(|row| row as usize)
        .ok_or_else(|| corrupt(format!("{entity} has no hierarchy node")))
}

#[derive(Clone, Copy, PartialEq)]
enum Visit {
    New,
    OnPath,
    Rooted,
}

/// Every sibling list must be a simple chain whose members name the list's
/// owner as parent, every parented node must sit in its parent's list, and
/// every parent chain must end at a root.
fn validate_links(slots: &[EntityData], hierarchy: &[HierarchyNode]) -> Result<()> {
    let mut listed = vec![false; hierarchy.len()];
    for node in hierarchy {
        if node.parent.is_none() && node.first_child.is_none() {
            return Err(corrupt(format!(
                "{} has a hierarchy node but neither parent nor children",
                node.entity
            )));
        }
        let mut cursor = node.first_child;
        while let Some(child) = cursor {
            let row = node_row(slots, child)?;
            if listed[row] {
                return Err(corrupt(format!("{child} is linked into sibling lists twice")));
            }
            listed[row] = true;
            let child_node = &hierarchy[row];
            if child_node.parent != Some(node.entity) {
                return Err(corrupt(format!(
                    "{child} is listed under {} but its parent is {:?}",
                    node.entity, child_node.parent
                )));
            }
            cursor = child_node.next_sibling;
        }
    }
    for (row, node) in hierarchy.iter().enumerate() {
        if node.parent.is_none() && node.next_sibling.is_some() {
            return Err(corrupt(format!("root {} has a next sibling", node.entity)));
        }
        if node.parent.is_some() && !listed[row] {
            return Err(corrupt(format!(
                "{} is missing from its parent's child list",
                node.entity
            )));
        }
    }

    let mut visits = vec![Visit::New; hierarchy.len()];
    let mut path = Vec::new();
    for start in 0..hierarchy.len() {
        let mut row = start;
        loop {
            match visits[row] {
                Visit::Rooted => break,
                Visit::OnPath => {
                    return Err(corrupt(format!(
                        "{} is its own ancestor",
                        hierarchy[row].entity
                    )));
                }
                Visit::New => {}
            }
            visits[row] = Visit::OnPath;
            path.push(row);
            match hierarchy[row].parent {
                Some(parent) => row = node_row(slots, parent)?,
                None => break,
            }
        }
        for row in path.drain(..) {
            visits[row] = Visit::Rooted;
        }
    }
    Ok(())
}

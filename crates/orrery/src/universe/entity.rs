//! # Entity — Slot Indices and the Intrusive Free List
//!
//! An [`Entity`] is just an index into the slot table. It carries no
//! generation: when a slot is destroyed and later reused, the new entity has
//! the same value as the old one. Collaborators learn about destruction from
//! the `entity_destroyed` event and must drop their references then.
//!
//! ## Memory Layout
//!
//! ```text
//! slots:      [ live | free | live | free | free ]
//!                       ▲  ╲__prev/next__╱  ▲
//! first_free ───────────┘ (doubly linked through the free slots)
//! ```
//!
//! Free slots double as list nodes, so recycling costs no extra storage.
//! The list is doubly linked because [`SlotTable::emplace`] has to unlink an
//! arbitrary index (undo/redo and file loading recreate *specific* entities),
//! not just pop the head.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identity of a game object: an index into the slot table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity(pub(crate) u32);

impl Entity {
    /// Build an entity from a raw index. Only meaningful for indices the
    /// universe handed out (or will be told to [`emplace`](super::Universe::emplace_entity)).
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }

    pub(crate) fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One record per slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntityData {
    pub valid: bool,
    /// Index into the hierarchy table, if the entity has a parent or children.
    pub hierarchy: Option<u32>,
    /// Index into the name table.
    pub name: Option<u32>,
    /// Bit `i` set ⇔ component type `i` attached.
    pub components: u64,
    /// Free-list links, meaningful only while `valid == false`.
    pub prev: Option<u32>,
    pub next: Option<u32>,
}

impl EntityData {
    const LIVE: Self = Self {
        valid: true,
        hierarchy: None,
        name: None,
        components: 0,
        prev: None,
        next: None,
    };
}

/// Dense entity records plus the free-list head.
#[derive(Debug, Default, Clone)]
pub(crate) struct SlotTable {
    pub slots: Vec<EntityData>,
    pub first_free: Option<u32>,
    alive: usize,
}

impl SlotTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            first_free: None,
            alive: 0,
        }
    }

    /// Rebuild from raw parts (skeleton loading).
    pub fn from_parts(slots: Vec<EntityData>, first_free: Option<u32>) -> Self {
        let alive = slots.iter().filter(|s| s.valid).count();
        Self {
            slots,
            first_free,
            alive,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn alive(&self) -> usize {
        self.alive
    }

    pub fn is_valid(&self, index: u32) -> bool {
        self.slots.get(index as usize).is_some_and(|s| s.valid)
    }

    /// Pop the free-list head, or append a fresh slot. Returns the index,
    /// already marked live.
    pub fn allocate(&mut self) -> u32 {
        let index = match self.first_free {
            Some(index) => {
                let next = self.slots[index as usize].next;
                if let Some(next) = next {
                    self.slots[next as usize].prev = None;
                }
                self.first_free = next;
                index
            }
            None => {
                self.slots.push(EntityData::LIVE);
                (self.slots.len() - 1) as u32
            }
        };
        self.slots[index as usize] = EntityData::LIVE;
        self.alive += 1;
        index
    }

    /// Force `index` to become live, synthesizing free slots up to it.
    ///
    /// # Panics
    ///
    /// Panics if `index` is already live.
    pub fn emplace(&mut self, index: u32) {
        while self.slots.len() <= index as usize {
            let fresh = self.slots.len() as u32;
            self.slots.push(EntityData {
                valid: false,
                next: self.first_free,
                ..EntityData::LIVE
            });
            if let Some(head) = self.first_free {
                self.slots[head as usize].prev = Some(fresh);
            }
            self.first_free = Some(fresh);
        }

        let data = self.slots[index as usize];
        assert!(!data.valid, "Cannot emplace entity #{index}: slot is already live");
        self.unlink(index, data.prev, data.next);
        self.slots[index as usize] = EntityData::LIVE;
        self.alive += 1;
    }

    /// Push a live slot onto the free list.
    pub fn release(&mut self, index: u32) {
        let data = &mut self.slots[index as usize];
        debug_assert!(data.valid);
        *data = EntityData {
            valid: false,
            hierarchy: None,
            name: None,
            components: 0,
            prev: None,
            next: self.first_free,
        };
        if let Some(head) = self.first_free {
            self.slots[head as usize].prev = Some(index);
        }
        self.first_free = Some(index);
        self.alive -= 1;
    }

    fn unlink(&mut self, index: u32, prev: Option<u32>, next: Option<u32>) {
        if self.first_free == Some(index) {
            self.first_free = next;
        }
        if let Some(prev) = prev {
            self.slots[prev as usize].next = next;
        }
        if let Some(next) = next {
            self.slots[next as usize].prev = prev;
        }
    }

    /// First live index at or after `from`.
    pub fn next_live(&self, from: usize) -> Option<u32> {
        self.slots
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, s)| s.valid)
            .map(|(i, _)| i as u32)
    }

    /// Walk the free list from its head.
    #[cfg(test)]
    pub fn free_indices(&self) -> Vec<u32> {
        let mut out = Vec::new();
        let mut cursor = self.first_free;
        while let Some(index) = cursor {
            assert!(out.len() <= self.slots.len(), "free list contains a loop");
            out.push(index);
            cursor = self.slots[index as usize].next;
        }
        out
    }
}

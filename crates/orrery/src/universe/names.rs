//! Display names. Only named entities get a row in the name table; rows are
//! compacted by swap-remove and each entity record keeps its row index.

use super::entity::Entity;
use super::Universe;

/// Size of a name slot, including the terminator of the on-disk string.
/// Longer names are truncated to `MAX_NAME_LENGTH - 1` bytes.
pub const MAX_NAME_LENGTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EntityName {
    pub entity: Entity,
    pub name: String,
}

/// Cut `name` to fit a name slot without splitting a character.
pub(crate) fn clamp_name(name: &str) -> &str {
    let max = MAX_NAME_LENGTH - 1;
    if name.len() <= max {
        return name;
    }
    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

impl Universe {
    /// Name `entity`, replacing any previous name. Setting an empty name on
    /// an unnamed entity does nothing.
    pub fn set_name(&mut self, entity: Entity, name: &str) {
        let name = clamp_name(name);
        match self.entity_data(entity).name {
            Some(index) => self.names[index as usize].name = name.to_owned(),
            None => {
                if name.is_empty() {
                    return;
                }
                let index = self.names.len() as u32;
                self.names.push(EntityName {
                    entity,
                    name: name.to_owned(),
                });
                self.entity_data_mut(entity).name = Some(index);
            }
        }
    }

    /// The entity's name, or `""` if it has none.
    pub fn name(&self, entity: Entity) -> &str {
        match self.entity_data(entity).name {
            Some(index) => &self.names[index as usize].name,
            None => "",
        }
    }

    /// Find a direct child of `parent` called `name`, or with `parent` of
    /// `None`, a root-level entity of that name. First match wins.
    pub fn find_by_name(&self, parent: Option<Entity>, name: &str) -> Option<Entity> {
        match parent {
            Some(parent) => self.children(parent).find(|&child| self.name(child) == name),
            None => self
                .names
                .iter()
                .filter(|entry| entry.name == name)
                .map(|entry| entry.entity)
                .find(|&entity| self.parent(entity).is_none()),
        }
    }

    /// Drop row `index`, moving the last row into its place.
    pub(crate) fn remove_name_entry(&mut self, index: u32) {
        let removed = self.names.swap_remove(index as usize);
        if let Some(moved) = self.names.get(index as usize) {
            let owner = moved.entity;
            self.slots.slots[owner.slot()].name = Some(index);
        }
        self.slots.slots[removed.entity.slot()].name = None;
    }
}

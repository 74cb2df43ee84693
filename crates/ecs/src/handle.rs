//! Stable, stale-detecting entity handles.

use crate::entity::{EntityId, INVALID_SLOT};

/// A weak `{slot, generation}` reference to an entity.
///
/// Resolves to an entity id only while the slot table still maps `slot` to the same
/// generation the handle was issued with; after the slot is reused for something else, the
/// old handle fails to resolve rather than aliasing the new occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityHandle {
    slot: u32,
    generation: u32,
}

impl EntityHandle {
    /// The sentinel "empty handle" -- `slot == INVALID_SLOT`.
    pub const INVALID: EntityHandle = EntityHandle {
        slot: INVALID_SLOT,
        generation: 0,
    };

    pub(crate) fn new(slot: u32, generation: u32) -> Self {
        EntityHandle { slot, generation }
    }

    pub fn slot(self) -> u32 {
        self.slot
    }

    pub fn generation(self) -> u32 {
        self.generation
    }

    /// True iff `slot != INVALID_SLOT`. Does not check whether the slot still resolves --
    /// use [`crate::registry::EntityRegistry::resolve`] for that.
    pub fn is_valid(self) -> bool {
        self.slot != INVALID_SLOT
    }
}

impl Default for EntityHandle {
    fn default() -> Self {
        EntityHandle::INVALID
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    generation: u32,
    entity_id: Option<EntityId>,
}

/// A free-list-backed allocator of `{entity_id, generation}` slots.
#[derive(Debug, Default)]
pub struct HandleSlotTable {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
}

impl HandleSlotTable {
    pub fn new() -> Self {
        HandleSlotTable {
            slots: Vec::new(),
            free_list: Vec::new(),
        }
    }

    /// Returns a reclaimed slot (generation already bumped from its previous tenant) or
    /// appends a fresh one. The returned slot is "in use, unassigned" -- call
    /// [`HandleSlotTable::bind`] to associate it with an entity.
    pub fn alloc(&mut self) -> u32 {
        if let Some(slot) = self.free_list.pop() {
            slot
        } else {
            let slot = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                entity_id: None,
            });
            slot
        }
    }

    /// Associates `slot` with `entity_id` at the slot's current generation.
    pub fn bind(&mut self, slot: u32, entity_id: EntityId) {
        self.slots[slot as usize].entity_id = Some(entity_id);
    }

    /// Returns the handle representing `slot` at its current generation, or
    /// [`EntityHandle::INVALID`] if `slot == INVALID_SLOT`.
    pub fn handle_for_slot(&self, slot: u32) -> EntityHandle {
        if slot == INVALID_SLOT {
            return EntityHandle::INVALID;
        }
        EntityHandle::new(slot, self.slots[slot as usize].generation)
    }

    /// Resolves a handle to an entity id, iff the slot is occupied and the generation
    /// matches.
    pub fn resolve(&self, handle: EntityHandle) -> Option<EntityId> {
        if !handle.is_valid() {
            return None;
        }
        let slot = self.slots.get(handle.slot as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entity_id
    }

    /// Bumps the slot's generation, clears its entity id, and returns it to the free list.
    pub fn invalidate(&mut self, slot: u32) {
        let entry = &mut self.slots[slot as usize];
        entry.entity_id = None;
        entry.generation = entry.generation.wrapping_add(1);
        self.free_list.push(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eid(n: i64) -> EntityId {
        EntityId::from_raw(n)
    }

    #[test]
    fn alloc_bind_resolve_roundtrip() {
        let mut table = HandleSlotTable::new();
        let slot = table.alloc();
        table.bind(slot, eid(42));
        let handle = table.handle_for_slot(slot);
        assert_eq!(table.resolve(handle), Some(eid(42)));
    }

    #[test]
    fn invalidate_makes_old_handle_fail() {
        let mut table = HandleSlotTable::new();
        let slot = table.alloc();
        table.bind(slot, eid(1));
        let h1 = table.handle_for_slot(slot);
        table.invalidate(slot);
        assert_eq!(table.resolve(h1), None);
    }

    #[test]
    fn reused_slot_gets_new_generation() {
        let mut table = HandleSlotTable::new();
        let slot = table.alloc();
        table.bind(slot, eid(1));
        let h1 = table.handle_for_slot(slot);
        table.invalidate(slot);

        let slot2 = table.alloc();
        assert_eq!(slot2, slot, "free list should recycle the slot");
        table.bind(slot2, eid(2));
        let h2 = table.handle_for_slot(slot2);

        assert_ne!(h1.generation(), h2.generation());
        assert_eq!(table.resolve(h1), None);
        assert_eq!(table.resolve(h2), Some(eid(2)));
    }

    #[test]
    fn invalid_handle_never_resolves() {
        let table = HandleSlotTable::new();
        assert_eq!(table.resolve(EntityHandle::INVALID), None);
    }
}

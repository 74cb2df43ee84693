//! The entity registry: owns every entity, the component store, and the handle table.

use std::collections::HashMap;

use crate::component::{component_type_id, ComponentTypeId};
use crate::entity::{Entity, EntityId};
use crate::handle::{EntityHandle, HandleSlotTable};
use crate::pool::RemovalPolicy;
use crate::store::ComponentStore;

/// The entity id reserved for the never-merged, never-queryable dummy entity returned by
/// [`EntityRegistry::get_singleton_entity`] when nothing has registered for that type.
const DUMMY_ENTITY_ID: i64 = -1;

/// Construction-time knobs for an [`EntityRegistry`].
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    /// How [`crate::pool::ComponentPool::remove`] behaves for every pool in this registry.
    pub removal_policy: RemovalPolicy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            removal_policy: RemovalPolicy::SwapRemove,
        }
    }
}

/// Owns entities, their components, tags, handles, and singleton registrations.
///
/// Entities move through two states: **pending** (created but invisible to queries) and
/// **live** (merged, queryable, handle-addressable). See the module-level data model in
/// `SPEC_FULL.md` section 3 for the full lifecycle.
#[derive(Debug)]
pub struct EntityRegistry {
    live: Vec<Entity>,
    id_to_index: HashMap<EntityId, usize>,
    pending: Vec<Entity>,
    handles: HandleSlotTable,
    singletons: HashMap<ComponentTypeId, EntityId>,
    next_id: i64,
    store: ComponentStore,
    dummy: Entity,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        EntityRegistry {
            live: Vec::new(),
            id_to_index: HashMap::new(),
            pending: Vec::new(),
            handles: HandleSlotTable::new(),
            singletons: HashMap::new(),
            next_id: 0,
            store: ComponentStore::new(config.removal_policy),
            dummy: Entity::new(EntityId::from_raw(DUMMY_ENTITY_ID), 0, false),
        }
    }

    fn alloc_id(&mut self) -> EntityId {
        let id = EntityId::from_raw(self.next_id);
        self.next_id += 1;
        id
    }

    // -- creation -----------------------------------------------------------------------

    /// Creates a transient entity: appended to pending, not yet query-visible.
    pub fn create(&mut self) -> EntityId {
        self.create_internal(false)
    }

    /// Creates a permanent entity: survives `delete_all(include_permanent=false)`.
    pub fn create_permanent(&mut self) -> EntityId {
        self.create_internal(true)
    }

    fn create_internal(&mut self, permanent: bool) -> EntityId {
        let id = self.alloc_id();
        self.pending.push(Entity::new(id, 0, permanent));
        id
    }

    // -- merge ----------------------------------------------------------------------------

    /// Promotes every pending entity into the live set, assigning each a handle slot.
    /// Idempotent when pending is empty.
    pub fn merge_pending(&mut self) {
        for mut entity in self.pending.drain(..) {
            let slot = self.handles.alloc();
            self.handles.bind(slot, entity.id());
            entity.set_slot(slot);
            let index = self.live.len();
            self.id_to_index.insert(entity.id(), index);
            self.live.push(entity);
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_entities(&self) -> &[Entity] {
        &self.pending
    }

    /// Logs the `QueryTempWarning` condition: pending entities exist and a query was built
    /// without opting into `force_merge` or explicitly ignoring the warning.
    pub(crate) fn warn_pending_visibility(&self) {
        let ids: Vec<i64> = self
            .pending
            .iter()
            .take(10)
            .map(|e| e.id().raw())
            .collect();
        tracing::warn!(
            pending_count = self.pending.len(),
            first_pending = ?ids,
            "query built without force_merge while pending entities exist; they will not be visible"
        );
    }

    // -- lookup -----------------------------------------------------------------------------

    pub fn live_entities(&self) -> &[Entity] {
        &self.live
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        let idx = *self.id_to_index.get(&id)?;
        Some(&self.live[idx])
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        let idx = *self.id_to_index.get(&id)?;
        Some(&mut self.live[idx])
    }

    /// As [`EntityRegistry::get_mut`], but also finds entities still in the pending vector.
    ///
    /// `get`/`get_mut` deliberately mirror the id→entity map's contract (live only); this
    /// exists because mutations -- add/remove component, enable/disable tag -- operate on an
    /// entity regardless of pending/live state (see SPEC_FULL.md 4.5).
    pub fn get_mut_any(&mut self, id: EntityId) -> Option<&mut Entity> {
        if let Some(&idx) = self.id_to_index.get(&id) {
            return Some(&mut self.live[idx]);
        }
        self.pending.iter_mut().find(|e| e.id() == id)
    }

    /// Logs and panics if `id` does not resolve to a live entity.
    pub fn get_enforce(&self, id: EntityId) -> &Entity {
        self.get(id).unwrap_or_else(|| {
            tracing::error!(entity = ?id, "get_enforce: entity does not exist");
            panic!("EcsError::StaleEntity: {id:?} does not exist");
        })
    }

    /// Borrows an entity and the store simultaneously -- the shape system dispatch needs to
    /// fetch components while iterating. Finds pending entities too, same rationale as
    /// [`EntityRegistry::get_mut_any`].
    pub fn entity_and_store_mut(&mut self, id: EntityId) -> Option<(&mut Entity, &mut ComponentStore)> {
        if let Some(&idx) = self.id_to_index.get(&id) {
            return Some((&mut self.live[idx], &mut self.store));
        }
        let entity = self.pending.iter_mut().find(|e| e.id() == id)?;
        Some((entity, &mut self.store))
    }

    pub fn store(&self) -> &ComponentStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ComponentStore {
        &mut self.store
    }

    // -- handles ----------------------------------------------------------------------------

    /// Returns `entity_id`'s current handle, or [`EntityHandle::INVALID`] if it has no slot
    /// (not yet merged) or does not exist.
    pub fn handle_for(&self, entity_id: EntityId) -> EntityHandle {
        match self.get(entity_id) {
            Some(entity) if entity.has_slot() => self.handles.handle_for_slot(entity.slot()),
            _ => EntityHandle::INVALID,
        }
    }

    /// Resolves a handle to a live entity id.
    pub fn resolve(&self, handle: EntityHandle) -> Option<EntityId> {
        self.handles.resolve(handle)
    }

    // -- singletons -------------------------------------------------------------------------

    /// Registers `entity_id` as the singleton owner of `T`. A prior registration is
    /// overwritten with a warning.
    pub fn register_singleton<T: 'static>(&mut self, entity_id: EntityId) {
        let cid = component_type_id::<T>();
        if let Some(prev) = self.singletons.insert(cid, entity_id) {
            if prev != entity_id {
                tracing::warn!(
                    component = std::any::type_name::<T>(),
                    previous = ?prev,
                    new = ?entity_id,
                    "singleton re-registered, overwriting previous owner"
                );
            }
        }
    }

    pub fn has_singleton<T: 'static>(&self) -> bool {
        self.singletons.contains_key(&component_type_id::<T>())
    }

    /// Returns the registered singleton entity for `T`, or a dummy (componentless,
    /// tagless) entity if nothing was registered. The dummy reports `has::<T>() == false`.
    pub fn get_singleton_entity<T: 'static>(&self) -> &Entity {
        let cid = component_type_id::<T>();
        match self.singletons.get(&cid).and_then(|id| self.get(*id)) {
            Some(entity) => entity,
            None => &self.dummy,
        }
    }

    /// Convenience accessor for `get_singleton_entity::<T>(..).try_get::<T>(store)`.
    pub fn get_singleton_component<T: 'static + std::fmt::Debug>(&self) -> Option<&T> {
        self.get_singleton_entity::<T>().try_get::<T>(&self.store)
    }

    // -- cleanup ----------------------------------------------------------------------------

    pub fn mark_for_cleanup(&mut self, id: EntityId) {
        if let Some(entity) = self.get_mut(id) {
            entity.mark_for_cleanup();
        } else if let Some(entity) = self.pending.iter_mut().find(|e| e.id() == id) {
            entity.mark_for_cleanup();
        }
    }

    fn destroy_live_at(&mut self, index: usize) {
        let entity = self.live.swap_remove(index);
        self.id_to_index.remove(&entity.id());
        if index < self.live.len() {
            // The entity that used to be last is now at `index`.
            self.id_to_index.insert(self.live[index].id(), index);
        }
        self.store.remove_all_for(entity.components(), entity.id());
        if entity.has_slot() {
            self.handles.invalidate(entity.slot());
        }
    }

    /// Destroys every entity whose `cleanup` flag is set. Safe to call with nothing marked.
    pub fn cleanup(&mut self) {
        let mut i = 0;
        while i < self.live.len() {
            if self.live[i].is_marked_for_cleanup() {
                self.destroy_live_at(i);
                // Do not advance `i`: the swapped-in entity (if any) must also be checked.
            } else {
                i += 1;
            }
        }
        for entity in self.pending.iter().filter(|e| e.is_marked_for_cleanup()) {
            self.store.remove_all_for(entity.components(), entity.id());
        }
        self.pending.retain(|e| !e.is_marked_for_cleanup());
    }

    /// Destroys every entity (or every non-permanent entity), live and pending.
    pub fn delete_all(&mut self, include_permanent: bool) {
        let mut i = 0;
        while i < self.live.len() {
            if include_permanent || !self.live[i].is_permanent() {
                self.destroy_live_at(i);
            } else {
                i += 1;
            }
        }
        if include_permanent {
            for entity in self.pending.iter() {
                self.store.remove_all_for(entity.components(), entity.id());
            }
            self.pending.clear();
        } else {
            for entity in self.pending.iter().filter(|e| !e.is_permanent()) {
                self.store.remove_all_for(entity.components(), entity.id());
            }
            self.pending.retain(|e| e.is_permanent());
        }
        self.singletons.retain(|_, id| self.id_to_index.contains_key(id));
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Transform {
        x: i32,
    }

    #[test]
    fn create_is_invisible_until_merge() {
        let mut reg = EntityRegistry::new();
        let id = reg.create();
        assert!(reg.get(id).is_none());
        reg.merge_pending();
        assert!(reg.get(id).is_some());
    }

    #[test]
    fn merge_pending_is_idempotent() {
        let mut reg = EntityRegistry::new();
        reg.create();
        reg.merge_pending();
        let count_before = reg.len();
        reg.merge_pending();
        assert_eq!(reg.len(), count_before);
    }

    #[test]
    fn cleanup_removes_marked_entities_only() {
        let mut reg = EntityRegistry::new();
        let a = reg.create();
        let b = reg.create();
        reg.merge_pending();
        reg.mark_for_cleanup(a);
        reg.cleanup();
        assert!(reg.get(a).is_none());
        assert!(reg.get(b).is_some());
    }

    #[test]
    fn cleanup_on_never_merged_entity() {
        let mut reg = EntityRegistry::new();
        let a = reg.create();
        {
            let (entity, store) = reg.entity_and_store_mut(a).unwrap();
            entity.add_component(store, Transform { x: 7 });
        }
        reg.mark_for_cleanup(a);
        reg.cleanup();
        assert_eq!(reg.pending_len(), 0);
        assert_eq!(reg.store().len_of::<Transform>(), 0);
    }

    #[test]
    fn handle_resolves_until_cleanup() {
        let mut reg = EntityRegistry::new();
        let a = reg.create();
        reg.merge_pending();
        let handle = reg.handle_for(a);
        assert_eq!(reg.resolve(handle), Some(a));
        reg.mark_for_cleanup(a);
        reg.cleanup();
        assert_eq!(reg.resolve(handle), None);
    }

    #[test]
    fn stale_handle_gets_fresh_generation_on_reuse() {
        let mut reg = EntityRegistry::new();
        let a = reg.create();
        reg.merge_pending();
        let h1 = reg.handle_for(a);
        reg.mark_for_cleanup(a);
        reg.cleanup();

        let b = reg.create();
        reg.merge_pending();
        let h2 = reg.handle_for(b);

        if h1.slot() == h2.slot() {
            assert_ne!(h1.generation(), h2.generation());
        }
        assert_eq!(reg.resolve(h1), None);
        assert_eq!(reg.resolve(h2), Some(b));
    }

    #[test]
    fn singleton_round_trip() {
        let mut reg = EntityRegistry::new();
        assert!(!reg.has_singleton::<Transform>());
        let dummy = reg.get_singleton_entity::<Transform>();
        assert!(!dummy.has::<Transform>());

        let a = reg.create();
        reg.merge_pending();
        {
            let (entity, store) = reg.entity_and_store_mut(a).unwrap();
            entity.add_component(store, Transform { x: 1 });
        }
        reg.register_singleton::<Transform>(a);
        assert!(reg.has_singleton::<Transform>());
        assert_eq!(reg.get_singleton_component::<Transform>(), Some(&Transform { x: 1 }));
    }

    #[test]
    fn delete_all_respects_permanent_flag() {
        let mut reg = EntityRegistry::new();
        let perm = reg.create_permanent();
        let temp = reg.create();
        reg.merge_pending();
        reg.delete_all(false);
        assert!(reg.get(perm).is_some());
        assert!(reg.get(temp).is_none());
        reg.delete_all(true);
        assert!(reg.get(perm).is_none());
    }

    #[test]
    fn mutations_work_on_pending_entities_before_merge() {
        let mut reg = EntityRegistry::new();
        let a = reg.create();
        assert!(reg.get(a).is_none(), "still pending");

        reg.get_mut_any(a).unwrap().enable_tag(3);
        {
            let (entity, store) = reg.entity_and_store_mut(a).unwrap();
            entity.add_component(store, Transform { x: 7 });
        }

        reg.merge_pending();
        let merged = reg.get(a).unwrap();
        assert!(merged.has_tag(3));
        assert_eq!(merged.get::<Transform>(reg.store()), &Transform { x: 7 });
    }
}

//! Type-erased container owning one [`ComponentPool`] per component type.

use crate::component::{component_type_id, ComponentTypeId, MAX_COMPONENTS};
use crate::entity::EntityId;
use crate::pool::{AnyPool, ComponentPool, RemovalPolicy};

/// Owns every [`ComponentPool`] in a registry, indexed by [`ComponentTypeId`].
#[derive(Debug)]
pub struct ComponentStore {
    pools: Vec<Option<Box<dyn AnyPool>>>,
    policy: RemovalPolicy,
}

impl ComponentStore {
    pub fn new(policy: RemovalPolicy) -> Self {
        ComponentStore {
            pools: (0..MAX_COMPONENTS).map(|_| None).collect(),
            policy,
        }
    }

    fn pool_for<T: 'static + std::fmt::Debug>(&mut self) -> &mut ComponentPool<T> {
        let id = component_type_id::<T>();
        let slot = &mut self.pools[id.index()];
        let policy = self.policy;
        slot.get_or_insert_with(|| Box::new(ComponentPool::<T>::new(policy)))
            .as_any_mut()
            .downcast_mut::<ComponentPool<T>>()
            .expect("component pool type mismatch -- ComponentTypeId collision")
    }

    /// Obtains the pool for `T`, creating it on first use. Prefer [`ComponentStore::pool`] /
    /// [`ComponentStore::pool_mut`] for the common read/write cases.
    pub fn pool_mut<T: 'static + std::fmt::Debug>(&mut self) -> &mut ComponentPool<T> {
        self.pool_for::<T>()
    }

    /// Read-only pool access. Returns an empty, policy-default pool view if `T` was never
    /// used -- callers never see a missing-pool error, since a pool with no entries behaves
    /// identically to one that was never created.
    pub fn pool<T: 'static + std::fmt::Debug>(&self) -> PoolRef<'_, T> {
        let id = component_type_id::<T>();
        match self.pools[id.index()].as_ref() {
            Some(boxed) => PoolRef::Existing(
                boxed
                    .as_any()
                    .downcast_ref::<ComponentPool<T>>()
                    .expect("component pool type mismatch -- ComponentTypeId collision"),
            ),
            None => PoolRef::Empty,
        }
    }

    /// Used during entity cleanup: drops `id`'s component from every pool it is marked
    /// present in, given the entity's component mask.
    pub fn remove_all_for(&mut self, mask: crate::component::ComponentMask, id: EntityId) {
        for cid in mask.iter() {
            self.remove_by_id(cid, id);
        }
    }

    /// Forwards to the pool for `cid`, if it has ever been created.
    pub fn remove_by_id(&mut self, cid: ComponentTypeId, id: EntityId) {
        if let Some(pool) = self.pools[cid.index()].as_mut() {
            pool.remove_any(id);
        }
    }

    /// Clears every pool, dropping all components.
    pub fn clear_all(&mut self) {
        for pool in self.pools.iter_mut().flatten() {
            pool.clear_any();
        }
    }

    /// Flushes end-of-frame tombstones in every pool (no-op for swap-remove pools).
    pub fn flush_end_of_frame(&mut self) {
        for pool in self.pools.iter_mut().flatten() {
            pool.flush_end_of_frame_any();
        }
    }

    /// Number of live components of type `T`, `0` if the pool was never created.
    pub fn len_of<T: 'static + std::fmt::Debug>(&self) -> usize {
        let id = component_type_id::<T>();
        self.pools[id.index()]
            .as_ref()
            .map(|p| p.len_any())
            .unwrap_or(0)
    }
}

/// A read-only handle to a possibly-not-yet-created pool.
///
/// Exists so [`ComponentStore::pool`] can stay `&self` (no lazy creation on read) while
/// still presenting a uniform `has`/`get`/`try_get` surface.
pub enum PoolRef<'a, T> {
    Existing(&'a ComponentPool<T>),
    Empty,
}

impl<'a, T> PoolRef<'a, T> {
    pub fn has(&self, id: EntityId) -> bool {
        match self {
            PoolRef::Existing(pool) => pool.has(id),
            PoolRef::Empty => false,
        }
    }

    pub fn try_get(&self, id: EntityId) -> Option<&'a T> {
        match self {
            PoolRef::Existing(pool) => pool.try_get(id),
            PoolRef::Empty => None,
        }
    }

    pub fn get(&self, id: EntityId) -> &'a T {
        self.try_get(id)
            .unwrap_or_else(|| panic!("ComponentStore::pool::get: entity {id:?} has no component"))
    }
}

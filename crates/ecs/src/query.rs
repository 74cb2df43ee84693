//! The composable, short-circuiting query engine.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;

use crate::component::component_type_id;
use crate::entity::{Entity, EntityId, TagId, TagMask};
use crate::handle::EntityHandle;
use crate::registry::EntityRegistry;

/// Options controlling how a [`Query`] is built, passed to
/// [`EntityRegistry::query_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    /// Merge pending entities into the live set before building the query, so entities
    /// created earlier this frame are immediately visible.
    pub force_merge: bool,
    /// Suppress the `QueryTempWarning` log when pending entities exist and `force_merge` is
    /// false.
    pub ignore_temp_warning: bool,
}

impl EntityRegistry {
    /// Builds a query over the live set with default options (no merge, warns if pending
    /// entities exist).
    pub fn query(&self) -> Query<'_> {
        if !self.pending_entities().is_empty() {
            self.warn_pending_visibility();
        }
        Query::new(self)
    }

    /// Builds a query with explicit [`QueryOptions`]; may merge pending entities first.
    pub fn query_with(&mut self, opts: QueryOptions) -> Query<'_> {
        if opts.force_merge {
            self.merge_pending();
        } else if !opts.ignore_temp_warning && !self.pending_entities().is_empty() {
            self.warn_pending_visibility();
        }
        Query::new(self)
    }
}

type Predicate<'a> = Box<dyn Fn(&Entity) -> bool + 'a>;
type Comparator<'a> = Box<dyn Fn(&Entity, &Entity) -> Ordering + 'a>;

/// A lazy, composable filter pipeline over an [`EntityRegistry`]'s live entity set.
///
/// Filters registered via the `where_*` methods are applied, in registration order, as a
/// short-circuited `AND` -- see the terminal operations for which ones stop at the first
/// match and which must visit every entity.
pub struct Query<'a> {
    registry: &'a EntityRegistry,
    filters: Vec<Predicate<'a>>,
    order_by: Option<Comparator<'a>>,
    cache: RefCell<Option<Vec<EntityId>>>,
}

impl<'a> Query<'a> {
    fn new(registry: &'a EntityRegistry) -> Self {
        Query {
            registry,
            filters: Vec::new(),
            order_by: None,
            cache: RefCell::new(None),
        }
    }

    fn push(mut self, pred: impl Fn(&Entity) -> bool + 'a) -> Self {
        self.filters.push(Box::new(pred));
        self
    }

    // -- filters --------------------------------------------------------------------------

    pub fn where_id(self, id: EntityId) -> Self {
        self.push(move |e| e.id() == id)
    }

    pub fn where_not_id(self, id: EntityId) -> Self {
        self.push(move |e| e.id() != id)
    }

    pub fn where_has_component<T: 'static>(self) -> Self {
        self.push(|e| e.has::<T>())
    }

    pub fn where_missing_component<T: 'static>(self) -> Self {
        self.push(|e| !e.has::<T>())
    }

    pub fn where_marked_for_cleanup(self) -> Self {
        self.push(|e| e.is_marked_for_cleanup())
    }

    pub fn where_not_marked_for_cleanup(self) -> Self {
        self.push(|e| !e.is_marked_for_cleanup())
    }

    pub fn where_has_tag(self, tag: TagId) -> Self {
        self.push(move |e| e.has_tag(tag))
    }

    pub fn where_has_all_tags(self, mask: TagMask) -> Self {
        self.push(move |e| e.has_all_tags(mask))
    }

    pub fn where_has_any_tag(self, mask: TagMask) -> Self {
        self.push(move |e| e.has_any_tag(mask))
    }

    pub fn where_has_no_tags(self, mask: TagMask) -> Self {
        self.push(move |e| e.has_no_tags(mask))
    }

    /// An arbitrary caller-supplied predicate.
    pub fn where_fn(self, predicate: impl Fn(&Entity) -> bool + 'a) -> Self {
        self.push(predicate)
    }

    /// Accepts at most `n` entities; later candidates are rejected once the cap is reached.
    pub fn take(self, n: usize) -> Self {
        let accepted = Cell::new(0usize);
        self.push(move |_e| {
            if accepted.get() < n {
                accepted.set(accepted.get() + 1);
                true
            } else {
                false
            }
        })
    }

    /// Shorthand for `take(1)`.
    pub fn first(self) -> Self {
        self.take(1)
    }

    /// Attaches a sort comparator. At most one may be attached; a second call logs
    /// `RedundantOrderBy` and is ignored.
    pub fn order_by(mut self, cmp: impl Fn(&Entity, &Entity) -> Ordering + 'a) -> Self {
        if self.order_by.is_some() {
            tracing::warn!("order_by called twice on the same query, ignoring second call");
            return self;
        }
        self.order_by = Some(Box::new(cmp));
        self
    }

    // -- internals --------------------------------------------------------------------------

    fn passes(&self, entity: &Entity) -> bool {
        self.filters.iter().all(|f| f(entity))
    }

    fn compute_all(&self) -> Vec<EntityId> {
        if let Some(cached) = self.cache.borrow().as_ref() {
            return cached.clone();
        }
        let mut matched: Vec<&Entity> = self
            .registry
            .live_entities()
            .iter()
            .filter(|e| self.passes(e))
            .collect();
        if let Some(cmp) = &self.order_by {
            matched.sort_by(|a, b| cmp(a, b));
        }
        let ids: Vec<EntityId> = matched.iter().map(|e| e.id()).collect();
        *self.cache.borrow_mut() = Some(ids.clone());
        ids
    }

    // -- terminal operations ------------------------------------------------------------

    /// Runs the full pipeline, caching the result for subsequent calls on this query.
    pub fn gen(&self) -> Vec<&'a Entity> {
        self.compute_all()
            .into_iter()
            .filter_map(|id| self.registry.get(id))
            .collect()
    }

    /// Returns the first match, short-circuiting iff no ordering is attached.
    pub fn gen_first(&self) -> Option<&'a Entity> {
        if let Some(cached) = self.cache.borrow().as_ref() {
            return cached.first().and_then(|id| self.registry.get(*id));
        }
        if self.order_by.is_some() {
            let ids = self.compute_all();
            return ids.first().and_then(|id| self.registry.get(*id));
        }
        self.registry
            .live_entities()
            .iter()
            .find(|e| self.passes(e))
    }

    /// As [`Query::gen_first`] but logs and panics if there is no match.
    pub fn gen_first_enforce(&self) -> &'a Entity {
        self.gen_first().unwrap_or_else(|| {
            tracing::error!("gen_first_enforce: query produced no matches");
            panic!("gen_first_enforce: query produced no matches");
        })
    }

    /// Short-circuits identically to [`Query::gen_first`].
    pub fn has_values(&self) -> bool {
        self.gen_first().is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_values()
    }

    pub fn gen_count(&self) -> usize {
        self.compute_all().len()
    }

    pub fn gen_ids(&self) -> Vec<EntityId> {
        self.compute_all()
    }

    pub fn gen_handles(&self) -> Vec<EntityHandle> {
        self.compute_all()
            .into_iter()
            .map(|id| self.registry.handle_for(id))
            .collect()
    }

    pub fn gen_first_handle(&self) -> Option<EntityHandle> {
        self.gen_first().map(|e| self.registry.handle_for(e.id()))
    }

    /// Uniform-at-random pick among matches, using `rand::thread_rng()`.
    pub fn gen_random(&self) -> Option<&'a Entity> {
        self.gen_random_with(&mut rand::thread_rng())
    }

    /// As [`Query::gen_random`] but with a caller-supplied RNG (useful for deterministic
    /// tests -- see `rand_pcg::Pcg32`).
    pub fn gen_random_with(&self, rng: &mut impl rand::Rng) -> Option<&'a Entity> {
        let ids = self.compute_all();
        if ids.is_empty() {
            return None;
        }
        let idx = rng.gen_range(0..ids.len());
        self.registry.get(ids[idx])
    }

    /// Projects each match to its `C` component. Panics on any match lacking `C` -- pair
    /// with [`Query::where_has_component`].
    pub fn gen_as<C: 'static + std::fmt::Debug>(&self) -> Vec<&'a C> {
        let _ = component_type_id::<C>();
        self.compute_all()
            .into_iter()
            .map(|id| self.registry.get_enforce(id).get::<C>(self.registry.store()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Transform {
        x: i32,
    }

    fn runner_chaser_store_tags() -> (TagId, TagId) {
        (0, 1)
    }

    #[test]
    fn empty_world_queries_short_circuit_empty() {
        let reg = EntityRegistry::new();
        let q = reg.query();
        assert!(!q.has_values());
        assert!(q.is_empty());
        assert_eq!(q.gen_first(), None);
        assert_eq!(q.gen_count(), 0);
    }

    #[test]
    fn pending_invisible_until_force_merge() {
        let mut reg = EntityRegistry::new();
        reg.create();
        assert_eq!(reg.query().gen_count(), 0);
        let q = reg.query_with(QueryOptions {
            force_merge: true,
            ..Default::default()
        });
        assert_eq!(q.gen_count(), 1);
    }

    #[test]
    fn tag_filters_match_spec_scenario() {
        let (runner, store) = runner_chaser_store_tags();
        let chaser = 2;
        let mut reg = EntityRegistry::new();
        let a = reg.create();
        let b = reg.create();
        let c = reg.create();
        reg.merge_pending();
        reg.get_mut(a).unwrap().enable_tag(runner);
        reg.get_mut(b).unwrap().enable_tag(runner);
        reg.get_mut(b).unwrap().enable_tag(store);
        reg.get_mut(c).unwrap().enable_tag(chaser);

        let any_runner = reg.query().where_has_any_tag(TagMask::single(runner));
        assert_eq!(any_runner.gen_count(), 2);

        let no_store = reg.query().where_has_no_tags(TagMask::single(store));
        assert_eq!(no_store.gen_count(), 2);

        let runner_not_store = reg
            .query()
            .where_has_tag(runner)
            .where_has_no_tags(TagMask::single(store));
        let ids = runner_not_store.gen_ids();
        assert_eq!(ids, vec![a]);
    }

    #[test]
    fn short_circuit_invokes_predicate_k_plus_one_times() {
        let mut reg = EntityRegistry::new();
        let a = reg.create();
        let _b = reg.create();
        let _c = reg.create();
        reg.merge_pending();

        let counter = Cell::new(0usize);
        let q = reg.query().where_fn(|e| {
            counter.set(counter.get() + 1);
            e.id() == a
        });
        let first = q.gen_first();
        assert_eq!(first.map(|e| e.id()), Some(a));
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn query_idempotence() {
        let mut reg = EntityRegistry::new();
        reg.create();
        reg.create();
        reg.merge_pending();
        let q = reg.query();
        assert_eq!(q.gen().len(), q.gen().len());
    }

    #[test]
    fn take_limits_results() {
        let mut reg = EntityRegistry::new();
        for _ in 0..5 {
            reg.create();
        }
        reg.merge_pending();
        let q = reg.query().take(2);
        assert_eq!(q.gen_count(), 2);
    }

    #[test]
    fn gen_random_with_seeded_rng_is_reproducible() {
        use rand::SeedableRng;
        use rand_pcg::Pcg32;

        let mut reg = EntityRegistry::new();
        for _ in 0..8 {
            reg.create();
        }
        reg.merge_pending();
        let q = reg.query();

        let mut rng_a = Pcg32::seed_from_u64(42);
        let picked_a = q.gen_random_with(&mut rng_a).map(|e| e.id());

        let mut rng_b = Pcg32::seed_from_u64(42);
        let picked_b = q.gen_random_with(&mut rng_b).map(|e| e.id());

        assert_eq!(picked_a, picked_b);
        assert!(picked_a.is_some());
    }

    #[test]
    fn order_by_second_call_ignored() {
        let mut reg = EntityRegistry::new();
        let a = reg.create();
        let b = reg.create();
        reg.merge_pending();
        {
            let (entity, store) = reg.entity_and_store_mut(a).unwrap();
            entity.add_component(store, Transform { x: 5 });
        }
        {
            let (entity, store) = reg.entity_and_store_mut(b).unwrap();
            entity.add_component(store, Transform { x: 1 });
        }
        let q = reg
            .query()
            .order_by(|x, y| x.id().raw().cmp(&y.id().raw()))
            .order_by(|x, y| y.id().raw().cmp(&x.id().raw()));
        let ids = q.gen_ids();
        assert_eq!(ids, vec![a, b], "second order_by should be ignored");
    }
}

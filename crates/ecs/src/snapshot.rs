//! Pointer-free, handle-addressed snapshots of entity and component state.
//!
//! A snapshot never stores `&Entity`/`&mut ComponentStore` references or anything built on
//! top of them -- only [`EntityHandle`]s, which remain meaningful (or cleanly fail to
//! resolve) long after the registry that produced the snapshot has moved on. This module is
//! read-only: it produces records for inspection, diffing, or hand-rolled persistence by the
//! caller; it does not itself define a serialized wire format.

use crate::entity::{EntityId, TagMask};
use crate::handle::EntityHandle;
use crate::registry::EntityRegistry;

/// Marker for component types that may appear in a snapshot.
///
/// The original engine rejected pointer-like component types (raw pointers, `unique_ptr`,
/// `shared_ptr`, `reference_wrapper`) at compile time via a type-level trait. Rust's safe
/// subset already has no raw pointers, so the remaining risk is smart-pointer component
/// types (`Rc`, `Arc`, `Box`) whose snapshotted value would silently alias live state.
/// Rather than try to recursively forbid those through blanket impls -- which stable Rust
/// can't express without specialization -- `SnapshotSafe` has **no blanket implementation**.
/// Each component type must opt in explicitly:
///
/// ```ignore
/// #[derive(Clone, Debug)]
/// struct Transform { x: f32, y: f32 }
/// impl SnapshotSafe for Transform {}
/// ```
///
/// Implementing it for a type that wraps `Rc`/`Arc`/`Box` is possible but is now a visible,
/// deliberate choice at the impl site instead of something the compiler catches.
pub trait SnapshotSafe: Clone + std::fmt::Debug + 'static {}

/// Controls whether [`take`]/[`take_entities`] merge pending entities before reading.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotOptions {
    pub force_merge: bool,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        SnapshotOptions { force_merge: true }
    }
}

/// A pointer-free record of one entity's identity and bookkeeping state.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub handle: EntityHandle,
    pub entity_type: i32,
    pub tags: TagMask,
    pub cleanup: bool,
}

/// A pointer-free record pairing an entity handle with a copy of one of its components.
#[derive(Debug, Clone)]
pub struct ComponentRecord<T: SnapshotSafe> {
    pub entity: EntityHandle,
    pub value: T,
}

/// A full snapshot: every live entity's identity record, plus a copy of every `T` component
/// present on them.
#[derive(Debug, Clone)]
pub struct Snapshot<T: SnapshotSafe> {
    pub entities: Vec<EntityRecord>,
    pub components: Vec<ComponentRecord<T>>,
}

fn collect_entity_records(registry: &EntityRegistry) -> Vec<EntityRecord> {
    registry
        .live_entities()
        .iter()
        .filter_map(|e| {
            let handle = registry.handle_for(e.id());
            if !handle.is_valid() {
                return None;
            }
            Some(EntityRecord {
                handle,
                entity_type: e.entity_type(),
                tags: e.tags(),
                cleanup: e.is_marked_for_cleanup(),
            })
        })
        .collect()
}

/// Snapshots entity identity/bookkeeping only, with no component data.
pub fn take_entities(registry: &mut EntityRegistry, opts: SnapshotOptions) -> Vec<EntityRecord> {
    if opts.force_merge {
        registry.merge_pending();
    }
    collect_entity_records(registry)
}

/// Snapshots entity records plus every live `T` component, each tagged with the owning
/// entity's handle.
pub fn take<T: SnapshotSafe + std::fmt::Debug>(
    registry: &mut EntityRegistry,
    opts: SnapshotOptions,
) -> Snapshot<T> {
    if opts.force_merge {
        registry.merge_pending();
    }
    let registry: &EntityRegistry = registry;
    let entities = collect_entity_records(registry);
    let mut components = Vec::new();
    for e in registry.live_entities() {
        let Some(value) = e.try_get::<T>(registry.store()) else {
            continue;
        };
        let handle = registry.handle_for(e.id());
        if !handle.is_valid() {
            continue;
        }
        components.push(ComponentRecord {
            entity: handle,
            value: value.clone(),
        });
    }
    Snapshot {
        entities,
        components,
    }
}

/// Resolves a [`ComponentRecord`]'s handle back to a live entity id, if it still exists.
pub fn resolve<T: SnapshotSafe>(
    registry: &EntityRegistry,
    record: &ComponentRecord<T>,
) -> Option<EntityId> {
    registry.resolve(record.entity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Transform {
        x: i32,
    }
    impl SnapshotSafe for Transform {}

    #[test]
    fn snapshot_contains_one_record_per_component() {
        let mut reg = EntityRegistry::new();
        let a = reg.create();
        let b = reg.create();
        reg.merge_pending();
        {
            let (entity, store) = reg.entity_and_store_mut(a).unwrap();
            entity.add_component(store, Transform { x: 1 });
        }
        let snap = take::<Transform>(&mut reg, SnapshotOptions::default());
        assert_eq!(snap.entities.len(), 2);
        assert_eq!(snap.components.len(), 1);
        assert_eq!(snap.components[0].value, Transform { x: 1 });
        let _ = b;
    }

    #[test]
    fn force_merge_makes_pending_entities_visible() {
        let mut reg = EntityRegistry::new();
        reg.create();
        let snap = take_entities(&mut reg, SnapshotOptions { force_merge: true });
        assert_eq!(snap.len(), 1);
    }

    #[test]
    fn no_merge_hides_pending_entities() {
        let mut reg = EntityRegistry::new();
        reg.create();
        let snap = take_entities(&mut reg, SnapshotOptions { force_merge: false });
        assert_eq!(snap.len(), 0);
    }

    #[test]
    fn handle_in_record_resolves_back_to_entity() {
        let mut reg = EntityRegistry::new();
        let a = reg.create();
        reg.merge_pending();
        {
            let (entity, store) = reg.entity_and_store_mut(a).unwrap();
            entity.add_component(store, Transform { x: 9 });
        }
        let snap = take::<Transform>(&mut reg, SnapshotOptions::default());
        let record = &snap.components[0];
        assert_eq!(resolve(&reg, record), Some(a));
    }

    #[test]
    fn stale_handle_no_longer_resolves_after_cleanup() {
        let mut reg = EntityRegistry::new();
        let a = reg.create();
        reg.merge_pending();
        {
            let (entity, store) = reg.entity_and_store_mut(a).unwrap();
            entity.add_component(store, Transform { x: 9 });
        }
        let snap = take::<Transform>(&mut reg, SnapshotOptions::default());
        let record = snap.components[0].clone();
        reg.mark_for_cleanup(a);
        reg.cleanup();
        assert_eq!(resolve(&reg, &record), None);
    }
}

//! A sparse-set entity-component-system core.
//!
//! Entities are identified two ways: a never-recycled [`entity::EntityId`] for stable
//! bookkeeping, and a generational [`handle::EntityHandle`] for weak references that must
//! fail cleanly once the entity they pointed to is gone. Components live in per-type
//! [`pool::ComponentPool`]s inside a [`store::ComponentStore`] -- there is no archetype
//! table and no inheritance hierarchy; type erasure is done with `dyn Any` downcasting
//! instead. [`registry::EntityRegistry`] ties all of this together: entity lifecycle,
//! component access, tags, handles, singletons, and deferred cleanup. [`query::Query`]
//! builds short-circuiting filter pipelines over the registry's live set, and
//! [`system::Scheduler`] drives fixed-update, update, and render system buckets once per
//! frame.

pub mod component;
pub mod entity;
pub mod handle;
pub mod pool;
pub mod query;
pub mod registry;
pub mod snapshot;
pub mod store;
pub mod system;

use entity::EntityId;
use handle::EntityHandle;

/// Errors surfaced by the handful of APIs that return `Result` rather than panicking or
/// logging and substituting a fallback value.
///
/// Most of this crate's invariant violations are not recoverable at the call site --
/// [`component::component_type_id`] aborts the process past [`component::MAX_COMPONENTS`]
/// distinct types, and [`entity::Entity::get`]/[`registry::EntityRegistry::get_enforce`]
/// panic on a missing component or a dead entity, since both conditions indicate a caller
/// bug rather than recoverable state. `EcsError` exists for the narrower cases --
/// resolving a possibly-stale [`EntityId`] or [`EntityHandle`] -- where "not found" is an
/// expected, recoverable outcome (an entity a network message referenced may have been
/// cleaned up by the time the message is processed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    #[error("entity {0:?} does not exist")]
    StaleEntity(EntityId),
    #[error("handle {0:?} no longer resolves to a live entity")]
    DanglingHandle(EntityHandle),
}

impl registry::EntityRegistry {
    /// As [`registry::EntityRegistry::get`], but returns [`EcsError::StaleEntity`] instead
    /// of `None`.
    pub fn try_get(&self, id: EntityId) -> Result<&entity::Entity, EcsError> {
        self.get(id).ok_or(EcsError::StaleEntity(id))
    }

    /// As [`registry::EntityRegistry::resolve`], but returns [`EcsError::DanglingHandle`]
    /// instead of `None`.
    pub fn try_resolve(&self, handle: EntityHandle) -> Result<EntityId, EcsError> {
        self.resolve(handle).ok_or(EcsError::DanglingHandle(handle))
    }
}

/// Re-exports the types most call sites need.
pub mod prelude {
    pub use crate::component::{component_type_id, ComponentMask, ComponentTypeId, ComponentVariant};
    pub use crate::entity::{Entity, EntityId, TagId, TagMask, MAX_TAGS};
    pub use crate::handle::EntityHandle;
    pub use crate::pool::RemovalPolicy;
    pub use crate::query::{Query, QueryOptions};
    pub use crate::registry::{EntityRegistry, RegistryConfig};
    pub use crate::snapshot::{take, take_entities, ComponentRecord, EntityRecord, Snapshot, SnapshotOptions, SnapshotSafe};
    pub use crate::store::ComponentStore;
    pub use crate::system::{CallbackSystem, RenderSystem, Scheduler, SchedulerConfig, System, TagFilter};
    pub use crate::EcsError;
}

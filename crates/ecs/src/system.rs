//! The frame scheduler: fixed-update, update, and render system buckets.

use crate::entity::{Entity, EntityId, TagMask};
use crate::registry::EntityRegistry;

/// Tag requirements a system imposes on top of its component requirements.
///
/// Evaluated unconditionally for every system (earlier revisions of this scheduler only
/// checked tags on non-Apple targets; that split was a mistake and every platform now gets
/// the same filtering).
#[derive(Debug, Clone, Copy, Default)]
pub struct TagFilter {
    pub all: TagMask,
    pub any: TagMask,
    pub none: TagMask,
}

impl TagFilter {
    pub fn all(mask: TagMask) -> Self {
        TagFilter {
            all: mask,
            ..Default::default()
        }
    }

    pub fn any(mask: TagMask) -> Self {
        TagFilter {
            any: mask,
            ..Default::default()
        }
    }

    pub fn none(mask: TagMask) -> Self {
        TagFilter {
            none: mask,
            ..Default::default()
        }
    }

    pub fn matches(&self, tags: TagMask) -> bool {
        if self.all.any() && !tags.contains_all(self.all) {
            return false;
        }
        if self.any.any() && !tags.intersects(self.any) {
            return false;
        }
        if self.none.any() && !tags.disjoint(self.none) {
            return false;
        }
        true
    }
}

/// A system that may mutate entities and components, run in the `update` or
/// `fixed_update` bucket.
pub trait System {
    /// Gate for the whole system this frame/tick. Skips `once`, every `run_for_entity`
    /// call, and `after` when false.
    fn should_run(&self, _dt: f32) -> bool {
        true
    }

    /// Runs once before entity iteration.
    fn once(&mut self, _registry: &mut EntityRegistry, _dt: f32) {}

    /// Runs once after entity iteration.
    fn after(&mut self, _registry: &mut EntityRegistry, _dt: f32) {}

    fn tag_filter(&self) -> TagFilter {
        TagFilter::default()
    }

    /// Component-presence (or other entity-level) gate, checked per candidate in addition
    /// to `tag_filter`.
    fn matches(&self, entity: &Entity) -> bool;

    fn run_for_entity(&mut self, entity_id: EntityId, registry: &mut EntityRegistry, dt: f32);
}

/// A read-only counterpart to [`System`], run in the `render` bucket after cleanup.
pub trait RenderSystem {
    fn should_run(&self, _dt: f32) -> bool {
        true
    }

    fn once(&self, _registry: &EntityRegistry, _dt: f32) {}

    fn after(&self, _registry: &EntityRegistry, _dt: f32) {}

    fn tag_filter(&self) -> TagFilter {
        TagFilter::default()
    }

    fn matches(&self, entity: &Entity) -> bool;

    fn render_entity(&self, entity: &Entity, registry: &EntityRegistry, dt: f32);
}

/// A system that ignores entities entirely and only runs a closure once per frame --
/// useful for one-off bookkeeping that doesn't belong to any single entity.
pub struct CallbackSystem<F> {
    callback: F,
}

impl<F: FnMut(&mut EntityRegistry, f32)> CallbackSystem<F> {
    pub fn new(callback: F) -> Self {
        CallbackSystem { callback }
    }
}

impl<F: FnMut(&mut EntityRegistry, f32)> System for CallbackSystem<F> {
    fn once(&mut self, registry: &mut EntityRegistry, dt: f32) {
        (self.callback)(registry, dt);
    }

    fn matches(&self, _entity: &Entity) -> bool {
        false
    }

    fn run_for_entity(&mut self, _entity_id: EntityId, _registry: &mut EntityRegistry, _dt: f32) {}
}

fn run_update_bucket(systems: &mut [Box<dyn System>], registry: &mut EntityRegistry, dt: f32) {
    for system in systems.iter_mut() {
        if !system.should_run(dt) {
            continue;
        }
        system.once(registry, dt);
        let tag_filter = system.tag_filter();
        let ids: Vec<EntityId> = registry
            .live_entities()
            .iter()
            .filter(|e| tag_filter.matches(e.tags()) && system.matches(e))
            .map(|e| e.id())
            .collect();
        for id in ids {
            system.run_for_entity(id, registry, dt);
        }
        system.after(registry, dt);
        registry.merge_pending();
    }
}

fn run_render_bucket(systems: &[Box<dyn RenderSystem>], registry: &EntityRegistry, dt: f32) {
    for system in systems {
        if !system.should_run(dt) {
            continue;
        }
        system.once(registry, dt);
        let tag_filter = system.tag_filter();
        for entity in registry.live_entities() {
            if tag_filter.matches(entity.tags()) && system.matches(entity) {
                system.render_entity(entity, registry, dt);
            }
        }
        system.after(registry, dt);
    }
}

/// Fixed-tick accumulator knobs.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Seconds per fixed tick. Default `1/120`.
    pub fixed_step: f32,
    /// Caps how many fixed ticks run per `Scheduler::run` call, discarding any remaining
    /// accumulated time past the cap rather than spiraling -- the original accumulator had
    /// no such cap.
    pub max_ticks_per_frame: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            fixed_step: 1.0 / 120.0,
            max_ticks_per_frame: 8,
        }
    }
}

/// Owns the three system buckets and drives one frame's worth of simulation.
pub struct Scheduler {
    update_systems: Vec<Box<dyn System>>,
    fixed_update_systems: Vec<Box<dyn System>>,
    render_systems: Vec<Box<dyn RenderSystem>>,
    config: SchedulerConfig,
    accumulator: f32,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Scheduler {
            update_systems: Vec::new(),
            fixed_update_systems: Vec::new(),
            render_systems: Vec::new(),
            config,
            accumulator: 0.0,
        }
    }

    pub fn register_update(&mut self, system: Box<dyn System>) {
        self.update_systems.push(system);
    }

    pub fn register_fixed_update(&mut self, system: Box<dyn System>) {
        self.fixed_update_systems.push(system);
    }

    pub fn register_render(&mut self, system: Box<dyn RenderSystem>) {
        self.render_systems.push(system);
    }

    pub fn accumulator(&self) -> f32 {
        self.accumulator
    }

    fn fixed_tick_all(&mut self, registry: &mut EntityRegistry, dt: f32) {
        self.accumulator += dt;
        let mut ticks = 0;
        while self.accumulator >= self.config.fixed_step && ticks < self.config.max_ticks_per_frame
        {
            run_update_bucket(&mut self.fixed_update_systems, registry, self.config.fixed_step);
            self.accumulator -= self.config.fixed_step;
            ticks += 1;
        }
        if ticks == self.config.max_ticks_per_frame && self.accumulator >= self.config.fixed_step {
            tracing::warn!(
                dropped_seconds = self.accumulator,
                max_ticks_per_frame = self.config.max_ticks_per_frame,
                "fixed-tick cap reached, dropping remaining accumulated time"
            );
            self.accumulator = 0.0;
        }
    }

    /// Runs fixed-update ticks (possibly zero or more), then update, then cleanup, then
    /// render -- in that fixed order every frame.
    pub fn run(&mut self, registry: &mut EntityRegistry, dt: f32) {
        self.fixed_tick_all(registry, dt);
        run_update_bucket(&mut self.update_systems, registry, dt);
        registry.cleanup();
        run_render_bucket(&self.render_systems, registry, dt);
    }
}

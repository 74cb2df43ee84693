//! Component type identity and the per-entity component presence bitset.
//!
//! [`ComponentTypeId`] assignment is lazy: the first time `component_type_id::<T>()` is
//! called for a given `T`, a fresh id is pulled from a process-wide monotonic counter and
//! cached for the rest of the process lifetime. There is no explicit registration step.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Mutex;

/// Maximum number of distinct component types a process may register.
///
/// Mirrors the bit width of [`ComponentMask`]. Exceeding this is a fatal
/// misconfiguration, not a recoverable runtime condition -- see
/// [`component_type_id`].
pub const MAX_COMPONENTS: usize = 128;

/// A small, process-wide, stable identifier for a component type.
///
/// Not portable across processes; never persist a `ComponentTypeId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentTypeId(pub(crate) u8);

impl ComponentTypeId {
    /// Raw index into a [`ComponentMask`] or the [`crate::store::ComponentStore`]'s pool
    /// table.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

struct TypeRegistry {
    next: u8,
    names: HashMap<TypeId, ComponentTypeId>,
}

static REGISTRY: Mutex<Option<TypeRegistry>> = Mutex::new(None);

fn with_registry<R>(f: impl FnOnce(&mut TypeRegistry) -> R) -> R {
    let mut guard = REGISTRY.lock().expect("component type registry poisoned");
    let registry = guard.get_or_insert_with(|| TypeRegistry {
        next: 0,
        names: HashMap::new(),
    });
    f(registry)
}

/// Returns the process-wide [`ComponentTypeId`] for `T`, assigning one on first use.
///
/// Aborts the process if more than [`MAX_COMPONENTS`] distinct types have been observed --
/// this is the `ComponentCapExceeded` fatal condition from the error model.
pub fn component_type_id<T: 'static>() -> ComponentTypeId {
    with_registry(|registry| {
        let type_id = TypeId::of::<T>();
        if let Some(existing) = registry.names.get(&type_id) {
            return *existing;
        }
        if registry.next as usize >= MAX_COMPONENTS {
            tracing::error!(
                max = MAX_COMPONENTS,
                type_name = std::any::type_name::<T>(),
                "component type cap exceeded"
            );
            panic!(
                "ComponentCapExceeded: cannot register component type `{}`, cap is {}",
                std::any::type_name::<T>(),
                MAX_COMPONENTS
            );
        }
        let id = ComponentTypeId(registry.next);
        registry.next += 1;
        registry.names.insert(type_id, id);
        id
    })
}

/// A fixed-width bitset over [`ComponentTypeId`]s, backed by a `u128` (matches
/// [`MAX_COMPONENTS`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ComponentMask(u128);

impl ComponentMask {
    /// The empty mask.
    pub const EMPTY: ComponentMask = ComponentMask(0);

    /// Builds a mask containing only `T`'s bit.
    pub fn of<T: 'static>() -> Self {
        Self::single(component_type_id::<T>())
    }

    /// Builds a mask containing only `id`'s bit.
    pub fn single(id: ComponentTypeId) -> Self {
        ComponentMask(1u128 << id.index())
    }

    /// Sets `id`'s bit.
    pub fn set(&mut self, id: ComponentTypeId) {
        self.0 |= 1u128 << id.index();
    }

    /// Clears `id`'s bit.
    pub fn clear(&mut self, id: ComponentTypeId) {
        self.0 &= !(1u128 << id.index());
    }

    /// Tests `id`'s bit.
    pub fn test(&self, id: ComponentTypeId) -> bool {
        (self.0 >> id.index()) & 1 == 1
    }

    /// True iff no bits are set.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True iff any bit is set.
    pub fn any(&self) -> bool {
        self.0 != 0
    }

    /// True iff `self` contains every bit set in `other`.
    pub fn contains_all(&self, other: ComponentMask) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Iterates the set bits as [`ComponentTypeId`]s, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        (0..MAX_COMPONENTS).filter_map(move |i| {
            if (self.0 >> i) & 1 == 1 {
                Some(ComponentTypeId(i as u8))
            } else {
                None
            }
        })
    }
}

impl std::ops::BitOr for ComponentMask {
    type Output = ComponentMask;
    fn bitor(self, rhs: Self) -> Self::Output {
        ComponentMask(self.0 | rhs.0)
    }
}

impl std::ops::BitAnd for ComponentMask {
    type Output = ComponentMask;
    fn bitand(self, rhs: Self) -> Self::Output {
        ComponentMask(self.0 & rhs.0)
    }
}

/// A component type that is a member of a sum-type "family" (see DESIGN.md's discussion of
/// derived-component support).
///
/// The family enum (`Self::Family`) owns exactly one [`ComponentTypeId`]; variant marker
/// types only know how to embed themselves into, and extract themselves from, the family
/// value. This replaces the source engine's `dynamic_cast`-based base/derived component
/// queries with a table-free, compile-time-checked equivalent.
pub trait ComponentVariant: Sized + 'static {
    /// The enum that actually occupies a slot in the [`crate::pool::ComponentPool`].
    type Family: 'static + std::fmt::Debug;

    /// Wrap `self` as the family value.
    fn embed(self) -> Self::Family;

    /// Borrow `family` as `Self`, if it currently holds this variant.
    fn extract(family: &Self::Family) -> Option<&Self>;

    /// Mutably borrow `family` as `Self`, if it currently holds this variant.
    fn extract_mut(family: &mut Self::Family) -> Option<&mut Self>;
}

//! Component type registration and metadata.
//!
//! Every component type used in the ECS must be registered at runtime in a
//! [`ComponentRegistry`]. Registration produces a [`ComponentTypeId`] (assigned
//! in registration order) that keys column lookups, and a bit in
//! [`ComponentMask`] that keys archetypes and query matching.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use crate::column::{ErasedColumn, TypedColumn};
use crate::EcsError;

/// Upper bound on registered component types (one bit each in a `u64` mask).
pub const MAX_COMPONENT_TYPES: usize = 64;

/// Anything storable in a column.
///
/// `Default` supplies the zero value written into every column slot when an
/// entity is added to a store.
pub trait Component: Default + Send + Sync + 'static {}

impl<T: Default + Send + Sync + 'static> Component for T {}

// ---------------------------------------------------------------------------
// ComponentTypeId
// ---------------------------------------------------------------------------

/// Opaque, lightweight identifier for a registered component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(pub(crate) u8);

impl ComponentTypeId {
    /// Position of this type's bit in a [`ComponentMask`].
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentMask
// ---------------------------------------------------------------------------

/// A set of component types, one bit per [`ComponentTypeId`].
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ComponentMask(u64);

impl ComponentMask {
    /// The empty set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build a mask from a list of ids. Duplicates collapse.
    pub fn from_ids(ids: &[ComponentTypeId]) -> Self {
        ids.iter().fold(Self::empty(), |mask, id| mask.with(*id))
    }

    /// A copy of this mask with `id` added.
    #[inline]
    #[must_use]
    pub const fn with(self, id: ComponentTypeId) -> Self {
        Self(self.0 | (1u64 << id.0))
    }

    /// Add `id` in place.
    #[inline]
    pub fn insert(&mut self, id: ComponentTypeId) {
        self.0 |= 1u64 << id.0;
    }

    /// Whether `id` is in the set.
    #[inline]
    pub const fn contains(self, id: ComponentTypeId) -> bool {
        self.0 & (1u64 << id.0) != 0
    }

    /// Whether every type in `required` is also in `self`.
    #[inline]
    pub const fn contains_all(self, required: ComponentMask) -> bool {
        self.0 & required.0 == required.0
    }

    /// Number of types in the set.
    #[inline]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Whether the set is empty.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Raw bits.
    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Member ids in ascending order.
    pub fn iter(self) -> impl Iterator<Item = ComponentTypeId> {
        (0..MAX_COMPONENT_TYPES as u8)
            .filter(move |bit| self.0 & (1u64 << bit) != 0)
            .map(ComponentTypeId)
    }
}

impl fmt::Debug for ComponentMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentMask({:#b})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentInfo
// ---------------------------------------------------------------------------

type ColumnFactory = fn(usize) -> Box<dyn ErasedColumn>;

fn make_column<T: Component>(capacity: usize) -> Box<dyn ErasedColumn> {
    Box::new(TypedColumn::<T>::with_capacity(capacity))
}

/// Metadata about a registered component type.
#[derive(Clone)]
pub struct ComponentInfo {
    /// Unique ID assigned at registration time.
    pub id: ComponentTypeId,
    /// Human-readable name (supplied by the caller).
    pub name: String,
    /// `std::any::type_name::<T>()`
    pub type_name: &'static str,
    /// Rust `TypeId` for runtime type checking.
    pub type_id: TypeId,
    factory: ColumnFactory,
}

impl ComponentInfo {
    /// Create an empty, fixed-capacity column for this type.
    pub fn new_column(&self, capacity: usize) -> Box<dyn ErasedColumn> {
        (self.factory)(capacity)
    }
}

impl fmt::Debug for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Registry mapping Rust types to [`ComponentTypeId`]s and their metadata.
///
/// A type can only be registered once; subsequent registrations of the same
/// Rust `TypeId` return the existing [`ComponentTypeId`].
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    /// TypeId -> ComponentTypeId for dedup.
    by_type: HashMap<TypeId, ComponentTypeId>,
    /// Name -> ComponentTypeId for lookup by string name.
    by_name: HashMap<String, ComponentTypeId>,
    /// Indexed by ComponentTypeId.0.
    infos: Vec<ComponentInfo>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component type under the given `name`.
    ///
    /// If the type has already been registered, the existing
    /// [`ComponentTypeId`] is returned and `name` is ignored.
    ///
    /// # Errors
    ///
    /// [`EcsError::DuplicateComponentName`] if `name` belongs to another type,
    /// [`EcsError::TooManyComponentTypes`] once [`MAX_COMPONENT_TYPES`] types
    /// are registered.
    pub fn register<T: Component>(&mut self, name: &str) -> Result<ComponentTypeId, EcsError> {
        let rust_type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&rust_type_id) {
            return Ok(existing);
        }
        if self.by_name.contains_key(name) {
            return Err(EcsError::DuplicateComponentName {
                name: name.to_owned(),
            });
        }
        if self.infos.len() >= MAX_COMPONENT_TYPES {
            return Err(EcsError::TooManyComponentTypes {
                max: MAX_COMPONENT_TYPES,
            });
        }

        let id = ComponentTypeId(self.infos.len() as u8);
        self.infos.push(ComponentInfo {
            id,
            name: name.to_owned(),
            type_name: std::any::type_name::<T>(),
            type_id: rust_type_id,
            factory: make_column::<T>,
        });
        self.by_type.insert(rust_type_id, id);
        self.by_name.insert(name.to_owned(), id);
        Ok(id)
    }

    /// Look up a component type by its Rust `TypeId`.
    pub fn lookup<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Like [`lookup`](Self::lookup) but reports unregistered types as
    /// [`EcsError::UnknownComponent`].
    pub fn require<T: 'static>(&self) -> Result<ComponentTypeId, EcsError> {
        self.lookup::<T>().ok_or_else(|| self.unknown(std::any::type_name::<T>()))
    }

    /// Look up a component type by its registered string name.
    pub fn lookup_by_name(&self, name: &str) -> Option<ComponentTypeId> {
        self.by_name.get(name).copied()
    }

    /// Get the [`ComponentInfo`] for a registered component type ID.
    pub fn get_info(&self, id: ComponentTypeId) -> Option<&ComponentInfo> {
        self.infos.get(id.index())
    }

    /// Union of the given ids, after checking each one is registered.
    pub fn mask_of(&self, ids: &[ComponentTypeId]) -> Result<ComponentMask, EcsError> {
        for id in ids {
            if self.get_info(*id).is_none() {
                return Err(self.unknown(&format!("{id:?}")));
            }
        }
        Ok(ComponentMask::from_ids(ids))
    }

    /// Total number of registered component types.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether any component types have been registered.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Returns the names of all registered component types, sorted.
    pub fn registered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }

    fn unknown(&self, name: &str) -> EcsError {
        EcsError::UnknownComponent {
            name: name.to_owned(),
            registered: self.registered_names().join(", "),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Pos {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Vel {
        dx: f32,
        dy: f32,
    }

    #[test]
    fn register_and_lookup() {
        let mut reg = ComponentRegistry::new();
        let id = reg.register::<Pos>("position").unwrap();
        assert_eq!(reg.lookup::<Pos>(), Some(id));
        assert_eq!(reg.lookup_by_name("position"), Some(id));
    }

    #[test]
    fn ids_follow_registration_order() {
        let mut reg = ComponentRegistry::new();
        let p = reg.register::<Pos>("position").unwrap();
        let v = reg.register::<Vel>("velocity").unwrap();
        assert_eq!(p.index(), 0);
        assert_eq!(v.index(), 1);
    }

    #[test]
    fn same_type_same_id() {
        let mut reg = ComponentRegistry::new();
        let id1 = reg.register::<Pos>("position").unwrap();
        let id2 = reg.register::<Pos>("position_again").unwrap();
        assert_eq!(id1, id2);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn name_clash_is_rejected() {
        let mut reg = ComponentRegistry::new();
        reg.register::<Pos>("thing").unwrap();
        let err = reg.register::<Vel>("thing").unwrap_err();
        assert!(matches!(err, EcsError::DuplicateComponentName { .. }));
    }

    #[test]
    fn unknown_component_lists_registered_names() {
        let mut reg = ComponentRegistry::new();
        reg.register::<Pos>("position").unwrap();
        let err = reg.require::<Vel>().unwrap_err();
        assert!(err.to_string().contains("position"));
    }

    #[test]
    fn too_many_types_is_rejected() {
        let mut reg = ComponentRegistry::new();
        macro_rules! register_many {
            ($($n:literal)*) => {$({
                #[derive(Default)]
                struct C<const N: usize>;
                reg.register::<C<$n>>(concat!("c", $n)).unwrap();
            })*};
        }
        register_many!(
            0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18 19 20 21 22 23 24 25 26 27 28 29 30 31
            32 33 34 35 36 37 38 39 40 41 42 43 44 45 46 47 48 49 50 51 52 53 54 55 56 57 58 59 60
            61 62 63
        );
        assert_eq!(reg.len(), MAX_COMPONENT_TYPES);
        let err = reg.register::<Pos>("position").unwrap_err();
        assert!(matches!(err, EcsError::TooManyComponentTypes { .. }));
    }

    #[test]
    fn mask_superset_checks() {
        let a = ComponentTypeId(0);
        let b = ComponentTypeId(1);
        let c = ComponentTypeId(5);
        let abc = ComponentMask::from_ids(&[a, b, c]);
        let ab = ComponentMask::empty().with(a).with(b);
        assert!(abc.contains_all(ab));
        assert!(!ab.contains_all(abc));
        assert!(abc.contains_all(ComponentMask::empty()));
        assert_eq!(abc.len(), 3);
        assert_eq!(abc.iter().collect::<Vec<_>>(), vec![a, b, c]);
    }

    #[test]
    fn info_builds_typed_columns() {
        let mut reg = ComponentRegistry::new();
        let id = reg.register::<Pos>("position").unwrap();
        let info = reg.get_info(id).unwrap();
        assert_eq!(info.name, "position");
        assert_eq!(info.type_id, TypeId::of::<Pos>());
        let column = info.new_column(8);
        assert_eq!(column.capacity(), 8);
        assert!(column.as_any().is::<TypedColumn<Pos>>());
    }
}

//! Queries over every archetype that carries a required component set.
//!
//! Two shapes are offered:
//!
//! - Tuple queries, `world.query::<(&A, &B)>()` and
//!   `world.query_mut::<(&mut A, &B)>()`, yield `(EntityId, (..))` for each
//!   matching entity, walking each matching store's columns in place.
//! - [`ComponentArray`] presents one component type across all matching
//!   stores as a single logical array, backed by borrowed per-store slices
//!   and a prefix sum of their lengths.
//!
//! Nothing is copied. Every view borrows the [`World`], so structural changes
//! (spawn, remove) cannot happen while a query is alive; queries are rebuilt
//! after each change.

use std::marker::PhantomData;

use crate::column::{ErasedColumn, TypedColumn};
use crate::component::{Component, ComponentMask, ComponentRegistry, ComponentTypeId};
use crate::entity::EntityId;
use crate::store::ComponentStore;
use crate::world::World;
use crate::EcsError;

// ---------------------------------------------------------------------------
// ComponentSet -- a plain tuple of component types
// ---------------------------------------------------------------------------

/// A tuple of component types, e.g. `(Position, Velocity)`.
///
/// Used to declare archetypes and to express required sets for
/// [`World::get_iterator`] and [`ComponentArray::fill_for`].
pub trait ComponentSet {
    /// Registered ids of the member types, in tuple order.
    fn type_ids(registry: &ComponentRegistry) -> Result<Vec<ComponentTypeId>, EcsError>;
}

macro_rules! impl_component_set {
    ($($T:ident),+) => {
        impl<$($T: Component),+> ComponentSet for ($($T,)+) {
            fn type_ids(registry: &ComponentRegistry) -> Result<Vec<ComponentTypeId>, EcsError> {
                Ok(vec![$(registry.require::<$T>()?),+])
            }
        }
    };
}

impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
impl_component_set!(A, B, C, D, E);
impl_component_set!(A, B, C, D, E, F);
impl_component_set!(A, B, C, D, E, F, G);
impl_component_set!(A, B, C, D, E, F, G, H);

// ---------------------------------------------------------------------------
// ColumnBorrows -- hands out each column of one store at most once
// ---------------------------------------------------------------------------

/// Exclusive borrows of one store's columns, each of which can be taken once.
pub struct ColumnBorrows<'w> {
    slots: Vec<Option<&'w mut Box<dyn ErasedColumn>>>,
}

impl<'w> ColumnBorrows<'w> {
    fn new(columns: &'w mut [(ComponentTypeId, Box<dyn ErasedColumn>)]) -> Self {
        Self {
            slots: columns.iter_mut().map(|(_, column)| Some(column)).collect(),
        }
    }

    /// Take the column of `T`, or `None` if absent or already taken.
    fn take<T: Component>(&mut self) -> Option<&'w mut TypedColumn<T>> {
        let slot = self.slots.iter_mut().find(|slot| {
            matches!(slot, Some(column) if column.as_any().is::<TypedColumn<T>>())
        })?;
        slot.take()?.as_any_mut().downcast_mut::<TypedColumn<T>>()
    }
}

// ---------------------------------------------------------------------------
// QueryItem -- one element of a query tuple
// ---------------------------------------------------------------------------

/// One element of a query tuple: `&T` (read) or `&mut T` (write).
pub trait QueryItem {
    /// The component type accessed.
    type Component: Component;
    /// The output type yielded per row.
    type Item<'w>;
    /// Per-store iterator over the column.
    type Fetch<'w>: Iterator<Item = Self::Item<'w>>;
    /// Whether this item borrows mutably.
    const MUTABLE: bool;

    /// Borrow this item's column out of `columns`.
    fn fetch_borrowed<'w>(columns: &mut ColumnBorrows<'w>) -> Option<Self::Fetch<'w>>;
}

/// Query items that only read, and can therefore share a `&World`.
pub trait ReadOnlyItem: QueryItem {
    fn fetch_shared(store: &ComponentStore) -> Option<Self::Fetch<'_>>;
}

impl<T: Component> QueryItem for &T {
    type Component = T;
    type Item<'w> = &'w T;
    type Fetch<'w> = std::slice::Iter<'w, T>;
    const MUTABLE: bool = false;

    fn fetch_borrowed<'w>(columns: &mut ColumnBorrows<'w>) -> Option<Self::Fetch<'w>> {
        let column: &'w TypedColumn<T> = columns.take::<T>()?;
        Some(column.as_slice().iter())
    }
}

impl<T: Component> ReadOnlyItem for &T {
    fn fetch_shared(store: &ComponentStore) -> Option<Self::Fetch<'_>> {
        store.column::<T>().ok().map(|column| column.iter())
    }
}

impl<T: Component> QueryItem for &mut T {
    type Component = T;
    type Item<'w> = &'w mut T;
    type Fetch<'w> = std::slice::IterMut<'w, T>;
    const MUTABLE: bool = true;

    fn fetch_borrowed<'w>(columns: &mut ColumnBorrows<'w>) -> Option<Self::Fetch<'w>> {
        Some(columns.take::<T>()?.as_mut_slice().iter_mut())
    }
}

// ---------------------------------------------------------------------------
// Query -- a tuple of QueryItems
// ---------------------------------------------------------------------------

/// How a query touches one component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub id: ComponentTypeId,
    pub mutable: bool,
    pub type_name: &'static str,
}

/// A tuple of query items: `(&A, &B)`, `(&mut A, &B)`, etc.
pub trait Query {
    /// The per-row output type.
    type Item<'w>;
    /// Per-store iterator over all columns of the tuple.
    type Fetch<'w>: Iterator<Item = Self::Item<'w>>;

    /// Resolve every item's component type against the registry.
    fn accesses(registry: &ComponentRegistry) -> Result<Vec<Access>, EcsError>;

    fn fetch_borrowed<'w>(columns: &mut ColumnBorrows<'w>) -> Option<Self::Fetch<'w>>;
}

/// Queries made only of `&T` items.
pub trait ReadOnlyQuery: Query {
    fn fetch_shared(store: &ComponentStore) -> Option<Self::Fetch<'_>>;
}

/// Steps several per-column iterators in lockstep.
pub struct TupleFetch<F>(F);

macro_rules! impl_query {
    ($($T:ident),+) => {
        impl<$($T: Iterator),+> Iterator for TupleFetch<($($T,)+)> {
            type Item = ($($T::Item,)+);

            #[allow(non_snake_case)]
            #[inline]
            fn next(&mut self) -> Option<Self::Item> {
                let ($($T,)+) = &mut self.0;
                Some(($($T.next()?,)+))
            }
        }

        impl<$($T: QueryItem),+> Query for ($($T,)+) {
            type Item<'w> = ($($T::Item<'w>,)+);
            type Fetch<'w> = TupleFetch<($($T::Fetch<'w>,)+)>;

            fn accesses(registry: &ComponentRegistry) -> Result<Vec<Access>, EcsError> {
                Ok(vec![$(Access {
                    id: registry.require::<$T::Component>()?,
                    mutable: $T::MUTABLE,
                    type_name: std::any::type_name::<$T::Component>(),
                }),+])
            }

            fn fetch_borrowed<'w>(columns: &mut ColumnBorrows<'w>) -> Option<Self::Fetch<'w>> {
                Some(TupleFetch(($($T::fetch_borrowed(columns)?,)+)))
            }
        }

        impl<$($T: ReadOnlyItem),+> ReadOnlyQuery for ($($T,)+) {
            fn fetch_shared(store: &ComponentStore) -> Option<Self::Fetch<'_>> {
                Some(TupleFetch(($($T::fetch_shared(store)?,)+)))
            }
        }
    };
}

impl_query!(A);
impl_query!(A, B);
impl_query!(A, B, C);
impl_query!(A, B, C, D);
impl_query!(A, B, C, D, E);
impl_query!(A, B, C, D, E, F);

fn required_mask(accesses: &[Access]) -> ComponentMask {
    accesses
        .iter()
        .fold(ComponentMask::empty(), |mask, access| mask.with(access.id))
}

/// Each column of a store is handed out once per mutable query, so any type
/// named twice is rejected.
fn check_access_conflicts(accesses: &[Access]) -> Result<(), EcsError> {
    for (i, access) in accesses.iter().enumerate() {
        if accesses[..i].iter().any(|earlier| earlier.id == access.id) {
            return Err(EcsError::ConflictingAccess {
                component: access.type_name,
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// QueryIter
// ---------------------------------------------------------------------------

/// Iterator that yields `(EntityId, Q::Item)` for all matching entities,
/// store by store in archetype creation order and row order within a store.
pub struct QueryIter<'w, Q: Query> {
    segments: std::vec::IntoIter<(&'w [EntityId], Q::Fetch<'w>)>,
    current: Option<(std::slice::Iter<'w, EntityId>, Q::Fetch<'w>)>,
    remaining: usize,
    _marker: PhantomData<Q>,
}

/// The iterator returned by [`World::query_mut`].
pub type QueryIterMut<'w, Q> = QueryIter<'w, Q>;

impl<'w, Q: Query> QueryIter<'w, Q> {
    fn new(segments: Vec<(&'w [EntityId], Q::Fetch<'w>)>) -> Self {
        let remaining = segments.iter().map(|(entities, _)| entities.len()).sum();
        Self {
            segments: segments.into_iter(),
            current: None,
            remaining,
            _marker: PhantomData,
        }
    }
}

impl<'w, Q: Query> Iterator for QueryIter<'w, Q> {
    type Item = (EntityId, Q::Item<'w>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((entities, fetch)) = &mut self.current {
                if let Some(&entity) = entities.next() {
                    // Columns are row-aligned with the entity array.
                    let item = fetch.next()?;
                    self.remaining -= 1;
                    return Some((entity, item));
                }
            }
            let (entities, fetch) = self.segments.next()?;
            self.current = Some((entities.iter(), fetch));
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<Q: Query> ExactSizeIterator for QueryIter<'_, Q> {}

impl World {
    /// Iterate every entity carrying all components of `Q` with read-only
    /// access. A query naming an unregistered type matches nothing.
    ///
    /// ```ignore
    /// for (entity, (pos, vel)) in world.query::<(&Position, &Velocity)>() {
    ///     // ...
    /// }
    /// ```
    pub fn query<Q: ReadOnlyQuery>(&self) -> QueryIter<'_, Q> {
        let segments = match Q::accesses(self.registry()) {
            Ok(accesses) => self
                .matching_stores(required_mask(&accesses))
                .filter(|store| !store.is_empty())
                .filter_map(|store| Some((store.entities(), Q::fetch_shared(store)?)))
                .collect(),
            Err(_) => Vec::new(),
        };
        QueryIter::new(segments)
    }

    /// Iterate every entity carrying all components of `Q`, with `&mut T`
    /// items writable in place.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownComponent`] if `Q` names an unregistered type,
    /// [`EcsError::ConflictingAccess`] if it names the same type twice.
    pub fn query_mut<Q: Query>(&mut self) -> Result<QueryIterMut<'_, Q>, EcsError> {
        let accesses = Q::accesses(self.registry())?;
        check_access_conflicts(&accesses)?;
        let required = required_mask(&accesses);

        let mut segments = Vec::new();
        for store in self.stores_mut().iter_mut() {
            if store.is_empty() || !store.mask().contains_all(required) {
                continue;
            }
            let (entities, columns) = store.split_columns_mut();
            let mut borrows = ColumnBorrows::new(columns);
            if let Some(fetch) = Q::fetch_borrowed(&mut borrows) {
                segments.push((entities, fetch));
            }
        }
        Ok(QueryIter::new(segments))
    }
}

// ---------------------------------------------------------------------------
// ComponentArray -- one component type across many stores
// ---------------------------------------------------------------------------

/// Map a global index onto `(segment, offset)` through prefix sums.
fn locate(starts: &[usize], len: usize, index: usize) -> Option<(usize, usize)> {
    if index >= len {
        return None;
    }
    // Empty stores are never added, so `starts` is strictly increasing and
    // starts[0] == 0.
    let segment = starts.partition_point(|&start| start <= index) - 1;
    Some((segment, index - starts[segment]))
}

/// A logical concatenation of component `T` over every non-empty store whose
/// component set contains a required mask.
///
/// The length is fixed when the array is filled. Random access is a binary
/// search over segment starts; [`cursor`](Self::cursor) gives amortised O(1)
/// access for increasing indices.
pub struct ComponentArray<'w, T> {
    segments: Vec<(&'w [EntityId], &'w [T])>,
    starts: Vec<usize>,
    len: usize,
}

impl<'w, T: Component> ComponentArray<'w, T> {
    /// Collect `T` from every non-empty store whose mask is a superset of
    /// `required`. `T` itself is always added to the required set.
    pub fn fill(world: &'w World, required: ComponentMask) -> Result<Self, EcsError> {
        let required = required.with(world.registry().require::<T>()?);
        let mut array = Self {
            segments: Vec::new(),
            starts: Vec::new(),
            len: 0,
        };
        for store in world.matching_stores(required).filter(|s| !s.is_empty()) {
            array.starts.push(array.len);
            array.len += store.len();
            array.segments.push((store.entities(), store.column::<T>()?));
        }
        Ok(array)
    }

    /// [`fill`](Self::fill) with the required set given as a tuple type.
    pub fn fill_for<S: ComponentSet>(world: &'w World) -> Result<Self, EcsError> {
        Self::fill(world, world.mask_of::<S>()?)
    }

    /// Total elements across all segments, as of fill time.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of stores contributing to this array.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn get(&self, index: usize) -> Option<&'w T> {
        let (segment, offset) = locate(&self.starts, self.len, index)?;
        let data: &'w [T] = self.segments[segment].1;
        data.get(offset)
    }

    /// The entity owning element `index`.
    pub fn entity(&self, index: usize) -> Option<EntityId> {
        let (segment, offset) = locate(&self.starts, self.len, index)?;
        self.segments[segment].0.get(offset).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'w T> + '_ {
        self.segments.iter().flat_map(|&(_, data)| data.iter())
    }

    pub fn iter_with_entities(&self) -> impl Iterator<Item = (EntityId, &'w T)> + '_ {
        self.segments
            .iter()
            .flat_map(|&(entities, data)| entities.iter().copied().zip(data.iter()))
    }

    /// A forward-only reader over this array.
    pub fn cursor(&self) -> ForwardCursor<'_, 'w, T> {
        ForwardCursor {
            array: self,
            segment: 0,
            last: None,
        }
    }
}

/// Sequential reader over a [`ComponentArray`] that caches the current
/// segment.
///
/// Indices must not decrease; a backward step is reported as
/// [`EcsError::NonMonotonicAccess`]. Not restartable: take a new cursor to
/// start over.
pub struct ForwardCursor<'a, 'w, T> {
    array: &'a ComponentArray<'w, T>,
    segment: usize,
    last: Option<usize>,
}

impl<'w, T: Component> ForwardCursor<'_, 'w, T> {
    pub fn get(&mut self, index: usize) -> Result<&'w T, EcsError> {
        if let Some(last) = self.last {
            if index < last {
                return Err(EcsError::NonMonotonicAccess {
                    requested: index,
                    last,
                });
            }
        }
        if index >= self.array.len {
            return Err(EcsError::IndexOutOfRange {
                index,
                len: self.array.len,
            });
        }
        let array = self.array;
        while array.starts[self.segment] + array.segments[self.segment].1.len() <= index {
            self.segment += 1;
        }
        self.last = Some(index);
        let data: &'w [T] = array.segments[self.segment].1;
        Ok(&data[index - array.starts[self.segment]])
    }

    /// The last index successfully read.
    pub fn position(&self) -> Option<usize> {
        self.last
    }
}

/// Mutable counterpart of [`ComponentArray`].
pub struct ComponentArrayMut<'w, T> {
    segments: Vec<(&'w [EntityId], &'w mut [T])>,
    starts: Vec<usize>,
    len: usize,
}

impl<'w, T: Component> ComponentArrayMut<'w, T> {
    pub fn fill(world: &'w mut World, required: ComponentMask) -> Result<Self, EcsError> {
        let required = required.with(world.registry().require::<T>()?);
        let mut array = Self {
            segments: Vec::new(),
            starts: Vec::new(),
            len: 0,
        };
        for store in world.stores_mut().iter_mut() {
            if store.is_empty() || !store.mask().contains_all(required) {
                continue;
            }
            array.starts.push(array.len);
            array.len += store.len();
            array.segments.push(store.entities_and_column_mut::<T>()?);
        }
        Ok(array)
    }

    pub fn fill_for<S: ComponentSet>(world: &'w mut World) -> Result<Self, EcsError> {
        let required = world.mask_of::<S>()?;
        Self::fill(world, required)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        let (segment, offset) = locate(&self.starts, self.len, index)?;
        self.segments[segment].1.get(offset)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        let (segment, offset) = locate(&self.starts, self.len, index)?;
        self.segments[segment].1.get_mut(offset)
    }

    pub fn entity(&self, index: usize) -> Option<EntityId> {
        let (segment, offset) = locate(&self.starts, self.len, index)?;
        self.segments[segment].0.get(offset).copied()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> + use<'_, 'w, T> {
        self.segments
            .iter_mut()
            .flat_map(|(_, data)| data.iter_mut())
    }

    pub fn iter_with_entities_mut(
        &mut self,
    ) -> impl Iterator<Item = (EntityId, &mut T)> + use<'_, 'w, T> {
        self.segments
            .iter_mut()
            .flat_map(|(entities, data)| entities.iter().copied().zip(data.iter_mut()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Fixed-capacity Structure-of-Arrays storage for one entity kind.
//!
//! A [`ComponentStore`] holds every entity of one archetype: a dense
//! `Vec<EntityId>` plus one [`ErasedColumn`] per component type, all sharing a
//! single row index space. The handle index maps each stored [`EntityId`] to
//! its row.
//!
//! Invariant: for every row `i < len`, `handles[entities[i]] == i`, and row `i`
//! of every column belongs to `entities[i]`.
//!
//! Removal swaps the last row into the gap, so a [`Handle`] is only good until
//! the next removal from its store. Each removal bumps the store's epoch and
//! handles from an older epoch are rejected with [`EcsError::InvalidHandle`]
//! instead of silently reading another entity's data. Handles also carry the
//! id of the store that issued them, so another store rejects them too.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::column::{ErasedColumn, TypedColumn};
use crate::component::{Component, ComponentMask, ComponentTypeId};
use crate::entity::EntityId;
use crate::EcsError;

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Source of unique store ids. `u32::MAX` is reserved for [`Handle::INVALID`].
static NEXT_STORE_ID: AtomicU32 = AtomicU32::new(0);

/// A transient, store-local row index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    epoch: u32,
    store: u32,
}

impl Handle {
    /// The sentinel returned by [`ComponentStore::get_handle`] for absent ids.
    pub const INVALID: Handle = Handle {
        index: u32::MAX,
        epoch: u32::MAX,
        store: u32::MAX,
    };

    /// Dense row this handle points at.
    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }

    /// Whether this is anything other than [`Handle::INVALID`].
    ///
    /// A valid-looking handle can still be stale; the store checks that.
    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

// ---------------------------------------------------------------------------
// ComponentStore
// ---------------------------------------------------------------------------

/// Dense SoA storage for all entities sharing one component set.
pub struct ComponentStore {
    /// Entity kind label, e.g. `"projectile"`.
    name: String,
    /// The component set every entity in this store carries.
    mask: ComponentMask,
    /// Maximum number of live entities.
    capacity: usize,
    /// Row -> entity.
    entities: Vec<EntityId>,
    /// One column per component type, sorted by `ComponentTypeId`.
    columns: Vec<(ComponentTypeId, Box<dyn ErasedColumn>)>,
    /// Entity -> row.
    handles: HashMap<EntityId, usize>,
    /// Bumped on every removal; stamped into handles.
    epoch: u32,
    /// Unique per store; stamped into handles.
    id: u32,
}

impl std::fmt::Debug for ComponentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentStore")
            .field("name", &self.name)
            .field("mask", &self.mask)
            .field("len", &self.entities.len())
            .field("capacity", &self.capacity)
            .field(
                "columns",
                &self
                    .columns
                    .iter()
                    .map(|(_, c)| c.element_type_name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ComponentStore {
    /// Allocate a store for `capacity` entities. `columns` must be freshly
    /// created, empty columns of at least `capacity` slots, one per id in
    /// `mask`.
    pub fn with_capacity(
        name: &str,
        mask: ComponentMask,
        mut columns: Vec<(ComponentTypeId, Box<dyn ErasedColumn>)>,
        capacity: usize,
    ) -> Self {
        columns.sort_by_key(|(id, _)| *id);
        debug_assert!(columns.iter().all(|(id, _)| mask.contains(*id)));
        debug_assert_eq!(columns.len(), mask.len());
        debug_assert!(columns
            .iter()
            .all(|(_, c)| c.is_empty() && c.capacity() >= capacity));
        Self {
            name: name.to_owned(),
            mask,
            capacity,
            entities: Vec::with_capacity(capacity),
            columns,
            handles: HashMap::with_capacity(capacity),
            epoch: 0,
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Entity kind label.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The component set of this store.
    #[inline]
    pub fn mask(&self) -> ComponentMask {
        self.mask
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Live entity ids in row order.
    #[inline]
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Whether `id` is stored here.
    #[inline]
    pub fn contains(&self, id: EntityId) -> bool {
        self.handles.contains_key(&id)
    }

    /// Whether this store has a column for `type_id`.
    #[inline]
    pub fn has_component(&self, type_id: ComponentTypeId) -> bool {
        self.mask.contains(type_id)
    }

    // -- structural changes -------------------------------------------------

    /// Append `id` with every component set to its default value.
    ///
    /// # Errors
    ///
    /// [`EcsError::DuplicateEntity`] if `id` is already stored,
    /// [`EcsError::CapacityExceeded`] if the store is full. Nothing is
    /// modified on error.
    pub fn add_entity(&mut self, id: EntityId) -> Result<Handle, EcsError> {
        self.check_can_add(id)?;
        for (_, column) in &mut self.columns {
            column.push_default()?;
        }
        Ok(self.commit_row(id))
    }

    /// Append `id` with explicit values for some columns; the rest get
    /// defaults. Values are matched to columns by type id.
    pub(crate) fn add_entity_with(
        &mut self,
        id: EntityId,
        mut values: Vec<(ComponentTypeId, Box<dyn std::any::Any + Send>)>,
    ) -> Result<Handle, EcsError> {
        self.check_can_add(id)?;
        for (type_id, _) in &values {
            if !self.mask.contains(*type_id) {
                return Err(EcsError::ComponentNotInArchetype {
                    component: format!("{type_id:?}"),
                    archetype: self.name.clone(),
                });
            }
        }
        let row = self.entities.len();
        for (type_id, column) in &mut self.columns {
            let pushed = match values.iter().position(|(id, _)| id == type_id) {
                Some(pos) => column.push_boxed(values.swap_remove(pos).1),
                None => column.push_default(),
            };
            if let Err(e) = pushed {
                // Roll back the columns already extended.
                for (_, column) in &mut self.columns {
                    column.truncate(row);
                }
                return Err(e);
            }
        }
        Ok(self.commit_row(id))
    }

    fn check_can_add(&self, id: EntityId) -> Result<(), EcsError> {
        if self.handles.contains_key(&id) {
            return Err(EcsError::DuplicateEntity { entity: id });
        }
        if self.entities.len() >= self.capacity {
            return Err(EcsError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    fn commit_row(&mut self, id: EntityId) -> Handle {
        let row = self.entities.len();
        self.entities.push(id);
        self.handles.insert(id, row);
        self.handle_for_row(row)
    }

    /// Swap-remove `id`.
    ///
    /// Returns the entity that was relocated into the freed row, or `None` if
    /// the removed entity occupied the last row. Every outstanding [`Handle`]
    /// into this store is invalidated.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] if `id` is not stored here.
    pub fn remove(&mut self, id: EntityId) -> Result<Option<EntityId>, EcsError> {
        let row = self
            .handles
            .remove(&id)
            .ok_or(EcsError::StaleEntity { entity: id })?;
        let last = self.entities.len() - 1;

        self.entities.swap_remove(row);
        for (_, column) in &mut self.columns {
            column.swap_remove(row);
        }
        self.epoch = self.epoch.wrapping_add(1);

        if row == last {
            return Ok(None);
        }
        let moved = self.entities[row];
        if let Some(slot) = self.handles.get_mut(&moved) {
            *slot = row;
        }
        Ok(Some(moved))
    }

    // -- handle resolution --------------------------------------------------

    /// O(1) lookup of `id`'s row, or [`Handle::INVALID`] if absent.
    pub fn get_handle(&self, id: EntityId) -> Handle {
        match self.handles.get(&id) {
            Some(&row) => self.handle_for_row(row),
            None => Handle::INVALID,
        }
    }

    /// Like [`get_handle`](Self::get_handle) but absent ids are an error.
    pub fn resolve(&self, id: EntityId) -> Result<Handle, EcsError> {
        let handle = self.get_handle(id);
        if handle.is_valid() {
            Ok(handle)
        } else {
            Err(EcsError::StaleEntity { entity: id })
        }
    }

    #[inline]
    fn handle_for_row(&self, row: usize) -> Handle {
        Handle {
            index: row as u32,
            epoch: self.epoch,
            store: self.id,
        }
    }

    /// Row for a handle, if this store issued it, it is current and in range.
    #[inline]
    fn row(&self, handle: Handle) -> Result<usize, EcsError> {
        let row = handle.index();
        if handle.store != self.id || handle.epoch != self.epoch || row >= self.entities.len() {
            return Err(EcsError::InvalidHandle {
                index: handle.index,
                store: self.name.clone(),
            });
        }
        Ok(row)
    }

    /// The entity a handle points at.
    pub fn entity(&self, handle: Handle) -> Result<EntityId, EcsError> {
        let row = self.row(handle)?;
        Ok(self.entities[row])
    }

    // -- typed access -------------------------------------------------------

    /// Read component `T` of the entity at `handle`.
    pub fn get<T: Component>(&self, handle: Handle) -> Result<&T, EcsError> {
        let row = self.row(handle)?;
        Ok(&self.column::<T>()?[row])
    }

    /// Mutable access to component `T` of the entity at `handle`.
    pub fn get_mut<T: Component>(&mut self, handle: Handle) -> Result<&mut T, EcsError> {
        let row = self.row(handle)?;
        Ok(&mut self.column_mut::<T>()?[row])
    }

    /// Overwrite component `T` of the entity at `handle`.
    pub fn set<T: Component>(&mut self, handle: Handle, value: T) -> Result<(), EcsError> {
        *self.get_mut::<T>(handle)? = value;
        Ok(())
    }

    /// All live values of component `T`, index-aligned with
    /// [`entities`](Self::entities).
    pub fn column<T: Component>(&self) -> Result<&[T], EcsError> {
        self.columns
            .iter()
            .find_map(|(_, c)| c.as_any().downcast_ref::<TypedColumn<T>>())
            .map(TypedColumn::as_slice)
            .ok_or_else(|| self.missing::<T>())
    }

    /// Mutable view of every live value of component `T`.
    pub fn column_mut<T: Component>(&mut self) -> Result<&mut [T], EcsError> {
        self.entities_and_column_mut::<T>().map(|(_, column)| column)
    }

    /// Entity ids alongside a mutable column, borrowed together.
    pub(crate) fn entities_and_column_mut<T: Component>(
        &mut self,
    ) -> Result<(&[EntityId], &mut [T]), EcsError> {
        let Self {
            name,
            entities,
            columns,
            ..
        } = self;
        columns
            .iter_mut()
            .find_map(|(_, c)| c.as_any_mut().downcast_mut::<TypedColumn<T>>())
            .map(|column| (entities.as_slice(), column.as_mut_slice()))
            .ok_or_else(|| EcsError::ComponentNotInArchetype {
                component: std::any::type_name::<T>().to_owned(),
                archetype: name.clone(),
            })
    }

    /// Entity ids and the raw columns, split so callers can borrow several
    /// columns mutably at once.
    pub(crate) fn split_columns_mut(
        &mut self,
    ) -> (&[EntityId], &mut [(ComponentTypeId, Box<dyn ErasedColumn>)]) {
        (&self.entities, &mut self.columns)
    }

    fn missing<T>(&self) -> EcsError {
        EcsError::ComponentNotInArchetype {
            component: std::any::type_name::<T>().to_owned(),
            archetype: self.name.clone(),
        }
    }

    // -- diagnostics --------------------------------------------------------

    /// Verify the dense-index invariant and column alignment.
    pub fn check_invariants(&self) -> Result<(), EcsError> {
        let violation = |reason: String| EcsError::InvariantViolation {
            store: self.name.clone(),
            reason,
        };
        if self.handles.len() != self.entities.len() {
            return Err(violation(format!(
                "{} handles for {} entities",
                self.handles.len(),
                self.entities.len()
            )));
        }
        for (row, id) in self.entities.iter().enumerate() {
            match self.handles.get(id) {
                Some(&mapped) if mapped == row => {}
                other => {
                    return Err(violation(format!(
                        "entity {id} at row {row} maps to {other:?}"
                    )))
                }
            }
        }
        for (type_id, column) in &self.columns {
            if column.len() != self.entities.len() {
                return Err(violation(format!(
                    "column {type_id:?} has {} rows, expected {}",
                    column.len(),
                    self.entities.len()
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentRegistry;

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

    fn store(capacity: usize) -> ComponentStore {
        let mut reg = ComponentRegistry::new();
        let pos = reg.register::<Pos>("position").unwrap();
        let vel = reg.register::<Vel>("velocity").unwrap();
        let columns = [pos, vel]
            .iter()
            .map(|id| (*id, reg.get_info(*id).unwrap().new_column(capacity)))
            .collect();
        ComponentStore::with_capacity(
            "mover",
            ComponentMask::from_ids(&[pos, vel]),
            columns,
            capacity,
        )
    }

    #[test]
    fn add_entity_zero_initialises_components() {
        let mut s = store(4);
        let h = s.add_entity(EntityId::new(0, 0)).unwrap();
        assert_eq!(s.get::<Pos>(h).unwrap(), &Pos::default());
        assert_eq!(s.get::<Vel>(h).unwrap(), &Vel::default());
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn set_then_get_roundtrip() {
        let mut s = store(4);
        let e = EntityId::new(3, 1);
        let h = s.add_entity(e).unwrap();
        s.set(h, Pos { x: 5.0, y: 6.0 }).unwrap();
        assert_eq!(s.get::<Pos>(s.get_handle(e)).unwrap(), &Pos { x: 5.0, y: 6.0 });
    }

    #[test]
    fn duplicate_entity_rejected() {
        let mut s = store(4);
        let e = EntityId::new(0, 0);
        s.add_entity(e).unwrap();
        let err = s.add_entity(e).unwrap_err();
        assert!(matches!(err, EcsError::DuplicateEntity { .. }));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut s = store(2);
        s.add_entity(EntityId::new(0, 0)).unwrap();
        s.add_entity(EntityId::new(1, 0)).unwrap();
        let err = s.add_entity(EntityId::new(2, 0)).unwrap_err();
        assert!(matches!(err, EcsError::CapacityExceeded { capacity: 2 }));
        assert_eq!(s.len(), 2);
        s.check_invariants().unwrap();
    }

    #[test]
    fn remove_relocates_last_entity() {
        let mut s = store(2);
        let e1 = EntityId::new(0, 0);
        let e2 = EntityId::new(1, 0);
        let h1 = s.add_entity(e1).unwrap();
        let h2 = s.add_entity(e2).unwrap();
        s.set(h1, Pos { x: 1.0, y: 1.0 }).unwrap();
        s.set(h2, Pos { x: 2.0, y: 2.0 }).unwrap();

        let moved = s.remove(e1).unwrap();
        assert_eq!(moved, Some(e2));
        assert_eq!(s.get_handle(e2).index(), 0);
        assert!(!s.get_handle(e1).is_valid());
        assert_eq!(
            s.get::<Pos>(s.get_handle(e2)).unwrap(),
            &Pos { x: 2.0, y: 2.0 }
        );
        s.check_invariants().unwrap();
    }

    #[test]
    fn removing_last_row_is_a_self_swap() {
        let mut s = store(3);
        let a = EntityId::new(0, 0);
        let b = EntityId::new(1, 0);
        s.add_entity(a).unwrap();
        s.add_entity(b).unwrap();
        assert_eq!(s.remove(b).unwrap(), None);
        assert_eq!(s.entities(), &[a]);
        assert_eq!(s.get_handle(a).index(), 0);
        s.check_invariants().unwrap();

        assert_eq!(s.remove(a).unwrap(), None);
        assert!(s.is_empty());
        s.check_invariants().unwrap();
    }

    #[test]
    fn handles_go_stale_after_removal() {
        let mut s = store(4);
        let a = EntityId::new(0, 0);
        let b = EntityId::new(1, 0);
        let c = EntityId::new(2, 0);
        s.add_entity(a).unwrap();
        let hb = s.add_entity(b).unwrap();
        s.add_entity(c).unwrap();
        s.remove(a).unwrap();
        let err = s.get::<Pos>(hb).unwrap_err();
        assert!(matches!(err, EcsError::InvalidHandle { .. }));
        // Re-resolving gives a fresh, usable handle.
        assert!(s.get::<Pos>(s.get_handle(b)).is_ok());
    }

    #[test]
    fn handles_from_another_store_are_rejected() {
        let mut a = store(2);
        let mut b = store(2);
        let ha = a.add_entity(EntityId::new(0, 0)).unwrap();
        let hb = b.add_entity(EntityId::new(1, 0)).unwrap();
        b.set(hb, Pos { x: 42.0, y: 0.0 }).unwrap();

        // Same row, same epoch, different store.
        assert_eq!(ha.index(), hb.index());
        assert!(matches!(b.get::<Pos>(ha), Err(EcsError::InvalidHandle { .. })));
        assert!(matches!(b.entity(ha), Err(EcsError::InvalidHandle { .. })));
        assert!(matches!(
            b.set(ha, Pos::default()),
            Err(EcsError::InvalidHandle { .. })
        ));
        assert_eq!(b.get::<Pos>(hb).unwrap(), &Pos { x: 42.0, y: 0.0 });
        assert_eq!(a.entity(ha).unwrap(), EntityId::new(0, 0));
    }

    #[test]
    fn invalid_sentinel_is_rejected() {
        let s = store(1);
        let err = s.get::<Pos>(Handle::INVALID).unwrap_err();
        assert!(matches!(err, EcsError::InvalidHandle { .. }));
        assert!(matches!(
            s.resolve(EntityId::new(9, 0)),
            Err(EcsError::StaleEntity { .. })
        ));
    }

    #[test]
    fn missing_component_type_is_reported() {
        let mut s = store(1);
        let h = s.add_entity(EntityId::new(0, 0)).unwrap();
        let err = s.get::<u64>(h).unwrap_err();
        assert!(matches!(err, EcsError::ComponentNotInArchetype { .. }));
    }

    #[test]
    fn remove_unknown_entity_is_an_error() {
        let mut s = store(1);
        let err = s.remove(EntityId::new(0, 0)).unwrap_err();
        assert!(matches!(err, EcsError::StaleEntity { .. }));
    }

    #[test]
    fn add_with_values_rolls_back_on_type_mismatch() {
        let mut s = store(2);
        let pos_id = ComponentTypeId(0);
        let err = s
            .add_entity_with(EntityId::new(0, 0), vec![(pos_id, Box::new(1u8))])
            .unwrap_err();
        assert!(matches!(err, EcsError::ComponentTypeMismatch { .. }));
        assert!(s.is_empty());
        s.check_invariants().unwrap();
    }

    #[test]
    fn columns_stay_aligned_with_entities() {
        let mut s = store(8);
        let ids: Vec<_> = (0..5).map(|i| EntityId::new(i, 0)).collect();
        for (i, id) in ids.iter().enumerate() {
            let h = s.add_entity(*id).unwrap();
            s.set(h, Pos { x: i as f32, y: 0.0 }).unwrap();
        }
        s.remove(ids[1]).unwrap();
        s.remove(ids[3]).unwrap();
        let positions = s.column::<Pos>().unwrap();
        for (row, id) in s.entities().iter().enumerate() {
            assert_eq!(positions[row].x, id.index() as f32);
        }
        s.check_invariants().unwrap();
    }
}

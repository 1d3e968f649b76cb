//! The [`World`]: entity allocator, component registry and archetype stores
//! behind one explicit context value.
//!
//! Archetypes are declared up front with a fixed component set and capacity.
//! An entity is created into exactly one archetype and stays there until it is
//! removed; there is no migration between archetypes.

use std::any::Any;
use std::collections::HashMap;

use serde::Deserialize;

use crate::component::{Component, ComponentMask, ComponentRegistry, ComponentTypeId};
use crate::entity::{EntityId, EntityManager, MINIMUM_FREE_INDICES};
use crate::query::ComponentSet;
use crate::store::ComponentStore;
use crate::EcsError;

// ---------------------------------------------------------------------------
// ArchetypeId
// ---------------------------------------------------------------------------

/// Index of a [`ComponentStore`] inside its [`World`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchetypeId(pub(crate) u32);

impl ArchetypeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ---------------------------------------------------------------------------
// WorldConfig
// ---------------------------------------------------------------------------

/// Tunables for a [`World`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Free-list length that must be exceeded before an entity index is
    /// recycled.
    pub free_watermark: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            free_watermark: MINIMUM_FREE_INDICES,
        }
    }
}

// ---------------------------------------------------------------------------
// ComponentBundle
// ---------------------------------------------------------------------------

/// Initial component values for [`World::spawn`].
///
/// Components of the archetype that the bundle leaves out start at their
/// `Default` value.
///
/// ```ignore
/// let mut bundle = ComponentBundle::new();
/// bundle.add(world.registry(), Position { x: 0.0, y: 0.0 })?;
/// bundle.add(world.registry(), Velocity { dx: 1.0, dy: 0.0 })?;
/// world.spawn(projectiles, bundle)?;
/// ```
#[derive(Default)]
pub struct ComponentBundle {
    entries: Vec<(ComponentTypeId, &'static str, Box<dyn Any + Send>)>,
}

impl ComponentBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component value. The type must be registered.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownComponent`] for unregistered types,
    /// [`EcsError::DuplicateBundleComponent`] if the bundle already holds a
    /// value of this type.
    pub fn add<T: Component>(
        &mut self,
        registry: &ComponentRegistry,
        value: T,
    ) -> Result<(), EcsError> {
        let type_id = registry.require::<T>()?;
        if self.entries.iter().any(|(id, _, _)| *id == type_id) {
            return Err(EcsError::DuplicateBundleComponent {
                component: std::any::type_name::<T>(),
            });
        }
        self.entries
            .push((type_id, std::any::type_name::<T>(), Box::new(value)));
        Ok(())
    }

    /// Builder-style [`add`](Self::add).
    pub fn with<T: Component>(
        mut self,
        registry: &ComponentRegistry,
        value: T,
    ) -> Result<Self, EcsError> {
        self.add(registry, value)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The set of component types in this bundle.
    pub fn mask(&self) -> ComponentMask {
        self.entries
            .iter()
            .fold(ComponentMask::empty(), |mask, (id, _, _)| mask.with(*id))
    }

    /// The first bundled type that `mask` lacks.
    fn first_missing_from(&self, mask: ComponentMask) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(id, _, _)| !mask.contains(*id))
            .map(|(_, name, _)| *name)
    }

    fn into_values(self) -> Vec<(ComponentTypeId, Box<dyn Any + Send>)> {
        self.entries
            .into_iter()
            .map(|(id, _, value)| (id, value))
            .collect()
    }
}

impl std::fmt::Debug for ComponentBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(_, name, _)| name))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// The top-level storage context.
///
/// Owns the entity manager, the component registry and one
/// [`ComponentStore`] per archetype. Every gameplay system receives the world
/// by reference; there is no global state.
pub struct World {
    entities: EntityManager,
    registry: ComponentRegistry,
    /// Indexed by `ArchetypeId.0`.
    stores: Vec<ComponentStore>,
    by_mask: HashMap<ComponentMask, ArchetypeId>,
    by_name: HashMap<String, ArchetypeId>,
    /// Which archetype each live entity lives in.
    locations: HashMap<EntityId, ArchetypeId>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entity_count", &self.locations.len())
            .field("archetype_count", &self.stores.len())
            .field("component_types", &self.registry.len())
            .finish()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Create an empty world with default settings.
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    pub fn with_config(config: WorldConfig) -> Self {
        Self {
            entities: EntityManager::with_free_watermark(config.free_watermark),
            registry: ComponentRegistry::new(),
            stores: Vec::new(),
            by_mask: HashMap::new(),
            by_name: HashMap::new(),
            locations: HashMap::new(),
        }
    }

    /// Read-only access to the component registry.
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Read-only access to the entity manager.
    pub fn entities(&self) -> &EntityManager {
        &self.entities
    }

    /// Register a component type under `name`.
    pub fn register_component<T: Component>(
        &mut self,
        name: &str,
    ) -> Result<ComponentTypeId, EcsError> {
        let id = self.registry.register::<T>(name)?;
        tracing::trace!(component = name, id = id.index(), "registered component");
        Ok(id)
    }

    /// The mask of a component set, checking every member is registered.
    pub fn mask_of<S: ComponentSet>(&self) -> Result<ComponentMask, EcsError> {
        let ids = S::type_ids(&self.registry)?;
        Ok(ComponentMask::from_ids(&ids))
    }

    // -- archetype management -----------------------------------------------

    /// Declare an archetype holding exactly the components in `S`.
    ///
    /// ```ignore
    /// let movers = world.create_archetype::<(Position, Velocity)>("mover", 256)?;
    /// ```
    pub fn create_archetype<S: ComponentSet>(
        &mut self,
        name: &str,
        capacity: usize,
    ) -> Result<ArchetypeId, EcsError> {
        let ids = S::type_ids(&self.registry)?;
        self.create_archetype_from_ids(name, &ids, capacity)
    }

    /// Declare an archetype from registered component ids.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownComponent`] for unregistered ids,
    /// [`EcsError::ArchetypeExists`] if another archetype already has the same
    /// component set, [`EcsError::DuplicateArchetypeName`] if `name` is taken.
    pub fn create_archetype_from_ids(
        &mut self,
        name: &str,
        ids: &[ComponentTypeId],
        capacity: usize,
    ) -> Result<ArchetypeId, EcsError> {
        let mask = self.registry.mask_of(ids)?;
        if let Some(existing) = self.by_mask.get(&mask) {
            return Err(EcsError::ArchetypeExists {
                name: name.to_owned(),
                existing: self.stores[existing.index()].name().to_owned(),
            });
        }
        if self.by_name.contains_key(name) {
            return Err(EcsError::DuplicateArchetypeName {
                name: name.to_owned(),
            });
        }

        let columns = mask
            .iter()
            .filter_map(|id| {
                self.registry
                    .get_info(id)
                    .map(|info| (id, info.new_column(capacity)))
            })
            .collect();
        let archetype = ArchetypeId(self.stores.len() as u32);
        self.stores
            .push(ComponentStore::with_capacity(name, mask, columns, capacity));
        self.by_mask.insert(mask, archetype);
        self.by_name.insert(name.to_owned(), archetype);

        tracing::debug!(
            archetype = name,
            id = archetype.index(),
            components = mask.len(),
            capacity,
            "created archetype"
        );
        Ok(archetype)
    }

    /// Archetype id by name.
    pub fn archetype_by_name(&self, name: &str) -> Option<ArchetypeId> {
        self.by_name.get(name).copied()
    }

    /// Archetype id for an exact component set.
    pub fn archetype_by_mask(&self, mask: ComponentMask) -> Option<ArchetypeId> {
        self.by_mask.get(&mask).copied()
    }

    pub fn store(&self, archetype: ArchetypeId) -> Option<&ComponentStore> {
        self.stores.get(archetype.index())
    }

    pub fn store_by_name(&self, name: &str) -> Option<&ComponentStore> {
        self.archetype_by_name(name).and_then(|a| self.store(a))
    }

    /// Every store, in archetype creation order.
    pub fn stores(&self) -> &[ComponentStore] {
        &self.stores
    }

    pub(crate) fn stores_mut(&mut self) -> &mut [ComponentStore] {
        &mut self.stores
    }

    pub fn archetype_count(&self) -> usize {
        self.stores.len()
    }

    /// Stores whose component set is a superset of `required`.
    pub fn matching_stores(
        &self,
        required: ComponentMask,
    ) -> impl Iterator<Item = &ComponentStore> + '_ {
        self.stores
            .iter()
            .filter(move |store| store.mask().contains_all(required))
    }

    /// The query primitive: every store that carries all of `S`.
    ///
    /// Callers iterate the returned stores and, within each, the dense
    /// columns directly.
    pub fn get_iterator<S: ComponentSet>(&self) -> Result<Vec<&ComponentStore>, EcsError> {
        let required = self.mask_of::<S>()?;
        Ok(self.matching_stores(required).collect())
    }

    fn store_for(&self, archetype: ArchetypeId) -> Result<&ComponentStore, EcsError> {
        self.stores
            .get(archetype.index())
            .ok_or(EcsError::UnknownArchetype { id: archetype.0 })
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Create an entity in `archetype` with every component defaulted.
    pub fn create_entity(&mut self, archetype: ArchetypeId) -> Result<EntityId, EcsError> {
        self.spawn(archetype, ComponentBundle::new())
    }

    /// Create an entity in `archetype`, initialised from `bundle`.
    ///
    /// On failure no id is leaked: the freshly allocated id is destroyed
    /// again before the error is returned.
    pub fn spawn(
        &mut self,
        archetype: ArchetypeId,
        bundle: ComponentBundle,
    ) -> Result<EntityId, EcsError> {
        let store = self
            .stores
            .get_mut(archetype.index())
            .ok_or(EcsError::UnknownArchetype { id: archetype.0 })?;
        if let Some(component) = bundle.first_missing_from(store.mask()) {
            return Err(EcsError::ComponentNotInArchetype {
                component: component.to_owned(),
                archetype: store.name().to_owned(),
            });
        }
        if store.len() >= store.capacity() {
            return Err(EcsError::CapacityExceeded {
                capacity: store.capacity(),
            });
        }

        let id = self.entities.create()?;
        if let Err(e) = store.add_entity_with(id, bundle.into_values()) {
            self.entities.destroy(id);
            return Err(e);
        }
        self.locations.insert(id, archetype);
        tracing::trace!(entity = %id, archetype = store.name(), "spawned entity");
        Ok(id)
    }

    /// Remove `id` immediately: swap-remove its row and release the id.
    ///
    /// Gameplay code running inside a tick should prefer
    /// [`CommandBuffer::mark_for_deletion`](crate::command::CommandBuffer::mark_for_deletion).
    pub fn remove(&mut self, id: EntityId) -> Result<(), EcsError> {
        if !self.entities.alive(id) {
            return Err(EcsError::StaleEntity { entity: id });
        }
        let archetype = self
            .locations
            .remove(&id)
            .ok_or(EcsError::StaleEntity { entity: id })?;
        let moved = self.stores[archetype.index()].remove(id)?;
        self.entities.destroy(id);
        tracing::trace!(entity = %id, relocated = ?moved, "removed entity");
        Ok(())
    }

    /// Whether `id` names a live entity.
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.entities.alive(id) && self.locations.contains_key(&id)
    }

    /// The archetype a live entity belongs to.
    pub fn archetype_of(&self, id: EntityId) -> Option<ArchetypeId> {
        if !self.entities.alive(id) {
            return None;
        }
        self.locations.get(&id).copied()
    }

    /// Number of live entities across all archetypes.
    pub fn entity_count(&self) -> usize {
        self.locations.len()
    }

    // -- component access ---------------------------------------------------

    fn locate(&self, id: EntityId) -> Result<ArchetypeId, EcsError> {
        self.archetype_of(id)
            .ok_or(EcsError::StaleEntity { entity: id })
    }

    fn locate_in(&self, archetype: ArchetypeId, id: EntityId) -> Result<(), EcsError> {
        let actual = self.locate(id)?;
        if actual != archetype {
            return Err(EcsError::EntityNotInArchetype {
                entity: id,
                archetype: self.store_for(archetype)?.name().to_owned(),
            });
        }
        Ok(())
    }

    /// Read component `T` of `id`.
    pub fn get_component<T: Component>(&self, id: EntityId) -> Result<&T, EcsError> {
        let store = &self.stores[self.locate(id)?.index()];
        store.get(store.resolve(id)?)
    }

    pub fn get_component_mut<T: Component>(&mut self, id: EntityId) -> Result<&mut T, EcsError> {
        let archetype = self.locate(id)?;
        let store = &mut self.stores[archetype.index()];
        let handle = store.resolve(id)?;
        store.get_mut(handle)
    }

    /// Overwrite component `T` of `id`.
    pub fn set_component<T: Component>(&mut self, id: EntityId, value: T) -> Result<(), EcsError> {
        *self.get_component_mut::<T>(id)? = value;
        Ok(())
    }

    /// Like [`get_component`](Self::get_component), but also checks that
    /// `id` lives in `archetype`.
    pub fn get_component_in<T: Component>(
        &self,
        archetype: ArchetypeId,
        id: EntityId,
    ) -> Result<&T, EcsError> {
        self.locate_in(archetype, id)?;
        self.get_component(id)
    }

    /// Like [`set_component`](Self::set_component), but also checks that
    /// `id` lives in `archetype`.
    pub fn set_component_in<T: Component>(
        &mut self,
        archetype: ArchetypeId,
        id: EntityId,
        value: T,
    ) -> Result<(), EcsError> {
        self.locate_in(archetype, id)?;
        self.set_component(id, value)
    }

    /// Whether `id` is alive and its archetype carries `T`.
    pub fn has_component<T: Component>(&self, id: EntityId) -> bool {
        match (self.registry.lookup::<T>(), self.archetype_of(id)) {
            (Some(type_id), Some(archetype)) => {
                self.stores[archetype.index()].has_component(type_id)
            }
            _ => false,
        }
    }

    // -- diagnostics --------------------------------------------------------

    /// Check every store's dense-index invariant and that the location map
    /// agrees with store membership.
    pub fn check_invariants(&self) -> Result<(), EcsError> {
        for store in &self.stores {
            store.check_invariants()?;
        }
        let stored: usize = self.stores.iter().map(ComponentStore::len).sum();
        if stored != self.locations.len() || stored != self.entities.alive_count() {
            return Err(EcsError::InvariantViolation {
                store: "<world>".to_owned(),
                reason: format!(
                    "{stored} stored, {} located, {} alive",
                    self.locations.len(),
                    self.entities.alive_count()
                ),
            });
        }
        for (id, archetype) in &self.locations {
            if !self.stores[archetype.index()].contains(*id) {
                return Err(EcsError::InvariantViolation {
                    store: self.stores[archetype.index()].name().to_owned(),
                    reason: format!("entity {id} located here but not stored"),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

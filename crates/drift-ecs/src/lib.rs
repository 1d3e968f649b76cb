//! Drift ECS -- generational entities over fixed-capacity SoA archetype stores.
//!
//! Each archetype is declared up front with a fixed component set and a fixed
//! capacity, and owns one [`ComponentStore`](store::ComponentStore): a dense
//! entity array plus one column per component type, compacted on removal by
//! swap-with-last. Generational [`EntityId`](entity::EntityId)s detect stale
//! references immediately, and every contract violation surfaces as an
//! [`EcsError`] in every build profile.
//!
//! # Quick Start
//!
//! ```
//! use drift_ecs::prelude::*;
//!
//! #[derive(Debug, Default, Clone, PartialEq)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Debug, Default, Clone, PartialEq)]
//! struct Velocity { dx: f32, dy: f32 }
//!
//! let mut world = World::new();
//! world.register_component::<Position>("position").unwrap();
//! world.register_component::<Velocity>("velocity").unwrap();
//! let movers = world.create_archetype::<(Position, Velocity)>("mover", 64).unwrap();
//!
//! let mut bundle = ComponentBundle::new();
//! bundle.add(world.registry(), Velocity { dx: 1.0, dy: 0.0 }).unwrap();
//! let entity = world.spawn(movers, bundle).unwrap();
//!
//! for (_, (pos, vel)) in world.query_mut::<(&mut Position, &Velocity)>().unwrap() {
//!     pos.x += vel.dx;
//! }
//! assert_eq!(world.get_component::<Position>(entity).unwrap(), &Position { x: 1.0, y: 0.0 });
//! ```

#![deny(unsafe_code)]

pub mod column;
pub mod command;
pub mod component;
pub mod entity;
pub mod query;
pub mod store;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity does not exist (stale generation or never allocated).
    #[error("entity {entity:?} does not exist (stale or never allocated)")]
    StaleEntity { entity: entity::EntityId },

    /// Every one of the 2^22 entity indices is in use.
    #[error("entity id space exhausted ({slots} slots allocated)")]
    IdSpaceExhausted { slots: usize },

    /// A component type was referenced that has not been registered.
    #[error("component type '{name}' not registered. Registered components: [{registered}]")]
    UnknownComponent { name: String, registered: String },

    #[error("component name '{name}' is already registered to another type")]
    DuplicateComponentName { name: String },

    #[error("at most {max} component types can be registered")]
    TooManyComponentTypes { max: usize },

    /// A fixed-capacity store or column is full.
    #[error("capacity of {capacity} exceeded")]
    CapacityExceeded { capacity: usize },

    /// A type-erased value did not hold the column's element type.
    #[error("component value is not a {expected}")]
    ComponentTypeMismatch { expected: &'static str },

    /// The handle is the invalid sentinel or predates a removal in its store.
    #[error("handle to row {index} of '{store}' is invalid or stale")]
    InvalidHandle { index: u32, store: String },

    #[error("archetype '{archetype}' has no component {component}")]
    ComponentNotInArchetype { component: String, archetype: String },

    #[error("entity {entity:?} is already stored")]
    DuplicateEntity { entity: entity::EntityId },

    /// A store's dense-index bookkeeping is inconsistent.
    #[error("invariant violated in '{store}': {reason}")]
    InvariantViolation { store: String, reason: String },

    #[error("cannot create archetype '{name}': archetype '{existing}' has the same component set")]
    ArchetypeExists { name: String, existing: String },

    #[error("archetype name '{name}' is already in use")]
    DuplicateArchetypeName { name: String },

    #[error("no archetype with id {id}")]
    UnknownArchetype { id: u32 },

    #[error("entity {entity:?} does not belong to archetype '{archetype}'")]
    EntityNotInArchetype {
        entity: entity::EntityId,
        archetype: String,
    },

    #[error("bundle already contains a {component}")]
    DuplicateBundleComponent { component: &'static str },

    /// A mutable query named the same component type more than once.
    #[error("query borrows {component} more than once")]
    ConflictingAccess { component: &'static str },

    /// A forward-only cursor was asked for an index behind its last one.
    #[error("forward-only access to index {requested} after index {last}")]
    NonMonotonicAccess { requested: usize, last: usize },

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::command::{ApplyReport, CommandBuffer};
    pub use crate::component::{Component, ComponentMask, ComponentRegistry, ComponentTypeId};
    pub use crate::entity::{EntityId, EntityManager};
    pub use crate::query::{
        ComponentArray, ComponentArrayMut, ComponentSet, ForwardCursor, Query, QueryItem,
        QueryIter, QueryIterMut,
    };
    pub use crate::store::{ComponentStore, Handle};
    pub use crate::world::{ArchetypeId, ComponentBundle, World, WorldConfig};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    // -- test component types -----------------------------------------------

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    enum Faction {
        #[default]
        Neutral,
        Player,
        Enemy,
    }

    fn setup_world() -> World {
        let mut world = World::new();
        world.register_component::<Position>("position").unwrap();
        world.register_component::<Velocity>("velocity").unwrap();
        world.register_component::<Faction>("faction").unwrap();
        world
    }

    // -- store-level scenario -----------------------------------------------

    #[test]
    fn two_slot_store_relocates_on_remove() {
        let mut world = setup_world();
        let pair = world
            .create_archetype::<(Position, Velocity)>("pair", 2)
            .unwrap();
        let e1 = world.create_entity(pair).unwrap();
        let e2 = world.create_entity(pair).unwrap();
        let store = world.store(pair).unwrap();
        assert_eq!(store.get_handle(e1).index(), 0);
        assert_eq!(store.get_handle(e2).index(), 1);

        world.remove(e1).unwrap();
        let store = world.store(pair).unwrap();
        assert_eq!(store.get_handle(e2).index(), 0);
        assert!(!store.get_handle(e1).is_valid());
    }

    #[test]
    fn creating_past_capacity_never_succeeds() {
        let mut world = setup_world();
        let pair = world
            .create_archetype::<(Position, Velocity)>("pair", 2)
            .unwrap();
        world.create_entity(pair).unwrap();
        world.create_entity(pair).unwrap();
        for _ in 0..3 {
            assert!(matches!(
                world.create_entity(pair),
                Err(EcsError::CapacityExceeded { capacity: 2 })
            ));
        }
        assert_eq!(world.entity_count(), 2);
    }

    // -- generations --------------------------------------------------------

    #[test]
    fn reusing_one_slot_300_times_wraps_deterministically() {
        let mut world = World::with_config(WorldConfig { free_watermark: 0 });
        world.register_component::<Position>("position").unwrap();
        let dots = world.create_archetype::<(Position,)>("dot", 1).unwrap();

        let first = world.create_entity(dots).unwrap();
        let mut current = first;
        for cycle in 1..=300u32 {
            world.remove(current).unwrap();
            assert!(!world.is_alive(current));
            current = world.create_entity(dots).unwrap();
            assert_eq!(current.index(), first.index());
            assert_eq!(current.generation(), (cycle % 256) as u8);
        }
        // After 256 reuses the generation wraps and the first id aliases.
        assert_eq!(current.generation(), 44);
        assert!(!world.is_alive(first));
    }

    // -- queries across archetypes -----------------------------------------

    #[test]
    fn query_returns_entities_from_both_archetypes() {
        let mut world = setup_world();
        let movers = world
            .create_archetype::<(Position, Velocity)>("mover", 16)
            .unwrap();
        let units = world
            .create_archetype::<(Position, Velocity, Faction)>("unit", 16)
            .unwrap();
        let m = world.create_entity(movers).unwrap();
        let u = world
            .spawn(
                units,
                ComponentBundle::new()
                    .with(world.registry(), Faction::Enemy)
                    .unwrap(),
            )
            .unwrap();

        let mut found: Vec<EntityId> = world
            .query::<(&Position, &Velocity)>()
            .map(|(e, _)| e)
            .collect();
        found.sort();
        assert_eq!(found, vec![m, u]);

        let required = world.mask_of::<(Position, Velocity)>().unwrap();
        let array = ComponentArray::<Velocity>::fill(&world, required).unwrap();
        let expected: usize = world.matching_stores(required).map(|s| s.len()).sum();
        assert_eq!(array.len(), expected);
        assert_eq!(array.len(), 2);

        let factions: Vec<_> = world.query::<(&Faction,)>().map(|(_, (f,))| *f).collect();
        assert_eq!(factions, vec![Faction::Enemy]);
    }

    #[test]
    fn set_get_round_trip_survives_unrelated_removals() {
        let mut world = setup_world();
        let movers = world
            .create_archetype::<(Position, Velocity)>("mover", 16)
            .unwrap();
        let others = world
            .create_archetype::<(Position, Faction)>("other", 16)
            .unwrap();
        let keep = world.create_entity(movers).unwrap();
        let victim = world.create_entity(others).unwrap();
        world.set_component(keep, Position { x: 4.0, y: 2.0 }).unwrap();
        world.set_component(victim, Faction::Player).unwrap();
        world.remove(victim).unwrap();
        assert_eq!(
            world.get_component::<Position>(keep).unwrap(),
            &Position { x: 4.0, y: 2.0 }
        );
    }

    #[test]
    fn scale_10k_entities() {
        let mut world = World::new();
        world.register_component::<Position>("position").unwrap();
        world.register_component::<Velocity>("velocity").unwrap();
        let movers = world
            .create_archetype::<(Position, Velocity)>("mover", 10_000)
            .unwrap();

        let mut ids = Vec::with_capacity(10_000);
        for i in 0..10_000 {
            let bundle = ComponentBundle::new()
                .with(world.registry(), Velocity { dx: 1.0, dy: i as f32 })
                .unwrap();
            ids.push(world.spawn(movers, bundle).unwrap());
        }
        for (_, (pos, vel)) in world.query_mut::<(&mut Position, &Velocity)>().unwrap() {
            pos.x += vel.dx;
            pos.y += vel.dy;
        }
        // Remove every other entity; the rest must be intact.
        for id in ids.iter().step_by(2) {
            world.remove(*id).unwrap();
        }
        assert_eq!(world.entity_count(), 5_000);
        for (i, id) in ids.iter().enumerate().skip(1).step_by(2) {
            assert_eq!(
                world.get_component::<Position>(*id).unwrap(),
                &Position { x: 1.0, y: i as f32 }
            );
        }
        world.check_invariants().unwrap();
    }

    #[test]
    fn errors_render_useful_messages() {
        let mut world = setup_world();
        let dots = world.create_archetype::<(Position,)>("dot", 1).unwrap();
        let e = world.create_entity(dots).unwrap();
        let msg = world
            .set_component(e, Velocity::default())
            .unwrap_err()
            .to_string();
        assert!(msg.contains("dot"), "{msg}");
        assert!(msg.contains("Velocity"), "{msg}");
    }
}

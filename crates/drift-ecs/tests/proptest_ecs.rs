//! Property tests for storage operations.
//!
//! These tests use `proptest` to generate random sequences of create, remove
//! and set operations across several archetypes and verify that the dense-index
//! invariant, liveness and query counts hold after every step.

use drift_ecs::entity::EntityManager;
use drift_ecs::prelude::*;
use proptest::prelude::*;

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

#[derive(Debug, Default, Clone, PartialEq)]
struct Tag(u32);

/// Operations we can perform on the world.
#[derive(Debug, Clone)]
enum StorageOp {
    /// Create into archetype `n % 3`.
    Create(usize),
    /// Remove the `n % len`-th tracked entity.
    Remove(usize),
    /// Remove an id that has already been removed.
    RemoveStale(usize),
    SetPos(usize, f32, f32),
}

/// Strategy that generates finite (non-NaN, non-Inf) f32 values.
fn finite_f32() -> impl Strategy<Value = f32> {
    (-1_000_000i32..1_000_000i32).prop_map(|v| v as f32 * 0.01)
}

fn storage_op_strategy() -> impl Strategy<Value = StorageOp> {
    prop_oneof![
        3 => (0..3usize).prop_map(StorageOp::Create),
        2 => (0..100usize).prop_map(StorageOp::Remove),
        1 => (0..100usize).prop_map(StorageOp::RemoveStale),
        2 => (0..100usize, finite_f32(), finite_f32())
            .prop_map(|(i, x, y)| StorageOp::SetPos(i, x, y)),
    ]
}

const CAPACITY: usize = 16;

fn setup_world() -> (World, [ArchetypeId; 3]) {
    let mut world = World::with_config(WorldConfig { free_watermark: 4 });
    world.register_component::<Pos>("pos").unwrap();
    world.register_component::<Vel>("vel").unwrap();
    world.register_component::<Tag>("tag").unwrap();
    let archetypes = [
        world.create_archetype::<(Pos,)>("dot", CAPACITY).unwrap(),
        world.create_archetype::<(Pos, Vel)>("mover", CAPACITY).unwrap(),
        world
            .create_archetype::<(Pos, Vel, Tag)>("tagged", CAPACITY)
            .unwrap(),
    ];
    (world, archetypes)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    #[test]
    fn random_ops_preserve_invariants(ops in prop::collection::vec(storage_op_strategy(), 1..80)) {
        let (mut world, archetypes) = setup_world();
        let mut alive: Vec<(EntityId, Option<Pos>)> = Vec::new();
        let mut dead: Vec<EntityId> = Vec::new();

        for op in ops {
            match op {
                StorageOp::Create(n) => {
                    let archetype = archetypes[n % 3];
                    let full = world.store(archetype).unwrap().len() == CAPACITY;
                    match world.create_entity(archetype) {
                        Ok(e) => {
                            prop_assert!(!full);
                            alive.push((e, None));
                        }
                        Err(EcsError::CapacityExceeded { .. }) => prop_assert!(full),
                        Err(e) => prop_assert!(false, "unexpected error: {e}"),
                    }
                }
                StorageOp::Remove(i) => {
                    if !alive.is_empty() {
                        let (e, _) = alive.swap_remove(i % alive.len());
                        world.remove(e).unwrap();
                        dead.push(e);
                    }
                }
                StorageOp::RemoveStale(i) => {
                    if !dead.is_empty() {
                        let e = dead[i % dead.len()];
                        let is_stale_error = matches!(world.remove(e), Err(EcsError::StaleEntity { .. }));
                        prop_assert!(is_stale_error);
                    }
                }
                StorageOp::SetPos(i, x, y) => {
                    if !alive.is_empty() {
                        let slot = i % alive.len();
                        world.set_component(alive[slot].0, Pos { x, y }).unwrap();
                        alive[slot].1 = Some(Pos { x, y });
                    }
                }
            }

            // Swap-remove invariant: handles[entities[i]] == i in every store.
            world.check_invariants().unwrap();
            for store in world.stores() {
                for (row, e) in store.entities().iter().enumerate() {
                    prop_assert_eq!(store.get_handle(*e).index(), row);
                }
            }

            prop_assert_eq!(world.entity_count(), alive.len());
            for (e, pos) in &alive {
                prop_assert!(world.is_alive(*e));
                let expected = pos.clone().unwrap_or_default();
                prop_assert_eq!(world.get_component::<Pos>(*e).unwrap(), &expected);
            }
            for e in &dead {
                prop_assert!(!world.is_alive(*e));
            }

            // Query completeness for every required set.
            let pos_vel = world.mask_of::<(Pos, Vel)>().unwrap();
            let expected: usize = world
                .stores()
                .iter()
                .filter(|s| s.mask().contains_all(pos_vel))
                .map(|s| s.len())
                .sum();
            prop_assert_eq!(world.query::<(&Pos, &Vel)>().count(), expected);
            prop_assert_eq!(ComponentArray::<Pos>::fill(&world, pos_vel).unwrap().len(), expected);
            prop_assert_eq!(world.query::<(&Pos,)>().count(), alive.len());
        }
    }

    #[test]
    fn destroyed_ids_stay_dead_and_recycled_slots_advance(
        rounds in 1..600usize,
        watermark in 0..8usize,
    ) {
        let mut manager = EntityManager::with_free_watermark(watermark);
        let mut live: Vec<EntityId> = (0..=watermark).map(|_| manager.create().unwrap()).collect();
        let mut graveyard: Vec<EntityId> = Vec::new();

        for round in 0..rounds {
            let victim = live.remove(round % live.len());
            prop_assert!(manager.destroy(victim));
            prop_assert!(!manager.alive(victim));
            graveyard.push(victim);

            let fresh = manager.create().unwrap();
            if let Some(prev) = graveyard.iter().rev().find(|g| g.index() == fresh.index()) {
                prop_assert_eq!(fresh.generation(), prev.generation().wrapping_add(1));
            }
            live.push(fresh);
        }

        prop_assert_eq!(manager.alive_count(), live.len());
        for e in &live {
            prop_assert!(manager.alive(*e));
        }
    }
}

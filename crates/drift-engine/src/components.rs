//! Gameplay component types and the archetypes built from them.
//!
//! All components are plain `Copy` data with a `Default`, so a spawn that
//! leaves a component out of its bundle still gets a sensible value.

use drift_ecs::world::{ArchetypeId, World};
use drift_ecs::EcsError;
use serde::Deserialize;
use tracing::debug;

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// 2D position in world units.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_squared(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// 2D velocity in world units per second.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Velocity {
    pub dx: f32,
    pub dy: f32,
}

impl Velocity {
    pub fn new(dx: f32, dy: f32) -> Self {
        Self { dx, dy }
    }
}

/// Hit points. The entity dies when this reaches zero or below.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Health(pub i32);

/// Which side an entity fights for. Projectiles only hit entities of a
/// different faction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Faction {
    #[default]
    Neutral,
    Player,
    Enemy,
}

/// Seconds until the entity expires.
#[derive(Debug, Default, Clone, Copy, PartialEq, PartialOrd)]
pub struct Lifetime(pub f32);

/// Damage dealt on hit.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Damage(pub i32);

/// Register every gameplay component, in a fixed order so component type ids
/// are identical across runs.
pub fn register_game_components(world: &mut World) -> Result<(), EcsError> {
    world.register_component::<Position>("position")?;
    world.register_component::<Velocity>("velocity")?;
    world.register_component::<Health>("health")?;
    world.register_component::<Faction>("faction")?;
    world.register_component::<Lifetime>("lifetime")?;
    world.register_component::<Damage>("damage")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Archetypes
// ---------------------------------------------------------------------------

/// Per-archetype entity capacities.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ArchetypeCapacities {
    pub player: usize,
    pub enemy: usize,
    pub projectile: usize,
    pub debris: usize,
}

impl Default for ArchetypeCapacities {
    fn default() -> Self {
        Self {
            player: 1,
            enemy: 256,
            projectile: 1024,
            debris: 512,
        }
    }
}

/// Handles to the standard gameplay archetypes.
///
/// | archetype    | components                                              |
/// |--------------|---------------------------------------------------------|
/// | `player`     | Position, Velocity, Health, Faction                     |
/// | `enemy`      | Position, Velocity, Health, Faction, Damage             |
/// | `projectile` | Position, Velocity, Faction, Damage, Lifetime           |
/// | `debris`     | Position, Velocity, Lifetime                            |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameArchetypes {
    pub player: ArchetypeId,
    pub enemy: ArchetypeId,
    pub projectile: ArchetypeId,
    pub debris: ArchetypeId,
}

impl GameArchetypes {
    /// Create the four archetypes. The game components must already be
    /// registered (see [`register_game_components`]).
    pub fn create(world: &mut World, capacities: &ArchetypeCapacities) -> Result<Self, EcsError> {
        let archetypes = Self {
            player: world.create_archetype::<(Position, Velocity, Health, Faction)>(
                "player",
                capacities.player,
            )?,
            enemy: world.create_archetype::<(Position, Velocity, Health, Faction, Damage)>(
                "enemy",
                capacities.enemy,
            )?,
            projectile: world.create_archetype::<(Position, Velocity, Faction, Damage, Lifetime)>(
                "projectile",
                capacities.projectile,
            )?,
            debris: world.create_archetype::<(Position, Velocity, Lifetime)>(
                "debris",
                capacities.debris,
            )?,
        };
        debug!(?capacities, "created game archetypes");
        Ok(archetypes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game_world() -> (World, GameArchetypes) {
        let mut world = World::new();
        register_game_components(&mut world).unwrap();
        let archetypes = GameArchetypes::create(&mut world, &ArchetypeCapacities::default()).unwrap();
        (world, archetypes)
    }

    #[test]
    fn registration_order_is_fixed() {
        let (world, _) = game_world();
        let registry = world.registry();
        let indices = [
            registry.lookup::<Position>(),
            registry.lookup::<Velocity>(),
            registry.lookup::<Health>(),
            registry.lookup::<Faction>(),
            registry.lookup::<Lifetime>(),
            registry.lookup::<Damage>(),
        ]
        .map(|id| id.unwrap().index());
        assert_eq!(indices, [0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn archetypes_have_expected_capacities() {
        let (world, archetypes) = game_world();
        assert_eq!(world.archetype_count(), 4);
        assert_eq!(world.store(archetypes.player).unwrap().capacity(), 1);
        assert_eq!(world.store(archetypes.projectile).unwrap().capacity(), 1024);
        assert_eq!(world.archetype_by_name("debris"), Some(archetypes.debris));
    }

    #[test]
    fn archetypes_require_registration() {
        let mut world = World::new();
        let err = GameArchetypes::create(&mut world, &ArchetypeCapacities::default()).unwrap_err();
        assert!(matches!(err, EcsError::UnknownComponent { .. }));
    }

    #[test]
    fn capacities_deserialize_with_defaults() {
        let caps: ArchetypeCapacities = serde_json::from_str(r#"{"enemy": 8}"#).unwrap();
        assert_eq!(caps.enemy, 8);
        assert_eq!(caps.projectile, 1024);
    }

    #[test]
    fn spawned_entities_start_from_defaults() {
        let (mut world, archetypes) = game_world();
        let e = world.create_entity(archetypes.enemy).unwrap();
        assert_eq!(world.get_component::<Faction>(e).unwrap(), &Faction::Neutral);
        assert_eq!(world.get_component::<Health>(e).unwrap(), &Health(0));
        assert!(!world.has_component::<Lifetime>(e));
    }
}

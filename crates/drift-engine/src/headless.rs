//! Headless simulation runner.
//!
//! Builds a world with the standard game archetypes, scatters enemies with a
//! seeded RNG, and runs the tick loop with the player firing at a random
//! enemy on a fixed cadence. No window and no wall clock: every run with the
//! same [`HeadlessConfig`] produces the same [`HeadlessSummary`].

use anyhow::Context;
use drift_ecs::entity::EntityId;
use drift_ecs::world::{ComponentBundle, World, WorldConfig};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde::Deserialize;
use tracing::info;

use crate::components::{
    register_game_components, ArchetypeCapacities, Damage, Faction, GameArchetypes, Health,
    Lifetime, Position, Velocity,
};
use crate::error::EngineError;
use crate::systems::register_game_systems;
use crate::tick::{TickConfig, TickLoop};

/// Projectile speed in world units per second.
const SHOT_SPEED: f32 = 12.0;
const SHOT_LIFETIME: f32 = 2.0;
const SHOT_DAMAGE: i32 = 3;
const PLAYER_HEALTH: i32 = 100;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HeadlessConfig {
    pub tick: TickConfig,
    pub world: WorldConfig,
    pub capacities: ArchetypeCapacities,
    /// RNG seed for enemy placement and target picking.
    pub seed: u64,
    /// Number of ticks to simulate.
    pub ticks: u64,
    /// Enemies spawned before the first tick.
    pub enemies: usize,
    /// The player fires once every `fire_every` ticks.
    pub fire_every: u64,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            tick: TickConfig::default(),
            world: WorldConfig::default(),
            capacities: ArchetypeCapacities::default(),
            seed: 0x5eed,
            ticks: 600,
            enemies: 16,
            fire_every: 10,
        }
    }
}

impl HeadlessConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        self.tick.validate()?;
        if self.fire_every == 0 {
            return Err(EngineError::InvalidConfig(
                "fire_every must be at least 1".to_owned(),
            ));
        }
        if self.enemies > self.capacities.enemy {
            return Err(EngineError::InvalidConfig(format!(
                "{} enemies do not fit in an enemy capacity of {}",
                self.enemies, self.capacities.enemy
            )));
        }
        if self.capacities.player == 0 {
            return Err(EngineError::InvalidConfig(
                "player capacity must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn from_json_str(text: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Totals from a headless run.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessSummary {
    pub ticks: u64,
    pub sim_time: f64,
    pub shots_fired: u64,
    /// Entities spawned by deferred commands (projectiles).
    pub spawned: usize,
    pub removed: usize,
    pub failed_commands: usize,
    pub surviving_enemies: usize,
    pub live_entities: usize,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Run the headless demo described by `config`.
pub fn run_headless(config: &HeadlessConfig) -> Result<HeadlessSummary, anyhow::Error> {
    config.validate().context("invalid headless config")?;

    let mut world = World::with_config(config.world.clone());
    register_game_components(&mut world)?;
    let archetypes = GameArchetypes::create(&mut world, &config.capacities)?;
    let mut rng = Pcg64::seed_from_u64(config.seed);

    let player = spawn_player(&mut world, &archetypes)?;
    for _ in 0..config.enemies {
        spawn_enemy(&mut world, &archetypes, &mut rng)?;
    }
    info!(enemies = config.enemies, seed = config.seed, "world populated");

    let mut tick_loop = TickLoop::new(world, config.tick.clone())?;
    register_game_systems(&mut tick_loop)?;

    let mut shots_fired = 0;
    let mut spawned = 0;
    let mut removed = 0;
    let mut failed_commands = 0;
    for tick in 0..config.ticks {
        if tick % config.fire_every == 0 && queue_shot(&mut tick_loop, &archetypes, player, &mut rng)? {
            shots_fired += 1;
        }
        let report = tick_loop.tick();
        spawned += report.spawned.len();
        removed += report.removed.len();
        failed_commands += report.failed;
    }

    let world = tick_loop.world();
    world
        .check_invariants()
        .context("storage invariants broken after headless run")?;
    let summary = HeadlessSummary {
        ticks: tick_loop.tick_count(),
        sim_time: tick_loop.sim_time(),
        shots_fired,
        spawned,
        removed,
        failed_commands,
        surviving_enemies: world.store(archetypes.enemy).map_or(0, |s| s.len()),
        live_entities: world.entity_count(),
    };
    info!(
        ticks = summary.ticks,
        shots = summary.shots_fired,
        removed = summary.removed,
        surviving_enemies = summary.surviving_enemies,
        "headless run complete"
    );
    Ok(summary)
}

fn spawn_player(
    world: &mut World,
    archetypes: &GameArchetypes,
) -> Result<EntityId, anyhow::Error> {
    let registry = world.registry();
    let bundle = ComponentBundle::new()
        .with(registry, Health(PLAYER_HEALTH))?
        .with(registry, Faction::Player)?;
    Ok(world.spawn(archetypes.player, bundle)?)
}

fn spawn_enemy(
    world: &mut World,
    archetypes: &GameArchetypes,
    rng: &mut Pcg64,
) -> Result<(), anyhow::Error> {
    let registry = world.registry();
    let bundle = ComponentBundle::new()
        .with(
            registry,
            Position::new(rng.gen_range(2.0..10.0), rng.gen_range(-5.0..5.0)),
        )?
        .with(registry, Velocity::new(-rng.gen_range(0.1..0.5), 0.0))?
        .with(registry, Health(rng.gen_range(3..=9)))?
        .with(registry, Faction::Enemy)?
        .with(registry, Damage(1))?;
    world.spawn(archetypes.enemy, bundle)?;
    Ok(())
}

/// Queue a projectile from the player toward a random live enemy. Returns
/// `false` when there is nothing to shoot at.
fn queue_shot(
    tick_loop: &mut TickLoop,
    archetypes: &GameArchetypes,
    player: EntityId,
    rng: &mut Pcg64,
) -> Result<bool, anyhow::Error> {
    let world = tick_loop.world();
    if !world.is_alive(player) {
        return Ok(false);
    }
    let origin = *world.get_component::<Position>(player)?;
    let Some(enemies) = world.store(archetypes.enemy) else {
        return Ok(false);
    };
    if enemies.is_empty() {
        return Ok(false);
    }
    let target_row = rng.gen_range(0..enemies.len());
    let target = enemies.column::<Position>()?[target_row];

    let (dx, dy) = (target.x - origin.x, target.y - origin.y);
    let distance = (dx * dx + dy * dy).sqrt().max(f32::EPSILON);
    let registry = world.registry();
    let bundle = ComponentBundle::new()
        .with(registry, origin)?
        .with(
            registry,
            Velocity::new(dx / distance * SHOT_SPEED, dy / distance * SHOT_SPEED),
        )?
        .with(registry, Faction::Player)?
        .with(registry, Damage(SHOT_DAMAGE))?
        .with(registry, Lifetime(SHOT_LIFETIME))?;
    tick_loop.commands_mut().spawn(archetypes.projectile, bundle);
    Ok(true)
}

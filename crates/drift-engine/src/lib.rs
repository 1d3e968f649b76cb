//! Drift Engine -- fixed-timestep game loop over [`drift_ecs`] storage.
//!
//! This crate builds on [`drift_ecs`] to provide the simulation driver: a
//! tick loop that runs systems in a fixed stage order, flushes their deferred
//! spawns and deletions through the
//! [`CommandBuffer`](drift_ecs::command::CommandBuffer), and advances
//! simulation time. It also carries the 2D game layer: component types,
//! typed accessors, gameplay systems and a headless runner.
//!
//! # Quick Start
//!
//! ```
//! use drift_engine::prelude::*;
//!
//! let mut world = World::new();
//! register_game_components(&mut world).unwrap();
//! let archetypes = GameArchetypes::create(&mut world, &ArchetypeCapacities::default()).unwrap();
//!
//! let enemy = world.create_entity(archetypes.enemy).unwrap();
//! world.set_health(enemy, Health(10)).unwrap();
//! world.set_velocity(enemy, Velocity::new(2.0, 0.0)).unwrap();
//!
//! let config = TickConfig { fixed_dt: 0.5, ..Default::default() };
//! let mut tick_loop = TickLoop::new(world, config).unwrap();
//! register_game_systems(&mut tick_loop).unwrap();
//! tick_loop.run_ticks(1);
//!
//! assert_eq!(tick_loop.world().get_position(enemy).unwrap(), Position::new(1.0, 0.0));
//! ```

#![deny(unsafe_code)]

pub mod access;
pub mod components;
pub mod error;
pub mod headless;
pub mod systems;
pub mod tick;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the ECS crate for convenience.
pub use drift_ecs;

pub use error::EngineError;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Install a `tracing` subscriber that honours `RUST_LOG`, defaulting to
/// `info`. Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    // Re-export everything from the ECS prelude.
    pub use drift_ecs::prelude::*;

    pub use crate::access::GameAccess;
    pub use crate::components::{
        register_game_components, ArchetypeCapacities, Damage, Faction, GameArchetypes, Health,
        Lifetime, Position, Velocity,
    };
    pub use crate::error::EngineError;
    pub use crate::headless::{run_headless, HeadlessConfig, HeadlessSummary};
    pub use crate::systems::{
        collision_system, death_system, lifetime_system, movement_system, register_game_systems,
    };
    pub use crate::tick::{Stage, SystemFn, TickConfig, TickContext, TickDiagnostics, TickLoop};
}

//! Gameplay systems.
//!
//! Each function matches [`SystemFn`](crate::tick::SystemFn) and is meant to
//! be registered in the [`Stage`](crate::tick::Stage) named in its docs.
//! Systems write components in place and queue removals in the command
//! buffer, so row order never changes while a tick is running.

use drift_ecs::command::CommandBuffer;
use drift_ecs::entity::EntityId;
use drift_ecs::world::World;
use drift_ecs::EcsError;
use tracing::trace;

use crate::access::GameAccess;
use crate::components::{Damage, Faction, Health, Lifetime, Position, Velocity};
use crate::error::EngineError;
use crate::tick::{Stage, TickContext, TickLoop};

/// Distance within which a projectile hits a target.
pub const HIT_RADIUS: f32 = 0.5;

/// `Stage::Movement`: integrate velocity into position.
pub fn movement_system(
    world: &mut World,
    _cmds: &mut CommandBuffer,
    ctx: &TickContext,
) -> Result<(), EcsError> {
    let dt = ctx.dt as f32;
    for (_, (pos, vel)) in world.query_mut::<(&mut Position, &Velocity)>()? {
        pos.x += vel.dx * dt;
        pos.y += vel.dy * dt;
    }
    Ok(())
}

/// `Stage::CollisionResolution`: every projectile hits at most one target of
/// another faction within [`HIT_RADIUS`], deals its damage and is marked for
/// deletion. Projectiles and targets are visited in query order, so the
/// outcome is deterministic.
pub fn collision_system(
    world: &mut World,
    cmds: &mut CommandBuffer,
    _ctx: &TickContext,
) -> Result<(), EcsError> {
    let projectiles: Vec<(EntityId, Position, Faction, i32)> = world
        .query::<(&Position, &Faction, &Damage, &Lifetime)>()
        .map(|(e, (pos, faction, damage, _))| (e, *pos, *faction, damage.0))
        .collect();
    if projectiles.is_empty() {
        return Ok(());
    }
    let mut targets: Vec<(EntityId, Position, Faction, i32)> = world
        .query::<(&Position, &Faction, &Health)>()
        .map(|(e, (pos, faction, health))| (e, *pos, *faction, health.0))
        .collect();

    let radius_sq = HIT_RADIUS * HIT_RADIUS;
    for (projectile, pos, faction, damage) in projectiles {
        let hit = targets.iter_mut().find(|(_, target_pos, target_faction, hp)| {
            *target_faction != faction && *hp > 0 && pos.distance_squared(target_pos) <= radius_sq
        });
        if let Some((target, _, _, hp)) = hit {
            *hp = world.apply_damage(*target, damage)?.0;
            cmds.mark_for_deletion(projectile);
            trace!(?projectile, ?target, damage, remaining = *hp, "projectile hit");
        }
    }
    Ok(())
}

/// `Stage::Lifetime`: count down every [`Lifetime`] and mark expired
/// entities for deletion.
pub fn lifetime_system(
    world: &mut World,
    cmds: &mut CommandBuffer,
    ctx: &TickContext,
) -> Result<(), EcsError> {
    let dt = ctx.dt as f32;
    for (entity, (lifetime,)) in world.query_mut::<(&mut Lifetime,)>()? {
        lifetime.0 -= dt;
        if lifetime.0 <= 0.0 {
            cmds.mark_for_deletion(entity);
        }
    }
    Ok(())
}

/// `Stage::Removal`: mark every entity whose [`Health`] is zero or below.
pub fn death_system(
    world: &mut World,
    cmds: &mut CommandBuffer,
    _ctx: &TickContext,
) -> Result<(), EcsError> {
    for (entity, (health,)) in world.query::<(&Health,)>() {
        if health.0 <= 0 {
            cmds.mark_for_deletion(entity);
        }
    }
    Ok(())
}

/// Register the four gameplay systems in their stages.
pub fn register_game_systems(tick_loop: &mut TickLoop) -> Result<(), EngineError> {
    tick_loop.add_system(Stage::Movement, "movement", movement_system)?;
    tick_loop.add_system(Stage::CollisionResolution, "collision", collision_system)?;
    tick_loop.add_system(Stage::Lifetime, "lifetime", lifetime_system)?;
    tick_loop.add_system(Stage::Removal, "death", death_system)?;
    Ok(())
}

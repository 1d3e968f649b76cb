//! Typed gameplay accessors on [`World`].
//!
//! Thin wrappers over `get_component` / `set_component` that return copies,
//! so callers don't hold a borrow of the world across calls.

use drift_ecs::entity::EntityId;
use drift_ecs::world::World;
use drift_ecs::EcsError;

use crate::components::{Health, Position, Velocity};

/// Accessor methods for the common gameplay components.
///
/// Every method fails with [`EcsError::StaleEntity`] for dead ids and
/// [`EcsError::ComponentNotInArchetype`] when the entity's archetype lacks the
/// component.
pub trait GameAccess {
    fn get_position(&self, id: EntityId) -> Result<Position, EcsError>;
    fn get_velocity(&self, id: EntityId) -> Result<Velocity, EcsError>;
    fn get_health(&self, id: EntityId) -> Result<Health, EcsError>;

    fn set_position(&mut self, id: EntityId, value: Position) -> Result<(), EcsError>;
    fn set_velocity(&mut self, id: EntityId, value: Velocity) -> Result<(), EcsError>;
    fn set_health(&mut self, id: EntityId, value: Health) -> Result<(), EcsError>;

    /// Subtract `amount` from the entity's health and return what is left.
    fn apply_damage(&mut self, id: EntityId, amount: i32) -> Result<Health, EcsError>;
}

impl GameAccess for World {
    fn get_position(&self, id: EntityId) -> Result<Position, EcsError> {
        self.get_component::<Position>(id).copied()
    }

    fn get_velocity(&self, id: EntityId) -> Result<Velocity, EcsError> {
        self.get_component::<Velocity>(id).copied()
    }

    fn get_health(&self, id: EntityId) -> Result<Health, EcsError> {
        self.get_component::<Health>(id).copied()
    }

    fn set_position(&mut self, id: EntityId, value: Position) -> Result<(), EcsError> {
        self.set_component(id, value)
    }

    fn set_velocity(&mut self, id: EntityId, value: Velocity) -> Result<(), EcsError> {
        self.set_component(id, value)
    }

    fn set_health(&mut self, id: EntityId, value: Health) -> Result<(), EcsError> {
        self.set_component(id, value)
    }

    fn apply_damage(&mut self, id: EntityId, amount: i32) -> Result<Health, EcsError> {
        let health = self.get_component_mut::<Health>(id)?;
        health.0 = health.0.saturating_sub(amount);
        Ok(*health)
    }
}

//! Deferred structural changes.
//!
//! Systems never spawn or remove entities while iterating; swap-remove would
//! relocate rows underneath the iteration. Instead they record requests in a
//! [`CommandBuffer`], which is flushed at a well-defined point (the end of a
//! tick) by [`CommandBuffer::apply`].
//!
//! Spawns are applied first, in the order they were queued, then the deletion
//! sweep runs in the order entities were marked. A failing command is logged
//! and counted; it never stops the rest of the flush.
//!
//! # Example
//!
//! ```
//! use drift_ecs::prelude::*;
//!
//! #[derive(Debug, Default, Clone, PartialEq)]
//! struct Lifetime(f32);
//!
//! let mut world = World::new();
//! world.register_component::<Lifetime>("lifetime").unwrap();
//! let sparks = world.create_archetype::<(Lifetime,)>("spark", 16).unwrap();
//! let old = world.create_entity(sparks).unwrap();
//!
//! let mut cmds = CommandBuffer::new();
//! cmds.spawn(sparks, ComponentBundle::new().with(world.registry(), Lifetime(0.5)).unwrap());
//! cmds.mark_for_deletion(old);
//!
//! let report = cmds.apply(&mut world);
//! assert_eq!(report.spawned.len(), 1);
//! assert_eq!(report.removed, vec![old]);
//! assert!(!world.is_alive(old));
//! ```

use std::collections::HashSet;

use tracing::warn;

use crate::entity::EntityId;
use crate::world::{ArchetypeId, ComponentBundle, World};

// ---------------------------------------------------------------------------
// ApplyReport
// ---------------------------------------------------------------------------

/// Outcome of one [`CommandBuffer::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Entities created by queued spawns, in queue order.
    pub spawned: Vec<EntityId>,
    /// Entities removed by the deletion sweep, in mark order.
    pub removed: Vec<EntityId>,
    /// Commands that could not be applied.
    pub failed: usize,
}

impl ApplyReport {
    /// Whether nothing was applied and nothing failed.
    pub fn is_empty(&self) -> bool {
        self.spawned.is_empty() && self.removed.is_empty() && self.failed == 0
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: ApplyReport) {
        self.spawned.extend(other.spawned);
        self.removed.extend(other.removed);
        self.failed += other.failed;
    }
}

// ---------------------------------------------------------------------------
// CommandBuffer
// ---------------------------------------------------------------------------

/// Queue of spawn and deletion requests recorded during a tick.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    spawns: Vec<(ArchetypeId, ComponentBundle)>,
    deletions: Vec<EntityId>,
    marked: HashSet<EntityId>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue creation of an entity in `archetype` initialised from `bundle`.
    pub fn spawn(&mut self, archetype: ArchetypeId, bundle: ComponentBundle) {
        self.spawns.push((archetype, bundle));
    }

    /// Queue creation of an entity with every component defaulted.
    pub fn create(&mut self, archetype: ArchetypeId) {
        self.spawn(archetype, ComponentBundle::new());
    }

    /// Queue `id` for removal at the next flush.
    ///
    /// Marking the same id twice is harmless; returns `false` if it was
    /// already queued.
    pub fn mark_for_deletion(&mut self, id: EntityId) -> bool {
        if !self.marked.insert(id) {
            return false;
        }
        self.deletions.push(id);
        true
    }

    /// Whether `id` is already queued for removal.
    pub fn is_marked(&self, id: EntityId) -> bool {
        self.marked.contains(&id)
    }

    /// Entities queued for removal, in mark order.
    pub fn pending_deletions(&self) -> &[EntityId] {
        &self.deletions
    }

    /// Number of queued spawns.
    pub fn pending_spawns(&self) -> usize {
        self.spawns.len()
    }

    /// Total queued commands.
    pub fn len(&self) -> usize {
        self.spawns.len() + self.deletions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spawns.is_empty() && self.deletions.is_empty()
    }

    /// Drop every queued command without applying it.
    pub fn clear(&mut self) {
        self.spawns.clear();
        self.deletions.clear();
        self.marked.clear();
    }

    /// Apply and drain every queued command: spawns first, then deletions.
    pub fn apply(&mut self, world: &mut World) -> ApplyReport {
        let mut report = ApplyReport::default();

        for (index, (archetype, bundle)) in std::mem::take(&mut self.spawns).into_iter().enumerate()
        {
            match world.spawn(archetype, bundle) {
                Ok(id) => report.spawned.push(id),
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        command_index = index,
                        archetype = archetype.index(),
                        error = %e,
                        "deferred spawn failed"
                    );
                }
            }
        }

        self.marked.clear();
        for id in std::mem::take(&mut self.deletions) {
            match world.remove(id) {
                Ok(()) => report.removed.push(id),
                Err(e) => {
                    report.failed += 1;
                    warn!(entity = %id, error = %e, "deferred removal failed");
                }
            }
        }

        if !report.is_empty() {
            tracing::debug!(
                spawned = report.spawned.len(),
                removed = report.removed.len(),
                failed = report.failed,
                "applied command buffer"
            );
        }
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

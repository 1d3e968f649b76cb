//! Fixed-timestep tick loop with a staged system pipeline.
//!
//! The [`TickLoop`] drives the simulation forward. Each tick:
//!
//! 1. Every registered system runs, ordered by [`Stage`] and then by
//!    registration order within a stage. Systems may write components in
//!    place but queue structural changes (spawns, removals) in the shared
//!    [`CommandBuffer`].
//! 2. The command buffer is flushed: queued spawns, then the deletion sweep.
//! 3. The tick counter advances.
//!
//! [`TickLoop::advance`] feeds variable frame times through an accumulator and
//! runs as many whole ticks as fit, so simulation always steps by the same
//! `fixed_dt`. A pause timer can hold the simulation still without touching
//! storage.
//!
//! # Example
//!
//! ```
//! use drift_engine::prelude::*;
//!
//! let world = World::new();
//! let mut tick_loop = TickLoop::new(world, TickConfig::default()).unwrap();
//!
//! tick_loop
//!     .add_system(Stage::Movement, "noop", |_world, _cmds, _ctx| Ok(()))
//!     .unwrap();
//!
//! // Two and a half ticks worth of frame time runs two ticks.
//! let steps = tick_loop.advance(2.5 / 60.0);
//! assert_eq!(steps, 2);
//! assert_eq!(tick_loop.tick_count(), 2);
//! ```

use std::time::{Duration, Instant};

use drift_ecs::command::{ApplyReport, CommandBuffer};
use drift_ecs::world::World;
use drift_ecs::EcsError;
use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// TickConfig
// ---------------------------------------------------------------------------

/// Configuration for the fixed-timestep tick loop.
///
/// The `fixed_dt` is the duration in seconds of each simulation tick. A value
/// of `1.0 / 60.0` gives 60 ticks per second.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Fixed time step in seconds per tick. Must be positive and finite.
    pub fixed_dt: f64,
    /// Most ticks [`TickLoop::advance`] runs for one frame. Backlog beyond
    /// this is dropped.
    pub max_steps_per_frame: u32,
}

impl Default for TickConfig {
    /// Defaults to 60 Hz with at most 8 catch-up ticks per frame.
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            max_steps_per_frame: 8,
        }
    }
}

impl TickConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.fixed_dt > 0.0 && self.fixed_dt.is_finite()) {
            return Err(EngineError::InvalidConfig(format!(
                "fixed_dt must be positive and finite, got {}",
                self.fixed_dt
            )));
        }
        if self.max_steps_per_frame == 0 {
            return Err(EngineError::InvalidConfig(
                "max_steps_per_frame must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Input,
    Movement,
    CollisionDetection,
    CollisionResolution,
    /// Lifetime countdown and cleanup marking.
    Lifetime,
    /// Systems that queue spawns.
    Spawn,
    /// Last chance to mark entities before the flush.
    Removal,
}

impl Stage {
    /// Every stage in execution order.
    pub const ALL: [Stage; 7] = [
        Stage::Input,
        Stage::Movement,
        Stage::CollisionDetection,
        Stage::CollisionResolution,
        Stage::Lifetime,
        Stage::Spawn,
        Stage::Removal,
    ];
}

// ---------------------------------------------------------------------------
// TickContext
// ---------------------------------------------------------------------------

/// Per-tick values handed to every system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickContext {
    /// Index of the tick being run (0 for the first tick).
    pub tick: u64,
    /// Fixed time step in seconds.
    pub dt: f64,
    /// Simulation time at the start of this tick.
    pub sim_time: f64,
}

// ---------------------------------------------------------------------------
// TickDiagnostics
// ---------------------------------------------------------------------------

/// Timing diagnostics for the last tick.
#[derive(Debug, Clone, Default)]
pub struct TickDiagnostics {
    /// Wall-clock time per system (in order of execution).
    pub system_times: Vec<(String, Duration)>,
    /// Total time for the tick (systems + command apply).
    pub total_time: Duration,
    /// Time spent applying commands.
    pub command_apply_time: Duration,
    /// Systems that returned an error this tick.
    pub failed_systems: usize,
}

// ---------------------------------------------------------------------------
// SystemFn
// ---------------------------------------------------------------------------

/// A system function run once per tick.
///
/// Systems get the [`World`] mutably so they can update components in place.
/// Spawns and removals go through the [`CommandBuffer`]; calling
/// `World::remove` from a system while another system's view is live is not
/// possible, but removing mid-pipeline would still reorder rows for later
/// systems in the same tick.
pub type SystemFn = fn(&mut World, &mut CommandBuffer, &TickContext) -> Result<(), EcsError>;

#[derive(Debug)]
struct RegisteredSystem {
    name: String,
    stage: Stage,
    func: SystemFn,
}

// ---------------------------------------------------------------------------
// TickLoop
// ---------------------------------------------------------------------------

/// The fixed-timestep tick loop.
///
/// Owns the [`World`] and the per-tick [`CommandBuffer`]. Given the same
/// initial world, the same systems and the same frame times, every run
/// produces the same results: system order is fixed, the command flush is
/// FIFO and simulation time is `tick_count * fixed_dt`.
pub struct TickLoop {
    world: World,
    command_buffer: CommandBuffer,
    /// Sorted by stage, then registration order.
    systems: Vec<RegisteredSystem>,
    tick_counter: u64,
    config: TickConfig,
    /// Unsimulated frame time, always below `fixed_dt` between frames.
    accumulator: f64,
    /// Seconds of pause left.
    pause_remaining: f64,
    last_diagnostics: TickDiagnostics,
}

impl std::fmt::Debug for TickLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickLoop")
            .field("tick", &self.tick_counter)
            .field("systems", &self.system_names())
            .field("config", &self.config)
            .field("paused", &self.is_paused())
            .finish()
    }
}

impl TickLoop {
    /// Create a tick loop around `world`.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidConfig`] if `config` fails validation.
    pub fn new(world: World, config: TickConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            world,
            command_buffer: CommandBuffer::new(),
            systems: Vec::new(),
            tick_counter: 0,
            config,
            accumulator: 0.0,
            pause_remaining: 0.0,
            last_diagnostics: TickDiagnostics::default(),
        })
    }

    /// Register a system in `stage`. Within a stage, systems run in the order
    /// they were added.
    pub fn add_system(&mut self, stage: Stage, name: &str, func: SystemFn) -> Result<(), EngineError> {
        if self.systems.iter().any(|s| s.name == name) {
            return Err(EngineError::DuplicateSystem {
                name: name.to_owned(),
            });
        }
        let at = self.systems.partition_point(|s| s.stage <= stage);
        self.systems.insert(
            at,
            RegisteredSystem {
                name: name.to_owned(),
                stage,
                func,
            },
        );
        debug!(system = name, ?stage, "registered system");
        Ok(())
    }

    /// Execute one simulation tick and flush the command buffer.
    ///
    /// A system that returns an error is logged and skipped; the remaining
    /// systems and the flush still run.
    pub fn tick(&mut self) -> ApplyReport {
        let tick_start = Instant::now();
        let ctx = TickContext {
            tick: self.tick_counter,
            dt: self.config.fixed_dt,
            sim_time: self.sim_time(),
        };
        let mut system_times = Vec::with_capacity(self.systems.len());
        let mut failed_systems = 0;

        for system in &self.systems {
            let sys_start = Instant::now();
            if let Err(e) = (system.func)(&mut self.world, &mut self.command_buffer, &ctx) {
                failed_systems += 1;
                warn!(
                    tick = ctx.tick,
                    system = %system.name,
                    stage = ?system.stage,
                    error = %e,
                    "system failed"
                );
            }
            system_times.push((system.name.clone(), sys_start.elapsed()));
        }

        let apply_start = Instant::now();
        let report = self.command_buffer.apply(&mut self.world);
        let command_apply_time = apply_start.elapsed();

        self.tick_counter += 1;
        self.last_diagnostics = TickDiagnostics {
            system_times,
            total_time: tick_start.elapsed(),
            command_apply_time,
            failed_systems,
        };
        trace!(
            tick = ctx.tick,
            spawned = report.spawned.len(),
            removed = report.removed.len(),
            failed = report.failed,
            "tick complete"
        );
        report
    }

    /// Run `count` ticks back to back, merging their reports.
    pub fn run_ticks(&mut self, count: u64) -> ApplyReport {
        let mut total = ApplyReport::default();
        for _ in 0..count {
            total.merge(self.tick());
        }
        total
    }

    /// Feed `frame_dt` seconds of wall time into the accumulator and run every
    /// whole tick that fits, up to `max_steps_per_frame`. Returns the number
    /// of ticks run.
    ///
    /// While paused, frame time is spent on the pause instead; time left over
    /// once the pause ends is simulated normally. Negative or non-finite
    /// frame times are ignored.
    pub fn advance(&mut self, frame_dt: f64) -> u32 {
        if !(frame_dt.is_finite() && frame_dt > 0.0) {
            return 0;
        }
        let mut frame_dt = frame_dt;
        if self.pause_remaining > 0.0 {
            let spent = frame_dt.min(self.pause_remaining);
            self.pause_remaining -= spent;
            frame_dt -= spent;
            if self.pause_remaining <= 0.0 {
                self.pause_remaining = 0.0;
                debug!(tick = self.tick_counter, "pause elapsed");
            }
            if frame_dt <= 0.0 {
                return 0;
            }
        }

        let dt = self.config.fixed_dt;
        self.accumulator += frame_dt;
        let mut steps = 0;
        while self.accumulator >= dt && steps < self.config.max_steps_per_frame {
            self.tick();
            self.accumulator -= dt;
            steps += 1;
        }
        if self.accumulator >= dt {
            // `%` is exact, so the remainder lands in [0, dt) without drift.
            let remainder = self.accumulator % dt;
            let dropped = ((self.accumulator - remainder) / dt).round();
            self.accumulator = remainder.max(0.0);
            debug!(
                dropped_ticks = dropped as u64,
                "frame exceeded max_steps_per_frame; dropping backlog"
            );
        }
        steps
    }

    /// Fraction of a tick left in the accumulator, in `[0, 1)`. Useful for
    /// interpolating presentation between ticks.
    pub fn alpha(&self) -> f64 {
        self.accumulator / self.config.fixed_dt
    }

    /// Skip gameplay updates for `seconds` of frame time. Replaces any pause
    /// already running.
    pub fn pause_for(&mut self, seconds: f64) {
        self.pause_remaining = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        debug!(seconds = self.pause_remaining, "pausing simulation");
    }

    /// End a pause early.
    pub fn resume(&mut self) {
        self.pause_remaining = 0.0;
    }

    pub fn is_paused(&self) -> bool {
        self.pause_remaining > 0.0
    }

    /// Seconds of pause left.
    pub fn pause_remaining(&self) -> f64 {
        self.pause_remaining
    }

    // -- accessors ----------------------------------------------------------

    /// The number of ticks executed so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_counter
    }

    /// The current simulation time in seconds.
    ///
    /// Computed as `tick_count * fixed_dt` to avoid floating-point drift from
    /// repeated addition.
    pub fn sim_time(&self) -> f64 {
        self.tick_counter as f64 * self.config.fixed_dt
    }

    pub fn fixed_dt(&self) -> f64 {
        self.config.fixed_dt
    }

    pub fn config(&self) -> &TickConfig {
        &self.config
    }

    /// Read-only access to the world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access to the world, for setup between ticks.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Commands queued for the next flush.
    pub fn commands(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    /// Queue commands from outside a tick; they are applied at the end of the
    /// next tick.
    pub fn commands_mut(&mut self) -> &mut CommandBuffer {
        &mut self.command_buffer
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// The names of all registered systems, in execution order.
    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name.as_str()).collect()
    }

    /// Diagnostics from the last tick (timing per system).
    pub fn last_diagnostics(&self) -> &TickDiagnostics {
        &self.last_diagnostics
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

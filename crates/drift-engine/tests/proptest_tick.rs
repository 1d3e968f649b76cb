//! Property tests for the frame-time accumulator.
//!
//! Frame times are multiples of 1/8 s and `fixed_dt` is 1/4 s, so every sum
//! is exact in binary floating point and tick counts can be compared exactly.

use drift_engine::prelude::*;
use proptest::prelude::*;

const DT: f64 = 0.25;

fn tick_loop(max_steps_per_frame: u32) -> TickLoop {
    TickLoop::new(
        World::new(),
        TickConfig {
            fixed_dt: DT,
            max_steps_per_frame,
        },
    )
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn unclamped_advance_runs_every_whole_tick(eighths in prop::collection::vec(0u32..40, 1..60)) {
        let mut tl = tick_loop(u32::MAX);
        let mut total_steps = 0u64;
        for &k in &eighths {
            total_steps += u64::from(tl.advance(f64::from(k) / 8.0));
            prop_assert!((0.0..1.0).contains(&tl.alpha()));
        }
        let total_eighths: u64 = eighths.iter().map(|&k| u64::from(k)).sum();
        prop_assert_eq!(total_steps, total_eighths / 2);
        prop_assert_eq!(tl.tick_count(), total_steps);
        prop_assert_eq!(tl.sim_time(), total_steps as f64 * DT);
    }

    #[test]
    fn clamped_advance_never_exceeds_max(
        eighths in prop::collection::vec(0u32..200, 1..40),
        max_steps in 1u32..6,
    ) {
        let mut tl = tick_loop(max_steps);
        for &k in &eighths {
            let steps = tl.advance(f64::from(k) / 8.0);
            prop_assert!(steps <= max_steps);
            prop_assert!((0.0..1.0).contains(&tl.alpha()));
        }
    }

    #[test]
    fn pause_swallows_exactly_its_duration(
        pause_eighths in 0u32..40,
        eighths in prop::collection::vec(0u32..40, 1..30),
    ) {
        let mut tl = tick_loop(u32::MAX);
        tl.pause_for(f64::from(pause_eighths) / 8.0);
        for &k in &eighths {
            tl.advance(f64::from(k) / 8.0);
        }
        let total: u64 = eighths.iter().map(|&k| u64::from(k)).sum();
        let simulated = total.saturating_sub(u64::from(pause_eighths));
        prop_assert_eq!(tl.tick_count(), simulated / 2);
        prop_assert_eq!(tl.is_paused(), total < u64::from(pause_eighths));
    }
}

//! Run the headless demo and print its summary.
//!
//! ```text
//! cargo run -p drift-engine --example headless [config.json]
//! ```
//!
//! Set `RUST_LOG=debug` for archetype and pause logging, `trace` for per-tick
//! output.

use anyhow::Context;
use drift_engine::headless::{run_headless, HeadlessConfig};

fn main() -> Result<(), anyhow::Error> {
    drift_engine::init_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {path}"))?;
            HeadlessConfig::from_json_str(&text)?
        }
        None => HeadlessConfig::default(),
    };

    let summary = run_headless(&config)?;
    println!("{summary:#?}");
    Ok(())
}

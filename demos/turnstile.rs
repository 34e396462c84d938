//! Turnstile with SQLite persistence and transition history.
//!
//! Run with: cargo run --example turnstile
//!
//! Set `STATEKEEP_DB` to a file path to keep state between runs (defaults to
//! an in-memory database). Set `RUST_LOG=statekeep=debug` to see the engine's
//! logs.

use statekeep::{events, states, Context, MachineBuilder, SqliteStore};
use std::error::Error;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

states! { LOCKED, UNLOCKED }
events! { COIN, PUSH }

fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("statekeep=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let store = match std::env::var("STATEKEEP_DB") {
        Ok(path) if !path.is_empty() => {
            println!("Using SQLite database at {path}");
            SqliteStore::open(path)?
        }
        _ => {
            println!("STATEKEEP_DB not set, using in-memory SQLite database");
            SqliteStore::open_in_memory()?
        }
    };
    let store = Arc::new(store);
    let ctx = Context::background();

    println!("=== Turnstile with Persistence and History ===\n");

    let turnstile = MachineBuilder::new()
        .initial(LOCKED)
        .transition(LOCKED, COIN, UNLOCKED)
        .transition(UNLOCKED, PUSH, LOCKED)
        .machine_id("turnstile-01")
        .store(store)
        .build(&ctx)?;

    turnstile.register_entry_action(UNLOCKED, |_, _| {
        println!("  [entry] UNLOCKED: please pass through");
        Ok(())
    });
    turnstile.register_guard(LOCKED, COIN, |_, _| {
        println!("  [guard] checking coin... approved");
        true
    })?;

    let initial = turnstile.current_state();
    println!("Initial state (from database or initial): {initial}");

    let steps = [
        ("PUSH (no transition from LOCKED)", PUSH),
        ("COIN (unlocks)", COIN),
        ("PUSH (locks)", PUSH),
    ];
    for (i, (description, event)) in steps.iter().enumerate() {
        println!("\n{}. Sending {description}", i + 1);
        if let Err(err) = turnstile.transition(&ctx, event) {
            println!("  error: {err}");
        }
        println!("  current state: {}", turnstile.current_state());
    }

    println!("\n=== Transition History ===");
    for record in turnstile.history_iter(&ctx)? {
        let record = record?;
        println!(
            "  - from: {}, to: {}, event: {}, time: {}",
            record.from,
            record.to,
            record.event,
            record.timestamp.format("%H:%M:%S")
        );
    }

    Ok(())
}

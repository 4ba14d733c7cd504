//! Jad PPO entry point.
//!
//! ```bash
//! # Train with defaults (JAD_COUNT / HEALERS_PER_JAD read from the environment)
//! cargo run --release -- train
//!
//! # Train from a JSON run file
//! cargo run --release -- train run.json
//!
//! # Evaluate the best checkpoint
//! cargo run --release -- evaluate run.json
//! ```
#![recursion_limit = "256"]

mod evaluate;
mod run_config;
mod train;

use std::path::Path;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let config_path = args.get(2).map(Path::new);

    let result = match args.get(1).map(String::as_str) {
        Some("train") => train::run(config_path),
        Some("evaluate") => evaluate::run(config_path),
        Some(other) => {
            println!("Unknown command: {}", other);
            println!();
            print_usage();
            return;
        }
        None => {
            print_usage();
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn print_usage() {
    println!("Usage: jad <command> [run.json]");
    println!();
    println!("  train       Train a recurrent PPO agent against the simulator");
    println!("  evaluate    Play deterministic episodes with the best checkpoint");
    println!();
    println!("Without a run file, defaults are used. JAD_COUNT (1-6) and");
    println!("HEALERS_PER_JAD (0-5) select the fight when the run file has no");
    println!("\"jad\" section.");
}

//! Subsidized Payments Engine CLI
//!
//! Command-line interface for processing subsidized payment operations from
//! CSV files.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- operations.csv > payments.csv
//! cargo run -- --strategy sync operations.csv > payments.csv
//! cargo run -- --strategy async --batch-size 2000 operations.csv > payments.csv
//! cargo run -- --cashback-rate 250 --disable-cashback operations.csv > payments.csv
//! ```
//!
//! The program reads operation records from the input CSV file, processes
//! them through the payment engine using the selected processing strategy,
//! and outputs the final payment states to stdout.
//!
//! # Processing Strategies
//!
//! - **sync**: Synchronous CSV parsing with streaming iterator reads
//! - **async**: Asynchronous CSV parsing with batch reads (default)
//!
//! Both strategies apply operations in file order and produce identical
//! output for the same input.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (missing arguments, file not found, file not readable, etc.)

use std::process;
use subsidized_payments_engine::cli;
use subsidized_payments_engine::strategy;

fn main() {
    // Parse command-line arguments using clap
    let args = cli::parse_args();

    let engine_config = args.to_engine_config();

    // Create the appropriate processing strategy based on CLI arguments
    let strategy = {
        let batch_config = if matches!(args.strategy, cli::StrategyType::Async) {
            Some(args.to_batch_config())
        } else {
            None
        };
        strategy::create_strategy(args.strategy, engine_config, batch_config)
    };

    // Process operations using the selected strategy
    // Output goes to stdout
    let mut output = std::io::stdout();
    if let Err(e) = strategy.process(&args.input_file, &mut output) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

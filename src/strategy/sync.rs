//! Synchronous processing strategy
//!
//! This module provides a synchronous, single-threaded implementation of the
//! ProcessingStrategy trait. It orchestrates payment processing by
//! coordinating between the SyncReader (for CSV input) and PaymentEngine
//! (for business logic).
//!
//! # Design
//!
//! The SyncProcessingStrategy focuses on orchestration, delegating:
//! - CSV parsing to `SyncReader` (iterator interface)
//! - Payment processing to `PaymentEngine` (business logic)
//! - CSV output to `csv_format::write_payments_csv` (format handling)
//!
//! # Memory Efficiency
//!
//! This strategy maintains constant memory usage:
//! - Processes CSV records one at a time (streaming via iterator)
//! - Does not load entire file into memory
//! - Memory usage is O(payments), not O(all_operations)

use crate::core::{InMemoryAssetLedger, PaymentEngine};
use crate::io::csv_format::write_payments_csv;
use crate::io::sync_reader::SyncReader;
use crate::strategy::{apply_record, ProcessingStrategy};
use crate::types::EngineConfig;
use std::io::Write;
use std::path::Path;

/// Synchronous processing strategy
///
/// Implements the ProcessingStrategy trait using single-threaded,
/// synchronous processing. Orchestrates the flow between CSV reading,
/// payment processing, and output generation.
#[derive(Debug, Clone)]
pub struct SyncProcessingStrategy {
    config: EngineConfig,
}

impl SyncProcessingStrategy {
    /// Create a sync strategy with the given engine configuration
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl ProcessingStrategy for SyncProcessingStrategy {
    /// Process operations from input file and write results to output
    ///
    /// This method orchestrates the complete synchronous processing pipeline:
    /// 1. Creates a SyncReader to stream operation records from the CSV file
    /// 2. Creates a PaymentEngine over a fresh in-memory asset ledger
    /// 3. Iterates through records, applying each through the engine
    /// 4. Writes the final payment states to output
    ///
    /// # Error Handling
    ///
    /// Fatal errors (file not found, I/O errors) are returned immediately.
    /// Individual operation errors are logged to stderr and processing
    /// continues.
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String> {
        let mut engine = PaymentEngine::new(InMemoryAssetLedger::new(), self.config.clone());

        let reader = SyncReader::new(input_path)?;

        for result in reader {
            match result {
                Ok(record) => {
                    if let Err(e) = apply_record(&mut engine, record) {
                        eprintln!("Operation processing error: {}", e);
                    }
                }
                Err(e) => {
                    eprintln!("CSV parsing error: {}", e);
                }
            }
        }

        let payments = engine.payments_sorted();
        write_payments_csv(&payments, output)?;

        Ok(())
    }
}

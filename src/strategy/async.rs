//! Asynchronous batch processing strategy
//!
//! This module provides an asynchronous implementation of the
//! ProcessingStrategy trait. Records are read in batches through csv-async,
//! then applied to the payment engine strictly in file order.
//!
//! # Architecture
//!
//! ```text
//! AsyncProcessingStrategy
//!     ├── BatchConfig (batch_size)
//!     ├── AsyncReader (batch CSV reading)
//!     └── PaymentEngine (sequential application)
//! ```
//!
//! # Ordering
//!
//! Payment operations are order-sensitive: an update and a refund to the
//! same payment must apply in file order, and cashback cap classification
//! depends on every earlier grant to the same payer. Batching therefore
//! stays on the I/O side only; the engine consumes one record at a time.

use crate::core::{InMemoryAssetLedger, PaymentEngine};
use crate::io::async_reader::AsyncReader;
use crate::io::csv_format::write_payments_csv;
use crate::strategy::{apply_record, ProcessingStrategy};
use crate::types::EngineConfig;
use std::io::Write;
use std::path::Path;

/// Configuration for batch reading
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Number of records per read batch
    pub batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { batch_size: 1000 }
    }
}

impl BatchConfig {
    /// Create a new BatchConfig with a custom batch size
    ///
    /// A zero batch size falls back to the default with a warning.
    pub fn new(batch_size: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            eprintln!(
                "Warning: Invalid batch_size ({}), using default ({})",
                batch_size, default.batch_size
            );
            default.batch_size
        } else {
            batch_size
        };

        Self { batch_size }
    }
}

/// Asynchronous batch processing strategy
///
/// Implements the ProcessingStrategy trait using async batch reading with
/// sequential engine application, producing output identical to the sync
/// strategy for the same input.
#[derive(Debug, Clone)]
pub struct AsyncProcessingStrategy {
    config: EngineConfig,
    batch: BatchConfig,
}

impl AsyncProcessingStrategy {
    /// Create an async strategy with the given configurations
    pub fn new(config: EngineConfig, batch: BatchConfig) -> Self {
        Self { config, batch }
    }
}

impl ProcessingStrategy for AsyncProcessingStrategy {
    /// Process operations from input file and write results to output
    ///
    /// This method implements the asynchronous processing pipeline:
    /// 1. Creates a tokio runtime
    /// 2. Opens the CSV file through tokio with a csv-async compat wrapper
    /// 3. Reads operation records in batches using AsyncReader
    /// 4. Applies each batch to the engine in file order
    /// 5. Writes the final payment states to output
    ///
    /// # Error Handling
    ///
    /// Fatal errors (file not found, I/O errors, runtime errors) are
    /// returned immediately. Individual operation errors are logged to
    /// stderr and processing continues.
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        runtime.block_on(async {
            let mut engine = PaymentEngine::new(InMemoryAssetLedger::new(), self.config.clone());

            let file = tokio::fs::File::open(input_path)
                .await
                .map_err(|e| format!("Failed to open file '{}': {}", input_path.display(), e))?;

            // Wrap tokio file in a compatibility layer for csv-async
            let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
            let mut reader = AsyncReader::new(compat_file);

            loop {
                let batch = reader.read_batch(self.batch.batch_size).await;
                if batch.is_empty() {
                    break;
                }
                for record in batch {
                    if let Err(e) = apply_record(&mut engine, record) {
                        eprintln!("Operation processing error: {}", e);
                    }
                }
            }

            let payments = engine.payments_sorted();
            write_payments_csv(&payments, output)?;

            Ok(())
        })
    }
}

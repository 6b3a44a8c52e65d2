//! Processing strategy module for payment operation processing
//!
//! This module defines the Strategy pattern for complete payment processing
//! pipelines, encompassing CSV parsing, engine processing and output. This
//! allows different processing implementations (synchronous streaming,
//! asynchronous batch reading) to be selected at runtime.
//!
//! Both strategies feed one sequential [`PaymentEngine`]: operations apply
//! one at a time in file order, so the two strategies produce identical
//! output for the same input. The async strategy differs only in how the
//! file is read.

use crate::cli::StrategyType;
use crate::core::{InMemoryAssetLedger, PaymentEngine};
use crate::types::{AccountId, EngineConfig, OperationRecord, OperationType};
use std::io::Write;
use std::path::Path;

pub mod r#async;
pub mod sync;

pub use self::r#async::{AsyncProcessingStrategy, BatchConfig};
pub use sync::SyncProcessingStrategy;

/// Custody account used by the pipeline's in-memory asset ledger
pub const PIPELINE_ENGINE_ACCOUNT: AccountId = AccountId([0xEE; 20]);

/// Treasury account used when no `--treasury` flag is given
///
/// The treasury starts empty; a `fund` record for this address provides the
/// balance cashback grants draw from.
pub const DEFAULT_TREASURY_ACCOUNT: AccountId = AccountId([0xE1; 20]);

/// Cash-out account used when no `--cash-out` flag is given
pub const DEFAULT_CASH_OUT_ACCOUNT: AccountId = AccountId([0xE2; 20]);

/// Processing strategy trait for complete payment processing pipelines
///
/// Each strategy reads operation records from a CSV file, applies them
/// through the payment engine, and writes the final payment states to
/// output.
///
/// # Errors
///
/// `process` returns an error only for fatal conditions (file not found,
/// I/O failure, invalid CSV structure). Individual operation errors are
/// logged to stderr and processing continues with the next record.
pub trait ProcessingStrategy: Send + Sync {
    /// Process operations from input file and write results to output
    ///
    /// # Arguments
    ///
    /// * `input_path` - Path to the input CSV file containing operation records
    /// * `output` - Mutable reference to a writer for outputting payment states
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String>;
}

/// Create a processing strategy based on the specified strategy type
///
/// # Arguments
///
/// * `strategy_type` - The type of processing strategy to create (Sync or Async)
/// * `engine_config` - Engine configuration shared by both strategies
/// * `batch_config` - Optional batch configuration (ignored for sync)
///
/// # Returns
///
/// A boxed trait object implementing the ProcessingStrategy trait
pub fn create_strategy(
    strategy_type: StrategyType,
    engine_config: EngineConfig,
    batch_config: Option<BatchConfig>,
) -> Box<dyn ProcessingStrategy> {
    match strategy_type {
        StrategyType::Sync => Box::new(SyncProcessingStrategy::new(engine_config)),
        StrategyType::Async => {
            let batch_config = batch_config.unwrap_or_default();
            Box::new(AsyncProcessingStrategy::new(engine_config, batch_config))
        }
    }
}

/// Apply one operation record to the engine
///
/// `fund` seeds the in-memory ledger directly; every other operation maps
/// onto its engine entry point. Field presence was validated during CSV
/// conversion, so missing optional amounts default to zero here.
pub(crate) fn apply_record(
    engine: &mut PaymentEngine<InMemoryAssetLedger>,
    record: OperationRecord,
) -> Result<(), String> {
    match record.op {
        OperationType::Fund => {
            let account = record.payer.ok_or("fund requires payer")?;
            let amount = record.amount.ok_or("fund requires amount")?;
            engine.ledger_mut().mint(account, amount);
            Ok(())
        }
        OperationType::Make => {
            let id = record.id.ok_or("make requires id")?;
            let payer = record.payer.ok_or("make requires payer")?;
            engine
                .make_payment(
                    id,
                    payer,
                    record.base.unwrap_or(0),
                    record.extra.unwrap_or(0),
                    record.sponsor,
                    record.subsidy_limit.unwrap_or(0),
                    None,
                    record.amount.unwrap_or(0),
                )
                .map_err(|e| e.to_string())
        }
        OperationType::Update => {
            let id = record.id.ok_or("update requires id")?;
            engine
                .update_payment(id, record.base.unwrap_or(0), record.extra.unwrap_or(0))
                .map_err(|e| e.to_string())
        }
        OperationType::Refund => {
            let id = record.id.ok_or("refund requires id")?;
            let amount = record.amount.ok_or("refund requires amount")?;
            engine.refund_payment(id, amount).map_err(|e| e.to_string())
        }
        OperationType::Confirm => {
            let id = record.id.ok_or("confirm requires id")?;
            let amount = record.amount.ok_or("confirm requires amount")?;
            engine
                .confirm_payment(id, amount)
                .map_err(|e| e.to_string())
        }
        OperationType::Revoke => {
            let id = record.id.ok_or("revoke requires id")?;
            engine.revoke_payment(id).map_err(|e| e.to_string())
        }
        OperationType::Reverse => {
            let id = record.id.ok_or("reverse requires id")?;
            engine.reverse_payment(id).map_err(|e| e.to_string())
        }
        OperationType::Merge => {
            let target = record.id.ok_or("merge requires id")?;
            let source = record.source.ok_or("merge requires source")?;
            engine
                .merge_payments(target, &[source])
                .map_err(|e| e.to_string())
        }
    }
}

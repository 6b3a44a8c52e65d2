use crate::strategy::{
    BatchConfig, DEFAULT_CASH_OUT_ACCOUNT, DEFAULT_TREASURY_ACCOUNT, PIPELINE_ENGINE_ACCOUNT,
};
use crate::types::{AccountId, EngineConfig};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Process subsidized payment operations with cashback accounting
#[derive(Parser, Debug)]
#[command(name = "subsidized-payments-engine")]
#[command(
    about = "Process subsidized payment operations with cashback accounting",
    long_about = None
)]
pub struct CliArgs {
    /// Input CSV file path containing operation records
    #[arg(value_name = "INPUT", help = "Path to the input CSV file")]
    pub input_file: PathBuf,

    /// Parsing strategy to use for processing operations
    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "async",
        help = "Parsing strategy: 'sync' for synchronous or 'async' for asynchronous"
    )]
    pub strategy: StrategyType,

    /// Number of operations per batch (async mode only)
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of operations per read batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    /// Global cashback rate in thousandths (0-500)
    #[arg(
        long = "cashback-rate",
        value_name = "RATE",
        value_parser = clap::value_parser!(u16).range(..=500),
        help = "Cashback rate in thousandths, at most 500 (default: 100)"
    )]
    pub cashback_rate: Option<u16>,

    /// Per-recipient cashback cap within one reset window
    #[arg(
        long = "cashback-cap",
        value_name = "CAP",
        help = "Maximum cashback per recipient per reset window"
    )]
    pub cashback_cap: Option<u64>,

    /// Treasury account funding cashback transfers
    #[arg(
        long = "treasury",
        value_name = "ACCOUNT",
        help = "Hex address of the cashback treasury account"
    )]
    pub treasury: Option<AccountId>,

    /// Destination account for confirmed amounts
    #[arg(
        long = "cash-out",
        value_name = "ACCOUNT",
        help = "Hex address of the cash-out account"
    )]
    pub cash_out: Option<AccountId>,

    /// Disable cashback for payments made during this run
    #[arg(long = "disable-cashback", help = "Disable cashback grants")]
    pub disable_cashback: bool,
}

/// Available parsing strategies for CSV processing
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

impl CliArgs {
    /// Create an EngineConfig from CLI arguments
    ///
    /// Unset account flags fall back to the pipeline's well-known treasury
    /// and cash-out addresses, so both accounts are always configured for a
    /// CLI run. Unset cashback flags keep the engine defaults.
    ///
    /// # Returns
    ///
    /// An `EngineConfig` with values from CLI arguments or defaults.
    pub fn to_engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::new(PIPELINE_ENGINE_ACCOUNT);
        config.treasury = Some(self.treasury.unwrap_or(DEFAULT_TREASURY_ACCOUNT));
        config.cash_out_account = Some(self.cash_out.unwrap_or(DEFAULT_CASH_OUT_ACCOUNT));
        if let Some(rate) = self.cashback_rate {
            config.cashback_rate = rate;
        }
        if let Some(cap) = self.cashback_cap {
            config.cashback_cap = cap;
        }
        config.cashback_enabled = !self.disable_cashback;
        config
    }

    /// Create a BatchConfig from CLI arguments
    ///
    /// This method constructs a BatchConfig using the CLI arguments if
    /// provided, or falls back to default values. Invalid values are
    /// replaced with defaults and a warning is printed to stderr.
    ///
    /// # Returns
    ///
    /// A `BatchConfig` with values from CLI arguments or defaults.
    pub fn to_batch_config(&self) -> BatchConfig {
        match self.batch_size {
            Some(size) => BatchConfig::new(size),
            None => BatchConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    // Strategy parsing tests
    #[rstest]
    #[case::default_strategy(&["program", "input.csv"], StrategyType::Async)]
    #[case::explicit_sync(&["program", "--strategy", "sync", "input.csv"], StrategyType::Sync)]
    #[case::explicit_async(&["program", "--strategy", "async", "input.csv"], StrategyType::Async)]
    fn test_strategy_parsing(#[case] args: &[&str], #[case] expected: StrategyType) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        match (&parsed.strategy, &expected) {
            (StrategyType::Sync, StrategyType::Sync) => (),
            (StrategyType::Async, StrategyType::Async) => (),
            _ => panic!("Expected {:?}, got {:?}", expected, parsed.strategy),
        }
    }

    // Individual config option tests
    #[rstest]
    #[case::batch_size(&["program", "--batch-size", "2000", "input.csv"], Some(2000), None)]
    #[case::cashback_rate(&["program", "--cashback-rate", "250", "input.csv"], None, Some(250))]
    #[case::no_options(&["program", "input.csv"], None, None)]
    #[case::all_options(
        &["program", "--strategy", "async", "--batch-size", "2000", "--cashback-rate", "250", "input.csv"],
        Some(2000),
        Some(250)
    )]
    fn test_config_options(
        #[case] args: &[&str],
        #[case] batch_size: Option<usize>,
        #[case] cashback_rate: Option<u16>,
    ) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.batch_size, batch_size);
        assert_eq!(parsed.cashback_rate, cashback_rate);
    }

    // EngineConfig conversion tests
    #[test]
    fn test_engine_config_defaults() {
        let parsed = CliArgs::try_parse_from(["program", "input.csv"]).unwrap();
        let config = parsed.to_engine_config();

        assert_eq!(config.engine_account, PIPELINE_ENGINE_ACCOUNT);
        assert_eq!(config.treasury, Some(DEFAULT_TREASURY_ACCOUNT));
        assert_eq!(config.cash_out_account, Some(DEFAULT_CASH_OUT_ACCOUNT));
        assert!(config.cashback_enabled);
        assert_eq!(config.cashback_rate, 100);
    }

    #[test]
    fn test_engine_config_overrides() {
        let treasury = "0x".to_string() + &"11".repeat(20);
        let parsed = CliArgs::try_parse_from([
            "program",
            "--cashback-rate",
            "300",
            "--cashback-cap",
            "5000",
            "--treasury",
            &treasury,
            "--disable-cashback",
            "input.csv",
        ])
        .unwrap();
        let config = parsed.to_engine_config();

        assert_eq!(config.cashback_rate, 300);
        assert_eq!(config.cashback_cap, 5000);
        assert_eq!(config.treasury, Some(AccountId::from_str(&treasury).unwrap()));
        assert_eq!(config.cash_out_account, Some(DEFAULT_CASH_OUT_ACCOUNT));
        assert!(!config.cashback_enabled);
    }

    // BatchConfig conversion tests with valid values
    #[rstest]
    #[case::all_defaults(&["program", "input.csv"], 1000)]
    #[case::custom_batch_size(&["program", "--batch-size", "2000", "input.csv"], 2000)]
    #[case::zero_batch_size(&["program", "--batch-size", "0", "input.csv"], 1000)]
    fn test_batch_config_conversion(#[case] args: &[&str], #[case] expected_batch_size: usize) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        let config = parsed.to_batch_config();

        assert_eq!(config.batch_size, expected_batch_size);
    }

    // Error handling tests
    #[rstest]
    #[case::missing_input(&["program"])]
    #[case::invalid_strategy(&["program", "--strategy", "invalid", "input.csv"])]
    #[case::rate_above_maximum(&["program", "--cashback-rate", "501", "input.csv"])]
    #[case::treasury_not_hex(&["program", "--treasury", "zz", "input.csv"])]
    fn test_parsing_errors(#[case] args: &[&str]) {
        let result = CliArgs::try_parse_from(args);
        assert!(result.is_err());
    }
}

//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;
use crate::domain::fees::FeeSchedule;
use crate::domain::venue;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig> {
  let path = path.as_ref();

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    engine = %config.engine.name,
    asset = %config.engine.asset,
    venues = config.venues.len(),
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig =
    toml::from_str(content).with_context(|| "Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Fee rates within the protocol maxima
/// - A non-empty venue list with unique protocols
/// - APY percentages that convert to basis points
/// - Positive scheduling intervals
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    !config.engine.name.is_empty(),
    "Engine name must not be empty"
  );
  anyhow::ensure!(
    !config.engine.escrow_prefix.is_empty(),
    "Escrow prefix must not be empty"
  );

  // Fee validation
  FeeSchedule::new(config.fees.protocol_fee_bp, config.fees.transaction_fee_bp)
    .context("Invalid fee configuration")?;
  anyhow::ensure!(
    !config.fees.fee_recipient.is_empty(),
    "Fee recipient must not be empty"
  );

  // Venue validation
  anyhow::ensure!(
    !config.venues.is_empty(),
    "At least one venue must be configured"
  );
  let mut seen = HashSet::new();
  for (i, v) in config.venues.iter().enumerate() {
    anyhow::ensure!(
      seen.insert(v.protocol),
      "Venue {} ({}) is configured twice",
      i,
      v.protocol
    );
    anyhow::ensure!(
      venue::percent_to_bp(v.apy_percent).is_some(),
      "Venue {} ({}) has invalid apy_percent {}",
      i,
      v.protocol,
      v.apy_percent
    );
  }

  // Scheduling validation
  anyhow::ensure!(
    config.rebalance.check_interval_secs > 0,
    "rebalance.check_interval_secs must be positive"
  );
  anyhow::ensure!(
    config.persistence.snapshot_interval_seconds > 0,
    "persistence.snapshot_interval_seconds must be positive"
  );
  anyhow::ensure!(
    config.persistence.accrual_interval_seconds > 0,
    "persistence.accrual_interval_seconds must be positive"
  );

  Ok(())
}

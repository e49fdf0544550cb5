//! Configuration Module - TOML-based Engine Configuration
//!
//! Loads and validates configuration from `config.toml`. Fee rates,
//! venue definitions and rebalance thresholds are externalized here;
//! nothing operational is hardcoded in the domain layer.

pub mod loader;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::market::{AssetKind, BasisPoints};
use crate::domain::rebalance::RebalanceConfig;
use crate::domain::venue::{ProtocolId, RiskTier, SelectionPolicy};

/// Top-level engine configuration.
///
/// Loaded from `config.toml` at startup and validated before any
/// component is built.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Engine identity and ledger asset.
  pub engine: EngineConfig,
  /// Fee rates and recipient.
  pub fees: FeesConfig,
  /// Deposit target filters.
  #[serde(default)]
  pub selection: SelectionConfig,
  /// Rebalancing thresholds and schedule.
  #[serde(default)]
  pub rebalance: RebalanceSettings,
  /// Yield venues to register at startup.
  pub venues: Vec<VenueConfig>,
  /// Metrics and monitoring.
  #[serde(default)]
  pub metrics: MetricsConfig,
  /// Persistence configuration.
  #[serde(default)]
  pub persistence: PersistenceConfig,
}

/// Engine identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
  /// Human-readable engine name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// Asset this ledger settles in.
  pub asset: AssetKind,
  /// Prefix of market escrow holder identities.
  #[serde(default = "default_escrow_prefix")]
  pub escrow_prefix: String,
  /// Account recorded as admin cap holder and market creator.
  #[serde(default = "default_admin")]
  pub admin: String,
}

/// Fee configuration, in basis points out of 10000.
#[derive(Debug, Clone, Deserialize)]
pub struct FeesConfig {
  /// Cut of market yield, at most 2000.
  pub protocol_fee_bp: BasisPoints,
  /// Cut of every stake, at most 1000.
  pub transaction_fee_bp: BasisPoints,
  pub fee_recipient: String,
}

/// Venue selection filters.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectionConfig {
  #[serde(default)]
  pub min_apy_bp: BasisPoints,
  #[serde(default = "default_max_risk_tier")]
  pub max_risk_tier: RiskTier,
}

impl Default for SelectionConfig {
  fn default() -> Self {
    Self {
      min_apy_bp: 0,
      max_risk_tier: RiskTier::MAX,
    }
  }
}

impl SelectionConfig {
  pub const fn policy(&self) -> SelectionPolicy {
    SelectionPolicy {
      min_apy_bp: self.min_apy_bp,
      max_risk_tier: self.max_risk_tier,
    }
  }
}

/// Rebalance configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RebalanceSettings {
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// APY gap that justifies a move.
  #[serde(default = "default_threshold_bp")]
  pub threshold_bp: BasisPoints,
  /// Balances below this are left in place.
  #[serde(default = "default_min_rebalance_amount")]
  pub min_rebalance_amount: u64,
  /// Minimum time between rebalances (seconds).
  #[serde(default = "default_min_interval")]
  pub min_interval_secs: u64,
  /// How often the agent is run (seconds).
  #[serde(default = "default_check_interval")]
  pub check_interval_secs: u64,
}

impl Default for RebalanceSettings {
  fn default() -> Self {
    Self {
      enabled: true,
      threshold_bp: default_threshold_bp(),
      min_rebalance_amount: default_min_rebalance_amount(),
      min_interval_secs: default_min_interval(),
      check_interval_secs: default_check_interval(),
    }
  }
}

impl RebalanceSettings {
  pub const fn rule(&self) -> RebalanceConfig {
    RebalanceConfig {
      enabled: self.enabled,
      threshold_bp: self.threshold_bp,
      min_rebalance_amount: self.min_rebalance_amount,
      min_interval: self.min_interval_secs,
    }
  }
}

/// One yield venue.
#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
  pub protocol: ProtocolId,
  pub risk_tier: RiskTier,
  /// Starting APY as a percentage, e.g. `"5.25"`.
  pub apy_percent: Decimal,
  /// Liquidity supplied by other depositors.
  #[serde(default)]
  pub initial_tvl: u64,
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  /// Directory for the snapshot and JSONL event logs.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
  /// Snapshot interval (seconds).
  #[serde(default = "default_snapshot_interval")]
  pub snapshot_interval_seconds: u64,
  /// How often simulated venues accrue yield (seconds).
  #[serde(default = "default_accrual_interval")]
  pub accrual_interval_seconds: u64,
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      data_dir: default_data_dir(),
      snapshot_interval_seconds: default_snapshot_interval(),
      accrual_interval_seconds: default_accrual_interval(),
    }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_escrow_prefix() -> String {
  "escrow".to_string()
}

fn default_admin() -> String {
  "admin".to_string()
}

fn default_true() -> bool {
  true
}

const fn default_max_risk_tier() -> RiskTier {
  RiskTier::MAX
}

fn default_threshold_bp() -> BasisPoints {
  RebalanceConfig::default().threshold_bp
}

fn default_min_rebalance_amount() -> u64 {
  RebalanceConfig::default().min_rebalance_amount
}

fn default_min_interval() -> u64 {
  RebalanceConfig::default().min_interval
}

fn default_check_interval() -> u64 {
  300
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}

fn default_data_dir() -> String {
  "data".to_string()
}

fn default_snapshot_interval() -> u64 {
  60
}

fn default_accrual_interval() -> u64 {
  60
}

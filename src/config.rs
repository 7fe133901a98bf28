//! Pipeline configuration
//!
//! Thresholds, gate requirements and retry bounds are all inputs — never
//! compiled into the engine — so a caller can re-run the same extracted
//! data against a different rule set.

use crate::models::{ClassificationResult, DocumentType};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// The seven compliance thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplianceThresholds {
    /// Minimum average monthly balance.
    pub min_avg_balance: f64,
    /// Maximum bounced/returned debits in the statement period.
    pub max_bounce_count: u32,
    /// Minimum months of account history.
    pub min_account_age_months: u32,
    /// Single-transaction size requiring scrutiny.
    pub suspicious_txn_threshold: f64,
    /// Required fraction of months with a salary credit.
    pub income_regularity_threshold: f64,
    /// Minimum closing balance.
    pub min_closing_balance: f64,
    /// Maximum months with a negative average balance.
    pub max_overdraft_instances: u32,
}

impl Default for ComplianceThresholds {
    fn default() -> Self {
        Self {
            min_avg_balance: 10_000.0,
            max_bounce_count: 0,
            min_account_age_months: 6,
            suspicious_txn_threshold: 1_000_000.0,
            income_regularity_threshold: 0.8,
            min_closing_balance: 5_000.0,
            max_overdraft_instances: 2,
        }
    }
}

/// The classification gate: documents failing any requirement never reach
/// the extract stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateConfig {
    pub min_quality_score: f64,
    pub require_readable: bool,
    pub require_complete: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_quality_score: 5.0,
            require_readable: true,
            require_complete: true,
        }
    }
}

impl GateConfig {
    /// The authoritative gate decision. The orchestrator derives
    /// `can_proceed` from this, overriding whatever the classifier reported.
    pub fn admits(&self, classification: &ClassificationResult) -> bool {
        classification.document_type == DocumentType::BankStatement
            && classification.quality_score >= self.min_quality_score
            && (!self.require_readable || classification.is_readable)
            && (!self.require_complete || classification.is_complete)
    }
}

/// Retry/timeout bounds for collaborator calls. The compliance engine is
/// local and pure and is never retried.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub stage_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            stage_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub thresholds: ComplianceThresholds,
    pub gate: GateConfig,
    pub retry: RetryConfig,
    /// Minimum credit size considered a salary candidate when deriving
    /// monthly summaries.
    pub salary_credit_floor: f64,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self {
            salary_credit_floor: 10_000.0,
            ..Default::default()
        }
    }

    /// Load overrides from `PIPELINE_*` environment variables, falling back
    /// to defaults. `.env` files are honoured via dotenv.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let mut config = Self::new();
        config.thresholds.min_avg_balance =
            env_f64("PIPELINE_MIN_AVG_BALANCE", config.thresholds.min_avg_balance);
        config.thresholds.max_bounce_count =
            env_u32("PIPELINE_MAX_BOUNCE_COUNT", config.thresholds.max_bounce_count);
        config.thresholds.min_account_age_months = env_u32(
            "PIPELINE_MIN_ACCOUNT_AGE_MONTHS",
            config.thresholds.min_account_age_months,
        );
        config.thresholds.suspicious_txn_threshold = env_f64(
            "PIPELINE_SUSPICIOUS_TXN_THRESHOLD",
            config.thresholds.suspicious_txn_threshold,
        );
        config.thresholds.income_regularity_threshold = env_f64(
            "PIPELINE_INCOME_REGULARITY_THRESHOLD",
            config.thresholds.income_regularity_threshold,
        );
        config.thresholds.min_closing_balance = env_f64(
            "PIPELINE_MIN_CLOSING_BALANCE",
            config.thresholds.min_closing_balance,
        );
        config.thresholds.max_overdraft_instances = env_u32(
            "PIPELINE_MAX_OVERDRAFT_INSTANCES",
            config.thresholds.max_overdraft_instances,
        );
        config.gate.min_quality_score =
            env_f64("PIPELINE_MIN_QUALITY_SCORE", config.gate.min_quality_score);
        config.retry.max_attempts = env_u32("PIPELINE_MAX_ATTEMPTS", config.retry.max_attempts);
        config.retry.stage_timeout = Duration::from_secs(env_u32(
            "PIPELINE_STAGE_TIMEOUT_SECS",
            config.retry.stage_timeout.as_secs() as u32,
        ) as u64);
        config.salary_credit_floor =
            env_f64("PIPELINE_SALARY_CREDIT_FLOOR", config.salary_credit_floor);

        config
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

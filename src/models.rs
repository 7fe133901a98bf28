//! Core data models for the loan document pipeline

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    BankStatement,
    Kyc,
    IncomeProof,
    PropertyDocument,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    /// Fixed ordinal: High outranks Medium outranks Low.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::High => 2,
            Severity::Medium => 1,
            Severity::Low => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Approve,
    Review,
    Reject,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Classify,
    Extract,
    Validate,
    End,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::Classify => "classify",
            Stage::Extract => "extract",
            Stage::Validate => "validate",
            Stage::End => "end",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//
// ================= Document =================
//

/// Pre-parsed document input. Produced by an external parser; immutable
/// for the lifetime of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub raw_text: String,
    #[serde(default)]
    pub pages: Vec<String>,
    #[serde(default)]
    pub tables: Vec<TableFragment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableFragment {
    pub title: Option<String>,
    pub rows: Vec<Vec<String>>,
}

impl Document {
    pub fn from_text(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            pages: Vec::new(),
            tables: Vec::new(),
        }
    }
}

//
// ================= Classification =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub document_type: DocumentType,
    /// Document quality on a 0-10 scale.
    pub quality_score: f64,
    pub is_readable: bool,
    pub is_complete: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    /// Recomputed by the orchestrator from the gate config; the value a
    /// collaborator reports here is informational only.
    pub can_proceed: bool,
}

//
// ================= Extraction =================
//

/// Single bank statement transaction. Amount is signed: credits positive,
/// debits negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDate,
    pub description: String,
    pub amount: f64,
    /// Running balance after this transaction, when the statement shows it.
    pub balance: Option<f64>,
}

impl Transaction {
    pub fn is_credit(&self) -> bool {
        self.amount > 0.0
    }

    pub fn is_debit(&self) -> bool {
        self.amount < 0.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedData {
    pub account_holder_name: String,
    pub bank_name: String,
    /// Format: `XXXX` followed by the last 4 digits. Irreversible.
    pub account_number_masked: String,
    pub statement_period_start: NaiveDate,
    pub statement_period_end: NaiveDate,
    pub opening_balance: f64,
    pub closing_balance: f64,
    /// Ordered chronologically within the statement period.
    pub transactions: Vec<Transaction>,
}

impl ExtractedData {
    /// Structural validation. A violation here is a contract breach by the
    /// extract stage and aborts the run without retries.
    pub fn validate(&self) -> crate::Result<()> {
        use crate::error::PipelineError;

        if self.statement_period_end < self.statement_period_start {
            return Err(PipelineError::EngineInputInvalid(format!(
                "statement period end {} precedes start {}",
                self.statement_period_end, self.statement_period_start
            )));
        }

        if !is_masked_account_number(&self.account_number_masked) {
            return Err(PipelineError::EngineInputInvalid(format!(
                "account number not masked as XXXX<4 digits>: {}",
                self.account_number_masked
            )));
        }

        let mut previous: Option<NaiveDate> = None;
        for txn in &self.transactions {
            if txn.date < self.statement_period_start || txn.date > self.statement_period_end {
                return Err(PipelineError::EngineInputInvalid(format!(
                    "transaction on {} falls outside statement period",
                    txn.date
                )));
            }
            if let Some(prev) = previous {
                if txn.date < prev {
                    return Err(PipelineError::EngineInputInvalid(format!(
                        "transactions not sorted by date: {} after {}",
                        txn.date, prev
                    )));
                }
            }
            previous = Some(txn.date);
        }

        Ok(())
    }
}

/// Mask an account number down to `XXXX` + last 4 digits.
pub fn mask_account_number(raw: &str) -> String {
    let digits: Vec<char> = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let tail: String = digits
        .iter()
        .skip(digits.len().saturating_sub(4))
        .collect();
    format!("XXXX{}", tail)
}

fn is_masked_account_number(masked: &str) -> bool {
    masked.len() == 8
        && masked.starts_with("XXXX")
        && masked[4..].chars().all(|c| c.is_ascii_digit())
}

//
// ================= Monthly Summary =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlySummary {
    /// Calendar month in YYYY-MM form.
    pub month: String,
    pub total_credits: f64,
    pub total_debits: f64,
    pub net_flow: f64,
    /// Average of observed running balances for the month; the closing
    /// balance when finer granularity is unavailable.
    pub avg_balance: f64,
    /// A qualifying credit recurring in consecutive months.
    pub salary_detected: bool,
}

//
// ================= Compliance =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceCheck {
    pub rule_name: String,
    pub description: String,
    pub passed: bool,
    pub severity: Severity,
    /// The measured value, formatted for display.
    pub actual: String,
    /// The threshold the measurement was compared against.
    pub threshold: String,
    pub reason: String,
}

/// Four bounded sub-scores summing to the total risk score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub balance_stability: u8,
    pub transaction_patterns: u8,
    pub income_regularity: u8,
    pub red_flags: u8,
}

impl ScoreBreakdown {
    /// Total risk score: integer sum of the sub-scores, clamped to [0,100].
    pub fn total(&self) -> u8 {
        let sum = self.balance_stability as u16
            + self.transaction_patterns as u16
            + self.income_regularity as u16
            + self.red_flags as u16;
        sum.min(100) as u8
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Overall risk score in [0,100].
    pub risk_score: u8,
    pub score_breakdown: ScoreBreakdown,
    /// Seven checks in declared rule order.
    pub compliance_checks: Vec<ComplianceCheck>,
    pub issues: Vec<String>,
    /// Names of failed High-severity checks.
    pub red_flags: Vec<String>,
    pub recommendation: Recommendation,
    pub recommendation_reason: String,
}

//
// ================= Pipeline State =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub elapsed_ms: u64,
}

/// The run accumulator threaded through the orchestrator. Owned exclusively
/// by a single run; accumulates additively apart from the scalar
/// stage/error/completed fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub run_id: Uuid,
    pub document: Document,
    pub classification: Option<ClassificationResult>,
    pub extracted_data: Option<ExtractedData>,
    pub monthly_summaries: Vec<MonthlySummary>,
    pub risk_assessment: Option<RiskAssessment>,
    pub current_stage: Stage,
    pub error: Option<String>,
    pub completed: bool,
    pub timings: Vec<StageTiming>,
}

impl PipelineState {
    pub fn new(document: Document) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            document,
            classification: None,
            extracted_data: None,
            monthly_summaries: Vec::new(),
            risk_assessment: None,
            current_stage: Stage::Start,
            error: None,
            completed: false,
            timings: Vec::new(),
        }
    }

    pub fn record_timing(&mut self, stage: Stage, elapsed_ms: u64) {
        self.timings.push(StageTiming { stage, elapsed_ms });
    }

    pub fn fail(&mut self, stage: Stage, error: impl Into<String>) {
        self.current_stage = Stage::Failed;
        self.error = Some(format!("{}: {}", stage, error.into()));
    }
}

//
// ================= Run Result =================
//

/// Final value object returned to the caller. Always produced — gated-out
/// and failed runs carry no assessment and an explanatory reason instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub success: bool,
    /// True when classification excluded the document from further stages.
    pub gated: bool,
    pub document_type: DocumentType,
    pub quality_score: f64,
    pub classification: Option<ClassificationResult>,
    pub extracted_data: Option<ExtractedData>,
    pub monthly_summaries: Vec<MonthlySummary>,
    pub risk_assessment: Option<RiskAssessment>,
    pub stage_reached: Stage,
    pub timings: Vec<StageTiming>,
    pub total_elapsed_ms: u64,
    pub error: Option<String>,
    pub reason: String,
    /// SHA-256 of the raw document text.
    pub document_sha256: String,
}

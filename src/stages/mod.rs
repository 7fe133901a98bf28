//! Collaborator stage contracts
//!
//! Each model-backed stage is an opaque collaborator behind a trait: typed
//! input in, schema-shaped output or a typed fault out. Providers are
//! addressed by capability so they can be swapped without touching the
//! orchestrator or the engine.

use crate::error::PipelineError;
use crate::models::{
    mask_account_number, ClassificationResult, Document, DocumentType, ExtractedData,
    MonthlySummary, RiskAssessment, Transaction,
};
use crate::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

pub mod gemini;
pub use gemini::{GeminiAssessor, GeminiClassifier, GeminiExtractor};

/// Stage 1: document type and quality classification.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, document: &Document) -> Result<ClassificationResult>;
}

/// Stage 2: structured field and transaction extraction.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, document: &Document) -> Result<ExtractedData>;
}

/// Optional stage 3 collaborator: a narrative wording for the already
/// computed deterministic assessment. It can never change the score or the
/// recommendation.
#[async_trait]
pub trait Assessor: Send + Sync {
    async fn narrate(
        &self,
        extracted: &ExtractedData,
        summaries: &[MonthlySummary],
        assessment: &RiskAssessment,
    ) -> Result<String>;
}

//
// ========== Mock Collaborators ==========
//
// Pattern-matching stand-ins for the model-backed stages. Keep the demo
// binary and the test suite functional without any provider credentials.

const STATEMENT_MARKERS: &[&str] = &[
    "statement of account",
    "bank statement",
    "transaction details",
    "opening balance",
];

pub struct MockClassifier;

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(&self, document: &Document) -> Result<ClassificationResult> {
        if document.raw_text.trim().is_empty() {
            return Ok(ClassificationResult {
                document_type: DocumentType::Other,
                quality_score: 0.0,
                is_readable: false,
                is_complete: false,
                issues: vec!["No text extracted from document".into()],
                can_proceed: false,
            });
        }

        let text = document.raw_text.to_lowercase();
        let is_statement = STATEMENT_MARKERS.iter().any(|kw| text.contains(kw));

        Ok(ClassificationResult {
            document_type: if is_statement {
                DocumentType::BankStatement
            } else {
                DocumentType::Other
            },
            quality_score: if is_statement { 8.5 } else { 3.0 },
            is_readable: true,
            is_complete: is_statement,
            issues: if is_statement {
                vec![]
            } else {
                vec!["Document does not look like a bank statement".into()]
            },
            can_proceed: is_statement,
        })
    }
}

/// Parses the plain-text statement layout used by the demo binary:
/// `Key: value` header lines followed by
/// `YYYY-MM-DD | description | amount | balance` rows.
pub struct MockExtractor;

impl MockExtractor {
    fn header_value<'a>(text: &'a str, key: &str) -> Option<&'a str> {
        text.lines()
            .find_map(|line| line.trim().strip_prefix(key))
            .map(|rest| rest.trim_start_matches(':').trim())
    }

    fn parse_date(value: &str) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| {
            PipelineError::CollaboratorMalformed(format!("bad date {:?}: {}", value, e))
        })
    }

    fn parse_amount(value: &str) -> Result<f64> {
        value
            .trim_start_matches('+')
            .replace(',', "")
            .parse()
            .map_err(|e| {
                PipelineError::CollaboratorMalformed(format!("bad amount {:?}: {}", value, e))
            })
    }

    fn parse_transaction(line: &str) -> Result<Option<Transaction>> {
        let parts: Vec<&str> = line.split('|').map(str::trim).collect();
        if parts.len() != 4 {
            return Ok(None);
        }
        let date = Self::parse_date(parts[0])?;
        let amount = Self::parse_amount(parts[2])?;
        let balance = match parts[3] {
            "-" | "" => None,
            v => Some(Self::parse_amount(v)?),
        };
        Ok(Some(Transaction {
            date,
            description: parts[1].to_string(),
            amount,
            balance,
        }))
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    async fn extract(&self, document: &Document) -> Result<ExtractedData> {
        let text = &document.raw_text;

        let required = |key: &str| {
            Self::header_value(text, key).ok_or_else(|| {
                PipelineError::CollaboratorMalformed(format!("missing header {:?}", key))
            })
        };

        let account_holder_name = required("Account Holder")?.to_string();
        let bank_name = required("Bank")?.to_string();
        let account_number_masked = mask_account_number(required("Account Number")?);

        let period = required("Statement Period")?;
        let (start, end) = period.split_once(" to ").ok_or_else(|| {
            PipelineError::CollaboratorMalformed(format!("bad statement period {:?}", period))
        })?;

        let mut transactions = Vec::new();
        for line in text.lines() {
            if let Some(txn) = Self::parse_transaction(line)? {
                transactions.push(txn);
            }
        }

        Ok(ExtractedData {
            account_holder_name,
            bank_name,
            account_number_masked,
            statement_period_start: Self::parse_date(start.trim())?,
            statement_period_end: Self::parse_date(end.trim())?,
            opening_balance: Self::parse_amount(required("Opening Balance")?)?,
            closing_balance: Self::parse_amount(required("Closing Balance")?)?,
            transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_STATEMENT: &str = "\
HDFC Bank - Statement of Account
Bank: HDFC Bank
Account Holder: RAVI KUMAR
Account Number: 50100123456789
Statement Period: 2026-01-01 to 2026-02-28
Opening Balance: 50000.00
Closing Balance: 98000.00

2026-01-05 | NEFT Salary Credit | +75000.00 | 125000.00
2026-01-20 | Rent Transfer | -25000.00 | 100000.00
2026-02-05 | NEFT Salary Credit | +75000.00 | 175000.00
2026-02-18 | Credit Card Payment | -77000.00 | 98000.00
";

    #[tokio::test]
    async fn test_mock_classifier_detects_statement() {
        let result = MockClassifier
            .classify(&Document::from_text(SAMPLE_STATEMENT))
            .await
            .unwrap();
        assert_eq!(result.document_type, DocumentType::BankStatement);
        assert!(result.quality_score >= 5.0);
        assert!(result.can_proceed);
    }

    #[tokio::test]
    async fn test_mock_classifier_rejects_other_documents() {
        let result = MockClassifier
            .classify(&Document::from_text("PAN card copy, Aadhaar enclosed"))
            .await
            .unwrap();
        assert_eq!(result.document_type, DocumentType::Other);
        assert!(!result.can_proceed);
    }

    #[tokio::test]
    async fn test_mock_classifier_empty_document() {
        let result = MockClassifier
            .classify(&Document::from_text("   "))
            .await
            .unwrap();
        assert_eq!(result.quality_score, 0.0);
        assert!(!result.is_readable);
    }

    #[tokio::test]
    async fn test_mock_extractor_parses_statement() {
        let data = MockExtractor
            .extract(&Document::from_text(SAMPLE_STATEMENT))
            .await
            .unwrap();
        assert_eq!(data.account_holder_name, "RAVI KUMAR");
        assert_eq!(data.bank_name, "HDFC Bank");
        assert_eq!(data.account_number_masked, "XXXX6789");
        assert_eq!(data.opening_balance, 50_000.0);
        assert_eq!(data.closing_balance, 98_000.0);
        assert_eq!(data.transactions.len(), 4);
        assert_eq!(data.transactions[1].amount, -25_000.0);
        assert_eq!(data.transactions[3].balance, Some(98_000.0));
        assert!(data.validate().is_ok());
    }

    #[tokio::test]
    async fn test_mock_extractor_missing_header_is_malformed() {
        let err = MockExtractor
            .extract(&Document::from_text("no headers here"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::CollaboratorMalformed(_)));
        assert!(!err.is_transient());
    }
}

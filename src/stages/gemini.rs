//! Gemini-backed collaborator stages
//!
//! Each stage sends a structured-output prompt and parses the fenced JSON
//! reply into the typed result. Transport faults are transient; unparseable
//! payloads are not.

use crate::gemini::{parse_fenced_json, GeminiClient};
use crate::models::{
    ClassificationResult, Document, ExtractedData, MonthlySummary, RiskAssessment,
};
use crate::stages::{Assessor, Classifier, Extractor};
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

const CLASSIFIER_SYSTEM_PROMPT: &str = r#"You are a document classification expert for a loan processing system.
Analyze the provided document text and return ONLY a JSON object with:

- "document_type": one of "bank_statement", "kyc", "income_proof", "property_document", "other"
- "quality_score": number 0-10 (10 = perfect quality, 0 = unreadable)
- "is_readable": boolean, can the text be read and processed?
- "is_complete": boolean, does the document appear complete (no missing pages, cut-off text)?
- "issues": array of specific problem strings, [] if none
- "can_proceed": boolean, true if quality_score >= 5 and is_readable and document_type is "bank_statement"

Return ONLY valid JSON. No explanation text."#;

const EXTRACTOR_SYSTEM_PROMPT: &str = r#"You are a financial document extraction expert for bank statements.
Extract all relevant information and return ONLY a JSON object with:

- "account_holder_name": full name of account holder
- "bank_name": name of the bank
- "account_number_masked": mask all but last 4 digits as "XXXX1234"
- "statement_period_start": start date, "YYYY-MM-DD"
- "statement_period_end": end date, "YYYY-MM-DD"
- "opening_balance": number
- "closing_balance": number
- "transactions": EVERY transaction, in date order, each with:
  - "date": "YYYY-MM-DD"
  - "description": full transaction description
  - "amount": SIGNED number, credits positive, debits negative
  - "balance": running balance after the transaction, or null

Return ONLY valid JSON. No explanation text."#;

const ASSESSOR_SYSTEM_PROMPT: &str = r#"You are a loan compliance and risk assessment expert.
You are given extracted bank statement data, monthly summaries, and an
already computed deterministic risk assessment. The score and the
recommendation are final and must not be questioned.

Write a 1-2 sentence explanation of the decision for a loan officer and
return ONLY a JSON object: {"recommendation_reason": "<explanation>"}"#;

/// First 10,000 characters are enough for classification; extraction gets
/// the full text plus table fragments.
const CLASSIFIER_TEXT_LIMIT: usize = 10_000;

pub struct GeminiClassifier {
    client: Arc<GeminiClient>,
}

impl GeminiClassifier {
    pub fn new(client: Arc<GeminiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Classifier for GeminiClassifier {
    async fn classify(&self, document: &Document) -> Result<ClassificationResult> {
        let excerpt: String = document.raw_text.chars().take(CLASSIFIER_TEXT_LIMIT).collect();
        let response = self
            .client
            .generate(CLASSIFIER_SYSTEM_PROMPT, &excerpt)
            .await?;

        let result: ClassificationResult = parse_fenced_json(&response)?;
        info!(
            document_type = ?result.document_type,
            quality = result.quality_score,
            "Classification received"
        );
        Ok(result)
    }
}

pub struct GeminiExtractor {
    client: Arc<GeminiClient>,
}

impl GeminiExtractor {
    pub fn new(client: Arc<GeminiClient>) -> Self {
        Self { client }
    }

    fn render_tables(document: &Document) -> String {
        let mut out = String::new();
        for table in &document.tables {
            if let Some(title) = &table.title {
                out.push_str(title);
                out.push('\n');
            }
            for row in &table.rows {
                out.push_str(&row.join(" | "));
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }
}

#[async_trait]
impl Extractor for GeminiExtractor {
    async fn extract(&self, document: &Document) -> Result<ExtractedData> {
        let query = format!(
            "Bank Statement Text:\n{}\n\nTables Extracted:\n{}",
            document.raw_text,
            Self::render_tables(document)
        );
        let response = self.client.generate(EXTRACTOR_SYSTEM_PROMPT, &query).await?;

        let result: ExtractedData = parse_fenced_json(&response)?;
        info!(
            transaction_count = result.transactions.len(),
            "Extraction received"
        );
        Ok(result)
    }
}

pub struct GeminiAssessor {
    client: Arc<GeminiClient>,
}

impl GeminiAssessor {
    pub fn new(client: Arc<GeminiClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct NarrativeReply {
    recommendation_reason: String,
}

#[async_trait]
impl Assessor for GeminiAssessor {
    async fn narrate(
        &self,
        extracted: &ExtractedData,
        summaries: &[MonthlySummary],
        assessment: &RiskAssessment,
    ) -> Result<String> {
        let query = format!(
            "Extracted Data:\n{}\n\nMonthly Summaries:\n{}\n\nDeterministic Assessment:\n{}",
            serde_json::to_string_pretty(extracted)?,
            serde_json::to_string_pretty(summaries)?,
            serde_json::to_string_pretty(assessment)?,
        );
        let response = self.client.generate(ASSESSOR_SYSTEM_PROMPT, &query).await?;

        let reply: NarrativeReply = parse_fenced_json(&response)?;
        Ok(reply.recommendation_reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentType;

    #[test]
    fn test_classification_reply_parses() {
        let reply = r#"```json
{
  "document_type": "bank_statement",
  "quality_score": 8.5,
  "is_readable": true,
  "is_complete": true,
  "issues": [],
  "can_proceed": true
}
```"#;
        let parsed: ClassificationResult = parse_fenced_json(reply).unwrap();
        assert_eq!(parsed.document_type, DocumentType::BankStatement);
        assert_eq!(parsed.quality_score, 8.5);
    }

    #[test]
    fn test_extraction_reply_parses_signed_amounts() {
        let reply = r#"{
  "account_holder_name": "RAVI KUMAR",
  "bank_name": "HDFC Bank",
  "account_number_masked": "XXXX6789",
  "statement_period_start": "2026-01-01",
  "statement_period_end": "2026-01-31",
  "opening_balance": 50000.0,
  "closing_balance": 98000.0,
  "transactions": [
    {"date": "2026-01-05", "description": "NEFT Salary", "amount": 75000.0, "balance": 125000.0},
    {"date": "2026-01-20", "description": "Rent", "amount": -25000.0, "balance": null}
  ]
}"#;
        let parsed: ExtractedData = parse_fenced_json(reply).unwrap();
        assert!(parsed.transactions[0].is_credit());
        assert!(parsed.transactions[1].is_debit());
        assert_eq!(parsed.transactions[1].balance, None);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_narrative_reply_parses() {
        let reply = r#"{"recommendation_reason": "Healthy balances and regular salary credits."}"#;
        let parsed: NarrativeReply = parse_fenced_json(reply).unwrap();
        assert!(parsed.recommendation_reason.contains("Healthy"));
    }
}

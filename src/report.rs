//! Run result assembly
//!
//! Merges the per-stage outputs accumulated in PipelineState into the one
//! immutable value object handed back to the caller. Every run produces a
//! RunResult; gated-out and failed runs carry an explanatory reason instead
//! of an assessment.

use crate::models::{Document, DocumentType, PipelineState, RunResult, Stage};
use sha2::{Digest, Sha256};
use std::io::Write;

/// Assemble the final result from a finished (or failed) run.
pub fn assemble(state: PipelineState, total_elapsed_ms: u64) -> RunResult {
    let document_sha256 = document_fingerprint(&state.document);

    let (document_type, quality_score) = state
        .classification
        .as_ref()
        .map(|c| (c.document_type, c.quality_score))
        .unwrap_or((DocumentType::Other, 0.0));

    let gated = state
        .classification
        .as_ref()
        .map(|c| !c.can_proceed)
        .unwrap_or(false)
        && state.error.is_none();

    let reason = if let Some(assessment) = &state.risk_assessment {
        assessment.recommendation_reason.clone()
    } else if gated {
        let issues = state
            .classification
            .as_ref()
            .map(|c| c.issues.join("; "))
            .unwrap_or_default();
        if issues.is_empty() {
            "Document excluded by the classification gate".to_string()
        } else {
            format!("Document excluded by the classification gate: {}", issues)
        }
    } else if let Some(error) = &state.error {
        error.clone()
    } else {
        "Run terminated without an assessment".to_string()
    };

    RunResult {
        run_id: state.run_id,
        success: state.completed && state.risk_assessment.is_some(),
        gated,
        document_type,
        quality_score,
        classification: state.classification,
        extracted_data: state.extracted_data,
        monthly_summaries: state.monthly_summaries,
        risk_assessment: state.risk_assessment,
        stage_reached: state.current_stage,
        timings: state.timings,
        total_elapsed_ms,
        error: state.error,
        reason,
        document_sha256,
    }
}

/// SHA-256 over the serialized document, streamed directly into the hasher.
pub fn document_fingerprint(document: &Document) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), document).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassificationResult, Document};

    fn state_with_classification(can_proceed: bool) -> PipelineState {
        let mut state = PipelineState::new(Document::from_text("statement of account"));
        state.classification = Some(ClassificationResult {
            document_type: DocumentType::BankStatement,
            quality_score: if can_proceed { 8.0 } else { 2.0 },
            is_readable: true,
            is_complete: can_proceed,
            issues: if can_proceed {
                vec![]
            } else {
                vec!["blurred pages".into()]
            },
            can_proceed,
        });
        state
    }

    #[test]
    fn test_gated_run_has_reason_and_no_assessment() {
        let mut state = state_with_classification(false);
        state.current_stage = Stage::End;
        state.completed = true;

        let result = assemble(state, 12);
        assert!(!result.success);
        assert!(result.gated);
        assert!(result.risk_assessment.is_none());
        assert!(result.reason.contains("classification gate"));
        assert!(result.reason.contains("blurred pages"));
    }

    #[test]
    fn test_failed_run_carries_error_reason() {
        let mut state = PipelineState::new(Document::from_text("x"));
        state.fail(Stage::Extract, "Collaborator unavailable: 503");

        let result = assemble(state, 3);
        assert!(!result.success);
        assert!(!result.gated);
        assert_eq!(result.stage_reached, Stage::Failed);
        assert!(result.reason.contains("extract"));
        assert!(result.error.unwrap().contains("503"));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let doc = Document::from_text("statement of account");
        assert_eq!(document_fingerprint(&doc), document_fingerprint(&doc));
        assert_eq!(document_fingerprint(&doc).len(), 64);
        let other = Document::from_text("something else");
        assert_ne!(document_fingerprint(&doc), document_fingerprint(&other));
    }
}

//! Pipeline orchestrator - the run state machine
//!
//! Start → Classify → (gate) → Extract → Validate → End, with a terminal
//! Failed state reachable from any stage. Stages run strictly sequentially;
//! collaborator calls are bounded by a timeout and retried on transient
//! faults only. The compliance engine is local and pure and is never
//! retried.

use crate::config::{PipelineConfig, RetryConfig};
use crate::error::PipelineError;
use crate::models::{Document, PipelineState, RunResult, Stage};
use crate::stages::{Assessor, Classifier, Extractor};
use crate::{compliance, report, summary};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Run-scoped cancellation handle. Cancelling stops further collaborator
/// calls; the run terminates as Failed with a cancellation fault.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives one document through the three analysis stages.
///
/// Owns no cross-run state: every run gets a private PipelineState, so
/// independent runs can be scheduled concurrently by an external caller.
pub struct Pipeline {
    classifier: Box<dyn Classifier>,
    extractor: Box<dyn Extractor>,
    assessor: Option<Box<dyn Assessor>>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        classifier: Box<dyn Classifier>,
        extractor: Box<dyn Extractor>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            classifier,
            extractor,
            assessor: None,
            config,
        }
    }

    /// Attach a narrative assessor. Its output can only reword the
    /// recommendation reason; score and recommendation stay deterministic.
    pub fn with_assessor(mut self, assessor: Box<dyn Assessor>) -> Self {
        self.assessor = Some(assessor);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process a document through the full pipeline. Always yields a
    /// RunResult; faults and gate rejections are carried inside it.
    pub async fn process(&self, document: Document) -> RunResult {
        self.process_with_cancel(document, CancelFlag::new()).await
    }

    pub async fn process_with_cancel(
        &self,
        document: Document,
        cancel: CancelFlag,
    ) -> RunResult {
        let config = self.config.clone();
        self.process_with(document, cancel, &config).await
    }

    /// Run with an explicit configuration, overriding the pipeline's own.
    /// Used by the HTTP surface for per-request threshold and gate overrides.
    pub async fn process_with(
        &self,
        document: Document,
        cancel: CancelFlag,
        config: &PipelineConfig,
    ) -> RunResult {
        let run_start = Instant::now();
        let mut state = PipelineState::new(document);

        info!(run_id = ?state.run_id, "Pipeline run starting");

        // === CLASSIFY ===
        state.current_stage = Stage::Classify;
        let stage_start = Instant::now();
        let classified = self
            .call_stage(Stage::Classify, &config.retry, &cancel, || {
                self.classifier.classify(&state.document)
            })
            .await;
        state.record_timing(Stage::Classify, stage_start.elapsed().as_millis() as u64);

        let mut classification = match classified {
            Ok(c) => c,
            Err(e) => {
                state.fail(Stage::Classify, e.to_string());
                return report::assemble(state, run_start.elapsed().as_millis() as u64);
            }
        };

        // The gate decision is the orchestrator's, derived from config;
        // the collaborator's own flag is advisory only.
        classification.can_proceed = config.gate.admits(&classification);
        let admitted = classification.can_proceed;
        debug!(
            document_type = ?classification.document_type,
            quality = classification.quality_score,
            admitted,
            "Classification complete"
        );
        state.classification = Some(classification);

        if !admitted {
            info!(run_id = ?state.run_id, "Document gated out after classification");
            state.current_stage = Stage::End;
            state.completed = true;
            return report::assemble(state, run_start.elapsed().as_millis() as u64);
        }

        // === EXTRACT ===
        state.current_stage = Stage::Extract;
        let stage_start = Instant::now();
        let extracted = self
            .call_stage(Stage::Extract, &config.retry, &cancel, || {
                self.extractor.extract(&state.document)
            })
            .await;
        state.record_timing(Stage::Extract, stage_start.elapsed().as_millis() as u64);

        let extracted = match extracted {
            Ok(data) => data,
            Err(e) => {
                state.fail(Stage::Extract, e.to_string());
                return report::assemble(state, run_start.elapsed().as_millis() as u64);
            }
        };

        // Contract check before the engine ever sees the data; a violation
        // is fatal and not retried.
        if let Err(e) = extracted.validate() {
            state.fail(Stage::Extract, e.to_string());
            return report::assemble(state, run_start.elapsed().as_millis() as u64);
        }

        let summaries =
            summary::summarize_by_month(&extracted.transactions, config.salary_credit_floor);
        debug!(
            transaction_count = extracted.transactions.len(),
            month_count = summaries.len(),
            "Extraction complete"
        );

        // === VALIDATE ===
        state.current_stage = Stage::Validate;
        let stage_start = Instant::now();
        let mut assessment =
            match compliance::assess(&extracted, &summaries, &config.thresholds) {
                Ok(a) => a,
                Err(e) => {
                    state.record_timing(Stage::Validate, stage_start.elapsed().as_millis() as u64);
                    state.fail(Stage::Validate, e.to_string());
                    return report::assemble(state, run_start.elapsed().as_millis() as u64);
                }
            };

        if let Some(assessor) = &self.assessor {
            let narrated = self
                .call_stage(Stage::Validate, &config.retry, &cancel, || {
                    assessor.narrate(&extracted, &summaries, &assessment)
                })
                .await;
            match narrated {
                Ok(narrative) => assessment.recommendation_reason = narrative,
                Err(PipelineError::Cancelled) => {
                    state.record_timing(Stage::Validate, stage_start.elapsed().as_millis() as u64);
                    state.fail(Stage::Validate, PipelineError::Cancelled.to_string());
                    return report::assemble(state, run_start.elapsed().as_millis() as u64);
                }
                Err(e) => {
                    // The deterministic outcome stands unconditionally.
                    warn!(error = %e, "Narrative assessor failed; keeping deterministic reason");
                }
            }
        }
        state.record_timing(Stage::Validate, stage_start.elapsed().as_millis() as u64);

        info!(
            run_id = ?state.run_id,
            risk_score = assessment.risk_score,
            recommendation = ?assessment.recommendation,
            "Pipeline run complete"
        );

        state.extracted_data = Some(extracted);
        state.monthly_summaries = summaries;
        state.risk_assessment = Some(assessment);
        state.current_stage = Stage::End;
        state.completed = true;

        report::assemble(state, run_start.elapsed().as_millis() as u64)
    }

    /// Bound a collaborator call with the stage timeout and retry transient
    /// faults up to the configured attempt count.
    async fn call_stage<T, F, Fut>(
        &self,
        stage: Stage,
        retry: &RetryConfig,
        cancel: &CancelFlag,
        call: F,
    ) -> crate::Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;

            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let outcome = match tokio::time::timeout(retry.stage_timeout, call()).await
            {
                Ok(result) => result,
                Err(_) => Err(PipelineError::CollaboratorTimeout(format!(
                    "{} stage exceeded {:?}",
                    stage, retry.stage_timeout
                ))),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < retry.max_attempts => {
                    warn!(
                        stage = %stage,
                        attempt,
                        error = %e,
                        "Transient stage fault, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

//
// ================= Tests =================
//

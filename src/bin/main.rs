use loan_document_pipeline::{
    config::PipelineConfig,
    models::Document,
    pipeline::Pipeline,
    stages::{MockClassifier, MockExtractor},
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    info!("Loan Document Pipeline - demo run");

    let pipeline = Pipeline::new(
        Box::new(MockClassifier),
        Box::new(MockExtractor),
        PipelineConfig::from_env(),
    );

    let document = Document::from_text(sample_statement());

    let result = pipeline.process(document).await;

    info!("Run {} finished", result.run_id);
    info!("  success:      {}", result.success);
    info!("  gated:        {}", result.gated);
    info!("  stage:        {}", result.stage_reached);
    info!("  type:         {:?}", result.document_type);
    info!("  fingerprint:  {}", result.document_sha256);
    info!("  elapsed (ms): {}", result.total_elapsed_ms);

    for summary in &result.monthly_summaries {
        info!(
            "  {}  credits {:>12.2}  debits {:>12.2}  net {:>12.2}  salary {}",
            summary.month,
            summary.total_credits,
            summary.total_debits,
            summary.net_flow,
            summary.salary_detected
        );
    }

    if let Some(assessment) = &result.risk_assessment {
        info!(
            "  risk score:   {} ({:?})",
            assessment.risk_score, assessment.recommendation
        );
        for check in &assessment.compliance_checks {
            info!(
                "    [{}] {} - actual {}, threshold {}",
                if check.passed { "PASS" } else { "FAIL" },
                check.rule_name,
                check.actual,
                check.threshold
            );
        }
        info!("  reason: {}", assessment.recommendation_reason);
    } else {
        info!("  reason: {}", result.reason);
    }

    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}

fn sample_statement() -> String {
    let mut text = String::from(
        "HDFC Bank - Statement of Account\n\
         Bank: HDFC Bank\n\
         Account Holder: RAVI KUMAR\n\
         Account Number: 50100123456789\n\
         Statement Period: 2026-01-01 to 2026-06-30\n\
         Opening Balance: 52000.00\n\
         Closing Balance: 322000.00\n\n",
    );
    let mut balance = 52_000.0;
    for month in 1..=6 {
        balance += 75_000.0;
        text.push_str(&format!(
            "2026-{:02}-05 | NEFT Salary Credit ACME Corp | +75000.00 | {:.2}\n",
            month, balance
        ));
        balance -= 18_000.0;
        text.push_str(&format!(
            "2026-{:02}-07 | UPI Rent Transfer | -18000.00 | {:.2}\n",
            month, balance
        ));
        balance -= 12_000.0;
        text.push_str(&format!(
            "2026-{:02}-15 | Card Payment | -12000.00 | {:.2}\n",
            month, balance
        ));
    }
    text
}

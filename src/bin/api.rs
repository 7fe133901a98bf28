use loan_document_pipeline::{
    api::start_server,
    config::PipelineConfig,
    gemini::GeminiClient,
    pipeline::Pipeline,
    stages::{GeminiAssessor, GeminiClassifier, GeminiExtractor, MockClassifier, MockExtractor},
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("Loan Document Pipeline - API Server");
    info!("Port: {}", api_port);

    let config = PipelineConfig::from_env();

    let pipeline = match std::env::var("GEMINI_API_KEY") {
        Ok(api_key) if !api_key.trim().is_empty() => {
            info!("GEMINI_API_KEY found, using model-backed collaborators");
            let client = Arc::new(GeminiClient::new(api_key)?);
            Pipeline::new(
                Box::new(GeminiClassifier::new(client.clone())),
                Box::new(GeminiExtractor::new(client.clone())),
                config,
            )
            .with_assessor(Box::new(GeminiAssessor::new(client)))
        }
        _ => {
            eprintln!("GEMINI_API_KEY not set in .env; falling back to mock collaborators");
            Pipeline::new(Box::new(MockClassifier), Box::new(MockExtractor), config)
        }
    };

    info!("Pipeline initialized");
    info!("Starting API server...");

    start_server(Arc::new(pipeline), api_port).await?;

    Ok(())
}

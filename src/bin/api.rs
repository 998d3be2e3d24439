use financial_qa_orchestrator::{
    api::start_server,
    collaborators::DataApiClient,
    companies::CompanyLookup,
    coordinator::Coordinator,
    llm::GeminiClient,
    ratelimit::FixedIntervalLimiter,
    responders::{DocumentFlow, StructuredDataFlow},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let gemini_api_key = std::env::var("GEMINI_API_KEY").unwrap_or_else(|_| {
        warn!("GEMINI_API_KEY not set; completion calls will fail");
        String::new()
    });

    let data_api_base_url = std::env::var("DATA_API_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:9000".to_string());

    let docs_root: PathBuf = std::env::var("DOCS_ROOT")
        .unwrap_or_else(|_| "./docs".to_string())
        .into();

    let translator_rpm: u32 = std::env::var("SQL_TRANSLATOR_RPM")
        .unwrap_or_else(|_| "15".to_string())
        .parse()?;

    let api_port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("Financial QA Orchestrator - API server");
    info!(port = api_port, rpm = translator_rpm, "Configuration loaded");

    // One pooled completion client shared by every reasoning role.
    let completion: Arc<GeminiClient> = Arc::new(GeminiClient::new(gemini_api_key));
    let data_api = DataApiClient::new(data_api_base_url);

    // Built once at startup, read-only afterwards.
    let companies = Arc::new(CompanyLookup::from_docs_root(&docs_root));

    // Process-wide limiter for the SQL translation collaborator.
    let limiter = Arc::new(FixedIntervalLimiter::per_minute(translator_rpm));

    let structured = StructuredDataFlow::new(
        completion.clone(),
        Arc::new(data_api.clone()),
        limiter,
    );
    let documents = DocumentFlow::new(completion.clone(), Arc::new(data_api));

    let coordinator = Arc::new(Coordinator::new(
        completion.clone(),
        completion,
        structured,
        documents,
        companies,
    ));

    info!("Coordinator initialized; starting API server");

    start_server(coordinator, api_port).await?;

    Ok(())
}

//! Wiring & DI. Entry point: load config, bootstrap adapters, inject into the
//! pipeline, run one query from argv. No business logic here.

use dotenv::dotenv;
use recfind::adapters::ai::{MockChatAdapter, OllamaAdapter};
use recfind::adapters::persistence::SqliteQueryRepository;
use recfind::ports::ChatPort;
use recfind::shared::config::AppConfig;
use recfind::usecases::{AliasResolver, PipelineConfig, QueryExecutionService};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_loaded = dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &env_loaded {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(_) => info!("no .env found"),
    }

    let query: String = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if query.trim().is_empty() {
        eprintln!("Usage: recfind <natural language query>");
        std::process::exit(2);
    }

    let cfg = AppConfig::load().unwrap_or_default();

    let repo = Arc::new(
        SqliteQueryRepository::connect(cfg.db_path_or_default(), &cfg.provider_or_default())
            .await?,
    );

    let alias_resolver = Arc::new(AliasResolver::new(repo.clone()));
    let stats = alias_resolver.refresh().await?;
    info!(
        aliases = stats.aliases_loaded,
        mappings = stats.mappings_loaded,
        "alias cache ready"
    );

    // RECFIND_MOCK_CHAT runs the pipeline without a model backend; every
    // model-dependent stage exercises its fallback.
    let chat: Arc<dyn ChatPort> = if std::env::var("RECFIND_MOCK_CHAT").is_ok() {
        warn!("RECFIND_MOCK_CHAT is set; using the mock chat adapter");
        Arc::new(MockChatAdapter::unreachable())
    } else {
        Arc::new(OllamaAdapter::new(
            &cfg.ollama_base_url_or_default(),
            cfg.ollama_request_timeout_ms_or_default(),
        )?)
    };

    let pipeline = QueryExecutionService::new(
        chat,
        repo,
        alias_resolver,
        PipelineConfig {
            understanding_model: cfg.model_understanding_or_default(),
            summary_model: cfg.model_summary_or_default(),
            understanding_timeout_ms: cfg.understanding_timeout_ms_or_default(),
            chat_timeout_ms: cfg.ollama_request_timeout_ms_or_default(),
            default_window_days: cfg.default_window_days_or_default(),
            candidate_limit: cfg.candidate_limit_or_default(),
            ranking_threshold: cfg.ranking_threshold_or_default(),
            category_defaults: cfg.category_defaults(),
        },
    )?;

    match pipeline.execute_query(&query).await {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(error) if error.is_client_error() => {
            eprintln!("{}", error);
            std::process::exit(2);
        }
        Err(error) => Err(error.into()),
    }
}

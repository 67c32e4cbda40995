use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use function_engine::worker::{Worker, WorkerConfig};
use function_engine::{Engine, EngineConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("function_engine=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    info!("Starting Function Worker...");

    let config = EngineConfig::from_env();
    info!(
        "Engine config: workspace_root={}, timeout={}s, memory={}MB, runtime={}",
        config.workspace_root.display(),
        config.timeout.as_secs(),
        config.memory_mb(),
        config.container_runtime
    );

    let engine = Arc::new(Engine::new(config).await?);
    info!("Execution strategy: {}", engine.strategy_name());

    Worker::new(engine, WorkerConfig::from_env()).run().await
}

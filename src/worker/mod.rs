//! Redis queue worker
//!
//! Pops `FunctionJob`s from `function:queue`, runs each through the engine and
//! stores the resulting `ExecutionRecord` under `function:result:<id>` (expiring
//! after an hour) while publishing it on `function:results`.

pub mod job;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::env_or;
use crate::engine::Engine;
pub use job::{ExecutionRecord, ExecutionStatus, FunctionJob};

/// Redis key constants
pub mod keys {
    /// Execution job queue key
    pub const QUEUE: &str = "function:queue";

    /// Execution result key prefix (for polling)
    pub const RESULT_PREFIX: &str = "function:result:";

    /// Execution result channel (for pub/sub)
    pub const RESULT_CHANNEL: &str = "function:results";
}

const RESULT_EXPIRY_SECS: u64 = 3600; // 1 hour
const RECONNECT_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub redis_url: String,
    /// Jobs executed at the same time
    pub concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            concurrency: 4,
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            concurrency: env_or("FUNCTION_WORKER_CONCURRENCY", defaults.concurrency).max(1),
        }
    }
}

pub struct Worker {
    engine: Arc<Engine>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(engine: Arc<Engine>, config: WorkerConfig) -> Self {
        Self { engine, config }
    }

    /// Consume the queue forever; returns only on unrecoverable errors
    pub async fn run(self) -> Result<()> {
        let client =
            redis::Client::open(self.config.redis_url.as_str()).context("Failed to create Redis client")?;
        // BLPOP holds its connection, so results go out on a second one
        let mut queue_conn = get_connection_with_retry(&client).await?;
        let store = ResultStore::connect(client.clone()).await?;
        info!("Connected to Redis at {}", self.config.redis_url);

        let permits = Arc::new(Semaphore::new(self.config.concurrency));
        info!(
            "Waiting for jobs (concurrency={}, strategy={})...",
            self.config.concurrency,
            self.engine.strategy_name()
        );

        loop {
            let permit = Arc::clone(&permits)
                .acquire_owned()
                .await
                .context("Worker semaphore closed")?;

            let popped: Option<(String, String)> = match queue_conn.blpop(keys::QUEUE, 0.0).await {
                Ok(res) => res,
                Err(e) => {
                    warn!("Redis BLPOP failed: {}. Attempting to reconnect...", e);
                    queue_conn = get_connection_with_retry(&client).await?;
                    continue;
                }
            };
            let Some((_, payload)) = popped else {
                continue;
            };

            let job = match serde_json::from_str::<FunctionJob>(&payload) {
                Ok(job) => job,
                Err(e) => {
                    warn!("Failed to parse job data: {}", e);
                    continue;
                }
            };
            info!(
                "Received function job: execution_id={}, language={}",
                job.execution_id, job.function.language
            );

            let engine = Arc::clone(&self.engine);
            let mut store = store.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let record = run_job(&engine, &job).await;
                if let Err(e) = store.store(&record).await {
                    error!(
                        "Failed to store result for execution {}: {:#}",
                        record.execution_id, e
                    );
                }
                info!(
                    "Function job completed: execution_id={}, status={:?}, time={}ms",
                    record.execution_id, record.status, record.execution_time
                );
            });
        }
    }
}

/// Execute one job and build its audit record
pub async fn run_job(engine: &Engine, job: &FunctionJob) -> ExecutionRecord {
    let started_at = Utc::now();
    let deadline = Instant::now() + engine.config().timeout;

    match engine.execute(deadline, job.to_request()).await {
        Ok(result) => ExecutionRecord::from_result(job, &result, started_at, Utc::now()),
        Err(e) => {
            error!("Engine failed on execution {}: {}", job.execution_id, e);
            ExecutionRecord::engine_failure(job, &e, started_at, Utc::now())
        }
    }
}

/// Writes records to Redis, reconnecting once per failed command
#[derive(Clone)]
pub struct ResultStore {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl ResultStore {
    pub async fn connect(client: redis::Client) -> Result<Self> {
        let conn = get_connection_with_retry(&client).await?;
        Ok(Self { client, conn })
    }

    /// Store the record for polling and publish it to subscribers
    pub async fn store(&mut self, record: &ExecutionRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        let key = result_key(&record.execution_id);

        if let Err(e) = self
            .conn
            .set_ex::<_, _, ()>(&key, &json, RESULT_EXPIRY_SECS)
            .await
        {
            warn!("Redis set_ex failed: {}. Reconnecting and retrying...", e);
            self.reconnect().await?;
            self.conn
                .set_ex::<_, _, ()>(&key, &json, RESULT_EXPIRY_SECS)
                .await?;
        }

        if let Err(e) = self
            .conn
            .publish::<_, _, ()>(keys::RESULT_CHANNEL, &json)
            .await
        {
            warn!("Redis publish failed: {}. Reconnecting and retrying...", e);
            self.reconnect().await?;
            self.conn
                .publish::<_, _, ()>(keys::RESULT_CHANNEL, &json)
                .await?;
        }

        Ok(())
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.conn = get_connection_with_retry(&self.client).await?;
        Ok(())
    }
}

pub fn result_key(execution_id: &str) -> String {
    format!("{}{}", keys::RESULT_PREFIX, execution_id)
}

async fn get_connection_with_retry(client: &redis::Client) -> Result<MultiplexedConnection> {
    loop {
        match client.get_multiplexed_async_connection().await {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                warn!(
                    "Failed to connect to Redis: {}. Retrying in {} seconds...",
                    e,
                    RECONNECT_DELAY.as_secs()
                );
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::core::Function;
    use crate::isolation::NativeStrategy;
    use crate::languages::RuntimeCatalog;
    use serde_json::Map;

    fn job(language: &str) -> FunctionJob {
        FunctionJob {
            execution_id: "exec-42".to_string(),
            function_id: "fn-7".to_string(),
            function: Function::new(language, "nodejs18", "", "handler"),
            data: Map::new(),
            headers: Map::new(),
            method: "GET".to_string(),
            path: "/hello".to_string(),
        }
    }

    #[test]
    fn test_result_key() {
        assert_eq!(result_key("exec-42"), "function:result:exec-42");
    }

    #[test]
    fn test_worker_config_from_env() {
        std::env::set_var("FUNCTION_WORKER_CONCURRENCY", "0");
        assert_eq!(WorkerConfig::from_env().concurrency, 1);
        std::env::set_var("FUNCTION_WORKER_CONCURRENCY", "8");
        assert_eq!(WorkerConfig::from_env().concurrency, 8);
        std::env::remove_var("FUNCTION_WORKER_CONCURRENCY");
        assert_eq!(WorkerConfig::from_env().concurrency, 4);
    }

    #[test]
    fn test_run_job_records_validation_failure() {
        let root = tempfile::tempdir().unwrap();
        let config = EngineConfig::default().with_workspace_root(root.path());
        let catalog = Arc::new(RuntimeCatalog::builtin().unwrap());
        let strategy = Arc::new(NativeStrategy::new(&config, catalog));
        let engine = tokio_test::assert_ok!(Engine::with_strategy(config, strategy));

        let record = tokio_test::block_on(run_job(&engine, &job("cobol")));
        assert_eq!(record.execution_id, "exec-42");
        assert_eq!(record.function_id, "fn-7");
        assert_eq!(record.status, ExecutionStatus::Error);
        assert_eq!(record.status_code, 400);
        assert_eq!(record.method, "GET");
        assert_eq!(record.path, "/hello");
        assert!(record.completed_at >= record.started_at);
    }
}

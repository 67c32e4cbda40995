//! Engine configuration
//!
//! Loaded from environment variables (a `.env` file is honored by the binary).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::EngineError;

/// Smallest memory ceiling container runtimes accept
const MIN_MEMORY_BYTES: u64 = 6 * 1024 * 1024;
const MAX_MEMORY_BYTES: u64 = 64 * 1024 * 1024 * 1024;
const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Parent directory of per-call workspaces
    pub workspace_root: PathBuf,
    /// Upper bound on a single call (default: 30s)
    pub timeout: Duration,
    /// Container memory ceiling in bytes (default: 128MB)
    pub max_memory_bytes: u64,
    /// Captured stdout and stderr are each capped at this many bytes
    pub max_log_bytes: usize,
    /// Container CLI binary (docker, podman)
    pub container_runtime: String,
    /// uid:gid the guest runs as inside the container
    pub container_user: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir().join("function-workspaces"),
            timeout: Duration::from_secs(30),
            max_memory_bytes: 128 * 1024 * 1024,
            max_log_bytes: 64 * 1024,
            container_runtime: "docker".to_string(),
            container_user: "1000:1000".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the environment, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let workspace_root = std::env::var("FUNCTION_WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.workspace_root);
        let timeout_secs = env_or("FUNCTION_TIMEOUT_SECS", defaults.timeout.as_secs());
        let memory_mb = env_or(
            "FUNCTION_MAX_MEMORY_MB",
            defaults.max_memory_bytes / (1024 * 1024),
        );
        let max_log_bytes = env_or("FUNCTION_MAX_LOG_BYTES", defaults.max_log_bytes);
        let container_runtime =
            std::env::var("CONTAINER_RUNTIME").unwrap_or(defaults.container_runtime);

        Self {
            workspace_root,
            timeout: Duration::from_secs(timeout_secs),
            max_memory_bytes: memory_mb.saturating_mul(1024 * 1024),
            max_log_bytes,
            container_runtime,
            container_user: defaults.container_user,
        }
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_container_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.container_runtime = runtime.into();
        self
    }

    /// Memory ceiling in whole megabytes, as passed to `--memory <N>m`
    pub fn memory_mb(&self) -> u64 {
        self.max_memory_bytes / (1024 * 1024)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.timeout.is_zero() {
            return Err(EngineError::InvalidConfig("timeout must be positive".into()));
        }
        if self.timeout > MAX_TIMEOUT {
            return Err(EngineError::InvalidConfig(format!(
                "timeout {}s exceeds the {}s maximum",
                self.timeout.as_secs(),
                MAX_TIMEOUT.as_secs()
            )));
        }
        if self.max_memory_bytes < MIN_MEMORY_BYTES {
            return Err(EngineError::InvalidConfig(format!(
                "max memory {} bytes is below the 6MB minimum",
                self.max_memory_bytes
            )));
        }
        if self.max_memory_bytes > MAX_MEMORY_BYTES {
            return Err(EngineError::InvalidConfig(format!(
                "max memory {} bytes exceeds the 64GB maximum",
                self.max_memory_bytes
            )));
        }
        if self.container_runtime.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "container runtime name is empty".into(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn env_or<T: FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid value for {}: {:?}, using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.memory_mb(), 128);
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = EngineConfig::default().with_timeout(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_tiny_memory() {
        let mut config = EngineConfig::default();
        config.max_memory_bytes = 1024;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unbounded_values() {
        let config = EngineConfig::default().with_timeout(Duration::from_secs(u64::MAX));
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.max_memory_bytes = u64::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_huge_memory_from_env_saturates() {
        std::env::set_var("FUNCTION_MAX_MEMORY_MB", u64::MAX.to_string());
        let config = EngineConfig::from_env();
        std::env::remove_var("FUNCTION_MAX_MEMORY_MB");
        assert_eq!(config.max_memory_bytes, u64::MAX);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("FUNCTION_ENGINE_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_or("FUNCTION_ENGINE_TEST_GARBAGE", 7u64), 7);
        std::env::set_var("FUNCTION_ENGINE_TEST_GARBAGE", " 12 ");
        assert_eq!(env_or("FUNCTION_ENGINE_TEST_GARBAGE", 7u64), 12);
    }
}

//! Persistence backend factory

use std::sync::Arc;

use crate::config::PersistenceConfig;
use crate::postgres::PostgresPool;

use super::backend::PersistenceBackend;
use super::memory_backend::MemoryBackend;
use super::postgres_backend::PostgresBackend;

/// Create a persistence backend based on configuration.
///
/// - `"postgres"`: a `PostgresBackend` if a pool is provided
/// - `"memory"` (default): a `MemoryBackend`
pub fn create_persistence_backend(
    settings: &PersistenceConfig,
    postgres_pool: Option<Arc<PostgresPool>>,
) -> Arc<dyn PersistenceBackend> {
    match settings.backend.as_str() {
        "postgres" => {
            if let Some(pool) = postgres_pool {
                tracing::info!(backend = "postgres", "Creating PostgreSQL persistence backend");
                Arc::new(PostgresBackend::new(pool.pool().clone()))
            } else {
                tracing::warn!(
                    "PostgreSQL backend requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryBackend::new())
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory persistence backend");
            Arc::new(MemoryBackend::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_is_default() {
        let config = PersistenceConfig::default();
        assert_eq!(create_persistence_backend(&config, None).backend_type(), "memory");
    }

    #[test]
    fn test_postgres_without_pool_falls_back() {
        let config = PersistenceConfig {
            backend: "postgres".to_string(),
        };
        assert_eq!(create_persistence_backend(&config, None).backend_type(), "memory");
    }
}

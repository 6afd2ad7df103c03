use crate::cli::StorageBackend;
use anyhow::{Context, Result};
use faixa_core::config::LayeredConfig;
use faixa_core::FaixaError;
use faixa_etl::{run_import, ImportOptions, ImportReport};
use faixa_store::{MemoryStore, PostgresConfig, PostgresStore, RiskReader};

/// Connection details from a database URL for error messages; credentials are left out
fn parse_database_url(url: &str) -> (String, String, String) {
    let authority = url.split('@').nth(1).and_then(|s| s.split('/').next());

    let host = authority
        .and_then(|s| s.split(':').next())
        .unwrap_or("localhost")
        .to_string();

    let port = authority
        .and_then(|s| s.split(':').nth(1))
        .unwrap_or("5432")
        .to_string();

    let database = url
        .split('/')
        .next_back()
        .and_then(|s| s.split('?').next())
        .unwrap_or("faixa")
        .to_string();

    (host, port, database)
}

/// The selected storage backend
pub enum Storage {
    Memory(MemoryStore),
    Postgres(PostgresStore),
}

impl Storage {
    pub async fn open(backend: StorageBackend, config: &LayeredConfig) -> Result<Self> {
        match backend {
            StorageBackend::Memory => Ok(Self::Memory(MemoryStore::new())),
            StorageBackend::Postgres => Self::open_postgres(config).await,
        }
    }

    async fn open_postgres(config: &LayeredConfig) -> Result<Self> {
        let pg_config = PostgresConfig::from_layered(config).context(
            "Failed to load PostgreSQL configuration. Set FAIXA_DATABASE_URL or DATABASE_URL.",
        )?;

        let store = PostgresStore::new(pg_config.clone()).await.map_err(|e| {
            let (host, port, database) = parse_database_url(&pg_config.database_url);
            anyhow::Error::from(e).context(format!(
                "Failed to connect to PostgreSQL\n\n\
                 Connection details:\n  \
                   Host: {}\n  \
                   Port: {}\n  \
                   Database: {}\n\n\
                 Remediation:\n  \
                   1. Ensure PostgreSQL with PostGIS is running\n  \
                   2. Check FAIXA_DATABASE_URL / DATABASE_URL\n  \
                   3. Verify credentials and that the database exists",
                host, port, database
            ))
        })?;

        Ok(Self::Postgres(store))
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Postgres(_))
    }

    /// Run an import on whichever backend is open
    pub async fn import(
        &self,
        options: &ImportOptions,
        config: &LayeredConfig,
    ) -> Result<ImportReport, FaixaError> {
        match self {
            Self::Memory(store) => run_import(store, options, config).await,
            Self::Postgres(store) => run_import(store, options, config).await,
        }
    }

    pub fn reader(&self) -> &dyn RiskReader {
        match self {
            Self::Memory(store) => store,
            Self::Postgres(store) => store,
        }
    }
}

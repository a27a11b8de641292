//! pgmatrix - Run PostgreSQL queries and read the results as float matrices.

use std::sync::Arc;

use pgmatrix::api::{execute_as_matrix, MatrixSession};
use pgmatrix::cli::Cli;
use pgmatrix::config::{Config, ConnectionConfig};
use pgmatrix::db::{self, MockEngine, QueryEngine};
use pgmatrix::error::{MatrixError, Result};
use pgmatrix::logging;
use pgmatrix::output::ResultOutput;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    match cli.log_file() {
        Some(path) => logging::init_file_logging(path.as_deref()),
        None => logging::init_stderr_logging(),
    }

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let format = cli.parse_output_format().map_err(MatrixError::config)?;

    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;
    cli.apply_execution_overrides(&mut config.execution);

    let engine = open_engine(&cli, &config).await?;
    let session = MatrixSession::with_config(engine, &config.execution);

    let query = cli.read_query()?;
    let outcome = execute_as_matrix(&session, &query, config.execution.default_row_limit).await;

    if let Err(e) = session.close().await {
        warn!("Failed to close session: {}", e);
    }

    let result = outcome?;
    print!("{}", ResultOutput::new(format).format(&result));
    Ok(())
}

/// Opens the mock engine or connects to the configured database.
async fn open_engine(cli: &Cli, config: &Config) -> Result<Arc<dyn QueryEngine>> {
    if cli.mock_db {
        let mut engine = MockEngine::new();
        if let Some(seed) = &cli.seed {
            let content = std::fs::read_to_string(seed).map_err(|e| {
                MatrixError::config(format!("Failed to read seed file {}: {e}", seed.display()))
            })?;
            engine = engine.with_seed(&content)?;
        }
        info!("Using mock database");
        return Ok(Arc::new(engine));
    }

    // Precedence:
    // 1. CLI arguments (highest)
    // 2. Named connection from config
    // 3. Default connection from config
    // 4. Environment variables
    let connection = resolve_connection(cli, config)?.ok_or_else(|| {
        MatrixError::config("No database connection configured. Use --help for usage information.")
    })?;

    info!("Connection: {}", connection.display_string());
    Ok(Arc::from(db::connect(&connection).await?))
}

/// Resolves the final connection configuration from CLI args, config file, and environment.
fn resolve_connection(cli: &Cli, config: &Config) -> Result<Option<ConnectionConfig>> {
    let mut connection = cli.to_connection_config()?;

    if connection.is_none() {
        if let Some(name) = cli.connection_name() {
            connection = config.get_connection(Some(name)).cloned();
            if connection.is_none() {
                return Err(MatrixError::config(format!(
                    "Connection '{}' not found in config file",
                    name
                )));
            }
        }
    }

    if connection.is_none() {
        connection = config.get_connection(None).cloned();
    }

    if connection.is_none() && std::env::var("PGDATABASE").is_ok() {
        connection = Some(ConnectionConfig::default());
    }

    if let Some(ref mut conn) = connection {
        conn.apply_env_defaults();
    }

    Ok(connection)
}

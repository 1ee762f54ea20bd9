pub mod config;
pub mod db;
pub mod decomposition;
pub mod errors;
pub mod models;
pub mod requests;
pub mod telemetry;
pub mod todo_list;
pub mod workbench;

use crate::config::AppConfig;
use crate::decomposition::DecompositionClient;
use crate::errors::AppResult;
use crate::workbench::Workbench;

/// Installs logging under the data directory and opens both stores.
pub async fn bootstrap<C: DecompositionClient>(
    config: &AppConfig,
    client: C,
) -> AppResult<Workbench<C>> {
    telemetry::init_tracing(&config.log_dir(), &config.log_filter)?;
    let workbench = Workbench::open(config, client).await?;
    tracing::info!(
        data_dir = %config.data_dir.display(),
        database = %config.database_name,
        schema_version = config.schema_version,
        "workbench ready"
    );
    Ok(workbench)
}

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use warehouse_etl::archive::RawArchiver;
use warehouse_etl::config::{EtlConfig, RunTarget, WarehouseKind};
use warehouse_etl::pipeline::{Pipeline, RunReport};
use warehouse_etl::warehouse::{MemoryWarehouse, PostgresWarehouse, Warehouse};
use warehouse_etl::{PipelineError, PipelineResult};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = EtlConfig::parse();
    match run(&config).await {
        Ok(report) => {
            info!(
                source = %report.source,
                records = report.records,
                inserted = report.load.as_ref().map_or(0, |l| l.inserted),
                failed = report.load.as_ref().map_or(0, |l| l.failed),
                view = report.view.as_deref().unwrap_or("-"),
                "etl finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "etl failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &EtlConfig) -> PipelineResult<RunReport> {
    let target = config.target()?;

    let warehouse: Arc<dyn Warehouse> = match config.warehouse {
        WarehouseKind::Postgres => {
            let pg = config.postgres_config()?;
            let warehouse = PostgresWarehouse::connect(&pg)
                .await
                .map_err(|e| PipelineError::Connection(e.to_string()))?;
            info!(host = %pg.host, db = %pg.dbname, "connected to warehouse");
            Arc::new(warehouse)
        }
        WarehouseKind::Memory => {
            info!("using in-memory warehouse (dry run)");
            Arc::new(MemoryWarehouse::new())
        }
    };

    let store = config.raw_store().await?;

    let pipeline = Pipeline::new(warehouse, RawArchiver::new(store))
        .with_extract_options(config.extract_options()?);

    match target {
        RunTarget::File(path) => pipeline.run_file(path).await,
        RunTarget::Query(sql) => pipeline.run_query(&sql).await,
    }
}

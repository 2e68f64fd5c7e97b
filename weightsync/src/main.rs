use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use futures::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use weightsync::config::Config;
use weightsync::discovery::{IdentityDiscovery, PageIdentityDiscovery};
use weightsync::models::WeightRecord;
use weightsync::remote::GarminConnectClient;
use weightsync::store::{Database, KeyValueStore, LibSqlStore};
use weightsync::sync::SyncEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "weightsync")]
#[command(about = "Sync your Garmin Connect weight history into a local snapshot")]
struct Args {
    /// Read the logged-in Garmin Connect page from disk instead of fetching it
    #[arg(long)]
    page_file: Option<PathBuf>,

    /// Record and log output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    let json = args.format == OutputFormat::Json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weightsync=info".into()),
        )
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .init();

    let config = Config::from_env();

    tracing::info!(url = %config.store.url, "Opening snapshot store...");
    let database = Database::new(&config.store).await?;
    let store: Arc<dyn KeyValueStore> = Arc::new(LibSqlStore::new(database));

    let client = GarminConnectClient::new(&config.garmin)?;
    let discovery: Arc<dyn IdentityDiscovery> = match &args.page_file {
        Some(path) => {
            tracing::info!(path = %path.display(), "Reading profile page from file");
            let page = tokio::fs::read_to_string(path).await?;
            Arc::new(PageIdentityDiscovery::from_page(page))
        }
        None => Arc::new(PageIdentityDiscovery::remote(client.clone())),
    };

    let engine = SyncEngine::new(Arc::new(client), discovery, store, config.sync.clone());

    let user = engine.get_user().await?;

    let mut records = engine.get_weight_records(&user);
    let persistence = records.persistence();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut count = 0usize;
    let mut outcome = Ok(());
    loop {
        tokio::select! {
            item = records.next() => match item {
                Some(Ok(record)) => {
                    print_record(&record, args.format)?;
                    count += 1;
                }
                Some(Err(e)) => {
                    outcome = Err(e);
                    break;
                }
                None => break,
            },
            _ = &mut shutdown => {
                tracing::info!("Interrupted, finishing in-flight work...");
                break;
            }
        }
    }
    drop(records);

    engine.drain().await;

    if let Some(report) = persistence.report() {
        tracing::info!(
            records = count,
            persisted = report.entries_persisted,
            batches = report.batches,
            write_failures = report.write_failures,
            "Sync finished"
        );
    }

    outcome.map_err(Into::into)
}

fn print_record(record: &WeightRecord, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => println!(
            "{}\t{:.1} kg",
            record.date.format("%Y-%m-%d"),
            record.mass_grams as f64 / 1000.0
        ),
        OutputFormat::Json => println!("{}", serde_json::to_string(record)?),
    }
    Ok(())
}

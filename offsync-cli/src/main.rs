use clap::{Parser, Subcommand};
use offsync::{ClientHub, HealthProbe, NetworkStatus, OffsyncConfig, QueueStore};
use offsync_worker::Worker;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "offsync", about = "Inspect and replay the offline request queue")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, env = "OFFSYNC_DATA_DIR", default_value = "./data")]
    data_dir: String,
    #[arg(long, env = "OFFSYNC_API_BASE_URL", default_value = "http://localhost:3000")]
    api_base_url: String,
}

#[derive(Subcommand)]
enum Command {
    /// Print every queued request as one JSON line, oldest first
    List,
    /// Print the number of queued requests
    Status,
    /// Replay the queue once and exit
    Sync,
    /// Watch connectivity and replay on every reconnect until interrupted
    Run,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn list(config: &OffsyncConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut records = QueueStore::open(&config.data_dir)?.get_all()?;
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    for record in &records {
        println!("{}", serde_json::to_string(record)?);
    }
    Ok(())
}

async fn sync_once(config: &OffsyncConfig) -> Result<(), Box<dyn std::error::Error>> {
    let worker = Worker::new(config, ClientHub::new())?;
    let report = worker.replayer.replay_pass().await?;
    println!(
        "delivered: {}, failed: {}, remaining: {}",
        report.delivered.len(),
        report.failed.len(),
        report.remaining
    );
    Ok(())
}

async fn run(config: &OffsyncConfig) -> Result<(), Box<dyn std::error::Error>> {
    let worker = Worker::new(config, ClientHub::new())?;
    let probe = HealthProbe::new(config, NetworkStatus::new(false));
    let prober = tokio::spawn(Arc::clone(&probe).run());
    let syncer = worker.spawn_sync_loop(probe);

    tokio::signal::ctrl_c().await?;
    tracing::info!("[SYNC] shutting down");
    prober.abort();
    syncer.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    std::env::set_var("OFFSYNC_DATA_DIR", &cli.data_dir);
    std::env::set_var("OFFSYNC_API_BASE_URL", &cli.api_base_url);

    init_tracing();
    let config = OffsyncConfig::from_env()?;

    match cli.command {
        Command::List => list(&config),
        Command::Status => {
            let store = QueueStore::open(&config.data_dir)?;
            println!("pending: {}", store.len()?);
            Ok(())
        }
        Command::Sync => sync_once(&config).await,
        Command::Run => run(&config).await,
    }
}

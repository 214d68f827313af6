use clap::Parser;
use equb::application::engine::EqubEngine;
use equb::config::{EngineConfig, GatewayConfig};
use equb::domain::group::{Frequency, Group, NewGroup};
use equb::domain::money::Amount;
use equb::domain::ports::RepositoryBox;
use equb::domain::transaction::TransactionStatus;
use equb::error::{EqubError, Result as EqubResult};
use equb::infrastructure::gateway::SimulatedGateway;
use equb::infrastructure::in_memory::InMemoryRepository;
use equb::infrastructure::notifier::LogNotifier;
use equb::interfaces::csv::command_reader::{Command, CommandReader, CommandType};
use equb::interfaces::csv::summary_writer::SummaryWriter;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands CSV file (op, group, user, amount, frequency)
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Probability in [0, 1] that the simulated gateway accepts a payment
    #[arg(long)]
    success_rate: Option<f64>,

    /// Simulated gateway latency in milliseconds
    #[arg(long)]
    gateway_latency_ms: Option<u64>,

    /// Give up on a gateway call after this many milliseconds
    #[arg(long)]
    gateway_timeout_ms: Option<u64>,
}

fn open_repository(db_path: Option<PathBuf>) -> Result<RepositoryBox> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let repo = equb::infrastructure::rocksdb::RocksDBRepository::open(path)
                .into_diagnostic()?;
            Ok(Box::new(repo))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Box::new(InMemoryRepository::new()))
        }
        None => Ok(Box::new(InMemoryRepository::new())),
    }
}

async fn named_group(engine: &EqubEngine, name: &str) -> EqubResult<Group> {
    engine
        .find_group(name)
        .await?
        .ok_or_else(|| EqubError::NotFound(format!("Group \"{name}\" not found.")))
}

async fn run_command(engine: &EqubEngine, command: Command) -> EqubResult<()> {
    let caller = command.caller()?;

    match command.op {
        CommandType::Create => {
            // Later rows address groups by name, so names must stay unique here.
            if engine.find_group(&command.group).await?.is_some() {
                return Err(EqubError::Conflict(format!(
                    "Group \"{}\" already exists.",
                    command.group.trim()
                )));
            }
            let amount = command.amount.ok_or_else(|| {
                EqubError::ValidationError("create requires an amount".to_string())
            })?;
            let input = NewGroup {
                name: command.group,
                description: None,
                contribution_amount: Amount::new(amount)?,
                frequency: command.frequency.unwrap_or(Frequency::Monthly),
            };
            engine.create_group(input, &caller).await?;
        }
        CommandType::Join => {
            let group = named_group(engine, &command.group).await?;
            engine.join_group(group.id, &caller).await?;
        }
        CommandType::Start => {
            let group = named_group(engine, &command.group).await?;
            engine.start_group(group.id, &caller).await?;
        }
        CommandType::Pay => {
            let group = named_group(engine, &command.group).await?;
            let tx = engine.make_payment(group.id, &caller).await?;
            if tx.status == TransactionStatus::Failed {
                eprintln!(
                    "Payment by {} failed: {}",
                    caller.email,
                    tx.message.unwrap_or_default()
                );
            }
        }
        CommandType::Rollover => {
            let group = named_group(engine, &command.group).await?;
            engine.process_next_cycle(group.id, &caller).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("equb=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut engine_config = EngineConfig::from_env().into_diagnostic()?;
    if let Some(ms) = cli.gateway_timeout_ms {
        engine_config.gateway_timeout = Duration::from_millis(ms);
    }
    let engine_config = engine_config.validated().into_diagnostic()?;
    let mut gateway_config = GatewayConfig::from_env().into_diagnostic()?;
    if let Some(rate) = cli.success_rate {
        gateway_config.success_rate = rate;
    }
    if let Some(ms) = cli.gateway_latency_ms {
        gateway_config.latency = Duration::from_millis(ms);
    }
    let gateway_config = gateway_config.validated().into_diagnostic()?;

    let engine = EqubEngine::new(
        open_repository(cli.db_path)?,
        Box::new(SimulatedGateway::new(gateway_config)),
        Arc::new(LogNotifier),
        engine_config,
    );

    // Attempts left pending by an earlier run that stopped mid-payment
    engine.expire_stale_payments().await.into_diagnostic()?;

    let file = File::open(cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for command in reader.commands() {
        match command {
            Ok(command) => {
                if let Err(e) = run_command(&engine, command).await {
                    eprintln!("Error processing command: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading command: {}", e);
            }
        }
    }

    let summaries = engine.group_summaries().await.into_diagnostic()?;

    let stdout = io::stdout();
    let mut writer = SummaryWriter::new(stdout.lock());
    writer.write_summaries(summaries).into_diagnostic()?;

    Ok(())
}

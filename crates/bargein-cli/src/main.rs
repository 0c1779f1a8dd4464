//! Bargein CLI - session and interrupt coordination tooling

use async_trait::async_trait;
use bargein_core::Coordinator;
use bargein_core::config::Config;
use bargein_core::domain::identity::{Identity, IdentityProvider, IdentityResolution};
use bargein_core::domain::interrupt::{FnModule, InterruptObserver, InterruptResult};
use bargein_core::domain::session::{SessionContext, SessionId};
use bargein_core::infrastructure::identity::{InMemoryIdentityStore, open_store};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "bargein")]
#[command(author, version, about = "Session and interrupt coordination", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or regenerate this client's identity
    Identity {
        #[command(subcommand)]
        action: IdentityAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run competing producers against a local coordinator
    Simulate {
        /// Number of simulated clients
        #[arg(long, default_value_t = 3)]
        identities: usize,
        /// Sessions each client starts, each superseding the previous one
        #[arg(long, default_value_t = 3)]
        rounds: usize,
        /// Delay between output chunks
        #[arg(long, default_value_t = 20)]
        chunk_ms: u64,
        /// Make the audio module this slow to acknowledge (0 = prompt)
        #[arg(long, default_value_t = 0)]
        slow_module_ms: u64,
    },
}

#[derive(Subcommand)]
enum IdentityAction {
    /// Show the current identity, computing and persisting it if needed
    Show,
    /// Recompute and re-persist the identity
    Regenerate,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// List all settings
    List,
    /// Get a setting value
    Get { key: String },
    /// Set a setting value
    Set { key: String, value: String },
    /// Show the config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bargein=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Identity { action } => cmd_identity(action, cli.format, cli.quiet).await,
        Commands::Config { action } => cmd_config(action, cli.quiet),
        Commands::Simulate {
            identities,
            rounds,
            chunk_ms,
            slow_module_ms,
        } => {
            let plan = SimulationPlan {
                identities,
                rounds,
                chunk: Duration::from_millis(chunk_ms),
                slow_module: Duration::from_millis(slow_module_ms),
            };
            cmd_simulate(plan, cli.format, cli.quiet).await
        }
    };

    if let Err(e) = &result {
        if let Some(hint) = e
            .downcast_ref::<bargein_core::Error>()
            .and_then(|err| err.suggestion())
        {
            eprintln!("Hint: {}", hint);
        }
    }
    result
}

// ========== identity ==========

async fn cmd_identity(action: IdentityAction, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let config = Config::load()?;
    let store = open_store(config.identity.store)?;
    let provider = IdentityProvider::for_host(store);

    let resolution = match action {
        IdentityAction::Show => provider.resolve().await,
        IdentityAction::Regenerate => provider.regenerate().await,
    };

    print_identity(&resolution, &config, format, quiet);
    Ok(())
}

fn print_identity(resolution: &IdentityResolution, config: &Config, format: OutputFormat, quiet: bool) {
    let origin = format!("{:?}", resolution.origin).to_lowercase();
    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "identity": resolution.identity,
                "origin": origin,
                "degraded": resolution.degraded,
                "store": config.identity.store.as_str(),
            });
            println!("{}", value);
        }
        OutputFormat::Text if quiet => println!("{}", resolution.identity),
        OutputFormat::Text => {
            println!("Identity: {}", resolution.identity);
            println!("  Origin:   {}", origin);
            println!("  Store:    {}", config.identity.store);
            if resolution.degraded {
                println!("  Degraded: yes (not persisted, valid for this process only)");
            }
        }
    }
}

// ========== config ==========

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

// ========== simulate ==========

struct SimulationPlan {
    identities: usize,
    rounds: usize,
    chunk: Duration,
    slow_module: Duration,
}

/// Prints each completed interrupt
struct ConsoleObserver {
    quiet: bool,
}

#[async_trait]
impl InterruptObserver for ConsoleObserver {
    async fn on_interrupt(&self, result: &InterruptResult) -> anyhow::Result<()> {
        if !self.quiet {
            let timed_out = if result.timed_out_modules.is_empty() {
                String::new()
            } else {
                format!(", timed out: {}", result.timed_out_modules.join(", "))
            };
            println!(
                "  interrupted {} in {}ms{}",
                result.identity,
                result.elapsed.as_millis(),
                timed_out
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}

async fn cmd_simulate(plan: SimulationPlan, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let config = Config::load()?;
    let provider = Arc::new(IdentityProvider::for_host(Arc::new(InMemoryIdentityStore::new())));
    let coordinator = Arc::new(Coordinator::new(config, provider));

    coordinator.register_module("text", Arc::new(FnModule::new(|| async { Ok(()) })));
    let slow = plan.slow_module;
    coordinator.register_module(
        "audio",
        Arc::new(FnModule::new(move || async move {
            tokio::time::sleep(slow).await;
            Ok(())
        })),
    );

    coordinator.register_observer(Arc::new(ConsoleObserver {
        quiet: quiet || format == OutputFormat::Json,
    }))?;
    coordinator.spawn_sweeper();

    let mut producers: Vec<JoinHandle<()>> = Vec::new();
    let chunks = Arc::new(AtomicU64::new(0));

    let reason = tokio::select! {
        result = run_rounds(&coordinator, &plan, &mut producers, &chunks) => {
            result?;
            "simulation finished"
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            warn!("Interrupted by Ctrl-C, shutting down");
            "ctrl-c"
        }
    };

    let summary = coordinator.shutdown(reason).await;
    // Producers see the global flag and wind down
    for producer in producers {
        if let Err(e) = producer.await {
            warn!(error = %e, "Producer task failed");
        }
    }

    let stats = coordinator.stats().await;
    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "summary": summary,
                "stats": stats,
                "chunks": chunks.load(Ordering::Relaxed),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            println!("{}", summary.summary());
            if !quiet {
                println!(
                    "Sessions created: {}, superseded: {}, chunks produced: {}",
                    stats.sessions_created,
                    stats.sessions_superseded,
                    chunks.load(Ordering::Relaxed)
                );
                for (name, module) in &stats.modules {
                    println!(
                        "  module {}: {} acknowledged, {} timed out, {}",
                        name, module.acknowledged, module.timed_out, module.health
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_rounds(
    coordinator: &Arc<Coordinator>,
    plan: &SimulationPlan,
    producers: &mut Vec<JoinHandle<()>>,
    chunks: &Arc<AtomicU64>,
) -> anyhow::Result<()> {
    let identities = (0..plan.identities)
        .map(|i| Identity::parse(format!("sim-client-{i}")))
        .collect::<Result<Vec<_>, _>>()?;

    for round in 0..plan.rounds {
        info!(round, "Starting round");
        for identity in &identities {
            let mut context = SessionContext::new();
            context.insert("round".to_string(), serde_json::json!(round));
            let session = coordinator.create_session(identity.clone(), context).await?;

            let coordinator = coordinator.clone();
            let chunks = chunks.clone();
            let chunk = plan.chunk;
            producers.push(tokio::spawn(async move {
                produce(&coordinator, session.id, chunk, &chunks).await;
            }));
        }
        // Let producers emit a few chunks before the next round barges in
        tokio::time::sleep(plan.chunk * 3).await;
    }
    Ok(())
}

/// A producer that polls the cooperative flag between chunks
async fn produce(coordinator: &Coordinator, session_id: SessionId, chunk: Duration, chunks: &AtomicU64) {
    let mut emitted = 0u64;
    while !coordinator.should_interrupt_session(session_id) {
        tokio::time::sleep(chunk).await;
        chunks.fetch_add(1, Ordering::Relaxed);
        emitted += 1;
        if emitted % 10 == 0 && !coordinator.heartbeat(session_id).await {
            break;
        }
    }
    debug!(session_id = %session_id, emitted, "Producer stopped");
}

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;
use verdant_core::config::LoggingConfig;
use verdant_core::{Clock, SystemClock, VerdantConfig};
use verdant_hooks::{HookContext, HookDefinition, HookEngine, HookEvent, HookHandler};
use verdant_scheduler::{
    next_eligible_date, open_store, resolve_entry, JobPlan, SchedulerEngine, WateringExecutor,
};

mod camera;
mod notify;
mod pump;

/// Hooks that notify run after the camera hooks on the same event.
const NOTIFY_PRIORITY: i32 = 10;

#[derive(Parser)]
#[command(name = "verdantd", version, about = "Scheduled plant watering daemon")]
struct Cli {
    /// Config file (default: $VERDANT_CONFIG, then /etc/verdant/verdant.toml).
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log pump switching instead of driving the relay.
    #[arg(long)]
    dry_run: bool,

    /// Skip the startup pass over today's missed waterings.
    #[arg(long)]
    no_catch_up: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print each schedule entry's last watering and whether it is due now.
    Status,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // explicit flag > VERDANT_CONFIG env > /etc/verdant/verdant.toml
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("VERDANT_CONFIG").ok());
    let config = VerdantConfig::load(config_path.as_deref()).context("loading configuration")?;

    let _log_guard = setup_logging(&config.logging)?;

    match cli.command {
        Some(Command::Status) => status(&config),
        None => run(&cli, config).await,
    }
}

async fn run(cli: &Cli, config: VerdantConfig) -> anyhow::Result<()> {
    let entries = config.schedule_entries()?;
    let summary_time = config.summary_time()?;
    for entry in &entries {
        info!(schedule = %entry.id, duration_secs = entry.duration_secs, interval_days = entry.interval_days, "schedule entry");
    }

    let pump = pump::build(&config.pump, cli.dry_run).context("initialising pump")?;
    let hooks = Arc::new(build_hooks(&config));
    let store = open_store(&config.state).context("opening watering state")?;
    let executor = WateringExecutor::new(pump, Arc::clone(&hooks), store)?;

    // Install handlers before anything can water.
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        info!(signal = name, "shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    hooks.emit(HookContext::new(HookEvent::Startup)).await;

    let plan = JobPlan {
        capture_interval: config.camera.enabled.then(|| config.capture_interval()),
        summary_time: Some(summary_time),
        poll_interval: config.poll_interval(),
        catch_up: !cli.no_catch_up,
    };
    let engine = SchedulerEngine::new(entries, executor, hooks, SystemClock, plan);
    info!("verdantd running");
    engine.run(shutdown_rx).await;

    info!("verdantd stopped");
    Ok(())
}

/// Wire the camera to every photo event and the notifier to startup and the
/// daily summary.
fn build_hooks(config: &VerdantConfig) -> HookEngine {
    let hooks = HookEngine::new();

    if config.camera.enabled {
        let camera: Arc<dyn HookHandler> = Arc::new(camera::CameraHook::new(&config.camera));
        // The capture command has its own timeout; leave it room to report.
        let timeout = Duration::from_secs(config.camera.timeout_secs + 5);
        for event in [
            HookEvent::Startup,
            HookEvent::BeforeWatering,
            HookEvent::WateringMidpoint,
            HookEvent::AfterWatering,
            HookEvent::PeriodicCapture,
        ] {
            hooks.register(
                HookDefinition::new(format!("camera:{event}"), event, Arc::clone(&camera))
                    .with_timeout(timeout),
            );
        }
    } else {
        info!("camera disabled");
    }

    let summary: Arc<dyn HookHandler> = Arc::new(notify::SummaryHook::new(
        &config.camera.image_directory,
        config.summary.image_count,
        Arc::new(notify::LogNotifier),
    ));
    for event in [HookEvent::Startup, HookEvent::DailySummary] {
        hooks.register(
            HookDefinition::new(format!("notify:{event}"), event, Arc::clone(&summary))
                .with_priority(NOTIFY_PRIORITY),
        );
    }

    hooks
}

fn status(config: &VerdantConfig) -> anyhow::Result<()> {
    let entries = config.schedule_entries()?;
    let state = open_store(&config.state)?.load()?;
    let now = SystemClock.now();

    println!("now: {now}");
    for entry in &entries {
        let last = state
            .last_watered(&entry.id)
            .map(|t| t.to_string())
            .unwrap_or_else(|| "never".to_string());
        let next = next_eligible_date(entry, &state)
            .map(|d| d.to_string())
            .unwrap_or_else(|| "any day".to_string());
        let due = resolve_entry(now, entry, &state).is_some();
        println!(
            "{:<6} {:>5}s every {}d  last: {:<19}  eligible from: {:<10}  due now: {}",
            entry.id,
            entry.duration_secs,
            entry.interval_days,
            last,
            next,
            if due { "yes" } else { "no" }
        );
    }
    Ok(())
}

/// stderr by default, or a non-blocking file writer when `[logging] file` is
/// set. The returned guard must live as long as the process.
fn setup_logging(
    config: &LoggingConfig,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("verdantd=info,verdant_scheduler=info,verdant_hooks=info,verdant_core=info")
    });

    let Some(file) = config.file.as_deref() else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
        return Ok(None);
    };

    let path = Path::new(file);
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).with_context(|| format!("creating log directory {}", dir.display()))?;
    let name = path
        .file_name()
        .with_context(|| format!("log path has no file name: {file}"))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(Some(guard))
}

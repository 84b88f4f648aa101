//! procwatch entrypoint: monitor until Ctrl+C, or print history/statistics from the
//! history file. Events are written to stdout as JSON lines; logs go to stderr.

use clap::{Parser, Subcommand};
use procwatch::{
    config::MonitorConfig,
    engine::Engine,
    logging::StructuredLogger,
    monitor::Monitor,
    stats::{format_duration, Statistics},
    storage::HistoryStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
#[command(name = "procwatch", version, about = "Track process lifespans by polling the process table")]
struct Cli {
    /// Config file (JSON); missing file means defaults
    #[arg(long, env = "PROCWATCH_CONFIG", default_value = "procwatch.json", global = true)]
    config: PathBuf,

    /// History file, overrides the config
    #[arg(long, global = true)]
    history_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Monitor processes until interrupted
    Run {
        /// Polling interval in seconds
        #[arg(long)]
        interval: Option<f64>,
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },
    /// Print the most recent completed lifespans
    History {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print totals and the processes with the most accumulated time
    Stats {
        #[arg(long)]
        top: Option<usize>,
    },
    /// Empty the log file configured as `log.file`
    ClearLog,
}

fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Run {
        interval: None,
        once: false,
    });

    let mut config = MonitorConfig::load(&cli.config)?;
    if let Some(path) = cli.history_file {
        config.history_file = Some(path);
    }
    if let Command::Run {
        interval: Some(secs),
        ..
    } = &command
    {
        config.poll_interval_secs = *secs;
    }
    config.validate()?;

    if let Command::ClearLog = command {
        return clear_log(&config);
    }
    let _log_guard = StructuredLogger::init(&config.log);

    match command {
        Command::Run { once, .. } => run(&config, once),
        Command::History { limit } => {
            print_history(&config, limit.unwrap_or(config.display.history_limit));
            Ok(())
        }
        Command::Stats { top } => {
            print_stats(&config, top.unwrap_or(config.display.top_n));
            Ok(())
        }
        Command::ClearLog => Ok(()),
    }
}

fn clear_log(config: &MonitorConfig) -> Result<(), BoxError> {
    let Some(path) = config.log.file.as_deref() else {
        return Err("no log file configured (set log.file)".into());
    };
    StructuredLogger::clear_log(path)?;
    println!("cleared {}", path.display());
    Ok(())
}

fn run(config: &MonitorConfig, once: bool) -> Result<(), BoxError> {
    info!(history = %config.history_path().display(), "procwatch starting");
    let engine = Arc::new(Engine::from_config(config)?);

    if once {
        let report = engine.run_cycle()?;
        info!(tracked = report.tracked, "single cycle complete");
        engine.end_session()?;
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .build()?;

    let (stop_tx, stop_rx) = std::sync::mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })?;

    let mut events = engine.subscribe();
    let printer = runtime.spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let stdout = std::io::stdout();
                    let mut out = stdout.lock();
                    if let Err(e) = StructuredLogger::emit_json(&event, &mut out) {
                        warn!(error = %e, "failed to write event");
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut monitor = Monitor::new(Arc::clone(&engine), runtime.handle().clone(), config.poll_interval());
    monitor.start()?;
    info!("monitoring (Ctrl+C to stop)");

    let _ = stop_rx.recv();
    monitor.stop()?;
    log_summary(&engine.statistics(), config.display.top_n);

    printer.abort();
    runtime.shutdown_timeout(Duration::from_secs(1));
    info!("procwatch stopped");
    Ok(())
}

fn log_summary(stats: &Statistics, top_n: usize) {
    info!(
        records = stats.totals.record_count,
        distinct = stats.totals.distinct_identity_count,
        total = %format_duration(stats.totals.total_duration_seconds),
        "history summary"
    );
    for (rank, (name, s)) in stats.top(top_n).into_iter().enumerate() {
        info!(rank = rank + 1, %name, runs = s.count, total = %format_duration(s.total_duration_seconds), "top process");
    }
}

fn print_history(config: &MonitorConfig, limit: usize) {
    let snapshot = HistoryStore::load(&config.history_path());
    let start = snapshot.history.len().saturating_sub(limit);
    println!(
        "{:<32} {:>8} {:<19} {:<19} {:>10}",
        "Process", "PID", "Start", "End", "Duration"
    );
    for r in &snapshot.history[start..] {
        println!(
            "{:<32} {:>8} {:<19} {:<19} {:>10}",
            r.name,
            r.pid,
            r.start_time.format("%Y-%m-%d %H:%M:%S"),
            r.end_time.format("%Y-%m-%d %H:%M:%S"),
            format_duration(r.duration_seconds)
        );
    }
    match snapshot.last_updated {
        Some(ts) => println!("\n{} records, last updated {}", snapshot.history.len(), ts.to_rfc3339()),
        None => println!("\nno history recorded yet"),
    }
}

fn print_stats(config: &MonitorConfig, top_n: usize) {
    let snapshot = HistoryStore::load(&config.history_path());
    let stats = Statistics::from_records(&snapshot.history);
    if stats.totals.record_count == 0 {
        println!("No historical data available");
        return;
    }
    println!("Total records:       {}", stats.totals.record_count);
    println!("Distinct processes:  {}", stats.totals.distinct_identity_count);
    println!("Total tracked time:  {}", format_duration(stats.totals.total_duration_seconds));
    println!("\nMost used (by total time):");
    for (i, (name, s)) in stats.top(top_n).into_iter().enumerate() {
        println!(
            "{:>3}. {:<32} {:>10}  runs: {}",
            i + 1,
            name,
            format_duration(s.total_duration_seconds),
            s.count
        );
    }
}

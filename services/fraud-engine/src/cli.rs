//! Command surface
//!
//! Process arguments select either a one-shot command or the interactive
//! console. The console maps line commands onto the orchestrator's control
//! API and watches for fatal signals from the generator.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

use graphguard_errors::{GraphGuardError, Result};

use crate::monitor::PerformanceReport;
use crate::orchestrator::Orchestrator;

#[derive(Debug, Parser)]
#[command(name = "graphguard", about = "Real-time graph fraud detection engine")]
pub struct Cli {
    /// Configuration directory (default.yaml, {RUN_ENV}.yaml, local.yaml)
    #[arg(long, default_value = "config")]
    pub config_dir: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Dashboard summary: generator status and fraud counters
    Stats,
    /// Transaction performance aggregates over a window
    Performance {
        #[arg(default_value_t = 1)]
        window: u32,
    },
    /// Per-rule performance aggregates over a window
    Fraud {
        #[arg(default_value_t = 1)]
        window: u32,
    },
    /// Recent transaction edges
    Transactions,
    /// Inspect the server's index catalog
    Indexes,
    /// Create the fraud-flag vertex index
    CreateFraudIndex,
    /// Seed the demo data set
    Seed,
}

const HELP_TEXT: &str = "\
commands:
  help                 show this help
  stats                dashboard summary
  performance [1|5|10] transaction aggregates over the window
  fraud [1|5|10]       per-rule aggregates over the window
  transactions         recent transaction edges
  indexes              inspect the index catalog
  create-fraud-index   create the fraud-flag vertex index
  seed                 seed the demo data set
  create               create one manual transaction
  start <tps>          start the generator
  stop                 stop the generator
  quit                 exit";

/// Interactive console over stdin
pub struct Console {
    orchestrator: Arc<Orchestrator>,
}

impl Console {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn run(&self) -> Result<()> {
        println!("graphguard console; type 'help' for commands");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            tokio::select! {
                fatal = self.orchestrator.wait_fatal() => {
                    if let Some(err) = fatal {
                        error!(error = %err, "fatal signal from generator");
                        let _ = self.orchestrator.stop_generator().await;
                        return Err(err);
                    }
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if !self.dispatch(line.trim()).await {
                                return Ok(());
                            }
                        }
                        Ok(None) => return Ok(()),
                        Err(err) => {
                            return Err(GraphGuardError::internal(format!("stdin: {err}")));
                        }
                    }
                }
            }
        }
    }

    /// Execute one console line; false ends the session
    async fn dispatch(&self, line: &str) -> bool {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or("");
        let argument = parts.next();

        match command {
            "" => {}
            "help" => println!("{HELP_TEXT}"),
            "stats" => self.show_stats().await,
            "performance" => {
                let window = parse_window(argument);
                print_performance(&self.orchestrator.stats(window));
            }
            "fraud" => {
                let window = parse_window(argument);
                print_rules(&self.orchestrator.stats(window));
            }
            "transactions" => self.show_transactions().await,
            "indexes" => match self.orchestrator.inspect_indexes().await {
                Ok(listing) => println!("{listing}"),
                Err(err) => println!("error: {err}"),
            },
            "create-fraud-index" => match self.orchestrator.create_fraud_index().await {
                Ok(result) => println!("index created: {result}"),
                Err(err) => println!("error: {err}"),
            },
            "seed" => match self.orchestrator.seed_sample_data().await {
                Ok(count) => println!("seeded; graph now holds {count} vertices"),
                Err(err) => println!("error: {err}"),
            },
            "create" => match self.orchestrator.create_transaction().await {
                Ok(summary) => {
                    let fired = summary.firing_rules().count();
                    println!(
                        "created {} ({} -> {}), {} rule(s) fired",
                        summary.info.txn_id,
                        summary.info.from_account_id,
                        summary.info.to_account_id,
                        fired
                    );
                }
                Err(err) => println!("error: {err}"),
            },
            "start" => match argument.and_then(|arg| arg.parse::<u32>().ok()) {
                Some(tps) => {
                    let outcome = self.orchestrator.start_generator(tps).await;
                    match outcome.detail {
                        Some(detail) => println!("{:?}: {detail}", outcome.status),
                        None => println!("{:?}", outcome.status),
                    }
                }
                None => println!("usage: start <tps>"),
            },
            "stop" => println!("{:?}", self.orchestrator.stop_generator().await),
            "quit" | "exit" => return false,
            unknown => println!("unknown command '{unknown}'; type 'help'"),
        }
        true
    }

    async fn show_stats(&self) {
        match self.orchestrator.dashboard().await {
            Ok(summary) => {
                let status = &summary.status;
                println!(
                    "generator: running={} target={}tps current={:.1}tps actual={:.1}tps queue={}",
                    status.running,
                    status.target_tps,
                    status.current_tps,
                    status.actual_tps,
                    status.queue_size
                );
                println!("fraud:   {:?}", summary.fraud);
                println!("user:    {:?}", summary.user);
                println!("account: {:?}", summary.account);
                for rule in self.orchestrator.list_rules() {
                    println!(
                        "rule {:<30} enabled={} complexity={:?}",
                        rule.name, rule.enabled, rule.complexity
                    );
                }
            }
            Err(err) => println!("error: {err}"),
        }
    }

    async fn show_transactions(&self) {
        match self.orchestrator.recent_transactions(20).await {
            Ok(rows) if rows.is_empty() => println!("no transactions"),
            Ok(rows) => {
                for row in rows {
                    println!("{}", serde_json::Value::Object(row));
                }
            }
            Err(err) => println!("error: {err}"),
        }
    }
}

/// Run a one-shot subcommand and return the process result
pub async fn run_command(orchestrator: &Arc<Orchestrator>, command: Command) -> Result<()> {
    match command {
        Command::Stats => {
            let summary = orchestrator.dashboard().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Performance { window } => {
            print_performance(&orchestrator.stats(window));
        }
        Command::Fraud { window } => {
            print_rules(&orchestrator.stats(window));
        }
        Command::Transactions => {
            for row in orchestrator.recent_transactions(20).await? {
                println!("{}", serde_json::Value::Object(row));
            }
        }
        Command::Indexes => println!("{}", orchestrator.inspect_indexes().await?),
        Command::CreateFraudIndex => {
            println!("index created: {}", orchestrator.create_fraud_index().await?)
        }
        Command::Seed => {
            let count = orchestrator.seed_sample_data().await?;
            println!("seeded; graph now holds {count} vertices");
        }
    }
    Ok(())
}

fn parse_window(argument: Option<&str>) -> u32 {
    argument.and_then(|arg| arg.parse().ok()).unwrap_or(1)
}

fn print_performance(report: &PerformanceReport) {
    let stats = &report.transaction.latency;
    println!(
        "transactions over {}m: count={} qps={:.1} success={:.2}%",
        report.window_minutes,
        stats.count,
        stats.qps,
        stats.success_rate * 100.0
    );
    println!(
        "  latency ms: avg={:.2} min={:.2} max={:.2}",
        stats.avg_ms, stats.min_ms, stats.max_ms
    );
    println!(
        "  components ms: execution={:.2} queue={:.2} db={:.2}",
        report.transaction.execution_avg_ms,
        report.transaction.queue_wait_avg_ms,
        report.transaction.db_avg_ms
    );
}

fn print_rules(report: &PerformanceReport) {
    if report.rules.is_empty() {
        println!("no rule samples in the last {}m", report.window_minutes);
        return;
    }
    for (name, stats) in &report.rules {
        println!(
            "{:<30} count={} avg={:.2}ms max={:.2}ms success={:.2}%",
            name,
            stats.count,
            stats.avg_ms,
            stats.max_ms,
            stats.success_rate * 100.0
        );
    }
}

//! budgetwatch CLI
//!
//! Command-line interface for the budget alerting pipeline.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use budgetwatch::alerting::{
    channels_from_config, AlertService, EventConsumer, EventPublisher, NotificationDispatcher,
    ThresholdEvaluator,
};
use budgetwatch::broker::MemoryBroker;
use budgetwatch::models::Budget;
use budgetwatch::Config;

/// budgetwatch - budget threshold alerting pipeline
#[derive(Parser)]
#[command(name = "budgetwatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "BUDGETWATCH_CONFIG")]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (for commands that support it)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a single budget/spending pair and print the decision
    Evaluate {
        /// Budget limit
        #[arg(long)]
        limit: f64,

        /// Current spending
        #[arg(long)]
        spending: f64,
    },

    /// Run the full pipeline end to end over an in-process broker
    Simulate {
        /// Seconds to wait for dispatch before reporting
        #[arg(long, default_value = "2")]
        settle_secs: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config, cli.verbose);

    let result = match cli.command {
        Commands::Evaluate { limit, spending } => run_evaluate(limit, spending, cli.format),
        Commands::Simulate { settle_secs } => run_simulate(config, settle_secs).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: &Config, verbose: bool) {
    let default_level = if verbose {
        "debug"
    } else {
        &config.logging.level
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if config.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn run_evaluate(limit: f64, spending: f64, format: OutputFormat) -> anyhow::Result<()> {
    let decision = ThresholdEvaluator::evaluate(limit, spending);

    match format {
        OutputFormat::Json => {
            let value = match &decision {
                Some(d) => serde_json::json!({
                    "level": d.level,
                    "percentage_used": d.percentage_used,
                    "message": d.message,
                }),
                None => serde_json::json!({ "level": null }),
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => match decision {
            Some(d) => println!("{}", d.message),
            None => println!("No alert: spending is within budget."),
        },
    }

    Ok(())
}

async fn run_simulate(config: Config, settle_secs: u64) -> anyhow::Result<()> {
    info!(
        topic = %config.broker.topic,
        partitions = config.broker.partitions,
        "Starting in-process pipeline simulation"
    );

    let broker = Arc::new(MemoryBroker::new(
        config.broker.topic.clone(),
        config.broker.partitions,
    ));

    let dispatcher = Arc::new(NotificationDispatcher::new(channels_from_config(
        &config.channels,
    )));
    let consumer = Arc::new(EventConsumer::new(
        broker.clone(),
        dispatcher,
        &config.broker,
        config.consumer.clone(),
    ));
    let consumer_handles = consumer.start();

    let service = Arc::new(AlertService::new(EventPublisher::new(
        broker.clone(),
        config.broker.topic.clone(),
        config.publisher.clone(),
    )));

    let drain_service = service.clone();
    let drain_handle = tokio::spawn(async move { drain_service.publisher().start().await });

    // One spending trajectory per user: quiet, warning, critical, and a
    // freshly created budget with no limit yet.
    let updates = [
        ("alice", "groceries", 1000.0, 500.0),
        ("alice", "groceries", 1000.0, 820.0),
        ("bob", "travel", 2000.0, 1950.0),
        ("carol", "dining", 0.0, 100.0),
    ];

    let mut published = 0usize;
    for (user, category, limit, spending) in updates {
        let budget = Budget {
            id: format!("{user}-{category}"),
            user_id: user.to_string(),
            name: category.to_string(),
            category: category.to_string(),
            limit,
        };
        if service.evaluate_and_publish(&budget, spending)?.is_some() {
            published += 1;
        }
    }

    println!("Published {published} alert event(s); waiting for dispatch...");
    tokio::time::sleep(Duration::from_secs(settle_secs)).await;

    let consumed: u64 = (0..config.broker.partitions)
        .map(|p| broker.committed_offset(&config.broker.group_id, p))
        .sum();
    println!("Consumed and dispatched {consumed} event(s).");

    drain_handle.abort();
    for handle in consumer_handles {
        handle.abort();
    }

    Ok(())
}

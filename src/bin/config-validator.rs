//! # Insights Configuration Validator
//!
//! Command-line tool for validating insights configuration files per
//! environment before the orchestrator is deployed with them.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use insights_core::config::{load_config, loader::DEFAULT_CONFIG_PATH, InsightsConfig};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate insights configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment overlay to apply (development, test, production, ...)
    #[arg(short, long, default_value = "development")]
    env: String,

    /// Base configuration file (default: config/insights.toml, optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format (table, json)
    #[arg(long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate the layered configuration
    Validate,

    /// Print the effective configuration after all layers
    Show,

    /// Print the built-in defaults
    Defaults,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match cli.command.as_ref().unwrap_or(&Commands::Validate) {
        Commands::Validate => validate(&cli),
        Commands::Show => load(&cli).and_then(|config| print_config(&config, &cli.format)),
        Commands::Defaults => print_config(&InsightsConfig::default(), &cli.format),
    };

    match result {
        Ok(()) => {
            info!("Configuration check completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration check failed: {e:#}");
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> Result<InsightsConfig> {
    load_config(cli.config.as_deref(), &cli.env).with_context(|| {
        format!(
            "failed to load configuration from {} for environment '{}'",
            cli.config
                .as_ref()
                .map_or_else(|| DEFAULT_CONFIG_PATH.to_string(), |p| p.display().to_string()),
            cli.env
        )
    })
}

fn validate(cli: &Cli) -> Result<()> {
    println!("🔧 Validating Insights Configuration");
    println!("Environment: {}", cli.env);
    if let Some(path) = &cli.config {
        println!("Config File: {}", path.display());
    }
    println!();

    let config = load(cli)?;
    println!("✅ Configuration is valid");
    println!();
    print_config(&config, &cli.format)
}

fn print_config(config: &InsightsConfig, format: &str) -> Result<()> {
    match format {
        "json" => {
            let rendered =
                serde_json::to_string_pretty(config).context("failed to render configuration")?;
            println!("{rendered}");
        }
        "table" => print_table(config),
        other => anyhow::bail!("unsupported output format '{other}' (expected table or json)"),
    }
    Ok(())
}

fn print_table(config: &InsightsConfig) {
    let rows: Vec<(&str, String)> = vec![
        ("cache.ttl_seconds", config.cache.ttl_seconds.to_string()),
        ("cache.max_entries", config.cache.max_entries.to_string()),
        ("cache.schema_version", config.cache.schema_version.to_string()),
        (
            "cache.invalidate_on_config_change",
            config.cache.invalidate_on_config_change.to_string(),
        ),
        ("worker.enabled", config.worker.enabled.to_string()),
        (
            "worker.watchdog_timeout (effective)",
            format!("{:?}", config.worker.watchdog_timeout()),
        ),
        ("worker.heartbeat_rearm", config.worker.heartbeat_rearm.to_string()),
        (
            "circuit_breaker.runtime_error_cooldown_ms",
            config.circuit_breaker.runtime_error_cooldown_ms.to_string(),
        ),
        (
            "circuit_breaker.init_failure_cooldown_ms",
            config.circuit_breaker.init_failure_cooldown_ms.to_string(),
        ),
        (
            "circuit_breaker.timeout_cooldown_ms",
            config.circuit_breaker.timeout_cooldown_ms.to_string(),
        ),
        ("chunking.long_horizon_days", config.chunking.long_horizon_days.to_string()),
        (
            "chunking.max_records_single_pass",
            config.chunking.max_records_single_pass.to_string(),
        ),
        (
            "chunking.span_steps",
            config
                .chunking
                .span_steps
                .iter()
                .map(|s| format!("≤{}d→{}d", s.max_days, s.span_days))
                .collect::<Vec<_>>()
                .join(", "),
        ),
        ("remote.enabled", config.remote.enabled.to_string()),
        ("remote.model_name", config.remote.model_name.clone()),
    ];

    let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    for (key, value) in rows {
        println!("  {key:<width$}  {value}");
    }
}

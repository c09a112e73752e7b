//! gearstat - status client for the Gearman job server admin protocol.
//!
//! Connects to the server's administrative port, issues the read-only
//! `version`, `status` and `workers` queries, and prints what comes back.

mod client;
mod config;
mod error;
mod protocol;
mod report;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client::{AdminClient, Connector, TcpConnector};
use config::Config;
use report::Section;
use std::path::PathBuf;
use tokio::net::TcpStream;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gearstat")]
#[command(author, version, about = "Show the status of a Gearman job server")]
struct Cli {
    /// Server hostname (overrides config)
    #[arg(short = 'H', long, value_name = "HOST")]
    host: Option<String>,

    /// Admin port (overrides config)
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,

    /// Connect and read timeout in seconds (overrides config)
    #[arg(short = 't', long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Read configuration from this file instead of the default location
    #[arg(short = 'c', long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Log protocol traffic to stderr
    #[arg(short = 'v', long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Version, function status and workers in one report (default)
    Report,
    /// Print the server version
    Version,
    /// Print queued and running jobs per function
    Status,
    /// Print connected workers and their functions
    Workers,
    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    debug!(server = %config.server.address(), "resolved configuration");

    match cli.command.unwrap_or(Commands::Report) {
        Commands::Report => handle_report(&config, cli.json).await,
        Commands::Version => handle_version(&config, cli.json).await,
        Commands::Status => {
            let listing = connect_client(&config).await.status().await;
            print_listing(listing.into(), cli.json, |r: &protocol::StatusRecord| {
                format!(
                    "{}\t{}\t{}\t{}",
                    r.function_name, r.total_jobs, r.running_jobs, r.available_workers
                )
            })
        }
        Commands::Workers => {
            let listing = connect_client(&config).await.workers().await;
            print_listing(listing.into(), cli.json, |r: &protocol::WorkerRecord| {
                format!(
                    "{} {} {} {}",
                    r.file_descriptor,
                    r.ip_address,
                    r.client_id,
                    r.functions.join(" ")
                )
                .trim_end()
                .to_string()
            })
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "gearstat=debug" } else { "gearstat=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the config file and apply command-line overrides.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().context("Failed to load configuration")?,
    };

    if let Some(host) = &cli.host {
        config.server.hostname = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(timeout) = cli.timeout {
        config.server.connect_timeout_secs = timeout;
        config.server.read_timeout_secs = timeout;
    }
    Ok(config)
}

/// Print the connection failure and exit without querying anything.
fn connect_failed(config: &Config, err: &error::Error) -> ! {
    debug!(error = %err, "connect failed");
    eprintln!("Error connecting to Gearman server {}", config.server.address());
    std::process::exit(1);
}

async fn handle_report(config: &Config, json: bool) -> Result<()> {
    let report = match report::fetch_report(&TcpConnector, &config.server, config.protocol).await {
        Ok(report) => report,
        Err(e) if e.is_connect_failure() => connect_failed(config, &e),
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}

async fn handle_version(config: &Config, json: bool) -> Result<()> {
    let mut stream = match TcpConnector.connect(&config.server).await {
        Ok(stream) => stream,
        Err(e) => connect_failed(config, &e),
    };

    let mut client = AdminClient::new(&mut stream, config.protocol)
        .with_read_timeout(config.server.read_timeout());
    let version = client
        .version()
        .await
        .context("Failed to read server version")?;

    if json {
        println!("{}", serde_json::json!({ "version": version }));
    } else {
        println!("{version}");
    }
    Ok(())
}

/// Open a fresh connection for a single query.
async fn connect_client(config: &Config) -> AdminClient<TcpStream> {
    let stream = match TcpConnector.connect(&config.server).await {
        Ok(stream) => stream,
        Err(e) => connect_failed(config, &e),
    };
    AdminClient::new(stream, config.protocol).with_read_timeout(config.server.read_timeout())
}

/// Print one record per line, then any problems to stderr.
fn print_listing<T: serde::Serialize>(
    section: Section<T>,
    json: bool,
    line: impl Fn(&T) -> String,
) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&section)?);
    } else {
        for record in &section.records {
            println!("{}", line(record));
        }
    }

    for malformed in &section.malformed {
        eprintln!("skipped {malformed}");
    }
    if let Some(err) = &section.error {
        anyhow::bail!("response incomplete: {err}");
    }
    Ok(())
}

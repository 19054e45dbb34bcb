// Ratekeeper - Main Entry Point
//
// Command-line front end for the rate limiter:
// - Simulate bursts of requests against an endpoint
// - Inspect wait estimates and accessible status messages
// - Report per-endpoint statistics for the configured endpoints
// - Show the effective configuration
// - Print the metrics exposition

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use ratekeeper::clock::MonotonicClock;
use ratekeeper::config::Config;
use ratekeeper::rate_limit::{
    EndpointStats, LimiterReport, Locale, RateLimiter, DEFAULT_ENDPOINT,
};
use ratekeeper::{logging, metrics};

/// Ratekeeper: token-bucket admission control for quota-limited APIs
#[derive(Parser, Debug)]
#[command(name = "ratekeeper")]
#[command(author = "Ratekeeper Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Per-endpoint rate limiting with rate-limit aware retry", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Command to run
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fire a burst of requests at an endpoint and report admissions
    Simulate {
        /// Endpoint key
        #[arg(long, default_value = DEFAULT_ENDPOINT)]
        endpoint: String,

        /// Number of requests to send
        #[arg(long, default_value_t = 20)]
        requests: u32,

        /// Override requests per minute for the endpoint
        #[arg(long)]
        rpm: Option<u32>,

        /// Override burst size for the endpoint
        #[arg(long)]
        burst: Option<u32>,

        /// Wait for tokens (acquire) instead of failing fast (try_acquire)
        #[arg(long)]
        blocking: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the wait estimate and status message for an endpoint
    Status {
        /// Endpoint key
        #[arg(long, default_value = DEFAULT_ENDPOINT)]
        endpoint: String,

        /// Use Hindi status messages
        #[arg(long)]
        hindi: bool,

        /// Consume this many tokens first
        #[arg(long, default_value_t = 0)]
        consume: u32,
    },
    /// Report statistics for every configured endpoint
    Stats {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
    /// Print the Prometheus metrics exposition
    Metrics,
}

/// JSON output of `simulate`
#[derive(Debug, Serialize)]
struct SimulationReport {
    endpoint: String,
    blocking: bool,
    granted: u32,
    denied: u32,
    outcomes: Vec<bool>,
    stats: Option<EndpointStats>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    logging::init(&config.logging, args.verbose)?;
    metrics::init().context("Failed to register metrics")?;

    debug!("Ratekeeper v0.1.0 starting");

    match args.command {
        Some(Commands::Simulate {
            endpoint,
            requests,
            rpm,
            burst,
            blocking,
            json,
        }) => {
            let limiter = build_limiter(&config).await?;
            simulate(&limiter, &endpoint, requests, rpm, burst, blocking, json).await?;
        }
        Some(Commands::Status {
            endpoint,
            hindi,
            consume,
        }) => {
            let limiter = build_limiter(&config).await?;
            status(&limiter, &endpoint, Locale::from_hindi_flag(hindi), consume).await;
        }
        Some(Commands::Stats { json }) => {
            let limiter = build_limiter(&config).await?;
            print_report(&limiter.all_stats().await, json)?;
        }
        Some(Commands::ShowConfig) => {
            print!("{}", config.to_toml()?);
        }
        Some(Commands::Metrics) => {
            print!("{}", metrics::gather_metrics()?);
        }
        None => {
            info!("No command specified. Use \"ratekeeper --help\" for usage.");
        }
    }

    Ok(())
}

async fn build_limiter(config: &Config) -> Result<RateLimiter> {
    config.build_limiter(Arc::new(MonotonicClock::new())).await
}

/// Send `requests` admissions through the limiter and report each outcome
async fn simulate(
    limiter: &RateLimiter,
    endpoint: &str,
    requests: u32,
    rpm: Option<u32>,
    burst: Option<u32>,
    blocking: bool,
    json: bool,
) -> Result<()> {
    if rpm.is_some() || burst.is_some() {
        let current = limiter.limit_for(endpoint).await;
        let rpm = rpm.unwrap_or(current.requests_per_minute);
        limiter
            .configure(endpoint, rpm, burst)
            .await
            .with_context(|| format!("Invalid limit for endpoint '{}'", endpoint))?;
    }

    info!(endpoint, requests, blocking, "Starting simulation");

    let mut outcomes = Vec::with_capacity(requests as usize);
    for i in 1..=requests {
        let admitted = if blocking {
            limiter.acquire(endpoint).await
        } else {
            limiter.try_acquire(endpoint).await
        };
        outcomes.push(admitted);

        if !json {
            if admitted {
                println!("request {:>3}: granted", i);
            } else {
                let wait = limiter.estimated_wait_secs(endpoint).await;
                println!("request {:>3}: denied (retry in {}s)", i, wait);
            }
        }
    }

    let granted = outcomes.iter().filter(|admitted| **admitted).count() as u32;
    let denied = requests - granted;
    let stats = limiter.endpoint_stats(endpoint).await;

    if json {
        let report = SimulationReport {
            endpoint: endpoint.to_string(),
            blocking,
            granted,
            denied,
            outcomes,
            stats,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        println!("Endpoint: {}", endpoint);
        println!("Granted:  {}", granted);
        println!("Denied:   {}", denied);
        if let Some(stats) = stats {
            println!(
                "Limit:    {} requests/minute, burst {}",
                stats.requests_per_minute, stats.burst_size
            );
            println!("Tokens:   {:.2}", stats.available_tokens);
            println!("Rate:     {:.1}% granted", stats.grant_rate_percent());
        }
    }

    Ok(())
}

/// Print the wait estimate and accessible message for an endpoint
async fn status(limiter: &RateLimiter, endpoint: &str, locale: Locale, consume: u32) {
    for _ in 0..consume {
        if !limiter.try_acquire(endpoint).await {
            break;
        }
    }

    let wait = limiter.estimated_wait_secs(endpoint).await;
    let message = limiter.accessible_status_message(endpoint, locale).await;

    println!("Endpoint:       {}", endpoint);
    println!("Estimated wait: {}s", wait);
    println!("{}", message);
}

/// Print a limiter report as a table or JSON
fn print_report(report: &LimiterReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!(
        "{:<24} {:>6} {:>6} {:>8} {:>8} {:>8} {:>7} {:>6}",
        "ENDPOINT", "RPM", "BURST", "TOKENS", "GRANTED", "DENIED", "QUEUED", "WAIT"
    );
    for stats in &report.endpoints {
        println!(
            "{:<24} {:>6} {:>6} {:>8.2} {:>8} {:>8} {:>7} {:>5}s",
            stats.endpoint,
            stats.requests_per_minute,
            stats.burst_size,
            stats.available_tokens,
            stats.granted,
            stats.denied,
            stats.queued,
            stats.estimated_wait_secs
        );
    }

    println!();
    println!("Endpoints: {}", report.endpoints.len());
    println!("Granted:   {}", report.total_granted());
    println!("Denied:    {}", report.total_denied());

    let throttled: Vec<&str> = report
        .throttled_endpoints()
        .iter()
        .map(|stats| stats.endpoint.as_str())
        .collect();
    if throttled.is_empty() {
        println!("Throttled: none");
    } else {
        println!("Throttled: {}", throttled.join(", "));
    }

    Ok(())
}

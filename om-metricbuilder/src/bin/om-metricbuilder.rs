use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use om_metricbuilder::{build_page, BuilderConfig, ExpositionFormat};

/// Builds the metrics of a scraped exposition page and prints them as JSON.
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    #[clap(short, long, required = true)]
    input: String,

    /// Timestamp in milliseconds for samples without one, defaults to now.
    #[clap(short, long)]
    timestamp: Option<i64>,

    /// The page is OpenMetrics, timestamps are in seconds.
    #[clap(long)]
    openmetrics: bool,

    /// Start cumulative points at process_start_time_seconds.
    #[clap(long)]
    use_start_time_metric: bool,

    /// Pattern selecting the start time metric.
    #[clap(long)]
    start_time_metric_regex: Option<String>,

    /// Scrape interval in milliseconds.
    #[clap(long, default_value_t = 0)]
    scrape_interval: i64,
}

fn now_ms() -> Result<i64> {
    let elapsed = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH)?;
    Ok(elapsed.as_millis() as i64)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let om_data = std::fs::read_to_string(&args.input)
        .with_context(|| format!("couldn't read {}", args.input))?;

    let format = match args.openmetrics {
        true => ExpositionFormat::OpenMetrics,
        false => ExpositionFormat::Prometheus,
    };
    let timestamp = match args.timestamp {
        Some(timestamp) => timestamp,
        None => now_ms()?,
    };

    let mut config = BuilderConfig::default()
        .use_start_time_metric(args.use_start_time_metric)
        .scrape_interval_ms(args.scrape_interval);
    if let Some(pattern) = args.start_time_metric_regex {
        config = config.start_time_metric_regex(pattern);
    }

    let output = build_page(&om_data, format, timestamp, config)?;

    println!("{}", serde_json::to_string_pretty(&output.metrics)?);
    println!(
        "{} metrics, {} timeseries, {} dropped",
        output.metrics.len(),
        output.timeseries,
        output.dropped_timeseries
    );

    Ok(())
}

//! Command line and settings merge

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use gcs_exporter_collector::ScanOptions;
use gcs_exporter_common::config::{parse_duration, parse_listen_addr, resolve_targets};
use gcs_exporter_common::{Config, Error, ListingStrategy, LogFormat, Result, ScrapeTarget};

#[derive(Parser, Debug, Clone)]
#[command(name = "gcs-exporter")]
#[command(about = "Export Google Cloud Storage bucket statistics as Prometheus metrics")]
#[command(version)]
pub struct Args {
    /// Bucket to collect, as gs://<bucket>. Repeat once per bucket.
    #[arg(long = "source", env = "SOURCE", value_delimiter = ',')]
    pub sources: Vec<String>,

    /// Collection interval for the --source at the same position, e.g. 600s
    #[arg(long = "time", env = "TIME", value_delimiter = ',', value_parser = parse_duration)]
    pub times: Vec<Duration>,

    /// Configuration file path
    #[arg(short, long, default_value = "/etc/gcs-exporter/config.toml")]
    pub config: PathBuf,

    /// Listen address of the metrics endpoint
    #[arg(long)]
    pub metrics_listen: Option<String>,

    /// Deadline for one full bucket scan
    #[arg(long, value_parser = parse_duration)]
    pub scan_timeout: Option<Duration>,

    /// How object size and creation time are obtained (inline, per-object)
    #[arg(long)]
    pub listing_strategy: Option<ListingStrategy>,

    /// Service account key file. Ambient Google credentials are used when unset.
    #[arg(long)]
    pub credentials: Option<String>,

    /// GCS API endpoint, e.g. a storage emulator
    #[arg(long)]
    pub gcs_endpoint: Option<String>,

    /// Log level [default: info]
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log output format (text, json)
    #[arg(long)]
    pub log_format: Option<LogFormat>,
}

/// Fully resolved runtime settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub targets: Vec<ScrapeTarget>,
    pub metrics_listen: SocketAddr,
    pub scan: ScanOptions,
    pub credentials: Option<String>,
    pub endpoint: Option<String>,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Settings {
    /// Merge command line arguments over the config file.
    ///
    /// Any `--source` or `--time` on the command line replaces the file's
    /// `[[bucket]]` list. Every validation error here is fatal at startup.
    pub fn resolve(args: &Args, config: Config) -> Result<Self> {
        let targets = if args.sources.is_empty() && args.times.is_empty() {
            config.targets()?
        } else {
            resolve_targets(&args.sources, &args.times)?
        };

        let metrics_listen = match &args.metrics_listen {
            Some(addr) => parse_listen_addr(addr)?,
            None => config.metrics.listen_addr()?,
        };

        let scan = ScanOptions {
            timeout: args.scan_timeout.unwrap_or(config.scan.timeout),
            strategy: args.listing_strategy.unwrap_or(config.scan.strategy),
        };
        if scan.timeout.is_zero() {
            return Err(Error::invalid_duration(
                "0s",
                "scan timeout must be greater than zero",
            ));
        }

        Ok(Self {
            targets,
            metrics_listen,
            scan,
            credentials: args.credentials.clone().or(config.gcs.credentials),
            endpoint: args.gcs_endpoint.clone().or(config.gcs.endpoint),
            log_level: args.log_level.clone().unwrap_or(config.logging.level),
            log_format: args.log_format.unwrap_or(config.logging.format),
        })
    }
}

//! Configuration types for gcs-exporter
//!
//! The config file is optional TOML. Command-line flags are merged on top of
//! it by the binary; the resulting bucket list is validated here.

use crate::error::{Error, Result};
use crate::types::BucketName;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Default per-scan deadline
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(60);

/// Default metrics listen address
pub const DEFAULT_METRICS_LISTEN: &str = "0.0.0.0:9990";

/// Root configuration for gcs-exporter
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Metrics endpoint configuration
    pub metrics: MetricsConfig,
    /// Scan configuration
    pub scan: ScanConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Storage client configuration
    pub gcs: GcsConfig,
    /// Buckets to collect, each with its own interval
    #[serde(rename = "bucket")]
    pub buckets: Vec<BucketConfig>,
}

impl Config {
    /// Load the config file at `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse a config from TOML text
    pub fn from_toml(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Validate the `[[bucket]]` entries into scrape targets
    pub fn targets(&self) -> Result<Vec<ScrapeTarget>> {
        let sources: Vec<&str> = self.buckets.iter().map(|b| b.source.as_str()).collect();
        let intervals: Vec<Duration> = self.buckets.iter().map(|b| b.interval).collect();
        resolve_targets(&sources, &intervals)
    }
}

/// Metrics endpoint configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Address the Prometheus endpoint listens on
    pub listen: String,
}

impl MetricsConfig {
    /// Parse the listen address
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        parse_listen_addr(&self.listen)
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_METRICS_LISTEN.to_string(),
        }
    }
}

/// Scan configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Wall-clock bound on a single bucket scan
    #[serde(with = "duration_str")]
    pub timeout: Duration,
    /// How object size and creation time are obtained
    pub strategy: ListingStrategy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SCAN_TIMEOUT,
            strategy: ListingStrategy::default(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Storage client configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GcsConfig {
    /// Service account key file. Ambient credentials are used when unset.
    pub credentials: Option<String>,
    /// API endpoint override, e.g. a storage emulator
    pub endpoint: Option<String>,
}

/// One `[[bucket]]` entry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BucketConfig {
    /// `gs://<bucket>` or a bare bucket name
    pub source: String,
    /// Collection interval
    #[serde(with = "duration_str")]
    pub interval: Duration,
}

/// How a scan obtains object size and creation time
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListingStrategy {
    /// Use metadata carried by the listing; fetch per object only when an
    /// entry lacks it
    #[default]
    Inline,
    /// Fetch metadata for every listed object
    PerObject,
}

impl ListingStrategy {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::PerObject => "per-object",
        }
    }
}

impl fmt::Display for ListingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "inline" => Ok(Self::Inline),
            "per-object" => Ok(Self::PerObject),
            other => Err(Error::configuration(format!(
                "unknown listing strategy {other:?} (expected \"inline\" or \"per-object\")"
            ))),
        }
    }
}

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(Error::configuration(format!(
                "unknown log format {other:?} (expected \"text\" or \"json\")"
            ))),
        }
    }
}

/// A validated (bucket, interval) pair
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScrapeTarget {
    pub bucket: BucketName,
    pub interval: Duration,
}

/// Pair up bucket sources with collection intervals.
///
/// The two lists are positional and must have the same length. Every source
/// must name a valid bucket, each bucket may appear once, and intervals must
/// be non-zero.
pub fn resolve_targets<S: AsRef<str>>(
    sources: &[S],
    intervals: &[Duration],
) -> Result<Vec<ScrapeTarget>> {
    if sources.len() != intervals.len() {
        return Err(Error::MismatchedTargets {
            sources: sources.len(),
            intervals: intervals.len(),
        });
    }
    if sources.is_empty() {
        return Err(Error::NoTargets);
    }

    let mut seen = HashSet::new();
    let mut targets = Vec::with_capacity(sources.len());
    for (source, &interval) in sources.iter().zip(intervals) {
        let source = source.as_ref();
        let bucket = BucketName::from_source(source).map_err(|reason| Error::InvalidSource {
            source_str: source.to_string(),
            reason,
        })?;
        if interval.is_zero() {
            return Err(Error::invalid_duration(
                format_duration(interval),
                format!("collection interval for {bucket} must be greater than zero"),
            ));
        }
        if !seen.insert(bucket.clone()) {
            return Err(Error::DuplicateBucket(bucket.to_string()));
        }
        targets.push(ScrapeTarget { bucket, interval });
    }
    Ok(targets)
}

/// Parse a listen address such as `0.0.0.0:9990` or `:9990`
pub fn parse_listen_addr(addr: &str) -> Result<SocketAddr> {
    let normalized = if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    };
    normalized
        .parse()
        .map_err(|e: std::net::AddrParseError| Error::InvalidListenAddress {
            addr: addr.to_string(),
            reason: e.to_string(),
        })
}

/// Parse a duration string such as `600s`, `10m`, `1h30m` or `1.5h`.
///
/// A sequence of decimal numbers, each with a unit suffix (`ns`, `us`, `µs`,
/// `ms`, `s`, `m`, `h`). A bare `0` is accepted.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(Error::invalid_duration(input, "empty duration"));
    }
    if s.starts_with('-') {
        return Err(Error::invalid_duration(input, "negative durations are not allowed"));
    }
    let s = s.strip_prefix('+').unwrap_or(s);

    let mut total_nanos: f64 = 0.0;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        if num_end == 0 {
            return Err(Error::invalid_duration(input, "expected a number"));
        }
        let value: f64 = rest[..num_end]
            .parse()
            .map_err(|_| Error::invalid_duration(input, "malformed number"))?;
        rest = &rest[num_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_nanos = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(Error::invalid_duration(input, "missing unit")),
            unit => return Err(Error::invalid_duration(input, format!("unknown unit {unit:?}"))),
        };
        rest = &rest[unit_end..];
        total_nanos += value * unit_nanos;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(Error::invalid_duration(input, "duration out of range"));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let nanos = total_nanos.round() as u64;
    Ok(Duration::from_nanos(nanos))
}

/// Format a duration the way [`parse_duration`] reads it back
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let nanos = d.subsec_nanos();
    if nanos == 0 {
        return format!("{secs}s");
    }
    if secs == 0 && nanos % 1_000_000 == 0 {
        return format!("{}ms", nanos / 1_000_000);
    }
    format!("{}ns", d.as_nanos())
}

/// Serde helper that reads and writes `Duration` as a duration string
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

//! Operator commands over the fetch cache.

mod error;

use crate::error::{ErrorKind, Result};
use clap::{Parser, Subcommand};
use exn::{OptionExt, ResultExt};
use hermes_canon::AliasPattern;
use hermes_config::Config;
use hermes_fetch::{FetchCache, FetchOptions};
use hermes_store::{FetchRecord, Filter};
use std::path::PathBuf;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcDateTime};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hermes", about = "Fetch pages through the archiving cache", version)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, env = "HERMES_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch a fresh copy through the backend chain
    Scrape {
        url: String,
        /// Fetch directly when every backend fails
        #[arg(long)]
        fallback: bool,
        /// Direct request timeout, in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Print a page, preferring a stored or archived copy
    Soft {
        url: String,
        /// Refetch when the stored copy is older than this many seconds
        #[arg(long)]
        musty: Option<u64>,
        /// Also accept stored copies of the URL's renamed variants
        #[arg(long, conflicts_with = "like")]
        alias: bool,
        /// Accept stored copies matching this LIKE pattern
        #[arg(long)]
        like: Option<String>,
        /// Pause after a direct request, in seconds
        #[arg(long)]
        delay: Option<f64>,
    },
    /// Print the newest stored record, fetching directly when there is none
    Dump {
        url: String,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        delay: Option<f64>,
    },
    /// Make sure a page has been fetched at least once
    Prescrape {
        url: String,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        delay: Option<f64>,
    },
    /// Store a file as a successful capture, unless one already exists
    Import {
        file: PathBuf,
        url: String,
        /// RFC 3339 date-time or unix seconds
        timestamp: String,
    },
    /// Print the newest (or every) stored URL matching a LIKE pattern
    Like {
        pattern: String,
        #[arg(long)]
        all: bool,
    },
    /// Copy archived copies from the last backend, for each URL on stdin
    Recache,
    /// Crawl through the first backend, for each URL on stdin
    Rescrape,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let cache = FetchCache::from_config(&config).await.or_raise(|| ErrorKind::Setup)?;
    let outcome = run(&cache, cli.command).await;
    cache.close().await;
    outcome
}

fn init_logging(verbose: u8) -> Result<()> {
    let default = if verbose > 0 { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))
        .or_raise(|| ErrorKind::Logging)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| exn::Exn::from(ErrorKind::Logging))
}

async fn run(cache: &FetchCache, command: Command) -> Result<()> {
    match command {
        Command::Scrape { url, fallback, timeout } => {
            let mut options = cache.defaults().clone().with_fallback(fallback || cache.defaults().fallback);
            if let Some(secs) = timeout {
                options = options.with_timeout(Duration::from_secs(secs));
            }
            let record = cache.scrape(&url, &options).await.or_raise(|| ErrorKind::Fetch)?;
            print_summary(&record).await
        },
        Command::Soft { url, musty, alias, like, delay } => {
            let pattern = match (alias, like) {
                (_, Some(like)) => Some(AliasPattern::raw(like)),
                (true, None) => Some(
                    cache
                        .repository()
                        .canonicalizer()
                        .alias_pattern(&url)
                        .or_raise(|| ErrorKind::InvalidArgument(url.clone()))?,
                ),
                (false, None) => None,
            };
            let mut options = cache
                .soft_options()
                .with_alias(pattern)
                .with_musty_threshold(musty.map(Duration::from_secs));
            if let Some(delay) = delay {
                options.fetch = options.fetch.with_delay(delay);
            }
            match cache.soft_scrape(&url, &options).await.or_raise(|| ErrorKind::Fetch)? {
                Some(body) => write_stdout(&body).await,
                None => exn::bail!(ErrorKind::Fetch),
            }
        },
        Command::Dump { url, force, delay } => {
            let stored = cache
                .most_recent_scrape_with_meta(&url, None, Filter::any_status())
                .await
                .or_raise(|| ErrorKind::Fetch)?;
            let record = match stored {
                Some(record) if !force => record,
                _ => direct_fetch(cache, &url, delay).await?,
            };
            match &record.body {
                Some(body) => write_stdout(body).await,
                None => {
                    eprintln!("{} is empty, status: {}", record.url, record.status);
                    Ok(())
                },
            }
        },
        Command::Prescrape { url, force, delay } => {
            let canonical = cache.canonicalize(&url).or_raise(|| ErrorKind::InvalidArgument(url.clone()))?;
            if !force && cache.most_recent_scrape(&canonical).await.or_raise(|| ErrorKind::Fetch)?.is_some() {
                tracing::info!(url = %canonical, "Already fetched");
                return Ok(());
            }
            let record = direct_fetch(cache, &canonical, delay).await?;
            print_summary(&record).await
        },
        Command::Import { file, url, timestamp } => {
            let created_at = parse_timestamp(&timestamp)?;
            let body = tokio::fs::read_to_string(&file).await.or_raise(|| ErrorKind::Io)?;
            match cache.import(&url, created_at, body).await.or_raise(|| ErrorKind::Fetch)? {
                Some(record) => tracing::info!(id = record.id, url = %record.url, "Imported"),
                None => tracing::info!(%url, "Already stored, nothing imported"),
            }
            Ok(())
        },
        Command::Like { pattern, all } => {
            let pattern = AliasPattern::raw(pattern);
            let urls = if all {
                cache.all_url_like(&pattern).await
            } else {
                cache.last_url_like(&pattern).await.map(|url| url.into_iter().collect())
            }
            .or_raise(|| ErrorKind::Fetch)?;
            for url in urls {
                write_stdout(&url).await?;
            }
            Ok(())
        },
        Command::Recache => {
            for_each_stdin_url(|url| async move {
                match cache.recache(&url).await.or_raise(|| ErrorKind::Fetch)? {
                    Some(record) => tracing::info!(id = record.id, url = %record.url, "Recached"),
                    None => tracing::warn!(%url, "Not archived"),
                }
                Ok(())
            })
            .await
        },
        Command::Rescrape => {
            for_each_stdin_url(|url| async move {
                let record = cache.rescrape(&url).await.or_raise(|| ErrorKind::Fetch)?;
                tracing::info!(id = record.id, url = %record.url, status = record.status, "Rescraped");
                Ok(())
            })
            .await
        },
    }
}

/// Fetch straight from the origin, then honour the requested pause.
async fn direct_fetch(cache: &FetchCache, url: &str, delay: Option<f64>) -> Result<FetchRecord> {
    let FetchOptions { timeout, delay: default_delay, .. } = cache.defaults().clone();
    let record = cache
        .direct()
        .fetch(url, timeout, delay.unwrap_or(default_delay))
        .await
        .or_raise(|| ErrorKind::Fetch)?;
    Ok(record)
}

/// One URL per line; blank lines are skipped, failures are logged and skipped.
async fn for_each_stdin_url<F, Fut>(mut handle: F) -> Result<()>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut failures = 0usize;
    while let Some(line) = lines.next_line().await.or_raise(|| ErrorKind::Io)? {
        let url = line.trim();
        if url.is_empty() {
            continue;
        }
        if let Err(err) = handle(url.to_string()).await {
            tracing::error!(url, error = ?err, "Skipping");
            failures += 1;
        }
    }
    if failures > 0 {
        tracing::warn!(failures, "Some URLs failed");
    }
    Ok(())
}

async fn print_summary(record: &FetchRecord) -> Result<()> {
    let size = record.body.as_ref().map_or(0, String::len);
    write_stdout(&format!("{}\t{}\t{}\t{}", record.url, record.status, record.created_at, size)).await
}

async fn write_stdout(text: &str) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(text.as_bytes()).await.or_raise(|| ErrorKind::Io)?;
    if !text.ends_with('\n') {
        stdout.write_all(b"\n").await.or_raise(|| ErrorKind::Io)?;
    }
    stdout.flush().await.or_raise(|| ErrorKind::Io)
}

/// RFC 3339 date-time, or whole unix seconds.
fn parse_timestamp(value: &str) -> Result<UtcDateTime> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<i64>() {
        return UtcDateTime::from_unix_timestamp(secs).or_raise(|| ErrorKind::InvalidArgument(value.to_string()));
    }
    OffsetDateTime::parse(value, &Rfc3339)
        .ok()
        .map(OffsetDateTime::to_utc)
        .ok_or_raise(|| ErrorKind::InvalidArgument(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case("1300000000", 1_300_000_000)]
    #[case(" 0 ", 0)]
    #[case("2011-03-13T07:06:40Z", 1_300_000_000)]
    #[case("2011-03-13T09:06:40+02:00", 1_300_000_000)]
    fn test_parse_timestamp(#[case] value: &str, #[case] expected: i64) {
        assert_eq!(parse_timestamp(value).unwrap().unix_timestamp(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("yesterday")]
    #[case("2011-03-13")]
    fn test_parse_timestamp_invalid(#[case] value: &str) {
        assert!(matches!(&*parse_timestamp(value).unwrap_err(), ErrorKind::InvalidArgument(_)));
    }

    #[test]
    fn test_soft_alias_conflicts_with_like() {
        let parsed = Cli::try_parse_from(["hermes", "soft", "https://a.example/x", "--alias", "--like", "%"]);
        assert!(parsed.is_err());
    }
}

//! Run one series ingestion job from the command line.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::env;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use clap::Parser;
use mockable::DefaultClock;
use tokio::runtime::Builder;
use url::Url;

use price_series::domain::ports::NoOpIngestionJobMetrics;
use price_series::domain::{
    IngestionJob, IngestionOutcome, RejectionReason, SeriesCommitConfig, SeriesIngestionHandler,
    SeriesIngestionPorts, SeriesKey,
};
use price_series::outbound::persistence::{DbPool, DieselSeriesStore, PoolConfig};
use price_series::outbound::price_source::HttpPriceSource;

/// `ingest-series` command arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "ingest-series",
    about = "Fetch and commit daily prices for one series key",
    version
)]
struct CliArgs {
    /// Series key to ingest.
    #[arg(long = "key", value_name = "key", value_parser = parse_series_key)]
    key: SeriesKey,
    /// First day to request from the price source.
    #[arg(long = "requested-start", value_name = "YYYY-MM-DD")]
    requested_start: NaiveDate,
    /// Purge stored rows for the key and reload from the fetched batch.
    #[arg(long = "force-refresh")]
    force_refresh: bool,
    /// Base URL of the price service.
    #[arg(long = "price-source-url", value_name = "url")]
    price_source_url: Url,
    /// Upstream request timeout in seconds.
    #[arg(long = "timeout-secs", value_name = "seconds", default_value_t = 30)]
    timeout_secs: u64,
    /// Database connection URL. Falls back to `DATABASE_URL` when omitted.
    #[arg(long = "database-url", value_name = "url")]
    database_url: Option<String>,
}

fn main() -> io::Result<()> {
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| io::Error::other(format!("create Tokio runtime: {error}")))?;
    runtime.block_on(async_main())
}

async fn async_main() -> io::Result<()> {
    let args = CliArgs::try_parse().map_err(io::Error::other)?;

    let database_url = resolve_database_url(args.database_url)?;
    let pool = DbPool::new(PoolConfig::new(&database_url))
        .await
        .map_err(|error| io::Error::other(format!("create database pool: {error}")))?;
    let source = HttpPriceSource::new(args.price_source_url, Duration::from_secs(args.timeout_secs))
        .map_err(|error| io::Error::other(format!("create price source client: {error}")))?;

    let handler = SeriesIngestionHandler::new(
        SeriesIngestionPorts::new(
            Arc::new(source),
            Arc::new(DieselSeriesStore::new(pool)),
            Arc::new(NoOpIngestionJobMetrics),
        ),
        Arc::new(DefaultClock),
        SeriesCommitConfig::default(),
    );
    let job = IngestionJob {
        key: args.key,
        force_refresh: args.force_refresh,
        requested_start: args.requested_start,
    };

    let outcome = handler
        .handle(&job)
        .await
        .map_err(|error| io::Error::other(format!("ingestion failed: {error}")))?;

    for line in render_outcome(&job.key, &outcome) {
        println!("{line}");
    }
    Ok(())
}

fn parse_series_key(raw: &str) -> Result<SeriesKey, String> {
    SeriesKey::new(raw).map_err(|error| error.to_string())
}

fn render_outcome(key: &SeriesKey, outcome: &IngestionOutcome) -> Vec<String> {
    let mut lines = vec![
        format!("key={key}"),
        format!("status={}", outcome.status().as_label()),
    ];
    match outcome {
        IngestionOutcome::Written(result) => {
            lines.push(format!("inserted={}", result.inserted));
            lines.push(format!("deleted={}", result.deleted));
            lines.push(format!("attempts={}", result.attempts));
        }
        IngestionOutcome::Rejected(reason) => {
            lines.push(format!("reason={}", reason.as_label()));
            if let RejectionReason::GapOrOverlap {
                watermark,
                first_date,
                ..
            } = reason
            {
                lines.push(format!("watermark={watermark}"));
                lines.push(format!("first_date={first_date}"));
            }
        }
        IngestionOutcome::Empty => {}
    }
    lines
}

fn resolve_database_url(explicit: Option<String>) -> io::Result<String> {
    if let Some(value) = explicit {
        if value.trim().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "--database-url must not be empty when provided",
            ));
        }
        return Ok(value);
    }

    let from_env = env::var("DATABASE_URL").map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "database URL missing: set --database-url or DATABASE_URL",
        )
    })?;
    if from_env.trim().is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "DATABASE_URL must not be empty",
        ));
    }
    Ok(from_env)
}

#[cfg(test)]
mod tests {
    //! Unit tests for CLI parsing and rendering helpers.

    use env_lock::lock_env;
    use price_series::domain::{BatchRelation, CommitResult};
    use rstest::rstest;

    use super::*;

    fn key() -> SeriesKey {
        SeriesKey::new("0xabc").expect("valid key")
    }

    #[rstest]
    fn parses_required_flags() {
        let args = CliArgs::try_parse_from([
            "ingest-series",
            "--key",
            "0xabc",
            "--requested-start",
            "2023-06-22",
            "--price-source-url",
            "https://prices.example/",
        ])
        .expect("flags should parse");

        assert_eq!(args.key, key());
        assert!(!args.force_refresh);
        assert_eq!(args.timeout_secs, 30);
        assert_eq!(
            args.requested_start,
            NaiveDate::from_ymd_opt(2023, 6, 22).expect("valid date")
        );
    }

    #[rstest]
    #[case::blank_key(&["--key", " ", "--requested-start", "2023-06-22"])]
    #[case::bad_date(&["--key", "0xabc", "--requested-start", "22/06/2023"])]
    fn rejects_invalid_flags(#[case] flags: &[&str]) {
        let argv = ["ingest-series"]
            .iter()
            .chain(flags)
            .chain(&["--price-source-url", "https://prices.example/"])
            .copied();
        assert!(CliArgs::try_parse_from(argv).is_err());
    }

    #[rstest]
    fn renders_written_outcome() {
        let outcome = IngestionOutcome::Written(CommitResult {
            inserted: 3,
            deleted: 0,
            attempts: 1,
        });
        assert_eq!(
            render_outcome(&key(), &outcome),
            vec![
                "key=0xabc",
                "status=written",
                "inserted=3",
                "deleted=0",
                "attempts=1"
            ]
        );
    }

    #[rstest]
    fn renders_rejection_with_dates() {
        let outcome = IngestionOutcome::Rejected(RejectionReason::GapOrOverlap {
            watermark: NaiveDate::from_ymd_opt(2023, 6, 21).expect("valid date"),
            first_date: NaiveDate::from_ymd_opt(2023, 6, 23).expect("valid date"),
            relation: BatchRelation::Gap,
        });
        assert_eq!(
            render_outcome(&key(), &outcome),
            vec![
                "key=0xabc",
                "status=rejected",
                "reason=gap",
                "watermark=2023-06-21",
                "first_date=2023-06-23"
            ]
        );
    }

    #[rstest]
    fn resolve_database_url_rejects_empty_explicit() {
        let error = resolve_database_url(Some("   ".to_owned())).expect_err("empty should fail");
        assert_eq!(error.kind(), io::ErrorKind::InvalidInput);
    }

    #[rstest]
    fn resolve_database_url_falls_back_to_environment() {
        let _guard = lock_env([("DATABASE_URL", Some("postgres://localhost/series".to_owned()))]);
        let url = resolve_database_url(None).expect("env fallback");
        assert_eq!(url, "postgres://localhost/series");
    }
}

mod aggregate;
mod config;
mod dashboard;
mod error;
mod heuristics;
mod http;
mod jsonl;
mod normalize;
mod reconcile;
mod records;
mod scheduler;
mod store;
mod tasks;

use std::{
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration as StdDuration,
};

use clap::Parser;
use time::Duration;
use tracing::{info, warn};

use crate::config::{resolve_data_dir, resolve_tz_offset, Config};
use crate::scheduler::{RunOutcome, Scheduler};
use crate::store::MetricsStore;

const DEFAULT_PORT: u16 = 17600;
/// One week; longer join or gap windows are almost certainly a unit mistake.
const MAX_WINDOW_MINUTES: i64 = 7 * 24 * 60;

#[derive(Parser, Debug)]
#[command(name = "tracklet_core", version)]
struct Args {
    /// Listen address.
    ///
    /// Accepts:
    /// - ip:port (recommended), e.g. 127.0.0.1:17600
    /// - ip (implies port 17600), e.g. 127.0.0.1
    #[arg(long, env = "TRACKLET_LISTEN", default_value = "127.0.0.1:17600")]
    listen: String,

    /// Directory holding activity.jsonl, q_analysis.jsonl and the derived files.
    /// Defaults to the nearest `data-backend` directory at or above the working directory.
    #[arg(long, env = "TRACKLET_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Local UTC offset in minutes for naive timestamps and hour buckets.
    /// Detected from the system when omitted.
    #[arg(long, env = "TRACKLET_TZ_OFFSET_MINUTES", allow_hyphen_values = true)]
    tz_offset_minutes: Option<i32>,

    /// Poller sampling interval (seconds).
    #[arg(long, env = "TRACKLET_POLL_INTERVAL_SECONDS", default_value_t = 60.0)]
    poll_interval_seconds: f64,

    /// How far back a classification may be attached to an activity record (minutes).
    #[arg(long, env = "TRACKLET_LOOKBACK_MINUTES", default_value_t = 10)]
    lookback_minutes: i64,

    /// How far ahead a same-session classification is searched (minutes).
    #[arg(long, env = "TRACKLET_LOOKAHEAD_MINUTES", default_value_t = 60)]
    lookahead_minutes: i64,

    /// Idle seconds at which a record counts toward a long break.
    #[arg(long, env = "TRACKLET_BREAK_THRESHOLD_SECONDS", default_value_t = 600.0)]
    break_threshold_seconds: f64,

    /// Largest gap inside one focus session (minutes).
    #[arg(long, env = "TRACKLET_FOCUS_GAP_MINUTES", default_value_t = 5)]
    focus_gap_minutes: i64,

    /// Consecutive unproductive records that raise the streak flag.
    #[arg(long, env = "TRACKLET_STREAK_RECORDS", default_value_t = 10)]
    streak_records: usize,

    /// Daily focus goal shown on the dashboard (minutes).
    #[arg(long, env = "TRACKLET_GOAL_MINUTES", default_value_t = 180)]
    goal_minutes: u32,

    /// Label records the classifier never resolved with app/title keywords.
    #[arg(long, env = "TRACKLET_HEURISTIC_LABELS")]
    heuristic_labels: bool,

    #[arg(long, env = "TRACKLET_RECONCILE_EVERY_SECONDS", default_value_t = 15)]
    reconcile_every_seconds: u64,

    #[arg(long, env = "TRACKLET_AGGREGATE_EVERY_SECONDS", default_value_t = 60)]
    aggregate_every_seconds: u64,

    #[arg(long, env = "TRACKLET_MONITOR_EVERY_SECONDS", default_value_t = 30)]
    monitor_every_seconds: u64,

    /// How long shutdown waits for running tasks before aborting them (seconds).
    #[arg(long, env = "TRACKLET_SHUTDOWN_TIMEOUT_SECONDS", default_value_t = 5)]
    shutdown_timeout_seconds: u64,

    /// Run every task once, then exit.
    #[arg(long)]
    once: bool,

    /// Run the periodic tasks without the HTTP server.
    #[arg(long)]
    no_http: bool,
}

impl Args {
    fn config(&self, cwd: &Path) -> anyhow::Result<Config> {
        if !(self.poll_interval_seconds.is_finite() && self.poll_interval_seconds > 0.0) {
            anyhow::bail!(
                "invalid --poll-interval-seconds {}: must be positive",
                self.poll_interval_seconds
            );
        }
        if !(self.break_threshold_seconds.is_finite() && self.break_threshold_seconds > 0.0) {
            anyhow::bail!(
                "invalid --break-threshold-seconds {}: must be positive",
                self.break_threshold_seconds
            );
        }
        for (flag, value) in [
            ("--lookback-minutes", self.lookback_minutes),
            ("--lookahead-minutes", self.lookahead_minutes),
            ("--focus-gap-minutes", self.focus_gap_minutes),
        ] {
            if !(0..=MAX_WINDOW_MINUTES).contains(&value) {
                anyhow::bail!("invalid {flag} {value}: must be between 0 and {MAX_WINDOW_MINUTES}");
            }
        }
        let every = |secs: u64| StdDuration::from_secs(secs.max(1));

        Ok(Config {
            data_dir: resolve_data_dir(self.data_dir.as_deref(), cwd),
            tz_offset: resolve_tz_offset(self.tz_offset_minutes),
            poll_interval_seconds: self.poll_interval_seconds,
            lookback: Duration::minutes(self.lookback_minutes),
            lookahead: Duration::minutes(self.lookahead_minutes),
            break_threshold_seconds: self.break_threshold_seconds,
            focus_gap: Duration::minutes(self.focus_gap_minutes),
            streak_records: self.streak_records,
            goal_minutes: self.goal_minutes,
            heuristic_labels: self.heuristic_labels,
            reconcile_every: every(self.reconcile_every_seconds),
            aggregate_every: every(self.aggregate_every_seconds),
            monitor_every: every(self.monitor_every_seconds),
            shutdown_timeout: StdDuration::from_secs(self.shutdown_timeout_seconds),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tracklet_core=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();
    let cwd = std::env::current_dir()?;
    let cfg = Arc::new(args.config(&cwd)?);
    info!("Data dir: {}", cfg.data_dir.display());
    info!("Local offset: {}", cfg.tz_offset);

    let store = MetricsStore::new(&cfg.data_dir);
    let mut scheduler = Scheduler::new(cfg.shutdown_timeout);
    tasks::register_all(&mut scheduler, Arc::clone(&cfg), store.clone());
    info!("Tasks: {}", scheduler.task_names().join(", "));

    if args.once {
        let mut failed = 0;
        for (name, outcome) in scheduler.run_once().await {
            info!("{name}: {outcome:?}");
            if outcome != RunOutcome::Completed {
                failed += 1;
            }
        }
        if failed > 0 {
            warn!("{failed} task(s) did not complete");
        }
        return Ok(());
    }

    if args.no_http {
        scheduler.start()?;
        shutdown_signal().await;
    } else {
        let addr = parse_listen(&args.listen)?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Core listening on http://{addr}");

        scheduler.start()?;
        let state = http::AppState::new(Arc::clone(&cfg), store, scheduler.triggers());
        let app = http::router(state);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    }

    let report = scheduler.stop().await;
    if !report.aborted.is_empty() {
        warn!("aborted at shutdown: {}", report.aborted.join(", "));
    }
    Ok(())
}

fn parse_listen(input: &str) -> anyhow::Result<SocketAddr> {
    if let Ok(addr) = input.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = input.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    if let Some((host, port_str)) = input.rsplit_once(':') {
        if host == "localhost" {
            let port: u16 = port_str.parse().map_err(|_| {
                anyhow::anyhow!(
                    "invalid --listen '{}': bad port. Example: 127.0.0.1:{}",
                    input,
                    DEFAULT_PORT
                )
            })?;
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), port));
        }
    }

    if input == "localhost" {
        return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), DEFAULT_PORT));
    }

    Err(anyhow::anyhow!(
        "invalid --listen '{}'. Use ip:port (e.g. 127.0.0.1:{}) or ip (e.g. 127.0.0.1).",
        input,
        DEFAULT_PORT
    ))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}

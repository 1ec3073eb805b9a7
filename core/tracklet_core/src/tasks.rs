use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, info};

use crate::aggregate::hourly::{hourly_productivity, HourlyProductivity};
use crate::aggregate::monitor::{monitor_status, MonitorStatus};
use crate::aggregate::summary::{productivity_summary, ProductivitySummary};
use crate::aggregate::switches::{context_switches, HourlySwitches, SwitchGranularity};
use crate::aggregate::{Column, MetricsTable};
use crate::config::Config;
use crate::error::PipelineResult;
use crate::reconcile::{run_reconcile, ReconcileReport};
use crate::scheduler::Scheduler;
use crate::store::{Artifact, MetricsStore};

pub const RECONCILE: &str = "reconcile";
pub const CONTEXT_SWITCHES: &str = "context_switches";
pub const HOURLY_PRODUCTIVITY: &str = "hourly_productivity";
pub const PRODUCTIVITY_SUMMARY: &str = "productivity_summary";
pub const MONITOR: &str = "monitor";

fn load_table(cfg: &Config, required: &[Column]) -> PipelineResult<MetricsTable> {
    let table = MetricsTable::load(cfg)?;
    table.require(required)?;
    if table.dropped > 0 {
        debug!("metrics log: {} unusable lines skipped", table.dropped);
    }
    Ok(table)
}

pub fn reconcile_task(cfg: &Config) -> PipelineResult<ReconcileReport> {
    run_reconcile(cfg)
}

pub fn context_switches_task(cfg: &Config, store: &MetricsStore) -> PipelineResult<Vec<HourlySwitches>> {
    let table = load_table(cfg, &[Column::AppName, Column::WindowTitle])?;
    let out = context_switches(&table.rows, cfg.tz_offset, SwitchGranularity::AppOrWindow);
    store.write(Artifact::ContextSwitches, &out)?;
    info!("context switches updated: {} hours", out.len());
    Ok(out)
}

pub fn hourly_productivity_task(
    cfg: &Config,
    store: &MetricsStore,
) -> PipelineResult<Vec<HourlyProductivity>> {
    let table = load_table(cfg, &[Column::Productive, Column::IdleSeconds])?;
    let out = hourly_productivity(&table.rows, cfg.tz_offset);
    store.write(Artifact::HourlyProductivity, &out)?;
    info!("hourly productivity updated: {} hours", out.len());
    Ok(out)
}

pub fn productivity_summary_task(cfg: &Config, store: &MetricsStore) -> PipelineResult<ProductivitySummary> {
    let table = load_table(cfg, &[Column::Productive, Column::IdleSeconds])?;
    let out = productivity_summary(&table.rows);
    store.write(Artifact::ProductivitySummary, &out)?;
    info!(
        "productivity summary updated: {} productive / {} total minutes",
        out.productive, out.total_minutes
    );
    Ok(out)
}

pub fn monitor_task(cfg: &Config, store: &MetricsStore) -> PipelineResult<MonitorStatus> {
    let table = load_table(cfg, &[Column::Productive])?;
    let now = OffsetDateTime::now_utc().to_offset(cfg.tz_offset);
    let out = monitor_status(&table.rows, cfg.streak_records, now);
    store.write(Artifact::MonitorStatus, &out)?;
    if out.unproductive_streak {
        info!(
            "unproductive streak: last {} records unproductive",
            cfg.streak_records
        );
    }
    Ok(out)
}

/// Register the pipeline's periodic tasks with their configured intervals.
pub fn register_all(scheduler: &mut Scheduler, cfg: Arc<Config>, store: MetricsStore) {
    let c = Arc::clone(&cfg);
    scheduler.add(RECONCILE, cfg.reconcile_every, move || {
        reconcile_task(&c)?;
        Ok(())
    });

    let (c, s) = (Arc::clone(&cfg), store.clone());
    scheduler.add(CONTEXT_SWITCHES, cfg.aggregate_every, move || {
        context_switches_task(&c, &s)?;
        Ok(())
    });

    let (c, s) = (Arc::clone(&cfg), store.clone());
    scheduler.add(HOURLY_PRODUCTIVITY, cfg.aggregate_every, move || {
        hourly_productivity_task(&c, &s)?;
        Ok(())
    });

    let (c, s) = (Arc::clone(&cfg), store.clone());
    scheduler.add(PRODUCTIVITY_SUMMARY, cfg.aggregate_every, move || {
        productivity_summary_task(&c, &s)?;
        Ok(())
    });

    let c = Arc::clone(&cfg);
    scheduler.add(MONITOR, cfg.monitor_every, move || {
        monitor_task(&c, &store)?;
        Ok(())
    });
}

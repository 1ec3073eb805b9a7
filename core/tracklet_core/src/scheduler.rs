use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::PipelineError;

/// Shortest pause between two cycles of one task, even when a cycle overran its interval.
const MIN_SLEEP: Duration = Duration::from_secs(1);

pub type Job = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Completed,
    Failed,
    /// The previous cycle of the same task was still running.
    Skipped,
}

/// Clears the busy flag when the job itself ends, even if nobody awaits it anymore.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One named unit of periodic work. Clones share the busy flag.
#[derive(Clone)]
struct Cycle {
    name: &'static str,
    busy: Arc<AtomicBool>,
    job: Job,
}

impl Cycle {
    /// Run the job once on the blocking pool. Errors and panics stop here.
    async fn run(&self) -> RunOutcome {
        if self.busy.swap(true, Ordering::AcqRel) {
            debug!("task {}: previous cycle still running, skipped", self.name);
            return RunOutcome::Skipped;
        }
        let guard = BusyGuard(Arc::clone(&self.busy));
        let job = Arc::clone(&self.job);
        let result = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            job()
        })
        .await;

        match result {
            Ok(Ok(())) => RunOutcome::Completed,
            Ok(Err(err)) => {
                let retryable = err
                    .downcast_ref::<PipelineError>()
                    .is_some_and(PipelineError::is_retryable);
                if retryable {
                    warn!("task {}: {err}", self.name);
                } else {
                    error!("task {} failed: {err:#}", self.name);
                }
                RunOutcome::Failed
            }
            Err(err) => {
                error!("task {} panicked: {err}", self.name);
                RunOutcome::Failed
            }
        }
    }
}

struct TaskSpec {
    cycle: Cycle,
    interval: Duration,
}

async fn task_loop(cycle: Cycle, interval: Duration, mut stop: watch::Receiver<bool>) {
    loop {
        if *stop.borrow() {
            break;
        }
        let started = Instant::now();
        cycle.run().await;
        let pause = interval.saturating_sub(started.elapsed()).max(MIN_SLEEP);

        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }
    debug!("task {} stopped", cycle.name);
}

/// Shares each task's busy flag with the scheduler, so a manual run never overlaps a
/// timed one.
#[derive(Clone)]
pub struct Triggers {
    cycles: Arc<[Cycle]>,
}

impl Triggers {
    /// Run one task now, outside its timer. `None` for an unknown task name.
    pub async fn run(&self, name: &str) -> Option<RunOutcome> {
        let cycle = self.cycles.iter().find(|c| c.name == name)?;
        Some(cycle.run().await)
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct StopReport {
    pub joined: Vec<&'static str>,
    pub aborted: Vec<&'static str>,
}

/// Owns a fixed set of periodic tasks. Each task runs on its own tokio task and timer
/// and never overlaps itself.
pub struct Scheduler {
    specs: Vec<TaskSpec>,
    running: Vec<(&'static str, JoinHandle<()>)>,
    stop_tx: Option<watch::Sender<bool>>,
    shutdown_timeout: Duration,
}

impl Scheduler {
    pub fn new(shutdown_timeout: Duration) -> Self {
        Scheduler {
            specs: Vec::new(),
            running: Vec::new(),
            stop_tx: None,
            shutdown_timeout,
        }
    }

    pub fn add<F>(&mut self, name: &'static str, interval: Duration, job: F)
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.specs.push(TaskSpec {
            cycle: Cycle {
                name,
                busy: Arc::new(AtomicBool::new(false)),
                job: Arc::new(job),
            },
            interval,
        });
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.specs.iter().map(|s| s.cycle.name).collect()
    }

    /// Handle for running tasks on demand, independent of the scheduler's lifecycle.
    pub fn triggers(&self) -> Triggers {
        Triggers {
            cycles: self.specs.iter().map(|s| s.cycle.clone()).collect(),
        }
    }

    /// Spawn every task; the first cycle runs immediately.
    pub fn start(&mut self) -> anyhow::Result<()> {
        if self.stop_tx.is_some() {
            bail!("scheduler already started");
        }
        let (tx, rx) = watch::channel(false);
        for spec in &self.specs {
            let handle = tokio::spawn(task_loop(spec.cycle.clone(), spec.interval, rx.clone()));
            info!("task {} started (every {:?})", spec.cycle.name, spec.interval);
            self.running.push((spec.cycle.name, handle));
        }
        self.stop_tx = Some(tx);
        Ok(())
    }

    /// Run every task once, in registration order.
    pub async fn run_once(&self) -> Vec<(&'static str, RunOutcome)> {
        let mut out = Vec::with_capacity(self.specs.len());
        for spec in &self.specs {
            out.push((spec.cycle.name, spec.cycle.run().await));
        }
        out
    }

    /// Signal every task, then join them against one shared deadline. Tasks still
    /// running at the deadline are aborted.
    pub async fn stop(&mut self) -> StopReport {
        let mut report = StopReport::default();
        let Some(tx) = self.stop_tx.take() else {
            return report;
        };
        let _ = tx.send(true);

        let deadline = Instant::now() + self.shutdown_timeout;
        for (name, mut handle) in self.running.drain(..) {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => report.joined.push(name),
                Ok(Err(err)) => {
                    error!("task {name} ended abnormally: {err}");
                    report.joined.push(name);
                }
                Err(_) => {
                    handle.abort();
                    warn!(
                        "task {name} did not stop within {:?}, aborted",
                        self.shutdown_timeout
                    );
                    report.aborted.push(name);
                }
            }
        }
        info!(
            "scheduler stopped: {} joined, {} aborted",
            report.joined.len(),
            report.aborted.len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;

    fn counter_job(counter: &Arc<AtomicUsize>) -> impl Fn() -> anyhow::Result<()> + Send + Sync + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn errors_and_panics_are_contained() {
        let mut s = Scheduler::new(Duration::from_secs(1));
        s.add("not_ready", Duration::from_secs(60), || {
            Err(PipelineError::InputNotReady {
                path: PathBuf::from("activity.jsonl"),
                reason: "missing",
            }
            .into())
        });
        s.add("broken", Duration::from_secs(60), || -> anyhow::Result<()> { anyhow::bail!("boom") });
        s.add("panics", Duration::from_secs(60), || -> anyhow::Result<()> { panic!("bad row") });

        let outcomes = s.run_once().await;
        assert_eq!(
            outcomes,
            vec![
                ("not_ready", RunOutcome::Failed),
                ("broken", RunOutcome::Failed),
                ("panics", RunOutcome::Failed),
            ]
        );
        // A failed cycle releases the guard.
        let triggers = s.triggers();
        assert_eq!(triggers.run("panics").await, Some(RunOutcome::Failed));
        assert_eq!(triggers.run("missing").await, None);
    }

    #[tokio::test]
    async fn a_task_never_overlaps_itself() {
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = std::sync::Mutex::new(release_rx);
        let mut s = Scheduler::new(Duration::from_secs(1));
        s.add("slow", Duration::from_secs(60), move || {
            let rx = release_rx.lock().map_err(|_| anyhow::anyhow!("poisoned"))?;
            let _ = rx.recv_timeout(Duration::from_secs(5));
            Ok(())
        });
        let triggers = s.triggers();

        let first = tokio::spawn({
            let triggers = triggers.clone();
            async move { triggers.run("slow").await }
        });
        // Wait until the first cycle holds the guard.
        while !s.specs[0].cycle.busy.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(triggers.run("slow").await, Some(RunOutcome::Skipped));

        release_tx.send(()).unwrap();
        assert_eq!(first.await.unwrap(), Some(RunOutcome::Completed));
    }

    #[tokio::test]
    async fn an_abandoned_trigger_releases_the_task_once_the_job_ends() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut s = Scheduler::new(Duration::from_secs(1));
        let runs = Arc::clone(&counter);
        s.add("slow", Duration::from_secs(60), move || {
            std::thread::sleep(Duration::from_millis(200));
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let triggers = s.triggers();

        let caller = tokio::spawn({
            let triggers = triggers.clone();
            async move { triggers.run("slow").await }
        });
        while !s.specs[0].cycle.busy.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // The caller goes away mid-cycle; the job keeps running on the blocking pool.
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());
        assert!(s.specs[0].cycle.busy.load(Ordering::SeqCst));

        while counter.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        while s.specs[0].cycle.busy.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(triggers.run("slow").await, Some(RunOutcome::Completed));
        assert_eq!(s.run_once().await, vec![("slow", RunOutcome::Completed)]);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn start_runs_immediately_and_stop_joins() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut s = Scheduler::new(Duration::from_secs(2));
        s.add("count", Duration::from_secs(3600), counter_job(&counter));

        s.start().unwrap();
        assert!(s.start().is_err());
        while counter.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let report = s.stop().await;
        assert_eq!(report.joined, vec!["count"]);
        assert!(report.aborted.is_empty());
        assert!(s.stop().await.joined.is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stuck_tasks_are_aborted_after_the_timeout() {
        let mut s = Scheduler::new(Duration::from_millis(100));
        s.add("stuck", Duration::from_secs(60), || {
            std::thread::sleep(Duration::from_millis(600));
            Ok(())
        });
        s.start().unwrap();
        while !s.specs[0].cycle.busy.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let report = s.stop().await;
        assert_eq!(report.aborted, vec!["stuck"]);
    }
}

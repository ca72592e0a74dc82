//! Scheduled maintenance trigger
//!
//! Runs an action at a fixed period on its own task. The first run happens one
//! period after the trigger is spawned, not immediately. A failing or panicking
//! run is logged and the next period still fires.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use eyre::{Result, eyre};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

type Action = Arc<dyn Fn() -> Result<()> + Send + Sync>;

#[derive(Debug, Default)]
struct TriggerCounters {
    runs: AtomicU64,
    failures: AtomicU64,
}

/// Handle to a running periodic action; dropping it stops the schedule
#[derive(Debug)]
pub struct ScheduledTrigger {
    name: String,
    period: Duration,
    counters: Arc<TriggerCounters>,
    task: JoinHandle<()>,
}

impl ScheduledTrigger {
    /// Start running `action` every `period`, first after one `period`
    ///
    /// Must be called from within a tokio runtime. The action runs on the
    /// blocking pool so it may do filesystem work.
    pub fn spawn<F>(name: impl Into<String>, period: Duration, action: F) -> Result<Self>
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(%name, ?period, "ScheduledTrigger::spawn: called");
        if period.is_zero() {
            return Err(eyre!("Trigger '{}' needs a non-zero period", name));
        }

        let counters = Arc::new(TriggerCounters::default());
        let task = tokio::spawn(run_schedule(name.clone(), period, Arc::new(action), counters.clone()));

        info!(%name, period_ms = period.as_millis() as u64, "Scheduled maintenance trigger started");
        Ok(Self {
            name,
            period,
            counters,
            task,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Number of completed runs, failed ones included
    pub fn runs(&self) -> u64 {
        self.counters.runs.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> u64 {
        self.counters.failures.load(Ordering::SeqCst)
    }

    /// Stop scheduling further runs; a run already in progress completes
    pub fn stop(&self) {
        debug!(name = %self.name, "ScheduledTrigger::stop: called");
        self.task.abort();
    }

    pub fn is_stopped(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ScheduledTrigger {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_schedule(name: String, period: Duration, action: Action, counters: Arc<TriggerCounters>) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        debug!(%name, "run_schedule: tick");

        let run = action.clone();
        let result = tokio::task::spawn_blocking(move || run()).await;
        counters.runs.fetch_add(1, Ordering::SeqCst);

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                counters.failures.fetch_add(1, Ordering::SeqCst);
                warn!(%name, error = %e, "Scheduled action failed, will retry next period");
            }
            Err(e) => {
                counters.failures.fetch_add(1, Ordering::SeqCst);
                warn!(%name, error = %e, "Scheduled action panicked, will retry next period");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_action(counter: Arc<AtomicU64>) -> impl Fn() -> Result<()> + Send + Sync + 'static {
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_zero_period_is_rejected() {
        let result = ScheduledTrigger::spawn("scan", Duration::ZERO, || Ok(()));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_first_run_waits_one_period() {
        let calls = Arc::new(AtomicU64::new(0));
        let trigger = ScheduledTrigger::spawn("scan", Duration::from_millis(300), counting_action(calls.clone())).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(trigger.runs(), 0);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_repeats_every_period() {
        let calls = Arc::new(AtomicU64::new(0));
        let trigger = ScheduledTrigger::spawn("scan", Duration::from_millis(20), counting_action(calls.clone())).unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(calls.load(Ordering::SeqCst) >= 3);
        assert_eq!(trigger.failures(), 0);
    }

    #[tokio::test]
    async fn test_failing_action_keeps_schedule_alive() {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let trigger = ScheduledTrigger::spawn("scan", Duration::from_millis(20), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(eyre!("disk on fire"))
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(calls.load(Ordering::SeqCst) >= 2);
        assert!(trigger.failures() >= 2);
        assert!(!trigger.is_stopped());
    }

    #[tokio::test]
    async fn test_panicking_action_is_contained() {
        let trigger = ScheduledTrigger::spawn("scan", Duration::from_millis(20), || -> Result<()> {
            panic!("scan exploded");
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(trigger.failures() >= 2);
        assert!(!trigger.is_stopped());
    }

    #[tokio::test]
    async fn test_stop_halts_runs() {
        let calls = Arc::new(AtomicU64::new(0));
        let trigger = ScheduledTrigger::spawn("scan", Duration::from_millis(20), counting_action(calls.clone())).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.stop();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let after_stop = calls.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_stop);
        assert!(trigger.is_stopped());
    }
}

use crate::clock::Clock;
use crate::error::CoreResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// The settlement write, decoupled from the timer so the scheduler can be
/// driven in tests without a database.
#[async_trait]
pub trait Settler: Send + Sync + 'static {
    async fn settle(&self, bet_id: i32, pair: &str) -> CoreResult<()>;
}

struct TimerEntry {
    close_at_ms: i64,
    timer_id: u64,
    cancel: oneshot::Sender<()>,
}

/// One lightweight task per open bet, sleeping until close time. Cancellation
/// is cooperative: a settle that already started is left to finish, and
/// `shutdown` waits for in-flight work bounded by a grace period.
pub struct BetScheduler {
    settler: Arc<dyn Settler>,
    clock: Arc<dyn Clock>,
    shutdown_grace: Duration,
    timers: Arc<Mutex<HashMap<i32, TimerEntry>>>,
    tasks: Mutex<JoinSet<()>>,
    next_timer_id: AtomicU64,
}

impl BetScheduler {
    pub fn new(settler: Arc<dyn Settler>, clock: Arc<dyn Clock>, shutdown_grace: Duration) -> Self {
        Self {
            settler,
            clock,
            shutdown_grace,
            timers: Arc::new(Mutex::new(HashMap::new())),
            tasks: Mutex::new(JoinSet::new()),
            next_timer_id: AtomicU64::new(0),
        }
    }

    /// Arms a timer for the bet; a close time already in the past settles
    /// inline instead.
    pub async fn schedule(&self, bet_id: i32, pair: &str, close_at_ms: i64) -> CoreResult<()> {
        let now = self.clock.now_ms();
        if close_at_ms <= now {
            info!(bet_id, "close time already passed, settling immediately");
            return self.settler.settle(bet_id, pair).await;
        }

        let timer_id = self.next_timer_id.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        {
            let mut timers = self.timers.lock().await;
            if let Some(previous) = timers.insert(
                bet_id,
                TimerEntry {
                    close_at_ms,
                    timer_id,
                    cancel: cancel_tx,
                },
            ) {
                let _ = previous.cancel.send(());
            }
        }

        let settler = self.settler.clone();
        let timers = self.timers.clone();
        let pair = pair.to_owned();
        let delay = Duration::from_millis((close_at_ms - now) as u64);
        self.tasks.lock().await.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if let Err(err) = settler.settle(bet_id, &pair).await {
                        error!(bet_id, "failed to settle bet: {err}");
                    }
                }
                _ = cancel_rx => {
                    debug!(bet_id, "bet settlement timer cancelled");
                }
            }
            // A replaced timer must not evict its successor's entry.
            let mut timers = timers.lock().await;
            if timers.get(&bet_id).map(|entry| entry.timer_id) == Some(timer_id) {
                timers.remove(&bet_id);
            }
        });
        info!(bet_id, close_at_ms, "scheduled bet settlement");
        Ok(())
    }

    pub async fn cancel(&self, bet_id: i32) {
        if let Some(entry) = self.timers.lock().await.remove(&bet_id) {
            let _ = entry.cancel.send(());
            debug!(bet_id, "cancelled bet settlement timer");
        }
    }

    pub async fn active_count(&self) -> usize {
        self.timers.lock().await.len()
    }

    pub async fn next_close_at(&self, bet_id: i32) -> Option<i64> {
        self.timers
            .lock()
            .await
            .get(&bet_id)
            .map(|entry| entry.close_at_ms)
    }

    /// Cancels every pending timer and joins the tasks; settlements that are
    /// already past their sleep run to completion within the grace window.
    pub async fn shutdown(&self) {
        info!("shutting down bet scheduler");
        {
            let mut timers = self.timers.lock().await;
            for (_, entry) in timers.drain() {
                let _ = entry.cancel.send(());
            }
        }
        let mut tasks = self.tasks.lock().await;
        let drained = tokio::time::timeout(self.shutdown_grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("shutdown grace elapsed, aborting remaining settlement tasks");
            tasks.abort_all();
        }
        info!("bet scheduler shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::ManualClock;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingSettler {
        calls: StdMutex<Vec<(i32, String)>>,
    }

    impl RecordingSettler {
        fn calls(&self) -> Vec<(i32, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Settler for RecordingSettler {
        async fn settle(&self, bet_id: i32, pair: &str) -> CoreResult<()> {
            self.calls.lock().unwrap().push((bet_id, pair.to_owned()));
            Ok(())
        }
    }

    fn scheduler(
        clock_ms: i64,
    ) -> (Arc<RecordingSettler>, Arc<ManualClock>, BetScheduler) {
        let settler = Arc::new(RecordingSettler::default());
        let clock = Arc::new(ManualClock::at(clock_ms));
        let scheduler = BetScheduler::new(
            settler.clone(),
            clock.clone(),
            Duration::from_secs(10),
        );
        (settler, clock, scheduler)
    }

    #[tokio::test(start_paused = true)]
    async fn settles_when_timer_fires() {
        let (settler, _clock, scheduler) = scheduler(1_000);
        scheduler.schedule(7, "ETH/USDT", 6_000).await.unwrap();
        assert_eq!(scheduler.active_count().await, 1);
        assert_eq!(scheduler.next_close_at(7).await, Some(6_000));

        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(settler.calls(), vec![(7, "ETH/USDT".to_owned())]);
        assert_eq!(scheduler.active_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn past_close_time_settles_inline() {
        let (settler, _clock, scheduler) = scheduler(10_000);
        scheduler.schedule(3, "ETH/USDT", 9_000).await.unwrap();
        assert_eq!(settler.calls(), vec![(3, "ETH/USDT".to_owned())]);
        assert_eq!(scheduler.active_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_settlement() {
        let (settler, _clock, scheduler) = scheduler(1_000);
        scheduler.schedule(5, "ETH/USDT", 6_000).await.unwrap();
        scheduler.cancel(5).await;

        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert!(settler.calls().is_empty());
        assert_eq!(scheduler.active_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_the_timer() {
        let (settler, _clock, scheduler) = scheduler(1_000);
        scheduler.schedule(5, "ETH/USDT", 60_000).await.unwrap();
        scheduler.schedule(5, "ETH/USDT", 6_000).await.unwrap();
        assert_eq!(scheduler.next_close_at(5).await, Some(6_000));

        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(settler.calls(), vec![(5, "ETH/USDT".to_owned())]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_timers() {
        let (settler, _clock, scheduler) = scheduler(1_000);
        scheduler.schedule(1, "ETH/USDT", 600_000).await.unwrap();
        scheduler.schedule(2, "BTC/USDT", 600_000).await.unwrap();

        scheduler.shutdown().await;
        assert!(settler.calls().is_empty());
        assert_eq!(scheduler.active_count().await, 0);
    }
}

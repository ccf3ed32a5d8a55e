//! Scheduler — two independently timed, single-flight background cycles.
//!
//! A send cycle can take many minutes because of the mandatory inter-send
//! delay, so each cycle type carries its own in-progress guard: a tick that
//! arrives while the previous run of the same type is still going is
//! skipped and logged, never queued or run concurrently.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use jobclaw_core::config::SchedulerConfig;

use crate::orchestrator::{EngineContext, SendOrchestrator};
use crate::reply::ReplyDetector;

/// Owns the two cycle loops and their lifecycle. `start` and `stop` are
/// the only mutators; there is no other control surface.
pub struct OutreachScheduler {
    ctx: Arc<EngineContext>,
    config: SchedulerConfig,
    send_in_progress: Arc<AtomicBool>,
    reply_in_progress: Arc<AtomicBool>,
    stop_flag: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl OutreachScheduler {
    pub fn new(ctx: Arc<EngineContext>, config: SchedulerConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            ctx,
            config,
            send_in_progress: Arc::new(AtomicBool::new(false)),
            reply_in_progress: Arc::new(AtomicBool::new(false)),
            stop_flag: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    /// Claim a cycle slot. False means the previous run of this cycle type
    /// has not finished and the tick must be skipped.
    fn try_begin(guard: &AtomicBool) -> bool {
        guard
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Spawn both cycle loops. A second call while running is a no-op.
    pub fn start(&mut self) {
        if !self.handles.is_empty() {
            tracing::warn!("Scheduler already running");
            return;
        }
        self.stop_flag.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(false);

        tracing::info!(
            "⏰ Outreach scheduler started (send every {}s, reply check every {}s)",
            self.config.send_cycle_secs,
            self.config.reply_cycle_secs
        );

        // Send cycle.
        {
            let orchestrator = Arc::new(SendOrchestrator::new(self.ctx.clone()));
            let guard = self.send_in_progress.clone();
            let stop = self.stop_flag.clone();
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            let period = Duration::from_secs(self.config.send_cycle_secs.max(1));
            self.handles.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                interval.tick().await; // consume the immediate first tick
                loop {
                    tokio::select! {
                        _ = interval.tick() => {}
                        _ = shutdown_rx.changed() => break,
                    }
                    if !Self::try_begin(&guard) {
                        tracing::info!("⏭️ Send cycle still in progress, skipping this tick");
                        continue;
                    }
                    let orchestrator = orchestrator.clone();
                    let guard = guard.clone();
                    let stop = stop.clone();
                    tokio::spawn(async move {
                        orchestrator.run_cycle(&stop).await;
                        guard.store(false, Ordering::SeqCst);
                    });
                }
            }));
        }

        // Reply-check cycle.
        {
            let detector = Arc::new(ReplyDetector::new(self.ctx.clone()));
            let guard = self.reply_in_progress.clone();
            let stop = self.stop_flag.clone();
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            let period = Duration::from_secs(self.config.reply_cycle_secs.max(1));
            self.handles.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = interval.tick() => {}
                        _ = shutdown_rx.changed() => break,
                    }
                    if !Self::try_begin(&guard) {
                        tracing::info!("⏭️ Reply cycle still in progress, skipping this tick");
                        continue;
                    }
                    let detector = detector.clone();
                    let guard = guard.clone();
                    let stop = stop.clone();
                    tokio::spawn(async move {
                        detector.run_cycle(&stop).await;
                        guard.store(false, Ordering::SeqCst);
                    });
                }
            }));
        }
    }

    /// Cooperative shutdown: no new cycles start, and an in-flight cycle
    /// finishes its current contact step before the guards clear.
    pub async fn stop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        tracing::info!("🛑 Stopping outreach scheduler");
        self.stop_flag.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
        while self.send_in_progress.load(Ordering::SeqCst)
            || self.reply_in_progress.load(Ordering::SeqCst)
        {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tracing::info!("Outreach scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }
}

//! Overdue sweeper: periodic reclassification of past-due checkouts
//!
//! Runs on an interval, transitions each past-due ACTIVE checkout through
//! the coordinator (same locking discipline as user requests), then
//! dispatches overdue notices. Each record is handled independently: one
//! failure never aborts the rest of the sweep, and failed records are simply
//! picked up again on the next cycle.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::{
    config::SweeperConfig,
    error::AppError,
    repository::CheckoutRepository,
    services::{circulation::CirculationService, email::OverdueNotifier},
};

#[derive(Debug, Default, Clone, Copy)]
pub struct SweepReport {
    pub transitioned: usize,
    pub notified: usize,
    pub failures: usize,
}

pub struct OverdueSweeper {
    circulation: Arc<CirculationService>,
    checkouts: Arc<dyn CheckoutRepository>,
    notifier: Arc<dyn OverdueNotifier>,
    config: SweeperConfig,
    task: Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

impl OverdueSweeper {
    pub fn new(
        circulation: Arc<CirculationService>,
        checkouts: Arc<dyn CheckoutRepository>,
        notifier: Arc<dyn OverdueNotifier>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            circulation,
            checkouts,
            notifier,
            config,
            task: Mutex::new(None),
        }
    }

    /// Spawn the background sweep loop. Idempotent: a second start while
    /// running is a no-op.
    pub async fn start(self: &Arc<Self>) {
        if !self.config.enabled {
            tracing::info!("overdue sweeper disabled by configuration");
            return;
        }
        let mut task = self.task.lock().await;
        if task.is_some() {
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let sweeper = Arc::clone(self);
        let period = StdDuration::from_secs(self.config.interval_seconds);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = sweeper.sweep_once(Utc::now()).await;
                        if report.transitioned > 0 || report.notified > 0 || report.failures > 0 {
                            tracing::info!(
                                transitioned = report.transitioned,
                                notified = report.notified,
                                failures = report.failures,
                                "overdue sweep finished"
                            );
                        } else {
                            tracing::debug!("overdue sweep: nothing to do");
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        *task = Some((shutdown_tx, handle));
        tracing::info!(
            interval_seconds = self.config.interval_seconds,
            "overdue sweeper started"
        );
    }

    pub async fn stop(&self) {
        if let Some((shutdown_tx, handle)) = self.task.lock().await.take() {
            let _ = shutdown_tx.send(true);
            let _ = handle.await;
            tracing::info!("overdue sweeper stopped");
        }
    }

    /// One full pass: transition past-due checkouts, then dispatch notices
    /// for overdue records whose email has not gone out yet.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let due = match self.checkouts.list_active_due_before(now).await {
            Ok(due) => due,
            Err(err) => {
                tracing::warn!(error = %err, "overdue sweep could not list due checkouts");
                report.failures += 1;
                return report;
            }
        };

        for checkout in due {
            match self.circulation.mark_overdue(checkout.id, now).await {
                Ok(Some(_)) => report.transitioned += 1,
                Ok(None) => {}
                // Returned or renewed between the listing and the lock.
                Err(AppError::AlreadyReturned(_)) => {}
                Err(err) => {
                    tracing::warn!(
                        checkout_id = %checkout.id,
                        error = %err,
                        "overdue transition failed; record will be retried next sweep"
                    );
                    report.failures += 1;
                }
            }
        }

        let unnotified = match self.checkouts.list_overdue_unnotified().await {
            Ok(unnotified) => unnotified,
            Err(err) => {
                tracing::warn!(error = %err, "overdue sweep could not list unnotified checkouts");
                report.failures += 1;
                return report;
            }
        };

        for checkout in unnotified {
            match self.notifier.send_overdue_notice(&checkout).await {
                Ok(()) => match self.checkouts.set_overdue_email_sent(checkout.id).await {
                    Ok(()) => report.notified += 1,
                    Err(err) => {
                        // At-least-once: the notice may be re-sent next cycle.
                        tracing::warn!(
                            checkout_id = %checkout.id,
                            error = %err,
                            "overdue notice sent but flag update failed"
                        );
                        report.failures += 1;
                    }
                },
                Err(err) => {
                    tracing::warn!(
                        checkout_id = %checkout.id,
                        error = %err,
                        "overdue notice dispatch failed; will retry next sweep"
                    );
                    report.failures += 1;
                }
            }
        }

        report
    }
}

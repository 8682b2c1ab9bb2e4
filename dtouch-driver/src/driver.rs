use crate::{
    aggregator::aggregate,
    device::{Device, EntityId},
    protocol::DTouchSession,
    scheduler::{CycleError, CycleReport, Scheduler},
};
use chrono::{TimeZone, Utc};
use dtouch_sdk::{DriverError, DriverHealth, DriverResult, HealthStatus, PublishedValue, Publisher};
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const CYCLE_OK: u8 = 1;
const CYCLE_PARTIAL: u8 = 2;
const CYCLE_FAILED: u8 = 3;

/// Lock-free driver counters.
#[derive(Debug, Default)]
pub struct DriverStats {
    cycle_seq: AtomicU64,
    completed_cycles: AtomicU64,
    partial_cycles: AtomicU64,
    failed_cycles: AtomicU64,
    /// Outcome of the last completed cycle; 0 until one completes.
    last_cycle: AtomicU8,
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    avg_response_time_ms: AtomicU64,
    /// Unix millis of the last good response; 0 before the first one.
    last_activity_ms: AtomicI64,
    published: AtomicU64,
    publish_errors: AtomicU64,
}

impl DriverStats {
    /// Allocate the sequence number of a new cycle, starting at 1.
    pub fn next_cycle(&self) -> u64 {
        self.cycle_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_request(&self, elapsed: Duration, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            let elapsed_ms = elapsed.as_millis() as u64;
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
            let prev = self.avg_response_time_ms.load(Ordering::Acquire);
            let new_avg = if prev == 0 {
                elapsed_ms
            } else {
                (prev.saturating_mul(9) + elapsed_ms) / 10
            };
            self.avg_response_time_ms.store(new_avg, Ordering::Release);
            self.last_activity_ms
                .store(Utc::now().timestamp_millis(), Ordering::Release);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_cycle(&self, report: &CycleReport) {
        self.completed_cycles.fetch_add(1, Ordering::Relaxed);
        let outcome = if report.fresh_count() == 0 {
            self.failed_cycles.fetch_add(1, Ordering::Relaxed);
            CYCLE_FAILED
        } else if report.is_partial() {
            self.partial_cycles.fetch_add(1, Ordering::Relaxed);
            CYCLE_PARTIAL
        } else {
            CYCLE_OK
        };
        self.last_cycle.store(outcome, Ordering::Release);
    }

    fn record_publish(&self, published: u64, errors: u64) {
        self.published.fetch_add(published, Ordering::Relaxed);
        self.publish_errors.fetch_add(errors, Ordering::Relaxed);
    }

    pub fn completed_cycles(&self) -> u64 {
        self.completed_cycles.load(Ordering::Relaxed)
    }

    pub fn partial_cycles(&self) -> u64 {
        self.partial_cycles.load(Ordering::Relaxed)
    }

    pub fn failed_cycles(&self) -> u64 {
        self.failed_cycles.load(Ordering::Relaxed)
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn publish_errors(&self) -> u64 {
        self.publish_errors.load(Ordering::Relaxed)
    }

    pub fn health(&self) -> DriverHealth {
        let total = self.total_requests.load(Ordering::Relaxed);
        let ok = self.successful_requests.load(Ordering::Relaxed);
        let status = match self.last_cycle.load(Ordering::Acquire) {
            CYCLE_OK => HealthStatus::Healthy,
            CYCLE_PARTIAL => HealthStatus::Degraded,
            CYCLE_FAILED => HealthStatus::Unhealthy,
            _ => HealthStatus::Unknown,
        };
        let last_activity = match self.last_activity_ms.load(Ordering::Acquire) {
            0 => None,
            ms => Utc.timestamp_millis_opt(ms).single(),
        };
        DriverHealth {
            status,
            last_activity,
            cycles: self.completed_cycles(),
            failed_cycles: self.failed_cycles(),
            error_count: self.failed_requests.load(Ordering::Relaxed),
            success_rate: if total == 0 {
                1.0
            } else {
                ok as f64 / total as f64
            },
            average_response_time: Duration::from_millis(
                self.avg_response_time_ms.load(Ordering::Relaxed),
            ),
        }
    }
}

/// Polls one dTouch controller and publishes its entities.
#[derive(Debug)]
pub struct DTouchDriver {
    device: Arc<Device>,
    publisher: Arc<dyn Publisher>,
    stats: Arc<DriverStats>,
}

impl DTouchDriver {
    pub fn new(device: Device, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            device: Arc::new(device),
            publisher,
            stats: Arc::new(DriverStats::default()),
        }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    pub fn health(&self) -> DriverHealth {
        self.stats.health()
    }

    /// Bind a scheduler to a freshly opened session.
    pub fn scheduler(&self, session: Arc<dyn DTouchSession>) -> Scheduler {
        Scheduler::new(
            Arc::clone(&self.device),
            session,
            Arc::clone(&self.stats),
        )
    }

    /// Run one cycle and publish its fresh values.
    ///
    /// Values are handed to the publisher only once the whole cycle has been
    /// aggregated, with no suspension point in between: dropping this future
    /// publishes either the complete cycle or nothing.
    pub async fn poll_once(&self, scheduler: &mut Scheduler) -> Result<CycleReport, CycleError> {
        let report = scheduler.poll_cycle().await?;
        let values = aggregate(&self.device, &report);
        self.publish(report.cycle, values);
        Ok(report)
    }

    fn publish(&self, cycle: u64, values: BTreeMap<EntityId, PublishedValue>) {
        let mut published = 0;
        let mut errors = 0;
        for (id, value) in values {
            match self.publisher.try_publish(Arc::new(value)) {
                Ok(()) => published += 1,
                Err(e) => {
                    errors += 1;
                    tracing::warn!(cycle, entity = %id, error = %e, "Failed to publish value");
                }
            }
        }
        self.stats.record_publish(published, errors);
        tracing::debug!(cycle, published, errors, "Cycle published");
    }

    /// Poll every update interval until cancelled or the link fails.
    ///
    /// Returns `Ok(())` on cancellation and an error when the transport is
    /// gone, so the caller can reopen it.
    pub async fn run(
        &self,
        session: Arc<dyn DTouchSession>,
        cancel: CancellationToken,
    ) -> DriverResult<()> {
        let mut scheduler = self.scheduler(Arc::clone(&session));
        let mut ticker = interval(self.device.update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                _ = ticker.tick() => {}
            }

            let res = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(address = self.device.address, "Cycle abandoned on shutdown");
                    break Ok(());
                }
                res = self.poll_once(&mut scheduler) => res,
            };

            let report = match &res {
                Ok(report) => {
                    if report.is_partial() {
                        tracing::info!(
                            address = self.device.address,
                            cycle = report.cycle,
                            fresh = report.fresh_count(),
                            stale = report.stale_count(),
                            "Cycle completed partially"
                        );
                    }
                    report
                }
                Err(e) => {
                    tracing::warn!(address = self.device.address, error = %e, "Poll cycle failed");
                    e.report()
                }
            };

            if let Some(fault) = report.transport_fault() {
                break Err(DriverError::SessionError(fault.to_string()));
            }
        };

        if let Err(e) = session.close().await {
            tracing::debug!(error = %e, "Closing session failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        protocol::{Command, ProtocolError, RegisterBatch},
        scheduler::CommandOutcome,
    };

    fn report(cycle: u64, fresh: &[Command], stale: &[Command]) -> CycleReport {
        let mut outcomes: Vec<CommandOutcome> = fresh
            .iter()
            .map(|&command| {
                CommandOutcome::Fresh(RegisterBatch {
                    command,
                    values: Vec::new(),
                })
            })
            .collect();
        outcomes.extend(stale.iter().map(|&command| CommandOutcome::Stale {
            command,
            phase: crate::scheduler::CommandPhase::AwaitingResponse,
            error: ProtocolError::Timeout(Duration::from_millis(500)),
        }));
        CycleReport {
            cycle,
            started_at: Utc::now(),
            completed_at: Utc::now(),
            outcomes,
        }
    }

    #[test]
    fn response_time_is_smoothed() {
        let stats = DriverStats::default();
        stats.record_request(Duration::from_millis(100), true);
        assert_eq!(stats.health().average_response_time, Duration::from_millis(100));

        stats.record_request(Duration::from_millis(200), true);
        assert_eq!(stats.health().average_response_time, Duration::from_millis(110));

        // failures do not move the average
        stats.record_request(Duration::from_millis(900), false);
        let health = stats.health();
        assert_eq!(health.average_response_time, Duration::from_millis(110));
        assert_eq!(health.error_count, 1);
        assert!((health.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!(health.last_activity.is_some());
    }

    #[test]
    fn health_follows_last_cycle() {
        let stats = DriverStats::default();
        assert_eq!(stats.health().status, HealthStatus::Unknown);
        assert!(stats.health().last_activity.is_none());

        let all = [Command::MoistureContent, Command::ControlValues];
        stats.record_cycle(&report(1, &all, &[]));
        assert_eq!(stats.health().status, HealthStatus::Healthy);

        stats.record_cycle(&report(2, &all[..1], &all[1..]));
        assert_eq!(stats.health().status, HealthStatus::Degraded);

        stats.record_cycle(&report(3, &[], &all));
        let health = stats.health();
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(health.cycles, 3);
        assert_eq!(health.failed_cycles, 1);
        assert_eq!(stats.partial_cycles(), 1);
    }

    #[test]
    fn cycle_numbers_start_at_one() {
        let stats = DriverStats::default();
        assert_eq!(stats.next_cycle(), 1);
        assert_eq!(stats.next_cycle(), 2);
    }
}

use crate::{
    device::Device,
    driver::DriverStats,
    protocol::{
        codec::decode_response, Command, ProtocolError, Register, RegisterBatch, RegisterValue,
        DTouchSession,
    },
};
use chrono::{DateTime, Utc};
use std::{fmt, sync::Arc};
use thiserror::Error;
use tokio::time::Instant;

/// Where a command is in its exchange with the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandPhase {
    Idle,
    Sending,
    AwaitingResponse,
    Decoding,
    Failed,
}

impl fmt::Display for CommandPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandPhase::Idle => "idle",
            CommandPhase::Sending => "sending",
            CommandPhase::AwaitingResponse => "awaiting response",
            CommandPhase::Decoding => "decoding",
            CommandPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Result of one command within a cycle.
#[derive(Debug)]
pub enum CommandOutcome {
    Fresh(RegisterBatch),
    /// Every register served by `command` is stale for this cycle.
    Stale {
        command: Command,
        /// Phase the exchange failed in.
        phase: CommandPhase,
        error: ProtocolError,
    },
}

impl CommandOutcome {
    pub fn command(&self) -> Command {
        match self {
            CommandOutcome::Fresh(batch) => batch.command,
            CommandOutcome::Stale { command, .. } => *command,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, CommandOutcome::Fresh(_))
    }
}

/// Everything read during one poll cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// One outcome per device command, in wire order.
    pub outcomes: Vec<CommandOutcome>,
}

impl CycleReport {
    pub fn batch(&self, command: Command) -> Option<&RegisterBatch> {
        self.outcomes.iter().find_map(|o| match o {
            CommandOutcome::Fresh(batch) if batch.command == command => Some(batch),
            _ => None,
        })
    }

    /// Fresh value of `register`, or `None` when its command went stale or
    /// the controller did not report it.
    pub fn register(&self, register: Register) -> Option<&RegisterValue> {
        self.batch(register.command())?.get(register)
    }

    pub fn is_stale(&self, command: Command) -> bool {
        self.outcomes
            .iter()
            .any(|o| !o.is_fresh() && o.command() == command)
    }

    pub fn fresh_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_fresh()).count()
    }

    pub fn stale_count(&self) -> usize {
        self.outcomes.len() - self.fresh_count()
    }

    /// Some, but not all, commands failed.
    pub fn is_partial(&self) -> bool {
        let fresh = self.fresh_count();
        fresh > 0 && fresh < self.outcomes.len()
    }

    /// First error showing the link itself is gone.
    pub fn transport_fault(&self) -> Option<&ProtocolError> {
        self.outcomes.iter().find_map(|o| match o {
            CommandOutcome::Stale { error, .. } if error.is_transport_fault() => Some(error),
            _ => None,
        })
    }
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("All {attempted} commands of cycle {cycle} failed")]
    AllCommandsFailed {
        cycle: u64,
        attempted: usize,
        report: Box<CycleReport>,
    },
}

impl CycleError {
    pub fn report(&self) -> &CycleReport {
        match self {
            CycleError::AllCommandsFailed { report, .. } => report,
        }
    }
}

/// Sequences the device's commands over one session, one request in flight.
pub struct Scheduler {
    device: Arc<Device>,
    session: Arc<dyn DTouchSession>,
    stats: Arc<DriverStats>,
}

impl Scheduler {
    pub fn new(device: Arc<Device>, session: Arc<dyn DTouchSession>, stats: Arc<DriverStats>) -> Self {
        Self {
            device,
            session,
            stats,
        }
    }

    /// Run every command once, in order.
    ///
    /// Each command owns one slot of the update interval. Whatever arrives
    /// after its exchange and before the slot ends is dropped, so a reply that
    /// missed its window is never read as the answer to the next command.
    ///
    /// A failing command only marks its own registers stale; the cycle fails
    /// as a whole only when no command succeeded.
    pub async fn poll_cycle(&mut self) -> Result<CycleReport, CycleError> {
        let cycle = self.stats.next_cycle();
        let started_at = Utc::now();
        tracing::debug!(address = self.device.address, cycle, "Poll cycle started");

        let mut outcomes = Vec::with_capacity(self.device.commands.len());
        for &command in &self.device.commands {
            let start = Instant::now();
            let outcome = self.run_command(command).await;
            self.stats
                .record_request(start.elapsed(), outcome.is_fresh());

            if let CommandOutcome::Stale { phase, error, .. } = &outcome {
                tracing::warn!(
                    address = self.device.address,
                    cycle,
                    %command,
                    %phase,
                    error = %error,
                    "Command failed, registers stale for this cycle"
                );
            }

            let link_lost = matches!(
                &outcome,
                CommandOutcome::Stale { error, .. } if error.is_transport_fault()
            );
            if !link_lost {
                self.settle(cycle, command, start + self.device.command_slot)
                    .await;
            }
            outcomes.push(outcome);
        }

        let report = CycleReport {
            cycle,
            started_at,
            completed_at: Utc::now(),
            outcomes,
        };
        self.stats.record_cycle(&report);

        if report.fresh_count() == 0 {
            return Err(CycleError::AllCommandsFailed {
                cycle,
                attempted: report.outcomes.len(),
                report: Box::new(report),
            });
        }
        Ok(report)
    }

    async fn settle(&self, cycle: u64, command: Command, slot_end: Instant) {
        match self.session.discard_until(slot_end).await {
            Ok(0) => {}
            Ok(frames) => tracing::warn!(
                address = self.device.address,
                cycle,
                %command,
                frames,
                "Discarded reply received outside the response window"
            ),
            // Surfaces again on the next send.
            Err(e) => tracing::debug!(
                address = self.device.address,
                cycle,
                %command,
                error = %e,
                "Link failed while waiting for the next slot"
            ),
        }
    }

    async fn run_command(&self, command: Command) -> CommandOutcome {
        let address = self.device.address;
        let stale = |phase: CommandPhase, error: ProtocolError| {
            tracing::trace!(address, %command, from = %phase, to = %CommandPhase::Failed, "Command phase");
            CommandOutcome::Stale {
                command,
                phase,
                error,
            }
        };

        tracing::trace!(address, %command, from = %CommandPhase::Idle, to = %CommandPhase::Sending, "Command phase");
        if let Err(e) = self.session.send_request(command).await {
            return stale(CommandPhase::Sending, e);
        }

        let frame = match self.session.read_frame(self.device.response_timeout).await {
            Ok(frame) => frame,
            Err(e) => return stale(CommandPhase::AwaitingResponse, e),
        };

        match decode_response(&frame, address, command) {
            Ok(batch) => {
                tracing::trace!(
                    address,
                    %command,
                    registers = batch.values.len(),
                    "Response decoded"
                );
                CommandOutcome::Fresh(batch)
            }
            Err(e) => stale(CommandPhase::Decoding, e.into()),
        }
    }
}

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::counter::{CounterError, CounterSource};
use crate::outcome::{RecoveryReport, RecoveryStep, StepReport, TickOutcome};
use crate::runner::CommandRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorState {
    pub last_change: Instant,
    pub last_change_at: DateTime<Utc>,
    pub last_counter: u64,
}

impl MonitorState {
    fn new() -> Self {
        Self {
            last_change: Instant::now(),
            last_change_at: Utc::now(),
            last_counter: 0,
        }
    }

    fn record_change(&mut self, counter: u64, now: Instant) {
        self.last_counter = counter;
        self.last_change = now;
        self.last_change_at = Utc::now();
    }

    /// Restarts the clock and zeroes the last observed counter.
    fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Watches one interface's received-byte counter and restarts it when it stalls.
pub struct Monitor<S: CounterSource, R: CommandRunner> {
    source: S,
    runner: R,
    config: MonitorConfig,
    env: BTreeMap<String, String>,
    state: MonitorState,
    recoveries: u64,
}

impl<S: CounterSource, R: CommandRunner> Monitor<S, R> {
    pub fn new(source: S, runner: R, config: MonitorConfig) -> Self {
        let env = config.command_env();
        Self {
            source,
            runner,
            config,
            env,
            state: MonitorState::new(),
            recoveries: 0,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn recoveries(&self) -> u64 {
        self.recoveries
    }

    /// Samples the counter until `cancel` fires. Counter errors end the run.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), CounterError> {
        info!(
            interface = %self.config.interface,
            interval_secs = self.config.interval.as_secs(),
            timeout_secs = self.config.timeout.as_secs(),
            "starting keepalive"
        );
        if self.config.timeout <= self.config.interval {
            warn!(
                interface = %self.config.interface,
                "timeout does not exceed interval, every unchanged sample will trigger a restart"
            );
        }

        self.state = MonitorState::new();

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.tick().await?;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.config.interval) => {}
            }
        }

        info!(interface = %self.config.interface, recoveries = self.recoveries, "keepalive stopped");
        Ok(())
    }

    /// Takes one sample and, if the counter has been stale for at least the
    /// timeout, runs the recovery sequence.
    pub async fn tick(&mut self) -> Result<TickOutcome, CounterError> {
        let counter = self.source.sample(&self.config.interface).await?;
        let now = Instant::now();

        if counter != self.state.last_counter {
            let previous = self.state.last_counter;
            debug!(from = previous, to = counter, "rx bytes changed");
            self.state.record_change(counter, now);
            return Ok(TickOutcome::Changed {
                previous,
                current: counter,
            });
        }

        let elapsed_secs = now.duration_since(self.state.last_change).as_secs();
        if elapsed_secs < self.config.timeout.as_secs() {
            debug!(counter, elapsed_secs, "rx bytes unchanged");
            return Ok(TickOutcome::Unchanged {
                counter,
                elapsed_secs,
            });
        }

        warn!(
            interface = %self.config.interface,
            counter,
            stalled_secs = elapsed_secs,
            "timeout reached, restarting interface"
        );
        let steps = self.recover().await;
        let report = RecoveryReport {
            counter,
            stalled_secs: elapsed_secs,
            last_change_at: self.state.last_change_at,
            steps,
        };

        self.recoveries += 1;
        self.state.reset();
        Ok(TickOutcome::Recovered(report))
    }

    async fn recover(&self) -> Vec<StepReport> {
        let plan = [
            (RecoveryStep::PreRestart, self.config.pre_restart_command.as_deref()),
            (RecoveryStep::Restart, Some(self.config.restart_command.as_str())),
            (RecoveryStep::PostRestart, self.config.post_restart_command.as_deref()),
        ];

        let mut steps = Vec::with_capacity(plan.len());
        for (step, command) in plan {
            let Some(command) = command else {
                continue;
            };
            steps.push(self.run_step(step, command).await);
        }
        steps
    }

    async fn run_step(&self, step: RecoveryStep, command: &str) -> StepReport {
        info!(step = step.label(), command, "running {} command", step.label());

        let exit_code = match self.runner.run(command, &self.env).await {
            Ok(outcome) => {
                if !outcome.success() {
                    warn!(step = step.label(), command, exit_code = ?outcome.code, "command did not succeed");
                }
                outcome.code
            }
            Err(err) => {
                warn!(step = step.label(), command, error = %err, "failed to spawn command");
                None
            }
        };

        StepReport {
            step,
            command: command.to_string(),
            exit_code,
        }
    }
}

use log::Level;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::settings::BlinkSettings;
use crate::modbus::events::LogChannel;
use crate::modbus::master::ModbusMaster;
use crate::modbus::protocol::SlaveId;
use crate::utils::error::MasterError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlinkPlan {
    pub slaves: Vec<SlaveId>,
    pub cycles: u32,
    pub on_duration: Duration,
    pub off_duration: Duration,
}

impl BlinkPlan {
    /// Three cycles of 300 ms on / 300 ms off.
    pub fn new(slaves: Vec<SlaveId>) -> Self {
        Self::from_settings(slaves, &BlinkSettings::default())
    }

    pub fn from_settings(slaves: Vec<SlaveId>, settings: &BlinkSettings) -> Self {
        Self {
            slaves,
            cycles: settings.cycles,
            on_duration: settings.on_duration(),
            off_duration: settings.off_duration(),
        }
    }

    pub fn with_cycles(mut self, cycles: u32) -> Self {
        self.cycles = cycles;
        self
    }

    pub fn with_timing(mut self, on: Duration, off: Duration) -> Self {
        self.on_duration = on;
        self.off_duration = off;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlinkReport {
    pub cycles_completed: u32,
    pub commands_sent: usize,
    pub commands_failed: usize,
    pub cancelled: bool,
}

/// Handle to a running blink sequence.
pub struct BlinkTask {
    token: CancellationToken,
    handle: JoinHandle<Result<BlinkReport, MasterError>>,
}

impl BlinkTask {
    /// Stops the sequence at its next step; the listed lights are switched off.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn wait(self) -> Result<BlinkReport, MasterError> {
        self.handle
            .await
            .map_err(|e| MasterError::Worker(e.to_string()))?
    }
}

/// Starts the blink test and returns immediately. Fails up front if the
/// master is not connected.
pub fn run_blink_test(master: Arc<ModbusMaster>, plan: BlinkPlan) -> Result<BlinkTask, MasterError> {
    if !master.is_connected() {
        master.emit(
            LogChannel::General,
            Level::Warn,
            "⚠ Blink test needs an open Modbus connection",
        );
        return Err(MasterError::NotConnected);
    }

    master.emit(
        LogChannel::ModbusTrace,
        Level::Info,
        format!(
            "[TEST] Starting blink test: {} cycle(s), {} ms on / {} ms off",
            plan.cycles,
            plan.on_duration.as_millis(),
            plan.off_duration.as_millis()
        ),
    );

    let token = CancellationToken::new();
    let handle = tokio::spawn(run_sequence(master, plan, token.clone()));
    Ok(BlinkTask { token, handle })
}

async fn run_sequence(
    master: Arc<ModbusMaster>,
    plan: BlinkPlan,
    token: CancellationToken,
) -> Result<BlinkReport, MasterError> {
    let mut report = BlinkReport::default();

    for _ in 0..plan.cycles {
        for (on, pause) in [(true, plan.on_duration), (false, plan.off_duration)] {
            if token.is_cancelled() {
                return Ok(stop_cancelled(&master, &plan, report).await);
            }

            if let Err(e) = switch(&master, &plan.slaves, on, &mut report).await {
                // The master has already logged a missing connection
                if e != MasterError::NotConnected {
                    master.emit(
                        LogChannel::ModbusTrace,
                        Level::Warn,
                        format!("[TEST] Blink test aborted: {}", e),
                    );
                }
                return Err(e);
            }

            tokio::select! {
                _ = token.cancelled() => {
                    return Ok(stop_cancelled(&master, &plan, report).await);
                }
                _ = sleep(pause) => {}
            }
        }
        report.cycles_completed += 1;
    }

    master.emit(
        LogChannel::ModbusTrace,
        Level::Info,
        format!(
            "[TEST] Blink test complete ({} sent, {} failed)",
            report.commands_sent, report.commands_failed
        ),
    );
    Ok(report)
}

/// Runs one batch on the blocking pool; the serial write holds the master's
/// lock for its whole duration.
async fn switch(
    master: &Arc<ModbusMaster>,
    slaves: &[SlaveId],
    on: bool,
    report: &mut BlinkReport,
) -> Result<(), MasterError> {
    let worker = Arc::clone(master);
    let targets = slaves.to_vec();
    let batch = tokio::task::spawn_blocking(move || worker.set_many(&targets, on))
        .await
        .map_err(|e| MasterError::Worker(e.to_string()))??;

    report.commands_sent += batch.sent;
    report.commands_failed += batch.failed.len();
    Ok(())
}

/// Switches the lights off if the link is still up; a disconnected master
/// has already turned them off.
async fn stop_cancelled(
    master: &Arc<ModbusMaster>,
    plan: &BlinkPlan,
    mut report: BlinkReport,
) -> BlinkReport {
    report.cancelled = true;

    let worker = Arc::clone(master);
    let targets = plan.slaves.clone();
    if let Ok(Some(batch)) =
        tokio::task::spawn_blocking(move || worker.set_many_if_connected(&targets, false)).await
    {
        report.commands_sent += batch.sent;
        report.commands_failed += batch.failed.len();
    }
    master.emit(LogChannel::ModbusTrace, Level::Info, "[TEST] Blink test cancelled");
    report
}

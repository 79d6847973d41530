/// Refresh scheduling.
///
/// One control loop does all blocking work in sequence: drain pending
/// downloads, extract, publish, sleep. A refresh is published
///
/// - once at startup, whatever the local document holds;
/// - on the tick that drained at least one new document;
/// - otherwise every `cycles_per_refresh + 1` ticks.
///
/// Components plug in through the [`Acquire`], [`Extract`] and [`Sink`]
/// traits so the loop can be driven with fakes in tests.

use crate::logging::{Component, log_drain_summary};
use crate::model::{AcquireError, SinkError, WarningResult};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

// ---------------------------------------------------------------------------
// Component seams
// ---------------------------------------------------------------------------

pub trait Acquire {
    /// True when downloads are waiting.
    fn has_pending(&self) -> bool;

    /// Downloads the next pending document over the local one.
    fn acquire_next(&mut self) -> Result<(), AcquireError>;
}

pub trait Extract {
    fn extract(&self) -> WarningResult;
}

pub trait Sink {
    fn update_device(&self, level: u32, text: &str) -> Result<(), SinkError>;
    fn audit(&self, message: &str) -> Result<(), SinkError>;
}

// ---------------------------------------------------------------------------
// Schedule state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleState {
    pub cycle_count: u32,
    pub cycles_per_refresh: u32,
}

impl ScheduleState {
    /// State right after the startup publish, which counts as the first cycle.
    pub fn new(cycles_per_refresh: u32) -> Self {
        ScheduleState {
            cycle_count: 1,
            cycles_per_refresh,
        }
    }

    pub fn is_due(&self) -> bool {
        self.cycle_count >= self.cycles_per_refresh
    }

    pub fn force_refresh(&mut self) {
        self.cycle_count = self.cycles_per_refresh;
    }

    pub fn advance(&mut self) {
        self.cycle_count += 1;
    }

    pub fn reset(&mut self) {
        self.cycle_count = 0;
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub downloaded: usize,
    pub failed: usize,
    pub published: bool,
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

/// Cooperative stop flag checked between ticks.
///
/// Nothing is ever sent on the channel; dropping the sender disconnects it,
/// which every waiting or polling receiver observes immediately.
pub struct Shutdown {
    rx: Receiver<()>,
}

/// Cloneable trigger for [`Shutdown`], safe to move into a signal handler.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<Mutex<Option<Sender<()>>>>,
}

pub fn shutdown_channel() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = bounded(0);
    (
        ShutdownHandle {
            tx: Arc::new(Mutex::new(Some(tx))),
        },
        Shutdown { rx },
    )
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
    }
}

impl Shutdown {
    pub fn is_requested(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleeps up to `timeout`; returns true as soon as shutdown is requested.
    pub fn wait(&self, timeout: Duration) -> bool {
        !matches!(self.rx.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct RefreshScheduler<A, E, S> {
    acquirer: A,
    extractor: E,
    sink: S,
    state: ScheduleState,
    wait: Duration,
    audit_message: String,
}

impl<A: Acquire, E: Extract, S: Sink> RefreshScheduler<A, E, S> {
    pub fn new(
        acquirer: A,
        extractor: E,
        sink: S,
        cycles_per_refresh: u32,
        wait: Duration,
        audit_message: impl Into<String>,
    ) -> Self {
        RefreshScheduler {
            acquirer,
            extractor,
            sink,
            state: ScheduleState::new(cycles_per_refresh),
            wait,
            audit_message: audit_message.into(),
        }
    }

    pub fn state(&self) -> &ScheduleState {
        &self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn acquirer(&self) -> &A {
        &self.acquirer
    }

    /// Runs until shutdown is requested or acquisition fails fatally.
    pub fn run(&mut self, shutdown: &Shutdown) -> Result<(), AcquireError> {
        self.startup();

        loop {
            if shutdown.is_requested() {
                break;
            }
            self.tick()?;
            if shutdown.wait(self.wait) {
                break;
            }
        }

        info!(component = %Component::Scheduler, "Shutdown requested, scheduler stopped");
        Ok(())
    }

    /// Publishes whatever the local document holds, before the first tick.
    pub fn startup(&mut self) {
        info!(component = %Component::Scheduler, "Initial refresh");
        if !self.publish() {
            // Let the first tick try again.
            self.state.force_refresh();
        }
    }

    pub fn tick(&mut self) -> Result<TickReport, AcquireError> {
        let component = Component::Scheduler;
        let mut report = TickReport::default();

        while self.acquirer.has_pending() {
            match self.acquirer.acquire_next() {
                Ok(()) => report.downloaded += 1,
                Err(err) if err.is_fatal() => {
                    error!(%component, "Acquisition stopped the service: {}", err);
                    return Err(err);
                }
                Err(err) => {
                    warn!(%component, "Acquisition skipped this tick: {}", err);
                    report.failed += 1;
                    break;
                }
            }
        }

        if report.downloaded + report.failed > 0 {
            log_drain_summary(report.downloaded + report.failed, report.downloaded, report.failed);
        }
        if report.downloaded > 0 {
            self.state.force_refresh();
        }

        debug!(
            %component,
            "Loop {} of {}", self.state.cycle_count, self.state.cycles_per_refresh
        );

        if self.state.is_due() {
            // A failed publish keeps the refresh due for the next tick.
            if self.publish() {
                self.state.reset();
                report.published = true;
            }
        } else {
            self.state.advance();
        }

        Ok(report)
    }

    fn publish(&mut self) -> bool {
        let component = Component::Sink;
        let result = self.extractor.extract();
        let level = result.sink_level();

        if let Err(err) = self.sink.update_device(level, &result.rendered_text) {
            error!(%component, level, "Device update failed: {}", err);
            return false;
        }
        info!(%component, level, severity = result.severity, "Device updated");
        debug!(%component, "{} \t {}", level, result.rendered_text);

        if let Err(err) = self.sink.audit(&self.audit_message) {
            warn!(%component, "Audit log entry failed: {}", err);
        }
        true
    }
}

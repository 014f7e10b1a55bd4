// ─────────────────────────────────────────────────────────────────────
// SND Online Model — Resilient Loop Driver
// ─────────────────────────────────────────────────────────────────────
//! Runs the evaluation cycle forever, isolating failures.
//!
//! A failed cycle is logged with its category, followed by a backoff
//! sleep, and the loop carries on with the reference state it had before
//! the failure. The only way out is the stop flag (operator interrupt)
//! or an explicit tick bound. The flag is checked at every tick boundary
//! and, by `ThreadSleeper`, between short sleep slices.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use snd_types::{EvaluationRecord, LoopSummary, TwinConfig, TwinResult};

use crate::cycle::EvaluationCycle;
use crate::sink::MetricsSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Running,
    Stopped,
}

/// Waits between ticks. Implementations should return early once `stop`
/// is set.
pub trait Sleeper: Send {
    fn sleep(&mut self, duration: Duration, stop: &AtomicBool);
}

/// Sleeps on the current thread in slices, polling the stop flag.
#[derive(Debug, Clone, Copy)]
pub struct ThreadSleeper {
    slice: Duration,
}

impl ThreadSleeper {
    pub const DEFAULT_SLICE: Duration = Duration::from_millis(100);

    pub fn new(slice: Duration) -> Self {
        Self { slice }
    }
}

impl Default for ThreadSleeper {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SLICE)
    }
}

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration, stop: &AtomicBool) {
        let deadline = Instant::now() + duration;
        while !stop.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(self.slice.min(deadline - now));
        }
    }
}

pub struct LoopDriver {
    cycle: EvaluationCycle,
    sink: Box<dyn MetricsSink>,
    sleeper: Box<dyn Sleeper>,
    interval: Duration,
    backoff: Duration,
    max_ticks: Option<u64>,
    stop: Arc<AtomicBool>,
    state: DriverState,
    summary: LoopSummary,
}

impl LoopDriver {
    pub fn new(cycle: EvaluationCycle, sink: Box<dyn MetricsSink>, config: &TwinConfig) -> Self {
        Self {
            cycle,
            sink,
            sleeper: Box::new(ThreadSleeper::default()),
            interval: config.interval(),
            backoff: config.backoff(),
            max_ticks: config.max_ticks,
            stop: Arc::new(AtomicBool::new(false)),
            state: DriverState::Running,
            summary: LoopSummary::default(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Share an externally owned stop flag (e.g. one set by a signal handler).
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Request a stop; honoured at the next tick boundary.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn summary(&self) -> &LoopSummary {
        &self.summary
    }

    pub fn cycle(&self) -> &EvaluationCycle {
        &self.cycle
    }

    /// Run one cycle and forward its record to the sink.
    ///
    /// Errors are counted and returned; the driver stays usable.
    pub fn tick(&mut self) -> TwinResult<EvaluationRecord> {
        self.summary.ticks += 1;
        let outcome = self.cycle.run_once().and_then(|record| {
            self.sink
                .record(&record.metrics(), Some(record.timestamp_ms()))
                .map(|()| record)
        });
        match &outcome {
            Ok(record) => {
                self.summary.successes += 1;
                if record.reanchored {
                    self.summary.reanchors += 1;
                }
            }
            Err(e) => {
                self.summary.failures += 1;
                self.summary.last_error = Some(e.to_string());
            }
        }
        outcome
    }

    /// Loop until stopped or the tick bound is reached, then close the sink.
    pub fn run(&mut self) -> LoopSummary {
        log::info!(
            "online model loop running (interval {:?}, backoff {:?})",
            self.interval,
            self.backoff
        );
        loop {
            if self.stop.load(Ordering::SeqCst) {
                self.state = DriverState::Stopped;
                self.summary.stopped = true;
                log::info!("stop requested, leaving loop");
                break;
            }
            if self.max_ticks.is_some_and(|max| self.summary.ticks >= max) {
                log::info!("tick bound of {} reached", self.summary.ticks);
                break;
            }

            let pause = match self.tick() {
                Ok(record) => {
                    log::debug!(
                        "tick {} ok ({} outputs{})",
                        self.summary.ticks,
                        record.outputs.len(),
                        if record.reanchored { ", re-anchored" } else { "" }
                    );
                    self.interval
                }
                Err(e) => {
                    log::error!(
                        "tick {} failed [{}]: {e}; retrying in {:?}",
                        self.summary.ticks,
                        e.category(),
                        self.backoff
                    );
                    self.backoff
                }
            };

            if self.max_ticks.is_some_and(|max| self.summary.ticks >= max) {
                continue;
            }
            self.sleeper.sleep(pause, &self.stop);
        }

        if let Err(e) = self.sink.close() {
            log::warn!("metrics sink did not close cleanly: {e}");
        }
        log::info!(
            "loop finished: {} ticks, {} ok, {} failed, {} re-anchors",
            self.summary.ticks,
            self.summary.successes,
            self.summary.failures,
            self.summary.reanchors
        );
        self.summary.clone()
    }
}

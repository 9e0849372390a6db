//! Coarse polling scheduler for a single recording window

use std::{sync::Arc, thread, time::Duration};

use chrono::Utc;
use tracing::info;

use crate::{
    calibrate::Gain,
    capture::{RecordStats, Store},
    config::CaptureConfig,
    error::Result,
    transport::Transport,
};

/// Wall clock in whole unix seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
    fn sleep(&self, d: Duration);
}

pub type SharedClock = Arc<dyn Clock>;

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }

    fn sleep(&self, d: Duration) {
        thread::sleep(d)
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The window was already over, nothing was captured
    Missed,
    Recorded { gain: Gain, stats: RecordStats },
}

pub struct Scheduler {
    clock: SharedClock,
    poll: Duration,
}

impl Scheduler {
    pub fn new(clock: SharedClock, poll: Duration) -> Self {
        Self { clock, poll }
    }

    /// Wait for the window, calibrate exactly once, then hand over to the capture phase
    pub fn run(
        &self,
        config: &CaptureConfig,
        transport: &mut dyn Transport,
        store: &Store,
    ) -> Result<Outcome> {
        let window = &config.window;
        let calibrate_at = window.calibration_at();
        let mut gain = None;
        loop {
            let now = self.clock.now();
            if now > window.stop {
                info!(stop = window.stop, now, "Recording window already over");
                return Ok(Outcome::Missed);
            }
            if gain.is_none() && calibrate_at.map_or(true, |t| now >= t) {
                info!(transport = transport.name(), "Calibrating gain");
                let g = transport.calibrate(config)?;
                info!(gain = %g, "Using gain");
                gain = Some(g);
                // Calibration takes a while, look at the clock again
                continue;
            }
            if let Some(gain) = gain {
                if now >= window.start {
                    info!("Recording starts now");
                    let stats = transport.record(config, gain, store, &self.clock)?;
                    return Ok(Outcome::Recorded { gain, stats });
                }
            }
            self.clock.sleep(self.poll);
            info!(remaining = window.start - self.clock.now(), "Waiting for recording start");
        }
    }
}

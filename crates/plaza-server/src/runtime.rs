//! Fixed-rate pacing for a live tick loop.
//!
//! The simulation itself is clock-free: it advances by exactly one
//! `tick_millis()` per [`Simulation::tick`]. A live host paces those calls
//! with a [`FixedTicker`]. When the host falls behind, missed ticks are
//! skipped rather than replayed in a burst.

use std::thread;
use std::time::{Duration, Instant};

use crate::protocol::Outbound;
use crate::simulation::Simulation;

#[derive(Debug)]
pub struct FixedTicker {
    interval: Duration,
    next: Instant,
    skipped: u64,
}

impl FixedTicker {
    pub fn new(rate_hz: u32) -> Self {
        let interval = Duration::from_secs(1) / rate_hz.max(1);
        Self {
            interval,
            next: Instant::now() + interval,
            skipped: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Total ticks dropped because the loop overran.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Sleep until the next deadline. Returns how many deadlines were missed.
    pub fn wait_next(&mut self) -> u64 {
        let now = Instant::now();
        if now < self.next {
            thread::sleep(self.next - now);
            self.next += self.interval;
            return 0;
        }
        let behind = now - self.next;
        let missed = (behind.as_nanos() / self.interval.as_nanos().max(1)) as u64;
        if missed > 0 {
            log::warn!(
                "tick loop {:?} behind, skipping {} ticks",
                behind,
                missed
            );
            self.skipped += missed;
        }
        self.next = now + self.interval;
        missed
    }
}

/// Run `ticks` paced ticks, handing every produced event to `deliver`.
pub fn run_paced<F>(sim: &mut Simulation, ticks: u64, mut deliver: F)
where
    F: FnMut(Outbound),
{
    let mut ticker = FixedTicker::new(sim.config().tick_rate_hz);
    log::info!(
        "tick loop started at {} Hz",
        sim.config().tick_rate_hz
    );
    for _ in 0..ticks {
        ticker.wait_next();
        sim.tick();
        for out in sim.drain_outbox() {
            deliver(out);
        }
    }
    if ticker.skipped() > 0 {
        log::warn!("tick loop skipped {} ticks in total", ticker.skipped());
    }
}

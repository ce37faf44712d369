use crate::cycle::Cycle;
use crate::errors::Result;
use crate::metrics::{CYCLES_TOTAL, FAILED_CYCLES_TOTAL};
use crate::model::{CycleResult, DeviceReading};
use crate::session::{Authenticator, Session};
use chrono::Local;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// During a failure streak only every Nth failure is logged at warn level.
const LOUD_EVERY: u32 = 10;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub failed: u64,
    pub relogins: u64,
}

#[derive(Debug, Default)]
struct FailureStreak {
    count: u32,
}

impl FailureStreak {
    /// Records a failure and says whether it deserves a full warning.
    fn record(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        self.count == 1 || self.count % LOUD_EVERY == 0
    }

    fn reset(&mut self) -> u32 {
        std::mem::take(&mut self.count)
    }
}

fn describe(reading: &Option<DeviceReading>) -> String {
    match reading {
        Some(r) => format!(
            "{} {}={}{} at {}",
            r.device.label,
            r.parameter,
            r.value,
            r.unit,
            r.taken_at.format("%H:%M:%S")
        ),
        None => "no reading".to_string(),
    }
}

/// Drives cycles on a fixed interval until told to stop. A failed cycle gets
/// exactly one re-login attempt; if that fails too, the old session is kept
/// and the next failed cycle tries again.
pub struct Scheduler<A, C> {
    auth: A,
    cycle: C,
    interval: Duration,
}

impl<A, C> Scheduler<A, C>
where
    A: Authenticator,
    C: Cycle,
{
    pub fn new(auth: A, cycle: C, interval: Duration) -> Self {
        Self {
            auth,
            cycle,
            interval,
        }
    }

    async fn initial_login(&self) -> Result<Session> {
        self.auth.login().await.map_err(|e| {
            error!("Initial login failed, exiting");
            e.into()
        })
    }

    /// Single login and cycle, for commissioning.
    pub async fn run_once(&self) -> Result<CycleResult> {
        let session = self.initial_login().await?;
        CYCLES_TOTAL.inc();
        let result = self.cycle.run_cycle(&session).await;
        if !result.success {
            FAILED_CYCLES_TOTAL.inc();
        }
        Ok(result)
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<RunSummary> {
        let mut session = self.initial_login().await?;
        let mut summary = RunSummary::default();
        let mut streak = FailureStreak::default();

        info!("Loop interval: {} seconds", self.interval.as_secs());

        loop {
            if *shutdown.borrow() {
                break;
            }

            summary.cycles += 1;
            CYCLES_TOTAL.inc();
            info!(
                "Cycle #{} starting at {}",
                summary.cycles,
                Local::now().format("%Y-%m-%d %H:%M:%S")
            );
            debug!("Using session established at {}", session.established_at());

            let result = self.cycle.run_cycle(&session).await;
            if result.success {
                info!(
                    "Cycle #{} complete: {}, {}",
                    summary.cycles,
                    describe(&result.mill_2),
                    describe(&result.mill_1)
                );
                if !result.published {
                    warn!("Readings were not confirmed by the broker this cycle");
                }
                let recovered = streak.reset();
                if recovered > 0 {
                    info!("Recovered after {} failed cycles", recovered);
                }
            } else {
                summary.failed += 1;
                FAILED_CYCLES_TOTAL.inc();

                if streak.record() {
                    warn!(
                        "Cycle failed ({} in a row), attempting to re-login",
                        streak.count
                    );
                } else {
                    debug!(
                        "Cycle failed ({} in a row), attempting to re-login",
                        streak.count
                    );
                }

                summary.relogins += 1;
                match self.auth.login().await {
                    Ok(fresh) => session = fresh,
                    Err(_) => warn!("Re-login failed, waiting before retry"),
                }
            }

            let next = Local::now()
                + chrono::Duration::from_std(self.interval).unwrap_or(chrono::Duration::zero());
            info!(
                "Waiting {} seconds until next cycle at {}",
                self.interval.as_secs(),
                next.format("%Y-%m-%d %H:%M:%S")
            );

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                Ok(()) = shutdown.changed() => break,
            }
        }

        info!(
            "Shutdown requested, total cycles completed: {} ({} failed)",
            summary.cycles, summary.failed
        );
        Ok(summary)
    }
}

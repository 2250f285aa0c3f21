//! Wall-clock drivers that run while an attempt is `ACTIVE`.

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::services::session_service::{SessionService, SubmitTrigger, TickOutcome};

#[derive(Debug, Clone, Copy)]
pub struct DriverSettings {
    pub timer_tick: Duration,
    pub autosave_interval: Duration,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            timer_tick: Duration::from_secs(1),
            autosave_interval: Duration::from_secs(5),
        }
    }
}

/// `interval` panics on a zero period.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Owns the cancellation of both driver tasks. The tasks are detached;
/// cancelling the token is the only way they stop early. Either task
/// cancels the token when it exits on its own, so the handle never
/// reports running drivers that are gone.
#[derive(Debug)]
pub struct DriverHandle {
    token: CancellationToken,
}

impl DriverHandle {
    pub fn stop(self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub fn spawn_drivers(service: &SessionService, settings: DriverSettings) -> DriverHandle {
    let token = CancellationToken::new();

    tokio::spawn(run_timer(
        service.clone(),
        settings.timer_tick,
        token.clone(),
    ));
    tokio::spawn(run_autosave(
        service.clone(),
        settings.autosave_interval,
        token.clone(),
    ));

    tracing::debug!(
        tick_ms = settings.timer_tick.as_millis() as u64,
        autosave_ms = settings.autosave_interval.as_millis() as u64,
        "Session drivers started"
    );
    DriverHandle { token }
}

async fn run_timer(service: SessionService, tick: Duration, token: CancellationToken) {
    let _stop_all = token.clone().drop_guard();
    let mut ticker = interval(tick.max(MIN_PERIOD));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => match service.tick() {
                TickOutcome::Running(_) => {}
                TickOutcome::Expired => {
                    tracing::info!("Time is up, submitting test");
                    if let Err(e) = service.submit_test(SubmitTrigger::TimerExpired) {
                        tracing::error!(error = %e, "Auto-submit failed");
                    }
                    break;
                }
                TickOutcome::Stopped => break,
            },
        }
    }
    tracing::debug!("Timer driver stopped");
}

async fn run_autosave(service: SessionService, every: Duration, token: CancellationToken) {
    let _stop_all = token.clone().drop_guard();
    let mut ticker = interval(every.max(MIN_PERIOD));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                match service.autosave_once().await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => tracing::warn!(error = %e, "Autosave failed"),
                }
            }
        }
    }
    tracing::debug!("Autosave driver stopped");
}

//! Tokio host for the SOS button: owns the ticker that drives a
//! [`HeldConfirmationTrigger`].

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::debug;

use crate::config::{ConfigError, TriggerConfig};
use crate::trigger::{
    HeldConfirmationTrigger, PressOutcome, ReleaseOutcome, TickOutcome, TriggerState,
};

fn lock(trigger: &Mutex<HeldConfirmationTrigger>) -> MutexGuard<'_, HeldConfirmationTrigger> {
    trigger.lock().unwrap_or_else(|e| e.into_inner())
}

/// Press-and-hold SOS control with a real timer.
///
/// At most one ticker task exists at a time. It is aborted on release, and on
/// drop, so nothing fires after the button is gone. Must be used from inside
/// a tokio runtime.
pub struct SosButton {
    trigger: Arc<Mutex<HeldConfirmationTrigger>>,
    ticker: Option<JoinHandle<()>>,
}

impl SosButton {
    /// `on_confirmed` runs on the ticker task while the trigger is locked; it
    /// must not call back into this button.
    pub fn new(
        config: TriggerConfig,
        on_confirmed: impl FnMut() + Send + 'static,
    ) -> Result<Self, ConfigError> {
        let trigger = HeldConfirmationTrigger::new(config)?.on_confirmed(on_confirmed);
        Ok(Self {
            trigger: Arc::new(Mutex::new(trigger)),
            ticker: None,
        })
    }

    pub fn press_start(&mut self) -> PressOutcome {
        let outcome = lock(&self.trigger).press_start();
        if let PressOutcome::Started { .. } = outcome {
            self.stop_ticker();
            self.ticker = Some(self.spawn_ticker());
        }
        outcome
    }

    pub fn press_end(&mut self) -> ReleaseOutcome {
        let outcome = lock(&self.trigger).press_end();
        self.stop_ticker();
        outcome
    }

    #[must_use]
    pub fn state(&self) -> TriggerState {
        lock(&self.trigger).state()
    }

    #[must_use]
    pub fn remaining_secs(&self) -> Option<u64> {
        lock(&self.trigger).remaining_secs()
    }

    #[must_use]
    pub fn acknowledged(&self) -> bool {
        lock(&self.trigger).acknowledged()
    }

    /// Whether a ticker task is still alive.
    #[must_use]
    pub fn is_ticking(&self) -> bool {
        self.ticker.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn spawn_ticker(&self) -> JoinHandle<()> {
        let trigger = Arc::clone(&self.trigger);
        let period = Duration::from_millis(lock(&trigger).config().tick_interval_ms);

        tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            loop {
                ticks.tick().await;
                match lock(&trigger).tick() {
                    TickOutcome::Counting { .. } => {}
                    TickOutcome::Confirmed | TickOutcome::Ignored => break,
                }
            }
        })
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

impl Drop for SosButton {
    fn drop(&mut self) {
        self.stop_ticker();
        lock(&self.trigger).reset();
        debug!("sos button torn down");
    }
}

//! Press-and-hold confirmation.
//!
//! A [`HeldConfirmationTrigger`] turns a sustained press into exactly one
//! confirmation. It is a plain state machine: the host feeds it press, release
//! and tick events and renders [`HeldConfirmationTrigger::remaining_secs`] and
//! the [`Pulse`] as projections of its state. It owns no timer itself; whoever
//! drives the ticks (see [`crate::sos::SosButton`] or the app shell's
//! `StartTicker` effect) starts the ticker on [`PressOutcome::Started`] and
//! stops it on anything that leaves `Holding`.
//!
//! ```text
//! Idle --press--> Holding --last tick--> Confirmed --auto--> Idle
//!                 Holding --release----> Idle
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::config::{ConfigError, TriggerConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerState {
    Idle,
    Holding { remaining_ms: u64 },
    /// Only observable from inside the confirmation callback.
    Confirmed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PressOutcome {
    /// Countdown started; the host must start ticking.
    Started { remaining_ms: u64 },
    /// Duplicate press while already holding.
    Ignored,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Hold interrupted; the host must stop ticking. Nothing fired.
    Cancelled { remaining_ms: u64 },
    AlreadyIdle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Counting { remaining_ms: u64 },
    /// Hold completed, callback fired, trigger is back to `Idle`.
    Confirmed,
    /// Tick arrived while not holding (late timer). Dropped.
    Ignored,
}

/// Acknowledgement pulse played on confirmation: scale 1 → 1.2 → 1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pulse;

impl Pulse {
    pub const PEAK_SCALE: f32 = 1.2;
    pub const HALF_MS: u64 = 100;
    pub const DURATION_MS: u64 = 2 * Self::HALF_MS;

    /// Scale at `elapsed_ms` after confirmation, linear on both halves.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn scale_at(elapsed_ms: u64) -> f32 {
        let rise = Self::PEAK_SCALE - 1.0;
        if elapsed_ms >= Self::DURATION_MS {
            1.0
        } else if elapsed_ms <= Self::HALF_MS {
            1.0 + rise * (elapsed_ms as f32 / Self::HALF_MS as f32)
        } else {
            let back = (elapsed_ms - Self::HALF_MS) as f32 / Self::HALF_MS as f32;
            Self::PEAK_SCALE - rise * back
        }
    }
}

type ConfirmCallback = Box<dyn FnMut() + Send>;

pub struct HeldConfirmationTrigger {
    config: TriggerConfig,
    state: TriggerState,
    on_confirmed: Option<ConfirmCallback>,
    confirmations: u64,
    acknowledged: bool,
}

impl fmt::Debug for HeldConfirmationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeldConfirmationTrigger")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("confirmations", &self.confirmations)
            .field("has_callback", &self.on_confirmed.is_some())
            .finish()
    }
}

impl HeldConfirmationTrigger {
    pub fn new(config: TriggerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            state: TriggerState::Idle,
            on_confirmed: None,
            confirmations: 0,
            acknowledged: false,
        })
    }

    /// Binds the confirmed action. It runs synchronously inside the final
    /// [`tick`](Self::tick), so it must hand slow work off instead of
    /// blocking.
    #[must_use]
    pub fn on_confirmed(mut self, action: impl FnMut() + Send + 'static) -> Self {
        self.on_confirmed = Some(Box::new(action));
        self
    }

    #[must_use]
    pub fn config(&self) -> TriggerConfig {
        self.config
    }

    #[must_use]
    pub fn state(&self) -> TriggerState {
        self.state
    }

    #[must_use]
    pub fn is_holding(&self) -> bool {
        matches!(self.state, TriggerState::Holding { .. })
    }

    #[must_use]
    pub fn remaining_ms(&self) -> Option<u64> {
        match self.state {
            TriggerState::Holding { remaining_ms } => Some(remaining_ms),
            _ => None,
        }
    }

    /// Whole seconds left, rounded up, while holding. `None` hides the
    /// countdown.
    #[must_use]
    pub fn remaining_secs(&self) -> Option<u64> {
        self.remaining_ms().map(|ms| ms.div_ceil(1_000))
    }

    /// Completed holds since creation.
    #[must_use]
    pub fn confirmations(&self) -> u64 {
        self.confirmations
    }

    /// True from a confirmation until the next press; the host plays the
    /// [`Pulse`] while this is set.
    #[must_use]
    pub fn acknowledged(&self) -> bool {
        self.acknowledged
    }

    pub fn press_start(&mut self) -> PressOutcome {
        match self.state {
            TriggerState::Idle => {
                let remaining_ms = self.config.hold_duration_ms;
                self.state = TriggerState::Holding { remaining_ms };
                self.acknowledged = false;
                debug!(remaining_ms, "hold started");
                PressOutcome::Started { remaining_ms }
            }
            TriggerState::Holding { .. } | TriggerState::Confirmed => {
                debug!("duplicate press ignored");
                PressOutcome::Ignored
            }
        }
    }

    pub fn press_end(&mut self) -> ReleaseOutcome {
        match self.state {
            TriggerState::Holding { remaining_ms } => {
                self.state = TriggerState::Idle;
                debug!(remaining_ms, "hold released early");
                ReleaseOutcome::Cancelled { remaining_ms }
            }
            TriggerState::Idle | TriggerState::Confirmed => ReleaseOutcome::AlreadyIdle,
        }
    }

    /// One timer period elapsed.
    pub fn tick(&mut self) -> TickOutcome {
        let TriggerState::Holding { remaining_ms } = self.state else {
            return TickOutcome::Ignored;
        };

        let remaining_ms = remaining_ms.saturating_sub(self.config.tick_interval_ms);
        if remaining_ms > 0 {
            self.state = TriggerState::Holding { remaining_ms };
            return TickOutcome::Counting { remaining_ms };
        }

        self.state = TriggerState::Confirmed;
        self.confirmations += 1;
        self.acknowledged = true;
        info!(confirmations = self.confirmations, "hold confirmed");
        if let Some(action) = self.on_confirmed.as_mut() {
            action();
        }
        self.state = TriggerState::Idle;
        TickOutcome::Confirmed
    }

    /// Teardown: abandons any hold in progress without firing.
    pub fn reset(&mut self) {
        if self.is_holding() {
            debug!("hold abandoned on teardown");
        }
        self.state = TriggerState::Idle;
        self.acknowledged = false;
    }
}

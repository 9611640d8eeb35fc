//! SOS hold driven the way a shell does it: a real interval feeding ticks
//! back into the core, on a paused tokio clock.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{complete_profile, InMemoryRemote};
use kalinga_shared::capabilities::MemoryStore;
use kalinga_shared::{
    Companion, CompanionConfig, Effect, EmergencyContact, Event, SosButton, TriggerConfig,
    TriggerState, UserId,
};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};

/// Minimal shell: runs the ticker effect and collects notifications.
struct Shell {
    core: Arc<Mutex<Companion<InMemoryRemote>>>,
    ticker: Option<JoinHandle<()>>,
    notified: Arc<Mutex<Vec<EmergencyContact>>>,
}

impl Shell {
    fn new(remote: InMemoryRemote) -> Self {
        let core = Companion::new(
            &CompanionConfig::default(),
            Arc::new(MemoryStore::new()),
            remote,
        )
        .unwrap();
        Self {
            core: Arc::new(Mutex::new(core)),
            ticker: None,
            notified: Arc::default(),
        }
    }

    fn send(&mut self, event: Event) {
        let effects = self.core.lock().unwrap().update(event);
        self.run(effects);
    }

    fn run(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StartTicker { interval_ms } => {
                    let core = Arc::clone(&self.core);
                    let notified = Arc::clone(&self.notified);
                    let period = Duration::from_millis(interval_ms);
                    self.ticker = Some(tokio::spawn(async move {
                        let mut ticks = interval_at(Instant::now() + period, period);
                        loop {
                            ticks.tick().await;
                            let effects = core.lock().unwrap().update(Event::SosTick);
                            for effect in &effects {
                                if let Effect::NotifyEmergencyContact { contact } = effect {
                                    notified.lock().unwrap().push(contact.clone());
                                }
                            }
                            if effects.contains(&Effect::StopTicker) {
                                break;
                            }
                        }
                    }));
                }
                Effect::StopTicker => {
                    if let Some(ticker) = self.ticker.take() {
                        ticker.abort();
                    }
                }
                Effect::NotifyEmergencyContact { contact } => {
                    self.notified.lock().unwrap().push(contact);
                }
                _ => {}
            }
        }
    }

    fn notified(&self) -> usize {
        self.notified.lock().unwrap().len()
    }

    fn countdown(&self) -> Option<String> {
        self.core.lock().unwrap().view().sos.countdown
    }
}

fn signed_in_shell() -> Shell {
    let rosa = UserId::new("uid-rosa");
    let remote = InMemoryRemote::default();
    remote.put(&rosa, complete_profile("Rosa"));
    let mut shell = Shell::new(remote);
    shell.send(Event::IdentityChanged {
        user: Some(rosa),
        email_verified: true,
    });
    shell
}

#[tokio::test(start_paused = true)]
async fn holding_three_seconds_alerts_once() {
    let mut shell = signed_in_shell();
    shell.send(Event::SosPressStarted);
    assert_eq!(shell.countdown().as_deref(), Some("Hold for 3s"));

    sleep(Duration::from_millis(1_050)).await;
    assert_eq!(shell.countdown().as_deref(), Some("Hold for 2s"));

    sleep(Duration::from_millis(1_940)).await;
    assert_eq!(shell.notified(), 0);

    // Exactly the configured hold.
    sleep(Duration::from_millis(10)).await;
    tokio::task::yield_now().await;
    assert_eq!(shell.notified(), 1);
    assert_eq!(shell.countdown(), None);
    assert!(shell.core.lock().unwrap().view().sos.pulse);

    // The finger lifts after the alert went out.
    shell.send(Event::SosPressEnded);
    sleep(Duration::from_secs(5)).await;
    assert_eq!(shell.notified(), 1);
}

#[tokio::test(start_paused = true)]
async fn short_taps_never_alert() {
    let mut shell = signed_in_shell();
    for _ in 0..5 {
        shell.send(Event::SosPressStarted);
        sleep(Duration::from_millis(500)).await;
        shell.send(Event::SosPressEnded);
    }
    sleep(Duration::from_secs(10)).await;
    assert_eq!(shell.notified(), 0);
}

#[tokio::test(start_paused = true)]
async fn release_just_before_the_end_cancels() {
    let mut shell = signed_in_shell();
    shell.send(Event::SosPressStarted);
    sleep(Duration::from_millis(2_900)).await;
    shell.send(Event::SosPressEnded);
    sleep(Duration::from_secs(5)).await;
    assert_eq!(shell.notified(), 0);
    assert_eq!(shell.countdown(), None);
}

#[tokio::test(start_paused = true)]
async fn sign_out_mid_hold_stops_the_timer() {
    let mut shell = signed_in_shell();
    shell.send(Event::SosPressStarted);
    sleep(Duration::from_millis(1_500)).await;
    shell.send(Event::SignOutRequested);
    sleep(Duration::from_secs(5)).await;
    assert_eq!(shell.notified(), 0);
}

#[tokio::test(start_paused = true)]
async fn sos_button_fires_its_action_after_the_hold() {
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    let config = TriggerConfig {
        hold_duration_ms: 2_000,
        tick_interval_ms: 500,
    };
    let mut button = SosButton::new(config, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    button.press_start();
    sleep(Duration::from_millis(1_600)).await;
    assert_eq!(button.remaining_secs(), Some(1));
    sleep(Duration::from_millis(500)).await;

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(button.state(), TriggerState::Idle);
    assert!(button.acknowledged());
}

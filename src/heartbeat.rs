//! Heartbeat scheduling
//!
//! Fires on a fixed interval and whenever the host signals that the page is
//! about to disappear (visibility hidden, unload). Every firing asks the owner
//! for one cumulative flush. Stopping the scheduler cancels the timer and
//! drops the lifecycle subscriptions before returning.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::host::{
    HostEnvironment, HostSignal, SignalHandler, SignalKind, Subscription, Visibility,
};

/// What caused a heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatTrigger {
    /// Periodic timer tick
    Interval,
    /// Page became hidden
    Hidden,
    /// Page is unloading
    Unload,
    /// Requested by the host
    Manual,
}

impl HeartbeatTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeartbeatTrigger::Interval => "interval",
            HeartbeatTrigger::Hidden => "hidden",
            HeartbeatTrigger::Unload => "unload",
            HeartbeatTrigger::Manual => "manual",
        }
    }
}

/// Callback invoked on every heartbeat
pub type HeartbeatFn = Arc<dyn Fn(HeartbeatTrigger) + Send + Sync>;

struct Running {
    cancel: CancellationToken,
    timer: JoinHandle<()>,
    /// Visibility and unload listeners
    subscriptions: Vec<Subscription>,
}

/// Owns the heartbeat timer and the page-lifecycle listeners
#[derive(Default)]
pub struct HeartbeatScheduler {
    running: Option<Running>,
}

impl HeartbeatScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the timer and subscribe to page-lifecycle signals.
    ///
    /// A scheduler that is already running is stopped first. The first tick
    /// fires one full `interval` after start.
    pub fn start(
        &mut self,
        runtime: &Handle,
        host: &dyn HostEnvironment,
        interval: Duration,
        on_fire: HeartbeatFn,
    ) {
        self.stop();

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let tick = Arc::clone(&on_fire);
        let timer = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => tick(HeartbeatTrigger::Interval),
                }
            }
            debug!("heartbeat timer stopped");
        });

        let subscriptions = vec![
            host.subscribe(
                SignalKind::Visibility,
                lifecycle_handler(&cancel, &on_fire),
            ),
            host.subscribe(SignalKind::Unload, lifecycle_handler(&cancel, &on_fire)),
        ];

        self.running = Some(Running {
            cancel,
            timer,
            subscriptions,
        });
    }

    /// Cancel the timer and detach the lifecycle listeners
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            running.timer.abort();
            for subscription in running.subscriptions {
                subscription.unsubscribe();
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

impl Drop for HeartbeatScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for HeartbeatScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatScheduler")
            .field("running", &self.is_running())
            .finish()
    }
}

/// Map a lifecycle signal to a heartbeat trigger; visible pages do not fire
fn lifecycle_trigger(signal: &HostSignal) -> Option<HeartbeatTrigger> {
    match signal {
        HostSignal::Visibility(Visibility::Hidden) => Some(HeartbeatTrigger::Hidden),
        HostSignal::Unload => Some(HeartbeatTrigger::Unload),
        HostSignal::Visibility(Visibility::Visible) | HostSignal::Scroll(_) => None,
    }
}

fn lifecycle_handler(cancel: &CancellationToken, on_fire: &HeartbeatFn) -> SignalHandler {
    let token = cancel.clone();
    let on_fire = Arc::clone(on_fire);
    Arc::new(move |signal: &HostSignal| {
        if token.is_cancelled() {
            return;
        }
        if let Some(trigger) = lifecycle_trigger(signal) {
            on_fire(trigger);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostBus;
    use parking_lot::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<HeartbeatTrigger>>>, HeartbeatFn) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let on_fire: HeartbeatFn = Arc::new(move |trigger| sink.lock().push(trigger));
        (fired, on_fire)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_on_interval() {
        let bus = HostBus::default();
        let (fired, on_fire) = recorder();
        let mut scheduler = HeartbeatScheduler::new();
        scheduler.start(&Handle::current(), &bus, Duration::from_secs(30), on_fire);

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(fired.lock().is_empty());

        tokio::time::sleep(Duration::from_secs(62)).await;
        assert_eq!(
            *fired.lock(),
            vec![HeartbeatTrigger::Interval, HeartbeatTrigger::Interval, HeartbeatTrigger::Interval]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_timer_and_listeners() {
        let bus = HostBus::default();
        let (fired, on_fire) = recorder();
        let mut scheduler = HeartbeatScheduler::new();
        scheduler.start(&Handle::current(), &bus, Duration::from_secs(30), on_fire);
        assert_eq!(bus.listener_count(SignalKind::Visibility), 1);
        assert_eq!(bus.listener_count(SignalKind::Unload), 1);

        scheduler.stop();
        assert!(!scheduler.is_running());
        assert_eq!(bus.listener_count(SignalKind::Visibility), 0);
        assert_eq!(bus.listener_count(SignalKind::Unload), 0);

        tokio::time::sleep(Duration::from_secs(120)).await;
        bus.emit(HostSignal::Unload);
        assert!(fired.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_previous_timer() {
        let bus = HostBus::default();
        let (fired, on_fire) = recorder();
        let mut scheduler = HeartbeatScheduler::new();
        scheduler.start(&Handle::current(), &bus, Duration::from_secs(30), Arc::clone(&on_fire));
        scheduler.start(&Handle::current(), &bus, Duration::from_secs(30), on_fire);

        assert_eq!(bus.listener_count(SignalKind::Unload), 1);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(fired.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_lifecycle_signals_fire() {
        let bus = HostBus::default();
        let (fired, on_fire) = recorder();
        let mut scheduler = HeartbeatScheduler::new();
        scheduler.start(&Handle::current(), &bus, Duration::from_secs(30), on_fire);

        bus.emit(HostSignal::Visibility(Visibility::Visible));
        bus.emit(HostSignal::Visibility(Visibility::Hidden));
        bus.emit(HostSignal::Unload);

        assert_eq!(
            *fired.lock(),
            vec![HeartbeatTrigger::Hidden, HeartbeatTrigger::Unload]
        );
    }
}

//! Scroll depth monitoring
//!
//! One scroll listener is attached per current page-view. Each tick is
//! converted to a depth percentage and reported to the owner, which keeps the
//! running maximum on whichever view is current.

use std::sync::Arc;

use crate::host::{
    HostEnvironment, HostSignal, ScrollPosition, SignalHandler, SignalKind, Subscription,
};

/// Convert a scroll position to a depth percentage in `[0, 100]`.
///
/// Formula: `round(scroll_top / max(1, scroll_height - viewport_height) * 100)`
pub fn scroll_percent(position: &ScrollPosition) -> u8 {
    let scrollable = (position.scroll_height - position.viewport_height).max(1.0);
    let percent = (position.scroll_top / scrollable * 100.0).round();
    if !percent.is_finite() {
        return 0;
    }
    percent.clamp(0.0, 100.0) as u8
}

/// Holds the scroll subscription for the current page-view
#[derive(Debug, Default)]
pub struct ScrollDepthMonitor {
    subscription: Option<Subscription>,
}

impl ScrollDepthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a fresh listener, detaching any previous one first.
    ///
    /// `on_depth` receives the depth of every scroll tick.
    pub fn attach<F>(&mut self, host: &dyn HostEnvironment, on_depth: F)
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        self.detach();
        let handler: SignalHandler = Arc::new(move |signal: &HostSignal| {
            if let HostSignal::Scroll(position) = signal {
                on_depth(scroll_percent(position));
            }
        });
        self.subscription = Some(host.subscribe(SignalKind::Scroll, handler));
    }

    pub fn detach(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostBus;
    use parking_lot::Mutex;
    use proptest::prelude::*;

    fn position(scroll_top: f64, scroll_height: f64, viewport_height: f64) -> ScrollPosition {
        ScrollPosition {
            scroll_top,
            scroll_height,
            viewport_height,
        }
    }

    #[test]
    fn test_scroll_percent_basic() {
        assert_eq!(scroll_percent(&position(0.0, 2000.0, 1000.0)), 0);
        assert_eq!(scroll_percent(&position(500.0, 2000.0, 1000.0)), 50);
        assert_eq!(scroll_percent(&position(1000.0, 2000.0, 1000.0)), 100);
    }

    #[test]
    fn test_scroll_percent_rounds() {
        // 333 / 1000 = 33.3%
        assert_eq!(scroll_percent(&position(333.0, 2000.0, 1000.0)), 33);
        // 335 / 1000 = 33.5% rounds up
        assert_eq!(scroll_percent(&position(335.0, 2000.0, 1000.0)), 34);
    }

    #[test]
    fn test_scroll_percent_short_page() {
        // Content shorter than the viewport: denominator floors at 1
        assert_eq!(scroll_percent(&position(0.0, 500.0, 1000.0)), 0);
        assert_eq!(scroll_percent(&position(3.0, 500.0, 1000.0)), 100);
    }

    #[test]
    fn test_scroll_percent_overscroll_and_garbage() {
        assert_eq!(scroll_percent(&position(5000.0, 2000.0, 1000.0)), 100);
        assert_eq!(scroll_percent(&position(-40.0, 2000.0, 1000.0)), 0);
        assert_eq!(scroll_percent(&position(f64::NAN, 2000.0, 1000.0)), 0);
    }

    #[test]
    fn test_attach_and_detach() {
        let bus = HostBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut monitor = ScrollDepthMonitor::new();
        monitor.attach(&bus, move |depth| sink.lock().push(depth));
        assert_eq!(bus.listener_count(SignalKind::Scroll), 1);

        bus.emit(HostSignal::Scroll(position(250.0, 2000.0, 1000.0)));
        monitor.detach();
        bus.emit(HostSignal::Scroll(position(900.0, 2000.0, 1000.0)));

        assert_eq!(*seen.lock(), vec![25]);
        assert_eq!(bus.listener_count(SignalKind::Scroll), 0);
    }

    #[test]
    fn test_reattach_replaces_listener() {
        let bus = HostBus::default();
        let mut monitor = ScrollDepthMonitor::new();
        monitor.attach(&bus, |_| {});
        monitor.attach(&bus, |_| {});
        assert_eq!(bus.listener_count(SignalKind::Scroll), 1);
    }

    proptest! {
        #[test]
        fn prop_scroll_percent_in_range(
            top in -1.0e6f64..1.0e6,
            height in 0.0f64..1.0e6,
            viewport in 0.0f64..1.0e6,
        ) {
            let percent = scroll_percent(&position(top, height, viewport));
            prop_assert!(percent <= 100);
        }
    }
}
